mod common;

use common::{run_with, vm_with};
use ember::{prelude::*, vm::native::NATIVES};

fn stress() -> VmConf {
    VmConf {
        gc_stress: true,
        ..VmConf::default()
    }
}

#[test]
fn test_linked_list_under_stress() {
    let source = "
        class Node {
            let value = null;
            let next = null;
        }
        fn build(n) {
            let head = null;
            let i = 0;
            while (i < n) {
                let node = new Node();
                node.value = \"v\" + i;
                node.next = head;
                head = node;
                i += 1;
            }
            return head;
        }
        let list = build(20);
        let total = 0;
        let cur = list;
        while (cur != null) {
            total += 1;
            cur = cur.next;
        }
        println(total, list.value);
    ";
    assert_eq!(run_with(stress(), source), "20 v19\n");
}

#[test]
fn test_closures_and_collections_under_stress() {
    let source = r#"
        fn adder(n) { return fn (x) { return x + n; }; }
        let adders = [adder(1), adder(2)];
        let d = {"k": [1, 2], "s": struct { a: "x" + "y" }};
        let r = ref d["k"];
        module M { fn twice(f, v) { return f(f(v)); } }
        println(M.twice(adders[1], 1), d["s"].a, r, to_str(adders[0](9)));
    "#;
    assert_eq!(run_with(stress(), source), "5 xy [1, 2] 10\n");
}

#[test]
fn test_collection_keeps_globals_and_frees_temporaries() {
    let (mut vm, _) = vm_with(VmConf::default());
    vm.interpret(
        "
        let keep = [1, 2];
        fn churn() { let tmp = [3, 4, 5]; return 0; }
        let i = 0;
        while (i < 100) { churn(); i += 1; }
        ",
    )
    .unwrap();

    let before = vm.heap().live_objects();
    vm.heap_mut().collect();
    let after = vm.heap().live_objects();
    assert!(after < before, "{after} >= {before}");
    assert!(vm.heap().stats().objects_freed >= 100);

    let keep = vm.heap().global(NATIVES.len()).unwrap();
    assert_eq!(vm.display(&keep), "[1, 2]");
}

#[test]
fn test_stress_collects_often() {
    let (mut vm, out) = vm_with(stress());
    vm.interpret("let s = \"\"; let i = 0; while (i < 10) { s = s + i; i += 1; } println(s);")
        .unwrap();
    assert_eq!(out.text(), "0123456789\n");
    assert!(vm.heap().stats().collections >= 10);
}

#[test]
fn test_reset_frees_everything() {
    let (mut vm, _) = vm_with(VmConf::default());
    vm.interpret("let a = [1, 2, 3]; let b = {\"x\": a};").unwrap();
    let handle = vm.heap().global(NATIVES.len()).unwrap().as_object().unwrap();
    vm.reset();
    assert!(!vm.heap().contains(handle));
    assert_eq!(vm.heap().live_objects(), NATIVES.len());
}
