mod common;

use common::{run, run_err};
use ember::prelude::*;

const SHAPES: &str = "
    class A {
        let x = 1;
        fn who() { return \"A\"; }
        fn get_x() { return this.x; }
    }
    class B {
        let x = 2;
        fn who() { return \"B\"; }
        fn only_b() { return \"b\"; }
    }
    class C : A, B {
        let y = 0;
        fn init(y) { this.y = y; }
        fn sum() { return this.x + this.y; }
    }
    class D : A {
        fn who() { return \"D\" + base.who(); }
    }
";

fn with_shapes(body: &str) -> String {
    run(&format!("{SHAPES}\n{body}"))
}

#[test]
fn test_earlier_parent_shadows_later() {
    let out = with_shapes("let c = new C(5); println(c.who(), c.only_b(), c.x, c.y, c.get_x());");
    assert_eq!(out, "A b 1 5 1\n");
}

#[test]
fn test_init_receives_arguments() {
    let out = with_shapes("let c = new C(41); println(c.sum());");
    assert_eq!(out, "42\n");
}

#[test]
fn test_base_skips_own_members() {
    let out = with_shapes("let d = new D(); println(d.who(), d.get_x());");
    assert_eq!(out, "DA 1\n");
}

#[test]
fn test_parent_fields_are_per_instance() {
    let out = with_shapes(
        "
        let first = new C(1);
        let second = new C(2);
        first.x = 10;
        println(first.get_x(), second.get_x(), second.x);
        ",
    );
    assert_eq!(out, "10 1 1\n");
}

#[test]
fn test_methods_are_bound_to_receiver() {
    let out = with_shapes(
        "
        let c = new C(3);
        let f = c.sum;
        c.y = 4;
        println(f());
        ",
    );
    assert_eq!(out, "5\n");
}

#[test]
fn test_class_members() {
    let out = run("
        class K {
            let size = 3;
            enum Mode { On, Off }
            fn describe() { return \"k\" + this.size; }
        }
        let k = new K();
        println(K.Mode.Off, K.size, k.describe(), k);
    ");
    assert_eq!(out, "1 3 k3 K { size: 3 }\n");
}

#[test]
fn test_instantiation_errors() {
    let err = run_err("class A {} A();");
    assert!(err.to_string().contains("use 'new'"), "{err}");

    let err = run_err("class A {} new A(1);");
    assert!(err.to_string().contains("no 'init'"), "{err}");

    let err = run_err("class A { let v = 1; } let a = new A(); a.missing = 1;");
    assert!(err.to_string().contains("undefined field 'missing'"), "{err}");

    let err = run_err("class A {} let a = new A(); a.nothing();");
    assert!(err.to_string().contains("undefined member 'nothing'"), "{err}");
}

#[test]
fn test_new_on_non_class_is_rejected() {
    let (mut vm, _) = common::vm_with(VmConf::default());
    let err = vm.interpret("fn f() {} let o = new f();").unwrap_err();
    assert!(matches!(err, EmberError::Compile(_)), "{err}");
}
