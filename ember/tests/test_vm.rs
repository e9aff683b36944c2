mod common;

use common::{run, run_err, vm_with};
use ember::prelude::*;

#[test]
fn test_arithmetic() {
    assert_eq!(run("println(1 + 2 * 3, 7 / 2, 7 % 3, -4);"), "7 3 1 -4\n");
    assert_eq!(run("let a = 3; println(a * 0.5, 1.5 + a);"), "1.5 4.5\n");
    assert_eq!(run("let n = 5; println(n!, 0x10 | 0b1, 1 << 4);"), "120 17 16\n");
}

#[test]
fn test_strings() {
    let source = r#"
        let s = "héllo";
        println("a" + "b", "n=" + 3, s[1], len(s));
        println("abc" < "abd", "x" == "x", "x" != "y");
    "#;
    assert_eq!(run(source), "ab n=3 é 5\ntrue true true\n");
}

#[test]
fn test_control_flow() {
    let source = "
        let i = 0;
        let sum = 0;
        while (i < 10) {
            i += 1;
            if (i % 2 == 0) continue;
            if (i > 7) break;
            sum += i;
        }
        println(sum, i);
        println(1 < 2 ? \"yes\" : \"no\", null || 4, false && 1);
    ";
    assert_eq!(run(source), "16 9\nyes 4 false\n");
}

#[test]
fn test_recursion() {
    let source = "
        fn fib(n) {
            if (n < 2) return n;
            return fib(n - 1) + fib(n - 2);
        }
        println(fib(15));
    ";
    assert_eq!(run(source), "610\n");
}

#[test]
fn test_closures_share_captured_variable() {
    let source = "
        fn counter() {
            let n = 0;
            let inc = fn () { n += 1; return n; };
            let get = fn () { return n; };
            return inc, get;
        }
        let pair = counter();
        let inc = pair[0];
        inc();
        inc();
        println(inc(), pair[1]());
    ";
    assert_eq!(run(source), "3 3\n");
}

#[test]
fn test_closure_captures_loop_scope() {
    let source = "
        let fns = [null, null, null];
        let i = 0;
        while (i < 3) {
            let j = i * 10;
            fns[i] = fn () { return j; };
            i += 1;
        }
        println(fns[0](), fns[1](), fns[2]());
    ";
    assert_eq!(run(source), "0 10 20\n");
}

#[test]
fn test_variadic_functions() {
    let source = "
        fn sum(first, rest...) {
            let total = first;
            let i = 0;
            while (i < len(rest)) {
                total += rest[i];
                i += 1;
            }
            return total;
        }
        fn count(...) { return len(...); }
        println(sum(1), sum(1, 2, 3), count(), count(4, 5));
    ";
    assert_eq!(run(source), "1 6 0 2\n");
}

#[test]
fn test_multiple_return_values() {
    let source = "
        fn none() { return; }
        fn pair() { return 1, 2; }
        let p = pair();
        println(none(), p, p[1]);
    ";
    assert_eq!(run(source), "null [1, 2] 2\n");
}

#[test]
fn test_script_return_values() {
    let (mut vm, _) = vm_with(VmConf::default());
    let values = vm.interpret("return 1 + 1, \"two\";").unwrap();
    assert_eq!(values.len(), 2);
    assert_eq!(values[0], Value::I64(2));
    assert_eq!(vm.display(&values[1]), "two");

    assert!(vm.interpret("let x = 1;").unwrap().is_empty());
}

#[test]
fn test_collections() {
    let source = r#"
        let a = [1, 2, 3];
        a[0] += 10;
        let d = {"a": 1};
        d["b"] = 2;
        let p = struct { x: 1, y: 2 };
        p.x = 10;
        println(a, len(a));
        println(d["a"] + d["b"], d["missing"], len(d));
        println(p.x + p.y, p["y"], p);
    "#;
    assert_eq!(
        run(source),
        "[11, 2, 3] 3\n3 null 2\n12 2 struct { x: 10, y: 2 }\n"
    );
}

#[test]
fn test_postfix_operators() {
    let source = "
        let i = 1;
        let j = i++;
        let k = i--;
        println(i, j, k);
    ";
    assert_eq!(run(source), "1 1 2\n");
}

#[test]
fn test_references_write_through() {
    let source = "
        fn bump(p) { p += 1; }
        let n = 1;
        bump(ref n);
        bump(ref n);

        let a = [1, 2];
        let e = ref a[1];
        e = 9;

        fn local() {
            let x = 1;
            let r = ref x;
            r = 7;
            return x;
        }
        println(n, a, local());
    ";
    assert_eq!(run(source), "3 [1, 9] 7\n");
}

#[test]
fn test_modules_and_enums() {
    let source = "
        module M {
            let offset = 40;
            fn f() { return g() + offset; }
            fn g() { return 2; }
            enum Color { Red, Green = 5, Blue }
        }
        println(M.f(), M.Color.Red, M.Color.Green, M.Color.Blue);
    ";
    assert_eq!(run(source), "42 0 5 6\n");
}

#[test]
fn test_natives() {
    let source = r#"
        print("a", 1);
        print("\n");
        println(type_of(1), type_of("s"), type_of([]), to_str([1, 'c']));
        let t = clock();
        let r = random();
        println(t > 0.0, r >= 0.0 && r < 1.0);
    "#;
    assert_eq!(run(source), "a 1\ni64 str array [1, 'c']\ntrue true\n");
}

#[test]
fn test_division_by_zero_reports_line() {
    let err = run_err("let z = 0;\nprintln(1 / z);");
    match err {
        EmberError::Runtime { line, .. } => assert_eq!(line, 2),
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn test_runtime_errors() {
    let cases = [
        ("let a = [1]; a[3];", "out of range"),
        ("let x = 1; x();", "cannot call"),
        ("let s = struct { a: 1 }; s.b = 2;", "undefined field"),
        ("let d = {}; d + 1;", "not defined"),
        ("let f = fn (a) { return a; }; f(1, 2);", "expects 1 arguments"),
        ("len(1, 2);", "expects 1 arguments"),
    ];
    for (source, expected) in cases {
        let err = run_err(source);
        let text = err.to_string();
        assert!(text.contains(expected), "{source}: {text}");
    }
}

#[test]
fn test_vm_is_reusable_after_error() {
    let (mut vm, out) = vm_with(VmConf::default());
    assert!(vm.interpret("let a = [1]; a[5];").is_err());
    assert!(vm.heap().stack().is_empty());
    vm.interpret("println(\"ok\");").unwrap();
    assert_eq!(out.text(), "ok\n");
}

#[test]
fn test_compile_errors_do_not_run() {
    let (mut vm, out) = vm_with(VmConf::default());
    let err = vm.interpret("println(1); break;").unwrap_err();
    assert!(matches!(err, EmberError::Compile(_)));
    assert_eq!(out.text(), "");
}
