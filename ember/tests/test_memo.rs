mod common;

use common::run_with;
use ember::prelude::*;

fn cached() -> VmConf {
    VmConf {
        function_cache: true,
        ..VmConf::default()
    }
}

const COUNTED: &str = "
    let count = 0;
    fn f(x) {
        count += 1;
        return x;
    }
    println(f(1), f(1), f(2));
    println(count);
";

#[test]
fn test_same_arguments_run_body_once() {
    assert_eq!(run_with(cached(), COUNTED), "1 1 2\n2\n");
}

#[test]
fn test_disabled_cache_runs_every_call() {
    assert_eq!(run_with(VmConf::default(), COUNTED), "1 1 2\n3\n");
}

#[test]
fn test_calls_without_arguments_are_not_cached() {
    let source = "
        let count = 0;
        fn g() { count += 1; return count; }
        println(g(), g());
    ";
    assert_eq!(run_with(cached(), source), "1 2\n");
}

#[test]
fn test_structurally_equal_arguments_hit() {
    let source = "
        let count = 0;
        fn total(items) { count += 1; return len(items); }
        total([1, 2]);
        total([1, 2]);
        total([1, 2, 3]);
        println(count);
    ";
    assert_eq!(run_with(cached(), source), "2\n");
}

#[test]
fn test_memoized_recursion() {
    let source = "
        fn fib(n) {
            if (n < 2) return n;
            return fib(n - 1) + fib(n - 2);
        }
        println(fib(60));
    ";
    assert_eq!(run_with(cached(), source), "1548008755920\n");
}

#[test]
fn test_cached_results_survive_collection() {
    let source = "
        fn make(n) { return [n, n]; }
        make(3);
        let junk = 0;
        while (junk < 50) {
            let s = \"x\" + junk;
            junk += 1;
        }
        let again = make(3);
        println(again);
    ";
    let conf = VmConf {
        gc_stress: true,
        ..cached()
    };
    assert_eq!(run_with(conf, source), "[3, 3]\n");
}

#[test]
fn test_closures_with_different_captures_do_not_share_results() {
    let source = "
        fn make(n) { return fn (x) { return x + n; }; }
        let a = make(1);
        let b = make(100);
        println(a(1), b(1), a(1));
    ";
    assert_eq!(run_with(cached(), source), "2 101 2\n");
}
