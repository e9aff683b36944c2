use ember::prelude::*;
use proptest::prelude::*;

const OPERATORS: &[&str] = &["+", "-", "*", "/", "%", "&", "|", "^", "<", "<=", "==", "!="];

/// Results of a script, or `None` when it failed at runtime.
fn evaluate(source: &str) -> Option<Vec<Value>> {
    let function = ember::compile(source).unwrap_or_else(|err| panic!("{err}\n{source}"));
    Vm::default().run(function).ok()
}

proptest! {
    #[test]
    fn test_integer_folding_matches_runtime(
        a in -1000i64..1000,
        b in -1000i64..1000,
        op in 0..OPERATORS.len(),
    ) {
        let op = OPERATORS[op];
        let folded = evaluate(&format!("return ({a}) {op} ({b});"));
        let runtime = evaluate(&format!("let a = {a}; let b = {b}; return a {op} b;"));
        prop_assert_eq!(folded, runtime);
    }

    #[test]
    fn test_float_folding_matches_runtime(
        a in -100.0f64..100.0,
        b in -100.0f64..100.0,
        op in 0..5usize,
    ) {
        let op = OPERATORS[op];
        let folded = evaluate(&format!("return ({a:?}) {op} ({b:?});"));
        let runtime = evaluate(&format!("let a = {a:?}; let b = {b:?}; return a {op} b;"));
        prop_assert_eq!(folded, runtime);
    }

    #[test]
    fn test_mixed_width_promotion(a in -50i64..50, b in -50.0f64..50.0) {
        let folded = evaluate(&format!("return ({a}) * ({b:?});"));
        let runtime = evaluate(&format!("let a = {a}; let b = {b:?}; return a * b;"));
        prop_assert_eq!(folded, runtime);
    }
}
