use ember::{
    compile_with,
    pass::{AstPassManager, ConstantFold, SyntaxCheck, TypeCheckAndResolve},
    prelude::*,
    vm::native::native_names,
};

fn errors(source: &str) -> Vec<Diagnostic> {
    match ember::compile(source) {
        Ok(_) => panic!("expected errors:\n{source}"),
        Err(EmberError::Compile(diagnostics)) => diagnostics.into_vec(),
        Err(other) => panic!("unexpected error {other}"),
    }
}

#[test]
fn test_lexical_errors_stop_before_parsing() {
    let diagnostics = errors("let a = 1 @ 2; let s = \"open");
    assert_eq!(diagnostics.len(), 2);
    assert!(diagnostics
        .iter()
        .all(|d| d.kind == DiagnosticKind::Lexical && d.severity == Severity::Error));
}

#[test]
fn test_syntax_checks() {
    let diagnostics = errors(
        "
        break;
        fn f() { continue; }
        fn g() { return ...; }
        fn h() { return this; }
        ",
    );
    assert_eq!(diagnostics.len(), 4, "{diagnostics:?}");
    assert!(diagnostics.iter().all(|d| d.kind == DiagnosticKind::Semantic));
}

#[test]
fn test_multiple_errors_are_reported_together() {
    let diagnostics = errors("let a = b; let a = 2; const c = 1; c = 3;");
    assert!(diagnostics.len() >= 3, "{diagnostics:?}");
    let lines: Vec<u32> = diagnostics.iter().map(|d| d.span.line).collect();
    assert!(lines.iter().all(|line| *line == 1));
}

#[test]
fn test_rendered_diagnostic_points_at_column() {
    let source = "let x = 1;\nprintln(y);";
    let rendered = match ember::compile(source) {
        Err(EmberError::Compile(diagnostics)) => diagnostics.render(source, false),
        other => panic!("unexpected {other:?}"),
    };
    assert!(rendered.contains("2 | println(y);"), "{rendered}");
    assert!(rendered.contains("  |         ^"), "{rendered}");
}

#[test]
fn test_custom_pipeline() {
    // Folding alone leaves `x` unresolved; the compiler reports it.
    let mut passes = AstPassManager::new();
    passes.add_pass(ConstantFold::new());
    let err = compile_with("println(x);", &mut passes).unwrap_err();
    assert!(err.to_string().contains("'x'"), "{err}");

    let mut passes = AstPassManager::new();
    passes.add_pass(SyntaxCheck::new());
    passes.add_pass(TypeCheckAndResolve::new(native_names()));
    assert!(compile_with("println(1 + 2);", &mut passes).is_ok());
}

#[test]
fn test_folded_and_runtime_results_agree() {
    let folded = ember::compile("return 2 * 3 + 10 / 4, 5!, 1 << 3, 2.5 * 2;").unwrap();
    let runtime = ember::compile(
        "let a = 2; let b = 3; let c = 10; let d = 4; let e = 5; let f = 2.5;
         return a * b + c / d, e!, 1 << b, f * a;",
    )
    .unwrap();

    let mut vm = Vm::default();
    let expected = vm.run(folded).unwrap();
    let actual = vm.run(runtime).unwrap();
    assert_eq!(expected, actual);
    assert_eq!(expected[0], Value::I64(8));
}

#[test]
fn test_deep_nesting_is_a_syntax_error() {
    let nested = |depth: usize| format!("let x = {}1{};", "[".repeat(depth), "]".repeat(depth));

    assert!(ember::compile(&nested(80)).is_ok());

    let diagnostics = errors(&nested(5000));
    assert!(diagnostics
        .iter()
        .all(|d| d.kind == DiagnosticKind::Syntax && d.severity == Severity::Error));
    assert!(diagnostics[0].message.contains("nested too deeply"), "{diagnostics:?}");
}

#[test]
fn test_long_operator_chains_are_limited() {
    let chain = |terms: usize| format!("return {};", vec!["1"; terms].join(" + "));
    assert_eq!(Vm::default().interpret(&chain(50)).unwrap(), vec![Value::I64(50)]);

    let diagnostics = errors(&chain(5000));
    assert!(diagnostics[0].message.contains("nested too deeply"));

    let prefix = format!("return {}true;", "!".repeat(5000));
    assert!(errors(&prefix)[0].message.contains("nested too deeply"));
}

#[test]
fn test_folded_truthiness_matches_runtime() {
    for literal in ["0", "0.0", "\"\"", "'a'", "null", "false", "true"] {
        let folded = format!("return {literal} ? 1 : 2, !{literal}, {literal} && 3, {literal} || 4;");
        let runtime = format!("let v = {literal}; return v ? 1 : 2, !v, v && 3, v || 4;");

        let mut vm = Vm::default();
        let expected = vm.interpret(&folded).unwrap();
        let actual = vm.interpret(&runtime).unwrap();
        let shown = |values: &[Value], vm: &Vm| values.iter().map(|v| vm.display(v)).collect::<Vec<_>>();
        assert_eq!(shown(&expected, &vm), shown(&actual, &vm), "{literal}");
    }
}
