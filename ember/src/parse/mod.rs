//! Recursive descent parser.
mod expr;
mod stmt;

use crate::{
    ast::Stmt,
    error::{Diagnostic, DiagnosticKind, Diagnostics},
    lex::{Keyword, Span, Token, TokenKind, TokenStream},
};

pub type ParseResult<T> = Result<T, Diagnostic>;

pub trait Parse: Sized {
    fn parse(input: &mut TokenStream) -> ParseResult<Self>;
}

/// Parse a token list into the implicit top-level scope.
///
/// Syntax errors are collected. After each one the parser skips to the
/// next statement boundary and carries on, unless the error was caused
/// by running out of input.
pub fn parse(tokens: Vec<Token>, source: &str) -> Result<Stmt, Diagnostics> {
    let mut input = TokenStream::new(tokens, source);
    let mut diagnostics = Diagnostics::new();
    let mut body = Vec::new();

    while !input.at_end() {
        input.reset_nesting();
        match Stmt::parse(&mut input) {
            Ok(stmt) => body.push(stmt),
            Err(diagnostic) => {
                let at_end = input.at_end();
                diagnostics.push(diagnostic);
                if at_end {
                    break;
                }
                synchronize(&mut input);
            }
        }
    }

    if diagnostics.has_errors() {
        return Err(diagnostics);
    }

    let span = match (body.first(), body.last()) {
        (Some(first), Some(last)) => first.span().merge(&last.span()),
        _ => Span::default(),
    };
    Ok(Stmt::Scope { body, span })
}

/// Skip tokens up to the start of the next statement.
fn synchronize(input: &mut TokenStream) {
    // Always make progress, the offending token may itself start a statement.
    let first = input.next_token();
    if first.kind == TokenKind::Semicolon {
        return;
    }

    while !input.at_end() {
        match input.peek_kind() {
            TokenKind::Semicolon => {
                input.next_token();
                return;
            }
            TokenKind::RightBrace => {
                input.next_token();
                return;
            }
            TokenKind::Keyword(keyword) if keyword.starts_statement() => return,
            _ => {
                input.next_token();
            }
        }
    }
}

/// Syntax error at the given token.
pub(crate) fn unexpected(token: &Token, expected: &str) -> Diagnostic {
    Diagnostic::error(
        DiagnosticKind::Syntax,
        token.span,
        format!("expected {expected}, found {}", token.kind),
    )
}

/// Span from the start token to the last consumed token.
pub(crate) fn span_from(input: &TokenStream, start: Span) -> Span {
    match input.previous_token() {
        Some(prev) => start.merge(&prev.span),
        None => start,
    }
}

pub(crate) fn consume_ident(input: &mut TokenStream) -> ParseResult<Token> {
    input.consume(TokenKind::Ident)
}

pub(crate) fn is_keyword(token: &Token, keyword: Keyword) -> bool {
    token.kind == TokenKind::Keyword(keyword)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        ast::{Expr, InfixOp},
        chunk::Constant,
        lex::tokenize,
        value::BinaryOp,
    };

    fn parse_source(source: &str) -> Result<Stmt, Diagnostics> {
        let (tokens, lex_errors) = tokenize(source);
        assert!(lex_errors.is_empty());
        parse(tokens, source)
    }

    fn top_level(source: &str) -> Vec<Stmt> {
        match parse_source(source) {
            Ok(Stmt::Scope { body, .. }) => body,
            other => panic!("unexpected parse result: {other:?}"),
        }
    }

    #[test]
    fn test_precedence() {
        let body = top_level("1 + 2 * 3;");
        let Stmt::Expr(Expr::Infix { op, rhs, .. }) = &body[0] else {
            panic!("expected infix expression");
        };
        assert_eq!(*op, InfixOp::Binary(BinaryOp::Add));
        assert!(matches!(
            rhs.as_ref(),
            Expr::Infix {
                op: InfixOp::Binary(BinaryOp::Mul),
                ..
            }
        ));
    }

    #[test]
    fn test_assignment_is_right_associative() {
        let body = top_level("a = b = 1;");
        let Stmt::Expr(Expr::Infix { op: InfixOp::Assign, rhs, .. }) = &body[0] else {
            panic!("expected assignment");
        };
        assert!(matches!(rhs.as_ref(), Expr::Infix { op: InfixOp::Assign, .. }));
    }

    #[test]
    fn test_postfix_chain() {
        let body = top_level("a.b[1](2)!;");
        let Stmt::Expr(Expr::Factorial(call, _)) = &body[0] else {
            panic!("expected factorial");
        };
        let Expr::Call { callee, args, .. } = call.as_ref() else {
            panic!("expected call");
        };
        assert_eq!(args.len(), 1);
        assert!(matches!(callee.as_ref(), Expr::Index { .. }));
    }

    #[test]
    fn test_multiple_return_values() {
        let body = top_level("fn f() { return 1, 2; }");
        let Stmt::Function(decl) = &body[0] else {
            panic!("expected function");
        };
        assert!(matches!(
            &decl.body[0],
            Stmt::Return {
                value: Some(Expr::Aggregate(values, _)),
                ..
            } if values.len() == 2
        ));
    }

    #[test]
    fn test_integer_literal_widths() {
        let body = top_level("0x7f; 18446744073709551615;");
        assert!(matches!(&body[0], Stmt::Expr(Expr::Literal(Constant::I64(127), _))));
        assert!(matches!(&body[1], Stmt::Expr(Expr::Literal(Constant::U64(u64::MAX), _))));
    }

    #[test]
    fn test_recovers_to_report_multiple_errors() {
        let diagnostics = parse_source("let = 1;\nlet b = 2;\nlet c = ;\n").unwrap_err();
        assert_eq!(diagnostics.error_count(), 2);
        let lines: Vec<u32> = diagnostics.iter().map(|d| d.span.line).collect();
        assert_eq!(lines, vec![1, 3]);
    }

    #[test]
    fn test_unexpected_end_aborts() {
        let diagnostics = parse_source("fn f() { let a = 1;").unwrap_err();
        assert_eq!(diagnostics.error_count(), 1);
    }

    #[test]
    fn test_class_and_module() {
        let body = top_level(
            "class C : A, B { let x = 1; fn get() { return this.x; } enum E { P, Q } }
             module M { fn f() { return 1; } }",
        );
        let Stmt::Class(class) = &body[0] else {
            panic!("expected class");
        };
        assert_eq!(class.parents.len(), 2);
        assert_eq!(class.members.len(), 3);
        assert!(matches!(&body[1], Stmt::Module { name, .. } if name == "M"));
    }
}
