//! Expression parsing by precedence climbing.
use smol_str::SmolStr;

use super::{consume_ident, span_from, stmt::parse_fn_rest, unexpected, Parse, ParseResult};
use crate::{
    ast::{Expr, InfixOp, PostfixOp, PrefixOp},
    chunk::Constant,
    error::{Diagnostic, DiagnosticKind},
    lex::{unescape, Keyword, Span, Token, TokenKind, TokenStream},
    value::BinaryOp,
};

/// Name given to anonymous function literals.
const LAMBDA_NAME: &str = "lambda";

impl Parse for Expr {
    fn parse(input: &mut TokenStream) -> ParseResult<Self> {
        parse_assignment(input)
    }
}

/// Binding power of a binary operator token. Higher binds tighter.
#[rustfmt::skip]
fn binary_precedence(kind: TokenKind) -> Option<(u8, InfixOp)> {
    use TokenKind as T;
    use BinaryOp as B;

    Some(match kind {
        T::PipePipe       => (1, InfixOp::Or),
        T::AmpAmp         => (2, InfixOp::And),
        T::Pipe           => (3, InfixOp::Binary(B::BitOr)),
        T::Caret          => (4, InfixOp::Binary(B::BitXor)),
        T::Amp            => (5, InfixOp::Binary(B::BitAnd)),
        T::EqEq           => (6, InfixOp::Binary(B::Eq)),
        T::BangEq         => (6, InfixOp::Binary(B::Ne)),
        T::Less           => (7, InfixOp::Binary(B::Lt)),
        T::LessEq         => (7, InfixOp::Binary(B::Le)),
        T::Greater        => (7, InfixOp::Binary(B::Gt)),
        T::GreaterEq      => (7, InfixOp::Binary(B::Ge)),
        T::LessLess       => (8, InfixOp::Binary(B::Shl)),
        T::GreaterGreater => (8, InfixOp::Binary(B::Shr)),
        T::Plus           => (9, InfixOp::Binary(B::Add)),
        T::Minus          => (9, InfixOp::Binary(B::Sub)),
        T::Star           => (10, InfixOp::Binary(B::Mul)),
        T::Slash          => (10, InfixOp::Binary(B::Div)),
        T::Percent        => (10, InfixOp::Binary(B::Rem)),
        _ => return None,
    })
}

#[rustfmt::skip]
fn compound_operator(kind: TokenKind) -> Option<BinaryOp> {
    use TokenKind as T;
    use BinaryOp as B;

    Some(match kind {
        T::PlusEq           => B::Add,
        T::MinusEq          => B::Sub,
        T::StarEq           => B::Mul,
        T::SlashEq          => B::Div,
        T::PercentEq        => B::Rem,
        T::AmpEq            => B::BitAnd,
        T::PipeEq           => B::BitOr,
        T::CaretEq          => B::BitXor,
        T::LessLessEq       => B::Shl,
        T::GreaterGreaterEq => B::Shr,
        _ => return None,
    })
}

fn parse_assignment(input: &mut TokenStream) -> ParseResult<Expr> {
    input.nested(parse_assignment_rest)
}

/// Assignment is right associative: `a = b = c` is `a = (b = c)`.
fn parse_assignment_rest(input: &mut TokenStream) -> ParseResult<Expr> {
    let target = parse_conditional(input)?;

    let kind = input.peek_kind();
    if kind == TokenKind::Eq {
        input.next_token();
        let value = parse_assignment(input)?;
        let span = target.span().merge(&value.span());
        return Ok(Expr::Infix {
            op: InfixOp::Assign,
            lhs: Box::new(target),
            rhs: Box::new(value),
            span,
        });
    }

    if let Some(op) = compound_operator(kind) {
        input.next_token();
        let value = parse_assignment(input)?;
        let span = target.span().merge(&value.span());
        return Ok(Expr::CompoundAssign {
            op,
            target: Box::new(target),
            value: Box::new(value),
            span,
        });
    }

    Ok(target)
}

/// `cond ? then : otherwise`
fn parse_conditional(input: &mut TokenStream) -> ParseResult<Expr> {
    let cond = parse_binary(input, 1)?;
    if !input.match_token(TokenKind::Question) {
        return Ok(cond);
    }

    let then = parse_assignment(input)?;
    input.consume(TokenKind::Colon)?;
    let otherwise = input.nested(parse_conditional)?;
    let span = cond.span().merge(&otherwise.span());

    Ok(Expr::Conditional {
        cond: Box::new(cond),
        then: Box::new(then),
        otherwise: Box::new(otherwise),
        span,
    })
}

fn parse_binary(input: &mut TokenStream, min_precedence: u8) -> ParseResult<Expr> {
    let mut lhs = parse_unary(input)?;
    // Each fold deepens the left operand.
    let mut levels = 0;

    while let Some((precedence, op)) = binary_precedence(input.peek_kind()) {
        if precedence < min_precedence {
            break;
        }
        input.enter_nested()?;
        levels += 1;
        input.next_token();

        // Left associative, the right operand only takes tighter operators.
        let rhs = parse_binary(input, precedence + 1)?;
        let span = lhs.span().merge(&rhs.span());
        lhs = Expr::Infix {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            span,
        };
    }

    input.leave_nested(levels);
    Ok(lhs)
}

fn parse_unary(input: &mut TokenStream) -> ParseResult<Expr> {
    let op = match input.peek_kind() {
        TokenKind::Minus => PrefixOp::Neg,
        TokenKind::Bang => PrefixOp::Not,
        TokenKind::Tilde => PrefixOp::BitNot,
        TokenKind::Keyword(Keyword::Ref) => {
            let token = input.next_token();
            let expr = input.nested(parse_unary)?;
            let span = token.span.merge(&expr.span());
            return Ok(Expr::Ref(Box::new(expr), span));
        }
        _ => return parse_postfix(input),
    };

    let token = input.next_token();
    let expr = input.nested(parse_unary)?;
    let span = token.span.merge(&expr.span());
    Ok(Expr::Prefix {
        op,
        expr: Box::new(expr),
        span,
    })
}

fn parse_postfix(input: &mut TokenStream) -> ParseResult<Expr> {
    let mut expr = parse_primary(input)?;
    let mut levels = 0;

    loop {
        let start = expr.span();
        let kind = input.peek_kind();
        if matches!(
            kind,
            TokenKind::LeftParen
                | TokenKind::LeftBracket
                | TokenKind::Dot
                | TokenKind::Bang
                | TokenKind::PlusPlus
                | TokenKind::MinusMinus
        ) {
            input.enter_nested()?;
            levels += 1;
        }
        expr = match kind {
            TokenKind::LeftParen => {
                input.next_token();
                let args = parse_list(input, TokenKind::RightParen)?;
                Expr::Call {
                    callee: Box::new(expr),
                    args,
                    span: span_from(input, start),
                }
            }
            TokenKind::LeftBracket => {
                input.next_token();
                let index = Expr::parse(input)?;
                input.consume(TokenKind::RightBracket)?;
                Expr::Index {
                    expr: Box::new(expr),
                    index: Box::new(index),
                    span: span_from(input, start),
                }
            }
            TokenKind::Dot => {
                input.next_token();
                let name = consume_ident(input)?;
                Expr::Dot {
                    expr: Box::new(expr),
                    name: SmolStr::new(input.span_fragment(&name.span)),
                    span: span_from(input, start),
                }
            }
            TokenKind::Bang => {
                input.next_token();
                Expr::Factorial(Box::new(expr), span_from(input, start))
            }
            TokenKind::PlusPlus | TokenKind::MinusMinus => {
                let token = input.next_token();
                let op = if token.kind == TokenKind::PlusPlus {
                    PostfixOp::Inc
                } else {
                    PostfixOp::Dec
                };
                Expr::Postfix {
                    op,
                    expr: Box::new(expr),
                    span: span_from(input, start),
                }
            }
            _ => {
                input.leave_nested(levels);
                return Ok(expr);
            }
        };
    }
}

/// Comma separated expressions up to the closing token, which is consumed.
/// A trailing comma is allowed.
fn parse_list(input: &mut TokenStream, close: TokenKind) -> ParseResult<Vec<Expr>> {
    let mut items = Vec::new();
    while input.peek_kind() != close {
        items.push(Expr::parse(input)?);
        if !input.match_token(TokenKind::Comma) {
            break;
        }
    }
    input.consume(close)?;
    Ok(items)
}

fn parse_primary(input: &mut TokenStream) -> ParseResult<Expr> {
    use Keyword as K;
    use TokenKind as T;

    let token = input.peek().clone();
    let literal = |constant: Constant| -> ParseResult<Expr> { Ok(Expr::Literal(constant, token.span)) };

    match token.kind {
        T::Int => {
            input.next_token();
            parse_int(input.span_fragment(&token.span), token.span).and_then(literal)
        }
        T::Float => {
            input.next_token();
            let text = input.span_fragment(&token.span);
            match text.parse::<f64>() {
                Ok(value) => literal(Constant::F64(value)),
                Err(err) => Err(Diagnostic::error(
                    DiagnosticKind::Syntax,
                    token.span,
                    format!("invalid float literal: {err}"),
                )),
            }
        }
        T::Str => {
            input.next_token();
            let text = unescape(input.span_fragment(&token.span));
            literal(Constant::Str(SmolStr::new(text)))
        }
        T::Char => {
            input.next_token();
            let text = unescape(input.span_fragment(&token.span));
            literal(Constant::Char(text.chars().next().unwrap_or_default()))
        }
        T::Keyword(K::True) => {
            input.next_token();
            literal(Constant::Bool(true))
        }
        T::Keyword(K::False) => {
            input.next_token();
            literal(Constant::Bool(false))
        }
        T::Keyword(K::Null) => {
            input.next_token();
            literal(Constant::Null)
        }
        T::Ident => {
            input.next_token();
            Ok(Expr::Ident(
                SmolStr::new(input.span_fragment(&token.span)),
                token.span,
            ))
        }
        T::LeftParen => {
            input.next_token();
            let expr = Expr::parse(input)?;
            input.consume(T::RightParen)?;
            Ok(Expr::Group(Box::new(expr), span_from(input, token.span)))
        }
        T::LeftBracket => {
            input.next_token();
            let items = parse_list(input, T::RightBracket)?;
            Ok(Expr::Array(items, span_from(input, token.span)))
        }
        T::LeftBrace => parse_dict(input, &token),
        T::Keyword(K::Struct) => parse_struct(input, &token),
        T::Keyword(K::Fn) => {
            input.next_token();
            parse_fn_rest(input, SmolStr::new(LAMBDA_NAME), token.span)
                .map(|decl| Expr::Lambda(Box::new(decl)))
        }
        T::Keyword(K::New) => parse_new(input, &token),
        T::Keyword(K::This) => {
            input.next_token();
            Ok(Expr::This(token.span))
        }
        T::Keyword(K::Base) => {
            input.next_token();
            input.consume(T::Dot)?;
            let name = consume_ident(input)?;
            Ok(Expr::Base {
                name: SmolStr::new(input.span_fragment(&name.span)),
                span: span_from(input, token.span),
            })
        }
        T::Ellipsis => {
            input.next_token();
            Ok(Expr::VarArg(token.span))
        }
        _ => Err(unexpected(&token, "expression")),
    }
}

/// Integer literals are `i64` when they fit, otherwise `u64`.
fn parse_int(text: &str, span: Span) -> ParseResult<Constant> {
    let (digits, radix) = if let Some(hex) = text.strip_prefix("0x") {
        (hex, 16)
    } else if let Some(bin) = text.strip_prefix("0b") {
        (bin, 2)
    } else {
        (text, 10)
    };

    match u64::from_str_radix(digits, radix) {
        Ok(value) => Ok(match i64::try_from(value) {
            Ok(value) => Constant::I64(value),
            Err(_) => Constant::U64(value),
        }),
        Err(_) => Err(Diagnostic::error(
            DiagnosticKind::Syntax,
            span,
            format!("integer literal '{text}' is too large"),
        )),
    }
}

/// `{ key: value, ... }`
fn parse_dict(input: &mut TokenStream, start: &Token) -> ParseResult<Expr> {
    input.consume(TokenKind::LeftBrace)?;
    let mut entries = Vec::new();
    while input.peek_kind() != TokenKind::RightBrace {
        let key = Expr::parse(input)?;
        input.consume(TokenKind::Colon)?;
        let value = Expr::parse(input)?;
        entries.push((key, value));
        if !input.match_token(TokenKind::Comma) {
            break;
        }
    }
    input.consume(TokenKind::RightBrace)?;
    Ok(Expr::Dict(entries, span_from(input, start.span)))
}

/// `struct { name: value, ... }`
fn parse_struct(input: &mut TokenStream, start: &Token) -> ParseResult<Expr> {
    input.next_token();
    input.consume(TokenKind::LeftBrace)?;
    let mut members = Vec::new();
    while input.peek_kind() != TokenKind::RightBrace {
        let name = consume_ident(input)?;
        input.consume(TokenKind::Colon)?;
        let value = Expr::parse(input)?;
        members.push((SmolStr::new(input.span_fragment(&name.span)), value));
        if !input.match_token(TokenKind::Comma) {
            break;
        }
    }
    input.consume(TokenKind::RightBrace)?;
    Ok(Expr::Struct(members, span_from(input, start.span)))
}

/// `new Path.To.Class(args)`
fn parse_new(input: &mut TokenStream, start: &Token) -> ParseResult<Expr> {
    input.next_token();

    let name = consume_ident(input)?;
    let mut class = Expr::Ident(SmolStr::new(input.span_fragment(&name.span)), name.span);
    while input.match_token(TokenKind::Dot) {
        let member = consume_ident(input)?;
        class = Expr::Dot {
            span: class.span().merge(&member.span),
            expr: Box::new(class),
            name: SmolStr::new(input.span_fragment(&member.span)),
        };
    }

    input.consume(TokenKind::LeftParen)?;
    let args = parse_list(input, TokenKind::RightParen)?;

    Ok(Expr::New {
        class: Box::new(class),
        args,
        span: span_from(input, start.span),
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::lex::tokenize;

    fn parse_expr(source: &str) -> Expr {
        let (tokens, diagnostics) = tokenize(source);
        assert!(diagnostics.is_empty());
        let mut input = TokenStream::new(tokens, source);
        let expr = Expr::parse(&mut input).unwrap();
        assert!(input.at_end(), "trailing input in {source:?}");
        expr
    }

    #[test]
    fn test_conditional_binds_below_or() {
        let expr = parse_expr("a || b ? 1 : c ? 2 : 3");
        let Expr::Conditional { cond, otherwise, .. } = expr else {
            panic!("expected conditional");
        };
        assert!(matches!(*cond, Expr::Infix { op: InfixOp::Or, .. }));
        assert!(matches!(*otherwise, Expr::Conditional { .. }));
    }

    #[test]
    fn test_subtraction_is_left_associative() {
        let expr = parse_expr("8 - 4 - 2");
        let Expr::Infix { lhs, rhs, .. } = expr else {
            panic!("expected infix");
        };
        assert!(matches!(*lhs, Expr::Infix { .. }));
        assert!(matches!(*rhs, Expr::Literal(Constant::I64(2), _)));
    }

    #[test]
    fn test_compound_assignment() {
        let expr = parse_expr("a[0] <<= 2");
        assert!(matches!(
            expr,
            Expr::CompoundAssign { op: BinaryOp::Shl, target, .. } if matches!(*target, Expr::Index { .. })
        ));
    }

    #[test]
    fn test_literals() {
        assert!(matches!(parse_expr("0b101"), Expr::Literal(Constant::I64(5), _)));
        assert!(matches!(parse_expr("2e3"), Expr::Literal(Constant::F64(v), _) if v == 2000.0));
        assert!(matches!(parse_expr(r"'\n'"), Expr::Literal(Constant::Char('\n'), _)));
        assert!(
            matches!(parse_expr(r#""a\tb""#), Expr::Literal(Constant::Str(s), _) if s == "a\tb")
        );
    }

    #[test]
    fn test_composite_literals() {
        assert!(matches!(parse_expr("[1, 2, 3,]"), Expr::Array(items, _) if items.len() == 3));
        assert!(matches!(parse_expr("{\"a\": 1, 2: 3}"), Expr::Dict(entries, _) if entries.len() == 2));
        assert!(matches!(parse_expr("{}"), Expr::Dict(entries, _) if entries.is_empty()));
        assert!(
            matches!(parse_expr("struct { x: 1, y: 2 }"), Expr::Struct(members, _) if members[1].0 == "y")
        );
    }

    #[test]
    fn test_new_with_module_path() {
        let expr = parse_expr("new m.Point(1, 2)");
        let Expr::New { class, args, .. } = expr else {
            panic!("expected new");
        };
        assert_eq!(args.len(), 2);
        assert!(matches!(*class, Expr::Dot { ref name, .. } if name == "Point"));
    }

    #[test]
    fn test_lambda_and_prefix() {
        let expr = parse_expr("fn (a, rest...) { return a; }");
        let Expr::Lambda(decl) = expr else {
            panic!("expected lambda");
        };
        assert_eq!(decl.params.len(), 1);
        assert_eq!(decl.rest.as_deref(), Some("rest"));

        assert!(matches!(parse_expr("-x++"), Expr::Prefix { op: PrefixOp::Neg, expr, .. } if matches!(*expr, Expr::Postfix { .. })));
        assert!(matches!(parse_expr("ref a[1]"), Expr::Ref(inner, _) if matches!(*inner, Expr::Index { .. })));
    }

    #[test]
    fn test_rest_parameter_must_be_last() {
        let source = "fn (a..., b) {}";
        let (tokens, _) = tokenize(source);
        let mut input = TokenStream::new(tokens, source);
        let err = Expr::parse(&mut input).unwrap_err();
        assert_eq!(err.kind, DiagnosticKind::Syntax);
        assert!(err.message.contains("rest parameter"));
    }

    #[test]
    fn test_integer_overflow_is_reported() {
        let source = "99999999999999999999";
        let (tokens, _) = tokenize(source);
        let mut input = TokenStream::new(tokens, source);
        assert!(Expr::parse(&mut input).is_err());
    }
}
