//! Evaluate operators over literal operands at compile time.
use smol_str::SmolStr;

use super::{walk_expr, AstPass};
use crate::{
    ast::{Expr, InfixOp, PrefixOp},
    chunk::Constant,
    value::{binary_op, unary_op, BinaryOp, UnaryOp, Value},
};

/// Folds operators whose operands are literals.
///
/// Folding goes through the same primitive routines the VM executes, so
/// a folded expression always has the value the VM would compute.
/// Anything that would fail at runtime is left in place for the VM to
/// report.
#[derive(Default)]
pub struct ConstantFold;

impl ConstantFold {
    pub fn new() -> Self {
        Self
    }
}

impl AstPass for ConstantFold {
    fn name(&self) -> &'static str {
        "constant_fold"
    }

    fn pass_expr(&mut self, expr: Expr) -> Expr {
        // Children first, so folds cascade upwards.
        match walk_expr(self, expr) {
            Expr::Group(inner, span) => match *inner {
                Expr::Literal(constant, _) => Expr::Literal(constant, span),
                inner => Expr::Group(Box::new(inner), span),
            },
            Expr::Prefix { op, expr, span } => {
                let unary = match op {
                    PrefixOp::Neg => UnaryOp::Neg,
                    PrefixOp::Not => UnaryOp::Not,
                    PrefixOp::BitNot => UnaryOp::BitNot,
                };
                match fold_unary(unary, &expr) {
                    Some(constant) => Expr::Literal(constant, span),
                    None => Expr::Prefix { op, expr, span },
                }
            }
            Expr::Factorial(expr, span) => match fold_unary(UnaryOp::Factorial, &expr) {
                Some(constant) => Expr::Literal(constant, span),
                None => Expr::Factorial(expr, span),
            },
            Expr::Infix { op, lhs, rhs, span } => match (op, lhs.as_literal().cloned()) {
                // Short circuit only needs the left operand.
                (InfixOp::And, Some(l)) => {
                    if literal_is_falsey(&l) {
                        *lhs
                    } else {
                        *rhs
                    }
                }
                (InfixOp::Or, Some(l)) => {
                    if literal_is_falsey(&l) {
                        *rhs
                    } else {
                        *lhs
                    }
                }
                (InfixOp::Binary(bin), Some(l)) => {
                    match rhs.as_literal().and_then(|r| fold_binary(bin, &l, r)) {
                        Some(constant) => Expr::Literal(constant, span),
                        None => Expr::Infix { op, lhs, rhs, span },
                    }
                }
                _ => Expr::Infix { op, lhs, rhs, span },
            },
            Expr::Conditional {
                cond,
                then,
                otherwise,
                span,
            } => match cond.as_literal() {
                Some(c) if literal_is_falsey(c) => *otherwise,
                Some(_) => *then,
                None => Expr::Conditional {
                    cond,
                    then,
                    otherwise,
                    span,
                },
            },
            other => other,
        }
    }
}

/// Truthiness of a literal. Strings and functions become heap objects
/// at runtime, which are never falsey.
fn literal_is_falsey(constant: &Constant) -> bool {
    Value::from_constant(constant).map_or(false, |value| value.is_falsey())
}

fn fold_unary(op: UnaryOp, expr: &Expr) -> Option<Constant> {
    let constant = expr.as_literal()?;
    if let (UnaryOp::Not, Constant::Str(_)) = (op, constant) {
        return Some(Constant::Bool(literal_is_falsey(constant)));
    }
    let value = Value::from_constant(constant)?;
    unary_op(op, value).ok()?.to_constant()
}

fn fold_binary(op: BinaryOp, lhs: &Constant, rhs: &Constant) -> Option<Constant> {
    match (lhs, rhs) {
        (Constant::Str(_), _) | (_, Constant::Str(_)) => fold_string(op, lhs, rhs),
        _ => {
            let a = Value::from_constant(lhs)?;
            let b = Value::from_constant(rhs)?;
            binary_op(op, a, b).ok()?.to_constant()
        }
    }
}

/// String concatenation and comparison.
///
/// `+` with one string operand concatenates the printed form of the
/// other, the same way the VM does.
fn fold_string(op: BinaryOp, lhs: &Constant, rhs: &Constant) -> Option<Constant> {
    let text = |c: &Constant| -> Option<String> {
        match c {
            Constant::Str(s) => Some(s.to_string()),
            other => Value::from_constant(other).map(|v| v.to_string()),
        }
    };

    match op {
        BinaryOp::Add => {
            let joined = text(lhs)? + &text(rhs)?;
            Some(Constant::Str(SmolStr::from(joined)))
        }
        BinaryOp::Eq => Some(Constant::Bool(lhs == rhs)),
        BinaryOp::Ne => Some(Constant::Bool(lhs != rhs)),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{lex::tokenize, parse::parse, ast::Stmt};

    fn fold(source: &str) -> Expr {
        let (tokens, _) = tokenize(source);
        let root = parse(tokens, source).unwrap();
        let Stmt::Scope { mut body, .. } = ConstantFold::new().pass_stmt(root) else {
            panic!("expected root scope");
        };
        match body.remove(0) {
            Stmt::Expr(expr) => expr,
            other => panic!("expected expression, found {other:?}"),
        }
    }

    #[test]
    fn test_arithmetic_folds() {
        assert_eq!(fold("1 + 2 * 3;").as_literal(), Some(&Constant::I64(7)));
        assert_eq!(fold("(2 + 3) * 2;").as_literal(), Some(&Constant::I64(10)));
        assert_eq!(fold("-(1.5);").as_literal(), Some(&Constant::F64(-1.5)));
        assert_eq!(fold("5!;").as_literal(), Some(&Constant::I64(120)));
        assert_eq!(fold("1 < 2 ? 10 : 20;").as_literal(), Some(&Constant::I64(10)));
    }

    #[test]
    fn test_string_folds() {
        assert_eq!(
            fold(r#""ab" + "cd";"#).as_literal(),
            Some(&Constant::Str("abcd".into()))
        );
        assert_eq!(
            fold(r#""n = " + 1;"#).as_literal(),
            Some(&Constant::Str("n = 1".into()))
        );
        assert_eq!(fold(r#""a" == "a";"#).as_literal(), Some(&Constant::Bool(true)));
    }

    #[test]
    fn test_runtime_errors_are_not_folded() {
        assert!(matches!(fold("1 / 0;"), Expr::Infix { .. }));
        assert!(matches!(fold("-true;"), Expr::Prefix { .. }));
        assert!(matches!(fold("30!;"), Expr::Factorial(..)));
        assert!(matches!(fold("x + 1;"), Expr::Infix { .. }));
    }

    #[test]
    fn test_short_circuit() {
        assert!(matches!(fold("false && x;"), Expr::Literal(Constant::Bool(false), _)));
        assert!(matches!(fold("null || x;"), Expr::Ident(..)));
        assert!(matches!(fold("1 && x;"), Expr::Ident(..)));
    }
}
