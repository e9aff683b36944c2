//! Context rules the grammar alone does not enforce.
use super::{walk_expr, walk_fn, walk_stmt, AstPass};
use crate::{
    ast::{Expr, FnDecl, InfixOp, Stmt},
    error::{Diagnostic, DiagnosticKind},
    lex::Span,
};

/// Checks that statements and expressions appear where they are allowed.
///
/// - `break` and `continue` inside a loop of the current function.
/// - `...` inside a variadic function.
/// - `this` and `base` inside a class method.
/// - `ref` of a variable or element.
/// - `++` and `--` of a variable.
/// - assignment to a variable, element or member.
/// - only declarations in a module body.
#[derive(Default)]
pub struct SyntaxCheck {
    loop_depth: usize,
    /// Whether each enclosing function is variadic, innermost last.
    variadic: Vec<bool>,
    class_depth: usize,
    /// Set while walking the members of a class.
    in_class_body: bool,
    diagnostics: Vec<Diagnostic>,
}

impl SyntaxCheck {
    pub fn new() -> Self {
        Self::default()
    }

    fn error(&mut self, span: Span, message: impl ToString) {
        self.diagnostics
            .push(Diagnostic::error(DiagnosticKind::Semantic, span, message));
    }
}

impl AstPass for SyntaxCheck {
    fn name(&self) -> &'static str {
        "syntax_check"
    }

    fn pass_stmt(&mut self, stmt: Stmt) -> Stmt {
        match stmt {
            Stmt::Break(span) | Stmt::Continue(span) if self.loop_depth == 0 => {
                let keyword = if matches!(stmt, Stmt::Break(_)) {
                    "break"
                } else {
                    "continue"
                };
                self.error(span, format!("'{keyword}' outside of a loop"));
                stmt
            }
            Stmt::While { .. } => {
                self.loop_depth += 1;
                let stmt = walk_stmt(self, stmt);
                self.loop_depth -= 1;
                stmt
            }
            Stmt::Module { ref body, .. } => {
                for member in body {
                    if member.declared_name().is_none() {
                        self.error(member.span(), "module body may only contain declarations");
                    }
                }
                walk_stmt(self, stmt)
            }
            Stmt::Class(_) => {
                let outer = std::mem::replace(&mut self.in_class_body, true);
                let stmt = walk_stmt(self, stmt);
                self.in_class_body = outer;
                stmt
            }
            _ => walk_stmt(self, stmt),
        }
    }

    fn pass_fn(&mut self, decl: FnDecl) -> FnDecl {
        let method = std::mem::replace(&mut self.in_class_body, false);
        let loop_depth = std::mem::take(&mut self.loop_depth);
        self.variadic.push(decl.varargs.is_variadic());
        if method {
            self.class_depth += 1;
        }

        let decl = walk_fn(self, decl);

        if method {
            self.class_depth -= 1;
        }
        self.variadic.pop();
        self.loop_depth = loop_depth;
        self.in_class_body = method;
        decl
    }

    fn pass_expr(&mut self, expr: Expr) -> Expr {
        match &expr {
            Expr::VarArg(span) if !self.variadic.last().copied().unwrap_or(false) => {
                self.error(*span, "'...' is only allowed in a variadic function");
            }
            Expr::This(span) if self.class_depth == 0 => {
                self.error(*span, "'this' is only allowed inside a method");
            }
            Expr::Base { span, .. } if self.class_depth == 0 => {
                self.error(*span, "'base' is only allowed inside a method");
            }
            Expr::Ref(inner, span)
                if !matches!(inner.as_ref(), Expr::Ident(..) | Expr::Index { .. }) =>
            {
                self.error(*span, "'ref' expects a variable or an element");
            }
            Expr::Postfix { op, expr: target, span } if !matches!(target.as_ref(), Expr::Ident(..)) => {
                self.error(*span, format!("'{op}' expects a variable"));
            }
            Expr::Infix {
                op: InfixOp::Assign,
                lhs: target,
                span,
                ..
            }
            | Expr::CompoundAssign { target, span, .. }
                if !target.is_place() =>
            {
                self.error(*span, "invalid assignment target");
            }
            _ => {}
        }
        walk_expr(self, expr)
    }

    fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }
}
