//! Rewriting passes over the syntax tree.
//!
//! A pass takes ownership of a node and returns its replacement. The
//! default methods rebuild the node from its rewritten children, so a
//! pass only overrides the nodes it cares about.
mod constant_fold;
mod syntax_check;
mod type_check;

pub use self::{
    constant_fold::ConstantFold, syntax_check::SyntaxCheck, type_check::TypeCheckAndResolve,
};

use crate::{
    ast::{ClassDecl, EnumDecl, EnumItem, Expr, FnDecl, Stmt},
    error::{Diagnostic, Diagnostics},
};

pub trait AstPass {
    fn name(&self) -> &'static str;

    fn pass_stmt(&mut self, stmt: Stmt) -> Stmt {
        walk_stmt(self, stmt)
    }

    fn pass_expr(&mut self, expr: Expr) -> Expr {
        walk_expr(self, expr)
    }

    /// Function declarations, lambdas and methods.
    fn pass_fn(&mut self, decl: FnDecl) -> FnDecl {
        walk_fn(self, decl)
    }

    /// Diagnostics reported since the last call.
    fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        Vec::new()
    }
}

pub fn walk_stmts<P: AstPass + ?Sized>(pass: &mut P, stmts: Vec<Stmt>) -> Vec<Stmt> {
    stmts.into_iter().map(|s| pass.pass_stmt(s)).collect()
}

pub fn walk_stmt<P: AstPass + ?Sized>(pass: &mut P, stmt: Stmt) -> Stmt {
    match stmt {
        Stmt::Let {
            desc,
            value,
            constant,
            span,
        } => Stmt::Let {
            desc,
            value: value.map(|v| pass.pass_expr(v)),
            constant,
            span,
        },
        Stmt::Function(decl) => Stmt::Function(Box::new(pass.pass_fn(*decl))),
        Stmt::Module { name, body, span } => Stmt::Module {
            name,
            body: walk_stmts(pass, body),
            span,
        },
        Stmt::Enum(decl) => Stmt::Enum(walk_enum(pass, decl)),
        Stmt::Class(decl) => Stmt::Class(Box::new(walk_class(pass, *decl))),
        Stmt::Expr(expr) => Stmt::Expr(pass.pass_expr(expr)),
        Stmt::Return { value, span } => Stmt::Return {
            value: value.map(|v| pass.pass_expr(v)),
            span,
        },
        Stmt::If {
            cond,
            then,
            otherwise,
            span,
        } => Stmt::If {
            cond: pass.pass_expr(cond),
            then: Box::new(pass.pass_stmt(*then)),
            otherwise: otherwise.map(|s| Box::new(pass.pass_stmt(*s))),
            span,
        },
        Stmt::Scope { body, span } => Stmt::Scope {
            body: walk_stmts(pass, body),
            span,
        },
        Stmt::While { cond, body, span } => Stmt::While {
            cond: pass.pass_expr(cond),
            body: Box::new(pass.pass_stmt(*body)),
            span,
        },
        Stmt::Break(_) | Stmt::Continue(_) => stmt,
    }
}

pub fn walk_fn<P: AstPass + ?Sized>(pass: &mut P, decl: FnDecl) -> FnDecl {
    FnDecl {
        body: walk_stmts(pass, decl.body),
        ..decl
    }
}

pub fn walk_enum<P: AstPass + ?Sized>(pass: &mut P, decl: EnumDecl) -> EnumDecl {
    EnumDecl {
        items: decl
            .items
            .into_iter()
            .map(|item| EnumItem {
                value: item.value.map(|v| pass.pass_expr(v)),
                ..item
            })
            .collect(),
        ..decl
    }
}

pub fn walk_class<P: AstPass + ?Sized>(pass: &mut P, decl: ClassDecl) -> ClassDecl {
    ClassDecl {
        members: walk_stmts(pass, decl.members),
        ..decl
    }
}

pub fn walk_expr<P: AstPass + ?Sized>(pass: &mut P, expr: Expr) -> Expr {
    let mut boxed = |e: Box<Expr>| Box::new(pass.pass_expr(*e));

    match expr {
        Expr::Literal(..) | Expr::Ident(..) | Expr::VarArg(_) | Expr::This(_) | Expr::Base { .. } => {
            expr
        }
        Expr::Group(inner, span) => Expr::Group(boxed(inner), span),
        Expr::Ref(inner, span) => Expr::Ref(boxed(inner), span),
        Expr::Factorial(inner, span) => Expr::Factorial(boxed(inner), span),
        Expr::Prefix { op, expr, span } => Expr::Prefix {
            op,
            expr: boxed(expr),
            span,
        },
        Expr::Postfix { op, expr, span } => Expr::Postfix {
            op,
            expr: boxed(expr),
            span,
        },
        Expr::Infix { op, lhs, rhs, span } => {
            let lhs = boxed(lhs);
            let rhs = boxed(rhs);
            Expr::Infix { op, lhs, rhs, span }
        }
        Expr::Conditional {
            cond,
            then,
            otherwise,
            span,
        } => {
            let cond = boxed(cond);
            let then = boxed(then);
            let otherwise = boxed(otherwise);
            Expr::Conditional {
                cond,
                then,
                otherwise,
                span,
            }
        }
        Expr::Index { expr, index, span } => {
            let expr = boxed(expr);
            let index = boxed(index);
            Expr::Index { expr, index, span }
        }
        Expr::CompoundAssign {
            op,
            target,
            value,
            span,
        } => {
            let target = boxed(target);
            let value = boxed(value);
            Expr::CompoundAssign {
                op,
                target,
                value,
                span,
            }
        }
        Expr::Dot { expr, name, span } => Expr::Dot {
            expr: boxed(expr),
            name,
            span,
        },
        Expr::Array(items, span) => {
            Expr::Array(items.into_iter().map(|e| pass.pass_expr(e)).collect(), span)
        }
        Expr::Aggregate(items, span) => {
            Expr::Aggregate(items.into_iter().map(|e| pass.pass_expr(e)).collect(), span)
        }
        Expr::Dict(entries, span) => Expr::Dict(
            entries
                .into_iter()
                .map(|(k, v)| (pass.pass_expr(k), pass.pass_expr(v)))
                .collect(),
            span,
        ),
        Expr::Struct(members, span) => Expr::Struct(
            members
                .into_iter()
                .map(|(n, v)| (n, pass.pass_expr(v)))
                .collect(),
            span,
        ),
        Expr::Lambda(decl) => Expr::Lambda(Box::new(pass.pass_fn(*decl))),
        Expr::Call { callee, args, span } => Expr::Call {
            callee: Box::new(pass.pass_expr(*callee)),
            args: args.into_iter().map(|e| pass.pass_expr(e)).collect(),
            span,
        },
        Expr::New { class, args, span } => Expr::New {
            class: Box::new(pass.pass_expr(*class)),
            args: args.into_iter().map(|e| pass.pass_expr(e)).collect(),
            span,
        },
    }
}

/// Runs passes in order, each over the output of the previous one.
#[derive(Default)]
pub struct AstPassManager {
    passes: Vec<Box<dyn AstPass>>,
}

impl AstPassManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard pipeline: syntax checks, folding, then resolution.
    ///
    /// `globals` are names defined by the host, visible everywhere.
    pub fn with_default_passes<'a>(globals: impl IntoIterator<Item = &'a str>) -> Self {
        let mut manager = Self::new();
        manager.add_pass(SyntaxCheck::new());
        manager.add_pass(ConstantFold::new());
        manager.add_pass(TypeCheckAndResolve::new(globals));
        manager
    }

    pub fn add_pass(&mut self, pass: impl AstPass + 'static) {
        self.passes.push(Box::new(pass));
    }

    /// Run every pass over the tree.
    ///
    /// On success the rewritten tree is returned along with any warnings.
    /// When any pass reported an error, all diagnostics are returned.
    pub fn run(&mut self, mut root: Stmt) -> Result<(Stmt, Diagnostics), Diagnostics> {
        let mut diagnostics = Diagnostics::new();

        for pass in self.passes.iter_mut() {
            log::trace!("running pass {}", pass.name());
            root = pass.pass_stmt(root);

            let reported = pass.take_diagnostics();
            log::trace!("pass {} reported {} diagnostics", pass.name(), reported.len());
            diagnostics.extend(reported);
        }

        if diagnostics.has_errors() {
            Err(diagnostics)
        } else {
            Ok((root, diagnostics))
        }
    }
}
