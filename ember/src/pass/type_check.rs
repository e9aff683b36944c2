//! Name resolution and literal type checks.
use std::collections::{HashMap, HashSet};

use smol_str::SmolStr;

use super::{walk_enum, walk_expr, walk_stmt, walk_stmts, AstPass};
use crate::{
    ast::{ClassDecl, EnumDecl, EnumItem, Expr, FnDecl, InfixOp, Stmt, Type, TypeKind, VarDesc},
    chunk::Constant,
    error::{Diagnostic, DiagnosticKind},
    lex::Span,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BindingKind {
    Variable,
    Constant,
    Function,
    Class,
    Module,
    Enum,
    Native,
}

#[derive(Debug, Clone, Copy)]
struct Binding {
    kind: BindingKind,
    initialized: bool,
    /// Parameter count and whether surplus arguments are accepted.
    signature: Option<(usize, bool)>,
}

impl Binding {
    fn new(kind: BindingKind) -> Self {
        Self {
            kind,
            initialized: true,
            signature: None,
        }
    }

    /// Binding introduced by a declaration statement.
    fn of(stmt: &Stmt) -> Option<Binding> {
        Some(match stmt {
            Stmt::Let { constant: true, .. } => Binding::new(BindingKind::Constant),
            Stmt::Let { .. } => Binding::new(BindingKind::Variable),
            Stmt::Function(decl) => Binding {
                signature: Some((decl.params.len(), decl.varargs.is_variadic())),
                ..Binding::new(BindingKind::Function)
            },
            Stmt::Module { .. } => Binding::new(BindingKind::Module),
            Stmt::Enum(_) => Binding::new(BindingKind::Enum),
            Stmt::Class(_) => Binding::new(BindingKind::Class),
            _ => return None,
        })
    }
}

#[derive(Default)]
struct Scope {
    names: HashMap<SmolStr, Binding>,
    /// Declarations of hoisted scopes are visible before their statement.
    hoisted: bool,
}

/// Resolves every identifier to a declaration and checks literal
/// initializers against type annotations.
///
/// Top-level and module declarations are hoisted, so they may be used
/// before the statement that declares them. Block and function scopes
/// are resolved in order.
pub struct TypeCheckAndResolve {
    globals: Vec<SmolStr>,
    scopes: Vec<Scope>,
    started: bool,
    diagnostics: Vec<Diagnostic>,
}

impl TypeCheckAndResolve {
    /// `globals` are names defined by the host, visible everywhere.
    pub fn new<'a>(globals: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            globals: globals.into_iter().map(SmolStr::new).collect(),
            scopes: Vec::new(),
            started: false,
            diagnostics: Vec::new(),
        }
    }

    fn error(&mut self, kind: DiagnosticKind, span: Span, message: impl ToString) {
        self.diagnostics.push(Diagnostic::error(kind, span, message));
    }

    fn lookup(&self, name: &str) -> Option<(usize, Binding)> {
        self.scopes
            .iter()
            .enumerate()
            .rev()
            .find_map(|(depth, scope)| scope.names.get(name).map(|b| (depth, *b)))
    }

    fn hoist(&mut self, body: &[Stmt]) {
        for stmt in body {
            let (Some(name), Some(binding)) = (stmt.declared_name(), Binding::of(stmt)) else {
                continue;
            };
            let Some(scope) = self.scopes.last_mut() else {
                return;
            };
            if scope.names.insert(name.clone(), binding).is_some() {
                let message = format!("'{name}' is already declared in this scope");
                self.error(DiagnosticKind::Semantic, stmt.span(), message);
            }
        }
    }

    fn declare(&mut self, name: &SmolStr, binding: Binding, span: Span) {
        let Some(scope) = self.scopes.last_mut() else {
            return;
        };
        if scope.hoisted {
            scope.names.entry(name.clone()).or_insert(binding);
        } else if scope.names.insert(name.clone(), binding).is_some() {
            let message = format!("'{name}' is already declared in this scope");
            self.error(DiagnosticKind::Semantic, span, message);
        }
    }

    fn mark_initialized(&mut self, name: &str) {
        if let Some(binding) = self.scopes.last_mut().and_then(|s| s.names.get_mut(name)) {
            binding.initialized = true;
        }
    }

    fn with_scope<T>(&mut self, hoisted: bool, f: impl FnOnce(&mut Self) -> T) -> T {
        self.scopes.push(Scope {
            names: HashMap::new(),
            hoisted,
        });
        let result = f(self);
        self.scopes.pop();
        result
    }

    fn check_read(&mut self, name: &str, span: Span) {
        match self.lookup(name) {
            None => self.error(
                DiagnosticKind::Semantic,
                span,
                format!("undefined variable '{name}'"),
            ),
            Some((depth, binding)) if !binding.initialized && !self.scopes[depth].hoisted => {
                self.error(
                    DiagnosticKind::Semantic,
                    span,
                    format!("cannot read local variable '{name}' in its own initializer"),
                )
            }
            Some(_) => {}
        }
    }

    fn check_write(&mut self, target: &Expr) {
        if let Expr::Ident(name, span) = target {
            if let Some((_, binding)) = self.lookup(name) {
                if binding.kind == BindingKind::Constant {
                    self.error(
                        DiagnosticKind::Semantic,
                        *span,
                        format!("cannot assign to constant '{name}'"),
                    );
                }
            }
        }
    }

    fn check_type(&mut self, ty: Option<&Type>) {
        let Some(Type {
            name: Some(name),
            span,
            ..
        }) = ty
        else {
            return;
        };
        match self.lookup(name) {
            Some((_, binding)) if binding.kind == BindingKind::Class => {}
            _ => self.error(DiagnosticKind::Type, *span, format!("unknown type '{name}'")),
        }
    }

    fn check_arity(&mut self, callee: &Expr, argc: usize, span: Span) {
        let Expr::Ident(name, _) = callee else {
            return;
        };
        let Some((0, Binding {
            signature: Some((arity, variadic)),
            ..
        })) = self.lookup(name)
        else {
            return;
        };
        if argc == arity || (variadic && argc > arity) {
            return;
        }
        let expected = if variadic {
            format!("at least {arity}")
        } else {
            arity.to_string()
        };
        self.error(
            DiagnosticKind::Type,
            span,
            format!("function '{name}' expects {expected} arguments, found {argc}"),
        );
    }

    /// Resolve a `let` member or statement, returning its rewritten initializer.
    fn check_let(&mut self, desc: &VarDesc, value: Option<Expr>, constant: bool) -> Option<Expr> {
        if constant && value.is_none() {
            self.error(
                DiagnosticKind::Semantic,
                desc.span,
                format!("constant '{}' must be initialized", desc.name),
            );
        }
        self.check_type(desc.ty.as_ref());

        let value = value.map(|v| self.pass_expr(v))?;
        match (&desc.ty, value) {
            (Some(ty), Expr::Literal(constant, span)) => match convert_literal(&constant, ty) {
                Ok(converted) => Some(Expr::Literal(converted, span)),
                Err(message) => {
                    self.error(DiagnosticKind::Type, span, message);
                    Some(Expr::Literal(constant, span))
                }
            },
            (_, value) => Some(value),
        }
    }

    fn check_class(&mut self, decl: ClassDecl) -> ClassDecl {
        self.declare(&decl.name, Binding::new(BindingKind::Class), decl.span);

        for (parent, span) in &decl.parents {
            if *parent == decl.name {
                let message = format!("class '{parent}' cannot inherit from itself");
                self.error(DiagnosticKind::Semantic, *span, message);
                continue;
            }
            match self.lookup(parent) {
                None => self.error(
                    DiagnosticKind::Semantic,
                    *span,
                    format!("undefined class '{parent}'"),
                ),
                Some((_, binding)) if !is_class_like(binding.kind) => self.error(
                    DiagnosticKind::Type,
                    *span,
                    format!("'{parent}' is not a class"),
                ),
                Some(_) => {}
            }
        }

        let mut seen = HashSet::new();
        for member in &decl.members {
            if let Some(name) = member.declared_name() {
                if !seen.insert(name.clone()) {
                    let message = format!("class '{}' already has a member '{name}'", decl.name);
                    self.error(DiagnosticKind::Semantic, member.span(), message);
                }
            }
        }

        let members = decl
            .members
            .into_iter()
            .map(|member| match member {
                // Fields are not variables of the enclosing scope.
                Stmt::Let {
                    desc,
                    value,
                    constant,
                    span,
                } => {
                    let value = self.check_let(&desc, value, constant);
                    Stmt::Let {
                        desc,
                        value,
                        constant,
                        span,
                    }
                }
                Stmt::Function(method) => Stmt::Function(Box::new(self.pass_fn(*method))),
                Stmt::Enum(decl) => Stmt::Enum(self.check_enum(decl)),
                other => self.pass_stmt(other),
            })
            .collect();

        ClassDecl { members, ..decl }
    }

    /// Resolve enum item values to integer literals, counting up from the
    /// previous item.
    fn check_enum(&mut self, decl: EnumDecl) -> EnumDecl {
        let decl = walk_enum(self, decl);
        let mut next = 0i64;
        let mut seen = HashSet::new();

        let items = decl
            .items
            .into_iter()
            .map(|item| {
                if !seen.insert(item.name.clone()) {
                    let message = format!("enum '{}' already has an item '{}'", decl.name, item.name);
                    self.error(DiagnosticKind::Semantic, item.span, message);
                }
                let value = match &item.value {
                    None => next,
                    Some(expr) => match expr.as_literal().and_then(integer_value) {
                        Some(value) => value,
                        None => {
                            self.error(
                                DiagnosticKind::Type,
                                expr.span(),
                                "enum value must be an integer constant",
                            );
                            next
                        }
                    },
                };
                next = value.wrapping_add(1);
                EnumItem {
                    value: Some(Expr::Literal(Constant::I64(value), item.span)),
                    ..item
                }
            })
            .collect();

        EnumDecl { items, ..decl }
    }
}

impl AstPass for TypeCheckAndResolve {
    fn name(&self) -> &'static str {
        "type_check_and_resolve"
    }

    fn pass_stmt(&mut self, stmt: Stmt) -> Stmt {
        match stmt {
            Stmt::Scope { body, span } if !self.started => {
                self.started = true;
                self.with_scope(true, |this| {
                    for name in this.globals.clone() {
                        this.declare(&name, Binding::new(BindingKind::Native), span);
                    }
                    this.hoist(&body);
                    Stmt::Scope {
                        body: walk_stmts(this, body),
                        span,
                    }
                })
            }
            Stmt::Scope { body, span } => self.with_scope(false, |this| Stmt::Scope {
                body: walk_stmts(this, body),
                span,
            }),
            Stmt::Let {
                desc,
                value,
                constant,
                span,
            } => {
                let kind = if constant {
                    BindingKind::Constant
                } else {
                    BindingKind::Variable
                };
                self.declare(
                    &desc.name,
                    Binding {
                        initialized: false,
                        ..Binding::new(kind)
                    },
                    desc.span,
                );
                let value = self.check_let(&desc, value, constant);
                self.mark_initialized(&desc.name);
                Stmt::Let {
                    desc,
                    value,
                    constant,
                    span,
                }
            }
            Stmt::Function(decl) => {
                let binding = Binding {
                    signature: Some((decl.params.len(), decl.varargs.is_variadic())),
                    ..Binding::new(BindingKind::Function)
                };
                self.declare(&decl.name, binding, decl.span);
                Stmt::Function(Box::new(self.pass_fn(*decl)))
            }
            Stmt::Class(decl) => Stmt::Class(Box::new(self.check_class(*decl))),
            Stmt::Enum(decl) => {
                self.declare(&decl.name, Binding::new(BindingKind::Enum), decl.span);
                Stmt::Enum(self.check_enum(decl))
            }
            Stmt::Module { name, body, span } => {
                self.declare(&name, Binding::new(BindingKind::Module), span);
                let body = self.with_scope(true, |this| {
                    this.hoist(&body);
                    walk_stmts(this, body)
                });
                Stmt::Module { name, body, span }
            }
            other => walk_stmt(self, other),
        }
    }

    fn pass_fn(&mut self, decl: FnDecl) -> FnDecl {
        self.check_type(decl.ret.as_ref());

        self.with_scope(false, |this| {
            for param in &decl.params {
                this.check_type(param.ty.as_ref());
                this.declare(&param.name, Binding::new(BindingKind::Variable), param.span);
            }
            if let Some(rest) = &decl.rest {
                this.declare(rest, Binding::new(BindingKind::Variable), decl.span);
            }
            FnDecl {
                body: walk_stmts(this, decl.body),
                ..decl
            }
        })
    }

    fn pass_expr(&mut self, expr: Expr) -> Expr {
        match &expr {
            Expr::Ident(name, span) => self.check_read(name, *span),
            Expr::Infix {
                op: InfixOp::Assign,
                lhs: target,
                ..
            }
            | Expr::CompoundAssign { target, .. }
            | Expr::Postfix { expr: target, .. } => self.check_write(target),
            Expr::Call { callee, args, span } => self.check_arity(callee, args.len(), *span),
            Expr::New { class, .. } => {
                if let Expr::Ident(name, span) = class.as_ref() {
                    if let Some((_, binding)) = self.lookup(name) {
                        if !is_class_like(binding.kind) {
                            self.error(
                                DiagnosticKind::Type,
                                *span,
                                format!("'{name}' is not a class"),
                            );
                        }
                    }
                }
            }
            _ => {}
        }
        walk_expr(self, expr)
    }

    fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }
}

/// Kinds that may hold a class at runtime.
fn is_class_like(kind: BindingKind) -> bool {
    matches!(
        kind,
        BindingKind::Class | BindingKind::Variable | BindingKind::Constant
    )
}

fn integer_value(constant: &Constant) -> Option<i64> {
    Some(match *constant {
        Constant::I8(v) => v.into(),
        Constant::U8(v) => v.into(),
        Constant::I16(v) => v.into(),
        Constant::U16(v) => v.into(),
        Constant::I32(v) => v.into(),
        Constant::U32(v) => v.into(),
        Constant::I64(v) => v,
        Constant::U64(v) => i64::try_from(v).ok()?,
        _ => return None,
    })
}

/// Convert a literal to the annotated type.
fn convert_literal(constant: &Constant, ty: &Type) -> Result<Constant, String> {
    let mismatch = || {
        Err(format!(
            "mismatched types: expected {ty}, found {}",
            constant_type(constant)
        ))
    };

    if ty.kind == TypeKind::Any || *constant == Constant::Null {
        return Ok(constant.clone());
    }

    if ty.kind.is_numeric() {
        let int = match *constant {
            Constant::I8(v) => i128::from(v),
            Constant::U8(v) => i128::from(v),
            Constant::I16(v) => i128::from(v),
            Constant::U16(v) => i128::from(v),
            Constant::I32(v) => i128::from(v),
            Constant::U32(v) => i128::from(v),
            Constant::I64(v) => i128::from(v),
            Constant::U64(v) => i128::from(v),
            Constant::F32(v) => return float_to(f64::from(v), ty.kind).map_or_else(mismatch, Ok),
            Constant::F64(v) => return float_to(v, ty.kind).map_or_else(mismatch, Ok),
            _ => return mismatch(),
        };
        let out_of_range = || format!("literal {int} does not fit in {ty}");
        return match ty.kind {
            TypeKind::I8 => i8::try_from(int).map(Constant::I8).map_err(|_| out_of_range()),
            TypeKind::U8 => u8::try_from(int).map(Constant::U8).map_err(|_| out_of_range()),
            TypeKind::I16 => i16::try_from(int).map(Constant::I16).map_err(|_| out_of_range()),
            TypeKind::U16 => u16::try_from(int).map(Constant::U16).map_err(|_| out_of_range()),
            TypeKind::I32 => i32::try_from(int).map(Constant::I32).map_err(|_| out_of_range()),
            TypeKind::U32 => u32::try_from(int).map(Constant::U32).map_err(|_| out_of_range()),
            TypeKind::I64 => i64::try_from(int).map(Constant::I64).map_err(|_| out_of_range()),
            TypeKind::U64 => u64::try_from(int).map(Constant::U64).map_err(|_| out_of_range()),
            TypeKind::F32 => Ok(Constant::F32(int as f32)),
            _ => Ok(Constant::F64(int as f64)),
        };
    }

    match (ty.kind, constant) {
        (TypeKind::Bool, Constant::Bool(_))
        | (TypeKind::Char, Constant::Char(_))
        | (TypeKind::Str, Constant::Str(_)) => Ok(constant.clone()),
        _ => mismatch(),
    }
}

fn float_to(value: f64, kind: TypeKind) -> Option<Constant> {
    match kind {
        TypeKind::F32 => Some(Constant::F32(value as f32)),
        TypeKind::F64 => Some(Constant::F64(value)),
        _ => None,
    }
}

fn constant_type(constant: &Constant) -> &'static str {
    match constant {
        Constant::Null => "null",
        Constant::Bool(_) => "bool",
        Constant::Char(_) => "char",
        Constant::I8(_) => "i8",
        Constant::U8(_) => "u8",
        Constant::I16(_) => "i16",
        Constant::U16(_) => "u16",
        Constant::I32(_) => "i32",
        Constant::U32(_) => "u32",
        Constant::I64(_) => "i64",
        Constant::U64(_) => "u64",
        Constant::F32(_) => "f32",
        Constant::F64(_) => "f64",
        Constant::Str(_) => "str",
        Constant::Function(_) => "function",
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{lex::tokenize, parse::parse, pass::ConstantFold};

    fn resolve(source: &str) -> (Stmt, Vec<Diagnostic>) {
        let (tokens, _) = tokenize(source);
        let root = parse(tokens, source).unwrap();
        let root = ConstantFold::new().pass_stmt(root);
        let mut pass = TypeCheckAndResolve::new(["println"]);
        let root = pass.pass_stmt(root);
        (root, pass.take_diagnostics())
    }

    fn messages(source: &str) -> Vec<String> {
        resolve(source).1.into_iter().map(|d| d.message).collect()
    }

    #[test]
    fn test_hoisted_top_level() {
        let errors = messages(
            "fn a() { return b(1); } fn b(x) { return x; } println(a());
             module M { fn f() { return g(); } fn g() { return 1; } }",
        );
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn test_undefined_and_duplicate() {
        let errors = messages("fn f() { let a = 1; let a = 2; return c; } let f = 3;");
        assert_eq!(
            errors,
            vec![
                "'f' is already declared in this scope",
                "'a' is already declared in this scope",
                "undefined variable 'c'",
            ]
        );
    }

    #[test]
    fn test_local_scoping() {
        let errors = messages("fn f() { { let x = 1; } return x; } fn g() { let y = y; }");
        assert_eq!(errors.len(), 2);
        assert!(errors[1].contains("own initializer"));
    }

    #[test]
    fn test_constants() {
        let errors = messages("const k = 1; k = 2; k += 1; k++; const u;");
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn test_static_arity() {
        let errors = messages("fn f(a, b) {} fn g(a, ...) {} f(1); g(); g(1, 2, 3);");
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("expects 2 arguments, found 1"));
        assert!(errors[1].contains("at least 1"));
    }

    #[test]
    fn test_annotated_literals() {
        let (root, errors) =
            resolve("let a: u8 = 200; let b: f32 = 1; let c: i8 = -129; let d: bool = 1;");
        assert_eq!(errors.len(), 2);
        assert!(errors[0].message.contains("does not fit"));
        assert!(errors[1].message.contains("mismatched types"));

        let Stmt::Scope { body, .. } = root else {
            panic!("expected scope");
        };
        assert!(matches!(&body[0], Stmt::Let { value: Some(Expr::Literal(Constant::U8(200), _)), .. }));
        assert!(matches!(&body[1], Stmt::Let { value: Some(Expr::Literal(Constant::F32(v), _)), .. } if *v == 1.0));
    }

    #[test]
    fn test_types_and_classes() {
        let errors = messages(
            "class A { let x = 1; } class B : A, Nope { fn m(a: A): Missing { return a; } }
             fn f() {} let o = new f();",
        );
        assert_eq!(errors.len(), 3, "{errors:?}");
    }

    #[test]
    fn test_enum_values() {
        let (root, errors) = resolve("enum E { A, B = 5, C, D = 2 + 2 }");
        assert!(errors.is_empty());
        let Stmt::Scope { body, .. } = root else {
            panic!("expected scope");
        };
        let Stmt::Enum(decl) = &body[0] else {
            panic!("expected enum");
        };
        let values: Vec<i64> = decl
            .items
            .iter()
            .filter_map(|item| match item.value {
                Some(Expr::Literal(Constant::I64(v), _)) => Some(v),
                _ => None,
            })
            .collect();
        assert_eq!(values, vec![0, 5, 6, 4]);
    }
}
