//! Syntax tree.
//!
//! The tree owns its children. Passes consume a tree and return a
//! rewritten one.
use std::fmt;

use smol_str::SmolStr;

use crate::{
    chunk::{Constant, VarArg},
    lex::Span,
    value::BinaryOp,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Let {
        desc: VarDesc,
        value: Option<Expr>,
        constant: bool,
        span: Span,
    },
    Function(Box<FnDecl>),
    Module {
        name: SmolStr,
        body: Vec<Stmt>,
        span: Span,
    },
    Enum(EnumDecl),
    Class(Box<ClassDecl>),
    Expr(Expr),
    /// Multiple returned values are wrapped in an [`Expr::Aggregate`].
    Return {
        value: Option<Expr>,
        span: Span,
    },
    If {
        cond: Expr,
        then: Box<Stmt>,
        otherwise: Option<Box<Stmt>>,
        span: Span,
    },
    Scope {
        body: Vec<Stmt>,
        span: Span,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
        span: Span,
    },
    Break(Span),
    Continue(Span),
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::Let { span, .. }
            | Stmt::Module { span, .. }
            | Stmt::Return { span, .. }
            | Stmt::If { span, .. }
            | Stmt::Scope { span, .. }
            | Stmt::While { span, .. }
            | Stmt::Break(span)
            | Stmt::Continue(span) => *span,
            Stmt::Function(decl) => decl.span,
            Stmt::Enum(decl) => decl.span,
            Stmt::Class(decl) => decl.span,
            Stmt::Expr(expr) => expr.span(),
        }
    }

    /// Name introduced by a declaration statement.
    pub fn declared_name(&self) -> Option<&SmolStr> {
        match self {
            Stmt::Let { desc, .. } => Some(&desc.name),
            Stmt::Function(decl) => Some(&decl.name),
            Stmt::Module { name, .. } => Some(name),
            Stmt::Enum(decl) => Some(&decl.name),
            Stmt::Class(decl) => Some(&decl.name),
            _ => None,
        }
    }
}

/// Name and optional type annotation of a variable or parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct VarDesc {
    pub name: SmolStr,
    pub ty: Option<Type>,
    pub span: Span,
}

/// Function declaration or lambda.
#[derive(Debug, Clone, PartialEq)]
pub struct FnDecl {
    pub name: SmolStr,
    pub params: Vec<VarDesc>,
    pub varargs: VarArg,
    /// Name bound to the surplus arguments in [`VarArg::Named`] mode.
    pub rest: Option<SmolStr>,
    pub ret: Option<Type>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumDecl {
    pub name: SmolStr,
    pub items: Vec<EnumItem>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumItem {
    pub name: SmolStr,
    pub value: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub name: SmolStr,
    pub parents: Vec<(SmolStr, Span)>,
    /// `let`, `fn` and `enum` members.
    pub members: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Constant, Span),
    Ident(SmolStr, Span),
    Group(Box<Expr>, Span),
    Array(Vec<Expr>, Span),
    /// Comma separated values of a `return` statement.
    Aggregate(Vec<Expr>, Span),
    Dict(Vec<(Expr, Expr)>, Span),
    Prefix {
        op: PrefixOp,
        expr: Box<Expr>,
        span: Span,
    },
    Infix {
        op: InfixOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        span: Span,
    },
    Postfix {
        op: PostfixOp,
        expr: Box<Expr>,
        span: Span,
    },
    Conditional {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
        span: Span,
    },
    Index {
        expr: Box<Expr>,
        index: Box<Expr>,
        span: Span,
    },
    Ref(Box<Expr>, Span),
    Struct(Vec<(SmolStr, Expr)>, Span),
    /// `...` inside a variadic function.
    VarArg(Span),
    Lambda(Box<FnDecl>),
    CompoundAssign {
        op: BinaryOp,
        target: Box<Expr>,
        value: Box<Expr>,
        span: Span,
    },
    Dot {
        expr: Box<Expr>,
        name: SmolStr,
        span: Span,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        span: Span,
    },
    New {
        class: Box<Expr>,
        args: Vec<Expr>,
        span: Span,
    },
    This(Span),
    Base {
        name: SmolStr,
        span: Span,
    },
    Factorial(Box<Expr>, Span),
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Literal(_, span)
            | Expr::Ident(_, span)
            | Expr::Group(_, span)
            | Expr::Array(_, span)
            | Expr::Aggregate(_, span)
            | Expr::Dict(_, span)
            | Expr::Ref(_, span)
            | Expr::Struct(_, span)
            | Expr::VarArg(span)
            | Expr::This(span)
            | Expr::Factorial(_, span) => *span,
            Expr::Prefix { span, .. }
            | Expr::Infix { span, .. }
            | Expr::Postfix { span, .. }
            | Expr::Conditional { span, .. }
            | Expr::Index { span, .. }
            | Expr::CompoundAssign { span, .. }
            | Expr::Dot { span, .. }
            | Expr::Call { span, .. }
            | Expr::New { span, .. }
            | Expr::Base { span, .. } => *span,
            Expr::Lambda(decl) => decl.span,
        }
    }

    pub fn as_literal(&self) -> Option<&Constant> {
        match self {
            Expr::Literal(constant, _) => Some(constant),
            _ => None,
        }
    }

    /// Whether the expression denotes a storage location.
    pub fn is_place(&self) -> bool {
        matches!(self, Expr::Ident(..) | Expr::Index { .. } | Expr::Dot { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixOp {
    Neg,
    Not,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfixOp {
    Assign,
    And,
    Or,
    Binary(BinaryOp),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostfixOp {
    Inc,
    Dec,
}

impl fmt::Display for PostfixOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PostfixOp::Inc => write!(f, "++"),
            PostfixOp::Dec => write!(f, "--"),
        }
    }
}

// ----------------------------------------------------------------------------
// Types

#[derive(Debug, Clone, PartialEq)]
pub struct Type {
    pub kind: TypeKind,
    /// Class or struct name for composite types.
    pub name: Option<SmolStr>,
    pub span: Span,
}

/// Type tags. Numeric kinds are ordered by promotion rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TypeKind {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    Bool,
    Char,
    Any,
    Str,
    Struct,
    Class,
}

impl TypeKind {
    pub fn parse(text: &str) -> Option<Self> {
        Some(match text {
            "i8" => TypeKind::I8,
            "u8" => TypeKind::U8,
            "i16" => TypeKind::I16,
            "u16" => TypeKind::U16,
            "i32" => TypeKind::I32,
            "u32" => TypeKind::U32,
            "i64" => TypeKind::I64,
            "u64" => TypeKind::U64,
            "f32" => TypeKind::F32,
            "f64" => TypeKind::F64,
            "bool" => TypeKind::Bool,
            "char" => TypeKind::Char,
            "any" => TypeKind::Any,
            "str" => TypeKind::Str,
            _ => return None,
        })
    }

    pub fn is_numeric(self) -> bool {
        self <= TypeKind::F64
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TypeKind::I8 => "i8",
            TypeKind::U8 => "u8",
            TypeKind::I16 => "i16",
            TypeKind::U16 => "u16",
            TypeKind::I32 => "i32",
            TypeKind::U32 => "u32",
            TypeKind::I64 => "i64",
            TypeKind::U64 => "u64",
            TypeKind::F32 => "f32",
            TypeKind::F64 => "f64",
            TypeKind::Bool => "bool",
            TypeKind::Char => "char",
            TypeKind::Any => "any",
            TypeKind::Str => "str",
            TypeKind::Struct => "struct",
            TypeKind::Class => "class",
        };
        write!(f, "{name}")
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "{}", self.kind),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_numeric_kinds_are_ordered() {
        assert!(TypeKind::I8 < TypeKind::U8);
        assert!(TypeKind::U32 < TypeKind::I64);
        assert!(TypeKind::U64 < TypeKind::F32);
        assert!(TypeKind::F64.is_numeric());
        assert!(!TypeKind::Bool.is_numeric());
    }
}
