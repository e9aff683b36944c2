//! Runtime values and primitive arithmetic.
//!
//! The arithmetic here is shared by the virtual machine and the constant
//! folding pass, so that folding an expression gives exactly the result
//! the VM would have computed.
use std::{cmp::Ordering, fmt};

use crate::{chunk::Constant, heap::Handle};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Char(char),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Object(Handle),
}

/// Numeric kinds in promotion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NumKind {
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
}

impl NumKind {
    pub fn is_float(self) -> bool {
        matches!(self, NumKind::F32 | NumKind::F64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        };
        write!(f, "{symbol}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
    Factorial,
    Inc,
    Dec,
}

/// Failed primitive operation, without location information.
pub type OpResult = Result<Value, String>;

impl Value {
    /// Exactly `false` and `null` are falsey. Every other value,
    /// including zero and empty containers, is truthy.
    #[inline]
    pub fn is_falsey(&self) -> bool {
        matches!(self, Value::Null | Value::Bool(false))
    }

    #[inline]
    pub fn as_object(&self) -> Option<Handle> {
        match self {
            Value::Object(handle) => Some(*handle),
            _ => None,
        }
    }

    pub fn num_kind(&self) -> Option<NumKind> {
        match self {
            Value::I8(_) => Some(NumKind::I8),
            Value::U8(_) => Some(NumKind::U8),
            Value::I16(_) => Some(NumKind::I16),
            Value::U16(_) => Some(NumKind::U16),
            Value::I32(_) => Some(NumKind::I32),
            Value::U32(_) => Some(NumKind::U32),
            Value::I64(_) => Some(NumKind::I64),
            Value::U64(_) => Some(NumKind::U64),
            Value::F32(_) => Some(NumKind::F32),
            Value::F64(_) => Some(NumKind::F64),
            _ => None,
        }
    }

    /// Name of the value's kind. Objects are named by the heap.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Char(_) => "char",
            Value::I8(_) => "i8",
            Value::U8(_) => "u8",
            Value::I16(_) => "i16",
            Value::U16(_) => "u16",
            Value::I32(_) => "i32",
            Value::U32(_) => "u32",
            Value::I64(_) => "i64",
            Value::U64(_) => "u64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::Object(_) => "object",
        }
    }

    /// Numeric conversion with `as` semantics.
    pub fn cast(self, kind: NumKind) -> Option<Value> {
        macro_rules! conv {
            ($v:expr) => {
                match kind {
                    NumKind::I8 => Value::I8($v as i8),
                    NumKind::U8 => Value::U8($v as u8),
                    NumKind::I16 => Value::I16($v as i16),
                    NumKind::U16 => Value::U16($v as u16),
                    NumKind::I32 => Value::I32($v as i32),
                    NumKind::U32 => Value::U32($v as u32),
                    NumKind::I64 => Value::I64($v as i64),
                    NumKind::U64 => Value::U64($v as u64),
                    NumKind::F32 => Value::F32($v as f32),
                    NumKind::F64 => Value::F64($v as f64),
                }
            };
        }

        Some(match self {
            Value::I8(v) => conv!(v),
            Value::U8(v) => conv!(v),
            Value::I16(v) => conv!(v),
            Value::U16(v) => conv!(v),
            Value::I32(v) => conv!(v),
            Value::U32(v) => conv!(v),
            Value::I64(v) => conv!(v),
            Value::U64(v) => conv!(v),
            Value::F32(v) => conv!(v),
            Value::F64(v) => conv!(v),
            _ => return None,
        })
    }

    /// Integer value usable as an index or count.
    pub fn as_index(&self) -> Option<usize> {
        match *self {
            Value::I8(v) => usize::try_from(v).ok(),
            Value::U8(v) => Some(v as usize),
            Value::I16(v) => usize::try_from(v).ok(),
            Value::U16(v) => Some(v as usize),
            Value::I32(v) => usize::try_from(v).ok(),
            Value::U32(v) => usize::try_from(v).ok(),
            Value::I64(v) => usize::try_from(v).ok(),
            Value::U64(v) => usize::try_from(v).ok(),
            _ => None,
        }
    }

    /// Heap-free constant to value. Strings and functions need
    /// the heap and return `None`.
    pub fn from_constant(constant: &Constant) -> Option<Value> {
        Some(match *constant {
            Constant::Null => Value::Null,
            Constant::Bool(v) => Value::Bool(v),
            Constant::Char(v) => Value::Char(v),
            Constant::I8(v) => Value::I8(v),
            Constant::U8(v) => Value::U8(v),
            Constant::I16(v) => Value::I16(v),
            Constant::U16(v) => Value::U16(v),
            Constant::I32(v) => Value::I32(v),
            Constant::U32(v) => Value::U32(v),
            Constant::I64(v) => Value::I64(v),
            Constant::U64(v) => Value::U64(v),
            Constant::F32(v) => Value::F32(v),
            Constant::F64(v) => Value::F64(v),
            Constant::Str(_) | Constant::Function(_) => return None,
        })
    }

    pub fn to_constant(&self) -> Option<Constant> {
        Some(match *self {
            Value::Null => Constant::Null,
            Value::Bool(v) => Constant::Bool(v),
            Value::Char(v) => Constant::Char(v),
            Value::I8(v) => Constant::I8(v),
            Value::U8(v) => Constant::U8(v),
            Value::I16(v) => Constant::I16(v),
            Value::U16(v) => Constant::U16(v),
            Value::I32(v) => Constant::I32(v),
            Value::U32(v) => Constant::U32(v),
            Value::I64(v) => Constant::I64(v),
            Value::U64(v) => Constant::U64(v),
            Value::F32(v) => Constant::F32(v),
            Value::F64(v) => Constant::F64(v),
            Value::Object(_) => return None,
        })
    }
}

/// Primitives print plainly. Objects need the heap to be printed,
/// see `Heap::stringify`.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Char(v) => write!(f, "{v}"),
            Value::I8(v) => write!(f, "{v}"),
            Value::U8(v) => write!(f, "{v}"),
            Value::I16(v) => write!(f, "{v}"),
            Value::U16(v) => write!(f, "{v}"),
            Value::I32(v) => write!(f, "{v}"),
            Value::U32(v) => write!(f, "{v}"),
            Value::I64(v) => write!(f, "{v}"),
            Value::U64(v) => write!(f, "{v}"),
            Value::F32(v) => write!(f, "{v:?}"),
            Value::F64(v) => write!(f, "{v:?}"),
            Value::Object(handle) => write!(f, "<object {}>", handle.index()),
        }
    }
}

// ----------------------------------------------------------------------------
// Arithmetic

/// Integer operations with wrapping overflow.
trait Integer: Copy + PartialOrd {
    const ZERO: Self;
    const ONE: Self;
    fn add(self, rhs: Self) -> Self;
    fn sub(self, rhs: Self) -> Self;
    fn mul(self, rhs: Self) -> Self;
    fn div(self, rhs: Self) -> Self;
    fn rem(self, rhs: Self) -> Self;
    fn and(self, rhs: Self) -> Self;
    fn or(self, rhs: Self) -> Self;
    fn xor(self, rhs: Self) -> Self;
    fn shl(self, rhs: Self) -> Self;
    fn shr(self, rhs: Self) -> Self;
    fn neg(self) -> Self;
    fn not(self) -> Self;
    fn checked_mul(self, rhs: Self) -> Option<Self>;
}

macro_rules! impl_integer {
    ($($t:ty),*) => {
        $(
            impl Integer for $t {
                const ZERO: Self = 0;
                const ONE: Self = 1;
                #[inline] fn add(self, rhs: Self) -> Self { self.wrapping_add(rhs) }
                #[inline] fn sub(self, rhs: Self) -> Self { self.wrapping_sub(rhs) }
                #[inline] fn mul(self, rhs: Self) -> Self { self.wrapping_mul(rhs) }
                #[inline] fn div(self, rhs: Self) -> Self { self.wrapping_div(rhs) }
                #[inline] fn rem(self, rhs: Self) -> Self { self.wrapping_rem(rhs) }
                #[inline] fn and(self, rhs: Self) -> Self { self & rhs }
                #[inline] fn or(self, rhs: Self) -> Self { self | rhs }
                #[inline] fn xor(self, rhs: Self) -> Self { self ^ rhs }
                #[inline] fn shl(self, rhs: Self) -> Self { self.wrapping_shl(rhs as u32) }
                #[inline] fn shr(self, rhs: Self) -> Self { self.wrapping_shr(rhs as u32) }
                #[inline] fn neg(self) -> Self { self.wrapping_neg() }
                #[inline] fn not(self) -> Self { !self }
                #[inline] fn checked_mul(self, rhs: Self) -> Option<Self> { <$t>::checked_mul(self, rhs) }
            }
        )*
    };
}

impl_integer!(i8, u8, i16, u16, i32, u32, i64, u64);

fn int_binary<T: Integer>(op: BinaryOp, a: T, b: T) -> Result<T, String> {
    Ok(match op {
        BinaryOp::Add => a.add(b),
        BinaryOp::Sub => a.sub(b),
        BinaryOp::Mul => a.mul(b),
        BinaryOp::Div | BinaryOp::Rem if b == T::ZERO => {
            return Err("division by zero".to_string())
        }
        BinaryOp::Div => a.div(b),
        BinaryOp::Rem => a.rem(b),
        BinaryOp::BitAnd => a.and(b),
        BinaryOp::BitOr => a.or(b),
        BinaryOp::BitXor => a.xor(b),
        BinaryOp::Shl => a.shl(b),
        BinaryOp::Shr => a.shr(b),
        _ => unreachable!("comparison dispatched as arithmetic"),
    })
}

macro_rules! float_binary {
    ($op:expr, $a:expr, $b:expr) => {
        match $op {
            BinaryOp::Add => Ok($a + $b),
            BinaryOp::Sub => Ok($a - $b),
            BinaryOp::Mul => Ok($a * $b),
            BinaryOp::Div => Ok($a / $b),
            BinaryOp::Rem => Ok($a % $b),
            op => Err(format!("operator '{op}' is not defined for floats")),
        }
    };
}

fn factorial<T: Integer>(n: T) -> Result<T, String> {
    if n < T::ZERO {
        return Err("factorial of a negative number".to_string());
    }
    let mut acc = T::ONE;
    let mut i = T::ONE;
    while i < n {
        i = i.add(T::ONE);
        acc = acc
            .checked_mul(i)
            .ok_or_else(|| "factorial overflow".to_string())?;
    }
    Ok(acc)
}

/// Kind both operands are promoted to.
fn promote(op: BinaryOp, a: &Value, b: &Value) -> Result<NumKind, String> {
    match (a.num_kind(), b.num_kind()) {
        (Some(x), Some(y)) => Ok(x.max(y)),
        _ => Err(format!(
            "operator '{op}' is not defined for {} and {}",
            a.type_name(),
            b.type_name()
        )),
    }
}

/// Arithmetic, bitwise and comparison operators on primitive values.
///
/// Equality is also defined here for primitives; object equality is
/// decided by the heap.
pub fn binary_op(op: BinaryOp, a: Value, b: Value) -> OpResult {
    use BinaryOp as B;

    match op {
        B::Eq => return Ok(Value::Bool(primitive_eq(&a, &b))),
        B::Ne => return Ok(Value::Bool(!primitive_eq(&a, &b))),
        B::Lt | B::Le | B::Gt | B::Ge => {
            let ordering = compare(op, &a, &b)?;
            return Ok(Value::Bool(match (op, ordering) {
                (_, None) => false,
                (B::Lt, Some(o)) => o == Ordering::Less,
                (B::Le, Some(o)) => o != Ordering::Greater,
                (B::Gt, Some(o)) => o == Ordering::Greater,
                (_, Some(o)) => o != Ordering::Less,
            }));
        }
        _ => {}
    }

    let kind = promote(op, &a, &b)?;
    let (a, b) = match (a.cast(kind), b.cast(kind)) {
        (Some(a), Some(b)) => (a, b),
        _ => unreachable!("numeric values always cast"),
    };

    match (a, b) {
        (Value::I8(x), Value::I8(y)) => int_binary(op, x, y).map(Value::I8),
        (Value::U8(x), Value::U8(y)) => int_binary(op, x, y).map(Value::U8),
        (Value::I16(x), Value::I16(y)) => int_binary(op, x, y).map(Value::I16),
        (Value::U16(x), Value::U16(y)) => int_binary(op, x, y).map(Value::U16),
        (Value::I32(x), Value::I32(y)) => int_binary(op, x, y).map(Value::I32),
        (Value::U32(x), Value::U32(y)) => int_binary(op, x, y).map(Value::U32),
        (Value::I64(x), Value::I64(y)) => int_binary(op, x, y).map(Value::I64),
        (Value::U64(x), Value::U64(y)) => int_binary(op, x, y).map(Value::U64),
        (Value::F32(x), Value::F32(y)) => float_binary!(op, x, y).map(Value::F32),
        (Value::F64(x), Value::F64(y)) => float_binary!(op, x, y).map(Value::F64),
        _ => unreachable!("operands promoted to one kind"),
    }
}

/// Equality of primitive values. Numbers compare after promotion,
/// objects compare by handle.
pub fn primitive_eq(a: &Value, b: &Value) -> bool {
    if let (Some(x), Some(y)) = (a.num_kind(), b.num_kind()) {
        let kind = x.max(y);
        return a.cast(kind) == b.cast(kind);
    }
    a == b
}

fn compare(op: BinaryOp, a: &Value, b: &Value) -> Result<Option<Ordering>, String> {
    match (a, b) {
        (Value::Char(x), Value::Char(y)) => return Ok(x.partial_cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => return Ok(x.partial_cmp(y)),
        _ => {}
    }

    let kind = promote(op, a, b)?;
    Ok(match (a.cast(kind), b.cast(kind)) {
        (Some(Value::I8(x)), Some(Value::I8(y))) => x.partial_cmp(&y),
        (Some(Value::U8(x)), Some(Value::U8(y))) => x.partial_cmp(&y),
        (Some(Value::I16(x)), Some(Value::I16(y))) => x.partial_cmp(&y),
        (Some(Value::U16(x)), Some(Value::U16(y))) => x.partial_cmp(&y),
        (Some(Value::I32(x)), Some(Value::I32(y))) => x.partial_cmp(&y),
        (Some(Value::U32(x)), Some(Value::U32(y))) => x.partial_cmp(&y),
        (Some(Value::I64(x)), Some(Value::I64(y))) => x.partial_cmp(&y),
        (Some(Value::U64(x)), Some(Value::U64(y))) => x.partial_cmp(&y),
        (Some(Value::F32(x)), Some(Value::F32(y))) => x.partial_cmp(&y),
        (Some(Value::F64(x)), Some(Value::F64(y))) => x.partial_cmp(&y),
        _ => None,
    })
}

/// Prefix and postfix operators on primitive values.
pub fn unary_op(op: UnaryOp, value: Value) -> OpResult {
    macro_rules! int_unary {
        ($v:expr, $variant:ident) => {
            match op {
                UnaryOp::Neg => Ok(Value::$variant($v.neg())),
                UnaryOp::BitNot => Ok(Value::$variant($v.not())),
                UnaryOp::Factorial => factorial($v).map(Value::$variant),
                UnaryOp::Inc => Ok(Value::$variant($v.add(1))),
                UnaryOp::Dec => Ok(Value::$variant($v.sub(1))),
                UnaryOp::Not => unreachable!(),
            }
        };
    }
    macro_rules! float_unary {
        ($v:expr, $variant:ident) => {
            match op {
                UnaryOp::Neg => Ok(Value::$variant(-$v)),
                UnaryOp::Inc => Ok(Value::$variant($v + 1.0)),
                UnaryOp::Dec => Ok(Value::$variant($v - 1.0)),
                _ => Err(unary_error(op, &value)),
            }
        };
    }

    if op == UnaryOp::Not {
        return Ok(Value::Bool(value.is_falsey()));
    }

    match value {
        Value::I8(v) => int_unary!(v, I8),
        Value::U8(v) => int_unary!(v, U8),
        Value::I16(v) => int_unary!(v, I16),
        Value::U16(v) => int_unary!(v, U16),
        Value::I32(v) => int_unary!(v, I32),
        Value::U32(v) => int_unary!(v, U32),
        Value::I64(v) => int_unary!(v, I64),
        Value::U64(v) => int_unary!(v, U64),
        Value::F32(v) => float_unary!(v, F32),
        Value::F64(v) => float_unary!(v, F64),
        _ => Err(unary_error(op, &value)),
    }
}

fn unary_error(op: UnaryOp, value: &Value) -> String {
    let name = match op {
        UnaryOp::Neg => "negation",
        UnaryOp::Not => "not",
        UnaryOp::BitNot => "bitwise not",
        UnaryOp::Factorial => "factorial",
        UnaryOp::Inc => "increment",
        UnaryOp::Dec => "decrement",
    };
    format!("{name} is not defined for {}", value.type_name())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_falsey() {
        assert!(Value::Null.is_falsey());
        assert!(Value::Bool(false).is_falsey());
        assert!(!Value::Bool(true).is_falsey());
        assert!(!Value::I64(0).is_falsey());
        assert!(!Value::F64(0.0).is_falsey());
        assert!(!Value::Char('\0').is_falsey());
    }

    #[test]
    fn test_promotion() {
        assert_eq!(
            binary_op(BinaryOp::Add, Value::I8(1), Value::U16(2)),
            Ok(Value::U16(3))
        );
        assert_eq!(
            binary_op(BinaryOp::Mul, Value::I64(3), Value::F32(0.5)),
            Ok(Value::F32(1.5))
        );
        assert_eq!(
            binary_op(BinaryOp::Eq, Value::I32(2), Value::F64(2.0)),
            Ok(Value::Bool(true))
        );
    }

    #[test]
    fn test_wrapping_and_division() {
        assert_eq!(
            binary_op(BinaryOp::Add, Value::I8(127), Value::I8(1)),
            Ok(Value::I8(-128))
        );
        assert!(binary_op(BinaryOp::Div, Value::I64(1), Value::I64(0)).is_err());
        assert!(binary_op(BinaryOp::Rem, Value::U8(1), Value::U8(0)).is_err());
        assert_eq!(
            binary_op(BinaryOp::Div, Value::I64(i64::MIN), Value::I64(-1)),
            Ok(Value::I64(i64::MIN))
        );
        match binary_op(BinaryOp::Div, Value::F64(1.0), Value::F64(0.0)) {
            Ok(Value::F64(v)) => assert!(v.is_infinite()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(
            binary_op(BinaryOp::Lt, Value::I64(-1), Value::I64(3)),
            Ok(Value::Bool(true))
        );
        assert_eq!(
            binary_op(BinaryOp::Ge, Value::Char('b'), Value::Char('a')),
            Ok(Value::Bool(true))
        );
        assert_eq!(
            binary_op(BinaryOp::Lt, Value::F64(f64::NAN), Value::F64(1.0)),
            Ok(Value::Bool(false))
        );
        assert!(binary_op(BinaryOp::Lt, Value::Null, Value::I64(1)).is_err());
    }

    #[test]
    fn test_factorial() {
        assert_eq!(unary_op(UnaryOp::Factorial, Value::I64(5)), Ok(Value::I64(120)));
        assert_eq!(unary_op(UnaryOp::Factorial, Value::I64(0)), Ok(Value::I64(1)));
        assert!(unary_op(UnaryOp::Factorial, Value::I8(6)).is_err());
        assert!(unary_op(UnaryOp::Factorial, Value::I64(-2)).is_err());
        assert!(unary_op(UnaryOp::Factorial, Value::F64(2.0)).is_err());
    }

    #[test]
    fn test_unary() {
        assert_eq!(unary_op(UnaryOp::Neg, Value::I32(4)), Ok(Value::I32(-4)));
        assert_eq!(unary_op(UnaryOp::BitNot, Value::U8(0)), Ok(Value::U8(255)));
        assert_eq!(unary_op(UnaryOp::Not, Value::Null), Ok(Value::Bool(true)));
        assert_eq!(unary_op(UnaryOp::Inc, Value::F64(1.5)), Ok(Value::F64(2.5)));
        assert!(unary_op(UnaryOp::Neg, Value::Bool(true)).is_err());
    }
}
