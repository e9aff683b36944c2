//! Bytecode chunks, compiled functions and constants.
use std::{fmt, rc::Rc};

use smol_str::SmolStr;

/// Instruction identities.
///
/// Operands follow the opcode byte inline. Wide operands (`u16`) are
/// encoded little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
#[rustfmt::skip]
pub enum OpCode {
    // ------------------------------------------------------------------------
    // Stack
    Constant = 0, // u16 constant index
    Null,
    True,
    False,
    Pop,
    Dup,
    Dup2,

    // ------------------------------------------------------------------------
    // Variables
    GetLocal,     // u8 slot
    SetLocal,     // u8 slot
    GetGlobal,    // u16 slot
    SetGlobal,    // u16 slot
    DefineGlobal, // u16 slot
    GetUpvalue,   // u8 index
    SetUpvalue,   // u8 index
    RefLocal,     // u8 slot
    RefGlobal,    // u16 slot
    RefUpvalue,   // u8 index
    RefIndex,

    // ------------------------------------------------------------------------
    // Members and elements
    GetIndex,
    SetIndex,
    GetMember,    // u16 name constant
    SetMember,    // u16 name constant
    GetBase,      // u16 name constant

    // ------------------------------------------------------------------------
    // Operators
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Neg,
    Not,
    BitNot,
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
    Factorial,
    Inc,
    Dec,

    // ------------------------------------------------------------------------
    // Control flow
    Jump,         // u16 forward offset
    JumpIfFalse,  // u16 forward offset
    Loop,         // u16 backward offset
    Call,         // u8 argument count
    New,          // u8 argument count
    Closure,      // u16 function constant, then (is_local u8, index u8) per upvalue
    CloseUpvalue,
    Return,       // u8 returned value count

    // ------------------------------------------------------------------------
    // Constructors
    Array,        // u16 element count
    Dict,         // u16 pair count
    Struct,       // u16 field count
    Class,        // u16 name constant, u8 parent count
    Field,        // u16 name constant
    Decl,         // u16 name constant
    Enum,         // u16 name constant
    EnumItem,     // u16 name constant
    Module,       // u16 name constant, u16 member count
}

impl OpCode {
    /// Every opcode, indexed by its byte value.
    #[rustfmt::skip]
    pub const ALL: [OpCode; 62] = {
        use OpCode::*;
        [
            Constant, Null, True, False, Pop, Dup, Dup2,
            GetLocal, SetLocal, GetGlobal, SetGlobal, DefineGlobal, GetUpvalue, SetUpvalue,
            RefLocal, RefGlobal, RefUpvalue, RefIndex,
            GetIndex, SetIndex, GetMember, SetMember, GetBase,
            Add, Sub, Mul, Div, Rem, Neg, Not, BitNot, BitAnd, BitOr, BitXor, Shl, Shr,
            Eq, Ne, Lt, Le, Gt, Ge, Factorial, Inc, Dec,
            Jump, JumpIfFalse, Loop, Call, New, Closure, CloseUpvalue, Return,
            Array, Dict, Struct, Class, Field, Decl, Enum, EnumItem, Module,
        ]
    };

    /// Number of fixed operand bytes following the opcode.
    ///
    /// `Closure` additionally carries two bytes per captured variable.
    pub fn operand_size(self) -> usize {
        use OpCode::*;
        match self {
            GetLocal | SetLocal | GetUpvalue | SetUpvalue | RefLocal | RefUpvalue | Call | New
            | Return => 1,
            Constant | GetGlobal | SetGlobal | DefineGlobal | RefGlobal | GetMember | SetMember
            | GetBase | Jump | JumpIfFalse | Loop | Closure | Array | Dict | Struct | Field
            | Decl | Enum | EnumItem => 2,
            Class => 3,
            Module => 4,
            _ => 0,
        }
    }
}

impl From<OpCode> for u8 {
    fn from(op: OpCode) -> Self {
        op as u8
    }
}

impl TryFrom<u8> for OpCode {
    type Error = InvalidOpCode;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        OpCode::ALL
            .get(byte as usize)
            .copied()
            .ok_or(InvalidOpCode(byte))
    }
}

#[derive(Debug)]
pub struct InvalidOpCode(pub u8);

impl std::error::Error for InvalidOpCode {}

impl fmt::Display for InvalidOpCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "invalid opcode 0x{:02X}", self.0)
    }
}

/// How surplus call arguments are received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum VarArg {
    #[default]
    None = 0,
    /// `fn f(a, ...)`
    Unnamed = 1,
    /// `fn f(a, rest...)`
    Named = 2,
}

impl VarArg {
    pub fn is_variadic(self) -> bool {
        self != VarArg::None
    }
}

impl TryFrom<u8> for VarArg {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0 => Ok(VarArg::None),
            1 => Ok(VarArg::Unnamed),
            2 => Ok(VarArg::Named),
            _ => Err(byte),
        }
    }
}

/// Compile-time constant.
///
/// Constants never reference the heap. Strings and functions are
/// turned into heap objects when the VM loads the function that
/// owns the pool.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
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
    Str(SmolStr),
    Function(Rc<Function>),
}

impl Constant {
    /// Whether two constants are interchangeable in a constant pool.
    ///
    /// Functions are never deduplicated. Floats compare by bits so
    /// `NaN` can be pooled.
    fn same(&self, other: &Constant) -> bool {
        match (self, other) {
            (Constant::F32(a), Constant::F32(b)) => a.to_bits() == b.to_bits(),
            (Constant::F64(a), Constant::F64(b)) => a.to_bits() == b.to_bits(),
            (Constant::Function(_), _) | (_, Constant::Function(_)) => false,
            (a, b) => a == b,
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Null => write!(f, "null"),
            Constant::Bool(v) => write!(f, "{v}"),
            Constant::Char(v) => write!(f, "{v:?}"),
            Constant::I8(v) => write!(f, "{v}i8"),
            Constant::U8(v) => write!(f, "{v}u8"),
            Constant::I16(v) => write!(f, "{v}i16"),
            Constant::U16(v) => write!(f, "{v}u16"),
            Constant::I32(v) => write!(f, "{v}i32"),
            Constant::U32(v) => write!(f, "{v}u32"),
            Constant::I64(v) => write!(f, "{v}"),
            Constant::U64(v) => write!(f, "{v}u64"),
            Constant::F32(v) => write!(f, "{v:?}f32"),
            Constant::F64(v) => write!(f, "{v:?}"),
            Constant::Str(v) => write!(f, "{v:?}"),
            Constant::Function(func) => write!(f, "<fn {}>", func.name),
        }
    }
}

/// Opcode sequence, with one source line per code byte, and the
/// constant pool the code indexes into.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Chunk {
    pub code: Vec<u8>,
    pub constants: Vec<Constant>,
    pub lines: Vec<u32>,
}

impl Chunk {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn write_op(&mut self, op: OpCode, line: u32) {
        self.write_u8(op as u8, line);
    }

    #[inline]
    pub fn write_u8(&mut self, byte: u8, line: u32) {
        self.code.push(byte);
        self.lines.push(line);
    }

    pub fn write_u16(&mut self, value: u16, line: u32) {
        for byte in value.to_le_bytes() {
            self.write_u8(byte, line);
        }
    }

    #[inline]
    pub fn read_u8(&self, offset: usize) -> u8 {
        self.code[offset]
    }

    #[inline]
    pub fn read_u16(&self, offset: usize) -> u16 {
        u16::from_le_bytes([self.code[offset], self.code[offset + 1]])
    }

    /// Overwrite a previously written `u16` operand.
    pub fn patch_u16(&mut self, offset: usize, value: u16) {
        let [lo, hi] = value.to_le_bytes();
        self.code[offset] = lo;
        self.code[offset + 1] = hi;
    }

    /// Add a constant to the pool, reusing an equal entry when present.
    ///
    /// Returns `None` when the pool is full.
    pub fn add_constant(&mut self, constant: Constant) -> Option<u16> {
        if let Some(index) = self.constants.iter().position(|c| c.same(&constant)) {
            return Some(index as u16);
        }
        let index = u16::try_from(self.constants.len()).ok()?;
        self.constants.push(constant);
        Some(index)
    }

    /// Source line of the instruction at the given byte offset.
    pub fn line(&self, offset: usize) -> u32 {
        self.lines.get(offset).copied().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }
}

/// Compiled function prototype.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Function {
    pub name: SmolStr,
    /// Number of declared parameters, excluding the rest parameter.
    pub arity: u8,
    pub varargs: VarArg,
    pub upvalue_count: u8,
    pub chunk: Chunk,
}

impl Function {
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Number of stack slots used by the receiver and parameters,
    /// including the packed rest array.
    pub fn param_slots(&self) -> usize {
        1 + self.arity as usize + usize::from(self.varargs.is_variadic())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_opcode_table_matches_discriminants() {
        for (index, op) in OpCode::ALL.iter().enumerate() {
            assert_eq!(*op as u8 as usize, index, "{op:?}");
            assert_eq!(OpCode::try_from(index as u8).unwrap(), *op);
        }
        assert!(OpCode::try_from(0xFF).is_err());
    }

    #[test]
    fn test_constant_dedup() {
        let mut chunk = Chunk::new();
        let a = chunk.add_constant(Constant::I64(7)).unwrap();
        let b = chunk.add_constant(Constant::Str("x".into())).unwrap();
        let c = chunk.add_constant(Constant::I64(7)).unwrap();
        let d = chunk.add_constant(Constant::I32(7)).unwrap();
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_ne!(a, d);

        let f = Rc::new(Function::new("f"));
        let e1 = chunk.add_constant(Constant::Function(f.clone())).unwrap();
        let e2 = chunk.add_constant(Constant::Function(f)).unwrap();
        assert_ne!(e1, e2);
    }

    #[test]
    fn test_patch_u16() {
        let mut chunk = Chunk::new();
        chunk.write_op(OpCode::Jump, 1);
        chunk.write_u16(0xFFFF, 1);
        chunk.patch_u16(1, 0x0102);
        assert_eq!(chunk.read_u16(1), 0x0102);
        assert_eq!(chunk.line(2), 1);
    }
}
