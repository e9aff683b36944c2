//! Binary encoding of compiled function trees.
//!
//! Layout, all integers little-endian:
//!
//! ```text
//! magic "EMBR", u16 version
//! function := name, arity u8, varargs u8, upvalue_count u8,
//!             code (u32 len + bytes), lines (u32 count + u32 each),
//!             constants (u32 count + tagged constant each)
//! ```
use std::{io, rc::Rc};

use smol_str::SmolStr;

use crate::{
    chunk::{Chunk, Constant, Function, VarArg},
    error::{EmberError, EmberResult},
};

pub const MAGIC: &[u8; 4] = b"EMBR";
pub const FORMAT_VERSION: u16 = 1;

/// Nesting limit for function constants.
const MAX_DEPTH: usize = 256;

mod tag {
    pub const NULL: u8 = 0;
    pub const BOOL: u8 = 1;
    pub const CHAR: u8 = 2;
    pub const I8: u8 = 3;
    pub const U8: u8 = 4;
    pub const I16: u8 = 5;
    pub const U16: u8 = 6;
    pub const I32: u8 = 7;
    pub const U32: u8 = 8;
    pub const I64: u8 = 9;
    pub const U64: u8 = 10;
    pub const F32: u8 = 11;
    pub const F64: u8 = 12;
    pub const STR: u8 = 13;
    pub const FUNCTION: u8 = 14;
}

pub fn serialize(function: &Function) -> Vec<u8> {
    let mut buf = Vec::with_capacity(64 + function.chunk.len());
    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    write_function(&mut buf, function);
    buf
}

pub fn write_to(function: &Function, w: &mut impl io::Write) -> EmberResult<()> {
    w.write_all(&serialize(function))?;
    Ok(())
}

fn write_len(buf: &mut Vec<u8>, len: usize) {
    buf.extend_from_slice(&(len as u32).to_le_bytes());
}

fn write_str(buf: &mut Vec<u8>, s: &str) {
    write_len(buf, s.len());
    buf.extend_from_slice(s.as_bytes());
}

fn write_function(buf: &mut Vec<u8>, function: &Function) {
    write_str(buf, &function.name);
    buf.push(function.arity);
    buf.push(function.varargs as u8);
    buf.push(function.upvalue_count);

    let chunk = &function.chunk;
    write_len(buf, chunk.code.len());
    buf.extend_from_slice(&chunk.code);
    write_len(buf, chunk.lines.len());
    for line in &chunk.lines {
        buf.extend_from_slice(&line.to_le_bytes());
    }
    write_len(buf, chunk.constants.len());
    for constant in &chunk.constants {
        write_constant(buf, constant);
    }
}

fn write_constant(buf: &mut Vec<u8>, constant: &Constant) {
    match constant {
        Constant::Null => buf.push(tag::NULL),
        Constant::Bool(v) => buf.extend_from_slice(&[tag::BOOL, *v as u8]),
        Constant::Char(v) => {
            buf.push(tag::CHAR);
            buf.extend_from_slice(&(*v as u32).to_le_bytes());
        }
        Constant::I8(v) => {
            buf.push(tag::I8);
            buf.extend_from_slice(&v.to_le_bytes());
        }
        Constant::U8(v) => buf.extend_from_slice(&[tag::U8, *v]),
        Constant::I16(v) => {
            buf.push(tag::I16);
            buf.extend_from_slice(&v.to_le_bytes());
        }
        Constant::U16(v) => {
            buf.push(tag::U16);
            buf.extend_from_slice(&v.to_le_bytes());
        }
        Constant::I32(v) => {
            buf.push(tag::I32);
            buf.extend_from_slice(&v.to_le_bytes());
        }
        Constant::U32(v) => {
            buf.push(tag::U32);
            buf.extend_from_slice(&v.to_le_bytes());
        }
        Constant::I64(v) => {
            buf.push(tag::I64);
            buf.extend_from_slice(&v.to_le_bytes());
        }
        Constant::U64(v) => {
            buf.push(tag::U64);
            buf.extend_from_slice(&v.to_le_bytes());
        }
        Constant::F32(v) => {
            buf.push(tag::F32);
            buf.extend_from_slice(&v.to_bits().to_le_bytes());
        }
        Constant::F64(v) => {
            buf.push(tag::F64);
            buf.extend_from_slice(&v.to_bits().to_le_bytes());
        }
        Constant::Str(s) => {
            buf.push(tag::STR);
            write_str(buf, s);
        }
        Constant::Function(f) => {
            buf.push(tag::FUNCTION);
            write_function(buf, f);
        }
    }
}

// ----------------------------------------------------------------------------
// Reading

pub fn deserialize(bytes: &[u8]) -> EmberResult<Function> {
    let mut reader = Reader { bytes, cursor: 0 };

    if reader.take(MAGIC.len())? != MAGIC {
        return Err(EmberError::bytecode("bad magic number"));
    }
    let version = u16::from_le_bytes(reader.array()?);
    if version != FORMAT_VERSION {
        return Err(EmberError::bytecode(format!(
            "unsupported format version {version}, expected {FORMAT_VERSION}"
        )));
    }

    let function = reader.function(0)?;
    if reader.cursor != bytes.len() {
        return Err(EmberError::bytecode(format!(
            "{} trailing bytes",
            bytes.len() - reader.cursor
        )));
    }
    log::debug!("loaded function '{}' from {} bytes", function.name, bytes.len());
    Ok(function)
}

pub fn read_from(r: &mut impl io::Read) -> EmberResult<Function> {
    let mut bytes = Vec::new();
    r.read_to_end(&mut bytes)?;
    deserialize(&bytes)
}

struct Reader<'a> {
    bytes: &'a [u8],
    cursor: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, count: usize) -> EmberResult<&'a [u8]> {
        let end = self
            .cursor
            .checked_add(count)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| {
                EmberError::bytecode(format!("unexpected end of input at byte {}", self.cursor))
            })?;
        let slice = &self.bytes[self.cursor..end];
        self.cursor = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> EmberResult<[u8; N]> {
        let mut array = [0; N];
        array.copy_from_slice(self.take(N)?);
        Ok(array)
    }

    fn u8(&mut self) -> EmberResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> EmberResult<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn len(&mut self) -> EmberResult<usize> {
        Ok(self.u32()? as usize)
    }

    fn str(&mut self) -> EmberResult<SmolStr> {
        let len = self.len()?;
        let bytes = self.take(len)?;
        let s = std::str::from_utf8(bytes)
            .map_err(|err| EmberError::bytecode(format!("invalid string: {err}")))?;
        Ok(SmolStr::new(s))
    }

    fn function(&mut self, depth: usize) -> EmberResult<Function> {
        if depth > MAX_DEPTH {
            return Err(EmberError::bytecode("functions nested too deeply"));
        }

        let name = self.str()?;
        let arity = self.u8()?;
        let varargs = VarArg::try_from(self.u8()?)
            .map_err(|b| EmberError::bytecode(format!("invalid varargs mode {b}")))?;
        let upvalue_count = self.u8()?;

        let len = self.len()?;
        let code = self.take(len)?.to_vec();

        let count = self.len()?;
        if count != code.len() {
            return Err(EmberError::bytecode(format!(
                "function '{name}' has {count} line entries for {} code bytes",
                code.len()
            )));
        }
        let lines = (0..count)
            .map(|_| self.u32())
            .collect::<EmberResult<Vec<_>>>()?;

        let count = self.len()?;
        let mut constants = Vec::with_capacity(count.min(u16::MAX as usize + 1));
        for _ in 0..count {
            constants.push(self.constant(depth)?);
        }

        Ok(Function {
            name,
            arity,
            varargs,
            upvalue_count,
            chunk: Chunk {
                code,
                constants,
                lines,
            },
        })
    }

    fn constant(&mut self, depth: usize) -> EmberResult<Constant> {
        Ok(match self.u8()? {
            tag::NULL => Constant::Null,
            tag::BOOL => Constant::Bool(self.u8()? != 0),
            tag::CHAR => {
                let code = self.u32()?;
                let c = char::from_u32(code)
                    .ok_or_else(|| EmberError::bytecode(format!("invalid char {code:#X}")))?;
                Constant::Char(c)
            }
            tag::I8 => Constant::I8(i8::from_le_bytes(self.array()?)),
            tag::U8 => Constant::U8(self.u8()?),
            tag::I16 => Constant::I16(i16::from_le_bytes(self.array()?)),
            tag::U16 => Constant::U16(u16::from_le_bytes(self.array()?)),
            tag::I32 => Constant::I32(i32::from_le_bytes(self.array()?)),
            tag::U32 => Constant::U32(self.u32()?),
            tag::I64 => Constant::I64(i64::from_le_bytes(self.array()?)),
            tag::U64 => Constant::U64(u64::from_le_bytes(self.array()?)),
            tag::F32 => Constant::F32(f32::from_bits(self.u32()?)),
            tag::F64 => Constant::F64(f64::from_bits(u64::from_le_bytes(self.array()?))),
            tag::STR => Constant::Str(self.str()?),
            tag::FUNCTION => Constant::Function(Rc::new(self.function(depth + 1)?)),
            other => {
                return Err(EmberError::bytecode(format!(
                    "unknown constant tag {other} at byte {}",
                    self.cursor - 1
                )))
            }
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::chunk::OpCode;

    fn sample() -> Function {
        let mut inner = Function::new("inner");
        inner.arity = 2;
        inner.varargs = VarArg::Named;
        inner.upvalue_count = 1;
        inner.chunk.add_constant(Constant::Char('λ'));
        inner.chunk.write_op(OpCode::Return, 7);
        inner.chunk.write_u8(0, 7);

        let mut main = Function::new("main");
        for constant in [
            Constant::Null,
            Constant::Bool(true),
            Constant::I8(-3),
            Constant::U16(512),
            Constant::U64(u64::MAX),
            Constant::F32(1.5),
            Constant::F64(-0.25),
            Constant::Str("hello".into()),
            Constant::Function(Rc::new(inner)),
        ] {
            main.chunk.add_constant(constant);
        }
        main.chunk.write_op(OpCode::Null, 1);
        main.chunk.write_op(OpCode::Return, 2);
        main.chunk.write_u8(1, 2);
        main
    }

    #[test]
    fn test_round_trip() {
        let function = sample();
        let bytes = serialize(&function);
        assert_eq!(&bytes[..4], MAGIC);
        assert_eq!(deserialize(&bytes).unwrap(), function);
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = serialize(&sample());
        bytes[0] = b'X';
        assert!(matches!(deserialize(&bytes), Err(EmberError::Bytecode(_))));
    }

    #[test]
    fn test_version_mismatch() {
        let mut bytes = serialize(&sample());
        bytes[4] = 9;
        let err = deserialize(&bytes).unwrap_err();
        assert!(err.to_string().contains("version 9"), "{err}");
    }

    #[test]
    fn test_truncated_input() {
        let bytes = serialize(&sample());
        for len in [0, 3, 6, 10, bytes.len() - 1] {
            assert!(
                matches!(deserialize(&bytes[..len]), Err(EmberError::Bytecode(_))),
                "length {len}"
            );
        }
    }

    #[test]
    fn test_unknown_tag() {
        let mut function = Function::new("f");
        function.chunk.add_constant(Constant::Null);
        let mut bytes = serialize(&function);
        // The only constant tag is the last byte.
        *bytes.last_mut().unwrap() = 99;
        let err = deserialize(&bytes).unwrap_err();
        assert!(err.to_string().contains("unknown constant tag 99"), "{err}");
    }
}
