//! Disassembler.
use std::fmt::{self, Write as FmtWrite};

use crate::chunk::{Chunk, Constant, Function, OpCode};

pub struct Disassembler<'a> {
    function: &'a Function,
}

impl<'a> Disassembler<'a> {
    pub fn new(function: &'a Function) -> Self {
        Self { function }
    }

    fn chunk(&self) -> &'a Chunk {
        &self.function.chunk
    }

    fn byte(&self, offset: usize) -> u8 {
        self.chunk().code.get(offset).copied().unwrap_or_default()
    }

    fn word(&self, offset: usize) -> u16 {
        u16::from_le_bytes([self.byte(offset), self.byte(offset + 1)])
    }

    /// Write the function and every function nested in its constants.
    pub fn disassemble<W: FmtWrite>(&self, w: &mut W) -> fmt::Result {
        let function = self.function;
        writeln!(
            w,
            "== {} (arity {}, upvalues {}) ==",
            function.name, function.arity, function.upvalue_count
        )?;

        let mut cursor = 0;
        while cursor < self.chunk().len() {
            cursor = self.instruction(w, cursor)?;
        }

        for constant in &self.chunk().constants {
            if let Constant::Function(nested) = constant {
                writeln!(w)?;
                Disassembler::new(nested).disassemble(w)?;
            }
        }
        Ok(())
    }

    /// Write a single instruction, returning the offset of the next one.
    pub fn instruction<W: FmtWrite>(&self, w: &mut W, cursor: usize) -> Result<usize, fmt::Error> {
        let op = match OpCode::try_from(self.byte(cursor)) {
            Ok(op) => op,
            Err(err) => {
                writeln!(w, "{:04X}: <{}>", cursor, err)?;
                return Ok(cursor + 1);
            }
        };

        use OpCode::*;
        match op {
            Constant | GetMember | SetMember | GetBase | Field | Decl | Enum | EnumItem => {
                self.dis_constant(w, cursor, op)?
            }
            GetLocal | SetLocal | GetUpvalue | SetUpvalue | RefLocal | RefUpvalue | Call | New
            | Return => self.dis_u8(w, cursor, op)?,
            GetGlobal | SetGlobal | DefineGlobal | RefGlobal | Array | Dict | Struct => {
                self.dis_u16(w, cursor, op)?
            }
            Jump | JumpIfFalse => self.dis_jump(w, cursor, op, true)?,
            Loop => self.dis_jump(w, cursor, op, false)?,
            Closure => return self.dis_closure(w, cursor),
            Class => {
                let parents = self.byte(cursor + 3);
                self.dis_constant_with(w, cursor, op, &format!(" parents={parents}"))?
            }
            Module => {
                let count = self.word(cursor + 3);
                self.dis_constant_with(w, cursor, op, &format!(" members={count}"))?
            }
            _ => self.dis_simple(w, cursor, op)?,
        }
        Ok(cursor + 1 + op.operand_size())
    }

    fn dis_simple<W: FmtWrite>(&self, w: &mut W, cursor: usize, op: OpCode) -> fmt::Result {
        writeln!(w, "{:04X}: {:?}", cursor, op)
    }

    fn dis_u8<W: FmtWrite>(&self, w: &mut W, cursor: usize, op: OpCode) -> fmt::Result {
        writeln!(w, "{:04X}: {:<14} {}", cursor, name(op), self.byte(cursor + 1))
    }

    fn dis_u16<W: FmtWrite>(&self, w: &mut W, cursor: usize, op: OpCode) -> fmt::Result {
        writeln!(w, "{:04X}: {:<14} {}", cursor, name(op), self.word(cursor + 1))
    }

    fn dis_constant<W: FmtWrite>(&self, w: &mut W, cursor: usize, op: OpCode) -> fmt::Result {
        self.dis_constant_with(w, cursor, op, "")
    }

    fn dis_constant_with<W: FmtWrite>(
        &self,
        w: &mut W,
        cursor: usize,
        op: OpCode,
        suffix: &str,
    ) -> fmt::Result {
        let index = self.word(cursor + 1);
        match self.chunk().constants.get(index as usize) {
            Some(constant) => writeln!(
                w,
                "{:04X}: {:<14} {:04} {}{}",
                cursor, name(op), index, constant, suffix
            ),
            None => writeln!(w, "{:04X}: {:<14} {:04} <missing>{}", cursor, name(op), index, suffix),
        }
    }

    fn dis_jump<W: FmtWrite>(
        &self,
        w: &mut W,
        cursor: usize,
        op: OpCode,
        forward: bool,
    ) -> fmt::Result {
        let distance = self.word(cursor + 1) as usize;
        let next = cursor + 3;
        let target = if forward {
            next + distance
        } else {
            next.saturating_sub(distance)
        };
        writeln!(w, "{:04X}: {:<14} {:04X}", cursor, name(op), target)
    }

    fn dis_closure<W: FmtWrite>(&self, w: &mut W, cursor: usize) -> Result<usize, fmt::Error> {
        self.dis_constant(w, cursor, OpCode::Closure)?;
        let index = self.word(cursor + 1) as usize;
        let count = match self.chunk().constants.get(index) {
            Some(Constant::Function(function)) => function.upvalue_count as usize,
            _ => 0,
        };

        let mut offset = cursor + 3;
        for _ in 0..count {
            let kind = if self.byte(offset) == 1 { "local" } else { "upvalue" };
            writeln!(w, "{:04X}: |              {} {}", offset, kind, self.byte(offset + 1))?;
            offset += 2;
        }
        Ok(offset)
    }
}

/// Opcode name as an owned string, so format width applies.
fn name(op: OpCode) -> String {
    format!("{op:?}")
}

/// Listing of a function tree.
pub fn disassemble(function: &Function) -> String {
    let mut s = String::new();
    // Writing into a String cannot fail.
    let _ = Disassembler::new(function).disassemble(&mut s);
    s
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::chunk::Constant;

    #[test]
    fn test_simple_listing() {
        let mut function = Function::new("f");
        let index = function.chunk.add_constant(Constant::I64(42)).unwrap();
        function.chunk.write_op(OpCode::Constant, 1);
        function.chunk.write_u16(index, 1);
        function.chunk.write_op(OpCode::Neg, 1);
        function.chunk.write_op(OpCode::Return, 1);
        function.chunk.write_u8(1, 1);

        let listing = disassemble(&function);
        let lines: Vec<&str> = listing.lines().collect();
        assert_eq!(lines[0], "== f (arity 0, upvalues 0) ==");
        assert!(lines[1].starts_with("0000: Constant"));
        assert!(lines[1].ends_with("0000 42"));
        assert_eq!(lines[2], "0003: Neg");
        assert!(lines[3].starts_with("0004: Return"));
    }

    #[test]
    fn test_jump_target() {
        let mut function = Function::new("j");
        function.chunk.write_op(OpCode::Jump, 1);
        function.chunk.write_u16(1, 1);
        function.chunk.write_op(OpCode::Pop, 1);
        function.chunk.write_op(OpCode::Loop, 1);
        function.chunk.write_u16(7, 1);

        let listing = disassemble(&function);
        assert!(listing.contains("0000: Jump           0004"));
        assert!(listing.contains("0004: Loop           0000"));
    }

    #[test]
    fn test_invalid_opcode() {
        let mut function = Function::new("bad");
        function.chunk.write_u8(0xFE, 1);
        assert!(disassemble(&function).contains("<invalid opcode 0xFE>"));
    }
}
