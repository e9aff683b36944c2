//! Bytecode dispatch loop.
use smol_str::SmolStr;

use super::Vm;
use crate::{
    chunk::OpCode,
    error::{EmberError, EmberResult},
    heap::Handle,
    object::{find_member_mut, Class, Closure, EnumObject, ModuleObject, Object, RefTarget},
    value::{binary_op, unary_op, BinaryOp, UnaryOp, Value},
};

use super::place::Place;

impl Vm {
    // ------------------------------------------------------------------------
    // Stack and operand access

    pub(super) fn runtime_error(&self, message: impl ToString) -> EmberError {
        let line = self
            .heap
            .frames
            .last()
            .map(|frame| frame.function.chunk.line(frame.ip.saturating_sub(1)))
            .unwrap_or_default();
        EmberError::runtime(message, line)
    }

    #[inline]
    pub(super) fn pop(&mut self) -> EmberResult<Value> {
        self.heap
            .stack
            .pop()
            .ok_or_else(|| self.runtime_error("stack underflow"))
    }

    #[inline]
    pub(super) fn peek(&self, distance: usize) -> EmberResult<Value> {
        let stack = &self.heap.stack;
        stack
            .len()
            .checked_sub(distance + 1)
            .map(|index| stack[index])
            .ok_or_else(|| self.runtime_error("stack underflow"))
    }

    /// Remove the top `count` values, bottom first.
    pub(super) fn pop_n(&mut self, count: usize) -> EmberResult<Vec<Value>> {
        let len = self.heap.stack.len();
        if count > len {
            return Err(self.runtime_error("stack underflow"));
        }
        Ok(self.heap.stack.split_off(len - count))
    }

    fn read_u8(&mut self) -> EmberResult<u8> {
        let frame = self
            .heap
            .frames
            .last_mut()
            .ok_or_else(|| EmberError::runtime("no active call frame", 0))?;
        match frame.function.chunk.code.get(frame.ip) {
            Some(byte) => {
                frame.ip += 1;
                Ok(*byte)
            }
            None => Err(EmberError::bytecode(format!(
                "instruction pointer {:04X} out of bounds in '{}'",
                frame.ip, frame.function.name
            ))),
        }
    }

    fn read_u16(&mut self) -> EmberResult<u16> {
        let lo = self.read_u8()?;
        let hi = self.read_u8()?;
        Ok(u16::from_le_bytes([lo, hi]))
    }

    fn jump(&mut self, offset: u16, forward: bool) -> EmberResult<()> {
        let frame = self
            .heap
            .frames
            .last_mut()
            .ok_or_else(|| EmberError::runtime("no active call frame", 0))?;
        if forward {
            frame.ip += offset as usize;
        } else {
            frame.ip = frame
                .ip
                .checked_sub(offset as usize)
                .ok_or_else(|| EmberError::bytecode("loop jumps before function start"))?;
        }
        Ok(())
    }

    fn frame_slots(&self) -> EmberResult<usize> {
        self.heap
            .frames
            .last()
            .map(|frame| frame.slots)
            .ok_or_else(|| EmberError::runtime("no active call frame", 0))
    }

    fn constant(&self, index: u16) -> EmberResult<Value> {
        let handle = self
            .heap
            .frames
            .last()
            .map(|frame| frame.function_object)
            .ok_or_else(|| EmberError::runtime("no active call frame", 0))?;
        match self.heap.get(handle) {
            Some(Object::Function(f)) => f
                .constants
                .get(index as usize)
                .copied()
                .ok_or_else(|| EmberError::bytecode(format!("constant {index} out of range"))),
            _ => Err(self.runtime_error("frame function was collected")),
        }
    }

    /// String constant used as a member name.
    fn name_constant(&self, index: u16) -> EmberResult<SmolStr> {
        let value = self.constant(index)?;
        self.heap
            .as_str(&value)
            .map(SmolStr::new)
            .ok_or_else(|| EmberError::bytecode(format!("constant {index} is not a name")))
    }

    fn read_name(&mut self) -> EmberResult<SmolStr> {
        let index = self.read_u16()?;
        self.name_constant(index)
    }

    fn current_upvalue(&self, index: u8) -> EmberResult<Handle> {
        let closure = self
            .heap
            .frames
            .last()
            .map(|frame| frame.closure)
            .ok_or_else(|| EmberError::runtime("no active call frame", 0))?;
        match self.heap.get(closure) {
            Some(Object::Closure(c)) => c
                .upvalues
                .get(index as usize)
                .copied()
                .ok_or_else(|| EmberError::bytecode(format!("upvalue {index} out of range"))),
            _ => Err(self.runtime_error("frame closure was collected")),
        }
    }

    pub(super) fn push_object(&mut self, object: Object) -> EmberResult<()> {
        let handle = self.heap.alloc(object);
        self.heap.push(Value::Object(handle))
    }

    // ------------------------------------------------------------------------
    // Dispatch

    /// Execute until the outermost frame returns.
    pub(super) fn execute(&mut self) -> EmberResult<Vec<Value>> {
        loop {
            #[cfg(feature = "op_trace")]
            self.op_trace();

            let op = OpCode::try_from(self.read_u8()?)
                .map_err(|err| EmberError::bytecode(err.to_string()))?;

            match op {
                OpCode::Constant => {
                    let index = self.read_u16()?;
                    let value = self.constant(index)?;
                    self.heap.push(value)?;
                }
                OpCode::Null => self.heap.push(Value::Null)?,
                OpCode::True => self.heap.push(Value::Bool(true))?,
                OpCode::False => self.heap.push(Value::Bool(false))?,
                OpCode::Pop => {
                    self.pop()?;
                }
                OpCode::Dup => {
                    let value = self.peek(0)?;
                    self.heap.push(value)?;
                }
                OpCode::Dup2 => {
                    let a = self.peek(1)?;
                    let b = self.peek(0)?;
                    self.heap.push(a)?;
                    self.heap.push(b)?;
                }

                // ------------------------------------------------------------
                // Variables
                OpCode::GetLocal => {
                    let slot = self.frame_slots()? + self.read_u8()? as usize;
                    let value = self.load(Place::Stack(slot))?;
                    self.heap.push(value)?;
                }
                OpCode::SetLocal => {
                    let slot = self.frame_slots()? + self.read_u8()? as usize;
                    let value = self.peek(0)?;
                    self.store(Place::Stack(slot), value)?;
                }
                OpCode::GetGlobal => {
                    let slot = self.read_u16()? as usize;
                    if self.heap.global(slot).is_none() {
                        return Err(self.runtime_error(format!("undefined global in slot {slot}")));
                    }
                    let value = self.load(Place::Global(slot))?;
                    self.heap.push(value)?;
                }
                OpCode::SetGlobal => {
                    let slot = self.read_u16()? as usize;
                    if self.heap.global(slot).is_none() {
                        return Err(self.runtime_error(format!(
                            "assignment to undefined global in slot {slot}"
                        )));
                    }
                    let value = self.peek(0)?;
                    self.store(Place::Global(slot), value)?;
                }
                OpCode::DefineGlobal => {
                    let slot = self.read_u16()? as usize;
                    let value = self.pop()?;
                    self.heap.set_global(slot, value)?;
                }
                OpCode::GetUpvalue => {
                    let index = self.read_u8()?;
                    let upvalue = self.current_upvalue(index)?;
                    let value = self.load(Place::Upvalue(upvalue))?;
                    self.heap.push(value)?;
                }
                OpCode::SetUpvalue => {
                    let index = self.read_u8()?;
                    let upvalue = self.current_upvalue(index)?;
                    let value = self.peek(0)?;
                    self.store(Place::Upvalue(upvalue), value)?;
                }
                OpCode::RefLocal => {
                    let slot = self.frame_slots()? + self.read_u8()? as usize;
                    let upvalue = self.heap.capture_upvalue(slot);
                    self.push_object(Object::Ref(RefTarget::Upvalue(upvalue)))?;
                }
                OpCode::RefGlobal => {
                    let slot = self.read_u16()? as usize;
                    self.push_object(Object::Ref(RefTarget::Global(slot)))?;
                }
                OpCode::RefUpvalue => {
                    let index = self.read_u8()?;
                    let upvalue = self.current_upvalue(index)?;
                    self.push_object(Object::Ref(RefTarget::Upvalue(upvalue)))?;
                }
                OpCode::RefIndex => {
                    let key = self.pop()?;
                    let container = self.pop()?;
                    let handle = self.element_container(container)?;
                    self.push_object(Object::Ref(RefTarget::Element(handle, key)))?;
                }

                // ------------------------------------------------------------
                // Members and elements
                OpCode::GetIndex => {
                    let key = self.pop()?;
                    let container = self.pop()?;
                    let value = self.get_index(container, key)?;
                    self.heap.push(value)?;
                }
                OpCode::SetIndex => {
                    let value = self.pop()?;
                    let key = self.pop()?;
                    let container = self.pop()?;
                    let handle = self.element_container(container)?;
                    self.write_place(Place::Element(handle, key), value)?;
                    self.heap.push(value)?;
                }
                OpCode::GetMember => {
                    let name = self.read_name()?;
                    let target = self.peek(0)?;
                    let value = self.get_member(target, &name)?;
                    // Binding may allocate, keep the target rooted until then.
                    self.pop()?;
                    self.heap.push(value)?;
                }
                OpCode::SetMember => {
                    let name = self.read_name()?;
                    let value = self.pop()?;
                    let target = self.pop()?;
                    self.set_member(target, &name, value)?;
                    self.heap.push(value)?;
                }
                OpCode::GetBase => {
                    let name = self.read_name()?;
                    let receiver = self.peek(0)?;
                    let value = self.get_base(receiver, &name)?;
                    self.pop()?;
                    self.heap.push(value)?;
                }

                // ------------------------------------------------------------
                // Operators
                OpCode::Add => self.binary(BinaryOp::Add)?,
                OpCode::Sub => self.binary(BinaryOp::Sub)?,
                OpCode::Mul => self.binary(BinaryOp::Mul)?,
                OpCode::Div => self.binary(BinaryOp::Div)?,
                OpCode::Rem => self.binary(BinaryOp::Rem)?,
                OpCode::BitAnd => self.binary(BinaryOp::BitAnd)?,
                OpCode::BitOr => self.binary(BinaryOp::BitOr)?,
                OpCode::BitXor => self.binary(BinaryOp::BitXor)?,
                OpCode::Shl => self.binary(BinaryOp::Shl)?,
                OpCode::Shr => self.binary(BinaryOp::Shr)?,
                OpCode::Eq => self.binary(BinaryOp::Eq)?,
                OpCode::Ne => self.binary(BinaryOp::Ne)?,
                OpCode::Lt => self.binary(BinaryOp::Lt)?,
                OpCode::Le => self.binary(BinaryOp::Le)?,
                OpCode::Gt => self.binary(BinaryOp::Gt)?,
                OpCode::Ge => self.binary(BinaryOp::Ge)?,
                OpCode::Neg => self.unary(UnaryOp::Neg)?,
                OpCode::Not => self.unary(UnaryOp::Not)?,
                OpCode::BitNot => self.unary(UnaryOp::BitNot)?,
                OpCode::Factorial => self.unary(UnaryOp::Factorial)?,
                OpCode::Inc => self.unary(UnaryOp::Inc)?,
                OpCode::Dec => self.unary(UnaryOp::Dec)?,

                // ------------------------------------------------------------
                // Control flow
                OpCode::Jump => {
                    let offset = self.read_u16()?;
                    self.jump(offset, true)?;
                }
                OpCode::JumpIfFalse => {
                    let offset = self.read_u16()?;
                    if self.peek(0)?.is_falsey() {
                        self.jump(offset, true)?;
                    }
                }
                OpCode::Loop => {
                    let offset = self.read_u16()?;
                    self.jump(offset, false)?;
                }
                OpCode::Call => {
                    let argc = self.read_u8()?;
                    let callee = self.peek(argc as usize)?;
                    self.call_value(callee, argc)?;
                }
                OpCode::New => {
                    let argc = self.read_u8()?;
                    self.construct(argc)?;
                }
                OpCode::Closure => {
                    let index = self.read_u16()?;
                    self.make_closure(index)?;
                }
                OpCode::CloseUpvalue => {
                    let top = self.heap.stack.len().saturating_sub(1);
                    self.heap.close_upvalues(top);
                    self.pop()?;
                }
                OpCode::Return => {
                    let count = self.read_u8()?;
                    if let Some(values) = self.return_from(count)? {
                        return Ok(values);
                    }
                }

                // ------------------------------------------------------------
                // Constructors
                OpCode::Array => {
                    let count = self.read_u16()? as usize;
                    let items = self.pop_n(count)?;
                    self.push_object(Object::Array(items))?;
                }
                OpCode::Dict => {
                    let count = self.read_u16()? as usize;
                    let flat = self.pop_n(count * 2)?;
                    let mut pairs: Vec<(Value, Value)> = Vec::with_capacity(count);
                    for (key, value) in flat.chunks_exact(2).map(|pair| (pair[0], pair[1])) {
                        match pairs.iter().position(|(k, _)| self.heap.values_equal(k, &key)) {
                            Some(index) => pairs[index].1 = value,
                            None => pairs.push((key, value)),
                        }
                    }
                    self.push_object(Object::Dict(pairs))?;
                }
                OpCode::Struct => {
                    let count = self.read_u16()? as usize;
                    let members = self.named_members(count)?;
                    self.push_object(Object::Struct(members))?;
                }
                OpCode::Class => {
                    let name = self.read_name()?;
                    let count = self.read_u8()? as usize;
                    let parents = self
                        .pop_n(count)?
                        .into_iter()
                        .map(|parent| match parent {
                            Value::Object(h) if matches!(self.heap.get(h), Some(Object::Class(_))) => {
                                Ok(h)
                            }
                            other => Err(self.runtime_error(format!(
                                "class '{name}' cannot inherit from {}",
                                self.heap.type_name(&other)
                            ))),
                        })
                        .collect::<EmberResult<Vec<_>>>()?;
                    self.push_object(Object::Class(Class {
                        name,
                        parents,
                        ..Default::default()
                    }))?;
                }
                OpCode::Field | OpCode::Decl => {
                    let name = self.read_name()?;
                    let value = self.pop()?;
                    let class = self.peek(0)?;
                    let added = match class.as_object().and_then(|h| self.heap.get_mut(h)) {
                        Some(Object::Class(class)) => {
                            let members = if op == OpCode::Field {
                                &mut class.fields
                            } else {
                                &mut class.decls
                            };
                            match find_member_mut(members, &name) {
                                Some(slot) => *slot = value,
                                None => members.push((name, value)),
                            }
                            true
                        }
                        _ => false,
                    };
                    if !added {
                        return Err(self.runtime_error("class member outside of a class"));
                    }
                }
                OpCode::Enum => {
                    let name = self.read_name()?;
                    self.push_object(Object::Enum(EnumObject {
                        name,
                        items: Vec::new(),
                    }))?;
                }
                OpCode::EnumItem => {
                    let name = self.read_name()?;
                    let value = self.pop()?;
                    let target = self.peek(0)?;
                    let added = match target.as_object().and_then(|h| self.heap.get_mut(h)) {
                        Some(Object::Enum(e)) => {
                            e.items.push((name, value));
                            true
                        }
                        _ => false,
                    };
                    if !added {
                        return Err(self.runtime_error("enum item outside of an enum"));
                    }
                }
                OpCode::Module => {
                    let name = self.read_name()?;
                    let count = self.read_u16()? as usize;
                    let members = self.named_members(count)?;
                    self.push_object(Object::Module(ModuleObject { name, members }))?;
                }
            }
        }
    }

    /// Pop `count` name/value pairs.
    fn named_members(&mut self, count: usize) -> EmberResult<Vec<(SmolStr, Value)>> {
        let flat = self.pop_n(count * 2)?;
        let mut members: Vec<(SmolStr, Value)> = Vec::with_capacity(count);
        for pair in flat.chunks_exact(2) {
            let name = self
                .heap
                .as_str(&pair[0])
                .map(SmolStr::new)
                .ok_or_else(|| self.runtime_error("member name must be a string"))?;
            match find_member_mut(&mut members, &name) {
                Some(slot) => *slot = pair[1],
                None => members.push((name, pair[1])),
            }
        }
        Ok(members)
    }

    fn binary(&mut self, op: BinaryOp) -> EmberResult<()> {
        let b = self.peek(0)?;
        let a = self.peek(1)?;

        let result = match (op, a, b) {
            (BinaryOp::Eq, ..) => Value::Bool(self.heap.values_equal(&a, &b)),
            (BinaryOp::Ne, ..) => Value::Bool(!self.heap.values_equal(&a, &b)),
            (BinaryOp::Add, Value::Object(_), _) | (BinaryOp::Add, _, Value::Object(_))
                if self.heap.as_str(&a).is_some() || self.heap.as_str(&b).is_some() =>
            {
                let joined = self.heap.stringify(&a) + &self.heap.stringify(&b);
                // Operands stay on the stack while the result is allocated.
                let handle = self.heap.alloc(Object::Str(joined.into()));
                Value::Object(handle)
            }
            (BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge, _, _)
                if self.heap.as_str(&a).is_some() && self.heap.as_str(&b).is_some() =>
            {
                let (x, y) = (self.heap.as_str(&a), self.heap.as_str(&b));
                Value::Bool(match op {
                    BinaryOp::Lt => x < y,
                    BinaryOp::Le => x <= y,
                    BinaryOp::Gt => x > y,
                    _ => x >= y,
                })
            }
            (_, Value::Object(_), _) | (_, _, Value::Object(_)) => {
                return Err(self.runtime_error(format!(
                    "operator '{op}' is not defined for {} and {}",
                    self.heap.type_name(&a),
                    self.heap.type_name(&b)
                )))
            }
            _ => binary_op(op, a, b).map_err(|message| self.runtime_error(message))?,
        };

        self.pop_n(2)?;
        self.heap.push(result)
    }

    fn unary(&mut self, op: UnaryOp) -> EmberResult<()> {
        let value = self.pop()?;
        let result = match value {
            Value::Object(_) if op != UnaryOp::Not => {
                return Err(self.runtime_error(format!(
                    "operator {op:?} is not defined for {}",
                    self.heap.type_name(&value)
                )))
            }
            _ => unary_op(op, value).map_err(|message| self.runtime_error(message))?,
        };
        self.heap.push(result)
    }

    fn make_closure(&mut self, index: u16) -> EmberResult<()> {
        let function = match self.constant(index)? {
            Value::Object(h) => h,
            _ => return Err(EmberError::bytecode("closure constant is not a function")),
        };
        let count = match self.heap.get(function) {
            Some(Object::Function(f)) => f.function.upvalue_count,
            _ => return Err(EmberError::bytecode("closure constant is not a function")),
        };

        let slots = self.frame_slots()?;
        let mut upvalues = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let is_local = self.read_u8()? == 1;
            let index = self.read_u8()?;
            let upvalue = if is_local {
                self.heap.capture_upvalue(slots + index as usize)
            } else {
                self.current_upvalue(index)?
            };
            upvalues.push(upvalue);
        }

        self.push_object(Object::Closure(Closure { function, upvalues }))
    }

    #[cfg(feature = "op_trace")]
    fn op_trace(&self) {
        if let Some(frame) = self.heap.frames.last() {
            let mut line = String::new();
            let disassembler = crate::disasm::Disassembler::new(&frame.function);
            if disassembler.instruction(&mut line, frame.ip).is_ok() {
                print!("{line}");
            }
        }
    }
}
