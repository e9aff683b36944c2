//! Storage locations, references, elements and members.
use super::Vm;
use crate::{
    constants::MAX_VALUE_DEPTH,
    error::EmberResult,
    heap::Handle,
    object::{find_member, find_member_mut, BoundMethod, Object, RefTarget, Upvalue},
    value::Value,
};

/// Location a value can be read from and written to.
#[derive(Debug, Clone, Copy)]
pub(super) enum Place {
    Stack(usize),
    Global(usize),
    Upvalue(Handle),
    /// Element of an array or entry of a dictionary.
    Element(Handle, Value),
}

impl From<RefTarget> for Place {
    fn from(target: RefTarget) -> Self {
        match target {
            RefTarget::Global(slot) => Place::Global(slot),
            RefTarget::Upvalue(handle) => Place::Upvalue(handle),
            RefTarget::Element(handle, key) => Place::Element(handle, key),
        }
    }
}

impl Vm {
    fn ref_target(&self, value: &Value) -> Option<RefTarget> {
        match value.as_object().and_then(|h| self.heap.get(h)) {
            Some(Object::Ref(target)) => Some(*target),
            _ => None,
        }
    }

    /// Read a place, following references.
    pub(super) fn load(&self, place: Place) -> EmberResult<Value> {
        let mut value = self.read_place(place)?;
        for _ in 0..MAX_VALUE_DEPTH {
            match self.ref_target(&value) {
                Some(target) => value = self.read_place(target.into())?,
                None => return Ok(value),
            }
        }
        Err(self.runtime_error("reference chain too long"))
    }

    /// Write a place. When the place holds a reference the write goes
    /// to the referenced location instead.
    pub(super) fn store(&mut self, place: Place, value: Value) -> EmberResult<()> {
        let mut place = place;
        for _ in 0..MAX_VALUE_DEPTH {
            let current = self.read_place(place)?;
            match self.ref_target(&current) {
                Some(target) => place = target.into(),
                None => return self.write_place(place, value),
            }
        }
        Err(self.runtime_error("reference chain too long"))
    }

    pub(super) fn read_place(&self, place: Place) -> EmberResult<Value> {
        match place {
            Place::Stack(slot) => self
                .heap
                .stack
                .get(slot)
                .copied()
                .ok_or_else(|| self.runtime_error(format!("stack slot {slot} out of range"))),
            Place::Global(slot) => self
                .heap
                .global(slot)
                .ok_or_else(|| self.runtime_error(format!("undefined global in slot {slot}"))),
            Place::Upvalue(handle) => match self.heap.get(handle) {
                Some(Object::Upvalue(upvalue)) => Ok(self.heap.upvalue_value(upvalue)),
                _ => Err(self.runtime_error("dangling upvalue")),
            },
            Place::Element(handle, key) => self.get_index(Value::Object(handle), key),
        }
    }

    pub(super) fn write_place(&mut self, place: Place, value: Value) -> EmberResult<()> {
        match place {
            Place::Stack(slot) => match self.heap.stack.get_mut(slot) {
                Some(stored) => {
                    *stored = value;
                    Ok(())
                }
                None => Err(self.runtime_error(format!("stack slot {slot} out of range"))),
            },
            Place::Global(slot) => self.heap.set_global(slot, value),
            Place::Upvalue(handle) => {
                let open = match self.heap.get_mut(handle) {
                    Some(Object::Upvalue(Upvalue::Open(slot))) => Some(*slot),
                    Some(Object::Upvalue(upvalue)) => {
                        *upvalue = Upvalue::Closed(value);
                        None
                    }
                    _ => return Err(self.runtime_error("dangling upvalue")),
                };
                match open {
                    Some(slot) => self.write_place(Place::Stack(slot), value),
                    None => Ok(()),
                }
            }
            Place::Element(handle, key) => self.set_index(handle, key, value),
        }
    }

    // ------------------------------------------------------------------------
    // Elements

    /// Check that a value can be indexed for writing.
    pub(super) fn element_container(&self, container: Value) -> EmberResult<Handle> {
        match container.as_object().map(|h| (h, self.heap.get(h))) {
            Some((h, Some(Object::Array(_) | Object::Dict(_)))) => Ok(h),
            _ => Err(self.runtime_error(format!(
                "cannot assign to an element of {}",
                self.heap.type_name(&container)
            ))),
        }
    }

    fn dict_position(&self, pairs: &[(Value, Value)], key: &Value) -> Option<usize> {
        pairs
            .iter()
            .position(|(k, _)| self.heap.values_equal(k, key))
    }

    fn array_index(&self, key: &Value, len: usize) -> EmberResult<usize> {
        match key.as_index() {
            Some(index) if index < len => Ok(index),
            Some(_) | None if key.num_kind().is_some() => Err(self.runtime_error(format!(
                "index {key} out of range for length {len}"
            ))),
            _ => Err(self.runtime_error(format!(
                "index must be an integer, found {}",
                self.heap.type_name(key)
            ))),
        }
    }

    pub(super) fn get_index(&self, container: Value, key: Value) -> EmberResult<Value> {
        let object = container.as_object().and_then(|h| self.heap.get(h));
        match object {
            Some(Object::Array(items)) => {
                let index = self.array_index(&key, items.len())?;
                Ok(items[index])
            }
            Some(Object::Dict(pairs)) => Ok(self
                .dict_position(pairs, &key)
                .map_or(Value::Null, |index| pairs[index].1)),
            Some(Object::Str(s)) => {
                let len = s.chars().count();
                let index = self.array_index(&key, len)?;
                Ok(s.chars().nth(index).map_or(Value::Null, Value::Char))
            }
            Some(Object::Struct(fields)) => match self.heap.as_str(&key) {
                Some(name) => find_member(fields, name)
                    .copied()
                    .ok_or_else(|| self.runtime_error(format!("struct has no field '{name}'"))),
                None => Err(self.runtime_error("struct fields are indexed by name")),
            },
            _ => Err(self.runtime_error(format!(
                "cannot index into {}",
                self.heap.type_name(&container)
            ))),
        }
    }

    fn set_index(&mut self, handle: Handle, key: Value, value: Value) -> EmberResult<()> {
        let position = match self.heap.get(handle) {
            Some(Object::Array(items)) => Some(self.array_index(&key, items.len())?),
            Some(Object::Dict(pairs)) => self.dict_position(pairs, &key),
            _ => {
                return Err(self.runtime_error(format!(
                    "cannot assign to an element of {}",
                    self.heap.type_name(&Value::Object(handle))
                )))
            }
        };
        match self.heap.get_mut(handle) {
            Some(Object::Array(items)) => {
                if let Some(index) = position {
                    items[index] = value;
                }
            }
            Some(Object::Dict(pairs)) => match position {
                Some(index) => pairs[index].1 = value,
                None => pairs.push((key, value)),
            },
            _ => {}
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Members

    /// Wrap a method found on `owner` so calling it passes the receiver.
    fn bind(&mut self, value: Value, owner: Handle) -> Value {
        match value.as_object().and_then(|h| self.heap.get(h)) {
            Some(Object::Closure(_)) => {
                let bound = self.heap.alloc(Object::BoundMethod(BoundMethod {
                    receiver: Value::Object(owner),
                    method: value.as_object().unwrap_or(owner),
                }));
                Value::Object(bound)
            }
            _ => value,
        }
    }

    /// The target must stay rooted by the caller while this runs.
    pub(super) fn get_member(&mut self, target: Value, name: &str) -> EmberResult<Value> {
        let found = match target.as_object().map(|h| (h, self.heap.get(h))) {
            Some((h, Some(Object::Instance(_)))) => match self.heap.get_member(h, name) {
                Some((value, owner)) => return Ok(self.bind(value, owner)),
                None => None,
            },
            Some((_, Some(Object::Struct(fields)))) => find_member(fields, name).copied(),
            Some((_, Some(Object::Module(m)))) => find_member(&m.members, name).copied(),
            Some((_, Some(Object::Enum(e)))) => find_member(&e.items, name).copied(),
            Some((h, Some(Object::Class(c)))) => find_member(&c.fields, name)
                .copied()
                .or_else(|| self.heap.get_decl_member(h, name)),
            _ => {
                return Err(self.runtime_error(format!(
                    "{} has no members",
                    self.heap.type_name(&target)
                )))
            }
        };
        found.ok_or_else(|| {
            self.runtime_error(format!(
                "undefined member '{name}' on {}",
                self.heap.type_name(&target)
            ))
        })
    }

    pub(super) fn set_member(&mut self, target: Value, name: &str, value: Value) -> EmberResult<()> {
        let handle = match target.as_object().map(|h| (h, self.heap.get(h))) {
            Some((h, Some(Object::Instance(_)))) => self.heap.find_field_owner(h, name),
            Some((h, Some(Object::Struct(fields)))) => find_member(fields, name).map(|_| h),
            _ => {
                return Err(self.runtime_error(format!(
                    "cannot assign members of {}",
                    self.heap.type_name(&target)
                )))
            }
        };
        let slot = handle.and_then(|h| match self.heap.get_mut(h) {
            Some(Object::Instance(instance)) => find_member_mut(&mut instance.fields, name),
            Some(Object::Struct(fields)) => find_member_mut(fields, name),
            _ => None,
        });
        let written = match slot {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        };
        if written {
            Ok(())
        } else {
            Err(self.runtime_error(format!(
                "undefined field '{name}' on {}",
                self.heap.type_name(&target)
            )))
        }
    }

    /// Look a member up on the parents of the receiver only.
    pub(super) fn get_base(&mut self, receiver: Value, name: &str) -> EmberResult<Value> {
        let instance = match receiver.as_object() {
            Some(h) if matches!(self.heap.get(h), Some(Object::Instance(_))) => h,
            _ => return Err(self.runtime_error("'base' requires an instance receiver")),
        };
        match self.heap.get_parent_member(instance, name) {
            Some((value, owner)) => Ok(self.bind(value, owner)),
            None => Err(self.runtime_error(format!("no parent defines member '{name}'"))),
        }
    }
}
