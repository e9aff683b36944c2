//! Heap objects.
//!
//! Every object kind defines how it is compared, hashed, printed and
//! traced. Comparisons and printing need to follow handles, so they are
//! implemented on the [`Heap`].
use std::{
    collections::{hash_map::DefaultHasher, HashMap},
    fmt::Write as _,
    hash::{Hash, Hasher},
    io,
    mem::size_of,
    rc::Rc,
};

use itertools::Itertools;
use smol_str::SmolStr;

use crate::{
    chunk::Function,
    constants::MAX_VALUE_DEPTH,
    heap::{Handle, Heap},
    value::{primitive_eq, Value},
};

#[derive(Debug)]
pub enum Object {
    Str(SmolStr),
    Array(Vec<Value>),
    /// Insertion ordered key/value pairs.
    Dict(Vec<(Value, Value)>),
    Struct(Vec<(SmolStr, Value)>),
    Function(FunctionObject),
    Upvalue(Upvalue),
    Closure(Closure),
    Native(Native),
    Ref(RefTarget),
    Class(Class),
    Instance(Instance),
    BoundMethod(BoundMethod),
    Enum(EnumObject),
    Module(ModuleObject),
}

/// Function prototype loaded into the heap, with its constants turned
/// into values.
#[derive(Debug)]
pub struct FunctionObject {
    pub function: Rc<Function>,
    pub constants: Vec<Value>,
    /// Memoized results keyed by the hash of the call arguments.
    pub cache: HashMap<u64, Vec<Value>>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Upvalue {
    /// Captured variable still lives on the stack at this slot.
    Open(usize),
    /// Variable moved off the stack when its scope ended.
    Closed(Value),
}

#[derive(Debug)]
pub struct Closure {
    /// Handle to a [`FunctionObject`].
    pub function: Handle,
    pub upvalues: Vec<Handle>,
}

/// Signature of functions implemented by the host.
pub type NativeFn = fn(&mut NativeContext, &[Value]) -> Result<Value, String>;

/// Access granted to native functions while they run.
pub struct NativeContext<'a> {
    pub heap: &'a mut Heap,
    pub out: &'a mut dyn io::Write,
}

#[derive(Debug)]
pub struct Native {
    pub name: SmolStr,
    /// Exact argument count, or `None` when any count is accepted.
    pub arity: Option<u8>,
    pub func: NativeFn,
}

/// Location a reference reads from and writes to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RefTarget {
    Global(usize),
    Upvalue(Handle),
    /// Element of an array or entry of a dictionary.
    Element(Handle, Value),
}

#[derive(Debug, Default)]
pub struct Class {
    pub name: SmolStr,
    /// Field defaults, copied into each instance.
    pub fields: Vec<(SmolStr, Value)>,
    /// Methods and nested declarations.
    pub decls: Vec<(SmolStr, Value)>,
    /// Parent classes in declaration order.
    pub parents: Vec<Handle>,
}

#[derive(Debug)]
pub struct Instance {
    pub class: Handle,
    pub fields: Vec<(SmolStr, Value)>,
    /// One instance per parent class, in the order the class declares them.
    pub parents: Vec<Handle>,
}

#[derive(Debug)]
pub struct BoundMethod {
    pub receiver: Value,
    /// Handle to a [`Closure`].
    pub method: Handle,
}

#[derive(Debug, Default)]
pub struct EnumObject {
    pub name: SmolStr,
    pub items: Vec<(SmolStr, Value)>,
}

#[derive(Debug, Default)]
pub struct ModuleObject {
    pub name: SmolStr,
    pub members: Vec<(SmolStr, Value)>,
}

/// Linear lookup in a list of named members.
pub fn find_member<'a>(members: &'a [(SmolStr, Value)], name: &str) -> Option<&'a Value> {
    members.iter().find(|(n, _)| n == name).map(|(_, v)| v)
}

pub fn find_member_mut<'a>(
    members: &'a mut [(SmolStr, Value)],
    name: &str,
) -> Option<&'a mut Value> {
    members
        .iter_mut()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v)
}

impl Object {
    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Str(_) => "str",
            Object::Array(_) => "array",
            Object::Dict(_) => "dict",
            Object::Struct(_) => "struct",
            Object::Function(_) => "function",
            Object::Upvalue(_) => "upvalue",
            Object::Closure(_) => "function",
            Object::Native(_) => "native",
            Object::Ref(_) => "ref",
            Object::Class(_) => "class",
            Object::Instance(_) => "instance",
            Object::BoundMethod(_) => "function",
            Object::Enum(_) => "enum",
            Object::Module(_) => "module",
        }
    }

    /// Approximate number of bytes owned by the object.
    pub fn estimate_size(&self) -> usize {
        let value = size_of::<Value>();
        let named = size_of::<(SmolStr, Value)>();
        size_of::<Object>()
            + match self {
                Object::Str(s) => s.len(),
                Object::Array(items) => items.len() * value,
                Object::Dict(pairs) => pairs.len() * value * 2,
                Object::Struct(fields) => fields.len() * named,
                Object::Function(f) => {
                    f.constants.len() * value + f.function.chunk.code.len()
                }
                Object::Upvalue(_) | Object::Native(_) | Object::Ref(_) => 0,
                Object::Closure(c) => c.upvalues.len() * size_of::<Handle>(),
                Object::Class(c) => {
                    (c.fields.len() + c.decls.len()) * named + c.parents.len() * size_of::<Handle>()
                }
                Object::Instance(i) => {
                    i.fields.len() * named + i.parents.len() * size_of::<Handle>()
                }
                Object::BoundMethod(_) => 0,
                Object::Enum(e) => e.items.len() * named,
                Object::Module(m) => m.members.len() * named,
            }
    }

    /// Enumerate every handle this object refers to.
    ///
    /// Function caches are traced when `include_cache` is set.
    pub fn trace(&self, include_cache: bool, out: &mut Vec<Handle>) {
        fn push(out: &mut Vec<Handle>, value: &Value) {
            if let Value::Object(handle) = value {
                out.push(*handle);
            }
        }

        match self {
            Object::Str(_) | Object::Native(_) => {}
            Object::Array(items) => items.iter().for_each(|v| push(out, v)),
            Object::Dict(pairs) => pairs.iter().for_each(|(k, v)| {
                push(out, k);
                push(out, v);
            }),
            Object::Struct(fields) => fields.iter().for_each(|(_, v)| push(out, v)),
            Object::Function(f) => {
                f.constants.iter().for_each(|v| push(out, v));
                if include_cache {
                    f.cache.values().flatten().for_each(|v| push(out, v));
                }
            }
            Object::Upvalue(Upvalue::Open(_)) => {}
            Object::Upvalue(Upvalue::Closed(v)) => push(out, v),
            Object::Closure(c) => {
                out.push(c.function);
                out.extend(c.upvalues.iter().copied());
            }
            Object::Ref(target) => match target {
                RefTarget::Global(_) => {}
                RefTarget::Upvalue(h) => out.push(*h),
                RefTarget::Element(h, key) => {
                    out.push(*h);
                    push(out, key);
                }
            },
            Object::Class(c) => {
                c.fields.iter().for_each(|(_, v)| push(out, v));
                c.decls.iter().for_each(|(_, v)| push(out, v));
                out.extend(c.parents.iter().copied());
            }
            Object::Instance(i) => {
                out.push(i.class);
                i.fields.iter().for_each(|(_, v)| push(out, v));
                out.extend(i.parents.iter().copied());
            }
            Object::BoundMethod(b) => {
                push(out, &b.receiver);
                out.push(b.method);
            }
            Object::Enum(e) => e.items.iter().for_each(|(_, v)| push(out, v)),
            Object::Module(m) => m.members.iter().for_each(|(_, v)| push(out, v)),
        }
    }
}

// ----------------------------------------------------------------------------
// Member resolution

impl Heap {
    /// Look up a method or nested declaration on a class, then on its
    /// parents depth-first in declaration order.
    pub fn get_decl_member(&self, class: Handle, name: &str) -> Option<Value> {
        let Some(Object::Class(c)) = self.get(class) else {
            return None;
        };
        find_member(&c.decls, name)
            .copied()
            .or_else(|| self.get_parent_decl_member(class, name))
    }

    /// Like [`Heap::get_decl_member`] but skips the class itself.
    pub fn get_parent_decl_member(&self, class: Handle, name: &str) -> Option<Value> {
        let Some(Object::Class(c)) = self.get(class) else {
            return None;
        };
        c.parents
            .iter()
            .find_map(|parent| self.get_decl_member(*parent, name))
    }

    /// Resolve a member on an instance: its own fields, then its class's
    /// declarations, then each parent instance in declaration order.
    ///
    /// Returns the value along with the instance that owns it, which is
    /// the receiver methods are bound to.
    pub fn get_member(&self, instance: Handle, name: &str) -> Option<(Value, Handle)> {
        let Some(Object::Instance(inst)) = self.get(instance) else {
            return None;
        };
        if let Some(value) = find_member(&inst.fields, name) {
            return Some((*value, instance));
        }
        if let Some(Object::Class(c)) = self.get(inst.class) {
            if let Some(value) = find_member(&c.decls, name) {
                return Some((*value, instance));
            }
        }
        self.get_parent_member(instance, name)
    }

    /// Like [`Heap::get_member`] but skips the instance itself.
    pub fn get_parent_member(&self, instance: Handle, name: &str) -> Option<(Value, Handle)> {
        let Some(Object::Instance(inst)) = self.get(instance) else {
            return None;
        };
        inst.parents
            .iter()
            .find_map(|parent| self.get_member(*parent, name))
    }

    /// Find the instance in the hierarchy that owns the named field.
    pub fn find_field_owner(&self, instance: Handle, name: &str) -> Option<Handle> {
        let Some(Object::Instance(inst)) = self.get(instance) else {
            return None;
        };
        if find_member(&inst.fields, name).is_some() {
            return Some(instance);
        }
        inst.parents
            .iter()
            .find_map(|parent| self.find_field_owner(*parent, name))
    }
}

// ----------------------------------------------------------------------------
// Equality, hashing and printing

impl Heap {
    /// Structural equality.
    pub fn values_equal(&self, a: &Value, b: &Value) -> bool {
        self.values_equal_depth(a, b, 0)
    }

    fn values_equal_depth(&self, a: &Value, b: &Value, depth: usize) -> bool {
        let (ha, hb) = match (a, b) {
            (Value::Object(ha), Value::Object(hb)) => (*ha, *hb),
            (Value::Object(_), _) | (_, Value::Object(_)) => return false,
            _ => return primitive_eq(a, b),
        };
        if ha == hb {
            return true;
        }
        if depth >= MAX_VALUE_DEPTH {
            return false;
        }
        let (Some(oa), Some(ob)) = (self.get(ha), self.get(hb)) else {
            return false;
        };
        let eq = |x: &Value, y: &Value| self.values_equal_depth(x, y, depth + 1);
        let eq_named = |xs: &[(SmolStr, Value)], ys: &[(SmolStr, Value)]| {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(n, x)| find_member(ys, n).map_or(false, |y| eq(x, y)))
        };
        let eq_handle = |x: Handle, y: Handle| eq(&Value::Object(x), &Value::Object(y));

        match (oa, ob) {
            (Object::Str(x), Object::Str(y)) => x == y,
            (Object::Array(xs), Object::Array(ys)) => {
                xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| eq(x, y))
            }
            (Object::Dict(xs), Object::Dict(ys)) => {
                let contains = |pairs: &[(Value, Value)], k: &Value, v: &Value| {
                    pairs.iter().any(|(k2, v2)| eq(k, k2) && eq(v, v2))
                };
                xs.len() == ys.len()
                    && xs.iter().all(|(k, v)| contains(ys, k, v))
                    && ys.iter().all(|(k, v)| contains(xs, k, v))
            }
            (Object::Struct(xs), Object::Struct(ys)) => eq_named(xs, ys),
            (Object::Function(x), Object::Function(y)) => x.function == y.function,
            (Object::Upvalue(x), Object::Upvalue(y)) => {
                eq(&self.upvalue_value(x), &self.upvalue_value(y))
            }
            (Object::Closure(x), Object::Closure(y)) => {
                eq_handle(x.function, y.function)
                    && x.upvalues.len() == y.upvalues.len()
                    && x.upvalues.iter().zip(&y.upvalues).all(|(u, v)| eq_handle(*u, *v))
            }
            (Object::Native(x), Object::Native(y)) => x.name == y.name,
            (Object::Ref(x), Object::Ref(y)) => match (x, y) {
                (RefTarget::Element(hx, kx), RefTarget::Element(hy, ky)) => hx == hy && eq(kx, ky),
                _ => x == y,
            },
            (Object::Class(x), Object::Class(y)) => {
                x.name == y.name
                    && eq_named(&x.fields, &y.fields)
                    && eq_named(&x.decls, &y.decls)
                    && x.parents.len() == y.parents.len()
                    && x.parents.iter().zip(&y.parents).all(|(p, q)| eq_handle(*p, *q))
            }
            (Object::Instance(x), Object::Instance(y)) => {
                eq_handle(x.class, y.class)
                    && eq_named(&x.fields, &y.fields)
                    && x.parents.len() == y.parents.len()
                    && x.parents.iter().zip(&y.parents).all(|(p, q)| eq_handle(*p, *q))
            }
            (Object::BoundMethod(x), Object::BoundMethod(y)) => {
                eq(&x.receiver, &y.receiver) && eq_handle(x.method, y.method)
            }
            (Object::Enum(x), Object::Enum(y)) => x.name == y.name && eq_named(&x.items, &y.items),
            (Object::Module(x), Object::Module(y)) => {
                x.name == y.name && eq_named(&x.members, &y.members)
            }
            _ => false,
        }
    }

    /// Current value of an upvalue, reading the stack while it is open.
    pub fn upvalue_value(&self, upvalue: &Upvalue) -> Value {
        match upvalue {
            Upvalue::Open(slot) => self.stack.get(*slot).copied().unwrap_or(Value::Null),
            Upvalue::Closed(value) => *value,
        }
    }

    /// Structural hash, consistent with [`Heap::values_equal`] for values
    /// of the same kind.
    pub fn hash_value(&self, value: &Value) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash_into(value, &mut hasher, 0);
        hasher.finish()
    }

    /// Hash of a sequence of values, used to key memoized calls.
    pub fn hash_values(&self, values: &[Value]) -> u64 {
        let mut hasher = DefaultHasher::new();
        values.len().hash(&mut hasher);
        for value in values {
            self.hash_into(value, &mut hasher, 0);
        }
        hasher.finish()
    }

    fn hash_into(&self, value: &Value, state: &mut DefaultHasher, depth: usize) {
        std::mem::discriminant(value).hash(state);
        match value {
            Value::Null => {}
            Value::Bool(v) => v.hash(state),
            Value::Char(v) => v.hash(state),
            Value::I8(v) => v.hash(state),
            Value::U8(v) => v.hash(state),
            Value::I16(v) => v.hash(state),
            Value::U16(v) => v.hash(state),
            Value::I32(v) => v.hash(state),
            Value::U32(v) => v.hash(state),
            Value::I64(v) => v.hash(state),
            Value::U64(v) => v.hash(state),
            Value::F32(v) => v.to_bits().hash(state),
            Value::F64(v) => v.to_bits().hash(state),
            Value::Object(handle) => {
                if depth >= MAX_VALUE_DEPTH {
                    return;
                }
                self.hash_object(*handle, state, depth + 1)
            }
        }
    }

    fn hash_object(&self, handle: Handle, state: &mut DefaultHasher, depth: usize) {
        // Unordered members hash to the sum of their individual hashes.
        let unordered = |named: &[(SmolStr, Value)]| -> u64 {
            named
                .iter()
                .map(|(n, v)| {
                    let mut h = DefaultHasher::new();
                    n.hash(&mut h);
                    self.hash_into(v, &mut h, depth);
                    h.finish()
                })
                .fold(0u64, u64::wrapping_add)
        };

        let Some(object) = self.get(handle) else {
            return;
        };
        object.type_name().hash(state);
        match object {
            Object::Str(s) => s.hash(state),
            Object::Array(items) => {
                items.len().hash(state);
                for item in items {
                    self.hash_into(item, state, depth);
                }
            }
            Object::Dict(pairs) => {
                let sum = pairs
                    .iter()
                    .map(|(k, v)| {
                        let mut h = DefaultHasher::new();
                        self.hash_into(k, &mut h, depth);
                        self.hash_into(v, &mut h, depth);
                        h.finish()
                    })
                    .fold(0u64, u64::wrapping_add);
                sum.hash(state);
            }
            Object::Struct(fields) => unordered(fields).hash(state),
            Object::Function(f) => {
                f.function.name.hash(state);
                f.function.arity.hash(state);
            }
            Object::Closure(c) => {
                self.hash_object(c.function, state, depth);
                for upvalue in &c.upvalues {
                    if let Some(Object::Upvalue(u)) = self.get(*upvalue) {
                        self.hash_into(&self.upvalue_value(u), state, depth);
                    }
                }
            }
            Object::Native(n) => n.name.hash(state),
            Object::Class(c) => c.name.hash(state),
            Object::Instance(i) => {
                if let Some(Object::Class(c)) = self.get(i.class) {
                    c.name.hash(state);
                }
                unordered(&i.fields).hash(state);
            }
            Object::Enum(e) => e.name.hash(state),
            Object::Module(m) => m.name.hash(state),
            Object::Upvalue(_) | Object::Ref(_) | Object::BoundMethod(_) => {
                handle.hash(state);
            }
        }
    }

    /// Text representation used by `print` and the REPL.
    pub fn stringify(&self, value: &Value) -> String {
        let mut buf = String::new();
        self.stringify_into(value, &mut buf, 0, false);
        buf
    }

    fn stringify_into(&self, value: &Value, buf: &mut String, depth: usize, quoted: bool) {
        let handle = match value {
            Value::Object(handle) => *handle,
            Value::Char(c) if quoted => {
                let _ = write!(buf, "{c:?}");
                return;
            }
            other => {
                let _ = write!(buf, "{other}");
                return;
            }
        };
        if depth >= MAX_VALUE_DEPTH {
            buf.push_str("...");
            return;
        }
        let Some(object) = self.get(handle) else {
            buf.push_str("<freed>");
            return;
        };

        let mut nested = |buf: &mut String, v: &Value| self.stringify_into(v, buf, depth + 1, true);
        let named = |buf: &mut String, members: &[(SmolStr, Value)], nested: &mut dyn FnMut(&mut String, &Value)| {
            for (i, (name, v)) in members.iter().enumerate() {
                if i > 0 {
                    buf.push_str(", ");
                }
                buf.push_str(name);
                buf.push_str(": ");
                nested(buf, v);
            }
        };

        match object {
            Object::Str(s) if quoted => {
                let _ = write!(buf, "{s:?}");
            }
            Object::Str(s) => buf.push_str(s),
            Object::Array(items) => {
                buf.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        buf.push_str(", ");
                    }
                    nested(buf, item);
                }
                buf.push(']');
            }
            Object::Dict(pairs) => {
                buf.push('{');
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        buf.push_str(", ");
                    }
                    nested(buf, k);
                    buf.push_str(": ");
                    nested(buf, v);
                }
                buf.push('}');
            }
            Object::Struct(fields) => {
                buf.push_str("struct { ");
                named(buf, fields, &mut nested);
                buf.push_str(" }");
            }
            Object::Function(f) => {
                let _ = write!(buf, "<fn {}>", f.function.name);
            }
            Object::Closure(c) => match self.get(c.function) {
                Some(Object::Function(f)) => {
                    let _ = write!(buf, "<fn {}>", f.function.name);
                }
                _ => buf.push_str("<fn>"),
            },
            Object::BoundMethod(b) => {
                buf.push_str("<method ");
                self.stringify_into(&Value::Object(b.method), buf, depth + 1, false);
                buf.push('>');
            }
            Object::Native(n) => {
                let _ = write!(buf, "<native fn {}>", n.name);
            }
            Object::Upvalue(u) => nested(buf, &self.upvalue_value(u)),
            Object::Ref(_) => buf.push_str("<ref>"),
            Object::Class(c) => {
                let _ = write!(buf, "<class {}>", c.name);
            }
            Object::Instance(i) => {
                match self.get(i.class) {
                    Some(Object::Class(c)) => buf.push_str(&c.name),
                    _ => buf.push_str("<instance>"),
                }
                buf.push_str(" { ");
                named(buf, &i.fields, &mut nested);
                buf.push_str(" }");
            }
            Object::Enum(e) => {
                let _ = write!(
                    buf,
                    "<enum {} {{ {} }}>",
                    e.name,
                    e.items.iter().map(|(n, _)| n).join(", ")
                );
            }
            Object::Module(m) => {
                let _ = write!(buf, "<module {}>", m.name);
            }
        }
    }

    /// Type name of any value, following handles.
    pub fn type_name(&self, value: &Value) -> &'static str {
        match value {
            Value::Object(handle) => self.get(*handle).map_or("freed", Object::type_name),
            other => other.type_name(),
        }
    }

    /// Borrow the string contents of a string object.
    pub fn as_str(&self, value: &Value) -> Option<&str> {
        match value {
            Value::Object(handle) => match self.get(*handle) {
                Some(Object::Str(s)) => Some(s.as_str()),
                _ => None,
            },
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::vm::VmConf;

    fn heap() -> Heap {
        Heap::new(&VmConf::default())
    }

    #[test]
    fn test_dict_equality_is_unordered() {
        let mut heap = heap();
        let a = heap.alloc(Object::Dict(vec![
            (Value::I64(1), Value::Bool(true)),
            (Value::I64(2), Value::Null),
        ]));
        let b = heap.alloc(Object::Dict(vec![
            (Value::I64(2), Value::Null),
            (Value::I64(1), Value::Bool(true)),
        ]));
        let c = heap.alloc(Object::Dict(vec![(Value::I64(1), Value::Bool(true))]));

        assert!(heap.values_equal(&Value::Object(a), &Value::Object(b)));
        assert!(!heap.values_equal(&Value::Object(a), &Value::Object(c)));
        assert_eq!(
            heap.hash_value(&Value::Object(a)),
            heap.hash_value(&Value::Object(b))
        );
    }

    #[test]
    fn test_string_and_array_equality() {
        let mut heap = heap();
        let s1 = heap.alloc(Object::Str("abc".into()));
        let s2 = heap.alloc(Object::Str("abc".into()));
        let a1 = heap.alloc(Object::Array(vec![Value::Object(s1), Value::I64(1)]));
        let a2 = heap.alloc(Object::Array(vec![Value::Object(s2), Value::I64(1)]));

        assert!(heap.values_equal(&Value::Object(a1), &Value::Object(a2)));
        assert_eq!(heap.stringify(&Value::Object(a1)), r#"["abc", 1]"#);
        assert_eq!(heap.stringify(&Value::Object(s1)), "abc");
    }

    #[test]
    fn test_cyclic_array_terminates() {
        let mut heap = heap();
        let a = heap.alloc(Object::Array(vec![]));
        if let Some(Object::Array(items)) = heap.get_mut(a) {
            items.push(Value::Object(a));
        }
        let text = heap.stringify(&Value::Object(a));
        assert!(text.contains("..."));
        heap.hash_value(&Value::Object(a));
    }

    #[test]
    fn test_member_resolution_order() {
        let mut heap = heap();
        let name = |heap: &mut Heap, s: &str| Value::Object(heap.alloc(Object::Str(s.into())));

        let m1 = name(&mut heap, "from p1");
        let m2 = name(&mut heap, "from p2");
        let p1 = heap.alloc(Object::Class(Class {
            name: "P1".into(),
            decls: vec![("m".into(), m1)],
            ..Default::default()
        }));
        let p2 = heap.alloc(Object::Class(Class {
            name: "P2".into(),
            decls: vec![("m".into(), m2), ("only2".into(), m2)],
            ..Default::default()
        }));
        let child = heap.alloc(Object::Class(Class {
            name: "C".into(),
            parents: vec![p1, p2],
            ..Default::default()
        }));

        let found = heap.get_decl_member(child, "m").unwrap();
        assert_eq!(heap.stringify(&found), "from p1");
        let found = heap.get_decl_member(child, "only2").unwrap();
        assert_eq!(heap.stringify(&found), "from p2");
        assert!(heap.get_decl_member(child, "missing").is_none());
        assert!(heap.get_parent_decl_member(p1, "m").is_none());
    }
}
