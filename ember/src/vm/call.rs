//! Calls, returns and instantiation.
use super::{CallFrame, Vm};
use crate::{
    chunk::VarArg,
    constants::INIT_NAME,
    error::EmberResult,
    heap::Handle,
    object::{find_member, Instance, NativeContext, Object},
    value::Value,
};

impl Vm {
    /// Call the value sitting below `argc` arguments on the stack.
    pub(super) fn call_value(&mut self, callee: Value, argc: u8) -> EmberResult<()> {
        let object = callee.as_object().map(|h| (h, self.heap.get(h)));
        match object {
            Some((handle, Some(Object::Closure(_)))) => self.call_closure(handle, argc, false),
            Some((_, Some(Object::BoundMethod(bound)))) => {
                let (receiver, method) = (bound.receiver, bound.method);
                let callee_slot = self.heap.stack.len() - argc as usize - 1;
                self.heap.stack[callee_slot] = receiver;
                self.call_closure(method, argc, false)
            }
            Some((_, Some(Object::Native(_)))) => self.call_native(callee, argc),
            Some((_, Some(Object::Class(class)))) => Err(self.runtime_error(format!(
                "use 'new' to instantiate class '{}'",
                class.name
            ))),
            _ => Err(self.runtime_error(format!(
                "cannot call a value of type {}",
                self.heap.type_name(&callee)
            ))),
        }
    }

    /// Push a frame for a closure whose arguments are on the stack.
    ///
    /// Surplus arguments of a variadic function are packed into an array.
    /// With memoization enabled a cached result is pushed directly and no
    /// frame is entered.
    pub(super) fn call_closure(&mut self, closure: Handle, argc: u8, construct: bool) -> EmberResult<()> {
        let function_object = match self.heap.get(closure) {
            Some(Object::Closure(c)) => c.function,
            _ => return Err(self.runtime_error("callee is not a closure")),
        };
        let function = match self.heap.get(function_object) {
            Some(Object::Function(f)) => f.function.clone(),
            _ => return Err(self.runtime_error("closure function was collected")),
        };

        let argc = argc as usize;
        let arity = function.arity as usize;
        match function.varargs {
            VarArg::None if argc != arity => {
                return Err(self.runtime_error(format!(
                    "function '{}' expects {arity} arguments, got {argc}",
                    function.name
                )))
            }
            VarArg::Unnamed | VarArg::Named if argc < arity => {
                return Err(self.runtime_error(format!(
                    "function '{}' expects at least {arity} arguments, got {argc}",
                    function.name
                )))
            }
            VarArg::None => {}
            VarArg::Unnamed | VarArg::Named => {
                let rest = self.pop_n(argc - arity)?;
                self.push_object(Object::Array(rest))?;
            }
        }

        let slots = self.heap.stack.len() - function.param_slots();

        let mut hash = None;
        if self.heap.function_cache() && argc > 0 && !construct {
            let key = self.heap.hash_values(&self.heap.stack[slots..]);
            let cached = match self.heap.get(function_object) {
                Some(Object::Function(f)) => f.cache.get(&key).cloned(),
                _ => None,
            };
            if let Some(values) = cached {
                log::trace!("memo hit for '{}'", function.name);
                let result = self.aggregate(values);
                self.heap.stack.truncate(slots);
                return self.heap.push(result);
            }
            hash = Some(key);
        }

        log::trace!("call '{}' with {argc} arguments", function.name);
        self.heap.push_frame(CallFrame {
            closure,
            function_object,
            function,
            ip: 0,
            slots,
            hash,
            construct,
        })
    }

    fn call_native(&mut self, callee: Value, argc: u8) -> EmberResult<()> {
        let (name, arity, func) = match callee.as_object().and_then(|h| self.heap.get(h)) {
            Some(Object::Native(native)) => (native.name.clone(), native.arity, native.func),
            _ => return Err(self.runtime_error("callee is not a native function")),
        };
        if let Some(arity) = arity {
            if arity != argc {
                return Err(self.runtime_error(format!(
                    "native '{name}' expects {arity} arguments, got {argc}"
                )));
            }
        }

        // Arguments stay on the stack while the native runs.
        let top = self.heap.stack.len();
        let args = self.heap.stack[top - argc as usize..].to_vec();
        let mut context = NativeContext {
            heap: &mut self.heap,
            out: self.out.as_mut(),
        };
        let result = func(&mut context, &args)
            .map_err(|message| self.runtime_error(format!("{name}: {message}")))?;

        self.heap.stack.truncate(top - argc as usize - 1);
        self.heap.push(result)
    }

    /// `new C(args)`: replace the class on the stack with a fresh instance
    /// and run the class's own `init` on it.
    pub(super) fn construct(&mut self, argc: u8) -> EmberResult<()> {
        let class_slot = self.heap.stack.len() - argc as usize - 1;
        let class_value = self.peek(argc as usize)?;
        let (class, init) = match class_value.as_object().map(|h| (h, self.heap.get(h))) {
            Some((h, Some(Object::Class(c)))) => (h, find_member(&c.decls, INIT_NAME).copied()),
            _ => {
                return Err(self.runtime_error(format!(
                    "'new' expects a class, found {}",
                    self.heap.type_name(&class_value)
                )))
            }
        };

        let instance = self.instantiate(class)?;
        self.heap.stack[class_slot] = Value::Object(instance);

        match init.and_then(|v| v.as_object()) {
            Some(init) if matches!(self.heap.get(init), Some(Object::Closure(_))) => {
                self.call_closure(init, argc, true)
            }
            _ if argc > 0 => Err(self.runtime_error(format!(
                "class has no '{INIT_NAME}' but {argc} arguments were given"
            ))),
            _ => Ok(()),
        }
    }

    /// Build an instance, its parents first, depth-first in declaration
    /// order. Field defaults are copied from the class.
    fn instantiate(&mut self, class: Handle) -> EmberResult<Handle> {
        let (fields, parents) = match self.heap.get(class) {
            Some(Object::Class(c)) => (c.fields.clone(), c.parents.clone()),
            _ => return Err(self.runtime_error("parent is not a class")),
        };

        // Finished parents are kept on the stack so collection sees them.
        let base = self.heap.stack.len();
        for parent in parents {
            let instance = self.instantiate(parent)?;
            self.heap.push(Value::Object(instance))?;
        }
        let parents = self
            .heap
            .stack
            .split_off(base)
            .iter()
            .filter_map(Value::as_object)
            .collect();

        Ok(self.heap.alloc(Object::Instance(Instance {
            class,
            fields,
            parents,
        })))
    }

    /// Finish the active frame with the top `count` values.
    ///
    /// Returns the values once the outermost frame has returned.
    pub(super) fn return_from(&mut self, count: u8) -> EmberResult<Option<Vec<Value>>> {
        let values = self.pop_n(count as usize)?;
        let Some(frame) = self.heap.frames.last() else {
            return Ok(Some(values));
        };
        let (slots, hash, construct, function_object) =
            (frame.slots, frame.hash, frame.construct, frame.function_object);

        self.heap.close_upvalues(slots);

        if let Some(hash) = hash {
            if let Some(Object::Function(f)) = self.heap.get_mut(function_object) {
                f.cache.insert(hash, values.clone());
            }
        }

        if self.heap.frames.len() == 1 {
            self.heap.frames.pop();
            self.heap.stack.truncate(slots);
            return Ok(Some(values));
        }

        // Allocate while the frame still roots its function.
        let result = if construct {
            self.heap.stack.get(slots).copied().unwrap_or(Value::Null)
        } else {
            self.aggregate(values)
        };
        self.heap.frames.pop();
        self.heap.stack.truncate(slots);
        self.heap.push(result)?;
        Ok(None)
    }

    /// Single value of a multi-value return.
    fn aggregate(&mut self, values: Vec<Value>) -> Value {
        match values.len() {
            0 => Value::Null,
            1 => values[0],
            _ => Value::Object(self.heap.alloc(Object::Array(values))),
        }
    }
}
