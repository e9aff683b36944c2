//! Virtual machine.
mod call;
mod interp;
pub mod native;
mod place;

use std::{io, rc::Rc};

use crate::{
    chunk::{Constant, Function},
    constants::*,
    error::EmberResult,
    heap::{Handle, Heap},
    object::{Closure, FunctionObject, Native, Object},
    value::Value,
};

use self::native::NATIVES;

/// VM configuration parameters.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct VmConf {
    /// Value stack capacity, in slots.
    pub stack_size: usize,
    /// Call frame stack capacity.
    pub frame_count: usize,
    pub global_count: usize,
    /// Bytes allocated before the first collection.
    pub gc_threshold: usize,
    /// Memoize the results of calls by their arguments.
    pub function_cache: bool,
    /// Log every collection.
    pub gc_debug: bool,
    /// Collect on every allocation.
    pub gc_stress: bool,
}

impl Default for VmConf {
    fn default() -> Self {
        Self {
            stack_size: STACK_SIZE,
            frame_count: FRAME_COUNT,
            global_count: GLOBAL_COUNT,
            gc_threshold: GC_THRESHOLD,
            function_cache: false,
            gc_debug: false,
            gc_stress: false,
        }
    }
}

/// Activation record of a running closure.
#[derive(Debug)]
pub struct CallFrame {
    pub(crate) closure: Handle,
    pub(crate) function_object: Handle,
    pub(crate) function: Rc<Function>,
    pub(crate) ip: usize,
    /// Stack index of slot zero.
    pub(crate) slots: usize,
    /// Argument hash the results are memoized under.
    pub(crate) hash: Option<u64>,
    /// Frame runs `init` for `new`, and returns the receiver.
    pub(crate) construct: bool,
}

pub struct Vm {
    heap: Heap,
    conf: VmConf,
    out: Box<dyn io::Write>,
}

impl Vm {
    pub fn new(conf: VmConf) -> Self {
        let mut vm = Vm {
            heap: Heap::new(&conf),
            conf,
            out: Box::new(io::stdout()),
        };
        vm.install_natives();
        vm
    }

    /// Configuration that was used to instantiate the VM.
    pub fn config(&self) -> &VmConf {
        &self.conf
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    /// Redirect program output, stdout by default.
    pub fn set_output(&mut self, out: impl io::Write + 'static) {
        self.out = Box::new(out);
    }

    /// Compile and run source code.
    pub fn interpret(&mut self, source: &str) -> EmberResult<Vec<Value>> {
        let function = crate::compile(source)?;
        self.run(function)
    }

    /// Run a compiled script, returning the values of its top-level
    /// `return`, if any.
    ///
    /// Globals and objects from previous runs are kept.
    pub fn run(&mut self, function: Function) -> EmberResult<Vec<Value>> {
        self.heap.reset_stacks();

        self.heap.pause_gc();
        let function_object = self.load_function(Rc::new(function));
        let closure = self.heap.alloc(Object::Closure(Closure {
            function: function_object,
            upvalues: Vec::new(),
        }));
        self.heap.resume_gc();

        self.heap.push(Value::Object(closure))?;
        self.call_closure(closure, 0, false)?;

        let result = self.execute();
        if let Err(err) = &result {
            log::debug!("run failed: {err}");
            self.heap.reset_stacks();
        }
        result
    }

    /// Drop every object and global, then reinstall the natives.
    pub fn reset(&mut self) {
        self.heap.reset();
        self.install_natives();
    }

    /// Text representation of a value.
    pub fn display(&self, value: &Value) -> String {
        self.heap.stringify(value)
    }

    fn install_natives(&mut self) {
        for (slot, def) in NATIVES.iter().enumerate() {
            let handle = self.heap.alloc(Object::Native(Native {
                name: def.name.into(),
                arity: def.arity,
                func: def.func,
            }));
            if self.heap.set_global(slot, Value::Object(handle)).is_err() {
                log::warn!("no global slot for native '{}'", def.name);
            }
        }
    }

    /// Move a function tree into the heap, turning constants into values.
    ///
    /// Must run with collection paused, nothing roots the tree until
    /// the outermost function is wrapped in a closure.
    fn load_function(&mut self, function: Rc<Function>) -> Handle {
        let constants = function
            .chunk
            .constants
            .iter()
            .map(|constant| match constant {
                Constant::Str(s) => Value::Object(self.heap.alloc(Object::Str(s.clone()))),
                Constant::Function(nested) => Value::Object(self.load_function(nested.clone())),
                other => Value::from_constant(other).unwrap_or(Value::Null),
            })
            .collect();

        self.heap.alloc(Object::Function(FunctionObject {
            function,
            constants,
            cache: Default::default(),
        }))
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new(VmConf::default())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::EmberError;

    #[test]
    fn test_natives_installed() {
        let vm = Vm::default();
        for slot in 0..NATIVES.len() {
            let native = vm.heap().global(slot).unwrap();
            assert_eq!(vm.heap().type_name(&native), "native");
        }
    }

    #[test]
    fn test_reset_keeps_natives() {
        let mut vm = Vm::default();
        vm.interpret("let x = 1;").unwrap();
        vm.reset();
        assert!(vm.heap().global(NATIVES.len()).is_none());
        assert!(vm.heap().global(0).is_some());
    }

    #[test]
    fn test_frame_overflow() {
        let mut vm = Vm::new(VmConf {
            frame_count: 16,
            ..VmConf::default()
        });
        let err = vm.interpret("fn f(n) { return f(n + 1); } f(0);").unwrap_err();
        assert!(matches!(err, EmberError::FrameOverflow), "{err}");
    }

    #[test]
    fn test_stack_overflow() {
        let mut vm = Vm::new(VmConf {
            stack_size: 8,
            ..VmConf::default()
        });
        let err = vm.interpret("[1, 2, 3, 4, 5, 6, 7, 8, 9];").unwrap_err();
        assert!(matches!(err, EmberError::StackOverflow), "{err}");
    }
}
