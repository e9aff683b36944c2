//! Constant values of the virtual machine.

/// Default number of value slots in the VM stack.
pub const STACK_SIZE: usize = 0x4000; // 16384

/// Default levels of nesting allowed in the call stack.
pub const FRAME_COUNT: usize = 0x100; // 256

/// Default capacity of the global table.
pub const GLOBAL_COUNT: usize = 0x1000; // 4096

/// Bytes allocated before the first garbage collection.
pub const GC_THRESHOLD: usize = 1024 * 1024;

/// After a collection the next threshold is the surviving heap
/// size multiplied by this factor.
pub const GC_GROW_FACTOR: usize = 2;

/// Maximum number of parameters and arguments in a call.
pub const MAX_ARGS: usize = u8::MAX as usize;

/// Maximum number of locals in a single function.
pub const MAX_LOCALS: usize = u8::MAX as usize + 1;

/// Maximum number of variables captured by a closure.
pub const MAX_UPVALUES: usize = u8::MAX as usize;

/// Limit of nested containers followed when comparing, hashing
/// or printing values. Cyclic structures stop here.
pub const MAX_VALUE_DEPTH: usize = 64;

/// Limit of nested statements and expressions accepted by the parser.
pub const MAX_NESTING: usize = 100;

/// Name of the function wrapping top-level statements.
pub const MAIN_NAME: &str = "_main_start_up";

/// Name of the method invoked when constructing an instance.
pub const INIT_NAME: &str = "init";
