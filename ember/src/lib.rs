pub mod ast;
pub mod chunk;
mod compile;
pub mod constants;
mod disasm;
mod error;
pub mod heap;
pub mod lex;
pub mod object;
pub mod parse;
pub mod pass;
pub mod serialize;
pub mod value;
pub mod vm;

pub use self::{compile::Compiler, disasm::disassemble};

use self::{
    chunk::Function,
    error::{Diagnostics, EmberError, EmberResult},
    pass::AstPassManager,
};

pub const IMPL_VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod prelude {
    pub use super::{
        chunk::Function,
        disasm::Disassembler,
        error::{Diagnostic, DiagnosticKind, Diagnostics, EmberError, EmberResult, Severity},
        heap::{Handle, Heap},
        value::Value,
        vm::{Vm, VmConf},
    };
}

/// Compile source code into the script function.
///
/// Natives are the only globals defined by the host.
pub fn compile(source: &str) -> EmberResult<Function> {
    compile_with(source, &mut AstPassManager::with_default_passes(vm::native::native_names()))
}

/// Compile with a custom pass pipeline.
pub fn compile_with(source: &str, passes: &mut AstPassManager) -> EmberResult<Function> {
    let (tokens, lex_diagnostics) = lex::tokenize(source);
    let mut diagnostics = Diagnostics::new();
    diagnostics.extend(lex_diagnostics);
    if diagnostics.has_errors() {
        return Err(EmberError::Compile(diagnostics));
    }

    let root = parse::parse(tokens, source)?;
    let (root, warnings) = passes.run(root)?;
    for warning in diagnostics.iter().chain(warnings.iter()) {
        log::warn!("{warning}");
    }

    Compiler::new().compile(&root)
}
