//! A PL/0 compiler and P-Code virtual machine.
//!
//! Source text is scanned by [`frontend::Lexer`], compiled in a single pass by
//! [`compiler::CodeGen`] into a [`bytecode::Program`], and executed by
//! [`runtime::Vm`].

pub mod bytecode;
pub mod compiler;
pub mod error;
pub mod frontend;
pub mod runtime;

pub use error::Error;

use crate::compiler::Compiled;
use crate::frontend::Lexer;
use crate::runtime::VmConfig;

/// Scans and compiles `source`. Lexical errors are reported together; the
/// first syntax or semantic error stops compilation.
pub fn compile_source(source: &str) -> Result<Compiled, Error> {
    let tokens = Lexer::new(source).tokenize()?;
    Ok(compiler::compile(tokens)?)
}

/// Compiles and runs `source`, feeding `inputs` to `read` and returning
/// everything written.
pub fn run_source(source: &str, inputs: impl IntoIterator<Item = i64>) -> Result<Vec<i64>, Error> {
    run_source_with(source, inputs, VmConfig::default())
}

pub fn run_source_with(
    source: &str,
    inputs: impl IntoIterator<Item = i64>,
    config: VmConfig,
) -> Result<Vec<i64>, Error> {
    let compiled = compile_source(source)?;
    Ok(runtime::run_program(&compiled.program, inputs, config)?)
}
