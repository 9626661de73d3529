pub mod io;
pub mod runtime_error;
pub mod vm;

pub use io::{Input, Output};
pub use runtime_error::{Fault, RuntimeError};
pub use vm::{Vm, VmConfig};

use crate::bytecode::Program;
use std::collections::VecDeque;

/// Runs `program` with a fixed input sequence and collects everything it
/// writes.
pub fn run_program(
    program: &Program,
    inputs: impl IntoIterator<Item = i64>,
    config: VmConfig,
) -> Result<Vec<i64>, RuntimeError> {
    let mut input: VecDeque<i64> = inputs.into_iter().collect();
    let mut output: Vec<i64> = Vec::new();
    Vm::with_config(config).run(program, &mut input, &mut output)?;
    Ok(output)
}
