pub mod disasm;
pub mod ir;
pub mod op;
pub mod verify;

pub use ir::{ArtifactError, Program};
pub use op::{Instruction, OpCode, Opr};
