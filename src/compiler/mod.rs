pub mod codegen;
pub mod compile_error;
pub mod quad;
pub mod scope;

pub use codegen::{CodeGen, Compiled};
pub use compile_error::{CompileError, CompileErrorKind};
pub use quad::{Quad, QuadOp};
pub use scope::{ScopeManager, Symbol, SymbolKind};

use crate::frontend::Spanned;

/// Compiles a token stream into a P-Code program, its quadruples and its
/// symbol listing.
pub fn compile(tokens: Vec<Spanned>) -> Result<Compiled, CompileError> {
    CodeGen::new(tokens).compile()
}
