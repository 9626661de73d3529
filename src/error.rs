use crate::bytecode::ArtifactError;
use crate::compiler::CompileError;
use crate::frontend::LexerError;
use crate::runtime::RuntimeError;

/// Any failure along the source-to-output pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Every lexical diagnostic from one scan, reported together.
    #[error("{}", join_lines(.0))]
    Lex(Vec<LexerError>),

    #[error("compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("{0}")]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

impl From<Vec<LexerError>> for Error {
    fn from(errors: Vec<LexerError>) -> Self {
        Error::Lex(errors)
    }
}

fn join_lines(errors: &[LexerError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}
