use crate::frontend::Span;

/// A syntax or semantic error. Compilation stops at the first one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Line {}, Column {}: {}", .span.line, .span.col, .kind)]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileErrorKind {
    /// Malformed grammar: the token found does not fit the construct.
    #[error("expected {expected}, found '{found}'")]
    Unexpected { expected: String, found: String },

    #[error("undefined identifier '{0}'")]
    Undefined(String),

    /// Same name declared twice in one scope. Shadowing an outer name is fine.
    #[error("'{0}' is already declared in this scope")]
    Redeclared(String),

    /// Assignment or `read` target is a constant or a procedure.
    #[error("cannot assign to {kind} '{name}'")]
    NotAssignable { name: String, kind: &'static str },

    #[error("procedure '{0}' cannot be used as a value")]
    ProcedureAsValue(String),

    #[error("cannot call {kind} '{name}'")]
    NotCallable { name: String, kind: &'static str },

    /// Broken compiler invariant (unpatched jump, unbalanced scopes).
    #[error("internal compiler error: {0}")]
    Internal(String),
}

impl CompileErrorKind {
    pub fn at(self, span: Span) -> CompileError {
        CompileError { kind: self, span }
    }
}
