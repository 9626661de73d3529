use crate::bytecode::verify::VerifyError;

/// What went wrong while executing a program.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Fault {
    #[error("stack size limit exceeded ({limit})")]
    StackOverflow { limit: usize },

    #[error("stack underflow")]
    StackUnderflow,

    #[error("division by zero")]
    DivisionByZero,

    #[error("read past end of input")]
    InputExhausted,

    #[error("arithmetic overflow in {op}")]
    ArithmeticOverflow { op: &'static str },

    /// A `LOD`/`STO` slot or a static link outside the live stack.
    #[error("stack address {address} out of range (sp {sp})")]
    AddressOutOfRange { address: i64, sp: usize },

    /// A static-link walk that leaves the main frame or fails to move down
    /// the stack.
    #[error("static link walk of {level} levels broken at base {base}")]
    BrokenStaticLink { level: usize, base: usize },

    #[error("jump target {target} outside program (len {len})")]
    JumpOutOfRange { target: usize, len: usize },

    #[error("execution step limit exceeded ({limit})")]
    StepLimitExceeded { limit: usize },

    #[error("call depth limit exceeded ({limit}) - possible infinite recursion")]
    CallDepthExceeded { limit: usize },

    #[error("invalid program: {0}")]
    InvalidProgram(#[from] VerifyError),
}

/// A fault, the instruction that raised it and the active procedure calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeError {
    pub fault: Fault,
    pub ip: usize,
    /// Entry points of the active procedure calls, outermost first.
    pub call_stack: Vec<usize>,
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "runtime error at {:04}: {}", self.ip, self.fault)?;

        if !self.call_stack.is_empty() {
            write!(f, "\n  call stack:")?;

            for (i, entry) in self.call_stack.iter().rev().enumerate() {
                write!(f, "\n    {}: procedure at {:04}", i, entry)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for RuntimeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.fault)
    }
}

impl RuntimeError {
    pub fn new(fault: Fault, ip: usize) -> Self {
        RuntimeError {
            fault,
            ip,
            call_stack: Vec::new(),
        }
    }

    pub fn with_call_stack(mut self, call_stack: Vec<usize>) -> Self {
        self.call_stack = call_stack;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_without_calls() {
        let err = RuntimeError::new(Fault::DivisionByZero, 12);
        assert_eq!(err.to_string(), "runtime error at 0012: division by zero");
    }

    #[test]
    fn test_display_lists_innermost_call_first() {
        let err = RuntimeError::new(Fault::StackUnderflow, 5).with_call_stack(vec![1, 9]);
        let text = err.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[1], "  call stack:");
        assert_eq!(lines[2], "    0: procedure at 0009");
        assert_eq!(lines[3], "    1: procedure at 0001");
    }
}
