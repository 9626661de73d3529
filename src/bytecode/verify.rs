use crate::bytecode::{Instruction, Program};

/// Slots at the base of every frame reserved for SL, DL and RA.
pub const FRAME_HEADER: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("verify error at {ip:04}: {message}")]
pub struct VerifyError {
    pub ip: usize,
    pub message: String,
}

impl VerifyError {
    fn new(ip: usize, message: impl Into<String>) -> Self {
        Self {
            ip,
            message: message.into(),
        }
    }
}

/// Checks a single instruction against a program of `len` instructions.
fn check_instruction(ip: usize, ins: &Instruction, len: usize) -> Result<(), VerifyError> {
    if let Some(target) = ins.branch_target() {
        if target >= len {
            return Err(VerifyError::new(
                ip,
                format!(
                    "{} target {} is outside the program (len {})",
                    ins.opcode(),
                    target,
                    len
                ),
            ));
        }
    }

    match ins {
        Instruction::Lod { addr, .. } | Instruction::Sto { addr, .. } if *addr < FRAME_HEADER => {
            Err(VerifyError::new(
                ip,
                format!("{} address {} falls inside the frame header", ins.opcode(), addr),
            ))
        }
        Instruction::Int(n) if *n < FRAME_HEADER => Err(VerifyError::new(
            ip,
            format!("INT {} does not cover the {}-slot frame header", n, FRAME_HEADER),
        )),
        _ => Ok(()),
    }
}

/// Follows unconditional jumps from `start` and requires them to end on an
/// `INT`, so a frame is reserved before anything touches it.
fn check_frame_entry(code: &[Instruction], ip: usize, start: usize) -> Result<(), VerifyError> {
    let mut at = start;
    for _ in 0..code.len() {
        match code.get(at) {
            Some(Instruction::Int(_)) => return Ok(()),
            Some(Instruction::Jmp(next)) => at = *next,
            _ => break,
        }
    }
    Err(VerifyError::new(
        ip,
        format!("entry {} does not reserve a frame with INT", start),
    ))
}

/// Static checks run before a program is executed.
///
/// NOTE: this is a linear scan. It proves every control transfer lands inside
/// the program, that the program and every procedure open with `INT`, and
/// that no variable access aliases a frame header; it does not track stack
/// heights across jumps.
pub fn check_program(program: &Program) -> Result<(), VerifyError> {
    if program.is_empty() {
        return Err(VerifyError::new(0, "program has no instructions"));
    }

    let code = program.instructions();
    let len = program.len();
    for (ip, ins) in code.iter().enumerate() {
        check_instruction(ip, ins, len)?;
    }

    check_frame_entry(code, 0, 0)?;
    for (ip, ins) in code.iter().enumerate() {
        if let Instruction::Cal { target, .. } = ins {
            check_frame_entry(code, ip, *target)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::Opr;

    #[test]
    fn test_valid_program() {
        let program = Program::new(vec![
            Instruction::Int(4),
            Instruction::Lit(1),
            Instruction::Jpc(4),
            Instruction::Jmp(1),
            Instruction::Opr(Opr::Ret),
        ]);
        assert!(check_program(&program).is_ok());
    }

    #[test]
    fn test_empty_program() {
        let err = check_program(&Program::new(vec![])).unwrap_err();
        assert!(err.message.contains("no instructions"));
    }

    #[test]
    fn test_jump_past_end() {
        let program = Program::new(vec![Instruction::Int(3), Instruction::Jmp(2)]);
        let err = check_program(&program).unwrap_err();
        assert_eq!(err.ip, 1);
        assert!(err.message.contains("JMP target 2"));
    }

    #[test]
    fn test_call_past_end() {
        let program = Program::new(vec![
            Instruction::Int(3),
            Instruction::Cal {
                level: 0,
                target: 10,
            },
        ]);
        assert!(check_program(&program).is_err());
    }

    #[test]
    fn test_header_alias() {
        let program = Program::new(vec![
            Instruction::Int(3),
            Instruction::Lit(1),
            Instruction::Sto { level: 0, addr: 1 },
        ]);
        let err = check_program(&program).unwrap_err();
        assert_eq!(err.ip, 2);
        assert!(err.message.contains("frame header"));
    }

    #[test]
    fn test_program_must_open_with_int() {
        let program = Program::new(vec![Instruction::Lit(7), Instruction::Wrt]);
        let err = check_program(&program).unwrap_err();
        assert_eq!(err.ip, 0);
        assert!(err.message.contains("INT"));
    }

    #[test]
    fn test_entry_may_jump_to_int() {
        let program = Program::new(vec![
            Instruction::Jmp(2),
            Instruction::Opr(Opr::Ret),
            Instruction::Int(3),
            Instruction::Opr(Opr::Ret),
        ]);
        assert!(check_program(&program).is_ok());
    }

    #[test]
    fn test_jump_cycle_never_reaches_int() {
        let program = Program::new(vec![Instruction::Jmp(1), Instruction::Jmp(0)]);
        assert!(check_program(&program).is_err());
    }

    #[test]
    fn test_call_target_must_reserve_frame() {
        // procedure body at 1 writes without reserving its frame first
        let program = Program::new(vec![
            Instruction::Jmp(3),
            Instruction::Lit(5),
            Instruction::Opr(Opr::Ret),
            Instruction::Int(4),
            Instruction::Cal {
                level: 0,
                target: 1,
            },
            Instruction::Opr(Opr::Ret),
        ]);
        let err = check_program(&program).unwrap_err();
        assert_eq!(err.ip, 4);
        assert!(err.message.contains("entry 1"));
    }

    #[test]
    fn test_undersized_frame() {
        let program = Program::new(vec![Instruction::Int(2), Instruction::Opr(Opr::Ret)]);
        assert!(check_program(&program).is_err());
    }
}
