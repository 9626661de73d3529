use crate::bytecode::{Instruction, OpCode};
use serde::{Deserialize, Serialize};

/// A compiled P-Code program.
///
/// Instruction indices are absolute; index 0 is the entry point. A `Program`
/// is never mutated once handed to the virtual machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    code: Vec<Instruction>,
}

/// Failure to read or write a program artifact.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("listing line {line}: {message}")]
    Listing { line: usize, message: String },

    #[error("binary program encoding failed: {0}")]
    Encode(postcard::Error),

    #[error("binary program decoding failed: {0}")]
    Decode(postcard::Error),
}

impl Program {
    pub fn new(code: Vec<Instruction>) -> Self {
        Self { code }
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.code
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Writes the program as `OPCODE L A` lines, one instruction per line.
    pub fn to_listing(&self) -> String {
        let mut out = String::new();
        for ins in &self.code {
            out.push_str(&ins.to_string());
            out.push('\n');
        }
        out
    }

    /// Parses the `OPCODE L A` listing form. Blank lines are skipped; every
    /// other line is one instruction, in index order.
    pub fn from_listing(text: &str) -> Result<Program, ArtifactError> {
        let mut code = Vec::new();

        for (i, raw) in text.lines().enumerate() {
            let line = i + 1;
            let fields: Vec<&str> = raw.split_whitespace().collect();
            if fields.is_empty() {
                continue;
            }

            let listing_error = |message: String| ArtifactError::Listing { line, message };

            let &[name, level, operand] = fields.as_slice() else {
                return Err(listing_error(format!(
                    "expected 3 fields `OPCODE L A`, got {}",
                    fields.len()
                )));
            };

            let op = OpCode::from_name(name)
                .ok_or_else(|| listing_error(format!("unknown opcode '{}'", name)))?;
            let level: usize = level
                .parse()
                .map_err(|_| listing_error(format!("invalid level '{}'", level)))?;
            let operand: i64 = operand
                .parse()
                .map_err(|_| listing_error(format!("invalid operand '{}'", operand)))?;

            code.push(Instruction::from_fields(op, level, operand).map_err(listing_error)?);
        }

        Ok(Program { code })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ArtifactError> {
        postcard::to_allocvec(self).map_err(ArtifactError::Encode)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Program, ArtifactError> {
        postcard::from_bytes(bytes).map_err(ArtifactError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::Opr;

    fn sample() -> Program {
        Program::new(vec![
            Instruction::Int(4),
            Instruction::Lit(-7),
            Instruction::Sto { level: 0, addr: 3 },
            Instruction::Lod { level: 0, addr: 3 },
            Instruction::Jpc(6),
            Instruction::Wrt,
            Instruction::Opr(Opr::Ret),
        ])
    }

    #[test]
    fn test_listing_format() {
        let listing = sample().to_listing();
        let lines: Vec<&str> = listing.lines().collect();
        assert_eq!(
            lines,
            vec![
                "INT 0 4", "LIT 0 -7", "STO 0 3", "LOD 0 3", "JPC 0 6", "WRT 0 0", "OPR 0 0"
            ]
        );
    }

    #[test]
    fn test_listing_parses_back() {
        let program = sample();
        let parsed = Program::from_listing(&program.to_listing()).unwrap();
        assert_eq!(parsed, program);
    }

    #[test]
    fn test_listing_tolerates_extra_whitespace() {
        let parsed = Program::from_listing("  INT\t0  3\n\nOPR 0 0\n").unwrap();
        assert_eq!(
            parsed.instructions(),
            &[Instruction::Int(3), Instruction::Opr(Opr::Ret)]
        );
    }

    #[test]
    fn test_listing_errors_carry_line() {
        let err = Program::from_listing("INT 0 3\nFOO 0 1\n").unwrap_err();
        match err {
            ArtifactError::Listing { line, message } => {
                assert_eq!(line, 2);
                assert!(message.contains("FOO"));
            }
            other => panic!("expected listing error, got {:?}", other),
        }

        let err = Program::from_listing("LIT 0").unwrap_err();
        assert!(err.to_string().contains("3 fields"));

        let err = Program::from_listing("OPR 0 7").unwrap_err();
        assert!(err.to_string().contains("unknown OPR code 7"));
    }

    #[test]
    fn test_binary_form() {
        let program = sample();
        let bytes = program.to_bytes().unwrap();
        assert_eq!(Program::from_bytes(&bytes).unwrap(), program);
        assert!(Program::from_bytes(&[0xff, 0xff]).is_err());
    }
}
