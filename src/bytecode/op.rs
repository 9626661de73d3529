use serde::{Deserialize, Serialize};

// =============================================================================
// OPCODE - the closed P-Code instruction set
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpCode {
    Lit,
    Lod,
    Sto,
    Cal,
    Int,
    Jmp,
    Jpc,
    Opr,
    Red,
    Wrt,
}

impl OpCode {
    pub fn name(self) -> &'static str {
        match self {
            OpCode::Lit => "LIT",
            OpCode::Lod => "LOD",
            OpCode::Sto => "STO",
            OpCode::Cal => "CAL",
            OpCode::Int => "INT",
            OpCode::Jmp => "JMP",
            OpCode::Jpc => "JPC",
            OpCode::Opr => "OPR",
            OpCode::Red => "RED",
            OpCode::Wrt => "WRT",
        }
    }

    pub fn from_name(name: &str) -> Option<OpCode> {
        Some(match name {
            "LIT" => OpCode::Lit,
            "LOD" => OpCode::Lod,
            "STO" => OpCode::Sto,
            "CAL" => OpCode::Cal,
            "INT" => OpCode::Int,
            "JMP" => OpCode::Jmp,
            "JPC" => OpCode::Jpc,
            "OPR" => OpCode::Opr,
            "RED" => OpCode::Red,
            "WRT" => OpCode::Wrt,
            _ => return None,
        })
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// OPR - sub-operations selected by the OPR operand
// =============================================================================

/// Operation selected by an `OPR` instruction. The discriminant is the
/// numeric modifier written in listings (`OPR 0 k`). Code 7 is unassigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opr {
    /// Return from the current frame.
    Ret = 0,
    Neg = 1,
    Add = 2,
    Sub = 3,
    Mul = 4,
    Div = 5,
    /// `( n -- n is odd )`
    Odd = 6,
    Eq = 8,
    Ne = 9,
    Lt = 10,
    Ge = 11,
    Gt = 12,
    Le = 13,
}

impl Opr {
    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn from_code(code: i64) -> Option<Opr> {
        Some(match code {
            0 => Opr::Ret,
            1 => Opr::Neg,
            2 => Opr::Add,
            3 => Opr::Sub,
            4 => Opr::Mul,
            5 => Opr::Div,
            6 => Opr::Odd,
            8 => Opr::Eq,
            9 => Opr::Ne,
            10 => Opr::Lt,
            11 => Opr::Ge,
            12 => Opr::Gt,
            13 => Opr::Le,
            _ => return None,
        })
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opr::Ret => "RET",
            Opr::Neg => "NEG",
            Opr::Add => "ADD",
            Opr::Sub => "SUB",
            Opr::Mul => "MUL",
            Opr::Div => "DIV",
            Opr::Odd => "ODD",
            Opr::Eq => "EQ",
            Opr::Ne => "NE",
            Opr::Lt => "LT",
            Opr::Ge => "GE",
            Opr::Gt => "GT",
            Opr::Le => "LE",
        }
    }
}

// =============================================================================
// INSTRUCTION
// =============================================================================

/// One P-Code instruction.
///
/// Level operands are static-link hop counts; `addr` is an offset from the
/// target frame's base; jump and call targets are absolute instruction indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    /// Push a constant.
    Lit(i64),
    /// Push the variable at `addr` in the frame `level` static links up.
    Lod { level: usize, addr: usize },
    /// Pop into the variable at `addr` in the frame `level` static links up.
    Sto { level: usize, addr: usize },
    /// Call the procedure at `target`, whose lexical parent is `level` links up.
    Cal { level: usize, target: usize },
    /// Reserve `n` slots for the current frame.
    Int(usize),
    Jmp(usize),
    /// Pop; jump when the popped value is 0.
    Jpc(usize),
    Opr(Opr),
    Red,
    Wrt,
}

impl Instruction {
    pub fn opcode(&self) -> OpCode {
        match self {
            Instruction::Lit(_) => OpCode::Lit,
            Instruction::Lod { .. } => OpCode::Lod,
            Instruction::Sto { .. } => OpCode::Sto,
            Instruction::Cal { .. } => OpCode::Cal,
            Instruction::Int(_) => OpCode::Int,
            Instruction::Jmp(_) => OpCode::Jmp,
            Instruction::Jpc(_) => OpCode::Jpc,
            Instruction::Opr(_) => OpCode::Opr,
            Instruction::Red => OpCode::Red,
            Instruction::Wrt => OpCode::Wrt,
        }
    }

    /// The `L` field of the `OPCODE L A` form.
    pub fn level(&self) -> usize {
        match self {
            Instruction::Lod { level, .. }
            | Instruction::Sto { level, .. }
            | Instruction::Cal { level, .. } => *level,
            _ => 0,
        }
    }

    /// The `A` field of the `OPCODE L A` form.
    pub fn operand(&self) -> i64 {
        match self {
            Instruction::Lit(value) => *value,
            Instruction::Lod { addr, .. } | Instruction::Sto { addr, .. } => *addr as i64,
            Instruction::Cal { target, .. } => *target as i64,
            Instruction::Int(n) => *n as i64,
            Instruction::Jmp(target) | Instruction::Jpc(target) => *target as i64,
            Instruction::Opr(op) => op.code(),
            Instruction::Red | Instruction::Wrt => 0,
        }
    }

    /// Absolute instruction index this instruction may transfer control to.
    pub fn branch_target(&self) -> Option<usize> {
        match self {
            Instruction::Jmp(target)
            | Instruction::Jpc(target)
            | Instruction::Cal { target, .. } => Some(*target),
            _ => None,
        }
    }

    /// Rebuilds an instruction from its three listing fields.
    pub fn from_fields(op: OpCode, level: usize, operand: i64) -> Result<Instruction, String> {
        let index = |what: &str| {
            usize::try_from(operand)
                .map_err(|_| format!("{} operand must be non-negative, got {}", what, operand))
        };
        let no_level = |ins: Instruction| {
            if level == 0 {
                Ok(ins)
            } else {
                Err(format!("{} takes no level, got {}", op, level))
            }
        };

        match op {
            OpCode::Lit => no_level(Instruction::Lit(operand)),
            OpCode::Lod => Ok(Instruction::Lod {
                level,
                addr: index("address")?,
            }),
            OpCode::Sto => Ok(Instruction::Sto {
                level,
                addr: index("address")?,
            }),
            OpCode::Cal => Ok(Instruction::Cal {
                level,
                target: index("call target")?,
            }),
            OpCode::Int => no_level(Instruction::Int(index("frame size")?)),
            OpCode::Jmp => no_level(Instruction::Jmp(index("jump target")?)),
            OpCode::Jpc => no_level(Instruction::Jpc(index("jump target")?)),
            OpCode::Opr => {
                let opr = Opr::from_code(operand)
                    .ok_or_else(|| format!("unknown OPR code {}", operand))?;
                no_level(Instruction::Opr(opr))
            }
            OpCode::Red => no_level(Instruction::Red),
            OpCode::Wrt => no_level(Instruction::Wrt),
        }
    }
}

impl std::fmt::Display for Instruction {
    /// Formats as `OPCODE L A`.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.opcode(), self.level(), self.operand())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_fields() {
        assert_eq!(Instruction::Lit(42).to_string(), "LIT 0 42");
        assert_eq!(Instruction::Lod { level: 2, addr: 3 }.to_string(), "LOD 2 3");
        assert_eq!(Instruction::Opr(Opr::Ge).to_string(), "OPR 0 11");
        assert_eq!(Instruction::Opr(Opr::Ret).to_string(), "OPR 0 0");
        assert_eq!(Instruction::Red.to_string(), "RED 0 0");
    }

    #[test]
    fn test_opr_codes_skip_seven() {
        assert_eq!(Opr::from_code(7), None);
        assert_eq!(Opr::from_code(14), None);
        for code in (0..=13).filter(|c| *c != 7) {
            let opr = Opr::from_code(code).unwrap();
            assert_eq!(opr.code(), code);
        }
    }

    #[test]
    fn test_from_fields_rejects_bad_operands() {
        assert!(Instruction::from_fields(OpCode::Jmp, 0, -1).is_err());
        assert!(Instruction::from_fields(OpCode::Opr, 0, 7).is_err());
        assert!(Instruction::from_fields(OpCode::Lit, 1, 5).is_err());
        assert_eq!(
            Instruction::from_fields(OpCode::Cal, 1, 4),
            Ok(Instruction::Cal {
                level: 1,
                target: 4
            })
        );
        assert_eq!(
            Instruction::from_fields(OpCode::Lit, 0, -5),
            Ok(Instruction::Lit(-5))
        );
    }

    #[test]
    fn test_branch_target() {
        assert_eq!(Instruction::Jpc(9).branch_target(), Some(9));
        assert_eq!(
            Instruction::Cal {
                level: 0,
                target: 2
            }
            .branch_target(),
            Some(2)
        );
        assert_eq!(Instruction::Int(4).branch_target(), None);
    }
}
