use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::bytecode::Opr;

/// Operator of a quadruple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuadOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Neg,
    Odd,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Jump to `result` when `arg1` is zero.
    Jz,
    Jmp,
    Call,
    Read,
    Write,
    /// Start of a procedure body; `result` is its label.
    Proc,
    Ret,
    End,
}

impl QuadOp {
    pub fn symbol(self) -> &'static str {
        match self {
            QuadOp::Assign => ":=",
            QuadOp::Add => "+",
            QuadOp::Sub => "-",
            QuadOp::Mul => "*",
            QuadOp::Div => "/",
            QuadOp::Neg => "NEG",
            QuadOp::Odd => "ODD",
            QuadOp::Eq => "=",
            QuadOp::Ne => "#",
            QuadOp::Lt => "<",
            QuadOp::Le => "<=",
            QuadOp::Gt => ">",
            QuadOp::Ge => ">=",
            QuadOp::Jz => "JZ",
            QuadOp::Jmp => "JMP",
            QuadOp::Call => "CALL",
            QuadOp::Read => "READ",
            QuadOp::Write => "WRITE",
            QuadOp::Proc => "PROC",
            QuadOp::Ret => "RET",
            QuadOp::End => "END",
        }
    }
}

impl From<Opr> for QuadOp {
    fn from(opr: Opr) -> Self {
        match opr {
            Opr::Ret => QuadOp::Ret,
            Opr::Neg => QuadOp::Neg,
            Opr::Add => QuadOp::Add,
            Opr::Sub => QuadOp::Sub,
            Opr::Mul => QuadOp::Mul,
            Opr::Div => QuadOp::Div,
            Opr::Odd => QuadOp::Odd,
            Opr::Eq => QuadOp::Eq,
            Opr::Ne => QuadOp::Ne,
            Opr::Lt => QuadOp::Lt,
            Opr::Ge => QuadOp::Ge,
            Opr::Gt => QuadOp::Gt,
            Opr::Le => QuadOp::Le,
        }
    }
}

impl fmt::Display for QuadOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// One `(op, arg1, arg2, result)` record. Operands are variable names,
/// literal values, temporaries (`T0`, `T1`, ...) or quad indices; `None`
/// prints as `-`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quad {
    pub op: QuadOp,
    pub arg1: Option<String>,
    pub arg2: Option<String>,
    pub result: Option<String>,
}

impl Quad {
    pub fn new(
        op: QuadOp,
        arg1: Option<String>,
        arg2: Option<String>,
        result: Option<String>,
    ) -> Self {
        Quad {
            op,
            arg1,
            arg2,
            result,
        }
    }
}

fn field(operand: &Option<String>) -> &str {
    operand.as_deref().unwrap_or("-")
}

impl fmt::Display for Quad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            self.op,
            field(&self.arg1),
            field(&self.arg2),
            field(&self.result)
        )
    }
}

/// Collects quadruples alongside P-Code emission.
///
/// `JZ` quads are emitted without a target and patched to the index of the
/// next quad, the same way forward P-Code jumps are.
#[derive(Debug, Default)]
pub struct QuadBuilder {
    quads: Vec<Quad>,
    temps: usize,
    labels: usize,
    pending: BTreeSet<usize>,
}

impl QuadBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index the next quad will get.
    pub fn next_index(&self) -> usize {
        self.quads.len()
    }

    pub fn new_temp(&mut self) -> String {
        let temp = format!("T{}", self.temps);
        self.temps += 1;
        temp
    }

    pub fn new_label(&mut self) -> String {
        let label = format!("L{}", self.labels);
        self.labels += 1;
        label
    }

    pub fn emit(
        &mut self,
        op: QuadOp,
        arg1: Option<String>,
        arg2: Option<String>,
        result: Option<String>,
    ) -> usize {
        self.quads.push(Quad::new(op, arg1, arg2, result));
        self.quads.len() - 1
    }

    /// Emits `op arg1 arg2` into a fresh temporary and returns its name.
    pub fn emit_temp(&mut self, op: QuadOp, arg1: String, arg2: Option<String>) -> String {
        let temp = self.new_temp();
        self.emit(op, Some(arg1), arg2, Some(temp.clone()));
        temp
    }

    /// Emits a `JZ` on `cond` whose target is filled in by [`Self::patch`].
    pub fn emit_jz(&mut self, cond: String) -> usize {
        let index = self.emit(QuadOp::Jz, Some(cond), None, None);
        self.pending.insert(index);
        index
    }

    /// Points the pending `JZ` at `index` to the next quad to be emitted.
    pub fn patch(&mut self, index: usize) -> Result<(), String> {
        if !self.pending.remove(&index) {
            return Err(format!("quad {} is not a pending jump", index));
        }
        let target = self.quads.len();
        match self.quads.get_mut(index) {
            Some(quad) => {
                quad.result = Some(target.to_string());
                Ok(())
            }
            None => Err(format!("quad {} out of range", index)),
        }
    }

    /// Appends `END` and returns the finished list.
    pub fn finish(mut self) -> Result<Vec<Quad>, String> {
        if let Some(&index) = self.pending.iter().next() {
            return Err(format!("unresolved quad jump at {}", index));
        }
        self.emit(QuadOp::End, None, None, None);
        Ok(self.quads)
    }
}

/// Tab-separated quad listing: `index op arg1 arg2 result`.
pub fn quads_to_string(quads: &[Quad]) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "{:<6}{:<8}{:<10}{:<10}{}\n",
        "#", "op", "arg1", "arg2", "result"
    ));
    output.push_str(&"-".repeat(42));
    output.push('\n');

    for (index, quad) in quads.iter().enumerate() {
        output.push_str(&format!(
            "{:<6}{:<8}{:<10}{:<10}{}\n",
            index,
            quad.op,
            field(&quad.arg1),
            field(&quad.arg2),
            field(&quad.result)
        ));
    }

    output
}

pub fn print_quads(quads: &[Quad]) {
    print!("{}", quads_to_string(quads));
}
