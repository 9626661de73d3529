use crate::bytecode::{Instruction, Program};
use crate::compiler::{Symbol, SymbolKind};
use std::collections::BTreeSet;

/// Print disassembly of a P-Code program
pub fn print_program(program: &Program) {
    println!("════════════════════════════════════════");
    println!(" P-Code");
    println!(" {} instructions", program.len());
    println!("════════════════════════════════════════");
    print!("{}", disassemble_to_string(program));
    println!();
}

/// Print the symbol table produced by the compiler
pub fn print_symbols(symbols: &[Symbol]) {
    print!("{}", symbols_to_string(symbols));
}

fn collect_jump_targets(code: &[Instruction]) -> BTreeSet<usize> {
    code.iter().filter_map(Instruction::branch_target).collect()
}

// =============================================================================
// String output (for testing/logging)
// =============================================================================

/// Return disassembly as a String.
///
/// Every instruction some branch or call lands on is preceded by a rule and
/// marked with `►`.
pub fn disassemble_to_string(program: &Program) -> String {
    let code = program.instructions();
    let jump_targets = collect_jump_targets(code);
    let mut output = String::new();

    for (ip, ins) in code.iter().enumerate() {
        let is_target = jump_targets.contains(&ip);
        if is_target {
            output.push_str("      ┌──────────────────────────────────\n");
        }

        output.push_str(&format!("{:04} ", ip));
        output.push_str(if is_target { "► " } else { "  " });
        output.push_str(&format_instruction(ins, ip));
        output.push('\n');
    }

    output
}

fn format_instruction(ins: &Instruction, ip: usize) -> String {
    let text = match ins {
        Instruction::Lit(v) => format!("LIT   {:<3} {:<6}", 0, v),
        Instruction::Lod { level, addr } => {
            format!("LOD   {:<3} {:<6} ; load  [{}:{}]", level, addr, level, addr)
        }
        Instruction::Sto { level, addr } => {
            format!("STO   {:<3} {:<6} ; store [{}:{}]", level, addr, level, addr)
        }
        Instruction::Cal { level, target } => {
            format!("CAL   {:<3} {:<6} ; call (→ {:04})", level, target, target)
        }
        Instruction::Int(n) => format!("INT   {:<3} {:<6} ; frame of {}", 0, n, n),
        Instruction::Jmp(target) => {
            let direction = if *target <= ip { "↑" } else { "↓" };
            format!("JMP   {:<3} {:<6} ; {} (→ {:04})", 0, target, direction, target)
        }
        Instruction::Jpc(target) => {
            let direction = if *target <= ip { "↑" } else { "↓" };
            format!("JPC   {:<3} {:<6} ; {} if false (→ {:04})", 0, target, direction, target)
        }
        Instruction::Opr(opr) => {
            format!("OPR   {:<3} {:<6} ; {}", 0, opr.code(), opr.mnemonic())
        }
        Instruction::Red => format!("RED   {:<3} {:<6} ; ( -- n )", 0, 0),
        Instruction::Wrt => format!("WRT   {:<3} {:<6} ; ( n -- )", 0, 0),
    };
    text.trim_end().to_string()
}

/// Return the symbol table as a String, one symbol per line in declaration
/// order.
pub fn symbols_to_string(symbols: &[Symbol]) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "{:<16} {:<10} {:>5}  {}\n",
        "NAME", "KIND", "LEVEL", "VALUE"
    ));

    for symbol in symbols {
        let detail = match symbol.kind {
            SymbolKind::Const { value } => format!("value={}", value),
            SymbolKind::Var { address } => format!("addr={}", address),
            SymbolKind::Procedure { entry } => format!("entry={:04}", entry),
        };
        output.push_str(&format!(
            "{:<16} {:<10} {:>5}  {}\n",
            symbol.name,
            symbol.kind.name(),
            symbol.level,
            detail
        ));
    }

    output
}
