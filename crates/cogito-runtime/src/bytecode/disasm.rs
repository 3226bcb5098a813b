//! Bytecode disassembler
//!
//! Renders bytecode in an assembly-like listing for `cogito compile --disasm`
//! and for snapshot tests.

use super::{Bytecode, Instruction, Operand};
use std::fmt::Write;

/// Disassemble bytecode to human-readable format
///
/// # Format
/// ```text
/// === Functions ===
/// add(a, b) @ 1
///
/// === Instructions ===
/// 0000  JUMP 5
/// 0001  LOAD a
/// ```
pub fn disassemble(bytecode: &Bytecode) -> String {
    let mut output = String::new();

    if !bytecode.functions.is_empty() {
        let _ = writeln!(output, "=== Functions ===");
        for function in &bytecode.functions {
            let _ = writeln!(
                output,
                "{}({}) @ {}",
                function.name,
                function.params.join(", "),
                function.address
            );
        }
        let _ = writeln!(output);
    }

    let _ = writeln!(output, "=== Instructions ===");
    for (address, instruction) in bytecode.instructions.iter().enumerate() {
        let _ = writeln!(output, "{}", disassemble_instruction(address, instruction));
    }

    output
}

/// Format a single instruction with its address
pub fn disassemble_instruction(address: usize, instruction: &Instruction) -> String {
    match &instruction.arg {
        None => format!("{:04}  {}", address, instruction.op),
        Some(arg) => format!("{:04}  {} {}", address, instruction.op, format_operand(arg)),
    }
}

fn format_operand(operand: &Operand) -> String {
    match operand {
        Operand::Int(n) => n.to_string(),
        Operand::Number(n) => crate::value::format_number(*n),
        Operand::Bool(b) => b.to_string(),
        Operand::Str(s) => format!("{:?}", s),
        Operand::Regex { pattern, flags } => format!("/{}/{}", pattern, flags),
        Operand::Call { name, argc } => format!("{}/{}", name, argc),
    }
}
