//! Bytecode program
//!
//! A program is a flat list of instructions addressed by index plus a table
//! of the functions compiled inline into it. Jump operands are absolute
//! instruction addresses; forward jumps are emitted with a `-1` placeholder
//! and patched once the target is known.

mod disasm;
mod opcode;
pub mod validator;

pub use disasm::disassemble;
pub use opcode::Opcode;

use crate::span::Span;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Operand value of a jump that has not been patched yet
pub const JUMP_PLACEHOLDER: i64 = -1;

/// Current bytecode format version
///
/// Version history:
/// - Version 1: JSON instruction list with function table
pub const BYTECODE_VERSION: u16 = 1;

/// Instruction operand
///
/// Serialized untagged: an integer (address or count), a number, a boolean,
/// a string (name or literal), a regex `{pattern, flags}` or a call target
/// `{name, argc}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    Int(i64),
    Number(f64),
    Bool(bool),
    Str(String),
    Regex { pattern: String, flags: String },
    Call { name: String, argc: usize },
}

impl Operand {
    /// Jump target or count
    pub fn as_address(&self) -> Option<usize> {
        match self {
            Operand::Int(n) if *n >= 0 => Some(*n as usize),
            Operand::Number(n) if *n >= 0.0 && n.fract() == 0.0 => Some(*n as usize),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            Operand::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for Operand {
    fn from(s: &str) -> Self {
        Operand::Str(s.to_string())
    }
}

impl From<String> for Operand {
    fn from(s: String) -> Self {
        Operand::Str(s)
    }
}

impl From<f64> for Operand {
    fn from(n: f64) -> Self {
        Operand::Number(n)
    }
}

impl From<bool> for Operand {
    fn from(b: bool) -> Self {
        Operand::Bool(b)
    }
}

/// A single instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub op: Opcode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arg: Option<Operand>,
}

impl Instruction {
    pub fn new(op: Opcode) -> Self {
        Self { op, arg: None }
    }

    pub fn with_arg(op: Opcode, arg: impl Into<Operand>) -> Self {
        Self {
            op,
            arg: Some(arg.into()),
        }
    }

    /// Shorthand for an address or count operand
    pub fn with_int(op: Opcode, value: i64) -> Self {
        Self {
            op,
            arg: Some(Operand::Int(value)),
        }
    }
}

/// A function compiled inline into the instruction list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionInfo {
    pub name: String,
    /// Address of the first body instruction
    pub address: usize,
    pub params: Vec<String>,
}

/// Debug information mapping an instruction address to its source span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugSpan {
    pub instruction_offset: usize,
    pub span: Span,
}

/// Bytecode container
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Bytecode {
    pub instructions: Vec<Instruction>,
    #[serde(default)]
    pub functions: Vec<FunctionInfo>,
    /// Source spans by instruction address (optional)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub debug_info: Vec<DebugSpan>,
}

impl Bytecode {
    /// Create a new empty bytecode container
    pub fn new() -> Self {
        Self::default()
    }

    /// Build bytecode from bare instructions (no functions, no debug info)
    pub fn from_instructions(instructions: Vec<Instruction>) -> Self {
        Self {
            instructions,
            ..Self::default()
        }
    }

    /// Append an instruction, returning its address
    pub fn emit(&mut self, instruction: Instruction, span: Span) -> usize {
        let address = self.instructions.len();
        self.debug_info.push(DebugSpan {
            instruction_offset: address,
            span,
        });
        self.instructions.push(instruction);
        address
    }

    /// Emit a jump-family instruction with a placeholder target
    pub fn emit_jump(&mut self, op: Opcode, span: Span) -> usize {
        self.emit(Instruction::with_int(op, JUMP_PLACEHOLDER), span)
    }

    /// Get current instruction offset (next address to be emitted)
    pub fn current_offset(&self) -> usize {
        self.instructions.len()
    }

    /// Point the jump at `site` to `target`
    ///
    /// Patching the same site again with the same target is a no-op.
    pub fn patch_jump(&mut self, site: usize, target: usize) {
        if let Some(instruction) = self.instructions.get_mut(site) {
            instruction.arg = Some(Operand::Int(target as i64));
        }
    }

    /// Register a function entry point
    pub fn add_function(&mut self, name: impl Into<String>, address: usize, params: Vec<String>) {
        self.functions.push(FunctionInfo {
            name: name.into(),
            address,
            params,
        });
    }

    /// Look up a function by name
    pub fn function(&self, name: &str) -> Option<&FunctionInfo> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Source span of the instruction at `pc`, when debug info is present
    pub fn span_at(&self, pc: usize) -> Option<Span> {
        self.debug_info
            .binary_search_by_key(&pc, |d| d.instruction_offset)
            .ok()
            .map(|idx| self.debug_info[idx].span)
    }

    /// SHA-256 of the canonical JSON form, hex encoded
    ///
    /// Debug info is excluded so stripping it does not change identity.
    pub fn fingerprint(&self) -> String {
        #[derive(Serialize)]
        struct Canonical<'a> {
            instructions: &'a [Instruction],
            functions: &'a [FunctionInfo],
        }

        let canonical = Canonical {
            instructions: &self.instructions,
            functions: &self.functions,
        };
        let mut hasher = Sha256::new();
        // Serializing plain data into a Vec cannot fail.
        if let Ok(bytes) = serde_json::to_vec(&canonical) {
            hasher.update(&bytes);
        }
        format!("{:x}", hasher.finalize())
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_emit_and_patch_jump() {
        let mut bc = Bytecode::new();
        let site = bc.emit_jump(Opcode::JumpIfFalse, Span::dummy());
        bc.emit(Instruction::new(Opcode::PushNull), Span::dummy());
        let target = bc.current_offset();
        bc.patch_jump(site, target);
        bc.patch_jump(site, target);

        assert_eq!(bc.instructions[site].arg, Some(Operand::Int(2)));
        assert_eq!(bc.instructions.len(), 2);
    }

    #[test]
    fn test_instruction_json_shape() {
        let json = serde_json::to_string(&Instruction::with_int(Opcode::JumpIfFalse, 12)).unwrap();
        assert_eq!(json, r#"{"op":"JUMP_IF_FALSE","arg":12}"#);

        let json = serde_json::to_string(&Instruction::new(Opcode::Add)).unwrap();
        assert_eq!(json, r#"{"op":"ADD"}"#);
    }

    #[test]
    fn test_operand_untagged_forms() {
        let parsed: Vec<Instruction> = serde_json::from_str(
            r#"[
                {"op":"PUSH","arg":1.5},
                {"op":"PUSH","arg":"hi"},
                {"op":"PUSH","arg":true},
                {"op":"CALL","arg":{"name":"f","argc":2}},
                {"op":"STRING_REPLACE_REGEX","arg":{"pattern":"a+","flags":"g"}},
                {"op":"ARRAY_NEW","arg":3}
            ]"#,
        )
        .unwrap();
        assert_eq!(parsed[0].arg, Some(Operand::Number(1.5)));
        assert_eq!(parsed[1].arg, Some(Operand::Str("hi".into())));
        assert_eq!(parsed[2].arg, Some(Operand::Bool(true)));
        assert_eq!(
            parsed[3].arg,
            Some(Operand::Call {
                name: "f".into(),
                argc: 2
            })
        );
        assert_eq!(
            parsed[4].arg,
            Some(Operand::Regex {
                pattern: "a+".into(),
                flags: "g".into()
            })
        );
        assert_eq!(parsed[5].arg, Some(Operand::Int(3)));
    }

    #[test]
    fn test_fingerprint_ignores_debug_info() {
        let mut a = Bytecode::new();
        a.emit(Instruction::new(Opcode::Halt), Span::new(0, 1, 1, 1));
        let b = Bytecode::from_instructions(vec![Instruction::new(Opcode::Halt)]);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);

        let c = Bytecode::from_instructions(vec![Instruction::new(Opcode::PushNull)]);
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_span_lookup() {
        let mut bc = Bytecode::new();
        bc.emit(Instruction::new(Opcode::PushNull), Span::new(0, 4, 1, 1));
        bc.emit(Instruction::new(Opcode::Pop), Span::new(5, 6, 2, 1));
        assert_eq!(bc.span_at(1).map(|s| s.line), Some(2));
        assert_eq!(bc.span_at(9), None);
    }
}
