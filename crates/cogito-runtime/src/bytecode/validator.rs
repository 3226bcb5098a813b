//! Bytecode validator: static checks before VM execution
//!
//! Performs three checks:
//! 1. **Operands**: every instruction carries the operand shape its opcode needs
//! 2. **Jump targets**: no placeholder survives and every target is in `[0, len]`
//! 3. **Functions**: call targets exist and entry addresses are in bounds
//!
//! The compiler runs it on its own output; hosts run it on bytecode they load.

use crate::bytecode::{Bytecode, Opcode, Operand, JUMP_PLACEHOLDER};

/// A validation error with the instruction address where it was detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub offset: usize,
    pub kind: ValidationErrorKind,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "instruction {}: {}", self.offset, self.kind)
    }
}

/// Kinds of errors the validator can detect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// A jump still holds the `-1` placeholder.
    UnpatchedJump { opcode: &'static str },
    /// A jump target falls outside `[0, instructions.len()]`.
    JumpOutOfBounds { target: i64, len: usize },
    /// The operand is missing or has the wrong shape.
    BadOperand {
        opcode: &'static str,
        expected: &'static str,
    },
    /// CALL names a function that is not in the function table.
    UnknownFunction(String),
    /// A function entry address is outside the instruction list.
    FunctionOutOfBounds { name: String, address: usize },
}

impl std::fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnpatchedJump { opcode } => write!(f, "{} was never patched", opcode),
            Self::JumpOutOfBounds { target, len } => {
                write!(f, "jump target {} is out of bounds (len={})", target, len)
            }
            Self::BadOperand { opcode, expected } => {
                write!(f, "{} expects {} operand", opcode, expected)
            }
            Self::UnknownFunction(name) => write!(f, "call to undeclared function '{}'", name),
            Self::FunctionOutOfBounds { name, address } => {
                write!(f, "function '{}' starts at out-of-bounds address {}", name, address)
            }
        }
    }
}

/// Validate `bytecode`, collecting all errors found.
pub fn validate(bytecode: &Bytecode) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_operands(bytecode, &mut errors);
    check_jump_targets(bytecode, &mut errors);
    check_functions(bytecode, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Only the jump-target check; used by the compiler after patching
pub fn check_jumps(bytecode: &Bytecode) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    check_jump_targets(bytecode, &mut errors);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn expected_operand(op: Opcode) -> Option<&'static str> {
    match op {
        Opcode::Push => Some("a literal"),
        Opcode::Load
        | Opcode::Store
        | Opcode::Define
        | Opcode::PropertyGet
        | Opcode::PropertySet => Some("a name"),
        Opcode::ArrayNew | Opcode::ArrayPush | Opcode::Print => Some("a count"),
        Opcode::Call => Some("a {name, argc}"),
        Opcode::StringReplaceRegex | Opcode::LoadRegex => Some("a {pattern, flags}"),
        op if op.is_jump() => Some("an address"),
        _ => None,
    }
}

fn operand_matches(op: Opcode, arg: Option<&Operand>) -> bool {
    match (op, arg) {
        (Opcode::Push, Some(arg)) => matches!(
            arg,
            Operand::Int(_) | Operand::Number(_) | Operand::Bool(_) | Operand::Str(_)
        ),
        (
            Opcode::Load | Opcode::Store | Opcode::Define | Opcode::PropertyGet | Opcode::PropertySet,
            Some(arg),
        ) => arg.as_name().is_some(),
        (Opcode::ArrayNew | Opcode::ArrayPush | Opcode::Print, Some(arg)) => arg.as_address().is_some(),
        (Opcode::Call, Some(arg)) => matches!(arg, Operand::Call { .. }),
        (Opcode::StringReplaceRegex | Opcode::LoadRegex, Some(arg)) => {
            matches!(arg, Operand::Regex { .. })
        }
        // Jump shapes are checked with their targets.
        (op, _) if op.is_jump() => true,
        (op, _) => expected_operand(op).is_none(),
    }
}

fn check_operands(bytecode: &Bytecode, errors: &mut Vec<ValidationError>) {
    for (offset, instruction) in bytecode.instructions.iter().enumerate() {
        if !operand_matches(instruction.op, instruction.arg.as_ref()) {
            if let Some(expected) = expected_operand(instruction.op) {
                errors.push(ValidationError {
                    offset,
                    kind: ValidationErrorKind::BadOperand {
                        opcode: instruction.op.name(),
                        expected,
                    },
                });
            }
        }
    }
}

fn check_jump_targets(bytecode: &Bytecode, errors: &mut Vec<ValidationError>) {
    let len = bytecode.instructions.len();
    for (offset, instruction) in bytecode.instructions.iter().enumerate() {
        if !instruction.op.is_jump() {
            continue;
        }
        let target = match &instruction.arg {
            Some(Operand::Int(n)) => *n,
            Some(Operand::Number(n)) if n.fract() == 0.0 => *n as i64,
            _ => {
                errors.push(ValidationError {
                    offset,
                    kind: ValidationErrorKind::BadOperand {
                        opcode: instruction.op.name(),
                        expected: "an address",
                    },
                });
                continue;
            }
        };
        if target == JUMP_PLACEHOLDER {
            errors.push(ValidationError {
                offset,
                kind: ValidationErrorKind::UnpatchedJump {
                    opcode: instruction.op.name(),
                },
            });
        } else if target < 0 || target as usize > len {
            errors.push(ValidationError {
                offset,
                kind: ValidationErrorKind::JumpOutOfBounds { target, len },
            });
        }
    }
}

fn check_functions(bytecode: &Bytecode, errors: &mut Vec<ValidationError>) {
    let len = bytecode.instructions.len();
    for function in &bytecode.functions {
        if function.address >= len {
            errors.push(ValidationError {
                offset: function.address,
                kind: ValidationErrorKind::FunctionOutOfBounds {
                    name: function.name.clone(),
                    address: function.address,
                },
            });
        }
    }

    for (offset, instruction) in bytecode.instructions.iter().enumerate() {
        if let Some(Operand::Call { name, .. }) = &instruction.arg {
            if instruction.op == Opcode::Call && bytecode.function(name).is_none() {
                errors.push(ValidationError {
                    offset,
                    kind: ValidationErrorKind::UnknownFunction(name.clone()),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::Instruction;

    #[test]
    fn test_valid_program() {
        let bc = Bytecode::from_instructions(vec![
            Instruction::with_arg(Opcode::Push, 1.0),
            Instruction::with_int(Opcode::JumpIfFalse, 3),
            Instruction::with_arg(Opcode::Push, "x"),
            Instruction::new(Opcode::Halt),
        ]);
        assert_eq!(validate(&bc), Ok(()));
    }

    #[test]
    fn test_placeholder_detected() {
        let bc = Bytecode::from_instructions(vec![
            Instruction::with_int(Opcode::Jump, JUMP_PLACEHOLDER),
            Instruction::new(Opcode::Halt),
        ]);
        let errors = check_jumps(&bc).unwrap_err();
        assert_eq!(
            errors[0].kind,
            ValidationErrorKind::UnpatchedJump { opcode: "JUMP" }
        );
    }

    #[test]
    fn test_jump_past_end_rejected() {
        let bc = Bytecode::from_instructions(vec![Instruction::with_int(Opcode::Jump, 5)]);
        let errors = validate(&bc).unwrap_err();
        assert!(matches!(
            errors[0].kind,
            ValidationErrorKind::JumpOutOfBounds { target: 5, len: 1 }
        ));
    }

    #[test]
    fn test_missing_operand_and_unknown_call() {
        let bc = Bytecode::from_instructions(vec![
            Instruction::new(Opcode::Load),
            Instruction::with_arg(
                Opcode::Call,
                Operand::Call {
                    name: "nope".into(),
                    argc: 0,
                },
            ),
        ]);
        let errors = validate(&bc).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors
            .iter()
            .any(|e| e.kind == ValidationErrorKind::UnknownFunction("nope".into())));
    }
}
