//! Opcode handler table
//!
//! Every opcode maps to a [`Handler`] describing its stack contract and its
//! effect. The table is indexed by the opcode byte, so decoding is a single
//! lookup and the VM can check underflow before running any effect.

use super::handlers as h;
use super::Vm;
use crate::bytecode::{Instruction, Opcode, Operand};
use crate::value::Fault;

/// Handler effect
pub type Effect = fn(&mut Vm, &Instruction) -> Result<(), Fault>;

/// Number of values a handler pops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackIn {
    Fixed(usize),
    /// A fixed number plus the count carried by the operand
    Counted(usize),
}

impl StackIn {
    /// Resolve the pop count for `instruction`
    pub fn count(&self, instruction: &Instruction) -> Result<usize, Fault> {
        match self {
            StackIn::Fixed(n) => Ok(*n),
            StackIn::Counted(base) => {
                let extra = match &instruction.arg {
                    Some(Operand::Call { argc, .. }) => Some(*argc),
                    Some(arg) => arg.as_address(),
                    None => None,
                };
                extra.map(|n| base + n).ok_or(Fault::InvalidOperand {
                    opcode: instruction.op,
                    expected: "a count",
                })
            }
        }
    }
}

/// Stack contract and effect of one opcode
#[derive(Clone, Copy)]
pub struct Handler {
    pub stack_in: StackIn,
    /// Values pushed on the normal path
    pub stack_out: usize,
    /// The effect sets `pc` itself
    pub controls_pc: bool,
    pub effect: Effect,
}

const fn op(stack_in: usize, stack_out: usize, effect: Effect) -> Option<Handler> {
    Some(Handler {
        stack_in: StackIn::Fixed(stack_in),
        stack_out,
        controls_pc: false,
        effect,
    })
}

const fn counted(base: usize, stack_out: usize, effect: Effect) -> Option<Handler> {
    Some(Handler {
        stack_in: StackIn::Counted(base),
        stack_out,
        controls_pc: false,
        effect,
    })
}

const fn flow(stack_in: StackIn, stack_out: usize, effect: Effect) -> Option<Handler> {
    Some(Handler {
        stack_in,
        stack_out,
        controls_pc: true,
        effect,
    })
}

static HANDLERS: [Option<Handler>; 256] = {
    use StackIn::{Counted, Fixed};

    let mut table: [Option<Handler>; 256] = [None; 256];

    // Stack
    table[Opcode::Push as usize] = op(0, 1, h::push);
    table[Opcode::PushUndefined as usize] = op(0, 1, h::push_undefined);
    table[Opcode::PushNull as usize] = op(0, 1, h::push_null);
    table[Opcode::Pop as usize] = op(1, 0, h::pop);
    table[Opcode::Dup as usize] = op(1, 2, h::dup);
    table[Opcode::Dup2 as usize] = op(2, 4, h::dup2);
    table[Opcode::Swap as usize] = op(2, 2, h::swap);
    table[Opcode::Halt as usize] = flow(Fixed(0), 0, h::halt);

    // Arithmetic
    table[Opcode::Add as usize] = op(2, 1, h::add);
    table[Opcode::Sub as usize] = op(2, 1, h::sub);
    table[Opcode::Mul as usize] = op(2, 1, h::mul);
    table[Opcode::Div as usize] = op(2, 1, h::div);
    table[Opcode::Mod as usize] = op(2, 1, h::rem);
    table[Opcode::Pow as usize] = op(2, 1, h::pow);
    table[Opcode::Neg as usize] = op(1, 1, h::neg);
    table[Opcode::ToNumber as usize] = op(1, 1, h::to_number);

    // Comparison
    table[Opcode::Eq as usize] = op(2, 1, h::eq);
    table[Opcode::Ne as usize] = op(2, 1, h::ne);
    table[Opcode::StrictEq as usize] = op(2, 1, h::strict_eq);
    table[Opcode::StrictNe as usize] = op(2, 1, h::strict_ne);
    table[Opcode::Lt as usize] = op(2, 1, h::lt);
    table[Opcode::Le as usize] = op(2, 1, h::le);
    table[Opcode::Gt as usize] = op(2, 1, h::gt);
    table[Opcode::Ge as usize] = op(2, 1, h::ge);

    // Logical
    table[Opcode::Not as usize] = op(1, 1, h::not);

    // Variables
    table[Opcode::Load as usize] = op(0, 1, h::load);
    table[Opcode::Store as usize] = op(1, 0, h::store);
    table[Opcode::Define as usize] = op(1, 0, h::define);

    // Control flow
    table[Opcode::Jump as usize] = flow(Fixed(0), 0, h::jump);
    table[Opcode::JumpIfFalse as usize] = flow(Fixed(1), 0, h::jump_if_false);
    table[Opcode::JumpIfTrue as usize] = flow(Fixed(1), 0, h::jump_if_true);
    table[Opcode::Break as usize] = flow(Fixed(0), 0, h::jump);
    table[Opcode::Continue as usize] = flow(Fixed(0), 0, h::jump);
    table[Opcode::Call as usize] = flow(Counted(0), 0, h::call);
    table[Opcode::Return as usize] = flow(Fixed(1), 1, h::ret);

    // Arrays
    table[Opcode::ArrayNew as usize] = counted(0, 1, h::array_new);
    table[Opcode::ArrayPush as usize] = counted(1, 1, h::array_push);
    table[Opcode::ArrayGet as usize] = op(2, 1, h::array_get);
    table[Opcode::ArraySet as usize] = op(3, 1, h::array_set);
    table[Opcode::Length as usize] = op(1, 1, h::length);

    // Objects
    table[Opcode::ObjectCreate as usize] = op(0, 1, h::object_create);
    table[Opcode::PropertyGet as usize] = op(1, 1, h::property_get);
    table[Opcode::PropertySet as usize] = op(2, 1, h::property_set);
    table[Opcode::ObjectKeys as usize] = op(1, 1, h::object_keys);
    table[Opcode::ObjectIterStart as usize] = op(1, 0, h::object_iter_start);
    table[Opcode::ObjectIterNext as usize] = flow(Fixed(0), 1, h::iter_next);

    // Iteration
    table[Opcode::IterStart as usize] = op(1, 0, h::iter_start);
    table[Opcode::IterNext as usize] = flow(Fixed(0), 1, h::iter_next);
    table[Opcode::IterEnd as usize] = op(0, 0, h::iter_end);

    // JSON
    table[Opcode::JsonStringify as usize] = op(1, 1, h::json_stringify);
    table[Opcode::JsonParse as usize] = op(1, 1, h::json_parse);

    // Strings / regex
    table[Opcode::StringReplace as usize] = op(3, 1, h::string_replace);
    table[Opcode::StringReplaceRegex as usize] = op(2, 1, h::string_replace_regex);
    table[Opcode::LoadRegex as usize] = op(0, 1, h::load_regex);

    // Introspection
    table[Opcode::Typeof as usize] = op(1, 1, h::type_of);

    // Output / filesystem
    table[Opcode::Print as usize] = counted(0, 1, h::print);
    table[Opcode::FsList as usize] = op(1, 1, h::fs_list);
    table[Opcode::FsRead as usize] = op(1, 1, h::fs_read);
    table[Opcode::FsWrite as usize] = op(2, 1, h::fs_write);

    // Suspension
    table[Opcode::Cc as usize] = flow(Fixed(1), 0, h::cc);

    table
};

/// Handler for `opcode`
#[inline(always)]
pub fn handler(opcode: Opcode) -> Option<&'static Handler> {
    HANDLERS[opcode as usize].as_ref()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_opcode_has_a_handler() {
        for opcode in Opcode::ALL {
            assert!(handler(*opcode).is_some(), "missing handler for {}", opcode);
        }
    }

    #[test]
    fn test_counted_stack_in_reads_operand() {
        let push = Instruction::with_int(Opcode::ArrayPush, 3);
        assert_eq!(StackIn::Counted(1).count(&push), Ok(4));

        let call = Instruction::with_arg(
            Opcode::Call,
            Operand::Call {
                name: "f".into(),
                argc: 2,
            },
        );
        assert_eq!(StackIn::Counted(0).count(&call), Ok(2));

        let missing = Instruction::new(Opcode::Print);
        assert!(StackIn::Counted(0).count(&missing).is_err());
    }

    #[test]
    fn test_jump_family_controls_pc() {
        for opcode in Opcode::ALL.iter().filter(|op| op.is_jump()) {
            assert!(handler(*opcode).map(|h| h.controls_pc).unwrap_or(false));
        }
    }
}
