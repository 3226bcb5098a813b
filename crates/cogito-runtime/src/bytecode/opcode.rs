//! Bytecode instruction set
//!
//! Opcodes are grouped by category with explicit byte values. The byte value
//! indexes the VM handler table; the serialized form is the opcode's name.

use serde::{Deserialize, Serialize};

/// Bytecode opcode
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Opcode {
    // ===== Stack (0x00-0x0F) =====
    /// Push the literal operand
    Push = 0x00,
    PushUndefined = 0x01,
    PushNull = 0x02,
    /// Pop and discard top of stack
    Pop = 0x03,
    /// Duplicate top of stack
    Dup = 0x04,
    /// Duplicate the top two values: a b -> a b a b
    Dup2 = 0x05,
    /// Swap the top two values
    Swap = 0x06,
    /// Stop execution, status completed
    Halt = 0x0F,

    // ===== Arithmetic (0x10-0x1F) =====
    /// Pop b, pop a, push a + b (string concatenation when either is a string)
    Add = 0x10,
    Sub = 0x11,
    Mul = 0x12,
    Div = 0x13,
    Mod = 0x14,
    Pow = 0x15,
    /// Pop a, push -a
    Neg = 0x16,
    /// Pop a, push ToNumber(a)
    ToNumber = 0x17,

    // ===== Comparison (0x20-0x2F) =====
    Eq = 0x20,
    Ne = 0x21,
    StrictEq = 0x22,
    StrictNe = 0x23,
    Lt = 0x24,
    Le = 0x25,
    Gt = 0x26,
    Ge = 0x27,

    // ===== Logical (0x30-0x3F) =====
    /// Pop a, push !a
    Not = 0x30,

    // ===== Variables (0x40-0x4F) =====
    /// Push the value bound to the name operand (undefined when unbound)
    Load = 0x40,
    /// Pop value and assign it to an existing binding, or create one in the current frame
    Store = 0x41,
    /// Pop value and bind it in the current frame
    Define = 0x42,

    // ===== Control flow (0x50-0x5F) =====
    /// Unconditional jump [address]
    Jump = 0x50,
    /// Pop condition, jump if falsy [address]
    JumpIfFalse = 0x51,
    /// Pop condition, jump if truthy [address]
    JumpIfTrue = 0x52,
    /// Jump out of a loop [address]
    Break = 0x53,
    /// Jump to a loop's continue target [address]
    Continue = 0x54,
    /// Call a declared function [{name, argc}]
    Call = 0x55,
    /// Pop return value, pop frame, push value for the caller
    Return = 0x56,

    // ===== Arrays (0x60-0x6F) =====
    /// Pop `count` values, push a new array holding them in order [count]
    ArrayNew = 0x60,
    /// Pop `count` values, pop array, append them, push new length [count]
    ArrayPush = 0x61,
    /// Pop key, pop target, push target[key]
    ArrayGet = 0x62,
    /// Pop value, pop key, pop target, target[key] = value, push value
    ArraySet = 0x63,
    /// Pop target, push its length
    Length = 0x64,

    // ===== Objects (0x70-0x7F) =====
    /// Push a new empty object
    ObjectCreate = 0x70,
    /// Pop target, push target.key [key]
    PropertyGet = 0x71,
    /// Pop value, pop target, target.key = value, push value [key]
    PropertySet = 0x72,
    /// Pop object, push array of its keys in insertion order
    ObjectKeys = 0x73,
    /// Pop target, open a key iterator in the current frame
    ObjectIterStart = 0x74,
    /// Push next key or jump when exhausted [address]
    ObjectIterNext = 0x75,

    // ===== Iteration (0x80-0x8F) =====
    /// Pop iterable, open a value iterator in the current frame
    IterStart = 0x80,
    /// Push next value or jump when exhausted [address]
    IterNext = 0x81,
    /// Close the innermost iterator of the current frame
    IterEnd = 0x82,

    // ===== JSON (0x90-0x9F) =====
    JsonStringify = 0x90,
    JsonParse = 0x91,

    // ===== Strings / regex (0xA0-0xAF) =====
    /// Pop replacement, pop pattern, pop subject, push result
    StringReplace = 0xA0,
    /// Pop replacement, pop subject, push result [{pattern, flags}]
    StringReplaceRegex = 0xA1,
    /// Push a regex object [{pattern, flags}]
    LoadRegex = 0xA2,

    // ===== Introspection (0xB0-0xBF) =====
    Typeof = 0xB0,

    // ===== Output / filesystem (0xC0-0xCF) =====
    /// Pop `argc` values, append them to the output buffer, push undefined [argc]
    Print = 0xC0,
    /// Pop directory, push sorted array of names or null
    FsList = 0xC1,
    /// Pop path, push contents or null
    FsRead = 0xC2,
    /// Pop contents, pop path, push true or null
    FsWrite = 0xC3,

    // ===== Suspension (0xF0-0xFF) =====
    /// Pop prompt and suspend until an external reply is supplied
    Cc = 0xF0,
}

impl Opcode {
    /// Every opcode, in byte order
    pub const ALL: &'static [Opcode] = &[
        Opcode::Push,
        Opcode::PushUndefined,
        Opcode::PushNull,
        Opcode::Pop,
        Opcode::Dup,
        Opcode::Dup2,
        Opcode::Swap,
        Opcode::Halt,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::Div,
        Opcode::Mod,
        Opcode::Pow,
        Opcode::Neg,
        Opcode::ToNumber,
        Opcode::Eq,
        Opcode::Ne,
        Opcode::StrictEq,
        Opcode::StrictNe,
        Opcode::Lt,
        Opcode::Le,
        Opcode::Gt,
        Opcode::Ge,
        Opcode::Not,
        Opcode::Load,
        Opcode::Store,
        Opcode::Define,
        Opcode::Jump,
        Opcode::JumpIfFalse,
        Opcode::JumpIfTrue,
        Opcode::Break,
        Opcode::Continue,
        Opcode::Call,
        Opcode::Return,
        Opcode::ArrayNew,
        Opcode::ArrayPush,
        Opcode::ArrayGet,
        Opcode::ArraySet,
        Opcode::Length,
        Opcode::ObjectCreate,
        Opcode::PropertyGet,
        Opcode::PropertySet,
        Opcode::ObjectKeys,
        Opcode::ObjectIterStart,
        Opcode::ObjectIterNext,
        Opcode::IterStart,
        Opcode::IterNext,
        Opcode::IterEnd,
        Opcode::JsonStringify,
        Opcode::JsonParse,
        Opcode::StringReplace,
        Opcode::StringReplaceRegex,
        Opcode::LoadRegex,
        Opcode::Typeof,
        Opcode::Print,
        Opcode::FsList,
        Opcode::FsRead,
        Opcode::FsWrite,
        Opcode::Cc,
    ];

    /// Serialized name, e.g. `JUMP_IF_FALSE`
    pub fn name(&self) -> &'static str {
        match self {
            Opcode::Push => "PUSH",
            Opcode::PushUndefined => "PUSH_UNDEFINED",
            Opcode::PushNull => "PUSH_NULL",
            Opcode::Pop => "POP",
            Opcode::Dup => "DUP",
            Opcode::Dup2 => "DUP2",
            Opcode::Swap => "SWAP",
            Opcode::Halt => "HALT",
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::Mul => "MUL",
            Opcode::Div => "DIV",
            Opcode::Mod => "MOD",
            Opcode::Pow => "POW",
            Opcode::Neg => "NEG",
            Opcode::ToNumber => "TO_NUMBER",
            Opcode::Eq => "EQ",
            Opcode::Ne => "NE",
            Opcode::StrictEq => "STRICT_EQ",
            Opcode::StrictNe => "STRICT_NE",
            Opcode::Lt => "LT",
            Opcode::Le => "LE",
            Opcode::Gt => "GT",
            Opcode::Ge => "GE",
            Opcode::Not => "NOT",
            Opcode::Load => "LOAD",
            Opcode::Store => "STORE",
            Opcode::Define => "DEFINE",
            Opcode::Jump => "JUMP",
            Opcode::JumpIfFalse => "JUMP_IF_FALSE",
            Opcode::JumpIfTrue => "JUMP_IF_TRUE",
            Opcode::Break => "BREAK",
            Opcode::Continue => "CONTINUE",
            Opcode::Call => "CALL",
            Opcode::Return => "RETURN",
            Opcode::ArrayNew => "ARRAY_NEW",
            Opcode::ArrayPush => "ARRAY_PUSH",
            Opcode::ArrayGet => "ARRAY_GET",
            Opcode::ArraySet => "ARRAY_SET",
            Opcode::Length => "LENGTH",
            Opcode::ObjectCreate => "OBJECT_CREATE",
            Opcode::PropertyGet => "PROPERTY_GET",
            Opcode::PropertySet => "PROPERTY_SET",
            Opcode::ObjectKeys => "OBJECT_KEYS",
            Opcode::ObjectIterStart => "OBJECT_ITER_START",
            Opcode::ObjectIterNext => "OBJECT_ITER_NEXT",
            Opcode::IterStart => "ITER_START",
            Opcode::IterNext => "ITER_NEXT",
            Opcode::IterEnd => "ITER_END",
            Opcode::JsonStringify => "JSON_STRINGIFY",
            Opcode::JsonParse => "JSON_PARSE",
            Opcode::StringReplace => "STRING_REPLACE",
            Opcode::StringReplaceRegex => "STRING_REPLACE_REGEX",
            Opcode::LoadRegex => "LOAD_REGEX",
            Opcode::Typeof => "TYPEOF",
            Opcode::Print => "PRINT",
            Opcode::FsList => "FS_LIST",
            Opcode::FsRead => "FS_READ",
            Opcode::FsWrite => "FS_WRITE",
            Opcode::Cc => "CC",
        }
    }

    /// Opcodes whose operand is a jump address, patched by the compiler
    pub fn is_jump(&self) -> bool {
        matches!(
            self,
            Opcode::Jump
                | Opcode::JumpIfFalse
                | Opcode::JumpIfTrue
                | Opcode::Break
                | Opcode::Continue
                | Opcode::IterNext
                | Opcode::ObjectIterNext
        )
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u8> for Opcode {
    type Error = ();

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Opcode::ALL
            .iter()
            .copied()
            .find(|op| *op as u8 == byte)
            .ok_or(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_from_u8() {
        assert_eq!(Opcode::try_from(0x00), Ok(Opcode::Push));
        assert_eq!(Opcode::try_from(0x51), Ok(Opcode::JumpIfFalse));
        assert_eq!(Opcode::try_from(0xF0), Ok(Opcode::Cc));
        assert_eq!(Opcode::try_from(0xEE), Err(()));
    }

    #[test]
    fn test_all_opcodes_roundtrip_through_byte() {
        for op in Opcode::ALL {
            assert_eq!(Opcode::try_from(*op as u8), Ok(*op));
        }
    }

    #[test]
    fn test_serde_name_matches_name() {
        for op in Opcode::ALL {
            let json = serde_json::to_string(op).unwrap();
            assert_eq!(json, format!("\"{}\"", op.name()));
        }
    }
}
