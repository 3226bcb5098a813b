//! Call frames and iterator slots

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Name recorded for the entry frame
pub const ENTRY_FRAME: &str = "<main>";

/// Call frame
///
/// Frames are plain data so they can be serialized with the rest of the
/// execution state. Each frame owns a flat variable map (no block scopes)
/// and a stack of open iterators.
///
/// ## Stack Layout Example
///
/// ```text
/// main calls add(1, 2): the arguments are popped into add's variables,
/// and add's temporaries start at its stack base.
///
/// [tmp1][tmp2] | [add tmp1]
///  ^             ^
///  main base 0   add stack_base = 2
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Function name (for error messages and debugging)
    pub function: String,
    /// Address to continue at after RETURN
    pub return_pc: usize,
    /// Operand stack height when the frame was entered
    pub stack_base: usize,
    #[serde(default)]
    pub variables: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub iterators: Vec<IteratorState>,
}

impl Frame {
    /// Frame for top-level code; its variables are the program-wide bindings
    pub fn entry() -> Self {
        Self::new(ENTRY_FRAME, 0, 0)
    }

    pub fn new(function: impl Into<String>, return_pc: usize, stack_base: usize) -> Self {
        Self {
            function: function.into(),
            return_pc,
            stack_base,
            variables: BTreeMap::new(),
            iterators: Vec::new(),
        }
    }
}

/// Progress of an open `for-of`/`for-in` loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IteratorState {
    /// Live view over a heap array; elements pushed during the loop are visited
    Array { id: u64, index: usize },
    /// Precomputed values (characters of a string)
    Values { items: Vec<Value>, index: usize },
    /// Key snapshot taken when the loop started
    Keys { keys: Vec<String>, index: usize },
}
