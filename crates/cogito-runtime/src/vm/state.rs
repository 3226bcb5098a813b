//! Execution state and snapshots
//!
//! Everything needed to continue an execution lives in [`ExecutionState`];
//! a [`Snapshot`] pairs it with the fingerprint of the program it belongs to.

use super::frame::Frame;
use crate::heap::Heap;
use crate::value::{RuntimeError, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Current snapshot format version
pub const SNAPSHOT_VERSION: u16 = 1;

/// Execution status
///
/// `ready -> running -> {completed | error | waiting_cc}`, and
/// `waiting_cc -> running` once a reply is supplied. `completed` and `error`
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Ready,
    Running,
    Completed,
    Error,
    WaitingCc,
}

impl Status {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Completed | Status::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Ready => "ready",
            Status::Running => "running",
            Status::Completed => "completed",
            Status::Error => "error",
            Status::WaitingCc => "waiting_cc",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Complete, serializable state of one execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionState {
    pub status: Status,
    pub pc: usize,
    pub stack: Vec<Value>,
    /// Call frames, entry frame first
    pub frames: Vec<Frame>,
    pub heap: Heap,
    /// One entry per print call
    #[serde(default)]
    pub output: Vec<String>,
    /// Prompt of the CC call the execution is waiting on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RuntimeError>,
    /// Completion value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl Default for ExecutionState {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionState {
    pub fn new() -> Self {
        Self {
            status: Status::Ready,
            pc: 0,
            stack: Vec::new(),
            frames: vec![Frame::entry()],
            heap: Heap::new(),
            output: Vec::new(),
            pending_prompt: None,
            error: None,
            result: None,
        }
    }

    /// Program-wide bindings (the entry frame's variables)
    pub fn globals(&self) -> Option<&BTreeMap<String, Value>> {
        self.frames.first().map(|frame| &frame.variables)
    }

    /// Look up a program-wide binding
    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals().and_then(|vars| vars.get(name))
    }
}

/// Execution state tied to the program it was taken from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default = "default_version")]
    pub version: u16,
    /// Fingerprint of the bytecode, see [`crate::bytecode::Bytecode::fingerprint`]
    pub program: String,
    pub state: ExecutionState,
}

fn default_version() -> u16 {
    SNAPSHOT_VERSION
}

impl Snapshot {
    pub fn new(program: impl Into<String>, state: ExecutionState) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            program: program.into(),
            state,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
