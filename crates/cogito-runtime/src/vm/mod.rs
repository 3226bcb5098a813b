//! Suspendable stack-based virtual machine
//!
//! Executes bytecode with an operand stack, call frames with flat variable
//! maps, and a heap of arrays and objects.
//! - Dispatch goes through a handler table that checks stack underflow centrally
//! - A CC instruction suspends execution with a pending prompt
//! - The whole execution state is plain data and can be snapshotted at any
//!   instruction boundary, then restored and resumed

pub mod dispatch;
mod frame;
mod handlers;
mod profiler;
mod state;

pub use frame::{Frame, IteratorState, ENTRY_FRAME};
pub use profiler::Profiler;
pub use state::{ExecutionState, Snapshot, Status, SNAPSHOT_VERSION};

use crate::bytecode::{Bytecode, Instruction};
use crate::fs::{FileSystem, NoFs};
use crate::json;
use crate::value::{Fault, RuntimeError, Value};
use cogito_config::project::DEFAULT_MAX_CALL_DEPTH;
use regex::{Regex, RegexBuilder};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// VM limits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmConfig {
    /// Maximum number of nested function calls
    pub max_call_depth: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

/// Misuse of the VM interface
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VmError {
    #[error("execution is not waiting for a reply (status: {0})")]
    NotWaiting(Status),

    #[error("snapshot was taken from a different program (expected {expected}, found {found})")]
    ProgramMismatch { expected: String, found: String },

    #[error("execution has already finished (status: {0})")]
    Terminal(Status),

    #[error("reply rejected: {0}")]
    InvalidReply(String),
}

/// Virtual machine
pub struct Vm {
    program: Arc<Bytecode>,
    fingerprint: String,
    state: ExecutionState,
    config: VmConfig,
    fs: Box<dyn FileSystem>,
    profiler: Option<Profiler>,
    /// Compiled regexes by (pattern, flags)
    regexes: HashMap<(String, String), (Regex, bool)>,
}

impl Vm {
    /// Create a VM at the start of `program`
    pub fn new(program: impl Into<Arc<Bytecode>>) -> Self {
        Self::with_state(program, ExecutionState::new())
    }

    /// Create a VM continuing from `state`
    pub fn with_state(program: impl Into<Arc<Bytecode>>, mut state: ExecutionState) -> Self {
        let program = program.into();
        if state.frames.is_empty() {
            state.frames.push(Frame::entry());
        }
        Self {
            fingerprint: program.fingerprint(),
            program,
            state,
            config: VmConfig::default(),
            fs: Box::new(NoFs),
            profiler: None,
            regexes: HashMap::new(),
        }
    }

    /// Continue from a snapshot taken from the same program
    pub fn restore(program: impl Into<Arc<Bytecode>>, snapshot: Snapshot) -> Result<Self, VmError> {
        let program = program.into();
        let expected = program.fingerprint();
        if snapshot.program != expected {
            return Err(VmError::ProgramMismatch {
                expected,
                found: snapshot.program,
            });
        }
        Ok(Self::with_state(program, snapshot.state))
    }

    pub fn with_config(mut self, config: VmConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_file_system(mut self, fs: Box<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    pub fn enable_profiling(&mut self) {
        if self.profiler.is_none() {
            self.profiler = Some(Profiler::new());
        }
    }

    pub fn profiler(&self) -> Option<&Profiler> {
        self.profiler.as_ref()
    }

    pub fn program(&self) -> &Bytecode {
        &self.program
    }

    /// Fingerprint of the running program
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn state(&self) -> &ExecutionState {
        &self.state
    }

    pub fn into_state(self) -> ExecutionState {
        self.state
    }

    pub fn status(&self) -> Status {
        self.state.status
    }

    /// Copy of the current state tied to this program
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::new(self.fingerprint.clone(), self.state.clone())
    }

    /// Run until the program completes, fails or suspends
    ///
    /// Does nothing when the execution is suspended or finished.
    pub fn run(&mut self) -> &ExecutionState {
        if self.state.status == Status::Ready {
            self.state.status = Status::Running;
        }
        while self.state.status == Status::Running {
            self.execute_instruction();
        }
        &self.state
    }

    /// Execute exactly one instruction
    ///
    /// A suspended execution is left untouched; a finished one is an error.
    pub fn step(&mut self) -> Result<Status, VmError> {
        match self.state.status {
            Status::Completed | Status::Error => return Err(VmError::Terminal(self.state.status)),
            Status::WaitingCc => return Ok(Status::WaitingCc),
            Status::Ready => self.state.status = Status::Running,
            Status::Running => {}
        }
        self.execute_instruction();
        Ok(self.state.status)
    }

    /// Deliver the reply to a pending CC without running further
    ///
    /// The reply becomes the CC's result, `pc` moves past the CC and the
    /// status returns to running.
    pub fn supply_reply(&mut self, reply: Value) -> Result<(), VmError> {
        if self.state.status != Status::WaitingCc {
            return Err(VmError::NotWaiting(self.state.status));
        }
        self.state.stack.push(reply);
        self.state.pc += 1;
        self.state.pending_prompt = None;
        self.state.status = Status::Running;
        Ok(())
    }

    /// Deliver the reply to a pending CC and run to the next stop
    pub fn resume(&mut self, reply: Value) -> Result<&ExecutionState, VmError> {
        self.supply_reply(reply)?;
        Ok(self.run())
    }

    /// Like [`Vm::resume`], allocating a JSON reply into the heap first
    pub fn resume_json(&mut self, reply: &serde_json::Value) -> Result<&ExecutionState, VmError> {
        if self.state.status != Status::WaitingCc {
            return Err(VmError::NotWaiting(self.state.status));
        }
        let value = json::json_to_value(reply, &mut self.state.heap)
            .map_err(|fault| VmError::InvalidReply(fault.to_string()))?;
        self.resume(value)
    }

    fn execute_instruction(&mut self) {
        let pc = self.state.pc;
        let program = Arc::clone(&self.program);
        let Some(instruction) = program.instructions.get(pc) else {
            // Running off the end completes the program
            let result = self.state.stack.last().cloned();
            self.finish(result);
            return;
        };
        if let Err(fault) = self.dispatch(instruction) {
            let mut error = RuntimeError::from_fault(&fault, pc, instruction.op);
            error.line = program.span_at(pc).map(|span| span.line);
            self.state.error = Some(error);
            self.state.status = Status::Error;
        }
    }

    fn dispatch(&mut self, instruction: &Instruction) -> Result<(), Fault> {
        let op = instruction.op;
        let handler = dispatch::handler(op)
            .ok_or_else(|| Fault::InvalidState(format!("no handler for {}", op)))?;

        let needed = handler.stack_in.count(instruction)?;
        let available = self.frame_stack_len()?;
        if available < needed {
            return Err(Fault::StackUnderflow {
                opcode: op,
                needed,
                available,
            });
        }

        if let Some(profiler) = self.profiler.as_mut() {
            profiler.record(op, self.state.stack.len(), self.state.frames.len());
        }

        let before = self.state.stack.len();
        (handler.effect)(self, instruction)?;

        if !handler.controls_pc && self.state.status == Status::Running {
            debug_assert_eq!(
                self.state.stack.len(),
                before - needed + handler.stack_out,
                "{} broke its stack contract",
                op
            );
            self.state.pc += 1;
        }
        Ok(())
    }

    fn finish(&mut self, result: Option<Value>) {
        self.state.result = result;
        self.state.status = Status::Completed;
    }

    // ===== Helpers for handlers =====

    /// Values on the stack that belong to the current frame
    fn frame_stack_len(&self) -> Result<usize, Fault> {
        let base = self.frame()?.stack_base;
        Ok(self.state.stack.len().saturating_sub(base))
    }

    fn frame(&self) -> Result<&Frame, Fault> {
        self.state
            .frames
            .last()
            .ok_or_else(|| Fault::InvalidState("no active call frame".to_string()))
    }

    fn frame_mut(&mut self) -> Result<&mut Frame, Fault> {
        self.state
            .frames
            .last_mut()
            .ok_or_else(|| Fault::InvalidState("no active call frame".to_string()))
    }

    fn push(&mut self, value: Value) {
        self.state.stack.push(value);
    }

    fn pop(&mut self) -> Result<Value, Fault> {
        self.state
            .stack
            .pop()
            .ok_or_else(|| Fault::InvalidState("operand stack is empty".to_string()))
    }

    /// Pop `count` values, returned in push order
    fn pop_n(&mut self, count: usize) -> Result<Vec<Value>, Fault> {
        let len = self.state.stack.len();
        if count > len {
            return Err(Fault::InvalidState("operand stack is too short".to_string()));
        }
        Ok(self.state.stack.split_off(len - count))
    }

    fn peek(&self, distance: usize) -> Result<&Value, Fault> {
        let len = self.state.stack.len();
        distance
            .checked_add(1)
            .and_then(|d| len.checked_sub(d))
            .and_then(|idx| self.state.stack.get(idx))
            .ok_or_else(|| Fault::InvalidState("operand stack is too short".to_string()))
    }

    /// Compiled regex for `pattern` and whether it is global
    fn regex(&mut self, pattern: &str, flags: &str) -> Result<(Regex, bool), Fault> {
        let key = (pattern.to_string(), flags.to_string());
        if let Some(cached) = self.regexes.get(&key) {
            return Ok(cached.clone());
        }
        let compiled = compile_regex(pattern, flags)?;
        self.regexes.insert(key, compiled.clone());
        Ok(compiled)
    }
}

fn compile_regex(pattern: &str, flags: &str) -> Result<(Regex, bool), Fault> {
    let invalid = |reason: String| Fault::InvalidRegex {
        pattern: pattern.to_string(),
        flags: flags.to_string(),
        reason,
    };

    let mut builder = RegexBuilder::new(pattern);
    let mut global = false;
    for flag in flags.chars() {
        match flag {
            'g' => global = true,
            'i' => {
                builder.case_insensitive(true);
            }
            'm' => {
                builder.multi_line(true);
            }
            's' => {
                builder.dot_matches_new_line(true);
            }
            'u' => {}
            other => return Err(invalid(format!("unsupported flag '{}'", other))),
        }
    }
    let regex = builder.build().map_err(|e| invalid(e.to_string()))?;
    Ok((regex, global))
}

/// Run `program` from `state` (or from the start) until it stops
pub fn execute(program: &Bytecode, state: Option<ExecutionState>) -> ExecutionState {
    let mut vm = Vm::with_state(program.clone(), state.unwrap_or_default());
    vm.run();
    vm.into_state()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{Instruction, Opcode, Operand};
    use pretty_assertions::assert_eq;

    fn program(instructions: Vec<Instruction>) -> Bytecode {
        Bytecode::from_instructions(instructions)
    }

    fn push(n: f64) -> Instruction {
        Instruction::with_arg(Opcode::Push, n)
    }

    #[test]
    fn test_bare_pop_underflows_at_pc_zero() {
        let state = execute(&program(vec![Instruction::new(Opcode::Pop)]), None);
        assert_eq!(state.status, Status::Error);
        let error = state.error.unwrap();
        assert_eq!(error.kind, "stack_underflow");
        assert_eq!(error.opcode, Opcode::Pop);
        assert_eq!(error.pc, 0);
    }

    #[test]
    fn test_arithmetic_and_halt_result() {
        let state = execute(
            &program(vec![
                push(2.0),
                push(3.0),
                Instruction::new(Opcode::Mul),
                push(1.0),
                Instruction::new(Opcode::Sub),
                Instruction::new(Opcode::Halt),
            ]),
            None,
        );
        assert_eq!(state.status, Status::Completed);
        assert_eq!(state.result, Some(Value::number(5)));
    }

    #[test]
    fn test_running_off_the_end_completes() {
        let state = execute(&program(vec![Instruction::new(Opcode::PushNull)]), None);
        assert_eq!(state.status, Status::Completed);
        assert_eq!(state.pc, 1);
    }

    #[test]
    fn test_cc_suspends_and_resume_pushes_reply() {
        let bytecode = program(vec![
            Instruction::with_arg(Opcode::Push, "question?"),
            Instruction::new(Opcode::Cc),
            Instruction::with_arg(Opcode::Define, "answer"),
            Instruction::new(Opcode::Halt),
        ]);
        let mut vm = Vm::new(bytecode);
        let state = vm.run();
        assert_eq!(state.status, Status::WaitingCc);
        assert_eq!(state.pc, 1);
        assert_eq!(state.pending_prompt.as_deref(), Some("question?"));

        let state = vm.resume(Value::string("42")).unwrap();
        assert_eq!(state.status, Status::Completed);
        assert_eq!(state.pending_prompt, None);
        assert_eq!(state.global("answer"), Some(&Value::string("42")));

        assert_eq!(
            vm.resume(Value::Null).unwrap_err(),
            VmError::NotWaiting(Status::Completed)
        );
    }

    #[test]
    fn test_step_on_finished_execution_is_terminal() {
        let mut vm = Vm::new(program(vec![Instruction::new(Opcode::Halt)]));
        assert_eq!(vm.step(), Ok(Status::Completed));
        assert_eq!(vm.step(), Err(VmError::Terminal(Status::Completed)));
    }

    #[test]
    fn test_restore_rejects_other_program() {
        let a = program(vec![Instruction::new(Opcode::Halt)]);
        let b = program(vec![Instruction::new(Opcode::PushNull)]);
        let snapshot = Vm::new(a.clone()).snapshot();
        assert!(Vm::restore(a, snapshot.clone()).is_ok());
        assert!(matches!(
            Vm::restore(b, snapshot),
            Err(VmError::ProgramMismatch { .. })
        ));
    }

    #[test]
    fn test_call_depth_limit() {
        let mut bytecode = program(vec![
            Instruction::with_arg(
                Opcode::Call,
                Operand::Call {
                    name: "f".into(),
                    argc: 0,
                },
            ),
            Instruction::new(Opcode::Halt),
        ]);
        bytecode.add_function("f", 0, vec![]);
        let mut vm = Vm::new(bytecode).with_config(VmConfig { max_call_depth: 8 });
        let state = vm.run();
        assert_eq!(state.status, Status::Error);
        assert_eq!(state.error.as_ref().unwrap().kind, "resource_exhausted");
        assert_eq!(state.frames.len(), 9);
    }

    #[test]
    fn test_invalid_regex_flag() {
        let state = execute(
            &program(vec![Instruction::with_arg(
                Opcode::LoadRegex,
                Operand::Regex {
                    pattern: "a".into(),
                    flags: "x".into(),
                },
            )]),
            None,
        );
        assert_eq!(state.error.unwrap().kind, "invalid_regex");
    }

    #[test]
    fn test_profiler_counts_instructions() {
        let mut vm = Vm::new(program(vec![push(1.0), Instruction::new(Opcode::Pop)]));
        vm.enable_profiling();
        vm.run();
        let profiler = vm.profiler().unwrap();
        assert_eq!(profiler.total_instructions(), 2);
        assert_eq!(profiler.max_stack_depth(), 1);
    }
}
