//! Shared helpers for integration tests

#![allow(dead_code)]

use cogito_runtime::{Bytecode, Cogito, ExecutionState, Status, Value};

pub use pretty_assertions::{assert_eq, assert_ne};

/// Compile `source`, panicking with the diagnostics on failure
pub fn compile(source: &str) -> Bytecode {
    match Cogito::new().compile(source) {
        Ok(bytecode) => bytecode,
        Err(errors) => panic!("compile errors for {:?}: {:#?}", source, errors),
    }
}

/// Run `source` until it stops
pub fn run(source: &str) -> ExecutionState {
    let mut execution = Cogito::new()
        .start(source)
        .unwrap_or_else(|errors| panic!("compile errors: {:#?}", errors));
    execution.run().clone()
}

/// Printed lines of a program expected to complete
pub fn output_of(source: &str) -> Vec<String> {
    let state = run(source);
    assert_eq!(
        state.status,
        Status::Completed,
        "program did not complete: {:?}",
        state.error
    );
    state.output
}

/// Run `source`, answering each CC with the next reply
pub fn run_with_replies(source: &str, replies: &[Value]) -> ExecutionState {
    let mut execution = Cogito::new()
        .start(source)
        .unwrap_or_else(|errors| panic!("compile errors: {:#?}", errors));
    execution.run();
    for reply in replies {
        assert_eq!(execution.status(), Status::WaitingCc, "no CC left to answer");
        execution
            .resume(reply.clone())
            .unwrap_or_else(|e| panic!("resume failed: {}", e));
    }
    execution.state().clone()
}

/// Kind of the runtime error a program fails with
pub fn error_kind(state: &ExecutionState) -> Option<&str> {
    state.error.as_ref().map(|e| e.kind.as_str())
}
