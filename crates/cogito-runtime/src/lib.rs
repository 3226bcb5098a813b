//! Cogito Runtime - compiler and suspendable VM
//!
//! This library provides:
//! - Lexical analysis and parsing of a small JavaScript subset
//! - Compilation to linear stack bytecode
//! - A stack VM that suspends at `CC(prompt)` and resumes from a
//!   serializable snapshot

/// Cogito runtime version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Public API modules
pub mod ast;
pub mod bytecode;
pub mod compiler;
pub mod diagnostic;
pub mod fs;
pub mod heap;
pub mod json;
pub mod lexer;
pub mod parser;
pub mod runtime;
pub mod span;
pub mod token;
pub mod value;
pub mod vm;

// Re-export commonly used types
pub use ast::{Program, VersionedProgram};
pub use bytecode::{disassemble, Bytecode, Instruction, Opcode, Operand};
pub use compiler::{CompileOptions, CompileReport, Compiled, Compiler};
pub use diagnostic::{sort_diagnostics, Diagnostic, DiagnosticLevel};
pub use fs::{FileSystem, SandboxedFs};
pub use heap::{Heap, HeapEntry, Properties};
pub use lexer::Lexer;
pub use parser::{parse_source, Parser};
pub use runtime::{Cogito, Execution, RuntimeResult};
pub use span::Span;
pub use token::{Token, TokenKind};
pub use value::{Fault, RuntimeError, Value};
pub use vm::{execute, ExecutionState, Snapshot, Status, Vm, VmConfig, VmError};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smoke() {
        assert_eq!(VERSION, "0.1.0");
    }
}
