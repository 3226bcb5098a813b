//! Cogito runtime API for embedding
//!
//! Ties the front-end, compiler and VM together behind one handle. Hosts
//! compile a script, run it until it completes or suspends at `CC(prompt)`,
//! persist the snapshot if they need to, and resume with the reply.

use crate::ast::{Program, VersionedProgram};
use crate::bytecode::Bytecode;
use crate::compiler::{CompileOptions, CompileReport, Compiler};
use crate::diagnostic::{codes, sort_diagnostics, Diagnostic};
use crate::fs::{FileSystem, SandboxedFs};
use crate::parser::parse_source;
use crate::span::Span;
use crate::value::Value;
use crate::vm::{ExecutionState, Snapshot, Status, Vm, VmConfig, VmError};
use cogito_config::loader::Config;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Result type for compilation through the runtime
pub type RuntimeResult<T> = Result<T, Vec<Diagnostic>>;

/// Cogito runtime instance
///
/// # Examples
///
/// ```
/// use cogito_runtime::{Cogito, Status, Value};
///
/// let runtime = Cogito::new();
/// let mut execution = runtime.start("let name = CC('name?'); print('hi ' + name);").unwrap();
/// assert_eq!(execution.run().status, Status::WaitingCc);
///
/// let state = execution.resume(Value::string("Ada")).unwrap();
/// assert_eq!(state.status, Status::Completed);
/// assert_eq!(state.output, vec!["hi Ada".to_string()]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Cogito {
    options: CompileOptions,
    vm_config: VmConfig,
    /// Backing store for the filesystem built-ins; disabled when `None`
    fs: Option<Arc<dyn FileSystem>>,
}

impl Cogito {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a runtime from loaded configuration
    ///
    /// Relative sandbox roots resolve against the project root, or `base`
    /// outside a project.
    pub fn from_config(config: &Config, base: &Path) -> Self {
        let runtime = Self::new()
            .with_entry(config.entry())
            .with_config(VmConfig {
                max_call_depth: config.max_call_depth(),
            });
        if config.fs_enabled() {
            runtime.with_fs_root(config.fs_root(base))
        } else {
            runtime
        }
    }

    pub fn with_config(mut self, config: VmConfig) -> Self {
        self.vm_config = config;
        self
    }

    pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.options.entry = entry.into();
        self
    }

    /// Enable the filesystem built-ins, confined to `root`
    pub fn with_fs_root(self, root: impl Into<PathBuf>) -> Self {
        self.with_file_system(SandboxedFs::new(root))
    }

    /// Enable the filesystem built-ins over `fs`
    pub fn with_file_system(mut self, fs: impl FileSystem + 'static) -> Self {
        self.fs = Some(Arc::new(fs));
        self
    }

    /// Disable the filesystem built-ins
    pub fn without_file_system(mut self) -> Self {
        self.fs = None;
        self
    }

    pub fn vm_config(&self) -> &VmConfig {
        &self.vm_config
    }

    pub fn entry(&self) -> &str {
        &self.options.entry
    }

    /// Parse and compile `source`, collecting every diagnostic
    pub fn compile_source(&self, source: &str) -> CompileReport {
        let (program, diagnostics) = parse_source(source);
        let (errors, warnings): (Vec<_>, Vec<_>) =
            diagnostics.into_iter().partition(Diagnostic::is_error);
        if !errors.is_empty() {
            return CompileReport::failed(errors, warnings);
        }

        let mut report = self.compile_program(&program);
        if !warnings.is_empty() {
            let mut all = warnings;
            all.append(&mut report.warnings);
            sort_diagnostics(&mut all);
            report.warnings = all;
        }
        report
    }

    /// Compile an AST produced by any front-end
    pub fn compile_program(&self, program: &Program) -> CompileReport {
        Compiler::with_options(self.options.clone()).report(program)
    }

    /// Compile a JSON AST (see [`VersionedProgram`])
    pub fn compile_ast_json(&self, json: &str) -> CompileReport {
        match VersionedProgram::from_json(json) {
            Ok(versioned) => self.compile_program(&versioned.program),
            Err(e) => {
                let span = Span::new(0, 0, e.line(), e.column());
                let error = Diagnostic::error_with_code(
                    codes::INVALID_JSON_AST,
                    format!("invalid JSON AST: {}", e),
                    span,
                );
                CompileReport::failed(vec![error], Vec::new())
            }
        }
    }

    /// Compile `source`, failing with its errors
    pub fn compile(&self, source: &str) -> RuntimeResult<Bytecode> {
        self.compile_source(source)
            .into_result()
            .map(|compiled| compiled.bytecode)
    }

    /// Compile `source` and prepare an execution at its first instruction
    pub fn start(&self, source: &str) -> RuntimeResult<Execution> {
        let bytecode = self.compile(source)?;
        Ok(self.load(bytecode))
    }

    /// Prepare an execution of already compiled bytecode
    pub fn load(&self, bytecode: impl Into<Arc<Bytecode>>) -> Execution {
        self.execution(Vm::new(bytecode))
    }

    /// Continue an execution from a snapshot of `bytecode`
    pub fn restore(
        &self,
        bytecode: impl Into<Arc<Bytecode>>,
        snapshot: Snapshot,
    ) -> Result<Execution, VmError> {
        Ok(self.execution(Vm::restore(bytecode, snapshot)?))
    }

    fn execution(&self, vm: Vm) -> Execution {
        let mut vm = vm.with_config(self.vm_config.clone());
        if let Some(fs) = &self.fs {
            vm = vm.with_file_system(Box::new(Arc::clone(fs)));
        }
        Execution { vm }
    }
}

/// A script execution owned by the host
pub struct Execution {
    vm: Vm,
}

impl Execution {
    /// Run until completion, a runtime error or the next `CC`
    pub fn run(&mut self) -> &ExecutionState {
        self.vm.run()
    }

    /// Answer the pending `CC` and run to the next stop
    pub fn resume(&mut self, reply: Value) -> Result<&ExecutionState, VmError> {
        self.vm.resume(reply)
    }

    /// Answer the pending `CC` with a JSON reply
    pub fn resume_json(&mut self, reply: &serde_json::Value) -> Result<&ExecutionState, VmError> {
        self.vm.resume_json(reply)
    }

    pub fn status(&self) -> Status {
        self.vm.status()
    }

    /// Prompt of the pending `CC`, if suspended
    pub fn pending_prompt(&self) -> Option<&str> {
        self.vm.state().pending_prompt.as_deref()
    }

    pub fn output(&self) -> &[String] {
        &self.vm.state().output
    }

    pub fn state(&self) -> &ExecutionState {
        self.vm.state()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.vm.snapshot()
    }

    pub fn bytecode(&self) -> &Bytecode {
        self.vm.program()
    }

    pub fn vm(&self) -> &Vm {
        &self.vm
    }

    pub fn vm_mut(&mut self) -> &mut Vm {
        &mut self.vm
    }

    pub fn into_vm(self) -> Vm {
        self.vm
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_errors_fail_the_report() {
        let report = Cogito::new().compile_source("let = ;");
        assert!(!report.success);
        assert!(report.bytecode.instructions.is_empty());
        assert!(report.errors.iter().all(|e| e.code.starts_with("CG1")));
    }

    #[test]
    fn test_json_ast_compiles_like_source() {
        let json = r#"{"body": [{"type": "Expr", "expr": {"type": "Call",
            "callee": {"type": "Identifier", "name": "print"},
            "arguments": [{"type": "Literal", "value": "hi"}]}}]}"#;
        let runtime = Cogito::new();
        let from_json = runtime.compile_ast_json(json);
        let from_source = runtime.compile_source("print('hi');");
        assert!(from_json.success);
        assert_eq!(
            from_json.bytecode.fingerprint(),
            from_source.bytecode.fingerprint()
        );
    }

    #[test]
    fn test_malformed_json_ast() {
        let report = Cogito::new().compile_ast_json("{\"body\": [{\"type\": \"Nope\"}]}");
        assert!(!report.success);
        assert_eq!(report.errors[0].code, codes::INVALID_JSON_AST);
    }

    #[test]
    fn test_compile_errors_fail_the_report() {
        let report = Cogito::new().compile_source("break;");
        assert!(!report.success);
        assert_eq!(report.errors[0].code, codes::BREAK_OUTSIDE_LOOP);
    }

    #[test]
    fn test_run_to_completion() {
        let mut execution = Cogito::new().start("print(1 + 2);").unwrap();
        let state = execution.run();
        assert_eq!(state.status, Status::Completed);
        assert_eq!(state.output, vec!["3".to_string()]);
    }

    #[test]
    fn test_entry_function_is_invoked() {
        let mut execution = Cogito::new()
            .with_entry("start")
            .start("function start() { print('started'); }")
            .unwrap();
        assert_eq!(execution.run().output, vec!["started".to_string()]);
    }

    #[test]
    fn test_suspend_snapshot_restore() {
        let runtime = Cogito::new();
        let mut execution = runtime.start("let x = CC('x?'); print(x * 2);").unwrap();
        execution.run();
        assert_eq!(execution.pending_prompt(), Some("x?"));

        let json = execution.snapshot().to_json().unwrap();
        let bytecode = execution.bytecode().clone();
        drop(execution);

        let snapshot = Snapshot::from_json(&json).unwrap();
        let mut restored = runtime.restore(bytecode, snapshot).unwrap();
        let state = restored.resume_json(&serde_json::json!(21)).unwrap();
        assert_eq!(state.status, Status::Completed);
        assert_eq!(state.output, vec!["42".to_string()]);
    }

    #[test]
    fn test_call_depth_from_vm_config() {
        let mut execution = Cogito::new()
            .with_config(VmConfig { max_call_depth: 4 })
            .start("function f() { return f(); } f();")
            .unwrap();
        let state = execution.run();
        assert_eq!(state.status, Status::Error);
        assert_eq!(
            state.error.as_ref().map(|e| e.kind.as_str()),
            Some("resource_exhausted")
        );
    }

    #[test]
    fn test_fs_disabled_by_default() {
        let mut execution = Cogito::new().start("print(readFile('a.txt'));").unwrap();
        assert_eq!(execution.run().output, vec!["null".to_string()]);
    }

    #[test]
    fn test_fs_sandbox() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "hello").unwrap();
        let mut execution = Cogito::new()
            .with_fs_root(dir.path())
            .start("print(readFile('a.txt'));")
            .unwrap();
        assert_eq!(execution.run().output, vec!["hello".to_string()]);
    }
}
