//! AST to bytecode compiler
//!
//! Compiles the AST directly to linear stack bytecode.
//! - Expressions leave exactly one value on the stack
//! - Statements leave the stack as they found it
//! - Variables are resolved by name at runtime (flat per-function scope)
//! - Forward jumps are emitted with placeholders and patched once the target
//!   is known; a final check rejects any jump left unpatched

mod expr;
mod stmt;

use crate::ast::*;
use crate::bytecode::{validator, Bytecode, Instruction, Opcode, Operand};
use crate::diagnostic::{codes, sort_diagnostics, Diagnostic};
use crate::span::Span;
use cogito_config::project::DEFAULT_ENTRY;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Kind of loop a context belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum LoopKind {
    /// `while`, `do-while`, C-style `for`
    Counted,
    /// `for-of`, `for-in`; an iterator slot is open while the body runs
    Iterator,
}

/// Loop context for break/continue
#[derive(Debug, Clone)]
pub(super) struct LoopContext {
    pub(super) kind: LoopKind,
    /// Address the loop jumps back to; `continue` lands here unless the
    /// loop names another target when it finishes
    pub(super) start_address: usize,
    pub(super) break_sites: Vec<usize>,
    pub(super) continue_sites: Vec<usize>,
}

impl LoopContext {
    fn new(kind: LoopKind, start_address: usize) -> Self {
        Self {
            kind,
            start_address,
            break_sites: Vec::new(),
            continue_sites: Vec::new(),
        }
    }
}

/// Compiler options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    /// Function invoked automatically when top-level code never calls it
    pub entry: String,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            entry: DEFAULT_ENTRY.to_string(),
        }
    }
}

/// Successful compilation
#[derive(Debug, Clone, PartialEq)]
pub struct Compiled {
    pub bytecode: Bytecode,
    pub warnings: Vec<Diagnostic>,
}

/// Outcome of a compilation, as reported to hosts
///
/// `bytecode` is empty whenever `success` is false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompileReport {
    pub success: bool,
    pub bytecode: Bytecode,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
}

impl CompileReport {
    /// Report for diagnostics produced before compilation (e.g. syntax errors)
    pub fn failed(errors: Vec<Diagnostic>, warnings: Vec<Diagnostic>) -> Self {
        Self {
            success: false,
            bytecode: Bytecode::new(),
            errors,
            warnings,
        }
    }

    pub fn into_result(self) -> Result<Compiled, Vec<Diagnostic>> {
        if self.success {
            Ok(Compiled {
                bytecode: self.bytecode,
                warnings: self.warnings,
            })
        } else {
            Err(self.errors)
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Compiler state
pub struct Compiler {
    /// Output bytecode
    pub(super) bytecode: Bytecode,
    /// Loop context stack (for break/continue)
    pub(super) loops: Vec<LoopContext>,
    /// Declared function names
    pub(super) functions: HashSet<String>,
    pub(super) errors: Vec<Diagnostic>,
    pub(super) warnings: Vec<Diagnostic>,
    options: CompileOptions,
}

impl Compiler {
    /// Create a new compiler
    pub fn new() -> Self {
        Self::with_options(CompileOptions::default())
    }

    pub fn with_options(options: CompileOptions) -> Self {
        Self {
            bytecode: Bytecode::new(),
            loops: Vec::new(),
            functions: HashSet::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            options,
        }
    }

    /// Compile an AST to bytecode
    pub fn compile(&mut self, program: &Program) -> Result<Compiled, Vec<Diagnostic>> {
        self.report(program).into_result()
    }

    /// Compile an AST, collecting every error and warning
    pub fn report(&mut self, program: &Program) -> CompileReport {
        for stmt in &program.body {
            self.compile_stmt(stmt);
        }

        let entry = self.options.entry.clone();
        if self.functions.contains(&entry) && !program.body.iter().any(|s| stmt_calls(s, &entry)) {
            self.emit(
                Instruction::with_arg(
                    Opcode::Call,
                    Operand::Call {
                        name: entry,
                        argc: 0,
                    },
                ),
                Span::dummy(),
            );
            self.emit_op(Opcode::Pop, Span::dummy());
        }

        self.emit_op(Opcode::Halt, Span::dummy());

        if let Err(problems) = validator::check_jumps(&self.bytecode) {
            for problem in problems {
                self.error(
                    codes::INTERNAL,
                    format!("internal compiler error: {}", problem),
                    Span::dummy(),
                );
            }
        }

        let bytecode = std::mem::take(&mut self.bytecode);
        let mut errors = std::mem::take(&mut self.errors);
        let mut warnings = std::mem::take(&mut self.warnings);
        sort_diagnostics(&mut errors);
        sort_diagnostics(&mut warnings);
        self.loops.clear();
        self.functions.clear();

        if errors.is_empty() {
            CompileReport {
                success: true,
                bytecode,
                errors,
                warnings,
            }
        } else {
            CompileReport::failed(errors, warnings)
        }
    }

    // ===== Emission helpers =====

    pub(super) fn emit(&mut self, instruction: Instruction, span: Span) -> usize {
        self.bytecode.emit(instruction, span)
    }

    pub(super) fn emit_op(&mut self, op: Opcode, span: Span) -> usize {
        self.bytecode.emit(Instruction::new(op), span)
    }

    pub(super) fn emit_jump(&mut self, op: Opcode, span: Span) -> usize {
        self.bytecode.emit_jump(op, span)
    }

    /// Jump to an already known address
    pub(super) fn emit_jump_to(&mut self, op: Opcode, target: usize, span: Span) -> usize {
        self.emit(Instruction::with_int(op, target as i64), span)
    }

    /// Patch the jump at `site` to the next instruction address
    pub(super) fn patch_here(&mut self, site: usize) {
        let target = self.bytecode.current_offset();
        self.bytecode.patch_jump(site, target);
    }

    pub(super) fn error(&mut self, code: &str, message: impl Into<String>, span: Span) {
        self.errors.push(Diagnostic::error_with_code(code, message, span));
    }

    pub(super) fn warning(&mut self, code: &str, message: impl Into<String>, span: Span) {
        self.warnings.push(Diagnostic::warning_with_code(code, message, span));
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

/// Compile with default options
pub fn compile(program: &Program) -> Result<Compiled, Vec<Diagnostic>> {
    Compiler::new().compile(program)
}

// ============================================================================
// Entry call detection (top-level code only, function bodies excluded)
// ============================================================================

fn stmt_calls(stmt: &Stmt, name: &str) -> bool {
    match stmt {
        Stmt::VarDecl(decl) => decl
            .declarations
            .iter()
            .filter_map(|d| d.init.as_ref())
            .any(|e| expr_calls(e, name)),
        Stmt::FunctionDecl(_) | Stmt::Break(_) | Stmt::Continue(_) => false,
        Stmt::Empty(_) | Stmt::Unsupported(_) => false,
        Stmt::Expr(s) => expr_calls(&s.expr, name),
        Stmt::Block(b) => b.body.iter().any(|s| stmt_calls(s, name)),
        Stmt::If(s) => {
            expr_calls(&s.test, name)
                || stmt_calls(&s.consequent, name)
                || s.alternate.as_deref().is_some_and(|a| stmt_calls(a, name))
        }
        Stmt::While(s) => expr_calls(&s.test, name) || stmt_calls(&s.body, name),
        Stmt::DoWhile(s) => stmt_calls(&s.body, name) || expr_calls(&s.test, name),
        Stmt::For(s) => {
            s.init.as_deref().is_some_and(|i| stmt_calls(i, name))
                || s.test.as_ref().is_some_and(|t| expr_calls(t, name))
                || s.update.as_ref().is_some_and(|u| expr_calls(u, name))
                || stmt_calls(&s.body, name)
        }
        Stmt::ForOf(s) | Stmt::ForIn(s) => expr_calls(&s.iterable, name) || stmt_calls(&s.body, name),
        Stmt::Return(s) => s.argument.as_ref().is_some_and(|a| expr_calls(a, name)),
    }
}

fn expr_calls(expr: &Expr, name: &str) -> bool {
    match expr {
        Expr::Call(call) => {
            call.callee.as_identifier() == Some(name)
                || expr_calls(&call.callee, name)
                || call.arguments.iter().any(|a| expr_calls(a, name))
        }
        Expr::Literal(_) | Expr::Identifier(_) | Expr::Regex(_) | Expr::Unsupported(_) => false,
        Expr::Template(t) => t.expressions.iter().any(|e| expr_calls(e, name)),
        Expr::Array(a) => a.elements.iter().any(|e| expr_calls(e, name)),
        Expr::Object(o) => o.properties.iter().any(|p| expr_calls(&p.value, name)),
        Expr::Unary(u) => expr_calls(&u.argument, name),
        Expr::Update(u) => expr_calls(&u.argument, name),
        Expr::Binary(b) => expr_calls(&b.left, name) || expr_calls(&b.right, name),
        Expr::Logical(l) => expr_calls(&l.left, name) || expr_calls(&l.right, name),
        Expr::Conditional(c) => {
            expr_calls(&c.test, name) || expr_calls(&c.consequent, name) || expr_calls(&c.alternate, name)
        }
        Expr::Assign(a) => expr_calls(&a.target, name) || expr_calls(&a.value, name),
        Expr::Member(m) => expr_calls(&m.object, name),
        Expr::Index(i) => expr_calls(&i.object, name) || expr_calls(&i.index, name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::disassemble;
    use crate::parser::parse_source;
    use pretty_assertions::assert_eq;

    fn compile_source(source: &str) -> Compiled {
        let (program, diagnostics) = parse_source(source);
        assert!(diagnostics.is_empty(), "Parser errors: {:?}", diagnostics);
        compile(&program).expect("Compilation failed")
    }

    fn compile_errors(source: &str) -> Vec<Diagnostic> {
        let (program, diagnostics) = parse_source(source);
        assert!(diagnostics.is_empty(), "Parser errors: {:?}", diagnostics);
        compile(&program).expect_err("expected compile errors")
    }

    fn ops(bytecode: &Bytecode) -> Vec<Opcode> {
        bytecode.instructions.iter().map(|i| i.op).collect()
    }

    #[test]
    fn test_empty_program_is_just_halt() {
        let compiled = compile(&Program::default()).unwrap();
        assert_eq!(ops(&compiled.bytecode), vec![Opcode::Halt]);
    }

    #[test]
    fn test_expression_statement_pops() {
        let compiled = compile_source("1 + 2;");
        assert_eq!(
            ops(&compiled.bytecode),
            vec![Opcode::Push, Opcode::Push, Opcode::Add, Opcode::Pop, Opcode::Halt]
        );
    }

    #[test]
    fn test_while_loop_disassembly() {
        let compiled = compile_source("let i = 0; while (i < 2) { i++; }");
        insta::assert_snapshot!(disassemble(&compiled.bytecode), @r###"
        === Instructions ===
        0000  PUSH 0
        0001  DEFINE "i"
        0002  LOAD "i"
        0003  PUSH 2
        0004  LT
        0005  JUMP_IF_FALSE 14
        0006  LOAD "i"
        0007  TO_NUMBER
        0008  PUSH 1
        0009  ADD
        0010  DUP
        0011  STORE "i"
        0012  POP
        0013  JUMP 2
        0014  HALT
        "###);
    }

    #[test]
    fn test_no_placeholders_survive() {
        let compiled = compile_source(
            "for (let i = 0; i < 3; i++) { if (i == 1) continue; if (i == 2) break; }
             for (const x of [1, 2]) { if (x) break; else continue; }
             for (const k in {a: 1}) { break; }
             do { break; } while (true);",
        );
        for instruction in &compiled.bytecode.instructions {
            if instruction.op.is_jump() {
                assert_ne!(instruction.arg, Some(Operand::Int(-1)), "{:?}", instruction);
            }
        }
    }

    #[test]
    fn test_break_outside_loop() {
        let errors = compile_errors("break;");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, codes::BREAK_OUTSIDE_LOOP);
        assert_eq!(errors[0].message, "'break' not in loop");
    }

    #[test]
    fn test_continue_outside_loop_inside_function() {
        let errors = compile_errors("while (true) { function f() { continue; } }");
        assert_eq!(errors[0].code, codes::CONTINUE_OUTSIDE_LOOP);
        assert_eq!(errors[0].message, "'continue' not in loop");
    }

    #[test]
    fn test_errors_are_all_collected() {
        let errors = compile_errors("break;\ncontinue;\nx.frobnicate();");
        let codes_found: Vec<_> = errors.iter().map(|e| e.code.as_str()).collect();
        assert_eq!(
            codes_found,
            vec![codes::BREAK_OUTSIDE_LOOP, codes::CONTINUE_OUTSIDE_LOOP, codes::UNKNOWN_METHOD]
        );
        assert_eq!(errors[2].line, 3);
    }

    #[test]
    fn test_entry_function_called_implicitly() {
        let compiled = compile_source("function main() { print(1); }");
        let len = compiled.bytecode.instructions.len();
        assert_eq!(
            compiled.bytecode.instructions[len - 3].arg,
            Some(Operand::Call {
                name: "main".into(),
                argc: 0
            })
        );
        assert_eq!(compiled.bytecode.function("main").map(|f| f.address), Some(1));
    }

    #[test]
    fn test_entry_function_not_called_twice() {
        let compiled = compile_source("function main() { return 1; }\nmain();");
        let calls = compiled
            .bytecode
            .instructions
            .iter()
            .filter(|i| i.op == Opcode::Call)
            .count();
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_custom_entry_option() {
        let (program, _) = parse_source("function start() {}\nfunction main() {}");
        let compiled = Compiler::with_options(CompileOptions {
            entry: "start".into(),
        })
        .compile(&program)
        .unwrap();
        let called: Vec<_> = compiled
            .bytecode
            .instructions
            .iter()
            .filter_map(|i| match &i.arg {
                Some(Operand::Call { name, .. }) => Some(name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(called, vec!["start"]);
    }

    #[test]
    fn test_extra_declarators_warn() {
        let compiled = compile_source("let a = 1, b = 2;");
        assert_eq!(compiled.warnings.len(), 1);
        assert_eq!(compiled.warnings[0].code, codes::EXTRA_DECLARATORS);
        let defines = compiled
            .bytecode
            .instructions
            .iter()
            .filter(|i| i.op == Opcode::Define)
            .count();
        assert_eq!(defines, 1);
    }

    #[test]
    fn test_duplicate_function() {
        let errors = compile_errors("function f() {}\nfunction f() {}");
        assert_eq!(errors[0].code, codes::DUPLICATE_FUNCTION);
    }

    #[test]
    fn test_report_on_failure_has_empty_bytecode() {
        let (program, _) = parse_source("let a = 1, b; break;");
        let report = Compiler::new().report(&program);
        assert!(!report.success);
        assert!(report.bytecode.instructions.is_empty());
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn test_unsupported_syntax() {
        let errors = compile_errors("const f = (x) => x;");
        assert_eq!(errors[0].code, codes::UNSUPPORTED_SYNTAX);
    }

    #[test]
    fn test_member_access_compiles_property_get() {
        let compiled = compile_source("o.name;");
        assert_eq!(
            compiled.bytecode.instructions[1],
            Instruction::with_arg(Opcode::PropertyGet, "name")
        );
    }
}
