//! Statement compilation

use super::{Compiler, LoopContext, LoopKind};
use crate::ast::*;
use crate::bytecode::{Instruction, Opcode};
use crate::diagnostic::codes;
use crate::span::Span;

impl Compiler {
    /// Compile a statement
    pub(super) fn compile_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::VarDecl(decl) => self.compile_var_decl(decl),
            Stmt::FunctionDecl(func) => self.compile_function(func),
            Stmt::Expr(expr_stmt) => {
                self.compile_effect(&expr_stmt.expr);
            }
            Stmt::Block(block) => self.compile_block(&block.body),
            Stmt::If(if_stmt) => self.compile_if(if_stmt),
            Stmt::While(while_stmt) => self.compile_while(while_stmt),
            Stmt::DoWhile(do_while) => self.compile_do_while(do_while),
            Stmt::For(for_stmt) => self.compile_for(for_stmt),
            Stmt::ForOf(each) => self.compile_for_each(each, Opcode::IterStart, Opcode::IterNext),
            Stmt::ForIn(each) => {
                self.compile_for_each(each, Opcode::ObjectIterStart, Opcode::ObjectIterNext)
            }
            Stmt::Break(jump) => self.compile_break(jump.span),
            Stmt::Continue(jump) => self.compile_continue(jump.span),
            Stmt::Return(ret) => self.compile_return(ret),
            Stmt::Empty(_) => {}
            Stmt::Unsupported(node) => self.error(
                codes::UNSUPPORTED_SYNTAX,
                format!("unsupported syntax: {}", node.kind),
                node.span,
            ),
        }
    }

    pub(super) fn compile_block(&mut self, body: &[Stmt]) {
        for stmt in body {
            self.compile_stmt(stmt);
        }
    }

    /// Evaluate an expression for its side effects only
    fn compile_effect(&mut self, expr: &Expr) {
        let span = expr.span();
        match expr {
            // The old value is never observed, so postfix compiles as prefix
            Expr::Update(update) if !update.prefix => self.compile_update(update, true),
            _ => self.compile_expr(expr),
        }
        self.emit_op(Opcode::Pop, span);
    }

    fn compile_var_decl(&mut self, decl: &VarDecl) {
        let Some((first, rest)) = decl.declarations.split_first() else {
            return;
        };

        match &first.init {
            Some(init) => self.compile_expr(init),
            None => {
                self.emit_op(Opcode::PushUndefined, first.span);
            }
        }
        self.emit(
            Instruction::with_arg(Opcode::Define, first.name.as_str()),
            first.span,
        );

        if !rest.is_empty() {
            let ignored: Vec<_> = rest.iter().map(|d| format!("'{}'", d.name)).collect();
            self.warning(
                codes::EXTRA_DECLARATORS,
                format!(
                    "only the first declarator of a '{}' declaration is compiled; {} ignored",
                    decl.kind.as_str(),
                    ignored.join(", ")
                ),
                rest[0].span,
            );
        }
    }

    /// Emit the body inline behind a jump and record it in the function table
    fn compile_function(&mut self, func: &FunctionDecl) {
        if !self.functions.insert(func.name.clone()) {
            self.error(
                codes::DUPLICATE_FUNCTION,
                format!("function '{}' is already declared", func.name),
                func.span,
            );
            return;
        }

        let skip = self.emit_jump(Opcode::Jump, func.span);
        let address = self.bytecode.current_offset();
        self.bytecode
            .add_function(func.name.clone(), address, func.params.clone());

        // Loops outside the function are not break/continue targets inside it
        let outer_loops = std::mem::take(&mut self.loops);
        self.compile_block(&func.body);
        self.emit_op(Opcode::PushUndefined, func.span);
        self.emit_op(Opcode::Return, func.span);
        self.loops = outer_loops;

        self.patch_here(skip);
    }

    fn compile_if(&mut self, if_stmt: &IfStmt) {
        self.compile_expr(&if_stmt.test);
        let else_jump = self.emit_jump(Opcode::JumpIfFalse, if_stmt.span);

        self.compile_stmt(&if_stmt.consequent);

        match &if_stmt.alternate {
            Some(alternate) => {
                let end_jump = self.emit_jump(Opcode::Jump, if_stmt.span);
                self.patch_here(else_jump);
                self.compile_stmt(alternate);
                self.patch_here(end_jump);
            }
            None => self.patch_here(else_jump),
        }
    }

    fn compile_while(&mut self, while_stmt: &WhileStmt) {
        let start = self.bytecode.current_offset();
        self.compile_expr(&while_stmt.test);
        let exit_jump = self.emit_jump(Opcode::JumpIfFalse, while_stmt.span);

        self.loops.push(LoopContext::new(LoopKind::Counted, start));
        self.compile_stmt(&while_stmt.body);
        self.emit_jump_to(Opcode::Jump, start, while_stmt.span);

        self.patch_here(exit_jump);
        self.finish_loop(None);
    }

    fn compile_do_while(&mut self, do_while: &DoWhileStmt) {
        let start = self.bytecode.current_offset();
        self.loops.push(LoopContext::new(LoopKind::Counted, start));
        self.compile_stmt(&do_while.body);

        let condition = self.bytecode.current_offset();
        self.compile_expr(&do_while.test);
        self.emit_jump_to(Opcode::JumpIfTrue, start, do_while.span);

        self.finish_loop(Some(condition));
    }

    fn compile_for(&mut self, for_stmt: &ForStmt) {
        if let Some(init) = &for_stmt.init {
            self.compile_stmt(init);
        }

        let start = self.bytecode.current_offset();
        let exit_jump = for_stmt.test.as_ref().map(|test| {
            self.compile_expr(test);
            self.emit_jump(Opcode::JumpIfFalse, for_stmt.span)
        });

        self.loops.push(LoopContext::new(LoopKind::Counted, start));
        self.compile_stmt(&for_stmt.body);

        // continue lands on the update so the increment is never skipped
        let update = self.bytecode.current_offset();
        if let Some(expr) = &for_stmt.update {
            self.compile_effect(expr);
        }
        self.emit_jump_to(Opcode::Jump, start, for_stmt.span);

        if let Some(site) = exit_jump {
            self.patch_here(site);
        }
        self.finish_loop(Some(update));
    }

    /// `for-of` / `for-in`: start the iterator, then pull values until exhausted
    fn compile_for_each(&mut self, each: &ForEachStmt, start_op: Opcode, next_op: Opcode) {
        self.compile_expr(&each.iterable);
        self.emit_op(start_op, each.span);

        let start = self.bytecode.current_offset();
        let exit_jump = self.emit_jump(next_op, each.span);
        let bind = if each.kind.is_some() {
            Opcode::Define
        } else {
            Opcode::Store
        };
        self.emit(Instruction::with_arg(bind, each.binding.as_str()), each.span);

        self.loops.push(LoopContext::new(LoopKind::Iterator, start));
        self.compile_stmt(&each.body);
        self.emit_jump_to(Opcode::Jump, start, each.span);

        // Natural exit closes the iterator; breaks already closed it
        self.patch_here(exit_jump);
        self.emit_op(Opcode::IterEnd, each.span);
        self.finish_loop(None);
    }

    /// Pop the innermost loop, patching its breaks here and its continues to
    /// `continue_target` (the loop start when `None`)
    fn finish_loop(&mut self, continue_target: Option<usize>) {
        let Some(context) = self.loops.pop() else {
            return;
        };
        let continue_target = continue_target.unwrap_or(context.start_address);
        let exit = self.bytecode.current_offset();
        for site in context.break_sites {
            self.bytecode.patch_jump(site, exit);
        }
        for site in context.continue_sites {
            self.bytecode.patch_jump(site, continue_target);
        }
    }

    fn compile_break(&mut self, span: Span) {
        let Some(kind) = self.loops.last().map(|l| l.kind) else {
            self.error(codes::BREAK_OUTSIDE_LOOP, "'break' not in loop", span);
            return;
        };
        if kind == LoopKind::Iterator {
            self.emit_op(Opcode::IterEnd, span);
        }
        let site = self.emit_jump(Opcode::Break, span);
        if let Some(context) = self.loops.last_mut() {
            context.break_sites.push(site);
        }
    }

    fn compile_continue(&mut self, span: Span) {
        if self.loops.is_empty() {
            self.error(codes::CONTINUE_OUTSIDE_LOOP, "'continue' not in loop", span);
            return;
        }
        let site = self.emit_jump(Opcode::Continue, span);
        if let Some(context) = self.loops.last_mut() {
            context.continue_sites.push(site);
        }
    }

    fn compile_return(&mut self, ret: &ReturnStmt) {
        match &ret.argument {
            Some(argument) => self.compile_expr(argument),
            None => {
                self.emit_op(Opcode::PushNull, ret.span);
            }
        }
        self.emit_op(Opcode::Return, ret.span);
    }
}

#[cfg(test)]
mod tests {
    use super::super::compile;
    use crate::bytecode::{Opcode, Operand};
    use crate::parser::parse_source;

    fn instructions(source: &str) -> Vec<(Opcode, Option<Operand>)> {
        let (program, diagnostics) = parse_source(source);
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
        compile(&program)
            .unwrap()
            .bytecode
            .instructions
            .into_iter()
            .map(|i| (i.op, i.arg))
            .collect()
    }

    #[test]
    fn test_for_continue_targets_update() {
        let code = instructions("for (let i = 0; i < 4; i++) { if (i === 1) continue; print(i); }");
        let continue_target = code
            .iter()
            .find(|(op, _)| *op == Opcode::Continue)
            .and_then(|(_, arg)| arg.as_ref().and_then(Operand::as_address))
            .unwrap();
        // The update clause starts with LOAD "i"; TO_NUMBER
        assert_eq!(code[continue_target].0, Opcode::Load);
        assert_eq!(code[continue_target + 1].0, Opcode::ToNumber);
    }

    #[test]
    fn test_while_continue_targets_loop_start() {
        let code = instructions("let i = 0; while (i < 3) { i++; continue; }");
        let target = code
            .iter()
            .find(|(op, _)| *op == Opcode::Continue)
            .and_then(|(_, arg)| arg.as_ref().and_then(Operand::as_address))
            .unwrap();
        // PUSH 0; DEFINE "i"; then the condition
        assert_eq!(target, 2);
        assert_eq!(code[target], (Opcode::Load, Some(Operand::Str("i".into()))));
    }

    #[test]
    fn test_break_in_for_of_closes_iterator() {
        let code = instructions("for (const x of [1]) { break; }");
        let break_at = code.iter().position(|(op, _)| *op == Opcode::Break).unwrap();
        assert_eq!(code[break_at - 1].0, Opcode::IterEnd);

        // Break jumps past the loop's own ITER_END
        let target = code[break_at].1.as_ref().and_then(Operand::as_address).unwrap();
        assert_eq!(code[target - 1].0, Opcode::IterEnd);
        assert_eq!(code[target].0, Opcode::Halt);
    }

    #[test]
    fn test_every_iterator_break_closes_its_iterator() {
        let code = instructions(
            "for (const x of [1, 2]) {
                 if (x == 1) break;
                 for (const k in {a: 1}) { if (k == 'a') break; break; }
                 if (x == 2) break;
             }",
        );
        let breaks: Vec<_> = code
            .iter()
            .enumerate()
            .filter(|(_, (op, _))| *op == Opcode::Break)
            .map(|(at, _)| at)
            .collect();
        assert_eq!(breaks.len(), 4);
        for at in breaks {
            assert_eq!(code[at - 1].0, Opcode::IterEnd, "BREAK at {} leaves its iterator open", at);
        }
    }

    #[test]
    fn test_counted_break_inside_iterator_loop_keeps_iterator() {
        let code = instructions("for (const x of [1]) { while (true) { break; } }");
        let at = code.iter().position(|(op, _)| *op == Opcode::Break).unwrap();
        assert_ne!(code[at - 1].0, Opcode::IterEnd);
    }

    #[test]
    fn test_iterator_exit_lands_on_iter_end() {
        let code = instructions("for (const k in {a: 1}) {}");
        let (_, arg) = code
            .iter()
            .find(|(op, _)| *op == Opcode::ObjectIterNext)
            .unwrap();
        let exit = arg.as_ref().and_then(Operand::as_address).unwrap();
        assert_eq!(code[exit].0, Opcode::IterEnd);
    }

    #[test]
    fn test_bare_return_pushes_null_and_fallthrough_pushes_undefined() {
        let code = instructions("function f() { return; }");
        let ops: Vec<_> = code.iter().map(|(op, _)| *op).collect();
        assert_eq!(
            ops,
            vec![
                Opcode::Jump,
                Opcode::PushNull,
                Opcode::Return,
                Opcode::PushUndefined,
                Opcode::Return,
                Opcode::Halt
            ]
        );
    }

    #[test]
    fn test_do_while_continue_targets_condition() {
        let code = instructions("let i = 0; do { i++; continue; } while (i < 3);");
        let target = code
            .iter()
            .find(|(op, _)| *op == Opcode::Continue)
            .and_then(|(_, arg)| arg.as_ref().and_then(Operand::as_address))
            .unwrap();
        assert_eq!(code[target].1, Some(Operand::Str("i".into())));
        assert_eq!(code[target + 2].0, Opcode::Lt);
    }
}
