//! Expression compilation

use super::Compiler;
use crate::ast::*;
use crate::bytecode::{Instruction, Opcode, Operand};
use crate::diagnostic::codes;
use crate::span::Span;

/// Frame binding that holds the old value of a postfix element update;
/// not a valid identifier, so scripts cannot observe it
const UPDATE_SCRATCH: &str = "%update";

impl Compiler {
    /// Compile an expression, leaving its value on the stack
    pub(super) fn compile_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Literal(lit) => self.compile_literal(lit),
            Expr::Identifier(ident) => self.compile_identifier(ident),
            Expr::Template(template) => self.compile_template(template),
            Expr::Regex(regex) => {
                self.emit(
                    Instruction::with_arg(
                        Opcode::LoadRegex,
                        Operand::Regex {
                            pattern: regex.pattern.clone(),
                            flags: regex.flags.clone(),
                        },
                    ),
                    regex.span,
                );
            }
            Expr::Array(array) => {
                for element in &array.elements {
                    self.compile_expr(element);
                }
                self.emit(
                    Instruction::with_int(Opcode::ArrayNew, array.elements.len() as i64),
                    array.span,
                );
            }
            Expr::Object(object) => {
                self.emit_op(Opcode::ObjectCreate, object.span);
                for property in &object.properties {
                    self.emit_op(Opcode::Dup, object.span);
                    self.compile_expr(&property.value);
                    self.emit(
                        Instruction::with_arg(Opcode::PropertySet, property.key.as_str()),
                        property.value.span(),
                    );
                    self.emit_op(Opcode::Pop, object.span);
                }
            }
            Expr::Unary(unary) => {
                self.compile_expr(&unary.argument);
                let op = match unary.op {
                    UnaryOp::Negate => Opcode::Neg,
                    UnaryOp::Plus => Opcode::ToNumber,
                    UnaryOp::Not => Opcode::Not,
                    UnaryOp::Typeof => Opcode::Typeof,
                };
                self.emit_op(op, unary.span);
            }
            Expr::Update(update) => self.compile_update(update, false),
            Expr::Binary(binary) => {
                self.compile_expr(&binary.left);
                self.compile_expr(&binary.right);
                self.emit_op(binary_opcode(binary.op), binary.span);
            }
            Expr::Logical(logical) => self.compile_logical(logical),
            Expr::Conditional(cond) => {
                self.compile_expr(&cond.test);
                let else_jump = self.emit_jump(Opcode::JumpIfFalse, cond.span);
                self.compile_expr(&cond.consequent);
                let end_jump = self.emit_jump(Opcode::Jump, cond.span);
                self.patch_here(else_jump);
                self.compile_expr(&cond.alternate);
                self.patch_here(end_jump);
            }
            Expr::Assign(assign) => self.compile_assign(assign),
            Expr::Call(call) => self.compile_call(call),
            Expr::Member(member) => {
                self.compile_expr(&member.object);
                if member.property == "length" {
                    self.emit_op(Opcode::Length, member.span);
                } else {
                    self.emit(
                        Instruction::with_arg(Opcode::PropertyGet, member.property.as_str()),
                        member.span,
                    );
                }
            }
            Expr::Index(index) => {
                self.compile_expr(&index.object);
                self.compile_expr(&index.index);
                self.emit_op(Opcode::ArrayGet, index.span);
            }
            Expr::Unsupported(node) => {
                self.error(
                    codes::UNSUPPORTED_SYNTAX,
                    format!("unsupported syntax: {}", node.kind),
                    node.span,
                );
                // Keep the stack shape so compilation can continue
                self.emit_op(Opcode::PushUndefined, node.span);
            }
        }
    }

    fn compile_literal(&mut self, lit: &Literal) {
        match &lit.value {
            LiteralValue::Null => {
                self.emit_op(Opcode::PushNull, lit.span);
            }
            LiteralValue::Bool(b) => {
                self.emit(Instruction::with_arg(Opcode::Push, *b), lit.span);
            }
            LiteralValue::Number(n) => {
                self.emit(Instruction::with_arg(Opcode::Push, *n), lit.span);
            }
            LiteralValue::String(s) => {
                self.emit(Instruction::with_arg(Opcode::Push, s.as_str()), lit.span);
            }
        }
    }

    fn compile_identifier(&mut self, ident: &Identifier) {
        match ident.name.as_str() {
            "undefined" => {
                self.emit_op(Opcode::PushUndefined, ident.span);
            }
            "NaN" | "Infinity" => {
                self.emit(Instruction::with_arg(Opcode::Push, ident.name.as_str()), ident.span);
                self.emit_op(Opcode::ToNumber, ident.span);
            }
            name => {
                self.emit(Instruction::with_arg(Opcode::Load, name), ident.span);
            }
        }
    }

    /// `` `a${x}b` `` becomes `"a" + x + "b"`
    fn compile_template(&mut self, template: &TemplateLiteral) {
        let head = template.quasis.first().map(String::as_str).unwrap_or("");
        self.emit(Instruction::with_arg(Opcode::Push, head), template.span);
        for (i, expr) in template.expressions.iter().enumerate() {
            self.compile_expr(expr);
            self.emit_op(Opcode::Add, template.span);
            if let Some(quasi) = template.quasis.get(i + 1).filter(|q| !q.is_empty()) {
                self.emit(Instruction::with_arg(Opcode::Push, quasi.as_str()), template.span);
                self.emit_op(Opcode::Add, template.span);
            }
        }
    }

    /// Short-circuit operators keep the left value when it decides the result
    fn compile_logical(&mut self, logical: &LogicalExpr) {
        self.compile_expr(&logical.left);
        self.emit_op(Opcode::Dup, logical.span);
        let end_jump = match logical.op {
            LogicalOp::And => self.emit_jump(Opcode::JumpIfFalse, logical.span),
            LogicalOp::Or => self.emit_jump(Opcode::JumpIfTrue, logical.span),
            LogicalOp::Nullish => {
                // null == undefined, so one loose comparison covers both
                self.emit_op(Opcode::PushNull, logical.span);
                self.emit_op(Opcode::Eq, logical.span);
                self.emit_jump(Opcode::JumpIfFalse, logical.span)
            }
        };
        self.emit_op(Opcode::Pop, logical.span);
        self.compile_expr(&logical.right);
        self.patch_here(end_jump);
    }

    /// `++`/`--`; `as_prefix` is set when the old value is never observed
    pub(super) fn compile_update(&mut self, update: &UpdateExpr, as_prefix: bool) {
        let span = update.span;
        let step = match update.op {
            UpdateOp::Increment => Opcode::Add,
            UpdateOp::Decrement => Opcode::Sub,
        };
        let prefix = update.prefix || as_prefix;

        match update.argument.as_ref() {
            Expr::Identifier(ident) => {
                let name = ident.name.as_str();
                self.emit(Instruction::with_arg(Opcode::Load, name), span);
                self.emit_op(Opcode::ToNumber, span);
                if !prefix {
                    self.emit_op(Opcode::Dup, span);
                }
                self.emit_one(span);
                self.emit_op(step, span);
                if prefix {
                    self.emit_op(Opcode::Dup, span);
                }
                self.emit(Instruction::with_arg(Opcode::Store, name), span);
            }
            Expr::Member(member) => {
                let key = member.property.as_str();
                self.compile_expr(&member.object);
                self.emit_op(Opcode::Dup, span);
                self.emit(Instruction::with_arg(Opcode::PropertyGet, key), span);
                self.emit_op(Opcode::ToNumber, span);
                if prefix {
                    // obj new -> new
                    self.emit_one(span);
                    self.emit_op(step, span);
                    self.emit(Instruction::with_arg(Opcode::PropertySet, key), span);
                } else {
                    // obj old -> obj old obj new -> obj old -> old
                    self.emit_op(Opcode::Dup2, span);
                    self.emit_one(span);
                    self.emit_op(step, span);
                    self.emit(Instruction::with_arg(Opcode::PropertySet, key), span);
                    self.emit_op(Opcode::Pop, span);
                    self.emit_op(Opcode::Swap, span);
                    self.emit_op(Opcode::Pop, span);
                }
            }
            Expr::Index(index) => {
                self.compile_expr(&index.object);
                self.compile_expr(&index.index);
                self.emit_op(Opcode::Dup2, span);
                self.emit_op(Opcode::ArrayGet, span);
                self.emit_op(Opcode::ToNumber, span);
                if !prefix {
                    // Keep the old value for the result
                    self.emit_op(Opcode::Dup, span);
                    self.emit(Instruction::with_arg(Opcode::Define, UPDATE_SCRATCH), span);
                }
                self.emit_one(span);
                self.emit_op(step, span);
                self.emit_op(Opcode::ArraySet, span);
                if !prefix {
                    self.emit_op(Opcode::Pop, span);
                    self.emit(Instruction::with_arg(Opcode::Load, UPDATE_SCRATCH), span);
                }
            }
            other => {
                self.error(
                    codes::INVALID_ASSIGNMENT,
                    "invalid update target",
                    other.span(),
                );
                self.emit_op(Opcode::PushUndefined, span);
            }
        }
    }

    fn emit_one(&mut self, span: Span) {
        self.emit(Instruction::with_arg(Opcode::Push, 1.0), span);
    }

    fn compile_assign(&mut self, assign: &AssignExpr) {
        let span = assign.span;
        let op = compound_opcode(assign.op);

        match assign.target.as_ref() {
            Expr::Identifier(ident) => {
                let name = ident.name.as_str();
                if let Some(op) = op {
                    self.emit(Instruction::with_arg(Opcode::Load, name), span);
                    self.compile_expr(&assign.value);
                    self.emit_op(op, span);
                } else {
                    self.compile_expr(&assign.value);
                }
                self.emit_op(Opcode::Dup, span);
                self.emit(Instruction::with_arg(Opcode::Store, name), span);
            }
            Expr::Member(member) => {
                let key = member.property.as_str();
                self.compile_expr(&member.object);
                if let Some(op) = op {
                    self.emit_op(Opcode::Dup, span);
                    self.emit(Instruction::with_arg(Opcode::PropertyGet, key), span);
                    self.compile_expr(&assign.value);
                    self.emit_op(op, span);
                } else {
                    self.compile_expr(&assign.value);
                }
                self.emit(Instruction::with_arg(Opcode::PropertySet, key), span);
            }
            Expr::Index(index) => {
                self.compile_expr(&index.object);
                self.compile_expr(&index.index);
                if let Some(op) = op {
                    self.emit_op(Opcode::Dup2, span);
                    self.emit_op(Opcode::ArrayGet, span);
                    self.compile_expr(&assign.value);
                    self.emit_op(op, span);
                } else {
                    self.compile_expr(&assign.value);
                }
                self.emit_op(Opcode::ArraySet, span);
            }
            other => {
                self.error(
                    codes::INVALID_ASSIGNMENT,
                    "invalid assignment target",
                    other.span(),
                );
                self.emit_op(Opcode::PushUndefined, span);
            }
        }
    }

    // ===== Calls and special forms =====

    fn compile_call(&mut self, call: &CallExpr) {
        match call.callee.as_ref() {
            Expr::Identifier(ident) => self.compile_named_call(&ident.name, call),
            Expr::Member(member) => self.compile_method_call(member, call),
            other => {
                self.error(
                    codes::UNSUPPORTED_SYNTAX,
                    "only declared functions and built-in methods can be called",
                    other.span(),
                );
                self.emit_op(Opcode::PushUndefined, call.span);
            }
        }
    }

    fn compile_arguments(&mut self, call: &CallExpr) {
        for argument in &call.arguments {
            self.compile_expr(argument);
        }
    }

    /// Check the argument count of a built-in; on mismatch report it and
    /// push a placeholder value
    fn expect_arguments(&mut self, name: &str, call: &CallExpr, expected: usize) -> bool {
        if call.arguments.len() == expected {
            return true;
        }
        self.error(
            codes::BAD_ARGUMENTS,
            format!(
                "{} expects {} argument{}, got {}",
                name,
                expected,
                if expected == 1 { "" } else { "s" },
                call.arguments.len()
            ),
            call.span,
        );
        self.emit_op(Opcode::PushUndefined, call.span);
        false
    }

    fn builtin(&mut self, name: &str, call: &CallExpr, argc: usize, op: Opcode) {
        if self.expect_arguments(name, call, argc) {
            self.compile_arguments(call);
            self.emit_op(op, call.span);
        }
    }

    fn compile_named_call(&mut self, name: &str, call: &CallExpr) {
        match name {
            "CC" => self.builtin("CC", call, 1, Opcode::Cc),
            "print" => self.compile_print(call),
            "listFiles" => self.builtin("listFiles", call, 1, Opcode::FsList),
            "readFile" => self.builtin("readFile", call, 1, Opcode::FsRead),
            "writeFile" => self.builtin("writeFile", call, 2, Opcode::FsWrite),
            _ => {
                self.compile_arguments(call);
                self.emit(
                    Instruction::with_arg(
                        Opcode::Call,
                        Operand::Call {
                            name: name.to_string(),
                            argc: call.arguments.len(),
                        },
                    ),
                    call.span,
                );
            }
        }
    }

    fn compile_print(&mut self, call: &CallExpr) {
        self.compile_arguments(call);
        self.emit(
            Instruction::with_int(Opcode::Print, call.arguments.len() as i64),
            call.span,
        );
    }

    fn compile_method_call(&mut self, member: &MemberExpr, call: &CallExpr) {
        let receiver = member.object.as_identifier();
        match (receiver, member.property.as_str()) {
            (Some("console"), "log") => self.compile_print(call),
            (Some("JSON"), "stringify") => {
                self.builtin("JSON.stringify", call, 1, Opcode::JsonStringify)
            }
            (Some("JSON"), "parse") => self.builtin("JSON.parse", call, 1, Opcode::JsonParse),
            (Some("Object"), "keys") => self.builtin("Object.keys", call, 1, Opcode::ObjectKeys),
            (_, "push") => {
                self.compile_expr(&member.object);
                self.compile_arguments(call);
                self.emit(
                    Instruction::with_int(Opcode::ArrayPush, call.arguments.len() as i64),
                    call.span,
                );
            }
            (_, "replace") => self.compile_replace(member, call),
            (_, method) => {
                self.error(
                    codes::UNKNOWN_METHOD,
                    format!("unknown method '{}'", method),
                    member.span,
                );
                self.emit_op(Opcode::PushUndefined, call.span);
            }
        }
    }

    /// `s.replace(/re/f, r)` uses the regex opcode; anything else is decided at runtime
    fn compile_replace(&mut self, member: &MemberExpr, call: &CallExpr) {
        if !self.expect_arguments("replace", call, 2) {
            return;
        }
        self.compile_expr(&member.object);
        match &call.arguments[0] {
            Expr::Regex(regex) => {
                self.compile_expr(&call.arguments[1]);
                self.emit(
                    Instruction::with_arg(
                        Opcode::StringReplaceRegex,
                        Operand::Regex {
                            pattern: regex.pattern.clone(),
                            flags: regex.flags.clone(),
                        },
                    ),
                    call.span,
                );
            }
            pattern => {
                self.compile_expr(pattern);
                self.compile_expr(&call.arguments[1]);
                self.emit_op(Opcode::StringReplace, call.span);
            }
        }
    }
}

fn binary_opcode(op: BinaryOp) -> Opcode {
    match op {
        BinaryOp::Add => Opcode::Add,
        BinaryOp::Sub => Opcode::Sub,
        BinaryOp::Mul => Opcode::Mul,
        BinaryOp::Div => Opcode::Div,
        BinaryOp::Mod => Opcode::Mod,
        BinaryOp::Pow => Opcode::Pow,
        BinaryOp::Eq => Opcode::Eq,
        BinaryOp::Ne => Opcode::Ne,
        BinaryOp::StrictEq => Opcode::StrictEq,
        BinaryOp::StrictNe => Opcode::StrictNe,
        BinaryOp::Lt => Opcode::Lt,
        BinaryOp::Le => Opcode::Le,
        BinaryOp::Gt => Opcode::Gt,
        BinaryOp::Ge => Opcode::Ge,
    }
}

fn compound_opcode(op: AssignOp) -> Option<Opcode> {
    match op {
        AssignOp::Assign => None,
        AssignOp::Add => Some(Opcode::Add),
        AssignOp::Sub => Some(Opcode::Sub),
        AssignOp::Mul => Some(Opcode::Mul),
        AssignOp::Div => Some(Opcode::Div),
        AssignOp::Mod => Some(Opcode::Mod),
    }
}
