//! Parsing (tokens to AST)
//!
//! Uses Pratt parsing for expressions and recursive descent for statements.
//! Semicolons are optional; a statement ends at `;`, `}`, or the next statement.

mod expr;
mod stmt;

use crate::ast::*;
use crate::diagnostic::{codes, Diagnostic};
use crate::lexer::Lexer;
use crate::span::Span;
use crate::token::{Token, TokenKind};

/// Parser state for building AST from tokens
pub struct Parser {
    pub(super) tokens: Vec<Token>,
    pub(super) current: usize,
    pub(super) diagnostics: Vec<Diagnostic>,
}

/// Operator precedence levels for Pratt parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(super) enum Precedence {
    Lowest,
    Assignment,  // = += -= ... =>
    Conditional, // ?:
    Nullish,     // ??
    Or,          // ||
    And,         // &&
    Equality,    // == != === !==
    Comparison,  // < <= > >=
    Term,        // + -
    Factor,      // * / %
    Exponent,    // **
    Postfix,     // x++ x--
    Call,        // () [] .
}

impl Parser {
    /// Create a new parser for the given tokens
    pub fn new(tokens: Vec<Token>) -> Self {
        let mut tokens = tokens;
        if tokens.last().map(|t| t.kind) != Some(TokenKind::Eof) {
            let span = tokens.last().map(|t| t.span).unwrap_or_default();
            tokens.push(Token::new(TokenKind::Eof, "", span));
        }
        Self {
            tokens,
            current: 0,
            diagnostics: Vec::new(),
        }
    }

    /// Parse tokens into an AST
    pub fn parse(&mut self) -> (Program, Vec<Diagnostic>) {
        let mut body = Vec::new();

        while !self.is_at_end() {
            match self.parse_statement() {
                Ok(stmt) => body.push(stmt),
                Err(_) => self.synchronize(),
            }
        }

        (Program { body }, std::mem::take(&mut self.diagnostics))
    }

    // === Helper methods ===

    /// Advance to next token and return reference to previous
    pub(super) fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        &self.tokens[self.current.saturating_sub(1)]
    }

    /// Peek at current token
    pub(super) fn peek(&self) -> &Token {
        &self.tokens[self.current.min(self.tokens.len() - 1)]
    }

    /// Peek `n` tokens ahead of the current one
    pub(super) fn peek_ahead(&self, n: usize) -> &Token {
        &self.tokens[(self.current + n).min(self.tokens.len() - 1)]
    }

    /// The most recently consumed token
    pub(super) fn previous(&self) -> &Token {
        &self.tokens[self.current.saturating_sub(1)]
    }

    /// Check if current token matches kind
    pub(super) fn check(&self, kind: TokenKind) -> bool {
        !self.is_at_end() && self.peek().kind == kind
    }

    /// Match and consume token if it matches
    pub(super) fn match_token(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Consume token of given kind or error
    pub(super) fn consume(&mut self, kind: TokenKind, message: &str) -> Result<&Token, ()> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            self.error(message);
            Err(())
        }
    }

    /// Consume an identifier token
    pub(super) fn consume_identifier(&mut self, context: &str) -> Result<&Token, ()> {
        let current = self.peek();
        if current.kind == TokenKind::Identifier {
            Ok(self.advance())
        } else if TokenKind::is_keyword(&current.lexeme).is_some() {
            let message = format!("Cannot use reserved keyword '{}' as {}", current.lexeme, context);
            self.error(&message);
            Err(())
        } else {
            let message = format!("Expected {} but found '{}'", context, current.kind.as_str());
            self.error(&message);
            Err(())
        }
    }

    /// True when the current token starts a new line relative to the previous one
    pub(super) fn on_new_line(&self) -> bool {
        self.current > 0 && self.peek().span.line > self.previous().span.line
    }

    /// Consume an optional `;`
    pub(super) fn end_statement(&mut self) {
        self.match_token(TokenKind::Semicolon);
    }

    /// Check if at end of token stream
    pub(super) fn is_at_end(&self) -> bool {
        self.current >= self.tokens.len() || self.tokens[self.current].kind == TokenKind::Eof
    }

    /// Record an error at the current token
    pub(super) fn error(&mut self, message: &str) {
        let token = self.peek();
        // The lexer already reported error tokens.
        if token.kind == TokenKind::Error {
            return;
        }
        let span = token.span;
        self.diagnostics.push(
            Diagnostic::error_with_code(codes::UNEXPECTED_TOKEN, message, span)
                .with_label("syntax error"),
        );
    }

    /// Record an error at a specific span
    pub(super) fn error_at(&mut self, span: Span, message: &str) {
        self.diagnostics.push(
            Diagnostic::error_with_code(codes::UNEXPECTED_TOKEN, message, span)
                .with_label("syntax error"),
        );
    }

    /// Synchronize after error
    pub(super) fn synchronize(&mut self) {
        self.advance();

        while !self.is_at_end() {
            if self.previous().kind == TokenKind::Semicolon {
                return;
            }

            match self.peek().kind {
                TokenKind::Function
                | TokenKind::Let
                | TokenKind::Const
                | TokenKind::Var
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Do
                | TokenKind::For
                | TokenKind::Return
                | TokenKind::RightBrace => return,
                _ => {
                    self.advance();
                }
            }
        }
    }
}

/// Lex and parse source text in one step
pub fn parse_source(source: &str) -> (Program, Vec<Diagnostic>) {
    let (tokens, mut diagnostics) = Lexer::new(source).tokenize();
    let mut parser = Parser::new(tokens);
    let (program, parse_diagnostics) = parser.parse();
    diagnostics.extend(parse_diagnostics);
    let diagnostics = diagnostics
        .into_iter()
        .map(|d| if d.snippet.is_empty() { d.with_source(source) } else { d })
        .collect();
    (program, diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse_ok(source: &str) -> Program {
        let (program, diagnostics) = parse_source(source);
        assert!(diagnostics.is_empty(), "unexpected diagnostics: {:?}", diagnostics);
        program
    }

    fn first_expr(source: &str) -> Expr {
        match parse_ok(source).body.into_iter().next() {
            Some(Stmt::Expr(stmt)) => stmt.expr,
            other => panic!("expected expression statement, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_program() {
        let mut parser = Parser::new(Vec::new());
        let (program, diagnostics) = parser.parse();
        assert!(program.body.is_empty());
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_optional_semicolons() {
        let program = parse_ok("let x = 1\nx = x + 1\nprint(x)");
        assert_eq!(program.body.len(), 3);
    }

    #[test]
    fn test_precedence_mul_over_add() {
        match first_expr("1 + 2 * 3;") {
            Expr::Binary(b) => {
                assert_eq!(b.op, BinaryOp::Add);
                assert!(matches!(*b.right, Expr::Binary(BinaryExpr { op: BinaryOp::Mul, .. })));
            }
            other => panic!("expected binary, got {:?}", other),
        }
    }

    #[test]
    fn test_exponent_is_right_associative() {
        match first_expr("2 ** 3 ** 2;") {
            Expr::Binary(b) => {
                assert_eq!(b.op, BinaryOp::Pow);
                assert!(matches!(*b.left, Expr::Literal(_)));
                assert!(matches!(*b.right, Expr::Binary(_)));
            }
            other => panic!("expected binary, got {:?}", other),
        }
    }

    #[test]
    fn test_assignment_is_right_associative() {
        match first_expr("a = b = 3;") {
            Expr::Assign(a) => {
                assert_eq!(a.target.as_identifier(), Some("a"));
                assert!(matches!(*a.value, Expr::Assign(_)));
            }
            other => panic!("expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_ternary_and_nullish() {
        match first_expr("a ?? b ? c : d;") {
            Expr::Conditional(c) => {
                assert!(matches!(*c.test, Expr::Logical(LogicalExpr { op: LogicalOp::Nullish, .. })));
            }
            other => panic!("expected conditional, got {:?}", other),
        }
    }

    #[test]
    fn test_member_call_chain() {
        match first_expr("console.log(a.b[0].length);") {
            Expr::Call(call) => {
                assert!(matches!(*call.callee, Expr::Member(ref m) if m.property == "log"));
                assert!(matches!(call.arguments[0], Expr::Member(ref m) if m.property == "length"));
            }
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_postfix_and_prefix_update() {
        assert!(matches!(
            first_expr("i++;"),
            Expr::Update(UpdateExpr { prefix: false, op: UpdateOp::Increment, .. })
        ));
        assert!(matches!(
            first_expr("--i;"),
            Expr::Update(UpdateExpr { prefix: true, op: UpdateOp::Decrement, .. })
        ));
    }

    #[test]
    fn test_template_literal_parts() {
        match first_expr("`a${x + 1}b${y}`;") {
            Expr::Template(t) => {
                assert_eq!(t.quasis, vec!["a", "b", ""]);
                assert_eq!(t.expressions.len(), 2);
            }
            other => panic!("expected template, got {:?}", other),
        }
    }

    #[test]
    fn test_regex_literal() {
        match first_expr("s.replace(/a+/gi, 'b');") {
            Expr::Call(call) => match &call.arguments[0] {
                Expr::Regex(r) => {
                    assert_eq!(r.pattern, "a+");
                    assert_eq!(r.flags, "gi");
                }
                other => panic!("expected regex, got {:?}", other),
            },
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_object_literal_keys() {
        match first_expr("({a: 1, 'b c': 2, 3: x, d});") {
            Expr::Object(o) => {
                let keys: Vec<_> = o.properties.iter().map(|p| p.key.as_str()).collect();
                assert_eq!(keys, vec!["a", "b c", "3", "d"]);
            }
            other => panic!("expected object, got {:?}", other),
        }
    }

    #[test]
    fn test_arrow_function_is_unsupported() {
        let program = parse_ok("let f = (x) => x + 1;");
        match &program.body[0] {
            Stmt::VarDecl(decl) => assert!(matches!(
                decl.declarations[0].init,
                Some(Expr::Unsupported(ref u)) if u.kind == "arrow function"
            )),
            other => panic!("expected declaration, got {:?}", other),
        }
    }

    #[test]
    fn test_syntax_error_reports_position() {
        let (_, diagnostics) = parse_source("let x = ;\nlet y = 2;");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code, codes::UNEXPECTED_TOKEN);
        assert_eq!(diagnostics[0].line, 1);
        assert_eq!(diagnostics[0].column, 9);
        assert_eq!(diagnostics[0].snippet, "let x = ;");
    }
}
