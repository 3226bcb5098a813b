//! Statement parsing

use crate::ast::*;
use crate::parser::Parser;
use crate::span::Span;
use crate::token::TokenKind;

impl Parser {
    /// Parse a statement
    pub(super) fn parse_statement(&mut self) -> Result<Stmt, ()> {
        match self.peek().kind {
            TokenKind::Let | TokenKind::Const | TokenKind::Var => {
                let decl = self.parse_var_decl()?;
                self.end_statement();
                Ok(Stmt::VarDecl(decl))
            }
            TokenKind::Function => self.parse_function_decl(),
            TokenKind::If => self.parse_if_stmt(),
            TokenKind::While => self.parse_while_stmt(),
            TokenKind::Do => self.parse_do_while_stmt(),
            TokenKind::For => self.parse_for_stmt(),
            TokenKind::Return => self.parse_return_stmt(),
            TokenKind::Break | TokenKind::Continue => self.parse_jump_stmt(),
            TokenKind::LeftBrace => Ok(Stmt::Block(self.parse_block()?)),
            TokenKind::Semicolon => {
                let span = self.advance().span;
                Ok(Stmt::Empty(EmptyStmt { span }))
            }
            TokenKind::Class | TokenKind::Switch | TokenKind::Try => self.parse_unsupported_block(),
            TokenKind::Throw => {
                let start = self.advance().span;
                let value = self.parse_expression()?;
                self.end_statement();
                Ok(Stmt::Unsupported(Unsupported {
                    kind: "'throw' statement".to_string(),
                    span: start.merge(value.span()),
                }))
            }
            _ => {
                let expr = self.parse_expression()?;
                let span = expr.span();
                self.end_statement();
                Ok(Stmt::Expr(ExprStmt { expr, span }))
            }
        }
    }

    /// Parse `let|const|var name [= init] (, name [= init])*` without the terminator
    pub(super) fn parse_var_decl(&mut self) -> Result<VarDecl, ()> {
        let keyword = self.advance();
        let keyword_span = keyword.span;
        let kind = match keyword.kind {
            TokenKind::Const => VarKind::Const,
            TokenKind::Var => VarKind::Var,
            _ => VarKind::Let,
        };

        let mut declarations = Vec::new();
        loop {
            if self.check(TokenKind::LeftBrace) || self.check(TokenKind::LeftBracket) {
                self.error("Destructuring declarations are not supported");
                return Err(());
            }
            let name_token = self.consume_identifier("a variable name")?;
            let name = name_token.lexeme.clone();
            let mut span = name_token.span;

            let init = if self.match_token(TokenKind::Equal) {
                let init = self.parse_expression()?;
                span = span.merge(init.span());
                Some(init)
            } else {
                None
            };
            declarations.push(Declarator { name, init, span });

            if !self.match_token(TokenKind::Comma) {
                break;
            }
        }

        let end_span = self.previous().span;
        Ok(VarDecl {
            kind,
            declarations,
            span: keyword_span.merge(end_span),
        })
    }

    fn parse_function_decl(&mut self) -> Result<Stmt, ()> {
        let (name, params, body, span) = self.parse_function_parts(true)?;
        Ok(Stmt::FunctionDecl(FunctionDecl {
            name: name.unwrap_or_default(),
            params,
            body: body.body,
            span,
        }))
    }

    /// Parse `function [name](params) { body }`
    pub(super) fn parse_function_parts(
        &mut self,
        require_name: bool,
    ) -> Result<(Option<String>, Vec<String>, Block, Span), ()> {
        let fn_span = self.consume(TokenKind::Function, "Expected 'function'")?.span;

        let name = if self.check(TokenKind::Identifier) || require_name {
            Some(self.consume_identifier("a function name")?.lexeme.clone())
        } else {
            None
        };

        self.consume(TokenKind::LeftParen, "Expected '(' after function name")?;
        let mut params = Vec::new();
        while !self.check(TokenKind::RightParen) {
            let param = self.consume_identifier("a parameter name")?.lexeme.clone();
            if self.check(TokenKind::Equal) {
                self.error("Default parameter values are not supported");
                return Err(());
            }
            params.push(param);
            if !self.match_token(TokenKind::Comma) {
                break;
            }
        }
        self.consume(TokenKind::RightParen, "Expected ')' after parameters")?;

        let body = self.parse_block()?;
        let span = fn_span.merge(body.span);
        Ok((name, params, body, span))
    }

    fn parse_if_stmt(&mut self) -> Result<Stmt, ()> {
        let if_span = self.consume(TokenKind::If, "Expected 'if'")?.span;
        self.consume(TokenKind::LeftParen, "Expected '(' after 'if'")?;
        let test = self.parse_expression()?;
        self.consume(TokenKind::RightParen, "Expected ')' after condition")?;

        let consequent = Box::new(self.parse_statement()?);
        let alternate = if self.match_token(TokenKind::Else) {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };

        let end_span = alternate
            .as_ref()
            .map(|s| s.span())
            .unwrap_or_else(|| consequent.span());

        Ok(Stmt::If(IfStmt {
            test,
            consequent,
            alternate,
            span: if_span.merge(end_span),
        }))
    }

    fn parse_while_stmt(&mut self) -> Result<Stmt, ()> {
        let while_span = self.consume(TokenKind::While, "Expected 'while'")?.span;
        self.consume(TokenKind::LeftParen, "Expected '(' after 'while'")?;
        let test = self.parse_expression()?;
        self.consume(TokenKind::RightParen, "Expected ')' after condition")?;
        let body = Box::new(self.parse_statement()?);
        let span = while_span.merge(body.span());

        Ok(Stmt::While(WhileStmt { test, body, span }))
    }

    fn parse_do_while_stmt(&mut self) -> Result<Stmt, ()> {
        let do_span = self.consume(TokenKind::Do, "Expected 'do'")?.span;
        let body = Box::new(self.parse_statement()?);
        self.consume(TokenKind::While, "Expected 'while' after do body")?;
        self.consume(TokenKind::LeftParen, "Expected '(' after 'while'")?;
        let test = self.parse_expression()?;
        let end_span = self.consume(TokenKind::RightParen, "Expected ')' after condition")?.span;
        self.end_statement();

        Ok(Stmt::DoWhile(DoWhileStmt {
            body,
            test,
            span: do_span.merge(end_span),
        }))
    }

    fn parse_for_stmt(&mut self) -> Result<Stmt, ()> {
        let for_span = self.consume(TokenKind::For, "Expected 'for'")?.span;
        self.consume(TokenKind::LeftParen, "Expected '(' after 'for'")?;

        if let Some(stmt) = self.try_parse_for_each(for_span)? {
            return Ok(stmt);
        }

        let init = if self.check(TokenKind::Semicolon) {
            None
        } else if matches!(
            self.peek().kind,
            TokenKind::Let | TokenKind::Const | TokenKind::Var
        ) {
            Some(Box::new(Stmt::VarDecl(self.parse_var_decl()?)))
        } else {
            let expr = self.parse_expression()?;
            let span = expr.span();
            Some(Box::new(Stmt::Expr(ExprStmt { expr, span })))
        };
        self.consume(TokenKind::Semicolon, "Expected ';' after for initializer")?;

        let test = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.consume(TokenKind::Semicolon, "Expected ';' after for condition")?;

        let update = if self.check(TokenKind::RightParen) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.consume(TokenKind::RightParen, "Expected ')' after for clauses")?;

        let body = Box::new(self.parse_statement()?);
        let span = for_span.merge(body.span());

        Ok(Stmt::For(ForStmt {
            init,
            test,
            update,
            body,
            span,
        }))
    }

    /// `for ([let|const|var] x of|in expr) body`, after the opening paren
    fn try_parse_for_each(&mut self, for_span: Span) -> Result<Option<Stmt>, ()> {
        let declared = matches!(
            self.peek().kind,
            TokenKind::Let | TokenKind::Const | TokenKind::Var
        );
        let name_offset = usize::from(declared);
        let name_token = self.peek_ahead(name_offset);
        let keyword = self.peek_ahead(name_offset + 1);

        let is_of = keyword.kind == TokenKind::Identifier && keyword.lexeme == "of";
        let is_in = keyword.kind == TokenKind::In;
        if name_token.kind != TokenKind::Identifier || !(is_of || is_in) {
            return Ok(None);
        }

        let kind = if declared {
            Some(match self.advance().kind {
                TokenKind::Const => VarKind::Const,
                TokenKind::Var => VarKind::Var,
                _ => VarKind::Let,
            })
        } else {
            None
        };
        let binding = self.advance().lexeme.clone();
        self.advance(); // of / in

        let iterable = self.parse_expression()?;
        self.consume(TokenKind::RightParen, "Expected ')' after for-each header")?;
        let body = Box::new(self.parse_statement()?);
        let span = for_span.merge(body.span());

        let stmt = ForEachStmt {
            kind,
            binding,
            iterable,
            body,
            span,
        };
        Ok(Some(if is_of {
            Stmt::ForOf(stmt)
        } else {
            Stmt::ForIn(stmt)
        }))
    }

    fn parse_return_stmt(&mut self) -> Result<Stmt, ()> {
        let return_span = self.consume(TokenKind::Return, "Expected 'return'")?.span;

        let argument = if self.check(TokenKind::Semicolon)
            || self.check(TokenKind::RightBrace)
            || self.is_at_end()
            || self.on_new_line()
        {
            None
        } else {
            Some(self.parse_expression()?)
        };
        let end_span = argument.as_ref().map(|e| e.span()).unwrap_or(return_span);
        self.end_statement();

        Ok(Stmt::Return(ReturnStmt {
            argument,
            span: return_span.merge(end_span),
        }))
    }

    fn parse_jump_stmt(&mut self) -> Result<Stmt, ()> {
        let token = self.advance();
        let is_break = token.kind == TokenKind::Break;
        let span = token.span;

        if self.check(TokenKind::Identifier) && !self.on_new_line() {
            let label_span = self.advance().span;
            self.end_statement();
            return Ok(Stmt::Unsupported(Unsupported {
                kind: "labeled jump".to_string(),
                span: span.merge(label_span),
            }));
        }
        self.end_statement();

        let stmt = JumpStmt { span };
        Ok(if is_break {
            Stmt::Break(stmt)
        } else {
            Stmt::Continue(stmt)
        })
    }

    /// Skip `class`/`switch`/`try` constructs and report them as unsupported
    fn parse_unsupported_block(&mut self) -> Result<Stmt, ()> {
        let keyword = self.advance();
        let kind = format!("'{}' statement", keyword.lexeme);
        let start = keyword.span;

        loop {
            while !self.check(TokenKind::LeftBrace) {
                if self.is_at_end() {
                    self.error("Expected '{'");
                    return Err(());
                }
                self.advance();
            }
            self.skip_balanced_braces();

            let next = self.peek();
            let continues = next.kind == TokenKind::Identifier
                && (next.lexeme == "catch" || next.lexeme == "finally");
            if !continues {
                break;
            }
        }

        Ok(Stmt::Unsupported(Unsupported {
            kind,
            span: start.merge(self.previous().span),
        }))
    }

    fn skip_balanced_braces(&mut self) {
        let mut depth = 0usize;
        while !self.is_at_end() {
            match self.advance().kind {
                TokenKind::LeftBrace => depth += 1,
                TokenKind::RightBrace => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return;
                    }
                }
                _ => {}
            }
        }
    }

    /// Parse a braced block
    pub(super) fn parse_block(&mut self) -> Result<Block, ()> {
        let start_span = self.consume(TokenKind::LeftBrace, "Expected '{'")?.span;
        let mut body = Vec::new();

        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            match self.parse_statement() {
                Ok(stmt) => body.push(stmt),
                Err(_) => self.synchronize(),
            }
        }

        let end_span = self.consume(TokenKind::RightBrace, "Expected '}'")?.span;

        Ok(Block {
            body,
            span: start_span.merge(end_span),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::*;
    use crate::parser::parse_source;

    fn parse_ok(source: &str) -> Vec<Stmt> {
        let (program, diagnostics) = parse_source(source);
        assert!(diagnostics.is_empty(), "unexpected diagnostics: {:?}", diagnostics);
        program.body
    }

    #[test]
    fn test_multiple_declarators_kept() {
        match &parse_ok("let a = 1, b;")[0] {
            Stmt::VarDecl(decl) => {
                assert_eq!(decl.declarations.len(), 2);
                assert!(decl.declarations[1].init.is_none());
            }
            other => panic!("expected declaration, got {:?}", other),
        }
    }

    #[test]
    fn test_function_declaration() {
        match &parse_ok("function add(a, b) { return a + b }")[0] {
            Stmt::FunctionDecl(f) => {
                assert_eq!(f.name, "add");
                assert_eq!(f.params, vec!["a", "b"]);
                assert!(matches!(f.body[0], Stmt::Return(ReturnStmt { argument: Some(_), .. })));
            }
            other => panic!("expected function, got {:?}", other),
        }
    }

    #[test]
    fn test_for_loop_clauses() {
        match &parse_ok("for (let i = 0; i < 4; i++) { print(i) }")[0] {
            Stmt::For(f) => {
                assert!(matches!(f.init.as_deref(), Some(Stmt::VarDecl(_))));
                assert!(f.test.is_some());
                assert!(f.update.is_some());
            }
            other => panic!("expected for, got {:?}", other),
        }
    }

    #[test]
    fn test_for_of_and_for_in() {
        let body = parse_ok("for (const x of xs) {}\nfor (k in obj) {}");
        assert!(matches!(&body[0], Stmt::ForOf(f) if f.binding == "x" && f.kind == Some(VarKind::Const)));
        assert!(matches!(&body[1], Stmt::ForIn(f) if f.binding == "k" && f.kind.is_none()));
    }

    #[test]
    fn test_do_while() {
        assert!(matches!(parse_ok("do { i++ } while (i < 3);")[0], Stmt::DoWhile(_)));
    }

    #[test]
    fn test_bare_return_on_new_line() {
        let body = parse_ok("function f() {\n  return\n  1\n}");
        match &body[0] {
            Stmt::FunctionDecl(f) => {
                assert!(matches!(f.body[0], Stmt::Return(ReturnStmt { argument: None, .. })));
                assert_eq!(f.body.len(), 2);
            }
            other => panic!("expected function, got {:?}", other),
        }
    }

    #[test]
    fn test_unsupported_constructs() {
        let body = parse_ok("try { x() } catch (e) { y() } finally { z() }\nclass A { m() {} }\nprint(1)");
        assert!(matches!(&body[0], Stmt::Unsupported(u) if u.kind == "'try' statement"));
        assert!(matches!(&body[1], Stmt::Unsupported(u) if u.kind == "'class' statement"));
        assert!(matches!(&body[2], Stmt::Expr(_)));
    }

    #[test]
    fn test_else_if_chain() {
        match &parse_ok("if (a) x(); else if (b) y(); else z();")[0] {
            Stmt::If(s) => assert!(matches!(s.alternate.as_deref(), Some(Stmt::If(_)))),
            other => panic!("expected if, got {:?}", other),
        }
    }
}
