//! Expression parsing (Pratt parsing)

use crate::ast::*;
use crate::lexer::Lexer;
use crate::parser::{Parser, Precedence};
use crate::span::Span;
use crate::token::{Token, TokenKind};

impl Parser {
    /// Parse an expression
    pub(super) fn parse_expression(&mut self) -> Result<Expr, ()> {
        self.parse_precedence(Precedence::Lowest)
    }

    /// Parse expression with given precedence
    pub(super) fn parse_precedence(&mut self, precedence: Precedence) -> Result<Expr, ()> {
        let mut left = self.parse_prefix()?;

        while precedence < self.current_precedence() {
            left = self.parse_infix(left)?;
        }

        Ok(left)
    }

    /// Parse prefix expression
    fn parse_prefix(&mut self) -> Result<Expr, ()> {
        match self.peek().kind {
            TokenKind::Number => self.parse_number(),
            TokenKind::String => {
                let token = self.advance();
                Ok(literal(LiteralValue::String(token.lexeme.clone()), token.span))
            }
            TokenKind::True | TokenKind::False => {
                let token = self.advance();
                Ok(literal(LiteralValue::Bool(token.kind == TokenKind::True), token.span))
            }
            TokenKind::Null => {
                let span = self.advance().span;
                Ok(literal(LiteralValue::Null, span))
            }
            TokenKind::Identifier => {
                let token = self.advance();
                Ok(Expr::Identifier(Identifier {
                    name: token.lexeme.clone(),
                    span: token.span,
                }))
            }
            TokenKind::Template => self.parse_template(),
            TokenKind::Regex => self.parse_regex(),
            TokenKind::LeftParen => self.parse_group(),
            TokenKind::LeftBracket => self.parse_array_literal(),
            TokenKind::LeftBrace => self.parse_object_literal(),
            TokenKind::Minus | TokenKind::Plus | TokenKind::Bang | TokenKind::Typeof => {
                self.parse_unary()
            }
            TokenKind::PlusPlus | TokenKind::MinusMinus => self.parse_prefix_update(),
            TokenKind::Function => {
                let start = self.peek().span;
                self.parse_function_parts(false)?;
                Ok(unsupported("function expression", start.merge(self.previous().span)))
            }
            TokenKind::New => {
                let start = self.advance().span;
                let target = self.parse_precedence(Precedence::Postfix)?;
                Ok(unsupported("'new' expression", start.merge(target.span())))
            }
            TokenKind::This => {
                let span = self.advance().span;
                Ok(unsupported("'this'", span))
            }
            _ => {
                self.error("Expected expression");
                Err(())
            }
        }
    }

    /// Parse infix expression
    fn parse_infix(&mut self, left: Expr) -> Result<Expr, ()> {
        match self.peek().kind {
            TokenKind::Plus
            | TokenKind::Minus
            | TokenKind::Star
            | TokenKind::StarStar
            | TokenKind::Slash
            | TokenKind::Percent
            | TokenKind::EqualEqual
            | TokenKind::BangEqual
            | TokenKind::EqualEqualEqual
            | TokenKind::BangEqualEqual
            | TokenKind::Less
            | TokenKind::LessEqual
            | TokenKind::Greater
            | TokenKind::GreaterEqual => self.parse_binary(left),
            TokenKind::AmpAmp | TokenKind::PipePipe | TokenKind::QuestionQuestion => {
                self.parse_logical(left)
            }
            TokenKind::Question => self.parse_conditional(left),
            TokenKind::Equal
            | TokenKind::PlusEqual
            | TokenKind::MinusEqual
            | TokenKind::StarEqual
            | TokenKind::SlashEqual
            | TokenKind::PercentEqual => self.parse_assignment(left),
            TokenKind::PlusPlus | TokenKind::MinusMinus => {
                let token = self.advance();
                let op = update_op(token.kind);
                let span = left.span().merge(token.span);
                Ok(Expr::Update(UpdateExpr {
                    op,
                    prefix: false,
                    argument: Box::new(left),
                    span,
                }))
            }
            TokenKind::FatArrow => self.parse_arrow(left),
            TokenKind::LeftParen => self.parse_call(left),
            TokenKind::LeftBracket => self.parse_index(left),
            TokenKind::Dot => self.parse_member(left),
            _ => Ok(left),
        }
    }

    /// Get current token precedence
    pub(super) fn current_precedence(&self) -> Precedence {
        let token = self.peek();
        // A postfix update on the next line belongs to the next statement.
        if matches!(token.kind, TokenKind::PlusPlus | TokenKind::MinusMinus) && self.on_new_line() {
            return Precedence::Lowest;
        }
        precedence_of(token.kind)
    }

    fn parse_number(&mut self) -> Result<Expr, ()> {
        let token = self.advance();
        let span = token.span;
        let lexeme = token.lexeme.clone();
        let value = if let Some(hex) = lexeme.strip_prefix("0x").or_else(|| lexeme.strip_prefix("0X")) {
            u64::from_str_radix(hex, 16).map(|v| v as f64).ok()
        } else {
            lexeme.parse::<f64>().ok()
        };
        match value {
            Some(value) => Ok(literal(LiteralValue::Number(value), span)),
            None => {
                self.error_at(span, "Invalid number literal");
                Err(())
            }
        }
    }

    fn parse_regex(&mut self) -> Result<Expr, ()> {
        let token = self.advance();
        let span = token.span;
        let body = &token.lexeme[1..];
        let (pattern, flags) = match body.rfind('/') {
            Some(idx) => (body[..idx].to_string(), body[idx + 1..].to_string()),
            None => (body.to_string(), String::new()),
        };
        Ok(Expr::Regex(RegexLiteral {
            pattern,
            flags,
            span,
        }))
    }

    /// Split a raw template body into text parts and embedded expressions
    fn parse_template(&mut self) -> Result<Expr, ()> {
        let token = self.advance().clone();
        let chars: Vec<char> = token.lexeme.chars().collect();
        let mut quasis = Vec::new();
        let mut expressions = Vec::new();
        let mut text = String::new();
        let mut i = 0;

        while i < chars.len() {
            match chars[i] {
                '\\' if i + 1 < chars.len() => {
                    let (decoded, used) = decode_escape(&chars[i + 1..]);
                    text.push_str(&decoded);
                    i += 1 + used;
                }
                '$' if chars.get(i + 1) == Some(&'{') => {
                    let end = matching_brace(&chars, i + 2);
                    let inner: String = chars[i + 2..end].iter().collect();
                    quasis.push(std::mem::take(&mut text));
                    expressions.push(self.parse_embedded(&inner, &token)?);
                    i = end + 1;
                }
                c => {
                    text.push(c);
                    i += 1;
                }
            }
        }
        quasis.push(text);

        Ok(Expr::Template(TemplateLiteral {
            quasis,
            expressions,
            span: token.span,
        }))
    }

    /// Parse the source of a `${...}` part; diagnostics point at the template
    fn parse_embedded(&mut self, source: &str, template: &Token) -> Result<Expr, ()> {
        let (tokens, lex_diagnostics) = Lexer::new(source).tokenize();
        let mut inner = Parser::new(tokens);
        let result = inner.parse_expression();
        let trailing = !inner.is_at_end();

        let relocate = |mut d: crate::diagnostic::Diagnostic| {
            d.line = template.span.line;
            d.column = template.span.column;
            d.length = template.span.len();
            d.snippet.clear();
            d
        };
        let had_errors = !lex_diagnostics.is_empty() || !inner.diagnostics.is_empty();
        self.diagnostics.extend(lex_diagnostics.into_iter().map(relocate));
        let inner_diagnostics = std::mem::take(&mut inner.diagnostics);
        self.diagnostics.extend(inner_diagnostics.into_iter().map(relocate));

        match result {
            Ok(_) if trailing && !had_errors => {
                self.error_at(template.span, "Unexpected tokens in template expression");
                Err(())
            }
            Ok(expr) if !had_errors => Ok(expr),
            _ => Err(()),
        }
    }

    /// Parse grouped expression
    fn parse_group(&mut self) -> Result<Expr, ()> {
        if let Some(close) = self.arrow_params_end() {
            let start = self.peek().span;
            self.current = close + 1;
            let params = unsupported("arrow function", start.merge(self.previous().span));
            return self.parse_arrow(params);
        }

        self.consume(TokenKind::LeftParen, "Expected '('")?;
        let expr = self.parse_expression()?;
        self.consume(TokenKind::RightParen, "Expected ')'")?;
        Ok(expr)
    }

    /// When the `(` at the cursor opens an arrow parameter list, index of its `)`
    fn arrow_params_end(&self) -> Option<usize> {
        let mut depth = 0usize;
        let mut i = self.current;
        while i < self.tokens.len() {
            match self.tokens[i].kind {
                TokenKind::LeftParen => depth += 1,
                TokenKind::RightParen => {
                    depth -= 1;
                    if depth == 0 {
                        let next = self.tokens.get(i + 1).map(|t| t.kind);
                        return (next == Some(TokenKind::FatArrow)).then_some(i);
                    }
                }
                TokenKind::Eof => return None,
                _ => {}
            }
            i += 1;
        }
        None
    }

    fn parse_array_literal(&mut self) -> Result<Expr, ()> {
        let start_span = self.consume(TokenKind::LeftBracket, "Expected '['")?.span;
        let mut elements = Vec::new();

        while !self.check(TokenKind::RightBracket) {
            elements.push(self.parse_precedence(Precedence::Lowest)?);
            if !self.match_token(TokenKind::Comma) {
                break;
            }
        }

        let end_span = self.consume(TokenKind::RightBracket, "Expected ']'")?.span;

        Ok(Expr::Array(ArrayLiteral {
            elements,
            span: start_span.merge(end_span),
        }))
    }

    fn parse_object_literal(&mut self) -> Result<Expr, ()> {
        let start_span = self.consume(TokenKind::LeftBrace, "Expected '{'")?.span;
        let mut properties = Vec::new();

        while !self.check(TokenKind::RightBrace) {
            let key_token = self.peek().clone();
            let key = match key_token.kind {
                TokenKind::String | TokenKind::Number | TokenKind::Identifier => key_token.lexeme.clone(),
                _ if TokenKind::is_keyword(&key_token.lexeme).is_some() => key_token.lexeme.clone(),
                TokenKind::LeftBracket => {
                    self.error("Computed property keys are not supported");
                    return Err(());
                }
                _ => {
                    self.error("Expected property name");
                    return Err(());
                }
            };
            self.advance();

            let value = if self.match_token(TokenKind::Colon) {
                self.parse_precedence(Precedence::Lowest)?
            } else if key_token.kind == TokenKind::Identifier {
                Expr::Identifier(Identifier {
                    name: key.clone(),
                    span: key_token.span,
                })
            } else {
                self.error("Expected ':' after property name");
                return Err(());
            };

            properties.push(Property { key, value });

            if !self.match_token(TokenKind::Comma) {
                break;
            }
        }

        let end_span = self.consume(TokenKind::RightBrace, "Expected '}' after object literal")?.span;

        Ok(Expr::Object(ObjectLiteral {
            properties,
            span: start_span.merge(end_span),
        }))
    }

    fn parse_unary(&mut self) -> Result<Expr, ()> {
        let op_token = self.advance();
        let op_span = op_token.span;
        let op = match op_token.kind {
            TokenKind::Minus => UnaryOp::Negate,
            TokenKind::Plus => UnaryOp::Plus,
            TokenKind::Typeof => UnaryOp::Typeof,
            _ => UnaryOp::Not,
        };

        // Unary binds tighter than ** operands on the right, looser than postfix
        let operand = self.parse_precedence(Precedence::Exponent)?;
        let operand_span = operand.span();

        Ok(Expr::Unary(UnaryExpr {
            op,
            argument: Box::new(operand),
            span: op_span.merge(operand_span),
        }))
    }

    fn parse_prefix_update(&mut self) -> Result<Expr, ()> {
        let token = self.advance();
        let op = update_op(token.kind);
        let op_span = token.span;
        let argument = self.parse_precedence(Precedence::Exponent)?;
        let span = op_span.merge(argument.span());

        Ok(Expr::Update(UpdateExpr {
            op,
            prefix: true,
            argument: Box::new(argument),
            span,
        }))
    }

    fn parse_binary(&mut self, left: Expr) -> Result<Expr, ()> {
        let left_span = left.span();
        let op_token = self.advance();
        let op_kind = op_token.kind;

        let op = match op_kind {
            TokenKind::Plus => BinaryOp::Add,
            TokenKind::Minus => BinaryOp::Sub,
            TokenKind::Star => BinaryOp::Mul,
            TokenKind::StarStar => BinaryOp::Pow,
            TokenKind::Slash => BinaryOp::Div,
            TokenKind::Percent => BinaryOp::Mod,
            TokenKind::EqualEqual => BinaryOp::Eq,
            TokenKind::BangEqual => BinaryOp::Ne,
            TokenKind::EqualEqualEqual => BinaryOp::StrictEq,
            TokenKind::BangEqualEqual => BinaryOp::StrictNe,
            TokenKind::Less => BinaryOp::Lt,
            TokenKind::LessEqual => BinaryOp::Le,
            TokenKind::Greater => BinaryOp::Gt,
            _ => BinaryOp::Ge,
        };

        let precedence = match op_kind {
            // right-associative
            TokenKind::StarStar => Precedence::Factor,
            _ => precedence_of(op_kind),
        };

        let right = self.parse_precedence(precedence)?;
        let right_span = right.span();

        Ok(Expr::Binary(BinaryExpr {
            op,
            left: Box::new(left),
            right: Box::new(right),
            span: left_span.merge(right_span),
        }))
    }

    fn parse_logical(&mut self, left: Expr) -> Result<Expr, ()> {
        let left_span = left.span();
        let op_kind = self.advance().kind;
        let op = match op_kind {
            TokenKind::AmpAmp => LogicalOp::And,
            TokenKind::PipePipe => LogicalOp::Or,
            _ => LogicalOp::Nullish,
        };

        let right = self.parse_precedence(precedence_of(op_kind))?;
        let right_span = right.span();

        Ok(Expr::Logical(LogicalExpr {
            op,
            left: Box::new(left),
            right: Box::new(right),
            span: left_span.merge(right_span),
        }))
    }

    fn parse_conditional(&mut self, test: Expr) -> Result<Expr, ()> {
        let test_span = test.span();
        self.consume(TokenKind::Question, "Expected '?'")?;
        let consequent = self.parse_precedence(Precedence::Lowest)?;
        self.consume(TokenKind::Colon, "Expected ':' in conditional expression")?;
        let alternate = self.parse_precedence(Precedence::Assignment)?;
        let span = test_span.merge(alternate.span());

        Ok(Expr::Conditional(ConditionalExpr {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
            span,
        }))
    }

    fn parse_assignment(&mut self, target: Expr) -> Result<Expr, ()> {
        let target_span = target.span();
        if !matches!(target, Expr::Identifier(_) | Expr::Member(_) | Expr::Index(_)) {
            self.error("Invalid assignment target");
            return Err(());
        }

        let op = match self.advance().kind {
            TokenKind::PlusEqual => AssignOp::Add,
            TokenKind::MinusEqual => AssignOp::Sub,
            TokenKind::StarEqual => AssignOp::Mul,
            TokenKind::SlashEqual => AssignOp::Div,
            TokenKind::PercentEqual => AssignOp::Mod,
            _ => AssignOp::Assign,
        };

        // right-associative: a = b = c
        let value = self.parse_precedence(Precedence::Lowest)?;
        let span = target_span.merge(value.span());

        Ok(Expr::Assign(AssignExpr {
            op,
            target: Box::new(target),
            value: Box::new(value),
            span,
        }))
    }

    /// `params => body`: consumed so compilation can report it
    fn parse_arrow(&mut self, params: Expr) -> Result<Expr, ()> {
        let start = params.span();
        self.consume(TokenKind::FatArrow, "Expected '=>'")?;
        if self.check(TokenKind::LeftBrace) {
            self.parse_block()?;
        } else {
            self.parse_precedence(Precedence::Lowest)?;
        }
        Ok(unsupported("arrow function", start.merge(self.previous().span)))
    }

    fn parse_call(&mut self, callee: Expr) -> Result<Expr, ()> {
        let callee_span = callee.span();
        self.consume(TokenKind::LeftParen, "Expected '('")?;
        let mut arguments = Vec::new();

        while !self.check(TokenKind::RightParen) {
            arguments.push(self.parse_precedence(Precedence::Lowest)?);
            if !self.match_token(TokenKind::Comma) {
                break;
            }
        }

        let end_span = self.consume(TokenKind::RightParen, "Expected ')' after arguments")?.span;

        Ok(Expr::Call(CallExpr {
            callee: Box::new(callee),
            arguments,
            span: callee_span.merge(end_span),
        }))
    }

    fn parse_index(&mut self, object: Expr) -> Result<Expr, ()> {
        let object_span = object.span();
        self.consume(TokenKind::LeftBracket, "Expected '['")?;
        let index = self.parse_expression()?;
        let end_span = self.consume(TokenKind::RightBracket, "Expected ']'")?.span;

        Ok(Expr::Index(IndexExpr {
            object: Box::new(object),
            index: Box::new(index),
            span: object_span.merge(end_span),
        }))
    }

    fn parse_member(&mut self, object: Expr) -> Result<Expr, ()> {
        let object_span = object.span();
        self.consume(TokenKind::Dot, "Expected '.'")?;
        let token = self.peek().clone();
        let is_name = token.kind == TokenKind::Identifier || TokenKind::is_keyword(&token.lexeme).is_some();
        if !is_name {
            self.error("Expected property name after '.'");
            return Err(());
        }
        self.advance();

        Ok(Expr::Member(MemberExpr {
            object: Box::new(object),
            property: token.lexeme,
            span: object_span.merge(token.span),
        }))
    }
}

fn literal(value: LiteralValue, span: Span) -> Expr {
    Expr::Literal(Literal { value, span })
}

fn unsupported(kind: &str, span: Span) -> Expr {
    Expr::Unsupported(Unsupported {
        kind: kind.to_string(),
        span,
    })
}

fn update_op(kind: TokenKind) -> UpdateOp {
    if kind == TokenKind::PlusPlus {
        UpdateOp::Increment
    } else {
        UpdateOp::Decrement
    }
}

fn precedence_of(kind: TokenKind) -> Precedence {
    match kind {
        TokenKind::Equal
        | TokenKind::PlusEqual
        | TokenKind::MinusEqual
        | TokenKind::StarEqual
        | TokenKind::SlashEqual
        | TokenKind::PercentEqual
        | TokenKind::FatArrow => Precedence::Assignment,
        TokenKind::Question => Precedence::Conditional,
        TokenKind::QuestionQuestion => Precedence::Nullish,
        TokenKind::PipePipe => Precedence::Or,
        TokenKind::AmpAmp => Precedence::And,
        TokenKind::EqualEqual
        | TokenKind::BangEqual
        | TokenKind::EqualEqualEqual
        | TokenKind::BangEqualEqual => Precedence::Equality,
        TokenKind::Less | TokenKind::LessEqual | TokenKind::Greater | TokenKind::GreaterEqual => {
            Precedence::Comparison
        }
        TokenKind::Plus | TokenKind::Minus => Precedence::Term,
        TokenKind::Star | TokenKind::Slash | TokenKind::Percent => Precedence::Factor,
        TokenKind::StarStar => Precedence::Exponent,
        TokenKind::PlusPlus | TokenKind::MinusMinus => Precedence::Postfix,
        TokenKind::LeftParen | TokenKind::LeftBracket | TokenKind::Dot => Precedence::Call,
        _ => Precedence::Lowest,
    }
}

/// Decode one template escape; returns the text and how many chars it used
fn decode_escape(rest: &[char]) -> (String, usize) {
    match rest[0] {
        'n' => ("\n".to_string(), 1),
        'r' => ("\r".to_string(), 1),
        't' => ("\t".to_string(), 1),
        '0' => ("\0".to_string(), 1),
        'u' if rest.len() >= 5 => {
            let hex: String = rest[1..5].iter().collect();
            match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                Some(c) => (c.to_string(), 5),
                None => ("u".to_string(), 1),
            }
        }
        c => (c.to_string(), 1),
    }
}

/// Index of the `}` closing a `${` whose body starts at `start`
fn matching_brace(chars: &[char], start: usize) -> usize {
    let mut depth = 1usize;
    let mut i = start;
    while i < chars.len() {
        match chars[i] {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return i;
                }
            }
            q @ ('"' | '\'') => {
                i += 1;
                while i < chars.len() && chars[i] != q {
                    if chars[i] == '\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    chars.len()
}
