//! Lexical analysis (tokenization)
//!
//! Converts source text into tokens with line/column spans. Whether a `/`
//! begins a regex literal or a division is decided from the previous token.

use crate::diagnostic::{codes, Diagnostic};
use crate::span::Span;
use crate::token::{Token, TokenKind};

/// Lexer state for tokenizing source code
pub struct Lexer {
    /// Original source code
    source: String,
    /// Characters of source code
    chars: Vec<char>,
    /// Current position in chars
    current: usize,
    /// Current line number (1-indexed)
    line: usize,
    /// Current column number (1-indexed)
    column: usize,
    /// Start position of current token
    start_pos: usize,
    /// Start line of current token
    start_line: usize,
    /// Start column of current token
    start_column: usize,
    /// Kind of the last token emitted, for regex detection
    last_kind: Option<TokenKind>,
    /// Collected diagnostics
    diagnostics: Vec<Diagnostic>,
}

impl Lexer {
    /// Create a new lexer for the given source code
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let chars: Vec<char> = source.chars().collect();
        Self {
            source,
            chars,
            current: 0,
            line: 1,
            column: 1,
            start_pos: 0,
            start_line: 1,
            start_column: 1,
            last_kind: None,
            diagnostics: Vec::new(),
        }
    }

    /// Tokenize the source code, returning tokens and any diagnostics
    pub fn tokenize(&mut self) -> (Vec<Token>, Vec<Diagnostic>) {
        let mut tokens = Vec::new();

        loop {
            let token = self.next_token();
            let is_eof = token.kind == TokenKind::Eof;
            if token.kind != TokenKind::Error {
                self.last_kind = Some(token.kind);
            }
            tokens.push(token);
            if is_eof {
                break;
            }
        }

        (tokens, std::mem::take(&mut self.diagnostics))
    }

    /// Scan the next token
    fn next_token(&mut self) -> Token {
        self.skip_whitespace_and_comments();

        self.start_pos = self.current;
        self.start_line = self.line;
        self.start_column = self.column;

        if self.is_at_end() {
            return self.make_token(TokenKind::Eof, "");
        }

        let c = self.advance();

        match c {
            '(' => self.make_token(TokenKind::LeftParen, "("),
            ')' => self.make_token(TokenKind::RightParen, ")"),
            '{' => self.make_token(TokenKind::LeftBrace, "{"),
            '}' => self.make_token(TokenKind::RightBrace, "}"),
            '[' => self.make_token(TokenKind::LeftBracket, "["),
            ']' => self.make_token(TokenKind::RightBracket, "]"),
            ';' => self.make_token(TokenKind::Semicolon, ";"),
            ',' => self.make_token(TokenKind::Comma, ","),
            ':' => self.make_token(TokenKind::Colon, ":"),
            '.' => {
                if self.peek().is_ascii_digit() {
                    self.number()
                } else {
                    self.make_token(TokenKind::Dot, ".")
                }
            }

            '+' => {
                if self.match_char('+') {
                    self.make_token(TokenKind::PlusPlus, "++")
                } else if self.match_char('=') {
                    self.make_token(TokenKind::PlusEqual, "+=")
                } else {
                    self.make_token(TokenKind::Plus, "+")
                }
            }
            '-' => {
                if self.match_char('-') {
                    self.make_token(TokenKind::MinusMinus, "--")
                } else if self.match_char('=') {
                    self.make_token(TokenKind::MinusEqual, "-=")
                } else {
                    self.make_token(TokenKind::Minus, "-")
                }
            }
            '*' => {
                if self.match_char('*') {
                    self.make_token(TokenKind::StarStar, "**")
                } else if self.match_char('=') {
                    self.make_token(TokenKind::StarEqual, "*=")
                } else {
                    self.make_token(TokenKind::Star, "*")
                }
            }
            '%' => {
                if self.match_char('=') {
                    self.make_token(TokenKind::PercentEqual, "%=")
                } else {
                    self.make_token(TokenKind::Percent, "%")
                }
            }
            '/' => {
                if self.regex_allowed() {
                    self.regex()
                } else if self.match_char('=') {
                    self.make_token(TokenKind::SlashEqual, "/=")
                } else {
                    self.make_token(TokenKind::Slash, "/")
                }
            }
            '=' => {
                if self.match_char('=') {
                    if self.match_char('=') {
                        self.make_token(TokenKind::EqualEqualEqual, "===")
                    } else {
                        self.make_token(TokenKind::EqualEqual, "==")
                    }
                } else if self.match_char('>') {
                    self.make_token(TokenKind::FatArrow, "=>")
                } else {
                    self.make_token(TokenKind::Equal, "=")
                }
            }
            '!' => {
                if self.match_char('=') {
                    if self.match_char('=') {
                        self.make_token(TokenKind::BangEqualEqual, "!==")
                    } else {
                        self.make_token(TokenKind::BangEqual, "!=")
                    }
                } else {
                    self.make_token(TokenKind::Bang, "!")
                }
            }
            '<' => {
                if self.match_char('=') {
                    self.make_token(TokenKind::LessEqual, "<=")
                } else {
                    self.make_token(TokenKind::Less, "<")
                }
            }
            '>' => {
                if self.match_char('=') {
                    self.make_token(TokenKind::GreaterEqual, ">=")
                } else {
                    self.make_token(TokenKind::Greater, ">")
                }
            }
            '&' => {
                if self.match_char('&') {
                    self.make_token(TokenKind::AmpAmp, "&&")
                } else {
                    self.error_token(
                        codes::UNEXPECTED_CHARACTER,
                        "Unexpected character '&', did you mean '&&'?",
                    )
                }
            }
            '|' => {
                if self.match_char('|') {
                    self.make_token(TokenKind::PipePipe, "||")
                } else {
                    self.error_token(
                        codes::UNEXPECTED_CHARACTER,
                        "Unexpected character '|', did you mean '||'?",
                    )
                }
            }
            '?' => {
                if self.match_char('?') {
                    self.make_token(TokenKind::QuestionQuestion, "??")
                } else {
                    self.make_token(TokenKind::Question, "?")
                }
            }

            '"' | '\'' => self.string(c),
            '`' => self.template(),

            c if c.is_ascii_digit() => self.number(),

            c if c.is_alphabetic() || c == '_' || c == '$' => self.identifier(),

            _ => self.error_token(
                codes::UNEXPECTED_CHARACTER,
                &format!("Unexpected character '{}'", c),
            ),
        }
    }

    /// Skip whitespace and comments
    fn skip_whitespace_and_comments(&mut self) {
        loop {
            if self.is_at_end() {
                return;
            }

            match self.peek() {
                ' ' | '\r' | '\t' | '\n' => {
                    self.advance();
                }
                '/' => {
                    if self.peek_next() == Some('/') {
                        while !self.is_at_end() && self.peek() != '\n' {
                            self.advance();
                        }
                    } else if self.peek_next() == Some('*') {
                        self.start_pos = self.current;
                        self.start_line = self.line;
                        self.start_column = self.column;
                        self.advance();
                        self.advance();

                        let mut closed = false;
                        while !self.is_at_end() {
                            if self.peek() == '*' && self.peek_next() == Some('/') {
                                self.advance();
                                self.advance();
                                closed = true;
                                break;
                            }
                            self.advance();
                        }
                        if !closed {
                            self.error_token(codes::UNTERMINATED_COMMENT, "Unterminated block comment");
                        }
                    } else {
                        return;
                    }
                }
                _ => return,
            }
        }
    }

    fn regex_allowed(&self) -> bool {
        match self.last_kind {
            None => true,
            Some(kind) => !kind.ends_operand(),
        }
    }

    /// Scan a string literal delimited by `quote`
    fn string(&mut self, quote: char) -> Token {
        let mut value = String::new();

        while !self.is_at_end() && self.peek() != quote {
            if self.peek() == '\n' {
                return self.error_token(codes::UNTERMINATED_STRING, "Unterminated string literal");
            }

            if self.peek() == '\\' {
                self.advance();
                if self.is_at_end() {
                    return self.error_token(codes::UNTERMINATED_STRING, "Unterminated string literal");
                }
                match self.escape() {
                    Ok(c) => value.push(c),
                    Err(message) => {
                        return self.error_token(codes::UNTERMINATED_STRING, &message);
                    }
                }
            } else {
                value.push(self.advance());
            }
        }

        if self.is_at_end() {
            return self.error_token(codes::UNTERMINATED_STRING, "Unterminated string literal");
        }

        self.advance();
        self.make_token(TokenKind::String, &value)
    }

    /// Decode the escape after a consumed backslash
    fn escape(&mut self) -> Result<char, String> {
        let c = self.advance();
        let decoded = match c {
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            'b' => '\u{8}',
            'f' => '\u{c}',
            'v' => '\u{b}',
            '0' => '\0',
            '\\' | '\'' | '"' | '`' | '$' | '/' => c,
            '\n' => return Err("Line continuations are not supported".to_string()),
            'u' => {
                let mut code = 0u32;
                for _ in 0..4 {
                    let digit = self.peek().to_digit(16).ok_or_else(|| {
                        "Invalid unicode escape, expected 4 hex digits".to_string()
                    })?;
                    self.advance();
                    code = code * 16 + digit;
                }
                char::from_u32(code).ok_or_else(|| format!("Invalid unicode escape '\\u{:04x}'", code))?
            }
            other => return Err(format!("Invalid escape sequence '\\{}'", other)),
        };
        Ok(decoded)
    }

    /// Scan a template literal; the lexeme is the raw body between backticks
    fn template(&mut self) -> Token {
        let body_start = self.current;
        let mut depth = 0usize;

        while !self.is_at_end() {
            let c = self.peek();
            if depth == 0 && c == '`' {
                let body: String = self.chars[body_start..self.current].iter().collect();
                self.advance();
                return self.make_token(TokenKind::Template, &body);
            }
            if c == '\\' {
                self.advance();
                if !self.is_at_end() {
                    self.advance();
                }
                continue;
            }
            if depth == 0 && c == '$' && self.peek_next() == Some('{') {
                self.advance();
                self.advance();
                depth = 1;
                continue;
            }
            if depth > 0 {
                match c {
                    '{' => depth += 1,
                    '}' => depth -= 1,
                    '"' | '\'' => {
                        self.advance();
                        while !self.is_at_end() && self.peek() != c && self.peek() != '\n' {
                            if self.peek() == '\\' {
                                self.advance();
                            }
                            if !self.is_at_end() {
                                self.advance();
                            }
                        }
                    }
                    _ => {}
                }
            }
            if !self.is_at_end() {
                self.advance();
            }
        }

        self.error_token(codes::UNTERMINATED_TEMPLATE, "Unterminated template literal")
    }

    /// Scan a regex literal after its opening `/`
    fn regex(&mut self) -> Token {
        let mut in_class = false;

        loop {
            if self.is_at_end() || self.peek() == '\n' {
                return self.error_token(codes::UNTERMINATED_REGEX, "Unterminated regex literal");
            }
            let c = self.advance();
            match c {
                '\\' => {
                    if self.is_at_end() || self.peek() == '\n' {
                        return self.error_token(codes::UNTERMINATED_REGEX, "Unterminated regex literal");
                    }
                    self.advance();
                }
                '[' => in_class = true,
                ']' => in_class = false,
                '/' if !in_class => break,
                _ => {}
            }
        }

        while !self.is_at_end() && self.peek().is_ascii_alphabetic() {
            self.advance();
        }

        let lexeme: String = self.chars[self.start_pos..self.current].iter().collect();
        self.make_token(TokenKind::Regex, &lexeme)
    }

    /// Scan a number literal (integer, decimal, exponent or hex)
    fn number(&mut self) -> Token {
        let start = self.start_pos;

        if self.chars[start] == '0' && matches!(self.peek(), 'x' | 'X') {
            self.advance();
            while self.peek().is_ascii_hexdigit() {
                self.advance();
            }
        } else {
            while self.peek().is_ascii_digit() {
                self.advance();
            }

            if self.peek() == '.' && self.chars[start] != '.' {
                self.advance();
                while self.peek().is_ascii_digit() {
                    self.advance();
                }
            }

            if matches!(self.peek(), 'e' | 'E') {
                let exponent_follows = match self.peek_next() {
                    Some(c) if c.is_ascii_digit() => true,
                    Some('+') | Some('-') => self
                        .chars
                        .get(self.current + 2)
                        .is_some_and(|c| c.is_ascii_digit()),
                    _ => false,
                };
                if exponent_follows {
                    self.advance();
                    if matches!(self.peek(), '+' | '-') {
                        self.advance();
                    }
                    while self.peek().is_ascii_digit() {
                        self.advance();
                    }
                }
            }
        }

        if self.peek().is_alphabetic() || self.peek() == '_' {
            while self.peek().is_alphanumeric() || self.peek() == '_' {
                self.advance();
            }
            return self.error_token(codes::INVALID_NUMBER, "Invalid number literal");
        }

        let lexeme: String = self.chars[start..self.current].iter().collect();
        self.make_token(TokenKind::Number, &lexeme)
    }

    /// Scan an identifier or keyword
    fn identifier(&mut self) -> Token {
        let start = self.start_pos;

        while !self.is_at_end() {
            let c = self.peek();
            if c.is_alphanumeric() || c == '_' || c == '$' {
                self.advance();
            } else {
                break;
            }
        }

        let lexeme: String = self.chars[start..self.current].iter().collect();
        let kind = TokenKind::is_keyword(&lexeme).unwrap_or(TokenKind::Identifier);

        self.make_token(kind, &lexeme)
    }

    // === Character navigation ===

    /// Advance to next character and return it
    fn advance(&mut self) -> char {
        let c = self.chars[self.current];
        self.current += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        c
    }

    /// Peek at current character without advancing
    fn peek(&self) -> char {
        if self.is_at_end() {
            '\0'
        } else {
            self.chars[self.current]
        }
    }

    /// Peek at next character (current + 1)
    fn peek_next(&self) -> Option<char> {
        self.chars.get(self.current + 1).copied()
    }

    /// Check if current character matches expected, and advance if so
    fn match_char(&mut self, expected: char) -> bool {
        if self.is_at_end() || self.chars[self.current] != expected {
            false
        } else {
            self.advance();
            true
        }
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.chars.len()
    }

    // === Token creation ===

    fn current_span(&self) -> Span {
        Span::new(
            self.start_pos,
            self.current.max(self.start_pos),
            self.start_line,
            self.start_column,
        )
    }

    fn make_token(&self, kind: TokenKind, lexeme: &str) -> Token {
        Token::new(kind, lexeme, self.current_span())
    }

    /// Create an error token and record a diagnostic
    fn error_token(&mut self, code: &str, message: &str) -> Token {
        let mut span = self.current_span();
        span.end = span.end.max(span.start + 1);

        self.diagnostics.push(
            Diagnostic::error_with_code(code, message, span)
                .with_source(&self.source)
                .with_label("lexer error"),
        );

        Token::new(TokenKind::Error, message, span)
    }
}
