//! Diagnostic system for errors and warnings
//!
//! Syntax errors from the parser and compile errors from the compiler share
//! one Diagnostic type so every front-end reports them the same way.

use crate::span::Span;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Diagnostic codes
///
/// `CG1xxx` are syntax errors, `CG2xxx` compile errors, `CW2xxx` compile warnings.
pub mod codes {
    pub const UNEXPECTED_CHARACTER: &str = "CG1001";
    pub const UNTERMINATED_STRING: &str = "CG1002";
    pub const UNTERMINATED_TEMPLATE: &str = "CG1003";
    pub const UNTERMINATED_REGEX: &str = "CG1004";
    pub const INVALID_NUMBER: &str = "CG1005";
    pub const UNTERMINATED_COMMENT: &str = "CG1006";
    pub const UNEXPECTED_TOKEN: &str = "CG1010";
    pub const INVALID_JSON_AST: &str = "CG1020";

    pub const BREAK_OUTSIDE_LOOP: &str = "CG2001";
    pub const CONTINUE_OUTSIDE_LOOP: &str = "CG2002";
    pub const UNSUPPORTED_SYNTAX: &str = "CG2003";
    pub const UNKNOWN_METHOD: &str = "CG2004";
    pub const DUPLICATE_FUNCTION: &str = "CG2005";
    pub const BAD_ARGUMENTS: &str = "CG2006";
    pub const INVALID_ASSIGNMENT: &str = "CG2007";
    pub const INTERNAL: &str = "CG2099";

    pub const EXTRA_DECLARATORS: &str = "CW2101";
}

/// Severity level of a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    /// Fatal error that prevents compilation
    Error,
    /// Warning that doesn't prevent compilation
    Warning,
}

impl fmt::Display for DiagnosticLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticLevel::Error => write!(f, "error"),
            DiagnosticLevel::Warning => write!(f, "warning"),
        }
    }
}

/// A diagnostic message (error or warning)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Severity level
    pub level: DiagnosticLevel,
    /// Error code (e.g., "CG2001")
    pub code: String,
    /// Main diagnostic message
    pub message: String,
    /// Line number (1-based)
    pub line: usize,
    /// Column number (1-based)
    pub column: usize,
    /// Length of error span
    pub length: usize,
    /// Source line string
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub snippet: String,
    /// Short label for caret range
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub label: String,
    /// Suggested fix (optional)
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub help: Option<String>,
}

impl Diagnostic {
    fn with_level(
        level: DiagnosticLevel,
        code: impl Into<String>,
        message: impl Into<String>,
        span: Span,
    ) -> Self {
        Self {
            level,
            code: code.into(),
            message: message.into(),
            line: span.line,
            column: span.column,
            length: span.len(),
            snippet: String::new(),
            label: String::new(),
            help: None,
        }
    }

    /// Create a new error diagnostic with code
    pub fn error_with_code(
        code: impl Into<String>,
        message: impl Into<String>,
        span: Span,
    ) -> Self {
        Self::with_level(DiagnosticLevel::Error, code, message, span)
    }

    /// Create a new warning diagnostic with code
    pub fn warning_with_code(
        code: impl Into<String>,
        message: impl Into<String>,
        span: Span,
    ) -> Self {
        Self::with_level(DiagnosticLevel::Warning, code, message, span)
    }

    /// Set the snippet (source line)
    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = snippet.into();
        self
    }

    /// Set the label (caret description)
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Add a help message
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Fill the snippet from the source line this diagnostic points at
    pub fn with_source(self, source: &str) -> Self {
        match source.lines().nth(self.line.saturating_sub(1)) {
            Some(line) => {
                let line = line.to_string();
                self.with_snippet(line)
            }
            None => self,
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == DiagnosticLevel::Error
    }

    /// Format as human-readable string
    pub fn to_human_string(&self, file: &str) -> String {
        let mut output = String::new();

        // error[CG2001]: 'break' not in loop
        output.push_str(&format!(
            "{}[{}]: {}\n",
            self.level, self.code, self.message
        ));
        output.push_str(&format!("  --> {}:{}:{}\n", file, self.line, self.column));

        if !self.snippet.is_empty() {
            output.push_str("   |\n");
            output.push_str(&format!("{:>2} | {}\n", self.line, self.snippet));

            if self.length > 0 {
                let padding = " ".repeat(self.column.saturating_sub(1));
                let carets = "^".repeat(self.length);
                output.push_str(&format!("   | {}{}", padding, carets));
                if !self.label.is_empty() {
                    output.push_str(&format!(" {}", self.label));
                }
                output.push('\n');
            }
        }

        if let Some(help) = &self.help {
            output.push_str(&format!("   = help: {}\n", help));
        }

        output
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}: {}[{}]: {}",
            self.line, self.column, self.level, self.code, self.message
        )
    }
}

/// Sort diagnostics by position, errors before warnings at the same spot
pub fn sort_diagnostics(diagnostics: &mut [Diagnostic]) {
    diagnostics.sort_by(|a, b| {
        (a.line, a.column, !a.is_error()).cmp(&(b.line, b.column, !b.is_error()))
    });
}
