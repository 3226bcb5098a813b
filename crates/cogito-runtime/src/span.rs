//! Source locations

use serde::{Deserialize, Serialize};

/// A byte range in the source text plus the 1-based line/column of its start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    #[serde(default = "one")]
    pub line: usize,
    #[serde(default = "one")]
    pub column: usize,
}

fn one() -> usize {
    1
}

impl Span {
    pub fn new(start: usize, end: usize, line: usize, column: usize) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }

    /// Span used for nodes with no source position (e.g. a JSON AST without locations)
    pub fn dummy() -> Self {
        Self::new(0, 0, 1, 1)
    }

    /// Combine two spans, keeping the start position of `self`
    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            line: self.line,
            column: self.column,
        }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Span {
    fn default() -> Self {
        Self::dummy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_keeps_first_position() {
        let a = Span::new(4, 6, 2, 3);
        let b = Span::new(10, 14, 2, 9);
        let merged = a.merge(b);
        assert_eq!(merged, Span::new(4, 14, 2, 3));
        assert_eq!(merged.len(), 10);
    }

    #[test]
    fn test_missing_position_defaults() {
        let span: Span = serde_json::from_str(r#"{"start":1,"end":2}"#).unwrap();
        assert_eq!(span.line, 1);
        assert_eq!(span.column, 1);
    }
}
