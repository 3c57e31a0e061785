//! Textual IR listings
//!
//! A line-oriented, round-trippable rendering of a [`Program`](super::Program), used by
//! the test fixtures and the `oolong fmt` command.
//!
//! # Structure
//!
//! - `lexer`: logos tokenizer
//! - `printer`: [`print`]
//! - `parser`: [`parse`]
//!
//! # Example
//!
//! ```text
//! $0
//!     %a := 3
//!     %b := 2
//!     %c := %a + %b as int
//!     return %c
//! ```

mod lexer;
mod parser;
mod printer;

pub use parser::parse;
pub use printer::print;

use thiserror::Error;

/// A malformed listing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at offset {offset}")]
pub struct ListingParseError {
    /// What went wrong
    pub message: String,
    /// Byte offset into the listing text
    pub offset: usize,
}

impl ListingParseError {
    /// Error at byte `offset`
    pub fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }

    /// 1-based (row, column) of the error within `source`
    pub fn position_in(&self, source: &str) -> (usize, usize) {
        let offset = self.offset.min(source.len());
        let before = &source[..offset];
        let row = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
        let column = before[line_start..].chars().count() + 1;
        (row, column)
    }
}

/// Whether `name` can be written after `%` or `$` without escaping
pub(crate) fn is_plain_label(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_in() {
        let source = "$0\n    nop\n    bogus\n";
        let err = ListingParseError::new("Unknown instruction", source.find("bogus").expect("present"));
        assert_eq!(err.position_in(source), (3, 5));
        assert_eq!(ListingParseError::new("x", 0).position_in(source), (1, 1));
    }

    #[test]
    fn test_plain_labels() {
        assert!(is_plain_label("loop_1"));
        assert!(is_plain_label("12"));
        assert!(!is_plain_label("a.b"));
        assert!(!is_plain_label(""));
    }
}
