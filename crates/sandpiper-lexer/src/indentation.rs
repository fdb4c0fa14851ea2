//! Indentation tracking for indentation-based blocks.

use crate::token::{Token, TokenKind};
use crate::LexError;

/// Width of a tab stop when measuring indentation.
const TAB_WIDTH: usize = 8;

/// Tracks the stack of open indentation levels and turns level changes into
/// INDENT / DEDENT tokens.
#[derive(Debug)]
pub struct IndentationTracker {
    /// Stack of indentation widths; the bottom entry is always 0.
    indent_stack: Vec<usize>,
}

impl IndentationTracker {
    pub fn new() -> Self {
        IndentationTracker {
            indent_stack: vec![0],
        }
    }

    /// Process the indentation of a new logical line.
    ///
    /// Emits one INDENT for a deeper level, or as many DEDENTs as levels were
    /// closed. A dedent that lands between two open levels is an error.
    pub fn process_indentation(
        &mut self,
        width: usize,
        line: usize,
    ) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        let current = self.current();

        if width > current {
            self.indent_stack.push(width);
            tokens.push(Token::new(TokenKind::Indent, line, 1));
        } else if width < current {
            while self.current() > width {
                self.indent_stack.pop();
                tokens.push(Token::new(TokenKind::Dedent, line, width + 1));
            }
            if self.current() != width {
                return Err(LexError::new(
                    "unindent does not match any outer indentation level",
                    line,
                    width + 1,
                ));
            }
        }

        Ok(tokens)
    }

    /// Close every open level at end of input.
    pub fn finalize(&mut self, line: usize) -> Vec<Token> {
        let mut tokens = Vec::new();
        while self.indent_stack.len() > 1 {
            self.indent_stack.pop();
            tokens.push(Token::new(TokenKind::Dedent, line, 1));
        }
        tokens
    }

    fn current(&self) -> usize {
        self.indent_stack.last().copied().unwrap_or(0)
    }

    /// Width contributed by one leading whitespace character at `width`.
    pub fn advance_width(width: usize, ch: char) -> usize {
        match ch {
            '\t' => (width / TAB_WIDTH + 1) * TAB_WIDTH,
            '\x0c' => 0,
            _ => width + 1,
        }
    }
}

impl Default for IndentationTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indent_then_dedent() {
        let mut tracker = IndentationTracker::new();
        let tokens = tracker.process_indentation(4, 2).unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Indent);

        let tokens = tracker.process_indentation(0, 3).unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Dedent);
    }

    #[test]
    fn test_multiple_dedents() {
        let mut tracker = IndentationTracker::new();
        tracker.process_indentation(2, 2).unwrap();
        tracker.process_indentation(4, 3).unwrap();
        let tokens = tracker.process_indentation(0, 4).unwrap();
        assert_eq!(tokens.len(), 2);
        assert!(tokens.iter().all(|t| t.kind == TokenKind::Dedent));
    }

    #[test]
    fn test_mismatched_dedent_is_error() {
        let mut tracker = IndentationTracker::new();
        tracker.process_indentation(4, 2).unwrap();
        let err = tracker.process_indentation(2, 3).unwrap_err();
        assert!(err.message.contains("unindent does not match"));
        assert_eq!(err.line, 3);
    }

    #[test]
    fn test_tab_width() {
        assert_eq!(IndentationTracker::advance_width(0, '\t'), 8);
        assert_eq!(IndentationTracker::advance_width(3, '\t'), 8);
        assert_eq!(IndentationTracker::advance_width(8, ' '), 9);
    }

    #[test]
    fn test_finalize_closes_levels() {
        let mut tracker = IndentationTracker::new();
        tracker.process_indentation(4, 2).unwrap();
        tracker.process_indentation(8, 3).unwrap();
        assert_eq!(tracker.finalize(4).len(), 2);
        assert!(tracker.finalize(4).is_empty());
    }
}
