use std::collections::VecDeque;

use sandpiper_lexer::{LexError, Token, TokenKind};
use try_next::TryNextWithContext;

/// Error type for the parser
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("{message} (line {line}, column {column})")]
    Lexer {
        message: String,
        line: usize,
        column: usize,
    },
    #[error("{message} (line {line}, column {column})")]
    Syntax {
        message: String,
        line: usize,
        column: usize,
    },
}

impl ParseError {
    pub fn syntax(message: impl Into<String>, line: usize, column: usize) -> Self {
        ParseError::Syntax {
            message: message.into(),
            line,
            column,
        }
    }

    /// Syntax error located at `token`.
    pub fn at(token: &Token, message: impl Into<String>) -> Self {
        Self::syntax(message, token.line, token.column)
    }

    pub fn message(&self) -> &str {
        match self {
            ParseError::Lexer { message, .. } | ParseError::Syntax { message, .. } => message,
        }
    }

    /// 1-based line of the error, 0 when unknown.
    pub fn line(&self) -> usize {
        match self {
            ParseError::Lexer { line, .. } | ParseError::Syntax { line, .. } => *line,
        }
    }

    pub fn column(&self) -> usize {
        match self {
            ParseError::Lexer { column, .. } | ParseError::Syntax { column, .. } => *column,
        }
    }
}

impl From<LexError> for ParseError {
    fn from(err: LexError) -> Self {
        ParseError::Lexer {
            message: err.message,
            line: err.line,
            column: err.column,
        }
    }
}

/// Adapter that wraps a Sandpiper lexer and gives the parser arbitrary
/// lookahead over its tokens.
pub struct TokenStream<L>
where
    L: TryNextWithContext<(), Item = Token, Error = LexError>,
{
    lexer: L,
    buffer: VecDeque<Token>,
    /// Position of the most recently consumed token, used for the synthetic
    /// end-of-file token once the lexer is exhausted.
    last_line: usize,
    last_column: usize,
}

impl<L> TokenStream<L>
where
    L: TryNextWithContext<(), Item = Token, Error = LexError>,
{
    pub fn new(lexer: L) -> Self {
        Self {
            lexer,
            buffer: VecDeque::new(),
            last_line: 1,
            last_column: 1,
        }
    }

    /// Make sure at least `n + 1` tokens are buffered.
    fn fill(&mut self, n: usize) -> Result<(), ParseError> {
        while self.buffer.len() <= n {
            let token = match self.lexer.try_next_with_context(&mut ())? {
                Some(token) => token,
                None => Token::new(TokenKind::EndOfFile, self.last_line, self.last_column),
            };
            self.buffer.push_back(token);
        }
        Ok(())
    }

    pub fn peek(&mut self) -> Result<&Token, ParseError> {
        self.peek_nth(0)
    }

    pub fn peek_nth(&mut self, n: usize) -> Result<&Token, ParseError> {
        self.fill(n)?;
        self.buffer
            .get(n)
            .ok_or_else(|| ParseError::syntax("unexpected end of input", self.last_line, self.last_column))
    }

    pub fn peek_kind(&mut self) -> Result<&TokenKind, ParseError> {
        Ok(&self.peek()?.kind)
    }

    pub fn next(&mut self) -> Result<Token, ParseError> {
        self.fill(0)?;
        match self.buffer.pop_front() {
            Some(token) => {
                self.last_line = token.line;
                self.last_column = token.column;
                Ok(token)
            }
            None => Ok(Token::new(TokenKind::EndOfFile, self.last_line, self.last_column)),
        }
    }

    /// Consume the next token if it has exactly this kind.
    pub fn eat(&mut self, kind: &TokenKind) -> Result<bool, ParseError> {
        if self.peek_kind()? == kind {
            self.next()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
