//! Indentation-aware lexer for the Sandpiper script language.
//!
//! The lexer produces a stream of [`Token`]s through the `try-next`
//! [`TryNextWithContext`] interface. Logical lines end with `Newline`, block
//! structure is expressed with `Indent` / `Dedent`, and newlines inside
//! brackets are joined implicitly.

mod indentation;
pub mod token;

use std::collections::VecDeque;

use try_next::TryNextWithContext;

pub use indentation::IndentationTracker;
pub use token::{keyword_or_name, Keyword, Token, TokenKind};

/// A lexical error with the 1-based position where it was detected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} (line {line}, column {column})")]
pub struct LexError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl LexError {
    pub fn new(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            line,
            column,
        }
    }
}

/// Prefix flags of a string literal.
#[derive(Debug, Clone, Copy, Default)]
struct StringPrefix {
    raw: bool,
    format: bool,
}

/// The Sandpiper lexer.
pub struct Lexer {
    input: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
    indentation: IndentationTracker,
    /// Open brackets with the position they were opened at.
    brackets: Vec<(char, usize, usize)>,
    /// Layout tokens waiting to be handed out.
    pending: VecDeque<Token>,
    at_line_start: bool,
    line_has_content: bool,
    finished: bool,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
            indentation: IndentationTracker::new(),
            brackets: Vec::new(),
            pending: VecDeque::new(),
            at_line_start: true,
            line_has_content: false,
            finished: false,
        }
    }

    fn current_char(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek_char(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.input.get(self.position + n).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.current_char()?;
        self.position += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn skip_inline_whitespace(&mut self) {
        while let Some(ch) = self.current_char() {
            if ch == ' ' || ch == '\t' || ch == '\x0c' {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn skip_comment(&mut self) {
        while let Some(ch) = self.current_char() {
            if ch == '\n' {
                break;
            }
            self.advance();
        }
    }

    /// Produce the next token, or `None` once `EndOfFile` has been handed out.
    pub fn next_token(&mut self) -> Result<Option<Token>, LexError> {
        loop {
            if let Some(token) = self.pending.pop_front() {
                return Ok(Some(token));
            }
            if self.finished {
                return Ok(None);
            }
            if self.at_line_start && self.brackets.is_empty() {
                self.lex_line_start()?;
                continue;
            }

            self.skip_inline_whitespace();
            let Some(ch) = self.current_char() else {
                self.finish()?;
                continue;
            };

            match ch {
                '#' => self.skip_comment(),
                '\r' => {
                    self.advance();
                }
                '\\' => self.line_continuation()?,
                '\n' => {
                    let (line, column) = (self.line, self.column);
                    self.advance();
                    if self.brackets.is_empty() {
                        self.at_line_start = true;
                        if self.line_has_content {
                            self.line_has_content = false;
                            return Ok(Some(Token::new(TokenKind::Newline, line, column)));
                        }
                    }
                }
                _ => {
                    let token = self.lex_token(ch)?;
                    self.line_has_content = true;
                    return Ok(Some(token));
                }
            }
        }
    }

    /// Measure the indentation of a new line, skipping blank and comment-only lines.
    fn lex_line_start(&mut self) -> Result<(), LexError> {
        let mut width = 0;
        while let Some(ch) = self.current_char() {
            if ch == ' ' || ch == '\t' || ch == '\x0c' {
                width = IndentationTracker::advance_width(width, ch);
                self.advance();
            } else {
                break;
            }
        }

        match self.current_char() {
            None => self.at_line_start = false,
            Some('#') => self.skip_comment(),
            Some('\n') | Some('\r') => {
                self.advance();
            }
            Some(_) => {
                self.at_line_start = false;
                let tokens = self.indentation.process_indentation(width, self.line)?;
                self.pending.extend(tokens);
            }
        }
        Ok(())
    }

    fn line_continuation(&mut self) -> Result<(), LexError> {
        let (line, column) = (self.line, self.column);
        self.advance();
        if self.current_char() == Some('\r') {
            self.advance();
        }
        match self.current_char() {
            Some('\n') => {
                self.advance();
                Ok(())
            }
            None => Err(LexError::new("unexpected EOF while parsing", line, column)),
            Some(_) => Err(LexError::new(
                "unexpected character after line continuation character",
                line,
                column,
            )),
        }
    }

    fn finish(&mut self) -> Result<(), LexError> {
        if let Some(&(open, line, column)) = self.brackets.last() {
            return Err(LexError::new(format!("'{}' was never closed", open), line, column));
        }
        if self.line_has_content {
            self.line_has_content = false;
            self.pending
                .push_back(Token::new(TokenKind::Newline, self.line, self.column));
        }
        let dedents = self.indentation.finalize(self.line);
        self.pending.extend(dedents);
        self.pending
            .push_back(Token::new(TokenKind::EndOfFile, self.line, self.column));
        self.finished = true;
        Ok(())
    }

    fn lex_token(&mut self, ch: char) -> Result<Token, LexError> {
        if ch.is_ascii_digit() || (ch == '.' && self.peek_char().is_some_and(|c| c.is_ascii_digit())) {
            return self.read_number();
        }
        if ch.is_alphabetic() || ch == '_' {
            return self.read_word();
        }
        if ch == '\'' || ch == '"' {
            return self.read_string(StringPrefix::default());
        }
        self.read_operator(ch)
    }

    fn read_word(&mut self) -> Result<Token, LexError> {
        let (line, column) = (self.line, self.column);
        let mut word = String::new();
        while let Some(ch) = self.current_char() {
            if ch.is_alphanumeric() || ch == '_' {
                word.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        if matches!(self.current_char(), Some('\'') | Some('"')) {
            let lowered = word.to_ascii_lowercase();
            let prefix = match lowered.as_str() {
                "r" => Some(StringPrefix { raw: true, format: false }),
                "u" => Some(StringPrefix::default()),
                "f" => Some(StringPrefix { raw: false, format: true }),
                "rf" | "fr" => Some(StringPrefix { raw: true, format: true }),
                "b" | "br" | "rb" => {
                    return Err(LexError::new("bytes literals are not supported", line, column));
                }
                _ => None,
            };
            if let Some(prefix) = prefix {
                let mut token = self.read_string(prefix)?;
                token.line = line;
                token.column = column;
                return Ok(token);
            }
        }

        Ok(Token::new(keyword_or_name(&word), line, column))
    }

    fn read_number(&mut self) -> Result<Token, LexError> {
        let (line, column) = (self.line, self.column);

        if self.current_char() == Some('0') {
            let radix = match self.peek_char() {
                Some('x') | Some('X') => Some(16),
                Some('o') | Some('O') => Some(8),
                Some('b') | Some('B') => Some(2),
                _ => None,
            };
            if let Some(radix) = radix {
                self.advance();
                self.advance();
                let mut digits = String::new();
                while let Some(ch) = self.current_char() {
                    if ch.is_digit(radix) {
                        digits.push(ch);
                    } else if ch != '_' {
                        break;
                    }
                    self.advance();
                }
                if digits.is_empty() {
                    return Err(LexError::new("invalid number literal", line, column));
                }
                let value = i64::from_str_radix(&digits, radix).map_err(|_| {
                    LexError::new("integer literal is too large", line, column)
                })?;
                return Ok(Token::new(TokenKind::Int(value), line, column));
            }
        }

        let mut text = String::new();
        let mut is_float = false;

        self.read_digits(&mut text);
        if self.current_char() == Some('.') {
            is_float = true;
            text.push('.');
            self.advance();
            self.read_digits(&mut text);
        }
        if matches!(self.current_char(), Some('e') | Some('E')) {
            let digit_follows = match self.peek_char() {
                Some(c) if c.is_ascii_digit() => true,
                Some('+') | Some('-') => self.peek_nth(2).is_some_and(|c| c.is_ascii_digit()),
                _ => false,
            };
            if digit_follows {
                is_float = true;
                text.push('e');
                self.advance();
                if let Some(sign @ ('+' | '-')) = self.current_char() {
                    text.push(sign);
                    self.advance();
                }
                self.read_digits(&mut text);
            }
        }

        match self.current_char() {
            Some('j') | Some('J') => {
                return Err(LexError::new("complex numbers are not supported", line, column));
            }
            Some(c) if c.is_alphanumeric() || c == '_' => {
                return Err(LexError::new("invalid decimal literal", line, column));
            }
            _ => {}
        }

        if is_float {
            let value: f64 = text
                .parse()
                .map_err(|_| LexError::new("invalid decimal literal", line, column))?;
            return Ok(Token::new(TokenKind::Float(value), line, column));
        }

        if text.len() > 1 && text.starts_with('0') && text.chars().any(|c| c != '0') {
            return Err(LexError::new(
                "leading zeros in decimal integer literals are not permitted",
                line,
                column,
            ));
        }
        let value: i64 = text
            .parse()
            .map_err(|_| LexError::new("integer literal is too large", line, column))?;
        Ok(Token::new(TokenKind::Int(value), line, column))
    }

    /// Read decimal digits, dropping `_` separators.
    fn read_digits(&mut self, text: &mut String) {
        while let Some(ch) = self.current_char() {
            if ch.is_ascii_digit() {
                text.push(ch);
            } else if ch != '_' {
                break;
            }
            self.advance();
        }
    }

    fn read_string(&mut self, prefix: StringPrefix) -> Result<Token, LexError> {
        let (line, column) = (self.line, self.column);
        let Some(quote) = self.current_char() else {
            return Err(LexError::new("unterminated string literal", line, column));
        };
        let triple = self.peek_char() == Some(quote) && self.peek_nth(2) == Some(quote);
        let opening = if triple { 3 } else { 1 };
        for _ in 0..opening {
            self.advance();
        }

        let unterminated = |detected: usize| {
            let what = if triple {
                "unterminated triple-quoted string literal"
            } else {
                "unterminated string literal"
            };
            LexError::new(format!("{} (detected at line {})", what, detected), line, column)
        };

        let mut value = String::new();
        loop {
            let Some(ch) = self.current_char() else {
                return Err(unterminated(self.line));
            };

            if ch == quote {
                if !triple {
                    self.advance();
                    break;
                }
                if self.peek_char() == Some(quote) && self.peek_nth(2) == Some(quote) {
                    self.advance();
                    self.advance();
                    self.advance();
                    break;
                }
                value.push(ch);
                self.advance();
                continue;
            }

            if ch == '\n' && !triple {
                return Err(unterminated(self.line));
            }

            if ch == '\\' {
                self.advance();
                let Some(escaped) = self.current_char() else {
                    return Err(unterminated(self.line));
                };
                if prefix.raw {
                    value.push('\\');
                    value.push(escaped);
                    self.advance();
                    continue;
                }
                self.advance();
                match escaped {
                    '\n' => {}
                    'n' => value.push('\n'),
                    't' => value.push('\t'),
                    'r' => value.push('\r'),
                    '0' => value.push('\0'),
                    'a' => value.push('\x07'),
                    'b' => value.push('\x08'),
                    'f' => value.push('\x0c'),
                    'v' => value.push('\x0b'),
                    '\\' => value.push('\\'),
                    '\'' => value.push('\''),
                    '"' => value.push('"'),
                    'x' => value.push(self.read_hex_escape(2, 'x')?),
                    'u' => value.push(self.read_hex_escape(4, 'u')?),
                    'U' => value.push(self.read_hex_escape(8, 'U')?),
                    other => {
                        value.push('\\');
                        value.push(other);
                    }
                }
                continue;
            }

            value.push(ch);
            self.advance();
        }

        let kind = if prefix.format {
            TokenKind::FString(value)
        } else {
            TokenKind::Str(value)
        };
        Ok(Token::new(kind, line, column))
    }

    fn read_hex_escape(&mut self, digits: usize, marker: char) -> Result<char, LexError> {
        let (line, column) = (self.line, self.column);
        let mut hex = String::new();
        for _ in 0..digits {
            match self.current_char() {
                Some(c) if c.is_ascii_hexdigit() => {
                    hex.push(c);
                    self.advance();
                }
                _ => {
                    return Err(LexError::new(
                        format!("truncated \\{} escape", marker),
                        line,
                        column,
                    ));
                }
            }
        }
        u32::from_str_radix(&hex, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| LexError::new(format!("invalid \\{} escape", marker), line, column))
    }

    fn read_operator(&mut self, ch: char) -> Result<Token, LexError> {
        let (line, column) = (self.line, self.column);
        let next = self.peek_char();
        let third = self.peek_nth(2);

        let (kind, width) = match (ch, next, third) {
            ('*', Some('*'), Some('=')) => (TokenKind::DoubleStarEq, 3),
            ('/', Some('/'), Some('=')) => (TokenKind::DoubleSlashEq, 3),
            ('<', Some('<'), Some('=')) => (TokenKind::Unsupported("<<=".into()), 3),
            ('>', Some('>'), Some('=')) => (TokenKind::Unsupported(">>=".into()), 3),
            ('.', Some('.'), Some('.')) => (TokenKind::Unsupported("...".into()), 3),
            ('*', Some('*'), _) => (TokenKind::DoubleStar, 2),
            ('/', Some('/'), _) => (TokenKind::DoubleSlash, 2),
            ('=', Some('='), _) => (TokenKind::EqEq, 2),
            ('!', Some('='), _) => (TokenKind::NotEq, 2),
            ('<', Some('='), _) => (TokenKind::LtEq, 2),
            ('>', Some('='), _) => (TokenKind::GtEq, 2),
            ('-', Some('>'), _) => (TokenKind::Arrow, 2),
            ('+', Some('='), _) => (TokenKind::PlusEq, 2),
            ('-', Some('='), _) => (TokenKind::MinusEq, 2),
            ('*', Some('='), _) => (TokenKind::StarEq, 2),
            ('/', Some('='), _) => (TokenKind::SlashEq, 2),
            ('%', Some('='), _) => (TokenKind::PercentEq, 2),
            ('<', Some('<'), _) | ('>', Some('>'), _) | (':', Some('='), _)
            | ('&', Some('='), _) | ('|', Some('='), _) | ('^', Some('='), _)
            | ('@', Some('='), _) => {
                let op: String = [ch, next.unwrap_or_default()].iter().collect();
                (TokenKind::Unsupported(op), 2)
            }
            ('+', _, _) => (TokenKind::Plus, 1),
            ('-', _, _) => (TokenKind::Minus, 1),
            ('*', _, _) => (TokenKind::Star, 1),
            ('/', _, _) => (TokenKind::Slash, 1),
            ('%', _, _) => (TokenKind::Percent, 1),
            ('<', _, _) => (TokenKind::Lt, 1),
            ('>', _, _) => (TokenKind::Gt, 1),
            ('=', _, _) => (TokenKind::Assign, 1),
            ('(', _, _) => (TokenKind::LParen, 1),
            (')', _, _) => (TokenKind::RParen, 1),
            ('[', _, _) => (TokenKind::LBracket, 1),
            (']', _, _) => (TokenKind::RBracket, 1),
            ('{', _, _) => (TokenKind::LBrace, 1),
            ('}', _, _) => (TokenKind::RBrace, 1),
            (',', _, _) => (TokenKind::Comma, 1),
            (':', _, _) => (TokenKind::Colon, 1),
            (';', _, _) => (TokenKind::Semicolon, 1),
            ('.', _, _) => (TokenKind::Dot, 1),
            ('&' | '|' | '^' | '~' | '@' | '!', _, _) => (TokenKind::Unsupported(ch.to_string()), 1),
            _ => {
                return Err(LexError::new(
                    format!("invalid character '{}' (U+{:04X})", ch, ch as u32),
                    line,
                    column,
                ));
            }
        };

        match ch {
            '(' | '[' | '{' => self.brackets.push((ch, line, column)),
            ')' | ']' | '}' => self.close_bracket(ch, line, column)?,
            _ => {}
        }

        for _ in 0..width {
            self.advance();
        }
        Ok(Token::new(kind, line, column))
    }

    fn close_bracket(&mut self, close: char, line: usize, column: usize) -> Result<(), LexError> {
        let expected_open = match close {
            ')' => '(',
            ']' => '[',
            _ => '{',
        };
        match self.brackets.pop() {
            None => Err(LexError::new(format!("unmatched '{}'", close), line, column)),
            Some((open, _, _)) if open != expected_open => Err(LexError::new(
                format!(
                    "closing parenthesis '{}' does not match opening parenthesis '{}'",
                    close, open
                ),
                line,
                column,
            )),
            Some(_) => Ok(()),
        }
    }
}

impl TryNextWithContext<()> for Lexer {
    type Item = Token;
    type Error = LexError;

    fn try_next_with_context(&mut self, _context: &mut ()) -> Result<Option<Self::Item>, Self::Error> {
        let result = self.next_token();
        if result.is_err() {
            self.finished = true;
            self.pending.clear();
        }
        result
    }
}

/// Create a new lexer over a string.
pub fn lex_str(input: &str) -> Lexer {
    Lexer::new(input)
}

/// Lex a whole source text, including the trailing `EndOfFile` token.
pub fn tokenize(input: &str) -> Result<Vec<Token>, LexError> {
    let mut lexer = lex_str(input);
    let mut tokens = Vec::new();
    while let Some(token) = lexer.try_next_with_context(&mut ())? {
        tokens.push(token);
    }
    Ok(tokens)
}
