//! Token types produced by the Sandpiper lexer.

use std::fmt;

/// Reserved words of the script language.
///
/// Some of these (`class`, `lambda`, `with`, ...) are reserved only so the
/// parser can reject them with a precise message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    False,
    None,
    True,
    And,
    As,
    Assert,
    Async,
    Await,
    Break,
    Class,
    Continue,
    Def,
    Del,
    Elif,
    Else,
    Except,
    Finally,
    For,
    From,
    Global,
    If,
    Import,
    In,
    Is,
    Lambda,
    Nonlocal,
    Not,
    Or,
    Pass,
    Raise,
    Return,
    Try,
    While,
    With,
    Yield,
}

impl Keyword {
    /// The source spelling of the keyword.
    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::False => "False",
            Keyword::None => "None",
            Keyword::True => "True",
            Keyword::And => "and",
            Keyword::As => "as",
            Keyword::Assert => "assert",
            Keyword::Async => "async",
            Keyword::Await => "await",
            Keyword::Break => "break",
            Keyword::Class => "class",
            Keyword::Continue => "continue",
            Keyword::Def => "def",
            Keyword::Del => "del",
            Keyword::Elif => "elif",
            Keyword::Else => "else",
            Keyword::Except => "except",
            Keyword::Finally => "finally",
            Keyword::For => "for",
            Keyword::From => "from",
            Keyword::Global => "global",
            Keyword::If => "if",
            Keyword::Import => "import",
            Keyword::In => "in",
            Keyword::Is => "is",
            Keyword::Lambda => "lambda",
            Keyword::Nonlocal => "nonlocal",
            Keyword::Not => "not",
            Keyword::Or => "or",
            Keyword::Pass => "pass",
            Keyword::Raise => "raise",
            Keyword::Return => "return",
            Keyword::Try => "try",
            Keyword::While => "while",
            Keyword::With => "with",
            Keyword::Yield => "yield",
        }
    }
}

/// Kind of a token, with its decoded payload where it has one.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    Name(String),
    Int(i64),
    Float(f64),
    /// String literal with escapes already decoded.
    Str(String),
    /// f-string literal: escapes decoded, replacement fields still raw.
    FString(String),
    Keyword(Keyword),

    // Operators
    Plus,        // +
    Minus,       // -
    Star,        // *
    DoubleStar,  // **
    Slash,       // /
    DoubleSlash, // //
    Percent,     // %
    EqEq,        // ==
    NotEq,       // !=
    Lt,          // <
    Gt,          // >
    LtEq,        // <=
    GtEq,        // >=
    Assign,      // =
    PlusEq,      // +=
    MinusEq,     // -=
    StarEq,      // *=
    SlashEq,     // /=
    DoubleSlashEq, // //=
    PercentEq,   // %=
    DoubleStarEq, // **=
    Arrow,       // ->

    // Delimiters
    LParen,    // (
    RParen,    // )
    LBracket,  // [
    RBracket,  // ]
    LBrace,    // {
    RBrace,    // }
    Comma,     // ,
    Colon,     // :
    Semicolon, // ;
    Dot,       // .

    /// Valid punctuation the language does not implement (`&`, `|`, `<<`, `:=`, ...).
    Unsupported(String),

    // Layout
    Newline,
    Indent,
    Dedent,
    EndOfFile,
}

impl TokenKind {
    /// Whether this token ends or opens a logical line rather than carrying content.
    pub fn is_layout(&self) -> bool {
        matches!(
            self,
            TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent | TokenKind::EndOfFile
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TokenKind::Name(name) => return write!(f, "name '{}'", name),
            TokenKind::Int(n) => return write!(f, "number {}", n),
            TokenKind::Float(n) => return write!(f, "number {}", n),
            TokenKind::Str(_) | TokenKind::FString(_) => "string literal",
            TokenKind::Keyword(kw) => return write!(f, "'{}'", kw.as_str()),
            TokenKind::Unsupported(op) => return write!(f, "'{}'", op),
            TokenKind::Plus => "'+'",
            TokenKind::Minus => "'-'",
            TokenKind::Star => "'*'",
            TokenKind::DoubleStar => "'**'",
            TokenKind::Slash => "'/'",
            TokenKind::DoubleSlash => "'//'",
            TokenKind::Percent => "'%'",
            TokenKind::EqEq => "'=='",
            TokenKind::NotEq => "'!='",
            TokenKind::Lt => "'<'",
            TokenKind::Gt => "'>'",
            TokenKind::LtEq => "'<='",
            TokenKind::GtEq => "'>='",
            TokenKind::Assign => "'='",
            TokenKind::PlusEq => "'+='",
            TokenKind::MinusEq => "'-='",
            TokenKind::StarEq => "'*='",
            TokenKind::SlashEq => "'/='",
            TokenKind::DoubleSlashEq => "'//='",
            TokenKind::PercentEq => "'%='",
            TokenKind::DoubleStarEq => "'**='",
            TokenKind::Arrow => "'->'",
            TokenKind::LParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::LBracket => "'['",
            TokenKind::RBracket => "']'",
            TokenKind::LBrace => "'{'",
            TokenKind::RBrace => "'}'",
            TokenKind::Comma => "','",
            TokenKind::Colon => "':'",
            TokenKind::Semicolon => "';'",
            TokenKind::Dot => "'.'",
            TokenKind::Newline => "newline",
            TokenKind::Indent => "indent",
            TokenKind::Dedent => "dedent",
            TokenKind::EndOfFile => "end of file",
        };
        f.write_str(text)
    }
}

/// A token with the (1-based) position of its first character.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}

impl Token {
    pub fn new(kind: TokenKind, line: usize, column: usize) -> Self {
        Self { kind, line, column }
    }
}

/// Classify a word as a keyword or a plain name.
pub fn keyword_or_name(word: &str) -> TokenKind {
    let kw = match word {
        "False" => Keyword::False,
        "None" => Keyword::None,
        "True" => Keyword::True,
        "and" => Keyword::And,
        "as" => Keyword::As,
        "assert" => Keyword::Assert,
        "async" => Keyword::Async,
        "await" => Keyword::Await,
        "break" => Keyword::Break,
        "class" => Keyword::Class,
        "continue" => Keyword::Continue,
        "def" => Keyword::Def,
        "del" => Keyword::Del,
        "elif" => Keyword::Elif,
        "else" => Keyword::Else,
        "except" => Keyword::Except,
        "finally" => Keyword::Finally,
        "for" => Keyword::For,
        "from" => Keyword::From,
        "global" => Keyword::Global,
        "if" => Keyword::If,
        "import" => Keyword::Import,
        "in" => Keyword::In,
        "is" => Keyword::Is,
        "lambda" => Keyword::Lambda,
        "nonlocal" => Keyword::Nonlocal,
        "not" => Keyword::Not,
        "or" => Keyword::Or,
        "pass" => Keyword::Pass,
        "raise" => Keyword::Raise,
        "return" => Keyword::Return,
        "try" => Keyword::Try,
        "while" => Keyword::While,
        "with" => Keyword::With,
        "yield" => Keyword::Yield,
        _ => return TokenKind::Name(word.to_string()),
    };
    TokenKind::Keyword(kw)
}
