use serde::{Deserialize, Serialize};

/// A single token from the IR text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// The type of token
    pub kind: TokenKind,
    /// Original text of the token (string tokens hold the unquoted body)
    pub lexeme: String,
    /// Line number where token appears (1-indexed)
    pub line: usize,
    /// Column number where token starts (1-indexed)
    pub column: usize,
}

impl Token {
    /// Creates a new token with the given properties
    pub fn new(kind: TokenKind, lexeme: String, line: usize, column: usize) -> Self {
        Token {
            kind,
            lexeme,
            line,
            column,
        }
    }

    /// True if this token is the operator or identifier `text`.
    ///
    /// String literals never match, so `"define"` in quotes is not the keyword.
    pub fn is(&self, text: &str) -> bool {
        matches!(self.kind, TokenKind::Operator | TokenKind::Identifier) && self.lexeme == text
    }
}

/// All token classes produced by the scanner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    /// Punctuation from the fixed operator set
    Operator,
    /// Run of alphanumerics, `_` and `.` (keywords, names and numbers alike)
    Identifier,
    /// Double-quoted string, escapes left unprocessed
    String,
    /// End of input
    Eof,
}

/// Operators recognized by the scanner, longest first.
pub const OPERATORS: &[&str] = &[
    "...", "@", "$", "!", "%", ",", "=", "'", ":", "(", ")", "[", "]", "{", "}", "#", "*", "-",
    "+",
];
