use super::token::{Token, TokenKind, OPERATORS};
use crate::error::{Error, Result};

/// Scanner for textual LLVM IR
pub struct LlScanner {
    /// Source code as character vector
    source: Vec<char>,
    /// Accumulated tokens
    tokens: Vec<Token>,
    /// Current position in source
    current: usize,
    /// Current line number (1-indexed)
    line: usize,
    /// Current column number (1-indexed)
    column: usize,
}

impl LlScanner {
    /// Creates a new scanner over IR source text
    pub fn new(source: &str) -> Self {
        LlScanner {
            source: source.chars().collect(),
            tokens: Vec::new(),
            current: 0,
            line: 1,
            column: 1,
        }
    }

    /// Scans all tokens and returns them, terminated by an `Eof` token
    pub fn scan_tokens(&mut self) -> Result<Vec<Token>> {
        self.tokens.clear();
        while !self.is_at_end() {
            self.scan_token()?;
        }

        self.tokens.push(Token::new(
            TokenKind::Eof,
            String::new(),
            self.line,
            self.column,
        ));

        Ok(std::mem::take(&mut self.tokens))
    }

    fn scan_token(&mut self) -> Result<()> {
        let c = self.peek();

        if c.is_whitespace() || c == '\0' {
            self.advance();
            return Ok(());
        }

        if c == ';' {
            self.skip_line_comment();
            return Ok(());
        }

        if let Some(op) = self.match_operator() {
            let (line, column) = (self.line, self.column);
            for _ in 0..op.chars().count() {
                self.advance();
            }
            self.tokens
                .push(Token::new(TokenKind::Operator, op.to_string(), line, column));
            return Ok(());
        }

        match c {
            '"' => self.scan_string(),
            c if Self::is_identifier_char(c) => {
                self.scan_identifier();
                Ok(())
            }
            _ => Err(Error::LexError {
                line: self.line,
                col: self.column,
                ch: c,
            }),
        }
    }

    /// Longest operator starting at the cursor
    fn match_operator(&self) -> Option<&'static str> {
        OPERATORS.iter().copied().find(|op| {
            op.chars()
                .enumerate()
                .all(|(i, ch)| self.source.get(self.current + i) == Some(&ch))
        })
    }

    fn skip_line_comment(&mut self) {
        while !self.is_at_end() && self.peek() != '\n' {
            self.advance();
        }
    }

    fn scan_string(&mut self) -> Result<()> {
        let (line, column) = (self.line, self.column);
        self.advance(); // opening quote

        let mut value = String::new();
        while !self.is_at_end() && self.peek() != '"' {
            value.push(self.advance());
        }

        if self.is_at_end() {
            return Err(Error::UnexpectedEof {
                context: format!(
                    "unterminated string literal starting at line {}, column {}",
                    line, column
                ),
            });
        }
        self.advance(); // closing quote

        self.tokens
            .push(Token::new(TokenKind::String, value, line, column));
        Ok(())
    }

    fn scan_identifier(&mut self) {
        let (line, column) = (self.line, self.column);
        let mut text = String::new();
        while !self.is_at_end() && Self::is_identifier_char(self.peek()) {
            text.push(self.advance());
        }
        self.tokens
            .push(Token::new(TokenKind::Identifier, text, line, column));
    }

    fn is_identifier_char(c: char) -> bool {
        c.is_ascii_alphanumeric() || c == '_' || c == '.'
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    fn peek(&self) -> char {
        self.source.get(self.current).copied().unwrap_or('\0')
    }

    fn advance(&mut self) -> char {
        let c = self.peek();
        self.current += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        c
    }
}

/// Tokenize IR text in one call
pub fn tokenize(source: &str) -> Result<Vec<Token>> {
    LlScanner::new(source).scan_tokens()
}
