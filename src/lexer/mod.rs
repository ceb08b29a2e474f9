//! Lexical analysis for LLVM IR text
//!
//! Converts source text into a flat stream of tokens: operators, identifiers
//! (which include keywords and numbers), and quoted strings.

mod ll_scanner;
mod token;

pub use ll_scanner::{tokenize, LlScanner};
pub use token::{Token, TokenKind, OPERATORS};
