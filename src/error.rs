//! Error types for the llvm2jvm compiler

use thiserror::Error;

/// Compilation errors
///
/// Every variant is fatal: compilation either produces a complete class file
/// or stops with one of these.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // Lexer errors
    /// Character outside the IR alphabet
    ///
    /// **Triggered by:** Any byte that is not whitespace, an operator, a quote,
    /// an identifier character or a `;` comment
    /// **Example:** `define i32 @f() { ^ }`
    #[error("Lex error at line {line}, column {col}: unexpected character '{ch}'")]
    LexError {
        /// Line number where error occurred
        line: usize,
        /// Column number where error occurred
        col: usize,
        /// Offending character
        ch: char,
    },

    // Parse errors
    /// Syntax error encountered during parsing
    ///
    /// **Triggered by:** Unknown opcodes, missing punctuation, malformed types
    /// **Example:** `%1 = frobnicate i32 %0`
    #[error("Syntax error at line {line}, column {col} near '{token}': {message}")]
    SyntaxError {
        /// Line number where error occurred
        line: usize,
        /// Column number where error occurred
        col: usize,
        /// Lexeme of the offending token
        token: String,
        /// Error description
        message: String,
    },

    /// Unexpected end of file during parsing
    #[error("Unexpected end of file: {context}")]
    UnexpectedEof {
        /// What the parser was reading when the input ran out
        context: String,
    },

    // Layout errors
    /// Static data layout could not be completed
    ///
    /// **Triggered by:** A fix-up naming a global that was never registered,
    /// or a struct reference with no matching `%name = type` definition
    #[error("Layout error: {0}")]
    LayoutError(String),

    // Code generation errors
    /// Syntactically valid construct the code generator does not lower
    ///
    /// **Triggered by:** Floating point types, unknown intrinsics, unsupported
    /// width conversions, `store i64`
    #[error("Not implemented: {construct}")]
    Unsupported {
        /// Description of the rejected construct
        construct: String,
    },

    /// Register read before any statement bound it
    #[error("Undefined register %{name} in function @{function}")]
    UndefinedRegister {
        /// Register name without the `%` sigil
        name: String,
        /// Function being compiled
        function: String,
    },

    /// Branch to a label that never appears in the function body
    #[error("Undefined label %{name} in function @{function}")]
    UndefinedLabel {
        /// Label name without the `%` sigil
        name: String,
        /// Function being compiled
        function: String,
    },

    /// Call to a function with no `declare` or `define`
    #[error("Cannot find function declaration @{name}")]
    UndefinedFunction {
        /// Callee name without the `@` sigil
        name: String,
    },

    /// Reference to a global variable that was never defined
    #[error("Cannot find global @{name}")]
    UndefinedGlobal {
        /// Global name without the `@` sigil
        name: String,
    },

    // Emission errors
    /// The class file format cannot represent the generated code
    ///
    /// **Triggered by:** Constant pool overflow, methods over 64KB, branch
    /// offsets beyond 16 bits, operand stack shape mismatch at a merge point
    #[error("Class format error: {0}")]
    ClassFormat(String),

    /// Malformed class file handed to the reader
    #[error("Invalid class file at byte {offset}: {message}")]
    InvalidClassFile {
        /// Byte offset where decoding failed
        offset: usize,
        /// Error description
        message: String,
    },

    /// Invalid compiler configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}

/// Pipeline phase that produced an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Tokenization
    Lex,
    /// Recursive-descent parsing
    Parse,
    /// Static data layout and fix-ups
    Layout,
    /// Instruction selection
    Codegen,
    /// Class file encoding and reading
    Emit,
    /// Option handling
    Config,
}

impl Error {
    /// Create an unsupported-construct error
    pub fn unsupported(construct: impl Into<String>) -> Self {
        Error::Unsupported {
            construct: construct.into(),
        }
    }

    /// Create a layout error with a message
    pub fn layout(msg: impl Into<String>) -> Self {
        Error::LayoutError(msg.into())
    }

    /// Create a class format error with a message
    pub fn class_format(msg: impl Into<String>) -> Self {
        Error::ClassFormat(msg.into())
    }

    /// Classify the pipeline phase this error belongs to
    pub fn phase(&self) -> Phase {
        match self {
            Error::LexError { .. } => Phase::Lex,
            Error::SyntaxError { .. } | Error::UnexpectedEof { .. } => Phase::Parse,
            Error::LayoutError(_) => Phase::Layout,
            Error::Unsupported { .. }
            | Error::UndefinedRegister { .. }
            | Error::UndefinedLabel { .. }
            | Error::UndefinedFunction { .. }
            | Error::UndefinedGlobal { .. } => Phase::Codegen,
            Error::ClassFormat(_) | Error::InvalidClassFile { .. } => Phase::Emit,
            Error::ConfigError(_) => Phase::Config,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::ConfigError(err.to_string())
    }
}

/// Result type for llvm2jvm operations
pub type Result<T> = std::result::Result<T, Error>;
