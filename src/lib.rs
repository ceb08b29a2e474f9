//! # llvm2jvm - LLVM IR to JVM Bytecode
//!
//! Compiles the textual form of LLVM IR into a single JVM class file. Each
//! defined function becomes a `public static` method; globals live in a flat
//! little-endian memory owned by a runtime support class, and the generated
//! class hands its packed initializers to that runtime on load.
//!
//! ## Quick Start
//!
//! ```rust
//! use llvm2jvm::{CompileOptions, Compiler};
//!
//! # fn main() -> llvm2jvm::Result<()> {
//! let source = r#"
//!     define i32 @sum(i32 %a, i32 %b) {
//!       %1 = add nsw i32 %a, %b
//!       ret i32 %1
//!     }
//! "#;
//!
//! let compiler = Compiler::new(CompileOptions {
//!     class_name: "demo.Sum".into(),
//!     ..CompileOptions::default()
//! });
//! let result = compiler.compile(source)?;
//!
//! assert_eq!(result.class_name, "demo/Sum");
//! assert_eq!(&result.class_bytes[..4], &[0xca, 0xfe, 0xba, 0xbe]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Pipeline
//!
//! - [`lexer`] splits IR text into tokens
//! - [`parser`] builds a [`Program`] and offers a [`parser::Visitor`]
//! - [`compiler`] lays out static data, generates bytecode and writes the
//!   class file, then reads it back through a structural verifier
//!
//! The runtime class (`com/jtransc/llvm2jvm/LlvmRuntime` by default) is not
//! part of this crate; [`compiler::runtime`] fixes the methods it must
//! provide.
//!
//! ## Supported IR
//!
//! Integer types up to `i64`, pointers, arrays and structs; `alloca`,
//! `load`, `store`, `getelementptr`, integer arithmetic and `icmp`,
//! `select`, `phi`, `br`, `call` (including variadic calls), `sext`/`zext`/
//! `trunc`/`bitcast`, `ret` and `unreachable`. Floating point, exceptions,
//! vectors and debug metadata are outside its scope.

/// Version of the compiler
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod compiler;
pub mod error;
pub mod lexer;
pub mod parser;

// Re-export main types
pub use compiler::{
    compile_batch, BatchInput, CompileOptions, CompileResult, Compiler, DataLayout, Verifier,
    VerifyResult,
};
pub use error::{Error, Result};
pub use lexer::{tokenize, Token, TokenKind};
pub use parser::{parse_str, Decl, Program, Stm, Type, TypedValue, Value};

/// Compile IR text with default options into a class named `class_name`
pub fn compile_str(source: &str, class_name: &str) -> Result<CompileResult> {
    Compiler::new(CompileOptions {
        class_name: class_name.to_string(),
        ..CompileOptions::default()
    })
    .compile(source)
}
