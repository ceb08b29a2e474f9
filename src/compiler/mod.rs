//! # LLVM IR to JVM Compiler
//!
//! Compiles textual LLVM IR into a single JVM class file whose methods run
//! against a flat-memory runtime class.
//!
//! ## Architecture
//!
//! ```text
//! IR text → tokens → Program → CompilationContext (types, signatures,
//! static data) → bytecode per function → class file → structural check
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use llvm2jvm::compiler::{Compiler, CompileOptions};
//!
//! let source = std::fs::read_to_string("sum.ll")?;
//! let compiler = Compiler::new(CompileOptions::default());
//! let result = compiler.compile(&source)?;
//! std::fs::write("Main.class", result.class_bytes)?;
//! ```

pub mod batch;
pub mod codegen;
pub mod context;
pub mod debug;
pub mod heap_writer;
pub mod jvm;
pub mod layout;
pub mod runtime;
pub mod verifier;

pub use batch::{compile_batch, BatchInput};
pub use codegen::{generate, GeneratedClass};
pub use context::{jvm_identifier, CompilationContext, FunctionSig, GlobalInfo};
pub use debug::{disassemble_class, dump_program, hex_dump_static_data};
pub use heap_writer::{FixupId, HeapWriter, Reloc, StaticData};
pub use layout::{DataLayout, GepStep, TypeTable};
pub use verifier::{ClassFile, Verifier, VerifyError, VerifyResult};

use crate::parser::{parse_str, Program};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Oldest class file version accepted (Java 5, no stack map frames)
pub const MIN_CLASS_VERSION: u16 = 49;
/// Newest class file version accepted (Java 6, verifier failover allowed)
pub const MAX_CLASS_VERSION: u16 = 50;

/// Compilation options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompileOptions {
    /// Dotted name of the generated class
    pub class_name: String,
    /// Internal name of the runtime support class
    pub runtime_class: String,
    /// Class file major version
    pub class_version: u16,
    /// Memory layout for static data and address arithmetic
    pub data_layout: DataLayout,
    /// Emit `main(String[])` calling the runtime bootstrap
    pub emit_bootstrap: bool,
    /// Re-read the produced class and check its structure
    pub verify: bool,
    /// Worker threads for `compile_batch` (0 = one per CPU)
    pub batch_threads: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            class_name: "Main".to_string(),
            runtime_class: "com/jtransc/llvm2jvm/LlvmRuntime".to_string(),
            class_version: MIN_CLASS_VERSION,
            data_layout: DataLayout::Packed32,
            emit_bootstrap: true,
            verify: true,
            batch_threads: 0,
        }
    }
}

impl CompileOptions {
    /// Parses options from JSON; absent fields keep their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let options: CompileOptions = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    /// Rejects option combinations that cannot produce a loadable class
    pub fn validate(&self) -> Result<()> {
        if !(MIN_CLASS_VERSION..=MAX_CLASS_VERSION).contains(&self.class_version) {
            return Err(Error::ConfigError(format!(
                "class_version {} outside {}..={}",
                self.class_version, MIN_CLASS_VERSION, MAX_CLASS_VERSION
            )));
        }
        if self.class_name.is_empty() || self.class_name.contains('/') {
            return Err(Error::ConfigError(format!(
                "class_name '{}' must be a non-empty dotted name",
                self.class_name
            )));
        }
        if self.runtime_class.is_empty() || self.runtime_class.contains('.') {
            return Err(Error::ConfigError(format!(
                "runtime_class '{}' must be an internal name like a/b/C",
                self.runtime_class
            )));
        }
        Ok(())
    }
}

/// Compilation result with metadata
#[derive(Debug, Clone)]
pub struct CompileResult {
    /// Class file bytes
    pub class_bytes: Vec<u8>,
    /// Internal name of the class
    pub class_name: String,
    /// Methods in the class, synthetic ones included
    pub method_count: usize,
    /// Fields in the class, `STATIC_DATA` included
    pub field_count: usize,
    /// Size of the packed static data
    pub static_data_len: usize,
    /// Warnings generated during compilation
    pub warnings: Vec<String>,
}

/// LLVM IR to JVM class compiler
pub struct Compiler {
    options: CompileOptions,
}

impl Compiler {
    /// Create a new compiler with options
    pub fn new(options: CompileOptions) -> Self {
        Self { options }
    }

    /// Options in effect
    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Compile IR text into a class named `options.class_name`
    pub fn compile(&self, source: &str) -> Result<CompileResult> {
        // Phase 1: Parse
        let program = parse_str(source, &self.options.class_name)?;

        // Phase 2: Generate
        self.compile_program(&program)
    }

    /// Compile an already parsed module into a class named after it
    pub fn compile_program(&self, program: &Program) -> Result<CompileResult> {
        self.options.validate()?;
        tracing::debug!(module = %program.module_name, decls = program.decls.len(), "compiling module");

        let generated = generate(program, &self.options)?;

        // Phase 3: Verify
        let mut warnings = generated.warnings;
        if self.options.verify {
            let verification = Verifier::new().verify(&generated.bytes);
            if !verification.valid {
                let messages: Vec<String> =
                    verification.errors.iter().map(|e| e.to_string()).collect();
                return Err(Error::class_format(format!(
                    "Verification failed: {}",
                    messages.join("; ")
                )));
            }
            warnings.extend(verification.warnings);
        }

        Ok(CompileResult {
            class_bytes: generated.bytes,
            class_name: generated.class_name,
            method_count: generated.method_count,
            field_count: generated.field_count,
            static_data_len: generated.static_data_len,
            warnings,
        })
    }
}
