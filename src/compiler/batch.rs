//! Parallel compilation of independent modules
//!
//! Each module gets its own `Compiler` and `CompilationContext`; nothing is
//! shared between workers except the options.

use super::{CompileOptions, CompileResult, Compiler};
use crate::{Error, Result};
use rayon::prelude::*;

/// One module to compile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchInput {
    /// Dotted class name for this module
    pub module_name: String,
    /// IR text
    pub source: String,
}

impl BatchInput {
    /// Creates a batch entry
    pub fn new(module_name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            source: source.into(),
        }
    }
}

fn compile_one(input: &BatchInput, options: &CompileOptions) -> Result<CompileResult> {
    let options = CompileOptions {
        class_name: input.module_name.clone(),
        ..options.clone()
    };
    Compiler::new(options).compile(&input.source)
}

/// Compiles every input, returning one result per input in input order.
///
/// The outer error is reserved for failures of the batch itself (the
/// thread pool could not be built); a module that fails to compile only
/// fails its own entry.
pub fn compile_batch(
    inputs: &[BatchInput],
    options: &CompileOptions,
) -> Result<Vec<Result<CompileResult>>> {
    if inputs.is_empty() {
        return Ok(Vec::new());
    }
    if inputs.len() == 1 {
        return Ok(vec![compile_one(&inputs[0], options)]);
    }

    let threads = match options.batch_threads {
        0 => num_cpus::get(),
        n => n,
    };
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads.min(inputs.len()))
        .build()
        .map_err(|e| Error::ConfigError(format!("Failed to create thread pool: {}", e)))?;

    tracing::debug!(modules = inputs.len(), threads, "compiling batch");
    Ok(pool.install(|| {
        inputs
            .par_iter()
            .map(|input| compile_one(input, options))
            .collect()
    }))
}
