//! # Runtime Contract
//!
//! Methods and fields of the support class that generated code calls into.
//! The class itself lives outside this crate; only its descriptors are
//! fixed here. Memory is a flat little-endian byte array addressed by `int`.

use crate::parser::Type;
use crate::{Error, Result};
use lazy_static::lazy_static;
use std::collections::HashSet;

/// A static method on the runtime class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeMethod {
    /// Method name
    pub name: &'static str,
    /// JVM method descriptor
    pub descriptor: &'static str,
}

const fn method(name: &'static str, descriptor: &'static str) -> RuntimeMethod {
    RuntimeMethod { name, descriptor }
}

/// Bump the stack pointer down by `size` bytes and return the new address
pub const ALLOCA: RuntimeMethod = method("alloca", "(I)I");
/// Load an unsigned byte
pub const LI8: RuntimeMethod = method("li8", "(I)I");
/// Store the low byte
pub const SI8: RuntimeMethod = method("si8", "(II)V");
/// Load a 32-bit int
pub const LI32: RuntimeMethod = method("li32", "(I)I");
/// Load a 64-bit long
pub const LI64: RuntimeMethod = method("li64", "(I)J");
/// Store a 32-bit int
pub const SI32: RuntimeMethod = method("si32", "(II)V");
/// Copy the packed static data blob to address 0
pub const INIT_STATIC_DATA: RuntimeMethod = method("initStaticData", "(Ljava/lang/String;)V");
/// Run the compiled `main()` reflectively and exit with its result
pub const MAIN_BOOTSTRAP: RuntimeMethod = method("mainBootstrap", "(Ljava/lang/Class;)V");

/// Static `int` field holding the stack pointer
pub const SP_FIELD: &str = "SP";

/// Name of the static field holding the packed blob
pub const STATIC_DATA_FIELD: &str = "STATIC_DATA";

lazy_static! {
    /// Intrinsics with a runtime implementation
    static ref SUPPORTED_INTRINSICS: HashSet<&'static str> = [
        "llvm.memcpy.p0i8.p0i8.i64",
        "llvm.va_start",
        "llvm.va_end",
    ]
    .into_iter()
    .collect();

    /// Library functions implemented by the runtime
    static ref BUILTINS: HashSet<&'static str> = ["puts", "printf"].into_iter().collect();
}

/// How a call site is lowered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallTarget {
    /// Static method on the runtime class
    Runtime(String),
    /// Sibling method in the generated class
    Sibling,
    /// Dropped with a warning
    Elide,
}

/// Decide where a call to `@name` goes
pub fn call_target(name: &str) -> Result<CallTarget> {
    if name.starts_with("llvm.lifetime.") {
        return Ok(CallTarget::Elide);
    }
    if name.starts_with("llvm.") {
        if SUPPORTED_INTRINSICS.contains(name) {
            return Ok(CallTarget::Runtime(name.replace('.', "_")));
        }
        return Err(Error::unsupported(format!("intrinsic @{}", name)));
    }
    if BUILTINS.contains(name) {
        return Ok(CallTarget::Runtime(name.to_string()));
    }
    Ok(CallTarget::Sibling)
}

/// A comparison lowered to one of the `slt`/`sgt`/`ult` helpers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Comparison {
    /// Helper name
    pub helper: &'static str,
    /// Pass the operands right first
    pub swap: bool,
    /// Flip the boolean result
    pub negate: bool,
}

/// True for `icmp` predicates
pub fn is_comparison(op: &str) -> bool {
    matches!(
        op,
        "eq" | "ne" | "slt" | "sgt" | "sle" | "sge" | "ult" | "ugt" | "ule" | "uge"
    )
}

/// Helper call for an ordered predicate; `eq`/`ne` are lowered inline
pub fn comparison(op: &str) -> Option<Comparison> {
    let (helper, swap, negate) = match op {
        "slt" => ("slt", false, false),
        "sgt" => ("sgt", false, false),
        "ult" => ("ult", false, false),
        "sle" => ("sgt", false, true),
        "sge" => ("slt", false, true),
        "ugt" => ("ult", true, false),
        "ule" => ("ult", true, true),
        "uge" => ("ult", false, true),
        _ => return None,
    };
    Some(Comparison {
        helper,
        swap,
        negate,
    })
}

/// Descriptor of a comparison helper for operands of `ty`
pub fn comparison_descriptor(ty: &Type) -> &'static str {
    if ty.is_wide() {
        "(JJ)Z"
    } else {
        "(II)Z"
    }
}

/// Helper loading a value of `ty` from memory
pub fn load_helper(ty: &Type) -> Result<RuntimeMethod> {
    match ty {
        Type::Int(1) | Type::Int(8) => Ok(LI8),
        Type::Int(32) | Type::Pointer(_) => Ok(LI32),
        Type::Int(64) => Ok(LI64),
        other => Err(Error::unsupported(format!("load of {}", other))),
    }
}

/// Helper storing a value of `ty` to memory
pub fn store_helper(ty: &Type) -> Result<RuntimeMethod> {
    match ty {
        Type::Int(1) | Type::Int(8) => Ok(SI8),
        Type::Int(32) | Type::Pointer(_) => Ok(SI32),
        other => Err(Error::unsupported(format!("store of {}", other))),
    }
}
