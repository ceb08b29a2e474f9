//! LLVM IR Parser Module
//!
//! Parses the token stream into the IR data model, and provides a visitor
//! for walking it.

mod ast;
mod ll_parser;
pub mod visitor;

pub use ast::{
    Argument, Body, CastOp, Decl, Program, Reference, Stm, Type, TypedValue, Value,
};
pub use ll_parser::{parse, parse_str, LlParser};
pub use visitor::Visitor;
