//! JVM class file backend: opcodes, constant pool, bytecode assembly and
//! serialization.

pub mod class_writer;
pub mod code;
pub mod constant_pool;
pub mod opcodes;

pub use class_writer::{ClassWriter, FieldConstant, ACC_FINAL, ACC_PUBLIC, ACC_STATIC, ACC_SUPER};
pub use code::{Code, CodeBuilder, Kind, Label};
pub use constant_pool::{Constant, ConstantPool};
