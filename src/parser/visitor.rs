//! IR visitor
//!
//! Generic read-only traversal of a `Program`. Default `visit_*` methods call
//! the matching `walk_*` function, which visits the children. Override a
//! `visit_*` method to act on a node, and call the `walk_*` function from it
//! to keep descending.
//!
//! Visits are fallible so a visitor can abort the traversal with an error.
//!
//! # Example
//!
//! ```text
//! struct CountGlobals { count: usize }
//!
//! impl<'ir> Visitor<'ir> for CountGlobals {
//!     fn visit_reference(&mut self, reference: &'ir Reference) -> Result<()> {
//!         if let Reference::Global(_) = reference {
//!             self.count += 1;
//!         }
//!         Ok(())
//!     }
//! }
//! ```

use super::ast::{Argument, Body, Decl, Program, Reference, Stm, Type, TypedValue, Value};
use crate::error::Result;

/// IR visitor trait
pub trait Visitor<'ir> {
    /// Visit a whole module.
    fn visit_program(&mut self, program: &'ir Program) -> Result<()> {
        walk_program(self, program)
    }

    /// Visit a top-level declaration.
    fn visit_decl(&mut self, decl: &'ir Decl) -> Result<()> {
        walk_decl(self, decl)
    }

    /// Visit a function parameter.
    fn visit_argument(&mut self, argument: &'ir Argument) -> Result<()> {
        self.visit_type(&argument.ty)
    }

    /// Visit a function body.
    fn visit_body(&mut self, body: &'ir Body) -> Result<()> {
        walk_body(self, body)
    }

    /// Visit a statement.
    fn visit_stm(&mut self, stm: &'ir Stm) -> Result<()> {
        walk_stm(self, stm)
    }

    /// Visit a typed operand.
    fn visit_typed_value(&mut self, typed: &'ir TypedValue) -> Result<()> {
        self.visit_type(&typed.ty)?;
        self.visit_value(&typed.value)
    }

    /// Visit an operand.
    fn visit_value(&mut self, value: &'ir Value) -> Result<()> {
        walk_value(self, value)
    }

    /// Visit a named operand.
    fn visit_reference(&mut self, _reference: &'ir Reference) -> Result<()> {
        Ok(())
    }

    /// Visit a type.
    fn visit_type(&mut self, ty: &'ir Type) -> Result<()> {
        walk_type(self, ty)
    }
}

/// Visit every declaration in order.
pub fn walk_program<'ir, V: Visitor<'ir> + ?Sized>(
    visitor: &mut V,
    program: &'ir Program,
) -> Result<()> {
    for decl in &program.decls {
        visitor.visit_decl(decl)?;
    }
    Ok(())
}

/// Visit the types, values and bodies inside a declaration.
pub fn walk_decl<'ir, V: Visitor<'ir> + ?Sized>(visitor: &mut V, decl: &'ir Decl) -> Result<()> {
    match decl {
        Decl::Declare {
            ret_type,
            arg_types,
            ..
        } => {
            visitor.visit_type(ret_type)?;
            for ty in arg_types {
                visitor.visit_type(ty)?;
            }
            Ok(())
        }
        Decl::DeclareFunction {
            ret_type,
            args,
            body,
            ..
        } => {
            visitor.visit_type(ret_type)?;
            for arg in args {
                visitor.visit_argument(arg)?;
            }
            visitor.visit_body(body)
        }
        Decl::DeclareVar { ty, value, .. } => {
            visitor.visit_type(ty)?;
            visitor.visit_value(value)
        }
        Decl::DeclareType { ty, .. } => visitor.visit_type(ty),
        Decl::Comdat { .. } | Decl::Metadata { .. } | Decl::Empty => Ok(()),
    }
}

/// Visit each statement in order.
pub fn walk_body<'ir, V: Visitor<'ir> + ?Sized>(visitor: &mut V, body: &'ir Body) -> Result<()> {
    for stm in &body.stms {
        visitor.visit_stm(stm)?;
    }
    Ok(())
}

/// Visit the operands and types of a statement.
pub fn walk_stm<'ir, V: Visitor<'ir> + ?Sized>(visitor: &mut V, stm: &'ir Stm) -> Result<()> {
    match stm {
        Stm::Alloca { ty, count, .. } => {
            visitor.visit_type(ty)?;
            if let Some(count) = count {
                visitor.visit_typed_value(count)?;
            }
            Ok(())
        }
        Stm::Load { ty, from, .. } => {
            visitor.visit_type(ty)?;
            visitor.visit_typed_value(from)
        }
        Stm::Store { value, dest } => {
            visitor.visit_typed_value(value)?;
            visitor.visit_typed_value(dest)
        }
        Stm::BinOp {
            ty, left, right, ..
        } => {
            visitor.visit_type(ty)?;
            visitor.visit_value(left)?;
            visitor.visit_value(right)
        }
        Stm::Assign { value, .. } => visitor.visit_typed_value(value),
        Stm::Call {
            ret_type,
            callee,
            args,
            ..
        } => {
            visitor.visit_type(ret_type)?;
            visitor.visit_value(callee)?;
            for arg in args {
                visitor.visit_typed_value(arg)?;
            }
            Ok(())
        }
        Stm::ConditionalJump { cond, .. } => visitor.visit_typed_value(cond),
        Stm::Phi { ty, incoming, .. } => {
            visitor.visit_type(ty)?;
            for (_, value) in incoming {
                visitor.visit_typed_value(value)?;
            }
            Ok(())
        }
        Stm::Ternary {
            cond,
            if_true,
            if_false,
            ..
        } => {
            visitor.visit_typed_value(cond)?;
            visitor.visit_typed_value(if_true)?;
            visitor.visit_typed_value(if_false)
        }
        Stm::Convert { from, to, .. } => {
            visitor.visit_typed_value(from)?;
            visitor.visit_type(to)
        }
        Stm::Return(Some(value)) => visitor.visit_typed_value(value),
        Stm::Return(None) | Stm::Label(_) | Stm::Jump(_) | Stm::Unreachable => Ok(()),
    }
}

/// Visit nested operands and types of a value.
pub fn walk_value<'ir, V: Visitor<'ir> + ?Sized>(visitor: &mut V, value: &'ir Value) -> Result<()> {
    match value {
        Value::Reference(reference) => visitor.visit_reference(reference),
        Value::Bitcast { value, from, to } => {
            visitor.visit_type(from)?;
            visitor.visit_value(value)?;
            visitor.visit_type(to)
        }
        Value::GetElementPtr {
            element_type,
            base,
            indices,
            ..
        } => {
            visitor.visit_type(element_type)?;
            visitor.visit_typed_value(base)?;
            for index in indices {
                visitor.visit_typed_value(index)?;
            }
            Ok(())
        }
        Value::GenericArray(elements) | Value::GenericStruct(elements) => {
            for element in elements {
                visitor.visit_typed_value(element)?;
            }
            Ok(())
        }
        Value::Int(_)
        | Value::Long(_)
        | Value::Bool(_)
        | Value::Null
        | Value::ZeroInitializer
        | Value::I8Array(_) => Ok(()),
    }
}

/// Visit component types.
pub fn walk_type<'ir, V: Visitor<'ir> + ?Sized>(visitor: &mut V, ty: &'ir Type) -> Result<()> {
    match ty {
        Type::Pointer(inner) | Type::Array(inner, _) => visitor.visit_type(inner),
        Type::Struct(fields) => {
            for field in fields {
                visitor.visit_type(field)?;
            }
            Ok(())
        }
        Type::Function(ret, params) => {
            visitor.visit_type(ret)?;
            for param in params {
                visitor.visit_type(param)?;
            }
            Ok(())
        }
        Type::Void | Type::Int(_) | Type::StructRef(_) | Type::Vararg => Ok(()),
    }
}
