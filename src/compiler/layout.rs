//! # Type Layout
//!
//! Byte sizes and field offsets of IR types under the configured data layout,
//! and the decomposition of getelementptr index chains into byte offsets.

use crate::parser::{Type, TypedValue};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Memory layout rules for static data and address arithmetic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DataLayout {
    /// No padding between fields or elements, 32-bit pointers
    #[default]
    Packed32,
}

impl DataLayout {
    /// Pointer width in bytes
    pub fn pointer_size(self) -> u32 {
        match self {
            DataLayout::Packed32 => 4,
        }
    }
}

/// One step of a getelementptr offset computation
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GepStep<'a> {
    /// Offset known at compile time, in bytes
    Const(i64),
    /// Runtime index multiplied by a stride in bytes
    Scaled {
        /// Index operand
        index: &'a TypedValue,
        /// Bytes per index unit
        stride: u32,
    },
}

/// Named struct definitions plus the layout used to size them
#[derive(Debug, Clone, Default)]
pub struct TypeTable {
    layout: DataLayout,
    structs: HashMap<String, Type>,
}

impl TypeTable {
    /// Creates an empty table
    pub fn new(layout: DataLayout) -> Self {
        Self {
            layout,
            structs: HashMap::new(),
        }
    }

    /// Registers `%name = type ty`
    pub fn define(&mut self, name: impl Into<String>, ty: Type) {
        self.structs.insert(name.into(), ty);
    }

    /// The layout in effect
    pub fn layout(&self) -> DataLayout {
        self.layout
    }

    /// Follows `StructRef`s to a concrete type
    pub fn resolve<'a>(&'a self, ty: &'a Type) -> Result<&'a Type> {
        let mut current = ty;
        // A chain longer than the table means a cycle
        for _ in 0..=self.structs.len() {
            match current {
                Type::StructRef(name) => {
                    current = self.structs.get(name).ok_or_else(|| {
                        Error::layout(format!("unresolved struct reference %{}", name))
                    })?;
                }
                other => return Ok(other),
            }
        }
        Err(Error::layout(format!("cyclic type definition {}", ty)))
    }

    /// Size of a value of `ty` in bytes
    pub fn size_of(&self, ty: &Type) -> Result<u32> {
        match self.resolve(ty)? {
            Type::Int(width) => Ok(width.div_ceil(8)),
            Type::Pointer(_) | Type::Vararg => Ok(self.layout.pointer_size()),
            Type::Array(element, count) => {
                let element = self.size_of(element)?;
                element
                    .checked_mul(*count)
                    .ok_or_else(|| Error::layout(format!("type {} is too large", ty)))
            }
            Type::Struct(fields) => fields.iter().try_fold(0u32, |acc, field| {
                let size = self.size_of(field)?;
                acc.checked_add(size)
                    .ok_or_else(|| Error::layout(format!("type {} is too large", ty)))
            }),
            Type::Void | Type::Function(..) => {
                Err(Error::unsupported(format!("size of unsized type {}", ty)))
            }
            Type::StructRef(_) => Err(Error::layout(format!("unresolved type {}", ty))),
        }
    }

    /// Byte offset of field `index` of struct type `ty`
    pub fn field_offset(&self, ty: &Type, index: usize) -> Result<u32> {
        match self.resolve(ty)? {
            Type::Struct(fields) if index < fields.len() => fields[..index]
                .iter()
                .try_fold(0u32, |acc, field| Ok(acc + self.size_of(field)?)),
            Type::Struct(fields) => Err(Error::layout(format!(
                "field {} out of range for {} ({} fields)",
                index,
                ty,
                fields.len()
            ))),
            other => Err(Error::layout(format!("{} is not a struct", other))),
        }
    }

    /// Splits a getelementptr index chain over `element_type` into byte
    /// offsets. Constant parts are folded into `Const` steps.
    pub fn gep_steps<'a>(
        &self,
        element_type: &Type,
        indices: &'a [TypedValue],
    ) -> Result<Vec<GepStep<'a>>> {
        let mut steps = Vec::new();
        let mut folded = 0i64;
        let mut current = element_type.clone();

        for (position, index) in indices.iter().enumerate() {
            let (stride, next) = if position == 0 {
                (self.size_of(&current)?, current.clone())
            } else {
                match self.resolve(&current)?.clone() {
                    Type::Struct(fields) => {
                        let field = index.value.as_constant().ok_or_else(|| {
                            Error::layout(format!("struct index into {} must be constant", current))
                        })?;
                        let field = usize::try_from(field).map_err(|_| {
                            Error::layout(format!("negative struct index into {}", current))
                        })?;
                        folded += self.field_offset(&current, field)? as i64;
                        let next = fields.get(field).cloned().ok_or_else(|| {
                            Error::layout(format!("field {} out of range", field))
                        })?;
                        current = next;
                        continue;
                    }
                    Type::Array(element, _) => (self.size_of(&element)?, *element),
                    other => {
                        return Err(Error::unsupported(format!(
                            "getelementptr index into non-aggregate {}",
                            other
                        )))
                    }
                }
            };

            match index.value.as_constant() {
                Some(n) => folded += n * stride as i64,
                None => steps.push(GepStep::Scaled { index, stride }),
            }
            current = next;
        }

        if folded != 0 || steps.is_empty() {
            steps.insert(0, GepStep::Const(folded));
        }
        Ok(steps)
    }

    /// Byte offset of a getelementptr whose indices are all constant
    pub fn constant_gep_offset(&self, element_type: &Type, indices: &[TypedValue]) -> Result<i64> {
        self.gep_steps(element_type, indices)?
            .into_iter()
            .try_fold(0i64, |acc, step| match step {
                GepStep::Const(n) => Ok(acc + n),
                GepStep::Scaled { .. } => Err(Error::layout(
                    "getelementptr in a static initializer must have constant indices",
                )),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Value;

    fn table() -> TypeTable {
        let mut table = TypeTable::new(DataLayout::Packed32);
        table.define("pair", Type::Struct(vec![Type::I8, Type::I32]));
        table.define(
            "outer",
            Type::Struct(vec![Type::I64, Type::StructRef("pair".into())]),
        );
        table
    }

    fn idx(n: i32) -> TypedValue {
        TypedValue::new(Type::I32, Value::Int(n))
    }

    #[test]
    fn test_packed_sizes() {
        let table = table();
        assert_eq!(table.size_of(&Type::I1).unwrap(), 1);
        assert_eq!(table.size_of(&Type::I8.pointer_to()).unwrap(), 4);
        assert_eq!(table.size_of(&Type::StructRef("pair".into())).unwrap(), 5);
        assert_eq!(table.size_of(&Type::StructRef("outer".into())).unwrap(), 13);
        assert_eq!(
            table
                .size_of(&Type::Array(Box::new(Type::StructRef("pair".into())), 3))
                .unwrap(),
            15
        );
    }

    #[test]
    fn test_unresolved_struct_is_layout_error() {
        let table = table();
        let err = table.size_of(&Type::StructRef("missing".into())).unwrap_err();
        assert!(matches!(err, Error::LayoutError(_)));
    }

    #[test]
    fn test_cyclic_alias_is_rejected() {
        let mut table = TypeTable::new(DataLayout::Packed32);
        table.define("a", Type::StructRef("b".into()));
        table.define("b", Type::StructRef("a".into()));
        assert!(table.resolve(&Type::StructRef("a".into())).is_err());
    }

    #[test]
    fn test_constant_gep_folds_struct_and_array() {
        let table = table();
        // &outer[1].field1.field1
        let offset = table
            .constant_gep_offset(&Type::StructRef("outer".into()), &[idx(1), idx(1), idx(1)])
            .unwrap();
        assert_eq!(offset, 13 + 8 + 1);

        let array = Type::Array(Box::new(Type::I32), 3);
        assert_eq!(table.constant_gep_offset(&array, &[idx(0), idx(2)]).unwrap(), 8);
    }

    #[test]
    fn test_dynamic_index_is_scaled() {
        let table = table();
        let dynamic = TypedValue::new(Type::I64, Value::local("i"));
        let indices = vec![idx(0), dynamic];
        let array = Type::Array(Box::new(Type::I32), 10);
        let steps = table.gep_steps(&array, &indices).unwrap();
        assert_eq!(
            steps,
            vec![GepStep::Scaled {
                index: &indices[1],
                stride: 4
            }]
        );
        assert!(table.constant_gep_offset(&array, &indices).is_err());
    }
}
