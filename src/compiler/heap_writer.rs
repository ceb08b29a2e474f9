//! # Static Data Heap Writer
//!
//! Packs global initializers into one contiguous little-endian blob. A
//! global's address is its offset in the blob. Pointer-valued initializers
//! reserve a 4-byte slot and record a fix-up, patched by `finish` once every
//! global has an address.

use super::layout::TypeTable;
use crate::parser::{Reference, Type, TypedValue, Value};
use crate::{Error, Result};
use std::collections::{BTreeMap, HashMap};

/// Sequential fix-up identifier, in registration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FixupId(pub usize);

/// A pointer slot waiting for its target's address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reloc {
    /// Offset of the 4-byte slot in the blob
    pub offset: usize,
    /// Global whose address is written
    pub global: String,
    /// Constant byte offset added to the address
    pub addend: i64,
}

/// Laid-out static data with every fix-up applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticData {
    /// The packed blob
    pub bytes: Vec<u8>,
    /// Global name and address, in declaration order
    pub globals: Vec<(String, u32)>,
    /// Applied relocations, in registration order
    pub relocations: Vec<Reloc>,
}

impl StaticData {
    /// Address of a global
    pub fn address_of(&self, name: &str) -> Option<u32> {
        self.globals
            .iter()
            .find(|(global, _)| global == name)
            .map(|(_, address)| *address)
    }

    /// The blob as a string with one char per byte, for a class constant
    pub fn as_char_string(&self) -> String {
        self.bytes.iter().map(|&b| b as char).collect()
    }
}

/// Static data writer
pub struct HeapWriter<'t> {
    types: &'t TypeTable,
    data: Vec<u8>,
    fixups: BTreeMap<FixupId, Reloc>,
    globals: Vec<(String, u32)>,
}

impl<'t> HeapWriter<'t> {
    /// Creates an empty writer sizing types through `types`
    pub fn new(types: &'t TypeTable) -> Self {
        Self {
            types,
            data: Vec::new(),
            fixups: BTreeMap::new(),
            globals: Vec::new(),
        }
    }

    /// Appends a global's initializer and returns its address
    pub fn add_global(&mut self, name: &str, initializer: &TypedValue) -> Result<u32> {
        let address = u32::try_from(self.data.len())
            .map_err(|_| Error::layout("static data exceeds the 32-bit address space"))?;
        self.write(&initializer.ty, &initializer.value)?;
        self.globals.push((name.to_string(), address));
        tracing::trace!(global = name, address, "laid out global");
        Ok(address)
    }

    /// Bytes written so far
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if nothing has been written
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of pending fix-ups
    pub fn pending_fixups(&self) -> usize {
        self.fixups.len()
    }

    fn write(&mut self, ty: &Type, value: &Value) -> Result<()> {
        match value {
            Value::Int(v) => self.write_int(ty, *v as i64),
            Value::Long(v) => self.write_int(ty, *v),
            Value::Bool(b) => self.write_int(ty, *b as i64),
            Value::Null => {
                let size = self.types.layout().pointer_size() as usize;
                self.data.resize(self.data.len() + size, 0);
                Ok(())
            }
            Value::ZeroInitializer => {
                let size = self.types.size_of(ty)? as usize;
                self.data.resize(self.data.len() + size, 0);
                Ok(())
            }
            Value::I8Array(text) => {
                let bytes = Value::decode_i8_array(text)?;
                self.data.extend_from_slice(&bytes);
                Ok(())
            }
            Value::GenericArray(elements) | Value::GenericStruct(elements) => {
                for element in elements {
                    self.write(&element.ty, &element.value)?;
                }
                Ok(())
            }
            Value::Reference(Reference::Global(_))
            | Value::Bitcast { .. }
            | Value::GetElementPtr { .. } => {
                let (global, addend) = self.relocation_target(value)?;
                let id = FixupId(self.fixups.len());
                self.fixups.insert(
                    id,
                    Reloc {
                        offset: self.data.len(),
                        global,
                        addend,
                    },
                );
                self.data.extend_from_slice(&[0; 4]);
                Ok(())
            }
            Value::Reference(Reference::Local(name)) => Err(Error::layout(format!(
                "register %{} in a static initializer",
                name
            ))),
        }
    }

    fn write_int(&mut self, ty: &Type, value: i64) -> Result<()> {
        let size = match ty {
            Type::Int(width) => width.div_ceil(8) as usize,
            Type::Pointer(_) => self.types.layout().pointer_size() as usize,
            other => {
                return Err(Error::layout(format!(
                    "integer constant for non-integer type {}",
                    other
                )))
            }
        };
        if size > 8 {
            return Err(Error::unsupported(format!("static integer of type {}", ty)));
        }
        self.data.extend_from_slice(&value.to_le_bytes()[..size]);
        Ok(())
    }

    /// Terminal global and constant byte offset of a pointer initializer
    fn relocation_target(&self, value: &Value) -> Result<(String, i64)> {
        match value {
            Value::Reference(Reference::Global(id)) => Ok((id.clone(), 0)),
            Value::Bitcast { value, .. } => self.relocation_target(value),
            Value::GetElementPtr {
                element_type,
                base,
                indices,
                ..
            } => {
                let (global, addend) = self.relocation_target(&base.value)?;
                let offset = self.types.constant_gep_offset(element_type, indices)?;
                Ok((global, addend + offset))
            }
            other => Err(Error::layout(format!(
                "cannot take the address of {:?} in a static initializer",
                other
            ))),
        }
    }

    /// Resolves every fix-up against the registered globals
    pub fn finish(mut self) -> Result<StaticData> {
        let addresses: HashMap<&str, u32> = self
            .globals
            .iter()
            .map(|(name, address)| (name.as_str(), *address))
            .collect();

        let mut relocations = Vec::with_capacity(self.fixups.len());
        for (id, reloc) in &self.fixups {
            let base = addresses.get(reloc.global.as_str()).ok_or_else(|| {
                Error::layout(format!(
                    "fix-up {} at offset {} references unregistered global @{}",
                    id.0, reloc.offset, reloc.global
                ))
            })?;
            let target = i32::try_from(*base as i64 + reloc.addend).map_err(|_| {
                Error::layout(format!("address of @{} overflows 32 bits", reloc.global))
            })?;
            self.data[reloc.offset..reloc.offset + 4].copy_from_slice(&target.to_le_bytes());
            tracing::trace!(
                fixup = id.0,
                offset = reloc.offset,
                global = %reloc.global,
                target,
                "applied fix-up"
            );
            relocations.push(reloc.clone());
        }

        Ok(StaticData {
            bytes: self.data,
            globals: self.globals,
            relocations,
        })
    }
}
