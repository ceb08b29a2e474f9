//! Class-file constant pool
//!
//! Entries are deduplicated and kept in insertion order, so the same
//! sequence of requests always yields the same pool.

use crate::{Error, Result};
use std::collections::HashMap;

/// Constant pool tags
pub mod tag {
    /// Modified UTF-8 string
    pub const UTF8: u8 = 1;
    /// 32-bit int
    pub const INTEGER: u8 = 3;
    /// 64-bit long (two slots)
    pub const LONG: u8 = 5;
    /// Class reference
    pub const CLASS: u8 = 7;
    /// String literal
    pub const STRING: u8 = 8;
    /// Field reference
    pub const FIELDREF: u8 = 9;
    /// Method reference
    pub const METHODREF: u8 = 10;
    /// Name and descriptor pair
    pub const NAME_AND_TYPE: u8 = 12;
}

/// A constant pool entry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Constant {
    /// Text
    Utf8(String),
    /// int
    Integer(i32),
    /// long
    Long(i64),
    /// Class by name index
    Class(u16),
    /// String by UTF-8 index
    String(u16),
    /// Class index, name-and-type index
    Fieldref(u16, u16),
    /// Class index, name-and-type index
    Methodref(u16, u16),
    /// Name index, descriptor index
    NameAndType(u16, u16),
}

impl Constant {
    /// Pool slots occupied by this entry
    pub fn slots(&self) -> u16 {
        match self {
            Constant::Long(_) => 2,
            _ => 1,
        }
    }

    /// Tag byte
    pub fn tag(&self) -> u8 {
        match self {
            Constant::Utf8(_) => tag::UTF8,
            Constant::Integer(_) => tag::INTEGER,
            Constant::Long(_) => tag::LONG,
            Constant::Class(_) => tag::CLASS,
            Constant::String(_) => tag::STRING,
            Constant::Fieldref(..) => tag::FIELDREF,
            Constant::Methodref(..) => tag::METHODREF,
            Constant::NameAndType(..) => tag::NAME_AND_TYPE,
        }
    }
}

/// Constant pool under construction
#[derive(Debug, Clone)]
pub struct ConstantPool {
    entries: Vec<Constant>,
    index: HashMap<Constant, u16>,
    next: u16,
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantPool {
    /// Creates an empty pool; index 0 is reserved
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            next: 1,
        }
    }

    /// Adds an entry, or returns the index of an equal one
    pub fn add(&mut self, constant: Constant) -> Result<u16> {
        if let Some(&index) = self.index.get(&constant) {
            return Ok(index);
        }
        let index = self.next;
        self.next = index
            .checked_add(constant.slots())
            .filter(|&next| next < u16::MAX)
            .ok_or_else(|| Error::class_format("constant pool has more than 65535 entries"))?;
        self.index.insert(constant.clone(), index);
        self.entries.push(constant);
        Ok(index)
    }

    /// `CONSTANT_Utf8`
    pub fn utf8(&mut self, text: &str) -> Result<u16> {
        self.add(Constant::Utf8(text.to_string()))
    }

    /// `CONSTANT_Integer`
    pub fn integer(&mut self, value: i32) -> Result<u16> {
        self.add(Constant::Integer(value))
    }

    /// `CONSTANT_Long`
    pub fn long(&mut self, value: i64) -> Result<u16> {
        self.add(Constant::Long(value))
    }

    /// `CONSTANT_Class` for an internal name such as `java/lang/Object`
    pub fn class(&mut self, internal_name: &str) -> Result<u16> {
        let name = self.utf8(internal_name)?;
        self.add(Constant::Class(name))
    }

    /// `CONSTANT_String`
    pub fn string(&mut self, value: &str) -> Result<u16> {
        let utf8 = self.utf8(value)?;
        self.add(Constant::String(utf8))
    }

    /// `CONSTANT_NameAndType`
    pub fn name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16> {
        let name = self.utf8(name)?;
        let descriptor = self.utf8(descriptor)?;
        self.add(Constant::NameAndType(name, descriptor))
    }

    /// `CONSTANT_Fieldref`
    pub fn field_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<u16> {
        let class = self.class(owner)?;
        let nat = self.name_and_type(name, descriptor)?;
        self.add(Constant::Fieldref(class, nat))
    }

    /// `CONSTANT_Methodref`
    pub fn method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<u16> {
        let class = self.class(owner)?;
        let nat = self.name_and_type(name, descriptor)?;
        self.add(Constant::Methodref(class, nat))
    }

    /// `constant_pool_count` as written in the class file
    pub fn count(&self) -> u16 {
        self.next
    }

    /// Entries in index order
    pub fn entries(&self) -> &[Constant] {
        &self.entries
    }

    /// Serializes every entry
    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        for entry in &self.entries {
            out.push(entry.tag());
            match entry {
                Constant::Utf8(text) => {
                    let bytes = encode_modified_utf8(text);
                    let len = u16::try_from(bytes.len()).map_err(|_| {
                        Error::class_format(format!(
                            "UTF-8 constant of {} bytes exceeds 65535",
                            bytes.len()
                        ))
                    })?;
                    out.extend_from_slice(&len.to_be_bytes());
                    out.extend_from_slice(&bytes);
                }
                Constant::Integer(v) => out.extend_from_slice(&v.to_be_bytes()),
                Constant::Long(v) => out.extend_from_slice(&v.to_be_bytes()),
                Constant::Class(i) | Constant::String(i) => out.extend_from_slice(&i.to_be_bytes()),
                Constant::Fieldref(a, b)
                | Constant::Methodref(a, b)
                | Constant::NameAndType(a, b) => {
                    out.extend_from_slice(&a.to_be_bytes());
                    out.extend_from_slice(&b.to_be_bytes());
                }
            }
        }
        Ok(())
    }
}

/// Encode text as modified UTF-8: NUL becomes `C0 80`, supplementary
/// characters become surrogate pairs.
pub fn encode_modified_utf8(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for unit in text.encode_utf16() {
        match unit {
            0x0001..=0x007f => out.push(unit as u8),
            0x0000 | 0x0080..=0x07ff => {
                out.push(0xc0 | (unit >> 6) as u8);
                out.push(0x80 | (unit & 0x3f) as u8);
            }
            _ => {
                out.push(0xe0 | (unit >> 12) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3f) as u8);
                out.push(0x80 | (unit & 0x3f) as u8);
            }
        }
    }
    out
}

/// Decode modified UTF-8 back into text
pub fn decode_modified_utf8(bytes: &[u8]) -> Option<String> {
    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b & 0x80 == 0 {
            units.push(b as u16);
            i += 1;
        } else if b & 0xe0 == 0xc0 {
            let b2 = *bytes.get(i + 1)?;
            units.push(((b as u16 & 0x1f) << 6) | (b2 as u16 & 0x3f));
            i += 2;
        } else if b & 0xf0 == 0xe0 {
            let b2 = *bytes.get(i + 1)?;
            let b3 = *bytes.get(i + 2)?;
            units.push(((b as u16 & 0x0f) << 12) | ((b2 as u16 & 0x3f) << 6) | (b3 as u16 & 0x3f));
            i += 3;
        } else {
            return None;
        }
    }
    String::from_utf16(&units).ok()
}
