//! Class file serialization

use super::code::Code;
use super::constant_pool::ConstantPool;
use crate::{Error, Result};

/// `public`
pub const ACC_PUBLIC: u16 = 0x0001;
/// `static`
pub const ACC_STATIC: u16 = 0x0008;
/// `final`
pub const ACC_FINAL: u16 = 0x0010;
/// Treat `invokespecial` with modern semantics (classes only)
pub const ACC_SUPER: u16 = 0x0020;

/// Class file magic number
pub const MAGIC: u32 = 0xCAFE_BABE;

/// Initial value of a static final field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldConstant {
    /// `int`
    Int(i32),
    /// `java.lang.String`
    String(String),
}

struct FieldInfo {
    access: u16,
    name: u16,
    descriptor: u16,
    constant: Option<u16>,
}

struct MethodInfo {
    access: u16,
    name: u16,
    descriptor: u16,
    code: Code,
}

/// A class being assembled
pub struct ClassWriter {
    pool: ConstantPool,
    major_version: u16,
    this_class: u16,
    super_class: u16,
    fields: Vec<FieldInfo>,
    methods: Vec<MethodInfo>,
    signatures: Vec<(String, String)>,
}

impl ClassWriter {
    /// Starts a public class extending `java.lang.Object`
    pub fn new(internal_name: &str, major_version: u16) -> Result<Self> {
        let mut pool = ConstantPool::new();
        let this_class = pool.class(internal_name)?;
        let super_class = pool.class("java/lang/Object")?;
        Ok(Self {
            pool,
            major_version,
            this_class,
            super_class,
            fields: Vec::new(),
            methods: Vec::new(),
            signatures: Vec::new(),
        })
    }

    /// Pool for method bodies to draw constants from
    pub fn pool_mut(&mut self) -> &mut ConstantPool {
        &mut self.pool
    }

    /// Fields added so far
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Methods added so far
    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    /// Adds a field, with a `ConstantValue` attribute when `constant` is set
    pub fn add_field(
        &mut self,
        access: u16,
        name: &str,
        descriptor: &str,
        constant: Option<FieldConstant>,
    ) -> Result<()> {
        let name = self.pool.utf8(name)?;
        let descriptor = self.pool.utf8(descriptor)?;
        let constant = match constant {
            Some(value) => {
                self.pool.utf8("ConstantValue")?;
                Some(match value {
                    FieldConstant::Int(v) => self.pool.integer(v)?,
                    FieldConstant::String(s) => self.pool.string(&s)?,
                })
            }
            None => None,
        };
        self.fields.push(FieldInfo {
            access,
            name,
            descriptor,
            constant,
        });
        Ok(())
    }

    /// Adds a method with the given body
    pub fn add_method(&mut self, access: u16, name: &str, descriptor: &str, code: Code) -> Result<()> {
        if self
            .signatures
            .iter()
            .any(|(n, d)| n == name && d == descriptor)
        {
            return Err(Error::class_format(format!(
                "duplicate method {}{}",
                name, descriptor
            )));
        }
        self.signatures.push((name.to_string(), descriptor.to_string()));
        let name = self.pool.utf8(name)?;
        let descriptor = self.pool.utf8(descriptor)?;
        self.pool.utf8("Code")?;
        self.methods.push(MethodInfo {
            access,
            name,
            descriptor,
            code,
        });
        Ok(())
    }

    /// Serializes the class
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        // Normally already interned by add_field/add_method
        let mut pool = self.pool.clone();
        let constant_value = pool.utf8("ConstantValue")?;
        let code_name = pool.utf8("Code")?;

        let mut out = Vec::new();
        out.extend_from_slice(&MAGIC.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes());
        out.extend_from_slice(&self.major_version.to_be_bytes());
        out.extend_from_slice(&pool.count().to_be_bytes());
        pool.write(&mut out)?;

        put_u16(&mut out, ACC_PUBLIC | ACC_SUPER);
        put_u16(&mut out, self.this_class);
        put_u16(&mut out, self.super_class);
        put_u16(&mut out, 0); // interfaces

        put_u16(&mut out, count(self.fields.len(), "fields")?);
        for field in &self.fields {
            put_u16(&mut out, field.access);
            put_u16(&mut out, field.name);
            put_u16(&mut out, field.descriptor);
            match field.constant {
                Some(index) => {
                    put_u16(&mut out, 1);
                    put_u16(&mut out, constant_value);
                    out.extend_from_slice(&2u32.to_be_bytes());
                    put_u16(&mut out, index);
                }
                None => put_u16(&mut out, 0),
            }
        }

        put_u16(&mut out, count(self.methods.len(), "methods")?);
        for method in &self.methods {
            put_u16(&mut out, method.access);
            put_u16(&mut out, method.name);
            put_u16(&mut out, method.descriptor);
            put_u16(&mut out, 1);
            put_u16(&mut out, code_name);
            let length = 2 + 2 + 4 + method.code.code.len() as u32 + 2 + 2;
            out.extend_from_slice(&length.to_be_bytes());
            put_u16(&mut out, method.code.max_stack);
            put_u16(&mut out, method.code.max_locals);
            out.extend_from_slice(&(method.code.code.len() as u32).to_be_bytes());
            out.extend_from_slice(&method.code.code);
            put_u16(&mut out, 0); // exception table
            put_u16(&mut out, 0); // code attributes
        }

        put_u16(&mut out, 0); // class attributes
        Ok(out)
    }
}

fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn count(len: usize, what: &str) -> Result<u16> {
    u16::try_from(len).map_err(|_| Error::class_format(format!("more than 65535 {}", what)))
}
