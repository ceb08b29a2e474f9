//! # Class File Verifier
//!
//! Reads a class file back and checks the structural rules a JVM enforces
//! before it will load the class. Type-level verification is left to the
//! JVM itself; this catches the mistakes a code generator can make in the
//! encoding.

use super::jvm::class_writer::{ACC_STATIC, MAGIC};
use super::jvm::constant_pool::{decode_modified_utf8, tag, Constant};
use super::jvm::opcodes::{self, Operands};
use super::{MAX_CLASS_VERSION, MIN_CLASS_VERSION};
use crate::{Error, Result};

/// HotSpot does not JIT-compile methods with more bytecode than this
const HUGE_METHOD_LIMIT: usize = 8000;

// =============================================================================
// CLASS FILE READER
// =============================================================================

/// A parsed field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    /// Access flags
    pub access_flags: u16,
    /// Field name
    pub name: String,
    /// Field descriptor
    pub descriptor: String,
    /// Pool index of the `ConstantValue` attribute, if any
    pub constant_value: Option<u16>,
}

/// A parsed `Code` attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeAttribute {
    /// Operand stack limit
    pub max_stack: u16,
    /// Local variable slots
    pub max_locals: u16,
    /// Bytecode
    pub code: Vec<u8>,
}

/// A parsed method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodInfo {
    /// Access flags
    pub access_flags: u16,
    /// Method name
    pub name: String,
    /// Method descriptor
    pub descriptor: String,
    /// Body, absent for abstract and native methods
    pub code: Option<CodeAttribute>,
}

impl MethodInfo {
    /// True if `ACC_STATIC` is set
    pub fn is_static(&self) -> bool {
        self.access_flags & ACC_STATIC != 0
    }
}

/// A class file read back into memory
#[derive(Debug, Clone)]
pub struct ClassFile {
    /// Minor version
    pub minor_version: u16,
    /// Major version
    pub major_version: u16,
    /// Pool entries by index; index 0 and the slot after a long are `None`
    pub constants: Vec<Option<Constant>>,
    /// Class access flags
    pub access_flags: u16,
    /// Pool index of this class
    pub this_class: u16,
    /// Pool index of the superclass
    pub super_class: u16,
    /// Fields in declaration order
    pub fields: Vec<FieldInfo>,
    /// Methods in declaration order
    pub methods: Vec<MethodInfo>,
}

struct Reader<'b> {
    bytes: &'b [u8],
    pos: usize,
}

impl<'b> Reader<'b> {
    fn new(bytes: &'b [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::InvalidClassFile {
            offset: self.pos,
            message: message.into(),
        }
    }

    fn take(&mut self, n: usize) -> Result<&'b [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| self.error(format!("truncated: {} more bytes expected", n)))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64> {
        let hi = self.u32()? as u64;
        let lo = self.u32()? as u64;
        Ok((hi << 32) | lo)
    }

    fn at_end(&self) -> bool {
        self.pos == self.bytes.len()
    }
}

impl ClassFile {
    /// Parses class file bytes
    pub fn parse(bytes: &[u8]) -> Result<ClassFile> {
        let mut r = Reader::new(bytes);
        if r.u32()? != MAGIC {
            return Err(Error::InvalidClassFile {
                offset: 0,
                message: "bad magic number".to_string(),
            });
        }
        let minor_version = r.u16()?;
        let major_version = r.u16()?;

        let count = r.u16()? as usize;
        let mut constants: Vec<Option<Constant>> = vec![None];
        while constants.len() < count.max(1) {
            let constant = match r.u8()? {
                tag::UTF8 => {
                    let len = r.u16()? as usize;
                    let start = r.pos;
                    let text = decode_modified_utf8(r.take(len)?).ok_or(Error::InvalidClassFile {
                        offset: start,
                        message: "malformed modified UTF-8".to_string(),
                    })?;
                    Constant::Utf8(text)
                }
                tag::INTEGER => Constant::Integer(r.u32()? as i32),
                tag::LONG => Constant::Long(r.u64()? as i64),
                tag::CLASS => Constant::Class(r.u16()?),
                tag::STRING => Constant::String(r.u16()?),
                tag::FIELDREF => Constant::Fieldref(r.u16()?, r.u16()?),
                tag::METHODREF => Constant::Methodref(r.u16()?, r.u16()?),
                tag::NAME_AND_TYPE => Constant::NameAndType(r.u16()?, r.u16()?),
                other => {
                    r.pos -= 1;
                    return Err(r.error(format!("unsupported constant tag {}", other)));
                }
            };
            let wide = constant.slots() == 2;
            constants.push(Some(constant));
            if wide {
                constants.push(None);
            }
        }
        if constants.len() != count.max(1) {
            return Err(r.error("long constant overruns constant_pool_count"));
        }

        let mut class = ClassFile {
            minor_version,
            major_version,
            constants,
            access_flags: 0,
            this_class: 0,
            super_class: 0,
            fields: Vec::new(),
            methods: Vec::new(),
        };
        class.access_flags = r.u16()?;
        class.this_class = r.u16()?;
        class.super_class = r.u16()?;
        let interfaces = r.u16()? as usize;
        r.take(interfaces * 2)?;

        for _ in 0..r.u16()? {
            let access_flags = r.u16()?;
            let (name, descriptor) = (r.u16()?, r.u16()?);
            let name = class.member_utf8(&r, name)?;
            let descriptor = class.member_utf8(&r, descriptor)?;
            let mut constant_value = None;
            for _ in 0..r.u16()? {
                let (attr, body) = class.attribute(&mut r)?;
                if attr == "ConstantValue" {
                    if body.len() != 2 {
                        return Err(r.error("ConstantValue attribute must be 2 bytes"));
                    }
                    constant_value = Some(u16::from_be_bytes([body[0], body[1]]));
                }
            }
            class.fields.push(FieldInfo {
                access_flags,
                name,
                descriptor,
                constant_value,
            });
        }

        for _ in 0..r.u16()? {
            let access_flags = r.u16()?;
            let (name, descriptor) = (r.u16()?, r.u16()?);
            let name = class.member_utf8(&r, name)?;
            let descriptor = class.member_utf8(&r, descriptor)?;
            let mut code = None;
            for _ in 0..r.u16()? {
                let attr_start = r.pos;
                let (attr, body) = class.attribute(&mut r)?;
                if attr == "Code" {
                    code = Some(parse_code(body, attr_start + 6)?);
                }
            }
            class.methods.push(MethodInfo {
                access_flags,
                name,
                descriptor,
                code,
            });
        }

        for _ in 0..r.u16()? {
            class.attribute(&mut r)?;
        }
        if !r.at_end() {
            return Err(r.error("trailing bytes after class attributes"));
        }
        Ok(class)
    }

    fn member_utf8(&self, r: &Reader<'_>, index: u16) -> Result<String> {
        self.utf8(index)
            .map(str::to_string)
            .ok_or_else(|| r.error(format!("constant #{} is not a Utf8 entry", index)))
    }

    fn attribute<'b>(&self, r: &mut Reader<'b>) -> Result<(String, &'b [u8])> {
        let index = r.u16()?;
        let name = self.member_utf8(r, index)?;
        let len = r.u32()? as usize;
        Ok((name, r.take(len)?))
    }

    /// Entry at `index`
    pub fn constant(&self, index: u16) -> Option<&Constant> {
        self.constants.get(index as usize)?.as_ref()
    }

    /// Text of a `CONSTANT_Utf8`
    pub fn utf8(&self, index: u16) -> Option<&str> {
        match self.constant(index)? {
            Constant::Utf8(text) => Some(text),
            _ => None,
        }
    }

    /// Internal name behind a `CONSTANT_Class`
    pub fn class_name(&self, index: u16) -> Option<&str> {
        match self.constant(index)? {
            Constant::Class(name) => self.utf8(*name),
            _ => None,
        }
    }

    /// Internal name of this class
    pub fn this_class_name(&self) -> Option<&str> {
        self.class_name(self.this_class)
    }

    /// Value of a `CONSTANT_String`
    pub fn string(&self, index: u16) -> Option<&str> {
        match self.constant(index)? {
            Constant::String(utf8) => self.utf8(*utf8),
            _ => None,
        }
    }

    /// Owner, name and descriptor of a field or method reference
    pub fn member_ref(&self, index: u16) -> Option<(&str, &str, &str)> {
        let (class, nat) = match self.constant(index)? {
            Constant::Fieldref(c, n) | Constant::Methodref(c, n) => (*c, *n),
            _ => return None,
        };
        let (name, descriptor) = match self.constant(nat)? {
            Constant::NameAndType(n, d) => (*n, *d),
            _ => return None,
        };
        Some((self.class_name(class)?, self.utf8(name)?, self.utf8(descriptor)?))
    }

    /// Method by name and descriptor
    pub fn method(&self, name: &str, descriptor: &str) -> Option<&MethodInfo> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.descriptor == descriptor)
    }

    /// First method with this name
    pub fn find_method(&self, name: &str) -> Option<&MethodInfo> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Field by name
    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.name == name)
    }
}

fn parse_code(body: &[u8], base: usize) -> Result<CodeAttribute> {
    let mut r = Reader::new(body);
    let relocate = |e: Error| match e {
        Error::InvalidClassFile { offset, message } => Error::InvalidClassFile {
            offset: base + offset,
            message,
        },
        other => other,
    };
    let max_stack = r.u16().map_err(relocate)?;
    let max_locals = r.u16().map_err(relocate)?;
    let len = r.u32().map_err(relocate)? as usize;
    let code = r.take(len).map_err(relocate)?.to_vec();
    let handlers = r.u16().map_err(relocate)? as usize;
    r.take(handlers * 8).map_err(relocate)?;
    for _ in 0..r.u16().map_err(relocate)? {
        r.u16().map_err(relocate)?;
        let len = r.u32().map_err(relocate)? as usize;
        r.take(len).map_err(relocate)?;
    }
    if !r.at_end() {
        return Err(relocate(r.error("trailing bytes in Code attribute")));
    }
    Ok(CodeAttribute {
        max_stack,
        max_locals,
        code,
    })
}

// =============================================================================
// INSTRUCTION DECODER
// =============================================================================

/// Decoded operand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// No operand
    None,
    /// Immediate from `bipush`/`sipush`
    Int(i32),
    /// Local variable slot
    Local(u16),
    /// Constant pool index
    Pool(u16),
    /// Absolute branch target
    Target(usize),
    /// `newarray` element type
    ArrayType(u8),
}

/// One decoded instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    /// Offset of the first byte, `wide` prefix included
    pub offset: usize,
    /// Opcode; for `wide` forms the widened instruction
    pub opcode: u8,
    /// Operand
    pub operand: Operand,
    /// Encoded length in bytes
    pub len: usize,
}

impl Instruction {
    /// Mnemonic
    pub fn name(&self) -> &'static str {
        opcodes::info(self.opcode).map_or("?", |i| i.name)
    }
}

/// Decodes bytecode into instructions.
///
/// Fails on opcodes outside the emitted subset, truncated operands and
/// branches before the start of the method.
pub fn decode_instructions(code: &[u8]) -> Result<Vec<Instruction>> {
    let fail = |offset: usize, message: String| Error::InvalidClassFile { offset, message };
    let byte = |at: usize| {
        code.get(at)
            .copied()
            .ok_or_else(|| fail(at, "truncated instruction".to_string()))
    };
    let short = |at: usize| -> Result<u16> { Ok(u16::from_be_bytes([byte(at)?, byte(at + 1)?])) };

    let mut out = Vec::new();
    let mut pos = 0;
    while pos < code.len() {
        let opcode = code[pos];
        if opcode == opcodes::WIDE {
            let inner = byte(pos + 1)?;
            let widenable = opcodes::info(inner).map(|i| i.operands) == Some(Operands::Local);
            if !widenable {
                return Err(fail(pos, format!("wide applied to opcode 0x{:02x}", inner)));
            }
            out.push(Instruction {
                offset: pos,
                opcode: inner,
                operand: Operand::Local(short(pos + 2)?),
                len: 4,
            });
            pos += 4;
            continue;
        }

        let info = opcodes::info(opcode)
            .ok_or_else(|| fail(pos, format!("unknown opcode 0x{:02x}", opcode)))?;
        let operand = match info.operands {
            Operands::None => Operand::None,
            Operands::Byte => Operand::Int(byte(pos + 1)? as i8 as i32),
            Operands::Short => Operand::Int(short(pos + 1)? as i16 as i32),
            Operands::Local => Operand::Local(byte(pos + 1)? as u16),
            Operands::Pool1 => Operand::Pool(byte(pos + 1)? as u16),
            Operands::Pool2 => Operand::Pool(short(pos + 1)?),
            Operands::ArrayType => Operand::ArrayType(byte(pos + 1)?),
            Operands::Branch => {
                let delta = short(pos + 1)? as i16 as i64;
                let target = pos as i64 + delta;
                if target < 0 {
                    return Err(fail(pos, format!("branch to {}", target)));
                }
                Operand::Target(target as usize)
            }
        };
        let len = 1 + info.operands.len();
        out.push(Instruction {
            offset: pos,
            opcode,
            operand,
            len,
        });
        pos += len;
    }
    Ok(out)
}

/// Local slots an instruction touches, as (first slot, width)
fn local_access(insn: &Instruction) -> Option<(u16, u16)> {
    use opcodes::*;
    let wide = |op: u8| if op == LLOAD || op == LSTORE { 2 } else { 1 };
    match (insn.opcode, insn.operand) {
        (op, Operand::Local(slot)) => Some((slot, wide(op))),
        (op @ 0x1a..=0x1d, _) => Some(((op - ILOAD_0) as u16, 1)),
        (op @ 0x1e..=0x21, _) => Some(((op - LLOAD_0) as u16, 2)),
        (op @ 0x2a..=0x2d, _) => Some(((op - ALOAD_0) as u16, 1)),
        (op @ 0x3b..=0x3e, _) => Some(((op - ISTORE_0) as u16, 1)),
        (op @ 0x3f..=0x42, _) => Some(((op - LSTORE_0) as u16, 2)),
        (op @ 0x4b..=0x4e, _) => Some(((op - ASTORE_0) as u16, 1)),
        _ => None,
    }
}

// =============================================================================
// VERIFIER
// =============================================================================

/// Verification result with warnings
#[derive(Debug)]
pub struct VerifyResult {
    /// Class is structurally loadable
    pub valid: bool,
    /// Errors that would make the JVM reject the class
    pub errors: Vec<VerifyError>,
    /// Warnings (non-fatal)
    pub warnings: Vec<String>,
    /// Statistics
    pub stats: ClassStats,
}

/// Class statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ClassStats {
    /// `constant_pool_count` minus one
    pub constant_count: usize,
    /// Number of fields
    pub field_count: usize,
    /// Number of methods
    pub method_count: usize,
    /// Bytecode over all methods
    pub code_bytes: usize,
    /// Instructions over all methods
    pub instruction_count: usize,
    /// Largest `max_stack` of any method
    pub max_stack: u16,
}

/// Verification error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    /// The bytes do not parse as a class file
    Malformed {
        /// Byte offset of the problem
        offset: usize,
        /// What went wrong
        message: String,
    },

    /// Major version outside the supported range
    UnsupportedVersion {
        /// Major version found
        major: u16,
    },

    /// A pool reference points nowhere or at the wrong kind of entry
    BadConstant {
        /// Where the reference was found
        context: String,
        /// Referenced index
        index: u16,
        /// Entry kind required
        expected: &'static str,
    },

    /// Concrete method without a body
    MissingCode {
        /// Method name and descriptor
        method: String,
    },

    /// Bytecode that does not decode
    InvalidCode {
        /// Method name and descriptor
        method: String,
        /// Offset within the method
        offset: usize,
        /// What went wrong
        message: String,
    },

    /// Branch target outside the method or inside an instruction
    BadBranchTarget {
        /// Method name and descriptor
        method: String,
        /// Offset of the branch
        offset: usize,
        /// Target offset
        target: usize,
    },

    /// Execution can run past the last instruction
    FallsOffEnd {
        /// Method name and descriptor
        method: String,
    },

    /// `max_locals` smaller than the parameters or a used slot
    LocalsTooSmall {
        /// Method name and descriptor
        method: String,
        /// Declared `max_locals`
        max_locals: u16,
        /// Slots actually needed
        required: u16,
    },
}

impl std::fmt::Display for VerifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerifyError::Malformed { offset, message } => {
                write!(f, "Malformed class at byte {}: {}", offset, message)
            }
            VerifyError::UnsupportedVersion { major } => write!(
                f,
                "Unsupported class version {} (expected {}..={})",
                major, MIN_CLASS_VERSION, MAX_CLASS_VERSION
            ),
            VerifyError::BadConstant {
                context,
                index,
                expected,
            } => write!(f, "{}: constant #{} is not a {}", context, index, expected),
            VerifyError::MissingCode { method } => write!(f, "{}: no Code attribute", method),
            VerifyError::InvalidCode {
                method,
                offset,
                message,
            } => write!(f, "{} at {}: {}", method, offset, message),
            VerifyError::BadBranchTarget {
                method,
                offset,
                target,
            } => write!(f, "{}: branch at {} to invalid target {}", method, offset, target),
            VerifyError::FallsOffEnd { method } => {
                write!(f, "{}: control falls off the end of the code", method)
            }
            VerifyError::LocalsTooSmall {
                method,
                max_locals,
                required,
            } => write!(
                f,
                "{}: max_locals {} but {} slots are needed",
                method, max_locals, required
            ),
        }
    }
}

/// Class file verifier
pub struct Verifier {
    /// Treat warnings as errors
    strict: bool,
}

impl Verifier {
    /// Create a new verifier
    pub fn new() -> Self {
        Self { strict: false }
    }

    /// Enable strict mode (warnings become errors)
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    /// Verify a class file
    pub fn verify(&self, bytes: &[u8]) -> VerifyResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut stats = ClassStats::default();

        // Phase 1: Parse
        let class = match ClassFile::parse(bytes) {
            Ok(class) => class,
            Err(Error::InvalidClassFile { offset, message }) => {
                return self.finish(vec![VerifyError::Malformed { offset, message }], warnings, stats)
            }
            Err(other) => {
                return self.finish(
                    vec![VerifyError::Malformed {
                        offset: 0,
                        message: other.to_string(),
                    }],
                    warnings,
                    stats,
                )
            }
        };
        stats.constant_count = class.constants.len().saturating_sub(1);
        stats.field_count = class.fields.len();
        stats.method_count = class.methods.len();

        if !(MIN_CLASS_VERSION..=MAX_CLASS_VERSION).contains(&class.major_version) {
            errors.push(VerifyError::UnsupportedVersion {
                major: class.major_version,
            });
        }

        // Phase 2: Constant pool
        self.check_pool(&class, &mut errors);

        // Phase 3: Fields
        for field in &class.fields {
            if let Some(index) = field.constant_value {
                let ok = matches!(
                    class.constant(index),
                    Some(Constant::Integer(_) | Constant::Long(_) | Constant::String(_))
                );
                if !ok {
                    errors.push(VerifyError::BadConstant {
                        context: format!("field {}", field.name),
                        index,
                        expected: "constant value",
                    });
                }
            }
        }

        // Phase 4: Methods
        for method in &class.methods {
            let label = format!("{}{}", method.name, method.descriptor);
            let Some(code) = &method.code else {
                errors.push(VerifyError::MissingCode { method: label });
                continue;
            };
            stats.code_bytes += code.code.len();
            stats.max_stack = stats.max_stack.max(code.max_stack);
            if code.code.len() > HUGE_METHOD_LIMIT {
                warnings.push(format!(
                    "{}: {} bytes of bytecode will not be JIT-compiled",
                    label,
                    code.code.len()
                ));
            }
            self.check_method(&class, method, code, &label, &mut errors, &mut stats);
        }

        self.finish(errors, warnings, stats)
    }

    fn finish(&self, errors: Vec<VerifyError>, warnings: Vec<String>, stats: ClassStats) -> VerifyResult {
        let valid = errors.is_empty() && (!self.strict || warnings.is_empty());
        VerifyResult {
            valid,
            errors,
            warnings,
            stats,
        }
    }

    fn check_pool(&self, class: &ClassFile, errors: &mut Vec<VerifyError>) {
        let mut expect = |context: String, index: u16, wanted: u8, expected: &'static str| {
            if class.constant(index).map(Constant::tag) != Some(wanted) {
                errors.push(VerifyError::BadConstant {
                    context,
                    index,
                    expected,
                });
            }
        };

        for (i, entry) in class.constants.iter().enumerate() {
            let context = format!("constant #{}", i);
            match entry {
                Some(Constant::Class(name)) => expect(context, *name, tag::UTF8, "Utf8"),
                Some(Constant::String(utf8)) => expect(context, *utf8, tag::UTF8, "Utf8"),
                Some(Constant::Fieldref(c, nat) | Constant::Methodref(c, nat)) => {
                    expect(context.clone(), *c, tag::CLASS, "Class");
                    expect(context, *nat, tag::NAME_AND_TYPE, "NameAndType");
                }
                Some(Constant::NameAndType(name, desc)) => {
                    expect(context.clone(), *name, tag::UTF8, "Utf8");
                    expect(context, *desc, tag::UTF8, "Utf8");
                }
                _ => {}
            }
        }
        expect("this_class".to_string(), class.this_class, tag::CLASS, "Class");
        expect("super_class".to_string(), class.super_class, tag::CLASS, "Class");
    }

    fn check_method(
        &self,
        class: &ClassFile,
        method: &MethodInfo,
        code: &CodeAttribute,
        label: &str,
        errors: &mut Vec<VerifyError>,
        stats: &mut ClassStats,
    ) {
        let instructions = match decode_instructions(&code.code) {
            Ok(instructions) => instructions,
            Err(Error::InvalidClassFile { offset, message }) => {
                errors.push(VerifyError::InvalidCode {
                    method: label.to_string(),
                    offset,
                    message,
                });
                return;
            }
            Err(other) => {
                errors.push(VerifyError::InvalidCode {
                    method: label.to_string(),
                    offset: 0,
                    message: other.to_string(),
                });
                return;
            }
        };
        stats.instruction_count += instructions.len();

        match instructions.last() {
            Some(last) if opcodes::ends_block(last.opcode) => {}
            _ => errors.push(VerifyError::FallsOffEnd {
                method: label.to_string(),
            }),
        }

        let param_slots = opcodes::descriptor_slots(&method.descriptor).map_or(0, |(p, _)| p);
        let mut required = param_slots + u16::from(!method.is_static());

        for insn in &instructions {
            if let Some((slot, width)) = local_access(insn) {
                required = required.max(slot.saturating_add(width));
            }
            match insn.operand {
                Operand::Target(target) => {
                    let lands = instructions
                        .binary_search_by_key(&target, |i| i.offset)
                        .is_ok();
                    if !lands {
                        errors.push(VerifyError::BadBranchTarget {
                            method: label.to_string(),
                            offset: insn.offset,
                            target,
                        });
                    }
                }
                Operand::Pool(index) => {
                    let (ok, expected) = match insn.opcode {
                        opcodes::LDC | opcodes::LDC_W => (
                            matches!(
                                class.constant(index),
                                Some(Constant::Integer(_) | Constant::String(_) | Constant::Class(_))
                            ),
                            "loadable constant",
                        ),
                        opcodes::LDC2_W => (
                            matches!(class.constant(index), Some(Constant::Long(_))),
                            "Long",
                        ),
                        opcodes::GETSTATIC | opcodes::PUTSTATIC => (
                            matches!(class.constant(index), Some(Constant::Fieldref(..))),
                            "Fieldref",
                        ),
                        _ => (
                            matches!(class.constant(index), Some(Constant::Methodref(..))),
                            "Methodref",
                        ),
                    };
                    if !ok {
                        errors.push(VerifyError::BadConstant {
                            context: format!("{} at {}", label, insn.offset),
                            index,
                            expected,
                        });
                    }
                }
                _ => {}
            }
        }

        if code.max_locals < required {
            errors.push(VerifyError::LocalsTooSmall {
                method: label.to_string(),
                max_locals: code.max_locals,
                required,
            });
        }
    }
}

impl Default for Verifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::jvm::{ClassWriter, CodeBuilder, Kind, ACC_PUBLIC};

    fn class_with(body: impl FnOnce(&mut CodeBuilder<'_>) -> Result<()>, desc: &str) -> Vec<u8> {
        let mut class = ClassWriter::new("T", 49).unwrap();
        let mut code = CodeBuilder::new(class.pool_mut());
        body(&mut code).unwrap();
        let code = code.finish().unwrap();
        class.add_method(ACC_PUBLIC | ACC_STATIC, "f", desc, code).unwrap();
        class.to_bytes().unwrap()
    }

    #[test]
    fn test_valid_class_passes() {
        let bytes = class_with(
            |c| {
                c.load(Kind::Int, 0)?;
                c.load(Kind::Int, 1)?;
                c.simple(opcodes::IADD)?;
                c.simple(opcodes::IRETURN)
            },
            "(II)I",
        );
        let result = Verifier::new().verify(&bytes);
        assert!(result.valid, "{:?}", result.errors);
        assert!(result.warnings.is_empty());
        assert_eq!(result.stats.method_count, 1);
        assert_eq!(result.stats.instruction_count, 4);

        let class = ClassFile::parse(&bytes).unwrap();
        assert_eq!(class.this_class_name(), Some("T"));
        assert!(class.method("f", "(II)I").unwrap().is_static());
    }

    #[test]
    fn test_bad_magic_is_malformed() {
        let result = Verifier::new().verify(&[0xde, 0xad, 0xbe, 0xef, 0, 0]);
        assert!(!result.valid);
        assert!(matches!(result.errors[0], VerifyError::Malformed { offset: 0, .. }));
    }

    #[test]
    fn test_truncated_class_is_malformed() {
        let bytes = class_with(|c| c.simple(opcodes::RETURN), "()V");
        let result = Verifier::new().verify(&bytes[..bytes.len() - 3]);
        assert!(matches!(result.errors[0], VerifyError::Malformed { .. }));
    }

    #[test]
    fn test_missing_return_is_reported() {
        let mut bytes = class_with(|c| c.simple(opcodes::RETURN), "()V");
        // Code is the last method attribute; its final instruction byte sits
        // just before the two empty tables and the class attribute count.
        let at = bytes.len() - 7;
        assert_eq!(bytes[at], opcodes::RETURN);
        bytes[at] = opcodes::POP;
        let result = Verifier::new().verify(&bytes);
        assert!(result
            .errors
            .iter()
            .any(|e| matches!(e, VerifyError::FallsOffEnd { .. })));
    }

    #[test]
    fn test_locals_smaller_than_descriptor() {
        let bytes = class_with(|c| c.simple(opcodes::RETURN), "(JI)V");
        let result = Verifier::new().verify(&bytes);
        assert!(matches!(
            result.errors.as_slice(),
            [VerifyError::LocalsTooSmall {
                required: 3,
                max_locals: 0,
                ..
            }]
        ));
    }

    #[test]
    fn test_decode_wide_and_branches() {
        let code = [
            opcodes::WIDE,
            opcodes::ILOAD,
            0x01,
            0x2c,
            opcodes::IFEQ,
            0x00,
            0x04,
            opcodes::RETURN,
            opcodes::RETURN,
        ];
        let insns = decode_instructions(&code).unwrap();
        assert_eq!(insns[0].operand, Operand::Local(300));
        assert_eq!(insns[0].len, 4);
        assert_eq!(insns[1].operand, Operand::Target(8));
        assert_eq!(insns[1].name(), "ifeq");
        assert!(decode_instructions(&[0xca]).is_err());
        assert!(decode_instructions(&[opcodes::GOTO, 0xff, 0xf0]).is_err());
    }
}
