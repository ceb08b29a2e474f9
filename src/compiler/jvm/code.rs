//! Bytecode assembler for a single method body
//!
//! Tracks operand stack depth as instructions are emitted, so `max_stack`
//! falls out of emission. Forward branches are recorded and patched in
//! `finish`, the same way the BPF backend resolves its pending jumps.

use super::constant_pool::ConstantPool;
use super::opcodes::{self, *};
use crate::parser::Type;
use crate::{Error, Result};

/// A branch target inside one method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(usize);

/// JVM computational category of a local or stack value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// `int` and everything narrower, plus addresses
    Int,
    /// `long`
    Long,
    /// Object reference (the `int[]` of a variadic tail)
    Reference,
}

impl Kind {
    /// Category of a value of IR type `ty`
    pub fn of(ty: &Type) -> Kind {
        match ty {
            Type::Vararg => Kind::Reference,
            ty if ty.is_wide() => Kind::Long,
            _ => Kind::Int,
        }
    }

    /// Slots taken in the local table and on the operand stack
    pub fn size(self) -> u16 {
        match self {
            Kind::Long => 2,
            _ => 1,
        }
    }

    fn load_opcodes(self) -> (u8, u8) {
        match self {
            Kind::Int => (ILOAD, ILOAD_0),
            Kind::Long => (LLOAD, LLOAD_0),
            Kind::Reference => (ALOAD, ALOAD_0),
        }
    }

    fn store_opcodes(self) -> (u8, u8) {
        match self {
            Kind::Int => (ISTORE, ISTORE_0),
            Kind::Long => (LSTORE, LSTORE_0),
            Kind::Reference => (ASTORE, ASTORE_0),
        }
    }
}

/// An assembled `Code` attribute body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Code {
    /// Bytecode
    pub code: Vec<u8>,
    /// Deepest operand stack reached
    pub max_stack: u16,
    /// Local slots used, arguments included
    pub max_locals: u16,
}

/// Pending branch: opcode position, operand position, target
struct PendingBranch {
    at: usize,
    operand: usize,
    target: Label,
}

/// Method body under construction
pub struct CodeBuilder<'p> {
    pool: &'p mut ConstantPool,
    code: Vec<u8>,
    labels: Vec<Option<usize>>,
    label_depths: Vec<Option<u16>>,
    pending: Vec<PendingBranch>,
    // None after goto/return/athrow until the next bound label
    depth: Option<u16>,
    max_stack: u16,
    max_locals: u16,
}

impl<'p> CodeBuilder<'p> {
    /// Creates an empty body whose constants go into `pool`
    pub fn new(pool: &'p mut ConstantPool) -> Self {
        Self {
            pool,
            code: Vec::new(),
            labels: Vec::new(),
            label_depths: Vec::new(),
            pending: Vec::new(),
            depth: Some(0),
            max_stack: 0,
            max_locals: 0,
        }
    }

    /// The constant pool shared with the enclosing class
    pub fn pool(&mut self) -> &mut ConstantPool {
        &mut *self.pool
    }

    /// Current bytecode offset
    pub fn position(&self) -> usize {
        self.code.len()
    }

    /// Current stack depth, `None` in unreachable code
    pub fn depth(&self) -> Option<u16> {
        self.depth
    }

    /// True unless the last instruction ended the block
    pub fn is_reachable(&self) -> bool {
        self.depth.is_some()
    }

    /// Makes sure at least `slots` locals are reserved
    pub fn reserve_locals(&mut self, slots: u16) {
        self.max_locals = self.max_locals.max(slots);
    }

    // =========================================================================
    // LABELS
    // =========================================================================

    /// Allocates an unbound label
    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        self.label_depths.push(None);
        Label(self.labels.len() - 1)
    }

    /// Binds `label` to the current position
    pub fn bind(&mut self, label: Label) -> Result<()> {
        if self.labels[label.0].is_some() {
            return Err(Error::class_format(format!("label {} bound twice", label.0)));
        }
        self.labels[label.0] = Some(self.code.len());

        let depth = match (self.depth, self.label_depths[label.0]) {
            (Some(here), Some(expected)) if here != expected => {
                return Err(Error::class_format(format!(
                    "stack depth {} at label {} but {} on a branch to it",
                    here, label.0, expected
                )))
            }
            (Some(here), _) => here,
            (None, Some(expected)) => expected,
            (None, None) => 0,
        };
        self.label_depths[label.0] = Some(depth);
        self.depth = Some(depth);
        Ok(())
    }

    // =========================================================================
    // EMISSION
    // =========================================================================

    fn adjust(&mut self, pops: u16, pushes: u16) -> Result<()> {
        let depth = self.depth.unwrap_or(0);
        let after = depth.checked_sub(pops).ok_or_else(|| {
            Error::class_format(format!(
                "operand stack underflow at offset {}",
                self.code.len()
            ))
        })? + pushes;
        self.max_stack = self.max_stack.max(after);
        self.depth = Some(after);
        Ok(())
    }

    fn emit_u16(&mut self, value: u16) {
        self.code.extend_from_slice(&value.to_be_bytes());
    }

    /// An instruction with no operands
    pub fn simple(&mut self, opcode: u8) -> Result<()> {
        let (pops, pushes) = opcodes::info(opcode)
            .filter(|info| info.operands.is_empty())
            .and_then(|info| info.stack)
            .ok_or_else(|| {
                Error::class_format(format!("opcode 0x{:02x} is not a simple instruction", opcode))
            })?;
        self.adjust(pops, pushes)?;
        self.code.push(opcode);
        if opcodes::ends_block(opcode) {
            self.depth = None;
        }
        Ok(())
    }

    /// A branch to `target`
    pub fn branch(&mut self, opcode: u8, target: Label) -> Result<()> {
        let (pops, pushes) = opcodes::info(opcode)
            .filter(|info| info.operands == Operands::Branch)
            .and_then(|info| info.stack)
            .ok_or_else(|| Error::class_format(format!("opcode 0x{:02x} is not a branch", opcode)))?;
        self.adjust(pops, pushes)?;
        let depth = self.depth.unwrap_or(0);
        match self.label_depths[target.0] {
            Some(expected) if expected != depth => {
                return Err(Error::class_format(format!(
                    "branch to label {} with stack depth {}, expected {}",
                    target.0, depth, expected
                )))
            }
            _ => self.label_depths[target.0] = Some(depth),
        }

        let at = self.code.len();
        self.code.push(opcode);
        self.pending.push(PendingBranch {
            at,
            operand: at + 1,
            target,
        });
        self.emit_u16(0);
        if opcodes::ends_block(opcode) {
            self.depth = None;
        }
        Ok(())
    }

    /// Pushes an int constant using the shortest encoding
    pub fn push_int(&mut self, value: i32) -> Result<()> {
        match value {
            -1..=5 => self.simple((ICONST_0 as i32 + value) as u8),
            v if i8::try_from(v).is_ok() => {
                self.adjust(0, 1)?;
                self.code.push(BIPUSH);
                self.code.push(v as i8 as u8);
                Ok(())
            }
            v if i16::try_from(v).is_ok() => {
                self.adjust(0, 1)?;
                self.code.push(SIPUSH);
                self.emit_u16(v as i16 as u16);
                Ok(())
            }
            v => {
                let index = self.pool.integer(v)?;
                self.ldc(index)
            }
        }
    }

    /// Pushes a long constant
    pub fn push_long(&mut self, value: i64) -> Result<()> {
        match value {
            0 => self.simple(LCONST_0),
            1 => self.simple(LCONST_1),
            v => match i32::try_from(v) {
                Ok(small) if (-32768..=32767).contains(&small) => {
                    self.push_int(small)?;
                    self.simple(I2L)
                }
                _ => {
                    let index = self.pool.long(v)?;
                    self.adjust(0, 2)?;
                    self.code.push(LDC2_W);
                    self.emit_u16(index);
                    Ok(())
                }
            },
        }
    }

    fn ldc(&mut self, index: u16) -> Result<()> {
        self.adjust(0, 1)?;
        match u8::try_from(index) {
            Ok(short) => {
                self.code.push(LDC);
                self.code.push(short);
            }
            Err(_) => {
                self.code.push(LDC_W);
                self.emit_u16(index);
            }
        }
        Ok(())
    }

    /// Pushes a `java.lang.Class` constant
    pub fn ldc_class(&mut self, internal_name: &str) -> Result<()> {
        let index = self.pool.class(internal_name)?;
        self.ldc(index)
    }

    /// Pushes a string constant
    pub fn ldc_string(&mut self, value: &str) -> Result<()> {
        let index = self.pool.string(value)?;
        self.ldc(index)
    }

    fn local_op(&mut self, forms: (u8, u8), kind: Kind, slot: u16) {
        let (long_form, short_base) = forms;
        match slot {
            0..=3 => self.code.push(short_base + slot as u8),
            4..=255 => {
                self.code.push(long_form);
                self.code.push(slot as u8);
            }
            _ => {
                self.code.push(WIDE);
                self.code.push(long_form);
                self.emit_u16(slot);
            }
        }
        self.reserve_locals(slot.saturating_add(kind.size()));
    }

    /// Pushes local `slot`
    pub fn load(&mut self, kind: Kind, slot: u16) -> Result<()> {
        self.adjust(0, kind.size())?;
        self.local_op(kind.load_opcodes(), kind, slot);
        Ok(())
    }

    /// Pops into local `slot`
    pub fn store(&mut self, kind: Kind, slot: u16) -> Result<()> {
        self.adjust(kind.size(), 0)?;
        self.local_op(kind.store_opcodes(), kind, slot);
        Ok(())
    }

    /// Discards a value of `kind` from the stack
    pub fn pop(&mut self, kind: Kind) -> Result<()> {
        self.simple(if kind == Kind::Long { POP2 } else { POP })
    }

    /// `newarray int`
    pub fn newarray_int(&mut self) -> Result<()> {
        self.adjust(1, 1)?;
        self.code.push(NEWARRAY);
        self.code.push(T_INT);
        Ok(())
    }

    fn invoke(&mut self, opcode: u8, receiver: u16, owner: &str, name: &str, descriptor: &str) -> Result<()> {
        let (params, ret) = opcodes::descriptor_slots(descriptor)
            .ok_or_else(|| Error::class_format(format!("malformed method descriptor {}", descriptor)))?;
        let index = self.pool.method_ref(owner, name, descriptor)?;
        self.adjust(params + receiver, ret)?;
        self.code.push(opcode);
        self.emit_u16(index);
        Ok(())
    }

    /// `invokestatic owner.name descriptor`
    pub fn invoke_static(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<()> {
        self.invoke(INVOKESTATIC, 0, owner, name, descriptor)
    }

    /// `invokespecial owner.name descriptor` on the receiver below the args
    pub fn invoke_special(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<()> {
        self.invoke(INVOKESPECIAL, 1, owner, name, descriptor)
    }

    /// `getstatic owner.name descriptor`
    pub fn get_static(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<()> {
        let index = self.pool.field_ref(owner, name, descriptor)?;
        self.adjust(0, opcodes::field_slots(descriptor))?;
        self.code.push(GETSTATIC);
        self.emit_u16(index);
        Ok(())
    }

    /// `putstatic owner.name descriptor`
    pub fn put_static(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<()> {
        let index = self.pool.field_ref(owner, name, descriptor)?;
        self.adjust(opcodes::field_slots(descriptor), 0)?;
        self.code.push(PUTSTATIC);
        self.emit_u16(index);
        Ok(())
    }

    /// Patches every branch and returns the finished body
    pub fn finish(mut self) -> Result<Code> {
        for branch in &self.pending {
            let target = self.labels[branch.target.0].ok_or_else(|| {
                Error::class_format(format!(
                    "branch at offset {} to unbound label {}",
                    branch.at, branch.target.0
                ))
            })?;
            let offset = i16::try_from(target as i64 - branch.at as i64).map_err(|_| {
                Error::class_format(format!(
                    "branch at offset {} cannot reach offset {}",
                    branch.at, target
                ))
            })?;
            self.code[branch.operand..branch.operand + 2].copy_from_slice(&offset.to_be_bytes());
        }
        if self.code.len() > u16::MAX as usize {
            return Err(Error::class_format(format!(
                "method body of {} bytes exceeds the 65535 byte limit",
                self.code.len()
            )));
        }
        Ok(Code {
            code: self.code,
            max_stack: self.max_stack,
            max_locals: self.max_locals,
        })
    }
}
