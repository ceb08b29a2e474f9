//! JVM opcodes used by the code generator
//!
//! Only the subset the generator emits is named here. `info` describes each
//! one for the assembler, the disassembler and the class-file checker.

// =============================================================================
// CONSTANTS
// =============================================================================

/// Push `null`
pub const ACONST_NULL: u8 = 0x01;
/// Push int -1
pub const ICONST_M1: u8 = 0x02;
/// Push int 0 (`ICONST_0 + n` for n in 0..=5)
pub const ICONST_0: u8 = 0x03;
/// Push long 0
pub const LCONST_0: u8 = 0x09;
/// Push long 1
pub const LCONST_1: u8 = 0x0a;
/// Push signed byte
pub const BIPUSH: u8 = 0x10;
/// Push signed short
pub const SIPUSH: u8 = 0x11;
/// Push constant, 1-byte pool index
pub const LDC: u8 = 0x12;
/// Push constant, 2-byte pool index
pub const LDC_W: u8 = 0x13;
/// Push long/double constant
pub const LDC2_W: u8 = 0x14;

// =============================================================================
// LOCALS
// =============================================================================

/// Load int local
pub const ILOAD: u8 = 0x15;
/// Load long local
pub const LLOAD: u8 = 0x16;
/// Load reference local
pub const ALOAD: u8 = 0x19;
/// `iload_0`, add the slot for 1..=3
pub const ILOAD_0: u8 = 0x1a;
/// `lload_0`, add the slot for 1..=3
pub const LLOAD_0: u8 = 0x1e;
/// `aload_0`, add the slot for 1..=3
pub const ALOAD_0: u8 = 0x2a;
/// Load from int array
pub const IALOAD: u8 = 0x2e;
/// Store int local
pub const ISTORE: u8 = 0x36;
/// Store long local
pub const LSTORE: u8 = 0x37;
/// Store reference local
pub const ASTORE: u8 = 0x3a;
/// `istore_0`, add the slot for 1..=3
pub const ISTORE_0: u8 = 0x3b;
/// `lstore_0`, add the slot for 1..=3
pub const LSTORE_0: u8 = 0x3f;
/// `astore_0`, add the slot for 1..=3
pub const ASTORE_0: u8 = 0x4b;
/// Store into int array
pub const IASTORE: u8 = 0x4f;

// =============================================================================
// STACK
// =============================================================================

/// Discard one slot
pub const POP: u8 = 0x57;
/// Discard two slots
pub const POP2: u8 = 0x58;
/// Duplicate top slot
pub const DUP: u8 = 0x59;

// =============================================================================
// ARITHMETIC
// =============================================================================

/// int add
pub const IADD: u8 = 0x60;
/// long add
pub const LADD: u8 = 0x61;
/// int subtract
pub const ISUB: u8 = 0x64;
/// long subtract
pub const LSUB: u8 = 0x65;
/// int multiply
pub const IMUL: u8 = 0x68;
/// long multiply
pub const LMUL: u8 = 0x69;
/// int divide
pub const IDIV: u8 = 0x6c;
/// long divide
pub const LDIV: u8 = 0x6d;
/// int remainder
pub const IREM: u8 = 0x70;
/// long remainder
pub const LREM: u8 = 0x71;
/// int negate
pub const INEG: u8 = 0x74;
/// long negate
pub const LNEG: u8 = 0x75;
/// int shift left
pub const ISHL: u8 = 0x78;
/// long shift left
pub const LSHL: u8 = 0x79;
/// int arithmetic shift right
pub const ISHR: u8 = 0x7a;
/// long arithmetic shift right
pub const LSHR: u8 = 0x7b;
/// int logical shift right
pub const IUSHR: u8 = 0x7c;
/// long logical shift right
pub const LUSHR: u8 = 0x7d;
/// int and
pub const IAND: u8 = 0x7e;
/// long and
pub const LAND: u8 = 0x7f;
/// int or
pub const IOR: u8 = 0x80;
/// long or
pub const LOR: u8 = 0x81;
/// int xor
pub const IXOR: u8 = 0x82;
/// long xor
pub const LXOR: u8 = 0x83;

// =============================================================================
// CONVERSIONS
// =============================================================================

/// int to long
pub const I2L: u8 = 0x85;
/// long to int
pub const L2I: u8 = 0x88;
/// int to byte, sign-extended
pub const I2B: u8 = 0x91;
/// int to char, zero-extended
pub const I2C: u8 = 0x92;
/// int to short, sign-extended
pub const I2S: u8 = 0x93;
/// long compare, pushes -1/0/1
pub const LCMP: u8 = 0x94;

// =============================================================================
// CONTROL FLOW
// =============================================================================

/// Branch if int == 0
pub const IFEQ: u8 = 0x99;
/// Branch if int != 0
pub const IFNE: u8 = 0x9a;
/// Branch if int < 0
pub const IFLT: u8 = 0x9b;
/// Branch if int >= 0
pub const IFGE: u8 = 0x9c;
/// Branch if int > 0
pub const IFGT: u8 = 0x9d;
/// Branch if int <= 0
pub const IFLE: u8 = 0x9e;
/// Branch if ints equal
pub const IF_ICMPEQ: u8 = 0x9f;
/// Branch if ints differ
pub const IF_ICMPNE: u8 = 0xa0;
/// Branch if int less
pub const IF_ICMPLT: u8 = 0xa1;
/// Branch if int greater or equal
pub const IF_ICMPGE: u8 = 0xa2;
/// Branch if int greater
pub const IF_ICMPGT: u8 = 0xa3;
/// Branch if int less or equal
pub const IF_ICMPLE: u8 = 0xa4;
/// Unconditional branch
pub const GOTO: u8 = 0xa7;
/// Return int
pub const IRETURN: u8 = 0xac;
/// Return long
pub const LRETURN: u8 = 0xad;
/// Return reference
pub const ARETURN: u8 = 0xb0;
/// Return void
pub const RETURN: u8 = 0xb1;

// =============================================================================
// FIELDS, CALLS, OBJECTS
// =============================================================================

/// Read static field
pub const GETSTATIC: u8 = 0xb2;
/// Write static field
pub const PUTSTATIC: u8 = 0xb3;
/// Call constructor or private method
pub const INVOKESPECIAL: u8 = 0xb7;
/// Call static method
pub const INVOKESTATIC: u8 = 0xb8;
/// New primitive array
pub const NEWARRAY: u8 = 0xbc;
/// Array length
pub const ARRAYLENGTH: u8 = 0xbe;
/// Throw
pub const ATHROW: u8 = 0xbf;
/// Widen the next local-variable instruction's index to 16 bits
pub const WIDE: u8 = 0xc4;

/// `newarray` element type for `int[]`
pub const T_INT: u8 = 10;

/// Operand encoding of an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operands {
    /// No operand bytes
    None,
    /// One signed byte (`bipush`)
    Byte,
    /// One signed short (`sipush`)
    Short,
    /// One-byte local index
    Local,
    /// One-byte constant-pool index
    Pool1,
    /// Two-byte constant-pool index
    Pool2,
    /// Two-byte signed branch offset
    Branch,
    /// One-byte array type (`newarray`)
    ArrayType,
}

impl Operands {
    /// Operand bytes following the opcode
    pub fn len(self) -> usize {
        match self {
            Operands::None => 0,
            Operands::Byte | Operands::Local | Operands::Pool1 | Operands::ArrayType => 1,
            Operands::Short | Operands::Pool2 | Operands::Branch => 2,
        }
    }

    /// True when the instruction has no operand bytes
    pub fn is_empty(self) -> bool {
        self == Operands::None
    }
}

/// Static description of an opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpInfo {
    /// Mnemonic
    pub name: &'static str,
    /// Operand encoding
    pub operands: Operands,
    /// Stack slots consumed and produced, `None` when it depends on a
    /// descriptor or a branch shape
    pub stack: Option<(u16, u16)>,
}

const fn op(name: &'static str, operands: Operands, pops: u16, pushes: u16) -> OpInfo {
    OpInfo {
        name,
        operands,
        stack: Some((pops, pushes)),
    }
}

const fn dynamic(name: &'static str, operands: Operands) -> OpInfo {
    OpInfo {
        name,
        operands,
        stack: None,
    }
}

/// Describe an opcode, `None` if it is outside the emitted subset
pub fn info(opcode: u8) -> Option<OpInfo> {
    use Operands::*;
    let info = match opcode {
        ACONST_NULL => op("aconst_null", None, 0, 1),
        ICONST_M1 => op("iconst_m1", None, 0, 1),
        0x03 => op("iconst_0", None, 0, 1),
        0x04 => op("iconst_1", None, 0, 1),
        0x05 => op("iconst_2", None, 0, 1),
        0x06 => op("iconst_3", None, 0, 1),
        0x07 => op("iconst_4", None, 0, 1),
        0x08 => op("iconst_5", None, 0, 1),
        LCONST_0 => op("lconst_0", None, 0, 2),
        LCONST_1 => op("lconst_1", None, 0, 2),
        BIPUSH => op("bipush", Byte, 0, 1),
        SIPUSH => op("sipush", Short, 0, 1),
        LDC => op("ldc", Pool1, 0, 1),
        LDC_W => op("ldc_w", Pool2, 0, 1),
        LDC2_W => op("ldc2_w", Pool2, 0, 2),
        ILOAD => op("iload", Local, 0, 1),
        LLOAD => op("lload", Local, 0, 2),
        ALOAD => op("aload", Local, 0, 1),
        0x1a..=0x1d => op(["iload_0", "iload_1", "iload_2", "iload_3"][(opcode - ILOAD_0) as usize], None, 0, 1),
        0x1e..=0x21 => op(["lload_0", "lload_1", "lload_2", "lload_3"][(opcode - LLOAD_0) as usize], None, 0, 2),
        0x2a..=0x2d => op(["aload_0", "aload_1", "aload_2", "aload_3"][(opcode - ALOAD_0) as usize], None, 0, 1),
        IALOAD => op("iaload", None, 2, 1),
        ISTORE => op("istore", Local, 1, 0),
        LSTORE => op("lstore", Local, 2, 0),
        ASTORE => op("astore", Local, 1, 0),
        0x3b..=0x3e => op(["istore_0", "istore_1", "istore_2", "istore_3"][(opcode - ISTORE_0) as usize], None, 1, 0),
        0x3f..=0x42 => op(["lstore_0", "lstore_1", "lstore_2", "lstore_3"][(opcode - LSTORE_0) as usize], None, 2, 0),
        0x4b..=0x4e => op(["astore_0", "astore_1", "astore_2", "astore_3"][(opcode - ASTORE_0) as usize], None, 1, 0),
        IASTORE => op("iastore", None, 3, 0),
        POP => op("pop", None, 1, 0),
        POP2 => op("pop2", None, 2, 0),
        DUP => op("dup", None, 1, 2),
        IADD => op("iadd", None, 2, 1),
        LADD => op("ladd", None, 4, 2),
        ISUB => op("isub", None, 2, 1),
        LSUB => op("lsub", None, 4, 2),
        IMUL => op("imul", None, 2, 1),
        LMUL => op("lmul", None, 4, 2),
        IDIV => op("idiv", None, 2, 1),
        LDIV => op("ldiv", None, 4, 2),
        IREM => op("irem", None, 2, 1),
        LREM => op("lrem", None, 4, 2),
        INEG => op("ineg", None, 1, 1),
        LNEG => op("lneg", None, 2, 2),
        ISHL => op("ishl", None, 2, 1),
        LSHL => op("lshl", None, 3, 2),
        ISHR => op("ishr", None, 2, 1),
        LSHR => op("lshr", None, 3, 2),
        IUSHR => op("iushr", None, 2, 1),
        LUSHR => op("lushr", None, 3, 2),
        IAND => op("iand", None, 2, 1),
        LAND => op("land", None, 4, 2),
        IOR => op("ior", None, 2, 1),
        LOR => op("lor", None, 4, 2),
        IXOR => op("ixor", None, 2, 1),
        LXOR => op("lxor", None, 4, 2),
        I2L => op("i2l", None, 1, 2),
        L2I => op("l2i", None, 2, 1),
        I2B => op("i2b", None, 1, 1),
        I2C => op("i2c", None, 1, 1),
        I2S => op("i2s", None, 1, 1),
        LCMP => op("lcmp", None, 4, 1),
        IFEQ => op("ifeq", Branch, 1, 0),
        IFNE => op("ifne", Branch, 1, 0),
        IFLT => op("iflt", Branch, 1, 0),
        IFGE => op("ifge", Branch, 1, 0),
        IFGT => op("ifgt", Branch, 1, 0),
        IFLE => op("ifle", Branch, 1, 0),
        IF_ICMPEQ => op("if_icmpeq", Branch, 2, 0),
        IF_ICMPNE => op("if_icmpne", Branch, 2, 0),
        IF_ICMPLT => op("if_icmplt", Branch, 2, 0),
        IF_ICMPGE => op("if_icmpge", Branch, 2, 0),
        IF_ICMPGT => op("if_icmpgt", Branch, 2, 0),
        IF_ICMPLE => op("if_icmple", Branch, 2, 0),
        GOTO => op("goto", Branch, 0, 0),
        IRETURN => op("ireturn", None, 1, 0),
        LRETURN => op("lreturn", None, 2, 0),
        ARETURN => op("areturn", None, 1, 0),
        RETURN => op("return", None, 0, 0),
        GETSTATIC => dynamic("getstatic", Pool2),
        PUTSTATIC => dynamic("putstatic", Pool2),
        INVOKESPECIAL => dynamic("invokespecial", Pool2),
        INVOKESTATIC => dynamic("invokestatic", Pool2),
        NEWARRAY => op("newarray", ArrayType, 1, 1),
        ARRAYLENGTH => op("arraylength", None, 1, 1),
        ATHROW => op("athrow", None, 1, 0),
        _ => return Option::None,
    };
    Some(info)
}

/// True for instructions after which control does not fall through
pub fn ends_block(opcode: u8) -> bool {
    matches!(
        opcode,
        GOTO | IRETURN | LRETURN | ARETURN | RETURN | ATHROW
    )
}

/// Slots taken by each parameter and by the return value of a method
/// descriptor such as `(IJ[I)V`
pub fn descriptor_slots(descriptor: &str) -> Option<(u16, u16)> {
    let rest = descriptor.strip_prefix('(')?;
    let (params, ret) = rest.split_once(')')?;

    let mut slots = 0u16;
    let mut chars = params.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            'J' | 'D' => slots += 2,
            'Z' | 'B' | 'S' | 'C' | 'I' | 'F' => slots += 1,
            '[' => {
                while chars.peek() == Some(&'[') {
                    chars.next();
                }
                if chars.next_if_eq(&'L').is_some() {
                    chars.find(|&c| c == ';')?;
                } else {
                    chars.next()?;
                }
                slots += 1;
            }
            'L' => {
                chars.find(|&c| c == ';')?;
                slots += 1;
            }
            _ => return None,
        }
    }

    let ret_slots = match ret {
        "V" => 0,
        "J" | "D" => 2,
        _ => 1,
    };
    Some((slots, ret_slots))
}

/// Slots taken by a field of the given descriptor
pub fn field_slots(descriptor: &str) -> u16 {
    match descriptor {
        "J" | "D" => 2,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_slots() {
        assert_eq!(descriptor_slots("()V"), Some((0, 0)));
        assert_eq!(descriptor_slots("(IIJIZ)V"), Some((6, 0)));
        assert_eq!(descriptor_slots("(I[I)I"), Some((2, 1)));
        assert_eq!(descriptor_slots("(Ljava/lang/Class;)V"), Some((1, 0)));
        assert_eq!(descriptor_slots("([Ljava/lang/String;)V"), Some((1, 0)));
        assert_eq!(descriptor_slots("(J)J"), Some((2, 2)));
        assert_eq!(descriptor_slots("I"), None);
    }

    #[test]
    fn test_info_covers_short_forms() {
        assert_eq!(info(ILOAD_0 + 3).map(|i| i.name), Some("iload_3"));
        assert_eq!(info(LSTORE_0 + 1).map(|i| i.stack), Some(Some((2, 0))));
        assert_eq!(info(GOTO).map(|i| i.operands), Some(Operands::Branch));
        assert!(info(0xca).is_none());
    }
}
