//! Minimal bytecode interpreter for compiled classes
//!
//! Executes the instruction subset the compiler emits and emulates the
//! runtime class: a 1 MiB little-endian memory, a stack pointer starting
//! just below its top, the load/store and comparison helpers, and `puts` /
//! `printf` writing into a captured output buffer.

#![allow(dead_code)]

use llvm2jvm::compiler::jvm::constant_pool::Constant;
use llvm2jvm::compiler::jvm::opcodes::*;
use llvm2jvm::compiler::verifier::{decode_instructions, CodeAttribute, Instruction, Operand};
use llvm2jvm::compiler::{ClassFile, CompileOptions, Compiler};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

pub const MEM_SIZE: usize = 1 << 20;
pub const RUNTIME: &str = "com/jtransc/llvm2jvm/LlvmRuntime";
const STEP_LIMIT: usize = 5_000_000;
const BOOTSTRAP_DESCRIPTOR: &str = "([Ljava/lang/String;)V";

/// A JVM value; longs take one entry here, not two
#[derive(Debug, Clone, PartialEq)]
pub enum Val {
    Int(i32),
    Long(i64),
    Str(String),
    IntArray(Rc<RefCell<Vec<i32>>>),
    Class(String),
    Null,
}

impl Val {
    pub fn int(&self) -> Result<i32, String> {
        match self {
            Val::Int(v) => Ok(*v),
            other => Err(format!("expected int, found {:?}", other)),
        }
    }

    pub fn long(&self) -> Result<i64, String> {
        match self {
            Val::Long(v) => Ok(*v),
            other => Err(format!("expected long, found {:?}", other)),
        }
    }
}

pub struct Jvm {
    pub class: ClassFile,
    pub class_name: String,
    pub mem: Vec<u8>,
    pub sp: i32,
    pub statics: HashMap<String, Val>,
    pub stdout: String,
    pub exit_code: Option<i32>,
    steps: usize,
}

/// Compile `source` as class `Main` and load it
pub fn load(source: &str) -> Jvm {
    let result = Compiler::new(CompileOptions::default())
        .compile(source)
        .unwrap_or_else(|e| panic!("compile failed: {}", e));
    Jvm::load(&result.class_bytes).unwrap_or_else(|e| panic!("load failed: {}", e))
}

/// Compile, load and run `main()`, returning its result and the output
pub fn run_main(source: &str) -> (i32, String) {
    let mut jvm = load(source);
    let ret = jvm
        .call("main", &[])
        .unwrap_or_else(|e| panic!("execution failed: {}", e))
        .expect("main returns a value")
        .int()
        .unwrap();
    (ret, jvm.stdout)
}

fn param_count(descriptor: &str) -> usize {
    let params = descriptor
        .strip_prefix('(')
        .and_then(|d| d.split(')').next())
        .unwrap_or("");
    let mut count = 0;
    let mut chars = params.chars();
    while let Some(c) = chars.next() {
        match c {
            '[' => continue,
            'L' => {
                for c in chars.by_ref() {
                    if c == ';' {
                        break;
                    }
                }
            }
            _ => {}
        }
        count += 1;
    }
    count
}

impl Jvm {
    pub fn load(bytes: &[u8]) -> Result<Jvm, String> {
        let class = ClassFile::parse(bytes).map_err(|e| e.to_string())?;
        let class_name = class
            .this_class_name()
            .ok_or("missing this_class")?
            .to_string();
        let mut statics = HashMap::new();
        for field in &class.fields {
            let value = match field.constant_value.and_then(|i| class.constant(i)) {
                Some(Constant::Integer(v)) => Val::Int(*v),
                Some(Constant::Long(v)) => Val::Long(*v),
                Some(Constant::String(_)) => Val::Str(
                    class
                        .string(field.constant_value.unwrap_or(0))
                        .unwrap_or_default()
                        .to_string(),
                ),
                _ => Val::Null,
            };
            statics.insert(field.name.clone(), value);
        }
        let mut jvm = Jvm {
            class,
            class_name,
            mem: vec![0; MEM_SIZE],
            sp: (MEM_SIZE - 0x10) as i32,
            statics,
            stdout: String::new(),
            exit_code: None,
            steps: 0,
        };
        if jvm.class.method("<clinit>", "()V").is_some() {
            jvm.invoke("<clinit>", "()V", Vec::new())?;
        }
        Ok(jvm)
    }

    /// Call the compiled function `name`, skipping the `main(String[])`
    /// bootstrap
    pub fn call(&mut self, name: &str, args: &[Val]) -> Result<Option<Val>, String> {
        let descriptor = self
            .class
            .methods
            .iter()
            .find(|m| m.name == name && m.descriptor != BOOTSTRAP_DESCRIPTOR)
            .ok_or_else(|| format!("no method {}", name))?
            .descriptor
            .clone();
        self.invoke(name, &descriptor, args.to_vec())
    }

    pub fn invoke(&mut self, name: &str, descriptor: &str, args: Vec<Val>) -> Result<Option<Val>, String> {
        let method = self
            .class
            .method(name, descriptor)
            .ok_or_else(|| format!("no method {}{}", name, descriptor))?;
        let code: CodeAttribute = method.code.clone().ok_or("abstract method")?;
        let instructions = decode_instructions(&code.code).map_err(|e| e.to_string())?;
        let mut locals = vec![Val::Int(0); code.max_locals as usize + 1];
        let mut slot = 0;
        for arg in args {
            let width = if matches!(arg, Val::Long(_)) { 2 } else { 1 };
            locals[slot] = arg;
            slot += width;
        }
        self.execute(&instructions, &mut locals)
    }

    fn execute(&mut self, code: &[Instruction], locals: &mut [Val]) -> Result<Option<Val>, String> {
        let index: HashMap<usize, usize> = code.iter().enumerate().map(|(i, insn)| (insn.offset, i)).collect();
        let mut stack: Vec<Val> = Vec::new();
        let mut pc = 0usize;

        macro_rules! pop {
            () => {
                stack.pop().ok_or("operand stack underflow")?
            };
        }
        macro_rules! int_op {
            ($f:expr) => {{
                let b = pop!().int()?;
                let a = pop!().int()?;
                stack.push(Val::Int($f(a, b)));
            }};
        }
        macro_rules! long_op {
            ($f:expr) => {{
                let b = pop!().long()?;
                let a = pop!().long()?;
                stack.push(Val::Long($f(a, b)));
            }};
        }
        macro_rules! long_shift {
            ($f:expr) => {{
                let s = pop!().int()?;
                let a = pop!().long()?;
                stack.push(Val::Long($f(a, (s & 63) as u32)));
            }};
        }

        loop {
            self.steps += 1;
            if self.steps > STEP_LIMIT {
                return Err("step limit exceeded".into());
            }
            let insn = code.get(pc).ok_or("fell off the end of the code")?;
            pc += 1;
            let mut jump = |target: usize| -> Result<(), String> {
                pc = *index.get(&target).ok_or("branch into an instruction")?;
                Ok(())
            };

            match insn.opcode {
                ACONST_NULL => stack.push(Val::Null),
                op @ 0x02..=0x08 => stack.push(Val::Int(op as i32 - ICONST_0 as i32)),
                LCONST_0 => stack.push(Val::Long(0)),
                LCONST_1 => stack.push(Val::Long(1)),
                BIPUSH | SIPUSH => match insn.operand {
                    Operand::Int(v) => stack.push(Val::Int(v)),
                    _ => return Err("bad push operand".into()),
                },
                LDC | LDC_W | LDC2_W => {
                    let Operand::Pool(i) = insn.operand else {
                        return Err("bad ldc operand".into());
                    };
                    let value = match self.class.constant(i) {
                        Some(Constant::Integer(v)) => Val::Int(*v),
                        Some(Constant::Long(v)) => Val::Long(*v),
                        Some(Constant::String(_)) => Val::Str(self.class.string(i).unwrap_or_default().to_string()),
                        Some(Constant::Class(_)) => Val::Class(self.class.class_name(i).unwrap_or_default().to_string()),
                        other => return Err(format!("ldc of {:?}", other)),
                    };
                    stack.push(value);
                }
                ILOAD | LLOAD | ALOAD | 0x1a..=0x21 | 0x2a..=0x2d => {
                    let slot = local_slot(insn)?;
                    stack.push(locals[slot].clone());
                }
                ISTORE | LSTORE | ASTORE | 0x3b..=0x42 | 0x4b..=0x4e => {
                    let slot = local_slot(insn)?;
                    locals[slot] = pop!();
                }
                IALOAD => {
                    let i = pop!().int()?;
                    match pop!() {
                        Val::IntArray(a) => {
                            let v = *a.borrow().get(i as usize).ok_or("array index out of bounds")?;
                            stack.push(Val::Int(v));
                        }
                        other => return Err(format!("iaload on {:?}", other)),
                    }
                }
                IASTORE => {
                    let v = pop!().int()?;
                    let i = pop!().int()?;
                    match pop!() {
                        Val::IntArray(a) => {
                            *a.borrow_mut().get_mut(i as usize).ok_or("array index out of bounds")? = v;
                        }
                        other => return Err(format!("iastore on {:?}", other)),
                    }
                }
                POP | POP2 => {
                    pop!();
                }
                DUP => {
                    let v = stack.last().cloned().ok_or("dup on empty stack")?;
                    stack.push(v);
                }
                IADD => int_op!(i32::wrapping_add),
                ISUB => int_op!(i32::wrapping_sub),
                IMUL => int_op!(i32::wrapping_mul),
                IDIV | IREM => {
                    let b = pop!().int()?;
                    let a = pop!().int()?;
                    if b == 0 {
                        return Err("ArithmeticException: / by zero".into());
                    }
                    stack.push(Val::Int(if insn.opcode == IDIV { a.wrapping_div(b) } else { a.wrapping_rem(b) }));
                }
                IAND => int_op!(|a: i32, b: i32| a & b),
                IOR => int_op!(|a: i32, b: i32| a | b),
                IXOR => int_op!(|a: i32, b: i32| a ^ b),
                ISHL => int_op!(|a: i32, b: i32| a.wrapping_shl(b as u32 & 31)),
                ISHR => int_op!(|a: i32, b: i32| a >> (b & 31)),
                IUSHR => int_op!(|a: i32, b: i32| ((a as u32) >> (b & 31)) as i32),
                LADD => long_op!(i64::wrapping_add),
                LSUB => long_op!(i64::wrapping_sub),
                LMUL => long_op!(i64::wrapping_mul),
                LDIV | LREM => {
                    let b = pop!().long()?;
                    let a = pop!().long()?;
                    if b == 0 {
                        return Err("ArithmeticException: / by zero".into());
                    }
                    stack.push(Val::Long(if insn.opcode == LDIV { a.wrapping_div(b) } else { a.wrapping_rem(b) }));
                }
                LAND => long_op!(|a: i64, b: i64| a & b),
                LOR => long_op!(|a: i64, b: i64| a | b),
                LXOR => long_op!(|a: i64, b: i64| a ^ b),
                LSHL => long_shift!(|a: i64, s: u32| a.wrapping_shl(s)),
                LSHR => long_shift!(|a: i64, s: u32| a >> s),
                LUSHR => long_shift!(|a: i64, s: u32| ((a as u64) >> s) as i64),
                INEG => {
                    let a = pop!().int()?;
                    stack.push(Val::Int(a.wrapping_neg()));
                }
                LNEG => {
                    let a = pop!().long()?;
                    stack.push(Val::Long(a.wrapping_neg()));
                }
                I2L => {
                    let a = pop!().int()?;
                    stack.push(Val::Long(a as i64));
                }
                L2I => {
                    let a = pop!().long()?;
                    stack.push(Val::Int(a as i32));
                }
                I2B => {
                    let a = pop!().int()?;
                    stack.push(Val::Int(a as i8 as i32));
                }
                I2C => {
                    let a = pop!().int()?;
                    stack.push(Val::Int(a as u16 as i32));
                }
                I2S => {
                    let a = pop!().int()?;
                    stack.push(Val::Int(a as i16 as i32));
                }
                LCMP => {
                    let b = pop!().long()?;
                    let a = pop!().long()?;
                    stack.push(Val::Int(a.cmp(&b) as i32));
                }
                IFEQ | IFNE | IFLT | IFGE | IFGT | IFLE => {
                    let a = pop!().int()?;
                    let taken = match insn.opcode {
                        IFEQ => a == 0,
                        IFNE => a != 0,
                        IFLT => a < 0,
                        IFGE => a >= 0,
                        IFGT => a > 0,
                        _ => a <= 0,
                    };
                    if taken {
                        jump(target(insn)?)?;
                    }
                }
                IF_ICMPEQ | IF_ICMPNE | IF_ICMPLT | IF_ICMPGE | IF_ICMPGT | IF_ICMPLE => {
                    let b = pop!().int()?;
                    let a = pop!().int()?;
                    let taken = match insn.opcode {
                        IF_ICMPEQ => a == b,
                        IF_ICMPNE => a != b,
                        IF_ICMPLT => a < b,
                        IF_ICMPGE => a >= b,
                        IF_ICMPGT => a > b,
                        _ => a <= b,
                    };
                    if taken {
                        jump(target(insn)?)?;
                    }
                }
                GOTO => jump(target(insn)?)?,
                IRETURN | LRETURN | ARETURN => return Ok(Some(pop!())),
                RETURN => return Ok(None),
                GETSTATIC => {
                    let (owner, name, _) = self.member(insn)?;
                    if owner == RUNTIME && name == "SP" {
                        stack.push(Val::Int(self.sp));
                    } else {
                        let value = self.statics.get(&name).cloned().ok_or_else(|| format!("no field {}", name))?;
                        stack.push(value);
                    }
                }
                PUTSTATIC => {
                    let (owner, name, _) = self.member(insn)?;
                    let value = pop!();
                    if owner == RUNTIME && name == "SP" {
                        self.sp = value.int()?;
                    } else {
                        self.statics.insert(name, value);
                    }
                }
                INVOKESPECIAL => {
                    let (owner, name, _) = self.member(insn)?;
                    if owner != "java/lang/Object" || name != "<init>" {
                        return Err(format!("invokespecial {}.{}", owner, name));
                    }
                    pop!();
                }
                INVOKESTATIC => {
                    let (owner, name, desc) = self.member(insn)?;
                    let n = param_count(&desc);
                    if stack.len() < n {
                        return Err("operand stack underflow".into());
                    }
                    let args = stack.split_off(stack.len() - n);
                    let result = if owner == RUNTIME {
                        self.runtime_call(&name, args)?
                    } else if owner == self.class_name {
                        self.invoke(&name, &desc, args)?
                    } else {
                        return Err(format!("call to foreign class {}", owner));
                    };
                    if let Some(value) = result {
                        stack.push(value);
                    }
                }
                NEWARRAY => {
                    let n = pop!().int()?;
                    stack.push(Val::IntArray(Rc::new(RefCell::new(vec![0; n as usize]))));
                }
                ARRAYLENGTH => match pop!() {
                    Val::IntArray(a) => stack.push(Val::Int(a.borrow().len() as i32)),
                    other => return Err(format!("arraylength on {:?}", other)),
                },
                ATHROW => return Err("athrow".into()),
                other => return Err(format!("unhandled opcode 0x{:02x}", other)),
            }
        }
    }

    fn member(&self, insn: &Instruction) -> Result<(String, String, String), String> {
        let Operand::Pool(i) = insn.operand else {
            return Err("member operand".into());
        };
        let (o, n, d) = self.class.member_ref(i).ok_or("bad member ref")?;
        Ok((o.to_string(), n.to_string(), d.to_string()))
    }

    // =========================================================================
    // Runtime emulation
    // =========================================================================

    fn addr(&self, address: i32, len: usize) -> Result<usize, String> {
        let start = usize::try_from(address).map_err(|_| format!("negative address {}", address))?;
        if start + len > self.mem.len() {
            return Err(format!("address {} out of range", address));
        }
        Ok(start)
    }

    pub fn read_i32(&self, address: i32) -> Result<i32, String> {
        let a = self.addr(address, 4)?;
        Ok(i32::from_le_bytes([self.mem[a], self.mem[a + 1], self.mem[a + 2], self.mem[a + 3]]))
    }

    pub fn c_string(&self, address: i32) -> Result<String, String> {
        let mut a = self.addr(address, 1)?;
        let mut out = String::new();
        while a < self.mem.len() && self.mem[a] != 0 {
            out.push(self.mem[a] as char);
            a += 1;
        }
        Ok(out)
    }

    fn format(&self, fmt: &str, args: &[i32]) -> Result<String, String> {
        let mut out = String::new();
        let mut args = args.iter();
        let mut chars = fmt.chars();
        while let Some(c) = chars.next() {
            if c != '%' {
                out.push(c);
                continue;
            }
            let mut next = || args.next().copied().ok_or("printf: missing argument");
            match chars.next() {
                Some('d') | Some('i') => out.push_str(&next()?.to_string()),
                Some('u') => out.push_str(&(next()? as u32).to_string()),
                Some('x') => out.push_str(&format!("{:x}", next()?)),
                Some('c') => out.push(next()? as u8 as char),
                Some('s') => {
                    let address = next()?;
                    out.push_str(&self.c_string(address)?);
                }
                Some('%') => out.push('%'),
                other => return Err(format!("printf: unsupported conversion {:?}", other)),
            }
        }
        Ok(out)
    }

    fn runtime_call(&mut self, name: &str, args: Vec<Val>) -> Result<Option<Val>, String> {
        let int = |i: usize| args.get(i).ok_or("missing argument")?.int();
        let result = match name {
            "alloca" => {
                self.sp -= int(0)?;
                Some(Val::Int(self.sp))
            }
            "li8" => Some(Val::Int(self.mem[self.addr(int(0)?, 1)?] as i32)),
            "li32" => Some(Val::Int(self.read_i32(int(0)?)?)),
            "li64" => {
                let a = self.addr(int(0)?, 8)?;
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(&self.mem[a..a + 8]);
                Some(Val::Long(i64::from_le_bytes(bytes)))
            }
            "si8" => {
                let a = self.addr(int(0)?, 1)?;
                self.mem[a] = int(1)? as u8;
                None
            }
            "si32" => {
                let a = self.addr(int(0)?, 4)?;
                self.mem[a..a + 4].copy_from_slice(&int(1)?.to_le_bytes());
                None
            }
            "initStaticData" => {
                let Some(Val::Str(data)) = args.first() else {
                    return Err("initStaticData expects a string".into());
                };
                for (i, ch) in data.chars().enumerate() {
                    self.mem[i] = ch as u32 as u8;
                }
                None
            }
            "mainBootstrap" => {
                let ret = self.invoke("main", "()I", Vec::new())?;
                self.exit_code = Some(ret.map_or(Ok(0), |v| v.int())?);
                None
            }
            "puts" => {
                let text = self.c_string(int(0)?)?;
                self.stdout.push_str(&text);
                self.stdout.push('\n');
                Some(Val::Int(0))
            }
            "printf" => {
                let fmt = self.c_string(int(0)?)?;
                let varargs = match args.get(1) {
                    Some(Val::IntArray(a)) => a.borrow().clone(),
                    _ => Vec::new(),
                };
                let text = self.format(&fmt, &varargs)?;
                self.stdout.push_str(&text);
                Some(Val::Int(text.len() as i32))
            }
            "slt" | "sgt" | "ult" => {
                let ordering = match (&args[0], &args[1]) {
                    (Val::Int(a), Val::Int(b)) if name == "ult" => (*a as u32).cmp(&(*b as u32)),
                    (Val::Int(a), Val::Int(b)) => a.cmp(b),
                    (Val::Long(a), Val::Long(b)) if name == "ult" => (*a as u64).cmp(&(*b as u64)),
                    (Val::Long(a), Val::Long(b)) => a.cmp(b),
                    other => return Err(format!("{} on {:?}", name, other)),
                };
                let result = if name == "sgt" { ordering.is_gt() } else { ordering.is_lt() };
                Some(Val::Int(result as i32))
            }
            "llvm_memcpy_p0i8_p0i8_i64" => {
                let len = args.get(2).ok_or("missing length")?.long()? as usize;
                let dst = self.addr(int(0)?, len)?;
                let src = self.addr(int(1)?, len)?;
                self.mem.copy_within(src..src + len, dst);
                None
            }
            "llvm_va_start" | "llvm_va_end" => None,
            other => return Err(format!("unknown runtime method {}", other)),
        };
        Ok(result)
    }
}

fn local_slot(insn: &Instruction) -> Result<usize, String> {
    let slot = match (insn.opcode, insn.operand) {
        (_, Operand::Local(slot)) => slot,
        (op @ 0x1a..=0x1d, _) => (op - ILOAD_0) as u16,
        (op @ 0x1e..=0x21, _) => (op - LLOAD_0) as u16,
        (op @ 0x2a..=0x2d, _) => (op - ALOAD_0) as u16,
        (op @ 0x3b..=0x3e, _) => (op - ISTORE_0) as u16,
        (op @ 0x3f..=0x42, _) => (op - LSTORE_0) as u16,
        (op @ 0x4b..=0x4e, _) => (op - ASTORE_0) as u16,
        _ => return Err(format!("no local operand on {}", insn.name())),
    };
    Ok(slot as usize)
}

fn target(insn: &Instruction) -> Result<usize, String> {
    match insn.operand {
        Operand::Target(t) => Ok(t),
        _ => Err(format!("no branch target on {}", insn.name())),
    }
}
