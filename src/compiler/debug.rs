//! Debug utilities for IR→JVM compilation
//!
//! Tools for inspecting parsed IR, generated class files and the packed
//! static data blob.

use super::heap_writer::StaticData;
use super::jvm::class_writer::{ACC_FINAL, ACC_PUBLIC, ACC_STATIC};
use super::jvm::constant_pool::Constant;
use super::jvm::opcodes::T_INT;
use super::runtime::is_comparison;
use super::verifier::{decode_instructions, ClassFile, Instruction, Operand};
use crate::parser::visitor::{walk_body, Visitor};
use crate::parser::{Decl, Program, Stm, Type, TypedValue, Value};
use crate::Result;
use std::fmt::Write;

// =============================================================================
// IR PRETTY PRINTER
// =============================================================================

/// Re-emit a parsed module as LLVM-like text.
///
/// Metadata bodies, attributes and linkage are not kept by the parser and
/// are not printed.
pub fn dump_program(program: &Program) -> String {
    let mut printer = IrPrinter::default();
    // Printing never fails
    let _ = printer.visit_program(program);
    printer.out
}

#[derive(Default)]
struct IrPrinter {
    out: String,
}

impl<'ir> Visitor<'ir> for IrPrinter {
    fn visit_decl(&mut self, decl: &'ir Decl) -> Result<()> {
        match decl {
            Decl::Declare {
                ret_type,
                name,
                arg_types,
            } => {
                let params: Vec<String> = arg_types.iter().map(Type::to_string).collect();
                let _ = writeln!(self.out, "declare {} @{}({})", ret_type, name, params.join(", "));
            }
            Decl::DeclareFunction {
                ret_type,
                name,
                args,
                body,
            } => {
                let params: Vec<String> = args
                    .iter()
                    .map(|a| match a.ty {
                        Type::Vararg => "...".to_string(),
                        _ => format!("{} %{}", a.ty, a.name),
                    })
                    .collect();
                let _ = writeln!(self.out, "define {} @{}({}) {{", ret_type, name, params.join(", "));
                walk_body(self, body)?;
                self.out.push_str("}\n");
            }
            Decl::DeclareVar {
                name,
                ty,
                value,
                constant,
            } => {
                let kind = if *constant { "constant" } else { "global" };
                let _ = writeln!(self.out, "@{} = {} {} {}", name, kind, ty, format_value(value));
            }
            Decl::DeclareType { name, ty } => {
                let _ = writeln!(self.out, "%{} = type {}", name, ty);
            }
            Decl::Comdat {
                name,
                selection_kind,
            } => {
                let _ = writeln!(self.out, "${} = comdat {}", name, selection_kind);
            }
            Decl::Metadata { name } => {
                let _ = writeln!(self.out, "!{} = !{{}}", name);
            }
            Decl::Empty => {}
        }
        Ok(())
    }

    fn visit_stm(&mut self, stm: &'ir Stm) -> Result<()> {
        let line = format_stm(stm);
        if matches!(stm, Stm::Label(_)) {
            let _ = writeln!(self.out, "{}", line);
        } else {
            let _ = writeln!(self.out, "  {}", line);
        }
        Ok(())
    }
}

fn format_typed(typed: &TypedValue) -> String {
    format!("{} {}", typed.ty, format_value(&typed.value))
}

fn format_list(values: &[TypedValue]) -> String {
    values.iter().map(format_typed).collect::<Vec<_>>().join(", ")
}

fn format_gep(value: &Value, parens: bool) -> String {
    let Value::GetElementPtr {
        inbounds,
        element_type,
        base,
        indices,
    } = value
    else {
        return format_value(value);
    };
    let mut operands = format!("{}, {}", element_type, format_typed(base));
    for index in indices {
        operands.push_str(", ");
        operands.push_str(&format_typed(index));
    }
    let keyword = if *inbounds {
        "getelementptr inbounds"
    } else {
        "getelementptr"
    };
    if parens {
        format!("{} ({})", keyword, operands)
    } else {
        format!("{} {}", keyword, operands)
    }
}

/// Format an operand the way it appears in IR text
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Int(v) => v.to_string(),
        Value::Long(v) => v.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::ZeroInitializer => "zeroinitializer".to_string(),
        Value::I8Array(text) => format!("c\"{}\"", text),
        Value::Reference(reference) => reference.to_string(),
        Value::Bitcast { value, from, to } => {
            format!("bitcast ({} {} to {})", from, format_value(value), to)
        }
        Value::GetElementPtr { .. } => format_gep(value, true),
        Value::GenericArray(elements) => format!("[{}]", format_list(elements)),
        Value::GenericStruct(fields) => format!("{{ {} }}", format_list(fields)),
    }
}

/// Format one statement, without indentation
pub fn format_stm(stm: &Stm) -> String {
    match stm {
        Stm::Alloca { target, ty, count } => match count {
            Some(count) => format!("%{} = alloca {}, {}", target, ty, format_typed(count)),
            None => format!("%{} = alloca {}", target, ty),
        },
        Stm::Load { target, ty, from } => {
            format!("%{} = load {}, {}", target, ty, format_typed(from))
        }
        Stm::Store { value, dest } => {
            format!("store {}, {}", format_typed(value), format_typed(dest))
        }
        Stm::BinOp {
            target,
            op,
            ty,
            left,
            right,
        } => {
            let op = if is_comparison(op) {
                format!("icmp {}", op)
            } else {
                op.clone()
            };
            format!(
                "%{} = {} {} {}, {}",
                target,
                op,
                ty,
                format_value(left),
                format_value(right)
            )
        }
        Stm::Assign { target, value } => format!("%{} = {}", target, format_gep(&value.value, false)),
        Stm::Call {
            target,
            ret_type,
            callee,
            args,
        } => {
            let call = format!("call {} {}({})", ret_type, format_value(callee), format_list(args));
            match target {
                Some(target) => format!("%{} = {}", target, call),
                None => call,
            }
        }
        Stm::Label(name) => format!("{}:", name),
        Stm::Jump(label) => format!("br label %{}", label),
        Stm::ConditionalJump {
            cond,
            if_true,
            if_false,
        } => format!(
            "br {}, label %{}, label %{}",
            format_typed(cond),
            if_true,
            if_false
        ),
        Stm::Phi {
            target,
            ty,
            incoming,
        } => {
            let edges: Vec<String> = incoming
                .iter()
                .map(|(label, value)| format!("[ {}, %{} ]", format_value(&value.value), label))
                .collect();
            format!("%{} = phi {} {}", target, ty, edges.join(", "))
        }
        Stm::Ternary {
            target,
            cond,
            if_true,
            if_false,
        } => format!(
            "%{} = select {}, {}, {}",
            target,
            format_typed(cond),
            format_typed(if_true),
            format_typed(if_false)
        ),
        Stm::Convert {
            target,
            op,
            from,
            to,
        } => format!("%{} = {} {} to {}", target, op.keyword(), format_typed(from), to),
        Stm::Return(None) => "ret void".to_string(),
        Stm::Return(Some(value)) => format!("ret {}", format_typed(value)),
        Stm::Unreachable => "unreachable".to_string(),
    }
}

// =============================================================================
// CLASS DISASSEMBLER
// =============================================================================

fn access_words(flags: u16) -> String {
    let mut words = Vec::new();
    if flags & ACC_PUBLIC != 0 {
        words.push("public");
    }
    if flags & ACC_STATIC != 0 {
        words.push("static");
    }
    if flags & ACC_FINAL != 0 {
        words.push("final");
    }
    words.join(" ")
}

fn describe_constant(class: &ClassFile, index: u16) -> String {
    match class.constant(index) {
        Some(Constant::Integer(v)) => v.to_string(),
        Some(Constant::Long(v)) => format!("{}L", v),
        Some(Constant::String(_)) => {
            let text = class.string(index).unwrap_or("?");
            let shown: String = text.chars().take(32).collect();
            let more = if text.chars().count() > 32 { "..." } else { "" };
            format!("{:?}{}", shown, more)
        }
        Some(Constant::Class(_)) => format!("class {}", class.class_name(index).unwrap_or("?")),
        Some(Constant::Fieldref(..) | Constant::Methodref(..)) => match class.member_ref(index) {
            Some((owner, name, desc)) => format!("{}.{}:{}", owner, name, desc),
            None => "?".to_string(),
        },
        Some(Constant::Utf8(text)) => text.clone(),
        Some(Constant::NameAndType(..)) | None => "?".to_string(),
    }
}

fn format_instruction(class: &ClassFile, insn: &Instruction) -> String {
    let name = insn.name();
    match insn.operand {
        Operand::None => name.to_string(),
        Operand::Int(v) => format!("{} {}", name, v),
        Operand::Local(slot) => format!("{} {}", name, slot),
        Operand::Target(target) => format!("{} {}", name, target),
        Operand::ArrayType(T_INT) => format!("{} int", name),
        Operand::ArrayType(t) => format!("{} {}", name, t),
        Operand::Pool(index) => format!("{} #{} // {}", name, index, describe_constant(class, index)),
    }
}

/// Method-by-method listing of a class file
pub fn disassemble_class(bytes: &[u8]) -> Result<String> {
    let class = ClassFile::parse(bytes)?;
    let mut out = String::new();
    let _ = writeln!(
        out,
        "class {} (version {}.{})",
        class.this_class_name().unwrap_or("?"),
        class.major_version,
        class.minor_version
    );

    for field in &class.fields {
        let _ = write!(out, "  field {} {} {}", access_words(field.access_flags), field.descriptor, field.name);
        if let Some(index) = field.constant_value {
            let _ = write!(out, " = {}", describe_constant(&class, index));
        }
        out.push('\n');
    }

    for method in &class.methods {
        let _ = write!(
            out,
            "\n  method {} {}{}",
            access_words(method.access_flags),
            method.name,
            method.descriptor
        );
        let Some(code) = &method.code else {
            out.push('\n');
            continue;
        };
        let _ = writeln!(out, "  stack={} locals={}", code.max_stack, code.max_locals);
        for insn in decode_instructions(&code.code)? {
            let _ = writeln!(out, "    {:4}: {}", insn.offset, format_instruction(&class, &insn));
        }
    }
    Ok(out)
}

// =============================================================================
// STATIC DATA
// =============================================================================

/// Hex listing of the static data blob followed by the global addresses
/// and relocations
pub fn hex_dump_static_data(data: &StaticData) -> String {
    let mut out = String::new();
    for (row, chunk) in data.bytes.chunks(16).enumerate() {
        let ascii: String = chunk
            .iter()
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
            .collect();
        let _ = writeln!(out, "{:08x}  {:<32}  {}", row * 16, hex::encode(chunk), ascii);
    }
    for (name, address) in &data.globals {
        let _ = writeln!(out, "@{} = 0x{:08x}", name, address);
    }
    for reloc in &data.relocations {
        let _ = writeln!(
            out,
            "reloc 0x{:08x} -> @{} + {}",
            reloc.offset, reloc.global, reloc.addend
        );
    }
    out
}
