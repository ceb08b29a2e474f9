//! # JVM Code Generator
//!
//! Lowers a parsed module into one class:
//!
//! - one `public static final int` field per global, holding its address
//! - a `STATIC_DATA` string with the packed initializers, one char per byte
//! - `<clinit>` handing that string to the runtime
//! - one static method per defined function
//! - a `main(String[])` bootstrap that runs the module's `main()`
//!
//! Registers live in JVM locals. Every statement target gets its own slot
//! before the body is emitted, so a slot never changes type.
//!
//! ## PHI Nodes
//!
//! Incoming values are indexed by `(predecessor, successor)` edge. Each branch
//! evaluates the values for its edge onto the operand stack, then stores them
//! all, so phis on the same edge read the old register values.

use super::context::{CompilationContext, FunctionSig};
use super::jvm::opcodes::*;
use super::jvm::{ClassWriter, Code, CodeBuilder, FieldConstant, Kind, Label};
use super::jvm::{ACC_FINAL, ACC_PUBLIC, ACC_STATIC};
use super::layout::GepStep;
use super::runtime::{self, CallTarget, RuntimeMethod, SP_FIELD, STATIC_DATA_FIELD};
use super::CompileOptions;
use crate::parser::{Argument, CastOp, Decl, Program, Reference, Stm, Type, TypedValue, Value};
use crate::{Error, Result};
use std::collections::HashMap;

/// A generated class plus counts for the compile result
#[derive(Debug, Clone)]
pub struct GeneratedClass {
    /// Class file bytes
    pub bytes: Vec<u8>,
    /// Internal class name
    pub class_name: String,
    /// Methods written, synthetic ones included
    pub method_count: usize,
    /// Fields written, `STATIC_DATA` included
    pub field_count: usize,
    /// Size of the static data blob
    pub static_data_len: usize,
    /// Non-fatal diagnostics
    pub warnings: Vec<String>,
}

/// Compiles `program` into a class named after its module
pub fn generate(program: &Program, options: &CompileOptions) -> Result<GeneratedClass> {
    let class_name = program.internal_class_name();
    let mut ctx = CompilationContext::build(program, options.data_layout)?;
    let mut class = ClassWriter::new(&class_name, options.class_version)?;
    let runtime = options.runtime_class.as_str();

    // Phase 1: fields
    for (_, global) in ctx.globals_in_order() {
        class.add_field(
            ACC_PUBLIC | ACC_STATIC | ACC_FINAL,
            &global.field_name,
            "I",
            Some(FieldConstant::Int(global.address as i32)),
        )?;
    }
    class.add_field(
        ACC_PUBLIC | ACC_STATIC | ACC_FINAL,
        STATIC_DATA_FIELD,
        "Ljava/lang/String;",
        Some(FieldConstant::String(ctx.static_data.as_char_string())),
    )?;

    // Phase 2: synthetic members
    let mut init = CodeBuilder::new(class.pool_mut());
    init.reserve_locals(1);
    init.load(Kind::Reference, 0)?;
    init.invoke_special("java/lang/Object", "<init>", "()V")?;
    init.simple(RETURN)?;
    let init = init.finish()?;
    class.add_method(ACC_PUBLIC, "<init>", "()V", init)?;

    let mut clinit = CodeBuilder::new(class.pool_mut());
    clinit.get_static(&class_name, STATIC_DATA_FIELD, "Ljava/lang/String;")?;
    invoke_runtime(&mut clinit, runtime, runtime::INIT_STATIC_DATA)?;
    clinit.simple(RETURN)?;
    let clinit = clinit.finish()?;
    class.add_method(ACC_STATIC, "<clinit>", "()V", clinit)?;

    if options.emit_bootstrap {
        let mut bootstrap = CodeBuilder::new(class.pool_mut());
        bootstrap.reserve_locals(1);
        bootstrap.ldc_class(&class_name)?;
        invoke_runtime(&mut bootstrap, runtime, runtime::MAIN_BOOTSTRAP)?;
        bootstrap.simple(RETURN)?;
        let bootstrap = bootstrap.finish()?;
        class.add_method(
            ACC_PUBLIC | ACC_STATIC,
            "main",
            "([Ljava/lang/String;)V",
            bootstrap,
        )?;
    }

    // Phase 3: one method per function body
    let mut warnings = Vec::new();
    for decl in program.functions() {
        if let Decl::DeclareFunction {
            ret_type,
            name,
            args,
            body,
        } = decl
        {
            let sig = ctx
                .functions
                .get(name)
                .ok_or_else(|| Error::UndefinedFunction { name: name.clone() })?;
            let descriptor = sig.descriptor()?;
            let method_name = sig.method_name.clone();

            let compiler = FunctionCompiler::new(
                &ctx,
                &class_name,
                runtime,
                name,
                ret_type,
                CodeBuilder::new(class.pool_mut()),
            );
            let (code, mut function_warnings) = compiler.compile(args, &body.stms)?;
            warnings.append(&mut function_warnings);
            class.add_method(ACC_PUBLIC | ACC_STATIC, &method_name, &descriptor, code)?;
        }
    }
    for warning in warnings {
        ctx.warn(warning);
    }

    let bytes = class.to_bytes()?;
    tracing::debug!(
        class = %class_name,
        methods = class.method_count(),
        bytes = bytes.len(),
        "generated class"
    );
    Ok(GeneratedClass {
        bytes,
        class_name,
        method_count: class.method_count(),
        field_count: class.field_count(),
        static_data_len: ctx.static_data.bytes.len(),
        warnings: ctx.into_warnings(),
    })
}

fn invoke_runtime(code: &mut CodeBuilder<'_>, runtime: &str, method: RuntimeMethod) -> Result<()> {
    code.invoke_static(runtime, method.name, method.descriptor)
}

/// Register slot and category
#[derive(Debug, Clone, Copy)]
struct Slot {
    index: u16,
    kind: Kind,
}

/// Per-function lowering state, dropped once the method is assembled
struct FunctionCompiler<'a, 'p> {
    ctx: &'a CompilationContext,
    class_name: &'a str,
    runtime: &'a str,
    name: &'a str,
    ret_type: &'a Type,
    code: CodeBuilder<'p>,
    slots: HashMap<&'a str, Slot>,
    next_slot: u16,
    sp_slot: Option<u16>,
    labels: HashMap<&'a str, Label>,
    current_block: String,
    // (predecessor, successor) -> (phi target, incoming value)
    phi_edges: HashMap<(String, String), Vec<(&'a str, &'a TypedValue)>>,
    warnings: Vec<String>,
}

impl<'a, 'p> FunctionCompiler<'a, 'p> {
    fn new(
        ctx: &'a CompilationContext,
        class_name: &'a str,
        runtime: &'a str,
        name: &'a str,
        ret_type: &'a Type,
        code: CodeBuilder<'p>,
    ) -> Self {
        Self {
            ctx,
            class_name,
            runtime,
            name,
            ret_type,
            code,
            slots: HashMap::new(),
            next_slot: 0,
            sp_slot: None,
            labels: HashMap::new(),
            current_block: String::new(),
            phi_edges: HashMap::new(),
            warnings: Vec::new(),
        }
    }

    fn compile(mut self, args: &'a [Argument], stms: &'a [Stm]) -> Result<(Code, Vec<String>)> {
        // Phase 1: arguments, stack pointer save slot, then every register
        for arg in args {
            self.bind_slot(&arg.name, Kind::of(&arg.ty));
        }
        self.code.reserve_locals(self.next_slot);
        if stms.iter().any(|s| matches!(s, Stm::Alloca { .. })) {
            self.sp_slot = Some(self.alloc_temp(Kind::Int));
        }
        for stm in stms {
            if let Some(target) = stm.target() {
                self.bind_slot(target, result_kind(stm));
            }
        }

        // Phase 2: labels and phi edges
        self.current_block = match stms.first() {
            Some(Stm::Label(name)) => name.clone(),
            _ => args
                .iter()
                .filter(|a| a.name.chars().all(|c| c.is_ascii_digit()))
                .count()
                .to_string(),
        };
        let mut block = self.current_block.clone();
        for stm in stms {
            match stm {
                Stm::Label(name) => {
                    let label = self.code.new_label();
                    self.labels.insert(name.as_str(), label);
                    block = name.clone();
                }
                Stm::Phi {
                    target, incoming, ..
                } => {
                    for (pred, value) in incoming {
                        self.phi_edges
                            .entry((pred.clone(), block.clone()))
                            .or_default()
                            .push((target.as_str(), value));
                    }
                }
                _ => {}
            }
        }
        tracing::trace!(
            function = self.name,
            slots = self.next_slot,
            edges = self.phi_edges.len(),
            "function prepared"
        );

        // Phase 3: prologue
        if let Some(sp) = self.sp_slot {
            self.code.get_static(self.runtime, SP_FIELD, "I")?;
            self.code.store(Kind::Int, sp)?;
        }

        // Phase 4: body
        for stm in stms {
            self.compile_stm(stm)?;
        }
        if self.code.is_reachable() {
            return Err(Error::class_format(format!(
                "control falls off the end of @{}",
                self.name
            )));
        }

        let code = self.code.finish()?;
        tracing::debug!(
            function = self.name,
            bytes = code.code.len(),
            max_stack = code.max_stack,
            max_locals = code.max_locals,
            "compiled function"
        );
        Ok((code, self.warnings))
    }

    // =========================================================================
    // SLOTS AND LABELS
    // =========================================================================

    fn bind_slot(&mut self, name: &'a str, kind: Kind) {
        if self.slots.contains_key(name) {
            return;
        }
        let index = self.alloc_temp(kind);
        tracing::trace!(function = self.name, register = name, slot = index, "allocated slot");
        self.slots.insert(name, Slot { index, kind });
    }

    fn alloc_temp(&mut self, kind: Kind) -> u16 {
        let index = self.next_slot;
        self.next_slot += kind.size();
        index
    }

    fn slot(&self, name: &str) -> Result<Slot> {
        self.slots
            .get(name)
            .copied()
            .ok_or_else(|| Error::UndefinedRegister {
                name: name.to_string(),
                function: self.name.to_string(),
            })
    }

    fn label(&self, name: &str) -> Result<Label> {
        self.labels
            .get(name)
            .copied()
            .ok_or_else(|| Error::UndefinedLabel {
                name: name.to_string(),
                function: self.name.to_string(),
            })
    }

    fn store_target(&mut self, target: &str) -> Result<()> {
        let slot = self.slot(target)?;
        self.code.store(slot.kind, slot.index)
    }

    fn invoke_runtime(&mut self, method: RuntimeMethod) -> Result<()> {
        self.code
            .invoke_static(self.runtime, method.name, method.descriptor)
    }

    // =========================================================================
    // STATEMENTS
    // =========================================================================

    fn compile_stm(&mut self, stm: &'a Stm) -> Result<()> {
        match stm {
            Stm::Label(name) => {
                let label = self.label(name)?;
                self.code.bind(label)?;
                self.current_block = name.clone();
                Ok(())
            }
            // Assigned on the incoming edges
            Stm::Phi { .. } => Ok(()),
            Stm::Alloca { target, ty, count } => self.compile_alloca(target, ty, count.as_ref()),
            Stm::Load { target, ty, from } => {
                self.push_typed(from)?;
                self.invoke_runtime(runtime::load_helper(ty)?)?;
                if *ty == Type::I8 {
                    self.code.simple(I2B)?;
                }
                self.store_target(target)
            }
            Stm::Store { value, dest } => {
                let helper = runtime::store_helper(&value.ty)?;
                self.push_typed(dest)?;
                self.push_typed(value)?;
                self.invoke_runtime(helper)
            }
            Stm::BinOp {
                target,
                op,
                ty,
                left,
                right,
            } => {
                self.compile_binop(op, ty, left, right)?;
                self.store_target(target)
            }
            Stm::Assign { target, value } => {
                self.push_typed(value)?;
                self.store_target(target)
            }
            Stm::Call {
                target,
                ret_type,
                callee,
                args,
            } => self.compile_call(target.as_deref(), ret_type, callee, args),
            Stm::Jump(to) => {
                let label = self.label(to)?;
                self.assign_edge(to)?;
                self.code.branch(GOTO, label)
            }
            Stm::ConditionalJump {
                cond,
                if_true,
                if_false,
            } => self.compile_cond_jump(cond, if_true, if_false),
            Stm::Ternary {
                target,
                cond,
                if_true,
                if_false,
            } => {
                let otherwise = self.code.new_label();
                let end = self.code.new_label();
                self.push_typed(cond)?;
                self.code.branch(IFEQ, otherwise)?;
                self.push_typed(if_true)?;
                self.code.branch(GOTO, end)?;
                self.code.bind(otherwise)?;
                self.push_typed(if_false)?;
                self.code.bind(end)?;
                self.store_target(target)
            }
            Stm::Convert {
                target,
                op,
                from,
                to,
            } => {
                self.push_typed(from)?;
                self.convert(*op, &from.ty, to)?;
                self.store_target(target)
            }
            Stm::Return(value) => {
                if let Some(sp) = self.sp_slot {
                    self.code.load(Kind::Int, sp)?;
                    self.code.put_static(self.runtime, SP_FIELD, "I")?;
                }
                match value {
                    None => self.code.simple(RETURN),
                    Some(value) => {
                        self.push_typed(value)?;
                        if self.ret_type.is_wide() {
                            self.code.simple(LRETURN)
                        } else {
                            self.code.simple(IRETURN)
                        }
                    }
                }
            }
            Stm::Unreachable => {
                self.code.simple(ACONST_NULL)?;
                self.code.simple(ATHROW)
            }
        }
    }

    fn compile_alloca(&mut self, target: &str, ty: &Type, count: Option<&'a TypedValue>) -> Result<()> {
        let size = self.ctx.types.size_of(ty)?;
        match count {
            None => self.push_const_int(size as i64)?,
            Some(count) => match count.value.as_constant() {
                Some(n) => self.push_const_int(n * size as i64)?,
                None => {
                    self.push_typed(count)?;
                    if count.ty.is_wide() {
                        self.code.simple(L2I)?;
                    }
                    self.push_const_int(size as i64)?;
                    self.code.simple(IMUL)?;
                }
            },
        }
        self.invoke_runtime(runtime::ALLOCA)?;
        self.store_target(target)
    }

    fn compile_binop(&mut self, op: &str, ty: &Type, left: &Value, right: &Value) -> Result<()> {
        let wide = ty.is_wide();
        let native = match op {
            "add" => Some(if wide { LADD } else { IADD }),
            "sub" => Some(if wide { LSUB } else { ISUB }),
            "mul" => Some(if wide { LMUL } else { IMUL }),
            "sdiv" => Some(if wide { LDIV } else { IDIV }),
            "srem" => Some(if wide { LREM } else { IREM }),
            "and" => Some(if wide { LAND } else { IAND }),
            "or" => Some(if wide { LOR } else { IOR }),
            "xor" => Some(if wide { LXOR } else { IXOR }),
            _ => None,
        };
        if let Some(opcode) = native {
            self.push_value(left, ty)?;
            self.push_value(right, ty)?;
            self.code.simple(opcode)?;
            return self.wrap_to_width(ty);
        }

        let shift = match op {
            "shl" => Some(if wide { LSHL } else { ISHL }),
            "ashr" => Some(if wide { LSHR } else { ISHR }),
            "lshr" => Some(if wide { LUSHR } else { IUSHR }),
            _ => None,
        };
        if let Some(opcode) = shift {
            self.push_value(left, ty)?;
            if opcode == IUSHR {
                self.mask_to_width(ty)?;
            }
            self.push_value(right, ty)?;
            if wide {
                self.code.simple(L2I)?;
            }
            self.code.simple(opcode)?;
            return self.wrap_to_width(ty);
        }

        if op == "eq" || op == "ne" {
            let zero = self.code.new_label();
            let end = self.code.new_label();
            self.push_value(left, ty)?;
            self.push_value(right, ty)?;
            if wide {
                self.code.simple(LCMP)?;
                self.code.branch(if op == "eq" { IFNE } else { IFEQ }, zero)?;
            } else {
                self.code
                    .branch(if op == "eq" { IF_ICMPNE } else { IF_ICMPEQ }, zero)?;
            }
            self.code.push_int(1)?;
            self.code.branch(GOTO, end)?;
            self.code.bind(zero)?;
            self.code.push_int(0)?;
            return self.code.bind(end);
        }

        if let Some(cmp) = runtime::comparison(op) {
            let (first, second) = if cmp.swap { (right, left) } else { (left, right) };
            self.push_value(first, ty)?;
            self.push_value(second, ty)?;
            self.code
                .invoke_static(self.runtime, cmp.helper, runtime::comparison_descriptor(ty))?;
            if cmp.negate {
                self.code.push_int(1)?;
                self.code.simple(IXOR)?;
            }
            return Ok(());
        }

        Err(Error::unsupported(format!("binary operator {} on {}", op, ty)))
    }

    /// Bit width of a sub-32-bit integer type
    fn narrow_width(ty: &Type) -> Option<u32> {
        match ty {
            Type::Int(width) if *width < 32 => Some((*width).max(1)),
            _ => None,
        }
    }

    /// Bring a 32-bit result back to the sign-extended form of `ty`
    /// (`i1` stays 0 or 1).
    fn wrap_to_width(&mut self, ty: &Type) -> Result<()> {
        match Self::narrow_width(ty) {
            None => Ok(()),
            Some(1) => {
                self.code.push_int(1)?;
                self.code.simple(IAND)
            }
            Some(8) => self.code.simple(I2B),
            Some(16) => self.code.simple(I2S),
            Some(width) => {
                let shift = (32 - width) as i32;
                self.code.push_int(shift)?;
                self.code.simple(ISHL)?;
                self.code.push_int(shift)?;
                self.code.simple(ISHR)
            }
        }
    }

    /// Clear the bits above the width of `ty` on the value at the top of the stack
    fn mask_to_width(&mut self, ty: &Type) -> Result<()> {
        match Self::narrow_width(ty) {
            None => Ok(()),
            Some(width) => {
                self.code.push_int(((1u32 << width) - 1) as i32)?;
                self.code.simple(IAND)
            }
        }
    }

    fn compile_call(
        &mut self,
        target: Option<&str>,
        ret_type: &Type,
        callee: &Value,
        args: &'a [TypedValue],
    ) -> Result<()> {
        let name = match callee {
            Value::Reference(Reference::Local(register)) => {
                return Err(Error::unsupported(format!("indirect call through %{}", register)))
            }
            other => other
                .base_global()
                .ok_or_else(|| Error::unsupported(format!("call to {:?}", other)))?,
        };

        let call_target = runtime::call_target(name)?;
        if call_target == CallTarget::Elide {
            let message = format!("elided call to @{} in @{}", name, self.name);
            tracing::warn!(function = self.name, callee = name, "elided lifetime intrinsic");
            self.warnings.push(message);
            return Ok(());
        }

        let ctx = self.ctx;
        let sig: &FunctionSig = ctx
            .functions
            .get(name)
            .ok_or_else(|| Error::UndefinedFunction {
                name: name.to_string(),
            })?;
        let descriptor = sig.descriptor()?;
        let (owner, method) = match call_target {
            CallTarget::Runtime(method) => (self.runtime, method),
            _ if !sig.defined => {
                return Err(Error::unsupported(format!("call to external function @{}", name)))
            }
            _ => (self.class_name, sig.method_name.clone()),
        };

        let fixed = sig.fixed_params();
        if args.len() < fixed.len() || (!sig.is_variadic() && args.len() != fixed.len()) {
            return Err(Error::unsupported(format!(
                "call to @{} with {} arguments, declared with {}",
                name,
                args.len(),
                sig.params.len()
            )));
        }
        for arg in &args[..fixed.len()] {
            self.push_typed(arg)?;
        }
        if sig.is_variadic() {
            self.pack_varargs(&args[fixed.len()..])?;
        }
        self.code.invoke_static(owner, &method, &descriptor)?;

        let returns = ret_type.return_type();
        match (target, returns) {
            (_, Type::Void) => Ok(()),
            (Some(target), _) => self.store_target(target),
            (None, ty) => self.code.pop(Kind::of(ty)),
        }
    }

    fn pack_varargs(&mut self, rest: &[TypedValue]) -> Result<()> {
        let temp = self.alloc_temp(Kind::Reference);
        self.push_const_int(rest.len() as i64)?;
        self.code.newarray_int()?;
        self.code.store(Kind::Reference, temp)?;
        for (index, arg) in rest.iter().enumerate() {
            if arg.ty.is_wide() {
                return Err(Error::unsupported(format!("variadic argument of type {}", arg.ty)));
            }
            self.code.load(Kind::Reference, temp)?;
            self.push_const_int(index as i64)?;
            self.push_typed(arg)?;
            self.code.simple(IASTORE)?;
        }
        self.code.load(Kind::Reference, temp)
    }

    // =========================================================================
    // CONTROL FLOW
    // =========================================================================

    fn edge_values(&self, to: &str) -> Vec<(&'a str, &'a TypedValue)> {
        self.phi_edges
            .get(&(self.current_block.clone(), to.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    fn push_edge(&mut self, values: &[(&'a str, &'a TypedValue)]) -> Result<()> {
        for (_, value) in values {
            self.push_typed(value)?;
        }
        Ok(())
    }

    fn store_edge(&mut self, values: &[(&'a str, &'a TypedValue)]) -> Result<()> {
        for (target, _) in values.iter().rev() {
            self.store_target(target)?;
        }
        Ok(())
    }

    fn assign_edge(&mut self, to: &str) -> Result<()> {
        let values = self.edge_values(to);
        if !values.is_empty() {
            tracing::trace!(from = %self.current_block, to, phis = values.len(), "assigning edge");
        }
        self.push_edge(&values)?;
        self.store_edge(&values)
    }

    fn compile_cond_jump(&mut self, cond: &TypedValue, if_true: &str, if_false: &str) -> Result<()> {
        let true_label = self.label(if_true)?;
        let false_label = self.label(if_false)?;
        let true_values = self.edge_values(if_true);
        let false_values = self.edge_values(if_false);

        if true_values.is_empty() && false_values.is_empty() {
            self.push_typed(cond)?;
            self.code.branch(IFNE, true_label)?;
            return self.code.branch(GOTO, false_label);
        }

        let skip = self.code.new_label();
        self.push_edge(&true_values)?;
        self.push_typed(cond)?;
        self.code.branch(IFEQ, skip)?;
        self.store_edge(&true_values)?;
        self.code.branch(GOTO, true_label)?;

        self.code.bind(skip)?;
        for (target, _) in true_values.iter().rev() {
            let kind = self.slot(target)?.kind;
            self.code.pop(kind)?;
        }
        self.push_edge(&false_values)?;
        self.store_edge(&false_values)?;
        self.code.branch(GOTO, false_label)
    }

    // =========================================================================
    // VALUES
    // =========================================================================

    fn push_typed(&mut self, typed: &TypedValue) -> Result<()> {
        self.push_value(&typed.value, &typed.ty)
    }

    fn push_const_int(&mut self, value: i64) -> Result<()> {
        let value = i32::try_from(value)
            .map_err(|_| Error::layout(format!("constant {} does not fit in 32 bits", value)))?;
        self.code.push_int(value)
    }

    fn push_const(&mut self, value: i64, ty: &Type) -> Result<()> {
        if ty.is_wide() {
            self.code.push_long(value)
        } else {
            self.code.push_int(value as i32)
        }
    }

    fn push_value(&mut self, value: &Value, ty: &Type) -> Result<()> {
        match value {
            Value::Int(v) => self.push_const(*v as i64, ty),
            Value::Long(v) => self.push_const(*v, ty),
            Value::Bool(b) => self.push_const(*b as i64, ty),
            Value::Null => self.push_const(0, ty),
            Value::ZeroInitializer if matches!(ty, Type::Int(_) | Type::Pointer(_)) => {
                self.push_const(0, ty)
            }
            Value::Reference(Reference::Local(name)) => {
                let slot = self.slot(name)?;
                self.code.load(slot.kind, slot.index)
            }
            Value::Reference(Reference::Global(name)) => {
                if let Some(global) = self.ctx.globals.get(name) {
                    self.code.get_static(self.class_name, &global.field_name, "I")?;
                    if ty.is_wide() {
                        self.code.simple(I2L)?;
                    }
                    Ok(())
                } else if self.ctx.functions.contains_key(name) {
                    Err(Error::unsupported(format!("function @{} used as a value", name)))
                } else {
                    Err(Error::UndefinedGlobal { name: name.clone() })
                }
            }
            Value::Bitcast { value, from, .. } => self.push_value(value, from),
            Value::GetElementPtr {
                element_type,
                base,
                indices,
                ..
            } => {
                self.push_typed(base)?;
                let ctx = self.ctx;
                for step in ctx.types.gep_steps(element_type, indices)? {
                    match step {
                        GepStep::Const(0) => {}
                        GepStep::Const(offset) => {
                            self.push_const_int(offset)?;
                            self.code.simple(IADD)?;
                        }
                        GepStep::Scaled { index, stride } => {
                            self.push_typed(index)?;
                            if index.ty.is_wide() {
                                self.code.simple(L2I)?;
                            }
                            if stride != 1 {
                                self.push_const_int(stride as i64)?;
                                self.code.simple(IMUL)?;
                            }
                            self.code.simple(IADD)?;
                        }
                    }
                }
                Ok(())
            }
            Value::ZeroInitializer
            | Value::I8Array(_)
            | Value::GenericArray(_)
            | Value::GenericStruct(_) => Err(Error::unsupported(format!(
                "aggregate operand of type {} in a function body",
                ty
            ))),
        }
    }

    // =========================================================================
    // CONVERSIONS
    // =========================================================================

    fn convert(&mut self, op: CastOp, from: &Type, to: &Type) -> Result<()> {
        let src = scalar_width(from)?;
        let dst = scalar_width(to)?;
        let sequence: &[u8] = match (op, src, dst) {
            (_, s, d) if s == d => &[],
            (CastOp::SignExtend, 1, 8 | 16 | 32) => &[INEG],
            (CastOp::SignExtend, 1, 64) => &[INEG, I2L],
            (CastOp::SignExtend, 8, 16 | 32) => &[I2B],
            (CastOp::SignExtend, 8, 64) => &[I2B, I2L],
            (CastOp::SignExtend, 16, 32) => &[I2S],
            (CastOp::SignExtend, 16, 64) => &[I2S, I2L],
            (CastOp::SignExtend, 32, 64) => &[I2L],
            (CastOp::ZeroExtend, 1, 8 | 16 | 32) => &[],
            (CastOp::ZeroExtend, 1, 64) => &[I2L],
            (CastOp::ZeroExtend, 8, 16 | 32) => {
                self.code.push_int(0xff)?;
                &[IAND]
            }
            (CastOp::ZeroExtend, 8, 64) => {
                self.code.push_int(0xff)?;
                &[IAND, I2L]
            }
            (CastOp::ZeroExtend, 16, 32) => &[I2C],
            (CastOp::ZeroExtend, 16, 64) => &[I2C, I2L],
            (CastOp::ZeroExtend, 32, 64) => {
                self.code.simple(I2L)?;
                self.code.push_long(0xffff_ffff)?;
                &[LAND]
            }
            (CastOp::Truncate, 64, 32) => &[L2I],
            (CastOp::Truncate, 64, 16) => &[L2I, I2S],
            (CastOp::Truncate, 64, 8) => &[L2I, I2B],
            (CastOp::Truncate, 64, 1) => {
                self.code.simple(L2I)?;
                self.code.push_int(1)?;
                &[IAND]
            }
            (CastOp::Truncate, 32, 16) => &[I2S],
            (CastOp::Truncate, 32 | 16, 8) => &[I2B],
            (CastOp::Truncate, 32 | 16 | 8, 1) => {
                self.code.push_int(1)?;
                &[IAND]
            }
            (CastOp::Bitcast, 32, 64) if from.is_address() => &[I2L],
            (CastOp::Bitcast, 64, 32) if to.is_address() => &[L2I],
            _ => {
                return Err(Error::unsupported(format!(
                    "{} from {} to {}",
                    op.keyword(),
                    from,
                    to
                )))
            }
        };
        for &opcode in sequence {
            self.code.simple(opcode)?;
        }
        Ok(())
    }
}

/// Width of a scalar in bits, addresses counting as 32
fn scalar_width(ty: &Type) -> Result<u32> {
    match ty {
        Type::Int(width) => Ok(*width),
        ty if ty.is_address() => Ok(32),
        other => Err(Error::unsupported(format!("conversion of {}", other))),
    }
}

/// Category of the register a statement defines
fn result_kind(stm: &Stm) -> Kind {
    match stm {
        Stm::Load { ty, .. } | Stm::Phi { ty, .. } => Kind::of(ty),
        Stm::BinOp { op, ty, .. } if !runtime::is_comparison(op) => Kind::of(ty),
        Stm::Assign { value, .. } => Kind::of(&value.ty),
        Stm::Call { ret_type, .. } => Kind::of(ret_type.return_type()),
        Stm::Ternary { if_true, .. } => Kind::of(&if_true.ty),
        Stm::Convert { to, .. } => Kind::of(to),
        _ => Kind::Int,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_str;

    fn compile(source: &str) -> Result<GeneratedClass> {
        let program = parse_str(source, "Main")?;
        generate(&program, &CompileOptions::default())
    }

    #[test]
    fn test_sum_compiles() {
        let class = compile("define i32 @sum(i32 %a, i32 %b) {\n  %1 = add i32 %a, %b\n  ret i32 %1\n}")
            .unwrap();
        assert_eq!(class.class_name, "Main");
        // <init>, <clinit>, main bootstrap, sum
        assert_eq!(class.method_count, 4);
        assert_eq!(class.field_count, 1);
    }

    #[test]
    fn test_undefined_register() {
        let err = compile("define i32 @f() {\n  ret i32 %nope\n}").unwrap_err();
        assert!(matches!(err, Error::UndefinedRegister { name, .. } if name == "nope"));
    }

    #[test]
    fn test_undefined_label() {
        let err = compile("define void @f() {\n  br label %nowhere\n}").unwrap_err();
        assert!(matches!(err, Error::UndefinedLabel { name, .. } if name == "nowhere"));
    }

    #[test]
    fn test_undefined_function() {
        let err = compile("define i32 @f() {\n  %1 = call i32 @g()\n  ret i32 %1\n}").unwrap_err();
        assert!(matches!(err, Error::UndefinedFunction { name } if name == "g"));
    }

    #[test]
    fn test_undefined_global() {
        let err = compile("define i32 @f() {\n  %1 = load i32, i32* @g\n  ret i32 %1\n}")
            .unwrap_err();
        assert!(matches!(err, Error::UndefinedGlobal { name } if name == "g"));
    }

    #[test]
    fn test_unsigned_division_is_unsupported() {
        let err = compile("define i32 @f(i32 %a) {\n  %1 = udiv i32 %a, 3\n  ret i32 %1\n}")
            .unwrap_err();
        assert!(matches!(err, Error::Unsupported { .. }));
    }

    #[test]
    fn test_lifetime_markers_warn() {
        let class = compile(
            "declare void @llvm.lifetime.start.p0i8(i64, i8*)\n\
             define i32 @main() {\n  %1 = alloca i32\n  %2 = bitcast i32* %1 to i8*\n  \
             call void @llvm.lifetime.start.p0i8(i64 4, i8* %2)\n  ret i32 0\n}",
        )
        .unwrap();
        assert_eq!(class.warnings.len(), 1);
        assert!(class.warnings[0].contains("llvm.lifetime.start"));
    }

    #[test]
    fn test_falling_off_the_end_is_rejected() {
        let err = compile("define void @f() {\n  %1 = add i32 1, 2\n}").unwrap_err();
        assert!(matches!(err, Error::ClassFormat(_)));
    }

    #[test]
    fn test_no_bootstrap_when_disabled() {
        let program = parse_str("define i32 @main() {\n  ret i32 0\n}", "Main").unwrap();
        let options = CompileOptions {
            emit_bootstrap: false,
            ..CompileOptions::default()
        };
        assert_eq!(generate(&program, &options).unwrap().method_count, 3);
    }

    #[test]
    fn test_result_kinds() {
        let cmp = Stm::BinOp {
            target: "c".into(),
            op: "slt".into(),
            ty: Type::I64,
            left: Value::Long(1),
            right: Value::Long(2),
        };
        assert_eq!(result_kind(&cmp), Kind::Int);
        let add = Stm::BinOp {
            target: "s".into(),
            op: "add".into(),
            ty: Type::I64,
            left: Value::Long(1),
            right: Value::Long(2),
        };
        assert_eq!(result_kind(&add), Kind::Long);
    }
}
