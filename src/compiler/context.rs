//! # Compilation Context
//!
//! Module-wide state gathered before any method body is generated: struct
//! definitions, function signatures, and the static data layout with the
//! address and field name of every global.

use super::heap_writer::{HeapWriter, StaticData};
use super::layout::{DataLayout, TypeTable};
use super::runtime::STATIC_DATA_FIELD;
use crate::parser::visitor::Visitor;
use crate::parser::{Decl, Program, Type, TypedValue};
use crate::{Error, Result};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{HashMap, HashSet};

lazy_static! {
    static ref NON_IDENTIFIER: Regex = Regex::new(r"[^A-Za-z0-9_$]").expect("valid regex");
}

/// Map an IR symbol onto a legal JVM member name
pub fn jvm_identifier(name: &str) -> String {
    let mut ident = NON_IDENTIFIER.replace_all(name, "_").into_owned();
    if ident.is_empty() || ident.starts_with(|c: char| c.is_ascii_digit()) {
        ident.insert(0, '_');
    }
    ident
}

/// A declared or defined function
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSig {
    /// Return type
    pub ret_type: Type,
    /// Parameter types, `Vararg` last for variadic functions
    pub params: Vec<Type>,
    /// True if the module has a body for it
    pub defined: bool,
    /// Name of the generated method
    pub method_name: String,
}

impl FunctionSig {
    /// JVM method descriptor
    pub fn descriptor(&self) -> Result<String> {
        Type::method_descriptor(&self.ret_type, &self.params)
    }

    /// Parameters before the variadic tail
    pub fn fixed_params(&self) -> &[Type] {
        match self.params.iter().position(|p| *p == Type::Vararg) {
            Some(index) => &self.params[..index],
            None => &self.params,
        }
    }

    /// True if the last parameter is `...`
    pub fn is_variadic(&self) -> bool {
        self.params.last() == Some(&Type::Vararg)
    }
}

/// Where a global lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalInfo {
    /// Static field holding its address
    pub field_name: String,
    /// Offset in the static data blob
    pub address: u32,
}

/// State shared by every function of one module
#[derive(Debug)]
pub struct CompilationContext {
    /// Struct definitions and layout rules
    pub types: TypeTable,
    /// Functions by IR name
    pub functions: HashMap<String, FunctionSig>,
    /// Globals by IR name
    pub globals: HashMap<String, GlobalInfo>,
    /// Global IR names in declaration order
    pub global_order: Vec<String>,
    /// Packed initializers with fix-ups applied
    pub static_data: StaticData,
    warnings: Vec<String>,
}

/// Collects type and function declarations
struct DeclCollector {
    types: TypeTable,
    functions: HashMap<String, FunctionSig>,
    method_names: HashSet<String>,
}

impl<'ir> Visitor<'ir> for DeclCollector {
    fn visit_decl(&mut self, decl: &'ir Decl) -> Result<()> {
        match decl {
            Decl::DeclareType { name, ty } => self.types.define(name.clone(), ty.clone()),
            Decl::Declare { ret_type, name, .. } | Decl::DeclareFunction { ret_type, name, .. } => {
                let defined = matches!(decl, Decl::DeclareFunction { .. });
                if let Some(existing) = self.functions.get_mut(name) {
                    existing.defined |= defined;
                    return Ok(());
                }
                let method_name = unique(jvm_identifier(name), &mut self.method_names);
                self.functions.insert(
                    name.clone(),
                    FunctionSig {
                        ret_type: ret_type.return_type().clone(),
                        params: decl.param_types(),
                        defined,
                        method_name,
                    },
                );
            }
            _ => {}
        }
        Ok(())
    }
}

fn unique(base: String, taken: &mut HashSet<String>) -> String {
    let mut name = base.clone();
    let mut n = 1;
    while !taken.insert(name.clone()) {
        name = format!("{}_{}", base, n);
        n += 1;
    }
    name
}

impl CompilationContext {
    /// Runs the declaration pre-pass and lays out static data
    pub fn build(program: &Program, layout: DataLayout) -> Result<Self> {
        // Phase 1: struct definitions and function signatures
        let mut collector = DeclCollector {
            types: TypeTable::new(layout),
            functions: HashMap::new(),
            method_names: HashSet::new(),
        };
        collector.visit_program(program)?;
        let DeclCollector {
            types, functions, ..
        } = collector;

        // Phase 2: static data, every global in declaration order
        let mut heap = HeapWriter::new(&types);
        let mut globals = HashMap::new();
        let mut global_order = Vec::new();
        let mut field_names = HashSet::from([STATIC_DATA_FIELD.to_string()]);
        for decl in &program.decls {
            if let Decl::DeclareVar {
                name, ty, value, ..
            } = decl
            {
                if globals.contains_key(name) {
                    return Err(Error::layout(format!("global @{} defined twice", name)));
                }
                let initializer = TypedValue::new(ty.clone(), value.clone());
                let address = heap.add_global(name, &initializer)?;
                let base = if name.starts_with('\\') || name.contains('.') || name == STATIC_DATA_FIELD {
                    format!("_global{}", global_order.len())
                } else {
                    jvm_identifier(name)
                };
                let field_name = unique(base, &mut field_names);
                globals.insert(name.clone(), GlobalInfo { field_name, address });
                global_order.push(name.clone());
            }
        }

        // Phase 3: fix-ups
        let static_data = heap.finish()?;
        tracing::debug!(
            globals = global_order.len(),
            functions = functions.len(),
            static_bytes = static_data.bytes.len(),
            "module context ready"
        );

        Ok(Self {
            types,
            functions,
            globals,
            global_order,
            static_data,
            warnings: Vec::new(),
        })
    }

    /// Globals with their layout, in declaration order
    pub fn globals_in_order(&self) -> impl Iterator<Item = (&str, &GlobalInfo)> {
        self.global_order
            .iter()
            .filter_map(|name| self.globals.get(name).map(|info| (name.as_str(), info)))
    }

    /// Records a non-fatal diagnostic
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{}", message);
        self.warnings.push(message);
    }

    /// Diagnostics so far
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Consumes the context, returning its diagnostics
    pub fn into_warnings(self) -> Vec<String> {
        self.warnings
    }
}
