use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// A parsed IR module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    /// Dotted name of the class the module compiles to
    pub module_name: String,
    /// Top-level declarations in source order
    pub decls: Vec<Decl>,
}

impl Program {
    /// Class name in JVM internal form (`a.b.C` becomes `a/b/C`)
    pub fn internal_class_name(&self) -> String {
        self.module_name.replace('.', "/")
    }

    /// Functions with a body, in source order
    pub fn functions(&self) -> impl Iterator<Item = &Decl> {
        self.decls
            .iter()
            .filter(|d| matches!(d, Decl::DeclareFunction { .. }))
    }
}

/// IR types
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    /// `void`
    Void,
    /// `iN`
    Int(u32),
    /// `T*`
    Pointer(Box<Type>),
    /// `[N x T]`
    Array(Box<Type>, u32),
    /// `{ T, U, ... }` (also `opaque`, as an empty struct)
    Struct(Vec<Type>),
    /// `%name`, resolved against `%name = type ...` definitions
    StructRef(String),
    /// `R (A, B, ...)`
    Function(Box<Type>, Vec<Type>),
    /// `...` in a parameter list
    Vararg,
}

impl Type {
    /// `i1`
    pub const I1: Type = Type::Int(1);
    /// `i8`
    pub const I8: Type = Type::Int(8);
    /// `i16`
    pub const I16: Type = Type::Int(16);
    /// `i32`
    pub const I32: Type = Type::Int(32);
    /// `i64`
    pub const I64: Type = Type::Int(64);

    /// Pointer to `self`
    pub fn pointer_to(self) -> Type {
        Type::Pointer(Box::new(self))
    }

    /// True for values that occupy two JVM slots and use the `l*` opcodes
    pub fn is_wide(&self) -> bool {
        matches!(self, Type::Int(64))
    }

    /// True for types lowered to a 32-bit address
    pub fn is_address(&self) -> bool {
        matches!(
            self,
            Type::Pointer(_) | Type::Array(..) | Type::Struct(_) | Type::StructRef(_)
        )
    }

    /// Pointee of a pointer type
    pub fn pointee(&self) -> Option<&Type> {
        match self {
            Type::Pointer(inner) => Some(inner),
            _ => None,
        }
    }

    /// Return type if this is a function type, otherwise the type itself
    pub fn return_type(&self) -> &Type {
        match self {
            Type::Function(ret, _) => ret,
            other => other,
        }
    }

    /// JVM field descriptor for a value of this type
    pub fn descriptor(&self) -> Result<&'static str> {
        match self {
            Type::Void => Ok("V"),
            Type::Int(1) => Ok("Z"),
            Type::Int(8) => Ok("B"),
            Type::Int(16) => Ok("S"),
            Type::Int(32) => Ok("I"),
            Type::Int(64) => Ok("J"),
            Type::Int(width) => Err(Error::unsupported(format!("integer width i{}", width))),
            Type::Pointer(_) | Type::Array(..) | Type::Struct(_) | Type::StructRef(_) => Ok("I"),
            Type::Vararg => Ok("[I"),
            Type::Function(..) => Err(Error::unsupported(format!(
                "first-class function type {}",
                self
            ))),
        }
    }

    /// JVM method descriptor for a function returning `ret` with `params`
    pub fn method_descriptor(ret: &Type, params: &[Type]) -> Result<String> {
        let mut desc = String::from("(");
        for param in params {
            desc.push_str(param.descriptor()?);
        }
        desc.push(')');
        desc.push_str(ret.return_type().descriptor()?);
        Ok(desc)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Int(width) => write!(f, "i{}", width),
            Type::Pointer(inner) => write!(f, "{}*", inner),
            Type::Array(inner, count) => write!(f, "[{} x {}]", count, inner),
            Type::Struct(fields) => {
                write!(f, "{{ ")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", field)?;
                }
                write!(f, " }}")
            }
            Type::StructRef(name) => write!(f, "%{}", name),
            Type::Function(ret, params) => {
                write!(f, "{} (", ret)?;
                for (i, param) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", param)?;
                }
                write!(f, ")")
            }
            Type::Vararg => write!(f, "..."),
        }
    }
}

/// Named operand
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reference {
    /// `%name`: function argument or register
    Local(String),
    /// `@name`: global variable or function
    Global(String),
}

impl Reference {
    /// Name without the sigil
    pub fn id(&self) -> &str {
        match self {
            Reference::Local(id) | Reference::Global(id) => id,
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Local(id) => write!(f, "%{}", id),
            Reference::Global(id) => write!(f, "@{}", id),
        }
    }
}

/// IR operand values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    /// Integer constant of width up to 32
    Int(i32),
    /// `i64` constant
    Long(i64),
    /// `true` / `false`
    Bool(bool),
    /// `null`
    Null,
    /// `zeroinitializer`
    ZeroInitializer,
    /// `c"..."` with escapes still encoded
    I8Array(String),
    /// `%x` or `@x`
    Reference(Reference),
    /// `bitcast (T v to U)`
    Bitcast {
        /// Value being reinterpreted
        value: Box<Value>,
        /// Source type
        from: Type,
        /// Destination type
        to: Type,
    },
    /// `getelementptr [inbounds] (T, T* base, idx...)`
    GetElementPtr {
        /// Whether the `inbounds` flag was present
        inbounds: bool,
        /// Type the base pointer points to
        element_type: Type,
        /// Base pointer
        base: Box<TypedValue>,
        /// Index chain, first index steps over the base pointer
        indices: Vec<TypedValue>,
    },
    /// `[ T a, T b, ... ]`
    GenericArray(Vec<TypedValue>),
    /// `{ T a, U b, ... }`
    GenericStruct(Vec<TypedValue>),
}

impl Value {
    /// Shorthand for `Value::Reference(Reference::Local(..))`
    pub fn local(name: impl Into<String>) -> Value {
        Value::Reference(Reference::Local(name.into()))
    }

    /// Shorthand for `Value::Reference(Reference::Global(..))`
    pub fn global(name: impl Into<String>) -> Value {
        Value::Reference(Reference::Global(name.into()))
    }

    /// The global this value ultimately names, looking through bitcasts
    /// and getelementptr bases
    pub fn base_global(&self) -> Option<&str> {
        match self {
            Value::Reference(Reference::Global(id)) => Some(id),
            Value::Bitcast { value, .. } => value.base_global(),
            Value::GetElementPtr { base, .. } => base.value.base_global(),
            _ => None,
        }
    }

    /// Integer payload of a constant, widened to `i64`
    pub fn as_constant(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v as i64),
            Value::Long(v) => Some(*v),
            Value::Bool(b) => Some(*b as i64),
            Value::Null | Value::ZeroInitializer => Some(0),
            _ => None,
        }
    }

    /// Decode a `c"..."` literal: `\XX` is a hex byte, any other character
    /// is copied as its ordinal, which must fit in a byte.
    pub fn decode_i8_array(text: &str) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(text.len());
        let mut chars = text.chars();
        while let Some(ch) = chars.next() {
            if ch == '\\' {
                let hex: String = chars.by_ref().take(2).collect();
                let byte = match hex.len() {
                    2 => u8::from_str_radix(&hex, 16).ok(),
                    _ => None,
                };
                let byte = byte.ok_or_else(|| {
                    Error::layout(format!("invalid escape \\{} in c\"{}\"", hex, text))
                })?;
                out.push(byte);
            } else {
                let byte = u8::try_from(u32::from(ch)).map_err(|_| {
                    Error::layout(format!("character {:?} does not fit in a byte in c\"{}\"", ch, text))
                })?;
                out.push(byte);
            }
        }
        Ok(out)
    }
}

/// A value paired with its static type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedValue {
    /// Static type
    pub ty: Type,
    /// Operand
    pub value: Value,
}

impl TypedValue {
    /// Creates a new typed value
    pub fn new(ty: Type, value: Value) -> Self {
        TypedValue { ty, value }
    }
}

/// Formal parameter of a defined function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argument {
    /// Parameter type
    pub ty: Type,
    /// Register name (`...` for the variadic tail)
    pub name: String,
}

/// Function body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Body {
    /// Statements in source order, labels included
    pub stms: Vec<Stm>,
}

impl Body {
    /// True if any statement allocates stack memory
    pub fn has_alloca(&self) -> bool {
        self.stms.iter().any(|s| matches!(s, Stm::Alloca { .. }))
    }
}

/// Top-level declarations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Decl {
    /// `declare R @f(T, ...)`
    Declare {
        /// Return type
        ret_type: Type,
        /// Function name
        name: String,
        /// Parameter types
        arg_types: Vec<Type>,
    },
    /// `define R @f(T %a, ...) { ... }`
    DeclareFunction {
        /// Return type
        ret_type: Type,
        /// Function name
        name: String,
        /// Named parameters
        args: Vec<Argument>,
        /// Statements
        body: Body,
    },
    /// `@x = global T init`
    DeclareVar {
        /// Global name
        name: String,
        /// Value type
        ty: Type,
        /// Initializer
        value: Value,
        /// `constant` rather than `global`
        constant: bool,
    },
    /// `%name = type T`
    DeclareType {
        /// Struct name
        name: String,
        /// Definition
        ty: Type,
    },
    /// `$name = comdat kind`
    Comdat {
        /// Comdat name
        name: String,
        /// Selection kind (`any`, `largest`, ...)
        selection_kind: String,
    },
    /// `!name = ...` (content discarded)
    Metadata {
        /// Metadata node name
        name: String,
    },
    /// Directives with no effect on output (`target`, `attributes`, ...)
    Empty,
}

impl Decl {
    /// Name of a declared or defined function
    pub fn function_name(&self) -> Option<&str> {
        match self {
            Decl::Declare { name, .. } | Decl::DeclareFunction { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Parameter types of a declared or defined function
    pub fn param_types(&self) -> Vec<Type> {
        match self {
            Decl::Declare { arg_types, .. } => arg_types.clone(),
            Decl::DeclareFunction { args, .. } => args.iter().map(|a| a.ty.clone()).collect(),
            _ => Vec::new(),
        }
    }
}

/// Width conversion flavours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CastOp {
    /// `sext`
    SignExtend,
    /// `zext`
    ZeroExtend,
    /// `trunc`
    Truncate,
    /// `bitcast`, `ptrtoint`, `inttoptr`
    Bitcast,
}

impl CastOp {
    /// IR keyword
    pub fn keyword(self) -> &'static str {
        match self {
            CastOp::SignExtend => "sext",
            CastOp::ZeroExtend => "zext",
            CastOp::Truncate => "trunc",
            CastOp::Bitcast => "bitcast",
        }
    }
}

/// Function body statements
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stm {
    /// `%t = alloca T [, T n]`
    Alloca {
        /// Register receiving the address
        target: String,
        /// Allocated type
        ty: Type,
        /// Element count, one when absent
        count: Option<TypedValue>,
    },
    /// `%t = load T, T* p`
    Load {
        /// Register receiving the value
        target: String,
        /// Loaded type
        ty: Type,
        /// Address
        from: TypedValue,
    },
    /// `store T v, T* p`
    Store {
        /// Stored value
        value: TypedValue,
        /// Address
        dest: TypedValue,
    },
    /// Arithmetic, bitwise and `icmp` operations
    BinOp {
        /// Register receiving the result
        target: String,
        /// Operator (`add`, `sdiv`, `slt`, `eq`, ...)
        op: String,
        /// Operand type
        ty: Type,
        /// Left operand
        left: Value,
        /// Right operand
        right: Value,
    },
    /// `%t = getelementptr ...`
    Assign {
        /// Register receiving the value
        target: String,
        /// Computed value
        value: TypedValue,
    },
    /// `[%t =] [tail] call R @f(args)`
    Call {
        /// Register receiving the result
        target: Option<String>,
        /// Return type, or the full function type for variadic calls
        ret_type: Type,
        /// Callee
        callee: Value,
        /// Actual arguments
        args: Vec<TypedValue>,
    },
    /// `name:`
    Label(String),
    /// `br label %x`
    Jump(String),
    /// `br i1 %c, label %t, label %f`
    ConditionalJump {
        /// Branch condition
        cond: TypedValue,
        /// Taken when the condition is true
        if_true: String,
        /// Taken when the condition is false
        if_false: String,
    },
    /// `%t = phi T [v, %pred], ...`
    Phi {
        /// Register receiving the value
        target: String,
        /// Value type
        ty: Type,
        /// Predecessor label and incoming value, in source order
        incoming: Vec<(String, TypedValue)>,
    },
    /// `%t = select i1 c, T a, T b`
    Ternary {
        /// Register receiving the value
        target: String,
        /// Selector
        cond: TypedValue,
        /// Chosen when true
        if_true: TypedValue,
        /// Chosen when false
        if_false: TypedValue,
    },
    /// `%t = sext|zext|trunc|bitcast T v to U`
    Convert {
        /// Register receiving the value
        target: String,
        /// Conversion kind
        op: CastOp,
        /// Source value
        from: TypedValue,
        /// Destination type
        to: Type,
    },
    /// `ret T v` / `ret void`
    Return(Option<TypedValue>),
    /// `unreachable`
    Unreachable,
}

impl Stm {
    /// Register defined by this statement
    pub fn target(&self) -> Option<&str> {
        match self {
            Stm::Alloca { target, .. }
            | Stm::Load { target, .. }
            | Stm::BinOp { target, .. }
            | Stm::Assign { target, .. }
            | Stm::Phi { target, .. }
            | Stm::Ternary { target, .. }
            | Stm::Convert { target, .. } => Some(target),
            Stm::Call { target, .. } => target.as_deref(),
            _ => None,
        }
    }

    /// True for statements after which control never falls through
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Stm::Jump(_) | Stm::ConditionalJump { .. } | Stm::Return(_) | Stm::Unreachable
        )
    }
}
