use super::ast::{
    Argument, Body, CastOp, Decl, Program, Reference, Stm, Type, TypedValue, Value,
};
use crate::error::{Error, Result};
use crate::lexer::{tokenize, Token, TokenKind};
use lazy_static::lazy_static;
use std::collections::HashSet;

lazy_static! {
    /// Linkage, visibility and storage keywords that may precede `global`/`constant`
    static ref GLOBAL_MODIFIERS: HashSet<&'static str> = [
        "private", "internal", "available_externally", "linkonce", "weak", "common",
        "appending", "extern_weak", "linkonce_odr", "weak_odr", "external",
        "default", "hidden", "protected", "dllimport", "dllexport",
        "unnamed_addr", "local_unnamed_addr", "dso_local", "dso_preemptable",
        "externally_initialized",
    ]
    .into_iter()
    .collect();

    /// Parameter and return attributes without an operand
    static ref PARAM_ATTRS: HashSet<&'static str> = [
        "zeroext", "signext", "inreg", "byval", "inalloca", "sret", "noalias", "nocapture",
        "nest", "returned", "nonnull", "noundef", "readonly", "writeonly", "readnone",
        "immarg", "swiftself", "swifterror",
    ]
    .into_iter()
    .collect();

    /// Parameter attributes that take one operand
    static ref PARAM_ATTRS_WITH_ARG: HashSet<&'static str> =
        ["align", "dereferenceable", "dereferenceable_or_null"].into_iter().collect();

    /// Function attributes that may follow a signature or call
    static ref FN_ATTRS: HashSet<&'static str> = [
        "nounwind", "uwtable", "readnone", "readonly", "writeonly", "optnone", "noinline",
        "alwaysinline", "ssp", "sspstrong", "sspreq", "norecurse", "argmemonly", "willreturn",
        "nofree", "nosync", "mustprogress", "noreturn", "cold", "minsize", "optsize",
        "unnamed_addr", "local_unnamed_addr",
    ]
    .into_iter()
    .collect();

    /// Calling conventions accepted before a call's return type
    static ref CALLING_CONVENTIONS: HashSet<&'static str> =
        ["ccc", "fastcc", "coldcc"].into_iter().collect();

    /// Two-operand arithmetic and bitwise opcodes
    static ref BINARY_OPS: HashSet<&'static str> = [
        "add", "sub", "mul", "sdiv", "udiv", "srem", "urem", "and", "or", "xor", "shl",
        "ashr", "lshr",
    ]
    .into_iter()
    .collect();

    /// Wrap and exactness flags on arithmetic
    static ref ARITH_FLAGS: HashSet<&'static str> =
        ["nsw", "nuw", "exact", "disjoint"].into_iter().collect();
}

/// Recursive-descent parser for textual LLVM IR
pub struct LlParser {
    tokens: Vec<Token>,
    current: usize,
}

impl LlParser {
    /// Creates a new parser over a token stream
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if tokens.last().map(|t| t.kind) != Some(TokenKind::Eof) {
            let (line, column) = tokens.last().map(|t| (t.line, t.column)).unwrap_or((1, 1));
            tokens.push(Token::new(TokenKind::Eof, String::new(), line, column));
        }
        LlParser { tokens, current: 0 }
    }

    /// Parses the tokens into a `Program`
    pub fn parse(&mut self, module_name: &str) -> Result<Program> {
        let mut decls = Vec::new();
        while !self.is_at_end() {
            decls.push(self.parse_toplevel()?);
        }

        Ok(Program {
            module_name: module_name.to_string(),
            decls,
        })
    }

    // =========================================================================
    // Top level
    // =========================================================================

    fn parse_toplevel(&mut self) -> Result<Decl> {
        if self.peek().kind == TokenKind::String {
            return Err(self.syntax_error("expected a top-level declaration"));
        }

        let keyword = self.peek().lexeme.clone();
        match keyword.as_str() {
            "target" => {
                self.advance();
                self.read_name()?;
                self.expect("=")?;
                self.read_string()?;
                Ok(Decl::Empty)
            }
            "source_filename" => {
                self.advance();
                self.expect("=")?;
                self.read_string()?;
                Ok(Decl::Empty)
            }
            "module" => {
                self.advance();
                self.expect("asm")?;
                self.read_string()?;
                Ok(Decl::Empty)
            }
            "declare" => self.parse_declare(),
            "define" => self.parse_define(),
            "attributes" => {
                self.advance();
                self.expect("#")?;
                self.read_name()?;
                self.expect("=")?;
                self.skip_balanced("{", "}")?;
                Ok(Decl::Empty)
            }
            "%" => {
                self.advance();
                let name = self.read_name()?;
                self.expect("=")?;
                self.expect("type")?;
                let ty = self.read_type()?;
                Ok(Decl::DeclareType { name, ty })
            }
            "@" => self.parse_global(),
            "$" => {
                self.advance();
                let name = self.read_name()?;
                self.expect("=")?;
                self.expect("comdat")?;
                let selection_kind = self.read_name()?;
                Ok(Decl::Comdat {
                    name,
                    selection_kind,
                })
            }
            "!" => {
                self.advance();
                let name = self.read_name()?;
                self.expect("=")?;
                self.skip_metadata_node()?;
                Ok(Decl::Metadata { name })
            }
            _ => Err(self.syntax_error("expected a top-level declaration")),
        }
    }

    fn parse_declare(&mut self) -> Result<Decl> {
        self.expect("declare")?;
        self.skip_words(&GLOBAL_MODIFIERS);
        self.skip_param_attrs()?;
        let ret_type = self.read_type()?;
        self.expect("@")?;
        let name = self.read_name()?;

        self.expect("(")?;
        let mut arg_types = Vec::new();
        while !self.check(")") {
            arg_types.push(self.read_type()?);
            self.skip_param_attrs()?;
            if self.check("%") {
                self.read_reference()?;
            }
            if !self.try_read(",") {
                break;
            }
        }
        self.expect(")")?;
        self.skip_fn_attrs()?;

        Ok(Decl::Declare {
            ret_type,
            name,
            arg_types,
        })
    }

    fn parse_define(&mut self) -> Result<Decl> {
        self.expect("define")?;
        self.skip_words(&GLOBAL_MODIFIERS);
        self.skip_param_attrs()?;
        let ret_type = self.read_type()?;
        self.expect("@")?;
        let name = self.read_name()?;

        self.expect("(")?;
        let mut args = Vec::new();
        let mut unnamed = 0usize;
        while !self.check(")") {
            let ty = self.read_type()?;
            self.skip_param_attrs()?;
            let arg_name = if ty == Type::Vararg {
                "...".to_string()
            } else if self.try_read("%") {
                self.read_name()?
            } else {
                // Unnamed parameters are numbered implicitly
                let n = unnamed.to_string();
                unnamed += 1;
                n
            };
            args.push(Argument { ty, name: arg_name });
            if !self.try_read(",") {
                break;
            }
        }
        self.expect(")")?;
        self.skip_fn_attrs()?;

        self.expect("{")?;
        let mut stms = Vec::new();
        while !self.check("}") {
            if self.is_at_end() {
                return Err(Error::UnexpectedEof {
                    context: format!("body of @{}", name),
                });
            }
            stms.push(self.parse_statement()?);
        }
        self.expect("}")?;

        Ok(Decl::DeclareFunction {
            ret_type,
            name,
            args,
            body: Body { stms },
        })
    }

    fn parse_global(&mut self) -> Result<Decl> {
        self.expect("@")?;
        let name = self.read_name()?;
        self.expect("=")?;

        let mut external = false;
        loop {
            if self.check("external") || self.check("extern_weak") {
                external = true;
                self.advance();
            } else if self.try_read("thread_local") {
                if self.check("(") {
                    self.skip_balanced("(", ")")?;
                }
            } else if self.try_read("addrspace") {
                self.skip_balanced("(", ")")?;
            } else if GLOBAL_MODIFIERS.contains(self.peek().lexeme.as_str())
                && self.peek().kind == TokenKind::Identifier
            {
                self.advance();
            } else {
                break;
            }
        }

        let constant = if self.try_read("constant") {
            true
        } else {
            self.expect("global")?;
            false
        };
        let ty = self.read_type()?;
        let value = if external {
            Value::ZeroInitializer
        } else {
            self.read_value(&ty)?
        };

        while self.try_read(",") {
            let attr = self.read()?;
            match attr.lexeme.as_str() {
                "section" | "partition" => {
                    self.read_string()?;
                }
                "comdat" => {
                    if self.check("(") {
                        self.skip_balanced("(", ")")?;
                    }
                }
                "align" => {
                    self.read_int()?;
                }
                "!" => {
                    self.read_name()?;
                    self.skip_metadata_ref()?;
                }
                _ => return Err(self.error_at(&attr, "unknown global attribute")),
            }
        }

        Ok(Decl::DeclareVar {
            name,
            ty,
            value,
            constant,
        })
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn parse_statement(&mut self) -> Result<Stm> {
        let token = self.peek().clone();

        if token.kind == TokenKind::Identifier && self.peek_at(1).is(":") {
            self.advance();
            self.advance();
            return Ok(Stm::Label(token.lexeme));
        }
        if token.kind == TokenKind::String {
            return Err(self.syntax_error("expected an instruction"));
        }

        let stm = match token.lexeme.as_str() {
            "%" => self.parse_assignment()?,
            "store" => {
                self.advance();
                self.try_read("volatile");
                let value = self.read_typed_value()?;
                self.expect(",")?;
                let dest = self.read_typed_value()?;
                Stm::Store { value, dest }
            }
            "call" | "tail" | "musttail" | "notail" => {
                self.advance();
                if token.lexeme != "call" {
                    self.expect("call")?;
                }
                self.read_call(None)?
            }
            "ret" => {
                self.advance();
                let ty = self.read_type()?;
                if ty == Type::Void {
                    Stm::Return(None)
                } else {
                    let value = self.read_value(&ty)?;
                    Stm::Return(Some(TypedValue::new(ty, value)))
                }
            }
            "br" => {
                self.advance();
                if self.try_read("label") {
                    Stm::Jump(self.read_label()?)
                } else {
                    let cond = self.read_typed_value()?;
                    self.expect(",")?;
                    self.expect("label")?;
                    let if_true = self.read_label()?;
                    self.expect(",")?;
                    self.expect("label")?;
                    let if_false = self.read_label()?;
                    Stm::ConditionalJump {
                        cond,
                        if_true,
                        if_false,
                    }
                }
            }
            "unreachable" => {
                self.advance();
                Stm::Unreachable
            }
            _ => return Err(self.syntax_error("unknown instruction")),
        };

        self.read_extra()?;
        Ok(stm)
    }

    fn parse_assignment(&mut self) -> Result<Stm> {
        self.expect("%")?;
        let target = self.read_name()?;
        self.expect("=")?;

        let op_token = self.read()?;
        let op = op_token.lexeme.as_str();
        let stm = match op {
            "alloca" => {
                let ty = self.read_type()?;
                let count = if self.check(",") && !self.extra_ahead() {
                    self.advance();
                    Some(self.read_typed_value()?)
                } else {
                    None
                };
                Stm::Alloca { target, ty, count }
            }
            "load" => {
                self.try_read("volatile");
                let first = self.read_type()?;
                let (ty, from) = if self.try_read(",") {
                    (first, self.read_typed_value()?)
                } else {
                    // Pre-3.7 form spells only the pointer type
                    let ty = first
                        .pointee()
                        .cloned()
                        .ok_or_else(|| self.syntax_error("load source must be a pointer"))?;
                    let value = self.read_value(&first)?;
                    (ty, TypedValue::new(first, value))
                };
                Stm::Load { target, ty, from }
            }
            op if BINARY_OPS.contains(op) => {
                let op = op.to_string();
                self.skip_words(&ARITH_FLAGS);
                let ty = self.read_type()?;
                let left = self.read_value(&ty)?;
                self.expect(",")?;
                let right = self.read_value(&ty)?;
                Stm::BinOp {
                    target,
                    op,
                    ty,
                    left,
                    right,
                }
            }
            "icmp" => {
                let predicate = self.read_name()?;
                let ty = self.read_type()?;
                let left = self.read_value(&ty)?;
                self.expect(",")?;
                let right = self.read_value(&ty)?;
                Stm::BinOp {
                    target,
                    op: predicate,
                    ty,
                    left,
                    right,
                }
            }
            "phi" => {
                let ty = self.read_type()?;
                let mut incoming = Vec::new();
                loop {
                    self.expect("[")?;
                    let value = self.read_value(&ty)?;
                    self.expect(",")?;
                    let label = self.read_label()?;
                    self.expect("]")?;
                    incoming.push((label, TypedValue::new(ty.clone(), value)));
                    if self.check(",") && self.peek_at(1).is("[") {
                        self.advance();
                    } else {
                        break;
                    }
                }
                Stm::Phi {
                    target,
                    ty,
                    incoming,
                }
            }
            "call" | "tail" | "musttail" | "notail" => {
                if op != "call" {
                    self.expect("call")?;
                }
                return self.read_call(Some(target));
            }
            "getelementptr" => {
                let inbounds = self.try_read("inbounds");
                let value = self.read_gep_operands(inbounds)?;
                Stm::Assign {
                    target,
                    value: TypedValue::new(Type::I8.pointer_to(), value),
                }
            }
            "select" => {
                let cond = self.read_typed_value()?;
                self.expect(",")?;
                let if_true = self.read_typed_value()?;
                self.expect(",")?;
                let if_false = self.read_typed_value()?;
                Stm::Ternary {
                    target,
                    cond,
                    if_true,
                    if_false,
                }
            }
            "sext" | "zext" | "trunc" | "bitcast" | "ptrtoint" | "inttoptr" => {
                let cast = match op {
                    "sext" => CastOp::SignExtend,
                    "zext" => CastOp::ZeroExtend,
                    "trunc" => CastOp::Truncate,
                    _ => CastOp::Bitcast,
                };
                self.skip_words(&ARITH_FLAGS);
                let from = self.read_typed_value()?;
                self.expect("to")?;
                let to = self.read_type()?;
                Stm::Convert {
                    target,
                    op: cast,
                    from,
                    to,
                }
            }
            _ => return Err(self.error_at(&op_token, "unknown instruction")),
        };

        self.read_extra()?;
        Ok(stm)
    }

    fn read_call(&mut self, target: Option<String>) -> Result<Stm> {
        self.skip_words(&CALLING_CONVENTIONS);
        self.skip_param_attrs()?;
        let ret_type = self.read_type()?;
        let callee = self.read_value(&ret_type)?;

        self.expect("(")?;
        let mut args = Vec::new();
        while !self.check(")") {
            let ty = self.read_type()?;
            self.skip_param_attrs()?;
            let value = self.read_value(&ty)?;
            args.push(TypedValue::new(ty, value));
            if !self.try_read(",") {
                break;
            }
        }
        self.expect(")")?;
        self.skip_fn_attrs()?;
        self.read_extra()?;

        Ok(Stm::Call {
            target,
            ret_type,
            callee,
            args,
        })
    }

    // =========================================================================
    // Types and values
    // =========================================================================

    fn read_type(&mut self) -> Result<Type> {
        let mut ty = if self.try_read("[") {
            let count = self.read_u32()?;
            self.expect("x")?;
            let element = self.read_type()?;
            self.expect("]")?;
            Type::Array(Box::new(element), count)
        } else if self.try_read("{") {
            let mut fields = Vec::new();
            while !self.check("}") {
                fields.push(self.read_type()?);
                if !self.try_read(",") {
                    break;
                }
            }
            self.expect("}")?;
            Type::Struct(fields)
        } else if self.try_read("%") {
            Type::StructRef(self.read_name()?)
        } else if self.try_read("opaque") {
            Type::Struct(Vec::new())
        } else if self.try_read("...") {
            Type::Vararg
        } else if self.try_read("void") {
            Type::Void
        } else {
            self.read_basic_type()?
        };

        if self.try_read("(") {
            let mut params = Vec::new();
            while !self.check(")") {
                params.push(self.read_type()?);
                if !self.try_read(",") {
                    break;
                }
            }
            self.expect(")")?;
            ty = Type::Function(Box::new(ty), params);
        }

        while self.try_read("*") {
            ty = ty.pointer_to();
        }
        Ok(ty)
    }

    fn read_basic_type(&mut self) -> Result<Type> {
        let token = self.peek().clone();
        if token.kind == TokenKind::Identifier {
            if let Some(width) = token.lexeme.strip_prefix('i') {
                if let Ok(width) = width.parse::<u32>() {
                    self.advance();
                    return Ok(Type::Int(width));
                }
            }
            if matches!(
                token.lexeme.as_str(),
                "half" | "float" | "double" | "fp128" | "x86_fp80" | "ppc_fp128"
            ) {
                return Err(Error::unsupported(format!(
                    "floating point type {} at line {}",
                    token.lexeme, token.line
                )));
            }
        }
        Err(self.syntax_error("expected a type"))
    }

    fn read_typed_value(&mut self) -> Result<TypedValue> {
        let ty = self.read_type()?;
        let value = self.read_value(&ty)?;
        Ok(TypedValue::new(ty, value))
    }

    fn read_value(&mut self, ty: &Type) -> Result<Value> {
        if self.check("%") || self.check("@") {
            return Ok(Value::Reference(self.read_reference()?));
        }
        if self.check("c") && self.peek_at(1).kind == TokenKind::String {
            self.advance();
            return Ok(Value::I8Array(self.advance().lexeme));
        }

        let token = self.read()?;
        if token.kind == TokenKind::String {
            return Err(self.error_at(&token, "unexpected string literal"));
        }

        match token.lexeme.as_str() {
            "getelementptr" => {
                let inbounds = self.try_read("inbounds");
                self.expect("(")?;
                let gep = self.read_gep_operands(inbounds)?;
                self.expect(")")?;
                Ok(gep)
            }
            "bitcast" | "ptrtoint" | "inttoptr" => {
                self.expect("(")?;
                let from = self.read_type()?;
                let value = self.read_value(&from)?;
                self.expect("to")?;
                let to = self.read_type()?;
                self.expect(")")?;
                Ok(Value::Bitcast {
                    value: Box::new(value),
                    from,
                    to,
                })
            }
            "-" => {
                let digits = self.read()?;
                self.number_value(ty, &digits, &format!("-{}", digits.lexeme), "expected an integer literal")
            }
            "[" => {
                let mut elements = Vec::new();
                while !self.check("]") {
                    elements.push(self.read_typed_value()?);
                    if !self.try_read(",") {
                        break;
                    }
                }
                self.expect("]")?;
                Ok(Value::GenericArray(elements))
            }
            "{" => {
                let mut fields = Vec::new();
                while !self.check("}") {
                    fields.push(self.read_typed_value()?);
                    if !self.try_read(",") {
                        break;
                    }
                }
                self.expect("}")?;
                Ok(Value::GenericStruct(fields))
            }
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            "null" => Ok(Value::Null),
            "zeroinitializer" | "undef" | "poison" => Ok(Value::ZeroInitializer),
            text => self.number_value(ty, &token, text, "expected a value"),
        }
    }

    /// Operands of a getelementptr, after the keyword and `inbounds`
    fn read_gep_operands(&mut self, inbounds: bool) -> Result<Value> {
        let first = self.read_type()?;
        let (element_type, base) = if self.try_read(",") {
            (first, self.read_typed_value()?)
        } else {
            // Pre-3.7 form spells only the pointer type
            let element_type = first
                .pointee()
                .cloned()
                .ok_or_else(|| self.syntax_error("getelementptr base must be a pointer"))?;
            let value = self.read_value(&first)?;
            (element_type, TypedValue::new(first, value))
        };

        let mut indices = Vec::new();
        while self.check(",") && !self.extra_ahead() {
            self.advance();
            self.try_read("inrange");
            indices.push(self.read_typed_value()?);
        }

        Ok(Value::GetElementPtr {
            inbounds,
            element_type,
            base: Box::new(base),
            indices,
        })
    }

    /// Integer literal of type `ty`. Narrow values are kept sign-extended
    /// from their width, `i1` as 0 or 1.
    fn number_value(&self, ty: &Type, token: &Token, text: &str, expected: &str) -> Result<Value> {
        let n = text
            .parse::<i64>()
            .map_err(|_| self.error_at(token, expected))?;
        if ty.is_wide() {
            return Ok(Value::Long(n));
        }
        let width = match ty {
            Type::Int(width) => (*width).clamp(1, 32),
            _ => 32,
        };
        // Signed and unsigned spellings are both accepted
        let min = -(1i64 << (width - 1));
        let max = (1i64 << width) - 1;
        if n < min || n > max {
            return Err(self.error_at(
                token,
                format!("literal {} out of range for i{}", text, width),
            ));
        }
        let value = if width == 1 {
            (n & 1) as i32
        } else {
            let shift = 64 - width;
            ((n << shift) >> shift) as i32
        };
        Ok(Value::Int(value))
    }

    fn read_reference(&mut self) -> Result<Reference> {
        if self.try_read("%") {
            Ok(Reference::Local(self.read_name()?))
        } else if self.try_read("@") {
            Ok(Reference::Global(self.read_name()?))
        } else {
            Err(self.expected_error("a register or global"))
        }
    }

    fn read_label(&mut self) -> Result<String> {
        self.expect("%")?;
        self.read_name()
    }

    // =========================================================================
    // Attribute and metadata noise
    // =========================================================================

    /// Trailing `, align N` and `, !kind !N` annotations
    fn read_extra(&mut self) -> Result<()> {
        while self.check(",") && self.extra_ahead() {
            self.advance();
            if self.try_read("align") {
                self.read_int()?;
            } else {
                self.expect("!")?;
                self.read_name()?;
                self.skip_metadata_ref()?;
            }
        }
        Ok(())
    }

    fn extra_ahead(&self) -> bool {
        let next = self.peek_at(1);
        next.is("align") || next.is("!")
    }

    fn skip_words(&mut self, words: &HashSet<&'static str>) {
        while self.peek().kind == TokenKind::Identifier
            && words.contains(self.peek().lexeme.as_str())
        {
            self.advance();
        }
    }

    fn skip_param_attrs(&mut self) -> Result<()> {
        loop {
            if self.peek().kind != TokenKind::Identifier {
                return Ok(());
            }
            let word = self.peek().lexeme.as_str();
            if PARAM_ATTRS.contains(word) {
                self.advance();
            } else if PARAM_ATTRS_WITH_ARG.contains(word) {
                self.advance();
                if self.check("(") {
                    self.skip_balanced("(", ")")?;
                } else {
                    self.read_int()?;
                }
            } else {
                return Ok(());
            }
        }
    }

    fn skip_fn_attrs(&mut self) -> Result<()> {
        loop {
            if self.try_read("#") {
                self.read_name()?;
            } else if self.try_read("comdat") {
                if self.check("(") {
                    self.skip_balanced("(", ")")?;
                }
            } else if self.try_read("align") {
                self.read_int()?;
            } else if self.try_read("section") {
                self.read_string()?;
            } else if self.peek().kind == TokenKind::Identifier
                && FN_ATTRS.contains(self.peek().lexeme.as_str())
            {
                self.advance();
            } else {
                return Ok(());
            }
        }
    }

    /// `!N`, `!{...}` or `!"text"` after a metadata kind
    fn skip_metadata_ref(&mut self) -> Result<()> {
        self.expect("!")?;
        if self.check("{") {
            self.skip_balanced("{", "}")
        } else {
            self.read()?;
            Ok(())
        }
    }

    /// Right-hand side of a `!name = ...` definition
    fn skip_metadata_node(&mut self) -> Result<()> {
        self.try_read("distinct");
        self.expect("!")?;
        if self.check("{") {
            return self.skip_balanced("{", "}");
        }
        // Specialized node such as !DILocation(...)
        self.read_name()?;
        self.skip_balanced("(", ")")
    }

    fn skip_balanced(&mut self, open: &str, close: &str) -> Result<()> {
        let start = self.peek().clone();
        self.expect(open)?;
        let mut depth = 1usize;
        while depth > 0 {
            if self.is_at_end() {
                return Err(Error::UnexpectedEof {
                    context: format!(
                        "unbalanced '{}' opened at line {}, column {}",
                        open, start.line, start.column
                    ),
                });
            }
            let token = self.advance();
            if token.is(open) {
                depth += 1;
            } else if token.is(close) {
                depth -= 1;
            }
        }
        Ok(())
    }

    // =========================================================================
    // Cursor
    // =========================================================================

    fn is_at_end(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let index = (self.current + offset).min(self.tokens.len() - 1);
        &self.tokens[index]
    }

    fn advance(&mut self) -> Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.tokens[self.current - 1].clone()
    }

    /// Current cursor position, for `rewind`
    pub fn save(&self) -> usize {
        self.current
    }

    /// Moves the cursor back to a position returned by `save`
    pub fn rewind(&mut self, saved: usize) {
        self.current = saved.min(self.tokens.len() - 1);
    }

    fn check(&self, text: &str) -> bool {
        self.peek().is(text)
    }

    fn try_read(&mut self, text: &str) -> bool {
        if self.check(text) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, text: &str) -> Result<Token> {
        if self.check(text) {
            Ok(self.advance())
        } else {
            Err(self.expected_error(&format!("'{}'", text)))
        }
    }

    fn read(&mut self) -> Result<Token> {
        if self.is_at_end() {
            return Err(Error::UnexpectedEof {
                context: "expected another token".to_string(),
            });
        }
        Ok(self.advance())
    }

    /// Identifier, number or quoted name
    fn read_name(&mut self) -> Result<String> {
        match self.peek().kind {
            TokenKind::Identifier | TokenKind::String => Ok(self.advance().lexeme),
            _ => Err(self.expected_error("a name")),
        }
    }

    fn read_string(&mut self) -> Result<String> {
        match self.peek().kind {
            TokenKind::String => Ok(self.advance().lexeme),
            _ => Err(self.expected_error("a string literal")),
        }
    }

    fn read_int(&mut self) -> Result<i64> {
        let saved = self.save();
        let negative = self.try_read("-");
        let token = self.peek().clone();
        match token.lexeme.parse::<i64>() {
            Ok(n) if token.kind == TokenKind::Identifier => {
                self.advance();
                Ok(if negative { -n } else { n })
            }
            _ => {
                self.rewind(saved);
                Err(self.expected_error("an integer"))
            }
        }
    }

    fn read_u32(&mut self) -> Result<u32> {
        let token = self.peek().clone();
        let n = self.read_int()?;
        u32::try_from(n).map_err(|_| self.error_at(&token, "count out of range"))
    }

    fn syntax_error(&self, message: impl Into<String>) -> Error {
        let token = self.peek();
        self.error_at(token, message)
    }

    fn error_at(&self, token: &Token, message: impl Into<String>) -> Error {
        if token.kind == TokenKind::Eof {
            return Error::UnexpectedEof {
                context: message.into(),
            };
        }
        Error::SyntaxError {
            line: token.line,
            col: token.column,
            token: token.lexeme.clone(),
            message: message.into(),
        }
    }

    fn expected_error(&self, expected: &str) -> Error {
        let found = match self.peek().kind {
            TokenKind::String => format!("string \"{}\"", self.peek().lexeme),
            TokenKind::Eof => "end of input".to_string(),
            _ => format!("'{}'", self.peek().lexeme),
        };
        self.syntax_error(format!("expected {}, found {}", expected, found))
    }
}

/// Parse a token stream into a `Program`
pub fn parse(tokens: Vec<Token>, module_name: &str) -> Result<Program> {
    LlParser::new(tokens).parse(module_name)
}

/// Tokenize and parse IR text in one call
pub fn parse_str(source: &str, module_name: &str) -> Result<Program> {
    parse(tokenize(source)?, module_name)
}
