//! Front-end tests: scanning, parsing and traversal of real-world IR

use llvm2jvm::compiler::dump_program;
use llvm2jvm::parser::visitor::walk_stm;
use llvm2jvm::parser::{CastOp, Reference, Visitor};
use llvm2jvm::{parse_str, tokenize, Decl, Error, Program, Stm, TokenKind, Type, Value};

/// Module shaped like clang -O0 output for a hello-world program
const CLANG_HELLO: &str = r#"; ModuleID = 'hello.c'
source_filename = "hello.c"
target datalayout = "e-m:e-i64:64-f80:128-n8:16:32:64-S128"
target triple = "x86_64-pc-linux-gnu"

@.str = private unnamed_addr constant [13 x i8] c"Hello world!\00", align 1

; Function Attrs: noinline nounwind optnone uwtable
define i32 @main() #0 {
entry:
  %retval = alloca i32, align 4
  store i32 0, i32* %retval, align 4
  %call = call i32 @puts(i8* getelementptr inbounds ([13 x i8], [13 x i8]* @.str, i32 0, i32 0))
  ret i32 0
}

declare i32 @puts(i8*) #1

attributes #0 = { noinline nounwind optnone uwtable "frame-pointer"="all" }
attributes #1 = { "frame-pointer"="all" }

!llvm.module.flags = !{!0}
!llvm.ident = !{!1}

!0 = !{i32 1, !"wchar_size", i32 4}
!1 = !{!"clang version 10.0.0"}
"#;

fn body(program: &Program, function: &str) -> Vec<Stm> {
    program
        .decls
        .iter()
        .find_map(|decl| match decl {
            Decl::DeclareFunction { name, body, .. } if name == function => {
                Some(body.stms.clone())
            }
            _ => None,
        })
        .unwrap_or_else(|| panic!("no function @{}", function))
}

// =============================================================================
// SCANNER
// =============================================================================

#[test]
fn test_token_stream_ends_with_eof() {
    let tokens = tokenize("ret void").unwrap();
    assert_eq!(tokens.len(), 3);
    assert_eq!(tokens.last().unwrap().kind, TokenKind::Eof);
}

#[test]
fn test_keywords_inside_strings_are_not_keywords() {
    let tokens = tokenize(r#"source_filename = "define""#).unwrap();
    assert_eq!(tokens[2].kind, TokenKind::String);
    assert!(!tokens[2].is("define"));
    assert!(tokens[0].is("source_filename"));
}

#[test]
fn test_lex_error_position_on_later_line() {
    let err = tokenize("ret void\n  ^").unwrap_err();
    match err {
        Error::LexError { line, col, ch } => {
            assert_eq!((line, col, ch), (2, 3, '^'));
        }
        other => panic!("unexpected {:?}", other),
    }
}

// =============================================================================
// MODULE STRUCTURE
// =============================================================================

#[test]
fn test_clang_module_parses() {
    let program = parse_str(CLANG_HELLO, "hello").unwrap();
    assert_eq!(program.module_name, "hello");

    let defined: Vec<&str> = program.functions().filter_map(Decl::function_name).collect();
    assert_eq!(defined, vec!["main"]);
    let declared = program
        .decls
        .iter()
        .filter(|d| matches!(d, Decl::Declare { .. }))
        .count();
    assert_eq!(declared, 1);

    let globals: Vec<&Decl> = program
        .decls
        .iter()
        .filter(|d| matches!(d, Decl::DeclareVar { .. }))
        .collect();
    assert_eq!(globals.len(), 1);
    match globals[0] {
        Decl::DeclareVar {
            name, ty, constant, ..
        } => {
            assert_eq!(name, ".str");
            assert_eq!(ty, &Type::Array(Box::new(Type::I8), 13));
            assert!(*constant);
        }
        _ => unreachable!(),
    }

    let metadata = program
        .decls
        .iter()
        .filter(|d| matches!(d, Decl::Metadata { .. }))
        .count();
    assert_eq!(metadata, 4);
}

#[test]
fn test_clang_main_body() {
    let program = parse_str(CLANG_HELLO, "hello").unwrap();
    let stms = body(&program, "main");
    assert_eq!(stms[0], Stm::Label("entry".into()));
    assert!(matches!(&stms[1], Stm::Alloca { target, ty: Type::Int(32), count: None } if target == "retval"));
    assert!(matches!(&stms[2], Stm::Store { .. }));
    assert!(matches!(&stms[3], Stm::Call { target: Some(t), .. } if t == "call"));
    assert!(matches!(&stms[4], Stm::Return(Some(_))));
}

#[test]
fn test_declared_signature() {
    let program = parse_str(CLANG_HELLO, "hello").unwrap();
    let puts = program
        .decls
        .iter()
        .find(|d| d.function_name() == Some("puts"))
        .unwrap();
    assert_eq!(puts.param_types(), vec![Type::I8.pointer_to()]);
}

#[test]
fn test_internal_class_name() {
    let program = parse_str("", "demo.pkg.Hello").unwrap();
    assert_eq!(program.internal_class_name(), "demo/pkg/Hello");
    assert!(program.decls.is_empty());
}

#[test]
fn test_comdat_and_named_struct() {
    let program = parse_str(
        "$f = comdat any\n%struct.Node = type { i32, %struct.Node* }",
        "T",
    )
    .unwrap();
    assert_eq!(
        program.decls[0],
        Decl::Comdat {
            name: "f".into(),
            selection_kind: "any".into(),
        }
    );
    match &program.decls[1] {
        Decl::DeclareType { name, ty } => {
            assert_eq!(name, "struct.Node");
            assert_eq!(
                ty,
                &Type::Struct(vec![
                    Type::I32,
                    Type::StructRef("struct.Node".into()).pointer_to()
                ])
            );
        }
        other => panic!("unexpected {:?}", other),
    }
}

// =============================================================================
// INSTRUCTIONS
// =============================================================================

#[test]
fn test_casts_fold_into_convert() {
    let program = parse_str(
        "define i64 @f(i32 %a, i64 %b, i8* %p) {\n\
         %1 = sext i32 %a to i64\n\
         %2 = trunc i64 %b to i8\n\
         %3 = zext i8 %2 to i32\n\
         %4 = ptrtoint i8* %p to i32\n\
         ret i64 %1\n}",
        "T",
    )
    .unwrap();
    let ops: Vec<CastOp> = body(&program, "f")
        .iter()
        .filter_map(|stm| match stm {
            Stm::Convert { op, .. } => Some(*op),
            _ => None,
        })
        .collect();
    assert_eq!(
        ops,
        vec![
            CastOp::SignExtend,
            CastOp::Truncate,
            CastOp::ZeroExtend,
            CastOp::Bitcast
        ]
    );
}

#[test]
fn test_select_and_icmp() {
    let program = parse_str(
        "define i32 @min(i32 %a, i32 %b) {\n\
         %c = icmp slt i32 %a, %b\n\
         %m = select i1 %c, i32 %a, i32 %b\n\
         ret i32 %m\n}",
        "T",
    )
    .unwrap();
    let stms = body(&program, "min");
    assert!(matches!(&stms[0], Stm::BinOp { op, .. } if op == "slt"));
    assert!(matches!(&stms[1], Stm::Ternary { target, .. } if target == "m"));
}

#[test]
fn test_unreachable_and_void_call() {
    let program = parse_str(
        "declare void @g()\n\
         define void @f() {\n  call void @g()\n  unreachable\n}",
        "T",
    )
    .unwrap();
    let stms = body(&program, "f");
    assert!(matches!(&stms[0], Stm::Call { target: None, .. }));
    assert_eq!(stms[1], Stm::Unreachable);
}

#[test]
fn test_syntax_error_names_token() {
    let err = parse_str("define i32 @f() {\n  ret i32 0\n  %x = bogus i32 1\n}", "T").unwrap_err();
    match err {
        Error::SyntaxError { line, token, .. } => {
            assert_eq!(line, 3);
            assert_eq!(token, "bogus");
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_unterminated_function() {
    assert!(matches!(
        parse_str("define void @f() {\n  ret void\n", "T").unwrap_err(),
        Error::UnexpectedEof { .. }
    ));
}

// =============================================================================
// VISITOR AND PRINTER
// =============================================================================

#[derive(Default)]
struct References {
    locals: usize,
    globals: Vec<String>,
    labels: usize,
}

impl<'ir> Visitor<'ir> for References {
    fn visit_stm(&mut self, stm: &'ir Stm) -> llvm2jvm::Result<()> {
        if let Stm::Label(_) = stm {
            self.labels += 1;
        }
        walk_stm(self, stm)
    }

    fn visit_reference(&mut self, reference: &'ir Reference) -> llvm2jvm::Result<()> {
        match reference {
            Reference::Local(_) => self.locals += 1,
            Reference::Global(name) => self.globals.push(name.clone()),
        }
        Ok(())
    }
}

#[test]
fn test_visitor_sees_references() {
    let program = parse_str(CLANG_HELLO, "hello").unwrap();
    let mut refs = References::default();
    refs.visit_program(&program).unwrap();
    assert_eq!(refs.labels, 1);
    assert!(refs.globals.contains(&"puts".to_string()));
    assert!(refs.globals.contains(&".str".to_string()));
    assert_eq!(refs.locals, 1);
}

struct StopAtCall;

impl<'ir> Visitor<'ir> for StopAtCall {
    fn visit_stm(&mut self, stm: &'ir Stm) -> llvm2jvm::Result<()> {
        if let Stm::Call { .. } = stm {
            return Err(Error::unsupported("call"));
        }
        walk_stm(self, stm)
    }
}

#[test]
fn test_visitor_error_aborts_traversal() {
    let program = parse_str(CLANG_HELLO, "hello").unwrap();
    let err = StopAtCall.visit_program(&program).unwrap_err();
    assert!(matches!(err, Error::Unsupported { .. }));
}

#[test]
fn test_printed_module_reparses_identically() {
    let program = parse_str(CLANG_HELLO, "hello").unwrap();
    let printed = dump_program(&program);
    assert!(printed.contains("define i32 @main() {"));
    assert!(printed.contains("declare i32 @puts(i8*)"));
    assert!(printed.contains("getelementptr inbounds ([13 x i8], [13 x i8]* @.str, i32 0, i32 0)"));

    let reparsed = parse_str(&printed, "hello").unwrap();
    let defined = |p: &Program| -> Vec<Decl> {
        p.decls
            .iter()
            .filter(|d| !matches!(d, Decl::Empty | Decl::Metadata { .. }))
            .cloned()
            .collect()
    };
    assert_eq!(defined(&reparsed), defined(&program));
}

#[test]
fn test_null_and_zeroinitializer_values() {
    let program = parse_str(
        "@p = global i32* null\n@a = global [4 x i32] zeroinitializer",
        "T",
    )
    .unwrap();
    assert!(matches!(&program.decls[0], Decl::DeclareVar { value: Value::Null, .. }));
    assert!(matches!(
        &program.decls[1],
        Decl::DeclareVar { value: Value::ZeroInitializer, .. }
    ));
}
