//! Property-based fuzzing tests for the IR front end and the class writer
//!
//! These tests use proptest to generate random inputs and verify that:
//! 1. The scanner and parser never panic on arbitrary input
//! 2. The structural verifier never panics on corrupted class files
//! 3. Straight-line integer programs compute what LLVM semantics say

mod support;

use llvm2jvm::compiler::jvm_identifier;
use llvm2jvm::{parse_str, tokenize, CompileOptions, Compiler, Verifier};
use proptest::prelude::*;
use support::{Jvm, Val};

// =============================================================================
// STRATEGY GENERATORS
// =============================================================================

/// Generate random strings that might break the scanner
fn arbitrary_source_string() -> impl Strategy<Value = String> {
    prop::string::string_regex(r"[\x00-\x7F]{0,500}").unwrap()
}

/// Generate token soup built from IR keywords and punctuation
fn ir_like_string() -> impl Strategy<Value = String> {
    prop::collection::vec(ir_token(), 0..60).prop_map(|tokens| tokens.join(" "))
}

fn ir_token() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("define".to_string()),
        Just("declare".to_string()),
        Just("global".to_string()),
        Just("constant".to_string()),
        Just("type".to_string()),
        Just("i32".to_string()),
        Just("i64".to_string()),
        Just("i8*".to_string()),
        Just("void".to_string()),
        Just("ret".to_string()),
        Just("br".to_string()),
        Just("label".to_string()),
        Just("phi".to_string()),
        Just("call".to_string()),
        Just("load".to_string()),
        Just("store".to_string()),
        Just("alloca".to_string()),
        Just("getelementptr".to_string()),
        Just("icmp".to_string()),
        Just("add".to_string()),
        Just("x".to_string()),
        Just("(".to_string()),
        Just(")".to_string()),
        Just("[".to_string()),
        Just("]".to_string()),
        Just("{".to_string()),
        Just("}".to_string()),
        Just(",".to_string()),
        Just("=".to_string()),
        Just("...".to_string()),
        Just("!{}".to_string()),
        Just("c\"A\\00\"".to_string()),
        "[a-z]{1,6}".prop_map(|name| format!("%{}", name)),
        "[a-z.]{1,6}".prop_map(|name| format!("@{}", name)),
        (-1000i64..1000i64).prop_map(|n| n.to_string()),
    ]
}

/// One instruction of a generated function body
#[derive(Debug, Clone)]
enum Step {
    /// `op i32 lhs, rhs`, both operands picked from earlier values
    Binary { op: &'static str, lhs: usize, rhs: usize },
    /// `op i32 lhs, constant`
    WithConstant { op: &'static str, lhs: usize, constant: i32 },
    /// Shift by a constant amount below 32
    Shift { op: &'static str, lhs: usize, amount: u32 },
}

fn step() -> impl Strategy<Value = Step> {
    let binary = prop::sample::select(vec!["add", "sub", "mul", "and", "or", "xor"]);
    let shift = prop::sample::select(vec!["shl", "ashr", "lshr"]);
    prop_oneof![
        (binary.clone(), any::<usize>(), any::<usize>())
            .prop_map(|(op, lhs, rhs)| Step::Binary { op, lhs, rhs }),
        (binary, any::<usize>(), any::<i32>())
            .prop_map(|(op, lhs, constant)| Step::WithConstant { op, lhs, constant }),
        (shift, any::<usize>(), 0u32..32)
            .prop_map(|(op, lhs, amount)| Step::Shift { op, lhs, amount }),
    ]
}

/// Render the steps as `define i32 @f(i32 %a, i32 %b)`
fn render(steps: &[Step]) -> String {
    let mut names = vec!["%a".to_string(), "%b".to_string()];
    let mut body = String::new();
    for (i, step) in steps.iter().enumerate() {
        let pick = |index: usize| names[index % names.len()].clone();
        let line = match step {
            Step::Binary { op, lhs, rhs } => format!("{} i32 {}, {}", op, pick(*lhs), pick(*rhs)),
            Step::WithConstant { op, lhs, constant } => {
                format!("{} i32 {}, {}", op, pick(*lhs), constant)
            }
            Step::Shift { op, lhs, amount } => format!("{} i32 {}, {}", op, pick(*lhs), amount),
        };
        body.push_str(&format!("  %r{} = {}\n", i, line));
        names.push(format!("%r{}", i));
    }
    let result = names.last().cloned().unwrap_or_default();
    format!("define i32 @f(i32 %a, i32 %b) {{\n{}  ret i32 {}\n}}\n", body, result)
}

fn apply(op: &str, x: i32, y: i32) -> i32 {
    match op {
        "add" => x.wrapping_add(y),
        "sub" => x.wrapping_sub(y),
        "mul" => x.wrapping_mul(y),
        "and" => x & y,
        "or" => x | y,
        "xor" => x ^ y,
        "shl" => x.wrapping_shl(y as u32),
        "ashr" => x >> y,
        "lshr" => ((x as u32) >> y) as i32,
        other => panic!("no operator {}", other),
    }
}

/// Reference evaluation with two's-complement wraparound
fn evaluate(steps: &[Step], a: i32, b: i32) -> i32 {
    let mut values = vec![a, b];
    for step in steps {
        let pick = |index: usize| values[index % values.len()];
        let value = match step {
            Step::Binary { op, lhs, rhs } => apply(op, pick(*lhs), pick(*rhs)),
            Step::WithConstant { op, lhs, constant } => apply(op, pick(*lhs), *constant),
            Step::Shift { op, lhs, amount } => apply(op, pick(*lhs), *amount as i32),
        };
        values.push(value);
    }
    values[values.len() - 1]
}

// =============================================================================
// FRONT END FUZZ TESTS
// =============================================================================

proptest! {
    /// The scanner should never panic on arbitrary input
    #[test]
    fn lexer_never_panics(source in arbitrary_source_string()) {
        let _ = tokenize(&source);
    }

    /// The parser should never panic on keyword soup
    #[test]
    fn parser_never_panics_on_ir_tokens(source in ir_like_string()) {
        let _ = parse_str(&source, "Fuzz");
    }

    /// Parser handles deeply nested array types
    #[test]
    fn parser_handles_deep_nesting(depth in 1usize..64) {
        let ty = format!("{}i32{}", "[2 x ".repeat(depth), "]".repeat(depth));
        let source = format!("@g = global {} zeroinitializer", ty);
        prop_assert!(parse_str(&source, "Fuzz").is_ok());
    }

    /// Parser handles unbalanced braces without panic
    #[test]
    fn parser_handles_unbalanced_braces(opens in 0usize..20, closes in 0usize..20) {
        let source = format!(
            "define void @f() {}\n  ret void\n{}",
            "{".repeat(opens),
            "}".repeat(closes)
        );
        let _ = parse_str(&source, "Fuzz");
    }

    /// Mapped names only use identifier characters and never start with a digit
    #[test]
    fn jvm_identifier_is_legal(name in "[ -~]{0,24}") {
        let ident = jvm_identifier(&name);
        prop_assert!(!ident.is_empty());
        prop_assert!(!ident.starts_with(|c: char| c.is_ascii_digit()));
        prop_assert!(ident.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$'));
    }
}

// =============================================================================
// COMPILER FUZZ TESTS
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Generated arithmetic matches wrapping i32 evaluation
    #[test]
    fn arithmetic_matches_reference(
        steps in prop::collection::vec(step(), 1..24),
        a in any::<i32>(),
        b in any::<i32>()
    ) {
        let source = render(&steps);
        let result = Compiler::new(CompileOptions::default()).compile(&source).unwrap();
        let mut jvm = Jvm::load(&result.class_bytes).unwrap();
        let ret = jvm.call("f", &[Val::Int(a), Val::Int(b)]).unwrap();
        prop_assert_eq!(ret, Some(Val::Int(evaluate(&steps, a, b))));
    }

    /// Compiling the same module twice yields identical bytes
    #[test]
    fn compilation_is_deterministic(steps in prop::collection::vec(step(), 1..16)) {
        let source = render(&steps);
        let compiler = Compiler::new(CompileOptions::default());
        let first = compiler.compile(&source).unwrap();
        let second = compiler.compile(&source).unwrap();
        prop_assert_eq!(first.class_bytes, second.class_bytes);
    }

    /// The verifier reports corrupted classes instead of panicking
    #[test]
    fn verifier_survives_corruption(
        steps in prop::collection::vec(step(), 1..8),
        position in any::<usize>(),
        byte in any::<u8>()
    ) {
        let source = render(&steps);
        let mut bytes = Compiler::new(CompileOptions::default())
            .compile(&source)
            .unwrap()
            .class_bytes;
        let index = position % bytes.len();
        bytes[index] = byte;
        let _ = Verifier::new().verify(&bytes);
    }

    /// Truncated classes are never valid
    #[test]
    fn truncated_class_is_invalid(cut in 1usize..200) {
        let bytes = Compiler::new(CompileOptions::default())
            .compile("define i32 @f() {\n  ret i32 1\n}")
            .unwrap()
            .class_bytes;
        let cut = cut.min(bytes.len() - 1);
        let result = Verifier::new().verify(&bytes[..bytes.len() - cut]);
        prop_assert!(!result.valid);
    }
}

// =============================================================================
// REGRESSION TESTS
// =============================================================================

#[test]
fn regression_empty_input() {
    let program = parse_str("", "Empty").unwrap();
    assert!(program.decls.is_empty());
}

#[test]
fn regression_only_comments() {
    let program = parse_str("; one\n; two\n", "Empty").unwrap();
    assert!(program.decls.is_empty());
}

#[test]
fn regression_null_bytes() {
    assert!(tokenize("\0\0\0").is_ok());
}

#[test]
fn regression_very_long_number() {
    let source = format!("@g = global i64 {}", "9".repeat(40));
    assert!(parse_str(&source, "Long").is_err());
}

#[test]
fn regression_shift_by_31() {
    let steps = vec![Step::Shift {
        op: "shl",
        lhs: 0,
        amount: 31,
    }];
    assert_eq!(evaluate(&steps, 1, 0), i32::MIN);
    let result = Compiler::new(CompileOptions::default())
        .compile(&render(&steps))
        .unwrap();
    let mut jvm = Jvm::load(&result.class_bytes).unwrap();
    assert_eq!(
        jvm.call("f", &[Val::Int(1), Val::Int(0)]).unwrap(),
        Some(Val::Int(i32::MIN))
    );
}
