//! Compiler output and diagnostics through the public API

mod common;

use common::*;
use common::{assert_eq, assert_ne};
use cogito_runtime::bytecode::{validator, JUMP_PLACEHOLDER};
use cogito_runtime::diagnostic::codes;
use cogito_runtime::{disassemble, Bytecode, Cogito, Opcode, Operand};
use rstest::rstest;

fn opcodes(bytecode: &Bytecode) -> Vec<Opcode> {
    bytecode.instructions.iter().map(|i| i.op).collect()
}

#[test]
fn test_report_success_shape() {
    let report = Cogito::new().compile_source("let x = 1; print(x);");
    assert!(report.success);
    assert!(report.errors.is_empty());
    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["bytecode"]["instructions"][0]["op"], "PUSH");
}

#[test]
fn test_report_collects_all_errors_in_line_order() {
    let report = Cogito::new().compile_source("x.sort();\nbreak;\nlet f = () => 1;");
    assert!(!report.success);
    assert!(report.bytecode.instructions.is_empty());
    let lines: Vec<_> = report.errors.iter().map(|e| e.line).collect();
    assert_eq!(lines, vec![1, 2, 3]);
    assert_eq!(report.errors[2].code, codes::UNSUPPORTED_SYNTAX);
}

#[rstest]
#[case("CC(1, 2);")]
#[case("JSON.parse();")]
#[case("writeFile('a');")]
#[case("Object.keys(a, b);")]
fn test_builtin_arity_errors(#[case] source: &str) {
    let errors = Cogito::new().compile(source).unwrap_err();
    assert_eq!(errors[0].code, codes::BAD_ARGUMENTS);
}

#[test]
fn test_function_declaration_layout() {
    let bytecode = compile("function add(a, b) { return a + b; }\nprint(add(1, 2));");
    let info = bytecode.function("add").unwrap();
    assert_eq!(info.params, vec!["a".to_string(), "b".to_string()]);
    // The skip-jump lands right after the body
    let skip = &bytecode.instructions[0];
    assert_eq!(skip.op, Opcode::Jump);
    let after_body = skip.arg.as_ref().and_then(Operand::as_address).unwrap();
    assert_eq!(bytecode.instructions[after_body - 1].op, Opcode::Return);
    assert_eq!(info.address, 1);
}

#[test]
fn test_jumps_are_all_patched() {
    let bytecode = compile(
        "function main() {
             let n = 0;
             while (n < 10) { n++; if (n % 2 == 0) continue; if (n > 7) break; }
             for (const k in {a: 1}) { if (k) continue; }
             for (const v of [1]) { if (v) break; }
             do { n--; } while (n > 0 && n != 3);
             return n ?? 0;
         }",
    );
    assert!(validator::check_jumps(&bytecode).is_ok());
    for instruction in bytecode.instructions.iter().filter(|i| i.op.is_jump()) {
        assert_ne!(instruction.arg, Some(Operand::Int(JUMP_PLACEHOLDER)));
        let target = instruction.arg.as_ref().and_then(Operand::as_address).unwrap();
        assert!(target <= bytecode.instructions.len());
    }
}

#[test]
fn test_program_ends_with_halt() {
    for source in ["", "1;", "function main() {}", "if (true) { print(1); }"] {
        let bytecode = compile(source);
        assert_eq!(bytecode.instructions.last().map(|i| i.op), Some(Opcode::Halt));
    }
}

#[test]
fn test_extra_declarators_warn_but_compile() {
    let report = Cogito::new().compile_source("let a = 1, b = 2;");
    assert!(report.success);
    assert_eq!(report.warnings[0].code, codes::EXTRA_DECLARATORS);
}

#[test]
fn test_object_literal_disassembly() {
    let bytecode = compile("let o = {a: 1};");
    let listing = disassemble(&bytecode);
    assert_eq!(
        listing.lines().collect::<Vec<_>>(),
        vec![
            "=== Instructions ===",
            "0000  OBJECT_CREATE",
            "0001  DUP",
            "0002  PUSH 1",
            "0003  PROPERTY_SET \"a\"",
            "0004  POP",
            "0005  DEFINE \"o\"",
            "0006  HALT",
        ]
    );
}

#[test]
fn test_bytecode_json_round_trip_preserves_fingerprint() {
    let bytecode = compile("function main() { print(CC('q')); }");
    let restored = Bytecode::from_json(&bytecode.to_json().unwrap()).unwrap();
    assert_eq!(restored.fingerprint(), bytecode.fingerprint());
    assert_eq!(opcodes(&restored), opcodes(&bytecode));
}

#[test]
fn test_fingerprint_differs_between_programs() {
    assert_ne!(compile("print(1);").fingerprint(), compile("print(2);").fingerprint());
}

#[test]
fn test_compiled_bytecode_validates() {
    let bytecode = compile("let s = 'a'.replace(/a/g, 'b'); let r = /x/i; print(s, r);");
    assert!(validator::validate(&bytecode).is_ok());
}
