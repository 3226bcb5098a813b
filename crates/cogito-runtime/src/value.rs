//! Runtime values and runtime errors
//!
//! Primitives are stored inline; arrays and objects live in the [`Heap`] and
//! are referenced by id, so copies of a reference alias the same entry.

use crate::bytecode::Opcode;
use crate::heap::{Heap, HeapEntry};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

/// Runtime value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(#[serde(with = "js_number")] f64),
    String(String),
    /// Reference to a heap array
    ArrayRef(u64),
    /// Reference to a heap object
    ObjectRef(u64),
}

impl Value {
    pub fn number(n: impl Into<f64>) -> Self {
        Value::Number(n.into())
    }

    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    /// `typeof` result
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::ArrayRef(_) | Value::ObjectRef(_) => "object",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::ArrayRef(_) | Value::ObjectRef(_) => true,
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn is_ref(&self) -> bool {
        matches!(self, Value::ArrayRef(_) | Value::ObjectRef(_))
    }

    /// Heap id for references
    pub fn heap_id(&self) -> Option<u64> {
        match self {
            Value::ArrayRef(id) | Value::ObjectRef(id) => Some(*id),
            _ => None,
        }
    }

    /// ToNumber for primitives; `None` for references
    pub fn to_number(&self) -> Option<f64> {
        match self {
            Value::Undefined => Some(f64::NAN),
            Value::Null => Some(0.0),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Number(n) => Some(*n),
            Value::String(s) => Some(string_to_number(s)),
            Value::ArrayRef(_) | Value::ObjectRef(_) => None,
        }
    }

    /// `===`
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::ArrayRef(a), Value::ArrayRef(b)) | (Value::ObjectRef(a), Value::ObjectRef(b)) => {
                a == b
            }
            _ => false,
        }
    }

    /// `==`
    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() && b.is_nullish() => true,
            (a, b) if a.is_nullish() || b.is_nullish() => false,
            (Value::Number(a), Value::String(b)) => *a == string_to_number(b),
            (Value::String(a), Value::Number(b)) => string_to_number(a) == *b,
            (Value::Bool(_), _) | (_, Value::Bool(_)) if std::mem::discriminant(self) != std::mem::discriminant(other) => {
                match (self.to_number(), other.to_number()) {
                    (Some(a), Some(b)) => a == b,
                    _ => false,
                }
            }
            _ => self.strict_equals(other),
        }
    }
}

impl fmt::Display for Value {
    /// Primitive rendering; references show their heap id
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::String(s) => write!(f, "{}", s),
            Value::ArrayRef(id) => write!(f, "<array #{}>", id),
            Value::ObjectRef(id) => write!(f, "<object #{}>", id),
        }
    }
}

/// Number to string: integral values without fraction, `NaN`, `Infinity`
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    let abs = n.abs();
    if abs >= 1e21 || abs < 1e-6 {
        let formatted = format!("{:e}", n);
        return match formatted.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{}e+{}", mantissa, exp),
            _ => formatted,
        };
    }
    format!("{}", n)
}

/// ToNumber on a string
pub fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16)
            .map(|v| v as f64)
            .unwrap_or(f64::NAN);
    }
    let numeric = trimmed
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'));
    if !numeric {
        return f64::NAN;
    }
    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

/// Deepest container nesting that rendering and JSON conversion will follow
pub const MAX_NESTING: usize = 512;

pub(crate) fn nesting_fault() -> Fault {
    Fault::ResourceExhausted(format!("value nests deeper than {} levels", MAX_NESTING))
}

/// ToString, following references into the heap
///
/// Arrays join their elements with `,` (null/undefined elements are empty);
/// objects render as `[object Object]`; cycles render as empty.
pub fn to_js_string(value: &Value, heap: &Heap) -> Result<String, Fault> {
    let mut visiting = HashSet::new();
    to_js_string_inner(value, heap, &mut visiting, 0)
}

fn to_js_string_inner(
    value: &Value,
    heap: &Heap,
    visiting: &mut HashSet<u64>,
    depth: usize,
) -> Result<String, Fault> {
    match value {
        Value::ArrayRef(id) => {
            if !visiting.insert(*id) {
                return Ok(String::new());
            }
            if depth >= MAX_NESTING {
                return Err(nesting_fault());
            }
            let items = heap.array(*id)?;
            let mut parts = Vec::with_capacity(items.len());
            for item in items {
                if item.is_nullish() {
                    parts.push(String::new());
                } else {
                    parts.push(to_js_string_inner(item, heap, visiting, depth + 1)?);
                }
            }
            visiting.remove(id);
            Ok(parts.join(","))
        }
        Value::ObjectRef(id) => {
            heap.object(*id)?;
            Ok("[object Object]".to_string())
        }
        other => Ok(other.to_string()),
    }
}

/// Rendering used by `console.log`: strings raw, containers JSON-like
pub fn to_display_string(value: &Value, heap: &Heap) -> Result<String, Fault> {
    match value {
        Value::String(s) => Ok(s.clone()),
        _ => {
            let mut out = String::new();
            let mut visiting = HashSet::new();
            render_nested(value, heap, &mut visiting, 0, &mut out)?;
            Ok(out)
        }
    }
}

fn render_nested(
    value: &Value,
    heap: &Heap,
    visiting: &mut HashSet<u64>,
    depth: usize,
    out: &mut String,
) -> Result<(), Fault> {
    match value {
        Value::String(s) => out.push_str(&quote_json(s)),
        Value::ArrayRef(id) | Value::ObjectRef(id) => {
            if !visiting.insert(*id) {
                out.push_str("[Circular]");
                return Ok(());
            }
            if depth >= MAX_NESTING {
                return Err(nesting_fault());
            }
            match heap.get(*id)? {
                HeapEntry::Array(items) => {
                    out.push('[');
                    for (i, item) in items.iter().enumerate() {
                        if i > 0 {
                            out.push(',');
                        }
                        render_nested(item, heap, visiting, depth + 1, out)?;
                    }
                    out.push(']');
                }
                HeapEntry::Object(props) => {
                    out.push('{');
                    for (i, (key, item)) in props.iter().enumerate() {
                        if i > 0 {
                            out.push(',');
                        }
                        out.push_str(&quote_json(key));
                        out.push(':');
                        render_nested(item, heap, visiting, depth + 1, out)?;
                    }
                    out.push('}');
                }
            }
            visiting.remove(id);
        }
        other => out.push_str(&other.to_string()),
    }
    Ok(())
}

/// JSON string literal for `s`
pub fn quote_json(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

/// Serde representation for numbers that keeps NaN and infinities
mod js_number {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(n: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if n.is_finite() {
            serializer.serialize_f64(*n)
        } else {
            serializer.serialize_str(&super::format_number(*n))
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Number(n) => Ok(n),
            Repr::Text(text) => match text.as_str() {
                "NaN" => Ok(f64::NAN),
                "Infinity" => Ok(f64::INFINITY),
                "-Infinity" => Ok(f64::NEG_INFINITY),
                other => Err(serde::de::Error::custom(format!("invalid number '{}'", other))),
            },
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Failure raised by an instruction handler
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Fault {
    #[error("Stack underflow: {opcode} needs {needed} value(s), stack has {available}")]
    StackUnderflow {
        opcode: Opcode,
        needed: usize,
        available: usize,
    },
    #[error("invalid heap reference #{0}")]
    InvalidHeapRef(u64),
    #[error("Invalid regex /{pattern}/{flags}: {reason}")]
    InvalidRegex {
        pattern: String,
        flags: String,
        reason: String,
    },
    #[error("TypeError: {0}")]
    TypeError(String),
    #[error("Unknown function: {0}")]
    UnknownFunction(String),
    #[error("Maximum call depth of {0} exceeded")]
    CallDepthExceeded(usize),
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),
    #[error("Invalid operand for {opcode}: expected {expected}")]
    InvalidOperand {
        opcode: Opcode,
        expected: &'static str,
    },
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),
    #[error("Converting circular structure to JSON")]
    CyclicValue,
    #[error("Invalid machine state: {0}")]
    InvalidState(String),
}

impl Fault {
    /// Stable machine-readable category
    pub fn kind(&self) -> &'static str {
        match self {
            Fault::StackUnderflow { .. } => "stack_underflow",
            Fault::InvalidHeapRef(_) => "invalid_heap_reference",
            Fault::InvalidRegex { .. } => "invalid_regex",
            Fault::TypeError(_) => "type_error",
            Fault::UnknownFunction(_) => "unknown_function",
            Fault::CallDepthExceeded(_) | Fault::ResourceExhausted(_) => "resource_exhausted",
            Fault::InvalidOperand { .. } => "invalid_operand",
            Fault::InvalidJson(_) => "invalid_json",
            Fault::CyclicValue => "cyclic_value",
            Fault::InvalidState(_) => "invalid_state",
        }
    }
}

/// Fatal runtime error recorded in the execution state
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message} (at {opcode} pc {pc})")]
pub struct RuntimeError {
    /// Fault category, see [`Fault::kind`]
    pub kind: String,
    pub message: String,
    /// Address of the failing instruction
    pub pc: usize,
    pub opcode: Opcode,
    /// Source line of the failing instruction, when debug info is present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

impl RuntimeError {
    pub fn from_fault(fault: &Fault, pc: usize, opcode: Opcode) -> Self {
        Self {
            kind: fault.kind().to_string(),
            message: fault.to_string(),
            pc,
            opcode,
            line: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(3.0, "3")]
    #[case(-0.0, "0")]
    #[case(0.5, "0.5")]
    #[case(-2.25, "-2.25")]
    #[case(1e21, "1e+21")]
    #[case(1.5e-7, "1.5e-7")]
    #[case(f64::NAN, "NaN")]
    #[case(f64::INFINITY, "Infinity")]
    #[case(f64::NEG_INFINITY, "-Infinity")]
    #[case(123456789.0, "123456789")]
    fn test_format_number(#[case] n: f64, #[case] expected: &str) {
        assert_eq!(format_number(n), expected);
    }

    #[rstest]
    #[case("", 0.0)]
    #[case("  42 ", 42.0)]
    #[case("0x10", 16.0)]
    #[case("1e3", 1000.0)]
    #[case("-Infinity", f64::NEG_INFINITY)]
    fn test_string_to_number(#[case] s: &str, #[case] expected: f64) {
        assert_eq!(string_to_number(s), expected);
    }

    #[test]
    fn test_string_to_number_nan() {
        assert!(string_to_number("12px").is_nan());
        assert!(string_to_number("abc").is_nan());
    }

    #[rstest]
    #[case(Value::Undefined, false)]
    #[case(Value::Null, false)]
    #[case(Value::number(0), false)]
    #[case(Value::Number(f64::NAN), false)]
    #[case(Value::string(""), false)]
    #[case(Value::string("0"), true)]
    #[case(Value::number(-1), true)]
    #[case(Value::ArrayRef(1), true)]
    fn test_truthiness(#[case] value: Value, #[case] truthy: bool) {
        assert_eq!(value.is_truthy(), truthy);
    }

    #[test]
    fn test_loose_versus_strict_equality() {
        assert!(Value::Null.loose_equals(&Value::Undefined));
        assert!(!Value::Null.strict_equals(&Value::Undefined));
        assert!(Value::number(1).loose_equals(&Value::string("1")));
        assert!(!Value::number(1).strict_equals(&Value::string("1")));
        assert!(Value::Bool(true).loose_equals(&Value::number(1)));
        assert!(Value::Bool(false).loose_equals(&Value::string("0")));
        assert!(!Value::Null.loose_equals(&Value::number(0)));
        assert!(!Value::Number(f64::NAN).loose_equals(&Value::Number(f64::NAN)));
        assert!(Value::ObjectRef(2).strict_equals(&Value::ObjectRef(2)));
        assert!(!Value::ObjectRef(2).loose_equals(&Value::ObjectRef(3)));
    }

    #[test]
    fn test_value_json_shape() {
        assert_eq!(
            serde_json::to_string(&Value::number(2)).unwrap(),
            r#"{"type":"number","value":2.0}"#
        );
        assert_eq!(
            serde_json::to_string(&Value::Undefined).unwrap(),
            r#"{"type":"undefined"}"#
        );
        assert_eq!(
            serde_json::to_string(&Value::ArrayRef(3)).unwrap(),
            r#"{"type":"array_ref","value":3}"#
        );
    }

    #[test]
    fn test_non_finite_numbers_survive_serde() {
        let json = serde_json::to_string(&Value::Number(f64::NEG_INFINITY)).unwrap();
        assert_eq!(json, r#"{"type":"number","value":"-Infinity"}"#);
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Value::Number(f64::NEG_INFINITY));

        let nan: Value = serde_json::from_str(r#"{"type":"number","value":"NaN"}"#).unwrap();
        assert!(matches!(nan, Value::Number(n) if n.is_nan()));
    }

    #[test]
    fn test_to_js_string_and_display() {
        let mut heap = Heap::new();
        let inner = heap.alloc_array(vec![Value::number(2), Value::Null]);
        let outer = heap.alloc_array(vec![Value::number(1), inner.clone(), Value::string("x")]);
        assert_eq!(to_js_string(&outer, &heap).unwrap(), "1,2,,x");
        assert_eq!(to_display_string(&outer, &heap).unwrap(), r#"[1,[2,null],"x"]"#);

        let mut props = crate::heap::Properties::new();
        props.set("a", Value::number(1));
        let obj = heap.alloc_object(props);
        assert_eq!(to_js_string(&obj, &heap).unwrap(), "[object Object]");
        assert_eq!(to_display_string(&obj, &heap).unwrap(), r#"{"a":1}"#);
        assert_eq!(to_display_string(&Value::string("raw"), &heap).unwrap(), "raw");
    }

    #[test]
    fn test_runtime_error_from_fault() {
        let fault = Fault::StackUnderflow {
            opcode: Opcode::Pop,
            needed: 1,
            available: 0,
        };
        let err = RuntimeError::from_fault(&fault, 0, Opcode::Pop);
        assert_eq!(err.kind, "stack_underflow");
        assert_eq!(err.pc, 0);
        assert_eq!(err.opcode, Opcode::Pop);
    }
}
