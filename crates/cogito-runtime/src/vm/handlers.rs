//! Opcode effects
//!
//! Each effect runs after the dispatcher has checked stack underflow, so the
//! pops here only fail on corrupted state.

use super::frame::{Frame, IteratorState};
use super::state::Status;
use super::Vm;
use crate::bytecode::{Instruction, Opcode, Operand};
use crate::heap::{Heap, Properties};
use crate::json;
use crate::value::{format_number, to_display_string, to_js_string, Fault, Value};
use regex::{Captures, Regex};

// ============================================================================
// Operand access
// ============================================================================

fn bad_operand(instruction: &Instruction, expected: &'static str) -> Fault {
    Fault::InvalidOperand {
        opcode: instruction.op,
        expected,
    }
}

fn name_operand(instruction: &Instruction) -> Result<&str, Fault> {
    instruction
        .arg
        .as_ref()
        .and_then(Operand::as_name)
        .ok_or_else(|| bad_operand(instruction, "a name"))
}

fn address_operand(instruction: &Instruction) -> Result<usize, Fault> {
    instruction
        .arg
        .as_ref()
        .and_then(Operand::as_address)
        .ok_or_else(|| bad_operand(instruction, "an address"))
}

fn count_operand(instruction: &Instruction) -> Result<usize, Fault> {
    instruction
        .arg
        .as_ref()
        .and_then(Operand::as_address)
        .ok_or_else(|| bad_operand(instruction, "a count"))
}

fn regex_operand(instruction: &Instruction) -> Result<(&str, &str), Fault> {
    match &instruction.arg {
        Some(Operand::Regex { pattern, flags }) => Ok((pattern, flags)),
        _ => Err(bad_operand(instruction, "a {pattern, flags}")),
    }
}

// ============================================================================
// Shared helpers
// ============================================================================

/// Pop b, pop a, push f(a, b)
fn binary(
    vm: &mut Vm,
    f: impl FnOnce(&Vm, &Value, &Value) -> Result<Value, Fault>,
) -> Result<(), Fault> {
    let b = vm.pop()?;
    let a = vm.pop()?;
    let result = f(vm, &a, &b)?;
    vm.push(result);
    Ok(())
}

fn numeric_operands(op: Opcode, a: &Value, b: &Value) -> Result<(f64, f64), Fault> {
    match (a.to_number(), b.to_number()) {
        (Some(x), Some(y)) => Ok((x, y)),
        _ => Err(Fault::TypeError(format!(
            "unsupported operand types for {}: {} and {}",
            op,
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn arithmetic(vm: &mut Vm, op: Opcode, f: fn(f64, f64) -> f64) -> Result<(), Fault> {
    binary(vm, |_, a, b| {
        let (x, y) = numeric_operands(op, a, b)?;
        Ok(Value::Number(f(x, y)))
    })
}

/// Relational comparison: lexicographic for two strings, numeric otherwise
fn relational(vm: &mut Vm, op: Opcode, f: fn(std::cmp::Ordering) -> bool) -> Result<(), Fault> {
    binary(vm, |_, a, b| {
        if let (Value::String(x), Value::String(y)) = (a, b) {
            return Ok(Value::Bool(f(x.cmp(y))));
        }
        let (x, y) = numeric_operands(op, a, b)?;
        Ok(Value::Bool(x.partial_cmp(&y).map(f).unwrap_or(false)))
    })
}

fn js_pow(base: f64, exponent: f64) -> f64 {
    if exponent.is_nan() || (base.abs() == 1.0 && exponent.is_infinite()) {
        return f64::NAN;
    }
    base.powf(exponent)
}

/// Furthest an index assignment may reach past the end of an array
const MAX_ARRAY_GROWTH: usize = 1 << 20;

/// Array index denoted by `key`, if any
fn array_index(key: &Value) -> Option<usize> {
    match key {
        Value::Number(n) if *n >= 0.0 && n.fract() == 0.0 && n.is_finite() => Some(*n as usize),
        Value::String(s) => s.parse::<usize>().ok().filter(|i| i.to_string() == *s),
        _ => None,
    }
}

/// Property name denoted by `key`
fn property_key(key: &Value, heap: &Heap) -> Result<String, Fault> {
    match key {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(format_number(*n)),
        other => to_js_string(other, heap),
    }
}

fn get_member(heap: &Heap, target: &Value, key: &Value) -> Result<Value, Fault> {
    match target {
        Value::Undefined | Value::Null => Err(Fault::TypeError(format!(
            "Cannot read properties of {} (reading '{}')",
            target,
            property_key(key, heap)?
        ))),
        Value::ArrayRef(id) => {
            let items = heap.array(*id)?;
            Ok(match array_index(key) {
                Some(index) => items.get(index).cloned().unwrap_or(Value::Undefined),
                None if property_key(key, heap)? == "length" => Value::Number(items.len() as f64),
                None => Value::Undefined,
            })
        }
        Value::ObjectRef(id) => {
            let name = property_key(key, heap)?;
            Ok(heap
                .object(*id)?
                .get(&name)
                .cloned()
                .unwrap_or(Value::Undefined))
        }
        Value::String(s) => Ok(match array_index(key) {
            Some(index) => s
                .chars()
                .nth(index)
                .map(|c| Value::String(c.to_string()))
                .unwrap_or(Value::Undefined),
            None if property_key(key, heap)? == "length" => Value::Number(s.chars().count() as f64),
            None => Value::Undefined,
        }),
        Value::Bool(_) | Value::Number(_) => Ok(Value::Undefined),
    }
}

fn set_member(heap: &mut Heap, target: &Value, key: &Value, value: Value) -> Result<(), Fault> {
    match target {
        Value::ArrayRef(id) => {
            let Some(index) = array_index(key) else {
                return Err(Fault::TypeError(format!(
                    "Cannot set property '{}' on an array",
                    property_key(key, heap)?
                )));
            };
            let items = heap.array_mut(*id)?;
            if index >= items.len() {
                let growth = index - items.len() + 1;
                if growth > MAX_ARRAY_GROWTH || items.try_reserve(growth).is_err() {
                    return Err(Fault::ResourceExhausted(format!(
                        "cannot grow an array of length {} to index {}",
                        items.len(),
                        index
                    )));
                }
                items.resize(index + 1, Value::Undefined);
            }
            items[index] = value;
            Ok(())
        }
        Value::ObjectRef(id) => {
            let name = property_key(key, heap)?;
            heap.object_mut(*id)?.set(name, value);
            Ok(())
        }
        other => Err(Fault::TypeError(format!(
            "Cannot set properties of {} (setting '{}')",
            other.type_name(),
            property_key(key, heap)?
        ))),
    }
}

/// Enumerable keys: object keys in insertion order, indices for arrays and strings
fn keys_of(heap: &Heap, target: &Value) -> Result<Vec<String>, Fault> {
    Ok(match target {
        Value::ObjectRef(id) => heap.object(*id)?.keys().map(str::to_string).collect(),
        Value::ArrayRef(id) => (0..heap.array(*id)?.len()).map(|i| i.to_string()).collect(),
        Value::String(s) => (0..s.chars().count()).map(|i| i.to_string()).collect(),
        _ => Vec::new(),
    })
}

/// `{source, flags}` of a regex object
fn regex_parts(heap: &Heap, value: &Value) -> Option<(String, String)> {
    let Value::ObjectRef(id) = value else {
        return None;
    };
    let props = heap.object(*id).ok()?;
    match (props.get("source"), props.get("flags")) {
        (Some(Value::String(source)), Some(Value::String(flags))) if props.len() == 2 => {
            Some((source.clone(), flags.clone()))
        }
        _ => None,
    }
}

/// Expand `$$`, `$&` and `$1`..`$9` in a replacement string
fn expand_replacement<'a>(
    template: &str,
    whole: &str,
    group: impl Fn(usize) -> Option<Option<&'a str>>,
) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some('$') => {
                chars.next();
                out.push('$');
            }
            Some('&') => {
                chars.next();
                out.push_str(whole);
            }
            Some(d @ '1'..='9') => {
                let index = d as usize - '0' as usize;
                match group(index) {
                    Some(text) => {
                        chars.next();
                        out.push_str(text.unwrap_or(""));
                    }
                    None => out.push('$'),
                }
            }
            _ => out.push('$'),
        }
    }
    out
}

fn replace_literal(subject: &str, pattern: &str, replacement: &str) -> String {
    match subject.find(pattern) {
        Some(start) => {
            let expanded = expand_replacement(replacement, pattern, |_| None);
            let mut out = String::with_capacity(subject.len() + expanded.len());
            out.push_str(&subject[..start]);
            out.push_str(&expanded);
            out.push_str(&subject[start + pattern.len()..]);
            out
        }
        None => subject.to_string(),
    }
}

fn replace_regex(regex: &Regex, global: bool, subject: &str, replacement: &str) -> String {
    let replacer = |caps: &Captures| {
        let whole = caps.get(0).map(|m| m.as_str()).unwrap_or("");
        expand_replacement(replacement, whole, |i| {
            if i < caps.len() {
                Some(caps.get(i).map(|m| m.as_str()))
            } else {
                None
            }
        })
    };
    if global {
        regex.replace_all(subject, replacer).into_owned()
    } else {
        regex.replace(subject, replacer).into_owned()
    }
}

fn string_list(heap: &mut Heap, items: Vec<String>) -> Value {
    heap.alloc_array(items.into_iter().map(Value::String).collect())
}

// ============================================================================
// Stack
// ============================================================================

pub(super) fn push(vm: &mut Vm, instruction: &Instruction) -> Result<(), Fault> {
    let value = match &instruction.arg {
        Some(Operand::Int(n)) => Value::Number(*n as f64),
        Some(Operand::Number(n)) => Value::Number(*n),
        Some(Operand::Bool(b)) => Value::Bool(*b),
        Some(Operand::Str(s)) => Value::String(s.clone()),
        _ => return Err(bad_operand(instruction, "a literal")),
    };
    vm.push(value);
    Ok(())
}

pub(super) fn push_undefined(vm: &mut Vm, _: &Instruction) -> Result<(), Fault> {
    vm.push(Value::Undefined);
    Ok(())
}

pub(super) fn push_null(vm: &mut Vm, _: &Instruction) -> Result<(), Fault> {
    vm.push(Value::Null);
    Ok(())
}

pub(super) fn pop(vm: &mut Vm, _: &Instruction) -> Result<(), Fault> {
    vm.pop()?;
    Ok(())
}

pub(super) fn dup(vm: &mut Vm, _: &Instruction) -> Result<(), Fault> {
    let top = vm.peek(0)?.clone();
    vm.push(top);
    Ok(())
}

pub(super) fn dup2(vm: &mut Vm, _: &Instruction) -> Result<(), Fault> {
    let a = vm.peek(1)?.clone();
    let b = vm.peek(0)?.clone();
    vm.push(a);
    vm.push(b);
    Ok(())
}

pub(super) fn swap(vm: &mut Vm, _: &Instruction) -> Result<(), Fault> {
    let b = vm.pop()?;
    let a = vm.pop()?;
    vm.push(b);
    vm.push(a);
    Ok(())
}

pub(super) fn halt(vm: &mut Vm, _: &Instruction) -> Result<(), Fault> {
    let result = vm.state.stack.last().cloned();
    vm.finish(result);
    Ok(())
}

// ============================================================================
// Arithmetic
// ============================================================================

pub(super) fn add(vm: &mut Vm, _: &Instruction) -> Result<(), Fault> {
    binary(vm, |vm, a, b| {
        if matches!(a, Value::String(_)) || matches!(b, Value::String(_)) {
            let heap = &vm.state.heap;
            let mut text = to_js_string(a, heap)?;
            text.push_str(&to_js_string(b, heap)?);
            return Ok(Value::String(text));
        }
        let (x, y) = numeric_operands(Opcode::Add, a, b)?;
        Ok(Value::Number(x + y))
    })
}

pub(super) fn sub(vm: &mut Vm, _: &Instruction) -> Result<(), Fault> {
    arithmetic(vm, Opcode::Sub, |a, b| a - b)
}

pub(super) fn mul(vm: &mut Vm, _: &Instruction) -> Result<(), Fault> {
    arithmetic(vm, Opcode::Mul, |a, b| a * b)
}

pub(super) fn div(vm: &mut Vm, _: &Instruction) -> Result<(), Fault> {
    arithmetic(vm, Opcode::Div, |a, b| a / b)
}

pub(super) fn rem(vm: &mut Vm, _: &Instruction) -> Result<(), Fault> {
    arithmetic(vm, Opcode::Mod, |a, b| a % b)
}

pub(super) fn pow(vm: &mut Vm, _: &Instruction) -> Result<(), Fault> {
    arithmetic(vm, Opcode::Pow, js_pow)
}

pub(super) fn neg(vm: &mut Vm, instruction: &Instruction) -> Result<(), Fault> {
    let value = vm.pop()?;
    let n = unary_number(instruction.op, &value)?;
    vm.push(Value::Number(-n));
    Ok(())
}

pub(super) fn to_number(vm: &mut Vm, instruction: &Instruction) -> Result<(), Fault> {
    let value = vm.pop()?;
    let n = unary_number(instruction.op, &value)?;
    vm.push(Value::Number(n));
    Ok(())
}

fn unary_number(op: Opcode, value: &Value) -> Result<f64, Fault> {
    value.to_number().ok_or_else(|| {
        Fault::TypeError(format!(
            "unsupported operand type for {}: {}",
            op,
            value.type_name()
        ))
    })
}

// ============================================================================
// Comparison / logical
// ============================================================================

pub(super) fn eq(vm: &mut Vm, _: &Instruction) -> Result<(), Fault> {
    binary(vm, |_, a, b| Ok(Value::Bool(a.loose_equals(b))))
}

pub(super) fn ne(vm: &mut Vm, _: &Instruction) -> Result<(), Fault> {
    binary(vm, |_, a, b| Ok(Value::Bool(!a.loose_equals(b))))
}

pub(super) fn strict_eq(vm: &mut Vm, _: &Instruction) -> Result<(), Fault> {
    binary(vm, |_, a, b| Ok(Value::Bool(a.strict_equals(b))))
}

pub(super) fn strict_ne(vm: &mut Vm, _: &Instruction) -> Result<(), Fault> {
    binary(vm, |_, a, b| Ok(Value::Bool(!a.strict_equals(b))))
}

pub(super) fn lt(vm: &mut Vm, _: &Instruction) -> Result<(), Fault> {
    relational(vm, Opcode::Lt, |o| o.is_lt())
}

pub(super) fn le(vm: &mut Vm, _: &Instruction) -> Result<(), Fault> {
    relational(vm, Opcode::Le, |o| o.is_le())
}

pub(super) fn gt(vm: &mut Vm, _: &Instruction) -> Result<(), Fault> {
    relational(vm, Opcode::Gt, |o| o.is_gt())
}

pub(super) fn ge(vm: &mut Vm, _: &Instruction) -> Result<(), Fault> {
    relational(vm, Opcode::Ge, |o| o.is_ge())
}

pub(super) fn not(vm: &mut Vm, _: &Instruction) -> Result<(), Fault> {
    let value = vm.pop()?;
    vm.push(Value::Bool(!value.is_truthy()));
    Ok(())
}

// ============================================================================
// Variables
// ============================================================================

pub(super) fn load(vm: &mut Vm, instruction: &Instruction) -> Result<(), Fault> {
    let name = name_operand(instruction)?;
    let frames = &vm.state.frames;
    let value = frames
        .last()
        .and_then(|frame| frame.variables.get(name))
        .or_else(|| frames.first().and_then(|frame| frame.variables.get(name)))
        .cloned()
        .unwrap_or(Value::Undefined);
    vm.push(value);
    Ok(())
}

pub(super) fn store(vm: &mut Vm, instruction: &Instruction) -> Result<(), Fault> {
    let name = name_operand(instruction)?;
    let value = vm.pop()?;
    let frames = &mut vm.state.frames;
    let in_current = frames
        .last()
        .map(|frame| frame.variables.contains_key(name))
        .unwrap_or(false);
    let in_entry = frames
        .first()
        .map(|frame| frame.variables.contains_key(name))
        .unwrap_or(false);
    let target = if !in_current && in_entry {
        frames.first_mut()
    } else {
        frames.last_mut()
    };
    match target {
        Some(frame) => {
            frame.variables.insert(name.to_string(), value);
            Ok(())
        }
        None => Err(no_frame()),
    }
}

pub(super) fn define(vm: &mut Vm, instruction: &Instruction) -> Result<(), Fault> {
    let name = name_operand(instruction)?;
    let value = vm.pop()?;
    vm.frame_mut()?.variables.insert(name.to_string(), value);
    Ok(())
}

fn no_frame() -> Fault {
    Fault::InvalidState("no active call frame".to_string())
}

// ============================================================================
// Control flow
// ============================================================================

pub(super) fn jump(vm: &mut Vm, instruction: &Instruction) -> Result<(), Fault> {
    vm.state.pc = address_operand(instruction)?;
    Ok(())
}

pub(super) fn jump_if_false(vm: &mut Vm, instruction: &Instruction) -> Result<(), Fault> {
    let target = address_operand(instruction)?;
    let condition = vm.pop()?;
    vm.state.pc = if condition.is_truthy() {
        vm.state.pc + 1
    } else {
        target
    };
    Ok(())
}

pub(super) fn jump_if_true(vm: &mut Vm, instruction: &Instruction) -> Result<(), Fault> {
    let target = address_operand(instruction)?;
    let condition = vm.pop()?;
    vm.state.pc = if condition.is_truthy() {
        target
    } else {
        vm.state.pc + 1
    };
    Ok(())
}

pub(super) fn call(vm: &mut Vm, instruction: &Instruction) -> Result<(), Fault> {
    let Some(Operand::Call { name, argc }) = &instruction.arg else {
        return Err(bad_operand(instruction, "a {name, argc}"));
    };
    let function = vm
        .program
        .function(name)
        .cloned()
        .ok_or_else(|| Fault::UnknownFunction(name.clone()))?;
    if vm.state.frames.len() > vm.config.max_call_depth {
        return Err(Fault::CallDepthExceeded(vm.config.max_call_depth));
    }

    let args = vm.pop_n(*argc)?;
    let mut frame = Frame::new(name.clone(), vm.state.pc + 1, vm.state.stack.len());
    let mut args = args.into_iter();
    for param in &function.params {
        frame
            .variables
            .insert(param.clone(), args.next().unwrap_or(Value::Undefined));
    }
    vm.state.frames.push(frame);
    vm.state.pc = function.address;
    Ok(())
}

pub(super) fn ret(vm: &mut Vm, _: &Instruction) -> Result<(), Fault> {
    let value = vm.pop()?;
    if vm.state.frames.len() <= 1 {
        vm.finish(Some(value));
        return Ok(());
    }
    let frame = vm.state.frames.pop().ok_or_else(no_frame)?;
    vm.state.stack.truncate(frame.stack_base);
    vm.push(value);
    vm.state.pc = frame.return_pc;
    Ok(())
}

// ============================================================================
// Arrays
// ============================================================================

pub(super) fn array_new(vm: &mut Vm, instruction: &Instruction) -> Result<(), Fault> {
    let items = vm.pop_n(count_operand(instruction)?)?;
    let array = vm.state.heap.alloc_array(items);
    vm.push(array);
    Ok(())
}

pub(super) fn array_push(vm: &mut Vm, instruction: &Instruction) -> Result<(), Fault> {
    let items = vm.pop_n(count_operand(instruction)?)?;
    let target = vm.pop()?;
    let Value::ArrayRef(id) = target else {
        return Err(Fault::TypeError(format!(
            "push is not a function on {}",
            target.type_name()
        )));
    };
    let array = vm.state.heap.array_mut(id)?;
    array.extend(items);
    let length = array.len();
    vm.push(Value::Number(length as f64));
    Ok(())
}

pub(super) fn array_get(vm: &mut Vm, _: &Instruction) -> Result<(), Fault> {
    binary(vm, |vm, target, key| get_member(&vm.state.heap, target, key))
}

pub(super) fn array_set(vm: &mut Vm, _: &Instruction) -> Result<(), Fault> {
    let value = vm.pop()?;
    let key = vm.pop()?;
    let target = vm.pop()?;
    set_member(&mut vm.state.heap, &target, &key, value.clone())?;
    vm.push(value);
    Ok(())
}

pub(super) fn length(vm: &mut Vm, _: &Instruction) -> Result<(), Fault> {
    let target = vm.pop()?;
    let value = get_member(&vm.state.heap, &target, &Value::string("length"))?;
    vm.push(value);
    Ok(())
}

// ============================================================================
// Objects
// ============================================================================

pub(super) fn object_create(vm: &mut Vm, _: &Instruction) -> Result<(), Fault> {
    let object = vm.state.heap.alloc_object(Properties::new());
    vm.push(object);
    Ok(())
}

pub(super) fn property_get(vm: &mut Vm, instruction: &Instruction) -> Result<(), Fault> {
    let key = Value::string(name_operand(instruction)?);
    let target = vm.pop()?;
    let value = get_member(&vm.state.heap, &target, &key)?;
    vm.push(value);
    Ok(())
}

pub(super) fn property_set(vm: &mut Vm, instruction: &Instruction) -> Result<(), Fault> {
    let key = Value::string(name_operand(instruction)?);
    let value = vm.pop()?;
    let target = vm.pop()?;
    set_member(&mut vm.state.heap, &target, &key, value.clone())?;
    vm.push(value);
    Ok(())
}

pub(super) fn object_keys(vm: &mut Vm, _: &Instruction) -> Result<(), Fault> {
    let target = vm.pop()?;
    if target.is_nullish() {
        return Err(Fault::TypeError(
            "Cannot convert undefined or null to object".to_string(),
        ));
    }
    let keys = keys_of(&vm.state.heap, &target)?;
    let array = string_list(&mut vm.state.heap, keys);
    vm.push(array);
    Ok(())
}

pub(super) fn object_iter_start(vm: &mut Vm, _: &Instruction) -> Result<(), Fault> {
    let target = vm.pop()?;
    let keys = keys_of(&vm.state.heap, &target)?;
    vm.frame_mut()?
        .iterators
        .push(IteratorState::Keys { keys, index: 0 });
    Ok(())
}

// ============================================================================
// Iteration
// ============================================================================

pub(super) fn iter_start(vm: &mut Vm, _: &Instruction) -> Result<(), Fault> {
    let iterable = vm.pop()?;
    let iterator = match &iterable {
        Value::ArrayRef(id) => {
            vm.state.heap.array(*id)?;
            IteratorState::Array { id: *id, index: 0 }
        }
        Value::String(s) => IteratorState::Values {
            items: s.chars().map(|c| Value::String(c.to_string())).collect(),
            index: 0,
        },
        other => {
            return Err(Fault::TypeError(format!(
                "{} is not iterable",
                other.type_name()
            )))
        }
    };
    vm.frame_mut()?.iterators.push(iterator);
    Ok(())
}

/// Shared by ITER_NEXT and OBJECT_ITER_NEXT
pub(super) fn iter_next(vm: &mut Vm, instruction: &Instruction) -> Result<(), Fault> {
    let exit = address_operand(instruction)?;
    let state = &mut vm.state;
    let iterator = state
        .frames
        .last_mut()
        .and_then(|frame| frame.iterators.last_mut())
        .ok_or_else(no_iterator)?;
    let next = match iterator {
        IteratorState::Array { id, index } => {
            let item = state.heap.array(*id)?.get(*index).cloned();
            if item.is_some() {
                *index += 1;
            }
            item
        }
        IteratorState::Values { items, index } => {
            let item = items.get(*index).cloned();
            if item.is_some() {
                *index += 1;
            }
            item
        }
        IteratorState::Keys { keys, index } => {
            let item = keys.get(*index).map(|key| Value::String(key.clone()));
            if item.is_some() {
                *index += 1;
            }
            item
        }
    };
    match next {
        Some(value) => {
            state.stack.push(value);
            state.pc += 1;
        }
        None => state.pc = exit,
    }
    Ok(())
}

pub(super) fn iter_end(vm: &mut Vm, _: &Instruction) -> Result<(), Fault> {
    vm.frame_mut()?.iterators.pop().ok_or_else(no_iterator)?;
    Ok(())
}

fn no_iterator() -> Fault {
    Fault::InvalidState("no open iterator in the current frame".to_string())
}

// ============================================================================
// JSON
// ============================================================================

pub(super) fn json_stringify(vm: &mut Vm, _: &Instruction) -> Result<(), Fault> {
    let value = vm.pop()?;
    let text = json::stringify(&value, &vm.state.heap)?;
    vm.push(text.map(Value::String).unwrap_or(Value::Undefined));
    Ok(())
}

pub(super) fn json_parse(vm: &mut Vm, _: &Instruction) -> Result<(), Fault> {
    let value = vm.pop()?;
    let text = match value {
        Value::String(s) => s,
        other => to_js_string(&other, &vm.state.heap)?,
    };
    let parsed = json::parse_json(&text, &mut vm.state.heap)?;
    vm.push(parsed);
    Ok(())
}

// ============================================================================
// Strings / regex
// ============================================================================

pub(super) fn string_replace(vm: &mut Vm, _: &Instruction) -> Result<(), Fault> {
    let replacement = vm.pop()?;
    let pattern = vm.pop()?;
    let subject = vm.pop()?;
    let heap = &vm.state.heap;
    let subject = to_js_string(&subject, heap)?;
    let replacement = to_js_string(&replacement, heap)?;

    let result = match regex_parts(heap, &pattern) {
        Some((source, flags)) => {
            let (regex, global) = vm.regex(&source, &flags)?;
            replace_regex(&regex, global, &subject, &replacement)
        }
        None => replace_literal(&subject, &to_js_string(&pattern, heap)?, &replacement),
    };
    vm.push(Value::String(result));
    Ok(())
}

pub(super) fn string_replace_regex(vm: &mut Vm, instruction: &Instruction) -> Result<(), Fault> {
    let (pattern, flags) = regex_operand(instruction)?;
    let (regex, global) = vm.regex(pattern, flags)?;
    let replacement = vm.pop()?;
    let subject = vm.pop()?;
    let heap = &vm.state.heap;
    let result = replace_regex(
        &regex,
        global,
        &to_js_string(&subject, heap)?,
        &to_js_string(&replacement, heap)?,
    );
    vm.push(Value::String(result));
    Ok(())
}

pub(super) fn load_regex(vm: &mut Vm, instruction: &Instruction) -> Result<(), Fault> {
    let (pattern, flags) = regex_operand(instruction)?;
    vm.regex(pattern, flags)?;
    let props: Properties = vec![
        ("source", Value::string(pattern)),
        ("flags", Value::string(flags)),
    ]
    .into_iter()
    .collect();
    let object = vm.state.heap.alloc_object(props);
    vm.push(object);
    Ok(())
}

// ============================================================================
// Introspection / output / filesystem
// ============================================================================

pub(super) fn type_of(vm: &mut Vm, _: &Instruction) -> Result<(), Fault> {
    let value = vm.pop()?;
    vm.push(Value::string(value.type_name()));
    Ok(())
}

pub(super) fn print(vm: &mut Vm, instruction: &Instruction) -> Result<(), Fault> {
    let values = vm.pop_n(count_operand(instruction)?)?;
    let mut parts = Vec::with_capacity(values.len());
    for value in &values {
        parts.push(to_display_string(value, &vm.state.heap)?);
    }
    vm.state.output.push(parts.join(" "));
    vm.push(Value::Undefined);
    Ok(())
}

pub(super) fn fs_list(vm: &mut Vm, _: &Instruction) -> Result<(), Fault> {
    let dir = vm.pop()?;
    let dir = to_js_string(&dir, &vm.state.heap)?;
    let result = match vm.fs.list_files(&dir) {
        Ok(names) => string_list(&mut vm.state.heap, names),
        Err(_) => Value::Null,
    };
    vm.push(result);
    Ok(())
}

pub(super) fn fs_read(vm: &mut Vm, _: &Instruction) -> Result<(), Fault> {
    let path = vm.pop()?;
    let path = to_js_string(&path, &vm.state.heap)?;
    let result = vm
        .fs
        .read_file(&path)
        .map(Value::String)
        .unwrap_or(Value::Null);
    vm.push(result);
    Ok(())
}

pub(super) fn fs_write(vm: &mut Vm, _: &Instruction) -> Result<(), Fault> {
    let contents = vm.pop()?;
    let path = vm.pop()?;
    let heap = &vm.state.heap;
    let contents = to_js_string(&contents, heap)?;
    let path = to_js_string(&path, heap)?;
    let result = match vm.fs.write_file(&path, &contents) {
        Ok(()) => Value::Bool(true),
        Err(_) => Value::Null,
    };
    vm.push(result);
    Ok(())
}

// ============================================================================
// Suspension
// ============================================================================

/// Pop the prompt and suspend; `pc` stays on the CC until a reply arrives
pub(super) fn cc(vm: &mut Vm, _: &Instruction) -> Result<(), Fault> {
    let prompt = vm.pop()?;
    let prompt = to_display_string(&prompt, &vm.state.heap)?;
    vm.state.pending_prompt = Some(prompt);
    vm.state.status = Status::WaitingCc;
    if let Some(profiler) = vm.profiler.as_mut() {
        profiler.record_suspension();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::HeapEntry;
    use rstest::rstest;

    #[rstest]
    #[case(Value::number(2), Some(2))]
    #[case(Value::number(1.5), None)]
    #[case(Value::number(-1), None)]
    #[case(Value::string("3"), Some(3))]
    #[case(Value::string("03"), None)]
    #[case(Value::string("x"), None)]
    fn test_array_index(#[case] key: Value, #[case] expected: Option<usize>) {
        assert_eq!(array_index(&key), expected);
    }

    #[test]
    fn test_expand_replacement() {
        assert_eq!(expand_replacement("[$&]", "ab", |_| None), "[ab]");
        assert_eq!(expand_replacement("$$1", "ab", |_| None), "$1");
        assert_eq!(expand_replacement("$1-", "ab", |_| None), "$1-");
        assert_eq!(
            expand_replacement("<$1>", "ab", |i| if i == 1 { Some(Some("b")) } else { None }),
            "<b>"
        );
    }

    #[test]
    fn test_replace_literal_first_occurrence_only() {
        assert_eq!(replace_literal("a-a-a", "a", "b"), "b-a-a");
        assert_eq!(replace_literal("abc", "x", "y"), "abc");
        assert_eq!(replace_literal("abc", "b", "[$&]"), "a[b]c");
    }

    #[test]
    fn test_js_pow_edge_cases() {
        assert_eq!(js_pow(2.0, 10.0), 1024.0);
        assert!(js_pow(1.0, f64::NAN).is_nan());
        assert!(js_pow(-1.0, f64::INFINITY).is_nan());
    }

    #[test]
    fn test_regex_parts_requires_exact_shape() {
        let mut heap = Heap::new();
        let props: Properties = vec![("source", Value::string("a+")), ("flags", Value::string("g"))]
            .into_iter()
            .collect();
        let regex = heap.alloc_object(props);
        assert_eq!(
            regex_parts(&heap, &regex),
            Some(("a+".to_string(), "g".to_string()))
        );
        let plain = heap.alloc_object(Properties::new());
        assert_eq!(regex_parts(&heap, &plain), None);
        assert!(matches!(heap.get(1), Ok(HeapEntry::Object(_))));
    }
}
