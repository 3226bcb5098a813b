//! Conversion between runtime values and JSON
//!
//! Used by `JSON.stringify`/`JSON.parse` and by hosts that deliver replies to
//! a suspended execution as JSON.

use crate::heap::{Heap, HeapEntry, Properties};
use crate::value::{nesting_fault, Fault, Value, MAX_NESTING};
use std::collections::HashSet;

/// Largest integer a double represents exactly
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Parse JSON text into heap values
pub fn parse_json(text: &str, heap: &mut Heap) -> Result<Value, Fault> {
    let parsed: serde_json::Value =
        serde_json::from_str(text).map_err(|e| Fault::InvalidJson(e.to_string()))?;
    json_to_value(&parsed, heap)
}

/// Allocate `json` into the heap
///
/// Trees nested deeper than [`MAX_NESTING`] are rejected before anything is
/// allocated.
pub fn json_to_value(json: &serde_json::Value, heap: &mut Heap) -> Result<Value, Fault> {
    if exceeds_nesting(json) {
        return Err(nesting_fault());
    }
    Ok(allocate(json, heap))
}

fn allocate(json: &serde_json::Value, heap: &mut Heap) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => Value::String(s.clone()),
        serde_json::Value::Array(items) => {
            let values = items.iter().map(|item| allocate(item, heap)).collect();
            heap.alloc_array(values)
        }
        serde_json::Value::Object(map) => {
            let props: Properties = map
                .iter()
                .map(|(key, item)| (key.clone(), allocate(item, heap)))
                .collect();
            heap.alloc_object(props)
        }
    }
}

/// Whether `json` nests containers deeper than [`MAX_NESTING`]
fn exceeds_nesting(json: &serde_json::Value) -> bool {
    let mut pending = vec![(json, 0usize)];
    while let Some((node, depth)) = pending.pop() {
        match node {
            serde_json::Value::Array(_) | serde_json::Value::Object(_) if depth >= MAX_NESTING => {
                return true
            }
            serde_json::Value::Array(items) => {
                pending.extend(items.iter().map(|child| (child, depth + 1)))
            }
            serde_json::Value::Object(map) => {
                pending.extend(map.values().map(|child| (child, depth + 1)))
            }
            _ => {}
        }
    }
    false
}

/// `JSON.stringify`; `None` when the value has no JSON form (undefined)
pub fn stringify(value: &Value, heap: &Heap) -> Result<Option<String>, Fault> {
    let mut visiting = HashSet::new();
    Ok(value_to_json(value, heap, &mut visiting, 0)?.map(|json| json.to_string()))
}

/// Snapshot of `value` as a JSON tree
///
/// Undefined object members are skipped, undefined array elements become
/// `null` and non-finite numbers become `null`. Cycles are an error.
pub fn to_json(value: &Value, heap: &Heap) -> Result<serde_json::Value, Fault> {
    let mut visiting = HashSet::new();
    Ok(value_to_json(value, heap, &mut visiting, 0)?.unwrap_or(serde_json::Value::Null))
}

fn value_to_json(
    value: &Value,
    heap: &Heap,
    visiting: &mut HashSet<u64>,
    depth: usize,
) -> Result<Option<serde_json::Value>, Fault> {
    let json = match value {
        Value::Undefined => return Ok(None),
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => number_to_json(*n),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::ArrayRef(id) | Value::ObjectRef(id) => {
            if !visiting.insert(*id) {
                return Err(Fault::CyclicValue);
            }
            if depth >= MAX_NESTING {
                return Err(nesting_fault());
            }
            let json = match heap.get(*id)? {
                HeapEntry::Array(items) => {
                    let mut out = Vec::with_capacity(items.len());
                    for item in items {
                        out.push(value_to_json(item, heap, visiting, depth + 1)?.unwrap_or(serde_json::Value::Null));
                    }
                    serde_json::Value::Array(out)
                }
                HeapEntry::Object(props) => {
                    let mut out = serde_json::Map::new();
                    for (key, item) in props.iter() {
                        if let Some(json) = value_to_json(item, heap, visiting, depth + 1)? {
                            out.insert(key.to_string(), json);
                        }
                    }
                    serde_json::Value::Object(out)
                }
            };
            visiting.remove(id);
            json
        }
    };
    Ok(Some(json))
}

fn number_to_json(n: f64) -> serde_json::Value {
    if !n.is_finite() {
        return serde_json::Value::Null;
    }
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        return serde_json::Value::from(n as i64);
    }
    serde_json::Number::from_f64(n)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_keeps_key_order() {
        let mut heap = Heap::new();
        let value = parse_json(r#"{"c":1,"a":[true,null],"b":"x"}"#, &mut heap).unwrap();
        let props = heap.object(value.heap_id().unwrap()).unwrap();
        assert_eq!(props.keys().collect::<Vec<_>>(), vec!["c", "a", "b"]);
        assert_eq!(
            stringify(&value, &heap).unwrap().as_deref(),
            Some(r#"{"c":1,"a":[true,null],"b":"x"}"#)
        );
    }

    #[test]
    fn test_malformed_json_is_a_fault() {
        let mut heap = Heap::new();
        assert!(matches!(
            parse_json("{not json", &mut heap),
            Err(Fault::InvalidJson(_))
        ));
    }

    #[test]
    fn test_stringify_undefined_and_non_finite() {
        let mut heap = Heap::new();
        assert_eq!(stringify(&Value::Undefined, &heap).unwrap(), None);

        let arr = heap.alloc_array(vec![Value::Undefined, Value::Number(f64::NAN), Value::number(1.5)]);
        assert_eq!(stringify(&arr, &heap).unwrap().as_deref(), Some("[null,null,1.5]"));

        let props: Properties = vec![("a", Value::Undefined), ("b", Value::number(2))]
            .into_iter()
            .collect();
        let obj = heap.alloc_object(props);
        assert_eq!(stringify(&obj, &heap).unwrap().as_deref(), Some(r#"{"b":2}"#));
    }

    #[test]
    fn test_stringify_cycle_is_a_fault() {
        let mut heap = Heap::new();
        let arr = heap.alloc_array(vec![]);
        let id = arr.heap_id().unwrap();
        heap.array_mut(id).unwrap().push(arr.clone());
        assert_eq!(stringify(&arr, &heap), Err(Fault::CyclicValue));
    }

    #[test]
    fn test_shared_reference_is_not_a_cycle() {
        let mut heap = Heap::new();
        let inner = heap.alloc_array(vec![Value::number(1)]);
        let outer = heap.alloc_array(vec![inner.clone(), inner]);
        assert_eq!(stringify(&outer, &heap).unwrap().as_deref(), Some("[[1],[1]]"));
    }

    fn nested_json(depth: usize) -> serde_json::Value {
        let mut json = serde_json::Value::Null;
        for _ in 0..depth {
            json = serde_json::Value::Array(vec![json]);
        }
        json
    }

    #[test]
    fn test_json_nesting_limit() {
        let mut heap = Heap::new();
        assert!(json_to_value(&nested_json(MAX_NESTING), &mut heap).is_ok());

        let mut heap = Heap::new();
        assert!(matches!(
            json_to_value(&nested_json(MAX_NESTING + 1), &mut heap),
            Err(Fault::ResourceExhausted(_))
        ));
        assert!(heap.is_empty());
    }

    #[test]
    fn test_stringify_nesting_limit() {
        let mut heap = Heap::new();
        let mut value = heap.alloc_array(vec![]);
        for _ in 0..MAX_NESTING + 10 {
            value = heap.alloc_array(vec![value]);
        }
        assert!(matches!(
            stringify(&value, &heap),
            Err(Fault::ResourceExhausted(_))
        ));
    }
}
