//! Heap of reference-typed values
//!
//! Entries are addressed by id; ids start at 1 and are never reused or
//! reclaimed, so an id stays valid for the life of the execution.

use crate::value::{Fault, Value};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A heap entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum HeapEntry {
    Array(Vec<Value>),
    Object(Properties),
}

impl HeapEntry {
    pub fn kind(&self) -> &'static str {
        match self {
            HeapEntry::Array(_) => "array",
            HeapEntry::Object(_) => "object",
        }
    }
}

/// Object properties in insertion order
///
/// Serialized as a JSON object. Assigning an existing key replaces the value
/// in place and keeps the key's original position.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Properties {
    entries: Vec<(String, Value)>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut props = Properties::new();
        for (key, value) in iter {
            props.set(key, value);
        }
        props
    }
}

impl Serialize for Properties {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Properties {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PropertiesVisitor;

        impl<'de> Visitor<'de> for PropertiesVisitor {
            type Value = Properties;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object of properties")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Properties, A::Error> {
                let mut props = Properties::new();
                while let Some((key, value)) = access.next_entry::<String, Value>()? {
                    props.set(key, value);
                }
                Ok(props)
            }
        }

        deserializer.deserialize_map(PropertiesVisitor)
    }
}

/// Arena of heap entries
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Heap {
    entries: Vec<HeapEntry>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries allocated so far
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Store `entry`, returning its id
    pub fn allocate(&mut self, entry: HeapEntry) -> u64 {
        self.entries.push(entry);
        self.entries.len() as u64
    }

    pub fn alloc_array(&mut self, items: Vec<Value>) -> Value {
        Value::ArrayRef(self.allocate(HeapEntry::Array(items)))
    }

    pub fn alloc_object(&mut self, props: Properties) -> Value {
        Value::ObjectRef(self.allocate(HeapEntry::Object(props)))
    }

    pub fn get(&self, id: u64) -> Result<&HeapEntry, Fault> {
        id.checked_sub(1)
            .and_then(|idx| self.entries.get(idx as usize))
            .ok_or(Fault::InvalidHeapRef(id))
    }

    pub fn get_mut(&mut self, id: u64) -> Result<&mut HeapEntry, Fault> {
        id.checked_sub(1)
            .and_then(|idx| self.entries.get_mut(idx as usize))
            .ok_or(Fault::InvalidHeapRef(id))
    }

    pub fn array(&self, id: u64) -> Result<&Vec<Value>, Fault> {
        match self.get(id)? {
            HeapEntry::Array(items) => Ok(items),
            other => Err(wrong_kind(id, "array", other)),
        }
    }

    pub fn array_mut(&mut self, id: u64) -> Result<&mut Vec<Value>, Fault> {
        match self.get_mut(id)? {
            HeapEntry::Array(items) => Ok(items),
            other => Err(wrong_kind(id, "array", other)),
        }
    }

    pub fn object(&self, id: u64) -> Result<&Properties, Fault> {
        match self.get(id)? {
            HeapEntry::Object(props) => Ok(props),
            other => Err(wrong_kind(id, "object", other)),
        }
    }

    pub fn object_mut(&mut self, id: u64) -> Result<&mut Properties, Fault> {
        match self.get_mut(id)? {
            HeapEntry::Object(props) => Ok(props),
            other => Err(wrong_kind(id, "object", other)),
        }
    }
}

fn wrong_kind(id: u64, expected: &str, found: &HeapEntry) -> Fault {
    Fault::TypeError(format!(
        "heap entry #{} is an {}, expected an {}",
        id,
        found.kind(),
        expected
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_ids_start_at_one_and_increase() {
        let mut heap = Heap::new();
        assert_eq!(heap.allocate(HeapEntry::Array(vec![])), 1);
        assert_eq!(heap.allocate(HeapEntry::Object(Properties::new())), 2);
        assert_eq!(heap.len(), 2);
    }

    #[test]
    fn test_invalid_id_is_a_fault() {
        let mut heap = Heap::new();
        assert_eq!(heap.get(0), Err(Fault::InvalidHeapRef(0)));
        assert_eq!(heap.get(1), Err(Fault::InvalidHeapRef(1)));
        heap.alloc_array(vec![]);
        assert!(heap.get(1).is_ok());
        assert!(heap.get_mut(99).is_err());
    }

    #[test]
    fn test_mutation_is_visible_through_every_reference() {
        let mut heap = Heap::new();
        let a = heap.alloc_object(Properties::new());
        let b = a.clone();
        heap.object_mut(a.heap_id().unwrap())
            .unwrap()
            .set("x", Value::number(2));
        assert_eq!(
            heap.object(b.heap_id().unwrap()).unwrap().get("x"),
            Some(&Value::number(2))
        );
    }

    #[test]
    fn test_wrong_kind_is_type_error() {
        let mut heap = Heap::new();
        let id = heap.allocate(HeapEntry::Array(vec![]));
        assert!(matches!(heap.object(id), Err(Fault::TypeError(_))));
    }

    #[test]
    fn test_properties_keep_insertion_order() {
        let mut props = Properties::new();
        props.set("b", Value::number(1));
        props.set("a", Value::number(2));
        props.set("b", Value::number(3));
        assert_eq!(props.keys().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(props.get("b"), Some(&Value::number(3)));
    }

    #[test]
    fn test_heap_serde_shape() {
        let mut heap = Heap::new();
        heap.alloc_array(vec![Value::number(1)]);
        let props: Properties = vec![("z", Value::Null), ("a", Value::Bool(true))]
            .into_iter()
            .collect();
        heap.alloc_object(props);

        let json = serde_json::to_string(&heap).unwrap();
        assert_eq!(
            json,
            r#"[{"kind":"array","data":[{"type":"number","value":1.0}]},{"kind":"object","data":{"z":{"type":"null"},"a":{"type":"bool","value":true}}}]"#
        );
        let back: Heap = serde_json::from_str(&json).unwrap();
        assert_eq!(back, heap);
    }
}
