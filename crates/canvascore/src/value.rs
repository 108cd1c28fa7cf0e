//! Values carried along edges and helpers the engine applies to them.
//!
//! Node outputs and configuration are arbitrary JSON, so the engine works on
//! `serde_json::Value` directly.

use serde::ser::{Serialize, Serializer};
use serde_json::Map;
use std::collections::BTreeMap;

pub use serde_json::Value;

/// Input bucket used when an edge carries no `targetHandle`.
pub const DEFAULT_HANDLE: &str = "input";

/// Recursively expand nested arrays into one flat, ordered sequence.
///
/// A non-array value becomes a single-element sequence.
pub fn flatten(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.into_iter().flat_map(flatten).collect(),
        other => vec![other],
    }
}

/// Pick the sub-value named by `handle` when `value` is an object holding
/// that key; otherwise the whole value is passed on.
pub fn select_handle(value: &Value, handle: Option<&str>) -> Value {
    match (handle, value) {
        (Some(handle), Value::Object(map)) => match map.get(handle) {
            Some(selected) => selected.clone(),
            None => value.clone(),
        },
        _ => value.clone(),
    }
}

/// Falsy values count as "no value" for input injection: `null`, `false`,
/// zero and empty strings, arrays or objects.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

/// Serialize with object keys sorted at every level.
///
/// Independent of whether `serde_json` was built with `preserve_order`.
pub fn canonical_string(value: &Value) -> Result<String, serde_json::Error> {
    serde_json::to_string(&Canonical(value))
}

/// Same as [`canonical_string`] for a bare JSON object.
pub fn canonical_map_string(map: &Map<String, Value>) -> Result<String, serde_json::Error> {
    serde_json::to_string(&CanonicalMap(map))
}

struct Canonical<'a>(&'a Value);

impl Serialize for Canonical<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            Value::Object(map) => CanonicalMap(map).serialize(serializer),
            Value::Array(items) => serializer.collect_seq(items.iter().map(Canonical)),
            scalar => scalar.serialize(serializer),
        }
    }
}

struct CanonicalMap<'a>(&'a Map<String, Value>);

impl Serialize for CanonicalMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let sorted: BTreeMap<&str, Canonical<'_>> = self
            .0
            .iter()
            .map(|(key, value)| (key.as_str(), Canonical(value)))
            .collect();
        sorted.serialize(serializer)
    }
}
