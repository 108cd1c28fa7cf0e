use crate::value::{canonical_string, Value, DEFAULT_HANDLE};
use crate::workflow::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Run-scoped map from node id to the value that node produced.
///
/// Owned by exactly one run. Partial runs start from a pre-seeded context.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    outputs: HashMap<NodeId, Value>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, node_id: &str) -> Option<&Value> {
        self.outputs.get(node_id)
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.outputs.contains_key(node_id)
    }

    pub fn insert(&mut self, node_id: impl Into<NodeId>, value: Value) {
        self.outputs.insert(node_id.into(), value);
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn into_inner(self) -> HashMap<NodeId, Value> {
        self.outputs
    }
}

/// Values gathered for one node, bucketed by target handle.
///
/// Every bucket is a list, even for a single connection; within a bucket
/// values keep edge declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeInputs(BTreeMap<String, Vec<Value>>);

impl NodeInputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `values` to `handle`, creating the bucket if needed.
    pub fn extend(&mut self, handle: impl Into<String>, values: impl IntoIterator<Item = Value>) {
        self.0.entry(handle.into()).or_default().extend(values);
    }

    /// All values on `handle`; empty when nothing arrived there.
    pub fn get(&self, handle: &str) -> &[Value] {
        self.0.get(handle).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn first(&self, handle: &str) -> Option<&Value> {
        self.get(handle).first()
    }

    /// First value on the default handle.
    pub fn default_input(&self) -> Option<&Value> {
        self.first(DEFAULT_HANDLE)
    }

    pub fn contains(&self, handle: &str) -> bool {
        self.0.contains_key(handle)
    }

    pub fn handles(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Value])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Deterministic serialization used for fingerprinting.
    pub fn canonical_string(&self) -> Result<String, serde_json::Error> {
        let value = serde_json::to_value(self)?;
        canonical_string(&value)
    }
}
