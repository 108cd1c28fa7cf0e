//! Content-addressed memoization of node outputs.

use canvascore::value::{canonical_map_string, canonical_string};
use canvascore::{NodeInputs, NodeSpec, Value};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use tokio::sync::RwLock;

/// Fingerprint of a node's identity, configuration and resolved inputs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Hash the node id, kind, model, nested workflow reference, static
    /// value, config and inputs.
    ///
    /// Config and inputs are serialized with sorted keys at every level, so
    /// structurally equal values always fingerprint identically.
    pub fn compute(node: &NodeSpec, inputs: &NodeInputs) -> Result<Self, serde_json::Error> {
        let value = canonical_string(&node.data.value)?;
        let config = canonical_map_string(&node.data.config)?;
        let inputs = inputs.canonical_string()?;
        let nested = node.data.workflow_id.as_deref().unwrap_or_default();

        let mut hasher = Sha256::new();
        for part in [
            node.id.as_str(),
            node.kind.as_str(),
            node.data.model.as_str(),
            nested,
            value.as_str(),
            config.as_str(),
            inputs.as_str(),
        ] {
            hasher.update(part.as_bytes());
            hasher.update([0u8]);
        }
        Ok(Self(hex::encode(hasher.finalize())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Default)]
struct Entries {
    values: HashMap<CacheKey, Value>,
    /// Insertion order, oldest first
    order: VecDeque<CacheKey>,
}

/// Process-wide result cache shared by all runs of one runtime.
///
/// Bounded by entry count with oldest-first eviction. Concurrent runs may
/// race to fill the same key; the last write wins.
pub struct ResultCache {
    entries: RwLock<Entries>,
    max_entries: Option<usize>,
}

impl ResultCache {
    pub fn unbounded() -> Self {
        Self {
            entries: RwLock::new(Entries::default()),
            max_entries: None,
        }
    }

    /// A cache holding at most `max_entries` values (at least one).
    pub fn bounded(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(Entries::default()),
            max_entries: Some(max_entries.max(1)),
        }
    }

    pub fn with_limit(max_entries: Option<usize>) -> Self {
        match max_entries {
            Some(limit) => Self::bounded(limit),
            None => Self::unbounded(),
        }
    }

    pub async fn get(&self, key: &CacheKey) -> Option<Value> {
        self.entries.read().await.values.get(key).cloned()
    }

    pub async fn put(&self, key: CacheKey, value: Value) {
        let mut entries = self.entries.write().await;
        if entries.values.insert(key.clone(), value).is_none() {
            entries.order.push_back(key);
        }

        if let Some(limit) = self.max_entries {
            while entries.values.len() > limit {
                let Some(oldest) = entries.order.pop_front() else {
                    break;
                };
                entries.values.remove(&oldest);
                tracing::debug!(key = %oldest, "Evicted cached result");
            }
        }
    }

    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        let dropped = entries.values.len();
        entries.values.clear();
        entries.order.clear();
        tracing::info!(entries = dropped, "Result cache cleared");
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.values.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::unbounded()
    }
}
