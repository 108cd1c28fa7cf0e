use crate::builtin::{InputHandler, OutputHandler};
use canvascore::{HandlerMetadata, NodeHandler, NodeKind};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of handlers, one per node kind
///
/// The composite `workflow` kind is executed by the engine itself and can
/// not be registered.
pub struct NodeRegistry {
    handlers: HashMap<NodeKind, Arc<dyn NodeHandler>>,
}

impl NodeRegistry {
    /// A registry with the built-in `input` and `output` handlers.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(InputHandler));
        registry.register(Arc::new(OutputHandler));
        registry
    }

    /// A registry with no handlers at all.
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler, replacing any previous one for the same kind
    pub fn register(&mut self, handler: Arc<dyn NodeHandler>) {
        let kind = handler.kind();
        if kind == NodeKind::Workflow {
            tracing::warn!("Ignoring handler for engine-owned node kind: {}", kind);
            return;
        }
        tracing::info!("Registering node kind: {}", kind);
        self.handlers.insert(kind, handler);
    }

    pub fn get(&self, kind: NodeKind) -> Option<&Arc<dyn NodeHandler>> {
        self.handlers.get(&kind)
    }

    pub fn contains(&self, kind: NodeKind) -> bool {
        kind == NodeKind::Workflow || self.handlers.contains_key(&kind)
    }

    /// Every kind that can currently be dispatched, in declaration order
    pub fn list_node_kinds(&self) -> Vec<NodeKind> {
        NodeKind::ALL
            .into_iter()
            .filter(|kind| self.contains(*kind))
            .collect()
    }

    /// Get metadata for a node kind
    pub fn get_metadata(&self, kind: NodeKind) -> Option<HandlerMetadata> {
        if kind == NodeKind::Workflow {
            return Some(HandlerMetadata {
                description: "Run a saved workflow as a single node".to_string(),
                category: "control".to_string(),
            });
        }
        self.handlers.get(&kind).map(|h| h.metadata())
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
