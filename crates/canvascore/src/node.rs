use crate::context::NodeInputs;
use crate::error::NodeError;
use crate::value::Value;
use crate::workflow::{NodeId, NodeKind, NodeSpec};
use async_trait::async_trait;
use serde_json::{json, Map};
use tokio_util::sync::CancellationToken;

pub type ExecutionId = String;

/// Capability every externally handled node kind implements.
///
/// A handler receives the node's configuration and aggregated inputs and
/// returns a single output value.
#[async_trait]
pub trait NodeHandler: Send + Sync {
    /// The node kind this handler serves
    fn kind(&self) -> NodeKind;

    /// Execute the node with given context
    async fn execute(&self, ctx: NodeContext) -> Result<Value, NodeError>;

    /// Optional: human-readable description for listings
    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata::default()
    }
}

/// Metadata about a handler
#[derive(Debug, Clone)]
pub struct HandlerMetadata {
    pub description: String,
    pub category: String,
}

impl Default for HandlerMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            category: "general".to_string(),
        }
    }
}

/// Facts about the run a node executes in.
#[derive(Debug, Clone)]
pub struct RunMeta {
    pub execution_id: ExecutionId,
    pub user_id: String,
    /// Nesting level; 0 for a top-level run.
    pub depth: usize,
    /// Cancelled when the run should stop.
    pub cancellation: CancellationToken,
}

impl RunMeta {
    pub fn new(execution_id: impl Into<ExecutionId>) -> Self {
        Self {
            execution_id: execution_id.into(),
            user_id: "default".to_string(),
            depth: 0,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Meta for a nested run: one level deeper, cancelled with its parent.
    pub fn nested(&self) -> Self {
        Self {
            execution_id: self.execution_id.clone(),
            user_id: self.user_id.clone(),
            depth: self.depth + 1,
            cancellation: self.cancellation.child_token(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// JSON view handed to remote collaborators.
    pub fn to_value(&self) -> Value {
        json!({
            "execution_id": self.execution_id,
            "user_id": self.user_id,
            "depth": self.depth,
        })
    }
}

/// Execution context passed to each handler
#[derive(Debug, Clone)]
pub struct NodeContext {
    pub node_id: NodeId,
    pub kind: NodeKind,
    /// Static value configured on the node
    pub value: Value,
    pub model: String,
    pub config: Map<String, Value>,
    /// Inputs aggregated from connected nodes
    pub inputs: NodeInputs,
    pub meta: RunMeta,
}

impl NodeContext {
    pub fn new(node: &NodeSpec, inputs: NodeInputs, meta: RunMeta) -> Self {
        Self {
            node_id: node.id.clone(),
            kind: node.kind,
            value: node.data.value.clone(),
            model: node.data.model.clone(),
            config: node.data.config.clone(),
            inputs,
            meta,
        }
    }

    /// First value on `handle` or return error
    pub fn require_input(&self, handle: &str) -> Result<&Value, NodeError> {
        self.inputs
            .first(handle)
            .ok_or_else(|| NodeError::MissingInput(handle.to_string()))
    }

    /// Get config value or return error
    pub fn require_config(&self, name: &str) -> Result<&Value, NodeError> {
        self.config
            .get(name)
            .ok_or_else(|| NodeError::Configuration(format!("Missing config: {}", name)))
    }

    /// Get config with default
    pub fn get_config_or(&self, name: &str, default: Value) -> Value {
        self.config.get(name).cloned().unwrap_or(default)
    }

    pub fn config_str(&self, name: &str) -> Option<&str> {
        self.config.get(name).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_meta_deepens_and_follows_parent_cancellation() {
        let parent = RunMeta::new("run-1").with_user("alice");
        let child = parent.nested();

        assert_eq!(child.depth, 1);
        assert_eq!(child.user_id, "alice");
        assert!(!child.is_cancelled());

        parent.cancellation.cancel();
        assert!(child.is_cancelled());
    }

    #[test]
    fn context_accessors() {
        let node = NodeSpec::new("n", NodeKind::GeminiText)
            .with_config("temperature", 0.5)
            .with_config("style", "noir");
        let mut inputs = NodeInputs::new();
        inputs.extend("text", vec![json!("prompt")]);
        let ctx = NodeContext::new(&node, inputs, RunMeta::new("run"));

        assert_eq!(ctx.require_input("text").unwrap(), &json!("prompt"));
        assert_eq!(
            ctx.require_input("image"),
            Err(NodeError::MissingInput("image".to_string()))
        );
        assert_eq!(ctx.config_str("style"), Some("noir"));
        assert!(ctx.require_config("seed").is_err());
        assert_eq!(ctx.get_config_or("seed", json!(7)), json!(7));
    }
}
