//! Control-flow node kinds handled inside the engine.

use async_trait::async_trait;
use canvascore::{HandlerMetadata, NodeContext, NodeError, NodeHandler, NodeKind, Value};

/// Returns the node's static value verbatim; never reads inputs.
pub struct InputHandler;

#[async_trait]
impl NodeHandler for InputHandler {
    fn kind(&self) -> NodeKind {
        NodeKind::Input
    }

    async fn execute(&self, ctx: NodeContext) -> Result<Value, NodeError> {
        Ok(ctx.value)
    }

    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata {
            description: "Static text or media value".to_string(),
            category: "control".to_string(),
        }
    }
}

/// Sink: first value on the default handle, or null.
pub struct OutputHandler;

#[async_trait]
impl NodeHandler for OutputHandler {
    fn kind(&self) -> NodeKind {
        NodeKind::Output
    }

    async fn execute(&self, ctx: NodeContext) -> Result<Value, NodeError> {
        Ok(ctx.inputs.default_input().cloned().unwrap_or(Value::Null))
    }

    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata {
            description: "Displays the first value it receives".to_string(),
            category: "control".to_string(),
        }
    }
}
