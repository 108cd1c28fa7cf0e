// crates/canvascore/src/events/mod.rs

use crate::node::ExecutionId;
use crate::result::ExecutionResult;
use crate::workflow::NodeId;
use serde::{Deserialize, Serialize};

/// Frames emitted by a streaming run, one JSON object each.
///
/// Every node gets exactly one `NodeStarted` before its terminal frame. A
/// stream ends with exactly one of `WorkflowCompleted`, `ExecutionCancelled`
/// or `WorkflowFailed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    NodeStarted {
        node_id: NodeId,
    },
    NodeCompleted {
        node_id: NodeId,
        result: ExecutionResult,
    },
    NodeFailed {
        node_id: NodeId,
        result: ExecutionResult,
    },
    ExecutionCancelled {
        execution_id: ExecutionId,
    },
    WorkflowCompleted,
    WorkflowFailed {
        error: String,
    },
}

impl ExecutionEvent {
    /// The terminal frame for a finished node.
    pub fn for_result(result: ExecutionResult) -> Self {
        let node_id = result.node_id.clone();
        if result.is_failed() {
            ExecutionEvent::NodeFailed { node_id, result }
        } else {
            ExecutionEvent::NodeCompleted { node_id, result }
        }
    }

    pub fn node_id(&self) -> Option<&str> {
        match self {
            ExecutionEvent::NodeStarted { node_id }
            | ExecutionEvent::NodeCompleted { node_id, .. }
            | ExecutionEvent::NodeFailed { node_id, .. } => Some(node_id),
            _ => None,
        }
    }

    /// True for the frame that closes a stream.
    pub fn ends_stream(&self) -> bool {
        matches!(
            self,
            ExecutionEvent::WorkflowCompleted
                | ExecutionEvent::ExecutionCancelled { .. }
                | ExecutionEvent::WorkflowFailed { .. }
        )
    }

    /// One line of newline-delimited JSON.
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    /// A server-sent-events frame: `data: <json>\n\n`.
    pub fn to_sse_frame(&self) -> serde_json::Result<String> {
        Ok(format!("data: {}\n\n", serde_json::to_string(self)?))
    }
}
