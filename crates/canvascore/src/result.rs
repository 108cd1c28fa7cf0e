use crate::value::Value;
use crate::workflow::NodeId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Completed,
    Failed,
}

/// Outcome of one node in one run. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub node_id: NodeId,
    pub status: ExecutionStatus,
    pub output: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn completed(node_id: impl Into<NodeId>, output: Value) -> Self {
        Self {
            node_id: node_id.into(),
            status: ExecutionStatus::Completed,
            output,
            error: None,
        }
    }

    pub fn failed(node_id: impl Into<NodeId>, error: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            status: ExecutionStatus::Failed,
            output: Value::Null,
            error: Some(error.into()),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == ExecutionStatus::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.status == ExecutionStatus::Failed
    }
}

/// Overall status of a batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Failed,
}

impl RunStatus {
    /// `Failed` if any result failed.
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a ExecutionResult>) -> Self {
        if results.into_iter().any(ExecutionResult::is_failed) {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        }
    }
}
