//! Request and response bodies shared by the HTTP surface and the CLI.

use crate::executor::{RunOptions, RunReport};
use canvascore::{ExecutionId, ExecutionResult, NodeId, RunStatus, Value, Workflow};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

fn default_user() -> String {
    "default".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub workflow: Workflow,
    #[serde(default)]
    pub node_ids: Option<Vec<NodeId>>,
    #[serde(default)]
    pub use_cache: bool,
    #[serde(default)]
    pub execution_id: Option<ExecutionId>,
    #[serde(default = "default_user")]
    pub user_id: String,
}

impl ExecutionRequest {
    pub fn new(workflow: Workflow) -> Self {
        Self {
            workflow,
            node_ids: None,
            use_cache: false,
            execution_id: None,
            user_id: default_user(),
        }
    }

    pub fn options(&self) -> RunOptions {
        RunOptions {
            node_ids: self.node_ids.clone(),
            use_cache: self.use_cache,
            user_id: self.user_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecutionResponse {
    pub results: HashMap<NodeId, ExecutionResult>,
    pub status: RunStatus,
}

impl From<RunReport> for WorkflowExecutionResponse {
    fn from(report: RunReport) -> Self {
        let status = report.status();
        Self {
            results: report.results,
            status,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchExecutionRequest {
    pub inputs: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchExecutionResponse {
    pub results: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelResponse {
    pub execution_id: ExecutionId,
    pub cancelled: bool,
}
