//! Persistence seam for saved workflows.

use async_trait::async_trait;
use canvascore::{FlowError, GraphError, Workflow, WorkflowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Listing entry for a saved workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub id: WorkflowId,
    pub name: String,
    pub updated_at: DateTime<Utc>,
}

/// Where nested workflows and saved canvases are loaded from.
///
/// `load` reports a missing workflow as `GraphError::NotFound`.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn load(&self, workflow_id: &str) -> Result<Workflow, FlowError>;

    /// Insert or replace by `workflow.id`.
    async fn save(&self, workflow: &Workflow) -> Result<WorkflowSummary, FlowError>;

    /// Most recently updated first.
    async fn list(&self) -> Result<Vec<WorkflowSummary>, FlowError>;

    /// False if nothing was stored under `workflow_id`.
    async fn delete(&self, workflow_id: &str) -> Result<bool, FlowError>;
}

/// Process-lifetime store, used by tests and as the server default.
#[derive(Default)]
pub struct InMemoryWorkflowStore {
    workflows: RwLock<HashMap<WorkflowId, (Workflow, DateTime<Utc>)>>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-filled with `workflows`.
    pub fn with_workflows(workflows: impl IntoIterator<Item = Workflow>) -> Self {
        let now = Utc::now();
        let workflows = workflows
            .into_iter()
            .map(|w| (w.id.clone(), (w, now)))
            .collect();
        Self {
            workflows: RwLock::new(workflows),
        }
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn load(&self, workflow_id: &str) -> Result<Workflow, FlowError> {
        self.workflows
            .read()
            .await
            .get(workflow_id)
            .map(|(workflow, _)| workflow.clone())
            .ok_or_else(|| GraphError::NotFound(workflow_id.to_string()).into())
    }

    async fn save(&self, workflow: &Workflow) -> Result<WorkflowSummary, FlowError> {
        let updated_at = Utc::now();
        self.workflows
            .write()
            .await
            .insert(workflow.id.clone(), (workflow.clone(), updated_at));
        Ok(WorkflowSummary {
            id: workflow.id.clone(),
            name: workflow.name.clone(),
            updated_at,
        })
    }

    async fn list(&self) -> Result<Vec<WorkflowSummary>, FlowError> {
        let mut summaries: Vec<_> = self
            .workflows
            .read()
            .await
            .values()
            .map(|(workflow, updated_at)| WorkflowSummary {
                id: workflow.id.clone(),
                name: workflow.name.clone(),
                updated_at: *updated_at,
            })
            .collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        Ok(summaries)
    }

    async fn delete(&self, workflow_id: &str) -> Result<bool, FlowError> {
        Ok(self.workflows.write().await.remove(workflow_id).is_some())
    }
}
