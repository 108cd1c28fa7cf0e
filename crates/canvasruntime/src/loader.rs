// crates/canvasruntime/src/loader.rs
use crate::store::{WorkflowStore, WorkflowSummary};
use async_trait::async_trait;
use canvascore::{FlowError, GraphError, Workflow};
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Workflows stored as `<id>.json` files in one directory
pub struct DirectoryWorkflowStore {
    dir: PathBuf,
}

impl DirectoryWorkflowStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, workflow_id: &str) -> Result<PathBuf, FlowError> {
        let invalid = workflow_id.is_empty()
            || workflow_id.starts_with('.')
            || workflow_id.contains(['/', '\\']);
        if invalid {
            return Err(GraphError::Invalid(format!("bad workflow id '{}'", workflow_id)).into());
        }
        Ok(self.dir.join(format!("{}.json", workflow_id)))
    }

    async fn summary_of(path: &Path) -> Result<WorkflowSummary, FlowError> {
        let bytes = tokio::fs::read(path).await?;
        let workflow: Workflow = serde_json::from_slice(&bytes)?;
        let modified = tokio::fs::metadata(path).await?.modified()?;
        Ok(WorkflowSummary {
            id: workflow.id,
            name: workflow.name,
            updated_at: DateTime::<Utc>::from(modified),
        })
    }
}

#[async_trait]
impl WorkflowStore for DirectoryWorkflowStore {
    async fn load(&self, workflow_id: &str) -> Result<Workflow, FlowError> {
        let path = self.path_for(workflow_id)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(GraphError::NotFound(workflow_id.to_string()).into())
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn save(&self, workflow: &Workflow) -> Result<WorkflowSummary, FlowError> {
        let path = self.path_for(&workflow.id)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(&path, serde_json::to_vec_pretty(workflow)?).await?;
        tracing::info!(workflow_id = %workflow.id, path = %path.display(), "Workflow saved");
        Self::summary_of(&path).await
    }

    async fn list(&self) -> Result<Vec<WorkflowSummary>, FlowError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut summaries = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension() != Some("json".as_ref()) {
                continue;
            }
            match Self::summary_of(&path).await {
                Ok(summary) => summaries.push(summary),
                Err(e) => tracing::warn!(path = %path.display(), "Skipping unreadable workflow: {}", e),
            }
        }
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        Ok(summaries)
    }

    async fn delete(&self, workflow_id: &str) -> Result<bool, FlowError> {
        let path = self.path_for(workflow_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvascore::{NodeKind, NodeSpec};

    #[tokio::test]
    async fn save_load_list_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryWorkflowStore::new(dir.path().join("workflows"));

        let mut workflow = Workflow::new("wf-1", "Saved");
        workflow.add_node(NodeSpec::new("in", NodeKind::Input).with_value("hi"));
        store.save(&workflow).await.unwrap();

        assert_eq!(store.load("wf-1").await.unwrap(), workflow);
        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "Saved");

        assert!(store.delete("wf-1").await.unwrap());
        assert!(matches!(
            store.load("wf-1").await.unwrap_err(),
            FlowError::Graph(GraphError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn list_of_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryWorkflowStore::new(dir.path().join("absent"));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn ids_with_separators_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryWorkflowStore::new(dir.path());
        let err = store.load("../etc/passwd").await.unwrap_err();
        assert!(matches!(err, FlowError::Graph(GraphError::Invalid(_))));
    }
}
