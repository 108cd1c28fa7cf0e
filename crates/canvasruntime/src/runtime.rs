use crate::active::ActiveExecutions;
use crate::cache::ResultCache;
use crate::executor::{ExecutorSettings, FailurePolicy, RunOptions, RunOutcome, RunReport, WorkflowExecutor};
use crate::registry::NodeRegistry;
use crate::resolver::CyclePolicy;
use crate::store::{InMemoryWorkflowStore, WorkflowStore};
use canvascore::{ExecutionEvent, ExecutionId, FlowError, NodeKind, RunMeta, Value, Workflow};
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

/// Composition root: one cache, one registry and one store shared by every
/// run, plus the registry of cancellable streaming runs.
pub struct CanvasRuntime {
    executor: Arc<WorkflowExecutor>,
    active: ActiveExecutions,
    config: RuntimeConfig,
}

impl CanvasRuntime {
    /// Create a new runtime with default settings
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self::with_registry(Arc::new(NodeRegistry::new()), config)
    }

    /// Create a new runtime with a pre-configured registry and an in-memory store
    pub fn with_registry(registry: Arc<NodeRegistry>, config: RuntimeConfig) -> Self {
        Self::with_parts(registry, Arc::new(InMemoryWorkflowStore::new()), config)
    }

    pub fn with_parts(
        registry: Arc<NodeRegistry>,
        store: Arc<dyn WorkflowStore>,
        config: RuntimeConfig,
    ) -> Self {
        let cache = Arc::new(ResultCache::with_limit(config.cache_max_entries));
        let executor = Arc::new(WorkflowExecutor::new(
            registry,
            cache,
            store,
            config.executor_settings(),
        ));

        Self {
            executor,
            active: ActiveExecutions::new(),
            config,
        }
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        self.executor.registry()
    }

    pub fn store(&self) -> &Arc<dyn WorkflowStore> {
        self.executor.store()
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        self.executor.cache()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn active(&self) -> &ActiveExecutions {
        &self.active
    }

    /// Run to completion and return every node's result.
    pub async fn execute(
        &self,
        workflow: &Workflow,
        options: &RunOptions,
    ) -> Result<RunReport, FlowError> {
        let meta = RunMeta::new(uuid::Uuid::new_v4().to_string()).with_user(&options.user_id);
        self.executor.run(workflow, options, meta, None).await
    }

    /// Start a cancellable run and return its event stream.
    ///
    /// The run is registered under `execution_id` (a fresh UUID when `None`)
    /// until it ends; the stream's last frame is `workflow_completed`,
    /// `execution_cancelled` or `workflow_failed`.
    pub fn stream(
        &self,
        workflow: Workflow,
        options: RunOptions,
        execution_id: Option<ExecutionId>,
    ) -> Result<ExecutionStream, FlowError> {
        let execution_id = execution_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let token = CancellationToken::new();
        let registration = self.active.register(execution_id.clone(), token.clone())?;

        let (tx, rx) = mpsc::channel(self.config.event_buffer_size.max(1));
        let executor = Arc::clone(&self.executor);
        let id = execution_id.clone();

        tokio::spawn(async move {
            let meta = RunMeta::new(id.clone())
                .with_user(&options.user_id)
                .with_cancellation(token);
            let outcome = executor.run(&workflow, &options, meta, Some(&tx)).await;
            drop(registration);

            let terminal = match outcome {
                Ok(report) => match report.outcome {
                    RunOutcome::Completed => ExecutionEvent::WorkflowCompleted,
                    RunOutcome::Cancelled => ExecutionEvent::ExecutionCancelled { execution_id: id },
                    RunOutcome::Aborted { node_id, error } => ExecutionEvent::WorkflowFailed {
                        error: format!("node {} failed: {}", node_id, error),
                    },
                },
                Err(e) => {
                    tracing::error!(execution_id = %id, "Streaming run aborted: {}", e);
                    ExecutionEvent::WorkflowFailed { error: e.to_string() }
                }
            };
            if tx.send(terminal).await.is_err() {
                tracing::debug!("Stream consumer dropped before the final frame");
            }
        });

        Ok(ExecutionStream {
            execution_id,
            inner: ReceiverStream::new(rx),
        })
    }

    /// Cancel a streaming run. False when no run has that id.
    pub fn cancel(&self, execution_id: &str) -> bool {
        self.active.cancel(execution_id)
    }

    pub async fn clear_cache(&self) {
        self.executor.cache().clear().await;
    }

    /// Run a stored workflow once per input value.
    ///
    /// Each value replaces the first Input node's value. The output of the
    /// first Output node is collected per run, aligned with `inputs`; a run
    /// that aborts contributes `{"error": ...}`.
    pub async fn execute_over_inputs(
        &self,
        workflow_id: &str,
        inputs: Vec<Value>,
        options: &RunOptions,
    ) -> Result<Vec<Value>, FlowError> {
        let workflow = self.store().load(workflow_id).await?;
        let output_id = workflow
            .nodes_of_kind(NodeKind::Output)
            .next()
            .map(|n| n.id.clone());
        let options = options.nested();

        let mut outputs = Vec::with_capacity(inputs.len());
        for value in inputs {
            let run = workflow.with_first_input(value);
            let output = match self.execute(&run, &options).await {
                Ok(report) => output_id
                    .as_deref()
                    .and_then(|id| report.get(id))
                    .filter(|r| r.is_completed())
                    .map(|r| r.output.clone())
                    .unwrap_or(Value::Null),
                Err(e) => {
                    tracing::warn!(workflow_id = %workflow_id, "Batch item failed: {}", e);
                    json!({ "error": e.to_string() })
                }
            };
            outputs.push(output);
        }
        Ok(outputs)
    }
}

impl Default for CanvasRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Events of one streaming run
pub struct ExecutionStream {
    execution_id: ExecutionId,
    inner: ReceiverStream<ExecutionEvent>,
}

impl ExecutionStream {
    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }
}

impl Stream for ExecutionStream {
    type Item = ExecutionEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Configuration for the runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub max_depth: usize,
    pub on_node_failure: FailurePolicy,
    pub on_cycle: CyclePolicy,
    /// `None` leaves the result cache unbounded.
    pub cache_max_entries: Option<usize>,
    pub event_buffer_size: usize,
}

impl RuntimeConfig {
    /// Load from a JSON file; absent fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, FlowError> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn executor_settings(&self) -> ExecutorSettings {
        ExecutorSettings {
            max_depth: self.max_depth,
            on_node_failure: self.on_node_failure,
            on_cycle: self.on_cycle,
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let settings = ExecutorSettings::default();
        Self {
            max_depth: settings.max_depth,
            on_node_failure: settings.on_node_failure,
            on_cycle: settings.on_cycle,
            cache_max_entries: Some(1024),
            event_buffer_size: 256,
        }
    }
}
