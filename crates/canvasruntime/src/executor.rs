use crate::cache::ResultCache;
use crate::inputs::resolve_inputs;
use crate::registry::NodeRegistry;
use crate::resolver::{resolve, CyclePolicy};
use crate::store::WorkflowStore;
use canvascore::{
    ExecutionContext, ExecutionEvent, ExecutionResult, FlowError, NodeId, NodeSpec, RunMeta,
    RunStatus, Workflow,
};
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;

/// What the controller does after a node fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Record the failure and keep scheduling; dependents see no value.
    #[default]
    Continue,
    /// Stop scheduling after the first failure.
    AbortRun,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorSettings {
    pub max_depth: usize,
    pub on_node_failure: FailurePolicy,
    pub on_cycle: CyclePolicy,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            max_depth: 10,
            on_node_failure: FailurePolicy::default(),
            on_cycle: CyclePolicy::default(),
        }
    }
}

/// Per-run knobs supplied by the caller
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Restrict the run to these nodes; `None` runs the whole graph.
    pub node_ids: Option<Vec<NodeId>>,
    /// Off by default; generation calls are not deterministic.
    pub use_cache: bool,
    pub user_id: String,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            node_ids: None,
            use_cache: false,
            user_id: "default".to_string(),
        }
    }
}

impl RunOptions {
    pub fn only(mut self, node_ids: Vec<NodeId>) -> Self {
        self.node_ids = Some(node_ids);
        self
    }

    pub fn with_cache(mut self) -> Self {
        self.use_cache = true;
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }

    pub fn as_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    /// Options for a nested run: whole graph, same cache flag and user.
    pub fn nested(&self) -> Self {
        Self {
            node_ids: None,
            use_cache: self.use_cache,
            user_id: self.user_id.clone(),
        }
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed,
    Cancelled,
    /// Stopped by [`FailurePolicy::AbortRun`] after `node_id` failed.
    Aborted { node_id: NodeId, error: String },
}

/// Results of every node attempted in one run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub results: HashMap<NodeId, ExecutionResult>,
    pub outcome: RunOutcome,
}

impl RunReport {
    pub fn status(&self) -> RunStatus {
        match self.outcome {
            RunOutcome::Aborted { .. } => RunStatus::Failed,
            _ => RunStatus::from_results(self.results.values()),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.outcome == RunOutcome::Cancelled
    }

    pub fn get(&self, node_id: &str) -> Option<&ExecutionResult> {
        self.results.get(node_id)
    }
}

/// Drives resolution, input aggregation, caching and dispatch for a run.
///
/// Nodes run one at a time in resolved order. Each dispatch races the run's
/// cancellation token, so a cancelled run abandons the in-flight node.
pub struct WorkflowExecutor {
    pub(crate) registry: Arc<NodeRegistry>,
    pub(crate) cache: Arc<ResultCache>,
    pub(crate) store: Arc<dyn WorkflowStore>,
    pub(crate) settings: ExecutorSettings,
}

impl WorkflowExecutor {
    pub fn new(
        registry: Arc<NodeRegistry>,
        cache: Arc<ResultCache>,
        store: Arc<dyn WorkflowStore>,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            registry,
            cache,
            store,
            settings,
        }
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    pub fn store(&self) -> &Arc<dyn WorkflowStore> {
        &self.store
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    /// Execute `workflow` and collect one result per attempted node.
    ///
    /// When `events` is given, progress frames are sent as nodes transition;
    /// a closed receiver cancels the run. The terminal stream frame is left
    /// to the caller. Graph errors and the recursion limit abort with `Err`.
    pub fn run<'a>(
        &'a self,
        workflow: &'a Workflow,
        options: &'a RunOptions,
        meta: RunMeta,
        events: Option<&'a mpsc::Sender<ExecutionEvent>>,
    ) -> BoxFuture<'a, Result<RunReport, FlowError>> {
        async move {
            if meta.depth > self.settings.max_depth {
                return Err(FlowError::RecursionLimit {
                    depth: meta.depth,
                    limit: self.settings.max_depth,
                });
            }

            let resolution = resolve(&workflow.nodes, &workflow.edges)?;
            // cycles only block full-graph runs
            let order = match options.node_ids {
                Some(_) => resolution.into_full_order(),
                None => resolution.into_order(self.settings.on_cycle)?,
            };
            let (order, mut context) = plan_run(order, options.node_ids.as_deref());

            tracing::info!(
                workflow_id = %workflow.id,
                execution_id = %meta.execution_id,
                depth = meta.depth,
                nodes = order.len(),
                "Starting workflow run"
            );

            let mut results = HashMap::new();
            let mut outcome = RunOutcome::Completed;

            for node in order {
                if meta.is_cancelled() {
                    outcome = RunOutcome::Cancelled;
                    break;
                }

                let started = ExecutionEvent::NodeStarted {
                    node_id: node.id.clone(),
                };
                self.emit(events, &meta, started).await;

                let inputs = resolve_inputs(&node.id, &workflow.edges, &context);
                let attempt = tokio::select! {
                    biased;
                    _ = meta.cancellation.cancelled() => None,
                    result = self.execute_node(node, inputs, options, &meta) => Some(result),
                };

                // a result that lands after cancellation is discarded
                let result = match attempt {
                    Some(result) if !meta.is_cancelled() => result,
                    _ => {
                        tracing::info!(node_id = %node.id, "Run cancelled during node");
                        outcome = RunOutcome::Cancelled;
                        break;
                    }
                };

                match result {
                    Ok(output) => {
                        tracing::info!(node_id = %node.id, kind = %node.kind, "Node completed");
                        context.insert(node.id.clone(), output.clone());
                        let record = ExecutionResult::completed(node.id.clone(), output);
                        results.insert(node.id.clone(), record.clone());
                        self.emit(events, &meta, ExecutionEvent::for_result(record)).await;
                    }
                    Err(FlowError::Node(err)) => {
                        tracing::error!(node_id = %node.id, kind = %node.kind, "Node failed: {}", err);
                        let error = err.to_string();
                        let record = ExecutionResult::failed(node.id.clone(), error.clone());
                        results.insert(node.id.clone(), record.clone());
                        self.emit(events, &meta, ExecutionEvent::for_result(record)).await;

                        if self.settings.on_node_failure == FailurePolicy::AbortRun {
                            outcome = RunOutcome::Aborted {
                                node_id: node.id.clone(),
                                error,
                            };
                            break;
                        }
                    }
                    Err(fatal) => return Err(fatal),
                }
            }

            tracing::info!(
                workflow_id = %workflow.id,
                execution_id = %meta.execution_id,
                outcome = ?outcome,
                "Workflow run finished"
            );
            Ok(RunReport { results, outcome })
        }
        .boxed()
    }

    async fn emit(
        &self,
        events: Option<&mpsc::Sender<ExecutionEvent>>,
        meta: &RunMeta,
        event: ExecutionEvent,
    ) {
        let Some(tx) = events else {
            return;
        };
        if tx.send(event).await.is_err() {
            tracing::debug!(execution_id = %meta.execution_id, "Event consumer gone, cancelling");
            meta.cancellation.cancel();
        }
    }
}

/// Narrow `order` to the requested subset and seed the context from the
/// recorded outputs of every node left out.
fn plan_run<'a>(
    order: Vec<&'a NodeSpec>,
    node_ids: Option<&[NodeId]>,
) -> (Vec<&'a NodeSpec>, ExecutionContext) {
    let mut context = ExecutionContext::new();
    let Some(requested) = node_ids else {
        return (order, context);
    };

    let requested: HashSet<&str> = requested.iter().map(String::as_str).collect();
    for id in &requested {
        if !order.iter().any(|n| n.id == *id) {
            tracing::warn!(node_id = %id, "Requested node not in workflow, ignoring");
        }
    }

    let (selected, excluded): (Vec<_>, Vec<_>) = order
        .into_iter()
        .partition(|n| requested.contains(n.id.as_str()));

    for node in excluded {
        if let Some(output) = node.data.recorded_output() {
            context.insert(node.id.clone(), output.clone());
        }
    }
    (selected, context)
}
