//! Node dispatch: cache lookup, handler invocation and nested workflows.

use crate::cache::CacheKey;
use crate::executor::{RunOptions, WorkflowExecutor};
use canvascore::value::is_blank;
use canvascore::{
    FlowError, NodeContext, NodeError, NodeInputs, NodeKind, NodeSpec, RunMeta, Value, Workflow,
    DEFAULT_HANDLE,
};
use serde_json::Map;

impl WorkflowExecutor {
    /// Run one node, consulting the result cache when enabled.
    ///
    /// Only non-null successes are stored. A key that cannot be computed
    /// runs the node uncached.
    pub(crate) async fn execute_node(
        &self,
        node: &NodeSpec,
        inputs: NodeInputs,
        options: &RunOptions,
        meta: &RunMeta,
    ) -> Result<Value, FlowError> {
        let key = if options.use_cache {
            match CacheKey::compute(node, &inputs) {
                Ok(key) => Some(key),
                Err(e) => {
                    tracing::warn!(node_id = %node.id, "Cache key unavailable, running uncached: {}", e);
                    None
                }
            }
        } else {
            None
        };

        if let Some(key) = &key {
            if let Some(hit) = self.cache.get(key).await {
                tracing::debug!(node_id = %node.id, key = %key, "Cache hit");
                return Ok(hit);
            }
            tracing::debug!(node_id = %node.id, key = %key, "Cache miss");
        }

        let output = self.dispatch(node, inputs, options, meta).await?;

        if let Some(key) = key {
            if !output.is_null() {
                self.cache.put(key, output.clone()).await;
            }
        }
        Ok(output)
    }

    async fn dispatch(
        &self,
        node: &NodeSpec,
        inputs: NodeInputs,
        options: &RunOptions,
        meta: &RunMeta,
    ) -> Result<Value, FlowError> {
        if node.kind == NodeKind::Workflow {
            return self.dispatch_nested(node, &inputs, options, meta).await;
        }

        let handler = self
            .registry
            .get(node.kind)
            .ok_or_else(|| NodeError::UnknownKind(node.kind.to_string()))?;

        let ctx = NodeContext::new(node, inputs, meta.clone());
        Ok(handler.execute(ctx).await?)
    }

    /// Execute the referenced workflow one level deeper and return its
    /// completed Output nodes keyed by node id.
    async fn dispatch_nested(
        &self,
        node: &NodeSpec,
        inputs: &NodeInputs,
        options: &RunOptions,
        meta: &RunMeta,
    ) -> Result<Value, FlowError> {
        let workflow_id = node
            .data
            .workflow_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| NodeError::Configuration("no workflow_id specified".to_string()))?;

        let nested = match self.store.load(workflow_id).await {
            Ok(workflow) => inject_inputs(&workflow, inputs),
            Err(e) => {
                return Err(NodeError::ExecutionFailed(format!(
                    "nested workflow {}: {}",
                    workflow_id, e
                ))
                .into())
            }
        };

        tracing::info!(
            node_id = %node.id,
            workflow_id = %workflow_id,
            depth = meta.depth + 1,
            "Running nested workflow"
        );

        let nested_options = options.nested();
        let report = match self.run(&nested, &nested_options, meta.nested(), None).await {
            Ok(report) => report,
            Err(FlowError::Graph(e)) => {
                return Err(NodeError::ExecutionFailed(format!(
                    "nested workflow {}: {}",
                    workflow_id, e
                ))
                .into())
            }
            Err(fatal) => return Err(fatal),
        };

        if report.is_cancelled() {
            return Err(NodeError::Cancelled.into());
        }

        let mut outputs = Map::new();
        for out in nested.nodes_of_kind(NodeKind::Output) {
            if let Some(result) = report.get(&out.id).filter(|r| r.is_completed()) {
                outputs.insert(out.id.clone(), result.output.clone());
            }
        }
        Ok(Value::Object(outputs))
    }
}

/// Copy of `workflow` with caller inputs written into its Input nodes.
///
/// A bucket named after an Input node's id feeds that node; otherwise the
/// default bucket fills Input nodes that have no value of their own.
fn inject_inputs(workflow: &Workflow, inputs: &NodeInputs) -> Workflow {
    let mut nested = workflow.clone();
    for node in nested.nodes.iter_mut().filter(|n| n.kind == NodeKind::Input) {
        if inputs.contains(&node.id) {
            if let Some(value) = inputs.first(&node.id) {
                node.data.value = value.clone();
            }
        } else if is_blank(&node.data.value) {
            if let Some(value) = inputs.first(DEFAULT_HANDLE) {
                node.data.value = value.clone();
            }
        }
    }
    nested
}
