//! Per-node input aggregation.

use canvascore::value::{flatten, select_handle};
use canvascore::{Edge, ExecutionContext, NodeInputs};
use tracing::debug;

/// Collect the values produced upstream of `node_id`.
///
/// For every edge into the node whose source has an entry in `context`, the
/// source value (narrowed by `sourceHandle` when it names a key of an object
/// output) is flattened and appended to the bucket named by `targetHandle`.
/// Sources missing from the context (failed or not yet run) contribute
/// nothing.
pub fn resolve_inputs(node_id: &str, edges: &[Edge], context: &ExecutionContext) -> NodeInputs {
    let mut inputs = NodeInputs::new();

    for edge in edges.iter().filter(|e| e.target == node_id) {
        let Some(value) = context.get(&edge.source) else {
            continue;
        };

        let selected = select_handle(value, edge.source_handle.as_deref());
        let values = flatten(selected);
        debug!(
            source = %edge.source,
            target = %node_id,
            handle = edge.target_bucket(),
            items = values.len(),
            "Routing upstream output"
        );
        inputs.extend(edge.target_bucket(), values);
    }

    inputs
}
