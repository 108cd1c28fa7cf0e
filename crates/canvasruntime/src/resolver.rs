//! Dependency resolution: predecessor map plus a deterministic Kahn ordering.
//!
//! Node indices in the petgraph graph follow the workflow's node sequence,
//! so ties between ready nodes are always broken by declaration order.

use canvascore::{Edge, GraphError, NodeSpec};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// What to do when some nodes cannot be ordered because of a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePolicy {
    /// Fail the run with `GraphError::Cycle` before anything is dispatched.
    #[default]
    Reject,
    /// Run whatever could be ordered and skip the rest.
    Partial,
}

/// Dependency graph of one workflow
pub struct DependencyGraph<'a> {
    nodes: &'a [NodeSpec],
    graph: DiGraph<&'a str, ()>,
    index: HashMap<&'a str, NodeIndex>,
}

impl<'a> DependencyGraph<'a> {
    /// Build the graph, validating node ids and edge endpoints.
    pub fn build(nodes: &'a [NodeSpec], edges: &[Edge]) -> Result<Self, GraphError> {
        let mut graph = DiGraph::with_capacity(nodes.len(), edges.len());
        let mut index = HashMap::with_capacity(nodes.len());

        for node in nodes {
            let idx = graph.add_node(node.id.as_str());
            if index.insert(node.id.as_str(), idx).is_some() {
                return Err(GraphError::DuplicateNode(node.id.clone()));
            }
        }

        for edge in edges {
            let from = *index
                .get(edge.source.as_str())
                .ok_or_else(|| GraphError::NodeNotFound {
                    node_id: edge.source.clone(),
                    side: "source",
                })?;
            let to = *index
                .get(edge.target.as_str())
                .ok_or_else(|| GraphError::NodeNotFound {
                    node_id: edge.target.clone(),
                    side: "target",
                })?;
            graph.add_edge(from, to, ());
        }

        Ok(Self { nodes, graph, index })
    }

    /// Direct predecessors of `node_id`, one entry per incoming edge.
    pub fn predecessors(&self, node_id: &str) -> Vec<&'a str> {
        let Some(&idx) = self.index.get(node_id) else {
            return Vec::new();
        };
        let mut sources: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(idx, Direction::Incoming)
            .collect();
        sources.sort();
        sources.into_iter().map(|i| self.graph[i]).collect()
    }

    /// Target -> sources map for every node.
    pub fn dependency_map(&self) -> HashMap<&'a str, Vec<&'a str>> {
        self.nodes
            .iter()
            .map(|n| (n.id.as_str(), self.predecessors(&n.id)))
            .collect()
    }

    /// Kahn's algorithm. Never fails: nodes caught in (or behind) a cycle
    /// are returned as `unresolved` instead.
    pub fn resolve(&self) -> Resolution<'a> {
        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|idx| self.graph.neighbors_directed(idx, Direction::Incoming).count())
            .collect();

        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree == 0)
            .map(|(i, _)| Reverse(i))
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(Reverse(i)) = ready.pop() {
            order.push(&self.nodes[i]);
            for dependent in self
                .graph
                .neighbors_directed(NodeIndex::new(i), Direction::Outgoing)
            {
                let degree = &mut in_degree[dependent.index()];
                *degree -= 1;
                if *degree == 0 {
                    ready.push(Reverse(dependent.index()));
                }
            }
        }

        let unresolved = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree > 0)
            .map(|(i, _)| &self.nodes[i])
            .collect();

        Resolution { order, unresolved }
    }
}

/// Output of [`DependencyGraph::resolve`]
#[derive(Debug)]
pub struct Resolution<'a> {
    /// Nodes in execution order
    pub order: Vec<&'a NodeSpec>,
    /// Nodes that could not be ordered, in declaration order
    pub unresolved: Vec<&'a NodeSpec>,
}

impl<'a> Resolution<'a> {
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }

    /// Every node: the resolved order, then the unresolved remainder in
    /// declaration order. Used for restricted runs, where cycles elsewhere
    /// in the graph do not matter.
    pub fn into_full_order(self) -> Vec<&'a NodeSpec> {
        let mut order = self.order;
        order.extend(self.unresolved);
        order
    }

    /// Apply `policy` to an incomplete resolution.
    pub fn into_order(self, policy: CyclePolicy) -> Result<Vec<&'a NodeSpec>, GraphError> {
        if self.is_complete() {
            return Ok(self.order);
        }

        let nodes: Vec<String> = self.unresolved.iter().map(|n| n.id.clone()).collect();
        match policy {
            CyclePolicy::Reject => Err(GraphError::Cycle { nodes }),
            CyclePolicy::Partial => {
                tracing::warn!(
                    skipped = ?nodes,
                    "Dependency cycle detected, running partial order"
                );
                Ok(self.order)
            }
        }
    }
}

/// Resolve `nodes` and `edges` into an execution order.
pub fn resolve<'a>(nodes: &'a [NodeSpec], edges: &[Edge]) -> Result<Resolution<'a>, GraphError> {
    Ok(DependencyGraph::build(nodes, edges)?.resolve())
}
