use thiserror::Error;

/// Faults that abort a run (or never let it start).
///
/// `Node` only travels between the dispatcher and the controller, which
/// converts it into a failed `ExecutionResult`; it never escapes a run.
#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Node error: {0}")]
    Node(#[from] NodeError),

    #[error("Max workflow recursion depth ({limit}) exceeded at depth {depth}")]
    RecursionLimit { depth: usize, limit: usize },

    #[error("Execution {0} is already running")]
    DuplicateExecution(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FlowError {
    /// True for errors the controller records per node instead of aborting.
    pub fn is_contained(&self) -> bool {
        matches!(self, FlowError::Node(_))
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeError {
    #[error("Missing required input: {0}")]
    MissingInput(String),

    #[error("Invalid input for '{handle}': {reason}")]
    InvalidInput { handle: String, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("No handler registered for node kind '{0}'")]
    UnknownKind(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Cancelled")]
    Cancelled,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Workflow not found: {0}")]
    NotFound(String),

    #[error("Invalid workflow: {0}")]
    Invalid(String),

    #[error("Duplicate node id: {0}")]
    DuplicateNode(String),

    #[error("Edge references unknown node '{node_id}' ({side} side)")]
    NodeNotFound { node_id: String, side: &'static str },

    #[error("Cyclic dependency detected among nodes: {}", .nodes.join(", "))]
    Cycle { nodes: Vec<String> },
}
