//! Core abstractions for the canvas workflow engine
//!
//! This crate provides the graph model, the values that flow along edges,
//! the per-run data structures and the handler capability that every node
//! kind implements. It has no runtime dependencies.

mod context;
mod error;
pub mod events;
mod node;
mod result;
pub mod value;
mod workflow;

pub use context::{ExecutionContext, NodeInputs};
pub use error::{FlowError, GraphError, NodeError};
pub use events::ExecutionEvent;
pub use node::{ExecutionId, HandlerMetadata, NodeContext, NodeHandler, RunMeta};
pub use result::{ExecutionResult, ExecutionStatus, RunStatus};
pub use value::{Value, DEFAULT_HANDLE};
pub use workflow::{
    Edge, NodeData, NodeId, NodeKind, NodeSpec, Position, Workflow, WorkflowId,
    DEFAULT_MODEL,
};

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
