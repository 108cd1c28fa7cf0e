//! Workflow execution runtime
//!
//! Resolves a workflow's dependency order, aggregates each node's inputs,
//! memoizes outputs, dispatches nodes to registered handlers (or recursively
//! into nested workflows) and streams progress for cancellable runs.

mod active;
pub mod api;
mod builtin;
mod cache;
mod dispatcher;
mod executor;
mod inputs;
mod loader;
mod registry;
mod resolver;
mod runtime;
mod store;
pub mod templates;

pub use active::{ActiveExecutions, Registration};
pub use builtin::{InputHandler, OutputHandler};
pub use cache::{CacheKey, ResultCache};
pub use executor::{
    ExecutorSettings, FailurePolicy, RunOptions, RunOutcome, RunReport, WorkflowExecutor,
};
pub use inputs::resolve_inputs;
pub use loader::DirectoryWorkflowStore;
pub use registry::NodeRegistry;
pub use resolver::{resolve, CyclePolicy, DependencyGraph, Resolution};
pub use runtime::{CanvasRuntime, ExecutionStream, RuntimeConfig};
pub use store::{InMemoryWorkflowStore, WorkflowStore, WorkflowSummary};
