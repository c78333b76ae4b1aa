//! Workflow execution
//!
//! Runs certificate workflows: a tree of typed nodes (apply, upload, deploy,
//! notify and control nodes) executed depth-first by the [`WorkflowEngine`],
//! with each node handled by a [`NodeProcessor`](processor::NodeProcessor).
//! Runs are dispatched concurrently by the [`WorkflowDispatcher`]; the
//! [`RetentionScheduler`] prunes expired certificates and old runs.

pub mod context;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod logger;
pub mod processor;
pub mod providers;
pub mod retention;

pub use context::{NodeContext, RunOutputs, Services};
pub use dispatcher::WorkflowDispatcher;
pub use engine::{NodeState, RunReport, WorkflowEngine};
pub use error::{EngineError, NodeError, ProviderError};
pub use logger::NodeLogger;
pub use providers::{Deployer, Notifier, ProviderRegistry, Uploader};
pub use retention::{RetentionScheduler, RetentionSweeper, SweepReport};
