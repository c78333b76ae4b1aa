//! Workflow execution errors

use certflow_acme::ApplyError;
use certflow_domain::{DomainError, RepositoryError};
use thiserror::Error;

/// Failures reported by deployer, notifier, uploader and DNS factories
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Unknown {kind} provider: {name}")]
    Unknown { kind: &'static str, name: String },

    #[error("Invalid provider configuration: {0}")]
    Configuration(String),

    #[error("Provider request failed: {0}")]
    Request(String),

    #[error("Provider I/O error: {0}")]
    Io(String),
}

/// Why a single node failed
#[derive(Error, Debug)]
pub enum NodeError {
    #[error(transparent)]
    Config(#[from] DomainError),

    #[error("Lookup failed: {0}")]
    Lookup(#[from] RepositoryError),

    #[error(transparent)]
    Apply(ApplyError),

    #[error("{0}")]
    Provider(#[from] ProviderError),

    #[error("operation cancelled")]
    Cancelled,
}

impl NodeError {
    pub fn config(node_id: &str, field: &str, reason: impl Into<String>) -> Self {
        Self::Config(DomainError::InvalidNodeConfig {
            node_id: node_id.to_string(),
            field: field.to_string(),
            reason: reason.into(),
        })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<ApplyError> for NodeError {
    fn from(e: ApplyError) -> Self {
        match e {
            ApplyError::Cancelled => Self::Cancelled,
            other => Self::Apply(other),
        }
    }
}

/// Failures of the engine itself rather than of a node
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Failed to persist run state: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Node {node_id} cannot move from {from} to {to}")]
    IllegalNodeTransition {
        node_id: String,
        from: String,
        to: String,
    },

    #[error("Workflow {0} is disabled")]
    Disabled(String),

    #[error("Invalid settings `{name}`: {reason}")]
    Settings { name: String, reason: String },

    #[error("Unknown run: {0}")]
    UnknownRun(String),

    #[error("Run task failed: {0}")]
    Join(String),
}

pub type NodeResult<T> = Result<T, NodeError>;
