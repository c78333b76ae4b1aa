//! Domain and repository errors

use thiserror::Error;

/// Errors raised while validating domain entities
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid workflow: {0}")]
    InvalidWorkflow(String),

    #[error("Duplicate node id: {0}")]
    DuplicateNodeId(String),

    #[error("Invalid node config for {node_id}: field `{field}`: {reason}")]
    InvalidNodeConfig {
        node_id: String,
        field: String,
        reason: String,
    },

    #[error("Illegal run status transition: {from} -> {to}")]
    IllegalTransition { from: String, to: String },

    #[error("Expression error: {0}")]
    Expression(String),
}

/// Errors returned by repository implementations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    #[error("Repository backend error: {0}")]
    Backend(String),
}

impl RepositoryError {
    pub fn not_found(kind: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            key: key.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;
