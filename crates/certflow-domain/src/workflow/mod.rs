//! Workflow definitions and the records produced by running them

pub mod config;
pub mod expr;
mod log;
mod node;
mod output;
mod run;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

pub use log::{LogLevel, WorkflowLog, WorkflowLogs};
pub use node::{WorkflowNode, WorkflowNodeIo, WorkflowNodeType};
pub use output::{WorkflowOutput, OUTPUT_NAME_SKIPPED};
pub use run::{WorkflowRun, WorkflowRunStatus};

/// What started a run
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowTrigger {
    #[default]
    Manual,
    Scheduled,
}

impl std::fmt::Display for WorkflowTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Scheduled => write!(f, "scheduled"),
        }
    }
}

/// A workflow definition: metadata plus the root of its node tree
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub trigger: WorkflowTrigger,
    /// Re-run period for scheduled workflows
    #[serde(default)]
    pub interval_hours: Option<u64>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub content: WorkflowNode,
}

fn default_enabled() -> bool {
    true
}

impl Workflow {
    /// Check the structural rules a run relies on
    ///
    /// The root is a start node, every id is unique across the tree, and
    /// branch containers only hold their matching branch node types.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.id.trim().is_empty() {
            return Err(DomainError::InvalidWorkflow("workflow id is empty".into()));
        }
        if self.content.node_type != WorkflowNodeType::Start {
            return Err(DomainError::InvalidWorkflow(format!(
                "workflow {} must begin with a start node, found {}",
                self.id, self.content.node_type
            )));
        }

        let mut seen = std::collections::HashSet::new();
        for node in self.content.iter() {
            if node.id.trim().is_empty() {
                return Err(DomainError::InvalidWorkflow(format!(
                    "node `{}` has an empty id",
                    node.name
                )));
            }
            if !seen.insert(node.id.as_str()) {
                return Err(DomainError::DuplicateNodeId(node.id.clone()));
            }
            node.validate_shape()?;
        }
        Ok(())
    }
}
