use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::WorkflowTrigger;
use crate::error::DomainError;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowRunStatus {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    Canceled,
}

impl WorkflowRunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }

    fn can_transition_to(&self, to: WorkflowRunStatus) -> bool {
        use WorkflowRunStatus::*;
        matches!(
            (self, to),
            (Pending, Running) | (Pending, Canceled) | (Running, Succeeded | Failed | Canceled)
        )
    }
}

impl std::fmt::Display for WorkflowRunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

/// One execution attempt of a workflow
///
/// Only the run engine moves a run through its states, and a run in a
/// terminal state rejects every further transition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRun {
    pub id: String,
    pub workflow_id: String,
    pub trigger: WorkflowTrigger,
    pub status: WorkflowRunStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Failure summary built from the run's error logs
    #[serde(default)]
    pub error: String,
    pub created_at: DateTime<Utc>,
}

impl WorkflowRun {
    pub fn new(workflow_id: impl Into<String>, trigger: WorkflowTrigger) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            workflow_id: workflow_id.into(),
            trigger,
            status: WorkflowRunStatus::Pending,
            started_at: None,
            ended_at: None,
            error: String::new(),
            created_at: Utc::now(),
        }
    }

    pub fn start(&mut self) -> Result<(), DomainError> {
        self.transition(WorkflowRunStatus::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Move to a terminal status, recording the failure summary
    pub fn finish(
        &mut self,
        status: WorkflowRunStatus,
        error: impl Into<String>,
    ) -> Result<(), DomainError> {
        if !status.is_terminal() {
            return Err(DomainError::IllegalTransition {
                from: self.status.to_string(),
                to: status.to_string(),
            });
        }
        self.transition(status)?;
        self.ended_at = Some(Utc::now());
        self.error = error.into();
        Ok(())
    }

    fn transition(&mut self, to: WorkflowRunStatus) -> Result<(), DomainError> {
        if !self.status.can_transition_to(to) {
            return Err(DomainError::IllegalTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        Ok(())
    }
}
