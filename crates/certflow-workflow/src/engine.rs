//! Workflow run engine
//!
//! Walks a workflow's node tree depth-first for one run. Every node goes
//! through its processor, flushes its logs, then publishes exactly one
//! [`WorkflowOutput`]. A branch container runs at most one branch sub-chain
//! before continuing along its own `next`.
//!
//! A failing node halts the run unless the next node is an
//! `execute_result_branch`, which then takes its failure branch; such a run
//! still ends `failed`.

use std::collections::HashMap;

use certflow_domain::{
    RepositoryError, Workflow, WorkflowNode, WorkflowNodeIo, WorkflowNodeType, WorkflowOutput,
    WorkflowRun, WorkflowRunStatus, WorkflowTrigger, OUTPUT_NAME_SKIPPED,
};
use chrono::Utc;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::context::{NodeContext, RunOutputs, Services};
use crate::error::{EngineError, NodeError};
use crate::logger::NodeLogger;
use crate::processor::processor_for;

/// Lifecycle of a node within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl NodeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }

    pub fn can_transition_to(&self, to: NodeState) -> bool {
        match self {
            Self::Pending => to == Self::Running,
            Self::Running => to.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// The finished run plus where every node ended up
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run: WorkflowRun,
    pub node_states: HashMap<String, NodeState>,
}

impl RunReport {
    pub fn node_state(&self, node_id: &str) -> Option<NodeState> {
        self.node_states.get(node_id).copied()
    }
}

enum Halt {
    Failed,
    Cancelled,
    Engine(EngineError),
}

impl From<EngineError> for Halt {
    fn from(e: EngineError) -> Self {
        Self::Engine(e)
    }
}

impl From<RepositoryError> for Halt {
    fn from(e: RepositoryError) -> Self {
        Self::Engine(e.into())
    }
}

enum NodeRun {
    Completed { branch: Option<usize> },
    Failed,
}

struct RunState<'w> {
    workflow: &'w Workflow,
    run_id: String,
    cancel: CancellationToken,
    outputs: RunOutputs,
    node_states: HashMap<String, NodeState>,
    /// A failure was routed to an `execute_failure` branch
    recovered_failure: bool,
}

impl RunState<'_> {
    fn transition(&mut self, node_id: &str, to: NodeState) -> Result<(), EngineError> {
        let from = self
            .node_states
            .get(node_id)
            .copied()
            .unwrap_or(NodeState::Pending);
        if !from.can_transition_to(to) {
            return Err(EngineError::IllegalNodeTransition {
                node_id: node_id.to_string(),
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        self.node_states.insert(node_id.to_string(), to);
        Ok(())
    }
}

pub struct WorkflowEngine {
    services: Services,
}

impl WorkflowEngine {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Create a run for `workflow` and execute it to completion
    pub async fn execute(
        &self,
        workflow: &Workflow,
        trigger: WorkflowTrigger,
        cancel: CancellationToken,
    ) -> Result<RunReport, EngineError> {
        workflow.validate()?;
        let run = WorkflowRun::new(&workflow.id, trigger);
        self.services.runs.save(&run).await?;
        self.execute_run(workflow, run, cancel).await
    }

    /// Execute an already persisted pending run
    pub async fn execute_run(
        &self,
        workflow: &Workflow,
        mut run: WorkflowRun,
        cancel: CancellationToken,
    ) -> Result<RunReport, EngineError> {
        let mut state = RunState {
            workflow,
            run_id: run.id.clone(),
            cancel,
            outputs: RunOutputs::default(),
            node_states: workflow
                .content
                .iter()
                .map(|n| (n.id.clone(), NodeState::Pending))
                .collect(),
            recovered_failure: false,
        };

        if state.cancel.is_cancelled() {
            run.finish(WorkflowRunStatus::Canceled, "")?;
            self.services.runs.save(&run).await?;
            return Ok(RunReport {
                run,
                node_states: state.node_states,
            });
        }

        run.start()?;
        self.services.runs.save(&run).await?;
        info!(
            workflow_id = %workflow.id,
            run_id = %run.id,
            trigger = %run.trigger,
            "Workflow run started"
        );

        let result = self.run_chain(&mut state, &workflow.content).await;
        let status = match result {
            Ok(()) if state.recovered_failure => WorkflowRunStatus::Failed,
            Ok(()) => WorkflowRunStatus::Succeeded,
            Err(Halt::Failed) => WorkflowRunStatus::Failed,
            Err(Halt::Cancelled) => WorkflowRunStatus::Canceled,
            Err(Halt::Engine(e)) => {
                error!(run_id = %run.id, error = %e, "Workflow run aborted");
                run.finish(WorkflowRunStatus::Failed, e.to_string())?;
                if let Err(save_err) = self.services.runs.save(&run).await {
                    warn!(run_id = %run.id, error = %save_err, "Failed to record aborted run");
                }
                return Err(e);
            }
        };

        let error = if status == WorkflowRunStatus::Succeeded {
            String::new()
        } else {
            self.services
                .logs
                .list_by_run_id(&run.id)
                .await?
                .error_string()
        };
        run.finish(status, error)?;
        self.services.runs.save(&run).await?;

        match status {
            WorkflowRunStatus::Succeeded => {
                info!(workflow_id = %workflow.id, run_id = %run.id, "Workflow run succeeded")
            }
            _ => warn!(
                workflow_id = %workflow.id,
                run_id = %run.id,
                status = %status,
                error = %run.error,
                "Workflow run did not succeed"
            ),
        }

        Ok(RunReport {
            run,
            node_states: state.node_states,
        })
    }

    fn run_chain<'a, 'w: 'a>(
        &'a self,
        state: &'a mut RunState<'w>,
        head: &'a WorkflowNode,
    ) -> BoxFuture<'a, Result<(), Halt>> {
        Box::pin(async move {
            let mut current = Some(head);
            let mut previous_failed = false;

            while let Some(node) = current {
                if state.cancel.is_cancelled() {
                    return Err(Halt::Cancelled);
                }

                match self.run_node(state, node, previous_failed).await? {
                    NodeRun::Completed { branch } => {
                        previous_failed = false;
                        if let Some(sub_chain) = branch.and_then(|i| node.branches.get(i)) {
                            self.run_chain(state, sub_chain).await?;
                        }
                        current = node.next.as_deref();
                    }
                    NodeRun::Failed => match node.next.as_deref() {
                        Some(next) if next.node_type == WorkflowNodeType::ExecuteResultBranch => {
                            state.recovered_failure = true;
                            previous_failed = true;
                            current = Some(next);
                        }
                        _ => return Err(Halt::Failed),
                    },
                }
            }
            Ok(())
        })
    }

    async fn run_node(
        &self,
        state: &mut RunState<'_>,
        node: &WorkflowNode,
        previous_failed: bool,
    ) -> Result<NodeRun, Halt> {
        state.transition(&node.id, NodeState::Running)?;
        debug!(run_id = %state.run_id, node_id = %node.id, node_type = %node.node_type, "Processing node");

        let logger = NodeLogger::new(&state.workflow.id, &state.run_id, node);
        let processor = processor_for(node.node_type);
        let result = {
            let ctx = NodeContext {
                workflow_id: &state.workflow.id,
                run_id: &state.run_id,
                node,
                logger: &logger,
                outputs: &state.outputs,
                services: &self.services,
                cancel: &state.cancel,
                previous_failed,
            };
            processor.process(&ctx).await
        };

        let (mut outputs, skipped, next_state, flow) = match result {
            Ok(outcome) => {
                let next_state = if outcome.skipped {
                    NodeState::Skipped
                } else {
                    NodeState::Succeeded
                };
                let flow = Ok(NodeRun::Completed {
                    branch: outcome.branch,
                });
                (outcome.outputs, outcome.skipped, next_state, flow)
            }
            Err(NodeError::Cancelled) => {
                logger.warn("Node cancelled");
                (Vec::new(), false, NodeState::Failed, Err(Halt::Cancelled))
            }
            Err(e) => {
                logger.error(e.to_string());
                (Vec::new(), false, NodeState::Failed, Ok(NodeRun::Failed))
            }
        };
        if node.node_type.is_action() {
            outputs.push(WorkflowNodeIo::new(
                OUTPUT_NAME_SKIPPED,
                "boolean",
                skipped.to_string(),
            ));
        }

        let output = WorkflowOutput {
            workflow_id: state.workflow.id.clone(),
            run_id: state.run_id.clone(),
            node_id: node.id.clone(),
            node: snapshot(node),
            outputs,
            succeeded: next_state != NodeState::Failed,
            created_at: Utc::now(),
        };
        self.services.logs.append(logger.take()).await?;
        self.services.outputs.save(output.clone()).await?;
        state.outputs.push(output);
        state.transition(&node.id, next_state)?;

        flow
    }
}

/// The node as executed, without the nodes that follow it
fn snapshot(node: &WorkflowNode) -> WorkflowNode {
    WorkflowNode {
        next: None,
        branches: Vec::new(),
        ..node.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::test_support::NoIssuer;
    use crate::providers::ProviderRegistry;
    use certflow_domain::{
        MemoryStore, WorkflowLogRepository, WorkflowOutputRepository, WorkflowRunRepository,
    };
    use serde_json::json;
    use std::sync::Arc;

    fn engine() -> (WorkflowEngine, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let services =
            Services::with_store(store.clone(), Arc::new(NoIssuer), ProviderRegistry::new());
        (WorkflowEngine::new(services), store)
    }

    fn workflow(content: WorkflowNode) -> Workflow {
        Workflow {
            id: "wf".into(),
            name: "test".into(),
            description: String::new(),
            trigger: WorkflowTrigger::Manual,
            interval_hours: None,
            enabled: true,
            content,
        }
    }

    /// A notify node whose provider is not registered, so it always fails
    fn failing(id: &str) -> WorkflowNode {
        WorkflowNode::new(id, WorkflowNodeType::Notify).with_config(json!({
            "provider": "missing",
            "subject": "s",
        }))
    }

    #[test]
    fn test_node_state_machine() {
        assert!(NodeState::Pending.can_transition_to(NodeState::Running));
        assert!(!NodeState::Pending.can_transition_to(NodeState::Succeeded));
        assert!(NodeState::Running.can_transition_to(NodeState::Skipped));
        assert!(!NodeState::Succeeded.can_transition_to(NodeState::Running));
        assert!(!NodeState::Failed.can_transition_to(NodeState::Succeeded));
    }

    #[tokio::test]
    async fn test_control_only_workflow_succeeds() {
        let (engine, store) = engine();
        let wf = workflow(
            WorkflowNode::new("start", WorkflowNodeType::Start)
                .with_next(WorkflowNode::new("end", WorkflowNodeType::End)),
        );

        let report = engine
            .execute(&wf, WorkflowTrigger::Manual, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.run.status, WorkflowRunStatus::Succeeded);
        assert!(report.run.error.is_empty());
        assert_eq!(report.node_state("end"), Some(NodeState::Succeeded));
        let saved = WorkflowRunRepository::get_by_id(store.as_ref(), &report.run.id)
            .await
            .unwrap();
        assert_eq!(saved.status, WorkflowRunStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_failure_halts_and_summarises() {
        let (engine, store) = engine();
        let wf = workflow(
            WorkflowNode::new("start", WorkflowNodeType::Start).with_next(
                failing("notify").with_next(WorkflowNode::new("end", WorkflowNodeType::End)),
            ),
        );

        let report = engine
            .execute(&wf, WorkflowTrigger::Manual, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.run.status, WorkflowRunStatus::Failed);
        assert_eq!(report.run.error, "Unknown notify provider: missing");
        assert_eq!(report.node_state("notify"), Some(NodeState::Failed));
        assert_eq!(report.node_state("end"), Some(NodeState::Pending));

        let output = WorkflowOutputRepository::get_by_node_id(store.as_ref(), "notify")
            .await
            .unwrap();
        assert!(!output.succeeded);
        assert_eq!(output.skipped(), Some(false));
        assert!(output.node.next.is_none());

        let logs = WorkflowLogRepository::list_by_run_id(store.as_ref(), &report.run.id)
            .await
            .unwrap();
        assert_eq!(logs.error_string(), report.run.error);
    }

    #[tokio::test]
    async fn test_failure_branch_runs_and_run_still_fails() {
        let (engine, _) = engine();
        let wf = workflow(
            WorkflowNode::new("start", WorkflowNodeType::Start).with_next(
                failing("notify").with_next(
                    WorkflowNode::new("result", WorkflowNodeType::ExecuteResultBranch)
                        .with_branches(vec![
                            WorkflowNode::new("ok", WorkflowNodeType::ExecuteSuccess).with_next(
                                WorkflowNode::new("ok-end", WorkflowNodeType::End),
                            ),
                            WorkflowNode::new("ko", WorkflowNodeType::ExecuteFailure).with_next(
                                WorkflowNode::new("ko-end", WorkflowNodeType::End),
                            ),
                        ]),
                ),
            ),
        );

        let report = engine
            .execute(&wf, WorkflowTrigger::Manual, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.run.status, WorkflowRunStatus::Failed);
        assert_eq!(report.node_state("ko-end"), Some(NodeState::Succeeded));
        assert_eq!(report.node_state("ok-end"), Some(NodeState::Pending));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let (engine, _) = engine();
        let wf = workflow(WorkflowNode::new("start", WorkflowNodeType::Start));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = engine
            .execute(&wf, WorkflowTrigger::Manual, cancel)
            .await
            .unwrap();
        assert_eq!(report.run.status, WorkflowRunStatus::Canceled);
        assert_eq!(report.node_state("start"), Some(NodeState::Pending));
    }

    #[tokio::test]
    async fn test_invalid_workflow_is_rejected() {
        let (engine, _) = engine();
        let wf = workflow(WorkflowNode::new("end", WorkflowNodeType::End));
        let err = engine
            .execute(&wf, WorkflowTrigger::Manual, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Domain(_)));
    }
}
