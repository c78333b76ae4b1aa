//! What a node can see and use while it runs

use std::sync::Arc;

use certflow_acme::CertificateIssuer;
use certflow_domain::{
    AccessRepository, CertificateRepository, MemoryStore, RepositoryResult, SettingsRepository,
    WorkflowLogRepository, WorkflowNode, WorkflowOutput, WorkflowOutputRepository,
    WorkflowRepository, WorkflowRunRepository,
};
use tokio_util::sync::CancellationToken;

use crate::logger::NodeLogger;
use crate::providers::ProviderRegistry;

/// Long-lived collaborators shared by every run
#[derive(Clone)]
pub struct Services {
    pub accesses: Arc<dyn AccessRepository>,
    pub settings: Arc<dyn SettingsRepository>,
    pub certificates: Arc<dyn CertificateRepository>,
    pub workflows: Arc<dyn WorkflowRepository>,
    pub runs: Arc<dyn WorkflowRunRepository>,
    pub outputs: Arc<dyn WorkflowOutputRepository>,
    pub logs: Arc<dyn WorkflowLogRepository>,
    pub issuer: Arc<dyn CertificateIssuer>,
    pub providers: Arc<ProviderRegistry>,
}

impl Services {
    /// Every repository backed by one in-memory store
    pub fn with_store(
        store: Arc<MemoryStore>,
        issuer: Arc<dyn CertificateIssuer>,
        providers: ProviderRegistry,
    ) -> Self {
        Self {
            accesses: store.clone(),
            settings: store.clone(),
            certificates: store.clone(),
            workflows: store.clone(),
            runs: store.clone(),
            outputs: store.clone(),
            logs: store,
            issuer,
            providers: Arc::new(providers),
        }
    }
}

/// Outputs published so far in the current run, in execution order
#[derive(Debug, Clone, Default)]
pub struct RunOutputs {
    outputs: Vec<WorkflowOutput>,
}

impl RunOutputs {
    pub fn push(&mut self, output: WorkflowOutput) {
        self.outputs.push(output);
    }

    pub fn get(&self, node_id: &str) -> Option<&WorkflowOutput> {
        self.outputs.iter().find(|o| o.node_id == node_id)
    }

    /// Value of `name` published by `node_id`
    pub fn value(&self, node_id: &str, name: &str) -> Option<&str> {
        self.get(node_id).and_then(|o| o.get(name))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, WorkflowOutput> {
        self.outputs.iter()
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Whether every upstream output carrying a skip marker says skipped
    ///
    /// Outputs without the marker (control nodes) do not take part, so a
    /// run with no marked outputs counts as all skipped.
    pub fn all_skipped(&self) -> bool {
        self.outputs
            .iter()
            .filter_map(WorkflowOutput::skipped)
            .all(|skipped| skipped)
    }
}

impl From<Vec<WorkflowOutput>> for RunOutputs {
    fn from(outputs: Vec<WorkflowOutput>) -> Self {
        Self { outputs }
    }
}

/// Per-node view handed to a processor
pub struct NodeContext<'a> {
    pub workflow_id: &'a str,
    pub run_id: &'a str,
    pub node: &'a WorkflowNode,
    pub logger: &'a NodeLogger,
    pub outputs: &'a RunOutputs,
    pub services: &'a Services,
    pub cancel: &'a CancellationToken,
    /// Set for an `execute_result_branch` whose predecessor failed
    pub previous_failed: bool,
}

impl NodeContext<'_> {
    /// Latest output this node published in an earlier run
    pub async fn last_output(&self) -> RepositoryResult<Option<WorkflowOutput>> {
        optional(self.services.outputs.get_by_node_id(&self.node.id).await)
    }
}

/// Turn `NotFound` into `None`
pub fn optional<T>(result: RepositoryResult<T>) -> RepositoryResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}
