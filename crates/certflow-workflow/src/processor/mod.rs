//! Node processors
//!
//! One [`NodeProcessor`] per node type. A processor does the node's work and
//! describes the result as a [`NodeOutcome`]; the engine turns that into the
//! node's single [`WorkflowOutput`](certflow_domain::WorkflowOutput).

mod apply;
mod branch;
mod deploy;
mod notify;
mod upload;

use async_trait::async_trait;
use certflow_domain::{WorkflowNodeIo, WorkflowNodeType};

use crate::context::NodeContext;
use crate::error::NodeResult;

pub use apply::ApplyProcessor;
pub use branch::{BranchProcessor, ExecuteResultBranchProcessor};
pub use deploy::DeployProcessor;
pub use notify::NotifyProcessor;
pub use upload::UploadProcessor;

pub(crate) const OUTPUT_NAME_CERTIFICATE: &str = "certificate";
pub(crate) const OUTPUT_NAME_CERTIFICATE_VALIDITY: &str = "certificate.validity";
pub(crate) const OUTPUT_NAME_CERTIFICATE_DAYS_LEFT: &str = "certificate.daysLeft";

/// What a node produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeOutcome {
    pub outputs: Vec<WorkflowNodeIo>,
    /// Finished without performing its side effect
    pub skipped: bool,
    /// Index into the node's branches to run next
    pub branch: Option<usize>,
}

impl NodeOutcome {
    pub fn done() -> Self {
        Self::default()
    }

    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    pub fn with_outputs(mut self, outputs: Vec<WorkflowNodeIo>) -> Self {
        self.outputs = outputs;
        self
    }

    pub fn with_branch(mut self, branch: Option<usize>) -> Self {
        self.branch = branch;
        self
    }
}

#[async_trait]
pub trait NodeProcessor: Send + Sync {
    async fn process(&self, ctx: &NodeContext<'_>) -> NodeResult<NodeOutcome>;
}

/// Start, end, condition and result-branch heads: nothing to do
pub struct PassthroughProcessor;

#[async_trait]
impl NodeProcessor for PassthroughProcessor {
    async fn process(&self, ctx: &NodeContext<'_>) -> NodeResult<NodeOutcome> {
        ctx.logger
            .debug(format!("{} node {} reached", ctx.node.node_type, ctx.node.display_name()));
        Ok(NodeOutcome::done())
    }
}

pub fn processor_for(node_type: WorkflowNodeType) -> Box<dyn NodeProcessor> {
    match node_type {
        WorkflowNodeType::Apply => Box::new(ApplyProcessor),
        WorkflowNodeType::Upload => Box::new(UploadProcessor),
        WorkflowNodeType::Deploy => Box::new(DeployProcessor),
        WorkflowNodeType::Notify => Box::new(NotifyProcessor),
        WorkflowNodeType::Branch => Box::new(BranchProcessor),
        WorkflowNodeType::ExecuteResultBranch => Box::new(ExecuteResultBranchProcessor),
        WorkflowNodeType::Start
        | WorkflowNodeType::End
        | WorkflowNodeType::Condition
        | WorkflowNodeType::ExecuteSuccess
        | WorkflowNodeType::ExecuteFailure => Box::new(PassthroughProcessor),
    }
}

/// Outputs shared by apply and upload nodes
pub(crate) fn certificate_outputs(
    certificate: &certflow_domain::Certificate,
    now: chrono::DateTime<chrono::Utc>,
) -> Vec<WorkflowNodeIo> {
    let days_left = certificate.days_left_at(now).unwrap_or_default();
    vec![
        WorkflowNodeIo::new(OUTPUT_NAME_CERTIFICATE, "string", certificate.id.clone()),
        WorkflowNodeIo::new(
            OUTPUT_NAME_CERTIFICATE_VALIDITY,
            "boolean",
            (!certificate.is_expired_at(now)).to_string(),
        ),
        WorkflowNodeIo::new(
            OUTPUT_NAME_CERTIFICATE_DAYS_LEFT,
            "number",
            days_left.max(0).to_string(),
        ),
    ]
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use async_trait::async_trait;
    use certflow_acme::{ApplyError, ApplyRequest, ApplyResult, CertificateIssuer};
    use certflow_domain::{MemoryStore, WorkflowNode, WorkflowOutput};
    use tokio_util::sync::CancellationToken;

    use crate::context::{NodeContext, RunOutputs, Services};
    use crate::logger::NodeLogger;
    use crate::providers::ProviderRegistry;

    pub struct NoIssuer;

    #[async_trait]
    impl CertificateIssuer for NoIssuer {
        async fn apply(
            &self,
            _request: ApplyRequest,
            _cancel: &CancellationToken,
        ) -> Result<ApplyResult, ApplyError> {
            Err(ApplyError::config("domains", "issuer not available in tests"))
        }
    }

    /// Everything a processor test needs to build a context
    pub struct Harness {
        pub store: Arc<MemoryStore>,
        pub services: Services,
        pub cancel: CancellationToken,
        pub outputs: RunOutputs,
    }

    impl Harness {
        pub fn new(registry: ProviderRegistry) -> Self {
            let store = Arc::new(MemoryStore::new());
            Self {
                services: Services::with_store(store.clone(), Arc::new(NoIssuer), registry),
                store,
                cancel: CancellationToken::new(),
                outputs: RunOutputs::default(),
            }
        }

        pub fn with_outputs(mut self, outputs: Vec<WorkflowOutput>) -> Self {
            self.outputs = RunOutputs::from(outputs);
            self
        }

        pub fn context<'a>(&'a self, node: &'a WorkflowNode, logger: &'a NodeLogger) -> NodeContext<'a> {
            NodeContext {
                workflow_id: "wf",
                run_id: "run",
                node,
                logger,
                outputs: &self.outputs,
                services: &self.services,
                cancel: &self.cancel,
                previous_failed: false,
            }
        }
    }
}
