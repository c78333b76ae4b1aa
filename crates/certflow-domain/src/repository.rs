//! Persistence seams the core reads and writes through
//!
//! Storage format is up to the implementation. Lookups that find nothing
//! return [`RepositoryError::NotFound`](crate::RepositoryError::NotFound).

use async_trait::async_trait;

use crate::access::Access;
use crate::acme_account::AcmeAccount;
use crate::certificate::Certificate;
use crate::error::RepositoryResult;
use crate::settings::Settings;
use crate::workflow::{Workflow, WorkflowLog, WorkflowLogs, WorkflowOutput, WorkflowRun};

pub type CertificatePredicate<'a> = &'a (dyn Fn(&Certificate) -> bool + Send + Sync);
pub type WorkflowRunPredicate<'a> = &'a (dyn Fn(&WorkflowRun) -> bool + Send + Sync);

#[async_trait]
pub trait AccessRepository: Send + Sync {
    async fn get_by_id(&self, id: &str) -> RepositoryResult<Access>;
}

#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn get_by_name(&self, name: &str) -> RepositoryResult<Settings>;
}

#[async_trait]
pub trait AcmeAccountRepository: Send + Sync {
    /// Account registered on the CA directory for the email, compared case-insensitively
    async fn get_by_ca_and_email(
        &self,
        ca_directory_url: &str,
        email: &str,
    ) -> RepositoryResult<AcmeAccount>;

    /// Insert or replace the account for its (directory, email) pair
    async fn save(&self, account: AcmeAccount) -> RepositoryResult<AcmeAccount>;
}

#[async_trait]
pub trait CertificateRepository: Send + Sync {
    async fn get_by_id(&self, id: &str) -> RepositoryResult<Certificate>;

    /// Most recently saved certificate issued for the node
    async fn get_by_workflow_node_id(&self, node_id: &str) -> RepositoryResult<Certificate>;

    /// Insert or replace; assigns an id and creation time when missing
    async fn save(&self, certificate: Certificate) -> RepositoryResult<Certificate>;

    /// Delete every matching record, returning how many were removed
    async fn delete_where(&self, predicate: CertificatePredicate<'_>) -> RepositoryResult<usize>;
}

#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    async fn get_by_id(&self, id: &str) -> RepositoryResult<Workflow>;
    async fn list(&self) -> RepositoryResult<Vec<Workflow>>;
}

#[async_trait]
pub trait WorkflowRunRepository: Send + Sync {
    async fn save(&self, run: &WorkflowRun) -> RepositoryResult<()>;
    async fn get_by_id(&self, id: &str) -> RepositoryResult<WorkflowRun>;

    /// Delete every matching run, returning the removed ids
    async fn delete_where(&self, predicate: WorkflowRunPredicate<'_>)
        -> RepositoryResult<Vec<String>>;
}

#[async_trait]
pub trait WorkflowOutputRepository: Send + Sync {
    async fn save(&self, output: WorkflowOutput) -> RepositoryResult<()>;

    /// Latest output recorded for the node across runs
    async fn get_by_node_id(&self, node_id: &str) -> RepositoryResult<WorkflowOutput>;

    async fn delete_by_run_ids(&self, run_ids: &[String]) -> RepositoryResult<usize>;
}

#[async_trait]
pub trait WorkflowLogRepository: Send + Sync {
    /// Append in the given order
    async fn append(&self, logs: Vec<WorkflowLog>) -> RepositoryResult<()>;

    /// A run's logs ordered by timestamp, insertion order kept among ties
    async fn list_by_run_id(&self, run_id: &str) -> RepositoryResult<WorkflowLogs>;

    async fn delete_by_run_ids(&self, run_ids: &[String]) -> RepositoryResult<usize>;
}
