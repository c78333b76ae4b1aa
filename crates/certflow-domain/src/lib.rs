//! Certificate lifecycle domain model
//!
//! Entities shared by the ACME applicant and the workflow engine:
//! certificates, workflow definitions, runs, logs and node outputs, plus the
//! repository traits the core reads and writes them through.

pub mod access;
pub mod acme_account;
pub mod certificate;
pub mod error;
pub mod memory;
pub mod repository;
pub mod settings;
pub mod workflow;

pub use access::Access;
pub use acme_account::AcmeAccount;
pub use certificate::{join_domains, split_domains, Certificate, CertificateSource};
pub use error::{DomainError, RepositoryError, RepositoryResult};
pub use memory::{MemoryStore, StoreSnapshot};
pub use repository::{
    AccessRepository, AcmeAccountRepository, CertificateRepository, SettingsRepository, WorkflowLogRepository,
    WorkflowOutputRepository, WorkflowRepository, WorkflowRunRepository,
};
pub use settings::{
    PersistenceSettings, Settings, SslProviderSettings, SETTINGS_NAME_PERSISTENCE,
    SETTINGS_NAME_SSL_PROVIDER,
};
pub use workflow::{
    LogLevel, Workflow, WorkflowLog, WorkflowLogs, WorkflowNode, WorkflowNodeIo,
    WorkflowNodeType, WorkflowOutput, WorkflowRun, WorkflowRunStatus, WorkflowTrigger,
    OUTPUT_NAME_SKIPPED,
};

/// Current time as a millisecond epoch, the resolution used by workflow logs
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
