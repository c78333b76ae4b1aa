//! In-process store implementing every repository trait
//!
//! Backs tests and the CLI. The whole store can be captured as a
//! [`StoreSnapshot`] and restored from one, which is how the CLI keeps
//! certificates and run history between invocations.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::access::Access;
use crate::acme_account::AcmeAccount;
use crate::certificate::Certificate;
use crate::error::{RepositoryError, RepositoryResult};
use crate::repository::*;
use crate::settings::Settings;
use crate::workflow::{Workflow, WorkflowLog, WorkflowLogs, WorkflowOutput, WorkflowRun};

/// Serializable contents of a [`MemoryStore`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    #[serde(default)]
    pub accesses: Vec<Access>,
    #[serde(default)]
    pub settings: Vec<Settings>,
    #[serde(default)]
    pub workflows: Vec<Workflow>,
    #[serde(default)]
    pub certificates: Vec<Certificate>,
    #[serde(default)]
    pub runs: Vec<WorkflowRun>,
    #[serde(default)]
    pub outputs: Vec<WorkflowOutput>,
    #[serde(default)]
    pub logs: Vec<WorkflowLog>,
    #[serde(default)]
    pub acme_accounts: Vec<AcmeAccount>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<StoreSnapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        Self {
            inner: RwLock::new(snapshot),
        }
    }

    pub fn snapshot(&self) -> RepositoryResult<StoreSnapshot> {
        Ok(self.read()?.clone())
    }

    /// Insert or replace an access by id
    pub fn put_access(&self, access: Access) -> RepositoryResult<()> {
        let mut inner = self.write()?;
        inner.accesses.retain(|a| a.id != access.id);
        inner.accesses.push(access);
        Ok(())
    }

    /// Insert or replace a settings record by name
    pub fn put_settings(&self, settings: Settings) -> RepositoryResult<()> {
        let mut inner = self.write()?;
        inner.settings.retain(|s| s.name != settings.name);
        inner.settings.push(settings);
        Ok(())
    }

    /// Insert or replace a workflow by id
    pub fn put_workflow(&self, workflow: Workflow) -> RepositoryResult<()> {
        let mut inner = self.write()?;
        inner.workflows.retain(|w| w.id != workflow.id);
        inner.workflows.push(workflow);
        Ok(())
    }

    fn read(&self) -> RepositoryResult<RwLockReadGuard<'_, StoreSnapshot>> {
        self.inner
            .read()
            .map_err(|_| RepositoryError::Backend("memory store lock poisoned".into()))
    }

    fn write(&self) -> RepositoryResult<RwLockWriteGuard<'_, StoreSnapshot>> {
        self.inner
            .write()
            .map_err(|_| RepositoryError::Backend("memory store lock poisoned".into()))
    }
}

#[async_trait]
impl AccessRepository for MemoryStore {
    async fn get_by_id(&self, id: &str) -> RepositoryResult<Access> {
        self.read()?
            .accesses
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found("access", id))
    }
}

#[async_trait]
impl SettingsRepository for MemoryStore {
    async fn get_by_name(&self, name: &str) -> RepositoryResult<Settings> {
        self.read()?
            .settings
            .iter()
            .find(|s| s.name == name)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found("settings", name))
    }
}

#[async_trait]
impl AcmeAccountRepository for MemoryStore {
    async fn get_by_ca_and_email(
        &self,
        ca_directory_url: &str,
        email: &str,
    ) -> RepositoryResult<AcmeAccount> {
        self.read()?
            .acme_accounts
            .iter()
            .find(|a| a.matches(ca_directory_url, email))
            .cloned()
            .ok_or_else(|| {
                RepositoryError::not_found("acme account", format!("{ca_directory_url}|{email}"))
            })
    }

    async fn save(&self, mut account: AcmeAccount) -> RepositoryResult<AcmeAccount> {
        account.email = account.email.to_ascii_lowercase();
        if account.created_at.is_none() {
            account.created_at = Some(Utc::now());
        }

        let mut inner = self.write()?;
        inner
            .acme_accounts
            .retain(|a| !a.matches(&account.ca_directory_url, &account.email));
        inner.acme_accounts.push(account.clone());
        Ok(account)
    }
}

#[async_trait]
impl CertificateRepository for MemoryStore {
    async fn get_by_id(&self, id: &str) -> RepositoryResult<Certificate> {
        self.read()?
            .certificates
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found("certificate", id))
    }

    async fn get_by_workflow_node_id(&self, node_id: &str) -> RepositoryResult<Certificate> {
        self.read()?
            .certificates
            .iter()
            .rev()
            .find(|c| c.workflow_node_id == node_id)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found("certificate", node_id))
    }

    async fn save(&self, mut certificate: Certificate) -> RepositoryResult<Certificate> {
        if certificate.id.is_empty() {
            certificate.id = uuid::Uuid::new_v4().to_string();
        }
        if certificate.created_at.is_none() {
            certificate.created_at = Some(Utc::now());
        }

        let mut inner = self.write()?;
        match inner.certificates.iter_mut().find(|c| c.id == certificate.id) {
            Some(existing) => *existing = certificate.clone(),
            None => inner.certificates.push(certificate.clone()),
        }
        Ok(certificate)
    }

    async fn delete_where(&self, predicate: CertificatePredicate<'_>) -> RepositoryResult<usize> {
        let mut inner = self.write()?;
        let before = inner.certificates.len();
        inner.certificates.retain(|c| !predicate(c));
        Ok(before - inner.certificates.len())
    }
}

#[async_trait]
impl WorkflowRepository for MemoryStore {
    async fn get_by_id(&self, id: &str) -> RepositoryResult<Workflow> {
        self.read()?
            .workflows
            .iter()
            .find(|w| w.id == id)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found("workflow", id))
    }

    async fn list(&self) -> RepositoryResult<Vec<Workflow>> {
        Ok(self.read()?.workflows.clone())
    }
}

#[async_trait]
impl WorkflowRunRepository for MemoryStore {
    async fn save(&self, run: &WorkflowRun) -> RepositoryResult<()> {
        let mut inner = self.write()?;
        match inner.runs.iter_mut().find(|r| r.id == run.id) {
            Some(existing) => *existing = run.clone(),
            None => inner.runs.push(run.clone()),
        }
        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> RepositoryResult<WorkflowRun> {
        self.read()?
            .runs
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found("workflow run", id))
    }

    async fn delete_where(
        &self,
        predicate: WorkflowRunPredicate<'_>,
    ) -> RepositoryResult<Vec<String>> {
        let mut inner = self.write()?;
        let mut deleted = Vec::new();
        inner.runs.retain(|r| {
            let matched = predicate(r);
            if matched {
                deleted.push(r.id.clone());
            }
            !matched
        });
        Ok(deleted)
    }
}

#[async_trait]
impl WorkflowOutputRepository for MemoryStore {
    async fn save(&self, output: WorkflowOutput) -> RepositoryResult<()> {
        self.write()?.outputs.push(output);
        Ok(())
    }

    async fn get_by_node_id(&self, node_id: &str) -> RepositoryResult<WorkflowOutput> {
        self.read()?
            .outputs
            .iter()
            .rev()
            .find(|o| o.node_id == node_id)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found("workflow output", node_id))
    }

    async fn delete_by_run_ids(&self, run_ids: &[String]) -> RepositoryResult<usize> {
        let mut inner = self.write()?;
        let before = inner.outputs.len();
        inner.outputs.retain(|o| !run_ids.contains(&o.run_id));
        Ok(before - inner.outputs.len())
    }
}

#[async_trait]
impl WorkflowLogRepository for MemoryStore {
    async fn append(&self, logs: Vec<WorkflowLog>) -> RepositoryResult<()> {
        self.write()?.logs.extend(logs);
        Ok(())
    }

    async fn list_by_run_id(&self, run_id: &str) -> RepositoryResult<WorkflowLogs> {
        let mut logs: WorkflowLogs = self
            .read()?
            .logs
            .iter()
            .filter(|l| l.run_id == run_id)
            .cloned()
            .collect::<Vec<_>>()
            .into();
        logs.sort_by_timestamp();
        Ok(logs)
    }

    async fn delete_by_run_ids(&self, run_ids: &[String]) -> RepositoryResult<usize> {
        let mut inner = self.write()?;
        let before = inner.logs.len();
        inner.logs.retain(|l| !run_ids.contains(&l.run_id));
        Ok(before - inner.logs.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{LogLevel, WorkflowTrigger};

    fn cert(node: &str, san: &str) -> Certificate {
        Certificate {
            subject_alt_names: san.to_string(),
            workflow_node_id: node.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_certificate_latest_by_node() {
        let store = MemoryStore::new();
        let first = CertificateRepository::save(&store, cert("apply", "a.com"))
            .await
            .unwrap();
        let second = CertificateRepository::save(&store, cert("apply", "a.com;b.com"))
            .await
            .unwrap();
        assert_ne!(first.id, second.id);
        assert!(second.created_at.is_some());

        let latest = store.get_by_workflow_node_id("apply").await.unwrap();
        assert_eq!(latest.id, second.id);

        let err = store.get_by_workflow_node_id("other").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_certificate_delete_where_counts() {
        let store = MemoryStore::new();
        for san in ["a.com", "b.com", "a.com"] {
            CertificateRepository::save(&store, cert("n", san)).await.unwrap();
        }
        let removed = CertificateRepository::delete_where(&store, &|c: &Certificate| {
            c.subject_alt_names == "a.com"
        })
        .await
        .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.snapshot().unwrap().certificates.len(), 1);
    }

    #[tokio::test]
    async fn test_acme_account_lookup_ignores_email_case() {
        let store = MemoryStore::new();
        let account = |url: &str| AcmeAccount {
            ca_directory_url: "https://ca/directory".into(),
            email: "Ops@Example.com".into(),
            account_url: url.into(),
            credentials: "{}".into(),
            created_at: None,
        };
        AcmeAccountRepository::save(&store, account("https://ca/acct/1"))
            .await
            .unwrap();
        let saved = AcmeAccountRepository::save(&store, account("https://ca/acct/2"))
            .await
            .unwrap();
        assert_eq!(saved.email, "ops@example.com");

        let found = store
            .get_by_ca_and_email("https://ca/directory", "OPS@example.com")
            .await
            .unwrap();
        assert_eq!(found.account_url, "https://ca/acct/2");
        assert_eq!(store.snapshot().unwrap().acme_accounts.len(), 1);

        let err = store
            .get_by_ca_and_email("https://other/directory", "ops@example.com")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_logs_sorted_stably_per_run() {
        let store = MemoryStore::new();
        let log = |run: &str, ts: i64, msg: &str| WorkflowLog {
            run_id: run.to_string(),
            timestamp: ts,
            level: LogLevel::ERROR,
            message: msg.to_string(),
            ..Default::default()
        };
        store
            .append(vec![log("r1", 2, "b"), log("r2", 1, "x"), log("r1", 1, "a"), log("r1", 2, "c")])
            .await
            .unwrap();

        let logs = store.list_by_run_id("r1").await.unwrap();
        assert_eq!(logs.error_string(), "a\nb\nc");

        let removed = WorkflowLogRepository::delete_by_run_ids(&store, &["r1".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 3);
    }

    #[tokio::test]
    async fn test_run_delete_where_returns_ids() {
        let store = MemoryStore::new();
        let run = WorkflowRun::new("wf", WorkflowTrigger::Manual);
        WorkflowRunRepository::save(&store, &run).await.unwrap();

        let ids = WorkflowRunRepository::delete_where(&store, &|r: &WorkflowRun| r.workflow_id == "wf")
            .await
            .unwrap();
        assert_eq!(ids, vec![run.id.clone()]);
        assert!(WorkflowRunRepository::get_by_id(&store, &run.id).await.is_err());
    }
}
