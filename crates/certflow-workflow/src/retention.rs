//! Retention sweeps
//!
//! Removes certificates that expired longer ago than the configured window,
//! and finished runs older than theirs together with the runs' outputs and
//! logs. A window of zero days disables the corresponding sweep. Sweeps only
//! touch records already past their window, so they can run alongside
//! active runs and repeat without effect.

use std::sync::Arc;
use std::time::Duration;

use certflow_domain::{PersistenceSettings, RepositoryError, SETTINGS_NAME_PERSISTENCE};
use chrono::{DateTime, Utc};
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::context::{optional, Services};
use crate::error::EngineError;

/// Default sweep interval (daily)
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(24 * 3600);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub certificates: usize,
    pub runs: usize,
    pub outputs: usize,
    pub logs: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.certificates + self.runs + self.outputs + self.logs
    }
}

pub struct RetentionSweeper {
    services: Services,
}

impl RetentionSweeper {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    /// Sweep using the stored persistence settings
    pub async fn sweep(&self) -> Result<SweepReport, EngineError> {
        let settings = self.persistence_settings().await?;
        Ok(self.sweep_with(&settings, Utc::now()).await?)
    }

    pub async fn sweep_with(
        &self,
        settings: &PersistenceSettings,
        now: DateTime<Utc>,
    ) -> Result<SweepReport, RepositoryError> {
        let mut report = SweepReport {
            certificates: self
                .sweep_certificates(settings.expired_certificates_max_days_retention, now)
                .await?,
            ..SweepReport::default()
        };
        let (runs, outputs, logs) = self
            .sweep_runs(settings.workflow_runs_max_days_retention, now)
            .await?;
        report.runs = runs;
        report.outputs = outputs;
        report.logs = logs;

        if report.total() > 0 {
            info!(
                certificates = report.certificates,
                runs = report.runs,
                outputs = report.outputs,
                logs = report.logs,
                "Retention sweep removed expired records"
            );
        } else {
            debug!("Retention sweep found nothing to remove");
        }
        Ok(report)
    }

    /// Delete certificates whose validity ended more than `max_days` ago
    pub async fn sweep_certificates(
        &self,
        max_days: u32,
        now: DateTime<Utc>,
    ) -> Result<usize, RepositoryError> {
        if max_days == 0 {
            return Ok(0);
        }
        let cutoff = now - chrono::Duration::days(i64::from(max_days));
        self.services
            .certificates
            .delete_where(&|c| c.validity_not_after.is_some_and(|t| t < cutoff))
            .await
    }

    /// Delete finished runs created more than `max_days` ago, with their outputs and logs
    pub async fn sweep_runs(
        &self,
        max_days: u32,
        now: DateTime<Utc>,
    ) -> Result<(usize, usize, usize), RepositoryError> {
        if max_days == 0 {
            return Ok((0, 0, 0));
        }
        let cutoff = now - chrono::Duration::days(i64::from(max_days));
        let run_ids = self
            .services
            .runs
            .delete_where(&|r| r.status.is_terminal() && r.created_at < cutoff)
            .await?;
        if run_ids.is_empty() {
            return Ok((0, 0, 0));
        }
        let outputs = self.services.outputs.delete_by_run_ids(&run_ids).await?;
        let logs = self.services.logs.delete_by_run_ids(&run_ids).await?;
        Ok((run_ids.len(), outputs, logs))
    }

    async fn persistence_settings(&self) -> Result<PersistenceSettings, EngineError> {
        let record = optional(
            self.services
                .settings
                .get_by_name(SETTINGS_NAME_PERSISTENCE)
                .await,
        )?;
        match record {
            Some(record) => record.content_as().map_err(|e| EngineError::Settings {
                name: SETTINGS_NAME_PERSISTENCE.to_string(),
                reason: e.to_string(),
            }),
            None => Ok(PersistenceSettings::default()),
        }
    }
}

/// Runs the retention sweep on a fixed interval until shut down
pub struct RetentionScheduler {
    sweeper: Arc<RetentionSweeper>,
    interval: Duration,
}

impl RetentionScheduler {
    pub fn new(sweeper: Arc<RetentionSweeper>) -> Self {
        Self {
            sweeper,
            interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// The first sweep happens immediately
    pub async fn run(self, shutdown: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "Starting retention scheduler");
        let mut ticker = interval(self.interval);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Retention scheduler stopped");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.sweeper.sweep().await {
                        error!(error = %e, "Retention sweep failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::test_support::NoIssuer;
    use crate::providers::ProviderRegistry;
    use certflow_domain::{
        Certificate, CertificateRepository, MemoryStore, Settings, WorkflowRun,
        WorkflowRunRepository, WorkflowRunStatus, WorkflowTrigger,
    };
    use serde_json::json;

    fn sweeper() -> (RetentionSweeper, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let services =
            Services::with_store(store.clone(), Arc::new(NoIssuer), ProviderRegistry::new());
        (RetentionSweeper::new(services), store)
    }

    async fn certificate(store: &MemoryStore, expired_days_ago: i64) {
        CertificateRepository::save(
            store,
            Certificate {
                validity_not_after: Some(Utc::now() - chrono::Duration::days(expired_days_ago)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_second_sweep_deletes_nothing() {
        let (sweeper, store) = sweeper();
        certificate(&store, 90).await;
        certificate(&store, 5).await;
        certificate(&store, -30).await;
        let settings = PersistenceSettings {
            expired_certificates_max_days_retention: 30,
            workflow_runs_max_days_retention: 0,
        };

        let first = sweeper.sweep_with(&settings, Utc::now()).await.unwrap();
        assert_eq!(first.certificates, 1);

        let second = sweeper.sweep_with(&settings, Utc::now()).await.unwrap();
        assert_eq!(second, SweepReport::default());
    }

    #[tokio::test]
    async fn test_zero_retention_disables_sweep() {
        let (sweeper, store) = sweeper();
        certificate(&store, 400).await;
        let report = sweeper.sweep().await.unwrap();
        assert_eq!(report.total(), 0);
    }

    #[tokio::test]
    async fn test_old_finished_runs_are_removed() {
        let (sweeper, store) = sweeper();
        let mut old = WorkflowRun::new("wf", WorkflowTrigger::Scheduled);
        old.created_at = Utc::now() - chrono::Duration::days(40);
        old.start().unwrap();
        old.finish(WorkflowRunStatus::Succeeded, "").unwrap();
        WorkflowRunRepository::save(store.as_ref(), &old).await.unwrap();

        let mut active = WorkflowRun::new("wf", WorkflowTrigger::Scheduled);
        active.created_at = Utc::now() - chrono::Duration::days(40);
        active.start().unwrap();
        WorkflowRunRepository::save(store.as_ref(), &active).await.unwrap();

        store
            .put_settings(Settings::new(
                SETTINGS_NAME_PERSISTENCE,
                json!({ "workflowRunsMaxDaysRetention": 30 }),
            ))
            .unwrap();

        let report = sweeper.sweep().await.unwrap();
        assert_eq!(report.runs, 1);
        assert!(WorkflowRunRepository::get_by_id(store.as_ref(), &old.id)
            .await
            .is_err());
        assert!(WorkflowRunRepository::get_by_id(store.as_ref(), &active.id)
            .await
            .is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_stops_on_shutdown() {
        let (sweeper, _) = sweeper();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(
            RetentionScheduler::new(Arc::new(sweeper))
                .with_interval(Duration::from_secs(60))
                .run(shutdown.clone()),
        );

        tokio::time::sleep(Duration::from_secs(150)).await;
        shutdown.cancel();
        task.await.unwrap();
    }
}
