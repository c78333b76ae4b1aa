//! Concurrent run dispatch
//!
//! Each run executes as its own task. The dispatcher keeps the task handle
//! and a cancellation token per run id so callers can cancel or await it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use certflow_domain::{Workflow, WorkflowRun, WorkflowTrigger};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::engine::{RunReport, WorkflowEngine};
use crate::error::EngineError;

struct RunningTask {
    workflow_id: String,
    cancel: CancellationToken,
    handle: JoinHandle<Result<RunReport, EngineError>>,
}

pub struct WorkflowDispatcher {
    engine: Arc<WorkflowEngine>,
    /// Parent of every run token; cancelled on shutdown
    shutdown: CancellationToken,
    tasks: Mutex<HashMap<String, RunningTask>>,
}

impl WorkflowDispatcher {
    pub fn new(engine: Arc<WorkflowEngine>) -> Self {
        Self {
            engine,
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Persist a pending run and start it in the background
    pub async fn dispatch(
        &self,
        workflow: Workflow,
        trigger: WorkflowTrigger,
    ) -> Result<String, EngineError> {
        workflow.validate()?;
        if !workflow.enabled && trigger == WorkflowTrigger::Scheduled {
            return Err(EngineError::Disabled(workflow.id));
        }

        let run = WorkflowRun::new(&workflow.id, trigger);
        self.engine.services().runs.save(&run).await?;
        let run_id = run.id.clone();

        let cancel = self.shutdown.child_token();
        let token = cancel.clone();
        let engine = self.engine.clone();
        let workflow_id = workflow.id.clone();
        let handle =
            tokio::spawn(async move { engine.execute_run(&workflow, run, token).await });

        info!(workflow_id = %workflow_id, run_id = %run_id, trigger = %trigger, "Run dispatched");
        self.register(
            run_id.clone(),
            RunningTask {
                workflow_id,
                cancel,
                handle,
            },
        );
        Ok(run_id)
    }

    fn register(&self, run_id: String, task: RunningTask) {
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.insert(run_id, task);
        }
    }

    /// Request cancellation; false when the run is not tracked
    pub fn cancel(&self, run_id: &str) -> bool {
        if let Ok(tasks) = self.tasks.lock() {
            if let Some(task) = tasks.get(run_id) {
                debug!(run_id = %run_id, workflow_id = %task.workflow_id, "Cancelling run");
                task.cancel.cancel();
                return true;
            }
        }
        false
    }

    /// Wait for a run to finish and stop tracking it
    pub async fn wait(&self, run_id: &str) -> Result<RunReport, EngineError> {
        let task = self
            .tasks
            .lock()
            .ok()
            .and_then(|mut tasks| tasks.remove(run_id))
            .ok_or_else(|| EngineError::UnknownRun(run_id.to_string()))?;
        task.handle
            .await
            .map_err(|e| EngineError::Join(e.to_string()))?
    }

    /// Ids of runs still tracked
    pub fn tracked(&self) -> Vec<String> {
        self.tasks
            .lock()
            .map(|tasks| tasks.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Cancel every tracked run
    pub fn shutdown(&self) {
        info!("Cancelling all workflow runs");
        self.shutdown.cancel();
    }
}
