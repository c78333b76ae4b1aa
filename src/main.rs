//! Certflow CLI - certificate lifecycle workflows
//!
//! Issues and renews certificates over ACME DNS-01, deploys them and sends
//! notifications, as declared in a `.certflow.yml` project file.

mod project_config;
mod state;

use anyhow::{Context, Result};
use certflow_acme::{Applicant, InstantAcmeProtocol};
use certflow_domain::{MemoryStore, Workflow, WorkflowRunStatus, WorkflowTrigger};
use certflow_workflow::{
    ProviderRegistry, RetentionScheduler, RetentionSweeper, Services, WorkflowDispatcher,
    WorkflowEngine,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use project_config::{ProjectConfig, CONFIG_FILE_NAMES};
use state::StateFile;

#[derive(Parser, Debug)]
#[command(name = "certflow")]
#[command(about = "Automate certificate issuance, renewal and deployment", long_about = None)]
#[command(version = env!("GIT_TAG"))]
#[command(long_version = concat!(env!("GIT_TAG"), "\nCommit: ", env!("GIT_HASH"), "\nBuilt: ", env!("BUILD_TIME")))]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Project config file (discovered from the current directory when omitted)
    #[arg(short, long, global = true, env = "CERTFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// JSON file keeping certificates and run history between invocations
    #[arg(long, global = true, env = "CERTFLOW_STATE")]
    state: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a starter .certflow.yml in the current directory
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Check the project config without running anything
    Validate,
    /// Run workflows once and wait for them to finish
    #[command(long_about = r#"
Run workflows once and wait for them to finish. Without arguments every
enabled workflow runs. Exits non-zero when any run does not succeed.

EXAMPLES:
  certflow run
  certflow run example-com --state ./certflow-state.json
    "#)]
    Run {
        /// Workflow ids to run
        workflows: Vec<String>,
    },
    /// Remove expired certificates and old run history
    Cleanup,
    /// Run scheduled workflows on their intervals until interrupted
    Daemon {
        /// Hours between retention sweeps
        #[arg(long, default_value = "24", env = "CERTFLOW_SWEEP_INTERVAL_HOURS")]
        sweep_interval_hours: u64,
    },
}

fn setup_logging(verbose: bool) {
    let log_level = if verbose { "debug" } else { "info" };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<(PathBuf, ProjectConfig)> {
    match path {
        Some(path) => Ok((path.clone(), ProjectConfig::load(path)?)),
        None => ProjectConfig::discover()?.with_context(|| {
            format!(
                "No {} found in this directory or any parent (run `certflow init`)",
                CONFIG_FILE_NAMES[0]
            )
        }),
    }
}

/// Everything a command needs: the config, the store it was loaded into, and the services over it
struct App {
    config: ProjectConfig,
    store: Arc<MemoryStore>,
    state: Option<Arc<StateFile>>,
    services: Services,
}

impl App {
    fn open(cli: &Cli) -> Result<Self> {
        let (config_path, config) = load_config(cli.config.as_ref())?;
        info!(
            path = ?config_path,
            workflows = config.workflows.len(),
            accesses = config.accesses.len(),
            "Loaded project config"
        );

        let state = cli.state.as_ref().map(|p| Arc::new(StateFile::new(p)));
        let snapshot = match &state {
            Some(state) => state.load()?,
            None => Default::default(),
        };
        let store = Arc::new(MemoryStore::from_snapshot(snapshot));
        config.apply_to(&store)?;

        let applicant = Applicant::new(store.clone(), Arc::new(InstantAcmeProtocol::new()))
            .with_account_store(store.clone());
        let services = Services::with_store(
            store.clone(),
            Arc::new(applicant),
            ProviderRegistry::with_builtins(),
        );

        Ok(Self {
            config,
            store,
            state,
            services,
        })
    }

    fn save_state(&self) {
        save_state(self.state.as_deref(), &self.store);
    }
}

fn save_state(state: Option<&StateFile>, store: &MemoryStore) {
    if let Some(state) = state {
        if let Err(e) = state.save(store) {
            error!(path = ?state.path(), "Failed to save state: {:#}", e);
        }
    }
}

fn select_workflows<'a>(config: &'a ProjectConfig, ids: &[String]) -> Result<Vec<&'a Workflow>> {
    if ids.is_empty() {
        return Ok(config.workflows.iter().filter(|w| w.enabled).collect());
    }
    ids.iter()
        .map(|id| {
            config
                .get_workflow(id)
                .with_context(|| format!("Unknown workflow: {}", id))
        })
        .collect()
}

async fn run_once(app: &App, ids: &[String]) -> Result<()> {
    let workflows = select_workflows(&app.config, ids)?;
    if workflows.is_empty() {
        warn!("No workflows to run");
        return Ok(());
    }

    let dispatcher = WorkflowDispatcher::new(Arc::new(WorkflowEngine::new(app.services.clone())));
    let mut run_ids = Vec::new();
    for workflow in workflows {
        let run_id = dispatcher
            .dispatch(workflow.clone(), WorkflowTrigger::Manual)
            .await
            .with_context(|| format!("Failed to start workflow {}", workflow.id))?;
        run_ids.push(run_id);
    }

    let wait_all = async {
        let mut failed = 0;
        for run_id in &run_ids {
            match dispatcher.wait(run_id).await {
                Ok(report) => {
                    let run = &report.run;
                    if run.status == WorkflowRunStatus::Succeeded {
                        info!(workflow_id = %run.workflow_id, run_id = %run.id, "Run succeeded");
                    } else {
                        failed += 1;
                        error!(
                            workflow_id = %run.workflow_id,
                            run_id = %run.id,
                            status = %run.status,
                            "Run did not succeed: {}",
                            run.error
                        );
                    }
                }
                Err(e) => {
                    failed += 1;
                    error!(run_id = %run_id, "Run aborted: {}", e);
                }
            }
        }
        failed
    };
    tokio::pin!(wait_all);

    let failed = tokio::select! {
        failed = &mut wait_all => failed,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, cancelling runs...");
            dispatcher.shutdown();
            (&mut wait_all).await
        }
    };

    app.save_state();
    if failed > 0 {
        anyhow::bail!("{} of {} runs did not succeed", failed, run_ids.len());
    }
    Ok(())
}

/// Re-run one scheduled workflow every `interval` until shutdown
async fn schedule_workflow(
    workflow: Workflow,
    interval: Duration,
    dispatcher: Arc<WorkflowDispatcher>,
    state: Option<Arc<StateFile>>,
    store: Arc<MemoryStore>,
    shutdown: CancellationToken,
) {
    info!(workflow_id = %workflow.id, interval_secs = interval.as_secs(), "Scheduling workflow");
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let run_id = match dispatcher
                    .dispatch(workflow.clone(), WorkflowTrigger::Scheduled)
                    .await
                {
                    Ok(run_id) => run_id,
                    Err(e) => {
                        error!(workflow_id = %workflow.id, "Failed to start scheduled run: {}", e);
                        continue;
                    }
                };
                match dispatcher.wait(&run_id).await {
                    Ok(report) => info!(
                        workflow_id = %workflow.id,
                        run_id = %run_id,
                        status = %report.run.status,
                        "Scheduled run finished"
                    ),
                    Err(e) => error!(workflow_id = %workflow.id, run_id = %run_id, "Scheduled run aborted: {}", e),
                }
                save_state(state.as_deref(), &store);
            }
        }
    }
}

async fn run_daemon(app: App, sweep_interval: Duration) -> Result<()> {
    let shutdown = CancellationToken::new();
    let dispatcher = Arc::new(WorkflowDispatcher::new(Arc::new(WorkflowEngine::new(
        app.services.clone(),
    ))));

    let mut tasks = Vec::new();
    for workflow in app.config.scheduled_workflows() {
        let hours = workflow.interval_hours.unwrap_or(24);
        tasks.push(tokio::spawn(schedule_workflow(
            workflow.clone(),
            Duration::from_secs(hours * 3600),
            dispatcher.clone(),
            app.state.clone(),
            app.store.clone(),
            shutdown.clone(),
        )));
    }
    if tasks.is_empty() {
        warn!("No scheduled workflows; only retention sweeps will run");
    }

    let sweeper = Arc::new(RetentionSweeper::new(app.services.clone()));
    tasks.push(tokio::spawn(
        RetentionScheduler::new(sweeper)
            .with_interval(sweep_interval)
            .run(shutdown.clone()),
    ));

    info!("Certflow daemon running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    info!("Shutting down...");
    shutdown.cancel();
    dispatcher.shutdown();
    for task in tasks {
        if let Err(e) = task.await {
            error!("Task panicked: {}", e);
        }
    }

    app.save_state();
    info!("Certflow daemon stopped");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match &cli.command {
        Commands::Init { force } => {
            let path = match &cli.config {
                Some(path) => path.clone(),
                None => std::env::current_dir()?.join(CONFIG_FILE_NAMES[0]),
            };
            if path.exists() && !force {
                anyhow::bail!("{:?} already exists (use --force to overwrite)", path);
            }
            std::fs::write(&path, ProjectConfig::template())
                .with_context(|| format!("Failed to write {:?}", path))?;
            println!("Created {}", path.display());
            Ok(())
        }
        Commands::Validate => {
            let (path, config) = load_config(cli.config.as_ref())?;
            println!(
                "{}: {} workflow(s), {} access(es), {} scheduled",
                path.display(),
                config.workflows.len(),
                config.accesses.len(),
                config.scheduled_workflows().len()
            );
            Ok(())
        }
        Commands::Run { workflows } => {
            let app = App::open(&cli)?;
            run_once(&app, workflows).await
        }
        Commands::Cleanup => {
            let app = App::open(&cli)?;
            let report = RetentionSweeper::new(app.services.clone())
                .sweep()
                .await
                .context("Retention sweep failed")?;
            app.save_state();
            println!(
                "Removed {} certificate(s), {} run(s), {} output(s), {} log(s)",
                report.certificates, report.runs, report.outputs, report.logs
            );
            Ok(())
        }
        Commands::Daemon {
            sweep_interval_hours,
        } => {
            let app = App::open(&cli)?;
            run_daemon(app, Duration::from_secs((*sweep_interval_hours).max(1) * 3600)).await
        }
    }
}
