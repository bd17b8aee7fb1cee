//! docindex - incremental document indexer
//!
//! Entry point for running jobs once, serving scheduled jobs, and reporting status.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use docindex::config::JobSettings;
use docindex::decode::decoder_for;
use docindex::index::{ElasticIndexStore, IndexStore, MemoryIndexStore};
use docindex::jobs::{CleanupJob, JobOutcome, JobStateRegistry, ProcessingJob};
use docindex::observability::{init_metrics, init_tracing};
use docindex::scheduler::{Scheduler, Trigger};
use docindex::server::{collect_statuses, shutdown_signal, ApiState, App, ServerConfig};
use docindex::{Config, DocumentKind};

/// docindex - incremental document indexer
#[derive(Parser, Debug)]
#[command(name = "docindex")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, env = "DOCINDEX_CONFIG")]
    config: Option<PathBuf>,

    /// Directory for comparer snapshots and run statistics
    #[arg(short, long, env = "DOCINDEX_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Host address the HTTP server binds to
    #[arg(long, env = "DOCINDEX_HOST")]
    host: Option<String>,

    /// Port the HTTP server listens on
    #[arg(short, long, env = "DOCINDEX_PORT")]
    port: Option<u16>,

    /// Base URL of the search index service
    #[arg(long, env = "DOCINDEX_INDEX_URL")]
    index_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "DOCINDEX_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging output
    #[arg(long, env = "DOCINDEX_LOG_JSON")]
    log_json: bool,

    /// Write to an in-process index instead of the search service
    #[arg(long, env = "DOCINDEX_DRY_RUN")]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the processing job for one kind once
    Process {
        #[arg(value_enum)]
        kind: DocumentKind,

        /// Scan this directory, overriding or replacing the configured job
        #[arg(long)]
        scan_path: Option<PathBuf>,
    },
    /// Run the cleanup job for one kind once
    Cleanup {
        #[arg(value_enum)]
        kind: DocumentKind,
    },
    /// Run all configured jobs on their schedules and serve health and metrics
    Serve,
    /// Print job states and the latest run statistics
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    init_tracing(&config.log_level, cli.log_json);
    init_metrics();

    tracing::info!(
        "docindex v{} starting, data in {}",
        env!("CARGO_PKG_VERSION"),
        config.data_dir.display()
    );
    tracing::debug!(?config, "Configuration loaded");

    let index = index_store(&config, cli.dry_run)?;
    let registry = JobStateRegistry::global();

    match cli.command {
        Command::Process { kind, .. } => run_process(&config, kind, index, registry).await,
        Command::Cleanup { kind } => run_cleanup(&config, kind, index, registry).await,
        Command::Serve => serve(config, index, registry).await,
        Command::Status => {
            let statuses = collect_statuses(&config, &registry);
            println!("{}", serde_json::to_string_pretty(&statuses)?);
            Ok(())
        }
    }
}

/// Merge the config file with command-line and environment overrides.
fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::read(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::default(),
    };

    if let Some(data_dir) = &cli.data_dir {
        config.data_dir.clone_from(data_dir);
    }
    if let Some(host) = &cli.host {
        config.host.clone_from(host);
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(url) = &cli.index_url {
        config.index.url.clone_from(url);
    }
    if let Some(level) = &cli.log_level {
        config.log_level.clone_from(level);
    }
    if let Command::Process {
        kind,
        scan_path: Some(scan_path),
    } = &cli.command
    {
        config
            .jobs
            .entry(*kind)
            .or_insert_with(|| JobSettings::for_kind(*kind, scan_path))
            .scan_path
            .clone_from(scan_path);
    }

    config.normalize();
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn index_store(config: &Config, dry_run: bool) -> anyhow::Result<Arc<dyn IndexStore>> {
    if dry_run {
        tracing::warn!("Dry run: documents are indexed in memory only");
        return Ok(Arc::new(MemoryIndexStore::new()));
    }
    let store = ElasticIndexStore::new(
        &config.index.url,
        Duration::from_secs(config.index.timeout_secs),
    )
    .context("failed to create index client")?;
    Ok(Arc::new(store))
}

fn job_settings(config: &Config, kind: DocumentKind) -> anyhow::Result<&JobSettings> {
    match config.job(kind) {
        Some(settings) => Ok(settings),
        None => bail!("no job configured for kind '{kind}'"),
    }
}

fn processing_job(
    config: &Config,
    kind: DocumentKind,
    settings: &JobSettings,
    index: Arc<dyn IndexStore>,
    registry: Arc<JobStateRegistry>,
) -> ProcessingJob {
    ProcessingJob::new(
        kind,
        settings.clone(),
        config.index_name(settings),
        decoder_for(kind),
        index,
        registry,
    )
}

fn cleanup_job(
    config: &Config,
    kind: DocumentKind,
    settings: &JobSettings,
    index: Arc<dyn IndexStore>,
    registry: Arc<JobStateRegistry>,
) -> CleanupJob {
    CleanupJob::new(
        kind,
        settings.clone(),
        config.index_name(settings),
        index,
        registry,
    )
}

/// Cancel `token` on Ctrl+C or SIGTERM.
fn cancel_on_signal(token: &CancellationToken) {
    let token = token.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        token.cancel();
    });
}

async fn run_process(
    config: &Config,
    kind: DocumentKind,
    index: Arc<dyn IndexStore>,
    registry: Arc<JobStateRegistry>,
) -> anyhow::Result<()> {
    let settings = job_settings(config, kind)?;
    let job = processing_job(config, kind, settings, index, registry);

    let cancel = CancellationToken::new();
    cancel_on_signal(&cancel);

    match job.execute(cancel).await.context("processing run failed")? {
        JobOutcome::Completed(statistic) => {
            println!("{}", serde_json::to_string_pretty(&statistic)?);
        }
        JobOutcome::Conflict(conflict) => bail!("cannot start: {conflict}"),
        JobOutcome::Inactive => println!("job {} is inactive", job.key()),
        JobOutcome::Cancelled(counts) => {
            println!(
                "cancelled after {} documents ({} changed, {} failed)",
                counts.entire, counts.changed, counts.failed
            );
        }
    }
    Ok(())
}

async fn run_cleanup(
    config: &Config,
    kind: DocumentKind,
    index: Arc<dyn IndexStore>,
    registry: Arc<JobStateRegistry>,
) -> anyhow::Result<()> {
    let settings = job_settings(config, kind)?;
    let job = cleanup_job(config, kind, settings, index, registry);

    let cancel = CancellationToken::new();
    cancel_on_signal(&cancel);

    match job.execute(cancel).await.context("cleanup run failed")? {
        JobOutcome::Completed(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        JobOutcome::Conflict(conflict) => bail!("cannot start: {conflict}"),
        JobOutcome::Inactive => println!("job {} is inactive", job.key()),
        JobOutcome::Cancelled(_) => println!("cancelled before any removal"),
    }
    Ok(())
}

async fn serve(
    config: Config,
    index: Arc<dyn IndexStore>,
    registry: Arc<JobStateRegistry>,
) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    cancel_on_signal(&shutdown);

    let mut scheduler = Scheduler::new(shutdown.clone());
    for (&kind, settings) in config.jobs.iter().filter(|(_, s)| s.active) {
        let processing = Arc::new(processing_job(
            &config,
            kind,
            settings,
            Arc::clone(&index),
            Arc::clone(&registry),
        ));
        let cleanup = Arc::new(cleanup_job(
            &config,
            kind,
            settings,
            Arc::clone(&index),
            Arc::clone(&registry),
        ));

        scheduler.add(
            Trigger::new(
                processing.key().to_string(),
                settings.process_interval(),
                move |cancel| {
                    let job = Arc::clone(&processing);
                    async move {
                        if let Err(e) = job.execute(cancel).await {
                            tracing::error!(job = %job.key(), error = %e, "Scheduled run failed");
                        }
                    }
                },
            )
            .with_timeout(settings.run_timeout()),
        );
        scheduler.add(
            Trigger::new(
                cleanup.key().to_string(),
                settings.cleanup_interval(),
                move |cancel| {
                    let job = Arc::clone(&cleanup);
                    async move {
                        if let Err(e) = job.execute(cancel).await {
                            tracing::error!(job = %job.key(), error = %e, "Scheduled run failed");
                        }
                    }
                },
            )
            .with_timeout(settings.run_timeout()),
        );
    }

    if scheduler.is_empty() {
        tracing::warn!("No active jobs configured, serving status only");
    }
    let scheduler = scheduler.spawn();

    let state =
        ApiState::new(Arc::new(config.clone()), registry).with_triggers(scheduler.control());
    let result = App::new(ServerConfig::from(&config), state)
        .run(shutdown.clone())
        .await;

    // Stop the scheduler however the server ended.
    scheduler.shutdown().await;
    result.context("server failed")
}
