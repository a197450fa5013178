#![forbid(unsafe_code)]

//! `fieldwatch` — field-service SLA monitoring agent binary.
//!
//! Bootstraps configuration, connects the database, and starts the tick
//! scheduler and retention service. Each tick pulls open opportunities from
//! the analytics source, classifies them against business-time SLA
//! thresholds, and dispatches tiered chat-group notifications.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use fieldwatch::agent::orchestrator::TickOrchestrator;
use fieldwatch::agent::scheduler;
use fieldwatch::agent::tracker::RunTracker;
use fieldwatch::config::{GlobalConfig, Settings};
use fieldwatch::notify::advisor::NoopAdvisor;
use fieldwatch::notify::manager::NotificationManager;
use fieldwatch::notify::webhook::ChatWebhookSender;
use fieldwatch::persistence::cache_repo::CacheRepo;
use fieldwatch::persistence::group_repo::GroupRepo;
use fieldwatch::persistence::run_repo::RunRepo;
use fieldwatch::persistence::settings_repo::SettingsRepo;
use fieldwatch::persistence::task_repo::TaskRepo;
use fieldwatch::persistence::{db, retention};
use fieldwatch::source::analytics::AnalyticsFetcher;
use fieldwatch::sync::DataSyncStrategy;
use fieldwatch::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "fieldwatch", about = "Field-service SLA monitoring agent", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the database path from the config file.
    #[arg(long)]
    db: Option<PathBuf>,

    /// Trigger one tick immediately instead of waiting a full interval.
    #[arg(long)]
    run_once: bool,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("fieldwatch agent bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = GlobalConfig::load_from_path(&args.config)?;
    if let Some(db_path) = args.db {
        config.db_path = db_path;
    }
    config.load_credentials()?;
    info!("configuration loaded");

    // ── Initialize database ─────────────────────────────
    let db_path = config.db_path.to_string_lossy().to_string();
    let database = Arc::new(db::connect(&db_path).await?);
    info!(path = %db_path, "database connected");

    // ── Start retention service ─────────────────────────
    let cancel = CancellationToken::new();
    let retention_handle = retention::spawn_retention_task(
        Arc::clone(&database),
        config.retention_days,
        cancel.clone(),
    );
    info!("retention service started");

    // ── Wire the agent ──────────────────────────────────
    let fetcher = Arc::new(AnalyticsFetcher::new(&config.analytics)?);
    let sender = Arc::new(ChatWebhookSender::new()?);
    let advisor = Arc::new(NoopAdvisor);

    let cache_repo = CacheRepo::new(Arc::clone(&database));
    let task_repo = TaskRepo::new(Arc::clone(&database));
    let run_repo = RunRepo::new(Arc::clone(&database));
    let group_repo = GroupRepo::new(Arc::clone(&database));
    let settings_repo = SettingsRepo::new(Arc::clone(&database));

    let sync = Arc::new(DataSyncStrategy::new(fetcher, cache_repo));
    let manager = Arc::new(NotificationManager::new(
        task_repo,
        Arc::clone(&sync),
        sender,
        advisor,
    ));
    let tracker = RunTracker::new(run_repo);

    let orchestrator = Arc::new(TickOrchestrator::new(
        sync,
        manager,
        tracker,
        settings_repo.clone(),
        group_repo,
        config.escalation_webhook_url.clone(),
    ));

    // The schedule interval is read once at startup; runtime edits take
    // effect on the next restart, while all other settings apply per tick.
    let interval_minutes = match settings_repo.get_all().await {
        Ok(map) => Settings::from_map(&map).execution_interval_minutes,
        Err(err) => {
            error!(%err, "settings read failed at startup, using default interval");
            Settings::default().execution_interval_minutes
        }
    };
    let interval = Duration::from_secs(interval_minutes * 60);

    let handle = scheduler::spawn(Arc::clone(&orchestrator), interval, cancel.clone());
    info!(interval_minutes, "scheduler started");

    if args.run_once {
        if handle.try_trigger() {
            info!("immediate tick requested");
        } else {
            error!("immediate tick could not be queued");
        }
    }

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received, starting graceful shutdown");
    cancel.cancel();

    shutdown_with_timeout(handle, retention_handle).await;
    info!("fieldwatch shut down");

    Ok(())
}

/// Maximum time to wait for graceful shutdown before giving up.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Wait for the scheduler and retention tasks with a timeout.
async fn shutdown_with_timeout(
    handle: scheduler::SchedulerHandle,
    retention_handle: tokio::task::JoinHandle<()>,
) {
    let shutdown_fut = async {
        handle.shutdown().await;
        let _ = retention_handle.await;
    };

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, shutdown_fut)
        .await
        .is_err()
    {
        error!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "graceful shutdown timed out, exiting"
        );
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
