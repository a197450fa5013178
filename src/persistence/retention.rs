//! Retention service for time-based data purge.
//!
//! Runs as a background task deleting run steps first, then finished runs,
//! then closed notification tasks older than `retention_days`. Pending
//! tasks and running runs are never purged.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::models::now_local;
use crate::Result;

use super::db::Database;
use super::run_repo::RunRepo;
use super::task_repo::TaskRepo;

const PURGE_INTERVAL: Duration = Duration::from_secs(3600);

/// Spawn the retention purge background task.
///
/// The task runs hourly. On each pass it deletes the audit trail and closed
/// tasks that aged past `retention_days`.
#[must_use]
pub fn spawn_retention_task(
    db: Arc<Database>,
    retention_days: u32,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("retention task shutting down");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(err) = purge(&db, retention_days).await {
                        error!(?err, "retention purge failed");
                    }
                }
            }
        }
    })
}

async fn purge(db: &Arc<Database>, retention_days: u32) -> Result<()> {
    let cutoff = now_local() - chrono::Duration::days(i64::from(retention_days));

    let run_repo = RunRepo::new(Arc::clone(db));
    let (runs, steps) = run_repo.purge_finished_before(cutoff).await?;

    let task_repo = TaskRepo::new(Arc::clone(db));
    let tasks = task_repo.purge_closed_before(cutoff).await?;

    info!(retention_days, runs, steps, tasks, "retention purge completed");
    Ok(())
}
