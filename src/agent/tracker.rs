//! Run tracker: opens and closes the per-tick audit record and persists a
//! step row for every orchestrator step, on success and failure alike.

use std::future::Future;
use std::time::Instant;

use chrono::NaiveDateTime;
use serde_json::{json, Value};
use tracing::error;

use crate::models::now_local;
use crate::models::run::{AgentRun, RunStatus, RunStep};
use crate::persistence::run_repo::RunRepo;
use crate::Result;

/// Owns the durable run and step records of a tick.
#[derive(Clone)]
pub struct RunTracker {
    runs: RunRepo,
}

impl RunTracker {
    /// Create a tracker over the run repository.
    #[must_use]
    pub fn new(runs: RunRepo) -> Self {
        Self { runs }
    }

    /// Open a new running record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails.
    pub async fn start_run(&self, context: Value, now: NaiveDateTime) -> Result<AgentRun> {
        let run = AgentRun::start(now, context);
        self.runs.create(&run).await
    }

    /// Close a run with its final status, counters, and error list.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    #[allow(clippy::too_many_arguments)]
    pub async fn finish_run(
        &self,
        run_id: &str,
        status: RunStatus,
        end_time: NaiveDateTime,
        opportunities_processed: u32,
        notifications_sent: u32,
        context: &Value,
        errors: &[String],
    ) -> Result<()> {
        self.runs
            .finish(
                run_id,
                status,
                end_time,
                opportunities_processed,
                notifications_sent,
                context,
                errors,
            )
            .await
    }

    /// Re-read a run record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails or `AppError::NotFound` if
    /// the run does not exist.
    pub async fn get_run(&self, run_id: &str) -> Result<AgentRun> {
        self.runs
            .get_by_id(run_id)
            .await?
            .ok_or_else(|| crate::AppError::NotFound(format!("run {run_id} not found")))
    }

    /// Run one step future and persist its step row on every exit path.
    ///
    /// The row records the step's start time, duration, output summary, and
    /// the error message when the step failed. A failure to persist the row
    /// itself is logged and never masks the step result.
    ///
    /// # Errors
    ///
    /// Propagates the step's own error unchanged.
    pub async fn track_step<T, Fut>(
        &self,
        run_id: &str,
        step_name: &str,
        input_summary: Value,
        fut: Fut,
    ) -> Result<T>
    where
        Fut: Future<Output = Result<(T, Value)>>,
    {
        let started_at = now_local();
        let started = Instant::now();
        let result = fut.await;
        let duration_seconds = started.elapsed().as_secs_f64();

        let (output_summary, error_message) = match &result {
            Ok((_, output)) => (output.clone(), None),
            Err(err) => (json!({}), Some(err.to_string())),
        };

        let step = RunStep::new(
            run_id,
            step_name,
            input_summary,
            output_summary,
            started_at,
            duration_seconds,
            error_message,
        );
        if let Err(err) = self.runs.insert_step(&step).await {
            error!(run_id, step_name, %err, "failed to persist step record");
        }

        result.map(|(value, _)| value)
    }
}
