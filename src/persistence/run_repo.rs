//! Agent run and run-step repository.

use std::sync::Arc;

use chrono::NaiveDateTime;

use crate::models::run::{AgentRun, RunStatus, RunStep};
use crate::{AppError, Result};

use super::db::{self, Database};

/// Repository wrapper around `SQLite` for run and step records.
#[derive(Clone)]
pub struct RunRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct RunRow {
    id: String,
    trigger_time: String,
    end_time: Option<String>,
    status: String,
    context: String,
    opportunities_processed: i64,
    notifications_sent: i64,
    errors: String,
}

impl RunRow {
    /// Convert a database row into the domain model.
    fn into_run(self) -> Result<AgentRun> {
        let context = serde_json::from_str(&self.context)
            .map_err(|e| AppError::Db(format!("invalid run context: {e}")))?;
        let errors = serde_json::from_str(&self.errors)
            .map_err(|e| AppError::Db(format!("invalid run errors: {e}")))?;
        Ok(AgentRun {
            trigger_time: db::parse_ts(&self.trigger_time, "trigger_time")?,
            end_time: db::parse_ts_opt(self.end_time.as_deref(), "end_time")?,
            status: parse_run_status(&self.status)?,
            opportunities_processed: u32::try_from(self.opportunities_processed.max(0))
                .unwrap_or(0),
            notifications_sent: u32::try_from(self.notifications_sent.max(0)).unwrap_or(0),
            id: self.id,
            context,
            errors,
        })
    }
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct StepRow {
    id: String,
    run_id: String,
    step_name: String,
    input_data: String,
    output_data: String,
    timestamp: String,
    duration_seconds: f64,
    error_message: Option<String>,
}

impl StepRow {
    /// Convert a database row into the domain model.
    fn into_step(self) -> Result<RunStep> {
        let input_summary = serde_json::from_str(&self.input_data)
            .map_err(|e| AppError::Db(format!("invalid step input: {e}")))?;
        let output_summary = serde_json::from_str(&self.output_data)
            .map_err(|e| AppError::Db(format!("invalid step output: {e}")))?;
        Ok(RunStep {
            timestamp: db::parse_ts(&self.timestamp, "timestamp")?,
            id: self.id,
            run_id: self.run_id,
            step_name: self.step_name,
            input_summary,
            output_summary,
            duration_seconds: self.duration_seconds,
            error_message: self.error_message,
        })
    }
}

fn parse_run_status(s: &str) -> Result<RunStatus> {
    match s {
        "running" => Ok(RunStatus::Running),
        "completed" => Ok(RunStatus::Completed),
        "failed" => Ok(RunStatus::Failed),
        other => Err(AppError::Db(format!("invalid run status: {other}"))),
    }
}

fn run_status_str(s: RunStatus) -> &'static str {
    match s {
        RunStatus::Running => "running",
        RunStatus::Completed => "completed",
        RunStatus::Failed => "failed",
    }
}

impl RunRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a new run record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails.
    pub async fn create(&self, run: &AgentRun) -> Result<AgentRun> {
        let context = serde_json::to_string(&run.context)
            .map_err(|e| AppError::Db(format!("serialize run context: {e}")))?;
        let errors = serde_json::to_string(&run.errors)
            .map_err(|e| AppError::Db(format!("serialize run errors: {e}")))?;

        sqlx::query(
            "INSERT INTO agent_runs (id, trigger_time, end_time, status, context,
             opportunities_processed, notifications_sent, errors)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(&run.id)
        .bind(db::fmt_ts(run.trigger_time))
        .bind(run.end_time.map(db::fmt_ts))
        .bind(run_status_str(run.status))
        .bind(&context)
        .bind(i64::from(run.opportunities_processed))
        .bind(i64::from(run.notifications_sent))
        .bind(&errors)
        .execute(self.db.as_ref())
        .await?;

        Ok(run.clone())
    }

    /// Close a run with its final status, counters, and error list.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    #[allow(clippy::too_many_arguments)]
    pub async fn finish(
        &self,
        id: &str,
        status: RunStatus,
        end_time: NaiveDateTime,
        opportunities_processed: u32,
        notifications_sent: u32,
        context: &serde_json::Value,
        errors: &[String],
    ) -> Result<()> {
        let context = serde_json::to_string(context)
            .map_err(|e| AppError::Db(format!("serialize run context: {e}")))?;
        let errors = serde_json::to_string(errors)
            .map_err(|e| AppError::Db(format!("serialize run errors: {e}")))?;

        sqlx::query(
            "UPDATE agent_runs SET status = ?1, end_time = ?2, \
             opportunities_processed = ?3, notifications_sent = ?4, \
             context = ?5, errors = ?6 WHERE id = ?7",
        )
        .bind(run_status_str(status))
        .bind(db::fmt_ts(end_time))
        .bind(i64::from(opportunities_processed))
        .bind(i64::from(notifications_sent))
        .bind(&context)
        .bind(&errors)
        .bind(id)
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    /// Retrieve a run by its ID.
    ///
    /// Returns `Ok(None)` if the run does not exist.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<AgentRun>> {
        let row: Option<RunRow> = sqlx::query_as("SELECT * FROM agent_runs WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.db.as_ref())
            .await?;
        row.map(RunRow::into_run).transpose()
    }

    /// Most recent runs, newest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_recent(&self, limit: u32) -> Result<Vec<AgentRun>> {
        let rows: Vec<RunRow> =
            sqlx::query_as("SELECT * FROM agent_runs ORDER BY trigger_time DESC LIMIT ?1")
                .bind(i64::from(limit))
                .fetch_all(self.db.as_ref())
                .await?;
        rows.into_iter().map(RunRow::into_run).collect()
    }

    /// Insert a step record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails.
    pub async fn insert_step(&self, step: &RunStep) -> Result<()> {
        let input = serde_json::to_string(&step.input_summary)
            .map_err(|e| AppError::Db(format!("serialize step input: {e}")))?;
        let output = serde_json::to_string(&step.output_summary)
            .map_err(|e| AppError::Db(format!("serialize step output: {e}")))?;

        sqlx::query(
            "INSERT INTO agent_history (id, run_id, step_name, input_data, output_data,
             timestamp, duration_seconds, error_message)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(&step.id)
        .bind(&step.run_id)
        .bind(&step.step_name)
        .bind(&input)
        .bind(&output)
        .bind(db::fmt_ts(step.timestamp))
        .bind(step.duration_seconds)
        .bind(&step.error_message)
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    /// All steps of a run in execution order.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_steps(&self, run_id: &str) -> Result<Vec<RunStep>> {
        let rows: Vec<StepRow> = sqlx::query_as(
            "SELECT * FROM agent_history WHERE run_id = ?1 ORDER BY timestamp ASC, rowid ASC",
        )
        .bind(run_id)
        .fetch_all(self.db.as_ref())
        .await?;
        rows.into_iter().map(StepRow::into_step).collect()
    }

    /// Delete finished runs triggered before the cutoff, steps first.
    ///
    /// Returns `(runs, steps)` deleted counts.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn purge_finished_before(&self, cutoff: NaiveDateTime) -> Result<(u64, u64)> {
        let cutoff_str = db::fmt_ts(cutoff);

        let steps = sqlx::query(
            "DELETE FROM agent_history WHERE run_id IN \
             (SELECT id FROM agent_runs \
              WHERE status != 'running' AND trigger_time < ?1)",
        )
        .bind(&cutoff_str)
        .execute(self.db.as_ref())
        .await?
        .rows_affected();

        let runs = sqlx::query(
            "DELETE FROM agent_runs WHERE status != 'running' AND trigger_time < ?1",
        )
        .bind(&cutoff_str)
        .execute(self.db.as_ref())
        .await?
        .rows_affected();

        Ok((runs, steps))
    }
}
