//! Notification task repository.
//!
//! Enforces the open-task uniqueness invariant: at most one `pending` row
//! per `(logical_order_id, task_type)`. Legacy tier names (`violation`,
//! `standard`) written by earlier releases are rewritten to the canonical
//! pair on read; nothing writes them back.

use std::sync::Arc;

use chrono::NaiveDateTime;

use crate::models::task::{NotificationTask, TaskStatus, TaskType};
use crate::{AppError, Result};

use super::db::{self, Database};

/// Repository wrapper around `SQLite` for notification task records.
#[derive(Clone)]
pub struct TaskRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct TaskRow {
    id: String,
    logical_order_id: String,
    org_name: String,
    task_type: String,
    status: String,
    due_time: String,
    message: Option<String>,
    created_run_id: Option<String>,
    sent_run_id: Option<String>,
    retry_count: i64,
    max_retry_count: i64,
    cooldown_hours: f64,
    last_sent_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TaskRow {
    /// Convert a database row into the domain model.
    fn into_task(self) -> Result<NotificationTask> {
        Ok(NotificationTask {
            task_type: parse_task_type(&self.task_type)?,
            status: parse_task_status(&self.status)?,
            due_time: db::parse_ts(&self.due_time, "due_time")?,
            last_sent_at: db::parse_ts_opt(self.last_sent_at.as_deref(), "last_sent_at")?,
            created_at: db::parse_ts(&self.created_at, "created_at")?,
            updated_at: db::parse_ts(&self.updated_at, "updated_at")?,
            id: self.id,
            logical_order_id: self.logical_order_id,
            org_name: self.org_name,
            created_run_id: self.created_run_id,
            sent_run_id: self.sent_run_id,
            retry_count: u32::try_from(self.retry_count.max(0)).unwrap_or(0),
            max_retry_count: u32::try_from(self.max_retry_count.max(0)).unwrap_or(0),
            cooldown_hours: self.cooldown_hours,
            rendered_message: self.message,
        })
    }
}

/// Parse a stored tier name, migrating legacy values on read.
fn parse_task_type(s: &str) -> Result<TaskType> {
    match s {
        "reminder" | "violation" | "standard" => Ok(TaskType::Reminder),
        "escalation" => Ok(TaskType::Escalation),
        other => Err(AppError::Db(format!("invalid task type: {other}"))),
    }
}

fn task_type_str(t: TaskType) -> &'static str {
    match t {
        TaskType::Reminder => "reminder",
        TaskType::Escalation => "escalation",
    }
}

fn parse_task_status(s: &str) -> Result<TaskStatus> {
    match s {
        "pending" => Ok(TaskStatus::Pending),
        "sent" => Ok(TaskStatus::Sent),
        "failed" => Ok(TaskStatus::Failed),
        "confirmed" => Ok(TaskStatus::Confirmed),
        other => Err(AppError::Db(format!("invalid task status: {other}"))),
    }
}

fn task_status_str(s: TaskStatus) -> &'static str {
    match s {
        TaskStatus::Pending => "pending",
        TaskStatus::Sent => "sent",
        TaskStatus::Failed => "failed",
        TaskStatus::Confirmed => "confirmed",
    }
}

impl TaskRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a new notification task.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Duplicate` if a `pending` task with the same
    /// `(logical_order_id, task_type)` already exists, or `AppError::Db` if
    /// the insert fails.
    pub async fn save(&self, task: &NotificationTask) -> Result<NotificationTask> {
        if task.status == TaskStatus::Pending
            && self
                .has_pending(&task.logical_order_id, task.task_type)
                .await?
        {
            return Err(AppError::Duplicate(format!(
                "pending {} task for {} already exists",
                task_type_str(task.task_type),
                task.logical_order_id
            )));
        }

        sqlx::query(
            "INSERT INTO notification_tasks (id, logical_order_id, org_name, task_type,
             status, due_time, message, created_run_id, sent_run_id, retry_count,
             max_retry_count, cooldown_hours, last_sent_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        )
        .bind(&task.id)
        .bind(&task.logical_order_id)
        .bind(&task.org_name)
        .bind(task_type_str(task.task_type))
        .bind(task_status_str(task.status))
        .bind(db::fmt_ts(task.due_time))
        .bind(&task.rendered_message)
        .bind(&task.created_run_id)
        .bind(&task.sent_run_id)
        .bind(i64::from(task.retry_count))
        .bind(i64::from(task.max_retry_count))
        .bind(task.cooldown_hours)
        .bind(task.last_sent_at.map(db::fmt_ts))
        .bind(db::fmt_ts(task.created_at))
        .bind(db::fmt_ts(task.updated_at))
        .execute(self.db.as_ref())
        .await?;

        Ok(task.clone())
    }

    /// Retrieve a task by its ID.
    ///
    /// Returns `Ok(None)` if the task does not exist.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<NotificationTask>> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM notification_tasks WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.db.as_ref())
            .await?;
        row.map(TaskRow::into_task).transpose()
    }

    /// All tasks currently in `pending` status, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn find_pending(&self) -> Result<Vec<NotificationTask>> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            "SELECT * FROM notification_tasks WHERE status = 'pending' ORDER BY created_at ASC",
        )
        .fetch_all(self.db.as_ref())
        .await?;
        rows.into_iter().map(TaskRow::into_task).collect()
    }

    /// All tasks for a logical key, newest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn find_by_logical_id_and_type(
        &self,
        logical_order_id: &str,
        task_type: TaskType,
    ) -> Result<Vec<NotificationTask>> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            "SELECT * FROM notification_tasks \
             WHERE logical_order_id = ?1 \
               AND (task_type = ?2 OR (?2 = 'reminder' AND task_type IN ('violation', 'standard'))) \
             ORDER BY created_at DESC",
        )
        .bind(logical_order_id)
        .bind(task_type_str(task_type))
        .fetch_all(self.db.as_ref())
        .await?;
        rows.into_iter().map(TaskRow::into_task).collect()
    }

    /// The most recent task row for a logical key, if any.
    ///
    /// Cooldown checks at plan time use this row regardless of its status.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn latest_for_key(
        &self,
        logical_order_id: &str,
        task_type: TaskType,
    ) -> Result<Option<NotificationTask>> {
        Ok(self
            .find_by_logical_id_and_type(logical_order_id, task_type)
            .await?
            .into_iter()
            .next())
    }

    /// Whether a `pending` task exists for the logical key.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn has_pending(&self, logical_order_id: &str, task_type: TaskType) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notification_tasks \
             WHERE logical_order_id = ?1 AND status = 'pending' \
               AND (task_type = ?2 OR (?2 = 'reminder' AND task_type IN ('violation', 'standard')))",
        )
        .bind(logical_order_id)
        .bind(task_type_str(task_type))
        .fetch_one(self.db.as_ref())
        .await?;
        Ok(count > 0)
    }

    /// Open (`pending`) escalation tasks for an organization, regardless of
    /// logical key shape. Used by the plan phase to retire legacy rows.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn find_open_escalations_for_org(
        &self,
        org_name: &str,
    ) -> Result<Vec<NotificationTask>> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            "SELECT * FROM notification_tasks \
             WHERE org_name = ?1 AND task_type = 'escalation' AND status = 'pending' \
             ORDER BY created_at ASC",
        )
        .bind(org_name)
        .fetch_all(self.db.as_ref())
        .await?;
        rows.into_iter().map(TaskRow::into_task).collect()
    }

    /// Open (`pending`) reminder tasks for an organization.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn find_open_reminders_for_org(
        &self,
        org_name: &str,
    ) -> Result<Vec<NotificationTask>> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            "SELECT * FROM notification_tasks \
             WHERE org_name = ?1 AND status = 'pending' \
               AND task_type IN ('reminder', 'violation', 'standard') \
             ORDER BY created_at ASC",
        )
        .bind(org_name)
        .fetch_all(self.db.as_ref())
        .await?;
        rows.into_iter().map(TaskRow::into_task).collect()
    }

    /// Update the status of a task, optionally recording the sending run.
    ///
    /// A `pending → failed` transition increments `retry_count` atomically.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn update_status(
        &self,
        id: &str,
        status: TaskStatus,
        sent_run_id: Option<&str>,
        now: NaiveDateTime,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE notification_tasks \
             SET status = ?1, \
                 sent_run_id = COALESCE(?2, sent_run_id), \
                 retry_count = CASE \
                     WHEN ?1 = 'failed' AND status = 'pending' THEN retry_count + 1 \
                     ELSE retry_count END, \
                 updated_at = ?3 \
             WHERE id = ?4",
        )
        .bind(task_status_str(status))
        .bind(sent_run_id)
        .bind(db::fmt_ts(now))
        .bind(id)
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    /// Store the rendered message on a task if none is stored yet.
    ///
    /// A message already present is never overwritten.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn update_message(&self, id: &str, rendered: &str, now: NaiveDateTime) -> Result<()> {
        sqlx::query(
            "UPDATE notification_tasks SET message = ?1, updated_at = ?2 \
             WHERE id = ?3 AND message IS NULL",
        )
        .bind(rendered)
        .bind(db::fmt_ts(now))
        .bind(id)
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    /// Record the timestamp of a successful send.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn update_last_sent(&self, id: &str, at: NaiveDateTime) -> Result<()> {
        sqlx::query(
            "UPDATE notification_tasks SET last_sent_at = ?1, updated_at = ?1 WHERE id = ?2",
        )
        .bind(db::fmt_ts(at))
        .bind(id)
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    /// Delete closed tasks last touched before the cutoff.
    ///
    /// `pending` rows are never purged.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn purge_closed_before(&self, cutoff: NaiveDateTime) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM notification_tasks \
             WHERE status != 'pending' AND updated_at < ?1",
        )
        .bind(db::fmt_ts(cutoff))
        .execute(self.db.as_ref())
        .await?;
        Ok(result.rows_affected())
    }
}
