//! `SQLite` schema definitions and bootstrap logic.
//!
//! Schema is applied idempotently with `IF NOT EXISTS` on every startup.

use crate::Result;

use super::db::Database;

/// Apply all table and index definitions to the connected database.
///
/// # Errors
///
/// Returns `AppError::Db` if any schema statement fails.
pub async fn apply_schema(db: &Database) -> Result<()> {
    let ddl = r"
CREATE TABLE IF NOT EXISTS opportunity_cache (
    order_num          TEXT PRIMARY KEY,
    customer_name      TEXT NOT NULL,
    address            TEXT NOT NULL,
    supervisor_name    TEXT NOT NULL,
    create_time        TEXT NOT NULL,
    org_name           TEXT NOT NULL,
    status             TEXT NOT NULL,
    elapsed_hours      REAL,
    is_overdue         INTEGER NOT NULL DEFAULT 0,
    escalation_level   INTEGER NOT NULL DEFAULT 0,
    sla_threshold_hours REAL,
    sla_progress_ratio REAL NOT NULL DEFAULT 0,
    is_violation       INTEGER NOT NULL DEFAULT 0,
    last_updated       TEXT NOT NULL,
    source_hash        TEXT NOT NULL,
    cache_version      INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS notification_tasks (
    id               TEXT PRIMARY KEY,
    logical_order_id TEXT NOT NULL,
    org_name         TEXT NOT NULL,
    task_type        TEXT NOT NULL,
    status           TEXT NOT NULL,
    due_time         TEXT NOT NULL,
    message          TEXT,
    created_run_id   TEXT,
    sent_run_id      TEXT,
    retry_count      INTEGER NOT NULL DEFAULT 0,
    max_retry_count  INTEGER NOT NULL DEFAULT 5,
    cooldown_hours   REAL NOT NULL DEFAULT 2.0,
    last_sent_at     TEXT,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_tasks_logical_type
    ON notification_tasks (logical_order_id, task_type);
CREATE INDEX IF NOT EXISTS idx_tasks_status
    ON notification_tasks (status);

CREATE TABLE IF NOT EXISTS agent_runs (
    id                      TEXT PRIMARY KEY,
    trigger_time            TEXT NOT NULL,
    end_time                TEXT,
    status                  TEXT NOT NULL,
    context                 TEXT NOT NULL DEFAULT '{}',
    opportunities_processed INTEGER NOT NULL DEFAULT 0,
    notifications_sent      INTEGER NOT NULL DEFAULT 0,
    errors                  TEXT NOT NULL DEFAULT '[]'
);

CREATE TABLE IF NOT EXISTS agent_history (
    id               TEXT PRIMARY KEY,
    run_id           TEXT NOT NULL REFERENCES agent_runs (id),
    step_name        TEXT NOT NULL,
    input_data       TEXT NOT NULL DEFAULT '{}',
    output_data      TEXT NOT NULL DEFAULT '{}',
    timestamp        TEXT NOT NULL,
    duration_seconds REAL NOT NULL DEFAULT 0,
    error_message    TEXT
);
CREATE INDEX IF NOT EXISTS idx_history_run
    ON agent_history (run_id);

CREATE TABLE IF NOT EXISTS group_configs (
    id               TEXT PRIMARY KEY,
    org_name         TEXT NOT NULL UNIQUE,
    name             TEXT NOT NULL,
    webhook_url      TEXT NOT NULL,
    enabled          INTEGER NOT NULL DEFAULT 1,
    cooldown_minutes INTEGER NOT NULL DEFAULT 30,
    max_per_hour     INTEGER NOT NULL DEFAULT 10,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS system_config (
    key         TEXT PRIMARY KEY,
    value       TEXT NOT NULL,
    description TEXT,
    updated_at  TEXT NOT NULL
);
";

    sqlx::raw_sql(ddl).execute(db).await?;
    Ok(())
}
