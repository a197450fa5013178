//! `SQLite` connection pool and schema bootstrap.

use std::str::FromStr;

use chrono::NaiveDateTime;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::{AppError, Result};

use super::schema;

/// Alias for the shared `SQLite` pool.
pub type Database = SqlitePool;

/// Timestamp column format; naive local time, microsecond precision.
const TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Connect to a file-backed database, creating it if missing, and apply
/// the schema.
///
/// # Errors
///
/// Returns `AppError::Db` if the connection or schema application fails.
pub async fn connect(path: &str) -> Result<Database> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite://{path}"))
        .map_err(|err| AppError::Db(format!("invalid database path: {err}")))?
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;
    schema::apply_schema(&pool).await?;
    Ok(pool)
}

/// Connect to a private in-memory database for tests.
///
/// The pool is capped at a single connection; a second connection would
/// open a separate empty in-memory database.
///
/// # Errors
///
/// Returns `AppError::Db` if the connection or schema application fails.
pub async fn connect_memory() -> Result<Database> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    schema::apply_schema(&pool).await?;
    Ok(pool)
}

/// Format a timestamp for storage in a TEXT column.
#[must_use]
pub fn fmt_ts(ts: NaiveDateTime) -> String {
    ts.format(TS_FORMAT).to_string()
}

/// Parse a timestamp from a TEXT column.
///
/// # Errors
///
/// Returns `AppError::Db` naming the column when the value is malformed.
pub fn parse_ts(raw: &str, column: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, TS_FORMAT)
        .map_err(|err| AppError::Db(format!("invalid {column}: {err}")))
}

/// Parse an optional timestamp from a nullable TEXT column.
///
/// # Errors
///
/// Returns `AppError::Db` naming the column when the value is malformed.
pub fn parse_ts_opt(raw: Option<&str>, column: &str) -> Result<Option<NaiveDateTime>> {
    raw.map(|value| parse_ts(value, column)).transpose()
}
