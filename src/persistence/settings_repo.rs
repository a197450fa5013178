//! Runtime key/value settings repository backed by `system_config`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDateTime;

use crate::Result;

use super::db::{self, Database};

/// Repository wrapper around `SQLite` for runtime settings.
#[derive(Clone)]
pub struct SettingsRepo {
    db: Arc<Database>,
}

impl SettingsRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Snapshot every key/value pair.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get_all(&self) -> Result<HashMap<String, String>> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT key, value FROM system_config")
                .fetch_all(self.db.as_ref())
                .await?;
        Ok(rows.into_iter().collect())
    }

    /// One value by key.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM system_config WHERE key = ?1")
                .bind(key)
                .fetch_optional(self.db.as_ref())
                .await?;
        Ok(value)
    }

    /// Insert or replace one key/value pair.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the upsert fails.
    pub async fn set(
        &self,
        key: &str,
        value: &str,
        description: Option<&str>,
        now: NaiveDateTime,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO system_config (key, value, description, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (key) DO UPDATE SET
                 value = excluded.value,
                 description = COALESCE(excluded.description, description),
                 updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(description)
        .bind(db::fmt_ts(now))
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }
}
