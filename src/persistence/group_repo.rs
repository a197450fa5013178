//! Group routing configuration repository.

use std::sync::Arc;

use crate::models::group::GroupConfig;
use crate::Result;

use super::db::{self, Database};

/// Repository wrapper around `SQLite` for group routing entries.
#[derive(Clone)]
pub struct GroupRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct GroupRow {
    id: String,
    org_name: String,
    name: String,
    webhook_url: String,
    enabled: i64,
    cooldown_minutes: i64,
    max_per_hour: i64,
    created_at: String,
    updated_at: String,
}

impl GroupRow {
    /// Convert a database row into the domain model.
    fn into_group(self) -> Result<GroupConfig> {
        Ok(GroupConfig {
            created_at: db::parse_ts(&self.created_at, "created_at")?,
            updated_at: db::parse_ts(&self.updated_at, "updated_at")?,
            id: self.id,
            org_name: self.org_name,
            name: self.name,
            webhook_url: self.webhook_url,
            enabled: self.enabled != 0,
            cooldown_minutes: u32::try_from(self.cooldown_minutes.max(0)).unwrap_or(0),
            max_per_hour: u32::try_from(self.max_per_hour.max(0)).unwrap_or(0),
        })
    }
}

impl GroupRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert or replace the entry for the group's organization.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the upsert fails.
    pub async fn upsert(&self, group: &GroupConfig) -> Result<()> {
        sqlx::query(
            "INSERT INTO group_configs (id, org_name, name, webhook_url, enabled,
             cooldown_minutes, max_per_hour, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT (org_name) DO UPDATE SET
                 name = excluded.name,
                 webhook_url = excluded.webhook_url,
                 enabled = excluded.enabled,
                 cooldown_minutes = excluded.cooldown_minutes,
                 max_per_hour = excluded.max_per_hour,
                 updated_at = excluded.updated_at",
        )
        .bind(&group.id)
        .bind(&group.org_name)
        .bind(&group.name)
        .bind(&group.webhook_url)
        .bind(i64::from(group.enabled))
        .bind(i64::from(group.cooldown_minutes))
        .bind(i64::from(group.max_per_hour))
        .bind(db::fmt_ts(group.created_at))
        .bind(db::fmt_ts(group.updated_at))
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    /// Entry for one organization, if configured.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get_by_org(&self, org_name: &str) -> Result<Option<GroupConfig>> {
        let row: Option<GroupRow> =
            sqlx::query_as("SELECT * FROM group_configs WHERE org_name = ?1")
                .bind(org_name)
                .fetch_optional(self.db.as_ref())
                .await?;
        row.map(GroupRow::into_group).transpose()
    }

    /// All enabled entries with a non-empty webhook.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_enabled(&self) -> Result<Vec<GroupConfig>> {
        let rows: Vec<GroupRow> = sqlx::query_as(
            "SELECT * FROM group_configs \
             WHERE enabled = 1 AND webhook_url != '' ORDER BY org_name ASC",
        )
        .fetch_all(self.db.as_ref())
        .await?;
        rows.into_iter().map(GroupRow::into_group).collect()
    }

    /// All entries, enabled or not.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_all(&self) -> Result<Vec<GroupConfig>> {
        let rows: Vec<GroupRow> =
            sqlx::query_as("SELECT * FROM group_configs ORDER BY org_name ASC")
                .fetch_all(self.db.as_ref())
                .await?;
        rows.into_iter().map(GroupRow::into_group).collect()
    }
}
