//! Opportunity cache repository.
//!
//! The cache is disposable: every successful fetch rebuilds it whole inside
//! a single transaction, and its authority ends at the next successful
//! fetch. Only monitored opportunities are cached.

use std::sync::Arc;

use chrono::NaiveDateTime;

use crate::models::opportunity::{Opportunity, OpportunityStatus};
use crate::Result;

use super::db::{self, Database};

/// Repository wrapper around `SQLite` for the opportunity cache.
#[derive(Clone)]
pub struct CacheRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct CacheRow {
    order_num: String,
    customer_name: String,
    address: String,
    supervisor_name: String,
    create_time: String,
    org_name: String,
    status: String,
    elapsed_hours: Option<f64>,
    is_overdue: i64,
    escalation_level: i64,
    sla_threshold_hours: Option<f64>,
    sla_progress_ratio: f64,
    is_violation: i64,
    source_hash: String,
}

impl CacheRow {
    /// Convert a cached row back into the domain model.
    ///
    /// `overdue_hours` and the approaching flag are recomputed from the
    /// stored elapsed value and threshold rather than stored redundantly.
    fn into_opportunity(self) -> Result<Opportunity> {
        let escalation_due = self.is_violation != 0;
        let overdue_hours = match (self.elapsed_hours, self.sla_threshold_hours) {
            (Some(elapsed), Some(threshold)) if escalation_due => (elapsed - threshold).max(0.0),
            _ => 0.0,
        };
        Ok(Opportunity {
            create_time: db::parse_ts(&self.create_time, "create_time")?,
            status: OpportunityStatus::parse(&self.status),
            elapsed_hours: self.elapsed_hours,
            reminder_due: self.is_overdue != 0,
            escalation_due,
            approaching_escalation: !escalation_due && self.sla_progress_ratio >= 0.8,
            overdue_hours,
            escalation_level: u8::from(self.escalation_level != 0),
            progress_ratio: self.sla_progress_ratio,
            sla_threshold_hours: self.sla_threshold_hours,
            order_num: self.order_num,
            customer_name: self.customer_name,
            address: self.address,
            supervisor_name: self.supervisor_name,
            org_name: self.org_name,
            source_hash: self.source_hash,
        })
    }
}

impl CacheRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Replace the entire cache with the monitored subset of the given
    /// working set, in one transaction.
    ///
    /// Readers never observe a partial refresh. Returns `(deleted,
    /// inserted)` row counts.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the transaction fails; the previous cache
    /// contents remain intact in that case.
    pub async fn full_refresh(
        &self,
        opportunities: &[Opportunity],
        now: NaiveDateTime,
    ) -> Result<(u64, u64)> {
        let cache_version = now.and_utc().timestamp();
        let mut tx = self.db.begin().await?;

        let deleted = sqlx::query("DELETE FROM opportunity_cache")
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let mut inserted = 0u64;
        for opp in opportunities.iter().filter(|o| o.is_monitored()) {
            sqlx::query(
                "INSERT INTO opportunity_cache (order_num, customer_name, address,
                 supervisor_name, create_time, org_name, status, elapsed_hours,
                 is_overdue, escalation_level, sla_threshold_hours, sla_progress_ratio,
                 is_violation, last_updated, source_hash, cache_version)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            )
            .bind(&opp.order_num)
            .bind(&opp.customer_name)
            .bind(&opp.address)
            .bind(&opp.supervisor_name)
            .bind(db::fmt_ts(opp.create_time))
            .bind(&opp.org_name)
            .bind(opp.status.as_str())
            .bind(opp.elapsed_hours)
            .bind(i64::from(opp.reminder_due))
            .bind(i64::from(opp.escalation_level))
            .bind(opp.sla_threshold_hours)
            .bind(opp.progress_ratio)
            .bind(i64::from(opp.escalation_due))
            .bind(db::fmt_ts(now))
            .bind(&opp.source_hash)
            .bind(cache_version)
            .execute(&mut *tx)
            .await?;
            inserted += 1;
        }

        tx.commit().await?;
        Ok((deleted, inserted))
    }

    /// All cached opportunities, expired entries included.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_all(&self) -> Result<Vec<Opportunity>> {
        let rows: Vec<CacheRow> =
            sqlx::query_as("SELECT * FROM opportunity_cache ORDER BY order_num ASC")
                .fetch_all(self.db.as_ref())
                .await?;
        rows.into_iter().map(CacheRow::into_opportunity).collect()
    }

    /// One cached opportunity by order number.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get(&self, order_num: &str) -> Result<Option<Opportunity>> {
        let row: Option<CacheRow> =
            sqlx::query_as("SELECT * FROM opportunity_cache WHERE order_num = ?1")
                .bind(order_num)
                .fetch_optional(self.db.as_ref())
                .await?;
        row.map(CacheRow::into_opportunity).transpose()
    }

    /// Number of cached rows.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM opportunity_cache")
            .fetch_one(self.db.as_ref())
            .await?;
        Ok(count)
    }

    /// Timestamp of the most recent refresh, if any rows exist.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn last_refresh(&self) -> Result<Option<NaiveDateTime>> {
        let raw: Option<String> = sqlx::query_scalar("SELECT MAX(last_updated) FROM opportunity_cache")
            .fetch_one(self.db.as_ref())
            .await?;
        db::parse_ts_opt(raw.as_deref(), "last_updated")
    }

    /// Delete every cached row.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn clear(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM opportunity_cache")
            .execute(self.db.as_ref())
            .await?;
        Ok(result.rows_affected())
    }
}
