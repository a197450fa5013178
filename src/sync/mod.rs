//! Data-sync strategy: deliver the freshest possible opportunity set and
//! keep a disposable cache for fallback.
//!
//! Every call attempts a fresh fetch. Success rebuilds the cache whole in
//! one transaction; failure falls back to whatever the cache holds, expired
//! entries included, and only propagates an error when the cache is empty
//! too.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{info, warn};

use crate::models::opportunity::Opportunity;
use crate::persistence::cache_repo::CacheRepo;
use crate::sla::SlaClassifier;
use crate::source::{self, OpportunityFetcher};
use crate::Result;

/// Result of one working-set acquisition.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// Classified working set for this tick.
    pub opportunities: Vec<Opportunity>,
    /// Whether the set came from the fallback cache.
    pub from_cache: bool,
    /// The swallowed fetch error, when the cache was used.
    pub fetch_error: Option<String>,
}

/// Operator-facing cache/source consistency report.
#[derive(Debug, Clone, Serialize)]
pub struct ConsistencyReport {
    /// Rows currently cached.
    pub cached_count: usize,
    /// Rows the source returned just now.
    pub fresh_count: usize,
    /// Whether the two counts agree.
    pub consistent: bool,
    /// When the check ran.
    pub checked_at: NaiveDateTime,
}

/// Operator-facing cache statistics.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatistics {
    /// Rows currently cached.
    pub total_cached: i64,
    /// Distinct organizations among cached rows.
    pub organizations: usize,
    /// Timestamp of the most recent refresh.
    pub last_refresh: Option<NaiveDateTime>,
}

/// Per-organization working-set counts.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OrgCounts {
    /// Opportunities owned by the organization.
    pub total: usize,
    /// Past the reminder threshold.
    pub reminder_due: usize,
    /// Past the escalation threshold.
    pub escalation_due: usize,
    /// Approaching the escalation threshold.
    pub approaching: usize,
}

/// Fetch-with-fallback strategy over the analytics source and the cache.
pub struct DataSyncStrategy {
    fetcher: Arc<dyn OpportunityFetcher>,
    cache: CacheRepo,
}

impl DataSyncStrategy {
    /// Create a strategy over a fetcher and the cache repository.
    #[must_use]
    pub fn new(fetcher: Arc<dyn OpportunityFetcher>, cache: CacheRepo) -> Self {
        Self { fetcher, cache }
    }

    /// Acquire the working set for a tick.
    ///
    /// Always attempts a fresh fetch; `force_refresh` is accepted for caller
    /// clarity but both paths fetch. The returned set is classified against
    /// `now`, including entries served from the fallback cache.
    ///
    /// # Errors
    ///
    /// Returns the fetch error only when the source failed *and* the cache
    /// is empty.
    pub async fn get_opportunities(
        &self,
        classifier: &SlaClassifier,
        now: NaiveDateTime,
        force_refresh: bool,
    ) -> Result<FetchOutcome> {
        let _ = force_refresh;
        match self.fetch_fresh(classifier, now).await {
            Ok(opportunities) => Ok(FetchOutcome {
                opportunities,
                from_cache: false,
                fetch_error: None,
            }),
            Err(err) => {
                let message = err.to_string();
                warn!(error = %message, "fresh fetch failed, falling back to cache");
                let mut cached = self.cache.list_all().await?;
                if cached.is_empty() {
                    return Err(err);
                }
                classifier.assess_all(&mut cached, now);
                Ok(FetchOutcome {
                    opportunities: cached,
                    from_cache: true,
                    fetch_error: Some(message),
                })
            }
        }
    }

    /// Fetch fresh rows, classify them, and rebuild the cache.
    async fn fetch_fresh(
        &self,
        classifier: &SlaClassifier,
        now: NaiveDateTime,
    ) -> Result<Vec<Opportunity>> {
        let rows = self.fetcher.fetch().await?;
        let mut opportunities = source::map_raw(rows);
        classifier.assess_all(&mut opportunities, now);

        match self.cache.full_refresh(&opportunities, now).await {
            Ok((deleted, inserted)) => {
                info!(deleted, inserted, "opportunity cache refreshed");
            }
            Err(err) => {
                // A cache write failure must not cost the tick its fresh data.
                warn!(%err, "cache refresh failed, continuing with fresh data");
            }
        }

        Ok(opportunities)
    }

    /// Manually rebuild the cache from a fresh fetch.
    ///
    /// Returns `(deleted, inserted)` row counts.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Fetch` if the source fails or `AppError::Db` if
    /// the rebuild fails.
    pub async fn refresh_cache(
        &self,
        classifier: &SlaClassifier,
        now: NaiveDateTime,
    ) -> Result<(u64, u64)> {
        let rows = self.fetcher.fetch().await?;
        let mut opportunities = source::map_raw(rows);
        classifier.assess_all(&mut opportunities, now);
        self.cache.full_refresh(&opportunities, now).await
    }

    /// Compare cached and fresh row counts for operators.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Fetch` if the source fails or `AppError::Db` if
    /// the cache read fails.
    pub async fn validate_consistency(&self, now: NaiveDateTime) -> Result<ConsistencyReport> {
        let cached = self.cache.list_all().await?;
        let fresh = source::map_raw(self.fetcher.fetch().await?);
        let fresh_monitored = fresh.iter().filter(|o| o.is_monitored()).count();
        Ok(ConsistencyReport {
            cached_count: cached.len(),
            fresh_count: fresh_monitored,
            consistent: cached.len() == fresh_monitored,
            checked_at: now,
        })
    }

    /// Cache size and freshness for operators.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the cache read fails.
    pub async fn cache_statistics(&self) -> Result<CacheStatistics> {
        let cached = self.cache.list_all().await?;
        let organizations = cached
            .iter()
            .map(|o| o.org_name.as_str())
            .collect::<std::collections::BTreeSet<_>>()
            .len();
        Ok(CacheStatistics {
            total_cached: cached.len() as i64,
            organizations,
            last_refresh: self.cache.last_refresh().await?,
        })
    }

    /// Drop every cached row.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn clear_cache(&self) -> Result<u64> {
        self.cache.clear().await
    }
}

/// Per-organization breakdown of a classified working set.
#[must_use]
pub fn org_breakdown(opportunities: &[Opportunity]) -> BTreeMap<String, OrgCounts> {
    let mut breakdown: BTreeMap<String, OrgCounts> = BTreeMap::new();
    for opp in opportunities {
        let counts = breakdown.entry(opp.org_name.clone()).or_default();
        counts.total += 1;
        if opp.reminder_due {
            counts.reminder_due += 1;
        }
        if opp.escalation_due {
            counts.escalation_due += 1;
        }
        if opp.approaching_escalation {
            counts.approaching += 1;
        }
    }
    breakdown
}
