//! Analytics source seam: the raw row shape, the fetcher trait, and the
//! mapping from raw rows to domain opportunities.

pub mod analytics;

use std::future::Future;
use std::pin::Pin;

use chrono::NaiveDateTime;
use serde::Deserialize;
use tracing::warn;

use crate::models::opportunity::{Opportunity, OpportunityStatus};
use crate::Result;

/// One raw opportunity row as returned by the analytics source.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RawOpportunity {
    /// Unique order number; rows with an empty value are dropped.
    pub order_num: String,
    /// Customer display name.
    pub name: String,
    /// Service address.
    #[serde(default)]
    pub address: String,
    /// Responsible supervisor.
    #[serde(default)]
    pub supervisor_name: String,
    /// Owning organization.
    pub org_name: String,
    /// ISO-8601 creation timestamp; rows without one are skipped.
    pub create_time: Option<String>,
    /// Raw status string; unknown values are kept but never scheduled.
    pub order_status: String,
}

/// Read-only source of opportunity rows.
///
/// The production implementation queries the analytics service over HTTP;
/// tests substitute a programmable fake.
pub trait OpportunityFetcher: Send + Sync {
    /// Fetch the current set of open opportunity rows.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Fetch`](crate::AppError::Fetch) when the source
    /// is unreachable or returns an unusable payload.
    fn fetch(&self) -> Pin<Box<dyn Future<Output = Result<Vec<RawOpportunity>>> + Send + '_>>;
}

/// Map raw rows into unclassified domain opportunities.
///
/// Rows with an empty order number or a missing/unparsable creation time
/// are skipped with a warning; unknown statuses are carried through as
/// unmonitored.
#[must_use]
pub fn map_raw(rows: Vec<RawOpportunity>) -> Vec<Opportunity> {
    let mut opportunities = Vec::with_capacity(rows.len());
    for row in rows {
        if row.order_num.is_empty() {
            warn!("skipping opportunity row with empty order number");
            continue;
        }
        let Some(raw_time) = row.create_time.as_deref() else {
            warn!(order_num = %row.order_num, "skipping opportunity without create time");
            continue;
        };
        let Some(create_time) = parse_create_time(raw_time) else {
            warn!(
                order_num = %row.order_num,
                raw = raw_time,
                "skipping opportunity with unparsable create time"
            );
            continue;
        };
        opportunities.push(Opportunity::new(
            row.order_num,
            row.name,
            row.address,
            row.supervisor_name,
            row.org_name,
            create_time,
            OpportunityStatus::parse(&row.order_status),
        ));
    }
    opportunities
}

/// Parse an ISO-8601 timestamp, with or without an offset, into naive
/// local time.
fn parse_create_time(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(with_offset) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Some(with_offset.naive_local());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive);
        }
    }
    None
}
