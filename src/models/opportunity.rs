//! Opportunity model: one open service work-order row from the analytics
//! source, with SLA-derived fields filled by the classifier.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Work-order status as reported by the analytics source.
///
/// Only the first two variants are monitored for SLA purposes; any other
/// value is carried through verbatim so it still contributes to counts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(from = "String", into = "String")]
pub enum OpportunityStatus {
    /// Order is waiting for an appointment to be booked.
    PendingAppointment,
    /// Customer asked to postpone the visit.
    TemporarilyNotVisiting,
    /// Any other status; passed through but never scheduled.
    Other(String),
}

impl OpportunityStatus {
    /// Parse the raw status string from the source.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "PendingAppointment" => Self::PendingAppointment,
            "TemporarilyNotVisiting" => Self::TemporarilyNotVisiting,
            other => Self::Other(other.to_owned()),
        }
    }

    /// Whether this status participates in SLA monitoring.
    #[must_use]
    pub fn is_monitored(&self) -> bool {
        matches!(self, Self::PendingAppointment | Self::TemporarilyNotVisiting)
    }

    /// The raw status string as reported by the source.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::PendingAppointment => "PendingAppointment",
            Self::TemporarilyNotVisiting => "TemporarilyNotVisiting",
            Self::Other(raw) => raw,
        }
    }
}

impl From<String> for OpportunityStatus {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<OpportunityStatus> for String {
    fn from(status: OpportunityStatus) -> Self {
        status.as_str().to_owned()
    }
}

impl std::fmt::Display for OpportunityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One service opportunity with its SLA-derived fields.
///
/// The raw shape comes from the analytics source; the derived fields are
/// filled in by the SLA classifier and start out empty. The raw fields are
/// never mutated after construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct Opportunity {
    /// Unique order number, stable across ticks.
    pub order_num: String,
    /// Customer display name.
    pub customer_name: String,
    /// Service address.
    pub address: String,
    /// Responsible supervisor.
    pub supervisor_name: String,
    /// Owning organization; routes reminder notifications.
    pub org_name: String,
    /// Source-of-truth creation timestamp for SLA measurement.
    pub create_time: NaiveDateTime,
    /// Current work-order status.
    pub status: OpportunityStatus,
    /// Elapsed business hours since creation; `None` until classified.
    pub elapsed_hours: Option<f64>,
    /// Elapsed strictly exceeds the reminder threshold.
    pub reminder_due: bool,
    /// Elapsed strictly exceeds the escalation threshold.
    pub escalation_due: bool,
    /// Progress ratio is at least 0.8 but escalation has not fired yet.
    pub approaching_escalation: bool,
    /// Business hours past the escalation threshold, zero if not overdue.
    pub overdue_hours: f64,
    /// 1 when the escalation threshold is breached, otherwise 0.
    pub escalation_level: u8,
    /// Elapsed over escalation threshold, clamped to `[0, 1]`.
    pub progress_ratio: f64,
    /// Escalation threshold applied at classification time, business hours.
    pub sla_threshold_hours: Option<f64>,
    /// Stable hash over the business fields, for cache housekeeping.
    pub source_hash: String,
}

impl Opportunity {
    /// Construct an unclassified opportunity from its business fields.
    #[must_use]
    pub fn new(
        order_num: String,
        customer_name: String,
        address: String,
        supervisor_name: String,
        org_name: String,
        create_time: NaiveDateTime,
        status: OpportunityStatus,
    ) -> Self {
        let source_hash = compute_source_hash(
            &order_num,
            &customer_name,
            &address,
            &supervisor_name,
            &org_name,
            create_time,
            status.as_str(),
        );
        Self {
            order_num,
            customer_name,
            address,
            supervisor_name,
            org_name,
            create_time,
            status,
            elapsed_hours: None,
            reminder_due: false,
            escalation_due: false,
            approaching_escalation: false,
            overdue_hours: 0.0,
            escalation_level: 0,
            progress_ratio: 0.0,
            sla_threshold_hours: None,
            source_hash,
        }
    }

    /// Whether this opportunity's status participates in SLA monitoring.
    #[must_use]
    pub fn is_monitored(&self) -> bool {
        self.status.is_monitored()
    }
}

/// SHA-256 over the business fields, hex-encoded.
#[must_use]
pub fn compute_source_hash(
    order_num: &str,
    customer_name: &str,
    address: &str,
    supervisor_name: &str,
    org_name: &str,
    create_time: NaiveDateTime,
    status: &str,
) -> String {
    let create_time = create_time.format("%Y-%m-%dT%H:%M:%S%.6f").to_string();
    let mut hasher = Sha256::new();
    for field in [
        order_num,
        customer_name,
        address,
        supervisor_name,
        org_name,
        create_time.as_str(),
        status,
    ] {
        hasher.update(field.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}
