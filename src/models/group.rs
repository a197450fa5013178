//! Chat-group routing configuration, edited out-of-band and read-mostly.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Webhook routing entry for one organization's chat group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GroupConfig {
    /// Unique record identifier.
    pub id: String,
    /// Organization this group serves; unique.
    pub org_name: String,
    /// Display name of the chat group.
    pub name: String,
    /// Webhook endpoint for the group's chat robot.
    pub webhook_url: String,
    /// Disabled groups are skipped by routing.
    pub enabled: bool,
    /// Advisory per-group cooldown, minutes.
    pub cooldown_minutes: u32,
    /// Advisory per-group hourly send cap.
    pub max_per_hour: u32,
    /// Creation timestamp.
    pub created_at: NaiveDateTime,
    /// Last edit timestamp.
    pub updated_at: NaiveDateTime,
}

impl GroupConfig {
    /// Construct an enabled group entry with advisory defaults.
    #[must_use]
    pub fn new(org_name: &str, name: &str, webhook_url: &str, now: NaiveDateTime) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            org_name: org_name.to_owned(),
            name: name.to_owned(),
            webhook_url: webhook_url.to_owned(),
            enabled: true,
            cooldown_minutes: 30,
            max_per_hour: 10,
            created_at: now,
            updated_at: now,
        }
    }
}
