//! Group-routing registry: organization name to reminder webhook, plus the
//! single escalation webhook.

use std::collections::HashMap;

use tracing::info;

use crate::persistence::group_repo::GroupRepo;
use crate::Result;

/// Snapshot of the routing table, rebuilt at the start of each execute
/// phase so out-of-band edits take effect next tick.
#[derive(Debug, Clone)]
pub struct GroupRoutingRegistry {
    org_webhooks: HashMap<String, String>,
    escalation_webhook: String,
}

impl GroupRoutingRegistry {
    /// Load enabled group entries and pair them with the escalation webhook.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the group table cannot be read.
    pub async fn load(groups: &GroupRepo, escalation_webhook: String) -> Result<Self> {
        let mut org_webhooks = HashMap::new();
        for group in groups.list_enabled().await? {
            org_webhooks.insert(group.org_name, group.webhook_url);
        }
        info!(groups = org_webhooks.len(), "group routing loaded");
        Ok(Self {
            org_webhooks,
            escalation_webhook,
        })
    }

    /// Build a registry from an in-memory table; used by tests.
    #[must_use]
    pub fn from_parts(
        org_webhooks: HashMap<String, String>,
        escalation_webhook: String,
    ) -> Self {
        Self {
            org_webhooks,
            escalation_webhook,
        }
    }

    /// Webhook for an organization's reminder messages.
    ///
    /// Organizations without an enabled entry redirect to the escalation
    /// webhook so their reminders are not silently dropped.
    #[must_use]
    pub fn reminder_webhook_for(&self, org_name: &str) -> &str {
        self.org_webhooks
            .get(org_name)
            .map_or(&self.escalation_webhook, String::as_str)
    }

    /// Whether the organization has its own enabled webhook.
    #[must_use]
    pub fn has_dedicated_webhook(&self, org_name: &str) -> bool {
        self.org_webhooks.contains_key(org_name)
    }

    /// The single escalation webhook; all escalation messages go here.
    #[must_use]
    pub fn escalation_webhook(&self) -> &str {
        &self.escalation_webhook
    }
}
