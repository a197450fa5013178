//! Notification task model: the durable record of one planned outbound
//! notification, keyed by `(logical_order_id, task_type)`.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix of the synthetic logical order id used by organization-scoped
/// escalation tasks.
pub const ESCALATION_ID_PREFIX: &str = "ESCALATION_";

/// Notification tier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// First tier: per-order, routed to the owning organization's group.
    Reminder,
    /// Second tier: aggregated per organization, routed to the single
    /// operations escalation group.
    Escalation,
}

/// Lifecycle status for a notification task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created, waiting to be sent.
    Pending,
    /// Delivered to the webhook.
    Sent,
    /// Delivery failed; re-armed by a later plan phase once cooldown passes.
    Failed,
    /// Acknowledged out-of-band. The transition exists but nothing writes it.
    Confirmed,
}

/// A planned outbound notification, owned by the notification manager.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct NotificationTask {
    /// Unique record identifier.
    pub id: String,
    /// Dedup key: the order number for reminders, `ESCALATION_<org>` for
    /// escalations.
    pub logical_order_id: String,
    /// Owning organization.
    pub org_name: String,
    /// Notification tier.
    pub task_type: TaskType,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// When the task became eligible to send.
    pub due_time: NaiveDateTime,
    /// Run that planned this task.
    pub created_run_id: Option<String>,
    /// Run that dispatched this task.
    pub sent_run_id: Option<String>,
    /// Send attempts so far; bumped on every failed send.
    pub retry_count: u32,
    /// Cap on send attempts, spanning ticks.
    pub max_retry_count: u32,
    /// Minimum interval between successive sends of this logical task.
    pub cooldown_hours: f64,
    /// Timestamp of the last successful send.
    pub last_sent_at: Option<NaiveDateTime>,
    /// Message body from the first successful render; never overwritten.
    pub rendered_message: Option<String>,
    /// Creation timestamp.
    pub created_at: NaiveDateTime,
    /// Last mutation timestamp.
    pub updated_at: NaiveDateTime,
}

impl NotificationTask {
    /// Construct a pending per-order reminder task.
    #[must_use]
    pub fn reminder(
        order_num: &str,
        org_name: &str,
        now: NaiveDateTime,
        cooldown_hours: f64,
        max_retry_count: u32,
        created_run_id: &str,
    ) -> Self {
        Self::pending(
            order_num.to_owned(),
            org_name,
            TaskType::Reminder,
            now,
            cooldown_hours,
            max_retry_count,
            created_run_id,
        )
    }

    /// Construct a pending organization-scoped escalation task.
    #[must_use]
    pub fn escalation(
        org_name: &str,
        now: NaiveDateTime,
        cooldown_hours: f64,
        max_retry_count: u32,
        created_run_id: &str,
    ) -> Self {
        Self::pending(
            escalation_logical_id(org_name),
            org_name,
            TaskType::Escalation,
            now,
            cooldown_hours,
            max_retry_count,
            created_run_id,
        )
    }

    fn pending(
        logical_order_id: String,
        org_name: &str,
        task_type: TaskType,
        now: NaiveDateTime,
        cooldown_hours: f64,
        max_retry_count: u32,
        created_run_id: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            logical_order_id,
            org_name: org_name.to_owned(),
            task_type,
            status: TaskStatus::Pending,
            due_time: now,
            created_run_id: Some(created_run_id.to_owned()),
            sent_run_id: None,
            retry_count: 0,
            max_retry_count,
            cooldown_hours,
            last_sent_at: None,
            rendered_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this task's last send is still inside its cooldown window.
    #[must_use]
    pub fn in_cooldown(&self, now: NaiveDateTime) -> bool {
        let Some(last_sent) = self.last_sent_at else {
            return false;
        };
        let elapsed_hours = (now - last_sent).num_seconds() as f64 / 3600.0;
        elapsed_hours < self.cooldown_hours
    }

    /// Whether the execute phase may dispatch this task right now.
    #[must_use]
    pub fn should_send_now(&self, now: NaiveDateTime) -> bool {
        self.status == TaskStatus::Pending
            && !self.in_cooldown(now)
            && self.retry_count < self.max_retry_count
    }

    /// Whether this row carries the organization-scoped escalation key.
    ///
    /// Legacy escalation rows keyed by a plain order number return `false`
    /// and are retired by the plan phase.
    #[must_use]
    pub fn has_org_scoped_key(&self) -> bool {
        self.logical_order_id == escalation_logical_id(&self.org_name)
    }
}

/// Synthetic logical order id for an organization's escalation task.
#[must_use]
pub fn escalation_logical_id(org_name: &str) -> String {
    format!("{ESCALATION_ID_PREFIX}{org_name}")
}
