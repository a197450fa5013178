//! Notification manager: the plan/execute state machine at the heart of a
//! tick.
//!
//! The plan phase turns classified opportunities into durable tasks,
//! deduplicated per `(logical_order_id, type)` and suppressed while the
//! latest row for the key is in cooldown. The execute phase dispatches due
//! tasks grouped by organization, one message per organization per tier,
//! pacing webhook calls at the platform-mandated interval. A failed send
//! maps to exactly one store transition per task and never corrupts state.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::Settings;
use crate::models::opportunity::Opportunity;
use crate::models::task::{escalation_logical_id, NotificationTask, TaskStatus, TaskType};
use crate::persistence::task_repo::TaskRepo;
use crate::sla::SlaClassifier;
use crate::sync::DataSyncStrategy;
use crate::Result;

use super::advisor::DecisionAdvisor;
use super::formatter::MessageFormatter;
use super::routing::GroupRoutingRegistry;
use super::webhook::WebhookSender;

/// Per-organization outcome of one execute phase.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct OrgOutcome {
    /// Tasks transitioned to `sent`.
    pub sent: usize,
    /// Tasks transitioned to `failed`.
    pub failed: usize,
}

/// Outcome of one execute phase.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionReport {
    /// Pending tasks considered.
    pub total_considered: usize,
    /// Tasks transitioned to `sent`.
    pub sent: usize,
    /// Tasks transitioned to `failed`.
    pub failed: usize,
    /// Pending tasks skipped because their cooldown has not elapsed.
    pub skipped_cooldown: usize,
    /// Webhook messages actually delivered.
    pub messages_delivered: usize,
    /// Outcome broken down by organization.
    pub by_org: BTreeMap<String, OrgOutcome>,
    /// Errors recorded while executing best-effort.
    pub errors: Vec<String>,
}

/// Plans notification tasks from classified opportunities and executes the
/// due ones.
pub struct NotificationManager {
    tasks: TaskRepo,
    sync: Arc<DataSyncStrategy>,
    sender: Arc<dyn WebhookSender>,
    advisor: Arc<dyn DecisionAdvisor>,
}

impl NotificationManager {
    /// Create a manager over the task store, sync strategy, and transports.
    #[must_use]
    pub fn new(
        tasks: TaskRepo,
        sync: Arc<DataSyncStrategy>,
        sender: Arc<dyn WebhookSender>,
        advisor: Arc<dyn DecisionAdvisor>,
    ) -> Self {
        Self {
            tasks,
            sync,
            sender,
            advisor,
        }
    }

    /// Plan phase: create tasks for breaching opportunities.
    ///
    /// Refreshes each opportunity's SLA fields against `now`, creates at
    /// most one reminder task per breaching order, and aggregates
    /// escalations into one organization-scoped task per escalating
    /// organization. Legacy per-order escalation rows are retired as `sent`
    /// without dispatch before the per-org row is created. Never sends.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` on store contention; the execute phase still
    /// runs on pre-existing pending tasks in that case.
    pub async fn create_tasks(
        &self,
        opportunities: &mut [Opportunity],
        run_id: &str,
        now: NaiveDateTime,
        settings: &Settings,
    ) -> Result<Vec<NotificationTask>> {
        let classifier = SlaClassifier::new(settings.calendar(), settings.thresholds());
        let cooldown_hours = settings.cooldown_hours();

        let mut created = Vec::new();
        let mut created_keys: HashSet<(String, TaskType)> = HashSet::new();
        let mut escalation_orgs: BTreeSet<String> = BTreeSet::new();

        for opportunity in opportunities.iter_mut() {
            classifier.assess(opportunity, now);

            if settings.reminder_enabled && opportunity.reminder_due {
                let key = (opportunity.order_num.clone(), TaskType::Reminder);
                if !created_keys.contains(&key)
                    && self
                        .may_create(&opportunity.order_num, TaskType::Reminder, now)
                        .await?
                {
                    let task = NotificationTask::reminder(
                        &opportunity.order_num,
                        &opportunity.org_name,
                        now,
                        cooldown_hours,
                        settings.max_retries,
                        run_id,
                    );
                    self.tasks.save(&task).await?;
                    created_keys.insert(key);
                    created.push(task);
                }
            }

            if settings.escalation_enabled && opportunity.escalation_level > 0 {
                escalation_orgs.insert(opportunity.org_name.clone());
            }
        }

        for org in &escalation_orgs {
            let logical_id = escalation_logical_id(org);

            // Retire stale escalations: open rows keyed by a plain order
            // number would coexist with the per-org row and double-send.
            for stale in self.tasks.find_open_escalations_for_org(org).await? {
                if stale.logical_order_id != logical_id {
                    info!(
                        org,
                        task_id = %stale.id,
                        legacy_key = %stale.logical_order_id,
                        "retiring legacy per-order escalation row"
                    );
                    self.tasks
                        .update_status(&stale.id, TaskStatus::Sent, None, now)
                        .await?;
                }
            }

            let key = (logical_id.clone(), TaskType::Escalation);
            if !created_keys.contains(&key)
                && self.may_create(&logical_id, TaskType::Escalation, now).await?
            {
                let task = NotificationTask::escalation(
                    org,
                    now,
                    cooldown_hours,
                    settings.max_retries,
                    run_id,
                );
                self.tasks.save(&task).await?;
                created_keys.insert(key);
                created.push(task);
            }
        }

        info!(created = created.len(), "notification plan complete");
        Ok(created)
    }

    /// Whether a new pending task may be created for the logical key: no
    /// pending row exists and the most recent row is out of cooldown.
    async fn may_create(
        &self,
        logical_order_id: &str,
        task_type: TaskType,
        now: NaiveDateTime,
    ) -> Result<bool> {
        if self.tasks.has_pending(logical_order_id, task_type).await? {
            return Ok(false);
        }
        if let Some(latest) = self.tasks.latest_for_key(logical_order_id, task_type).await? {
            if latest.in_cooldown(now) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Execute phase: dispatch due pending tasks grouped by organization.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` only if the initial pending-task read fails;
    /// per-task failures are recorded in the report and the phase continues
    /// best-effort.
    pub async fn execute_pending(
        &self,
        run_id: &str,
        now: NaiveDateTime,
        settings: &Settings,
        routing: &GroupRoutingRegistry,
        working_set: &[Opportunity],
    ) -> Result<ExecutionReport> {
        let mut report = ExecutionReport::default();

        let pending = self.tasks.find_pending().await?;
        report.total_considered = pending.len();
        if pending.is_empty() {
            return Ok(report);
        }

        let due: Vec<NotificationTask> = pending
            .into_iter()
            .filter(|task| task.should_send_now(now))
            .collect();
        report.skipped_cooldown = report.total_considered - due.len();
        if due.is_empty() {
            return Ok(report);
        }

        let working = self.resolve_working_set(&due, working_set, now, settings, &mut report).await;
        let index: HashMap<&str, &Opportunity> = working
            .iter()
            .map(|opp| (opp.order_num.as_str(), opp))
            .collect();

        let formatter = MessageFormatter::new(settings.calendar().hours_per_day());
        let pacing = Duration::from_secs(settings.webhook_api_interval_secs);

        let mut by_org: BTreeMap<String, Vec<NotificationTask>> = BTreeMap::new();
        for task in due {
            by_org.entry(task.org_name.clone()).or_default().push(task);
        }

        for (org, org_tasks) in by_org {
            let (reminders, escalations): (Vec<_>, Vec<_>) = org_tasks
                .into_iter()
                .partition(|task| task.task_type == TaskType::Reminder);

            if !reminders.is_empty() {
                self.send_reminder_batch(
                    &org, &reminders, &index, &formatter, routing, settings, run_id, now, pacing,
                    &mut report,
                )
                .await;
            }

            if !escalations.is_empty() {
                self.send_escalation_batch(
                    &org,
                    &escalations,
                    &working,
                    &formatter,
                    routing,
                    settings,
                    run_id,
                    now,
                    pacing,
                    &mut report,
                )
                .await;
            }
        }

        info!(
            sent = report.sent,
            failed = report.failed,
            skipped_cooldown = report.skipped_cooldown,
            messages = report.messages_delivered,
            "notification execution complete"
        );
        Ok(report)
    }

    /// Working set used for rendering; re-fetched fresh when any due
    /// reminder references an order missing from the tick's snapshot.
    async fn resolve_working_set(
        &self,
        due: &[NotificationTask],
        working_set: &[Opportunity],
        now: NaiveDateTime,
        settings: &Settings,
        report: &mut ExecutionReport,
    ) -> Vec<Opportunity> {
        let known: HashSet<&str> = working_set.iter().map(|o| o.order_num.as_str()).collect();
        let missing = due.iter().any(|task| {
            task.task_type == TaskType::Reminder && !known.contains(task.logical_order_id.as_str())
        });
        if !missing {
            return working_set.to_vec();
        }

        let classifier = SlaClassifier::new(settings.calendar(), settings.thresholds());
        match self.sync.get_opportunities(&classifier, now, true).await {
            Ok(outcome) => outcome.opportunities,
            Err(err) => {
                warn!(%err, "forced refresh for missing task references failed");
                report.errors.push(format!("forced refresh failed: {err}"));
                working_set.to_vec()
            }
        }
    }

    /// Render and dispatch one organization's reminder batch.
    #[allow(clippy::too_many_arguments)]
    async fn send_reminder_batch(
        &self,
        org: &str,
        tasks: &[NotificationTask],
        index: &HashMap<&str, &Opportunity>,
        formatter: &MessageFormatter,
        routing: &GroupRoutingRegistry,
        settings: &Settings,
        run_id: &str,
        now: NaiveDateTime,
        pacing: Duration,
        report: &mut ExecutionReport,
    ) {
        let mut deliverable = Vec::new();
        let mut opportunities: Vec<Opportunity> = Vec::new();
        for task in tasks {
            match index.get(task.logical_order_id.as_str()) {
                Some(opp) => {
                    opportunities.push((*opp).clone());
                    deliverable.push(task);
                }
                None => {
                    // The order left the working set since planning; there
                    // is nothing left to remind about.
                    info!(
                        org,
                        task_id = %task.id,
                        order_num = %task.logical_order_id,
                        "retiring reminder for order no longer in working set"
                    );
                    self.retire_without_dispatch(task, now, report).await;
                }
            }
        }
        if deliverable.is_empty() {
            return;
        }

        opportunities.sort_by(|a, b| a.order_num.cmp(&b.order_num));
        let draft = formatter.format_reminder(
            org,
            &opportunities,
            settings.reminder_max_display_orders,
        );
        let message = self.advise(org, TaskType::Reminder, draft).await;

        let webhook = routing.reminder_webhook_for(org);
        if !routing.has_dedicated_webhook(org) {
            warn!(org, "no enabled webhook for org, redirecting reminder to escalation group");
        }

        let delivered = self.sender.send(webhook, &message).await;
        tokio::time::sleep(pacing).await;

        self.apply_send_outcome(org, &deliverable, &message, delivered, run_id, now, report)
            .await;
    }

    /// Render and dispatch one organization's escalation task.
    #[allow(clippy::too_many_arguments)]
    async fn send_escalation_batch(
        &self,
        org: &str,
        tasks: &[NotificationTask],
        working: &[Opportunity],
        formatter: &MessageFormatter,
        routing: &GroupRoutingRegistry,
        settings: &Settings,
        run_id: &str,
        now: NaiveDateTime,
        pacing: Duration,
        report: &mut ExecutionReport,
    ) {
        let mut escalating: Vec<Opportunity> = working
            .iter()
            .filter(|opp| opp.org_name == org && opp.escalation_level > 0)
            .cloned()
            .collect();
        escalating.sort_by(|a, b| a.order_num.cmp(&b.order_num));

        if escalating.is_empty() {
            for task in tasks {
                info!(
                    org,
                    task_id = %task.id,
                    "retiring escalation with no breaching orders left"
                );
                self.retire_without_dispatch(task, now, report).await;
            }
            return;
        }

        let draft = formatter.format_escalation(
            org,
            &escalating,
            settings.escalation_max_display_orders,
        );
        let message = self.advise(org, TaskType::Escalation, draft).await;

        let task_refs: Vec<&NotificationTask> = tasks.iter().collect();
        let delivered = self
            .sender
            .send(routing.escalation_webhook(), &message)
            .await;
        tokio::time::sleep(pacing).await;

        self.apply_send_outcome(org, &task_refs, &message, delivered, run_id, now, report)
            .await;
    }

    /// Run the advisor over a draft, falling back to the draft on failure.
    async fn advise(&self, org: &str, task_type: TaskType, draft: String) -> String {
        match self.advisor.rewrite(org, task_type, &draft).await {
            Ok(rewritten) if !rewritten.is_empty() => rewritten,
            Ok(_) => draft,
            Err(err) => {
                warn!(org, %err, "advisor rewrite failed, using deterministic message");
                draft
            }
        }
    }

    /// Map one webhook outcome onto every task in the batch.
    async fn apply_send_outcome(
        &self,
        org: &str,
        tasks: &[&NotificationTask],
        message: &str,
        delivered: bool,
        run_id: &str,
        now: NaiveDateTime,
        report: &mut ExecutionReport,
    ) {
        if delivered {
            report.messages_delivered += 1;
        }

        let mut outcome = OrgOutcome::default();
        let mut errors = Vec::new();
        for task in tasks {
            let result = if delivered {
                self.mark_sent(task, message, run_id, now).await
            } else {
                self.tasks
                    .update_status(&task.id, TaskStatus::Failed, None, now)
                    .await
            };

            match result {
                Ok(()) if delivered => outcome.sent += 1,
                Ok(()) => {
                    outcome.failed += 1;
                    if task.retry_count + 1 >= task.max_retry_count {
                        warn!(
                            org,
                            task_id = %task.id,
                            "task reached its retry cap and stays failed"
                        );
                    }
                }
                Err(err) => {
                    errors.push(format!("task {} state update failed: {err}", task.id));
                }
            }
        }

        report.sent += outcome.sent;
        report.failed += outcome.failed;
        report.errors.extend(errors);
        let entry = report.by_org.entry(org.to_owned()).or_default();
        entry.sent += outcome.sent;
        entry.failed += outcome.failed;
    }

    async fn mark_sent(
        &self,
        task: &NotificationTask,
        message: &str,
        run_id: &str,
        now: NaiveDateTime,
    ) -> Result<()> {
        self.tasks.update_last_sent(&task.id, now).await?;
        self.tasks.update_message(&task.id, message, now).await?;
        self.tasks
            .update_status(&task.id, TaskStatus::Sent, Some(run_id), now)
            .await
    }

    /// Mark a task `sent` without dispatching anything.
    async fn retire_without_dispatch(
        &self,
        task: &NotificationTask,
        now: NaiveDateTime,
        report: &mut ExecutionReport,
    ) {
        if let Err(err) = self
            .tasks
            .update_status(&task.id, TaskStatus::Sent, None, now)
            .await
        {
            report
                .errors
                .push(format!("task {} retirement failed: {err}", task.id));
        }
    }
}
