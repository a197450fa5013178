//! Tick orchestrator: wires sync, classification, planning, and sending
//! into a fixed step sequence with full audit lineage.
//!
//! No error escapes a tick. Every step is wrapped so failures are recorded
//! and the remaining steps run best-effort; the run record is the
//! user-visible surface. A run completes only when every step finished
//! without an escaping error, otherwise it is marked failed.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::Settings;
use crate::models::now_local;
use crate::models::opportunity::Opportunity;
use crate::models::run::{AgentRun, RunStatus};
use crate::notify::manager::NotificationManager;
use crate::notify::routing::GroupRoutingRegistry;
use crate::persistence::group_repo::GroupRepo;
use crate::persistence::settings_repo::SettingsRepo;
use crate::sla::SlaClassifier;
use crate::sync::{self, DataSyncStrategy};
use crate::{AppError, Result};

use super::tracker::RunTracker;

/// What caused a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickTrigger {
    /// Fired by the interval scheduler.
    Scheduled,
    /// Requested by an operator.
    Manual,
}

impl TickTrigger {
    fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Manual => "manual",
        }
    }
}

/// Accumulated outcome of the step sequence.
struct TickOutcome {
    opportunities_processed: u32,
    notifications_sent: u32,
    context: Value,
    errors: Vec<String>,
    step_failed: bool,
}

/// Runs the fixed per-tick step sequence, one tick at a time.
pub struct TickOrchestrator {
    sync: Arc<DataSyncStrategy>,
    manager: Arc<NotificationManager>,
    tracker: RunTracker,
    settings: SettingsRepo,
    groups: GroupRepo,
    escalation_webhook: String,
    tick_guard: Mutex<()>,
}

impl TickOrchestrator {
    /// Wire the orchestrator over its collaborators.
    #[must_use]
    pub fn new(
        sync: Arc<DataSyncStrategy>,
        manager: Arc<NotificationManager>,
        tracker: RunTracker,
        settings: SettingsRepo,
        groups: GroupRepo,
        escalation_webhook: String,
    ) -> Self {
        Self {
            sync,
            manager,
            tracker,
            settings,
            groups,
            escalation_webhook,
            tick_guard: Mutex::new(()),
        }
    }

    /// Execute one full tick and return its finished run record.
    ///
    /// At most one tick executes at any time; a concurrent call fails fast
    /// with `AppError::Busy` instead of queueing.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Busy` when a tick is already running, or
    /// `AppError::Db` when the run record itself cannot be opened or
    /// closed. Step-level failures never surface here; they are recorded on
    /// the run.
    pub async fn run_tick(&self, trigger: TickTrigger) -> Result<AgentRun> {
        let Ok(_guard) = self.tick_guard.try_lock() else {
            return Err(AppError::Busy("a tick is already running".into()));
        };

        let now = now_local();
        let settings = self.load_settings().await;

        let run = self
            .tracker
            .start_run(json!({ "trigger": trigger.as_str() }), now)
            .await?;
        let run_id = run.id.clone();
        info!(run_id, trigger = trigger.as_str(), "tick started");

        let deadline = Duration::from_secs(settings.tick_timeout_seconds);
        let body = self
            .execute_steps(&run_id, trigger, &settings)
            .instrument(info_span!("tick", run_id = %run_id));

        match tokio::time::timeout(deadline, body).await {
            Ok(outcome) => {
                let status = if outcome.step_failed {
                    RunStatus::Failed
                } else {
                    RunStatus::Completed
                };
                self.tracker
                    .finish_run(
                        &run_id,
                        status,
                        now_local(),
                        outcome.opportunities_processed,
                        outcome.notifications_sent,
                        &outcome.context,
                        &outcome.errors,
                    )
                    .await?;
                info!(run_id, ?status, "tick finished");
            }
            Err(_) => {
                error!(
                    run_id,
                    timeout_secs = settings.tick_timeout_seconds,
                    "tick exceeded its deadline"
                );
                self.tracker
                    .finish_run(
                        &run_id,
                        RunStatus::Failed,
                        now_local(),
                        0,
                        0,
                        &json!({}),
                        &[format!(
                            "tick exceeded {}s deadline",
                            settings.tick_timeout_seconds
                        )],
                    )
                    .await?;
            }
        }

        self.tracker.get_run(&run_id).await
    }

    /// Snapshot the runtime settings; a read failure falls back to the
    /// coded defaults so the tick still runs.
    async fn load_settings(&self) -> Settings {
        match self.settings.get_all().await {
            Ok(map) => Settings::from_map(&map),
            Err(err) => {
                warn!(%err, "settings read failed, using defaults");
                Settings::default()
            }
        }
    }

    /// The fixed step sequence: fetch, analyze, decide, plan, send, record.
    async fn execute_steps(
        &self,
        run_id: &str,
        trigger: TickTrigger,
        settings: &Settings,
    ) -> TickOutcome {
        let now = now_local();
        let classifier = SlaClassifier::new(settings.calendar(), settings.thresholds());
        let mut errors: Vec<String> = Vec::new();
        let mut step_failed = false;
        let mut context = serde_json::Map::new();
        context.insert("trigger".into(), json!(trigger.as_str()));

        // fetchData: a source failure falls through with cache (or an empty
        // working set) and never fails the step.
        let fetch = self
            .tracker
            .track_step(run_id, "fetchData", json!({}), async {
                match self.sync.get_opportunities(&classifier, now, false).await {
                    Ok(outcome) => {
                        let summary = json!({
                            "count": outcome.opportunities.len(),
                            "from_cache": outcome.from_cache,
                            "fetch_error": outcome.fetch_error,
                        });
                        Ok((outcome, summary))
                    }
                    Err(err) => {
                        let message = format!("fetch failed with empty cache: {err}");
                        Ok((
                            sync::FetchOutcome {
                                opportunities: Vec::new(),
                                from_cache: false,
                                fetch_error: Some(message),
                            },
                            json!({ "count": 0, "from_cache": false, "fetch_error": err.to_string() }),
                        ))
                    }
                }
            })
            .await;

        let mut opportunities: Vec<Opportunity> = match fetch {
            Ok(outcome) => {
                if let Some(fetch_error) = outcome.fetch_error {
                    errors.push(fetch_error);
                }
                context.insert("from_cache".into(), json!(outcome.from_cache));
                outcome.opportunities
            }
            Err(err) => {
                errors.push(err.to_string());
                step_failed = true;
                Vec::new()
            }
        };

        // analyzeStatus: refresh SLA fields and record counts.
        let analyze = self
            .tracker
            .track_step(
                run_id,
                "analyzeStatus",
                json!({ "total": opportunities.len() }),
                async {
                    let stats = classifier.assess_all(&mut opportunities, now);
                    let summary = json!(stats);
                    Ok((stats, summary))
                },
            )
            .await;
        if let Ok(stats) = analyze {
            context.insert("classification".into(), json!(stats));
            context.insert(
                "org_breakdown".into(),
                json!(sync::org_breakdown(&opportunities)),
            );
        }

        // decideToContinue: an empty working set skips planning and sending.
        let proceed = !opportunities.is_empty();
        let _ = self
            .tracker
            .track_step(
                run_id,
                "decideToContinue",
                json!({ "total": opportunities.len() }),
                async { Ok(((), json!({ "continue": proceed }))) },
            )
            .await;

        let mut notifications_sent = 0u32;

        if proceed {
            // planNotifications: store contention aborts planning for the
            // tick; execution still runs on pre-existing pending tasks.
            let plan = self
                .tracker
                .track_step(
                    run_id,
                    "planNotifications",
                    json!({ "opportunities": opportunities.len() }),
                    async {
                        let created = self
                            .manager
                            .create_tasks(&mut opportunities, run_id, now, settings)
                            .await?;
                        let summary = json!({ "created": created.len() });
                        Ok((created, summary))
                    },
                )
                .await;
            match plan {
                Ok(created) => {
                    context.insert("tasks_created".into(), json!(created.len()));
                }
                Err(err) => {
                    errors.push(format!("plan aborted: {err}"));
                    step_failed = true;
                }
            }

            // sendNotifications: one message per organization per tier.
            let send = self
                .tracker
                .track_step(run_id, "sendNotifications", json!({}), async {
                    let routing = GroupRoutingRegistry::load(
                        &self.groups,
                        self.escalation_webhook.clone(),
                    )
                    .await?;
                    let report = self
                        .manager
                        .execute_pending(run_id, now, settings, &routing, &opportunities)
                        .await?;
                    let summary = json!(report);
                    Ok((report, summary))
                })
                .await;
            match send {
                Ok(report) => {
                    notifications_sent = report.messages_delivered as u32;
                    errors.extend(report.errors.clone());
                    context.insert("execution".into(), json!(report));
                }
                Err(err) => {
                    errors.push(format!("send step failed: {err}"));
                    step_failed = true;
                }
            }
        }

        // recordResults: aggregate counts land on the run and in the trail.
        let processed = opportunities.len() as u32;
        let _ = self
            .tracker
            .track_step(
                run_id,
                "recordResults",
                json!({}),
                async {
                    let summary = json!({
                        "opportunities_processed": processed,
                        "notifications_sent": notifications_sent,
                        "errors": errors.len(),
                    });
                    Ok(((), summary))
                },
            )
            .await;

        TickOutcome {
            opportunities_processed: processed,
            notifications_sent,
            context: Value::Object(context),
            errors,
            step_failed,
        }
    }
}
