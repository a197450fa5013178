//! Run and run-step models: the durable audit trail of one tick.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status for an agent run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Tick in progress.
    Running,
    /// Every step finished without an escaping error.
    Completed,
    /// At least one step failed hard, or the tick timed out.
    Failed,
}

/// Durable record of one tick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct AgentRun {
    /// Unique record identifier.
    pub id: String,
    /// When the tick was triggered.
    pub trigger_time: NaiveDateTime,
    /// When the tick finished; `None` while running.
    pub end_time: Option<NaiveDateTime>,
    /// Current lifecycle status.
    pub status: RunStatus,
    /// Opportunities in the working set this tick.
    pub opportunities_processed: u32,
    /// Webhook messages delivered this tick.
    pub notifications_sent: u32,
    /// Opaque per-step statistics bag.
    pub context: serde_json::Value,
    /// Errors recorded while the tick ran best-effort.
    pub errors: Vec<String>,
}

impl AgentRun {
    /// Construct a running record with a generated identifier.
    #[must_use]
    pub fn start(trigger_time: NaiveDateTime, context: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            trigger_time,
            end_time: None,
            status: RunStatus::Running,
            opportunities_processed: 0,
            notifications_sent: 0,
            context,
            errors: Vec::new(),
        }
    }

    /// Wall-clock run duration in seconds, if the run has ended.
    #[must_use]
    pub fn duration_seconds(&self) -> Option<f64> {
        self.end_time
            .map(|end| (end - self.trigger_time).num_milliseconds() as f64 / 1000.0)
    }
}

/// Durable record of one orchestrator step within a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct RunStep {
    /// Unique record identifier.
    pub id: String,
    /// Owning run.
    pub run_id: String,
    /// Step name, e.g. `fetchData`.
    pub step_name: String,
    /// Input summary captured at step start.
    pub input_summary: serde_json::Value,
    /// Output summary captured at step end.
    pub output_summary: serde_json::Value,
    /// When the step started.
    pub timestamp: NaiveDateTime,
    /// Step duration in seconds.
    pub duration_seconds: f64,
    /// Error message if the step raised.
    pub error_message: Option<String>,
}

impl RunStep {
    /// Construct a step record with a generated identifier.
    #[must_use]
    pub fn new(
        run_id: &str,
        step_name: &str,
        input_summary: serde_json::Value,
        output_summary: serde_json::Value,
        timestamp: NaiveDateTime,
        duration_seconds: f64,
        error_message: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            run_id: run_id.to_owned(),
            step_name: step_name.to_owned(),
            input_summary,
            output_summary,
            timestamp,
            duration_seconds,
            error_message,
        }
    }
}
