//! Global configuration parsing, validation, and runtime settings snapshots.
//!
//! Two layers of configuration exist. [`GlobalConfig`] is the bootstrap
//! TOML file: database path, analytics source endpoint, escalation webhook.
//! [`Settings`] is the runtime-tunable layer stored in the `system_config`
//! table and snapshotted once per tick, so an operator edit takes effect on
//! the next tick without a restart.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use crate::sla::{BusinessCalendar, SlaThresholds};
use crate::{AppError, Result};

/// Analytics source connectivity settings.
///
/// The API key is loaded at runtime from the environment, not from the
/// TOML file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AnalyticsConfig {
    /// Base URL of the analytics service.
    pub base_url: String,
    /// Saved question / card identifier that returns open opportunities.
    pub card_id: u32,
    /// Request timeout in seconds.
    #[serde(default = "default_analytics_timeout")]
    pub timeout_seconds: u64,
    /// API key used for authentication (populated at runtime).
    #[serde(skip)]
    pub api_key: String,
}

fn default_analytics_timeout() -> u64 {
    30
}

fn default_db_path() -> PathBuf {
    PathBuf::from("fieldwatch.db")
}

fn default_retention_days() -> u32 {
    30
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Path to the `SQLite` database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Analytics source settings.
    pub analytics: AnalyticsConfig,
    /// Webhook of the single operations escalation group.
    pub escalation_webhook_url: String,
    /// Days before closed tasks and finished runs are purged.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the analytics API key from the `FIELDWATCH_ANALYTICS_KEY`
    /// environment variable.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the variable is unset or empty.
    pub fn load_credentials(&mut self) -> Result<()> {
        let key = env::var("FIELDWATCH_ANALYTICS_KEY").map_err(|_| {
            AppError::Config("FIELDWATCH_ANALYTICS_KEY env var is not set".into())
        })?;
        if key.is_empty() {
            return Err(AppError::Config("FIELDWATCH_ANALYTICS_KEY is empty".into()));
        }
        self.analytics.api_key = key;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.escalation_webhook_url.is_empty() {
            return Err(AppError::Config(
                "escalation_webhook_url must not be empty".into(),
            ));
        }
        if self.analytics.base_url.is_empty() {
            return Err(AppError::Config(
                "analytics.base_url must not be empty".into(),
            ));
        }
        if self.analytics.card_id == 0 {
            return Err(AppError::Config(
                "analytics.card_id must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Per-tick snapshot of the runtime-tunable keys in `system_config`.
///
/// Every key falls back to a coded default when missing or malformed; the
/// fallback logs a warning and never fails the tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Minutes between scheduled ticks.
    pub execution_interval_minutes: u64,
    /// Maximum send attempts per notification task, spanning ticks.
    pub max_retries: u32,
    /// Whether first-tier reminder notifications are planned at all.
    pub reminder_enabled: bool,
    /// Whether second-tier escalation notifications are planned at all.
    pub escalation_enabled: bool,
    /// Minutes between successive sends of the same logical task.
    pub cooldown_minutes: u64,
    /// Mandatory pause between webhook calls, in seconds.
    pub webhook_api_interval_secs: u64,
    /// Display cap for orders enumerated in a reminder message.
    pub reminder_max_display_orders: usize,
    /// Display cap for orders enumerated in an escalation message.
    pub escalation_max_display_orders: usize,
    /// Reminder threshold for pending-appointment orders, business hours.
    pub sla_pending_reminder: f64,
    /// Escalation threshold for pending-appointment orders, business hours.
    pub sla_pending_escalation: f64,
    /// Reminder threshold for temporarily-not-visiting orders, business hours.
    pub sla_not_visiting_reminder: f64,
    /// Escalation threshold for temporarily-not-visiting orders, business hours.
    pub sla_not_visiting_escalation: f64,
    /// First working hour of the day (inclusive).
    pub work_start_hour: u32,
    /// Last working hour of the day (exclusive).
    pub work_end_hour: u32,
    /// Working weekdays, 1 = Monday through 7 = Sunday.
    pub work_days: Vec<u32>,
    /// Upper bound on a single tick's wall-clock duration, seconds.
    pub tick_timeout_seconds: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            execution_interval_minutes: 60,
            max_retries: 5,
            reminder_enabled: true,
            escalation_enabled: true,
            cooldown_minutes: 120,
            webhook_api_interval_secs: 1,
            reminder_max_display_orders: 5,
            escalation_max_display_orders: 5,
            sla_pending_reminder: 4.0,
            sla_pending_escalation: 8.0,
            sla_not_visiting_reminder: 8.0,
            sla_not_visiting_escalation: 16.0,
            work_start_hour: 9,
            work_end_hour: 19,
            work_days: vec![1, 2, 3, 4, 5],
            tick_timeout_seconds: 300,
        }
    }
}

impl Settings {
    /// Build a settings snapshot from the raw `system_config` key/value map.
    ///
    /// Unknown keys are ignored; missing or malformed values fall back to the
    /// coded defaults with a warning.
    #[must_use]
    pub fn from_map(map: &HashMap<String, String>) -> Self {
        let defaults = Self::default();
        Self {
            execution_interval_minutes: parse_key(
                map,
                "agent_execution_interval",
                defaults.execution_interval_minutes,
            ),
            max_retries: parse_key(map, "agent_max_retries", defaults.max_retries),
            reminder_enabled: parse_key(
                map,
                "notification_reminder_enabled",
                defaults.reminder_enabled,
            ),
            escalation_enabled: parse_key(
                map,
                "notification_escalation_enabled",
                defaults.escalation_enabled,
            ),
            cooldown_minutes: parse_key(map, "notification_cooldown", defaults.cooldown_minutes),
            webhook_api_interval_secs: parse_key(
                map,
                "webhook_api_interval",
                defaults.webhook_api_interval_secs,
            ),
            reminder_max_display_orders: parse_key(
                map,
                "reminder_max_display_orders",
                defaults.reminder_max_display_orders,
            ),
            escalation_max_display_orders: parse_key(
                map,
                "escalation_max_display_orders",
                defaults.escalation_max_display_orders,
            ),
            sla_pending_reminder: parse_key(
                map,
                "sla_pending_reminder",
                defaults.sla_pending_reminder,
            ),
            sla_pending_escalation: parse_key(
                map,
                "sla_pending_escalation",
                defaults.sla_pending_escalation,
            ),
            sla_not_visiting_reminder: parse_key(
                map,
                "sla_not_visiting_reminder",
                defaults.sla_not_visiting_reminder,
            ),
            sla_not_visiting_escalation: parse_key(
                map,
                "sla_not_visiting_escalation",
                defaults.sla_not_visiting_escalation,
            ),
            work_start_hour: parse_key(map, "work_start_hour", defaults.work_start_hour),
            work_end_hour: parse_key(map, "work_end_hour", defaults.work_end_hour),
            work_days: parse_work_days(map, &defaults.work_days),
            tick_timeout_seconds: parse_key(
                map,
                "tick_timeout_seconds",
                defaults.tick_timeout_seconds,
            ),
        }
    }

    /// Cooldown window expressed in hours.
    #[must_use]
    pub fn cooldown_hours(&self) -> f64 {
        self.cooldown_minutes as f64 / 60.0
    }

    /// Business calendar built from the work-time keys.
    ///
    /// Invalid combinations (end not after start, no valid weekdays) fall
    /// back to the default calendar with a warning.
    #[must_use]
    pub fn calendar(&self) -> BusinessCalendar {
        match BusinessCalendar::new(self.work_start_hour, self.work_end_hour, &self.work_days) {
            Ok(calendar) => calendar,
            Err(err) => {
                warn!(%err, "invalid work-time settings, using default calendar");
                BusinessCalendar::default()
            }
        }
    }

    /// SLA threshold table built from the four threshold keys.
    #[must_use]
    pub fn thresholds(&self) -> SlaThresholds {
        SlaThresholds {
            pending_reminder: self.sla_pending_reminder,
            pending_escalation: self.sla_pending_escalation,
            not_visiting_reminder: self.sla_not_visiting_reminder,
            not_visiting_escalation: self.sla_not_visiting_escalation,
        }
    }
}

/// Parse one config key, falling back to `default` with a warning on a
/// missing or malformed value.
fn parse_key<T>(map: &HashMap<String, String>, key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    match map.get(key) {
        None => default,
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(key, raw, "malformed config value, using default");
                default
            }
        },
    }
}

/// Parse the `work_days` key: a comma-separated list of weekday numbers 1–7.
fn parse_work_days(map: &HashMap<String, String>, default: &[u32]) -> Vec<u32> {
    let Some(raw) = map.get("work_days") else {
        return default.to_vec();
    };
    let days: Vec<u32> = raw
        .split(',')
        .filter_map(|part| part.trim().parse().ok())
        .filter(|day| (1..=7).contains(day))
        .collect();
    if days.is_empty() {
        warn!(raw, "work_days has no valid entries, using default");
        return default.to_vec();
    }
    days
}
