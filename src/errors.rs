//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Persistence failure when interacting with `SQLite`.
    Db(String),
    /// Analytics source fetch failure.
    Fetch(String),
    /// Chat-group webhook delivery failure.
    Webhook(String),
    /// Opportunity row could not be classified.
    Classify(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// An open task with the same logical key already exists.
    Duplicate(String),
    /// A tick was triggered while another tick is still running.
    Busy(String),
    /// A tick exceeded its configured deadline.
    Timeout(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Db(msg) => write!(f, "db: {msg}"),
            Self::Fetch(msg) => write!(f, "fetch: {msg}"),
            Self::Webhook(msg) => write!(f, "webhook: {msg}"),
            Self::Classify(msg) => write!(f, "classify: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Duplicate(msg) => write!(f, "duplicate: {msg}"),
            Self::Busy(msg) => write!(f, "busy: {msg}"),
            Self::Timeout(msg) => write!(f, "timeout: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::Db(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
