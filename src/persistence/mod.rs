//! Persistence layer modules.

pub mod cache_repo;
pub mod db;
pub mod group_repo;
pub mod retention;
pub mod run_repo;
pub mod schema;
pub mod settings_repo;
pub mod task_repo;

/// Re-export the database pool type for convenience.
pub use sqlx::SqlitePool;
