//! Domain model module declarations.

pub mod group;
pub mod opportunity;
pub mod run;
pub mod task;

use chrono::NaiveDateTime;

/// Current wall-clock time as a naive local timestamp.
///
/// All timestamps in the system are naive local time at a fixed offset from
/// UTC; daylight-saving transitions are deliberately not modeled.
#[must_use]
pub fn now_local() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}
