//! Business-time calculator: wall-clock intervals restricted to configured
//! working hours and working weekdays.
//!
//! All arithmetic is pure and operates on naive local timestamps at a fixed
//! UTC offset; daylight-saving transitions are not modeled.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::{AppError, Result};

/// Working-hours calendar.
///
/// The business window of a working day is `[start_hour, end_hour)` with
/// `end_hour` up to 24 (end of day). Weekdays are numbered 1 = Monday
/// through 7 = Sunday.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusinessCalendar {
    start_hour: u32,
    end_hour: u32,
    work_days: [bool; 7],
}

impl Default for BusinessCalendar {
    /// Monday through Friday, 09:00–19:00.
    fn default() -> Self {
        Self {
            start_hour: 9,
            end_hour: 19,
            work_days: [true, true, true, true, true, false, false],
        }
    }
}

impl BusinessCalendar {
    /// Build a calendar from raw configuration values.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the window is empty or inverted, an
    /// hour is out of range, or no valid weekday is given.
    pub fn new(start_hour: u32, end_hour: u32, work_days: &[u32]) -> Result<Self> {
        if start_hour > 23 {
            return Err(AppError::Config(format!(
                "work_start_hour {start_hour} out of range 0-23"
            )));
        }
        if end_hour < 1 || end_hour > 24 {
            return Err(AppError::Config(format!(
                "work_end_hour {end_hour} out of range 1-24"
            )));
        }
        if end_hour <= start_hour {
            return Err(AppError::Config(format!(
                "work_end_hour {end_hour} must be after work_start_hour {start_hour}"
            )));
        }
        let mut days = [false; 7];
        for day in work_days {
            if (1..=7).contains(day) {
                days[(day - 1) as usize] = true;
            }
        }
        if !days.contains(&true) {
            return Err(AppError::Config("work_days has no valid weekday".into()));
        }
        Ok(Self {
            start_hour,
            end_hour,
            work_days: days,
        })
    }

    /// Working hours in one full business day.
    #[must_use]
    pub fn hours_per_day(&self) -> u32 {
        self.end_hour - self.start_hour
    }

    /// Whether the given date falls on a working weekday.
    #[must_use]
    pub fn is_work_day(&self, date: NaiveDate) -> bool {
        self.work_days[date.weekday().num_days_from_monday() as usize]
    }

    /// Whether the instant lies inside a business window.
    #[must_use]
    pub fn is_business_time(&self, t: NaiveDateTime) -> bool {
        self.is_work_day(t.date()) && t.hour() >= self.start_hour && t.hour() < self.end_hour
    }

    /// Smallest business-window instant at or after `t`.
    ///
    /// Returns `t` unchanged when it already lies inside a window; otherwise
    /// the start of the next window (always a whole-minute boundary).
    #[must_use]
    pub fn next_business_start(&self, t: NaiveDateTime) -> NaiveDateTime {
        if self.is_business_time(t) {
            return t;
        }
        let today = t.date();
        if self.is_work_day(today) && t.hour() < self.start_hour {
            return at_hour(today, self.start_hour);
        }
        let mut day = today;
        loop {
            let Some(next) = day.succ_opt() else {
                return t;
            };
            day = next;
            if self.is_work_day(day) {
                return at_hour(day, self.start_hour);
            }
        }
    }

    /// Business hours between `a` and `b`, walking day by day.
    ///
    /// Each day's window is intersected with `[a, b]`; intersection lengths
    /// are truncated downward to whole minutes before summing. Returns zero
    /// when `a >= b`.
    #[must_use]
    pub fn hours_between(&self, a: NaiveDateTime, b: NaiveDateTime) -> f64 {
        if a >= b {
            return 0.0;
        }
        let mut total_minutes: i64 = 0;
        let mut day = a.date();
        while day <= b.date() {
            if self.is_work_day(day) {
                let window_start = at_hour(day, self.start_hour);
                let window_end = at_hour(day, self.end_hour);
                let lo = window_start.max(a);
                let hi = window_end.min(b);
                if hi > lo {
                    total_minutes += (hi - lo).num_minutes();
                }
            }
            let Some(next) = day.succ_opt() else {
                break;
            };
            day = next;
        }
        total_minutes as f64 / 60.0
    }
}

/// Midnight-anchored instant at the given hour; hour 24 maps to the next
/// day's midnight.
fn at_hour(day: NaiveDate, hour: u32) -> NaiveDateTime {
    if hour >= 24 {
        let next = day.succ_opt().unwrap_or(day);
        return next.and_time(NaiveTime::MIN);
    }
    day.and_hms_opt(hour, 0, 0)
        .unwrap_or_else(|| day.and_time(NaiveTime::MIN))
}
