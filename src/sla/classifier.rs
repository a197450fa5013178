//! SLA classifier: derives the notification-relevant fields of an
//! opportunity from its status, creation time, and the current instant.
//!
//! Classification is a pure function of `(create_time, status, now,
//! thresholds, calendar)` and performs no I/O; identical inputs yield
//! identical derived fields.

use chrono::NaiveDateTime;

use crate::models::opportunity::{Opportunity, OpportunityStatus};

use super::BusinessCalendar;

/// Progress ratio at which an opportunity counts as approaching escalation.
const APPROACHING_RATIO: f64 = 0.8;

/// Per-status SLA threshold table, in business hours.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlaThresholds {
    /// Reminder threshold for pending-appointment orders.
    pub pending_reminder: f64,
    /// Escalation threshold for pending-appointment orders.
    pub pending_escalation: f64,
    /// Reminder threshold for temporarily-not-visiting orders.
    pub not_visiting_reminder: f64,
    /// Escalation threshold for temporarily-not-visiting orders.
    pub not_visiting_escalation: f64,
}

impl Default for SlaThresholds {
    fn default() -> Self {
        Self {
            pending_reminder: 4.0,
            pending_escalation: 8.0,
            not_visiting_reminder: 8.0,
            not_visiting_escalation: 16.0,
        }
    }
}

impl SlaThresholds {
    /// `(reminder, escalation)` thresholds for a status, or `None` when the
    /// status is not monitored.
    #[must_use]
    pub fn for_status(&self, status: &OpportunityStatus) -> Option<(f64, f64)> {
        match status {
            OpportunityStatus::PendingAppointment => {
                Some((self.pending_reminder, self.pending_escalation))
            }
            OpportunityStatus::TemporarilyNotVisiting => {
                Some((self.not_visiting_reminder, self.not_visiting_escalation))
            }
            OpportunityStatus::Other(_) => None,
        }
    }
}

/// Aggregate counts over one classified working set.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ClassificationStats {
    /// Working-set size, monitored or not.
    pub total: usize,
    /// Opportunities in a monitored status.
    pub monitored: usize,
    /// Opportunities past their reminder threshold.
    pub reminder_due: usize,
    /// Opportunities past their escalation threshold.
    pub escalation_due: usize,
    /// Opportunities at 80% of the escalation threshold, not yet breached.
    pub approaching: usize,
    /// Distinct organizations with at least one escalating opportunity.
    pub escalation_orgs: usize,
}

/// Pure classifier combining the calendar and the threshold table.
#[derive(Debug, Clone)]
pub struct SlaClassifier {
    calendar: BusinessCalendar,
    thresholds: SlaThresholds,
}

impl SlaClassifier {
    /// Construct a classifier from a calendar and threshold table.
    #[must_use]
    pub fn new(calendar: BusinessCalendar, thresholds: SlaThresholds) -> Self {
        Self {
            calendar,
            thresholds,
        }
    }

    /// The calendar this classifier measures elapsed time with.
    #[must_use]
    pub fn calendar(&self) -> &BusinessCalendar {
        &self.calendar
    }

    /// Fill the derived SLA fields of one opportunity in place.
    ///
    /// Elapsed business hours are always computed; an unmonitored status
    /// leaves every flag false and the progress ratio at zero. Threshold
    /// comparisons are strictly greater-than: an elapsed time exactly equal
    /// to a threshold does not flag.
    pub fn assess(&self, opportunity: &mut Opportunity, now: NaiveDateTime) {
        let elapsed = self.calendar.hours_between(opportunity.create_time, now);
        opportunity.elapsed_hours = Some(elapsed);

        let Some((reminder_threshold, escalation_threshold)) =
            self.thresholds.for_status(&opportunity.status)
        else {
            opportunity.reminder_due = false;
            opportunity.escalation_due = false;
            opportunity.approaching_escalation = false;
            opportunity.overdue_hours = 0.0;
            opportunity.escalation_level = 0;
            opportunity.progress_ratio = 0.0;
            opportunity.sla_threshold_hours = None;
            return;
        };

        opportunity.reminder_due = elapsed > reminder_threshold;
        opportunity.escalation_due = elapsed > escalation_threshold;
        opportunity.progress_ratio = if escalation_threshold > 0.0 {
            (elapsed / escalation_threshold).min(1.0)
        } else {
            0.0
        };
        opportunity.approaching_escalation =
            !opportunity.escalation_due && opportunity.progress_ratio >= APPROACHING_RATIO;
        opportunity.overdue_hours = (elapsed - escalation_threshold).max(0.0);
        opportunity.escalation_level = u8::from(opportunity.escalation_due);
        opportunity.sla_threshold_hours = Some(escalation_threshold);
    }

    /// Classify a whole working set and report aggregate counts.
    pub fn assess_all(
        &self,
        opportunities: &mut [Opportunity],
        now: NaiveDateTime,
    ) -> ClassificationStats {
        let mut stats = ClassificationStats {
            total: opportunities.len(),
            ..ClassificationStats::default()
        };
        let mut escalation_orgs = std::collections::BTreeSet::new();
        for opportunity in opportunities.iter_mut() {
            self.assess(opportunity, now);
            if opportunity.is_monitored() {
                stats.monitored += 1;
            }
            if opportunity.reminder_due {
                stats.reminder_due += 1;
            }
            if opportunity.escalation_due {
                stats.escalation_due += 1;
                escalation_orgs.insert(opportunity.org_name.clone());
            }
            if opportunity.approaching_escalation {
                stats.approaching += 1;
            }
        }
        stats.escalation_orgs = escalation_orgs.len();
        stats
    }
}
