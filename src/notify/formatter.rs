//! Deterministic notification message rendering.
//!
//! Pure string construction for a `(group, tier, opportunity-list)` triple.
//! Enumerates up to a configurable display cap; escalation bodies that
//! truncate always carry a single line stating how many more are pending.

use crate::models::opportunity::Opportunity;

/// Renders reminder and escalation message bodies.
///
/// Elapsed durations are business hours; the day/hour split uses the
/// calendar's working hours per day, not wall-clock days.
#[derive(Debug, Clone)]
pub struct MessageFormatter {
    work_hours_per_day: u32,
}

impl MessageFormatter {
    /// Build a formatter for a calendar with the given working day length.
    #[must_use]
    pub fn new(work_hours_per_day: u32) -> Self {
        Self {
            work_hours_per_day: work_hours_per_day.max(1),
        }
    }

    /// Render a first-tier reminder for one organization's breaching orders.
    #[must_use]
    pub fn format_reminder(
        &self,
        org_name: &str,
        opportunities: &[Opportunity],
        display_cap: usize,
    ) -> String {
        if opportunities.is_empty() {
            return String::new();
        }

        let mut lines = Vec::new();
        lines.push(format!("**Service reminder** ({org_name})"));
        lines.push(String::new());
        lines.push(format!(
            "{} order(s) need attention:",
            opportunities.len()
        ));
        lines.push(String::new());

        for (index, opp) in opportunities.iter().take(display_cap).enumerate() {
            lines.push(format!("{:02}. Order: {}", index + 1, opp.order_num));
            lines.push(format!("    Elapsed: {}", self.format_elapsed(opp)));
            lines.push(format!("    Customer: {}", opp.customer_name));
            lines.push(format!("    Address: {}", opp.address));
            lines.push(format!("    Supervisor: {}", opp.supervisor_name));
            lines.push(format!(
                "    Created: {}",
                opp.create_time.format("%m-%d %H:%M")
            ));
            lines.push(format!("    Status: {}", opp.status));
            lines.push(String::new());
        }

        if opportunities.len() > display_cap {
            lines.push(format!(
                "... {} more pending",
                opportunities.len() - display_cap
            ));
            lines.push(String::new());
        }

        lines.push("Please follow up promptly.".to_owned());
        lines.join("\n")
    }

    /// Render a second-tier escalation for one organization.
    ///
    /// The header always reports the full count; when the body truncates,
    /// exactly one trailing line states how many entries were elided.
    #[must_use]
    pub fn format_escalation(
        &self,
        org_name: &str,
        opportunities: &[Opportunity],
        display_cap: usize,
    ) -> String {
        if opportunities.is_empty() {
            return String::new();
        }

        let mut lines = Vec::new();
        lines.push("**Operations escalation**".to_owned());
        lines.push(String::new());
        lines.push(format!("Organization: {org_name}"));
        lines.push(format!(
            "Orders requiring escalation: {}",
            opportunities.len()
        ));
        lines.push(String::new());

        for (index, opp) in opportunities.iter().take(display_cap).enumerate() {
            lines.push(format!("{}. Order: {}", index + 1, opp.order_num));
            lines.push(format!("   Elapsed: {}", self.format_elapsed(opp)));
            lines.push(format!("   Customer: {}", opp.customer_name));
            lines.push(format!("   Supervisor: {}", opp.supervisor_name));
            lines.push(format!("   Status: {}", opp.status));
            lines.push(format!(
                "   Created: {}",
                opp.create_time.format("%m-%d %H:%M")
            ));
            lines.push(String::new());
        }

        if opportunities.len() > display_cap {
            lines.push(format!(
                "... {} more pending",
                opportunities.len() - display_cap
            ));
            lines.push(String::new());
        }

        lines.push("Operations team intervention required.".to_owned());
        lines.join("\n")
    }

    /// Coarse `Xd Yh` rendering of an opportunity's elapsed business hours.
    fn format_elapsed(&self, opp: &Opportunity) -> String {
        let Some(hours) = opp.elapsed_hours else {
            return "unknown".to_owned();
        };
        let per_day = f64::from(self.work_hours_per_day);
        let days = (hours / per_day).floor() as u64;
        let remainder = (hours - days as f64 * per_day).floor() as u64;
        if days > 0 {
            format!("{days}d {remainder}h")
        } else {
            format!("{remainder}h")
        }
    }
}
