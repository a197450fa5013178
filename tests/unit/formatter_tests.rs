//! Unit tests for the deterministic message formatter.
//!
//! Validates:
//! - Reminder and escalation bodies enumerate order fields
//! - Display cap with exactly one truncation line stating the overflow
//! - Header reports the full count regardless of truncation
//! - Elapsed rendering uses working hours per day

use chrono::{NaiveDate, NaiveDateTime};

use fieldwatch::models::opportunity::{Opportunity, OpportunityStatus};
use fieldwatch::notify::formatter::MessageFormatter;

fn monday(hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 6, 2)
        .unwrap()
        .and_hms_opt(hour, 0, 0)
        .unwrap()
}

fn opportunity(order_num: &str, elapsed_hours: f64) -> Opportunity {
    let mut opp = Opportunity::new(
        order_num.into(),
        "Acme Ltd".into(),
        "12 Harbor Rd".into(),
        "Wu Lei".into(),
        "North Region".into(),
        monday(9),
        OpportunityStatus::PendingAppointment,
    );
    opp.elapsed_hours = Some(elapsed_hours);
    opp
}

#[test]
fn reminder_enumerates_order_fields() {
    let formatter = MessageFormatter::new(10);
    let body = formatter.format_reminder("North Region", &[opportunity("SO-1", 5.0)], 5);

    assert!(body.contains("Service reminder"));
    assert!(body.contains("North Region"));
    assert!(body.contains("Order: SO-1"));
    assert!(body.contains("Elapsed: 5h"));
    assert!(body.contains("Customer: Acme Ltd"));
    assert!(body.contains("Address: 12 Harbor Rd"));
    assert!(body.contains("Supervisor: Wu Lei"));
    assert!(body.contains("Status: PendingAppointment"));
    assert!(body.contains("1 order(s) need attention"));
}

#[test]
fn escalation_header_reports_full_count_with_truncation_line() {
    let formatter = MessageFormatter::new(10);
    let opps: Vec<Opportunity> = (1..=6)
        .map(|i| opportunity(&format!("SO-{i}"), 10.0))
        .collect();
    let body = formatter.format_escalation("North Region", &opps, 5);

    assert!(body.contains("Orders requiring escalation: 6"));
    assert!(body.contains("Order: SO-5"));
    assert!(!body.contains("Order: SO-6"));
    let truncation_lines = body
        .lines()
        .filter(|line| line.contains("more pending"))
        .count();
    assert_eq!(truncation_lines, 1);
    assert!(body.contains("... 1 more pending"));
}

#[test]
fn no_truncation_line_when_under_the_cap() {
    let formatter = MessageFormatter::new(10);
    let opps: Vec<Opportunity> = (1..=3)
        .map(|i| opportunity(&format!("SO-{i}"), 10.0))
        .collect();
    let body = formatter.format_escalation("North Region", &opps, 5);

    assert!(!body.contains("more pending"));
    assert!(body.contains("Order: SO-3"));
}

#[test]
fn truncation_counts_reflect_the_overflow() {
    let formatter = MessageFormatter::new(10);
    let opps: Vec<Opportunity> = (1..=12)
        .map(|i| opportunity(&format!("SO-{i:02}"), 10.0))
        .collect();

    let body = formatter.format_escalation("North Region", &opps, 5);
    assert!(body.contains("... 7 more pending"));

    let reminder = formatter.format_reminder("North Region", &opps, 5);
    assert!(reminder.contains("... 7 more pending"));
}

#[test]
fn rendering_is_deterministic() {
    let formatter = MessageFormatter::new(10);
    let opps = vec![opportunity("SO-1", 5.0), opportunity("SO-2", 6.0)];

    let first = formatter.format_reminder("North Region", &opps, 5);
    let second = formatter.format_reminder("North Region", &opps, 5);
    assert_eq!(first, second);
}

#[test]
fn elapsed_uses_working_hours_per_day() {
    let formatter = MessageFormatter::new(10);

    let body = formatter.format_reminder("North Region", &[opportunity("SO-1", 12.0)], 5);
    assert!(body.contains("Elapsed: 1d 2h"));

    let short = formatter.format_reminder("North Region", &[opportunity("SO-1", 7.5)], 5);
    assert!(short.contains("Elapsed: 7h"));
}

#[test]
fn unclassified_elapsed_renders_as_unknown() {
    let formatter = MessageFormatter::new(10);
    let mut opp = opportunity("SO-1", 0.0);
    opp.elapsed_hours = None;

    let body = formatter.format_reminder("North Region", &[opp], 5);
    assert!(body.contains("Elapsed: unknown"));
}

#[test]
fn empty_lists_render_empty_strings() {
    let formatter = MessageFormatter::new(10);
    assert!(formatter.format_reminder("North Region", &[], 5).is_empty());
    assert!(formatter.format_escalation("North Region", &[], 5).is_empty());
}
