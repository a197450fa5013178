//! Integration tests for the data-sync strategy: fresh fetch with full
//! cache rebuild, graceful cache fallback, raw-row mapping rules, and the
//! operator utilities.

use fieldwatch::models::now_local;
use fieldwatch::sla::{BusinessCalendar, SlaClassifier, SlaThresholds};
use fieldwatch::source::{self, RawOpportunity};
use fieldwatch::AppError;

use super::test_helpers::{monday, raw_row, test_agent};

fn classifier() -> SlaClassifier {
    SlaClassifier::new(BusinessCalendar::default(), SlaThresholds::default())
}

#[tokio::test]
async fn fresh_fetch_rebuilds_the_cache_with_monitored_rows() {
    let agent = test_agent().await;
    agent.fetcher.set_rows(vec![
        raw_row("SO-1", "North Region", "PendingAppointment", monday(9, 0)),
        raw_row("SO-2", "North Region", "Completed", monday(9, 0)),
    ]);

    let outcome = agent
        .sync
        .get_opportunities(&classifier(), now_local(), false)
        .await
        .expect("fetch");

    assert_eq!(outcome.opportunities.len(), 2);
    assert!(!outcome.from_cache);
    assert!(outcome.fetch_error.is_none());
    // Only the monitored row lands in the cache.
    assert_eq!(agent.sync.cache_statistics().await.expect("stats").total_cached, 1);
}

#[tokio::test]
async fn source_failure_falls_back_to_cached_rows() {
    let agent = test_agent().await;
    agent.fetcher.set_rows(vec![raw_row(
        "SO-1",
        "North Region",
        "PendingAppointment",
        monday(9, 0),
    )]);

    agent
        .sync
        .get_opportunities(&classifier(), now_local(), false)
        .await
        .expect("warm cache");

    agent.fetcher.set_fail(true);
    let outcome = agent
        .sync
        .get_opportunities(&classifier(), now_local(), false)
        .await
        .expect("fallback");

    assert!(outcome.from_cache);
    assert_eq!(outcome.opportunities.len(), 1);
    assert_eq!(outcome.opportunities[0].order_num, "SO-1");
    assert!(outcome
        .fetch_error
        .as_deref()
        .is_some_and(|e| e.contains("analytics source unavailable")));
    // Fallback rows are re-classified against the current instant.
    assert!(outcome.opportunities[0].elapsed_hours.is_some());
}

#[tokio::test]
async fn source_failure_with_an_empty_cache_propagates() {
    let agent = test_agent().await;
    agent.fetcher.set_fail(true);

    let result = agent
        .sync
        .get_opportunities(&classifier(), now_local(), false)
        .await;

    assert!(matches!(result, Err(AppError::Fetch(_))));
}

#[tokio::test]
async fn manual_refresh_reports_row_counts() {
    let agent = test_agent().await;
    agent.fetcher.set_rows(vec![
        raw_row("SO-1", "North Region", "PendingAppointment", monday(9, 0)),
        raw_row("SO-2", "South Region", "TemporarilyNotVisiting", monday(9, 0)),
    ]);

    let (deleted, inserted) = agent
        .sync
        .refresh_cache(&classifier(), now_local())
        .await
        .expect("refresh");
    assert_eq!((deleted, inserted), (0, 2));

    agent.fetcher.set_rows(vec![raw_row(
        "SO-3",
        "North Region",
        "PendingAppointment",
        monday(9, 0),
    )]);
    let (deleted, inserted) = agent
        .sync
        .refresh_cache(&classifier(), now_local())
        .await
        .expect("second refresh");
    assert_eq!((deleted, inserted), (2, 1));
}

#[tokio::test]
async fn consistency_report_compares_cache_and_source() {
    let agent = test_agent().await;
    agent.fetcher.set_rows(vec![raw_row(
        "SO-1",
        "North Region",
        "PendingAppointment",
        monday(9, 0),
    )]);

    agent
        .sync
        .refresh_cache(&classifier(), now_local())
        .await
        .expect("refresh");

    let report = agent
        .sync
        .validate_consistency(now_local())
        .await
        .expect("report");
    assert_eq!(report.cached_count, 1);
    assert_eq!(report.fresh_count, 1);
    assert!(report.consistent);
}

#[tokio::test]
async fn clear_cache_empties_the_fallback() {
    let agent = test_agent().await;
    agent.fetcher.set_rows(vec![raw_row(
        "SO-1",
        "North Region",
        "PendingAppointment",
        monday(9, 0),
    )]);
    agent
        .sync
        .refresh_cache(&classifier(), now_local())
        .await
        .expect("refresh");

    assert_eq!(agent.sync.clear_cache().await.expect("clear"), 1);
    assert_eq!(
        agent.sync.cache_statistics().await.expect("stats").total_cached,
        0
    );
}

#[test]
fn map_raw_applies_the_mapping_rules() {
    let rows = vec![
        raw_row("SO-1", "North Region", "PendingAppointment", monday(9, 0)),
        RawOpportunity {
            create_time: None,
            ..raw_row("SO-2", "North Region", "PendingAppointment", monday(9, 0))
        },
        RawOpportunity {
            order_num: String::new(),
            ..raw_row("SO-3", "North Region", "PendingAppointment", monday(9, 0))
        },
        RawOpportunity {
            create_time: Some("garbage".into()),
            ..raw_row("SO-4", "North Region", "PendingAppointment", monday(9, 0))
        },
        raw_row("SO-5", "North Region", "SomethingNew", monday(9, 0)),
    ];

    let mapped = source::map_raw(rows);
    let orders: Vec<&str> = mapped.iter().map(|o| o.order_num.as_str()).collect();

    assert_eq!(orders, vec!["SO-1", "SO-5"]);
    // Unknown statuses stay in the working set but are not monitored.
    assert!(!mapped[1].is_monitored());
}

#[test]
fn map_raw_accepts_offset_timestamps() {
    let mut row = raw_row("SO-1", "North Region", "PendingAppointment", monday(9, 0));
    row.create_time = Some("2025-06-02T09:00:00+08:00".into());

    let mapped = source::map_raw(vec![row]);
    assert_eq!(mapped.len(), 1);
    assert_eq!(mapped[0].create_time, monday(9, 0));
}
