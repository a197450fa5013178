//! Integration tests for the tick orchestrator: full-tick behavior, audit
//! lineage, cache fallback, idempotence, and the single-tick guarantee.

use std::time::Duration as StdDuration;

use fieldwatch::agent::orchestrator::TickTrigger;
use fieldwatch::models::run::RunStatus;
use fieldwatch::AppError;

use super::test_helpers::{monday, raw_row, test_agent};

#[tokio::test]
async fn a_clean_tick_completes_with_full_step_lineage() {
    let agent = test_agent().await;
    agent.zero_pacing().await;
    agent.add_group("North Region", "https://hooks.test/north").await;
    agent.fetcher.set_rows(vec![raw_row(
        "SO-1",
        "North Region",
        "PendingAppointment",
        monday(9, 0) - chrono::Duration::days(30),
    )]);

    let run = agent
        .orchestrator
        .run_tick(TickTrigger::Manual)
        .await
        .expect("tick");

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.opportunities_processed, 1);
    assert!(run.notifications_sent >= 1);
    assert!(run.errors.is_empty());
    assert!(run.end_time.is_some());
    assert_eq!(run.context["trigger"], "manual");

    let steps = agent.runs.list_steps(&run.id).await.expect("steps");
    let names: Vec<&str> = steps.iter().map(|s| s.step_name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "fetchData",
            "analyzeStatus",
            "decideToContinue",
            "planNotifications",
            "sendNotifications",
            "recordResults",
        ]
    );
    assert!(steps.iter().all(|s| s.error_message.is_none()));
}

#[tokio::test]
async fn back_to_back_ticks_create_no_new_tasks() {
    let agent = test_agent().await;
    agent.zero_pacing().await;
    agent.add_group("North Region", "https://hooks.test/north").await;
    agent.fetcher.set_rows(vec![raw_row(
        "SO-1",
        "North Region",
        "PendingAppointment",
        monday(9, 0) - chrono::Duration::days(30),
    )]);

    let first = agent
        .orchestrator
        .run_tick(TickTrigger::Manual)
        .await
        .expect("first tick");
    let sends_after_first = agent.sender.calls().len();
    assert!(sends_after_first >= 1);

    let second = agent
        .orchestrator
        .run_tick(TickTrigger::Manual)
        .await
        .expect("second tick");

    assert_eq!(second.status, RunStatus::Completed);
    assert_eq!(second.notifications_sent, 0);
    assert_eq!(agent.sender.calls().len(), sends_after_first);
    assert_ne!(first.id, second.id);
}

#[tokio::test]
async fn fetch_failure_with_populated_cache_completes_from_cache() {
    let agent = test_agent().await;
    agent.zero_pacing().await;
    agent.add_group("North Region", "https://hooks.test/north").await;
    agent.fetcher.set_rows(vec![raw_row(
        "SO-1",
        "North Region",
        "PendingAppointment",
        monday(9, 0) - chrono::Duration::days(30),
    )]);

    // First tick populates the cache, then the source goes dark.
    agent
        .orchestrator
        .run_tick(TickTrigger::Manual)
        .await
        .expect("warm tick");
    agent.fetcher.set_fail(true);

    let run = agent
        .orchestrator
        .run_tick(TickTrigger::Manual)
        .await
        .expect("cache tick");

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.opportunities_processed, 1);
    assert!(run
        .errors
        .iter()
        .any(|e| e.contains("analytics source unavailable")));
    assert_eq!(run.context["from_cache"], true);
}

#[tokio::test]
async fn fetch_failure_with_empty_cache_completes_with_zero_counts() {
    let agent = test_agent().await;
    agent.zero_pacing().await;
    agent.fetcher.set_fail(true);

    let run = agent
        .orchestrator
        .run_tick(TickTrigger::Manual)
        .await
        .expect("tick");

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.opportunities_processed, 0);
    assert_eq!(run.notifications_sent, 0);
    assert!(!run.errors.is_empty());
}

#[tokio::test]
async fn an_empty_working_set_skips_planning_and_sending() {
    let agent = test_agent().await;
    agent.zero_pacing().await;
    agent.fetcher.set_rows(Vec::new());

    let run = agent
        .orchestrator
        .run_tick(TickTrigger::Manual)
        .await
        .expect("tick");

    assert_eq!(run.status, RunStatus::Completed);

    let steps = agent.runs.list_steps(&run.id).await.expect("steps");
    let names: Vec<&str> = steps.iter().map(|s| s.step_name.as_str()).collect();
    assert!(names.contains(&"decideToContinue"));
    assert!(!names.contains(&"planNotifications"));
    assert!(!names.contains(&"sendNotifications"));
    assert!(names.contains(&"recordResults"));
}

#[tokio::test]
async fn unmonitored_rows_count_toward_totals_but_never_notify() {
    let agent = test_agent().await;
    agent.zero_pacing().await;
    agent.fetcher.set_rows(vec![raw_row(
        "SO-1",
        "North Region",
        "Completed",
        monday(9, 0) - chrono::Duration::days(30),
    )]);

    let run = agent
        .orchestrator
        .run_tick(TickTrigger::Manual)
        .await
        .expect("tick");

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.opportunities_processed, 1);
    assert_eq!(run.notifications_sent, 0);
    assert_eq!(run.context["classification"]["total"], 1);
    assert_eq!(run.context["classification"]["reminder_due"], 0);
    assert_eq!(run.context["classification"]["escalation_due"], 0);
    assert!(agent.tasks.find_pending().await.expect("pending").is_empty());
}

#[tokio::test]
async fn rows_without_create_time_are_skipped_with_the_rest_processed() {
    let agent = test_agent().await;
    agent.zero_pacing().await;
    let mut bad = raw_row("SO-2", "North Region", "PendingAppointment", monday(9, 0));
    bad.create_time = None;
    agent.fetcher.set_rows(vec![
        raw_row(
            "SO-1",
            "North Region",
            "PendingAppointment",
            monday(9, 0) - chrono::Duration::days(30),
        ),
        bad,
    ]);

    let run = agent
        .orchestrator
        .run_tick(TickTrigger::Manual)
        .await
        .expect("tick");

    assert_eq!(run.opportunities_processed, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn overlapping_ticks_are_rejected_as_busy() {
    let agent = test_agent().await;
    agent.zero_pacing().await;
    agent.fetcher.set_delay(StdDuration::from_millis(300));
    agent.fetcher.set_rows(Vec::new());

    let orchestrator = std::sync::Arc::clone(&agent.orchestrator);
    let first = tokio::spawn(async move { orchestrator.run_tick(TickTrigger::Scheduled).await });

    tokio::time::sleep(StdDuration::from_millis(50)).await;
    let second = agent.orchestrator.run_tick(TickTrigger::Manual).await;
    assert!(matches!(second, Err(AppError::Busy(_))));

    let first = first.await.expect("join").expect("first tick");
    assert_eq!(first.status, RunStatus::Completed);
}
