//! Unit tests for the run and step repository.
//!
//! Validates:
//! - Run creation, closure, and retrieval with JSON columns intact
//! - Step rows in execution order
//! - Retention purge removes finished runs and their steps, children first

use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde_json::json;

use fieldwatch::models::run::{AgentRun, RunStatus, RunStep};
use fieldwatch::persistence::db;
use fieldwatch::persistence::run_repo::RunRepo;

fn monday(hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 6, 2)
        .unwrap()
        .and_hms_opt(hour, 0, 0)
        .unwrap()
}

async fn repo() -> RunRepo {
    let pool = Arc::new(db::connect_memory().await.expect("db"));
    RunRepo::new(pool)
}

#[tokio::test]
async fn create_and_get_round_trip() {
    let repo = repo().await;
    let run = AgentRun::start(monday(10), json!({ "trigger": "manual" }));

    repo.create(&run).await.expect("create");
    let fetched = repo
        .get_by_id(&run.id)
        .await
        .expect("query")
        .expect("exists");

    assert_eq!(fetched.status, RunStatus::Running);
    assert_eq!(fetched.context["trigger"], "manual");
    assert!(fetched.end_time.is_none());
}

#[tokio::test]
async fn finish_records_counters_and_errors() {
    let repo = repo().await;
    let run = AgentRun::start(monday(10), json!({}));
    repo.create(&run).await.expect("create");

    repo.finish(
        &run.id,
        RunStatus::Completed,
        monday(10) + Duration::seconds(42),
        7,
        2,
        &json!({ "from_cache": false }),
        &["fetch hiccup".to_owned()],
    )
    .await
    .expect("finish");

    let fetched = repo
        .get_by_id(&run.id)
        .await
        .expect("query")
        .expect("exists");
    assert_eq!(fetched.status, RunStatus::Completed);
    assert_eq!(fetched.opportunities_processed, 7);
    assert_eq!(fetched.notifications_sent, 2);
    assert_eq!(fetched.errors, vec!["fetch hiccup".to_owned()]);
    assert_eq!(fetched.duration_seconds(), Some(42.0));
}

#[tokio::test]
async fn steps_are_listed_in_execution_order() {
    let repo = repo().await;
    let run = AgentRun::start(monday(10), json!({}));
    repo.create(&run).await.expect("create");

    for (offset, name) in ["fetchData", "analyzeStatus", "recordResults"]
        .iter()
        .enumerate()
    {
        let step = RunStep::new(
            &run.id,
            name,
            json!({}),
            json!({ "ok": true }),
            monday(10) + Duration::seconds(offset as i64),
            0.1,
            None,
        );
        repo.insert_step(&step).await.expect("insert step");
    }

    let steps = repo.list_steps(&run.id).await.expect("list");
    let names: Vec<&str> = steps.iter().map(|s| s.step_name.as_str()).collect();
    assert_eq!(names, vec!["fetchData", "analyzeStatus", "recordResults"]);
}

#[tokio::test]
async fn step_error_message_round_trips() {
    let repo = repo().await;
    let run = AgentRun::start(monday(10), json!({}));
    repo.create(&run).await.expect("create");

    let step = RunStep::new(
        &run.id,
        "planNotifications",
        json!({}),
        json!({}),
        monday(10),
        0.5,
        Some("db: locked".into()),
    );
    repo.insert_step(&step).await.expect("insert");

    let steps = repo.list_steps(&run.id).await.expect("list");
    assert_eq!(steps[0].error_message.as_deref(), Some("db: locked"));
}

#[tokio::test]
async fn list_recent_returns_newest_first() {
    let repo = repo().await;

    let old = AgentRun::start(monday(9), json!({}));
    repo.create(&old).await.expect("create old");
    let new = AgentRun::start(monday(15), json!({}));
    repo.create(&new).await.expect("create new");

    let recent = repo.list_recent(10).await.expect("list");
    assert_eq!(recent[0].id, new.id);
    assert_eq!(recent[1].id, old.id);
}

#[tokio::test]
async fn purge_removes_finished_runs_and_steps_only() {
    let repo = repo().await;
    let old_time = monday(9) - Duration::days(60);

    let finished = AgentRun::start(old_time, json!({}));
    repo.create(&finished).await.expect("create finished");
    repo.finish(&finished.id, RunStatus::Completed, old_time, 0, 0, &json!({}), &[])
        .await
        .expect("finish");
    repo.insert_step(&RunStep::new(
        &finished.id,
        "fetchData",
        json!({}),
        json!({}),
        old_time,
        0.1,
        None,
    ))
    .await
    .expect("step");

    let still_running = AgentRun::start(old_time, json!({}));
    repo.create(&still_running).await.expect("create running");

    let (runs, steps) = repo
        .purge_finished_before(monday(9) - Duration::days(30))
        .await
        .expect("purge");

    assert_eq!(runs, 1);
    assert_eq!(steps, 1);
    assert!(repo
        .get_by_id(&finished.id)
        .await
        .expect("query")
        .is_none());
    assert!(repo
        .get_by_id(&still_running.id)
        .await
        .expect("query")
        .is_some());
}
