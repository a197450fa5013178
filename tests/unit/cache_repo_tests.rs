//! Unit tests for the opportunity cache repository.
//!
//! Validates:
//! - Full refresh caches only monitored opportunities
//! - Derived SLA fields survive the cache round trip
//! - A second refresh replaces the previous contents whole
//! - Clear and count behavior

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};

use fieldwatch::models::opportunity::{Opportunity, OpportunityStatus};
use fieldwatch::persistence::cache_repo::CacheRepo;
use fieldwatch::persistence::db;
use fieldwatch::sla::{BusinessCalendar, SlaClassifier, SlaThresholds};

fn monday(hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 6, 2)
        .unwrap()
        .and_hms_opt(hour, 0, 0)
        .unwrap()
}

fn opportunity(order: &str, status: &str) -> Opportunity {
    Opportunity::new(
        order.into(),
        "Acme Ltd".into(),
        "12 Harbor Rd".into(),
        "Wu Lei".into(),
        "North Region".into(),
        monday(9),
        OpportunityStatus::parse(status),
    )
}

async fn repo() -> CacheRepo {
    let pool = Arc::new(db::connect_memory().await.expect("db"));
    CacheRepo::new(pool)
}

#[tokio::test]
async fn full_refresh_caches_only_monitored_rows() {
    let repo = repo().await;
    let opps = vec![
        opportunity("SO-1", "PendingAppointment"),
        opportunity("SO-2", "TemporarilyNotVisiting"),
        opportunity("SO-3", "Completed"),
    ];

    let (deleted, inserted) = repo.full_refresh(&opps, monday(12)).await.expect("refresh");

    assert_eq!(deleted, 0);
    assert_eq!(inserted, 2);
    assert_eq!(repo.count().await.expect("count"), 2);
    assert!(repo.get("SO-3").await.expect("get").is_none());
}

#[tokio::test]
async fn derived_fields_survive_the_round_trip() {
    let repo = repo().await;
    let classifier = SlaClassifier::new(BusinessCalendar::default(), SlaThresholds::default());

    let mut opp = opportunity("SO-1", "PendingAppointment");
    let now = monday(18); // 9 business hours elapsed: escalated.
    classifier.assess(&mut opp, now);
    assert!(opp.escalation_due);

    repo.full_refresh(&[opp.clone()], now).await.expect("refresh");
    let cached = repo.get("SO-1").await.expect("get").expect("exists");

    assert_eq!(cached.elapsed_hours, opp.elapsed_hours);
    assert_eq!(cached.reminder_due, opp.reminder_due);
    assert_eq!(cached.escalation_due, opp.escalation_due);
    assert_eq!(cached.escalation_level, opp.escalation_level);
    assert_eq!(cached.progress_ratio, opp.progress_ratio);
    assert_eq!(cached.sla_threshold_hours, opp.sla_threshold_hours);
    assert_eq!(cached.overdue_hours, opp.overdue_hours);
    assert_eq!(cached.source_hash, opp.source_hash);
    assert_eq!(cached.create_time, opp.create_time);
}

#[tokio::test]
async fn second_refresh_replaces_previous_contents() {
    let repo = repo().await;

    repo.full_refresh(
        &[
            opportunity("SO-1", "PendingAppointment"),
            opportunity("SO-2", "PendingAppointment"),
        ],
        monday(10),
    )
    .await
    .expect("first refresh");

    let (deleted, inserted) = repo
        .full_refresh(&[opportunity("SO-3", "PendingAppointment")], monday(11))
        .await
        .expect("second refresh");

    assert_eq!(deleted, 2);
    assert_eq!(inserted, 1);

    let remaining = repo.list_all().await.expect("list");
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].order_num, "SO-3");
}

#[tokio::test]
async fn last_refresh_tracks_the_newest_write() {
    let repo = repo().await;
    assert!(repo.last_refresh().await.expect("empty").is_none());

    repo.full_refresh(&[opportunity("SO-1", "PendingAppointment")], monday(14))
        .await
        .expect("refresh");

    assert_eq!(repo.last_refresh().await.expect("query"), Some(monday(14)));
}

#[tokio::test]
async fn clear_empties_the_cache() {
    let repo = repo().await;
    repo.full_refresh(&[opportunity("SO-1", "PendingAppointment")], monday(10))
        .await
        .expect("refresh");

    assert_eq!(repo.clear().await.expect("clear"), 1);
    assert_eq!(repo.count().await.expect("count"), 0);
}

#[tokio::test]
async fn list_all_is_ordered_by_order_num() {
    let repo = repo().await;
    repo.full_refresh(
        &[
            opportunity("SO-2", "PendingAppointment"),
            opportunity("SO-1", "PendingAppointment"),
        ],
        monday(10),
    )
    .await
    .expect("refresh");

    let all = repo.list_all().await.expect("list");
    let orders: Vec<&str> = all.iter().map(|o| o.order_num.as_str()).collect();
    assert_eq!(orders, vec!["SO-1", "SO-2"]);
}
