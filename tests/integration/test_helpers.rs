//! Shared test helpers for manager and orchestrator integration tests.
//!
//! Provides a programmable fake fetcher, a recording webhook sender, and
//! construction of the fully wired agent over an in-memory database so
//! individual test modules focus on behavior rather than boilerplate.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};

use fieldwatch::agent::orchestrator::TickOrchestrator;
use fieldwatch::agent::tracker::RunTracker;
use fieldwatch::config::Settings;
use fieldwatch::models::group::GroupConfig;
use fieldwatch::notify::advisor::NoopAdvisor;
use fieldwatch::notify::manager::NotificationManager;
use fieldwatch::notify::routing::GroupRoutingRegistry;
use fieldwatch::notify::webhook::WebhookSender;
use fieldwatch::persistence::cache_repo::CacheRepo;
use fieldwatch::persistence::db;
use fieldwatch::persistence::group_repo::GroupRepo;
use fieldwatch::persistence::run_repo::RunRepo;
use fieldwatch::persistence::settings_repo::SettingsRepo;
use fieldwatch::persistence::task_repo::TaskRepo;
use fieldwatch::source::{OpportunityFetcher, RawOpportunity};
use fieldwatch::sync::DataSyncStrategy;
use fieldwatch::{AppError, Result};

pub const ESCALATION_WEBHOOK: &str = "https://hooks.test/escalation";

/// 2025-06-02 is a Monday; the default calendar works 09:00-19:00.
pub fn monday(hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 6, 2)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap()
}

/// Build a raw source row for the given order.
pub fn raw_row(order: &str, org: &str, status: &str, create: NaiveDateTime) -> RawOpportunity {
    RawOpportunity {
        order_num: order.into(),
        name: format!("Customer {order}"),
        address: "12 Harbor Rd".into(),
        supervisor_name: "Wu Lei".into(),
        org_name: org.into(),
        create_time: Some(create.format("%Y-%m-%dT%H:%M:%S").to_string()),
        order_status: status.into(),
    }
}

/// Settings tuned for tests: no webhook pacing delay.
pub fn test_settings() -> Settings {
    Settings {
        webhook_api_interval_secs: 0,
        ..Settings::default()
    }
}

/// Programmable opportunity source.
#[derive(Default)]
pub struct FakeFetcher {
    rows: Mutex<Vec<RawOpportunity>>,
    fail: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl FakeFetcher {
    pub fn set_rows(&self, rows: Vec<RawOpportunity>) {
        *self.rows.lock().unwrap() = rows;
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }
}

impl OpportunityFetcher for FakeFetcher {
    fn fetch(&self) -> Pin<Box<dyn Future<Output = Result<Vec<RawOpportunity>>> + Send + '_>> {
        let delay = *self.delay.lock().unwrap();
        let fail = self.fail.load(Ordering::SeqCst);
        let rows = self.rows.lock().unwrap().clone();
        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if fail {
                return Err(AppError::Fetch("analytics source unavailable".into()));
            }
            Ok(rows)
        })
    }
}

/// One recorded webhook delivery.
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub url: String,
    pub body: String,
}

/// Webhook sender that records calls instead of performing I/O.
#[derive(Default)]
pub struct RecordingSender {
    calls: Mutex<Vec<SentMessage>>,
    fail: AtomicBool,
}

impl RecordingSender {
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<SentMessage> {
        self.calls.lock().unwrap().clone()
    }
}

impl WebhookSender for RecordingSender {
    fn send(
        &self,
        webhook_url: &str,
        text_body: &str,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        self.calls.lock().unwrap().push(SentMessage {
            url: webhook_url.to_owned(),
            body: text_body.to_owned(),
        });
        let ok = !self.fail.load(Ordering::SeqCst);
        Box::pin(async move { ok })
    }
}

/// Fully wired agent over an in-memory database.
pub struct TestAgent {
    pub fetcher: Arc<FakeFetcher>,
    pub sender: Arc<RecordingSender>,
    pub sync: Arc<DataSyncStrategy>,
    pub manager: Arc<NotificationManager>,
    pub orchestrator: Arc<TickOrchestrator>,
    pub tasks: TaskRepo,
    pub runs: RunRepo,
    pub groups: GroupRepo,
    pub settings: SettingsRepo,
}

impl TestAgent {
    /// Register an enabled chat group for an organization.
    pub async fn add_group(&self, org: &str, webhook: &str) {
        let group = GroupConfig::new(org, &format!("{org} group"), webhook, monday(8, 0));
        self.groups.upsert(&group).await.expect("upsert group");
    }

    /// Routing registry as the execute phase would load it.
    pub async fn routing(&self) -> GroupRoutingRegistry {
        GroupRoutingRegistry::load(&self.groups, ESCALATION_WEBHOOK.to_owned())
            .await
            .expect("load routing")
    }

    /// Disable webhook pacing so orchestrator ticks run at test speed.
    pub async fn zero_pacing(&self) {
        self.settings
            .set("webhook_api_interval", "0", None, monday(8, 0))
            .await
            .expect("set pacing");
    }
}

/// Build the full agent stack over a fresh in-memory database.
pub async fn test_agent() -> TestAgent {
    let db = Arc::new(db::connect_memory().await.expect("db"));
    let fetcher = Arc::new(FakeFetcher::default());
    let sender = Arc::new(RecordingSender::default());

    let cache_repo = CacheRepo::new(Arc::clone(&db));
    let tasks = TaskRepo::new(Arc::clone(&db));
    let runs = RunRepo::new(Arc::clone(&db));
    let groups = GroupRepo::new(Arc::clone(&db));
    let settings = SettingsRepo::new(Arc::clone(&db));

    let sync = Arc::new(DataSyncStrategy::new(
        Arc::clone(&fetcher) as Arc<dyn OpportunityFetcher>,
        cache_repo,
    ));
    let manager = Arc::new(NotificationManager::new(
        tasks.clone(),
        Arc::clone(&sync),
        Arc::clone(&sender) as Arc<dyn WebhookSender>,
        Arc::new(NoopAdvisor),
    ));
    let orchestrator = Arc::new(TickOrchestrator::new(
        Arc::clone(&sync),
        Arc::clone(&manager),
        RunTracker::new(runs.clone()),
        settings.clone(),
        groups.clone(),
        ESCALATION_WEBHOOK.to_owned(),
    ));

    TestAgent {
        fetcher,
        sender,
        sync,
        manager,
        orchestrator,
        tasks,
        runs,
        groups,
        settings,
    }
}
