//! Common test setup functions.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use clickhouse_client::{ClickHouseClient, ClickHouseConfig, ClickHouseEventStore};
use mongo_store::{MongoConfig, MongoSessionStore};
use presence_core::{ManualClock, MemoryStore, StaticDirectory};
use tracker::{Tracker, TrackerConfig};

use crate::containers::TestContainers;
use crate::mocks::FlakyEventStore;

/// Tracker over the in-memory store with a manual clock.
pub struct TestContext {
    pub store: Arc<MemoryStore>,
    pub events: FlakyEventStore,
    pub directory: Arc<StaticDirectory>,
    pub clock: Arc<ManualClock>,
    pub tracker: Arc<Tracker>,
}

impl TestContext {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self::with_config(start, TrackerConfig::default())
    }

    pub fn with_config(start: DateTime<Utc>, config: TrackerConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let events = FlakyEventStore::new(store.clone());
        let directory = Arc::new(StaticDirectory::new());
        let clock = Arc::new(ManualClock::new(start));

        let tracker = Tracker::new(
            store.clone(),
            Arc::new(events.clone()),
            directory.clone(),
            config,
        )
        .with_clock(clock.clone());

        Self {
            store,
            events,
            directory,
            clock,
            tracker: Arc::new(tracker),
        }
    }

    pub fn set_time(&self, at: DateTime<Utc>) {
        self.clock.set(at);
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    /// Break or restore the event store.
    pub fn set_events_failure(&self, should_fail: bool) {
        self.events.set_should_fail(should_fail);
    }
}

/// Tracker over real MongoDB and ClickHouse containers.
pub struct ExternalContext {
    pub containers: TestContainers,
    pub sessions: Arc<MongoSessionStore>,
    pub clickhouse: ClickHouseClient,
    pub clock: Arc<ManualClock>,
    pub tracker: Arc<Tracker>,
}

impl ExternalContext {
    pub async fn new(start: DateTime<Utc>) -> Self {
        let containers = TestContainers::start().await;

        let mongo_config = MongoConfig {
            url: containers.mongo_url.clone(),
            database: format!("presence_test_{}", uuid::Uuid::new_v4().simple()),
            ..MongoConfig::default()
        };
        let sessions = MongoSessionStore::connect(&mongo_config)
            .await
            .expect("Failed to create MongoDB client");
        mongo_store::schema::ensure_indexes(&sessions)
            .await
            .expect("Failed to create session indexes");

        let clickhouse = ClickHouseClient::new(ClickHouseConfig {
            url: containers.clickhouse_url.clone(),
            database: containers.clickhouse_database.clone(),
            username: containers.clickhouse_username.clone(),
            password: containers.clickhouse_password.clone(),
            ..ClickHouseConfig::default()
        });
        clickhouse_client::health::init_schema(&clickhouse)
            .await
            .expect("Failed to initialize schema");

        let sessions = Arc::new(sessions);
        let clock = Arc::new(ManualClock::new(start));
        let tracker = Tracker::new(
            sessions.clone(),
            Arc::new(ClickHouseEventStore::new(clickhouse.clone())),
            Arc::new(StaticDirectory::new()),
            TrackerConfig::default(),
        )
        .with_clock(clock.clone());

        Self {
            containers,
            sessions,
            clickhouse,
            clock,
            tracker: Arc::new(tracker),
        }
    }
}
