//! Presence Engine
//!
//! Tracks login sessions and member activity:
//! - Session lifecycle (login, heartbeat, logout) over MongoDB
//! - Append-only activity events over ClickHouse
//! - Background reaper for sessions that stopped sending heartbeats
//! - Periodic flush of internal metrics

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use clickhouse_client::{ClickHouseClient, ClickHouseConfig, ClickHouseEventStore};
use mongo_store::{MongoConfig, MongoSessionStore};
use presence_core::{EventStore, MemoryStore, SessionStore, StaticDirectory};
use telemetry::{health, init_tracing_from_env};
use tracker::{Tracker, TrackerConfig};
use worker::{WorkerConfig, WorkerScheduler};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Backend {
    /// Everything in process; state is lost on restart.
    Memory,
    /// Sessions in MongoDB, events in ClickHouse.
    #[default]
    External,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StorageConfig {
    #[serde(default)]
    backend: Backend,
}

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Config {
    #[serde(default)]
    storage: StorageConfig,

    #[serde(default)]
    mongo: MongoConfig,

    #[serde(default)]
    clickhouse: ClickHouseConfig,

    #[serde(default)]
    tracker: TrackerConfig,

    #[serde(default)]
    worker: WorkerConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    init_tracing_from_env();

    info!("Starting Presence Engine v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;
    info!(
        backend = ?config.storage.backend,
        op_timeout_ms = config.tracker.op_timeout_ms,
        reaper_interval_secs = config.worker.reaper_interval_secs,
        inactive_threshold_secs = config.worker.inactive_threshold_secs,
        "Loaded configuration"
    );

    let (sessions, events, clickhouse) = match config.storage.backend {
        Backend::Memory => {
            let store = Arc::new(MemoryStore::new());
            health().sessions.set_healthy();
            health().events.set_healthy();
            warn!("Using in-memory storage; sessions and events are not persisted");
            (
                store.clone() as Arc<dyn SessionStore>,
                store as Arc<dyn EventStore>,
                None,
            )
        }
        Backend::External => {
            let mongo = MongoSessionStore::connect(&config.mongo)
                .await
                .context("Failed to create MongoDB client")?;
            if let Err(e) = mongo_store::schema::ensure_indexes(&mongo).await {
                error!("Failed to create session indexes: {}", e);
                // Continue anyway - indexes might already exist
            }

            let clickhouse = ClickHouseClient::new(config.clickhouse.clone());
            if let Err(e) = clickhouse_client::health::init_schema(&clickhouse).await {
                error!("Failed to initialize ClickHouse schema: {}", e);
                // Continue anyway - schema might already exist
            }

            check_health(&mongo, &clickhouse).await;

            (
                Arc::new(mongo) as Arc<dyn SessionStore>,
                Arc::new(ClickHouseEventStore::new(clickhouse.clone())) as Arc<dyn EventStore>,
                Some(Arc::new(clickhouse)),
            )
        }
    };

    let tracker = Arc::new(Tracker::new(
        sessions,
        events,
        Arc::new(StaticDirectory::new()),
        config.tracker.clone(),
    ));

    // Start background workers
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut scheduler = WorkerScheduler::new(config.worker.clone(), tracker, shutdown_rx);
    if let Some(clickhouse) = clickhouse {
        scheduler = scheduler.with_clickhouse(clickhouse);
    }
    let worker_handles = Arc::new(scheduler).start();

    match serde_json::to_string(&health().report()) {
        Ok(report) => info!(health = %report, ready = health().is_ready(), "Engine running"),
        Err(e) => warn!("Failed to render health report: {}", e),
    }

    shutdown_signal().await;

    // Cleanup
    info!("Shutting down...");
    if shutdown_tx.send(true).is_err() {
        warn!("All workers already stopped");
    }
    for handle in worker_handles {
        if let Err(e) = handle.await {
            error!("Worker task failed: {}", e);
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// Load configuration from files and environment.
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        // Start with defaults
        .add_source(config::Config::try_from(&Config::default())?)
        // Load from config file if exists
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        // Override with environment variables
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("PRESENCE")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut config: Config = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    // The config crate's nested parsing doesn't work reliably with underscored field names
    if let Ok(backend) = std::env::var("PRESENCE_STORAGE_BACKEND") {
        config.storage.backend = match backend.trim().to_ascii_lowercase().as_str() {
            "memory" => Backend::Memory,
            "external" => Backend::External,
            other => anyhow::bail!("Unknown storage backend {:?}", other),
        };
    }

    // MongoDB
    if let Ok(url) = std::env::var("PRESENCE_MONGO_URL") {
        config.mongo.url = url;
    }
    if let Ok(database) = std::env::var("PRESENCE_MONGO_DATABASE") {
        config.mongo.database = database;
    }

    // ClickHouse
    if let Ok(url) = std::env::var("PRESENCE_CLICKHOUSE_URL") {
        config.clickhouse.url = url;
    }
    if let Ok(database) = std::env::var("PRESENCE_CLICKHOUSE_DATABASE") {
        config.clickhouse.database = database;
    }
    if let Ok(username) = std::env::var("PRESENCE_CLICKHOUSE_USERNAME") {
        config.clickhouse.username = Some(username);
    }
    if let Ok(password) = std::env::var("PRESENCE_CLICKHOUSE_PASSWORD") {
        config.clickhouse.password = Some(password);
    }

    // Tracker and workers
    if let Some(ms) = env_u64("PRESENCE_OP_TIMEOUT_MS")? {
        config.tracker.op_timeout_ms = ms;
    }
    if let Some(secs) = env_u64("PRESENCE_REAPER_INTERVAL_SECS")? {
        config.worker.reaper_interval_secs = secs;
    }
    if let Some(secs) = env_u64("PRESENCE_INACTIVE_THRESHOLD_SECS")? {
        config.worker.inactive_threshold_secs = secs;
    }

    Ok(config)
}

fn env_u64(key: &str) -> Result<Option<u64>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{} must be a whole number, got {:?}", key, raw)),
        Err(_) => Ok(None),
    }
}

/// Check component health on startup.
async fn check_health(mongo: &MongoSessionStore, clickhouse: &ClickHouseClient) {
    // Check MongoDB
    if mongo_store::health::check_connection(mongo).await {
        health().sessions.set_healthy();
        info!("MongoDB connection: healthy");
    } else {
        health().sessions.set_unhealthy("Connection failed");
        error!("MongoDB connection: unhealthy");
    }

    // Check ClickHouse
    if clickhouse_client::health::check_connection(clickhouse).await {
        health().events.set_healthy();
        info!("ClickHouse connection: healthy");
    } else {
        health().events.set_unhealthy("Connection failed");
        error!("ClickHouse connection: unhealthy");
    }
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
