//! Testcontainer setup for MongoDB and ClickHouse.
//!
//! Either container can be replaced by an already-running server through
//! `PRESENCE_TEST_MONGO_URL` / `PRESENCE_TEST_CLICKHOUSE_URL`.

use std::time::Duration;
use testcontainers::{
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
    ContainerAsync, GenericImage, ImageExt,
};

/// Container handles for the session and event stores.
pub struct TestContainers {
    #[allow(dead_code)]
    mongo: Option<ContainerAsync<GenericImage>>,
    #[allow(dead_code)]
    clickhouse: Option<ContainerAsync<GenericImage>>,
    pub mongo_url: String,
    pub clickhouse_url: String,
    pub clickhouse_database: String,
    pub clickhouse_username: Option<String>,
    pub clickhouse_password: Option<String>,
}

fn env_url(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl TestContainers {
    /// Start both containers unless overridden by the environment.
    pub async fn start() -> Self {
        let (mongo, mongo_url) = match env_url("PRESENCE_TEST_MONGO_URL") {
            Some(url) => (None, url),
            None => {
                let (container, url) = start_mongo().await;
                (Some(container), url)
            }
        };

        if let Some(url) = env_url("PRESENCE_TEST_CLICKHOUSE_URL") {
            return Self {
                mongo,
                clickhouse: None,
                mongo_url,
                clickhouse_url: url,
                clickhouse_database: std::env::var("PRESENCE_TEST_CLICKHOUSE_DB")
                    .unwrap_or_else(|_| "presence".to_string()),
                clickhouse_username: std::env::var("PRESENCE_TEST_CLICKHOUSE_USER").ok(),
                clickhouse_password: std::env::var("PRESENCE_TEST_CLICKHOUSE_PASSWORD").ok(),
            };
        }

        let (clickhouse, clickhouse_url) = start_clickhouse().await;

        Self {
            mongo,
            clickhouse: Some(clickhouse),
            mongo_url,
            clickhouse_url,
            clickhouse_database: "presence".to_string(),
            clickhouse_username: Some("default".to_string()),
            clickhouse_password: None,
        }
    }
}

/// Start MongoDB container, return container and connection string.
pub async fn start_mongo() -> (ContainerAsync<GenericImage>, String) {
    let image = GenericImage::new("mongo", "7.0")
        .with_wait_for(WaitFor::message_on_stdout("Waiting for connections"))
        .with_exposed_port(27017.tcp());

    let container = image.start().await.expect("Failed to start MongoDB");
    let port = container.get_host_port_ipv4(27017).await.unwrap();
    (container, format!("mongodb://127.0.0.1:{}", port))
}

/// Start ClickHouse container, return container and HTTP URL.
pub async fn start_clickhouse() -> (ContainerAsync<GenericImage>, String) {
    // CLICKHOUSE_DEFAULT_ACCESS_MANAGEMENT=1 allows creating users without password
    let image = GenericImage::new("clickhouse/clickhouse-server", "24.3")
        .with_wait_for(WaitFor::seconds(5))
        .with_exposed_port(8123.tcp())
        .with_env_var("CLICKHOUSE_DB", "presence")
        .with_env_var("CLICKHOUSE_DEFAULT_ACCESS_MANAGEMENT", "1")
        .with_env_var("CLICKHOUSE_USER", "default")
        .with_env_var("CLICKHOUSE_PASSWORD", "");

    let container = image.start().await.expect("Failed to start ClickHouse");

    let port = container.get_host_port_ipv4(8123).await.unwrap();
    let url = format!("http://127.0.0.1:{}", port);

    // Wait for HTTP endpoint to be ready
    wait_for_http(&url, Duration::from_secs(30)).await;

    (container, url)
}

/// Wait for HTTP endpoint to respond.
async fn wait_for_http(url: &str, timeout: Duration) {
    let client = reqwest::Client::new();
    let start = std::time::Instant::now();

    while start.elapsed() < timeout {
        if let Ok(resp) = client.get(url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    panic!("HTTP endpoint {} not ready after {:?}", url, timeout);
}
