//! ClickHouse client wrapper.

use crate::config::ClickHouseConfig;
use clickhouse::Client;
use tracing::info;

/// ClickHouse client bound to the configured database.
#[derive(Clone)]
pub struct ClickHouseClient {
    inner: Client,
    config: ClickHouseConfig,
}

impl ClickHouseClient {
    pub fn new(config: ClickHouseConfig) -> Self {
        let mut client = Client::default()
            .with_url(&config.url)
            .with_database(&config.database);

        if let Some(ref user) = config.username {
            client = client.with_user(user);
        }

        if let Some(ref pass) = config.password {
            client = client.with_password(pass);
        }

        if config.async_insert {
            client = client
                .with_option("async_insert", "1")
                .with_option("wait_for_async_insert", "1");
        }

        info!(
            url = %config.url,
            database = %config.database,
            async_insert = config.async_insert,
            "Created ClickHouse client"
        );

        Self {
            inner: client,
            config,
        }
    }

    /// Returns the inner clickhouse client.
    pub fn inner(&self) -> &Client {
        &self.inner
    }

    /// A client on the server's `default` database, for DDL that must run
    /// before the configured database exists.
    pub fn bootstrap(&self) -> Client {
        self.inner.clone().with_database("default")
    }

    pub fn config(&self) -> &ClickHouseConfig {
        &self.config
    }
}
