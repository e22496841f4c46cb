//! ClickHouse health checks and schema bootstrap.

use crate::client::ClickHouseClient;
use crate::schema::{all_tables, create_database};
use presence_core::{Error, Result};
use tracing::{debug, error};

/// Check ClickHouse connection health.
pub async fn check_connection(client: &ClickHouseClient) -> bool {
    match client.inner().query("SELECT 1").fetch_one::<u8>().await {
        Ok(_) => {
            debug!("ClickHouse connection healthy");
            true
        }
        Err(e) => {
            error!(error = %e, "ClickHouse health check failed");
            false
        }
    }
}

/// Create the database and tables if missing.
pub async fn init_schema(client: &ClickHouseClient) -> Result<()> {
    let config = client.config();
    client
        .bootstrap()
        .query(&create_database(&config.database))
        .execute()
        .await
        .map_err(|e| Error::store("schema.create_database", e.to_string()))?;

    for ddl in all_tables(config.retention_days) {
        client
            .inner()
            .query(&ddl)
            .execute()
            .await
            .map_err(|e| Error::store("schema.create_table", e.to_string()))?;
    }

    debug!(database = %config.database, "ClickHouse schema initialized");
    Ok(())
}
