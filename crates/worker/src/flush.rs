//! Periodic metrics flush to ClickHouse.

use std::sync::Arc;

use clickhouse_client::{insert_metrics, ClickHouseClient};
use presence_core::Result;
use telemetry::metrics;
use tracing::debug;

pub struct MetricsFlushWorker {
    clickhouse: Arc<ClickHouseClient>,
}

impl MetricsFlushWorker {
    pub fn new(clickhouse: Arc<ClickHouseClient>) -> Self {
        Self { clickhouse }
    }

    pub async fn run(&self) -> Result<()> {
        let snapshot = metrics().snapshot();
        insert_metrics(&self.clickhouse, &snapshot).await?;
        debug!(
            sessions_created = snapshot.sessions_created,
            events_recorded = snapshot.events_recorded,
            store_errors = snapshot.store_errors,
            "Flushed metrics"
        );
        Ok(())
    }
}
