//! MongoDB health checks.

use mongodb::bson::doc;
use tracing::{debug, error};

use crate::store::MongoSessionStore;

/// Ping the session database.
pub async fn check_connection(store: &MongoSessionStore) -> bool {
    match store.database().run_command(doc! { "ping": 1 }, None).await {
        Ok(_) => {
            debug!("MongoDB connection healthy");
            true
        }
        Err(e) => {
            error!(error = %e, "MongoDB health check failed");
            false
        }
    }
}
