//! Index bootstrap for the sessions collection.

use mongodb::bson::doc;
use mongodb::options::{CreateIndexOptions, IndexOptions};
use mongodb::IndexModel;
use presence_core::{Error, Result};
use tracing::debug;

use crate::store::MongoSessionStore;

fn index(name: &str, keys: mongodb::bson::Document) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(IndexOptions::builder().name(Some(name.to_string())).build())
        .build()
}

/// Indexes backing the reaper scan, per-user history and org history.
pub fn session_indexes() -> Vec<IndexModel> {
    vec![
        index("idx_sessions_active", doc! { "logout_at": 1, "last_active_at": 1 }),
        index("idx_sessions_user", doc! { "user_id": 1, "login_at": -1 }),
        index("idx_sessions_org", doc! { "organization_id": 1, "login_at": -1 }),
    ]
}

pub async fn ensure_indexes(store: &MongoSessionStore) -> Result<()> {
    store
        .collection()
        .create_indexes(session_indexes(), None::<CreateIndexOptions>)
        .await
        .map_err(|e| Error::store("sessions.ensure_indexes", e.to_string()))?;
    debug!("MongoDB session indexes ensured");
    Ok(())
}
