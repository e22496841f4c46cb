//! MongoDB storage for login sessions.

pub mod config;
pub mod document;
pub mod health;
pub mod schema;
pub mod store;

pub use config::MongoConfig;
pub use store::MongoSessionStore;
