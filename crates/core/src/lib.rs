//! Core types and algorithms for the presence engine: sessions, activity
//! events, presence classification, timeline correlation and usage
//! aggregation, plus the storage traits the backends implement.

pub mod aggregate;
pub mod clock;
pub mod directory;
pub mod error;
pub mod event;
pub mod export;
pub mod format;
pub mod memory;
pub mod presence;
pub mod session;
pub mod store;
pub mod timeline;

pub use clock::{Clock, ManualClock, SystemClock};
pub use directory::{MemberDirectory, MemberProfile, StaticDirectory};
pub use error::{Error, Result};
pub use event::*;
pub use memory::MemoryStore;
pub use presence::{Presence, PresenceRow, PresenceStatus};
pub use session::*;
pub use store::{EventStore, Page, Scope, SessionStore, TimeRange};

pub type UserId = uuid::Uuid;
pub type OrgId = uuid::Uuid;
pub type SessionId = uuid::Uuid;
pub type EventId = uuid::Uuid;
pub type ResourceId = uuid::Uuid;
