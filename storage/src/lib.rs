//! Storage crate: durable message store for the group logger.
//!
//! ## Modules
//!
//! - [`error`] – StoreError (unavailable vs. database errors)
//! - [`models`] – StoredMessage, GroupRecord, UserRecord, SearchFilters, aggregates
//! - [`hook`] – PersistHook, fire-and-forget notification after upserts
//! - [`message_store`] – MessageStore (SQLite): idempotent upsert, search, aggregates
//! - [`sqlite_pool`] – SqlitePoolManager

mod error;
mod hook;
mod message_store;
mod models;
mod sqlite_pool;


pub use error::StoreError;
pub use hook::PersistHook;
pub use message_store::MessageStore;
pub use models::{
    ChatStatistics, DailyCount, GroupRecord, Metric, SearchFilters, StatisticSnapshot,
    StoredMessage, UserActivity, UserRecord,
};
pub use sqlite_pool::SqlitePoolManager;
