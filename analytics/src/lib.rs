//! # Analytics
//!
//! [`QueryService`]: reporting reads composed from [`storage::MessageStore`] queries. Holds no
//! state besides the store handle; the only write it may trigger is a statistics cache refresh.

mod query_service;

pub use query_service::{ActivityTimeline, QueryService, TOP_USERS_WINDOW_DAYS};
