//! Persisted models and query/aggregate shapes.

mod group_record;
mod message_query;
mod message_stats;
mod statistic;
mod stored_message;
mod user_record;

pub use group_record::GroupRecord;
pub use message_query::SearchFilters;
pub use message_stats::{ChatStatistics, DailyCount, UserActivity};
pub use statistic::{Metric, StatisticSnapshot};
pub use stored_message::StoredMessage;
pub use user_record::UserRecord;
