//! Cached metric values (`statistics` table), recomputed on demand.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metrics kept in the statistics cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    TotalMessages,
    DistinctSenders,
}

impl Metric {
    pub const ALL: [Metric; 2] = [Metric::TotalMessages, Metric::DistinctSenders];

    pub fn name(&self) -> &'static str {
        match self {
            Metric::TotalMessages => "total_messages",
            Metric::DistinctSenders => "distinct_senders",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct StatisticSnapshot {
    pub group_ref: i64,
    pub metric_name: String,
    pub metric_value: i64,
    pub calculated_at: DateTime<Utc>,
}
