use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Row of the `groups` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct GroupRecord {
    pub id: i64,
    pub chat_id: i64,
    pub title: Option<String>,
    pub username: Option<String>,
    pub is_channel: bool,
    pub is_group: bool,
    pub members_count: Option<i64>,
    pub added_at: DateTime<Utc>,
    /// Backfill watermark; set when a scan of this chat completes.
    pub last_scanned_at: Option<DateTime<Utc>>,
}
