//! Message row as persisted in the `messages` table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tglog_core::MediaKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct StoredMessage {
    pub id: i64,
    pub message_id: i64,
    pub chat_id: i64,
    pub group_ref: Option<i64>,
    pub sender_ref: Option<i64>,
    pub chat_title: Option<String>,
    pub sender_id: Option<i64>,
    pub sender_username: Option<String>,
    pub sender_first_name: Option<String>,
    pub sender_last_name: Option<String>,
    pub text: Option<String>,
    pub is_edited: bool,
    /// Lowercase [`MediaKind`] name; NULL when the message has no media.
    pub media_type: Option<String>,
    pub media_ref: Option<String>,
    pub reply_to_message_id: Option<i64>,
    pub message_timestamp: Option<DateTime<Utc>>,
    /// Set on first insert, never rewritten by later upserts.
    pub received_at: DateTime<Utc>,
}

impl StoredMessage {
    /// Media kind of the row; unknown stored names read as [`MediaKind::None`].
    pub fn media_kind(&self) -> MediaKind {
        self.media_type
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }
}
