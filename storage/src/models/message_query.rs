//! Filters for MessageStore::search. All set filters are combined with AND.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFilters {
    pub chat_id: Option<i64>,
    /// Case-insensitive substring of the message text. Empty means no text filter.
    pub text_query: Option<String>,
    pub sender_id: Option<i64>,
    /// Inclusive lower bound on the message timestamp.
    pub date_from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on the message timestamp.
    pub date_to: Option<DateTime<Utc>>,
}

impl SearchFilters {
    pub fn chat(chat_id: i64) -> Self {
        Self {
            chat_id: Some(chat_id),
            ..Default::default()
        }
    }

    pub fn with_text(mut self, text_query: impl Into<String>) -> Self {
        self.text_query = Some(text_query.into());
        self
    }

    pub fn with_sender(mut self, sender_id: i64) -> Self {
        self.sender_id = Some(sender_id);
        self
    }

    pub fn between(mut self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        self.date_from = from;
        self.date_to = to;
        self
    }
}
