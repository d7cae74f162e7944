//! Shared fixtures for storage integration tests.

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use storage::MessageStore;
use tempfile::TempDir;
use tglog_core::{CanonicalMessage, ChatInfo, MediaKind, SenderInfo};

/// Opens a store on a fresh SQLite file in a temp dir so each test gets an isolated DB.
/// Keep the returned `TempDir` alive for the duration of the test.
pub async fn fresh_store() -> (TempDir, MessageStore) {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("test.db");
    let store = MessageStore::open(&path.to_string_lossy(), 5)
        .await
        .expect("Failed to open store");
    (dir, store)
}

pub fn sender(user_id: i64, username: &str) -> SenderInfo {
    SenderInfo {
        user_id,
        username: Some(username.to_string()),
        first_name: Some(username.to_uppercase()),
        last_name: None,
        is_bot: false,
    }
}

pub fn message(
    chat_id: i64,
    message_id: i64,
    sender: Option<SenderInfo>,
    text: Option<&str>,
    at: DateTime<Utc>,
) -> CanonicalMessage {
    CanonicalMessage {
        message_id,
        chat: ChatInfo {
            chat_id,
            title: Some(format!("Chat {chat_id}")),
            username: None,
            is_channel: false,
            is_group: true,
            members_count: None,
        },
        sender,
        text: text.map(str::to_string),
        is_edited: false,
        media_kind: MediaKind::None,
        media_ref: None,
        reply_to_message_id: None,
        message_timestamp: Some(at),
    }
}
