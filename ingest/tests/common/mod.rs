//! Shared fixtures for ingest integration tests: a scripted history source and raw message builders.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use ingest::{RetryPolicy, ScanConfig};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use storage::MessageStore;
use tempfile::TempDir;
use tglog_core::{
    FetchError, HistoryPage, HistorySource, PageRequest, RawChat, RawMessage, RawSender,
};

pub async fn fresh_store() -> (TempDir, MessageStore) {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("ingest.db");
    let store = MessageStore::open(&path.to_string_lossy(), 5)
        .await
        .expect("Failed to open store");
    (dir, store)
}

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

pub fn chat(chat_id: i64) -> RawChat {
    RawChat {
        id: Some(chat_id),
        title: Some(format!("Group {chat_id}")),
        is_group: true,
        ..Default::default()
    }
}

/// A live-style message: carries its chat, sent by user `message_id % 3 + 1`.
pub fn raw(chat_id: i64, message_id: i64, text: &str) -> RawMessage {
    RawMessage {
        id: Some(message_id),
        chat: Some(chat(chat_id)),
        sender: Some(RawSender {
            id: Some(message_id % 3 + 1),
            username: Some(format!("user{}", message_id % 3 + 1)),
            ..Default::default()
        }),
        text: Some(text.to_string()),
        date: Some(base_time() + Duration::hours(message_id)),
        ..Default::default()
    }
}

/// A history-style message without chat identity, sent `message_id` hours after [`base_time`].
pub fn history_entry(message_id: i64) -> RawMessage {
    RawMessage {
        chat: None,
        ..raw(0, message_id, &format!("history {message_id}"))
    }
}

/// `1..=n` history entries.
pub fn history(n: i64) -> Vec<RawMessage> {
    (1..=n).map(history_entry).collect()
}

pub fn fast_config(page_size: usize) -> ScanConfig {
    ScanConfig {
        page_size,
        progress_every: 5,
        retry: RetryPolicy {
            max_attempts: 3,
            initial_backoff: std::time::Duration::from_millis(1),
            max_backoff: std::time::Duration::from_millis(5),
        },
    }
}

/// In-memory history of one chat, paged newest-first by message id, with scripted failures.
pub struct ScriptedHistory {
    chat: RawChat,
    /// Sorted by id descending.
    messages: Vec<RawMessage>,
    /// Error returned on a specific `fetch_page` call (0-based).
    errors_at: Mutex<HashMap<usize, FetchError>>,
    /// Every call from this index on fails with the given error.
    fail_from: Option<(usize, FetchError)>,
    pub fetch_calls: AtomicUsize,
    /// Total messages handed out across pages.
    pub served: AtomicUsize,
}

impl ScriptedHistory {
    pub fn new(chat_id: i64, mut messages: Vec<RawMessage>) -> Self {
        messages.sort_by_key(|m| std::cmp::Reverse(m.id));
        Self {
            chat: chat(chat_id),
            messages,
            errors_at: Mutex::new(HashMap::new()),
            fail_from: None,
            fetch_calls: AtomicUsize::new(0),
            served: AtomicUsize::new(0),
        }
    }

    pub fn error_at(self, call: usize, error: FetchError) -> Self {
        self.errors_at.lock().unwrap().insert(call, error);
        self
    }

    pub fn fail_from(mut self, call: usize, error: FetchError) -> Self {
        self.fail_from = Some((call, error));
        self
    }
}

#[async_trait]
impl HistorySource for ScriptedHistory {
    async fn describe_chat(&self, _chat_id: i64) -> Result<RawChat, FetchError> {
        Ok(self.chat.clone())
    }

    async fn fetch_page(
        &self,
        _chat_id: i64,
        request: &PageRequest,
    ) -> Result<HistoryPage, FetchError> {
        let call = self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.errors_at.lock().unwrap().remove(&call) {
            return Err(error);
        }
        if let Some((from, error)) = &self.fail_from {
            if call >= *from {
                return Err(error.clone());
            }
        }

        let older: Vec<&RawMessage> = self
            .messages
            .iter()
            .filter(|m| match (request.offset_id, m.id) {
                (Some(offset), Some(id)) => id < offset,
                (Some(_), None) => false,
                (None, _) => true,
            })
            .collect();
        let page: Vec<RawMessage> = older
            .iter()
            .take(request.limit)
            .map(|m| (*m).clone())
            .collect();
        let next_offset = if older.len() > page.len() {
            page.last().and_then(|m| m.id)
        } else {
            None
        };
        self.served.fetch_add(page.len(), Ordering::SeqCst);
        Ok(HistoryPage {
            messages: page,
            next_offset,
        })
    }
}
