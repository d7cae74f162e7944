//! Source abstractions for the live event stream and paged chat history.
//!
//! [`LiveEventSource`] and [`HistorySource`] are transport-agnostic; tglog-telegram feeds a
//! [`ChannelEventSource`] from Bot API updates and the binary reads history from exports.

use crate::error::FetchError;
use crate::types::{RawChat, RawMessage};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Unbounded stream of raw message events (new and edited messages).
#[async_trait]
pub trait LiveEventSource: Send {
    /// Waits for the next event. `Ok(None)` means the stream has ended.
    /// Must be cancel-safe: dropping the future loses no event.
    async fn next_event(&mut self) -> Result<Option<RawMessage>, FetchError>;
}

/// Iteration order of a history page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageDirection {
    NewestFirst,
    OldestFirst,
}

/// One page request. `offset_id` is the exclusive cursor returned by the previous page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub offset_id: Option<i64>,
    pub limit: usize,
    pub direction: PageDirection,
}

/// One page of history; `next_offset == None` means no further pages.
#[derive(Debug, Clone, Default)]
pub struct HistoryPage {
    pub messages: Vec<RawMessage>,
    pub next_offset: Option<i64>,
}

/// Page-backed access to a chat's message history.
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Resolves chat identity (title, kind flags) for messages that do not carry it.
    async fn describe_chat(&self, chat_id: i64) -> Result<RawChat, FetchError>;

    /// Fetches one page of raw messages.
    async fn fetch_page(&self, chat_id: i64, request: &PageRequest)
        -> Result<HistoryPage, FetchError>;
}

/// [`LiveEventSource`] over a tokio channel. Producers (update listeners, tests) hold the sender.
pub struct ChannelEventSource {
    rx: mpsc::Receiver<Result<RawMessage, FetchError>>,
}

impl ChannelEventSource {
    /// Creates a bounded channel and returns the producer half with the source.
    pub fn channel(capacity: usize) -> (mpsc::Sender<Result<RawMessage, FetchError>>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { rx })
    }
}

#[async_trait]
impl LiveEventSource for ChannelEventSource {
    async fn next_event(&mut self) -> Result<Option<RawMessage>, FetchError> {
        match self.rx.recv().await {
            Some(Ok(raw)) => Ok(Some(raw)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}
