//! Error types shared by sources, the normalizer and the ingest pipeline.
//!
//! [`NormalizationError`] marks a raw record that cannot be keyed; [`FetchError`] is what
//! live and historical sources report, split into retryable and connection-level failures.

use std::time::Duration;
use thiserror::Error;

/// A raw record could not be mapped to the natural key `(chat_id, message_id)`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizationError {
    #[error("Message has no id (chat_id={chat_id:?})")]
    MissingMessageId { chat_id: Option<i64> },

    #[error("Message {message_id} has no chat id")]
    MissingChatId { message_id: i64 },
}

/// Errors produced by live and historical message sources.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Rate limiting or a connectivity hiccup; worth retrying, optionally after `retry_after`.
    #[error("Transient fetch error: {reason}")]
    Transient {
        reason: String,
        retry_after: Option<Duration>,
    },

    /// The provider session is gone; reconnecting is the supervisor's job.
    #[error("Provider connection lost: {0}")]
    Fatal(String),
}

impl FetchError {
    pub fn transient(reason: impl Into<String>) -> Self {
        FetchError::Transient {
            reason: reason.into(),
            retry_after: None,
        }
    }

    pub fn rate_limited(retry_after: Duration) -> Self {
        FetchError::Transient {
            reason: format!("rate limited, retry after {}s", retry_after.as_secs()),
            retry_after: Some(retry_after),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient { .. })
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            FetchError::Transient { retry_after, .. } => *retry_after,
            FetchError::Fatal(_) => None,
        }
    }
}
