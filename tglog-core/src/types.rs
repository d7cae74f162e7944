//! Core types: the raw provider message every adapter fills, and the canonical record
//! the store persists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Chat (group, supergroup or channel) as seen by the provider. Every field is optional;
/// adapters fill what the transport exposes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawChat {
    pub id: Option<i64>,
    pub title: Option<String>,
    pub username: Option<String>,
    pub is_channel: bool,
    pub is_group: bool,
    pub members_count: Option<i64>,
}

/// Message author. `id == None` means the provider could not resolve a sender.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSender {
    pub id: Option<i64>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_bot: bool,
}

/// One attached file marker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawFile {
    pub file_id: Option<String>,
}

impl RawFile {
    pub fn with_id(file_id: impl Into<String>) -> Self {
        Self {
            file_id: Some(file_id.into()),
        }
    }
}

/// Media markers as reported by the provider. More than one may be set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMedia {
    pub photo: Option<RawFile>,
    pub video: Option<RawFile>,
    pub document: Option<RawFile>,
    pub audio: Option<RawFile>,
    pub voice: Option<RawFile>,
}

/// A message or message event exactly as delivered by a live or historical source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    pub id: Option<i64>,
    pub chat: Option<RawChat>,
    pub sender: Option<RawSender>,
    pub text: Option<String>,
    pub media: RawMedia,
    pub reply_to_message_id: Option<i64>,
    pub edit_date: Option<DateTime<Utc>>,
    pub date: Option<DateTime<Utc>>,
}

/// Converts a transport-specific sender into a [`RawSender`].
pub trait ToRawSender: Send + Sync {
    fn to_raw(&self) -> RawSender;
}

/// Converts a transport-specific message into a [`RawMessage`].
pub trait ToRawMessage: Send + Sync {
    fn to_raw(&self) -> RawMessage;
}

/// Kind of media attached to a message. Exactly one per message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    #[default]
    None,
    Photo,
    Video,
    Document,
    Audio,
    Voice,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::None => "none",
            MediaKind::Photo => "photo",
            MediaKind::Video => "video",
            MediaKind::Document => "document",
            MediaKind::Audio => "audio",
            MediaKind::Voice => "voice",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown media kind: {0}")]
pub struct ParseMediaKindError(pub String);

impl FromStr for MediaKind {
    type Err = ParseMediaKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(MediaKind::None),
            "photo" => Ok(MediaKind::Photo),
            "video" => Ok(MediaKind::Video),
            "document" => Ok(MediaKind::Document),
            "audio" => Ok(MediaKind::Audio),
            "voice" => Ok(MediaKind::Voice),
            other => Err(ParseMediaKindError(other.to_string())),
        }
    }
}

/// Chat identity carried by a canonical message; feeds the `groups` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatInfo {
    pub chat_id: i64,
    pub title: Option<String>,
    pub username: Option<String>,
    pub is_channel: bool,
    pub is_group: bool,
    pub members_count: Option<i64>,
}

/// Resolved sender; feeds the `users` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SenderInfo {
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_bot: bool,
}

/// Normalized message keyed by `(chat.chat_id, message_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalMessage {
    pub message_id: i64,
    pub chat: ChatInfo,
    pub sender: Option<SenderInfo>,
    pub text: Option<String>,
    pub is_edited: bool,
    pub media_kind: MediaKind,
    pub media_ref: Option<String>,
    pub reply_to_message_id: Option<i64>,
    pub message_timestamp: Option<DateTime<Utc>>,
}

impl CanonicalMessage {
    /// Natural key `(chat_id, message_id)`.
    pub fn key(&self) -> (i64, i64) {
        (self.chat.chat_id, self.message_id)
    }
}
