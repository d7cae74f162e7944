//! [`HistorySource`] over a Telegram Desktop chat export (`result.json`).
//!
//! The Bot API cannot read chat history, so backfill reads what Telegram Desktop exports with
//! "Export chat history" in JSON format. Export chat ids are mapped to Bot API ids
//! (`-100…` for supergroups and channels, negative for basic groups) so backfilled rows share
//! keys with live updates.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use tglog_core::{
    FetchError, HistoryPage, HistorySource, PageDirection, PageRequest, RawChat, RawFile,
    RawMedia, RawMessage, RawSender,
};
use tracing::{debug, info};

const SUPERGROUP_ID_OFFSET: i64 = 1_000_000_000_000;

#[derive(Debug, Deserialize)]
struct ExportFile {
    name: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    id: i64,
    #[serde(default)]
    messages: Vec<ExportMessage>,
}

#[derive(Debug, Deserialize)]
struct ExportMessage {
    id: Option<i64>,
    #[serde(rename = "type")]
    kind: Option<String>,
    date: Option<String>,
    date_unixtime: Option<String>,
    edited: Option<String>,
    edited_unixtime: Option<String>,
    from: Option<String>,
    from_id: Option<String>,
    #[serde(default)]
    text: Value,
    photo: Option<String>,
    file: Option<String>,
    media_type: Option<String>,
    reply_to_message_id: Option<i64>,
}

pub struct ExportHistorySource {
    chat: RawChat,
    chat_id: i64,
    /// Sorted by message id, newest first.
    messages: Vec<RawMessage>,
}

impl ExportHistorySource {
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Read export file {}", path.display()))?;
        let source = Self::from_json_str(&json)
            .with_context(|| format!("Parse export file {}", path.display()))?;
        info!(
            path = %path.display(),
            chat_id = source.chat_id,
            messages = source.messages.len(),
            "Loaded chat export"
        );
        Ok(source)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let export: ExportFile = serde_json::from_str(json)?;
        let kind = export.kind.as_deref().unwrap_or("");
        let chat_id = bot_api_chat_id(kind, export.id);
        let chat = RawChat {
            id: Some(chat_id),
            title: export.name,
            username: None,
            is_channel: kind.ends_with("_channel"),
            is_group: kind.ends_with("_group") || kind.ends_with("_supergroup"),
            members_count: None,
        };

        let total = export.messages.len();
        let mut messages: Vec<RawMessage> = export
            .messages
            .into_iter()
            .filter(|m| m.kind.as_deref().unwrap_or("message") == "message")
            .map(|m| to_raw(m, &chat))
            .collect();
        messages.sort_by_key(|m| std::cmp::Reverse(m.id));
        debug!(
            chat_id,
            total,
            kept = messages.len(),
            "Skipped service entries"
        );

        Ok(Self {
            chat,
            chat_id,
            messages,
        })
    }

    /// Bot API id of the exported chat.
    pub fn chat_id(&self) -> i64 {
        self.chat_id
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[async_trait]
impl HistorySource for ExportHistorySource {
    async fn describe_chat(&self, chat_id: i64) -> Result<RawChat, FetchError> {
        if chat_id != self.chat_id {
            return Err(FetchError::Fatal(format!(
                "export holds chat {}, not {chat_id}",
                self.chat_id
            )));
        }
        Ok(self.chat.clone())
    }

    async fn fetch_page(
        &self,
        chat_id: i64,
        request: &PageRequest,
    ) -> Result<HistoryPage, FetchError> {
        if chat_id != self.chat_id {
            return Ok(HistoryPage::default());
        }

        let ordered: Box<dyn Iterator<Item = &RawMessage>> = match request.direction {
            PageDirection::NewestFirst => Box::new(self.messages.iter()),
            PageDirection::OldestFirst => Box::new(self.messages.iter().rev()),
        };
        let after_cursor = |m: &&RawMessage| match (request.offset_id, m.id) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(offset), Some(id)) => match request.direction {
                PageDirection::NewestFirst => id < offset,
                PageDirection::OldestFirst => id > offset,
            },
        };

        let mut remaining = ordered.filter(after_cursor);
        let messages: Vec<RawMessage> = remaining.by_ref().take(request.limit).cloned().collect();
        let next_offset = match remaining.next() {
            Some(_) => messages.last().and_then(|m| m.id),
            None => None,
        };
        Ok(HistoryPage {
            messages,
            next_offset,
        })
    }
}

fn bot_api_chat_id(kind: &str, export_id: i64) -> i64 {
    match kind {
        "public_supergroup" | "private_supergroup" | "public_channel" | "private_channel" => {
            -(SUPERGROUP_ID_OFFSET + export_id)
        }
        "private_group" => -export_id,
        _ => export_id,
    }
}

fn to_raw(m: ExportMessage, chat: &RawChat) -> RawMessage {
    RawMessage {
        id: m.id,
        chat: Some(chat.clone()),
        sender: sender(m.from_id.as_deref(), m.from),
        text: flatten_text(&m.text),
        media: media(m.photo, m.file, m.media_type.as_deref()),
        reply_to_message_id: m.reply_to_message_id,
        edit_date: timestamp(m.edited_unixtime.as_deref(), m.edited.as_deref()),
        date: timestamp(m.date_unixtime.as_deref(), m.date.as_deref()),
    }
}

/// Only `user<id>` authors are senders; channel posts have none.
fn sender(from_id: Option<&str>, from: Option<String>) -> Option<RawSender> {
    let id = from_id?.strip_prefix("user")?.parse().ok()?;
    Some(RawSender {
        id: Some(id),
        username: None,
        first_name: from,
        last_name: None,
        is_bot: false,
    })
}

/// Plain string, or an array of strings and `{ "type": .., "text": .. }` entities.
fn flatten_text(text: &Value) -> Option<String> {
    let flat = match text {
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|part| match part {
                Value::String(s) => Some(s.as_str()),
                Value::Object(entity) => entity.get("text").and_then(Value::as_str),
                _ => None,
            })
            .collect(),
        _ => return None,
    };
    (!flat.is_empty()).then_some(flat)
}

fn media(photo: Option<String>, file: Option<String>, media_type: Option<&str>) -> RawMedia {
    let mut media = RawMedia {
        photo: photo.map(exported_file),
        ..Default::default()
    };
    if let Some(file) = file.map(exported_file) {
        match media_type {
            Some("video_file") | Some("video_message") => media.video = Some(file),
            Some("audio_file") => media.audio = Some(file),
            Some("voice_message") => media.voice = Some(file),
            _ => media.document = Some(file),
        }
    }
    media
}

/// Files left out of the export appear as a "(File not included…)" placeholder.
fn exported_file(path: String) -> RawFile {
    if path.starts_with('(') {
        RawFile::default()
    } else {
        RawFile::with_id(path)
    }
}

fn timestamp(unixtime: Option<&str>, local: Option<&str>) -> Option<DateTime<Utc>> {
    unixtime
        .and_then(|s| s.parse::<i64>().ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .or_else(|| {
            local
                .and_then(|s| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").ok())
                .map(|naive| naive.and_utc())
        })
}
