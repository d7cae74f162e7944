//! RecordNormalizer: pure mapping from [`RawMessage`] to [`CanonicalMessage`].
//!
//! No I/O and no clock reads; the ingestion timestamp is assigned by the store.

use crate::error::NormalizationError;
use crate::types::{CanonicalMessage, ChatInfo, MediaKind, RawFile, RawMedia, RawMessage, SenderInfo};

/// Maps a raw provider message to the canonical record.
///
/// Fails only when the natural key cannot be built (no message id or no chat id).
pub fn normalize(raw: &RawMessage) -> Result<CanonicalMessage, NormalizationError> {
    let chat_id = raw.chat.as_ref().and_then(|c| c.id);
    let message_id = raw
        .id
        .ok_or(NormalizationError::MissingMessageId { chat_id })?;
    let chat_id = chat_id.ok_or(NormalizationError::MissingChatId { message_id })?;

    // unwrap_or_default: chat_id is Some, so raw.chat is Some
    let raw_chat = raw.chat.clone().unwrap_or_default();
    let chat = ChatInfo {
        chat_id,
        title: raw_chat.title,
        username: raw_chat.username,
        is_channel: raw_chat.is_channel,
        is_group: raw_chat.is_group,
        members_count: raw_chat.members_count,
    };

    let sender = raw.sender.as_ref().and_then(|s| {
        s.id.map(|user_id| SenderInfo {
            user_id,
            username: s.username.clone(),
            first_name: s.first_name.clone(),
            last_name: s.last_name.clone(),
            is_bot: s.is_bot,
        })
    });

    let (media_kind, media_ref) = classify_media(&raw.media);

    Ok(CanonicalMessage {
        message_id,
        chat,
        sender,
        text: raw.text.clone(),
        is_edited: raw.edit_date.is_some(),
        media_kind,
        media_ref,
        reply_to_message_id: raw.reply_to_message_id,
        message_timestamp: raw.date,
    })
}

/// First match wins: photo > video > document > audio > voice.
fn classify_media(media: &RawMedia) -> (MediaKind, Option<String>) {
    let ordered: [(MediaKind, &Option<RawFile>); 5] = [
        (MediaKind::Photo, &media.photo),
        (MediaKind::Video, &media.video),
        (MediaKind::Document, &media.document),
        (MediaKind::Audio, &media.audio),
        (MediaKind::Voice, &media.voice),
    ];
    ordered
        .into_iter()
        .find_map(|(kind, file)| file.as_ref().map(|f| (kind, f.file_id.clone())))
        .unwrap_or((MediaKind::None, None))
}
