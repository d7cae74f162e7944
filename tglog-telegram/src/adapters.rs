//! Adapters from Telegram (teloxide) types to tglog_core raw types.

use teloxide::types::{Chat, FileMeta};
use tglog_core::{RawChat, RawFile, RawMedia, RawMessage, RawSender, ToRawMessage, ToRawSender};

/// Wraps a teloxide User for conversion to [`RawSender`].
pub struct TelegramUserWrapper<'a>(pub &'a teloxide::types::User);

impl<'a> ToRawSender for TelegramUserWrapper<'a> {
    fn to_raw(&self) -> RawSender {
        RawSender {
            id: Some(self.0.id.0 as i64),
            username: self.0.username.clone(),
            first_name: Some(self.0.first_name.clone()),
            last_name: self.0.last_name.clone(),
            is_bot: self.0.is_bot,
        }
    }
}

/// Wraps a teloxide Message (new or edited) for conversion to [`RawMessage`].
pub struct TelegramMessageWrapper<'a>(pub &'a teloxide::types::Message);

impl<'a> ToRawMessage for TelegramMessageWrapper<'a> {
    fn to_raw(&self) -> RawMessage {
        let msg = self.0;
        RawMessage {
            id: Some(i64::from(msg.id.0)),
            chat: Some(raw_chat(&msg.chat)),
            sender: msg.from.as_ref().map(|u| TelegramUserWrapper(u).to_raw()),
            text: msg.text().or_else(|| msg.caption()).map(str::to_string),
            media: self.media(),
            reply_to_message_id: msg.reply_to_message().map(|m| i64::from(m.id.0)),
            edit_date: msg.edit_date().copied(),
            date: Some(msg.date),
        }
    }
}

impl<'a> TelegramMessageWrapper<'a> {
    /// Every media marker the message carries; the normalizer picks one.
    fn media(&self) -> RawMedia {
        let msg = self.0;
        RawMedia {
            // largest size is last
            photo: msg.photo().and_then(|sizes| sizes.last()).map(|p| file(&p.file)),
            video: msg
                .video()
                .map(|v| file(&v.file))
                .or_else(|| msg.video_note().map(|v| file(&v.file))),
            document: msg
                .document()
                .map(|d| file(&d.file))
                .or_else(|| msg.animation().map(|a| file(&a.file)))
                .or_else(|| msg.sticker().map(|s| file(&s.file))),
            audio: msg.audio().map(|a| file(&a.file)),
            voice: msg.voice().map(|v| file(&v.file)),
        }
    }
}

fn file(meta: &FileMeta) -> RawFile {
    RawFile::with_id(meta.id.0.clone())
}

fn raw_chat(chat: &Chat) -> RawChat {
    RawChat {
        id: Some(chat.id.0),
        title: chat.title().map(str::to_string),
        username: chat.username().map(str::to_string),
        is_channel: chat.is_channel(),
        is_group: chat.is_group() || chat.is_supergroup(),
        members_count: None,
    }
}
