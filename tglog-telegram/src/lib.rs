//! # tglog-telegram
//!
//! Telegram Bot API transport for the logger: adapters from teloxide types to
//! [`tglog_core::RawMessage`], an update listener that feeds new and edited group messages into a
//! [`tglog_core::ChannelEventSource`], and minimal config. No persistence logic.

mod adapters;
mod config;
mod live_source;

pub use adapters::{TelegramMessageWrapper, TelegramUserWrapper};
pub use config::TelegramConfig;
pub use live_source::{build_bot, spawn_update_listener, UpdateListenerHandle};
