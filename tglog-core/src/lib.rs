//! # tglog-core
//!
//! Core types for the group message logger: the provider-facing [`RawMessage`], the
//! canonical [`CanonicalMessage`] produced by [`normalize`], the live and historical
//! source traits, the shared error taxonomy, and tracing initialization.
//! Transport-agnostic; used by storage, ingest and tglog-telegram.

pub mod error;
pub mod logger;
pub mod normalizer;
pub mod source;
pub mod types;

pub use error::{FetchError, NormalizationError};
pub use logger::init_tracing;
pub use normalizer::normalize;
pub use source::{
    ChannelEventSource, HistoryPage, HistorySource, LiveEventSource, PageDirection, PageRequest,
};
pub use types::{
    CanonicalMessage, ChatInfo, MediaKind, ParseMediaKindError, RawChat, RawFile, RawMedia,
    RawMessage, RawSender, SenderInfo, ToRawMessage, ToRawSender,
};
