//! Bot API update listener: forwards new and edited messages into a [`ChannelEventSource`].
//!
//! The listener task owns the channel sender; once the dispatcher stops, the source reports end
//! of stream and the ingestor's `listen` returns.

use crate::adapters::TelegramMessageWrapper;
use crate::config::TelegramConfig;
use teloxide::dispatching::ShutdownToken;
use teloxide::prelude::*;
use tglog_core::{ChannelEventSource, FetchError, RawMessage, ToRawMessage};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

type EventSender = mpsc::Sender<Result<RawMessage, FetchError>>;

/// Builds the teloxide Bot, pointing it at a self-hosted API server when configured.
pub fn build_bot(config: &TelegramConfig) -> teloxide::Bot {
    let bot = Bot::new(config.bot_token.clone());
    match &config.api_url {
        Some(url) => {
            info!(api_url = %url, "Using custom Bot API server");
            bot.set_api_url(url.clone())
        }
        None => bot,
    }
}

/// Running update listener.
pub struct UpdateListenerHandle {
    token: ShutdownToken,
    task: JoinHandle<()>,
}

impl UpdateListenerHandle {
    /// Stops polling and waits for in-flight updates to be forwarded.
    pub async fn stop(self) {
        match self.token.shutdown() {
            Ok(done) => {
                done.await;
                if let Err(e) = self.task.await {
                    warn!(error = %e, "Update listener task failed");
                }
            }
            Err(_) => {
                // dispatcher not running yet (or already stopped)
                self.task.abort();
            }
        }
        info!("step: update listener stopped");
    }
}

/// Verifies the token, then starts long polling in a background task.
///
/// A token the Bot API rejects is reported as [`FetchError::Fatal`].
#[instrument(skip(bot))]
pub async fn spawn_update_listener(
    bot: teloxide::Bot,
    capacity: usize,
) -> Result<(ChannelEventSource, UpdateListenerHandle), FetchError> {
    let me = bot
        .get_me()
        .await
        .map_err(|e| FetchError::Fatal(format!("get_me failed: {e}")))?;
    info!(
        bot_username = ?me.user.username,
        "step: connected to Bot API"
    );

    let (tx, source) = ChannelEventSource::channel(capacity);

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(forward))
        .branch(Update::filter_edited_message().endpoint(forward));

    let mut dispatcher = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![tx])
        .default_handler(|_upd| async {})
        .build();
    let token = dispatcher.shutdown_token();

    let task = tokio::spawn(async move {
        dispatcher.dispatch().await;
    });

    Ok((source, UpdateListenerHandle { token, task }))
}

async fn forward(msg: Message, tx: EventSender) -> ResponseResult<()> {
    if msg.chat.is_private() {
        debug!(chat_id = msg.chat.id.0, "Ignoring private chat message");
        return Ok(());
    }
    let raw = TelegramMessageWrapper(&msg).to_raw();
    debug!(
        chat_id = msg.chat.id.0,
        message_id = msg.id.0,
        edited = raw.edit_date.is_some(),
        "Received update"
    );
    if tx.send(Ok(raw)).await.is_err() {
        warn!(
            chat_id = msg.chat.id.0,
            message_id = msg.id.0,
            "Event source closed, dropping update"
        );
    }
    Ok(())
}
