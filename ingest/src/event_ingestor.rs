//! EventIngestor: consumes the live event stream and persists every new or edited message.

use crate::error::IngestError;
use crate::retry::RetryPolicy;
use crate::shutdown::ShutdownSignal;
use storage::{MessageStore, StoredMessage};
use tglog_core::{normalize, FetchError, LiveEventSource, RawMessage};
use tracing::{debug, info, instrument, warn};

/// Counters for one `listen` run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListenReport {
    pub received: u64,
    pub persisted: u64,
    pub failed: u64,
}

#[derive(Clone)]
pub struct EventIngestor {
    store: MessageStore,
    /// Pause after transient source errors; grows while they repeat.
    backoff: RetryPolicy,
}

impl EventIngestor {
    pub fn new(store: MessageStore) -> Self {
        Self {
            store,
            backoff: RetryPolicy::default(),
        }
    }

    pub fn with_backoff(mut self, backoff: RetryPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Normalizes and upserts one raw event. Edits take the same path as new messages.
    pub async fn ingest_one(&self, raw: &RawMessage) -> Result<StoredMessage, IngestError> {
        let record = normalize(raw)?;
        let stored = self.store.upsert(&record).await?;
        Ok(stored)
    }

    /// Runs until shutdown fires, the source ends, or the provider connection is lost.
    ///
    /// A failing event is logged and skipped; it never stops the loop. Transient source errors
    /// are logged and followed by a backoff pause (the provider's `retry_after` when given) before
    /// the loop keeps waiting. A fatal source error returns
    /// [`IngestError::Connectivity`] with nothing partially written.
    #[instrument(skip_all)]
    pub async fn listen<S>(
        &self,
        source: &mut S,
        mut shutdown: ShutdownSignal,
    ) -> Result<ListenReport, IngestError>
    where
        S: LiveEventSource + ?Sized,
    {
        let mut report = ListenReport::default();
        let mut source_errors = 0u32;
        info!("step: listener started");

        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.triggered() => {
                    info!("step: shutdown requested, listener stopping");
                    break;
                }
                event = source.next_event() => event,
            };

            let raw = match event {
                Ok(Some(raw)) => raw,
                Ok(None) => {
                    info!("step: event stream ended");
                    break;
                }
                Err(FetchError::Fatal(reason)) => {
                    warn!(reason = %reason, "Live connection lost");
                    return Err(IngestError::Connectivity(reason));
                }
                Err(e) => {
                    source_errors = source_errors.saturating_add(1);
                    let delay = self.backoff.backoff(source_errors, e.retry_after());
                    warn!(
                        error = %e,
                        consecutive = source_errors,
                        delay_ms = delay.as_millis() as u64,
                        "Transient event source error, backing off"
                    );
                    tokio::select! {
                        biased;
                        _ = shutdown.triggered() => {
                            info!("step: shutdown requested, listener stopping");
                            break;
                        }
                        _ = tokio::time::sleep(delay) => continue,
                    }
                }
            };
            source_errors = 0;

            report.received += 1;
            match self.ingest_one(&raw).await {
                Ok(stored) => {
                    report.persisted += 1;
                    debug!(
                        chat_id = stored.chat_id,
                        message_id = stored.message_id,
                        is_edited = stored.is_edited,
                        "Event persisted"
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        chat_id = ?raw.chat.as_ref().and_then(|c| c.id),
                        message_id = ?raw.id,
                        error = %e,
                        "Failed to ingest event, skipping"
                    );
                }
            }
        }

        info!(
            received = report.received,
            persisted = report.persisted,
            failed = report.failed,
            "step: listener finished"
        );
        Ok(report)
    }
}
