//! BackfillScanner: pages through a chat's history and upserts every message.
//!
//! Pages are requested newest-first. Each message commits on its own, so a long scan never holds
//! a transaction open and an interrupted scan can simply be run again.

use crate::error::IngestError;
use crate::retry::{retry, Retried, RetryPolicy};
use crate::shutdown::ShutdownSignal;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use storage::{MessageStore, StoreError};
use tglog_core::{
    normalize, FetchError, HistoryPage, HistorySource, PageDirection, PageRequest, RawChat,
    RawMessage,
};
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub page_size: usize,
    /// Log a progress line every this many processed messages.
    pub progress_every: u64,
    pub retry: RetryPolicy,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            progress_every: 100,
            retry: RetryPolicy::default(),
        }
    }
}

/// Per-invocation options.
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Upper bound on messages fetched from the source (not just saved).
    pub limit: Option<usize>,
    /// Messages older than this are skipped.
    pub start_date: Option<DateTime<Utc>>,
    /// Also floor the scan at the group's last-scanned watermark.
    pub resume: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    RetriesExhausted(FetchError),
    StoreUnavailable(String),
    Shutdown,
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbortReason::RetriesExhausted(e) => write!(f, "fetch retries exhausted: {e}"),
            AbortReason::StoreUnavailable(e) => write!(f, "store unavailable: {e}"),
            AbortReason::Shutdown => write!(f, "shutdown requested"),
        }
    }
}

/// Lifecycle of one scan invocation: `Idle -> Scanning -> {Completed, Aborted}`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ScanState {
    #[default]
    Idle,
    Scanning,
    Completed,
    Aborted(AbortReason),
}

impl ScanState {
    pub fn can_advance_to(&self, next: &ScanState) -> bool {
        matches!(
            (self, next),
            (ScanState::Idle, ScanState::Scanning)
                | (ScanState::Scanning, ScanState::Completed)
                | (ScanState::Scanning, ScanState::Aborted(_))
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanState::Completed | ScanState::Aborted(_))
    }
}

/// Outcome of one scan. On abort, `processed` still holds the work done so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub chat_id: i64,
    /// Messages upserted.
    pub processed: u64,
    /// Messages that failed to normalize or persist and were skipped.
    pub failed: u64,
    /// Messages older than the date floor.
    pub skipped_before_floor: u64,
    pub pages: u64,
    pub state: ScanState,
}

impl ScanReport {
    fn new(chat_id: i64) -> Self {
        Self {
            chat_id,
            processed: 0,
            failed: 0,
            skipped_before_floor: 0,
            pages: 0,
            state: ScanState::Idle,
        }
    }

    fn advance(&mut self, next: ScanState) {
        if self.state.can_advance_to(&next) {
            self.state = next;
        } else {
            error!(
                chat_id = self.chat_id,
                from = ?self.state,
                to = ?next,
                "Ignoring invalid scan state transition"
            );
        }
    }

    fn abort(mut self, reason: AbortReason) -> Self {
        warn!(
            chat_id = self.chat_id,
            processed = self.processed,
            reason = %reason,
            "step: scan aborted"
        );
        self.advance(ScanState::Aborted(reason));
        self
    }
}

/// What happened to one message of a page.
enum Applied {
    Stored,
    BeforeFloor,
    Failed,
}

#[derive(Clone)]
pub struct BackfillScanner {
    store: MessageStore,
    source: Arc<dyn HistorySource>,
    config: ScanConfig,
}

impl BackfillScanner {
    pub fn new(store: MessageStore, source: Arc<dyn HistorySource>, config: ScanConfig) -> Self {
        Self {
            store,
            source,
            config,
        }
    }

    /// Scans one chat. `Ok` carries a report in state `Completed` or `Aborted`; only a lost
    /// provider session (fatal fetch error) is returned as `Err`.
    #[instrument(skip(self, options, shutdown), fields(limit = ?options.limit, resume = options.resume))]
    pub async fn scan(
        &self,
        chat_id: i64,
        options: ScanOptions,
        mut shutdown: ShutdownSignal,
    ) -> Result<ScanReport, IngestError> {
        // Watermark: messages posted after this instant may be missed by the newest-first pass.
        let started_at = Utc::now();
        let mut report = ScanReport::new(chat_id);
        report.advance(ScanState::Scanning);

        let floor = match self.date_floor(chat_id, &options, &mut shutdown).await {
            Ok(floor) => floor,
            Err(reason) => return Ok(report.abort(reason)),
        };
        info!(chat_id, floor = ?floor, "step: scan started");

        let chat = match self
            .fetch_with_retry(&mut shutdown, "describe chat", || {
                self.source.describe_chat(chat_id)
            })
            .await?
        {
            Ok(chat) => chat,
            Err(reason) => return Ok(report.abort(reason)),
        };

        let mut fetched = 0usize;
        let mut offset_id = None;
        loop {
            if shutdown.is_triggered() {
                return Ok(report.abort(AbortReason::Shutdown));
            }
            let remaining = options.limit.map_or(usize::MAX, |l| l.saturating_sub(fetched));
            if remaining == 0 {
                debug!(chat_id, fetched, "Fetch limit reached");
                break;
            }

            let request = PageRequest {
                offset_id,
                limit: self.config.page_size.min(remaining),
                direction: PageDirection::NewestFirst,
            };
            let page: HistoryPage = match self
                .fetch_with_retry(&mut shutdown, "fetch page", || {
                    self.source.fetch_page(chat_id, &request)
                })
                .await?
            {
                Ok(page) => page,
                Err(reason) => return Ok(report.abort(reason)),
            };
            report.pages += 1;

            let HistoryPage {
                mut messages,
                next_offset,
            } = page;
            messages.truncate(remaining);
            fetched += messages.len();
            let page_len = messages.len();

            let mut reached_floor = false;
            for mut raw in messages {
                fill_chat(&mut raw, &chat, chat_id);
                match self.apply(raw, floor, &mut shutdown).await {
                    Ok(Applied::Stored) => {
                        report.processed += 1;
                        if self.config.progress_every > 0
                            && report.processed % self.config.progress_every == 0
                        {
                            info!(
                                chat_id,
                                processed = report.processed,
                                pages = report.pages,
                                "step: scan progress"
                            );
                        }
                    }
                    Ok(Applied::BeforeFloor) => {
                        report.skipped_before_floor += 1;
                        reached_floor = true;
                    }
                    Ok(Applied::Failed) => report.failed += 1,
                    Err(reason) => return Ok(report.abort(reason)),
                }
            }

            match next_offset {
                Some(next) if !reached_floor && page_len > 0 => offset_id = Some(next),
                _ => break,
            }
        }

        let marked = retry(
            &self.config.retry,
            &mut shutdown,
            "mark scanned",
            store_retryable,
            || self.store.mark_scanned(chat_id, started_at),
        )
        .await;
        if let Some(reason) = store_abort_reason(marked) {
            return Ok(report.abort(reason));
        }

        report.advance(ScanState::Completed);
        info!(
            chat_id,
            processed = report.processed,
            failed = report.failed,
            skipped_before_floor = report.skipped_before_floor,
            pages = report.pages,
            "step: scan completed"
        );
        Ok(report)
    }

    /// Latest of `start_date` and, when resuming, the group's watermark.
    async fn date_floor(
        &self,
        chat_id: i64,
        options: &ScanOptions,
        shutdown: &mut ShutdownSignal,
    ) -> Result<Option<DateTime<Utc>>, AbortReason> {
        if !options.resume {
            return Ok(options.start_date);
        }
        let watermark = match retry(
            &self.config.retry,
            shutdown,
            "read watermark",
            store_retryable,
            || self.store.last_scanned_at(chat_id),
        )
        .await
        {
            Retried::Ok(watermark) => watermark,
            Retried::Permanent(e) | Retried::Exhausted(e) => {
                return Err(AbortReason::StoreUnavailable(e.to_string()))
            }
            Retried::Cancelled => return Err(AbortReason::Shutdown),
        };
        Ok(options.start_date.max(watermark))
    }

    /// Normalizes and stores one message. `Err` only for conditions that end the scan.
    async fn apply(
        &self,
        raw: RawMessage,
        floor: Option<DateTime<Utc>>,
        shutdown: &mut ShutdownSignal,
    ) -> Result<Applied, AbortReason> {
        let record = match normalize(&raw) {
            Ok(record) => record,
            Err(e) => {
                warn!(
                    chat_id = ?raw.chat.as_ref().and_then(|c| c.id),
                    message_id = ?raw.id,
                    error = %e,
                    "Skipping history message that cannot be normalized"
                );
                return Ok(Applied::Failed);
            }
        };
        if let (Some(floor), Some(at)) = (floor, record.message_timestamp) {
            if at < floor {
                return Ok(Applied::BeforeFloor);
            }
        }

        let (chat_id, message_id) = record.key();
        match retry(
            &self.config.retry,
            shutdown,
            "upsert",
            store_retryable,
            || self.store.upsert(&record),
        )
        .await
        {
            Retried::Ok(_) => Ok(Applied::Stored),
            Retried::Permanent(e) => {
                warn!(chat_id, message_id, error = %e, "Failed to store history message, skipping");
                Ok(Applied::Failed)
            }
            Retried::Exhausted(e) => {
                error!(chat_id, message_id, error = %e, "Store still unavailable after retries");
                Err(AbortReason::StoreUnavailable(e.to_string()))
            }
            Retried::Cancelled => Err(AbortReason::Shutdown),
        }
    }

    /// Fetch with retries. The outer `Err` is a fatal connectivity loss, the inner one an abort.
    async fn fetch_with_retry<T, F, Fut>(
        &self,
        shutdown: &mut ShutdownSignal,
        what: &str,
        op: F,
    ) -> Result<Result<T, AbortReason>, IngestError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, FetchError>>,
    {
        match retry(&self.config.retry, shutdown, what, fetch_retryable, op).await {
            Retried::Ok(value) => Ok(Ok(value)),
            Retried::Exhausted(e) => Ok(Err(AbortReason::RetriesExhausted(e))),
            Retried::Cancelled => Ok(Err(AbortReason::Shutdown)),
            Retried::Permanent(e) => {
                error!(error = %e, "{what} failed, provider connection lost");
                Err(IngestError::Connectivity(e.to_string()))
            }
        }
    }
}

fn fetch_retryable(e: &FetchError) -> Option<Option<std::time::Duration>> {
    e.is_transient().then(|| e.retry_after())
}

fn store_retryable(e: &StoreError) -> Option<Option<std::time::Duration>> {
    e.is_unavailable().then_some(None)
}

fn store_abort_reason<T>(outcome: Retried<T, StoreError>) -> Option<AbortReason> {
    match outcome {
        Retried::Ok(_) => None,
        Retried::Permanent(e) | Retried::Exhausted(e) => {
            Some(AbortReason::StoreUnavailable(e.to_string()))
        }
        Retried::Cancelled => Some(AbortReason::Shutdown),
    }
}

/// History entries may lack chat identity; the described chat stands in for it.
fn fill_chat(raw: &mut RawMessage, chat: &RawChat, chat_id: i64) {
    match raw.chat.as_mut() {
        Some(c) if c.id.is_some() => {}
        Some(c) => c.id = Some(chat_id),
        None => {
            let mut described = chat.clone();
            described.id = Some(chat_id);
            raw.chat = Some(described);
        }
    }
}
