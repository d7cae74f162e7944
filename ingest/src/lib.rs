//! # Ingest
//!
//! Two producers writing into one [`storage::MessageStore`]: the [`EventIngestor`] consumes the
//! live event stream, the [`BackfillScanner`] pages through chat history. Both normalize with
//! [`tglog_core::normalize`] and rely on the store's idempotent upsert, so they can run
//! concurrently and be re-run without creating duplicates. Per-message failures are logged and
//! skipped; only connection-level failures end a run with an error.

mod backfill_scanner;
mod error;
mod event_ingestor;
mod retry;
mod shutdown;

pub use backfill_scanner::{
    AbortReason, BackfillScanner, ScanConfig, ScanOptions, ScanReport, ScanState,
};
pub use error::IngestError;
pub use event_ingestor::{EventIngestor, ListenReport};
pub use retry::RetryPolicy;
pub use shutdown::{shutdown_channel, ShutdownSignal, ShutdownTrigger};
