//! Error types for the ingest pipeline.
//!
//! Item-level variants (`Normalization`, `Store`) are contained by the producers; only
//! `Connectivity` escapes `listen` / `scan`.

use storage::StoreError;
use tglog_core::NormalizationError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Normalization error: {0}")]
    Normalization(#[from] NormalizationError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The provider session is lost; the owning supervisor decides whether to reconnect.
    #[error("Provider connection lost: {0}")]
    Connectivity(String),
}

impl IngestError {
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, IngestError::Store(e) if e.is_unavailable())
    }
}
