//! Bounded exponential backoff for page fetches and store writes during backfill.

use crate::shutdown::ShutdownSignal;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based): initial, 2x, 4x, ... capped at `max_backoff`.
    /// A provider hint replaces the computed delay, still capped.
    pub fn backoff(&self, retry: u32, hint: Option<Duration>) -> Duration {
        let delay = hint.unwrap_or_else(|| {
            let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
            self.initial_backoff.saturating_mul(factor)
        });
        delay.min(self.max_backoff)
    }
}

/// Result of [`retry`].
pub(crate) enum Retried<T, E> {
    Ok(T),
    /// Error the classifier refused to retry.
    Permanent(E),
    /// Last error after `max_attempts`.
    Exhausted(E),
    /// Shutdown fired while backing off.
    Cancelled,
}

/// Runs `op` until it succeeds, fails permanently, runs out of attempts, or shutdown fires
/// during a backoff sleep. `classify` returns `Some(hint)` for retryable errors.
pub(crate) async fn retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    shutdown: &mut ShutdownSignal,
    what: &str,
    classify: impl Fn(&E) -> Option<Option<Duration>>,
    mut op: F,
) -> Retried<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        let err = match op().await {
            Ok(value) => return Retried::Ok(value),
            Err(e) => e,
        };
        let Some(hint) = classify(&err) else {
            return Retried::Permanent(err);
        };
        if attempt >= policy.max_attempts {
            return Retried::Exhausted(err);
        }

        let delay = policy.backoff(attempt, hint);
        warn!(
            error = %err,
            attempt,
            max_attempts = policy.max_attempts,
            delay_ms = delay.as_millis() as u64,
            "{what} failed, retrying"
        );
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.triggered() => return Retried::Cancelled,
        }
        attempt += 1;
    }
}
