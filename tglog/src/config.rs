//! Process config loaded from env (after `.env` via dotenvy). Telegram credentials live in
//! [`tglog_telegram::TelegramConfig`] and are only read by `listen`.

use anyhow::Result;
use ingest::{RetryPolicy, ScanConfig};
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// DATABASE_URL: SQLite file path or `sqlite:` URL
    pub database_url: String,
    /// DB_MAX_CONNECTIONS
    pub db_max_connections: u32,
    /// LOG_FILE
    pub log_file: String,
    /// SCAN_PAGE_SIZE
    pub scan_page_size: usize,
    /// SCAN_PROGRESS_EVERY
    pub scan_progress_every: u64,
    /// FETCH_MAX_ATTEMPTS
    pub fetch_max_attempts: u32,
    /// FETCH_INITIAL_BACKOFF_MS
    pub fetch_initial_backoff_ms: u64,
    /// FETCH_MAX_BACKOFF_MS
    pub fetch_max_backoff_ms: u64,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let config = Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "./data/tglog.db".to_string()),
            db_max_connections: env_or("DB_MAX_CONNECTIONS", 5),
            log_file: env::var("LOG_FILE").unwrap_or_else(|_| "logs/tglog.log".to_string()),
            scan_page_size: env_or("SCAN_PAGE_SIZE", 100),
            scan_progress_every: env_or("SCAN_PROGRESS_EVERY", 100),
            fetch_max_attempts: env_or("FETCH_MAX_ATTEMPTS", 5),
            fetch_initial_backoff_ms: env_or("FETCH_INITIAL_BACKOFF_MS", 500),
            fetch_max_backoff_ms: env_or("FETCH_MAX_BACKOFF_MS", 30_000),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.db_max_connections == 0 {
            anyhow::bail!("DB_MAX_CONNECTIONS must be at least 1");
        }
        if self.scan_page_size == 0 {
            anyhow::bail!("SCAN_PAGE_SIZE must be at least 1");
        }
        if self.fetch_max_attempts == 0 {
            anyhow::bail!("FETCH_MAX_ATTEMPTS must be at least 1");
        }
        if self.fetch_initial_backoff_ms > self.fetch_max_backoff_ms {
            anyhow::bail!(
                "FETCH_INITIAL_BACKOFF_MS ({}) exceeds FETCH_MAX_BACKOFF_MS ({})",
                self.fetch_initial_backoff_ms,
                self.fetch_max_backoff_ms
            );
        }
        Ok(())
    }

    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            page_size: self.scan_page_size,
            progress_every: self.scan_progress_every,
            retry: RetryPolicy {
                max_attempts: self.fetch_max_attempts,
                initial_backoff: Duration::from_millis(self.fetch_initial_backoff_ms),
                max_backoff: Duration::from_millis(self.fetch_max_backoff_ms),
            },
        }
    }
}
