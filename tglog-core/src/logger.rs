//! Tracing initialization shared by every tglog command.
//!
//! One fmt layer is teed to stderr and an append-mode log file. Stdout is left to the CLI, which
//! prints query results there.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Used when `RUST_LOG` is unset. sqlx logs every statement at `info`.
const DEFAULT_FILTER: &str = "info,sqlx=warn";

/// Installs the global subscriber. Levels come from `RUST_LOG` (e.g. `ingest=debug`), so load
/// `.env` first. The log file and its directory are created when missing.
pub fn init_tracing(log_file_path: &str) -> anyhow::Result<()> {
    let path = Path::new(log_file_path);
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let log_file = Arc::new(OpenOptions::new().create(true).append(true).open(path)?);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr.and(log_file))
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_thread_ids(true)
        .with_ansi(false);

    Registry::default()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set global subscriber: {}", e))?;

    Ok(())
}
