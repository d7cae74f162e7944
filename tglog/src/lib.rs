//! # tglog
//!
//! Process wiring for the group message logger: CLI parsing, env config, the Telegram Desktop
//! export history source, and the runners behind each subcommand.

pub mod cli;
pub mod config;
pub mod export_source;
pub mod runner;

pub use cli::{Cli, Commands};
pub use config::AppConfig;
pub use export_source::ExportHistorySource;
