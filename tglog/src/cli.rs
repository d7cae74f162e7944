//! CLI parser.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tglog")]
#[command(about = "Telegram group message logger: listen, scan, search, stats", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Store new and edited group messages from Bot API updates until Ctrl-C.
    Listen {
        /// Backfill this Telegram Desktop export (result.json) while listening.
        #[arg(long)]
        backfill: Option<PathBuf>,
    },
    /// Backfill a chat from a Telegram Desktop export (result.json).
    Scan {
        export: PathBuf,
        /// Maximum number of messages to read from the export.
        #[arg(short, long)]
        limit: Option<usize>,
        /// Skip messages sent before this day (YYYY-MM-DD, UTC).
        #[arg(long)]
        since: Option<NaiveDate>,
        /// Skip messages older than the chat's last completed scan.
        #[arg(long)]
        resume: bool,
    },
    /// Search stored messages, newest first.
    Search {
        #[arg(long, allow_negative_numbers = true)]
        chat: Option<i64>,
        /// Case-insensitive substring.
        #[arg(short, long)]
        text: Option<String>,
        #[arg(long)]
        sender: Option<i64>,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
        #[arg(short, long, default_value = "20")]
        limit: i64,
        #[arg(long, default_value = "0")]
        offset: i64,
    },
    /// Totals for one chat.
    Stats {
        #[arg(allow_negative_numbers = true)]
        chat_id: i64,
    },
    /// Per-user and per-day activity over the trailing window.
    Activity {
        #[arg(allow_negative_numbers = true)]
        chat_id: i64,
        #[arg(short, long, default_value = "7")]
        days: u32,
    },
    /// Most active senders of the last 7 days.
    TopUsers {
        #[arg(allow_negative_numbers = true)]
        chat_id: i64,
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
    /// Known groups with their scan watermark.
    Groups,
}
