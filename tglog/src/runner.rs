//! Subcommand runners: open the store, build the producers or the query service, and print results.

use crate::cli::Commands;
use crate::config::AppConfig;
use crate::export_source::ExportHistorySource;
use analytics::QueryService;
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use ingest::{
    shutdown_channel, BackfillScanner, EventIngestor, ScanOptions, ScanReport, ScanState,
    ShutdownSignal, ShutdownTrigger,
};
use std::path::Path;
use std::sync::Arc;
use storage::{MessageStore, SearchFilters, StoredMessage};
use tglog_core::init_tracing;
use tglog_telegram::{build_bot, spawn_update_listener, TelegramConfig};
use tracing::{error, info, instrument, warn};

/// Live update buffer between the Bot API listener and the ingestor.
const LIVE_CHANNEL_CAPACITY: usize = 256;
const TEXT_PREVIEW_LEN: usize = 80;

/// Main entry: init logging, open the store, run the subcommand, close the store.
pub async fn run(config: AppConfig, command: Commands) -> Result<()> {
    init_tracing(&config.log_file)?;
    info!(database_url = %config.database_url, "Opening message store");

    let store = MessageStore::open(&config.database_url, config.db_max_connections)
        .await
        .with_context(|| format!("Open message store at {}", config.database_url))?;

    let result = dispatch(&config, &store, command).await;
    store.close().await;
    result
}

async fn dispatch(config: &AppConfig, store: &MessageStore, command: Commands) -> Result<()> {
    match command {
        Commands::Listen { backfill } => run_listen(config, store, backfill.as_deref()).await,
        Commands::Scan {
            export,
            limit,
            since,
            resume,
        } => {
            let options = ScanOptions {
                limit,
                start_date: since.map(start_of_day),
                resume,
            };
            let (trigger, signal) = shutdown_channel();
            spawn_ctrl_c(trigger);
            let report = run_scan(config, store, &export, options, signal).await?;
            print_scan_report(&report);
            Ok(())
        }
        Commands::Search {
            chat,
            text,
            sender,
            from,
            to,
            limit,
            offset,
        } => {
            let filters = SearchFilters {
                chat_id: chat,
                text_query: text,
                sender_id: sender,
                date_from: from.map(start_of_day),
                date_to: to.map(start_of_next_day),
            };
            let messages = store.search(&filters, limit, offset).await?;
            print_messages(&messages);
            Ok(())
        }
        Commands::Stats { chat_id } => {
            let stats = QueryService::new(store.clone())
                .chat_statistics(chat_id)
                .await?;
            println!("Chat {chat_id}");
            println!("  total messages:   {}", stats.total_messages);
            println!("  distinct senders: {}", stats.distinct_senders);
            println!("  first message:    {}", fmt_time(stats.first_message_at));
            println!("  last message:     {}", fmt_time(stats.last_message_at));
            Ok(())
        }
        Commands::Activity { chat_id, days } => {
            let timeline = QueryService::new(store.clone())
                .activity_timeline(chat_id, days)
                .await?;
            println!("Chat {chat_id}, last {days} day(s)\n");
            println!("{:<12} {:>8}", "day", "messages");
            for day in &timeline.per_day {
                println!("{:<12} {:>8}", day.day, day.message_count);
            }
            println!();
            println!("{:<14} {:<24} {:>8}  last message", "sender_id", "username", "messages");
            for user in &timeline.per_user {
                println!(
                    "{:<14} {:<24} {:>8}  {}",
                    user.sender_id.map_or("-".to_string(), |id| id.to_string()),
                    user.sender_username.as_deref().unwrap_or("-"),
                    user.message_count,
                    fmt_time(user.last_message_at)
                );
            }
            Ok(())
        }
        Commands::TopUsers { chat_id, limit } => {
            let top = QueryService::new(store.clone())
                .top_users(chat_id, limit)
                .await?;
            if top.is_empty() {
                println!("No activity in chat {chat_id} over the last 7 days.");
            }
            for (rank, user) in top.iter().enumerate() {
                println!(
                    "{:>3}. {:<24} {:>6} message(s)",
                    rank + 1,
                    user.sender_username
                        .clone()
                        .or_else(|| user.sender_id.map(|id| id.to_string()))
                        .unwrap_or_else(|| "(anonymous)".to_string()),
                    user.message_count
                );
            }
            Ok(())
        }
        Commands::Groups => {
            let groups = store.list_groups().await?;
            if groups.is_empty() {
                println!("No groups stored yet.");
                return Ok(());
            }
            println!("{:<16} {:<32} {}", "chat_id", "title", "last_scanned_at");
            println!("{}", "-".repeat(80));
            for g in &groups {
                println!(
                    "{:<16} {:<32} {}",
                    g.chat_id,
                    g.title.as_deref().unwrap_or("-"),
                    fmt_time(g.last_scanned_at)
                );
            }
            Ok(())
        }
    }
}

/// Listens for Bot API updates until Ctrl-C; optionally backfills an export at the same time.
#[instrument(skip(config, store))]
async fn run_listen(config: &AppConfig, store: &MessageStore, backfill: Option<&Path>) -> Result<()> {
    let telegram = TelegramConfig::from_env()?;
    let bot = build_bot(&telegram);
    let (mut source, listener) = spawn_update_listener(bot, LIVE_CHANNEL_CAPACITY).await?;

    let (trigger, signal) = shutdown_channel();
    spawn_ctrl_c(trigger);

    let ingestor = EventIngestor::new(store.clone());
    let scan = async {
        if let Some(path) = backfill {
            let options = ScanOptions {
                resume: true,
                ..Default::default()
            };
            match run_scan(config, store, path, options, signal.clone()).await {
                Ok(report) => print_scan_report(&report),
                Err(e) => error!(error = %e, "Backfill failed"),
            }
        }
    };

    info!("Listening for group messages, Ctrl-C to stop");
    let (listened, ()) = tokio::join!(ingestor.listen(&mut source, signal.clone()), scan);
    listener.stop().await;

    let report = listened?;
    println!(
        "Received {} event(s): {} stored, {} failed",
        report.received, report.persisted, report.failed
    );
    Ok(())
}

/// Backfills the chat held by an export file.
pub async fn run_scan(
    config: &AppConfig,
    store: &MessageStore,
    export: &Path,
    options: ScanOptions,
    shutdown: ShutdownSignal,
) -> Result<ScanReport> {
    let source = ExportHistorySource::load(export)?;
    let chat_id = source.chat_id();
    let scanner = BackfillScanner::new(store.clone(), Arc::new(source), config.scan_config());
    let report = scanner.scan(chat_id, options, shutdown).await?;
    Ok(report)
}

fn spawn_ctrl_c(trigger: ShutdownTrigger) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, shutting down");
                trigger.trigger();
            }
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });
}

fn print_scan_report(report: &ScanReport) {
    let outcome = match &report.state {
        ScanState::Completed => "completed".to_string(),
        ScanState::Aborted(reason) => format!("aborted ({reason})"),
        other => format!("{other:?}"),
    };
    println!(
        "Scan of chat {} {}: {} stored, {} failed, {} before date floor, {} page(s)",
        report.chat_id,
        outcome,
        report.processed,
        report.failed,
        report.skipped_before_floor,
        report.pages
    );
}

fn print_messages(messages: &[StoredMessage]) {
    if messages.is_empty() {
        println!("No messages found.");
        return;
    }
    println!(
        "{:<26} {:<16} {:<10} {:<20} {}",
        "timestamp", "chat_id", "msg_id", "sender", "text"
    );
    println!("{}", "-".repeat(120));
    for m in messages {
        let text = m.text.as_deref().unwrap_or("");
        let preview: String = text.chars().take(TEXT_PREVIEW_LEN).collect();
        let sender = m
            .sender_username
            .clone()
            .or_else(|| m.sender_id.map(|id| id.to_string()))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<26} {:<16} {:<10} {:<20} {}",
            fmt_time(m.message_timestamp),
            m.chat_id,
            m.message_id,
            sender,
            preview.replace('\n', " ")
        );
    }
}

fn fmt_time(at: Option<DateTime<Utc>>) -> String {
    at.map_or("-".to_string(), |t| t.format("%Y-%m-%d %H:%M:%S").to_string())
}

fn start_of_day(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(NaiveTime::MIN).and_utc()
}

/// Exclusive upper bound covering all of `day`.
fn start_of_next_day(day: NaiveDate) -> DateTime<Utc> {
    day.succ_opt()
        .map(start_of_day)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
