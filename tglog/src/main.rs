//! tglog CLI: listen for live group messages, backfill from exports, query the stored corpus.

use anyhow::Result;
use clap::Parser;
use tglog::{runner, AppConfig, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = AppConfig::load()?;
    runner::run(config, cli.command).await
}
