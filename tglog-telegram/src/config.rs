//! Bot API connection settings for `tglog listen`.

use anyhow::{Context, Result};
use reqwest::Url;
use std::env;

pub struct TelegramConfig {
    /// BOT_TOKEN
    pub bot_token: String,
    /// TELEGRAM_API_URL or TELOXIDE_API_URL, for a self-hosted Bot API server
    pub api_url: Option<Url>,
}

impl TelegramConfig {
    /// Reads BOT_TOKEN (required) and the optional API URL, rejecting a malformed URL.
    pub fn from_env() -> Result<Self> {
        let bot_token = env::var("BOT_TOKEN").map_err(|_| anyhow::anyhow!("BOT_TOKEN not set"))?;
        let api_url = env::var("TELEGRAM_API_URL")
            .or_else(|_| env::var("TELOXIDE_API_URL"))
            .ok();
        Self::new(bot_token, api_url.as_deref())
    }

    pub fn new(bot_token: String, api_url: Option<&str>) -> Result<Self> {
        if bot_token.trim().is_empty() {
            anyhow::bail!("BOT_TOKEN is empty");
        }
        let api_url = api_url
            .map(|raw| {
                Url::parse(raw).with_context(|| {
                    format!("TELEGRAM_API_URL (or TELOXIDE_API_URL) is not a valid URL: {raw}")
                })
            })
            .transpose()?;
        Ok(Self { bot_token, api_url })
    }
}
