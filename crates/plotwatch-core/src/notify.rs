use crate::{ListingRecord, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::env;
use tracing::{debug, info};

/// Telegram rejects messages longer than this many characters.
pub const MESSAGE_LIMIT: usize = 4096;

/// Pushes newly found listings somewhere a human will see them.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, records: &[&ListingRecord]) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct NotifierConfig {
    pub bot_token: String,
    pub chat_id: String,
    pub api_base: String,
}

impl NotifierConfig {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
            api_base: "https://api.telegram.org".to_string(),
        }
    }

    /// `TELEGRAM_BOT_TOKEN` and `TELEGRAM_CHAT_ID`, when both are set.
    pub fn from_env() -> Option<Self> {
        let token = env::var("TELEGRAM_BOT_TOKEN").ok().filter(|t| !t.is_empty())?;
        let chat_id = env::var("TELEGRAM_CHAT_ID").ok().filter(|c| !c.is_empty())?;
        Some(Self::new(token, chat_id))
    }
}

pub struct TelegramNotifier {
    client: Client,
    config: NotifierConfig,
}

impl TelegramNotifier {
    pub fn new(config: NotifierConfig) -> Result<Self> {
        let client = Client::builder().build()?;
        Ok(Self { client, config })
    }

    async fn send_message(&self, text: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.config.api_base, self.config.bot_token);
        self.client
            .post(&url)
            .form(&[
                ("chat_id", self.config.chat_id.as_str()),
                ("text", text),
                ("disable_web_page_preview", "true"),
            ])
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, records: &[&ListingRecord]) -> Result<()> {
        if records.is_empty() {
            debug!("Nothing new to announce");
            return Ok(());
        }

        let messages = compose_messages(records, MESSAGE_LIMIT);
        for message in &messages {
            self.send_message(message).await?;
        }
        info!("Sent {} new listings in {} messages", records.len(), messages.len());
        Ok(())
    }
}

fn format_listing(record: &ListingRecord) -> String {
    let distance = record
        .distance_km
        .map(|km| format!(" - {:.1} km", km))
        .unwrap_or_default();
    format!(
        "{}\n{} - {} PLN{}\n{}\n",
        record.title, record.location_text, record.price_last_updated, distance, record.link
    )
}

/// Packs listings into as few messages as fit under `limit` characters.
/// The header rides with the first listing; a listing that does not fit in
/// an otherwise empty message is cut.
pub fn compose_messages(records: &[&ListingRecord], limit: usize) -> Vec<String> {
    let mut messages = Vec::new();
    let mut current = format!("{} new listings\n\n", records.len());
    let mut entries = 0;

    for record in records {
        let mut entry = format_listing(record);
        entry.push('\n');

        if entries > 0 && current.chars().count() + entry.chars().count() > limit {
            messages.push(current.trim_end().to_string());
            current = String::new();
            entries = 0;
        }

        let room = limit.saturating_sub(current.chars().count());
        if entry.chars().count() > room {
            entry = entry.chars().take(room).collect();
        }
        current.push_str(&entry);
        entries += 1;
    }

    if entries > 0 {
        messages.push(current.trim_end().to_string());
    }
    messages
}
