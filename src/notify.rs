//! Operator notifications for fills, exits and best-effort failures.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::{info, warn};

const TELEGRAM_API: &str = "https://api.telegram.org";
const TELEGRAM_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_MESSAGE_CHARS: usize = 3900;

/// Delivery never fails the caller; problems are logged.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, text: &str);
}

/// Writes notifications to the log only.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, text: &str) {
        info!("[NOTIFY] {}", text);
    }
}

/// Telegram bot credentials.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
}

impl TelegramConfig {
    /// TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID; `None` unless both are set.
    pub fn from_env() -> Option<Self> {
        let bot_token = std::env::var("TELEGRAM_BOT_TOKEN").ok().filter(|s| !s.is_empty())?;
        let chat_id = std::env::var("TELEGRAM_CHAT_ID").ok().filter(|s| !s.is_empty())?;
        Some(Self { bot_token, chat_id })
    }
}

/// Logs and forwards notifications to a Telegram chat.
pub struct TelegramNotifier {
    http: Client,
    config: TelegramConfig,
    base_url: String,
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig) -> Result<Self> {
        Self::with_base_url(config, TELEGRAM_API.to_string())
    }

    /// Create with custom base URL (for testing).
    pub fn with_base_url(config: TelegramConfig, base_url: String) -> Result<Self> {
        let http = Client::builder()
            .timeout(TELEGRAM_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            config,
            base_url,
        })
    }

    async fn send(&self, text: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.config.bot_token);
        let text: String = text.chars().take(MAX_MESSAGE_CHARS).collect();

        let response = self
            .http
            .get(&url)
            .query(&[("chat_id", self.config.chat_id.as_str()), ("text", text.as_str())])
            .send()
            .await
            .context("Failed to reach Telegram")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Telegram sendMessage failed: {} - {}", status, body);
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, text: &str) {
        info!("[NOTIFY] {}", text);
        if let Err(e) = self.send(text).await {
            warn!(error = %e, "[NOTIFY ERR]");
        }
    }
}

#[cfg(test)]
pub mod mock {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::Notifier;

    /// Keeps every message for assertions.
    #[derive(Default)]
    pub struct RecordingNotifier {
        messages: Mutex<Vec<String>>,
    }

    impl RecordingNotifier {
        pub fn messages(&self) -> Vec<String> {
            self.messages.lock().unwrap().clone()
        }

        pub fn contains(&self, needle: &str) -> bool {
            self.messages().iter().any(|m| m.contains(needle))
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, text: &str) {
            self.messages.lock().unwrap().push(text.to_string());
        }
    }
}
