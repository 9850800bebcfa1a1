//! Bot runner: wires the exchange, state store and notifier behind the webhook server.
//!
//! Handles:
//! - Loading secrets and trading parameters from the environment
//! - Choosing live or paper order routing
//! - Serving webhooks until Ctrl+C

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::api::{ExchangeGateway, GateClient, GateConfig, PaperGateway};
use crate::db::open_store;
use crate::notify::{LogNotifier, Notifier, TelegramConfig, TelegramNotifier};
use crate::server;
use crate::trading::{SignalProcessor, TradingConfig};

/// Passphrase used when none is configured. Startup warns about it.
pub const DEFAULT_PASSPHRASE: &str = "CHANGE_ME";

/// Bot configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Shared secret every webhook body must carry
    pub passphrase: String,

    /// Listen address for the webhook server
    pub bind_addr: String,

    /// JSON state file path or `sqlite:` URL
    pub state_location: String,

    /// Log orders instead of sending them
    pub dry_run: bool,

    /// Trading configuration
    pub trading: TradingConfig,

    /// Exchange credentials and environment
    pub exchange: GateConfig,

    /// Telegram delivery, log-only when absent
    pub telegram: Option<TelegramConfig>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            passphrase: DEFAULT_PASSPHRASE.to_string(),
            bind_addr: "0.0.0.0:8000".to_string(),
            state_location: "state.json".to_string(),
            dry_run: false,
            trading: TradingConfig::default(),
            exchange: GateConfig {
                testnet: true,
                ..GateConfig::default()
            },
            telegram: None,
        }
    }
}

impl BotConfig {
    /// Secrets and trading parameters from the environment. Listen address,
    /// state location and dry-run keep their defaults for the CLI to set.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            passphrase: passphrase_from_env(),
            trading: TradingConfig::from_env().context("Invalid trading configuration")?,
            exchange: GateConfig::from_env()?,
            telegram: TelegramConfig::from_env(),
            ..Self::default()
        })
    }

    /// Passphrase with all but the first and last characters hidden.
    pub fn masked_passphrase(&self) -> String {
        mask(&self.passphrase)
    }
}

/// WEBHOOK_PASSPHRASE, then the older WEBHOOK_PASS, then the placeholder.
fn passphrase_from_env() -> String {
    ["WEBHOOK_PASSPHRASE", "WEBHOOK_PASS"]
        .iter()
        .filter_map(|key| std::env::var(key).ok())
        .find(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_PASSPHRASE.to_string())
}

fn mask(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    match chars.len() {
        0 => String::new(),
        1..=2 => "*".repeat(chars.len()),
        n => format!("{}{}{}", chars[0], "*".repeat(n - 2), chars[n - 1]),
    }
}

/// Main bot runner.
pub struct Bot {
    config: BotConfig,
    processor: Arc<SignalProcessor>,
}

impl Bot {
    /// Create a new bot instance.
    pub async fn new(config: BotConfig) -> Result<Self> {
        if config.passphrase == DEFAULT_PASSPHRASE {
            warn!("WEBHOOK_PASSPHRASE is not set, using the default placeholder");
        }

        let store = open_store(&config.state_location)
            .await
            .with_context(|| format!("Failed to open state store {}", config.state_location))?;
        let gateway = build_gateway(&config)?;

        let notifier: Arc<dyn Notifier> = match config.telegram.clone() {
            Some(telegram) => {
                info!(chat_id = %telegram.chat_id, "Telegram notifications enabled");
                Arc::new(TelegramNotifier::new(telegram)?)
            }
            None => Arc::new(LogNotifier),
        };

        let processor = Arc::new(SignalProcessor::new(
            config.passphrase.clone(),
            config.trading.clone(),
            gateway,
            store,
            notifier,
        ));

        Ok(Self { config, processor })
    }

    /// Serve webhooks until Ctrl+C.
    pub async fn run(self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.bind_addr)
            .await
            .with_context(|| format!("Failed to bind {}", self.config.bind_addr))?;

        info!(
            addr = %self.config.bind_addr,
            state = %self.config.state_location,
            dry_run = self.config.dry_run,
            testnet = self.config.exchange.testnet,
            "Webhook server listening"
        );

        axum::serve(listener, server::router(self.processor.clone()))
            .with_graceful_shutdown(async {
                tokio::signal::ctrl_c().await.ok();
                info!("Shutdown signal received");
            })
            .await
            .context("Webhook server failed")?;

        info!("Bot shutdown complete");
        Ok(())
    }
}

/// Live Gate.io routing, or paper routing over live market data.
fn build_gateway(config: &BotConfig) -> Result<Arc<dyn ExchangeGateway>> {
    let client = Arc::new(GateClient::new(config.exchange.clone())?);

    if config.dry_run {
        info!("Dry run: orders are logged, not sent");
        return Ok(Arc::new(PaperGateway::new(client)));
    }

    if !config.exchange.has_credentials() {
        warn!("Exchange credentials not configured. Running in dry-run mode.");
        return Ok(Arc::new(PaperGateway::new(client)));
    }

    info!(testnet = config.exchange.testnet, "Gate.io client initialized");
    Ok(client)
}
