//! Webhook-driven DCA futures bot
//!
//! Receives alert webhooks, scales into leveraged futures positions in
//! configured tranches and keeps one reduce-only take-profit resting at a
//! fixed distance from the average entry price.

mod api;
mod bot;
mod db;
mod error;
mod models;
mod notify;
mod server;
mod trading;

use anyhow::Result;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::bot::{Bot, BotConfig};
use crate::db::open_store;

/// DCA webhook bot CLI.
#[derive(Parser)]
#[command(name = "dcabot")]
#[command(about = "Turn alert webhooks into DCA futures entries with a rolling take-profit", long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the webhook server
    Serve {
        /// Listen address
        #[arg(short, long, env = "BIND_ADDR", default_value = "0.0.0.0:8000")]
        bind: String,

        /// State file path, or a sqlite: URL
        #[arg(short, long, env = "STATE_PATH", default_value = "state.json")]
        state: String,

        /// Dry run (log orders instead of sending them)
        #[arg(long)]
        dry_run: bool,
    },

    /// Show persisted positions
    Status {
        /// State file path, or a sqlite: URL
        #[arg(short, long, env = "STATE_PATH", default_value = "state.json")]
        state: String,
    },

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Serve {
            bind,
            state,
            dry_run,
        } => {
            let config = BotConfig {
                bind_addr: bind,
                state_location: state,
                dry_run,
                ..BotConfig::from_env()?
            };

            info!(
                capital = %config.trading.capital,
                leverage = config.trading.leverage,
                dry_run = config.dry_run,
                "Starting DCA webhook bot"
            );

            println!("\n=== DCA Webhook Bot ===");
            println!("Listening on:  {}", config.bind_addr);
            println!("State:         {}", config.state_location);
            println!(
                "Mode:          {}",
                if config.dry_run { "DRY RUN (no real orders)" } else { "LIVE TRADING" }
            );
            println!(
                "Exchange:      gateio ({})",
                if config.exchange.testnet { "testnet" } else { "mainnet" }
            );
            println!("\nPress Ctrl+C to stop.\n");

            let bot = Bot::new(config).await?;
            if let Err(e) = bot.run().await {
                tracing::error!(error = %e, "Bot error");
                return Err(e);
            }
        }

        Commands::Status { state } => {
            let store = open_store(&state).await?;
            let positions = store.snapshot().await?;

            if positions.is_empty() {
                println!("No positions recorded in {}", state);
                return Ok(());
            }

            println!(
                "\n{:<14} {:<6} {:>14} {:>14} {:>14} {:<20}",
                "SYMBOL", "SIDE", "QTY", "AVG", "NOTIONAL", "TP ORDER"
            );
            println!("{}", "-".repeat(88));

            for (symbol, position) in &positions {
                let side = match position.open_side() {
                    Some(side) => side.as_str(),
                    None => "flat",
                };
                let avg = position
                    .average_price
                    .map(|p| p.round_dp(4).to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:<14} {:<6} {:>14} {:>14} {:>14.2} {:<20}",
                    symbol,
                    side,
                    position.quantity.normalize(),
                    avg,
                    position.notional(),
                    position.take_profit_order_id.as_deref().unwrap_or("-")
                );
            }
        }

        Commands::Config => {
            let config = BotConfig::from_env()?;
            let trading = &config.trading;

            println!("\n=== Trading Configuration ===\n");
            println!("Sizing:");
            println!("  Capital:              ${}", trading.capital);
            println!("  Leverage:             {}x", trading.leverage);
            println!(
                "  Take Profit:          {}%",
                (trading.take_profit_pct * Decimal::from(100)).normalize()
            );
            println!("\nDCA Steps:");
            for (i, ratio) in trading.dca_ratios.iter().enumerate() {
                println!(
                    "  Step {}:               {}% (${} notional)",
                    i + 1,
                    (ratio * Decimal::from(100)).normalize(),
                    (trading.capital * ratio * Decimal::from(trading.leverage)).normalize()
                );
            }
            println!("\n=== Runtime ===\n");
            println!("  Passphrase:           {}", config.masked_passphrase());
            println!(
                "  Exchange:             gateio ({})",
                if config.exchange.testnet { "testnet" } else { "mainnet" }
            );
            println!(
                "  API Credentials:      {}",
                if config.exchange.has_credentials() { "configured" } else { "missing (paper orders only)" }
            );
            println!(
                "  Telegram:             {}",
                if config.telegram.is_some() { "enabled" } else { "disabled" }
            );
        }
    }

    Ok(())
}
