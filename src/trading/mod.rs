//! Trading logic: DCA sizing, position reconciliation, signal processing.

mod config;
mod processor;
pub mod reconciler;

pub use config::TradingConfig;
pub use processor::{SignalOutcome, SignalProcessor};
