//! Signal processor: turns validated webhook signals into exchange orders.
//!
//! One signal is processed at a time. The lock covers the whole sequence of
//! state read, exchange calls and state write for every symbol, so two
//! webhooks can never interleave their read-modify-write on the store.

use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::api::{ExchangeGateway, OrderSide};
use crate::db::{StateMap, StateStore};
use crate::error::SignalError;
use crate::models::{PositionSide, PositionState, Signal, SignalAction, WebhookRequest};
use crate::notify::Notifier;

use super::reconciler;
use super::TradingConfig;

/// Result of a successfully handled signal.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalOutcome {
    /// An entry or DCA add was filled and the take-profit rolled over.
    Entered {
        symbol: String,
        side: PositionSide,
        step: i64,
        /// Quantity of this tranche
        filled_qty: Decimal,
        /// Aggregate quantity after the merge
        qty: Decimal,
        avg: Decimal,
        tp: Decimal,
        /// `None` when the take-profit order could not be placed
        tp_order_id: Option<String>,
    },
    /// Position closed (or was already flat).
    Closed { symbol: String, closed_qty: Decimal },
}

/// Webhook orchestration over an exchange, a state store and a notifier.
pub struct SignalProcessor {
    passphrase: String,
    config: TradingConfig,
    gateway: Arc<dyn ExchangeGateway>,
    store: Arc<dyn StateStore>,
    notifier: Arc<dyn Notifier>,
    lock: Mutex<()>,
}

impl SignalProcessor {
    pub fn new(
        passphrase: String,
        config: TradingConfig,
        gateway: Arc<dyn ExchangeGateway>,
        store: Arc<dyn StateStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            passphrase,
            config,
            gateway,
            store,
            notifier,
            lock: Mutex::new(()),
        }
    }

    /// Authenticate, validate and execute one webhook request.
    pub async fn process(&self, request: WebhookRequest) -> Result<SignalOutcome, SignalError> {
        if request.passphrase.as_deref() != Some(self.passphrase.as_str()) {
            warn!("Rejected webhook with bad passphrase");
            return Err(SignalError::Unauthorized);
        }

        let signal = request.into_signal()?;
        info!(
            symbol = %signal.symbol,
            side = %signal.side,
            action = ?signal.action,
            step = signal.step,
            "Signal received"
        );

        let _guard = self.lock.lock().await;
        let current = self.store.load(&signal.symbol).await.map_err(storage_error)?;
        debug!(symbol = %signal.symbol, state = ?current, "Loaded position");

        match signal.action {
            SignalAction::Exit => self.exit(&signal.symbol, current).await,
            SignalAction::Entry => self.entry(&signal, current).await,
        }
    }

    /// Snapshot of every stored position, consistent with in-flight signals.
    pub async fn positions(&self) -> Result<StateMap, SignalError> {
        let _guard = self.lock.lock().await;
        self.store.snapshot().await.map_err(storage_error)
    }

    async fn entry(
        &self,
        signal: &Signal,
        current: PositionState,
    ) -> Result<SignalOutcome, SignalError> {
        let symbol = signal.symbol.as_str();
        let side = signal.side;

        let ratio = reconciler::step_ratio(&self.config, signal.step)?;
        reconciler::check_side(&current, side)?;

        if let Err(e) = self.gateway.set_leverage(symbol, self.config.leverage).await {
            warn!(symbol = %symbol, error = %e, "Failed to set leverage");
            self.notifier
                .notify(&format!("[LEVERR] {} {:#}", symbol, e))
                .await;
        }

        let last = match self.gateway.fetch_last_price(symbol).await {
            Ok(price) => price,
            Err(e) => {
                error!(symbol = %symbol, error = %e, "Failed to fetch last price");
                self.notifier
                    .notify(&format!("[TICKERR] {} {:#}", symbol, e))
                    .await;
                return Err(SignalError::MarketData(format!("{:#}", e)));
            }
        };

        let raw_qty = reconciler::entry_quantity(&self.config, ratio, last)?;
        let qty = self
            .gateway
            .round_quantity(symbol, raw_qty)
            .await
            .map_err(|e| SignalError::Order(format!("{:#}", e)))?;
        if qty <= Decimal::ZERO {
            return Err(SignalError::Order(format!(
                "quantity {} rounds to zero for {}",
                raw_qty, symbol
            )));
        }

        debug!(
            symbol = %symbol,
            notional = %reconciler::entry_notional(&self.config, ratio),
            raw_qty = %raw_qty,
            qty = %qty,
            "Sized entry"
        );

        if let Err(e) = self
            .gateway
            .market_order(symbol, OrderSide::opening(side), qty, false)
            .await
        {
            error!(symbol = %symbol, error = %e, "Entry order failed");
            self.notifier
                .notify(&format!("[ENTRY ERR] {} {:#}", symbol, e))
                .await;
            return Err(SignalError::Order(format!("{:#}", e)));
        }

        let mut next = reconciler::merge_entry(&current, qty, last, side)?;
        let avg = next.average_price.unwrap_or(last);

        if let Some(old_tp) = current.take_profit_order_id.as_deref() {
            self.cancel_take_profit(symbol, old_tp).await;
        }

        let raw_tp = reconciler::take_profit_price(avg, side, self.config.take_profit_pct);
        let tp = match self.gateway.round_price(symbol, raw_tp).await {
            Ok(price) => price,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "Price rounding failed, using raw take-profit");
                raw_tp
            }
        };

        match self
            .gateway
            .limit_order(symbol, OrderSide::closing(side), next.quantity, tp, true)
            .await
        {
            Ok(ack) => next.take_profit_order_id = Some(ack.id),
            Err(e) => {
                // Position is still committed below, just without a resting take-profit
                error!(symbol = %symbol, error = %e, "Take-profit placement failed");
                self.notifier
                    .notify(&format!("[TP CREATE ERR] {} {:#}", symbol, e))
                    .await;
            }
        }

        // The entry order already filled, so a lost write must reach the operator
        self.persist_after_orders(symbol, &next).await?;

        info!(
            symbol = %symbol,
            side = %side,
            step = signal.step,
            qty = %next.quantity,
            avg = %avg,
            tp = %tp,
            tp_order_id = ?next.take_profit_order_id,
            "Position updated"
        );
        self.notifier
            .notify(&format!(
                "[{}] {} STEP {} qty~{} @ {:.2} | TP {:.2}",
                symbol,
                side.as_str().to_uppercase(),
                signal.step,
                qty,
                last,
                tp
            ))
            .await;

        Ok(SignalOutcome::Entered {
            symbol: symbol.to_string(),
            side,
            step: signal.step,
            filled_qty: qty,
            qty: next.quantity,
            avg,
            tp,
            tp_order_id: next.take_profit_order_id,
        })
    }

    async fn exit(&self, symbol: &str, current: PositionState) -> Result<SignalOutcome, SignalError> {
        let closed_qty = current.quantity;

        if let Some(side) = current.open_side() {
            if let Err(e) = self
                .gateway
                .market_order(symbol, OrderSide::closing(side), current.quantity, true)
                .await
            {
                // State is reset regardless so the next entry is not blocked
                error!(symbol = %symbol, error = %e, "Exit order failed");
                self.notifier
                    .notify(&format!("[EXIT ERR] {} {:#}", symbol, e))
                    .await;
            }

            if let Some(tp_id) = current.take_profit_order_id.as_deref() {
                self.cancel_take_profit(symbol, tp_id).await;
            }
        }

        let flat = reconciler::reset_to_flat();
        if current.open_side().is_some() {
            self.persist_after_orders(symbol, &flat).await?;
        } else {
            self.store.save(symbol, &flat).await.map_err(storage_error)?;
        }

        info!(symbol = %symbol, closed_qty = %closed_qty, "Position closed");
        self.notifier.notify(&format!("[{}] EXIT ALL", symbol)).await;

        Ok(SignalOutcome::Closed {
            symbol: symbol.to_string(),
            closed_qty,
        })
    }

    /// Save a state the exchange already reflects; a failure is notified with
    /// the unsaved quantity and take-profit id before it is returned.
    async fn persist_after_orders(
        &self,
        symbol: &str,
        state: &PositionState,
    ) -> Result<(), SignalError> {
        if let Err(e) = self.store.save(symbol, state).await {
            error!(
                symbol = %symbol,
                qty = %state.quantity,
                tp_order_id = ?state.take_profit_order_id,
                error = %e,
                "Orders placed but position state was not saved"
            );
            self.notifier
                .notify(&format!(
                    "[STATE ERR] {} qty={} tp_id={} {:#}",
                    symbol,
                    state.quantity,
                    state.take_profit_order_id.as_deref().unwrap_or("-"),
                    e
                ))
                .await;
            return Err(storage_error(e));
        }
        Ok(())
    }

    async fn cancel_take_profit(&self, symbol: &str, order_id: &str) {
        match self.gateway.cancel_order(symbol, order_id).await {
            Ok(()) => debug!(symbol = %symbol, order_id = %order_id, "Cancelled take-profit"),
            Err(e) => {
                warn!(symbol = %symbol, order_id = %order_id, error = %e, "Failed to cancel take-profit");
                self.notifier
                    .notify(&format!("[CANCEL ERR] {} {} {:#}", order_id, symbol, e))
                    .await;
            }
        }
    }
}

fn storage_error(e: anyhow::Error) -> SignalError {
    error!(error = %e, "State store failure");
    SignalError::Storage(format!("{:#}", e))
}
