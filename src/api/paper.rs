//! Dry-run gateway: live market data and precision, simulated orders.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::info;

use super::gateway::{ExchangeGateway, OrderAck, OrderSide};

/// Wraps a real gateway for prices and rounding; orders are only logged.
pub struct PaperGateway {
    market: Arc<dyn ExchangeGateway>,
    order_seq: AtomicU64,
}

impl PaperGateway {
    pub fn new(market: Arc<dyn ExchangeGateway>) -> Self {
        Self {
            market,
            order_seq: AtomicU64::new(0),
        }
    }

    fn next_id(&self) -> String {
        let seq = self.order_seq.fetch_add(1, Ordering::SeqCst) + 1;
        format!("paper-{}-{}", seq, &uuid::Uuid::new_v4().simple().to_string()[..8])
    }
}

#[async_trait]
impl ExchangeGateway for PaperGateway {
    async fn fetch_last_price(&self, symbol: &str) -> Result<Decimal> {
        self.market.fetch_last_price(symbol).await
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()> {
        info!(symbol = %symbol, leverage = leverage, "[DRY RUN] Would set leverage");
        Ok(())
    }

    async fn market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        qty: Decimal,
        reduce_only: bool,
    ) -> Result<OrderAck> {
        let id = self.next_id();
        info!(
            symbol = %symbol,
            side = ?side,
            qty = %qty,
            reduce_only = reduce_only,
            id = %id,
            "[DRY RUN] Would place market order"
        );
        Ok(OrderAck { id })
    }

    async fn limit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        qty: Decimal,
        price: Decimal,
        reduce_only: bool,
    ) -> Result<OrderAck> {
        let id = self.next_id();
        info!(
            symbol = %symbol,
            side = ?side,
            qty = %qty,
            price = %price,
            reduce_only = reduce_only,
            id = %id,
            "[DRY RUN] Would place limit order"
        );
        Ok(OrderAck { id })
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<()> {
        info!(symbol = %symbol, order_id = %order_id, "[DRY RUN] Would cancel order");
        Ok(())
    }

    async fn round_quantity(&self, symbol: &str, qty: Decimal) -> Result<Decimal> {
        self.market.round_quantity(symbol, qty).await
    }

    async fn round_price(&self, symbol: &str, price: Decimal) -> Result<Decimal> {
        self.market.round_price(symbol, price).await
    }
}
