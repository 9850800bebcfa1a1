//! Exchange capabilities the signal processor depends on.

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::models::PositionSide;

/// Order side on the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Side that opens or adds to a position.
    pub fn opening(side: PositionSide) -> Self {
        match side {
            PositionSide::Long => OrderSide::Buy,
            PositionSide::Short => OrderSide::Sell,
        }
    }

    /// Side that reduces a position (take-profit and exit orders).
    pub fn closing(side: PositionSide) -> Self {
        match side {
            PositionSide::Long => OrderSide::Sell,
            PositionSide::Short => OrderSide::Buy,
        }
    }
}

/// Acknowledgement of an accepted order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderAck {
    pub id: String,
}

/// Market data, order placement and precision rules of a futures exchange.
///
/// Quantities are in base asset and prices in quote currency; symbols are
/// normalized `BASEUSDT` strings.
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    async fn fetch_last_price(&self, symbol: &str) -> Result<Decimal>;

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()>;

    async fn market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        qty: Decimal,
        reduce_only: bool,
    ) -> Result<OrderAck>;

    async fn limit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        qty: Decimal,
        price: Decimal,
        reduce_only: bool,
    ) -> Result<OrderAck>;

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<()>;

    /// Round a quantity down to the symbol's size step.
    async fn round_quantity(&self, symbol: &str, qty: Decimal) -> Result<Decimal>;

    /// Round a price to the symbol's tick.
    async fn round_price(&self, symbol: &str, price: Decimal) -> Result<Decimal>;
}

#[cfg(test)]
pub mod mock {
    //! Recording gateway for orchestration tests.

    use std::collections::HashMap;
    use std::sync::Mutex;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use rust_decimal::{Decimal, RoundingStrategy};

    use super::{ExchangeGateway, OrderAck, OrderSide};

    #[derive(Debug, Clone, PartialEq)]
    pub enum Call {
        Leverage(String, u32),
        Market {
            symbol: String,
            side: OrderSide,
            qty: Decimal,
            reduce_only: bool,
        },
        Limit {
            symbol: String,
            side: OrderSide,
            qty: Decimal,
            price: Decimal,
            reduce_only: bool,
        },
        Cancel(String, String),
    }

    #[derive(Default)]
    struct Inner {
        prices: HashMap<String, Decimal>,
        calls: Vec<Call>,
        next_id: u64,
        fail_price: bool,
        fail_market: bool,
        fail_limit: bool,
        fail_cancel: bool,
        fail_leverage: bool,
    }

    /// Sizes step at 0.001, prices tick at 0.01.
    #[derive(Default)]
    pub struct MockGateway {
        inner: Mutex<Inner>,
    }

    impl MockGateway {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_price(self, symbol: &str, price: Decimal) -> Self {
            self.set_price(symbol, price);
            self
        }

        pub fn set_price(&self, symbol: &str, price: Decimal) {
            self.inner.lock().unwrap().prices.insert(symbol.to_string(), price);
        }

        pub fn fail_price(&self) {
            self.inner.lock().unwrap().fail_price = true;
        }

        pub fn fail_market(&self) {
            self.inner.lock().unwrap().fail_market = true;
        }

        pub fn fail_limit(&self) {
            self.inner.lock().unwrap().fail_limit = true;
        }

        pub fn fail_cancel(&self) {
            self.inner.lock().unwrap().fail_cancel = true;
        }

        pub fn fail_leverage(&self) {
            self.inner.lock().unwrap().fail_leverage = true;
        }

        pub fn calls(&self) -> Vec<Call> {
            self.inner.lock().unwrap().calls.clone()
        }

        /// Calls that place or cancel orders.
        pub fn order_calls(&self) -> Vec<Call> {
            self.calls()
                .into_iter()
                .filter(|c| !matches!(c, Call::Leverage(..)))
                .collect()
        }

        fn ack(inner: &mut Inner) -> OrderAck {
            inner.next_id += 1;
            OrderAck {
                id: format!("ord-{}", inner.next_id),
            }
        }
    }

    #[async_trait]
    impl ExchangeGateway for MockGateway {
        async fn fetch_last_price(&self, symbol: &str) -> Result<Decimal> {
            let inner = self.inner.lock().unwrap();
            if inner.fail_price {
                return Err(anyhow!("ticker unavailable"));
            }
            inner
                .prices
                .get(symbol)
                .copied()
                .ok_or_else(|| anyhow!("no price for {}", symbol))
        }

        async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()> {
            let mut inner = self.inner.lock().unwrap();
            inner.calls.push(Call::Leverage(symbol.to_string(), leverage));
            if inner.fail_leverage {
                return Err(anyhow!("leverage rejected"));
            }
            Ok(())
        }

        async fn market_order(
            &self,
            symbol: &str,
            side: OrderSide,
            qty: Decimal,
            reduce_only: bool,
        ) -> Result<OrderAck> {
            let mut inner = self.inner.lock().unwrap();
            inner.calls.push(Call::Market {
                symbol: symbol.to_string(),
                side,
                qty,
                reduce_only,
            });
            if inner.fail_market {
                return Err(anyhow!("insufficient margin"));
            }
            Ok(Self::ack(&mut inner))
        }

        async fn limit_order(
            &self,
            symbol: &str,
            side: OrderSide,
            qty: Decimal,
            price: Decimal,
            reduce_only: bool,
        ) -> Result<OrderAck> {
            let mut inner = self.inner.lock().unwrap();
            inner.calls.push(Call::Limit {
                symbol: symbol.to_string(),
                side,
                qty,
                price,
                reduce_only,
            });
            if inner.fail_limit {
                return Err(anyhow!("price out of band"));
            }
            Ok(Self::ack(&mut inner))
        }

        async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<()> {
            let mut inner = self.inner.lock().unwrap();
            inner
                .calls
                .push(Call::Cancel(symbol.to_string(), order_id.to_string()));
            if inner.fail_cancel {
                return Err(anyhow!("order not found"));
            }
            Ok(())
        }

        async fn round_quantity(&self, _symbol: &str, qty: Decimal) -> Result<Decimal> {
            Ok(qty.round_dp_with_strategy(3, RoundingStrategy::ToZero))
        }

        async fn round_price(&self, _symbol: &str, price: Decimal) -> Result<Decimal> {
            Ok(price.round_dp(2))
        }
    }
}
