//! Aggregated DCA position held for one symbol.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of an open aggregate position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionSide::Long => "long",
            PositionSide::Short => "short",
        }
    }

    /// Parse a signal side. `buy` and `sell` are aliases for long and short.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "long" | "buy" => Some(PositionSide::Long),
            "short" | "sell" => Some(PositionSide::Short),
            _ => None,
        }
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current aggregate position for a symbol.
///
/// A flat position has no side, zero quantity, no average price and no
/// resting take-profit order. Any other state has all of side, quantity
/// and average price set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionState {
    /// Direction of the open position, `None` when flat
    #[serde(default)]
    pub side: Option<PositionSide>,

    /// Total open quantity in base asset
    #[serde(rename = "qty", default)]
    pub quantity: Decimal,

    /// Volume-weighted average entry price
    #[serde(rename = "avg", default)]
    pub average_price: Option<Decimal>,

    /// Exchange id of the resting take-profit order
    #[serde(rename = "tp_id", default)]
    pub take_profit_order_id: Option<String>,
}

impl PositionState {
    /// The zero state.
    pub fn flat() -> Self {
        Self::default()
    }

    pub fn is_flat(&self) -> bool {
        self.quantity.is_zero()
    }

    /// Side of the position if it actually holds quantity.
    pub fn open_side(&self) -> Option<PositionSide> {
        if self.is_flat() {
            None
        } else {
            self.side
        }
    }

    /// Cost basis of the position in quote currency.
    pub fn notional(&self) -> Decimal {
        self.average_price
            .map(|avg| avg * self.quantity)
            .unwrap_or(Decimal::ZERO)
    }
}
