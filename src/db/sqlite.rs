//! SQLite store: one row per symbol.

use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use crate::models::{PositionSide, PositionState};

use super::{StateMap, StateStore};

/// SQLite-backed position store.
pub struct SqliteStore {
    pool: SqlitePool,
}

/// Stored position record. Decimals are kept as text to stay exact.
#[derive(Debug, Clone, sqlx::FromRow)]
struct StoredPosition {
    symbol: String,
    side: Option<String>,
    quantity: String,
    average_price: Option<String>,
    take_profit_order_id: Option<String>,
}

impl StoredPosition {
    fn into_state(self) -> Result<(String, PositionState)> {
        let side = match self.side.as_deref() {
            Some(s) => Some(
                PositionSide::parse(s)
                    .ok_or_else(|| anyhow!("Invalid side '{}' stored for {}", s, self.symbol))?,
            ),
            None => None,
        };
        let quantity = Decimal::from_str(&self.quantity)
            .with_context(|| format!("Invalid quantity stored for {}", self.symbol))?;
        let average_price = self
            .average_price
            .as_deref()
            .map(Decimal::from_str)
            .transpose()
            .with_context(|| format!("Invalid average price stored for {}", self.symbol))?;

        let state = PositionState {
            side,
            quantity,
            average_price,
            take_profit_order_id: self.take_profit_order_id,
        };
        Ok((self.symbol, state))
    }
}

impl SqliteStore {
    /// Create a new database connection.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS positions (
                symbol TEXT PRIMARY KEY,
                side TEXT,
                quantity TEXT NOT NULL DEFAULT '0',
                average_price TEXT,
                take_profit_order_id TEXT,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl StateStore for SqliteStore {
    async fn load(&self, symbol: &str) -> Result<PositionState> {
        let row = sqlx::query_as::<_, StoredPosition>(
            "SELECT symbol, side, quantity, average_price, take_profit_order_id FROM positions WHERE symbol = ?",
        )
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load position")?;

        match row {
            Some(row) => Ok(row.into_state()?.1),
            None => Ok(PositionState::flat()),
        }
    }

    async fn save(&self, symbol: &str, state: &PositionState) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO positions (symbol, side, quantity, average_price, take_profit_order_id, updated_at)
            VALUES (?, ?, ?, ?, ?, datetime('now'))
            ON CONFLICT(symbol) DO UPDATE SET
                side = excluded.side,
                quantity = excluded.quantity,
                average_price = excluded.average_price,
                take_profit_order_id = excluded.take_profit_order_id,
                updated_at = datetime('now')
            "#,
        )
        .bind(symbol)
        .bind(state.side.map(|s| s.as_str()))
        .bind(state.quantity.to_string())
        .bind(state.average_price.map(|p| p.to_string()))
        .bind(state.take_profit_order_id.as_deref())
        .execute(&self.pool)
        .await
        .context("Failed to save position")?;

        Ok(())
    }

    async fn snapshot(&self) -> Result<StateMap> {
        let rows = sqlx::query_as::<_, StoredPosition>(
            "SELECT symbol, side, quantity, average_price, take_profit_order_id FROM positions ORDER BY symbol",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list positions")?;

        rows.into_iter().map(StoredPosition::into_state).collect()
    }
}
