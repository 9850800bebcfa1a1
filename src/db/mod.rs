//! Persistence for per-symbol position state.
//!
//! Backends:
//! - JSON file holding the whole symbol map (default, `state.json`)
//! - SQLite table with one row per symbol (`sqlite:` URLs)
//! - In-memory map (tests only)
//!
//! Callers serialize read-modify-write sequences themselves; the stores
//! only guarantee that each `save` is durable before it returns.

mod json_file;
#[cfg(test)]
mod memory;
mod sqlite;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::PositionState;

use json_file::JsonFileStore;
#[cfg(test)]
pub use memory::MemoryStore;
use sqlite::SqliteStore;

/// Symbol -> position map, ordered for stable output.
pub type StateMap = BTreeMap<String, PositionState>;

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Current state for a symbol, the flat state if none is stored.
    async fn load(&self, symbol: &str) -> Result<PositionState>;

    async fn save(&self, symbol: &str, state: &PositionState) -> Result<()>;

    /// Every stored symbol.
    async fn snapshot(&self) -> Result<StateMap>;
}

/// Open the backend selected by `location`: a `sqlite:` URL or a JSON file path.
pub async fn open_store(location: &str) -> Result<Arc<dyn StateStore>> {
    if location.starts_with("sqlite:") {
        Ok(Arc::new(SqliteStore::new(location).await?))
    } else {
        Ok(Arc::new(JsonFileStore::new(location)))
    }
}
