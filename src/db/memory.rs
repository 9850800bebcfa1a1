use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::models::PositionState;

use super::{StateMap, StateStore};

/// Process-local store for tests.
#[derive(Default)]
pub struct MemoryStore {
    positions: RwLock<StateMap>,
    fail_saves: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later `save` fail, as a full disk would.
    pub fn fail_saves(&self) {
        self.fail_saves.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn load(&self, symbol: &str) -> Result<PositionState> {
        Ok(self
            .positions
            .read()
            .await
            .get(symbol)
            .cloned()
            .unwrap_or_default())
    }

    async fn save(&self, symbol: &str, state: &PositionState) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            bail!("disk full");
        }
        self.positions
            .write()
            .await
            .insert(symbol.to_string(), state.clone());
        Ok(())
    }

    async fn snapshot(&self) -> Result<StateMap> {
        Ok(self.positions.read().await.clone())
    }
}
