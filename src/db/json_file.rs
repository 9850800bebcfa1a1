//! Whole-map JSON file store.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use crate::models::PositionState;

use super::{StateMap, StateStore};

/// Keeps every symbol in one pretty-printed JSON object.
///
/// Writes go to a sibling temp file that is renamed over the live file, so a
/// crash mid-write leaves the previous map intact.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    async fn read_map(&self) -> Result<StateMap> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(StateMap::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", self.path.display()))
            }
        };

        if raw.trim().is_empty() {
            return Ok(StateMap::new());
        }

        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse state file {}", self.path.display()))
    }

    async fn write_map(&self, map: &StateMap) -> Result<()> {
        let json = serde_json::to_string_pretty(map).context("Failed to serialize state")?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        debug!(path = %self.path.display(), symbols = map.len(), "State file written");
        Ok(())
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn load(&self, symbol: &str) -> Result<PositionState> {
        Ok(self.read_map().await?.remove(symbol).unwrap_or_default())
    }

    async fn save(&self, symbol: &str, state: &PositionState) -> Result<()> {
        let mut map = self.read_map().await?;
        map.insert(symbol.to_string(), state.clone());
        self.write_map(&map).await
    }

    async fn snapshot(&self) -> Result<StateMap> {
        self.read_map().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PositionSide;
    use rust_decimal_macros::dec;

    fn long_state() -> PositionState {
        PositionState {
            side: Some(PositionSide::Long),
            quantity: dec!(0.0029),
            average_price: Some(dec!(50655.1724137931)),
            take_profit_order_id: Some("15675394".to_string()),
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_flat() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("state.json"));

        assert_eq!(store.load("BTCUSDT").await.unwrap(), PositionState::flat());
        assert!(store.snapshot().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = JsonFileStore::new(&path);

        let state = long_state();
        store.save("BTCUSDT", &state).await.unwrap();

        let reopened = JsonFileStore::new(&path);
        assert_eq!(reopened.load("BTCUSDT").await.unwrap(), state);
    }

    #[tokio::test]
    async fn test_save_keeps_other_symbols() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested").join("state.json"));

        store.save("BTCUSDT", &long_state()).await.unwrap();
        store.save("ETHUSDT", &PositionState::flat()).await.unwrap();

        let map = store.snapshot().await.unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["BTCUSDT"], long_state());
        assert!(map["ETHUSDT"].is_flat());
    }

    #[tokio::test]
    async fn test_reads_legacy_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        tokio::fs::write(
            &path,
            r#"{
  "BTC/USDT:USDT": {"side": null, "qty": 0.0, "avg": null, "tp_id": null},
  "ETHUSDT": {"side": "short", "qty": 0.5, "avg": 3000.0, "tp_id": "88"}
}"#,
        )
        .await
        .unwrap();

        let store = JsonFileStore::new(&path);
        let eth = store.load("ETHUSDT").await.unwrap();
        assert_eq!(eth.side, Some(PositionSide::Short));
        assert_eq!(eth.quantity, dec!(0.5));
        assert_eq!(eth.take_profit_order_id.as_deref(), Some("88"));
        assert!(store.load("BTC/USDT:USDT").await.unwrap().is_flat());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        tokio::fs::write(&path, "{not json").await.unwrap();

        let store = JsonFileStore::new(&path);
        assert!(store.load("BTCUSDT").await.is_err());
    }
}
