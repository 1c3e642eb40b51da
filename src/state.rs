//! Engine state persistence
//!
//! The only durable record: `{running, auto_restart, settings}` as a single
//! JSON file, read once at process start and overwritten wholesale on every
//! state-affecting operation. Writes go through a temp file + rename so a
//! crash mid-write never leaves a truncated snapshot.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::settings::BotSettings;

/// Durable engine state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineState {
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub auto_restart: bool,
    #[serde(default)]
    pub settings: BotSettings,
}

/// Loads and saves the engine state snapshot
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Load the snapshot, falling back to defaults if the file is missing
    pub async fn load(&self) -> Result<EngineState> {
        if !self.path.exists() {
            info!("No previous bot state found at {}", self.path.display());
            return Ok(EngineState::default());
        }

        let data = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| Error::StatePersistence(e.to_string()))?;

        let state: EngineState =
            serde_json::from_str(&data).map_err(|e| Error::StatePersistence(e.to_string()))?;

        info!(
            "Loaded bot state from {} (auto_restart={})",
            self.path.display(),
            state.auto_restart
        );
        Ok(state)
    }

    /// Persist the snapshot atomically (write temp file, then rename)
    pub async fn save(&self, state: &EngineState) -> Result<()> {
        let data = serde_json::to_string_pretty(state)
            .map_err(|e| Error::StatePersistence(e.to_string()))?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, data)
            .await
            .map_err(|e| Error::StatePersistence(e.to_string()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| Error::StatePersistence(e.to_string()))?;

        debug!("Saved bot state to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::StrategyUpdate;

    #[tokio::test]
    async fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("botState.json"));

        let state = store.load().await.unwrap();
        assert!(!state.running);
        assert!(!state.auto_restart);
        assert_eq!(state.settings, BotSettings::default());
    }

    #[tokio::test]
    async fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("botState.json"));

        let mut state = EngineState::default();
        state.auto_restart = true;
        state.settings.strategy = state
            .settings
            .strategy
            .merged(&StrategyUpdate {
                profit1: Some(40.0),
                buy_max: Some(0.5),
                ..Default::default()
            })
            .unwrap();

        store.save(&state).await.unwrap();
        let restored = store.load().await.unwrap();

        assert_eq!(restored, state);
        assert_eq!(restored.settings.strategy.profit1, 40.0);
        assert_eq!(restored.settings.strategy.buy_max, 0.5);
    }

    #[tokio::test]
    async fn test_save_overwrites_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("botState.json"));

        let mut state = EngineState::default();
        state.running = true;
        store.save(&state).await.unwrap();

        state.running = false;
        state.auto_restart = true;
        store.save(&state).await.unwrap();

        let restored = store.load().await.unwrap();
        assert!(!restored.running);
        assert!(restored.auto_restart);
    }
}
