//! Open-position persistence
//!
//! Keeps the durable record of every open position, optionally mirrored to a
//! pretty-JSON file so monitoring resumes after a restart. Closed positions
//! are dropped from the file; the trade journal keeps their history.

use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::Result;

use super::exit_rules::PositionRecord;

#[derive(Debug, Default)]
pub struct PositionStore {
    records: Mutex<BTreeMap<String, PositionRecord>>,
    path: Option<PathBuf>,
}

impl PositionStore {
    /// Memory-only store
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load an existing positions file, or start empty if it does not exist
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records: Vec<PositionRecord> = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No positions file found, starting fresh");
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };
        info!(positions = records.len(), "Loaded open positions");
        Ok(Self {
            records: Mutex::new(
                records
                    .into_iter()
                    .filter(|r| !r.state.is_terminal())
                    .map(|r| (r.token.clone(), r))
                    .collect(),
            ),
            path: Some(path),
        })
    }

    /// Store the latest record; a terminal record removes the position
    pub async fn save(&self, record: PositionRecord) {
        let mut records = self.records.lock().await;
        if record.state.is_terminal() {
            records.remove(&record.token);
        } else {
            records.insert(record.token.clone(), record);
        }
        self.persist(&records).await;
    }

    pub async fn remove(&self, token: &str) {
        let mut records = self.records.lock().await;
        if records.remove(token).is_some() {
            self.persist(&records).await;
        }
    }

    pub async fn records(&self) -> Vec<PositionRecord> {
        self.records.lock().await.values().cloned().collect()
    }

    async fn persist(&self, records: &BTreeMap<String, PositionRecord>) {
        let Some(path) = &self.path else {
            return;
        };
        let open: Vec<&PositionRecord> = records.values().collect();
        let persisted = match serde_json::to_string_pretty(&open) {
            Ok(json) => tokio::fs::write(path, json).await.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        match persisted {
            Ok(()) => debug!(positions = open.len(), "Saved open positions"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to persist positions"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExitConfig;
    use crate::position::exit_rules::{ExitReason, ExitRules, Position, PositionState};
    use chrono::Utc;

    fn record(token: &str) -> PositionRecord {
        Position::open(
            token,
            20_000.0,
            1.0,
            Utc::now(),
            ExitRules::from_config(&ExitConfig::default()),
        )
        .record()
    }

    #[tokio::test]
    async fn test_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("positions.json");

        let store = PositionStore::load(&path).await.unwrap();
        assert!(store.records().await.is_empty());
        store.save(record("a")).await;
        store.save(record("b")).await;

        let mut updated = record("a");
        updated.highest_mcap_seen = 42_000.0;
        store.save(updated.clone()).await;

        let reloaded = PositionStore::load(&path).await.unwrap();
        let records = reloaded.records().await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], updated);
    }

    #[tokio::test]
    async fn test_terminal_record_removes_position() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("positions.json");

        let store = PositionStore::load(&path).await.unwrap();
        store.save(record("a")).await;
        let mut closed = record("a");
        closed.state = PositionState::Closed(ExitReason::HardStop);
        store.save(closed).await;

        assert!(PositionStore::load(&path).await.unwrap().records().await.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("positions.json");
        tokio::fs::write(&path, "[{").await.unwrap();
        assert!(PositionStore::load(&path).await.is_err());
    }
}
