use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum RecordKey {
    TimerState,
    BlockedSites,
    Notes,
}

impl RecordKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKey::TimerState => "timerState",
            RecordKey::BlockedSites => "blockedSites",
            RecordKey::Notes => "notes",
        }
    }
}

/// Durable key-value storage for the three authority records. A missing key
/// means "never written" and is the cue to use defaults.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn load(&self, key: RecordKey) -> Result<Option<serde_json::Value>>;
    async fn save(&self, key: RecordKey, value: serde_json::Value) -> Result<()>;
}

/// Non-durable store for tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<RecordKey, serde_json::Value>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = (RecordKey, serde_json::Value)>) -> Self {
        Self {
            records: Mutex::new(records.into_iter().collect()),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn get(&self, key: RecordKey) -> Option<serde_json::Value> {
        self.records
            .lock()
            .ok()
            .and_then(|records| records.get(&key).cloned())
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn load(&self, key: RecordKey) -> Result<Option<serde_json::Value>> {
        let records = self
            .records
            .lock()
            .map_err(|err| anyhow!("memory store lock poisoned: {err}"))?;
        Ok(records.get(&key).cloned())
    }

    async fn save(&self, key: RecordKey, value: serde_json::Value) -> Result<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|err| anyhow!("memory store lock poisoned: {err}"))?;
        records.insert(key, value);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn missing_key_loads_as_none() {
        let store = MemoryStore::new();
        assert_eq!(store.load(RecordKey::Notes).await.expect("load"), None);
    }

    #[tokio::test]
    async fn saved_value_is_returned() {
        let store = MemoryStore::new();
        store
            .save(RecordKey::BlockedSites, json!(["*://a.com/*"]))
            .await
            .expect("save");

        assert_eq!(
            store.load(RecordKey::BlockedSites).await.expect("load"),
            Some(json!(["*://a.com/*"]))
        );
        assert_eq!(store.write_count(), 1);
    }

    #[test]
    fn keys_use_extension_storage_names() {
        let names: Vec<&str> = [RecordKey::TimerState, RecordKey::BlockedSites, RecordKey::Notes]
            .iter()
            .map(RecordKey::as_str)
            .collect();
        assert_eq!(names, vec!["timerState", "blockedSites", "notes"]);
    }
}
