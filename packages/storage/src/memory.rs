// ABOUTME: In-memory Store used by tests and one-shot runs
// ABOUTME: Records live in a tokio RwLock keyed by kind and id

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use crate::{validate_id, RecordKind, Store, StorageResult};

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<RecordKind, BTreeMap<String, serde_json::Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn load(&self, kind: RecordKind, id: &str) -> StorageResult<Option<serde_json::Value>> {
        let records = self.records.read().await;
        Ok(records.get(&kind).and_then(|by_id| by_id.get(id)).cloned())
    }

    async fn save(&self, kind: RecordKind, id: &str, record: &serde_json::Value) -> StorageResult<()> {
        validate_id(id)?;
        let mut records = self.records.write().await;
        records
            .entry(kind)
            .or_default()
            .insert(id.to_string(), record.clone());
        Ok(())
    }

    async fn delete(&self, kind: RecordKind, id: &str) -> StorageResult<bool> {
        let mut records = self.records.write().await;
        Ok(records
            .get_mut(&kind)
            .map(|by_id| by_id.remove(id).is_some())
            .unwrap_or(false))
    }

    async fn list(&self, kind: RecordKind) -> StorageResult<Vec<(String, serde_json::Value)>> {
        let records = self.records.read().await;
        Ok(records
            .get(&kind)
            .map(|by_id| by_id.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }
}
