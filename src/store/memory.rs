//! In-memory store used by tests and single-node development runs.

use super::{Record, RecordKind, Store, StoreError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<(String, RecordKind), Record>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, id: &str, kind: RecordKind) -> Result<Option<Record>, StoreError> {
        let records = self.records.read().await;
        Ok(records.get(&(id.to_string(), kind)).cloned())
    }

    async fn create(&self, record: Record) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let key = (record.id.clone(), record.kind);
        if records.contains_key(&key) {
            return Err(StoreError::AlreadyExists);
        }
        records.insert(key, record);
        Ok(())
    }

    async fn update(
        &self,
        id: &str,
        kind: RecordKind,
        payload: Value,
        expected_version: Option<i64>,
    ) -> Result<Record, StoreError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&(id.to_string(), kind))
            .ok_or(StoreError::NotFound)?;
        if let Some(expected) = expected_version {
            if record.version != expected {
                return Err(StoreError::Conflict);
            }
        }
        record.payload = payload;
        record.version += 1;
        Ok(record.clone())
    }

    async fn delete(&self, id: &str, kind: RecordKind) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        records
            .remove(&(id.to_string(), kind))
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
