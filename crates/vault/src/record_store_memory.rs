//! In-memory record store for tests.

use std::{
    path::Path,
    sync::{
        Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use async_trait::async_trait;

use crate::{
    error::RecordError,
    record::{Record, RecordId},
    record_store::RecordStore,
};

/// In-memory store backed by a `Vec` in insertion order. No persistence.
pub struct MemoryRecordStore {
    next_id: AtomicU64,
    records: Mutex<Vec<Record>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            records: Mutex::new(Vec::new()),
        }
    }
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn allocate_id(&self) -> Result<RecordId, RecordError> {
        Ok(RecordId::new(self.next_id.fetch_add(1, Ordering::SeqCst)))
    }

    async fn insert(&self, record: &Record) -> Result<(), RecordError> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        if records.iter().any(|r| r.id == record.id) {
            return Err(RecordError::Duplicate(record.id));
        }
        records.push(record.clone());
        Ok(())
    }

    async fn update(&self, record: &Record) -> Result<(), RecordError> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let slot = records
            .iter_mut()
            .find(|r| r.id == record.id)
            .ok_or(RecordError::NotFound(record.id))?;
        *slot = record.clone();
        Ok(())
    }

    async fn delete(&self, id: RecordId) -> Result<(), RecordError> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let before = records.len();
        records.retain(|r| r.id != id);
        if records.len() == before {
            return Err(RecordError::NotFound(id));
        }
        Ok(())
    }

    async fn get(&self, id: RecordId) -> Result<Record, RecordError> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or(RecordError::NotFound(id))
    }

    async fn list(&self) -> Result<Vec<Record>, RecordError> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        Ok(records.clone())
    }

    /// Writes the rows as JSON; there is no SQLite file to copy.
    async fn snapshot(&self, dest: &Path) -> Result<(), RecordError> {
        if tokio::fs::try_exists(dest).await.unwrap_or(false) {
            return Err(RecordError::Snapshot(format!(
                "{} already exists",
                dest.display()
            )));
        }
        let json = {
            let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
            serde_json::to_vec_pretty(&*records)
                .map_err(|e| RecordError::Snapshot(e.to_string()))?
        };
        tokio::fs::write(dest, json)
            .await
            .map_err(|e| RecordError::Snapshot(format!("write {}: {e}", dest.display())))
    }
}
