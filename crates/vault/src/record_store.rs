//! Persistence trait for encrypted rows.

use std::path::Path;

use async_trait::async_trait;

use crate::{
    error::RecordError,
    record::{Record, RecordId},
};

/// Durable table of encrypted records. Moves opaque bytes only.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Reserve the next record id. Ids are monotonic and never handed out twice,
    /// even if the record they were reserved for is never inserted.
    async fn allocate_id(&self) -> Result<RecordId, RecordError>;

    /// Insert a new row. Fails with [`RecordError::Duplicate`] if the id exists.
    async fn insert(&self, record: &Record) -> Result<(), RecordError>;

    /// Replace the fields of an existing row, matched by `record.id`.
    async fn update(&self, record: &Record) -> Result<(), RecordError>;

    async fn delete(&self, id: RecordId) -> Result<(), RecordError>;

    async fn get(&self, id: RecordId) -> Result<Record, RecordError>;

    /// All rows in insertion order.
    async fn list(&self) -> Result<Vec<Record>, RecordError>;

    /// Write a point-in-time copy of the table to `dest` (a file that must not
    /// exist yet).
    async fn snapshot(&self, dest: &Path) -> Result<(), RecordError>;
}
