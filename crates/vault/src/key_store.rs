//! Persistence trait for per-record keys.

use std::path::Path;

use async_trait::async_trait;

use crate::{error::KeyStoreError, key::RecordKey, record::RecordId};

/// Exclusive owner of key material: one key per record, addressed by id.
///
/// Implementations never log key bytes and never hand out keys in bulk.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Create and durably persist a new key for `id`.
    ///
    /// Fails with [`KeyStoreError::AlreadyExists`] if `id` already has a key.
    async fn generate(&self, id: RecordId) -> Result<RecordKey, KeyStoreError>;

    /// Load the key for `id`, or [`KeyStoreError::NotFound`].
    async fn load(&self, id: RecordId) -> Result<RecordKey, KeyStoreError>;

    /// Remove the key for `id`. Removing a missing key succeeds.
    async fn delete(&self, id: RecordId) -> Result<(), KeyStoreError>;

    /// Ids that currently have a stored key, ascending.
    async fn ids(&self) -> Result<Vec<RecordId>, KeyStoreError>;

    /// Copy every stored key into `dest` as key files. Returns the count.
    async fn export(&self, dest: &Path) -> Result<usize, KeyStoreError>;
}
