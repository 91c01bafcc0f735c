//! In-memory key store for tests and ephemeral vaults.

use std::{collections::BTreeMap, path::Path, sync::Mutex};

use {async_trait::async_trait, tokio::fs};

use crate::{
    error::KeyStoreError,
    key::{KeyAddress, RecordKey},
    key_store::KeyStore,
    record::RecordId,
};

/// In-memory store backed by a `BTreeMap`. No persistence.
#[derive(Default)]
pub struct MemoryKeyStore {
    keys: Mutex<BTreeMap<RecordId, RecordKey>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn generate(&self, id: RecordId) -> Result<RecordKey, KeyStoreError> {
        let mut keys = self.keys.lock().unwrap_or_else(|e| e.into_inner());
        if keys.contains_key(&id) {
            return Err(KeyStoreError::AlreadyExists(id));
        }
        let key = RecordKey::generate();
        keys.insert(id, key.clone());
        Ok(key)
    }

    async fn load(&self, id: RecordId) -> Result<RecordKey, KeyStoreError> {
        let keys = self.keys.lock().unwrap_or_else(|e| e.into_inner());
        keys.get(&id).cloned().ok_or(KeyStoreError::NotFound(id))
    }

    async fn delete(&self, id: RecordId) -> Result<(), KeyStoreError> {
        let mut keys = self.keys.lock().unwrap_or_else(|e| e.into_inner());
        keys.remove(&id);
        Ok(())
    }

    async fn ids(&self) -> Result<Vec<RecordId>, KeyStoreError> {
        let keys = self.keys.lock().unwrap_or_else(|e| e.into_inner());
        Ok(keys.keys().copied().collect())
    }

    async fn export(&self, dest: &Path) -> Result<usize, KeyStoreError> {
        let keys: Vec<(RecordId, RecordKey)> = {
            let keys = self.keys.lock().unwrap_or_else(|e| e.into_inner());
            keys.iter().map(|(id, key)| (*id, key.clone())).collect()
        };

        fs::create_dir_all(dest)
            .await
            .map_err(|e| KeyStoreError::io(format!("create {}", dest.display()), e))?;
        for (id, key) in &keys {
            let target = KeyAddress::for_record(*id).path_in(dest);
            fs::write(&target, key.expose())
                .await
                .map_err(|e| KeyStoreError::io(format!("write {}", target.display()), e))?;
        }
        Ok(keys.len())
    }
}
