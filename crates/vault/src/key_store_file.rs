//! One-file-per-key store under a keys directory.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use {
    async_trait::async_trait,
    tokio::{fs, io::AsyncWriteExt},
};

use crate::{
    error::KeyStoreError,
    key::{KeyAddress, RecordKey},
    key_store::KeyStore,
    record::RecordId,
};

/// File-backed key store. Each key is a raw 32-byte file named by
/// [`KeyAddress`], created with mode 0600 inside a 0700 directory.
///
/// New keys are written to a temp file, fsynced, then hard-linked into place,
/// so a key file is either absent or complete and an existing key is never
/// overwritten.
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    dir: PathBuf,
}

impl FileKeyStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: RecordId) -> PathBuf {
        KeyAddress::for_record(id).path_in(&self.dir)
    }

    async fn ensure_dir(&self) -> Result<(), KeyStoreError> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| KeyStoreError::io(format!("create {}", self.dir.display()), e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&self.dir, std::fs::Permissions::from_mode(0o700)).await;
        }
        Ok(())
    }

    /// Flush directory entries so a created or removed key survives a crash.
    async fn sync_dir(&self) -> Result<(), KeyStoreError> {
        #[cfg(unix)]
        {
            let dir = fs::File::open(&self.dir)
                .await
                .map_err(|e| KeyStoreError::io(format!("open {}", self.dir.display()), e))?;
            dir.sync_all()
                .await
                .map_err(|e| KeyStoreError::io(format!("sync {}", self.dir.display()), e))?;
        }
        Ok(())
    }

    async fn write_temp(&self, tmp: &Path, key: &RecordKey) -> Result<(), KeyStoreError> {
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options
            .open(tmp)
            .await
            .map_err(|e| KeyStoreError::io(format!("create {}", tmp.display()), e))?;
        file.write_all(key.expose())
            .await
            .map_err(|e| KeyStoreError::io(format!("write {}", tmp.display()), e))?;
        file.sync_all()
            .await
            .map_err(|e| KeyStoreError::io(format!("sync {}", tmp.display()), e))?;
        Ok(())
    }
}

#[async_trait]
impl KeyStore for FileKeyStore {
    async fn generate(&self, id: RecordId) -> Result<RecordKey, KeyStoreError> {
        self.ensure_dir().await?;

        let address = KeyAddress::for_record(id);
        let path = address.path_in(&self.dir);
        if fs::try_exists(&path).await.unwrap_or(false) {
            return Err(KeyStoreError::AlreadyExists(id));
        }

        let tmp = self.dir.join(format!(".{}.tmp", address.file_name()));
        let key = RecordKey::generate();
        if let Err(e) = self.write_temp(&tmp, &key).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e);
        }

        let linked = fs::hard_link(&tmp, &path).await;
        let _ = fs::remove_file(&tmp).await;
        match linked {
            Ok(()) => {},
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(KeyStoreError::AlreadyExists(id));
            },
            Err(e) => return Err(KeyStoreError::io(format!("link {}", path.display()), e)),
        }
        self.sync_dir().await?;

        #[cfg(feature = "tracing")]
        tracing::debug!(record_id = %id, "record key generated");

        Ok(key)
    }

    async fn load(&self, id: RecordId) -> Result<RecordKey, KeyStoreError> {
        let path = self.path_for(id);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => zeroize::Zeroizing::new(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(KeyStoreError::NotFound(id)),
            Err(e) => return Err(KeyStoreError::io(format!("read {}", path.display()), e)),
        };
        RecordKey::from_bytes(&bytes).ok_or(KeyStoreError::Corrupt(id))
    }

    async fn delete(&self, id: RecordId) -> Result<(), KeyStoreError> {
        let path = self.path_for(id);
        match fs::remove_file(&path).await {
            Ok(()) => {
                self.sync_dir().await?;
                #[cfg(feature = "tracing")]
                tracing::debug!(record_id = %id, "record key deleted");
                Ok(())
            },
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(KeyStoreError::io(format!("remove {}", path.display()), e)),
        }
    }

    async fn ids(&self) -> Result<Vec<RecordId>, KeyStoreError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(KeyStoreError::io(format!("list {}", self.dir.display()), e));
            },
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| KeyStoreError::io(format!("list {}", self.dir.display()), e))?
        {
            if let Some(id) = entry.file_name().to_str().and_then(KeyAddress::parse) {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn export(&self, dest: &Path) -> Result<usize, KeyStoreError> {
        fs::create_dir_all(dest)
            .await
            .map_err(|e| KeyStoreError::io(format!("create {}", dest.display()), e))?;

        let ids = self.ids().await?;
        for id in &ids {
            let address = KeyAddress::for_record(*id);
            let target = address.path_in(dest);
            fs::copy(address.path_in(&self.dir), &target)
                .await
                .map_err(|e| KeyStoreError::io(format!("copy {}", target.display()), e))?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&target, std::fs::Permissions::from_mode(0o600))
                    .await
                    .map_err(|e| KeyStoreError::io(format!("chmod {}", target.display()), e))?;
            }
        }
        Ok(ids.len())
    }
}
