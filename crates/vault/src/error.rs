//! Vault error types.
//!
//! Each layer has its own error so callers can tell a missing key from a
//! tampered row from a disk failure. [`VaultError`] wraps all of them for the
//! coordinator API.

use crate::{record::RecordId, sync::StageId};

/// Errors produced by the cipher engine.
#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    /// The tag did not verify. Covers tampered ciphertext, wrong key, wrong
    /// nonce, wrong tag and wrong associated data alike.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// The supplied key is not the size the cipher requires.
    #[error("invalid key length: {actual} bytes (expected {expected})")]
    InvalidKeyLength { expected: usize, actual: usize },

    /// The row was sealed by a cipher this build does not know.
    #[error("unsupported cipher version: {0:#04x}")]
    UnsupportedVersion(u8),

    /// The sealed payload could not be encoded or decoded.
    #[error("payload error: {0}")]
    Payload(String),
}

/// Errors produced by a [`KeyStore`](crate::key_store::KeyStore).
#[derive(Debug, thiserror::Error)]
pub enum KeyStoreError {
    /// No key is stored for the record. Its ciphertext is unrecoverable.
    #[error("no key stored for record {0}")]
    NotFound(RecordId),

    /// A key already exists for the record id. Ids are never reused.
    #[error("a key already exists for record {0}")]
    AlreadyExists(RecordId),

    /// The stored key has the wrong length.
    #[error("key for record {0} is corrupt")]
    Corrupt(RecordId),

    /// Disk or permission failure.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl KeyStoreError {
    #[must_use]
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Errors produced by a [`RecordStore`](crate::record_store::RecordStore).
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("record not found: {0}")]
    NotFound(RecordId),

    #[error("record already exists: {0}")]
    Duplicate(RecordId),

    /// Database or disk failure.
    #[error(transparent)]
    Io(#[from] sqlx::Error),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("snapshot failed: {0}")]
    Snapshot(String),
}

/// Errors produced by the sync coordinator and read paths.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error(transparent)]
    Cipher(#[from] CipherError),

    #[error(transparent)]
    KeyStore(#[from] KeyStoreError),

    #[error(transparent)]
    Record(#[from] RecordError),

    /// No staged change carries this id.
    #[error("no staged change {0}")]
    UnknownStage(StageId),

    /// The staged change is being committed and can no longer be discarded.
    #[error("staged change {0} is committing")]
    StageInFlight(StageId),

    /// An edit was staged for a record that is already marked for deletion.
    #[error("record {0} is marked for deletion")]
    DeletionPending(RecordId),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, VaultError>;
