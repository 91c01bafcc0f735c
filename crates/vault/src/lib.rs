//! Per-record encrypted credential storage.
//!
//! Every record is sealed with XChaCha20-Poly1305 under its own random key,
//! stored as one file per record. Changes are staged in a [`WorkingSet`] and
//! applied by [`Vault::commit`], which keeps the record table and the key
//! files consistent: no record is left without its key, and keys left behind
//! by interrupted commits are reclaimed by [`Vault::sweep_orphan_keys`].
//! Trait-based [`Cipher`], [`KeyStore`] and [`RecordStore`] seams allow
//! swapping backends.

pub mod backup;
pub mod error;
pub mod key;
pub mod key_store;
pub mod key_store_file;
pub mod key_store_memory;
pub mod record;
pub mod record_store;
pub mod record_store_memory;
pub mod record_store_sqlite;
pub mod sync;
pub mod traits;
pub mod vault;
pub mod xchacha20;

pub use {
    backup::{BackupStatus, DailyBackup},
    error::{CipherError, KeyStoreError, RecordError, VaultError},
    key::{KeyAddress, RecordKey},
    key_store::KeyStore,
    key_store_file::FileKeyStore,
    key_store_memory::MemoryKeyStore,
    record::{Credential, Record, RecordId, Revealed, SealedField},
    record_store::RecordStore,
    record_store_memory::MemoryRecordStore,
    record_store_sqlite::SqliteRecordStore,
    sync::{ChangeKind, ChangeState, CredentialPatch, StageId, StagedChange, WorkingSet},
    traits::Cipher,
    vault::{
        CommitOutcome, CommitReport, IntegrityReport, RowError, RowView, SnapshotManifest, Vault,
    },
    xchacha20::XChaCha20Poly1305Cipher,
};

/// Run database migrations for the vault crate.
///
/// Creates the `records` and `record_sequence` tables.
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> Result<(), RecordError> {
    sqlx::migrate!("./migrations")
        .set_ignore_missing(true)
        .run(pool)
        .await?;
    Ok(())
}
