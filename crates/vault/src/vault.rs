//! Sync coordinator: commits staged changes against the key and record stores,
//! and serves decrypted reads.

use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

use tokio::sync::Mutex;

#[cfg(feature = "metrics")]
use strongbox_metrics::{counter, histogram, labels, vault as vault_metrics};

use crate::{
    backup::{BackupStatus, DailyBackup},
    error::{CipherError, KeyStoreError, RecordError, Result, VaultError},
    key::RecordKey,
    key_store::KeyStore,
    key_store_file::FileKeyStore,
    record::{Credential, Payload, Record, RecordId, Revealed, SealedField},
    record_store::RecordStore,
    record_store_sqlite::SqliteRecordStore,
    sync::{ChangeKind, ChangeState, CredentialPatch, StageId, WorkingSet},
    traits::Cipher,
    xchacha20::XChaCha20Poly1305Cipher,
};

/// File name of the record table inside a snapshot directory.
pub const SNAPSHOT_DATABASE: &str = "records.db";
/// Directory of key files inside a snapshot directory.
pub const SNAPSHOT_KEYS: &str = "keys";

/// What happened to one staged change during a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Added(RecordId),
    Updated(RecordId),
    Removed(RecordId),
    /// The change is still staged and will be retried by the next commit.
    Failed { reason: String },
}

/// Per-change results of one [`Vault::commit`], in staging order.
#[derive(Debug, Default)]
pub struct CommitReport {
    pub outcomes: Vec<(StageId, CommitOutcome)>,
    /// Set when the commit triggered the daily backup.
    pub backup: Option<BackupStatus>,
}

impl CommitReport {
    /// Number of changes that reached the stores.
    #[must_use]
    pub fn applied(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| !matches!(o, CommitOutcome::Failed { .. }))
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (StageId, &str)> {
        self.outcomes.iter().filter_map(|(stage, o)| match o {
            CommitOutcome::Failed { reason } => Some((*stage, reason.as_str())),
            _ => None,
        })
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Why a row could not be decrypted. Reported per row; one bad row never
/// hides the others.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RowError {
    #[error("key file missing")]
    MissingKey,
    #[error("key file corrupt")]
    CorruptKey,
    /// Authentication failed: the row was modified or does not belong to
    /// this key.
    #[error("authentication failed")]
    Tampered,
    #[error("unsupported cipher version {0:#04x}")]
    UnsupportedVersion(u8),
    #[error("{0}")]
    Unreadable(String),
}

impl From<VaultError> for RowError {
    fn from(e: VaultError) -> Self {
        match e {
            VaultError::KeyStore(KeyStoreError::NotFound(_)) => Self::MissingKey,
            VaultError::KeyStore(KeyStoreError::Corrupt(_)) => Self::CorruptKey,
            VaultError::Cipher(CipherError::AuthenticationFailed) => Self::Tampered,
            VaultError::Cipher(CipherError::UnsupportedVersion(v)) => Self::UnsupportedVersion(v),
            other => Self::Unreadable(other.to_string()),
        }
    }
}

/// One row of [`Vault::view`].
#[derive(Debug)]
pub struct RowView {
    pub id: RecordId,
    pub service: String,
    pub username: String,
    pub secrets: std::result::Result<Revealed, RowError>,
}

/// Files written by [`Vault::snapshot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotManifest {
    pub dir: PathBuf,
    pub database: PathBuf,
    pub keys_dir: PathBuf,
    pub records: usize,
    pub keys: usize,
}

/// Cross-store consistency report from [`Vault::check`].
#[derive(Debug, Default)]
pub struct IntegrityReport {
    pub records: usize,
    pub keys: usize,
    /// Keys with no record. Safe to remove with [`Vault::sweep_orphan_keys`].
    pub orphan_keys: Vec<RecordId>,
    /// Records whose key is gone. Their secrets are unrecoverable.
    pub missing_keys: Vec<RecordId>,
    /// Records with a key that still fail to decrypt.
    pub unreadable: Vec<(RecordId, RowError)>,
}

impl IntegrityReport {
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.orphan_keys.is_empty() && self.missing_keys.is_empty() && self.unreadable.is_empty()
    }
}

/// Encrypted credential vault.
///
/// Generic over [`Cipher`] but defaults to [`XChaCha20Poly1305Cipher`].
/// Commits, snapshots, sweeps and checks are serialized by one lock so each
/// sees a commit boundary; reads do not take it.
pub struct Vault<C: Cipher = XChaCha20Poly1305Cipher> {
    keys: Arc<dyn KeyStore>,
    records: Arc<dyn RecordStore>,
    cipher: C,
    commit_lock: Mutex<()>,
    backup: Option<DailyBackup>,
}

impl Vault<XChaCha20Poly1305Cipher> {
    /// Create a vault with the default XChaCha20-Poly1305 cipher.
    pub fn new(keys: Arc<dyn KeyStore>, records: Arc<dyn RecordStore>) -> Self {
        Self::with_cipher(keys, records, XChaCha20Poly1305Cipher)
    }

    /// Open the SQLite database at `database` and the key directory `keys_dir`,
    /// creating both if needed.
    pub async fn open(database: &Path, keys_dir: &Path) -> Result<Self> {
        let records = SqliteRecordStore::open(database).await?;
        let keys = FileKeyStore::new(keys_dir);

        #[cfg(feature = "tracing")]
        tracing::info!(
            database = %database.display(),
            keys_dir = %keys_dir.display(),
            "vault opened"
        );

        Ok(Self::new(Arc::new(keys), Arc::new(records)))
    }
}

impl<C: Cipher> Vault<C> {
    /// Create a vault with a custom cipher.
    pub fn with_cipher(keys: Arc<dyn KeyStore>, records: Arc<dyn RecordStore>, cipher: C) -> Self {
        Self {
            keys,
            records,
            cipher,
            commit_lock: Mutex::new(()),
            backup: None,
        }
    }

    /// Write a dated backup after the first commit of each day that changes
    /// something.
    #[must_use]
    pub fn with_daily_backup(mut self, backup: DailyBackup) -> Self {
        self.backup = Some(backup);
        self
    }

    pub fn daily_backup(&self) -> Option<&DailyBackup> {
        self.backup.as_ref()
    }

    // ── Commit ──────────────────────────────────────────────────────────────

    /// Apply every staged change in staging order.
    ///
    /// Applied changes leave the set; failed ones stay in
    /// [`ChangeState::Failed`] and are retried by the next commit. A failure
    /// never leaves a record without its key: an addition whose row was not
    /// written removes the key it generated, and a deletion removes the row
    /// before the key.
    pub async fn commit(&self, set: &mut WorkingSet) -> CommitReport {
        let _guard = self.commit_lock.lock().await;
        let started = Instant::now();
        let mut report = CommitReport::default();

        let mut index = 0;
        while index < set.changes.len() {
            let change = &mut set.changes[index];
            change.state = ChangeState::Committing;
            change.attempts += 1;
            let stage = change.stage;

            let result = match &change.kind {
                ChangeKind::Addition(credential) => self
                    .apply_addition(credential, &mut change.allocated)
                    .await
                    .map(CommitOutcome::Added),
                ChangeKind::Edit { id, patch } => self
                    .apply_edit(*id, patch)
                    .await
                    .map(|()| CommitOutcome::Updated(*id)),
                ChangeKind::Deletion { id } => self
                    .apply_deletion(*id, &mut change.removal_issued)
                    .await
                    .map(|()| CommitOutcome::Removed(*id)),
            };

            match result {
                Ok(outcome) => {
                    #[cfg(feature = "metrics")]
                    counter!(vault_metrics::CHANGES_APPLIED_TOTAL, labels::KIND => change_kind(&change.kind))
                        .increment(1);

                    set.changes.remove(index);
                    report.outcomes.push((stage, outcome));
                },
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(stage = %stage, error = %e, "staged change failed, kept for retry");
                    #[cfg(feature = "metrics")]
                    counter!(vault_metrics::COMMIT_FAILURES_TOTAL, labels::KIND => change_kind(&change.kind))
                        .increment(1);

                    let reason = e.to_string();
                    change.state = ChangeState::Failed {
                        reason: reason.clone(),
                    };
                    report.outcomes.push((stage, CommitOutcome::Failed { reason }));
                    index += 1;
                },
            }
        }

        if report.applied() > 0
            && let Some(backup) = &self.backup
        {
            report.backup = self.backup_if_due(backup).await;
        }

        #[cfg(feature = "metrics")]
        {
            counter!(vault_metrics::COMMITS_TOTAL).increment(1);
            histogram!(vault_metrics::COMMIT_DURATION_SECONDS)
                .record(started.elapsed().as_secs_f64());
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            applied = report.applied(),
            failed = report.outcomes.len() - report.applied(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "commit finished"
        );
        #[cfg(not(any(feature = "tracing", feature = "metrics")))]
        let _ = started;

        report
    }

    async fn apply_addition(
        &self,
        credential: &Credential,
        allocated: &mut Option<RecordId>,
    ) -> Result<RecordId> {
        // A previous attempt reserved an id: find out whether its row landed.
        if let Some(previous) = allocated.take() {
            match self.records.get(previous).await {
                Ok(_) => return Ok(previous),
                Err(RecordError::NotFound(_)) => self.compensate(previous).await,
                Err(e) => {
                    *allocated = Some(previous);
                    return Err(e.into());
                },
            }
        }

        let id = self.records.allocate_id().await?;
        *allocated = Some(id);

        let key = match self.keys.generate(id).await {
            Ok(key) => key,
            Err(e) => {
                // Nothing was inserted; a half-written key protects nothing.
                if !matches!(e, KeyStoreError::AlreadyExists(_)) {
                    self.compensate(id).await;
                }
                *allocated = None;
                return Err(e.into());
            },
        };

        let inserted = async {
            let sealed = self.seal(id, &key, &credential.sealed_payload())?;
            let record = Record {
                id,
                service: credential.service.clone(),
                username: credential.username.clone(),
                sealed,
                cipher_version: self.cipher.version_tag(),
            };
            self.records.insert(&record).await?;
            Ok::<(), VaultError>(())
        }
        .await;
        drop(key);

        if let Err(e) = inserted {
            // Only remove the key once the row is known to be absent.
            match self.records.get(id).await {
                Ok(_) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(record_id = %id, error = %e, "insert reported failure but row exists");
                    return Ok(id);
                },
                Err(RecordError::NotFound(_)) => {
                    self.compensate(id).await;
                    *allocated = None;
                },
                Err(_) => {},
            }
            return Err(e);
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(record_id = %id, "record added");

        Ok(id)
    }

    /// Remove the key of an addition whose row was never written. Failure is
    /// logged; the orphan sweep reclaims the key later.
    async fn compensate(&self, id: RecordId) {
        #[cfg(feature = "metrics")]
        counter!(vault_metrics::COMPENSATIONS_TOTAL).increment(1);

        if let Err(e) = self.keys.delete(id).await {
            #[cfg(feature = "tracing")]
            tracing::warn!(record_id = %id, error = %e, "failed to remove key of unwritten record");
            #[cfg(not(feature = "tracing"))]
            let _ = e;
        }
    }

    async fn apply_edit(&self, id: RecordId, patch: &CredentialPatch) -> Result<()> {
        let current = self.records.get(id).await?;
        let key = self.keys.load(id).await?;

        let existing = if patch.replaces_sealed() {
            None
        } else {
            Some(self.open_sealed(&current, &key)?)
        };
        let payload = patch.apply_sealed(existing);
        let sealed = self.seal(id, &key, &payload)?;
        drop(key);

        let record = Record {
            id,
            service: patch.service.clone().unwrap_or(current.service),
            username: patch.username.clone().unwrap_or(current.username),
            sealed,
            cipher_version: self.cipher.version_tag(),
        };
        self.records.update(&record).await?;

        #[cfg(feature = "tracing")]
        tracing::debug!(record_id = %id, "record updated");

        Ok(())
    }

    async fn apply_deletion(&self, id: RecordId, removal_issued: &mut bool) -> Result<()> {
        let resumed = std::mem::replace(removal_issued, true);
        match self.records.delete(id).await {
            Ok(()) => {},
            // An interrupted earlier attempt already removed the row.
            Err(RecordError::NotFound(_)) if resumed => {},
            Err(e) => {
                if matches!(e, RecordError::NotFound(_)) {
                    *removal_issued = false;
                }
                return Err(e.into());
            },
        }

        if let Err(e) = self.keys.delete(id).await {
            #[cfg(feature = "tracing")]
            tracing::warn!(record_id = %id, error = %e, "record removed but key deletion failed");
            #[cfg(not(feature = "tracing"))]
            let _ = e;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(record_id = %id, "record removed");

        Ok(())
    }

    // ── Reads ───────────────────────────────────────────────────────────────

    /// Whether a record with `id` is persisted.
    pub async fn contains(&self, id: RecordId) -> Result<bool> {
        match self.records.get(id).await {
            Ok(_) => Ok(true),
            Err(RecordError::NotFound(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Decrypt one record.
    pub async fn reveal(&self, id: RecordId) -> Result<Credential> {
        let record = self.records.get(id).await?;
        let revealed = self.reveal_record(&record).await?;
        Ok(Credential {
            service: record.service,
            username: record.username,
            secret: revealed.secret,
            email: revealed.email,
            notes: revealed.notes,
        })
    }

    /// Every record in insertion order, each with its decrypted fields or the
    /// reason they could not be decrypted.
    pub async fn view(&self) -> Result<Vec<RowView>> {
        let records = self.records.list().await?;
        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            let secrets = self.reveal_record(&record).await.map_err(RowError::from);
            rows.push(RowView {
                id: record.id,
                service: record.service,
                username: record.username,
                secrets,
            });
        }
        Ok(rows)
    }

    async fn reveal_record(&self, record: &Record) -> Result<Revealed> {
        let key = self.keys.load(record.id).await?;
        let payload = self.open_sealed(record, &key).inspect_err(|_e| {
            #[cfg(feature = "tracing")]
            tracing::warn!(record_id = %record.id, error = %_e, "record failed to decrypt");
            #[cfg(feature = "metrics")]
            counter!(vault_metrics::DECRYPT_FAILURES_TOTAL).increment(1);
        })?;
        Ok(payload.into_revealed())
    }

    fn seal(&self, id: RecordId, key: &RecordKey, payload: &Payload) -> Result<SealedField> {
        let plaintext = payload.to_bytes()?;
        Ok(self
            .cipher
            .encrypt(key.expose(), &plaintext, id.aad().as_bytes())?)
    }

    fn open_sealed(&self, record: &Record, key: &RecordKey) -> Result<Payload> {
        if record.cipher_version != self.cipher.version_tag() {
            return Err(CipherError::UnsupportedVersion(record.cipher_version).into());
        }
        let plaintext =
            self.cipher
                .decrypt(key.expose(), &record.sealed, record.id.aad().as_bytes())?;
        Ok(Payload::from_bytes(&plaintext)?)
    }

    // ── Maintenance ─────────────────────────────────────────────────────────

    /// Remove keys that have no record. Returns the ids swept.
    pub async fn sweep_orphan_keys(&self) -> Result<Vec<RecordId>> {
        let _guard = self.commit_lock.lock().await;

        let rows: BTreeSet<RecordId> = self.records.list().await?.iter().map(|r| r.id).collect();
        let mut swept = Vec::new();
        for id in self.keys.ids().await? {
            if rows.contains(&id) {
                continue;
            }
            match self.keys.delete(id).await {
                Ok(()) => swept.push(id),
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(record_id = %id, error = %e, "failed to sweep orphan key");
                    #[cfg(not(feature = "tracing"))]
                    let _ = e;
                },
            }
        }

        #[cfg(feature = "metrics")]
        counter!(vault_metrics::ORPHAN_KEYS_SWEPT_TOTAL).increment(swept.len() as u64);
        #[cfg(feature = "tracing")]
        if !swept.is_empty() {
            tracing::info!(count = swept.len(), "swept orphan keys");
        }

        Ok(swept)
    }

    /// Compare the two stores and try to decrypt every row.
    pub async fn check(&self) -> Result<IntegrityReport> {
        let _guard = self.commit_lock.lock().await;

        let records = self.records.list().await?;
        let key_ids: BTreeSet<RecordId> = self.keys.ids().await?.into_iter().collect();
        let record_ids: BTreeSet<RecordId> = records.iter().map(|r| r.id).collect();

        let mut report = IntegrityReport {
            records: records.len(),
            keys: key_ids.len(),
            orphan_keys: key_ids.difference(&record_ids).copied().collect(),
            ..Default::default()
        };

        for record in &records {
            if !key_ids.contains(&record.id) {
                report.missing_keys.push(record.id);
                continue;
            }
            if let Err(e) = self.reveal_record(record).await {
                report.unreadable.push((record.id, RowError::from(e)));
            }
        }

        Ok(report)
    }

    /// Write a point-in-time copy of the records and keys into `dest`:
    /// `dest/records.db` and `dest/keys/`.
    pub async fn snapshot(&self, dest: &Path) -> Result<SnapshotManifest> {
        let _guard = self.commit_lock.lock().await;
        self.snapshot_locked(dest).await
    }

    /// Write today's daily backup now unless it already exists. Returns the
    /// backup directory, or `None` if today's backup was already written or
    /// no backup directory is configured.
    pub async fn backup_today(&self) -> Result<Option<PathBuf>> {
        let Some(backup) = &self.backup else {
            return Ok(None);
        };
        let _guard = self.commit_lock.lock().await;
        self.write_daily(backup).await
    }

    async fn snapshot_locked(&self, dest: &Path) -> Result<SnapshotManifest> {
        tokio::fs::create_dir_all(dest).await?;
        let database = dest.join(SNAPSHOT_DATABASE);
        let keys_dir = dest.join(SNAPSHOT_KEYS);

        let records = self.records.list().await?.len();
        self.records.snapshot(&database).await?;
        let keys = self.keys.export(&keys_dir).await?;

        #[cfg(feature = "tracing")]
        tracing::info!(dest = %dest.display(), records, keys, "snapshot written");

        Ok(SnapshotManifest {
            dir: dest.to_path_buf(),
            database,
            keys_dir,
            records,
            keys,
        })
    }

    async fn backup_if_due(&self, backup: &DailyBackup) -> Option<BackupStatus> {
        match self.write_daily(backup).await {
            Ok(written) => written.map(BackupStatus::Written),
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %e, "daily backup failed");
                Some(BackupStatus::Failed(e.to_string()))
            },
        }
    }

    async fn write_daily(&self, backup: &DailyBackup) -> Result<Option<PathBuf>> {
        let today = chrono::Local::now().date_naive();
        if !backup.is_due(today).await? {
            return Ok(None);
        }

        let partial = backup.partial_path_for(today);
        if tokio::fs::try_exists(&partial).await? {
            tokio::fs::remove_dir_all(&partial).await?;
        }
        self.snapshot_locked(&partial).await?;

        let target = backup.path_for(today);
        tokio::fs::rename(&partial, &target).await?;

        #[cfg(feature = "metrics")]
        counter!(vault_metrics::BACKUPS_TOTAL).increment(1);

        Ok(Some(target))
    }
}

#[cfg(feature = "metrics")]
fn change_kind(kind: &ChangeKind) -> &'static str {
    match kind {
        ChangeKind::Addition(_) => "addition",
        ChangeKind::Edit { .. } => "edit",
        ChangeKind::Deletion { .. } => "deletion",
    }
}
