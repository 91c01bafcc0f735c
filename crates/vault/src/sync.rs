//! Staged changes awaiting commit.
//!
//! A [`WorkingSet`] is the in-memory edited view: additions, field edits and
//! deletions that have not reached the stores yet. It is plain state owned by
//! the caller and handed to [`Vault::commit`](crate::vault::Vault::commit),
//! which drives each change through its state machine:
//!
//! - addition: `New → Committing → Clean`
//! - edit: `EditedPending → Committing → Clean`
//! - deletion: `MarkedForDeletion → Committing → Removed`
//!
//! Any of them may end in `Failed` instead, in which case the change stays in
//! the set and is retried by the next commit.

use std::fmt;

use {
    secrecy::{ExposeSecret, SecretString},
    serde::{Deserialize, Serialize},
};

use crate::{
    error::{Result, VaultError},
    record::{Credential, Payload, RecordId},
};

/// Handle to one staged change within a [`WorkingSet`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct StageId(u64);

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Field edits for an existing record. `None` leaves a field unchanged.
#[derive(Debug, Default)]
pub struct CredentialPatch {
    pub service: Option<String>,
    pub username: Option<String>,
    pub secret: Option<SecretString>,
    /// `Some(None)` clears the email.
    pub email: Option<Option<String>>,
    /// `Some(None)` clears the notes.
    pub notes: Option<Option<String>>,
}

impl CredentialPatch {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    #[must_use]
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    #[must_use]
    pub fn secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(SecretString::new(secret.into()));
        self
    }

    #[must_use]
    pub fn email(mut self, email: Option<String>) -> Self {
        self.email = Some(email);
        self
    }

    #[must_use]
    pub fn notes(mut self, notes: Option<String>) -> Self {
        self.notes = Some(notes);
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.service.is_none()
            && self.username.is_none()
            && self.secret.is_none()
            && self.email.is_none()
            && self.notes.is_none()
    }

    /// Whether every sealed field is replaced, so the current ciphertext does
    /// not need to be opened first.
    pub(crate) fn replaces_sealed(&self) -> bool {
        self.secret.is_some() && self.email.is_some() && self.notes.is_some()
    }

    /// Fold a later patch into this one; later values win.
    fn merge(&mut self, later: CredentialPatch) {
        if later.service.is_some() {
            self.service = later.service;
        }
        if later.username.is_some() {
            self.username = later.username;
        }
        if later.secret.is_some() {
            self.secret = later.secret;
        }
        if later.email.is_some() {
            self.email = later.email;
        }
        if later.notes.is_some() {
            self.notes = later.notes;
        }
    }

    /// Build the sealed payload from the patch over the current one.
    pub(crate) fn apply_sealed(&self, current: Option<Payload>) -> Payload {
        let mut payload = current.unwrap_or_else(|| Payload {
            secret: String::new(),
            email: None,
            notes: None,
        });
        if let Some(secret) = &self.secret {
            payload.secret = secret.expose_secret().clone();
        }
        if let Some(email) = &self.email {
            payload.email = email.clone();
        }
        if let Some(notes) = &self.notes {
            payload.notes = notes.clone();
        }
        payload
    }
}

/// What a staged change does.
#[derive(Debug)]
pub enum ChangeKind {
    Addition(Credential),
    Edit {
        id: RecordId,
        patch: CredentialPatch,
    },
    Deletion {
        id: RecordId,
    },
}

impl ChangeKind {
    /// The persisted record this change targets. Additions have none yet.
    #[must_use]
    pub fn record_id(&self) -> Option<RecordId> {
        match self {
            Self::Addition(_) => None,
            Self::Edit { id, .. } | Self::Deletion { id } => Some(*id),
        }
    }
}

/// Where a staged change is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeState {
    New,
    EditedPending,
    MarkedForDeletion,
    /// The commit is applying this change. Seen outside a commit only if a
    /// commit future was dropped mid-item; the next commit retries it.
    Committing,
    /// The last attempt failed; the change is kept for retry.
    Failed {
        reason: String,
    },
}

/// One change in a [`WorkingSet`].
#[derive(Debug)]
pub struct StagedChange {
    pub(crate) stage: StageId,
    pub(crate) kind: ChangeKind,
    pub(crate) state: ChangeState,
    pub(crate) attempts: u32,
    /// Id reserved by an interrupted or failed addition attempt. The next
    /// attempt checks whether that row landed before reserving a fresh one.
    pub(crate) allocated: Option<RecordId>,
    /// A previous deletion attempt may have removed the row before it was
    /// interrupted, so a missing row on retry counts as removed.
    pub(crate) removal_issued: bool,
}

impl StagedChange {
    #[must_use]
    pub fn stage(&self) -> StageId {
        self.stage
    }

    #[must_use]
    pub fn kind(&self) -> &ChangeKind {
        &self.kind
    }

    #[must_use]
    pub fn state(&self) -> &ChangeState {
        &self.state
    }

    /// Number of commits that have tried to apply this change.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// The in-memory edited view: staged additions, edits and deletions in
/// staging order.
#[derive(Debug, Default)]
pub struct WorkingSet {
    next_stage: u64,
    pub(crate) changes: Vec<StagedChange>,
}

impl WorkingSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, kind: ChangeKind, state: ChangeState) -> StageId {
        self.next_stage += 1;
        let stage = StageId(self.next_stage);
        self.changes.push(StagedChange {
            stage,
            kind,
            state,
            attempts: 0,
            allocated: None,
            removal_issued: false,
        });
        stage
    }

    /// Stage a new record. Its id and key are created at commit time.
    pub fn stage_addition(&mut self, credential: Credential) -> StageId {
        self.push(ChangeKind::Addition(credential), ChangeState::New)
    }

    /// Stage field edits for a persisted record.
    ///
    /// Edits to a record that already has a pending edit are merged into it.
    pub fn stage_edit(&mut self, id: RecordId, patch: CredentialPatch) -> Result<StageId> {
        if self.pending_deletion(id).is_some() {
            return Err(VaultError::DeletionPending(id));
        }

        let pending = self.changes.iter_mut().find(|c| {
            c.state != ChangeState::Committing
                && matches!(c.kind, ChangeKind::Edit { id: target, .. } if target == id)
        });
        if let Some(change) = pending {
            if let ChangeKind::Edit { patch: existing, .. } = &mut change.kind {
                existing.merge(patch);
            }
            change.state = ChangeState::EditedPending;
            return Ok(change.stage);
        }

        Ok(self.push(ChangeKind::Edit { id, patch }, ChangeState::EditedPending))
    }

    /// Mark a persisted record for deletion, dropping any pending edit of it.
    pub fn stage_deletion(&mut self, id: RecordId) -> StageId {
        if let Some(stage) = self.pending_deletion(id) {
            return stage;
        }
        self.changes.retain(|c| {
            c.state == ChangeState::Committing
                || !matches!(c.kind, ChangeKind::Edit { id: target, .. } if target == id)
        });
        self.push(ChangeKind::Deletion { id }, ChangeState::MarkedForDeletion)
    }

    /// Drop a staged change. No store is touched.
    pub fn discard(&mut self, stage: StageId) -> Result<()> {
        let index = self
            .changes
            .iter()
            .position(|c| c.stage == stage)
            .ok_or(VaultError::UnknownStage(stage))?;
        if self.changes[index].state == ChangeState::Committing {
            return Err(VaultError::StageInFlight(stage));
        }
        self.changes.remove(index);
        Ok(())
    }

    /// Drop every change that is not mid-commit.
    pub fn discard_all(&mut self) {
        self.changes.retain(|c| c.state == ChangeState::Committing);
    }

    #[must_use]
    pub fn get(&self, stage: StageId) -> Option<&StagedChange> {
        self.changes.iter().find(|c| c.stage == stage)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StagedChange> {
        self.changes.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Whether a persisted record has uncommitted changes.
    #[must_use]
    pub fn is_dirty(&self, id: RecordId) -> bool {
        self.changes.iter().any(|c| c.kind.record_id() == Some(id))
    }

    /// Changes whose last commit attempt failed.
    pub fn failed(&self) -> impl Iterator<Item = &StagedChange> {
        self.changes
            .iter()
            .filter(|c| matches!(c.state, ChangeState::Failed { .. }))
    }

    fn pending_deletion(&self, id: RecordId) -> Option<StageId> {
        self.changes
            .iter()
            .find(|c| matches!(c.kind, ChangeKind::Deletion { id: target } if target == id))
            .map(|c| c.stage)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn mail() -> Credential {
        Credential::new("mail", "a@b.com", "p@ss")
    }

    #[test]
    fn staging_assigns_distinct_ids_in_order() {
        let mut set = WorkingSet::new();
        let a = set.stage_addition(mail());
        let b = set.stage_deletion(RecordId::new(4));
        assert_ne!(a, b);

        let order: Vec<StageId> = set.iter().map(|c| c.stage()).collect();
        assert_eq!(order, vec![a, b]);
        assert_eq!(set.get(a).unwrap().state(), &ChangeState::New);
        assert_eq!(set.get(b).unwrap().state(), &ChangeState::MarkedForDeletion);
    }

    #[test]
    fn edits_to_one_record_merge() {
        let mut set = WorkingSet::new();
        let id = RecordId::new(1);

        let first = set
            .stage_edit(id, CredentialPatch::new().secret("one").service("mail"))
            .unwrap();
        let second = set
            .stage_edit(id, CredentialPatch::new().secret("two"))
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(set.len(), 1);

        let ChangeKind::Edit { patch, .. } = set.get(first).unwrap().kind() else {
            panic!("expected an edit");
        };
        assert_eq!(patch.secret.as_ref().unwrap().expose_secret(), "two");
        assert_eq!(patch.service.as_deref(), Some("mail"));
        assert!(set.is_dirty(id));
        assert!(!set.is_dirty(RecordId::new(2)));
    }

    #[test]
    fn only_a_full_sealed_patch_skips_decryption() {
        let partial = CredentialPatch::new().secret("s").notes(None);
        assert!(!partial.replaces_sealed());

        let full = partial.email(Some("a@b.com".into()));
        assert!(full.replaces_sealed());
        let payload = full.apply_sealed(None);
        assert_eq!(payload.secret, "s");
        assert_eq!(payload.email.as_deref(), Some("a@b.com"));
        assert!(payload.notes.is_none());

        assert!(CredentialPatch::new().is_empty());
        assert!(!CredentialPatch::new().email(None).is_empty());
    }

    #[test]
    fn deletion_replaces_pending_edit() {
        let mut set = WorkingSet::new();
        let id = RecordId::new(1);
        set.stage_edit(id, CredentialPatch::new().username("x"))
            .unwrap();

        let deletion = set.stage_deletion(id);
        assert_eq!(set.len(), 1);
        assert!(matches!(
            set.get(deletion).unwrap().kind(),
            ChangeKind::Deletion { .. }
        ));

        // Deleting twice keeps one deletion; editing afterwards is refused.
        assert_eq!(set.stage_deletion(id), deletion);
        assert!(matches!(
            set.stage_edit(id, CredentialPatch::new().secret("late")),
            Err(VaultError::DeletionPending(_))
        ));
    }

    #[test]
    fn discard_removes_without_side_effects() {
        let mut set = WorkingSet::new();
        let stage = set.stage_addition(mail());
        set.discard(stage).unwrap();
        assert!(set.is_empty());
        assert!(matches!(
            set.discard(stage),
            Err(VaultError::UnknownStage(_))
        ));
    }

    #[test]
    fn committing_changes_cannot_be_discarded() {
        let mut set = WorkingSet::new();
        let stage = set.stage_addition(mail());
        set.changes[0].state = ChangeState::Committing;

        assert!(matches!(
            set.discard(stage),
            Err(VaultError::StageInFlight(_))
        ));
        set.discard_all();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn patch_applies_over_current_payload() {
        let current = Credential::new("mail", "a@b.com", "old")
            .with_notes("keep me")
            .sealed_payload();
        let patch = CredentialPatch::new().secret("new");
        assert!(!patch.replaces_sealed());

        let payload = patch.apply_sealed(Some(current));
        assert_eq!(payload.secret, "new");
        assert_eq!(payload.notes.as_deref(), Some("keep me"));

        let full = CredentialPatch::new().secret("s").notes(None);
        assert!(full.replaces_sealed());
        assert!(full.apply_sealed(None).notes.is_none());
        assert!(CredentialPatch::new().is_empty());
    }
}
