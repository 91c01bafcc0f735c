//! Per-record key material and its storage addressing.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use {rand::RngCore, zeroize::Zeroizing};

use crate::{record::RecordId, xchacha20::KEY_LEN};

/// A record's symmetric key. Zeroized on drop, redacted in `Debug`.
#[derive(Clone)]
pub struct RecordKey(Zeroizing<[u8; KEY_LEN]>);

impl RecordKey {
    /// Draw a fresh random key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = Zeroizing::new([0u8; KEY_LEN]);
        rand::rng().fill_bytes(bytes.as_mut());
        Self(bytes)
    }

    /// Rebuild a key from stored bytes. `None` if the length is wrong.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != KEY_LEN {
            return None;
        }
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        key.copy_from_slice(bytes);
        Some(Self(key))
    }

    /// Raw key bytes, for [`KeyStore`](crate::key_store::KeyStore)
    /// implementations that persist them.
    #[must_use]
    pub fn expose(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl fmt::Debug for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RecordKey(<redacted>)")
    }
}

/// Deterministic mapping from a record id to the name of its key file.
///
/// `RecordId(26)` maps to `record-000000000000001a.key`. The fixed-width hex
/// form sorts in id order and parses back without ambiguity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyAddress {
    file_name: String,
}

impl KeyAddress {
    const PREFIX: &'static str = "record-";
    const EXTENSION: &'static str = ".key";

    #[must_use]
    pub fn for_record(id: RecordId) -> Self {
        Self {
            file_name: format!("{}{:016x}{}", Self::PREFIX, id.get(), Self::EXTENSION),
        }
    }

    /// Recover the record id from a key file name. Anything that is not a
    /// key file (temp files, stray files) yields `None`.
    #[must_use]
    pub fn parse(file_name: &str) -> Option<RecordId> {
        let hex = file_name
            .strip_prefix(Self::PREFIX)?
            .strip_suffix(Self::EXTENSION)?;
        if hex.len() != 16 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        u64::from_str_radix(hex, 16).ok().map(RecordId::new)
    }

    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    #[must_use]
    pub fn path_in(&self, dir: &Path) -> PathBuf {
        dir.join(&self.file_name)
    }
}
