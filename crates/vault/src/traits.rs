//! Cipher trait for swappable authenticated encryption backends.

use zeroize::Zeroizing;

use crate::{error::CipherError, record::SealedField};

/// Trait for authenticated encryption with associated data (AEAD).
///
/// Implementations are stateless. Each has a unique version tag stored next to
/// every sealed row, so rows sealed by another backend are refused instead of
/// being fed to the wrong algorithm.
pub trait Cipher: Send + Sync {
    /// Unique identifier for this cipher (stored in the `cipher_version` column).
    fn version_tag(&self) -> u8;

    /// Seal `plaintext` under `key`, binding `aad`.
    ///
    /// A fresh random nonce is drawn for every call; callers cannot supply one.
    fn encrypt(&self, key: &[u8], plaintext: &[u8], aad: &[u8])
    -> Result<SealedField, CipherError>;

    /// Open a field previously produced by [`encrypt`](Self::encrypt).
    ///
    /// Fails with [`CipherError::AuthenticationFailed`] on any mismatch and
    /// never returns partial plaintext.
    fn decrypt(
        &self,
        key: &[u8],
        sealed: &SealedField,
        aad: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, CipherError>;
}
