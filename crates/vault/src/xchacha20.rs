//! XChaCha20-Poly1305 implementation of the [`Cipher`] trait.

#[allow(deprecated)] // upstream generic-array 0.x deprecation
use chacha20poly1305::{
    Tag, XChaCha20Poly1305, XNonce,
    aead::{AeadInPlace, KeyInit},
};
use {rand::RngCore, zeroize::Zeroizing};

use crate::{error::CipherError, record::SealedField, traits::Cipher};

/// Version tag for the XChaCha20-Poly1305 cipher.
pub const VERSION_TAG: u8 = 0x01;

/// Key size for XChaCha20-Poly1305 (32 bytes).
pub const KEY_LEN: usize = 32;

/// Nonce size for XChaCha20-Poly1305 (24 bytes). Large enough that random
/// nonces never collide in practice.
pub const NONCE_LEN: usize = 24;

/// Poly1305 tag size (16 bytes).
pub const TAG_LEN: usize = 16;

/// XChaCha20-Poly1305 AEAD cipher with a detached tag.
pub struct XChaCha20Poly1305Cipher;

impl XChaCha20Poly1305Cipher {
    fn init(key: &[u8]) -> Result<XChaCha20Poly1305, CipherError> {
        XChaCha20Poly1305::new_from_slice(key).map_err(|_| CipherError::InvalidKeyLength {
            expected: KEY_LEN,
            actual: key.len(),
        })
    }
}

impl Cipher for XChaCha20Poly1305Cipher {
    fn version_tag(&self) -> u8 {
        VERSION_TAG
    }

    #[allow(deprecated)]
    fn encrypt(
        &self,
        key: &[u8],
        plaintext: &[u8],
        aad: &[u8],
    ) -> Result<SealedField, CipherError> {
        let cipher = Self::init(key)?;

        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce);

        let mut buffer = plaintext.to_vec();
        let tag = cipher
            .encrypt_in_place_detached(XNonce::from_slice(&nonce), aad, &mut buffer)
            .map_err(|e| CipherError::Payload(e.to_string()))?;

        Ok(SealedField {
            ciphertext: buffer,
            nonce: nonce.to_vec(),
            tag: tag.to_vec(),
        })
    }

    #[allow(deprecated)]
    fn decrypt(
        &self,
        key: &[u8],
        sealed: &SealedField,
        aad: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, CipherError> {
        let cipher = Self::init(key)?;

        if sealed.nonce.len() != NONCE_LEN || sealed.tag.len() != TAG_LEN {
            return Err(CipherError::AuthenticationFailed);
        }

        let mut buffer = Zeroizing::new(sealed.ciphertext.clone());
        cipher
            .decrypt_in_place_detached(
                XNonce::from_slice(&sealed.nonce),
                aad,
                buffer.as_mut_slice(),
                Tag::from_slice(&sealed.tag),
            )
            .map_err(|_| CipherError::AuthenticationFailed)?;

        Ok(buffer)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    const KEY: [u8; 32] = [0x42; 32];

    fn flip_each_bit(bytes: &[u8]) -> impl Iterator<Item = Vec<u8>> + '_ {
        (0..bytes.len() * 8).map(move |bit| {
            let mut copy = bytes.to_vec();
            copy[bit / 8] ^= 1 << (bit % 8);
            copy
        })
    }

    #[test]
    fn round_trip_no_aad() {
        let cipher = XChaCha20Poly1305Cipher;
        let sealed = cipher.encrypt(&KEY, b"hello vault", b"").unwrap();
        let opened = cipher.decrypt(&KEY, &sealed, b"").unwrap();
        assert_eq!(opened.as_slice(), b"hello vault");
    }

    #[test]
    fn round_trip_with_aad() {
        let cipher = XChaCha20Poly1305Cipher;
        let sealed = cipher.encrypt(&KEY, b"secret data", b"record:7").unwrap();
        let opened = cipher.decrypt(&KEY, &sealed, b"record:7").unwrap();
        assert_eq!(opened.as_slice(), b"secret data");
    }

    #[test]
    fn layout_has_detached_tag() {
        let cipher = XChaCha20Poly1305Cipher;
        let sealed = cipher.encrypt(&KEY, b"12345", b"").unwrap();
        assert_eq!(sealed.ciphertext.len(), 5);
        assert_eq!(sealed.nonce.len(), NONCE_LEN);
        assert_eq!(sealed.tag.len(), TAG_LEN);
    }

    #[test]
    fn empty_plaintext_round_trip() {
        let cipher = XChaCha20Poly1305Cipher;
        let sealed = cipher.encrypt(&KEY, b"", b"").unwrap();
        assert!(cipher.decrypt(&KEY, &sealed, b"").unwrap().is_empty());
    }

    #[test]
    fn large_plaintext_round_trip() {
        let cipher = XChaCha20Poly1305Cipher;
        let plaintext = vec![0xAB; 100_000];
        let sealed = cipher.encrypt(&KEY, &plaintext, b"").unwrap();
        assert_eq!(*cipher.decrypt(&KEY, &sealed, b"").unwrap(), plaintext);
    }

    #[test]
    fn wrong_key_fails() {
        let cipher = XChaCha20Poly1305Cipher;
        let sealed = cipher.encrypt(&KEY, b"secret", b"").unwrap();
        let result = cipher.decrypt(&[0x43; 32], &sealed, b"");
        assert!(matches!(result, Err(CipherError::AuthenticationFailed)));
    }

    #[test]
    fn wrong_aad_fails() {
        let cipher = XChaCha20Poly1305Cipher;
        let sealed = cipher.encrypt(&KEY, b"secret", b"record:1").unwrap();
        let result = cipher.decrypt(&KEY, &sealed, b"record:2");
        assert!(matches!(result, Err(CipherError::AuthenticationFailed)));
    }

    #[test]
    fn any_flipped_bit_fails_authentication() {
        let cipher = XChaCha20Poly1305Cipher;
        let sealed = cipher.encrypt(&KEY, b"p@ss", b"record:1").unwrap();

        for ciphertext in flip_each_bit(&sealed.ciphertext) {
            let tampered = SealedField {
                ciphertext,
                ..sealed.clone()
            };
            assert!(matches!(
                cipher.decrypt(&KEY, &tampered, b"record:1"),
                Err(CipherError::AuthenticationFailed)
            ));
        }
        for nonce in flip_each_bit(&sealed.nonce) {
            let tampered = SealedField {
                nonce,
                ..sealed.clone()
            };
            assert!(matches!(
                cipher.decrypt(&KEY, &tampered, b"record:1"),
                Err(CipherError::AuthenticationFailed)
            ));
        }
        for tag in flip_each_bit(&sealed.tag) {
            let tampered = SealedField {
                tag,
                ..sealed.clone()
            };
            assert!(matches!(
                cipher.decrypt(&KEY, &tampered, b"record:1"),
                Err(CipherError::AuthenticationFailed)
            ));
        }
    }

    #[test]
    fn truncated_nonce_or_tag_fails_authentication() {
        let cipher = XChaCha20Poly1305Cipher;
        let sealed = cipher.encrypt(&KEY, b"secret", b"").unwrap();

        let mut short_nonce = sealed.clone();
        short_nonce.nonce.pop();
        assert!(matches!(
            cipher.decrypt(&KEY, &short_nonce, b""),
            Err(CipherError::AuthenticationFailed)
        ));

        let mut short_tag = sealed;
        short_tag.tag.truncate(8);
        assert!(matches!(
            cipher.decrypt(&KEY, &short_tag, b""),
            Err(CipherError::AuthenticationFailed)
        ));
    }

    #[test]
    fn invalid_key_length_is_rejected() {
        let cipher = XChaCha20Poly1305Cipher;
        let result = cipher.encrypt(&[0u8; 16], b"secret", b"");
        assert!(matches!(
            result,
            Err(CipherError::InvalidKeyLength {
                expected: 32,
                actual: 16
            })
        ));

        let sealed = cipher.encrypt(&KEY, b"secret", b"").unwrap();
        assert!(matches!(
            cipher.decrypt(&[0u8; 33], &sealed, b""),
            Err(CipherError::InvalidKeyLength { .. })
        ));
    }

    #[test]
    fn nonces_never_repeat_under_one_key() {
        let cipher = XChaCha20Poly1305Cipher;
        let mut seen = HashSet::with_capacity(10_000);
        for _ in 0..10_000 {
            let sealed = cipher.encrypt(&KEY, b"same input", b"").unwrap();
            assert!(seen.insert(sealed.nonce), "nonce reused");
        }
    }

    #[test]
    fn same_input_produces_different_ciphertexts() {
        let cipher = XChaCha20Poly1305Cipher;
        let a = cipher.encrypt(&KEY, b"same input", b"").unwrap();
        let b = cipher.encrypt(&KEY, b"same input", b"").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn version_tag_is_0x01() {
        assert_eq!(XChaCha20Poly1305Cipher.version_tag(), 0x01);
    }
}
