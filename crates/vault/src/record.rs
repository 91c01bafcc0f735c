//! Record types shared by the stores and the coordinator.

use std::{fmt, str::FromStr};

use {
    secrecy::{ExposeSecret, SecretString},
    serde::{Deserialize, Serialize},
    zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing},
};

use crate::error::CipherError;

/// Stable record identifier. Allocated once and never reused, even after the
/// record is deleted, so a new record can never collide with an old key file.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RecordId(u64);

impl RecordId {
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Associated data bound into every seal for this record. A sealed field
    /// copied onto another row fails authentication.
    pub(crate) fn aad(self) -> String {
        format!("record:{}", self.0)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// Ciphertext, nonce and tag of one seal. Always stored and read together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedField {
    pub ciphertext: Vec<u8>,
    pub nonce: Vec<u8>,
    pub tag: Vec<u8>,
}

/// One persisted row. Only opaque bytes; no decryption happens at this level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub service: String,
    pub username: String,
    pub sealed: SealedField,
    /// [`Cipher::version_tag`](crate::traits::Cipher::version_tag) of the
    /// cipher that produced `sealed`.
    pub cipher_version: u8,
}

/// Plaintext credential as supplied by and returned to the UI layer.
#[derive(Debug)]
pub struct Credential {
    pub service: String,
    pub username: String,
    pub secret: SecretString,
    pub email: Option<String>,
    pub notes: Option<String>,
}

impl Credential {
    pub fn new(
        service: impl Into<String>,
        username: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            username: username.into(),
            secret: SecretString::new(secret.into()),
            email: None,
            notes: None,
        }
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    #[must_use]
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub(crate) fn sealed_payload(&self) -> Payload {
        Payload {
            secret: self.secret.expose_secret().clone(),
            email: self.email.clone(),
            notes: self.notes.clone(),
        }
    }
}

/// The decrypted half of a row.
#[derive(Debug)]
pub struct Revealed {
    pub secret: SecretString,
    pub email: Option<String>,
    pub notes: Option<String>,
}

/// Fields sealed together under the record key.
#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub(crate) struct Payload {
    pub(crate) secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) notes: Option<String>,
}

impl Payload {
    pub(crate) fn to_bytes(&self) -> Result<Zeroizing<Vec<u8>>, CipherError> {
        serde_json::to_vec(self)
            .map(Zeroizing::new)
            .map_err(|e| CipherError::Payload(e.to_string()))
    }

    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self, CipherError> {
        serde_json::from_slice(bytes).map_err(|e| CipherError::Payload(e.to_string()))
    }

    pub(crate) fn into_revealed(mut self) -> Revealed {
        Revealed {
            secret: SecretString::new(std::mem::take(&mut self.secret)),
            email: self.email.take(),
            notes: self.notes.take(),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_id_parses_and_displays() {
        let id: RecordId = "42".parse().unwrap();
        assert_eq!(id, RecordId::new(42));
        assert_eq!(id.to_string(), "42");
        assert!("forty-two".parse::<RecordId>().is_err());
    }

    #[test]
    fn aad_differs_per_record() {
        assert_ne!(RecordId::new(1).aad(), RecordId::new(2).aad());
    }

    #[test]
    fn payload_omits_missing_notes() {
        let payload = Credential::new("mail", "a@b.com", "p@ss").sealed_payload();
        let bytes = payload.to_bytes().unwrap();
        assert_eq!(&bytes[..], br#"{"secret":"p@ss"}"#);

        let parsed = Payload::from_bytes(&bytes).unwrap().into_revealed();
        assert_eq!(parsed.secret.expose_secret(), "p@ss");
        assert!(parsed.notes.is_none());
        assert!(parsed.email.is_none());
    }

    #[test]
    fn payload_seals_email_with_notes() {
        let payload = Credential::new("mail", "alice", "p@ss")
            .with_email("a@b.com")
            .with_notes("n")
            .sealed_payload();
        let bytes = payload.to_bytes().unwrap();
        assert_eq!(
            &bytes[..],
            br#"{"secret":"p@ss","email":"a@b.com","notes":"n"}"#
        );

        let parsed = Payload::from_bytes(&bytes).unwrap().into_revealed();
        assert_eq!(parsed.email.as_deref(), Some("a@b.com"));
        assert_eq!(parsed.notes.as_deref(), Some("n"));
    }

    #[test]
    fn payload_rejects_garbage() {
        assert!(matches!(
            Payload::from_bytes(b"not json"),
            Err(CipherError::Payload(_))
        ));
    }

    #[test]
    fn credential_debug_hides_secret() {
        let cred = Credential::new("mail", "a@b.com", "hunter2");
        assert!(!format!("{cred:?}").contains("hunter2"));
    }
}
