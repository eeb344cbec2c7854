//! AES-256-GCM protection for the email field.
//!
//! Every call to [`encrypt`] draws a fresh 96-bit nonce from the OS RNG, so the
//! same address sealed twice never yields the same ciphertext. The key lives
//! only in memory; the operator has to supply it again to decrypt.

use std::collections::HashMap;
use std::fmt;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

use crate::error::CryptoError;
use crate::models::EncryptedRecord;

pub const KEY_SIZE: usize = 32;
pub const NONCE_SIZE: usize = 12;

#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey([u8; KEY_SIZE]);

impl EncryptionKey {
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_hex(value: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(value.trim())
            .map_err(|e| CryptoError::InvalidKey(format!("not hex: {e}")))?;
        let bytes: [u8; KEY_SIZE] = bytes.try_into().map_err(|raw: Vec<u8>| {
            CryptoError::InvalidKey(format!("expected {KEY_SIZE} bytes, got {}", raw.len()))
        })?;
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}

/// Nonce and ciphertext (tag included). Stored as one hex string,
/// `nonce || ciphertext`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedField {
    pub nonce: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

impl EncryptedField {
    pub fn to_hex(&self) -> String {
        let mut out = hex::encode(&self.nonce);
        out.push_str(&hex::encode(&self.ciphertext));
        out
    }

    /// Splits a stored hex token. A token too short to hold a nonce is kept
    /// as is and rejected later by [`decrypt`].
    pub fn from_hex(value: &str) -> Result<Self, hex::FromHexError> {
        let mut bytes = hex::decode(value.trim())?;
        if bytes.len() < NONCE_SIZE {
            return Ok(Self {
                nonce: bytes,
                ciphertext: Vec::new(),
            });
        }
        let ciphertext = bytes.split_off(NONCE_SIZE);
        Ok(Self {
            nonce: bytes,
            ciphertext,
        })
    }

    /// Reads a persisted token without failing: anything that is not hex
    /// becomes an empty field, which [`decrypt`] refuses for that record alone.
    pub fn from_stored(value: &str) -> Self {
        Self::from_hex(value).unwrap_or_else(|err| {
            debug!(error = %err, "stored ciphertext is not hex");
            Self {
                nonce: Vec::new(),
                ciphertext: Vec::new(),
            }
        })
    }
}

impl Serialize for EncryptedField {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for EncryptedField {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from_stored(&raw))
    }
}

pub fn encrypt(plaintext: &str, key: &EncryptionKey) -> Result<EncryptedField, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(&key.0)
        .map_err(|e| CryptoError::EncryptFailure(format!("failed to create cipher: {e}")))?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|e| CryptoError::EncryptFailure(e.to_string()))?;

    Ok(EncryptedField {
        nonce: nonce_bytes.to_vec(),
        ciphertext,
    })
}

/// Recovers the plaintext. `id` only labels the failure; it takes no part in
/// the cryptography.
pub fn decrypt(field: &EncryptedField, key: &EncryptionKey, id: &str) -> Result<String, CryptoError> {
    let failure = || CryptoError::DecryptFailure { id: id.to_string() };

    if field.nonce.len() != NONCE_SIZE {
        debug!(record_id = %id, nonce_len = field.nonce.len(), "nonce has wrong length");
        return Err(failure());
    }

    let cipher = Aes256Gcm::new_from_slice(&key.0).map_err(|_| failure())?;
    let nonce = Nonce::from_slice(&field.nonce);
    let plaintext = cipher
        .decrypt(nonce, field.ciphertext.as_ref())
        .map_err(|_| failure())?;

    String::from_utf8(plaintext).map_err(|_| failure())
}

/// Identifier to sealed email lookup, rebuilt from a persisted record set.
#[derive(Debug, Default)]
pub struct EmailStore {
    fields: HashMap<String, EncryptedField>,
}

impl EmailStore {
    pub fn from_records(records: &[EncryptedRecord]) -> Self {
        let fields = records
            .iter()
            .map(|record| (record.id.clone(), record.email.clone()))
            .collect();
        Self { fields }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }
}

pub fn decrypt_by_id(store: &EmailStore, id: &str, key: &EncryptionKey) -> Result<String, CryptoError> {
    let field = store
        .fields
        .get(id)
        .ok_or_else(|| CryptoError::UnknownId(id.to_string()))?;
    decrypt(field, key, id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StudentRecord;
    use std::collections::{BTreeMap, BTreeSet};

    const KEY_HEX: &str = "67d720da118b5a8558a9eeff8fb3b11dc689aebf6fa281c95a1fc16996e6cb75";

    fn key() -> EncryptionKey {
        EncryptionKey::from_hex(KEY_HEX).unwrap()
    }

    #[test]
    fn round_trips_plaintext() {
        let sealed = encrypt("paul@test.com", &key()).unwrap();
        assert_eq!(decrypt(&sealed, &key(), "1").unwrap(), "paul@test.com");
    }

    #[test]
    fn same_plaintext_encrypts_differently() {
        let first = encrypt("paul@test.com", &key()).unwrap();
        let second = encrypt("paul@test.com", &key()).unwrap();
        assert_ne!(first.nonce, second.nonce);
        assert_ne!(first.ciphertext, second.ciphertext);
    }

    #[test]
    fn ciphertext_hides_address() {
        let sealed = encrypt("paul@test.com", &key()).unwrap();
        assert!(!sealed.to_hex().contains('@'));
        assert_eq!(sealed.nonce.len(), NONCE_SIZE);
    }

    #[test]
    fn wrong_key_fails_closed() {
        let sealed = encrypt("paul@test.com", &key()).unwrap();
        let other = EncryptionKey::generate();
        assert_eq!(
            decrypt(&sealed, &other, "1"),
            Err(CryptoError::DecryptFailure { id: "1".to_string() })
        );
    }

    #[test]
    fn tampered_ciphertext_fails_closed() {
        let mut sealed = encrypt("paul@test.com", &key()).unwrap();
        sealed.ciphertext[0] ^= 0x01;
        assert!(decrypt(&sealed, &key(), "1").is_err());
    }

    #[test]
    fn truncated_nonce_fails_closed() {
        let sealed = encrypt("paul@test.com", &key()).unwrap();
        let broken = EncryptedField {
            nonce: sealed.nonce[..4].to_vec(),
            ciphertext: sealed.ciphertext.clone(),
        };
        assert!(decrypt(&broken, &key(), "1").is_err());

        let short = EncryptedField::from_hex("abcd").unwrap();
        assert!(decrypt(&short, &key(), "1").is_err());
    }

    #[test]
    fn non_hex_token_loads_but_never_decrypts() {
        let field: EncryptedField = serde_json::from_str("\"zz-corrupt\"").unwrap();
        assert!(field.nonce.is_empty());
        assert_eq!(
            decrypt(&field, &key(), "1"),
            Err(CryptoError::DecryptFailure { id: "1".to_string() })
        );
    }

    #[test]
    fn hex_token_survives_serde() {
        let sealed = encrypt("paul@test.com", &key()).unwrap();
        let json = serde_json::to_string(&sealed).unwrap();
        let restored: EncryptedField = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, sealed);
    }

    #[test]
    fn rejects_malformed_keys() {
        assert!(matches!(
            EncryptionKey::from_hex("zz"),
            Err(CryptoError::InvalidKey(_))
        ));
        assert!(matches!(
            EncryptionKey::from_hex("abcd"),
            Err(CryptoError::InvalidKey(_))
        ));
        assert_eq!(key().to_hex(), KEY_HEX);
    }

    #[test]
    fn debug_output_redacts_key() {
        assert!(!format!("{:?}", key()).contains(&KEY_HEX[..8]));
    }

    #[test]
    fn looks_up_by_id() {
        let record = StudentRecord {
            id: "1".to_string(),
            name: "Paul Casey".to_string(),
            email: encrypt("paul@test.com", &key()).unwrap(),
            gender: None,
            scores: BTreeMap::from([("math".to_string(), 73.0)]),
            career_aspiration: None,
            extracurricular_activities: BTreeSet::new(),
        };
        let store = EmailStore::from_records(&[record]);
        assert_eq!(store.len(), 1);
        assert_eq!(decrypt_by_id(&store, "1", &key()).unwrap(), "paul@test.com");
        assert_eq!(
            decrypt_by_id(&store, "999", &key()),
            Err(CryptoError::UnknownId("999".to_string()))
        );
    }
}
