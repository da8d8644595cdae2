//! On-disk key record format.
//!
//! A key file holds one of two shapes:
//!
//! - **legacy**: the raw key bytes, written by installations at or
//!   below [`LEGACY_VERSION_THRESHOLD`](crate::migration::LEGACY_VERSION_THRESHOLD);
//! - **wrapped**: `encrypt(json({"key": base64(bytes), "uid": owner}))`.
//!
//! Which shape is read and written depends on the [`MigrationState`],
//! which callers load fresh for every operation.

use crate::error::CodecError;
use crate::migration::MigrationState;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use filekeys_crypto::SymmetricCipher;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use tracing::debug;

/// A decoded key file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    /// Base64 key material. Empty means "no key".
    pub key: String,

    /// Owner tag. `None` when the field is absent (file keys, legacy
    /// records), `Some(None)` for an explicit `null` (system keys),
    /// `Some(Some(uid))` for user keys.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_field"
    )]
    pub uid: Option<Option<String>>,
}

// A field that is present is `Some`, even when its value is `null`.
fn present_field<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

impl KeyRecord {
    /// A record for a user key, tagged with its owner.
    pub fn user(key: &[u8], uid: &str) -> Self {
        Self {
            key: STANDARD.encode(key),
            uid: Some(Some(uid.to_string())),
        }
    }

    /// A record for a system-wide key (owner tag `null`).
    pub fn system(key: &[u8]) -> Self {
        Self {
            key: STANDARD.encode(key),
            uid: Some(None),
        }
    }

    /// A record for a file key (no owner tag).
    pub fn file(key: &[u8]) -> Self {
        Self {
            key: STANDARD.encode(key),
            uid: None,
        }
    }

    /// Whether the record carries no key material.
    pub fn is_empty(&self) -> bool {
        self.key.is_empty()
    }

    /// The owner tag flattened: `None` for both absent and `null`.
    pub fn owner(&self) -> Option<&str> {
        self.uid.as_ref().and_then(|uid| uid.as_deref())
    }

    /// Decoded key material.
    pub fn key_bytes(&self) -> Result<Vec<u8>, CodecError> {
        Ok(STANDARD.decode(&self.key)?)
    }
}

/// Encodes and decodes key files.
#[derive(Clone)]
pub struct KeyCodec {
    cipher: Arc<dyn SymmetricCipher>,
}

impl KeyCodec {
    pub fn new(cipher: Arc<dyn SymmetricCipher>) -> Self {
        Self { cipher }
    }

    /// Decodes the raw contents of a key file.
    ///
    /// While the migration is in progress a file that does not decrypt
    /// is taken to be a legacy raw key. A file that decrypts but does not
    /// hold a record is corrupt.
    pub fn decode(&self, raw: &[u8], state: MigrationState) -> Result<KeyRecord, CodecError> {
        if raw.is_empty() {
            return Ok(KeyRecord::default());
        }
        if state.pre_migration_version {
            return Ok(legacy_record(raw));
        }
        if state.key_storage_migrated {
            return self.unwrap_record(raw);
        }

        match self.cipher.decrypt(raw) {
            Ok(plaintext) => Ok(serde_json::from_slice(&plaintext)?),
            Err(e) => {
                debug!("Key did not decrypt, reading it as a legacy key: {}", e);
                Ok(legacy_record(raw))
            }
        }
    }

    /// Encodes a record for writing.
    pub fn encode(&self, record: &KeyRecord, state: MigrationState) -> Result<Vec<u8>, CodecError> {
        if state.pre_migration_version {
            return record.key_bytes();
        }
        let json = serde_json::to_vec(record)?;
        self.cipher.encrypt(&json).map_err(CodecError::Encrypt)
    }

    /// Whether `raw` already holds a wrapped record.
    pub fn is_wrapped(&self, raw: &[u8]) -> bool {
        !raw.is_empty() && self.unwrap_record(raw).is_ok()
    }

    fn unwrap_record(&self, raw: &[u8]) -> Result<KeyRecord, CodecError> {
        let plaintext = self.cipher.decrypt(raw).map_err(CodecError::Decrypt)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }
}

fn legacy_record(raw: &[u8]) -> KeyRecord {
    KeyRecord {
        key: STANDARD.encode(raw),
        uid: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_tag_states_survive_json() {
        let absent: KeyRecord = serde_json::from_str(r#"{"key":"YQ=="}"#).unwrap();
        assert_eq!(absent.uid, None);

        let null: KeyRecord = serde_json::from_str(r#"{"key":"YQ==","uid":null}"#).unwrap();
        assert_eq!(null.uid, Some(None));

        let user: KeyRecord = serde_json::from_str(r#"{"key":"YQ==","uid":"alice"}"#).unwrap();
        assert_eq!(user.owner(), Some("alice"));

        assert_eq!(serde_json::to_string(&absent).unwrap(), r#"{"key":"YQ=="}"#);
        assert_eq!(
            serde_json::to_string(&null).unwrap(),
            r#"{"key":"YQ==","uid":null}"#
        );
    }

    #[test]
    fn record_constructors() {
        assert_eq!(KeyRecord::user(b"k", "bob").uid, Some(Some("bob".into())));
        assert_eq!(KeyRecord::system(b"k").uid, Some(None));
        assert_eq!(KeyRecord::file(b"k").uid, None);
        assert_eq!(KeyRecord::file(b"k").key_bytes().unwrap(), b"k");
        assert!(KeyRecord::default().is_empty());
    }
}
