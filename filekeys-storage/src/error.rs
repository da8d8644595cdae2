//! Error types for the key storage layer.

use filekeys_crypto::CryptoError;
use thiserror::Error;

use crate::view::ViewError;

/// Result type for key storage operations.
pub type KeyStoreResult<T> = Result<T, KeyStoreError>;

/// Errors that can occur in key storage operations.
#[derive(Debug, Error)]
pub enum KeyStoreError {
    /// The owner of a path could not be determined (unknown or deleted user).
    #[error("could not determine owner of {path}")]
    NoOwner { path: String },

    /// A stored key could not be decoded.
    #[error("key at {path} is corrupt: {source}")]
    KeyCorrupt {
        path: String,
        #[source]
        source: CodecError,
    },

    /// A migrated key carries an owner tag that does not match the requester.
    #[error("key at {path} has been modified (owner tag mismatch)")]
    KeyTampered { path: String },

    /// A record could not be encoded for writing.
    #[error("could not encode key for {path}: {source}")]
    Encode {
        path: String,
        #[source]
        source: CodecError,
    },

    /// Underlying file view failure.
    #[error(transparent)]
    View(#[from] ViewError),

    /// Configuration could not be read or persisted.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors from encoding or decoding a single key record.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The stored bytes could not be decrypted.
    #[error("could not decrypt key: {0}")]
    Decrypt(#[source] CryptoError),

    /// The record could not be encrypted.
    #[error("could not encrypt key: {0}")]
    Encrypt(#[source] CryptoError),

    /// The decrypted record is not valid JSON of the expected shape.
    #[error("invalid key record: {0}")]
    Json(#[from] serde_json::Error),

    /// The `key` field is not valid base64.
    #[error("invalid key encoding: {0}")]
    InvalidKeyEncoding(#[from] base64::DecodeError),
}
