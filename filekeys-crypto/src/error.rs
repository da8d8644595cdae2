//! Error types for the instance cipher.

use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur while wrapping or unwrapping key material.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Deriving the instance key from the secret failed.
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// Sealing failed.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Opening failed (wrong instance secret or tampered data).
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// Key material has the wrong length.
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    /// The stored envelope is not something this cipher produced.
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(String),
}
