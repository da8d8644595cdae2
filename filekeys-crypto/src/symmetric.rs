//! The symmetric cipher seam used by key storage.
//!
//! Key storage holds an `Arc<dyn SymmetricCipher>` and never sees the
//! instance key. `InstanceCipher` is the production implementation;
//! `PassthroughCipher` leaves data untouched for tests that only care
//! about layout.

use crate::cipher::{self, Envelope};
use crate::error::CryptoResult;
use crate::key::{derive_key, DerivedKey, KdfParams, Salt};

/// Encrypts and decrypts opaque byte strings.
///
/// `decrypt` must fail on input that `encrypt` did not produce; key
/// storage relies on that to tell wrapped records from legacy raw keys.
pub trait SymmetricCipher: Send + Sync {
    /// Encrypts `plaintext`, returning bytes safe to write to a key file.
    fn encrypt(&self, plaintext: &[u8]) -> CryptoResult<Vec<u8>>;

    /// Decrypts bytes previously produced by `encrypt`.
    fn decrypt(&self, ciphertext: &[u8]) -> CryptoResult<Vec<u8>>;
}

/// ChaCha20-Poly1305 cipher keyed by the instance secret.
#[derive(Debug)]
pub struct InstanceCipher {
    key: DerivedKey,
}

impl InstanceCipher {
    /// Uses an already derived key.
    pub fn new(key: DerivedKey) -> Self {
        Self { key }
    }

    /// Derives the instance key from the configured secret.
    pub fn from_secret(secret: &str, salt: &Salt, params: &KdfParams) -> CryptoResult<Self> {
        Ok(Self::new(derive_key(secret.as_bytes(), salt, params)?))
    }
}

impl SymmetricCipher for InstanceCipher {
    fn encrypt(&self, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        Ok(cipher::seal(&self.key, plaintext)?.to_text().into_bytes())
    }

    fn decrypt(&self, ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
        let envelope = Envelope::from_text(ciphertext)?;
        cipher::open(&self.key, &envelope)
    }
}

/// No-op cipher. Data passes through unchanged.
pub struct PassthroughCipher;

impl SymmetricCipher for PassthroughCipher {
    fn encrypt(&self, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        Ok(plaintext.to_vec())
    }

    fn decrypt(&self, ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
        Ok(ciphertext.to_vec())
    }
}
