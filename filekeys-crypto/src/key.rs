//! Instance key derivation.
//!
//! Every key file written in the migrated format is sealed with one
//! instance-wide key. That key is derived from the configured instance
//! secret with Argon2id, so rotating the secret makes every wrapped key
//! unreadable until it is re-wrapped.

use crate::error::{CryptoError, CryptoResult};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Instance key length: 256 bits for ChaCha20.
pub const KEY_SIZE: usize = 32;

/// Salt length used for instance key derivation.
pub const SALT_SIZE: usize = 16;

pub(crate) fn random_bytes<const N: usize>() -> [u8; N] {
    let mut out = [0u8; N];
    rand::rngs::OsRng.fill_bytes(&mut out);
    out
}

/// The instance key. Wiped from memory when dropped and never printed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey {
    bytes: [u8; KEY_SIZE],
}

impl DerivedKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Builds a key from configured material, which must be exactly
    /// `KEY_SIZE` bytes long.
    pub fn from_slice(material: &[u8]) -> CryptoResult<Self> {
        match <[u8; KEY_SIZE]>::try_from(material) {
            Ok(bytes) => Ok(Self { bytes }),
            Err(_) => Err(CryptoError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual: material.len(),
            }),
        }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DerivedKey(..)")
    }
}

/// Per-installation salt, stored next to the instance secret.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Salt {
    bytes: [u8; SALT_SIZE],
}

impl Salt {
    pub fn random() -> Self {
        Self {
            bytes: random_bytes(),
        }
    }

    pub fn from_bytes(bytes: [u8; SALT_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; SALT_SIZE] {
        &self.bytes
    }
}

/// Argon2id cost settings for deriving the instance key.
#[derive(Clone, Debug)]
pub struct KdfParams {
    /// KiB of memory.
    pub memory_cost: u32,
    /// Passes over memory.
    pub time_cost: u32,
    /// Lanes.
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        // Derived once per process: OWASP's interactive profile.
        Self {
            memory_cost: 19 * 1024,
            time_cost: 2,
            parallelism: 1,
        }
    }
}

impl KdfParams {
    fn hasher(&self) -> CryptoResult<Argon2<'static>> {
        let params = Params::new(
            self.memory_cost,
            self.time_cost,
            self.parallelism,
            Some(KEY_SIZE),
        )
        .map_err(|e| CryptoError::KeyDerivation(format!("bad Argon2 parameters: {e}")))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

/// Stretches the instance secret into the instance key.
pub fn derive_key(secret: &[u8], salt: &Salt, params: &KdfParams) -> CryptoResult<DerivedKey> {
    if secret.is_empty() {
        return Err(CryptoError::KeyDerivation(
            "instance secret must not be empty".to_string(),
        ));
    }

    let mut key = DerivedKey::from_bytes([0u8; KEY_SIZE]);
    params
        .hasher()?
        .hash_password_into(secret, salt.as_bytes(), &mut key.bytes)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(key)
}

/// A fresh random instance key, for installations without a secret and
/// for tests.
pub fn generate_random_key() -> DerivedKey {
    DerivedKey::from_bytes(random_bytes())
}
