//! Instance cipher for encryption key storage.
//!
//! Key files written in the migrated format are JSON records sealed with
//! a key derived from the instance secret:
//! - `key`: Argon2id derivation of the instance key
//! - `cipher`: ChaCha20-Poly1305 envelopes with a versioned text form
//! - `symmetric`: the `SymmetricCipher` trait key storage depends on

mod cipher;
mod error;
mod key;
mod symmetric;

pub use cipher::{open, seal, Envelope, ENVELOPE_VERSION, NONCE_SIZE, TAG_SIZE};
pub use error::{CryptoError, CryptoResult};
pub use key::{derive_key, generate_random_key, DerivedKey, KdfParams, Salt, KEY_SIZE, SALT_SIZE};
pub use symmetric::{InstanceCipher, PassthroughCipher, SymmetricCipher};
