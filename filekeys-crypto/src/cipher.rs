//! Sealed envelopes using ChaCha20-Poly1305.
//!
//! A sealed key file is the base64 text of
//! `version (1 byte) || nonce (12 bytes) || ciphertext || tag (16 bytes)`.
//! The version byte is bound as associated data so it cannot be swapped
//! without failing authentication.

use crate::error::{CryptoError, CryptoResult};
use crate::key::{random_bytes, DerivedKey};
use base64::{engine::general_purpose::STANDARD, Engine};
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};

/// Size of nonce in bytes (96 bits for ChaCha20-Poly1305).
pub const NONCE_SIZE: usize = 12;

/// Size of authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// Current envelope format version.
pub const ENVELOPE_VERSION: u8 = 1;

/// A sealed payload plus the metadata needed to open it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    /// Format version, authenticated as associated data.
    pub version: u8,
    /// The nonce used for sealing (unique per seal).
    pub nonce: [u8; NONCE_SIZE],
    /// Ciphertext including the authentication tag.
    pub ciphertext: Vec<u8>,
}

impl Envelope {
    /// Serialized length in bytes (before base64).
    pub fn len(&self) -> usize {
        1 + NONCE_SIZE + self.ciphertext.len()
    }

    /// Returns true if there is no ciphertext at all.
    pub fn is_empty(&self) -> bool {
        self.ciphertext.is_empty()
    }

    /// Binary form: `version || nonce || ciphertext`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.len());
        bytes.push(self.version);
        bytes.extend_from_slice(&self.nonce);
        bytes.extend_from_slice(&self.ciphertext);
        bytes
    }

    /// Parses the binary form.
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() < 1 + NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::InvalidEnvelope(format!(
                "{} bytes is too short",
                bytes.len()
            )));
        }

        let version = bytes[0];
        if version != ENVELOPE_VERSION {
            return Err(CryptoError::InvalidEnvelope(format!(
                "unsupported version {version}"
            )));
        }

        let (nonce, ciphertext) = bytes[1..].split_at(NONCE_SIZE);
        let nonce = <[u8; NONCE_SIZE]>::try_from(nonce)
            .map_err(|_| CryptoError::InvalidEnvelope("truncated nonce".to_string()))?;

        Ok(Self {
            version,
            nonce,
            ciphertext: ciphertext.to_vec(),
        })
    }

    /// Text form written to disk.
    pub fn to_text(&self) -> String {
        STANDARD.encode(self.to_bytes())
    }

    /// Parses the text form. Surrounding whitespace is ignored.
    pub fn from_text(text: &[u8]) -> CryptoResult<Self> {
        let bytes = STANDARD
            .decode(text.trim_ascii())
            .map_err(|e| CryptoError::InvalidEnvelope(format!("invalid base64: {e}")))?;
        Self::from_bytes(&bytes)
    }
}

/// Seals `plaintext` under `key` with a fresh random nonce.
pub fn seal(key: &DerivedKey, plaintext: &[u8]) -> CryptoResult<Envelope> {
    let cipher = ChaCha20Poly1305::new(key.as_bytes().into());

    let nonce_bytes: [u8; NONCE_SIZE] = random_bytes();

    let aad = [ENVELOPE_VERSION];
    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce_bytes),
            Payload {
                msg: plaintext,
                aad: &aad,
            },
        )
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    Ok(Envelope {
        version: ENVELOPE_VERSION,
        nonce: nonce_bytes,
        ciphertext,
    })
}

/// Opens an envelope sealed under `key`.
pub fn open(key: &DerivedKey, envelope: &Envelope) -> CryptoResult<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(key.as_bytes().into());
    let aad = [envelope.version];

    cipher
        .decrypt(
            Nonce::from_slice(&envelope.nonce),
            Payload {
                msg: envelope.ciphertext.as_ref(),
                aad: &aad,
            },
        )
        .map_err(|_| {
            CryptoError::Decryption("authentication failed (wrong key or tampered data)".to_string())
        })
}
