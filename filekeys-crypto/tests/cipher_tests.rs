use filekeys_crypto::{
    generate_random_key, open, seal, Envelope, ENVELOPE_VERSION, NONCE_SIZE, TAG_SIZE,
};

// ── seal / open ──────────────────────────────────────────────────

#[test]
fn seal_open_roundtrip() {
    let key = generate_random_key();
    let envelope = seal(&key, br#"{"key":"c2VjcmV0"}"#).unwrap();
    assert_eq!(open(&key, &envelope).unwrap(), br#"{"key":"c2VjcmV0"}"#);
}

#[test]
fn seal_open_empty() {
    let key = generate_random_key();
    let envelope = seal(&key, b"").unwrap();
    assert_eq!(envelope.ciphertext.len(), TAG_SIZE);
    assert_eq!(open(&key, &envelope).unwrap(), b"");
}

#[test]
fn wrong_key_fails() {
    let envelope = seal(&generate_random_key(), b"secret").unwrap();
    assert!(open(&generate_random_key(), &envelope).is_err());
}

#[test]
fn tampered_ciphertext_fails() {
    let key = generate_random_key();
    let mut envelope = seal(&key, b"secret").unwrap();
    envelope.ciphertext[0] ^= 0xFF;
    assert!(open(&key, &envelope).is_err());
}

#[test]
fn version_is_authenticated() {
    let key = generate_random_key();
    let mut envelope = seal(&key, b"secret").unwrap();
    envelope.version = ENVELOPE_VERSION + 1;
    assert!(open(&key, &envelope).is_err());
}

#[test]
fn fresh_nonce_per_seal() {
    let key = generate_random_key();
    let e1 = seal(&key, b"same").unwrap();
    let e2 = seal(&key, b"same").unwrap();
    assert_ne!(e1.nonce, e2.nonce);
}

// ── Envelope encoding ────────────────────────────────────────────

#[test]
fn bytes_layout() {
    let envelope = seal(&generate_random_key(), b"abc").unwrap();
    let bytes = envelope.to_bytes();
    assert_eq!(bytes.len(), envelope.len());
    assert_eq!(bytes[0], ENVELOPE_VERSION);
    assert_eq!(&bytes[1..1 + NONCE_SIZE], &envelope.nonce);
    assert_eq!(Envelope::from_bytes(&bytes).unwrap(), envelope);
}

#[test]
fn text_tolerates_trailing_newline() {
    let key = generate_random_key();
    let envelope = seal(&key, b"abc").unwrap();
    let mut text = envelope.to_text().into_bytes();
    text.push(b'\n');
    let parsed = Envelope::from_text(&text).unwrap();
    assert_eq!(open(&key, &parsed).unwrap(), b"abc");
}

#[test]
fn short_input_is_rejected() {
    assert!(Envelope::from_bytes(&[ENVELOPE_VERSION; 10]).is_err());
}

#[test]
fn unknown_version_is_rejected() {
    let mut bytes = vec![9u8];
    bytes.extend_from_slice(&[0u8; NONCE_SIZE + TAG_SIZE]);
    assert!(Envelope::from_bytes(&bytes).is_err());
}

#[test]
fn raw_key_bytes_are_not_an_envelope() {
    // Legacy key files hold raw key bytes, which must never parse.
    let raw: Vec<u8> = (0u8..32).collect();
    assert!(Envelope::from_text(&raw).is_err());
}
