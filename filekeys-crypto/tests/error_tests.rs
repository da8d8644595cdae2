use filekeys_crypto::CryptoError;

#[test]
fn messages() {
    let cases = [
        (
            CryptoError::KeyDerivation("instance secret must not be empty".into()),
            "key derivation failed: instance secret must not be empty",
        ),
        (
            CryptoError::Encryption("aead".into()),
            "encryption failed: aead",
        ),
        (
            CryptoError::Decryption("wrong instance secret".into()),
            "decryption failed: wrong instance secret",
        ),
        (
            CryptoError::InvalidKeyLength {
                expected: 32,
                actual: 16,
            },
            "invalid key length: expected 32, got 16",
        ),
        (
            CryptoError::InvalidEnvelope("unsupported version 9".into()),
            "invalid envelope: unsupported version 9",
        ),
    ];
    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn errors_are_std_errors() {
    fn assert_error<E: std::error::Error + Send + Sync + 'static>(_: &E) {}
    assert_error(&CryptoError::Decryption("x".into()));
}
