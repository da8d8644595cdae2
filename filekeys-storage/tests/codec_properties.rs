//! Property-based tests for the key record codec.
//!
//! - Wrapped records decode to exactly what was encoded
//! - Legacy installations read and write raw key bytes
//! - While migrating, raw keys never fail to decode

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use filekeys_crypto::{generate_random_key, InstanceCipher};
use filekeys_storage::{KeyCodec, KeyRecord, MigrationState};
use proptest::prelude::*;
use std::sync::Arc;

// =============================================================================
// HELPER STRATEGIES
// =============================================================================

fn key_bytes_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..256)
}

fn uid_strategy() -> impl Strategy<Value = Option<Option<String>>> {
    prop_oneof![
        Just(None),
        Just(Some(None)),
        "[a-z0-9_.@-]{1,32}".prop_map(|uid| Some(Some(uid))),
    ]
}

fn record_strategy() -> impl Strategy<Value = KeyRecord> {
    (key_bytes_strategy(), uid_strategy()).prop_map(|(key, uid)| KeyRecord {
        key: STANDARD.encode(key),
        uid,
    })
}

fn codec() -> KeyCodec {
    KeyCodec::new(Arc::new(InstanceCipher::new(generate_random_key())))
}

// =============================================================================
// PROPERTIES
// =============================================================================

proptest! {
    #[test]
    fn wrapped_roundtrip(record in record_strategy()) {
        let codec = codec();
        let raw = codec.encode(&record, MigrationState::migrated()).unwrap();
        prop_assert_eq!(codec.decode(&raw, MigrationState::migrated()).unwrap(), record);
    }

    #[test]
    fn legacy_passthrough(key in key_bytes_strategy()) {
        let codec = codec();
        let record = KeyRecord { key: STANDARD.encode(&key), uid: None };
        let raw = codec.encode(&record, MigrationState::legacy()).unwrap();
        prop_assert_eq!(&raw, &key);
        prop_assert_eq!(codec.decode(&raw, MigrationState::legacy()).unwrap(), record);
    }

    #[test]
    fn in_progress_never_rejects_raw_keys(raw in prop::collection::vec(any::<u8>(), 1..256)) {
        let codec = codec();
        let record = codec.decode(&raw, MigrationState::in_progress()).unwrap();
        prop_assert_eq!(record.key_bytes().unwrap(), raw);
        prop_assert!(!codec.is_wrapped(&record.key_bytes().unwrap()));
    }
}
