//! Deterministic identity keys for serializable values.
//!
//! Values are first lowered to a `serde_json::Value` tree. Its maps are
//! key-sorted, so neither struct field order nor `HashMap` iteration order
//! leaks into the encoded bytes. The bytes are then hashed with XxHash64.
//!
//! This is a cache key, not an integrity check: the hash is fast and well
//! distributed but offers no resistance to deliberately crafted collisions.

use serde::Serialize;
use std::fmt;
use std::hash::Hasher;
use twox_hash::XxHash64;

use crate::error::FingerprintError;

const SEED: u64 = 0;

/// 64-bit fingerprint, stored big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 8]);

impl Fingerprint {
    pub fn from_u64(value: u64) -> Self {
        Self(value.to_be_bytes())
    }

    pub fn as_u64(&self) -> u64 {
        u64::from_be_bytes(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl AsRef<[u8]> for Fingerprint {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Fingerprint any serializable value.
///
/// # Errors
///
/// Returns [`FingerprintError::Serialization`] when the value cannot be
/// represented canonically (for example a map with non-string keys).
pub fn fingerprint<T: Serialize + ?Sized>(value: &T) -> Result<Fingerprint, FingerprintError> {
    let tree = serde_json::to_value(value).map_err(|e| FingerprintError::Serialization {
        reason: e.to_string(),
    })?;
    let bytes = serde_json::to_vec(&tree).map_err(|e| FingerprintError::Serialization {
        reason: e.to_string(),
    })?;
    Ok(fingerprint_bytes(&bytes))
}

/// Fingerprint raw bytes.
pub fn fingerprint_bytes(bytes: &[u8]) -> Fingerprint {
    let mut hasher = XxHash64::with_seed(SEED);
    hasher.write(bytes);
    Fingerprint::from_u64(hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde::Serialize;
    use std::collections::HashMap;

    #[derive(Serialize)]
    struct VideoConfig {
        url: String,
        language: String,
        with_timestamps: bool,
    }

    #[derive(Serialize)]
    struct VideoConfigReordered {
        with_timestamps: bool,
        language: String,
        url: String,
    }

    #[test]
    fn test_equal_values_have_equal_fingerprints() {
        let a = VideoConfig {
            url: "https://example.com/watch?v=1".to_string(),
            language: "en".to_string(),
            with_timestamps: true,
        };
        let b = VideoConfig {
            url: "https://example.com/watch?v=1".to_string(),
            language: "en".to_string(),
            with_timestamps: true,
        };
        assert_eq!(fingerprint(&a).unwrap(), fingerprint(&b).unwrap());
    }

    #[test]
    fn test_field_order_does_not_matter() {
        let a = VideoConfig {
            url: "u".to_string(),
            language: "de".to_string(),
            with_timestamps: false,
        };
        let b = VideoConfigReordered {
            with_timestamps: false,
            language: "de".to_string(),
            url: "u".to_string(),
        };
        assert_eq!(fingerprint(&a).unwrap(), fingerprint(&b).unwrap());
    }

    #[test]
    fn test_different_values_differ() {
        let a = fingerprint(&("thread", 1)).unwrap();
        let b = fingerprint(&("thread", 2)).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_non_string_map_keys_are_rejected() {
        let mut map = HashMap::new();
        map.insert((1, 2), "pair");
        let err = fingerprint(&map).unwrap_err();
        assert!(matches!(err, FingerprintError::Serialization { .. }));
    }

    #[test]
    fn test_hex_and_bytes_agree() {
        let fp = Fingerprint::from_u64(0x0102_0304_0506_0708);
        assert_eq!(fp.as_bytes(), &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(fp.to_hex(), "0102030405060708");
        assert_eq!(fp.to_string(), fp.to_hex());
        assert_eq!(fp.as_u64(), 0x0102_0304_0506_0708);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Property: fingerprinting is deterministic.
        #[test]
        fn prop_fingerprint_is_stable(entries in proptest::collection::hash_map(".*", any::<i64>(), 0..16)) {
            let first = fingerprint(&entries).unwrap();
            let rebuilt: HashMap<String, i64> = entries.clone().into_iter().collect();
            let second = fingerprint(&rebuilt).unwrap();
            prop_assert_eq!(first, second);
        }

        /// Property: raw byte fingerprints match repeated hashing.
        #[test]
        fn prop_fingerprint_bytes_is_stable(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
            prop_assert_eq!(fingerprint_bytes(&bytes), fingerprint_bytes(&bytes));
        }
    }
}
