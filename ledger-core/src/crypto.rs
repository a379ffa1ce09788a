//! Content hashing for integrity stubs
//!
//! A private payload is committed to the public partition as the SHA-256 of
//! its canonical JSON form. Auditors holding the payload recompute the hash
//! and compare it with the stub.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Hash arbitrary bytes using SHA-256
pub fn hash_bytes(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Hex-encoded SHA-256 of the JSON form of `value`
///
/// Struct fields serialize in declaration order, so the same value always
/// produces the same digest.
pub fn content_hash<T: Serialize>(value: &T) -> crate::Result<String> {
    let bytes = serde_json::to_vec(value)?;
    Ok(hex::encode(hash_bytes(&bytes)))
}

/// Check a payload against a previously published hash
pub fn verify_content_hash<T: Serialize>(value: &T, expected: &str) -> crate::Result<bool> {
    Ok(content_hash(value)?.eq_ignore_ascii_case(expected))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Sample<'a> {
        id: &'a str,
        amount: &'a str,
    }

    #[test]
    fn test_hash_bytes_known_vector() {
        // SHA-256("abc")
        assert_eq!(
            hex::encode(hash_bytes(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_content_hash_deterministic() {
        let a = content_hash(&Sample { id: "pay1", amount: "1000" }).unwrap();
        let b = content_hash(&Sample { id: "pay1", amount: "1000" }).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_tampered_payload_fails_verification() {
        let published = content_hash(&Sample { id: "pay1", amount: "1000" }).unwrap();
        assert!(verify_content_hash(&Sample { id: "pay1", amount: "1000" }, &published).unwrap());
        assert!(!verify_content_hash(&Sample { id: "pay1", amount: "9000" }, &published).unwrap());
    }
}
