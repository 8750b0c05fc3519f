//! Payload checksums for replay detection.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Computes a SHA-256 hex digest over a payload's canonical JSON bytes.
///
/// `serde_json` objects are backed by a sorted map, so two structurally
/// equal payloads always produce the same digest regardless of the key
/// order they arrived in.
pub fn payload_checksum(payload: &Value) -> String {
    let canonical = serde_json::to_vec(payload).unwrap_or_default();
    let digest = Sha256::digest(&canonical);
    hex_encode(&digest)
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_does_not_matter() {
        let a: Value = serde_json::from_str(r#"{"x":1,"y":2}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"y":2,"x":1}"#).unwrap();
        assert_eq!(payload_checksum(&a), payload_checksum(&b));
    }

    #[test]
    fn different_payloads_differ() {
        assert_ne!(
            payload_checksum(&json!({"x": 1})),
            payload_checksum(&json!({"x": 2}))
        );
    }

    #[test]
    fn digest_is_hex_sha256() {
        let digest = payload_checksum(&json!({}));
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
