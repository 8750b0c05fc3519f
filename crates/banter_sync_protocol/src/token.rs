//! Opaque sync tokens.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An opaque cursor a client presents to resume incremental sync.
///
/// The encoded form is base64 over the JSON body. Clients must treat it
/// as opaque; servers must treat a token that fails to decode as absent,
/// falling back to a full resync rather than erroring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncToken {
    /// Device the token was issued to.
    pub device_id: String,
    /// Issue time; the next round fetches changes after this instant.
    pub issued_at: DateTime<Utc>,
}

impl SyncToken {
    /// Issues a token for a device at the given instant.
    pub fn issue(device_id: impl Into<String>, issued_at: DateTime<Utc>) -> Self {
        Self {
            device_id: device_id.into(),
            issued_at,
        }
    }

    /// Encodes to the opaque wire form.
    pub fn encode(&self) -> String {
        let body = serde_json::to_vec(self).unwrap_or_default();
        STANDARD.encode(body)
    }

    /// Decodes a wire token.
    ///
    /// Returns `None` for any malformed input; decode failure is not an
    /// error condition.
    pub fn decode(raw: &str) -> Option<Self> {
        let bytes = STANDARD.decode(raw.trim()).ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let token = SyncToken::issue("d1", Utc::now());
        let decoded = SyncToken::decode(&token.encode()).unwrap();
        assert_eq!(decoded.device_id, "d1");
        assert_eq!(decoded.issued_at, token.issued_at);
    }

    #[test]
    fn garbage_decodes_to_none() {
        assert!(SyncToken::decode("not-base64!!!").is_none());
        assert!(SyncToken::decode("").is_none());
        // Valid base64, invalid body.
        let bogus = STANDARD.encode(b"hello");
        assert!(SyncToken::decode(&bogus).is_none());
    }

    #[test]
    fn encoded_form_is_opaque_base64() {
        let token = SyncToken::issue("d1", Utc::now());
        let encoded = token.encode();
        assert!(!encoded.contains("d1"));
        assert!(STANDARD.decode(&encoded).is_ok());
    }
}
