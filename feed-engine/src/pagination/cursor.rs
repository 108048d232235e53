//! Opaque pagination cursors
//!
//! A cursor is URL-safe base64 over a small JSON object. Chronological feeds
//! only need the (timestamp, id) boundary; ranked feeds additionally carry
//! the session id that references the server-side seen-set. Tokens round-trip
//! through URL query parameters unchanged.
//!
//! Decoding is total: anything malformed yields `None`, which callers treat
//! as "start from the first page".

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedCursor {
    /// Last post id shown on the previous page
    pub last_seen_id: Uuid,
    /// Session backing the seen-set, for ranked feeds
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub session_id: Option<Uuid>,
    /// Creation timestamp of the last shown post (chronological boundary)
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ts: Option<i64>,
}

impl FeedCursor {
    pub fn chronological(last_seen_id: Uuid, ts: i64) -> Self {
        Self {
            last_seen_id,
            session_id: None,
            ts: Some(ts),
        }
    }

    pub fn ranked(last_seen_id: Uuid, session_id: Uuid, ts: i64) -> Self {
        Self {
            last_seen_id,
            session_id: Some(session_id),
            ts: Some(ts),
        }
    }
}

/// Encode a cursor as an opaque URL-safe token
pub fn encode_cursor(cursor: &FeedCursor) -> String {
    match serde_json::to_vec(cursor) {
        Ok(json) => URL_SAFE_NO_PAD.encode(json),
        // Unreachable for this struct shape; an empty token decodes to None
        Err(e) => {
            debug!(error = %e, "Cursor serialization failed");
            String::new()
        }
    }
}

/// Decode a cursor token. Malformed input is "no cursor", never an error.
pub fn decode_cursor(token: &str) -> Option<FeedCursor> {
    if token.is_empty() {
        return None;
    }
    let bytes = match URL_SAFE_NO_PAD.decode(token) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(error = %e, "Cursor token is not valid base64, starting from first page");
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(cursor) => Some(cursor),
        Err(e) => {
            debug!(error = %e, "Cursor payload undecodable, starting from first page");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_chronological() {
        let cursor = FeedCursor::chronological(Uuid::new_v4(), 1_754_000_000);
        let token = encode_cursor(&cursor);
        assert_eq!(decode_cursor(&token), Some(cursor));
    }

    #[test]
    fn test_roundtrip_ranked() {
        let cursor = FeedCursor::ranked(Uuid::new_v4(), Uuid::new_v4(), 1_754_000_000);
        let token = encode_cursor(&cursor);
        assert_eq!(decode_cursor(&token), Some(cursor));
    }

    #[test]
    fn test_token_is_url_safe() {
        let cursor = FeedCursor::ranked(Uuid::new_v4(), Uuid::new_v4(), i64::MAX);
        let token = encode_cursor(&cursor);
        assert!(!token.contains('+') && !token.contains('/') && !token.contains('='));
    }

    #[test]
    fn test_garbage_decodes_to_none() {
        assert_eq!(decode_cursor("garbage"), None);
        assert_eq!(decode_cursor(""), None);
        assert_eq!(decode_cursor("!!!not-base64!!!"), None);
        // Valid base64 of invalid JSON
        let token = URL_SAFE_NO_PAD.encode(b"not json at all");
        assert_eq!(decode_cursor(&token), None);
        // Valid JSON with a malformed id
        let token = URL_SAFE_NO_PAD.encode(br#"{"last_seen_id":"not-a-uuid"}"#);
        assert_eq!(decode_cursor(&token), None);
    }
}
