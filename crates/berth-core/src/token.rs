// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session token codec.
//!
//! A token is base64 of a JSON payload `{session_id, device_id, issued_at,
//! expires_at}` with epoch-millisecond times. It is an unsigned capability
//! reference, not a cryptographic credential. Tokens are never mutated in
//! place; refresh mints a new one.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Token lifetime. `expires_at = issued_at + 24h` at issuance.
pub const TOKEN_TTL_HOURS: i64 = 24;

/// Decoded token contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPayload {
    pub session_id: String,
    pub device_id: String,
    #[serde(default)]
    pub issued_at: i64,
    pub expires_at: i64,
}

/// Encode a fresh token for the given session/device pair.
pub fn encode(session_id: &str, device_id: &str) -> String {
    let issued_at = Utc::now().timestamp_millis();
    let payload = serde_json::json!({
        "session_id": session_id,
        "device_id": device_id,
        "issued_at": issued_at,
        "expires_at": issued_at + TOKEN_TTL_HOURS * 3_600_000,
    });
    BASE64.encode(payload.to_string())
}

/// Decode a token. `None` on any malformed input: bad base64, bad JSON, or
/// missing/empty `session_id`/`device_id`/`expires_at`. Malformed tokens are
/// a data condition, never an error.
pub fn decode(token: &str) -> Option<TokenPayload> {
    let bytes = BASE64.decode(token).ok()?;
    let json = String::from_utf8(bytes).ok()?;
    let payload: TokenPayload = serde_json::from_str(&json).ok()?;
    if payload.session_id.is_empty() || payload.device_id.is_empty() || payload.expires_at == 0 {
        return None;
    }
    Some(payload)
}

/// True iff the payload has expired (`now >= expires_at`).
pub fn is_expired(payload: &TokenPayload) -> bool {
    Utc::now().timestamp_millis() >= payload.expires_at
}

/// Decode-then-check. Undecodable tokens count as expired (fail-closed).
pub fn is_token_expired(token: &str) -> bool {
    match decode(token) {
        Some(payload) => is_expired(&payload),
        None => true,
    }
}

/// `now + 24h`, for populating persisted expiry columns independently of
/// token creation.
pub fn expiry_from_now() -> DateTime<Utc> {
    Utc::now() + Duration::hours(TOKEN_TTL_HOURS)
}

/// [`expiry_from_now`] in the persisted-timestamp text format.
pub fn expiry_timestamp() -> String {
    expiry_from_now()
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_identity_and_ttl() {
        let before = Utc::now().timestamp_millis();
        let token = encode("sess-1", "dev-1");
        let after = Utc::now().timestamp_millis();

        let payload = decode(&token).unwrap();
        assert_eq!(payload.session_id, "sess-1");
        assert_eq!(payload.device_id, "dev-1");
        assert!(payload.issued_at >= before && payload.issued_at <= after + 1_000);
        assert_eq!(
            payload.expires_at,
            payload.issued_at + TOKEN_TTL_HOURS * 3_600_000
        );
    }

    #[test]
    fn decode_rejects_garbage() {
        assert_eq!(decode("not base64!!"), None);
        assert_eq!(decode(&BASE64.encode("not json")), None);
        assert_eq!(decode(&BASE64.encode("{\"session_id\":\"s\"}")), None);
    }

    #[test]
    fn decode_rejects_empty_required_fields() {
        let missing_device = serde_json::json!({
            "session_id": "s",
            "device_id": "",
            "issued_at": 1,
            "expires_at": 2,
        });
        assert_eq!(decode(&BASE64.encode(missing_device.to_string())), None);

        let zero_expiry = serde_json::json!({
            "session_id": "s",
            "device_id": "d",
            "issued_at": 1,
            "expires_at": 0,
        });
        assert_eq!(decode(&BASE64.encode(zero_expiry.to_string())), None);
    }

    #[test]
    fn decode_tolerates_missing_issued_at() {
        let payload = serde_json::json!({
            "session_id": "s",
            "device_id": "d",
            "expires_at": Utc::now().timestamp_millis() + 60_000,
        });
        let decoded = decode(&BASE64.encode(payload.to_string())).unwrap();
        assert_eq!(decoded.issued_at, 0);
        assert!(!is_expired(&decoded));
    }

    #[test]
    fn fresh_token_is_not_expired() {
        let token = encode("sess-1", "dev-1");
        assert!(!is_token_expired(&token));
    }

    #[test]
    fn past_expiry_is_expired_and_stays_expired() {
        let past = TokenPayload {
            session_id: "s".into(),
            device_id: "d".into(),
            issued_at: 1,
            expires_at: Utc::now().timestamp_millis() - 1,
        };
        assert!(is_expired(&past));
        // Monotonic: expiry never reverses as time advances.
        assert!(is_expired(&past));
    }

    #[test]
    fn undecodable_token_fails_closed() {
        assert!(is_token_expired("@@@"));
        assert!(is_token_expired(""));
    }

    #[test]
    fn expiry_timestamp_is_a_day_out() {
        let expiry = expiry_from_now();
        let delta = expiry - Utc::now();
        assert!(delta > Duration::hours(23) && delta <= Duration::hours(24));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn round_trip_any_ids(
                session in "[a-zA-Z0-9_-]{1,64}",
                device in "[a-zA-Z0-9_-]{1,64}",
            ) {
                let payload = decode(&encode(&session, &device)).unwrap();
                prop_assert_eq!(payload.session_id, session);
                prop_assert_eq!(payload.device_id, device);
                prop_assert_eq!(
                    payload.expires_at - payload.issued_at,
                    TOKEN_TTL_HOURS * 3_600_000
                );
            }

            #[test]
            fn decode_never_panics(raw in ".{0,128}") {
                let _ = decode(&raw);
                let _ = is_token_expired(&raw);
            }
        }
    }
}
