//! Best-effort access token decoding.
//!
//! The client only peeks at the token payload for hints (expiry, subject,
//! username); it never verifies the signature — the server remains the
//! authority. Decoding is fail-closed: anything malformed is treated as
//! "no claims", and `is_expired` reports true for tokens it cannot read.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use serde::Deserialize;

/// Claims decoded from the payload segment of an access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    pub subject: String,
    pub username: Option<String>,
    pub expires_at: i64,
}

#[derive(Deserialize)]
struct RawClaims {
    sub: String,
    #[serde(default)]
    username: Option<String>,
    exp: i64,
}

/// Decode the claims of a three-segment token. Returns `None` for anything
/// that is not shaped like a token; never panics and never errors.
pub fn decode(token: &str) -> Option<TokenClaims> {
    let mut segments = token.split('.');
    let (_header, payload, _sig) = (segments.next()?, segments.next()?, segments.next()?);
    if segments.next().is_some() {
        return None;
    }

    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let raw: RawClaims = serde_json::from_slice(&bytes).ok()?;
    Some(TokenClaims {
        subject: raw.sub,
        username: raw.username,
        expires_at: raw.exp,
    })
}

/// Whether the token is expired (or will be within `skew_secs`).
/// Undecodable tokens count as expired.
pub fn is_expired(token: &str, skew_secs: i64) -> bool {
    match decode(token) {
        Some(claims) => claims.expires_at - skew_secs <= Utc::now().timestamp(),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a structurally valid token with the given payload claims.
    fn make_token(sub: &str, username: Option<&str>, exp: i64) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let mut claims = serde_json::json!({ "sub": sub, "exp": exp });
        if let Some(name) = username {
            claims["username"] = serde_json::Value::String(name.to_string());
        }
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap());
        let sig = URL_SAFE_NO_PAD.encode(b"sig");
        format!("{}.{}.{}", header, payload, sig)
    }

    #[test]
    fn test_decode_valid_token() {
        let token = make_token("42", Some("alice"), 1_900_000_000);
        let claims = decode(&token).unwrap();
        assert_eq!(claims.subject, "42");
        assert_eq!(claims.username.as_deref(), Some("alice"));
        assert_eq!(claims.expires_at, 1_900_000_000);
    }

    #[test]
    fn test_decode_missing_username() {
        let token = make_token("42", None, 1_900_000_000);
        let claims = decode(&token).unwrap();
        assert_eq!(claims.username, None);
    }

    #[test]
    fn test_decode_rejects_wrong_segment_count() {
        assert_eq!(decode("not-a-jwt"), None);
        assert_eq!(decode("a.b"), None);
        assert_eq!(decode("a.b.c.d"), None);
        assert_eq!(decode(""), None);
    }

    #[test]
    fn test_decode_rejects_bad_payload() {
        // invalid base64
        assert_eq!(decode("aaa.!!!.ccc"), None);
        // valid base64, not JSON
        let payload = URL_SAFE_NO_PAD.encode(b"hello");
        assert_eq!(decode(&format!("a.{}.c", payload)), None);
        // JSON missing required fields
        let payload = URL_SAFE_NO_PAD.encode(br#"{"foo":1}"#);
        assert_eq!(decode(&format!("a.{}.c", payload)), None);
    }

    #[test]
    fn test_is_expired_fail_closed() {
        assert!(is_expired("not-a-jwt", 0));
        assert!(is_expired("a.b", 0));
        assert!(is_expired("", 0));
    }

    #[test]
    fn test_is_expired_boundaries() {
        let now = Utc::now().timestamp();
        assert!(is_expired(&make_token("1", None, now - 10), 0));
        assert!(!is_expired(&make_token("1", None, now + 3600), 0));
        // within the skew window counts as expired
        assert!(is_expired(&make_token("1", None, now + 100), 300));
    }
}
