//! Unverified JWT payload decoding for status display.
//!
//! The server verifies every token it receives; the client only peeks at the
//! payload to show who is logged in and when the access token expires.

use base64::Engine;
use serde::Deserialize;

/// Subset of SimpleJWT access-token claims the client cares about.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AccessClaims {
    /// Expiry as a unix timestamp (seconds).
    pub exp: Option<u64>,
    /// Backend user primary key.
    pub user_id: Option<serde_json::Value>,
    /// `access` or `refresh`.
    pub token_type: Option<String>,
}

impl AccessClaims {
    /// Whether the token is past its `exp` at `now` (unix seconds).
    /// Tokens without `exp` never report as expired.
    pub fn is_expired_at(&self, now: u64) -> bool {
        self.exp.is_some_and(|exp| exp <= now)
    }
}

/// Decode the payload segment of a JWT without verifying its signature.
pub fn decode_claims(token: &str) -> Result<AccessClaims, String> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err("Invalid JWT format".to_string());
    }

    // base64url, padding optional
    let payload = parts[1].trim_end_matches('=');
    let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| format!("Failed to decode JWT payload: {}", e))?;

    serde_json::from_slice(&decoded).map_err(|e| format!("Failed to parse JWT payload: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_jwt(payload: &[u8]) -> String {
        let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
        let header = engine.encode(b"{\"alg\":\"HS256\",\"typ\":\"JWT\"}");
        format!("{}.{}.fake-signature", header, engine.encode(payload))
    }

    #[test]
    fn test_decode_claims() {
        let token = make_jwt(b"{\"token_type\":\"access\",\"exp\":1700000300,\"user_id\":42}");
        let claims = decode_claims(&token).unwrap();
        assert_eq!(claims.exp, Some(1700000300));
        assert_eq!(claims.user_id, Some(serde_json::json!(42)));
        assert_eq!(claims.token_type.as_deref(), Some("access"));

        assert!(!claims.is_expired_at(1700000000));
        assert!(claims.is_expired_at(1700000300));
    }

    #[test]
    fn test_decode_claims_invalid_jwt() {
        assert!(decode_claims("not-a-jwt").is_err());
        assert!(decode_claims("a.%%%.c").is_err());
    }

    #[test]
    fn test_missing_exp_never_expires() {
        let token = make_jwt(b"{\"user_id\":\"abc\"}");
        let claims = decode_claims(&token).unwrap();
        assert_eq!(claims.exp, None);
        assert!(!claims.is_expired_at(u64::MAX));
    }
}
