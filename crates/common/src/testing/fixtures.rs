//! Test fixture generators
//!
//! Identity tokens are signed with HS256 over [`TEST_HMAC_SECRET`] so that
//! tests can mint valid, expired or tampered tokens without key material
//! on disk.

#![allow(clippy::expect_used)]

use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Map, Value};

use crate::auth::TokenResponse;

/// Shared secret used by every fixture token
///
/// Its standard and URL-safe base64 encodings coincide, which keeps JWK
/// `oct` fixtures unambiguous.
pub const TEST_HMAC_SECRET: &[u8] = b"connectid-shared-secret!";

/// Standard identity claims issued now and expiring after `ttl_secs`
///
/// # Examples
///
/// ```
/// use connectid_common::testing::fixtures::claims;
///
/// let payload = claims("https://issuer", "client", "user-1", 60);
/// assert_eq!(payload["sub"], "user-1");
/// ```
#[must_use]
pub fn claims(issuer: &str, audience: &str, subject: &str, ttl_secs: i64) -> Map<String, Value> {
    let now = Utc::now().timestamp();
    let mut claims = Map::new();
    claims.insert("sub".into(), json!(subject));
    claims.insert("iss".into(), json!(issuer));
    claims.insert("aud".into(), json!(audience));
    claims.insert("iat".into(), json!(now));
    claims.insert("exp".into(), json!(now + ttl_secs));
    claims
}

/// Sign `claims` as a compact HS256 JWT
///
/// # Panics
/// Panics if the claims cannot be encoded.
#[must_use]
pub fn sign_hs256(claims: &Map<String, Value>, secret: &[u8]) -> String {
    encode(&Header::new(Algorithm::HS256), claims, &EncodingKey::from_secret(secret))
        .expect("fixture claims encode")
}

/// Token response with every optional field populated
#[must_use]
pub fn token_response(access_token: &str, refresh_token: &str, id_token: &str) -> TokenResponse {
    TokenResponse {
        access_token: access_token.to_string(),
        refresh_token: Some(refresh_token.to_string()),
        id_token: Some(id_token.to_string()),
        token_type: Some("Bearer".to_string()),
        expires_in: Some(3600),
        scope: Some("openid profile".to_string()),
    }
}
