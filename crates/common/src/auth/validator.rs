//! Identity token validation
//!
//! Validation runs five steps in a fixed order and each step has its own
//! failure reason:
//!
//! 1. Parse the JWT structure and required claims (`MalformedToken`)
//! 2. Verify the signature against the provider keys (`Signature`)
//! 3. Exact issuer match (`IssuerMismatch`)
//! 4. Non-empty audience intersection (`AudienceMismatch`)
//! 5. Expiry against the supplied instant (`ExpiredToken`)
//!
//! Validation itself is pure; the caller provides `now`.

use std::collections::HashSet;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use connectid_domain::{IdentityClaims, ValidationError};
use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, JwkSet};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Header, Validation};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::debug;

type ValidationResult<T> = std::result::Result<T, ValidationError>;

/// Claims every identity token must carry
const REQUIRED_CLAIMS: [&str; 5] = ["sub", "iss", "aud", "iat", "exp"];

/// Keys an identity token may be signed with
///
/// Key selection order: the JWK whose `kid` matches the token header, then
/// the only JWK of the header algorithm's family, then the shared HMAC
/// secret for `HS*` tokens.
#[derive(Clone)]
pub struct VerificationKeys {
    hmac_secret: Option<Vec<u8>>,
    jwks: JwkSet,
}

impl std::fmt::Debug for VerificationKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationKeys")
            .field("hmac_secret", &self.hmac_secret.as_ref().map(|_| "<redacted>"))
            .field("jwks", &self.jwks.keys.len())
            .finish()
    }
}

impl Default for VerificationKeys {
    fn default() -> Self {
        Self { hmac_secret: None, jwks: JwkSet { keys: Vec::new() } }
    }
}

impl VerificationKeys {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared secret for `HS256`/`HS384`/`HS512` identity tokens
    #[must_use]
    pub fn with_hmac_secret(mut self, secret: impl AsRef<[u8]>) -> Self {
        self.hmac_secret = Some(secret.as_ref().to_vec());
        self
    }

    #[must_use]
    pub fn with_jwks(mut self, jwks: JwkSet) -> Self {
        self.jwks = jwks;
        self
    }

    #[must_use]
    pub fn jwks(&self) -> &JwkSet {
        &self.jwks
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hmac_secret.is_none() && self.jwks.keys.is_empty()
    }

    fn select(&self, header: &Header) -> ValidationResult<DecodingKey> {
        if let Some(jwk) = header.kid.as_deref().and_then(|kid| self.jwks.find(kid)) {
            return decoding_key_from_jwk(jwk);
        }

        let mut compatible = self.jwks.keys.iter().filter(|jwk| family_matches(jwk, header.alg));
        if let (Some(jwk), None) = (compatible.next(), compatible.next()) {
            return decoding_key_from_jwk(jwk);
        }

        match (&self.hmac_secret, header.alg) {
            (Some(secret), Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) => {
                Ok(DecodingKey::from_secret(secret))
            }
            _ => Err(ValidationError::Signature(format!(
                "no verification key for alg {:?} kid {:?}",
                header.alg, header.kid
            ))),
        }
    }
}

fn decoding_key_from_jwk(jwk: &Jwk) -> ValidationResult<DecodingKey> {
    DecodingKey::from_jwk(jwk)
        .map_err(|e| ValidationError::Signature(format!("unusable signing key: {e}")))
}

fn family_matches(jwk: &Jwk, alg: Algorithm) -> bool {
    match &jwk.algorithm {
        AlgorithmParameters::RSA(_) => matches!(
            alg,
            Algorithm::RS256
                | Algorithm::RS384
                | Algorithm::RS512
                | Algorithm::PS256
                | Algorithm::PS384
                | Algorithm::PS512
        ),
        AlgorithmParameters::EllipticCurve(_) => {
            matches!(alg, Algorithm::ES256 | Algorithm::ES384)
        }
        AlgorithmParameters::OctetKey(_) => {
            matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512)
        }
        AlgorithmParameters::OctetKeyPair(_) => matches!(alg, Algorithm::EdDSA),
    }
}

/// Validate an identity token and extract its claims
///
/// # Arguments
/// * `token` - Compact-serialized JWT
/// * `keys` - Provider verification keys
/// * `expected_issuer` - Issuer the `iss` claim must equal exactly
/// * `expected_audiences` - At least one must appear in `aud`
/// * `now` - Validation instant; the token is expired when `now >= exp`
///
/// # Errors
/// Returns the [`ValidationError`] of the first failing step.
pub fn validate(
    token: &str,
    keys: &VerificationKeys,
    expected_issuer: &str,
    expected_audiences: &[String],
    now: DateTime<Utc>,
) -> ValidationResult<IdentityClaims> {
    // 1. structure
    let header = decode_header(token)
        .map_err(|e| ValidationError::MalformedToken(format!("invalid header: {e}")))?;
    let payload = decode_payload(token)?;
    let parsed = ParsedClaims::from_payload(payload)?;

    // 2. signature
    let key = keys.select(&header)?;
    let mut validation = Validation::new(header.alg);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();
    decode::<Map<String, Value>>(token, &key, &validation)
        .map_err(|e| ValidationError::Signature(e.to_string()))?;

    // 3. issuer
    if parsed.issuer != expected_issuer {
        return Err(ValidationError::IssuerMismatch {
            expected: expected_issuer.to_string(),
            actual: parsed.issuer,
        });
    }

    // 4. audience
    if !parsed.audience.iter().any(|aud| expected_audiences.contains(aud)) {
        return Err(ValidationError::AudienceMismatch {
            expected: expected_audiences.to_vec(),
            actual: parsed.audience,
        });
    }

    // 5. expiry
    if now.timestamp() >= parsed.expires_at {
        return Err(ValidationError::ExpiredToken {
            expired_at: parsed.expires_at,
            now: now.timestamp(),
        });
    }

    debug!(alg = ?header.alg, kid = ?header.kid, "Identity token validated");
    parsed.into_identity_claims()
}

fn decode_payload(token: &str) -> ValidationResult<Map<String, Value>> {
    let mut segments = token.split('.');
    let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
        (Some(_), Some(payload), Some(_), None) => payload,
        _ => return Err(ValidationError::MalformedToken("expected three segments".into())),
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| ValidationError::MalformedToken(format!("invalid payload encoding: {e}")))?;

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ValidationError::MalformedToken("payload is not a JSON object".into())),
        Err(e) => Err(ValidationError::MalformedToken(format!("invalid payload JSON: {e}"))),
    }
}

/// Required claims pulled out of the payload before any check runs
struct ParsedClaims {
    subject: String,
    issuer: String,
    audience: Vec<String>,
    issued_at: i64,
    expires_at: i64,
    additional: Map<String, Value>,
}

impl ParsedClaims {
    fn from_payload(mut payload: Map<String, Value>) -> ValidationResult<Self> {
        if let Some(missing) = REQUIRED_CLAIMS.iter().find(|claim| !payload.contains_key(**claim))
        {
            return Err(ValidationError::MalformedToken(format!("missing claim `{missing}`")));
        }

        let subject = take_string(&mut payload, "sub")?;
        let issuer = take_string(&mut payload, "iss")?;
        let audience = match payload.remove("aud") {
            Some(Value::String(aud)) => vec![aud],
            Some(Value::Array(values)) => values
                .into_iter()
                .map(|v| match v {
                    Value::String(aud) => Ok(aud),
                    _ => Err(ValidationError::MalformedToken("non-string audience".into())),
                })
                .collect::<ValidationResult<Vec<_>>>()?,
            _ => return Err(ValidationError::MalformedToken("invalid claim `aud`".into())),
        };
        let issued_at = take_timestamp(&mut payload, "iat")?;
        let expires_at = take_timestamp(&mut payload, "exp")?;

        Ok(Self { subject, issuer, audience, issued_at, expires_at, additional: payload })
    }

    fn into_identity_claims(self) -> ValidationResult<IdentityClaims> {
        Ok(IdentityClaims {
            subject: self.subject,
            issuer: self.issuer,
            audience: self.audience,
            issued_at: to_datetime(self.issued_at, "iat")?,
            expires_at: to_datetime(self.expires_at, "exp")?,
            additional: self.additional,
        })
    }
}

fn take_string(payload: &mut Map<String, Value>, claim: &str) -> ValidationResult<String> {
    match payload.remove(claim) {
        Some(Value::String(value)) => Ok(value),
        _ => Err(ValidationError::MalformedToken(format!("invalid claim `{claim}`"))),
    }
}

fn take_timestamp(payload: &mut Map<String, Value>, claim: &str) -> ValidationResult<i64> {
    let value = payload.remove(claim);
    value
        .as_ref()
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
        .ok_or_else(|| ValidationError::MalformedToken(format!("invalid claim `{claim}`")))
}

fn to_datetime(timestamp: i64, claim: &str) -> ValidationResult<DateTime<Utc>> {
    DateTime::from_timestamp(timestamp, 0)
        .ok_or_else(|| ValidationError::MalformedToken(format!("claim `{claim}` out of range")))
}

/// Thread-safe holder of the current verification keys
///
/// The JWK set can be swapped after a key rotation while validations run
/// concurrently.
#[derive(Debug, Default)]
pub struct TokenValidator {
    keys: RwLock<VerificationKeys>,
}

impl TokenValidator {
    #[must_use]
    pub fn new(keys: VerificationKeys) -> Self {
        Self { keys: RwLock::new(keys) }
    }

    /// Validate with the current keys
    ///
    /// # Errors
    /// See [`validate`].
    pub fn validate(
        &self,
        token: &str,
        expected_issuer: &str,
        expected_audiences: &[String],
        now: DateTime<Utc>,
    ) -> ValidationResult<IdentityClaims> {
        let keys = self.keys.read();
        validate(token, &keys, expected_issuer, expected_audiences, now)
    }

    /// Replace the JWK set, keeping the shared secret
    pub fn replace_jwks(&self, jwks: JwkSet) {
        self.keys.write().jwks = jwks;
    }

    #[must_use]
    pub fn snapshot(&self) -> VerificationKeys {
        self.keys.read().clone()
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for auth::validator.
    use chrono::Duration;
    use serde_json::json;

    use super::*;
    use crate::testing::fixtures::{claims, sign_hs256, TEST_HMAC_SECRET};

    const ISSUER: &str = "https://connect.telenordigital.com/oauth";

    fn keys() -> VerificationKeys {
        VerificationKeys::new().with_hmac_secret(TEST_HMAC_SECRET)
    }

    fn audiences() -> Vec<String> {
        vec!["abc".to_string()]
    }

    fn valid_token() -> String {
        sign_hs256(&claims(ISSUER, "abc", "user-1", 3600), TEST_HMAC_SECRET)
    }

    /// Validates `validate` behavior for the round-trip scenario.
    ///
    /// Assertions:
    /// - Confirms the subject equals the token's `sub` claim.
    /// - Confirms unknown claims land in `additional`.
    #[test]
    fn test_valid_token_yields_claims() {
        let mut payload = claims(ISSUER, "abc", "user-1", 3600);
        payload.insert("phone_number".into(), json!("+4790000000"));
        let token = sign_hs256(&payload, TEST_HMAC_SECRET);

        let claims = validate(&token, &keys(), ISSUER, &audiences(), Utc::now()).unwrap();

        assert_eq!(claims.subject, "user-1");
        assert_eq!(claims.audience, vec!["abc".to_string()]);
        assert_eq!(claims.string_claim("phone_number"), Some("+4790000000"));
        assert!(claims.claim("sub").is_none());
    }

    #[test]
    fn test_flipped_signature_is_signature_error() {
        let token = sign_hs256(&claims(ISSUER, "abc", "user-1", 3600), b"some-other-secret");

        let err = validate(&token, &keys(), ISSUER, &audiences(), Utc::now()).unwrap_err();

        assert!(matches!(err, ValidationError::Signature(_)));
    }

    #[test]
    fn test_flipped_issuer_is_issuer_mismatch() {
        let token =
            sign_hs256(&claims("https://evil.example", "abc", "user-1", 3600), TEST_HMAC_SECRET);

        let err = validate(&token, &keys(), ISSUER, &audiences(), Utc::now()).unwrap_err();

        assert_eq!(err, ValidationError::IssuerMismatch {
            expected: ISSUER.to_string(),
            actual: "https://evil.example".to_string()
        });
    }

    #[test]
    fn test_flipped_audience_is_audience_mismatch() {
        let token = sign_hs256(&claims(ISSUER, "someone-else", "user-1", 3600), TEST_HMAC_SECRET);

        let err = validate(&token, &keys(), ISSUER, &audiences(), Utc::now()).unwrap_err();

        assert!(matches!(err, ValidationError::AudienceMismatch { .. }));
    }

    #[test]
    fn test_audience_list_needs_one_match() {
        let mut payload = claims(ISSUER, "abc", "user-1", 3600);
        payload.insert("aud".into(), json!(["other", "abc"]));
        let token = sign_hs256(&payload, TEST_HMAC_SECRET);

        let claims = validate(&token, &keys(), ISSUER, &audiences(), Utc::now()).unwrap();

        assert_eq!(claims.audience.len(), 2);
    }

    /// Validates `validate` behavior for the expiry boundary scenario.
    ///
    /// Assertions:
    /// - Confirms a token is rejected at exactly `exp`.
    /// - Confirms it is accepted one second earlier.
    #[test]
    fn test_expiry_boundary() {
        let token = valid_token();
        let exp = claims_exp(&token);

        let at_exp = DateTime::from_timestamp(exp, 0).unwrap();
        let err = validate(&token, &keys(), ISSUER, &audiences(), at_exp).unwrap_err();
        assert_eq!(err, ValidationError::ExpiredToken { expired_at: exp, now: exp });

        let before = at_exp - Duration::seconds(1);
        assert!(validate(&token, &keys(), ISSUER, &audiences(), before).is_ok());
    }

    #[test]
    fn test_missing_claim_is_malformed() {
        let mut payload = claims(ISSUER, "abc", "user-1", 3600);
        payload.remove("iat");
        let token = sign_hs256(&payload, TEST_HMAC_SECRET);

        let err = validate(&token, &keys(), ISSUER, &audiences(), Utc::now()).unwrap_err();

        assert!(matches!(err, ValidationError::MalformedToken(ref m) if m.contains("iat")));
    }

    #[test]
    fn test_garbage_is_malformed() {
        for token in ["", "not-a-jwt", "a.b", "a.b.c.d"] {
            let err = validate(token, &keys(), ISSUER, &audiences(), Utc::now()).unwrap_err();
            assert!(matches!(err, ValidationError::MalformedToken(_)), "token {token:?}");
        }
    }

    #[test]
    fn test_no_keys_is_signature_error() {
        let err = validate(&valid_token(), &VerificationKeys::new(), ISSUER, &audiences(), Utc::now())
            .unwrap_err();

        assert!(matches!(err, ValidationError::Signature(_)));
    }

    #[test]
    fn test_jwks_octet_key_is_selected() {
        let jwks: JwkSet = serde_json::from_value(json!({
            "keys": [{
                "kty": "oct",
                "kid": "k1",
                "alg": "HS256",
                "k": "Y29ubmVjdGlkLXNoYXJlZC1zZWNyZXQh"
            }]
        }))
        .unwrap();
        let keys = VerificationKeys::new().with_jwks(jwks);

        let claims = validate(&valid_token(), &keys, ISSUER, &audiences(), Utc::now()).unwrap();

        assert_eq!(claims.subject, "user-1");
    }

    #[test]
    fn test_validator_swaps_jwks() {
        let validator = TokenValidator::new(VerificationKeys::new());
        assert!(validator.validate(&valid_token(), ISSUER, &audiences(), Utc::now()).is_err());

        let jwks: JwkSet = serde_json::from_value(json!({
            "keys": [{ "kty": "oct", "k": "Y29ubmVjdGlkLXNoYXJlZC1zZWNyZXQh" }]
        }))
        .unwrap();
        validator.replace_jwks(jwks);

        assert!(validator.validate(&valid_token(), ISSUER, &audiences(), Utc::now()).is_ok());
    }

    fn claims_exp(token: &str) -> i64 {
        decode_payload(token).unwrap().get("exp").and_then(Value::as_i64).unwrap()
    }
}
