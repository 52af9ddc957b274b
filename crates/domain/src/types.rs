//! Data types shared by the authorization engine
//!
//! Token sets, identity claims, sessions, authorization requests and the
//! provider metadata obtained from discovery.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_TOKEN_TYPE, PARAM_SCOPE};
use crate::impl_str_enum_conversions;

/// Access, refresh and identity tokens issued together with an expiry
///
/// Expiry is always derived as `issued_at + expires_in`; it is never stored
/// independently so the two cannot drift apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    /// Bearer token presented to resource servers
    pub access_token: String,

    /// Refresh token; without it the set cannot be silently renewed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Signed identity token (JWT)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    /// Token type (always "Bearer" for this provider)
    pub token_type: String,

    /// Granted scopes
    #[serde(default)]
    pub scope: Vec<String>,

    /// Access token lifetime in seconds
    pub expires_in: i64,

    /// When the set was issued
    pub issued_at: DateTime<Utc>,
}

impl TokenSet {
    /// Create a token set issued now
    #[must_use]
    pub fn new(
        access_token: String,
        refresh_token: Option<String>,
        id_token: Option<String>,
        expires_in: i64,
        scope: Vec<String>,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            id_token,
            token_type: DEFAULT_TOKEN_TYPE.to_string(),
            scope,
            expires_in,
            issued_at: Utc::now(),
        }
    }

    /// Override the issuance instant
    #[must_use]
    pub fn issued_at(mut self, issued_at: DateTime<Utc>) -> Self {
        self.issued_at = issued_at;
        self
    }

    /// Absolute expiry of the access token
    ///
    /// Saturates at the representable range instead of overflowing.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        saturating_add_secs(self.issued_at, self.expires_in)
    }

    /// Check if the access token is expired or expires within
    /// `threshold_seconds` from now
    #[must_use]
    pub fn is_expired(&self, threshold_seconds: i64) -> bool {
        self.is_expired_at(Utc::now(), threshold_seconds)
    }

    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>, threshold_seconds: i64) -> bool {
        saturating_add_secs(now, threshold_seconds) >= self.expires_at()
    }

    /// Seconds until the access token expires (negative once expired)
    #[must_use]
    pub fn seconds_until_expiry(&self) -> i64 {
        self.expires_at().signed_duration_since(Utc::now()).num_seconds()
    }

    #[must_use]
    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Granted scopes as a space-separated string
    #[must_use]
    pub fn scope_string(&self) -> String {
        self.scope.join(" ")
    }

    /// Split a space-separated scope string
    #[must_use]
    pub fn parse_scope(scope: &str) -> Vec<String> {
        scope.split_whitespace().map(ToOwned::to_owned).collect()
    }
}

fn saturating_add_secs(at: DateTime<Utc>, secs: i64) -> DateTime<Utc> {
    Duration::try_seconds(secs).and_then(|delta| at.checked_add_signed(delta)).unwrap_or(
        if secs < 0 { DateTime::<Utc>::MIN_UTC } else { DateTime::<Utc>::MAX_UTC },
    )
}

/// Claims extracted from a validated identity token
///
/// Only ever derived from the `id_token` of the [`TokenSet`] it travels with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityClaims {
    pub subject: String,
    pub issuer: String,
    pub audience: Vec<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,

    /// Every claim other than `sub`, `iss`, `aud`, `iat` and `exp`
    #[serde(default)]
    pub additional: serde_json::Map<String, serde_json::Value>,
}

impl IdentityClaims {
    /// Look up an additional claim by name
    #[must_use]
    pub fn claim(&self, name: &str) -> Option<&serde_json::Value> {
        self.additional.get(name)
    }

    /// Convenience accessor for string claims such as `email` or `phone_number`
    #[must_use]
    pub fn string_claim(&self, name: &str) -> Option<&str> {
        self.claim(name).and_then(serde_json::Value::as_str)
    }
}

/// The signed-in state: a validated token set and its identity claims
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub tokens: TokenSet,
    pub claims: IdentityClaims,
}

impl Session {
    #[must_use]
    pub fn new(tokens: TokenSet, claims: IdentityClaims) -> Self {
        Self { tokens, claims }
    }

    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.tokens.access_token
    }

    #[must_use]
    pub fn subject(&self) -> &str {
        &self.claims.subject
    }
}

/// Lifecycle of a session coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    Idle,
    AuthorizationPending,
    Authenticated,
}

impl_str_enum_conversions!(SessionState {
    Uninitialized => "uninitialized",
    Idle => "idle",
    AuthorizationPending => "authorization_pending",
    Authenticated => "authenticated",
});

/// Presentation surface the authorization URI is opened in
///
/// Only affects the presentation flag of the URI, never the OAuth
/// parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrowserType {
    #[default]
    WebView,
    ExternalBrowser,
}

impl_str_enum_conversions!(BrowserType {
    WebView => "webview",
    ExternalBrowser => "external",
});

/// Caller-supplied authorization parameters and accepted UI locales
///
/// Parameters are kept sorted by name so the produced URI is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub parameters: BTreeMap<String, String>,

    /// Accepted UI locales, most preferred first (e.g. `nb_NO`, `en`)
    pub locales: Vec<String>,
}

impl AuthorizationRequest {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request with the given scope tokens joined by spaces
    #[must_use]
    pub fn with_scopes<S: AsRef<str>>(scopes: &[S]) -> Self {
        let scope = scopes.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(" ");
        Self::new().parameter(PARAM_SCOPE, scope)
    }

    /// Add or replace a parameter
    #[must_use]
    pub fn parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn locales<I, S>(mut self, locales: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.locales = locales.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn scope(&self) -> Option<&str> {
        self.parameters.get(PARAM_SCOPE).map(String::as_str)
    }
}

/// Provider metadata fetched from the discovery endpoint
///
/// Only `issuer` is required; every other field is optional and ignored when
/// absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub issuer: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analytics_endpoint: Option<String>,

    #[serde(default)]
    pub network_authentication_target_ips: Vec<String>,

    #[serde(default)]
    pub network_authentication_target_urls: Vec<String>,
}

impl ProviderConfig {
    /// Metadata carrying only an issuer
    #[must_use]
    pub fn with_issuer(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            authorization_endpoint: None,
            token_endpoint: None,
            userinfo_endpoint: None,
            jwks_uri: None,
            analytics_endpoint: None,
            network_authentication_target_ips: Vec::new(),
            network_authentication_target_urls: Vec::new(),
        }
    }

    /// Whether the provider can authenticate users by their mobile network
    #[must_use]
    pub fn supports_network_authentication(&self) -> bool {
        !(self.network_authentication_target_ips.is_empty()
            && self.network_authentication_target_urls.is_empty())
    }
}
