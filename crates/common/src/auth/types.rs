//! Wire and storage types of the authorization engine
//!
//! Token endpoint responses, the storage keys of the credential store and
//! the shape of persisted expiry metadata.

use chrono::{DateTime, Utc};
use connectid_domain::constants::DEFAULT_TOKEN_TYPE;
use connectid_domain::TokenSet;
use serde::{Deserialize, Serialize};

/// OAuth token response from the token endpoint
///
/// Standard OAuth 2.0 token response format (RFC 6749 §5.1). Every field
/// but `access_token` is optional on the wire; profiles decide which of them
/// they insist on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,

    /// Granted scopes (space-separated)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Convert into a [`TokenSet`] issued at `issued_at`
    ///
    /// A missing `token_type` defaults to `Bearer`, a missing `scope` to an
    /// empty list and a missing `expires_in` to zero (already expired).
    #[must_use]
    pub fn into_token_set(self, issued_at: DateTime<Utc>) -> TokenSet {
        TokenSet {
            access_token: self.access_token,
            refresh_token: self.refresh_token.filter(|t| !t.is_empty()),
            id_token: self.id_token.filter(|t| !t.is_empty()),
            token_type: self.token_type.unwrap_or_else(|| DEFAULT_TOKEN_TYPE.to_string()),
            scope: self.scope.as_deref().map(TokenSet::parse_scope).unwrap_or_default(),
            expires_in: self.expires_in.unwrap_or(0),
            issued_at,
        }
    }
}

/// Successful token endpoint exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedTokens {
    pub response: TokenResponse,

    /// Value of the response `Date` header, when present and parseable
    pub server_time: Option<DateTime<Utc>>,
}

/// Fixed keys of the credential store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CredentialKey {
    AccessToken,
    RefreshToken,
    IdToken,
    /// JSON encoded [`ExpiryRecord`]
    Expiry,
    /// Space-separated granted scopes
    Scope,
    /// State of the outstanding authorization attempt
    PendingState,
}

impl CredentialKey {
    /// Every key, in storage order
    pub const ALL: [Self; 6] = [
        Self::AccessToken,
        Self::RefreshToken,
        Self::IdToken,
        Self::Expiry,
        Self::Scope,
        Self::PendingState,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AccessToken => "access_token",
            Self::RefreshToken => "refresh_token",
            Self::IdToken => "id_token",
            Self::Expiry => "expiry",
            Self::Scope => "scope",
            Self::PendingState => "pending_state",
        }
    }
}

impl std::fmt::Display for CredentialKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted form of a token set's expiry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiryRecord {
    /// Unix seconds
    pub issued_at: i64,
    pub expires_in: i64,
}
