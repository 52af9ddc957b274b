//! Error types used throughout the authorization engine
//!
//! Every public coordinator operation either completes with a typed result
//! or fails with one of the [`AuthError`] kinds below. Errors are `Clone` so
//! that one refresh outcome can be handed to every coalesced waiter.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error payload returned by the identity provider
///
/// Standard OAuth 2.0 error response format (RFC 6749 §5.2). Also used for
/// the `error` / `error_description` pair carried by a redirect callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderError {
    /// HTTP status of the response, when the error came from an endpoint
    #[serde(skip)]
    pub status: Option<u16>,

    pub error: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl ProviderError {
    #[must_use]
    pub fn new(error: impl Into<String>, error_description: Option<String>) -> Self {
        Self { status: None, error: error.into(), error_description }
    }

    /// Attach the HTTP status the payload was received with.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error_description {
            Some(desc) => write!(f, "{}: {}", self.error, desc)?,
            None => write!(f, "{}", self.error)?,
        }
        if let Some(status) = self.status {
            write!(f, " (HTTP {status})")?;
        }
        Ok(())
    }
}

/// Identity token validation failures, one per validation step
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Token structure could not be parsed, or a required claim is missing
    #[error("malformed identity token: {0}")]
    MalformedToken(String),

    /// Signature did not verify against any provider key
    #[error("identity token signature rejected: {0}")]
    Signature(String),

    #[error("issuer mismatch: expected {expected}, got {actual}")]
    IssuerMismatch { expected: String, actual: String },

    #[error("audience mismatch: expected one of {expected:?}, got {actual:?}")]
    AudienceMismatch { expected: Vec<String>, actual: Vec<String> },

    /// `exp` is at or before the validation instant (both unix seconds)
    #[error("identity token expired at {expired_at} (now {now})")]
    ExpiredToken { expired_at: i64, now: i64 },
}

/// Main error type for authorization and token lifecycle operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Missing client id / redirect URI or inconsistent profile setup
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("operation invoked before initialization completed")]
    NotInitialized,

    /// Caller-supplied authorization parameters are unusable
    #[error("invalid authorization request: {0}")]
    InvalidRequest(String),

    /// Transport failure (including timeouts); safe to retry
    #[error("network error: {0}")]
    Network(String),

    /// Provider rejected the code or refresh-token exchange
    #[error("token exchange rejected: {0}")]
    Exchange(ProviderError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Redirect `state` differs from the stored pending state
    #[error("state mismatch: redirect does not belong to the pending authorization")]
    StateMismatch,

    /// Redirect does not target the registered redirect URI or lacks a code
    #[error("invalid redirect: {0}")]
    InvalidRedirect(String),

    /// Redirect carried an `error` instead of a code
    #[error("authorization denied: {0}")]
    AuthorizationDenied(ProviderError),

    #[error("no refresh token available; interactive authorization required")]
    RefreshTokenMissing,

    #[error("not authenticated")]
    NotAuthenticated,

    #[error("credential storage error: {0}")]
    Storage(String),
}

impl AuthError {
    /// Whether retrying the same operation may succeed
    ///
    /// Only transport failures qualify; exchange errors are never retried
    /// with the same code since codes are single-use.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    /// Whether the caller has to run interactive authorization again
    #[must_use]
    pub fn requires_reauthentication(&self) -> bool {
        matches!(self, Self::RefreshTokenMissing | Self::NotAuthenticated | Self::Validation(_))
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(format!("serialization failed: {err}"))
    }
}

/// Result type alias for authorization operations
pub type Result<T> = std::result::Result<T, AuthError>;
