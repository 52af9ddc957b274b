//! Traits at the seams of the authorization engine
//!
//! These traits enable dependency injection and testing by abstracting
//! external dependencies (token endpoint, credential storage, the device
//! radio).

use async_trait::async_trait;
use connectid_domain::Result;
use serde_json::{Map, Value};

use super::types::{CredentialKey, IssuedTokens};

/// Network operations against the provider's token and user-info endpoints
///
/// Implementations map transport failures (including timeouts) to
/// `AuthError::Network` and provider rejections to `AuthError::Exchange`.
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// Exchange an authorization code for tokens
    ///
    /// # Arguments
    /// * `endpoint` - Absolute token endpoint URL
    /// * `code` - Authorization code from the redirect
    ///
    /// # Errors
    /// Returns `AuthError::Network` on transport failure and
    /// `AuthError::Exchange` on a non-2xx status or malformed body.
    async fn exchange_code(&self, endpoint: &str, code: &str) -> Result<IssuedTokens>;

    /// Obtain a fresh token set with a refresh token
    ///
    /// # Errors
    /// Same as [`TokenEndpoint::exchange_code`].
    async fn refresh(&self, endpoint: &str, refresh_token: &str) -> Result<IssuedTokens>;

    /// Fetch the user-info JSON object with a bearer token
    ///
    /// # Errors
    /// Same as [`TokenEndpoint::exchange_code`].
    async fn fetch_user_info(&self, endpoint: &str, access_token: &str)
        -> Result<Map<String, Value>>;
}

/// Durable keyed storage for one signed-in identity
///
/// Values are opaque strings; see [`CredentialKey`] for the fixed key set.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// # Errors
    /// Returns `AuthError::Storage` if the backend cannot be read.
    async fn get(&self, key: CredentialKey) -> Result<Option<String>>;

    /// Overwrite a single value
    ///
    /// # Errors
    /// Returns `AuthError::Storage` if the backend cannot be written.
    async fn put(&self, key: CredentialKey, value: &str) -> Result<()>;

    /// Remove a single value (idempotent)
    ///
    /// # Errors
    /// Returns `AuthError::Storage` if the backend cannot be written.
    async fn remove(&self, key: CredentialKey) -> Result<()>;

    /// Apply several writes; `None` removes the key
    ///
    /// Backends that can apply the batch atomically should override this.
    ///
    /// # Errors
    /// Returns the first storage failure; earlier writes stay applied.
    async fn put_many(&self, entries: Vec<(CredentialKey, Option<String>)>) -> Result<()> {
        for (key, value) in entries {
            match value {
                Some(value) => self.put(key, &value).await?,
                None => self.remove(key).await?,
            }
        }
        Ok(())
    }

    /// Remove every key
    ///
    /// # Errors
    /// Returns `AuthError::Storage` if any key could not be removed.
    async fn clear(&self) -> Result<()>;
}

/// Cellular network information supplied by the host platform
pub trait NetworkInfo: Send + Sync {
    /// Operator code of the current cellular network (MCC followed by MNC)
    fn mcc_mnc(&self) -> Option<String>;
}

/// [`NetworkInfo`] for hosts without a cellular radio
#[derive(Debug, Clone, Copy, Default)]
pub struct NoNetworkInfo;

impl NetworkInfo for NoNetworkInfo {
    fn mcc_mnc(&self) -> Option<String> {
        None
    }
}
