//! Provider discovery
//!
//! Fetches and caches the provider's OpenID configuration. Discovery is
//! best-effort: failures are logged and the previously cached configuration
//! (or none at all) stays in effect, so authorization can proceed on static
//! per-profile fallbacks.

use std::sync::Arc;

use connectid_domain::{AuthError, ProviderConfig, ProviderError, Result};
use jsonwebtoken::jwk::JwkSet;
use parking_lot::RwLock;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::client::network_error;

/// Discovery client with an in-memory configuration cache
#[derive(Debug)]
pub struct DiscoveryClient {
    http: Client,
    well_known_url: Option<String>,
    cached: RwLock<Option<ProviderConfig>>,
}

impl DiscoveryClient {
    /// Create a discovery client
    ///
    /// # Arguments
    /// * `http` - Shared HTTP client
    /// * `well_known_url` - Absolute discovery URL; `None` disables discovery
    #[must_use]
    pub fn new(http: Client, well_known_url: Option<String>) -> Self {
        Self { http, well_known_url, cached: RwLock::new(None) }
    }

    #[must_use]
    pub fn well_known_url(&self) -> Option<&str> {
        self.well_known_url.as_deref()
    }

    /// Last successfully fetched configuration
    #[must_use]
    pub fn current(&self) -> Option<ProviderConfig> {
        self.cached.read().clone()
    }

    /// Install a configuration obtained out of band
    pub fn set_current(&self, config: ProviderConfig) {
        *self.cached.write() = Some(config);
    }

    /// Fetch the configuration and replace the cache on success
    ///
    /// Never fails: on any error the previous configuration is kept and
    /// returned.
    pub async fn resolve(&self) -> Option<ProviderConfig> {
        let Some(url) = self.well_known_url.as_deref() else {
            return self.current();
        };

        match self.fetch(url).await {
            Ok(config) => {
                info!(issuer = %config.issuer, "Provider configuration resolved");
                *self.cached.write() = Some(config.clone());
                Some(config)
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Discovery failed, keeping previous configuration");
                self.current()
            }
        }
    }

    /// Run [`DiscoveryClient::resolve`] on a background task
    pub fn spawn_refresh(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.resolve().await;
        })
    }

    async fn fetch(&self, url: &str) -> Result<ProviderConfig> {
        let config: ProviderConfig = self.get_json(url).await?;
        if config.issuer.trim().is_empty() {
            return Err(invalid_response("discovery document has an empty issuer"));
        }
        Ok(config)
    }

    /// Fetch the provider's JSON Web Key Set
    ///
    /// # Errors
    /// Returns `AuthError::Network` on transport failure and
    /// `AuthError::Exchange` on a non-2xx status or malformed document.
    pub async fn fetch_jwks(&self, jwks_uri: &str) -> Result<JwkSet> {
        let jwks: JwkSet = self.get_json(jwks_uri).await?;
        debug!(url = %jwks_uri, keys = jwks.keys.len(), "Fetched signing keys");
        Ok(jwks)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!(url = %url, "Fetching provider document");

        let response = self.http.get(url).send().await.map_err(network_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::Exchange(
                ProviderError::new("unexpected_status", None).with_status(status.as_u16()),
            ));
        }

        let body = response.text().await.map_err(network_error)?;
        serde_json::from_str(&body).map_err(|e| invalid_response(&e.to_string()))
    }
}

fn invalid_response(detail: &str) -> AuthError {
    AuthError::Exchange(ProviderError::new("invalid_response", Some(detail.to_string())))
}
