//! Mock implementations of the engine's seams
//!
//! Each mock records how it was called so tests can assert on network
//! traffic without a server.

// Mocks are deliberately simple; failures surface through their return types
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use connectid_domain::{AuthError, ProviderError, Result};
use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::auth::{IssuedTokens, NetworkInfo, TokenEndpoint, TokenResponse};
#[cfg(feature = "platform")]
use crate::security::{KeychainError, SecretStore};

type Scripted<T> = Mutex<Option<Result<T>>>;

/// In-memory replacement for the platform keychain
///
/// # Examples
///
/// ```
/// use connectid_common::security::SecretStore;
/// use connectid_common::testing::MockKeychainProvider;
///
/// let keychain = MockKeychainProvider::new("ConnectIdTest");
/// keychain.set_secret("default.access_token", "AT").unwrap();
/// assert!(keychain.secret_exists("default.access_token"));
/// ```
#[cfg(feature = "platform")]
#[derive(Debug, Default)]
pub struct MockKeychainProvider {
    service_name: String,
    storage: Mutex<std::collections::HashMap<String, String>>,
}

#[cfg(feature = "platform")]
impl MockKeychainProvider {
    /// Create a new mock keychain provider with a service name for namespacing.
    pub fn new(service_name: impl Into<String>) -> Self {
        Self { service_name: service_name.into(), storage: Mutex::default() }
    }

    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    #[must_use]
    pub fn secret_exists(&self, key: &str) -> bool {
        self.storage.lock().contains_key(key)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.storage.lock().is_empty()
    }
}

#[cfg(feature = "platform")]
impl SecretStore for MockKeychainProvider {
    fn set_secret(&self, key: &str, value: &str) -> std::result::Result<(), KeychainError> {
        self.storage.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get_secret(&self, key: &str) -> std::result::Result<String, KeychainError> {
        self.storage.lock().get(key).cloned().ok_or(KeychainError::NotFound)
    }

    fn delete_secret(&self, key: &str) -> std::result::Result<(), KeychainError> {
        self.storage.lock().remove(key);
        Ok(())
    }
}

/// Scripted [`TokenEndpoint`] that never touches the network
///
/// Unconfigured operations fail with an `unconfigured` exchange error.
#[derive(Debug, Default)]
pub struct MockTokenEndpoint {
    exchange_response: Scripted<TokenResponse>,
    refresh_response: Scripted<TokenResponse>,
    user_info_response: Scripted<Map<String, Value>>,
    server_time: Mutex<Option<DateTime<Utc>>>,
    delay: Mutex<Duration>,
    exchange_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    user_info_calls: AtomicUsize,
    refresh_tokens_seen: Mutex<Vec<String>>,
}

impl MockTokenEndpoint {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the outcome of `exchange_code`
    pub fn set_exchange_response(&self, response: Result<TokenResponse>) {
        *self.exchange_response.lock() = Some(response);
    }

    /// Configure the outcome of `refresh`
    pub fn set_refresh_response(&self, response: Result<TokenResponse>) {
        *self.refresh_response.lock() = Some(response);
    }

    pub fn set_user_info_response(&self, response: Result<Map<String, Value>>) {
        *self.user_info_response.lock() = Some(response);
    }

    /// `Date` reported alongside every token response
    pub fn set_server_time(&self, server_time: Option<DateTime<Utc>>) {
        *self.server_time.lock() = server_time;
    }

    /// Latency applied before each call returns
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    #[must_use]
    pub fn exchange_calls(&self) -> usize {
        self.exchange_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn user_info_calls(&self) -> usize {
        self.user_info_calls.load(Ordering::SeqCst)
    }

    /// Refresh tokens presented to `refresh`, in call order
    #[must_use]
    pub fn refresh_tokens_seen(&self) -> Vec<String> {
        self.refresh_tokens_seen.lock().clone()
    }

    async fn pause(&self) {
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn issued(&self, scripted: &Scripted<TokenResponse>) -> Result<IssuedTokens> {
        let response = scripted.lock().clone().unwrap_or_else(|| Err(unconfigured()))?;
        Ok(IssuedTokens { response, server_time: *self.server_time.lock() })
    }
}

#[async_trait]
impl TokenEndpoint for MockTokenEndpoint {
    async fn exchange_code(&self, _endpoint: &str, _code: &str) -> Result<IssuedTokens> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.issued(&self.exchange_response)
    }

    async fn refresh(&self, _endpoint: &str, refresh_token: &str) -> Result<IssuedTokens> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.refresh_tokens_seen.lock().push(refresh_token.to_string());
        self.pause().await;
        self.issued(&self.refresh_response)
    }

    async fn fetch_user_info(
        &self,
        _endpoint: &str,
        _access_token: &str,
    ) -> Result<Map<String, Value>> {
        self.user_info_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.user_info_response.lock().clone().unwrap_or_else(|| Err(unconfigured()))
    }
}

fn unconfigured() -> AuthError {
    AuthError::Exchange(ProviderError::new("unconfigured", None))
}

/// [`NetworkInfo`] reporting a fixed operator code
#[derive(Debug, Clone, Default)]
pub struct MockNetworkInfo(pub Option<String>);

impl MockNetworkInfo {
    pub fn new(mcc_mnc: impl Into<String>) -> Self {
        Self(Some(mcc_mnc.into()))
    }
}

impl NetworkInfo for MockNetworkInfo {
    fn mcc_mnc(&self) -> Option<String> {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for testing::mocks.
    use super::*;
    use crate::testing::fixtures::token_response;

    #[tokio::test]
    async fn test_unconfigured_endpoint_fails_and_counts() {
        let endpoint = MockTokenEndpoint::new();

        let err = endpoint.refresh("https://token", "RT").await.unwrap_err();

        assert_eq!(err, unconfigured());
        assert_eq!(endpoint.refresh_calls(), 1);
        assert_eq!(endpoint.refresh_tokens_seen(), vec!["RT".to_string()]);
    }

    /// Validates `MockTokenEndpoint::set_exchange_response` behavior for the
    /// scripted exchange scenario.
    ///
    /// Assertions:
    /// - Confirms the configured response and server time are returned.
    #[tokio::test]
    async fn test_scripted_exchange() {
        let endpoint = MockTokenEndpoint::new();
        let now = Utc::now();
        endpoint.set_exchange_response(Ok(token_response("AT", "RT", "ID")));
        endpoint.set_server_time(Some(now));

        let issued = endpoint.exchange_code("https://token", "code").await.unwrap();

        assert_eq!(issued.response.access_token, "AT");
        assert_eq!(issued.server_time, Some(now));
        assert_eq!(endpoint.exchange_calls(), 1);
    }

    #[test]
    fn test_mock_network_info() {
        assert_eq!(MockNetworkInfo::new("24201").mcc_mnc().as_deref(), Some("24201"));
        assert_eq!(MockNetworkInfo::default().mcc_mnc(), None);
    }
}
