//! Coordinator bootstrap from a loaded configuration
//!
//! The host loads a [`ConnectConfig`] (see [`crate::config`]) and hands it
//! here; everything else is derived: the provider profile, the HTTP client
//! with the configured timeout, locales, refresh leeway and, on platform
//! builds, keychain-backed credential storage namespaced by account.

use std::time::Duration;

use connectid_common::auth::{build_http_client, AuthProfile};
use connectid_common::{SessionCoordinator, SessionCoordinatorBuilder};
use connectid_domain::{ConnectConfig, Result};

/// Builder preconfigured from `config`, without a credential store
///
/// Callers add their own store (or accept the in-memory default) before
/// building.
///
/// # Errors
/// Returns `AuthError::Configuration` if the HTTP client cannot be built.
pub fn coordinator_builder(config: &ConnectConfig) -> Result<SessionCoordinatorBuilder> {
    let http = build_http_client(Duration::from_secs(config.http_timeout_secs))?;
    let profile = AuthProfile::from_config(config);

    tracing::debug!(
        profile = profile.name(),
        environment = %config.environment,
        api_url = %profile.api_url(),
        "Preparing coordinator"
    );

    Ok(SessionCoordinator::builder(profile, config.client.clone())
        .http_client(http)
        .locales(config.locales.clone())
        .default_locale(config.default_locale.clone())
        .refresh_leeway_secs(config.refresh_leeway_secs))
}

#[cfg(feature = "platform")]
mod platform {
    use std::sync::Arc;

    use connectid_common::auth::KeychainCredentialStore;
    use connectid_common::{KeychainProvider, SessionCoordinator};
    use connectid_domain::{ConnectConfig, Result};

    use super::coordinator_builder;

    /// Coordinator persisting credentials in the platform keychain
    ///
    /// # Errors
    /// Returns `AuthError::Configuration` if the HTTP client cannot be built.
    pub fn build_coordinator(config: &ConnectConfig) -> Result<SessionCoordinator> {
        let secrets = KeychainProvider::new(config.keychain_service.clone());
        let store = KeychainCredentialStore::new(secrets, config.account.clone());

        coordinator_builder(config)?.credential_store(Arc::new(store)).build()
    }

    /// Build and initialize a keychain-backed coordinator
    ///
    /// # Errors
    /// Returns the first failure from [`build_coordinator`] or
    /// [`SessionCoordinator::initialize`].
    pub async fn connect(config: &ConnectConfig) -> Result<SessionCoordinator> {
        let coordinator = build_coordinator(config)?;
        let state = coordinator.initialize().await?;
        tracing::info!(%state, account = %config.account, "Coordinator ready");
        Ok(coordinator)
    }
}

#[cfg(feature = "platform")]
pub use platform::{build_coordinator, connect};
