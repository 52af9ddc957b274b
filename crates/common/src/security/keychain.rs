//! Generic keychain provider for secure credential storage
//!
//! Thin wrapper over the platform keychain for storing arbitrary secrets
//! across macOS (Keychain Access), Windows (Credential Manager), and Linux
//! (Secret Service API).
//!
//! ## Usage
//!
//! ```no_run
//! use connectid_common::security::{KeychainProvider, SecretStore};
//!
//! let keychain = KeychainProvider::new("ConnectId");
//! keychain.set_secret("default.refresh_token", "super-secret")?;
//! let secret = keychain.get_secret("default.refresh_token")?;
//! assert_eq!(secret, "super-secret");
//! # Ok::<(), connectid_common::security::KeychainError>(())
//! ```

use std::sync::Arc;

use connectid_domain::AuthError;
use keyring::Entry;
use thiserror::Error;
use tracing::debug;

/// Keyed secret storage
///
/// Implemented by [`KeychainProvider`] and by in-memory doubles in tests.
pub trait SecretStore: Send + Sync {
    /// Store a secret value
    ///
    /// # Errors
    /// Returns `KeychainError::AccessFailed` if the backend rejects the write.
    fn set_secret(&self, key: &str, value: &str) -> Result<(), KeychainError>;

    /// Retrieve a secret value
    ///
    /// # Errors
    /// Returns `KeychainError::NotFound` if the secret doesn't exist and
    /// `KeychainError::AccessFailed` if the backend cannot be read.
    fn get_secret(&self, key: &str) -> Result<String, KeychainError>;

    /// Delete a secret (idempotent)
    ///
    /// # Errors
    /// Returns `KeychainError::AccessFailed` if the backend rejects the
    /// deletion.
    fn delete_secret(&self, key: &str) -> Result<(), KeychainError>;
}

impl<T: SecretStore + ?Sized> SecretStore for Arc<T> {
    fn set_secret(&self, key: &str, value: &str) -> Result<(), KeychainError> {
        (**self).set_secret(key, value)
    }

    fn get_secret(&self, key: &str) -> Result<String, KeychainError> {
        (**self).get_secret(key)
    }

    fn delete_secret(&self, key: &str) -> Result<(), KeychainError> {
        (**self).delete_secret(key)
    }
}

/// Keychain provider scoped to one service name
#[derive(Debug, Clone)]
pub struct KeychainProvider {
    service_name: String,
}

impl KeychainProvider {
    /// Create a new keychain provider for a specific service
    ///
    /// # Arguments
    /// * `service_name` - Service identifier (e.g., "ConnectId")
    pub fn new(service_name: impl Into<String>) -> Self {
        Self { service_name: service_name.into() }
    }

    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Check if a secret exists in the keychain
    #[must_use]
    pub fn secret_exists(&self, key: &str) -> bool {
        self.create_entry(key).is_ok_and(|entry| entry.get_password().is_ok())
    }

    fn create_entry(&self, key: &str) -> Result<Entry, KeychainError> {
        Entry::new(&self.service_name, key).map_err(|e| {
            KeychainError::AccessFailed(format!("Failed to create keychain entry: {e}"))
        })
    }
}

impl SecretStore for KeychainProvider {
    fn set_secret(&self, key: &str, value: &str) -> Result<(), KeychainError> {
        debug!(service = %self.service_name, key = %key, "Storing secret in keychain");

        self.create_entry(key)?.set_password(value).map_err(|e| {
            KeychainError::AccessFailed(format!("Failed to store secret for {key}: {e}"))
        })
    }

    fn get_secret(&self, key: &str) -> Result<String, KeychainError> {
        debug!(service = %self.service_name, key = %key, "Retrieving secret from keychain");

        self.create_entry(key)?.get_password().map_err(|e| match e {
            keyring::Error::NoEntry => KeychainError::NotFound,
            other => {
                KeychainError::AccessFailed(format!("Failed to retrieve secret for {key}: {other}"))
            }
        })
    }

    fn delete_secret(&self, key: &str) -> Result<(), KeychainError> {
        debug!(service = %self.service_name, key = %key, "Deleting secret from keychain");

        match self.create_entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(KeychainError::AccessFailed(format!(
                "Failed to delete secret for {key}: {e}"
            ))),
        }
    }
}

/// Keychain error types
#[derive(Debug, Error)]
pub enum KeychainError {
    /// Keychain access failed (permission denied, not available, etc.)
    #[error("Keychain access failed: {0}")]
    AccessFailed(String),

    /// Entry not found in keychain
    #[error("Entry not found")]
    NotFound,

    /// Underlying keyring library error
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),
}

impl From<KeychainError> for AuthError {
    fn from(err: KeychainError) -> Self {
        Self::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for security::keychain.
    use super::*;

    /// Validates `KeychainProvider::new` behavior for the keychain provider
    /// creation scenario.
    ///
    /// Assertions:
    /// - Confirms `keychain.service_name()` equals `"ConnectIdTest"`.
    #[test]
    fn test_keychain_provider_creation() {
        let keychain = KeychainProvider::new("ConnectIdTest");
        assert_eq!(keychain.service_name(), "ConnectIdTest");
    }

    #[test]
    fn test_keychain_errors_become_storage_errors() {
        let err: AuthError = KeychainError::AccessFailed("locked".into()).into();

        assert_eq!(err, AuthError::Storage("Keychain access failed: locked".into()));
        assert!(!err.is_retryable());
    }
}
