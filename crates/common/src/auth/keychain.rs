//! Credential store backed by the platform keychain
//!
//! # Module Layering
//!
//! - **`security::keychain`**: generic secret storage via the platform
//!   keychain
//! - **`auth::keychain`** (this module): maps the fixed credential keys onto
//!   keychain entries named `<account>.<key>`

use std::sync::Arc;

use async_trait::async_trait;
use connectid_domain::{AuthError, Result};
use tracing::{debug, warn};

use super::traits::CredentialStore;
use super::types::CredentialKey;
use crate::security::{KeychainError, KeychainProvider, SecretStore};

/// [`CredentialStore`] over any [`SecretStore`], by default the platform
/// keychain
///
/// Keychain calls block, so each operation runs on the blocking thread
/// pool.
#[derive(Debug)]
pub struct KeychainCredentialStore<S: SecretStore = KeychainProvider> {
    secrets: Arc<S>,
    account: String,
}

impl<S: SecretStore> Clone for KeychainCredentialStore<S> {
    fn clone(&self) -> Self {
        Self { secrets: Arc::clone(&self.secrets), account: self.account.clone() }
    }
}

impl<S: SecretStore + 'static> KeychainCredentialStore<S> {
    /// # Arguments
    /// * `secrets` - Secret backend
    /// * `account` - Identity scope; prefixes every entry name
    pub fn new(secrets: S, account: impl Into<String>) -> Self {
        Self { secrets: Arc::new(secrets), account: account.into() }
    }

    #[must_use]
    pub fn account(&self) -> &str {
        &self.account
    }

    fn entry_name(&self, key: CredentialKey) -> String {
        entry_name(&self.account, key)
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&S) -> Result<T> + Send + 'static,
    {
        let secrets = Arc::clone(&self.secrets);
        tokio::task::spawn_blocking(move || op(&*secrets))
            .await
            .map_err(|e| AuthError::Storage(format!("keychain task failed: {e}")))?
    }
}

fn entry_name(account: &str, key: CredentialKey) -> String {
    format!("{account}.{}", key.as_str())
}

fn read_entry<S: SecretStore>(secrets: &S, name: &str) -> Result<Option<String>> {
    match secrets.get_secret(name) {
        Ok(value) => Ok(Some(value)),
        Err(KeychainError::NotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn write_entry<S: SecretStore>(
    secrets: &S,
    name: &str,
    value: Option<&str>,
) -> std::result::Result<(), KeychainError> {
    match value {
        Some(value) => secrets.set_secret(name, value),
        None => secrets.delete_secret(name),
    }
}

#[async_trait]
impl<S: SecretStore + 'static> CredentialStore for KeychainCredentialStore<S> {
    async fn get(&self, key: CredentialKey) -> Result<Option<String>> {
        let name = self.entry_name(key);
        self.blocking(move |secrets| read_entry(secrets, &name)).await
    }

    async fn put(&self, key: CredentialKey, value: &str) -> Result<()> {
        let name = self.entry_name(key);
        let value = value.to_string();
        self.blocking(move |secrets| Ok(secrets.set_secret(&name, &value)?)).await
    }

    async fn remove(&self, key: CredentialKey) -> Result<()> {
        let name = self.entry_name(key);
        self.blocking(move |secrets| Ok(secrets.delete_secret(&name)?)).await
    }

    /// All-or-nothing write
    ///
    /// Previous values are read first; when a write fails, the entries
    /// already touched are restored before the error is returned.
    async fn put_many(&self, entries: Vec<(CredentialKey, Option<String>)>) -> Result<()> {
        let account = self.account.clone();
        self.blocking(move |secrets| {
            let entries: Vec<(String, Option<String>)> =
                entries.into_iter().map(|(key, value)| (entry_name(&account, key), value)).collect();

            let mut previous = Vec::with_capacity(entries.len());
            for (name, _) in &entries {
                previous.push((name.as_str(), read_entry(secrets, name)?));
            }

            for (index, (name, value)) in entries.iter().enumerate() {
                if let Err(e) = write_entry(secrets, name, value.as_deref()) {
                    warn!(entry = %name, error = %e, "Credential write failed, rolling back");
                    for (name, value) in previous[..=index].iter().rev() {
                        if let Err(e) = write_entry(secrets, name, value.as_deref()) {
                            warn!(entry = %name, error = %e, "Rollback of credential entry failed");
                        }
                    }
                    return Err(e.into());
                }
            }
            Ok(())
        })
        .await
    }

    async fn clear(&self) -> Result<()> {
        debug!(account = %self.account, "Clearing stored credentials");

        let account = self.account.clone();
        self.blocking(move |secrets| {
            // Attempt every key before reporting the first failure
            let mut first_error = None;
            for key in CredentialKey::ALL {
                if let Err(e) = secrets.delete_secret(&entry_name(&account, key)) {
                    first_error.get_or_insert(e);
                }
            }
            first_error.map_or(Ok(()), |e| Err(e.into()))
        })
        .await
    }
}
