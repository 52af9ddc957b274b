//! Credential storage
//!
//! [`MemoryCredentialStore`] keeps every key behind a single lock, so a
//! batch write or a clear is atomic from any reader's point of view. The
//! helpers at the bottom map a [`TokenSet`] onto the fixed key set.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::DateTime;
use connectid_domain::constants::DEFAULT_TOKEN_TYPE;
use connectid_domain::{AuthError, Result, TokenSet};
use parking_lot::Mutex;

use super::traits::CredentialStore;
use super::types::{CredentialKey, ExpiryRecord};

/// Process-local credential store
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    entries: Mutex<BTreeMap<CredentialKey, String>>,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys currently holding a value
    #[must_use]
    pub fn keys(&self) -> Vec<CredentialKey> {
        self.entries.lock().keys().copied().collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get(&self, key: CredentialKey) -> Result<Option<String>> {
        Ok(self.entries.lock().get(&key).cloned())
    }

    async fn put(&self, key: CredentialKey, value: &str) -> Result<()> {
        self.entries.lock().insert(key, value.to_string());
        Ok(())
    }

    async fn remove(&self, key: CredentialKey) -> Result<()> {
        self.entries.lock().remove(&key);
        Ok(())
    }

    async fn put_many(&self, entries: Vec<(CredentialKey, Option<String>)>) -> Result<()> {
        let mut guard = self.entries.lock();
        for (key, value) in entries {
            match value {
                Some(value) => guard.insert(key, value),
                None => guard.remove(&key),
            };
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.lock().clear();
        Ok(())
    }
}

/// Persist a token set, replacing whatever was stored before
///
/// Absent optional tokens remove their keys so no value from an older set
/// survives. `pending_state` is left alone.
///
/// # Errors
/// Returns `AuthError::Storage` if the backend write fails.
pub async fn save_token_set(store: &dyn CredentialStore, tokens: &TokenSet) -> Result<()> {
    let expiry = ExpiryRecord {
        issued_at: tokens.issued_at.timestamp(),
        expires_in: tokens.expires_in,
    };

    store
        .put_many(vec![
            (CredentialKey::AccessToken, Some(tokens.access_token.clone())),
            (CredentialKey::RefreshToken, tokens.refresh_token.clone()),
            (CredentialKey::IdToken, tokens.id_token.clone()),
            (CredentialKey::Expiry, Some(serde_json::to_string(&expiry)?)),
            (CredentialKey::Scope, (!tokens.scope.is_empty()).then(|| tokens.scope_string())),
        ])
        .await
}

/// Load the persisted token set, if any
///
/// Returns `None` when no access token is stored.
///
/// # Errors
/// Returns `AuthError::Storage` if the backend read fails or the expiry
/// record is missing or corrupt.
pub async fn load_token_set(store: &dyn CredentialStore) -> Result<Option<TokenSet>> {
    let Some(access_token) = store.get(CredentialKey::AccessToken).await? else {
        return Ok(None);
    };

    let expiry = store
        .get(CredentialKey::Expiry)
        .await?
        .ok_or_else(|| AuthError::Storage("stored tokens have no expiry record".into()))?;
    let expiry: ExpiryRecord = serde_json::from_str(&expiry)?;
    let issued_at = DateTime::from_timestamp(expiry.issued_at, 0)
        .ok_or_else(|| AuthError::Storage("stored issuance time out of range".into()))?;

    Ok(Some(TokenSet {
        access_token,
        refresh_token: store.get(CredentialKey::RefreshToken).await?,
        id_token: store.get(CredentialKey::IdToken).await?,
        token_type: DEFAULT_TOKEN_TYPE.to_string(),
        scope: store
            .get(CredentialKey::Scope)
            .await?
            .map(|scope| TokenSet::parse_scope(&scope))
            .unwrap_or_default(),
        expires_in: expiry.expires_in,
        issued_at,
    }))
}
