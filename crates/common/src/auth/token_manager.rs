//! Token manager with coalesced refresh
//!
//! Manages the session's token lifecycle:
//! - In-memory session snapshot backed by the credential store
//! - Refresh before expiry (configurable leeway, default 60 s)
//! - One refresh in flight per session, shared by every concurrent caller
//! - Background refresh task
//!
//! Every write (session install, refresh result, clear) happens under one
//! async mutex. Readers take the snapshot lock only briefly and always see
//! a complete session or none.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use connectid_domain::constants::AUTO_REFRESH_RETRY_SECS;
use connectid_domain::{AuthError, Result, Session, TokenSet};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use tokio::sync::MutexGuard;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};

use super::provider::IdentityProvider;
use super::store::save_token_set;
use super::traits::{CredentialStore, TokenEndpoint};

/// Upper bound for the refresh leeway (one day)
const MAX_LEEWAY_SECS: i64 = 86_400;

type SharedRefresh = Shared<BoxFuture<'static, Result<String>>>;

/// Refresh currently in flight, tagged so only its own task clears the slot
struct InflightRefresh {
    id: u64,
    future: SharedRefresh,
}

/// Session holder with single-flight refresh
pub struct TokenManager {
    endpoint: Arc<dyn TokenEndpoint>,
    store: Arc<dyn CredentialStore>,
    provider: Arc<IdentityProvider>,
    session: RwLock<Option<Session>>,
    inflight: Mutex<Option<InflightRefresh>>,
    next_refresh_id: AtomicU64,
    /// Bumped whenever the session is replaced or cleared
    generation: AtomicU64,
    mutation: tokio::sync::Mutex<()>,
    leeway_secs: i64,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("authenticated", &self.is_authenticated())
            .field("generation", &self.generation.load(Ordering::SeqCst))
            .field("leeway_secs", &self.leeway_secs)
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    /// Create a token manager
    ///
    /// # Arguments
    /// * `endpoint` - Token endpoint client used for refreshes
    /// * `store` - Durable credential store
    /// * `provider` - Endpoint resolution and identity token verification
    /// * `leeway_secs` - Refresh tokens this many seconds before expiry,
    ///   clamped to `0..=86400`
    #[must_use]
    pub fn new(
        endpoint: Arc<dyn TokenEndpoint>,
        store: Arc<dyn CredentialStore>,
        provider: Arc<IdentityProvider>,
        leeway_secs: i64,
    ) -> Self {
        Self {
            endpoint,
            store,
            provider,
            session: RwLock::new(None),
            inflight: Mutex::new(None),
            next_refresh_id: AtomicU64::new(0),
            generation: AtomicU64::new(0),
            mutation: tokio::sync::Mutex::new(()),
            leeway_secs: leeway_secs.clamp(0, MAX_LEEWAY_SECS),
        }
    }

    /// Enter the mutation domain
    ///
    /// Held by the coordinator across authorization completion so a refresh
    /// result can never interleave with a code exchange.
    pub async fn lock(&self) -> MutexGuard<'_, ()> {
        self.mutation.lock().await
    }

    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.session.read().clone()
    }

    #[must_use]
    pub fn tokens(&self) -> Option<TokenSet> {
        self.session.read().as_ref().map(|s| s.tokens.clone())
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.session.read().is_some()
    }

    #[must_use]
    pub fn leeway_secs(&self) -> i64 {
        self.leeway_secs
    }

    /// Current access token without refreshing
    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.session.read().as_ref().map(|s| s.tokens.access_token.clone())
    }

    #[must_use]
    pub fn access_token_expiration(&self) -> Option<DateTime<Utc>> {
        self.session.read().as_ref().map(|s| s.tokens.expires_at())
    }

    /// Persist and publish a new session
    ///
    /// Any refresh still in flight for the previous session is discarded
    /// when it completes.
    ///
    /// # Errors
    /// Returns `AuthError::Storage` if the store rejects the write; the
    /// in-memory session is left unchanged in that case.
    pub async fn install(&self, _guard: &MutexGuard<'_, ()>, session: Session) -> Result<()> {
        save_token_set(self.store.as_ref(), &session.tokens).await?;
        self.generation.fetch_add(1, Ordering::SeqCst);
        *self.session.write() = Some(session);
        *self.inflight.lock() = None;
        info!("Session installed");
        Ok(())
    }

    /// Restore a session loaded at startup without writing it back
    pub fn restore(&self, session: Session) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        *self.session.write() = Some(session);
    }

    /// Clear the store and forget the session (logout)
    ///
    /// # Errors
    /// Returns `AuthError::Storage` if the store could not be cleared; the
    /// in-memory session is dropped regardless.
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.mutation.lock().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        *self.session.write() = None;
        *self.inflight.lock() = None;

        let result = self.store.clear().await;
        info!("Session cleared");
        result
    }

    /// Access token valid for at least the leeway, refreshing when needed
    ///
    /// # Errors
    /// - `AuthError::NotAuthenticated` without a session
    /// - `AuthError::RefreshTokenMissing` when the token is stale and cannot
    ///   be renewed (no network call is made)
    /// - Any refresh failure; the stored session is left untouched
    pub async fn get_valid_access_token(self: &Arc<Self>) -> Result<String> {
        let tokens = self.tokens().ok_or(AuthError::NotAuthenticated)?;
        if !tokens.is_expired(self.leeway_secs) {
            return Ok(tokens.access_token);
        }
        if !tokens.has_refresh_token() {
            return Err(AuthError::RefreshTokenMissing);
        }

        debug!(seconds_until_expiry = tokens.seconds_until_expiry(), "Access token stale");
        self.refresh_with(false).await
    }

    /// Refresh regardless of expiry, joining a refresh already in flight
    ///
    /// # Errors
    /// Same as [`TokenManager::get_valid_access_token`].
    pub async fn refresh(self: &Arc<Self>) -> Result<String> {
        self.refresh_with(true).await
    }

    /// Join or start a refresh
    ///
    /// Unless `force` is set, the session is re-read under the in-flight
    /// lock and a token that another caller already renewed is returned
    /// without a second round trip.
    pub(crate) async fn refresh_with(self: &Arc<Self>, force: bool) -> Result<String> {
        let future = {
            let mut slot = self.inflight.lock();
            if let Some(inflight) = slot.as_ref() {
                debug!(refresh_id = inflight.id, "Joining refresh in flight");
                inflight.future.clone()
            } else {
                let (generation, refresh_token) = {
                    let session = self.session.read();
                    let tokens = &session.as_ref().ok_or(AuthError::NotAuthenticated)?.tokens;
                    if !force && !tokens.is_expired(self.leeway_secs) {
                        debug!("Access token renewed by an earlier refresh");
                        return Ok(tokens.access_token.clone());
                    }
                    let refresh_token = tokens
                        .refresh_token
                        .clone()
                        .filter(|t| !t.is_empty())
                        .ok_or(AuthError::RefreshTokenMissing)?;
                    (self.generation.load(Ordering::SeqCst), refresh_token)
                };

                let id = self.next_refresh_id.fetch_add(1, Ordering::SeqCst);
                let this = Arc::clone(self);
                let future = async move {
                    let result = this.run_refresh(generation, &refresh_token).await;
                    this.finish_refresh(id);
                    result
                }
                .boxed()
                .shared();

                *slot = Some(InflightRefresh { id, future: future.clone() });
                future
            }
        };

        future.await
    }

    fn finish_refresh(&self, id: u64) {
        let mut slot = self.inflight.lock();
        if slot.as_ref().is_some_and(|inflight| inflight.id == id) {
            *slot = None;
        }
    }

    async fn run_refresh(&self, generation: u64, refresh_token: &str) -> Result<String> {
        info!("Refreshing access token");

        let endpoint = self.provider.token_endpoint();
        let issued = self.endpoint.refresh(&endpoint, refresh_token).await.map_err(|e| {
            warn!(error = %e, "Token refresh failed");
            e
        })?;

        let _guard = self.mutation.lock().await;
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!("Session changed during refresh, discarding result");
            return self.access_token().ok_or(AuthError::NotAuthenticated);
        }

        let previous = self.session();
        let session = self.provider.session_from(issued, previous.as_ref()).await?;
        save_token_set(self.store.as_ref(), &session.tokens).await?;

        let access_token = session.tokens.access_token.clone();
        *self.session.write() = Some(session);

        info!("Successfully refreshed access token");
        Ok(access_token)
    }

    /// Start the background refresh task
    ///
    /// Sleeps until `expiry - leeway`, then refreshes. Failures are logged
    /// and retried after a fixed delay. The task holds only a weak
    /// reference and exits once the manager is dropped.
    pub fn spawn_auto_refresh(self: &Arc<Self>) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(auto_refresh_loop(weak))
    }
}

async fn auto_refresh_loop(manager: Weak<TokenManager>) {
    info!("Starting token auto-refresh background task");
    let retry = Duration::from_secs(AUTO_REFRESH_RETRY_SECS);

    loop {
        let wake = {
            let Some(manager) = manager.upgrade() else { break };
            match manager.tokens() {
                Some(tokens) => {
                    let secs = tokens.seconds_until_expiry() - manager.leeway_secs;
                    Duration::from_secs(u64::try_from(secs).unwrap_or(0))
                }
                None => retry,
            }
        };

        if !wake.is_zero() {
            debug!(seconds = wake.as_secs(), "Auto-refresh sleeping until next check");
            sleep(wake).await;
        }

        let Some(manager) = manager.upgrade() else { break };
        let Some(tokens) = manager.tokens() else { continue };
        if !tokens.is_expired(manager.leeway_secs) {
            continue;
        }
        if !tokens.has_refresh_token() {
            warn!("Auto-refresh: session has no refresh token, stopping");
            break;
        }

        if let Err(e) = manager.refresh().await {
            error!(error = %e, "Auto-refresh failed");
            drop(manager);
            sleep(retry).await;
        }
    }

    debug!("Token auto-refresh task stopped");
}
