//! Session coordinator
//!
//! High-level façade that ties discovery, the authorization request
//! builder, the token endpoint, the validator and the credential store into
//! one authorization and token lifecycle per provider profile.
//!
//! ```text
//! Uninitialized ──initialize──► Idle ──begin──► AuthorizationPending
//!                                ▲                     │ complete
//!                                └──────logout──── Authenticated ◄─┘ (refresh: self-loop)
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use connectid_domain::constants::{DEFAULT_LOCALE, DEFAULT_REFRESH_LEEWAY_SECS, PARAM_STATE};
use connectid_domain::{
    AuthError, AuthorizationRequest, BrowserType, ClientConfig, IdentityClaims, ProviderError,
    Result, Session, SessionState,
};
use parking_lot::RwLock;
use reqwest::Client;
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use super::authorize::{build_authorize_uri, AuthorizeContext};
use super::client::{default_http_client, TokenClient};
use super::discovery::DiscoveryClient;
use super::profile::AuthProfile;
use super::provider::IdentityProvider;
use super::state::{validate_state, RandomStateSource, StateSource};
use super::store::{load_token_set, MemoryCredentialStore};
use super::token_manager::TokenManager;
use super::traits::{CredentialStore, NetworkInfo, NoNetworkInfo, TokenEndpoint};
use super::types::CredentialKey;
use super::validator::VerificationKeys;

const PARAM_CODE: &str = "code";
const PARAM_ERROR: &str = "error";
const PARAM_ERROR_DESCRIPTION: &str = "error_description";

/// Authorization and token lifecycle for one provider profile
///
/// Independent instances share nothing; construct one per profile with
/// [`SessionCoordinator::builder`].
pub struct SessionCoordinator {
    provider: Arc<IdentityProvider>,
    endpoint: Arc<dyn TokenEndpoint>,
    store: Arc<dyn CredentialStore>,
    tokens: Arc<TokenManager>,
    states: Arc<dyn StateSource>,
    network: Arc<dyn NetworkInfo>,
    locales: Vec<String>,
    default_locale: String,
    phase: RwLock<SessionState>,
}

impl SessionCoordinator {
    /// Start building a coordinator for `profile` and `client`
    #[must_use]
    pub fn builder(profile: AuthProfile, client: ClientConfig) -> SessionCoordinatorBuilder {
        SessionCoordinatorBuilder::new(profile, client)
    }

    /// Restore persisted credentials and kick off discovery
    ///
    /// A stored session is adopted only if its identity token still
    /// validates as of the set's issuance; otherwise the coordinator starts
    /// `Idle`. Calling this again is a no-op.
    ///
    /// # Errors
    /// Returns `AuthError::Storage` if the pending state cannot be read.
    pub async fn initialize(&self) -> Result<SessionState> {
        if self.state() != SessionState::Uninitialized {
            return Ok(self.state());
        }

        self.provider.discovery().spawn_refresh();

        match load_token_set(self.store.as_ref()).await {
            Ok(Some(tokens)) => match self.provider.restore(tokens).await {
                Ok(session) => {
                    info!(subject = %session.subject(), "Restored stored session");
                    self.tokens.restore(session);
                }
                Err(e) => warn!(error = %e, "Stored session no longer valid"),
            },
            Ok(None) => debug!("No stored session"),
            Err(e) => warn!(error = %e, "Stored credentials unreadable"),
        }

        let pending = self.store.get(CredentialKey::PendingState).await?.is_some();
        let phase = if self.tokens.is_authenticated() {
            SessionState::Authenticated
        } else if pending {
            SessionState::AuthorizationPending
        } else {
            SessionState::Idle
        };
        *self.phase.write() = phase;

        info!(profile = self.provider.profile().name(), state = %phase, "Coordinator initialized");
        Ok(phase)
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.phase.read()
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.state() == SessionState::Uninitialized {
            return Err(AuthError::NotInitialized);
        }
        Ok(())
    }

    /// Settle the phase after an attempt ended without a new session
    fn settle(&self) {
        *self.phase.write() = if self.tokens.is_authenticated() {
            SessionState::Authenticated
        } else {
            SessionState::Idle
        };
    }

    /// Build the authorization URI for a new attempt
    ///
    /// The generated state is persisted before the URI is returned and
    /// replaces any earlier pending state, superseding that attempt.
    /// Request locales default to the coordinator's configured locales.
    ///
    /// # Arguments
    /// * `request` - Caller parameters; must include a non-empty `scope`
    /// * `browser` - Presentation surface the URI will be opened in
    ///
    /// # Errors
    /// - `AuthError::NotInitialized` before [`SessionCoordinator::initialize`]
    /// - `AuthError::Configuration` for missing client setup or a profile
    ///   precondition
    /// - `AuthError::InvalidRequest` without a scope
    /// - `AuthError::Storage` if the state cannot be persisted
    pub async fn begin_authorization(
        &self,
        request: &AuthorizationRequest,
        browser: BrowserType,
    ) -> Result<String> {
        self.ensure_initialized()?;
        let client = self.provider.client();
        self.provider.profile().on_start_authorization(client)?;

        let mut request = request.clone();
        if request.locales.is_empty() {
            request.locales.clone_from(&self.locales);
        }

        let mcc_mnc = if self.provider.supports_network_authentication() {
            self.network.mcc_mnc()
        } else {
            None
        };

        let state = self.states.next_state();
        let context = AuthorizeContext {
            state: state.clone(),
            default_locale: self.default_locale.clone(),
            mcc_mnc,
            browser,
        };
        let uri = build_authorize_uri(&self.provider.authorize_endpoint(), client, &request, &context)?;

        {
            let _guard = self.tokens.lock().await;
            self.store.put(CredentialKey::PendingState, &state).await?;
        }
        *self.phase.write() = SessionState::AuthorizationPending;

        info!(
            profile = self.provider.profile().name(),
            browser = %browser,
            network_hint = context.mcc_mnc.is_some(),
            "Authorization started"
        );
        Ok(uri)
    }

    /// Finish authorization from the redirect the provider sent back
    ///
    /// Prefix, state and code are checked before any network call. A
    /// missing stored state is tolerated so externally started flows can
    /// complete.
    ///
    /// # Errors
    /// - `AuthError::InvalidRedirect` for a foreign URI or a missing code
    /// - `AuthError::StateMismatch` when `state` differs from the pending one
    /// - `AuthError::AuthorizationDenied` when the redirect carries `error`
    /// - Exchange, validation and storage failures of the token exchange
    pub async fn complete_authorization(&self, redirect_uri: &str) -> Result<Session> {
        self.ensure_initialized()?;
        let params = self.parse_redirect(redirect_uri)?;

        let guard = self.tokens.lock().await;

        if !self.state_matches(&params).await? {
            warn!("Redirect state does not match the pending authorization");
            return Err(AuthError::StateMismatch);
        }

        if let Some(error) = params.get(PARAM_ERROR) {
            self.store.remove(CredentialKey::PendingState).await?;
            self.settle();
            let description = params.get(PARAM_ERROR_DESCRIPTION).cloned();
            info!(error = %error, "Authorization denied by provider");
            return Err(AuthError::AuthorizationDenied(ProviderError::new(error, description)));
        }

        let code = params
            .get(PARAM_CODE)
            .filter(|code| !code.is_empty())
            .ok_or_else(|| AuthError::InvalidRedirect("redirect carries no code".into()))?;

        self.store.remove(CredentialKey::PendingState).await?;

        let result: Result<Session> = async {
            let issued = self.endpoint.exchange_code(&self.provider.token_endpoint(), code).await?;
            let session = self.provider.session_from(issued, None).await?;
            self.tokens.install(&guard, session.clone()).await?;
            Ok(session)
        }
        .await;

        match result {
            Ok(session) => {
                *self.phase.write() = SessionState::Authenticated;
                info!(subject = %session.subject(), "Authorization completed");
                Ok(session)
            }
            Err(e) => {
                warn!(error = %e, "Authorization failed");
                self.settle();
                Err(e)
            }
        }
    }

    fn parse_redirect(&self, redirect_uri: &str) -> Result<HashMap<String, String>> {
        let registered = self.provider.client().require_redirect_uri()?;
        if !redirect_uri.starts_with(registered) {
            return Err(AuthError::InvalidRedirect(
                "URI does not target the registered redirect URI".into(),
            ));
        }

        let url = Url::parse(redirect_uri)
            .map_err(|e| AuthError::InvalidRedirect(format!("unparseable redirect: {e}")))?;

        let mut params = HashMap::new();
        for (name, value) in url.query_pairs() {
            params.entry(name.into_owned()).or_insert_with(|| value.into_owned());
        }
        Ok(params)
    }

    /// Redirect `state` against the pending one; no pending state accepts any
    async fn state_matches(&self, params: &HashMap<String, String>) -> Result<bool> {
        match self.store.get(CredentialKey::PendingState).await? {
            Some(expected) => {
                Ok(params.get(PARAM_STATE).is_some_and(|actual| validate_state(&expected, actual)))
            }
            None => {
                debug!("No pending state stored, accepting redirect");
                Ok(true)
            }
        }
    }

    /// Whether `redirect_uri` would pass the redirect checks of
    /// [`SessionCoordinator::complete_authorization`]
    ///
    /// Checks the registered prefix, the pending `state` and a non-empty
    /// `code`. The pending state is read, never consumed.
    pub async fn has_valid_redirect(&self, redirect_uri: &str) -> bool {
        let Ok(params) = self.parse_redirect(redirect_uri) else {
            return false;
        };
        if !self.state_matches(&params).await.unwrap_or(false) {
            return false;
        }
        params.get(PARAM_CODE).is_some_and(|code| !code.is_empty())
    }

    /// Authorization code carried by `redirect_uri`, without side effects
    #[must_use]
    pub fn code_from_redirect(&self, redirect_uri: &str) -> Option<String> {
        self.parse_redirect(redirect_uri)
            .ok()
            .and_then(|mut params| params.remove(PARAM_CODE))
            .filter(|code| !code.is_empty())
    }

    /// Access token valid for at least the refresh leeway
    ///
    /// Concurrent callers share a single refresh.
    ///
    /// # Errors
    /// - `AuthError::NotInitialized` before initialization
    /// - `AuthError::NotAuthenticated` without a session
    /// - `AuthError::RefreshTokenMissing` when the token cannot be renewed
    /// - Refresh failures, which leave the stored session untouched
    pub async fn get_valid_access_token(&self) -> Result<String> {
        self.ensure_initialized()?;
        self.tokens.get_valid_access_token().await
    }

    /// Refresh now, regardless of expiry
    ///
    /// # Errors
    /// Same as [`SessionCoordinator::get_valid_access_token`].
    pub async fn update_tokens(&self) -> Result<String> {
        self.ensure_initialized()?;
        self.tokens.refresh().await
    }

    /// Current access token, possibly expired
    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.tokens.access_token()
    }

    #[must_use]
    pub fn access_token_expiration(&self) -> Option<DateTime<Utc>> {
        self.tokens.access_token_expiration()
    }

    #[must_use]
    pub fn identity_claims(&self) -> Option<IdentityClaims> {
        self.tokens.session().map(|s| s.claims)
    }

    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.tokens.session()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.tokens.is_authenticated()
    }

    /// Fetch the user-info document with a valid access token
    ///
    /// # Errors
    /// - `AuthError::Configuration` if the profile has no user-info endpoint
    /// - Any error of [`SessionCoordinator::get_valid_access_token`]
    /// - `AuthError::Network` / `AuthError::Exchange` from the request
    pub async fn fetch_user_info(&self) -> Result<Map<String, Value>> {
        let endpoint = self.provider.userinfo_endpoint().ok_or_else(|| {
            AuthError::Configuration("profile has no user-info endpoint".into())
        })?;
        let access_token = self.get_valid_access_token().await?;
        self.endpoint.fetch_user_info(&endpoint, &access_token).await
    }

    /// Forget the session and every stored credential
    ///
    /// Purely local; the provider is not contacted. A refresh still in
    /// flight completes without restoring the session.
    ///
    /// # Errors
    /// Returns `AuthError::Storage` if the store could not be cleared.
    pub async fn logout(&self) -> Result<()> {
        let result = self.tokens.clear().await;
        if self.state() != SessionState::Uninitialized {
            *self.phase.write() = SessionState::Idle;
        }
        info!(profile = self.provider.profile().name(), "Logged out");
        result
    }

    /// Start background refresh ahead of expiry
    ///
    /// The task stops once the coordinator is dropped.
    pub fn spawn_auto_refresh(&self) -> JoinHandle<()> {
        self.tokens.spawn_auto_refresh()
    }

    #[must_use]
    pub fn provider(&self) -> &IdentityProvider {
        &self.provider
    }
}

impl std::fmt::Debug for SessionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCoordinator")
            .field("profile", &self.provider.profile().name())
            .field("state", &self.state())
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}

/// Builder for [`SessionCoordinator`]
///
/// Every collaborator has a default: a `reqwest` token client, an
/// in-memory credential store, discovery at the profile's well-known URL,
/// random state values and no cellular network information.
pub struct SessionCoordinatorBuilder {
    profile: AuthProfile,
    client: ClientConfig,
    http: Option<Client>,
    endpoint: Option<Arc<dyn TokenEndpoint>>,
    store: Option<Arc<dyn CredentialStore>>,
    discovery: Option<Arc<DiscoveryClient>>,
    keys: VerificationKeys,
    states: Arc<dyn StateSource>,
    network: Arc<dyn NetworkInfo>,
    locales: Vec<String>,
    default_locale: String,
    leeway_secs: i64,
}

impl SessionCoordinatorBuilder {
    fn new(profile: AuthProfile, client: ClientConfig) -> Self {
        Self {
            profile,
            client,
            http: None,
            endpoint: None,
            store: None,
            discovery: None,
            keys: VerificationKeys::new(),
            states: Arc::new(RandomStateSource),
            network: Arc::new(NoNetworkInfo),
            locales: Vec::new(),
            default_locale: DEFAULT_LOCALE.to_string(),
            leeway_secs: DEFAULT_REFRESH_LEEWAY_SECS,
        }
    }

    /// HTTP client shared by the default token client and discovery
    #[must_use]
    pub fn http_client(mut self, http: Client) -> Self {
        self.http = Some(http);
        self
    }

    #[must_use]
    pub fn token_endpoint(mut self, endpoint: Arc<dyn TokenEndpoint>) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    #[must_use]
    pub fn credential_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn discovery(mut self, discovery: Arc<DiscoveryClient>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    /// Keys identity tokens are verified against before any JWKS fetch
    #[must_use]
    pub fn verification_keys(mut self, keys: VerificationKeys) -> Self {
        self.keys = keys;
        self
    }

    #[must_use]
    pub fn state_source(mut self, states: Arc<dyn StateSource>) -> Self {
        self.states = states;
        self
    }

    #[must_use]
    pub fn network_info(mut self, network: Arc<dyn NetworkInfo>) -> Self {
        self.network = network;
        self
    }

    /// Accepted UI locales used when a request brings none
    #[must_use]
    pub fn locales(mut self, locales: Vec<String>) -> Self {
        self.locales = locales;
        self
    }

    #[must_use]
    pub fn default_locale(mut self, locale: impl Into<String>) -> Self {
        self.default_locale = locale.into();
        self
    }

    #[must_use]
    pub fn refresh_leeway_secs(mut self, leeway_secs: i64) -> Self {
        self.leeway_secs = leeway_secs;
        self
    }

    /// # Errors
    /// Returns `AuthError::Configuration` if a default HTTP client is needed
    /// and cannot be built.
    pub fn build(self) -> Result<SessionCoordinator> {
        let http = match self.http {
            Some(http) => http,
            None => default_http_client()?,
        };

        let discovery = self.discovery.unwrap_or_else(|| {
            Arc::new(DiscoveryClient::new(http.clone(), self.profile.well_known_endpoint()))
        });
        let endpoint = self
            .endpoint
            .unwrap_or_else(|| Arc::new(TokenClient::new(http, self.client.clone())));
        let store = self.store.unwrap_or_else(|| Arc::new(MemoryCredentialStore::new()));

        let provider =
            Arc::new(IdentityProvider::new(self.profile, self.client, discovery, self.keys));
        let tokens = Arc::new(TokenManager::new(
            Arc::clone(&endpoint),
            Arc::clone(&store),
            Arc::clone(&provider),
            self.leeway_secs,
        ));

        Ok(SessionCoordinator {
            provider,
            endpoint,
            store,
            tokens,
            states: self.states,
            network: self.network,
            locales: self.locales,
            default_locale: self.default_locale,
            phase: RwLock::new(SessionState::Uninitialized),
        })
    }
}
