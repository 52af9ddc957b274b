//! Identity provider profiles
//!
//! A profile captures how the engine integrates with one kind of provider:
//! where its endpoints live, which issuer and audience its identity tokens
//! carry, and what it insists on in a token response. Profiles are chosen
//! at construction time; nothing in the engine branches on the concrete
//! provider elsewhere.

use connectid_domain::constants::{
    AUTHORIZE_PATH, OAUTH_PATH, OPENID_CONFIGURATION_PATH, PRODUCTION_API_HOST,
    STAGING_API_HOST, TOKEN_PATH, USERINFO_PATH,
};
use connectid_domain::{
    AuthError, ClientConfig, ConnectConfig, Environment, ProfileSettings, ProviderConfig,
    ProviderError, Result,
};

use super::types::TokenResponse;

/// Largest accepted `expires_in`
const MAX_EXPIRES_IN_SECS: i64 = u32::MAX as i64;

/// Provider integration style
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthProfile {
    /// First-party provider with endpoints at fixed paths below `api_url`
    Connect {
        environment: Environment,
        /// Base URL with a trailing slash
        api_url: String,
    },

    /// Mobile operator provider whose endpoints were resolved by an operator
    /// discovery step outside the engine
    Operator {
        issuer: String,
        authorization_endpoint: String,
        token_endpoint: String,
        userinfo_endpoint: Option<String>,
        well_known: Option<String>,
    },
}

impl AuthProfile {
    /// Connect profile on the environment's default host
    #[must_use]
    pub fn connect(environment: Environment) -> Self {
        Self::Connect { environment, api_url: environment.api_url() }
    }

    #[must_use]
    pub fn from_config(config: &ConnectConfig) -> Self {
        match &config.profile {
            ProfileSettings::Connect => Self::Connect {
                environment: config.environment,
                api_url: config.effective_api_url(),
            },
            ProfileSettings::Operator {
                issuer,
                authorization_endpoint,
                token_endpoint,
                userinfo_endpoint,
                well_known,
            } => Self::Operator {
                issuer: issuer.clone(),
                authorization_endpoint: authorization_endpoint.clone(),
                token_endpoint: token_endpoint.clone(),
                userinfo_endpoint: userinfo_endpoint.clone(),
                well_known: well_known.clone(),
            },
        }
    }

    /// Short name used in logs
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::Operator { .. } => "operator",
        }
    }

    /// Base URL of the provider API, with a trailing slash
    #[must_use]
    pub fn api_url(&self) -> String {
        match self {
            Self::Connect { api_url, .. } => api_url.clone(),
            Self::Operator { issuer, .. } if issuer.ends_with('/') => issuer.clone(),
            Self::Operator { issuer, .. } => format!("{issuer}/"),
        }
    }

    /// Authorization endpoint, preferring the discovered one
    #[must_use]
    pub fn authorize_endpoint(&self, discovered: Option<&ProviderConfig>) -> String {
        if let Some(endpoint) = discovered.and_then(|c| c.authorization_endpoint.clone()) {
            return endpoint;
        }
        match self {
            Self::Connect { api_url, .. } => format!("{api_url}{AUTHORIZE_PATH}"),
            Self::Operator { authorization_endpoint, .. } => authorization_endpoint.clone(),
        }
    }

    /// Token endpoint, preferring the discovered one
    #[must_use]
    pub fn token_endpoint(&self, discovered: Option<&ProviderConfig>) -> String {
        if let Some(endpoint) = discovered.and_then(|c| c.token_endpoint.clone()) {
            return endpoint;
        }
        match self {
            Self::Connect { api_url, .. } => format!("{api_url}{TOKEN_PATH}"),
            Self::Operator { token_endpoint, .. } => token_endpoint.clone(),
        }
    }

    /// User-info endpoint, preferring the discovered one
    #[must_use]
    pub fn userinfo_endpoint(&self, discovered: Option<&ProviderConfig>) -> Option<String> {
        if let Some(endpoint) = discovered.and_then(|c| c.userinfo_endpoint.clone()) {
            return Some(endpoint);
        }
        match self {
            Self::Connect { api_url, .. } => Some(format!("{api_url}{USERINFO_PATH}")),
            Self::Operator { userinfo_endpoint, .. } => userinfo_endpoint.clone(),
        }
    }

    /// Discovery document URL; `None` when the provider has none
    ///
    /// On staging the production host is swapped for the staging host, so an
    /// `api_url` override that still names production resolves correctly.
    #[must_use]
    pub fn well_known_endpoint(&self) -> Option<String> {
        match self {
            Self::Connect { environment, api_url } => {
                let endpoint = format!("{api_url}{OAUTH_PATH}/{OPENID_CONFIGURATION_PATH}");
                Some(match environment {
                    Environment::Production => endpoint,
                    Environment::Staging => {
                        endpoint.replace(PRODUCTION_API_HOST, STAGING_API_HOST)
                    }
                })
            }
            Self::Operator { well_known, .. } => well_known.clone(),
        }
    }

    /// Issuer identity tokens must carry
    #[must_use]
    pub fn expected_issuer(&self, discovered: Option<&ProviderConfig>) -> String {
        if let Some(config) = discovered {
            return config.issuer.clone();
        }
        match self {
            Self::Connect { api_url, .. } => format!("{api_url}{OAUTH_PATH}"),
            Self::Operator { issuer, .. } => issuer.clone(),
        }
    }

    /// Audiences accepted in identity tokens: the client itself
    ///
    /// # Errors
    /// Returns `AuthError::Configuration` if the client id is missing.
    pub fn expected_audiences(&self, client: &ClientConfig) -> Result<Vec<String>> {
        Ok(vec![client.require_client_id()?.to_string()])
    }

    /// Precondition check run before an authorization URI is built
    ///
    /// # Errors
    /// Returns `AuthError::Configuration` when an operator profile is used
    /// without a confidential client secret.
    pub fn on_start_authorization(&self, client: &ClientConfig) -> Result<()> {
        match self {
            Self::Connect { .. } => Ok(()),
            Self::Operator { .. } if client.token_secret().is_some() => Ok(()),
            Self::Operator { .. } => Err(AuthError::Configuration(
                "operator profile requires a confidential client with a secret".into(),
            )),
        }
    }

    /// Whether every session of this profile must hold a refresh token
    #[must_use]
    pub fn requires_refresh_token(&self) -> bool {
        matches!(self, Self::Connect { .. })
    }

    /// Reject token responses missing fields this profile depends on
    ///
    /// `fallback_refresh_token` is the refresh token already held, if any;
    /// refresh responses may omit a new one.
    ///
    /// # Errors
    /// Returns `AuthError::Exchange` with `invalid_token_response`.
    pub fn validate_token_response(
        &self,
        response: &TokenResponse,
        fallback_refresh_token: Option<&str>,
    ) -> Result<()> {
        if response.access_token.is_empty() {
            return Err(invalid_token_response("access_token"));
        }
        if response.expires_in.is_some_and(|secs| !(0..=MAX_EXPIRES_IN_SECS).contains(&secs)) {
            return Err(AuthError::Exchange(ProviderError::new(
                "invalid_token_response",
                Some("expires_in out of range".into()),
            )));
        }
        if !self.requires_refresh_token() {
            return Ok(());
        }

        let refresh_token = response
            .refresh_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .or(fallback_refresh_token.filter(|t| !t.is_empty()));
        if refresh_token.is_none() {
            return Err(invalid_token_response("refresh_token"));
        }
        if response.expires_in.is_none() {
            return Err(invalid_token_response("expires_in"));
        }
        Ok(())
    }
}

fn invalid_token_response(field: &str) -> AuthError {
    AuthError::Exchange(ProviderError::new(
        "invalid_token_response",
        Some(format!("missing {field}")),
    ))
}
