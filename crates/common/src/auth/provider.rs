//! Profile bound to a client, a discovery cache and signing keys
//!
//! Everything the coordinator needs to know about "the provider" in one
//! place: resolved endpoints, expected issuer and audiences, and identity
//! token verification with a one-shot signing key refresh.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use connectid_domain::{
    AuthError, ClientConfig, IdentityClaims, ProviderConfig, Result, Session, TokenSet,
    ValidationError,
};
use tracing::{debug, warn};

use super::discovery::DiscoveryClient;
use super::profile::AuthProfile;
use super::types::IssuedTokens;
use super::validator::{TokenValidator, VerificationKeys};

#[derive(Debug)]
pub struct IdentityProvider {
    profile: AuthProfile,
    client: ClientConfig,
    discovery: Arc<DiscoveryClient>,
    validator: TokenValidator,
}

impl IdentityProvider {
    #[must_use]
    pub fn new(
        profile: AuthProfile,
        client: ClientConfig,
        discovery: Arc<DiscoveryClient>,
        keys: VerificationKeys,
    ) -> Self {
        Self { profile, client, discovery, validator: TokenValidator::new(keys) }
    }

    #[must_use]
    pub fn profile(&self) -> &AuthProfile {
        &self.profile
    }

    #[must_use]
    pub fn client(&self) -> &ClientConfig {
        &self.client
    }

    #[must_use]
    pub fn discovery(&self) -> &Arc<DiscoveryClient> {
        &self.discovery
    }

    #[must_use]
    pub fn validator(&self) -> &TokenValidator {
        &self.validator
    }

    fn discovered(&self) -> Option<ProviderConfig> {
        self.discovery.current()
    }

    #[must_use]
    pub fn authorize_endpoint(&self) -> String {
        self.profile.authorize_endpoint(self.discovered().as_ref())
    }

    #[must_use]
    pub fn token_endpoint(&self) -> String {
        self.profile.token_endpoint(self.discovered().as_ref())
    }

    #[must_use]
    pub fn userinfo_endpoint(&self) -> Option<String> {
        self.profile.userinfo_endpoint(self.discovered().as_ref())
    }

    #[must_use]
    pub fn expected_issuer(&self) -> String {
        self.profile.expected_issuer(self.discovered().as_ref())
    }

    /// Whether the discovered provider supports network-based login hints
    #[must_use]
    pub fn supports_network_authentication(&self) -> bool {
        self.discovered().is_some_and(|c| c.supports_network_authentication())
    }

    /// Validate an identity token as of `now`
    ///
    /// A signature failure triggers one refresh of the provider's JWK set
    /// (resolving discovery first if it has not completed) followed by a
    /// second validation attempt.
    ///
    /// # Errors
    /// Returns `AuthError::Validation` for any failed validation step and
    /// `AuthError::Configuration` if the client id is missing.
    pub async fn verify_identity(&self, id_token: &str, now: DateTime<Utc>) -> Result<IdentityClaims> {
        let audiences = self.profile.expected_audiences(&self.client)?;

        match self.validator.validate(id_token, &self.expected_issuer(), &audiences, now) {
            Err(ValidationError::Signature(reason)) => {
                let Some(jwks_uri) = self.jwks_uri().await else {
                    return Err(ValidationError::Signature(reason).into());
                };

                match self.discovery.fetch_jwks(&jwks_uri).await {
                    Ok(jwks) => self.validator.replace_jwks(jwks),
                    Err(e) => {
                        warn!(url = %jwks_uri, error = %e, "Signing key refresh failed");
                        return Err(ValidationError::Signature(reason).into());
                    }
                }

                debug!("Retrying identity token validation with refreshed keys");
                Ok(self.validator.validate(id_token, &self.expected_issuer(), &audiences, now)?)
            }
            other => Ok(other?),
        }
    }

    async fn jwks_uri(&self) -> Option<String> {
        let config = match self.discovered() {
            Some(config) => Some(config),
            None => self.discovery.resolve().await,
        };
        config.and_then(|c| c.jwks_uri)
    }

    /// Turn a token endpoint response into a validated session
    ///
    /// With `previous` set (a refresh), omitted refresh and identity tokens
    /// are carried over; a new identity token is always validated, against
    /// the server's clock when the response reported one.
    ///
    /// # Errors
    /// Returns `AuthError::Exchange` when the profile rejects the response
    /// and `AuthError::Validation` when the identity token is missing or
    /// invalid.
    pub async fn session_from(
        &self,
        issued: IssuedTokens,
        previous: Option<&Session>,
    ) -> Result<Session> {
        let IssuedTokens { response, server_time } = issued;
        let fallback_refresh = previous.and_then(|s| s.tokens.refresh_token.as_deref());
        self.profile.validate_token_response(&response, fallback_refresh)?;

        let mut tokens = response.into_token_set(Utc::now());
        if tokens.refresh_token.is_none() {
            tokens.refresh_token = fallback_refresh.map(ToOwned::to_owned);
        }

        let claims = match (tokens.id_token.clone(), previous) {
            (Some(id_token), _) => {
                self.verify_identity(&id_token, server_time.unwrap_or_else(Utc::now)).await?
            }
            (None, Some(previous)) => {
                tokens.id_token.clone_from(&previous.tokens.id_token);
                previous.claims.clone()
            }
            (None, None) => {
                return Err(ValidationError::MalformedToken(
                    "token response carries no id_token".into(),
                )
                .into())
            }
        };

        Ok(Session::new(tokens, claims))
    }

    /// Rebuild a session from persisted tokens
    ///
    /// The identity token is validated as of the set's issuance, so a
    /// session whose access token has since expired can still be restored
    /// and refreshed.
    ///
    /// # Errors
    /// Returns `AuthError::Validation` if the identity token is missing or
    /// no longer verifies.
    pub async fn restore(&self, tokens: TokenSet) -> Result<Session> {
        let Some(id_token) = tokens.id_token.clone() else {
            return Err(AuthError::Validation(ValidationError::MalformedToken(
                "stored credentials carry no id_token".into(),
            )));
        };
        let claims = self.verify_identity(&id_token, tokens.issued_at).await?;
        Ok(Session::new(tokens, claims))
    }
}
