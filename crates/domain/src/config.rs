//! Configuration structures for the authorization engine
//!
//! Every field carries a serde default so partial TOML/JSON files load.
//! Missing client id or redirect URI is not a load error; it surfaces as
//! [`AuthError::Configuration`] once authorization is attempted.

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_ACCOUNT, DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_KEYCHAIN_SERVICE, DEFAULT_LOCALE,
    DEFAULT_REFRESH_LEEWAY_SECS, PRODUCTION_API_HOST, STAGING_API_HOST,
};
use crate::errors::{AuthError, Result};
use crate::impl_str_enum_conversions;

/// Provider deployment targeted by the `connect` profile
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    #[default]
    Production,
    Staging,
}

impl_str_enum_conversions!(Environment {
    Production => "production",
    Staging => "staging",
});

impl Environment {
    #[must_use]
    pub fn host(self) -> &'static str {
        match self {
            Self::Production => PRODUCTION_API_HOST,
            Self::Staging => STAGING_API_HOST,
        }
    }

    /// Base API URL with a trailing slash
    #[must_use]
    pub fn api_url(self) -> String {
        format!("https://{}/", self.host())
    }
}

/// Registered client credentials
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,

    /// Confidential clients authenticate at the token endpoint
    pub confidential: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
}

impl ClientConfig {
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if the client id is absent or empty.
    pub fn require_client_id(&self) -> Result<&str> {
        non_empty(self.client_id.as_deref())
            .ok_or_else(|| AuthError::Configuration("client_id is not configured".into()))
    }

    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if the redirect URI is absent or
    /// empty.
    pub fn require_redirect_uri(&self) -> Result<&str> {
        non_empty(self.redirect_uri.as_deref())
            .ok_or_else(|| AuthError::Configuration("redirect_uri is not configured".into()))
    }

    /// Secret sent with token requests, only for confidential clients
    #[must_use]
    pub fn token_secret(&self) -> Option<&str> {
        if self.confidential {
            non_empty(self.client_secret.as_deref())
        } else {
            None
        }
    }
}

/// Which provider profile the engine talks to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProfileSettings {
    /// The first-party identity provider, endpoints derived from the API URL
    #[default]
    Connect,

    /// A mobile operator provider with endpoints resolved ahead of time
    Operator {
        issuer: String,
        authorization_endpoint: String,
        token_endpoint: String,
        #[serde(default)]
        userinfo_endpoint: Option<String>,
        #[serde(default)]
        well_known: Option<String>,
    },
}

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectConfig {
    pub client: ClientConfig,
    pub environment: Environment,

    /// Overrides the environment's API URL
    pub api_url: Option<String>,

    pub profile: ProfileSettings,

    /// Preferred UI locales, most preferred first
    pub locales: Vec<String>,
    pub default_locale: String,

    /// Refresh this many seconds before the access token expires
    pub refresh_leeway_secs: i64,
    pub http_timeout_secs: u64,

    pub keychain_service: String,
    pub account: String,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            client: ClientConfig::default(),
            environment: Environment::default(),
            api_url: None,
            profile: ProfileSettings::default(),
            locales: Vec::new(),
            default_locale: DEFAULT_LOCALE.to_string(),
            refresh_leeway_secs: DEFAULT_REFRESH_LEEWAY_SECS,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            keychain_service: DEFAULT_KEYCHAIN_SERVICE.to_string(),
            account: DEFAULT_ACCOUNT.to_string(),
        }
    }
}

impl ConnectConfig {
    /// API URL in effect: the explicit override or the environment default,
    /// always with a trailing slash
    #[must_use]
    pub fn effective_api_url(&self) -> String {
        match non_empty(self.api_url.as_deref()) {
            Some(url) if url.ends_with('/') => url.to_string(),
            Some(url) => format!("{url}/"),
            None => self.environment.api_url(),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_target_production() {
        let config = ConnectConfig::default();

        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.effective_api_url(), "https://connect.telenordigital.com/");
        assert_eq!(config.refresh_leeway_secs, 60);
        assert_eq!(config.profile, ProfileSettings::Connect);
    }

    #[test]
    fn test_api_url_override_gains_trailing_slash() {
        let config = ConnectConfig {
            api_url: Some("http://127.0.0.1:8080".into()),
            ..ConnectConfig::default()
        };

        assert_eq!(config.effective_api_url(), "http://127.0.0.1:8080/");
    }

    #[test]
    fn test_missing_client_fields_are_configuration_errors() {
        let client = ClientConfig { client_id: Some("  ".into()), ..ClientConfig::default() };

        assert!(matches!(client.require_client_id(), Err(AuthError::Configuration(_))));
        assert!(matches!(client.require_redirect_uri(), Err(AuthError::Configuration(_))));
    }

    #[test]
    fn test_secret_only_for_confidential_clients() {
        let mut client = ClientConfig {
            client_id: Some("abc".into()),
            client_secret: Some("s3cret".into()),
            ..ClientConfig::default()
        };
        assert_eq!(client.token_secret(), None);

        client.confidential = true;
        assert_eq!(client.token_secret(), Some("s3cret"));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ConnectConfig = serde_json::from_str(
            r#"{
                "client": { "client_id": "abc" },
                "environment": "staging",
                "profile": {
                    "kind": "operator",
                    "issuer": "https://op.example",
                    "authorization_endpoint": "https://op.example/authorize",
                    "token_endpoint": "https://op.example/token"
                }
            }"#,
        )
        .unwrap();

        assert_eq!(config.client.client_id.as_deref(), Some("abc"));
        assert_eq!(config.effective_api_url(), "https://connect.staging.telenordigital.com/");
        assert!(matches!(config.profile, ProfileSettings::Operator { userinfo_endpoint: None, .. }));
        assert_eq!(config.default_locale, "en_US");
    }
}
