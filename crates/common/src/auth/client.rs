//! Token exchange client
//!
//! Handles the programmatic half of the authorization-code flow:
//! - Authorization code exchange
//! - Refresh token exchange
//! - User-info lookup with the bearer token
//!
//! Transport failures (including timeouts) surface as `AuthError::Network`
//! and are safe to retry. Explicit provider rejections surface as
//! `AuthError::Exchange` and must not be retried with the same code.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use connectid_domain::constants::{
    DEFAULT_HTTP_TIMEOUT_SECS, GRANT_AUTHORIZATION_CODE, GRANT_REFRESH_TOKEN, PARAM_CLIENT_ID,
    PARAM_REDIRECT_URI,
};
use connectid_domain::{AuthError, ClientConfig, ProviderError, Result};
use reqwest::header::DATE;
use reqwest::{Client, Response};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::traits::TokenEndpoint;
use super::types::{IssuedTokens, TokenResponse};

/// Longest slice of an unparseable error body carried into the error.
const MAX_ERROR_BODY: usize = 256;

/// Token endpoint client over `reqwest`
///
/// Holds the registered client credentials; the endpoint URL is supplied per
/// call because it may change once discovery completes.
#[derive(Debug, Clone)]
pub struct TokenClient {
    http: Client,
    client: ClientConfig,
}

impl TokenClient {
    /// Create a token client sharing an existing HTTP client
    #[must_use]
    pub fn new(http: Client, client: ClientConfig) -> Self {
        Self { http, client }
    }

    /// Create a token client with its own HTTP client and request timeout
    ///
    /// # Errors
    /// Returns `AuthError::Configuration` if the HTTP client cannot be built
    /// (e.g. TLS backend initialisation failure).
    pub fn with_timeout(client: ClientConfig, timeout: Duration) -> Result<Self> {
        Ok(Self::new(build_http_client(timeout)?, client))
    }

    /// Get the registered client credentials
    #[must_use]
    pub fn client(&self) -> &ClientConfig {
        &self.client
    }

    fn credentials(&self) -> Result<Vec<(&'static str, String)>> {
        let mut form = vec![(PARAM_CLIENT_ID, self.client.require_client_id()?.to_string())];
        if let Some(secret) = self.client.token_secret() {
            form.push(("client_secret", secret.to_string()));
        }
        Ok(form)
    }

    async fn post_form(
        &self,
        endpoint: &str,
        form: &[(&'static str, String)],
        grant_type: &'static str,
    ) -> Result<IssuedTokens> {
        debug!(url = %endpoint, grant_type, "Posting token request");

        let response = self.http.post(endpoint).form(form).send().await.map_err(network_error)?;
        let server_time = server_time(&response);
        let body = read_success_body(response).await?;

        let response: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            AuthError::Exchange(ProviderError::new("invalid_response", Some(e.to_string())))
        })?;

        debug!(
            grant_type,
            has_refresh_token = response.refresh_token.is_some(),
            has_id_token = response.id_token.is_some(),
            expires_in = ?response.expires_in,
            "Token request succeeded"
        );

        Ok(IssuedTokens { response, server_time })
    }
}

#[async_trait]
impl TokenEndpoint for TokenClient {
    async fn exchange_code(&self, endpoint: &str, code: &str) -> Result<IssuedTokens> {
        let mut form = vec![
            ("grant_type", GRANT_AUTHORIZATION_CODE.to_string()),
            ("code", code.to_string()),
            (PARAM_REDIRECT_URI, self.client.require_redirect_uri()?.to_string()),
        ];
        form.extend(self.credentials()?);

        self.post_form(endpoint, &form, GRANT_AUTHORIZATION_CODE).await
    }

    async fn refresh(&self, endpoint: &str, refresh_token: &str) -> Result<IssuedTokens> {
        if refresh_token.is_empty() {
            return Err(AuthError::RefreshTokenMissing);
        }

        let mut form = vec![
            ("grant_type", GRANT_REFRESH_TOKEN.to_string()),
            ("refresh_token", refresh_token.to_string()),
        ];
        form.extend(self.credentials()?);

        self.post_form(endpoint, &form, GRANT_REFRESH_TOKEN).await
    }

    async fn fetch_user_info(
        &self,
        endpoint: &str,
        access_token: &str,
    ) -> Result<Map<String, Value>> {
        debug!(url = %endpoint, "Fetching user info");

        let response =
            self.http.get(endpoint).bearer_auth(access_token).send().await.map_err(network_error)?;
        let body = read_success_body(response).await?;

        match serde_json::from_str::<Value>(&body) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(AuthError::Exchange(ProviderError::new(
                "invalid_response",
                Some("user info is not a JSON object".into()),
            ))),
            Err(e) => Err(AuthError::Exchange(ProviderError::new(
                "invalid_response",
                Some(e.to_string()),
            ))),
        }
    }
}

/// Build the shared HTTP client used for every provider call
///
/// # Errors
/// Returns `AuthError::Configuration` if the client cannot be built.
pub fn build_http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AuthError::Configuration(format!("failed to build HTTP client: {e}")))
}

/// HTTP client with the default request timeout
///
/// # Errors
/// Returns `AuthError::Configuration` if the client cannot be built.
pub fn default_http_client() -> Result<Client> {
    build_http_client(Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS))
}

pub(crate) fn network_error(err: reqwest::Error) -> AuthError {
    if err.is_timeout() {
        AuthError::Network(format!("request timed out: {err}"))
    } else {
        AuthError::Network(err.to_string())
    }
}

/// Read the body of a 2xx response, or turn any other status into
/// `AuthError::Exchange` carrying the provider's error payload
async fn read_success_body(response: Response) -> Result<String> {
    let status = response.status();
    let body = response.text().await.map_err(network_error)?;

    if status.is_success() {
        return Ok(body);
    }

    let error = match serde_json::from_str::<ProviderError>(&body) {
        Ok(error) => error,
        Err(_) => {
            let snippet: String = body.chars().take(MAX_ERROR_BODY).collect();
            ProviderError::new(
                status.canonical_reason().unwrap_or("http_error").to_ascii_lowercase(),
                (!snippet.is_empty()).then_some(snippet),
            )
        }
    }
    .with_status(status.as_u16());

    warn!(status = status.as_u16(), error = %error.error, "Provider rejected request");
    Err(AuthError::Exchange(error))
}

fn server_time(response: &Response) -> Option<DateTime<Utc>> {
    let value = response.headers().get(DATE)?.to_str().ok()?;
    DateTime::parse_from_rfc2822(value).ok().map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    //! Unit tests for auth::client.
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn client_config(confidential: bool) -> ClientConfig {
        ClientConfig {
            client_id: Some("abc".into()),
            redirect_uri: Some("app://cb".into()),
            confidential,
            client_secret: Some("s3cret".into()),
        }
    }

    fn token_client(confidential: bool) -> TokenClient {
        TokenClient::with_timeout(client_config(confidential), Duration::from_secs(5)).unwrap()
    }

    /// Validates `TokenClient::exchange_code` behavior for the successful
    /// exchange scenario.
    ///
    /// Assertions:
    /// - Confirms the form carries grant type, code, redirect URI and client
    ///   id (wiremock matchers).
    /// - Confirms the server `Date` header is captured.
    #[tokio::test]
    async fn test_exchange_code_posts_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=XYZ"))
            .and(body_string_contains("redirect_uri=app%3A%2F%2Fcb"))
            .and(body_string_contains("client_id=abc"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Date", "Tue, 15 Nov 1994 08:12:31 GMT")
                    .set_body_json(serde_json::json!({
                        "access_token": "AT",
                        "refresh_token": "RT",
                        "expires_in": 3600
                    })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let issued = token_client(false)
            .exchange_code(&format!("{}/oauth/token", server.uri()), "XYZ")
            .await
            .unwrap();

        assert_eq!(issued.response.access_token, "AT");
        assert_eq!(issued.server_time.map(|t| t.timestamp()), Some(784_887_151));
    }

    #[tokio::test]
    async fn test_public_client_never_sends_secret() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"access_token": "AT", "expires_in": 60})),
            )
            .mount(&server)
            .await;

        token_client(false).refresh(&server.uri(), "RT").await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let body = String::from_utf8_lossy(&requests[0].body).to_string();
        assert!(body.contains("grant_type=refresh_token"));
        assert!(body.contains("refresh_token=RT"));
        assert!(!body.contains("client_secret"));
    }

    #[tokio::test]
    async fn test_confidential_client_sends_secret() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("client_secret=s3cret"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"access_token": "AT", "expires_in": 60})),
            )
            .expect(1)
            .mount(&server)
            .await;

        token_client(true).refresh(&server.uri(), "RT").await.unwrap();
    }

    /// Validates `TokenClient::exchange_code` behavior for the provider
    /// rejection scenario.
    ///
    /// Assertions:
    /// - Confirms the provider's error payload and status are carried in
    ///   `AuthError::Exchange`.
    #[tokio::test]
    async fn test_error_payload_is_preserved() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "code expired"
            })))
            .mount(&server)
            .await;

        let err = token_client(false).exchange_code(&server.uri(), "XYZ").await.unwrap_err();

        let AuthError::Exchange(provider) = err else { panic!("expected exchange error") };
        assert_eq!(provider.error, "invalid_grant");
        assert_eq!(provider.error_description.as_deref(), Some("code expired"));
        assert_eq!(provider.status, Some(400));
    }

    #[tokio::test]
    async fn test_malformed_success_body_is_exchange_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = token_client(false).exchange_code(&server.uri(), "XYZ").await.unwrap_err();

        assert!(matches!(err, AuthError::Exchange(ref e) if e.error == "invalid_response"));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_network_error() {
        // Port 9 (discard) is not expected to accept HTTP
        let err = token_client(false).exchange_code("http://127.0.0.1:9/token", "XYZ").await;

        assert!(matches!(err, Err(AuthError::Network(_))));
    }

    #[tokio::test]
    async fn test_refresh_with_empty_token() {
        let result = token_client(false).refresh("http://127.0.0.1:9/token", "").await;
        assert!(matches!(result, Err(AuthError::RefreshTokenMissing)));
    }

    #[tokio::test]
    async fn test_user_info_uses_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/oauth/userinfo"))
            .and(header("authorization", "Bearer AT"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"sub": "42", "email": "a@b.c"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let info = token_client(false)
            .fetch_user_info(&format!("{}/oauth/userinfo", server.uri()), "AT")
            .await
            .unwrap();

        assert_eq!(info.get("sub").and_then(Value::as_str), Some("42"));
    }
}
