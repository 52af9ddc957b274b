//! Integration tests for the auth module over HTTP
//!
//! Drives the real token client and discovery client against a wiremock
//! provider: discovery, signing key retrieval, code exchange, refresh
//! coalescing and user info.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use connectid_common::auth::{
    AuthProfile, FixedStateSource, SessionCoordinator, VerificationKeys,
};
use connectid_common::testing::{claims, sign_hs256, TEST_HMAC_SECRET};
use connectid_domain::{
    AuthError, AuthorizationRequest, BrowserType, ClientConfig, Environment, SessionState,
    ValidationError,
};
use serde_json::{json, Value};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const WELL_KNOWN: &str = "/oauth/.well-known/openid-configuration";

fn client() -> ClientConfig {
    ClientConfig {
        client_id: Some("abc".into()),
        redirect_uri: Some("app://cb".into()),
        ..ClientConfig::default()
    }
}

fn issuer(server: &MockServer) -> String {
    format!("{}/oauth", server.uri())
}

fn profile(server: &MockServer) -> AuthProfile {
    AuthProfile::Connect { environment: Environment::Production, api_url: format!("{}/", server.uri()) }
}

fn id_token(server: &MockServer, ttl_secs: i64) -> String {
    sign_hs256(&claims(&issuer(server), "abc", "user-1", ttl_secs), TEST_HMAC_SECRET)
}

fn token_body(server: &MockServer, access: &str, expires_in: i64) -> Value {
    json!({
        "access_token": access,
        "refresh_token": "RT",
        "id_token": id_token(server, 3600),
        "token_type": "Bearer",
        "scope": "openid profile",
        "expires_in": expires_in,
    })
}

/// Provider advertising its signing keys; the coordinator starts without any
async fn mount_discovery(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(WELL_KNOWN))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issuer": issuer(server),
            "token_endpoint": format!("{}/oauth/token", server.uri()),
            "userinfo_endpoint": format!("{}/oauth/userinfo", server.uri()),
            "jwks_uri": format!("{}/oauth/jwks", server.uri()),
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/oauth/jwks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "keys": [{ "kty": "oct", "kid": "k1", "alg": "HS256", "k": "Y29ubmVjdGlkLXNoYXJlZC1zZWNyZXQh" }]
        })))
        .mount(server)
        .await;
}

async fn requests_to(server: &MockServer, endpoint: &str) -> usize {
    let requests = server.received_requests().await.unwrap_or_default();
    requests.iter().filter(|request| request.url.path() == endpoint).count()
}

async fn coordinator(server: &MockServer) -> SessionCoordinator {
    let coordinator = SessionCoordinator::builder(profile(server), client())
        .http_client(reqwest::Client::new())
        .state_source(Arc::new(FixedStateSource("s1".into())))
        .build()
        .unwrap();
    coordinator.initialize().await.unwrap();
    coordinator.provider().discovery().resolve().await.unwrap();
    coordinator
}

/// Validates the end-to-end authorization scenario.
///
/// Assertions:
/// - Confirms the authorization URI carries the managed parameters in order.
/// - Confirms the code is exchanged with the registered redirect URI.
/// - Confirms the identity token validates after fetching the provider's
///   signing keys once.
/// - Confirms the session is authenticated with access token "AT".
#[tokio::test]
async fn test_authorization_code_flow_end_to_end() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=XYZ"))
        .and(body_string_contains("redirect_uri=app%3A%2F%2Fcb"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(&server, "AT", 3600)))
        .expect(1)
        .mount(&server)
        .await;

    let coordinator = coordinator(&server).await;

    let uri = coordinator
        .begin_authorization(&AuthorizationRequest::with_scopes(&["profile"]), BrowserType::WebView)
        .await
        .unwrap();
    assert!(uri.starts_with(&format!("{}/oauth/authorize?", server.uri())));
    assert!(uri.contains(
        "client_id=abc&redirect_uri=app%3A%2F%2Fcb&scope=profile&state=s1&response_type=code"
    ));

    let session = coordinator.complete_authorization("app://cb?code=XYZ&state=s1").await.unwrap();

    assert_eq!(session.access_token(), "AT");
    assert_eq!(session.subject(), "user-1");
    assert_eq!(session.tokens.scope, vec!["openid".to_string(), "profile".to_string()]);
    assert_eq!(coordinator.state(), SessionState::Authenticated);
    assert_eq!(coordinator.get_valid_access_token().await.unwrap(), "AT");
    assert_eq!(requests_to(&server, "/oauth/jwks").await, 1);
}

/// Validates the server clock scenario.
///
/// Assertions:
/// - Confirms an identity token that is valid on the device clock is
///   rejected as expired when the token response `Date` lies past `exp`.
#[tokio::test]
async fn test_server_date_drives_identity_expiry() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;
    let server_now = (Utc::now() + chrono::Duration::hours(2)).to_rfc2822();
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Date", server_now.as_str())
                .set_body_json(token_body(&server, "AT", 3600)),
        )
        .mount(&server)
        .await;

    let coordinator = coordinator(&server).await;
    let err = coordinator.complete_authorization("app://cb?code=XYZ").await.unwrap_err();

    assert!(matches!(err, AuthError::Validation(ValidationError::ExpiredToken { .. })));
    assert!(!coordinator.is_authenticated());
}

/// Validates the concurrent refresh scenario.
///
/// Assertions:
/// - Confirms eight concurrent callers with a stale token cause exactly one
///   refresh request.
/// - Confirms every caller receives the refreshed access token.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_refresh_is_coalesced() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(&server, "AT", 30)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=RT"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "access_token": "AT2", "expires_in": 3600 }))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let coordinator = Arc::new(coordinator(&server).await);
    coordinator.complete_authorization("app://cb?code=XYZ").await.unwrap();

    let callers = (0..8).map(|_| {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.get_valid_access_token().await })
    });
    for result in futures::future::join_all(callers).await {
        assert_eq!(result.unwrap().unwrap(), "AT2");
    }

    let tokens = coordinator.session().unwrap().tokens;
    assert_eq!(tokens.refresh_token.as_deref(), Some("RT"));
    assert!(tokens.id_token.is_some());
}

/// Validates the provider rejection scenario.
///
/// Assertions:
/// - Confirms the provider's error payload and status are surfaced.
/// - Confirms the error is not retryable.
#[tokio::test]
async fn test_rejected_code_carries_provider_error() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "code already used"
        })))
        .mount(&server)
        .await;

    let coordinator = coordinator(&server).await;
    let err = coordinator.complete_authorization("app://cb?code=XYZ").await.unwrap_err();

    assert_eq!(requests_to(&server, "/oauth/jwks").await, 0);
    match err {
        AuthError::Exchange(ref provider) => {
            assert_eq!(provider.error, "invalid_grant");
            assert_eq!(provider.status, Some(400));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_foreign_redirect_never_reaches_token_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let coordinator = SessionCoordinator::builder(profile(&server), client())
        .http_client(reqwest::Client::new())
        .build()
        .unwrap();
    coordinator.initialize().await.unwrap();

    for uri in ["other://cb?code=XYZ&state=s1", "https://app.example/cb?code=XYZ"] {
        let result = coordinator.complete_authorization(uri).await;
        assert!(matches!(result, Err(AuthError::InvalidRedirect(_))));
    }
}

/// Validates the missing refresh token scenario for a profile that does not
/// require one.
///
/// Assertions:
/// - Confirms `RefreshTokenMissing` once the access token is stale.
/// - Confirms only the code exchange reached the provider.
#[tokio::test]
async fn test_operator_session_without_refresh_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/op/token"))
        .and(body_string_contains("client_secret=s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "AT",
            "id_token": sign_hs256(&claims("https://op.example", "abc", "user-1", 3600), TEST_HMAC_SECRET),
            "expires_in": 10
        })))
        .expect(1)
        .mount(&server)
        .await;

    let profile = AuthProfile::Operator {
        issuer: "https://op.example".into(),
        authorization_endpoint: format!("{}/op/authorize", server.uri()),
        token_endpoint: format!("{}/op/token", server.uri()),
        userinfo_endpoint: None,
        well_known: None,
    };
    let client =
        ClientConfig { confidential: true, client_secret: Some("s3cret".into()), ..client() };
    let coordinator = SessionCoordinator::builder(profile, client)
        .http_client(reqwest::Client::new())
        .verification_keys(VerificationKeys::new().with_hmac_secret(TEST_HMAC_SECRET))
        .build()
        .unwrap();
    coordinator.initialize().await.unwrap();

    coordinator.complete_authorization("app://cb?code=XYZ").await.unwrap();

    assert_eq!(coordinator.get_valid_access_token().await, Err(AuthError::RefreshTokenMissing));
    assert!(matches!(coordinator.fetch_user_info().await, Err(AuthError::Configuration(_))));
}

#[tokio::test]
async fn test_user_info_with_bearer_token() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(&server, "AT", 3600)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/oauth/userinfo"))
        .and(header("authorization", "Bearer AT"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "sub": "user-1", "phone_number": "+4790000000" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let coordinator = coordinator(&server).await;
    coordinator.complete_authorization("app://cb?code=XYZ").await.unwrap();

    let info = coordinator.fetch_user_info().await.unwrap();
    assert_eq!(info.get("phone_number").and_then(Value::as_str), Some("+4790000000"));
}
