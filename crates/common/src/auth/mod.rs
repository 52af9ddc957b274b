//! OAuth 2.0 / OpenID Connect authorization engine
//!
//! Client-side authorization-code flow with identity token validation,
//! durable credential storage and coalesced token refresh.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │  SessionCoordinator  │  Façade, one per provider profile
//! └──────────┬───────────┘
//!            │
//!            ├──► authorize            (authorization URI, pure)
//!            ├──► IdentityProvider     (profile + discovery + validator)
//!            │         ├──► DiscoveryClient
//!            │         └──► TokenValidator
//!            └──► TokenManager         (session snapshot, single-flight refresh)
//!                      ├──► TokenEndpoint    (TokenClient over reqwest)
//!                      └──► CredentialStore  (memory or platform keychain)
//! ```
//!
//! # Usage Example
//!
//! ```no_run
//! use connectid_common::auth::{AuthProfile, SessionCoordinator};
//! use connectid_domain::{AuthorizationRequest, BrowserType, ClientConfig, Environment};
//!
//! # async fn example() -> connectid_domain::Result<()> {
//! let client = ClientConfig {
//!     client_id: Some("my-client".into()),
//!     redirect_uri: Some("my-app://oauth2callback".into()),
//!     ..ClientConfig::default()
//! };
//! let coordinator =
//!     SessionCoordinator::builder(AuthProfile::connect(Environment::Production), client).build()?;
//! coordinator.initialize().await?;
//!
//! let request = AuthorizationRequest::with_scopes(&["openid", "profile"]);
//! let uri = coordinator.begin_authorization(&request, BrowserType::ExternalBrowser).await?;
//! println!("Open {uri}");
//!
//! // ... the provider redirects back to the app ...
//! let session = coordinator.complete_authorization("my-app://oauth2callback?code=...&state=...").await?;
//! println!("Signed in as {}", session.subject());
//!
//! coordinator.spawn_auto_refresh();
//! let access_token = coordinator.get_valid_access_token().await?;
//! # let _ = access_token;
//! # Ok(())
//! # }
//! ```
//!
//! # Module Organization
//!
//! - **[`authorize`]**: authorization URI construction
//! - **[`client`]**: token endpoint client
//! - **[`discovery`]**: provider metadata and signing keys
//! - **[`profile`]**: provider integration styles
//! - **[`provider`]**: profile bound to client, discovery and keys
//! - **[`service`]**: the session coordinator
//! - **[`state`]**: CSRF state generation
//! - **[`store`]**: credential storage
//! - **[`token_manager`]**: token lifecycle and refresh coalescing
//! - **[`validator`]**: identity token validation
//!
//! # Security Features
//!
//! - **State Validation**: CSRF protection with cryptographic randomness,
//!   persisted before the URI leaves the engine
//! - **Identity Token Validation**: signature, issuer, audience and expiry
//! - **Secure Storage**: platform keychain through the `keyring` crate
//! - **Constant-Time Comparison**: state values are compared without early
//!   exit

pub mod authorize;
pub mod client;
pub mod discovery;
#[cfg(feature = "platform")]
pub mod keychain;
pub mod profile;
pub mod provider;
pub mod service;
pub mod state;
pub mod store;
pub mod token_manager;
pub mod traits;
pub mod types;
pub mod validator;

pub use authorize::{build_authorize_uri, ui_locales, AuthorizeContext};
pub use client::{build_http_client, default_http_client, TokenClient};
pub use discovery::DiscoveryClient;
#[cfg(feature = "platform")]
pub use keychain::KeychainCredentialStore;
pub use profile::AuthProfile;
pub use provider::IdentityProvider;
pub use service::{SessionCoordinator, SessionCoordinatorBuilder};
pub use state::{generate_state, validate_state, FixedStateSource, RandomStateSource, StateSource};
pub use store::{load_token_set, save_token_set, MemoryCredentialStore};
pub use token_manager::TokenManager;
pub use traits::{CredentialStore, NetworkInfo, NoNetworkInfo, TokenEndpoint};
pub use types::{CredentialKey, ExpiryRecord, IssuedTokens, TokenResponse};
pub use validator::{TokenValidator, VerificationKeys};
