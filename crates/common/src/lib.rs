//! Authorization and token lifecycle engine for ConnectID clients.
//!
//! # Safety and Quality
//!
//! No unsafe code; every fallible operation returns
//! [`connectid_domain::Result`].
//!
//! # Feature Tiers
//!
//! - `platform` (default): platform keychain backed credential storage
//! - `test-utils`: mock token endpoint, in-memory keychain and signed token
//!   fixtures for downstream tests

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod auth;
#[cfg(feature = "platform")]
pub mod security;

// Testing utilities
// ---------------------------------------------------------------
#[cfg(any(feature = "test-utils", test))]
pub mod testing;

pub use auth::{
    AuthProfile, CredentialStore, DiscoveryClient, SessionCoordinator, SessionCoordinatorBuilder,
    TokenClient, TokenEndpoint,
};
#[cfg(feature = "platform")]
pub use security::{KeychainError, KeychainProvider, SecretStore};
