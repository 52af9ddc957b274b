//! Platform secret storage
//!
//! Generic secret storage over the platform keychain. Credential-specific
//! helpers live in `auth::keychain`, layered on top of this module so the
//! security module never depends on auth types.

pub mod keychain;

pub use keychain::{KeychainError, KeychainProvider, SecretStore};
