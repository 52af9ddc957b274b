//! Testing utilities and helpers
//!
//! - **[`fixtures`]**: signed identity tokens and token responses
//! - **[`mocks`]**: in-memory doubles for the engine's seams
//!
//! Available to unit tests and, through the `test-utils` feature, to
//! integration tests and downstream crates.

pub mod fixtures;
pub mod mocks;

pub use fixtures::{claims, sign_hs256, token_response, TEST_HMAC_SECRET};
#[cfg(feature = "platform")]
pub use mocks::MockKeychainProvider;
pub use mocks::{MockNetworkInfo, MockTokenEndpoint};
