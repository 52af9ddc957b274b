//! CSRF state generation for authorization requests
//!
//! Every authorization attempt carries a fresh, unguessable `state` value
//! that the provider echoes back on the redirect. Only the most recent value
//! is ever stored, so a new attempt implicitly cancels older ones.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;

/// Number of random bytes behind a state value (43 base64url characters).
const STATE_BYTES: usize = 32;

/// Generate a random state token for CSRF protection
///
/// Returns a URL-safe base64-encoded random string of 32 bytes (43
/// characters) without padding.
#[must_use]
pub fn generate_state() -> String {
    let mut random_bytes = [0u8; STATE_BYTES];
    rand::thread_rng().fill_bytes(&mut random_bytes);
    URL_SAFE_NO_PAD.encode(random_bytes)
}

/// Validate that the state echoed on a redirect matches the stored one
///
/// Compares in constant time with respect to the content of equal-length
/// inputs.
///
/// # Arguments
/// * `expected` - The state that was persisted before dispatching the request
/// * `actual` - The state received in the redirect
#[must_use]
pub fn validate_state(expected: &str, actual: &str) -> bool {
    if expected.len() != actual.len() {
        return false;
    }
    expected.bytes().zip(actual.bytes()).fold(0u8, |acc, (a, b)| acc | (a ^ b)) == 0
}

/// Source of state values
///
/// Injected into the session coordinator so tests can pin the generated
/// value.
pub trait StateSource: Send + Sync {
    fn next_state(&self) -> String;
}

/// Default [`StateSource`] backed by the thread-local CSPRNG
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomStateSource;

impl StateSource for RandomStateSource {
    fn next_state(&self) -> String {
        generate_state()
    }
}

/// [`StateSource`] that always yields the same value
#[derive(Debug, Clone)]
pub struct FixedStateSource(pub String);

impl StateSource for FixedStateSource {
    fn next_state(&self) -> String {
        self.0.clone()
    }
}
