//! # ConnectID Infrastructure
//!
//! Host-side wiring for the authorization engine.
//!
//! This crate contains:
//! - Configuration loading (environment variables, TOML/JSON files)
//! - Logging initialisation
//! - Bootstrap of a [`SessionCoordinator`] from a loaded configuration
//!
//! ## Architecture
//! - Consumes `connectid-common` and `connectid-domain`
//! - Contains the process-level concerns (environment, files, subscriber)
//!
//! [`SessionCoordinator`]: connectid_common::SessionCoordinator

pub mod bootstrap;
pub mod config;
pub mod observability;

// Re-export commonly used items
pub use bootstrap::coordinator_builder;
#[cfg(feature = "platform")]
pub use bootstrap::{build_coordinator, connect};
pub use observability::init_logging;
