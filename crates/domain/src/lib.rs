//! # ConnectID Domain
//!
//! Data model and error taxonomy for the ConnectID authorization engine.
//!
//! This crate contains:
//! - Token sets, identity claims, sessions and provider metadata
//! - Error types and the `Result` alias shared by every crate
//! - Configuration structures
//! - Provider hosts, paths and request parameter names
//!
//! ## Architecture
//! - No dependencies on other workspace crates
//! - No I/O; pure data and validation helpers

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;

pub use config::*;
pub use errors::*;
pub use types::*;
