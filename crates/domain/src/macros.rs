//! Macro for implementing Display and FromStr for string-backed enums
//!
//! Session states, environments and browser types all travel as short
//! lowercase strings (in logs, config files and query parameters). This
//! macro gives each of them one consistent mapping in both directions.
//!
//! # Example
//!
//! ```rust
//! use connectid_domain::impl_str_enum_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum Prompt {
//!     Login,
//!     Consent,
//! }
//!
//! impl_str_enum_conversions!(Prompt {
//!     Login => "login",
//!     Consent => "consent",
//! });
//!
//! assert_eq!(Prompt::Consent.to_string(), "consent");
//! assert_eq!("LOGIN".parse::<Prompt>(), Ok(Prompt::Login));
//! ```

/// Implements Display and FromStr for a fieldless enum
///
/// # Arguments
///
/// * `$enum_name` - The name of the enum type
/// * `$variant => $str` - Mapping of enum variants to their lowercase string
///   representations
///
/// Parsing is case-insensitive; unknown strings produce an error naming the
/// enum type.
#[macro_export]
macro_rules! impl_str_enum_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(Self::$variant => f.write_str($str),)+
                }
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s.trim().to_lowercase().as_str() {
                    $($str => Ok(Self::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($enum_name), s)),
                }
            }
        }
    };
}
