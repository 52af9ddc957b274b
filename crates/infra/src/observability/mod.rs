//! Logging initialisation
//!
//! Installs a global `tracing` subscriber for hosts that do not bring
//! their own. `RUST_LOG` takes precedence over the directive passed in.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Default filter when neither `RUST_LOG` nor a directive is given
pub const DEFAULT_LOG_FILTER: &str = "connectid_common=info,connectid_infra=info";

/// Install the global subscriber
///
/// `json` selects newline-delimited JSON output instead of the human
/// readable format. Returns `false` if a subscriber was already installed,
/// in which case nothing changes.
pub fn init_logging(filter: Option<&str>, json: bool) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter.unwrap_or(DEFAULT_LOG_FILTER)));

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if json {
        registry.with(fmt::layer().json()).try_init().is_ok()
    } else {
        registry.with(fmt::layer()).try_init().is_ok()
    };

    if installed {
        tracing::debug!(json, "Logging initialised");
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_initialisation_is_a_no_op() {
        let _ = init_logging(Some("debug"), false);

        assert!(!init_logging(None, true));
    }
}
