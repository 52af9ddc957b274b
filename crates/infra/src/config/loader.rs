//! Configuration loader
//!
//! Loads engine configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. Reads a `.env` file into the process environment, if one exists
//! 2. Loads from environment variables when `CONNECTID_CLIENT_ID` is set
//! 3. Otherwise probes multiple paths for a config file
//! 4. Falls back to defaults; a missing client id surfaces later as a
//!    configuration error when authorization is attempted
//!
//! ## Environment Variables
//! - `CONNECTID_CLIENT_ID`: Registered client id
//! - `CONNECTID_REDIRECT_URI`: Registered redirect URI
//! - `CONNECTID_CONFIDENTIAL_CLIENT`: Whether the client is confidential
//!   (true/false)
//! - `CONNECTID_CLIENT_SECRET`: Client secret for confidential clients
//! - `CONNECTID_USE_STAGING`: Target the staging environment (true/false)
//! - `CONNECTID_API_URL`: Override of the provider API URL
//! - `CONNECTID_LOCALES`: Comma-separated preferred UI locales
//! - `CONNECTID_DEFAULT_LOCALE`: Locale used when none are preferred
//! - `CONNECTID_REFRESH_LEEWAY_SECS`: Refresh this long before expiry
//! - `CONNECTID_HTTP_TIMEOUT_SECS`: Request timeout in seconds
//! - `CONNECTID_KEYCHAIN_SERVICE`: Keychain service name
//! - `CONNECTID_ACCOUNT`: Keychain account namespace
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./connectid.toml` or `./connectid.json` (current working directory)
//! 2. `./config.toml` or `./config.json` (current working directory)
//! 3. The same names relative to the executable location

use std::path::{Path, PathBuf};
use std::str::FromStr;

use connectid_domain::{AuthError, ConnectConfig, Environment, Result};

const CONFIG_FILE_NAMES: [&str; 4] =
    ["connectid.toml", "connectid.json", "config.toml", "config.json"];

/// Load configuration with automatic fallback strategy
///
/// # Errors
/// Returns `AuthError::Configuration` if an environment variable holds an
/// invalid value or a config file exists but cannot be parsed.
pub fn load() -> Result<ConnectConfig> {
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "Loaded .env file");
    }

    if std::env::var_os("CONNECTID_CLIENT_ID").is_some() {
        let config = load_from_env()?;
        tracing::info!("Configuration loaded from environment variables");
        return Ok(config);
    }

    match probe_config_paths() {
        Some(path) => load_from_file(Some(path)),
        None => {
            tracing::warn!("No configuration found, using defaults");
            Ok(ConnectConfig::default())
        }
    }
}

/// Load configuration from environment variables
///
/// Unset variables keep their defaults.
///
/// # Environment Variables
/// See module documentation for the complete list.
///
/// # Errors
/// Returns `AuthError::Configuration` if a numeric variable cannot be
/// parsed.
pub fn load_from_env() -> Result<ConnectConfig> {
    let mut config = ConnectConfig::default();

    config.client.client_id = env_opt("CONNECTID_CLIENT_ID");
    config.client.redirect_uri = env_opt("CONNECTID_REDIRECT_URI");
    config.client.confidential = env_bool("CONNECTID_CONFIDENTIAL_CLIENT", false);
    config.client.client_secret = env_opt("CONNECTID_CLIENT_SECRET");

    if env_bool("CONNECTID_USE_STAGING", false) {
        config.environment = Environment::Staging;
    }
    config.api_url = env_opt("CONNECTID_API_URL");

    if let Some(locales) = env_opt("CONNECTID_LOCALES") {
        config.locales = locales
            .split(',')
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(ToOwned::to_owned)
            .collect();
    }
    if let Some(locale) = env_opt("CONNECTID_DEFAULT_LOCALE") {
        config.default_locale = locale;
    }

    if let Some(leeway) = env_parse("CONNECTID_REFRESH_LEEWAY_SECS")? {
        config.refresh_leeway_secs = leeway;
    }
    if let Some(timeout) = env_parse("CONNECTID_HTTP_TIMEOUT_SECS")? {
        config.http_timeout_secs = timeout;
    }
    if let Some(service) = env_opt("CONNECTID_KEYCHAIN_SERVICE") {
        config.keychain_service = service;
    }
    if let Some(account) = env_opt("CONNECTID_ACCOUNT") {
        config.account = account;
    }

    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
///
/// # Errors
/// Returns `AuthError::Configuration` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
pub fn load_from_file(path: Option<PathBuf>) -> Result<ConnectConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(AuthError::Configuration(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            AuthError::Configuration(
                "No config file found in any of the standard locations".to_string(),
            )
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| AuthError::Configuration(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

/// Parse configuration from string content
///
/// Format is detected by file extension (`.json` or `.toml`).
fn parse_config(contents: &str, path: &Path) -> Result<ConnectConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| AuthError::Configuration(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| AuthError::Configuration(format!("Invalid JSON format: {e}"))),
        _ => Err(AuthError::Configuration(format!("Unsupported config format: {extension}"))),
    }
}

/// Probe multiple paths for configuration files
///
/// Searches the current working directory first, then the directory of
/// the running executable.
///
/// # Returns
/// The first config file found, or `None` if no file exists.
#[must_use]
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut dirs = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        dirs.push(cwd);
    }
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            dirs.push(exe_dir.to_path_buf());
        }
    }

    dirs.iter()
        .flat_map(|dir| CONFIG_FILE_NAMES.iter().map(move |name| dir.join(name)))
        .find(|path| path.exists())
}

/// Non-empty environment variable
fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_opt(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| AuthError::Configuration(format!("Invalid value for {key}: {e}")))
        })
        .transpose()
}

/// Parse boolean from environment variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map_or(default, |s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Mutex;

    use connectid_domain::ProfileSettings;
    use once_cell::sync::Lazy;
    use tempfile::NamedTempFile;

    use super::*;

    static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    const ALL_VARS: [&str; 12] = [
        "CONNECTID_CLIENT_ID",
        "CONNECTID_REDIRECT_URI",
        "CONNECTID_CONFIDENTIAL_CLIENT",
        "CONNECTID_CLIENT_SECRET",
        "CONNECTID_USE_STAGING",
        "CONNECTID_API_URL",
        "CONNECTID_LOCALES",
        "CONNECTID_DEFAULT_LOCALE",
        "CONNECTID_REFRESH_LEEWAY_SECS",
        "CONNECTID_HTTP_TIMEOUT_SECS",
        "CONNECTID_KEYCHAIN_SERVICE",
        "CONNECTID_ACCOUNT",
    ];

    fn clear_env() {
        for key in ALL_VARS {
            std::env::remove_var(key);
        }
    }

    fn temp_config(contents: &str, extension: &str) -> PathBuf {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(contents.as_bytes()).unwrap();
        let path = temp_file.path().with_extension(extension);
        std::fs::copy(temp_file.path(), &path).unwrap();
        path
    }

    #[test]
    fn test_env_bool_parsing() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");

        std::env::set_var("TEST_CONNECTID_BOOL_YES", "yes");
        std::env::set_var("TEST_CONNECTID_BOOL_UPPER", "TRUE");
        std::env::set_var("TEST_CONNECTID_BOOL_OFF", "off");

        assert!(env_bool("TEST_CONNECTID_BOOL_YES", false));
        assert!(env_bool("TEST_CONNECTID_BOOL_UPPER", false));
        assert!(!env_bool("TEST_CONNECTID_BOOL_OFF", true));

        std::env::remove_var("TEST_CONNECTID_BOOL_MISSING");
        assert!(env_bool("TEST_CONNECTID_BOOL_MISSING", true));

        std::env::remove_var("TEST_CONNECTID_BOOL_YES");
        std::env::remove_var("TEST_CONNECTID_BOOL_UPPER");
        std::env::remove_var("TEST_CONNECTID_BOOL_OFF");
    }

    #[test]
    fn test_load_from_env_all_vars_set() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();

        std::env::set_var("CONNECTID_CLIENT_ID", "abc");
        std::env::set_var("CONNECTID_REDIRECT_URI", "app://cb");
        std::env::set_var("CONNECTID_CONFIDENTIAL_CLIENT", "true");
        std::env::set_var("CONNECTID_CLIENT_SECRET", "s3cret");
        std::env::set_var("CONNECTID_USE_STAGING", "1");
        std::env::set_var("CONNECTID_LOCALES", "nb_NO, en_GB");
        std::env::set_var("CONNECTID_REFRESH_LEEWAY_SECS", "120");
        std::env::set_var("CONNECTID_ACCOUNT", "work");

        let result = load_from_env();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.client.client_id.as_deref(), Some("abc"));
        assert_eq!(config.client.redirect_uri.as_deref(), Some("app://cb"));
        assert_eq!(config.client.token_secret(), Some("s3cret"));
        assert_eq!(config.environment, Environment::Staging);
        assert_eq!(config.locales, vec!["nb_NO".to_string(), "en_GB".to_string()]);
        assert_eq!(config.refresh_leeway_secs, 120);
        assert_eq!(config.http_timeout_secs, 30);
        assert_eq!(config.account, "work");
    }

    #[test]
    fn test_load_from_env_missing_client_is_not_an_error() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();

        let config = load_from_env().unwrap();

        assert!(config.client.client_id.is_none());
        assert_eq!(config.environment, Environment::Production);
    }

    #[test]
    fn test_load_from_env_invalid_number() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();

        std::env::set_var("CONNECTID_HTTP_TIMEOUT_SECS", "soon");
        let result = load_from_env();
        clear_env();

        assert!(matches!(result, Err(AuthError::Configuration(msg)) if msg.contains("CONNECTID_HTTP_TIMEOUT_SECS")));
    }

    #[test]
    fn test_load_from_file_json() {
        let path = temp_config(
            r#"{
                "client": { "client_id": "abc", "redirect_uri": "app://cb" },
                "environment": "staging",
                "locales": ["nb_NO"]
            }"#,
            "json",
        );

        let config = load_from_file(Some(path.clone())).unwrap();
        std::fs::remove_file(path).ok();

        assert_eq!(config.client.client_id.as_deref(), Some("abc"));
        assert_eq!(config.environment, Environment::Staging);
        assert_eq!(config.locales, vec!["nb_NO".to_string()]);
        assert_eq!(config.default_locale, "en_US");
    }

    #[test]
    fn test_load_from_file_toml_operator_profile() {
        let path = temp_config(
            r#"
api_url = "http://127.0.0.1:8080"

[client]
client_id = "abc"
confidential = true
client_secret = "s3cret"

[profile]
kind = "operator"
issuer = "https://op.example"
authorization_endpoint = "https://op.example/authorize"
token_endpoint = "https://op.example/token"
"#,
            "toml",
        );

        let config = load_from_file(Some(path.clone())).unwrap();
        std::fs::remove_file(path).ok();

        assert_eq!(config.effective_api_url(), "http://127.0.0.1:8080/");
        assert!(matches!(config.profile, ProfileSettings::Operator { ref issuer, .. } if issuer == "https://op.example"));
        assert_eq!(config.client.token_secret(), Some("s3cret"));
    }

    #[test]
    fn test_load_from_file_not_found() {
        let result = load_from_file(Some(PathBuf::from("/nonexistent/connectid.json")));

        assert!(matches!(result, Err(AuthError::Configuration(_))));
    }

    #[test]
    fn test_load_from_file_invalid_json() {
        let path = temp_config(r#"{ "client": "#, "json");

        let result = load_from_file(Some(path.clone()));
        std::fs::remove_file(path).ok();

        assert!(matches!(result, Err(AuthError::Configuration(msg)) if msg.contains("JSON")));
    }

    #[test]
    fn test_parse_config_unsupported_format() {
        let result = parse_config("client_id: abc", &PathBuf::from("connectid.yaml"));

        assert!(result.is_err(), "Should fail with unsupported format");
    }
}
