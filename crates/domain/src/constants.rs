//! Domain constants
//!
//! Hosts, paths and storage keys shared by every crate in the workspace.

// Identity provider hosts
pub const PRODUCTION_API_HOST: &str = "connect.telenordigital.com";
pub const STAGING_API_HOST: &str = "connect.staging.telenordigital.com";

// Endpoint paths, relative to the provider API URL
pub const OAUTH_PATH: &str = "oauth";
pub const AUTHORIZE_PATH: &str = "oauth/authorize";
pub const TOKEN_PATH: &str = "oauth/token";
pub const USERINFO_PATH: &str = "oauth/userinfo";
pub const OPENID_CONFIGURATION_PATH: &str = ".well-known/openid-configuration";

// Authorization request parameters managed by the engine
pub const PARAM_CLIENT_ID: &str = "client_id";
pub const PARAM_REDIRECT_URI: &str = "redirect_uri";
pub const PARAM_RESPONSE_TYPE: &str = "response_type";
pub const PARAM_SCOPE: &str = "scope";
pub const PARAM_STATE: &str = "state";
pub const PARAM_UI_LOCALES: &str = "ui_locales";
pub const PARAM_LOGIN_HINT: &str = "login_hint";
pub const PARAM_BROWSER: &str = "browser";
pub const RESPONSE_TYPE_CODE: &str = "code";

// Token endpoint grant types
pub const GRANT_AUTHORIZATION_CODE: &str = "authorization_code";
pub const GRANT_REFRESH_TOKEN: &str = "refresh_token";

/// Prefix of the network-based `login_hint` value (`MCCMNC:<value>`).
pub const LOGIN_HINT_MCCMNC_PREFIX: &str = "MCCMNC:";

pub const DEFAULT_TOKEN_TYPE: &str = "Bearer";
pub const DEFAULT_REFRESH_LEEWAY_SECS: i64 = 60;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_KEYCHAIN_SERVICE: &str = "ConnectId";
pub const DEFAULT_ACCOUNT: &str = "default";
pub const DEFAULT_LOCALE: &str = "en_US";

/// Delay before a failed background refresh is retried.
pub const AUTO_REFRESH_RETRY_SECS: u64 = 60;
