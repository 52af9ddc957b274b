//! Authorization request builder
//!
//! Pure construction of the browser-facing authorization URI. No I/O; the
//! caller is responsible for persisting the state before handing the URI
//! to a presentation surface.

use std::collections::BTreeMap;

use connectid_domain::constants::{
    LOGIN_HINT_MCCMNC_PREFIX, PARAM_BROWSER, PARAM_CLIENT_ID, PARAM_LOGIN_HINT,
    PARAM_REDIRECT_URI, PARAM_RESPONSE_TYPE, PARAM_STATE, PARAM_UI_LOCALES, RESPONSE_TYPE_CODE,
};
use connectid_domain::{AuthError, AuthorizationRequest, BrowserType, ClientConfig, Result};

/// Parameters the builder manages itself; caller-supplied values for these
/// names are ignored.
const MANAGED_PARAMS: [&str; 6] = [
    PARAM_CLIENT_ID,
    PARAM_REDIRECT_URI,
    PARAM_RESPONSE_TYPE,
    PARAM_STATE,
    PARAM_UI_LOCALES,
    PARAM_BROWSER,
];

/// Per-attempt inputs that do not come from the caller's request
#[derive(Debug, Clone)]
pub struct AuthorizeContext {
    /// Freshly generated state, already persisted
    pub state: String,

    /// System default locale, always appended last to `ui_locales`
    pub default_locale: String,

    /// Device cellular operator code, when network authentication applies
    pub mcc_mnc: Option<String>,

    pub browser: BrowserType,
}

/// Build the authorization URI
///
/// Query order: `client_id`, `redirect_uri`, caller parameters sorted by
/// name, `state`, `response_type`, `ui_locales`, `browser`.
///
/// # Arguments
/// * `endpoint` - Absolute authorization endpoint URL
/// * `client` - Registered client credentials
/// * `request` - Caller parameters and accepted locales
/// * `context` - State, default locale, network hint and presentation flag
///
/// # Errors
/// - `AuthError::Configuration` if the client id or redirect URI is missing
/// - `AuthError::InvalidRequest` if `scope` is missing or empty
pub fn build_authorize_uri(
    endpoint: &str,
    client: &ClientConfig,
    request: &AuthorizationRequest,
    context: &AuthorizeContext,
) -> Result<String> {
    let client_id = client.require_client_id()?;
    let redirect_uri = client.require_redirect_uri()?;

    if request.scope().filter(|scope| !scope.trim().is_empty()).is_none() {
        return Err(AuthError::InvalidRequest("cannot authorize without scope tokens".into()));
    }

    let ui_locales = ui_locales(&request.locales, &context.default_locale);
    let browser = context.browser.to_string();

    // BTreeMap keeps caller parameters sorted by name
    let mut caller: BTreeMap<&str, String> = request
        .parameters
        .iter()
        .filter(|(name, _)| !MANAGED_PARAMS.contains(&name.as_str()))
        .map(|(name, value)| (name.as_str(), value.clone()))
        .collect();
    if let Some(mcc_mnc) = context.mcc_mnc.as_deref().filter(|m| !m.is_empty()) {
        caller.insert(PARAM_LOGIN_HINT, format!("{LOGIN_HINT_MCCMNC_PREFIX}{mcc_mnc}"));
    }

    let mut params: Vec<(&str, &str)> =
        vec![(PARAM_CLIENT_ID, client_id), (PARAM_REDIRECT_URI, redirect_uri)];
    params.extend(caller.iter().map(|(name, value)| (*name, value.as_str())));

    params.push((PARAM_STATE, &context.state));
    params.push((PARAM_RESPONSE_TYPE, RESPONSE_TYPE_CODE));
    params.push((PARAM_UI_LOCALES, &ui_locales));
    params.push((PARAM_BROWSER, &browser));

    let query = params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    let separator = if endpoint.contains('?') { '&' } else { '?' };
    Ok(format!("{endpoint}{separator}{query}"))
}

/// Space-separated `ui_locales` value
///
/// Each accepted locale contributes its full tag followed by its bare
/// language code; the default locale closes the list the same way.
#[must_use]
pub fn ui_locales(locales: &[String], default_locale: &str) -> String {
    locales
        .iter()
        .map(String::as_str)
        .chain(std::iter::once(default_locale))
        .filter(|tag| !tag.is_empty())
        .flat_map(|tag| [tag, language_of(tag)])
        .collect::<Vec<_>>()
        .join(" ")
}

fn language_of(tag: &str) -> &str {
    tag.split(['_', '-']).next().unwrap_or(tag)
}
