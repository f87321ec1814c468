//! OAuth client configuration.
//!
//! [`OAuthConfig`] describes the registered Google OAuth client: endpoints,
//! identifier, secret, redirect URI, scopes and the state value. It is built
//! once per process, usually from `GOOGLE_CLIENT_ID` / `GOOGLE_CLIENT_SECRET`,
//! and never mutated afterwards; the builder methods consume `self`.
//!
//! [`FlowOptions`] holds the local knobs of the flow (token file location and
//! timeouts) that are not part of the provider registration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::error::{AuthError, AuthResult};

/// Google's authorization endpoint.
pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";

/// Google's token endpoint.
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Loopback redirect registered for the installed application.
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:8000/callback";

/// Read/write access to calendar events.
pub const CALENDAR_EVENTS_SCOPE: &str = "https://www.googleapis.com/auth/calendar.events";

/// State value sent with every authorization request.
pub const DEFAULT_STATE: &str = "state-token";

/// Environment variable holding the OAuth client identifier.
pub const CLIENT_ID_ENV: &str = "GOOGLE_CLIENT_ID";

/// Environment variable holding the OAuth client secret.
pub const CLIENT_SECRET_ENV: &str = "GOOGLE_CLIENT_SECRET";

/// Registration details of the OAuth client.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    auth_url: Url,
    token_url: Url,
    client_id: String,
    client_secret: String,
    redirect_uri: Url,
    scopes: Vec<String>,
    state: String,
}

/// Structure of a Google Cloud Console credentials file.
///
/// Either an `installed` or `web` section, or `client_id`/`client_secret` at
/// the root (as written by some tooling).
#[derive(Debug, Deserialize)]
struct CredentialsFile {
    installed: Option<NestedCredentials>,
    web: Option<NestedCredentials>,
    client_id: Option<String>,
    client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NestedCredentials {
    client_id: String,
    client_secret: String,
    #[serde(default)]
    auth_uri: Option<String>,
    #[serde(default)]
    token_uri: Option<String>,
    #[serde(default)]
    redirect_uris: Vec<String>,
}

impl OAuthConfig {
    /// Creates a configuration for the Google endpoints with the default
    /// redirect URI, calendar events scope and state.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the identifier or secret is empty.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> AuthResult<Self> {
        let client_id = client_id.into();
        let client_secret = client_secret.into();
        if client_id.is_empty() {
            return Err(AuthError::configuration(format!("{} is not set", CLIENT_ID_ENV)));
        }
        if client_secret.is_empty() {
            return Err(AuthError::configuration(format!(
                "{} is not set",
                CLIENT_SECRET_ENV
            )));
        }

        Ok(Self {
            auth_url: parse_url("authorization endpoint", GOOGLE_AUTH_URL)?,
            token_url: parse_url("token endpoint", GOOGLE_TOKEN_URL)?,
            client_id,
            client_secret,
            redirect_uri: parse_url("redirect URI", DEFAULT_REDIRECT_URI)?,
            scopes: vec![CALENDAR_EVENTS_SCOPE.to_string()],
            state: DEFAULT_STATE.to_string(),
        })
    }

    /// Reads the client identifier and secret from the process environment.
    pub fn from_env() -> AuthResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the client identifier and secret through `lookup`.
    ///
    /// Both values are required; an unset or empty value is a configuration
    /// error, raised before anything touches the network or the filesystem.
    pub fn from_lookup<F>(lookup: F) -> AuthResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let client_id = lookup(CLIENT_ID_ENV)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AuthError::configuration(format!("{} is not set", CLIENT_ID_ENV)))?;
        let client_secret = lookup(CLIENT_SECRET_ENV)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                AuthError::configuration(format!("{} is not set", CLIENT_SECRET_ENV))
            })?;
        Self::new(client_id, client_secret)
    }

    /// Loads the configuration from a Google Cloud Console credentials file.
    pub fn from_credentials_file(path: impl AsRef<Path>) -> AuthResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AuthError::configuration(format!(
                "failed to read credentials file {}",
                path.display()
            ))
            .with_source(e)
        })?;
        Self::from_credentials_json(&content)
    }

    /// Parses a Google Cloud Console credentials JSON document.
    ///
    /// Endpoints and the first redirect URI with an explicit port are taken
    /// from the document when present; anything missing falls back to the
    /// Google defaults.
    pub fn from_credentials_json(json: &str) -> AuthResult<Self> {
        let file: CredentialsFile = serde_json::from_str(json).map_err(|e| {
            AuthError::configuration("failed to parse credentials JSON").with_source(e)
        })?;

        if let Some(nested) = file.installed.or(file.web) {
            let mut config = Self::new(nested.client_id, nested.client_secret)?;
            if let Some(auth_uri) = nested.auth_uri {
                config.auth_url = parse_url("auth_uri", &auth_uri)?;
            }
            if let Some(token_uri) = nested.token_uri {
                config.token_url = parse_url("token_uri", &token_uri)?;
            }
            // Console downloads list a bare `http://localhost`; keep the default port then.
            for redirect in &nested.redirect_uris {
                if has_explicit_port(redirect) {
                    config.redirect_uri = parse_url("redirect_uris", redirect)?;
                    break;
                }
            }
            return Ok(config);
        }

        match (file.client_id, file.client_secret) {
            (Some(client_id), Some(client_secret)) => Self::new(client_id, client_secret),
            _ => Err(AuthError::configuration(
                "credentials file must contain an 'installed'/'web' section or 'client_id'/'client_secret' at root level",
            )),
        }
    }

    /// Replaces the redirect URI.
    ///
    /// A port of `0` makes the callback listener pick a free port.
    #[must_use]
    pub fn with_redirect_uri(mut self, redirect_uri: Url) -> Self {
        self.redirect_uri = redirect_uri;
        self
    }

    /// Replaces the requested scopes.
    #[must_use]
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the state value.
    #[must_use]
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = state.into();
        self
    }

    /// Points the configuration at different authorization and token endpoints.
    #[must_use]
    pub fn with_endpoints(mut self, auth_url: Url, token_url: Url) -> Self {
        self.auth_url = auth_url;
        self.token_url = token_url;
        self
    }

    /// Checks that the redirect URI can be served by the local listener.
    pub fn validate(&self) -> AuthResult<()> {
        if self.redirect_uri.scheme() != "http" {
            return Err(AuthError::configuration(format!(
                "redirect URI must use http, got {}",
                self.redirect_uri
            )));
        }
        if self.redirect_uri.host_str().is_none() {
            return Err(AuthError::configuration(format!(
                "redirect URI has no host: {}",
                self.redirect_uri
            )));
        }
        if self.redirect_uri.port_or_known_default().is_none() {
            return Err(AuthError::configuration(format!(
                "redirect URI has no port: {}",
                self.redirect_uri
            )));
        }
        if self.scopes.is_empty() {
            return Err(AuthError::configuration("at least one scope is required"));
        }
        Ok(())
    }

    /// Builds the URL the user visits to grant access.
    ///
    /// Requests offline access so the provider issues a refresh token.
    pub fn authorization_url(&self) -> Url {
        let mut url = self.auth_url.clone();
        url.query_pairs_mut()
            .append_pair("access_type", "offline")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", self.redirect_uri.as_str())
            .append_pair("response_type", "code")
            .append_pair("scope", &self.scopes.join(" "))
            .append_pair("state", &self.state);
        url
    }

    pub fn auth_url(&self) -> &Url {
        &self.auth_url
    }

    pub fn token_url(&self) -> &Url {
        &self.token_url
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    pub fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    pub fn state(&self) -> &str {
        &self.state
    }
}

/// True if the authority of `raw` names a port, including a scheme's default
/// one that `Url` would normalise away.
fn has_explicit_port(raw: &str) -> bool {
    let Some((_, rest)) = raw.split_once("://") else {
        return false;
    };
    let authority = rest
        .split(|c| matches!(c, '/' | '?' | '#'))
        .next()
        .unwrap_or_default();
    let host_port = authority.rsplit('@').next().unwrap_or(authority);
    match host_port.rsplit_once(':') {
        Some((host, port)) => {
            !port.is_empty()
                && port.bytes().all(|b| b.is_ascii_digit())
                && (!host.starts_with('[') || host.ends_with(']'))
        }
        None => false,
    }
}

fn parse_url(what: &str, value: &str) -> AuthResult<Url> {
    Url::parse(value).map_err(|e| {
        AuthError::configuration(format!("invalid {}: {}", what, value)).with_source(e)
    })
}

/// Local settings of the authorization flow.
#[derive(Debug, Clone)]
pub struct FlowOptions {
    /// Where the token record is persisted.
    pub token_path: PathBuf,

    /// How long to wait for the browser redirect. `None` waits forever.
    pub callback_timeout: Option<Duration>,

    /// Timeout for requests to the token endpoint and for the returned client.
    pub http_timeout: Duration,
}

impl FlowOptions {
    /// Default callback timeout in seconds.
    pub const DEFAULT_CALLBACK_TIMEOUT_SECS: u64 = 300;

    /// Default HTTP timeout in seconds.
    pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

    /// Creates options with the given token path and default timeouts.
    pub fn new(token_path: impl Into<PathBuf>) -> Self {
        Self {
            token_path: token_path.into(),
            callback_timeout: Some(Duration::from_secs(Self::DEFAULT_CALLBACK_TIMEOUT_SECS)),
            http_timeout: Duration::from_secs(Self::DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }

    /// Returns `<home>/token.json`, or `./token.json` when no home directory is known.
    pub fn default_token_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("token.json")
    }

    #[must_use]
    pub fn with_callback_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.callback_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }
}

impl Default for FlowOptions {
    fn default() -> Self {
        Self::new(Self::default_token_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthErrorCode;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn from_lookup_reads_both_values() {
        let config = OAuthConfig::from_lookup(lookup_from(&[
            (CLIENT_ID_ENV, "id.apps.googleusercontent.com"),
            (CLIENT_SECRET_ENV, "secret"),
        ]))
        .unwrap();

        assert_eq!(config.client_id(), "id.apps.googleusercontent.com");
        assert_eq!(config.client_secret(), "secret");
        assert_eq!(config.auth_url().as_str(), GOOGLE_AUTH_URL);
        assert_eq!(config.token_url().as_str(), GOOGLE_TOKEN_URL);
        assert_eq!(config.redirect_uri().as_str(), DEFAULT_REDIRECT_URI);
        assert_eq!(config.scopes(), [CALENDAR_EVENTS_SCOPE.to_string()]);
        assert_eq!(config.state(), DEFAULT_STATE);
    }

    #[test]
    fn missing_client_id_is_configuration_error() {
        let err = OAuthConfig::from_lookup(lookup_from(&[(CLIENT_SECRET_ENV, "secret")]))
            .unwrap_err();
        assert_eq!(err.code(), AuthErrorCode::Configuration);
        assert!(err.message().contains(CLIENT_ID_ENV));
    }

    #[test]
    fn missing_client_secret_is_configuration_error() {
        let err =
            OAuthConfig::from_lookup(lookup_from(&[(CLIENT_ID_ENV, "id")])).unwrap_err();
        assert_eq!(err.code(), AuthErrorCode::Configuration);
        assert!(err.message().contains(CLIENT_SECRET_ENV));
    }

    #[test]
    fn empty_value_counts_as_unset() {
        let err = OAuthConfig::from_lookup(lookup_from(&[
            (CLIENT_ID_ENV, ""),
            (CLIENT_SECRET_ENV, "secret"),
        ]))
        .unwrap_err();
        assert_eq!(err.code(), AuthErrorCode::Configuration);
    }

    #[test]
    fn authorization_url_layout() {
        let config = OAuthConfig::new("test-client.apps.googleusercontent.com", "secret").unwrap();
        insta::assert_snapshot!(
            config.authorization_url().as_str(),
            @"https://accounts.google.com/o/oauth2/auth?access_type=offline&client_id=test-client.apps.googleusercontent.com&redirect_uri=http%3A%2F%2Flocalhost%3A8000%2Fcallback&response_type=code&scope=https%3A%2F%2Fwww.googleapis.com%2Fauth%2Fcalendar.events&state=state-token"
        );
    }

    #[test]
    fn authorization_url_joins_scopes_with_spaces() {
        let config = OAuthConfig::new("id", "secret")
            .unwrap()
            .with_scopes(["a", "b"])
            .with_state("xyz");
        let url = config.authorization_url();
        let pairs: HashMap<String, String> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs.get("scope").map(String::as_str), Some("a b"));
        assert_eq!(pairs.get("state").map(String::as_str), Some("xyz"));
        assert_eq!(pairs.get("access_type").map(String::as_str), Some("offline"));
    }

    #[test]
    fn credentials_json_installed_section() {
        let json = r#"{
            "installed": {
                "client_id": "abc.apps.googleusercontent.com",
                "project_id": "demo",
                "auth_uri": "https://accounts.google.com/o/oauth2/auth",
                "token_uri": "https://oauth2.googleapis.com/token",
                "auth_provider_x509_cert_url": "https://www.googleapis.com/oauth2/v1/certs",
                "client_secret": "shh",
                "redirect_uris": ["http://localhost:9000/oauth2"]
            }
        }"#;
        let config = OAuthConfig::from_credentials_json(json).unwrap();
        assert_eq!(config.client_id(), "abc.apps.googleusercontent.com");
        assert_eq!(config.client_secret(), "shh");
        assert_eq!(config.redirect_uri().as_str(), "http://localhost:9000/oauth2");
    }

    #[test]
    fn credentials_json_bare_localhost_keeps_default_redirect() {
        let json = r#"{"installed": {
            "client_id": "abc", "client_secret": "shh",
            "redirect_uris": ["urn:ietf:wg:oauth:2.0:oob", "http://localhost"]
        }}"#;
        let config = OAuthConfig::from_credentials_json(json).unwrap();
        assert_eq!(config.redirect_uri().as_str(), DEFAULT_REDIRECT_URI);
    }

    #[test]
    fn credentials_json_keeps_explicit_default_port() {
        let json = r#"{"installed": {
            "client_id": "abc", "client_secret": "shh",
            "redirect_uris": ["http://localhost", "http://localhost:80/cb"]
        }}"#;
        let config = OAuthConfig::from_credentials_json(json).unwrap();
        assert_eq!(config.redirect_uri().as_str(), "http://localhost/cb");
        assert_eq!(config.redirect_uri().port_or_known_default(), Some(80));
    }

    #[test]
    fn explicit_port_detection() {
        assert!(has_explicit_port("http://localhost:80/cb"));
        assert!(has_explicit_port("http://127.0.0.1:0"));
        assert!(has_explicit_port("http://[::1]:8000/callback"));
        assert!(!has_explicit_port("http://localhost"));
        assert!(!has_explicit_port("http://[::1]/callback"));
        assert!(!has_explicit_port("urn:ietf:wg:oauth:2.0:oob"));
    }

    #[test]
    fn credentials_json_web_and_flat_formats() {
        let web = r#"{"web": {"client_id": "w", "client_secret": "ws"}}"#;
        let config = OAuthConfig::from_credentials_json(web).unwrap();
        assert_eq!(config.client_id(), "w");
        assert_eq!(config.redirect_uri().as_str(), DEFAULT_REDIRECT_URI);

        let flat = r#"{"client_id": "f", "client_secret": "fs"}"#;
        let config = OAuthConfig::from_credentials_json(flat).unwrap();
        assert_eq!(config.client_secret(), "fs");
    }

    #[test]
    fn credentials_json_without_credentials_is_rejected() {
        let err = OAuthConfig::from_credentials_json(r#"{"other": 1}"#).unwrap_err();
        assert_eq!(err.code(), AuthErrorCode::Configuration);

        let err = OAuthConfig::from_credentials_json("not json").unwrap_err();
        assert_eq!(err.code(), AuthErrorCode::Configuration);
    }

    #[test]
    fn validate_rejects_https_redirect() {
        let config = OAuthConfig::new("id", "secret")
            .unwrap()
            .with_redirect_uri(Url::parse("https://localhost:8000/callback").unwrap());
        assert_eq!(
            config.validate().unwrap_err().code(),
            AuthErrorCode::Configuration
        );
    }

    #[test]
    fn validate_accepts_defaults() {
        let config = OAuthConfig::new("id", "secret").unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn flow_options_defaults() {
        let options = FlowOptions::new("/tmp/token.json");
        assert_eq!(options.token_path, PathBuf::from("/tmp/token.json"));
        assert_eq!(options.callback_timeout, Some(Duration::from_secs(300)));
        assert_eq!(options.http_timeout, Duration::from_secs(30));
        assert!(FlowOptions::default_token_path().ends_with("token.json"));
    }
}
