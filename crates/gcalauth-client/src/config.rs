//! Client configuration.
//!
//! All settings live in a single `config.toml` file at
//! `~/.config/gcalauth/config.toml` by default. Every key is optional:
//!
//! ```toml
//! debug = false
//!
//! [oauth]
//! token_path = "/home/me/token.json"
//! redirect_uri = "http://localhost:8000/callback"
//! scopes = ["https://www.googleapis.com/auth/calendar.events"]
//! callback_timeout_secs = 300
//! http_timeout_secs = 30
//! credentials_file = "/home/me/client_secret.json"
//! ```
//!
//! Client credentials are not stored here; they come from the command line,
//! the environment or `credentials_file`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use gcalauth_google::{FlowOptions, OAuthConfig};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ClientError, ClientResult};

/// Configuration for the gcalauth client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Debug mode.
    pub debug: bool,

    /// OAuth flow settings.
    pub oauth: OAuthSettings,
}

/// Settings that shape the authorization flow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthSettings {
    /// Where the token is cached. Defaults to `~/token.json`.
    pub token_path: Option<PathBuf>,

    /// Redirect URI registered for the OAuth client.
    pub redirect_uri: Option<String>,

    /// Requested scopes. Empty means calendar events only.
    pub scopes: Vec<String>,

    /// Seconds to wait for the browser redirect; `0` waits forever.
    pub callback_timeout_secs: Option<u64>,

    /// Timeout for requests to Google, in seconds.
    pub http_timeout_secs: Option<u64>,

    /// Google Cloud Console credentials JSON used when no client ID is given.
    pub credentials_file: Option<PathBuf>,
}

impl ClientConfig {
    /// Loads configuration from the default path.
    pub fn load() -> ClientResult<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> ClientResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClientError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
            .map_err(|e| ClientError::Config(format!("{} in {}", e, path.display())))
    }

    fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| format!("failed to parse config: {}", e))
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gcalauth")
    }
}

impl OAuthSettings {
    /// Token file location after applying the default.
    pub fn token_path(&self) -> PathBuf {
        self.token_path
            .clone()
            .unwrap_or_else(FlowOptions::default_token_path)
    }

    /// Builds the local flow options. `no_timeout` overrides the configured timeout.
    pub fn flow_options(&self, no_timeout: bool) -> FlowOptions {
        let callback_timeout = match self.callback_timeout_secs {
            _ if no_timeout => None,
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => Some(Duration::from_secs(
                FlowOptions::DEFAULT_CALLBACK_TIMEOUT_SECS,
            )),
        };
        let http_timeout = Duration::from_secs(
            self.http_timeout_secs
                .unwrap_or(FlowOptions::DEFAULT_HTTP_TIMEOUT_SECS),
        );

        FlowOptions::new(self.token_path())
            .with_callback_timeout(callback_timeout)
            .with_http_timeout(http_timeout)
    }

    /// Applies the redirect URI and scope overrides to `config`.
    pub fn apply(&self, mut config: OAuthConfig) -> ClientResult<OAuthConfig> {
        if let Some(ref raw) = self.redirect_uri {
            let redirect = Url::parse(raw).map_err(|e| {
                ClientError::Config(format!("invalid redirect_uri {:?}: {}", raw, e))
            })?;
            config = config.with_redirect_uri(redirect);
        }
        if !self.scopes.is_empty() {
            config = config.with_scopes(self.scopes.iter());
        }
        config.validate()?;
        Ok(config)
    }
}
