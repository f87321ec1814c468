//! Token record and its on-disk store.
//!
//! A single [`TokenRecord`] lives in a single JSON file (`<home>/token.json`
//! by default). The layout matches what Go's `oauth2.Token` writes, so a file
//! produced by earlier tooling is picked up as a cached token.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info};

use crate::error::{AuthError, AuthResult};

/// Tokens this close to their expiry are already treated as expired.
const EXPIRY_SKEW_SECS: i64 = 10;

/// An access token and the data that came with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// The access token attached to API requests.
    pub access_token: String,

    /// Token type, normally `Bearer`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token_type: String,

    /// Refresh token, only issued when offline access was granted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// When the access token expires, if the provider said so.
    #[serde(
        default,
        deserialize_with = "deserialize_expiry",
        skip_serializing_if = "Option::is_none"
    )]
    pub expiry: Option<DateTime<Utc>>,
}

/// Go writes `0001-01-01T00:00:00Z` for "no expiry".
fn deserialize_expiry<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let expiry = Option::<DateTime<Utc>>::deserialize(deserializer)?;
    Ok(expiry.filter(|t| t.timestamp() > 0))
}

impl TokenRecord {
    pub fn new(
        access_token: impl Into<String>,
        token_type: impl Into<String>,
        refresh_token: Option<String>,
        expiry: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: token_type.into(),
            refresh_token,
            expiry,
        }
    }

    /// Builds a record from a token endpoint answer, anchoring `expires_in`
    /// at the current time.
    ///
    /// An `expires_in` too large to represent leaves the expiry unset.
    pub fn from_expires_in(
        access_token: impl Into<String>,
        token_type: Option<String>,
        refresh_token: Option<String>,
        expires_in_secs: Option<i64>,
    ) -> Self {
        let expiry = expires_in_secs
            .filter(|secs| *secs > 0)
            .and_then(Duration::try_seconds)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime));
        Self::new(
            access_token,
            token_type.unwrap_or_else(|| "Bearer".to_string()),
            refresh_token,
            expiry,
        )
    }

    /// Returns true if the access token is expired or about to expire.
    ///
    /// A token without an expiry never expires.
    pub fn is_expired(&self) -> bool {
        match self.expiry {
            Some(expiry) => Utc::now() + Duration::seconds(EXPIRY_SKEW_SECS) >= expiry,
            None => false,
        }
    }

    /// Returns the time until the token expires, if known.
    pub fn time_until_expiry(&self) -> Option<Duration> {
        self.expiry.map(|expiry| expiry - Utc::now())
    }

    /// The scheme used in the `Authorization` header.
    ///
    /// Providers answer with `bearer` in any casing; an empty type means `Bearer`.
    pub fn auth_scheme(&self) -> &str {
        if self.token_type.is_empty() || self.token_type.eq_ignore_ascii_case("bearer") {
            "Bearer"
        } else {
            &self.token_type
        }
    }

    /// Value of the `Authorization` header for this token.
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.auth_scheme(), self.access_token)
    }
}

/// File-backed storage for the single token record.
///
/// No locking: one process, one flow at a time.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    /// Creates a store at the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Reads the cached token.
    ///
    /// Every failure, whether the file is missing, unreadable or corrupt,
    /// comes back as a `TokenNotFound` error. The underlying cause is kept as
    /// the error source.
    pub fn load(&self) -> AuthResult<TokenRecord> {
        let content = fs::read_to_string(&self.path).map_err(|e| {
            debug!("cannot read token file {:?}: {}", self.path, e);
            AuthError::token_not_found(format!("no token file at {}", self.path.display()))
                .with_source(e)
        })?;

        let token: TokenRecord = serde_json::from_str(&content).map_err(|e| {
            debug!("cannot parse token file {:?}: {}", self.path, e);
            AuthError::token_not_found(format!(
                "token file {} is not a valid token",
                self.path.display()
            ))
            .with_source(e)
        })?;

        debug!("loaded token from {:?}", self.path);
        Ok(token)
    }

    /// Writes the token, replacing whatever the file held before.
    ///
    /// The file is readable by its owner only.
    pub fn save(&self, token: &TokenRecord) -> AuthResult<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| {
                AuthError::storage(format!(
                    "failed to create token directory {}",
                    parent.display()
                ))
                .with_source(e)
            })?;
        }

        let content = serde_json::to_string_pretty(token).map_err(|e| {
            AuthError::internal("failed to serialize token").with_source(e)
        })?;

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(&self.path).map_err(|e| {
            AuthError::storage(format!("failed to open token file {}", self.path.display()))
                .with_source(e)
        })?;

        // mode() only applies when the file is created
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600)).map_err(|e| {
                AuthError::storage(format!(
                    "failed to restrict permissions on {}",
                    self.path.display()
                ))
                .with_source(e)
            })?;
        }

        file.write_all(content.as_bytes())
            .and_then(|()| file.write_all(b"\n"))
            .and_then(|()| file.flush())
            .map_err(|e| {
                AuthError::storage(format!(
                    "failed to write token file {}",
                    self.path.display()
                ))
                .with_source(e)
            })?;

        info!("saved token to {:?}", self.path);
        Ok(())
    }

    /// Returns the token file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if a token file is present (it may still be unreadable).
    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}
