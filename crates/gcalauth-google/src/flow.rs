//! Token acquisition state machine.
//!
//! ```text
//!   load token file ──ok──────────────────────────────┐
//!        │                                            ▼
//!     missing/corrupt ──► browser + callback ──► save token ──► client
//! ```
//!
//! There are no intermediate persisted states. Any failure on the interactive
//! path ends the flow; a cached token is used without further checks.

use tracing::{info, warn};

use crate::browser::Browser;
use crate::client::AuthenticatedClient;
use crate::config::{FlowOptions, OAuthConfig};
use crate::error::AuthResult;
use crate::exchange::TokenExchanger;
use crate::tokens::{TokenRecord, TokenStore};

/// Which path produced the token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    /// Read from the token file.
    Cached,
    /// Obtained through the browser and saved to the token file.
    Interactive,
}

/// Loads or obtains a token and turns it into an [`AuthenticatedClient`].
pub struct AuthFlow {
    store: TokenStore,
    exchanger: TokenExchanger,
}

impl AuthFlow {
    /// Creates a flow for `config` with the given local options.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the redirect URI or scopes are unusable.
    pub fn new(config: OAuthConfig, options: FlowOptions) -> AuthResult<Self> {
        config.validate()?;
        let store = TokenStore::new(options.token_path.clone());
        let exchanger = TokenExchanger::new(config, &options)?;
        Ok(Self { store, exchanger })
    }

    /// Creates a flow from `GOOGLE_CLIENT_ID` / `GOOGLE_CLIENT_SECRET` with
    /// the token stored at `<home>/token.json`.
    pub fn from_env() -> AuthResult<Self> {
        Self::new(OAuthConfig::from_env()?, FlowOptions::default())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable lookup and options.
    pub fn from_lookup<F>(lookup: F, options: FlowOptions) -> AuthResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::new(OAuthConfig::from_lookup(lookup)?, options)
    }

    #[must_use]
    pub fn with_browser(mut self, browser: impl Browser + 'static) -> Self {
        self.exchanger = self.exchanger.with_browser(browser);
        self
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    pub fn exchanger(&self) -> &TokenExchanger {
        &self.exchanger
    }

    /// Returns the cached token, or runs the browser flow when there is none.
    pub async fn authorize(&self) -> AuthResult<(TokenRecord, TokenSource)> {
        match self.store.load() {
            Ok(token) => {
                info!("using cached token from {:?}", self.store.path());
                if token.is_expired() {
                    warn!(
                        "cached token expired at {:?}; API calls may be rejected",
                        token.expiry
                    );
                }
                Ok((token, TokenSource::Cached))
            }
            Err(e) if e.is_cache_miss() => {
                info!("{}; starting browser authorization", e.message());
                let token = self.reauthorize().await?;
                Ok((token, TokenSource::Interactive))
            }
            Err(e) => Err(e),
        }
    }

    /// Runs the browser flow regardless of the cache and overwrites the token file.
    pub async fn reauthorize(&self) -> AuthResult<TokenRecord> {
        let token = self.exchanger.token_from_web().await?;
        self.store.save(&token)?;
        Ok(token)
    }

    /// Produces an authenticated client, authorizing first if needed.
    pub async fn client(&self) -> AuthResult<AuthenticatedClient> {
        let (token, _) = self.authorize().await?;
        self.exchanger.client_from(token)
    }
}
