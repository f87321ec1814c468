//! Authorization-code exchange.
//!
//! [`TokenExchanger`] drives the browser half of the installed-application
//! flow: it binds the callback receiver, sends the user to the consent page,
//! waits for the code and trades it for a token at the token endpoint.

use std::path::Path;
use std::time::Duration;

use reqwest::header::ACCEPT;
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::browser::{Browser, SystemBrowser};
use crate::client::AuthenticatedClient;
use crate::config::{FlowOptions, OAuthConfig};
use crate::error::{AuthError, AuthResult};
use crate::receiver::CallbackReceiver;
use crate::tokens::{TokenRecord, TokenStore};

const USER_AGENT: &str = concat!("gcalauth/", env!("CARGO_PKG_VERSION"));

/// Successful answer from the token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Error answer from the token endpoint (RFC 6749 section 5.2).
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Obtains tokens for one OAuth client.
pub struct TokenExchanger {
    config: OAuthConfig,
    http: reqwest::Client,
    browser: Box<dyn Browser>,
    callback_timeout: Option<Duration>,
    http_timeout: Duration,
}

impl TokenExchanger {
    /// Creates an exchanger that opens the system browser.
    pub fn new(config: OAuthConfig, options: &FlowOptions) -> AuthResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(options.http_timeout)
            .build()
            .map_err(|e| AuthError::internal("failed to create HTTP client").with_source(e))?;

        Ok(Self {
            config,
            http,
            browser: Box::new(SystemBrowser),
            callback_timeout: options.callback_timeout,
            http_timeout: options.http_timeout,
        })
    }

    /// Replaces the way the authorization URL is shown to the user.
    #[must_use]
    pub fn with_browser(mut self, browser: impl Browser + 'static) -> Self {
        self.browser = Box::new(browser);
        self
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Loads a previously saved token.
    pub fn token_from_file(path: impl AsRef<Path>) -> AuthResult<TokenRecord> {
        TokenStore::new(path.as_ref()).load()
    }

    /// Runs the interactive part of the flow and returns a fresh token.
    ///
    /// Blocks until the redirect arrives or the callback timeout elapses.
    /// Nothing is retried: a browser, listener or exchange failure ends the
    /// attempt.
    pub async fn token_from_web(&self) -> AuthResult<TokenRecord> {
        let receiver = CallbackReceiver::bind(self.config.redirect_uri()).await?;
        let redirect_uri = receiver.redirect_uri().clone();
        let auth_url = self
            .config
            .clone()
            .with_redirect_uri(redirect_uri.clone())
            .authorization_url();

        info!("opening the browser for Google authorization");
        info!("if it does not open, visit:\n{}", auth_url);
        self.browser.open(&auth_url)?;

        let code = receiver
            .receive_code(Some(self.config.state().to_string()), self.callback_timeout)
            .await?;

        self.exchange_code(&code, &redirect_uri).await
    }

    /// Trades an authorization code for a token.
    ///
    /// `redirect_uri` must be the one the code was issued for.
    pub async fn exchange_code(&self, code: &str, redirect_uri: &Url) -> AuthResult<TokenRecord> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri.as_str()),
            ("client_id", self.config.client_id()),
            ("client_secret", self.config.client_secret()),
        ];

        debug!("exchanging authorization code at {}", self.config.token_url());
        let response = self
            .http
            .post(self.config.token_url().clone())
            .header(ACCEPT, "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                AuthError::network(format!("token exchange request failed: {}", e)).with_source(e)
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            AuthError::network(format!("failed to read token response: {}", e)).with_source(e)
        })?;

        if !status.is_success() {
            let detail = match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(TokenErrorResponse {
                    error,
                    error_description: Some(description),
                }) => format!("{}: {}", error, description),
                Ok(TokenErrorResponse { error, .. }) => error,
                Err(_) => body,
            };
            return Err(AuthError::exchange(format!(
                "token exchange failed ({}): {}",
                status, detail
            )));
        }

        let token: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            AuthError::invalid_response(format!("invalid token response: {}", e)).with_source(e)
        })?;
        if token.access_token.is_empty() {
            return Err(AuthError::invalid_response(
                "token response has an empty access_token",
            ));
        }

        info!("obtained access token");
        Ok(TokenRecord::from_expires_in(
            token.access_token,
            token.token_type,
            token.refresh_token,
            token.expires_in,
        ))
    }

    /// Wraps a token into a ready-to-use client.
    pub fn client_from(&self, token: TokenRecord) -> AuthResult<AuthenticatedClient> {
        AuthenticatedClient::new(token, self.http_timeout)
    }
}
