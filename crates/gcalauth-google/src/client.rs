//! HTTP client that carries the access token.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{IntoUrl, RequestBuilder};

use crate::error::{AuthError, AuthResult};
use crate::tokens::TokenRecord;

/// Base URL of the Google Calendar API v3.
pub const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

const USER_AGENT: &str = concat!("gcalauth/", env!("CARGO_PKG_VERSION"));

/// A reqwest client that attaches the token to every request.
///
/// The token is used as-is; nothing here refreshes it.
#[derive(Debug, Clone)]
pub struct AuthenticatedClient {
    http: reqwest::Client,
    token: TokenRecord,
}

impl AuthenticatedClient {
    /// Wraps `token` into a client with the given request timeout.
    pub fn new(token: TokenRecord, timeout: Duration) -> AuthResult<Self> {
        let mut value = HeaderValue::from_str(&token.authorization_header()).map_err(|e| {
            AuthError::internal("access token is not a valid header value").with_source(e)
        })?;
        value.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::internal("failed to create HTTP client").with_source(e))?;

        Ok(Self { http, token })
    }

    /// The underlying client, for handing to an API SDK.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// The token this client was built from.
    pub fn token(&self) -> &TokenRecord {
        &self.token
    }

    /// Starts a GET request with the authorization header attached.
    pub fn get(&self, url: impl IntoUrl) -> RequestBuilder {
        self.http.get(url)
    }

    /// Builds a URL below [`CALENDAR_API_BASE`].
    pub fn calendar_url(path: &str) -> String {
        format!("{}/{}", CALENDAR_API_BASE, path.trim_start_matches('/'))
    }
}
