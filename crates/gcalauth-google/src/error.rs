//! Error types for the authorization flow.
//!
//! Every failure is an [`AuthError`] tagged with an [`AuthErrorCode`]. The
//! code is what callers branch on: [`AuthErrorCode::TokenNotFound`] sends the
//! flow down the interactive path, everything else is terminal.

use std::fmt;
use thiserror::Error;

/// The category of an authorization error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthErrorCode {
    /// Missing or invalid client configuration (environment, credentials file, URLs).
    Configuration,
    /// No usable cached token: the file is absent, unreadable or corrupt.
    TokenNotFound,
    /// The token file could not be created or written.
    Storage,
    /// The local callback listener could not bind or accept connections.
    Listener,
    /// The system browser could not be launched.
    Browser,
    /// The user did not complete authorization before the deadline.
    Timeout,
    /// Transport failure talking to the token endpoint.
    Network,
    /// The provider rejected the authorization code exchange.
    Exchange,
    /// The token endpoint answered with something we could not parse.
    InvalidResponse,
    /// Unexpected internal state.
    Internal,
}

impl AuthErrorCode {
    /// Returns a stable snake_case name for this error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "configuration_error",
            Self::TokenNotFound => "token_not_found",
            Self::Storage => "storage_error",
            Self::Listener => "listener_error",
            Self::Browser => "browser_error",
            Self::Timeout => "timeout",
            Self::Network => "network_error",
            Self::Exchange => "exchange_failed",
            Self::InvalidResponse => "invalid_response",
            Self::Internal => "internal_error",
        }
    }

    /// Returns true if the flow should fall back to interactive authorization.
    pub fn is_cache_miss(&self) -> bool {
        matches!(self, Self::TokenNotFound)
    }
}

impl fmt::Display for AuthErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An error raised while obtaining or persisting a token.
#[derive(Debug, Error)]
pub struct AuthError {
    code: AuthErrorCode,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AuthError {
    /// Creates a new error with the given code and message.
    pub fn new(code: AuthErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::Configuration, message)
    }

    pub fn token_not_found(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::TokenNotFound, message)
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::Storage, message)
    }

    pub fn listener(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::Listener, message)
    }

    pub fn browser(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::Browser, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::Timeout, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::Network, message)
    }

    pub fn exchange(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::Exchange, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::InvalidResponse, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::Internal, message)
    }

    /// Sets the source error for this error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Returns the error code.
    pub fn code(&self) -> AuthErrorCode {
        self.code
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns true if this error only means "no cached token".
    pub fn is_cache_miss(&self) -> bool {
        self.code.is_cache_miss()
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// A specialized Result type for authorization operations.
pub type AuthResult<T> = Result<T, AuthError>;
