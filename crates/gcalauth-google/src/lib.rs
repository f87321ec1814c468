//! OAuth 2.0 installed-application flow for the Google Calendar API.
//!
//! This crate turns a client ID and secret into an HTTP client authorized for
//! the calendar events scope:
//!
//! - [`TokenStore`] - Reads and writes the JSON token file
//! - [`CallbackReceiver`] - One-shot loopback listener for the redirect
//! - [`TokenExchanger`] - Browser launch and authorization-code exchange
//! - [`AuthFlow`] - Cache-first orchestration of the above
//!
//! # Flow
//!
//! ```text
//! ┌──────────────┐  hit   ┌──────────────────────┐
//! │  token.json  │───────►│ AuthenticatedClient  │
//! └──────┬───────┘        └──────────▲───────────┘
//!        │ miss                      │
//!        ▼                           │ save
//! ┌──────────────┐  code  ┌──────────┴───────────┐
//! │   browser +  │───────►│   token endpoint     │
//! │   callback   │        │   (code exchange)    │
//! └──────────────┘        └──────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use gcalauth_google::AuthFlow;
//!
//! let client = AuthFlow::from_env()?.client().await?;
//! let events = client
//!     .get(AuthenticatedClient::calendar_url("calendars/primary/events"))
//!     .send()
//!     .await?;
//! ```

pub mod browser;
pub mod client;
pub mod config;
pub mod error;
pub mod exchange;
pub mod flow;
pub mod receiver;
pub mod tokens;

#[cfg(test)]
mod test_support;

pub use browser::{Browser, SystemBrowser};
pub use client::{AuthenticatedClient, CALENDAR_API_BASE};
pub use config::{
    CALENDAR_EVENTS_SCOPE, DEFAULT_REDIRECT_URI, FlowOptions, GOOGLE_AUTH_URL, GOOGLE_TOKEN_URL,
    OAuthConfig,
};
pub use error::{AuthError, AuthErrorCode, AuthResult};
pub use exchange::TokenExchanger;
pub use flow::{AuthFlow, TokenSource};
pub use receiver::CallbackReceiver;
pub use tokens::{TokenRecord, TokenStore};
