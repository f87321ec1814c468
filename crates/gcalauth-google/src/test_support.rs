//! Test doubles shared by the flow tests.

use std::sync::{Mutex, PoisonError};

use httpmock::MockServer;
use tokio::task::JoinHandle;
use url::Url;

use crate::browser::Browser;
use crate::config::OAuthConfig;
use crate::error::{AuthError, AuthResult};

/// Client configuration pointing at a mock server, redirecting to a free loopback port.
pub(crate) fn loopback_config(server: &MockServer) -> OAuthConfig {
    OAuthConfig::new("client-id", "client-secret")
        .unwrap()
        .with_endpoints(
            Url::parse(&server.url("/auth")).unwrap(),
            Url::parse(&server.url("/token")).unwrap(),
        )
        .with_redirect_uri(Url::parse("http://127.0.0.1:0/callback").unwrap())
}

/// Plays the user: when asked to open the consent page it immediately
/// follows the redirect back to the callback listener.
#[derive(Default)]
pub(crate) struct RedirectingBrowser {
    code: Option<String>,
    opened: Mutex<Vec<Url>>,
    responses: Mutex<Vec<JoinHandle<(u16, String)>>>,
}

impl RedirectingBrowser {
    pub(crate) fn with_code(code: &str) -> Self {
        Self {
            code: Some(code.to_string()),
            ..Self::default()
        }
    }

    /// URLs passed to `open`, in order.
    pub(crate) fn opened(&self) -> Vec<Url> {
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Status and body of every simulated redirect.
    pub(crate) async fn responses(&self) -> Vec<(u16, String)> {
        let handles = std::mem::take(
            &mut *self
                .responses
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        let mut out = Vec::new();
        for handle in handles {
            out.push(handle.await.unwrap());
        }
        out
    }
}

impl Browser for RedirectingBrowser {
    fn open(&self, url: &Url) -> AuthResult<()> {
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.clone());

        let param = |name: &str| {
            url.query_pairs()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.into_owned())
        };
        let mut callback = Url::parse(&param("redirect_uri").unwrap()).unwrap();
        {
            let mut query = callback.query_pairs_mut();
            if let Some(code) = &self.code {
                query.append_pair("code", code);
            }
            if let Some(state) = param("state") {
                query.append_pair("state", &state);
            }
        }

        let handle = tokio::spawn(async move {
            let response = reqwest::get(callback).await.unwrap();
            let status = response.status().as_u16();
            (status, response.text().await.unwrap())
        });
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
        Ok(())
    }
}

/// A browser that cannot be launched.
pub(crate) struct FailingBrowser;

impl Browser for FailingBrowser {
    fn open(&self, _url: &Url) -> AuthResult<()> {
        Err(AuthError::browser("no display available"))
    }
}
