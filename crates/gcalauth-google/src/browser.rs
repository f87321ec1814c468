//! Opening the authorization URL.

use url::Url;

use crate::error::{AuthError, AuthResult};

/// Something that can show the user the authorization page.
pub trait Browser: Send + Sync {
    fn open(&self, url: &Url) -> AuthResult<()>;
}

/// Launches the system default browser.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl Browser for SystemBrowser {
    fn open(&self, url: &Url) -> AuthResult<()> {
        open::that(url.as_str()).map_err(|e| {
            AuthError::browser(format!("failed to open browser for {}", url)).with_source(e)
        })
    }
}

impl<B: Browser + ?Sized> Browser for std::sync::Arc<B> {
    fn open(&self, url: &Url) -> AuthResult<()> {
        (**self).open(url)
    }
}
