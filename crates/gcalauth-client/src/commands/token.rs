//! `gcalauth token`.

use gcalauth_google::{TokenRecord, TokenStore};

use crate::config::ClientConfig;
use crate::error::ClientResult;

/// Prints the state of the cached token. Never contacts Google.
pub fn status(config: &ClientConfig) -> ClientResult<()> {
    let store = TokenStore::new(config.oauth.token_path());
    println!("path: {}", store.path().display());

    match store.load() {
        Ok(token) => {
            for line in describe(&token) {
                println!("{}", line);
            }
        }
        Err(e) if e.is_cache_miss() => {
            println!("status: not authorized ({})", e.message());
            println!("Run 'gcalauth login' to authorize.");
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

fn describe(token: &TokenRecord) -> Vec<String> {
    let mut lines = vec![format!("type: {}", token.auth_scheme())];

    let state = match token.expiry {
        None => "valid (no expiry recorded)".to_string(),
        Some(expiry) if token.is_expired() => format!("expired at {}", expiry.to_rfc3339()),
        Some(expiry) => {
            let minutes = token
                .time_until_expiry()
                .map_or(0, |left| left.num_minutes().max(0));
            format!("valid until {} ({} min left)", expiry.to_rfc3339(), minutes)
        }
    };
    lines.push(format!("status: {}", state));
    lines.push(format!(
        "refresh token: {}",
        if token.refresh_token.is_some() {
            "present"
        } else {
            "absent"
        }
    ));
    lines
}
