//! `gcalauth login`.

use std::path::PathBuf;

use gcalauth_google::{AuthFlow, OAuthConfig, TokenRecord, TokenSource};
use tracing::info;

use crate::cli::LoginArgs;
use crate::config::{ClientConfig, OAuthSettings};
use crate::error::{ClientError, ClientResult};

/// Runs the authorization flow.
///
/// Reuses the cached token unless `--force` is given; otherwise opens the
/// browser and waits for Google to redirect back.
pub async fn login(args: LoginArgs, config: &ClientConfig) -> ClientResult<()> {
    let oauth = resolve_oauth_config(
        args.client_id,
        args.client_secret,
        args.credentials_file,
        &config.oauth,
    )?;
    let options = config.oauth.flow_options(args.no_timeout);
    let flow = AuthFlow::new(oauth, options)?;

    let (token, source) = if args.force {
        announce_browser(flow.exchanger().config());
        (flow.reauthorize().await?, TokenSource::Interactive)
    } else {
        if flow.store().load().is_err() {
            announce_browser(flow.exchanger().config());
        }
        flow.authorize().await?
    };

    let client = flow.exchanger().client_from(token)?;
    info!(
        "authorization finished ({:?}, {} token)",
        source,
        client.token().auth_scheme()
    );

    match source {
        TokenSource::Cached => {
            println!("Already authorized with Google Calendar.");
            println!("Use --force to authorize again.");
        }
        TokenSource::Interactive => {
            println!();
            println!("Authorization successful!");
        }
    }
    println!("Token: {}", flow.store().path().display());
    print_expiry(client.token());

    Ok(())
}

fn announce_browser(config: &OAuthConfig) {
    println!("A browser window will open for you to authorize access.");
    if config.redirect_uri().port() == Some(0) {
        println!("If the browser doesn't open, rerun with --debug to see the URL.");
    } else {
        println!("If the browser doesn't open, visit:");
        println!();
        println!("  {}", config.authorization_url());
    }
    println!();
}

fn print_expiry(token: &TokenRecord) {
    if let Some(expiry) = token.expiry {
        let local = expiry.with_timezone(&chrono::Local);
        if token.is_expired() {
            println!("Expired: {}", local.format("%Y-%m-%d %H:%M:%S"));
        } else {
            println!("Expires: {}", local.format("%Y-%m-%d %H:%M:%S"));
        }
    }
}

/// Builds the client configuration from the first source that provides it.
///
/// Priority (highest to lowest):
/// 1. `--client-id` + `--client-secret` (or their environment variables)
/// 2. `--credentials-file`
/// 3. `credentials_file` in `config.toml`
fn resolve_oauth_config(
    client_id: Option<String>,
    client_secret: Option<String>,
    credentials_file: Option<PathBuf>,
    settings: &OAuthSettings,
) -> ClientResult<OAuthConfig> {
    let config = match (client_id, client_secret) {
        (Some(id), Some(secret)) => OAuthConfig::new(id, secret)?,
        (Some(_), None) | (None, Some(_)) => {
            return Err(ClientError::Config(
                "both --client-id and --client-secret are required when providing credentials directly"
                    .to_string(),
            ));
        }
        (None, None) => {
            let Some(path) = credentials_file.or_else(|| settings.credentials_file.clone())
            else {
                return Err(ClientError::Config(format!(
                    "Google credentials are required. Provide via:\n  \
                     - --client-id and --client-secret flags\n  \
                     - GOOGLE_CLIENT_ID and GOOGLE_CLIENT_SECRET env vars\n  \
                     - --credentials-file flag (path to Google Cloud Console JSON)\n  \
                     - credentials_file under [oauth] in {}",
                    ClientConfig::default_path().display()
                )));
            };
            OAuthConfig::from_credentials_file(&path)?
        }
    };

    settings.apply(config)
}
