//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Args, FromArgMatches, Parser, Subcommand};

/// gcalauth - Authorize access to Google Calendar from the terminal
#[derive(Debug, Parser)]
#[command(name = "gcalauth")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "GCALAUTH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Obtain a token, reusing the cached one when present (default)
    Login(LoginArgs),

    /// Show the cached token without contacting Google
    Token,

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Options for `gcalauth login`.
#[derive(Debug, Default, Args)]
pub struct LoginArgs {
    /// OAuth client ID (from Google Cloud Console)
    #[arg(long, env = "GOOGLE_CLIENT_ID", hide_env_values = true)]
    pub client_id: Option<String>,

    /// OAuth client secret (from Google Cloud Console)
    #[arg(long, env = "GOOGLE_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Path to Google Cloud Console credentials JSON file
    ///
    /// This is the JSON file downloaded from the Google Cloud Console
    /// OAuth 2.0 credentials page. Alternative to providing client_id
    /// and client_secret separately.
    #[arg(long, env = "GOOGLE_CREDENTIALS_FILE")]
    pub credentials_file: Option<PathBuf>,

    /// Ignore the cached token and authorize again
    #[arg(long, short)]
    pub force: bool,

    /// Wait for the browser redirect indefinitely
    #[arg(long)]
    pub no_timeout: bool,
}

impl LoginArgs {
    /// Login options as if `gcalauth login` had been run bare, so the
    /// environment variables still apply.
    pub fn from_env() -> Result<Self, clap::Error> {
        let matches =
            Self::augment_args(clap::Command::new("login")).try_get_matches_from(["login"])?;
        Self::from_arg_matches(&matches)
    }
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump current configuration
    Dump,

    /// Show configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn login_flags_parse() {
        let cli = Cli::try_parse_from([
            "gcalauth",
            "login",
            "--client-id",
            "id.apps.googleusercontent.com",
            "--client-secret",
            "secret",
            "--force",
            "--no-timeout",
        ])
        .unwrap();

        match cli.command {
            Some(Command::Login(args)) => {
                assert_eq!(
                    args.client_id.as_deref(),
                    Some("id.apps.googleusercontent.com")
                );
                assert_eq!(args.client_secret.as_deref(), Some("secret"));
                assert!(args.force);
                assert!(args.no_timeout);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn bare_login_args_have_no_flags_set() {
        let args = LoginArgs::from_env().unwrap();
        assert!(!args.force);
        assert!(!args.no_timeout);
    }

    #[test]
    fn no_subcommand_is_allowed() {
        let cli = Cli::try_parse_from(["gcalauth", "--debug"]).unwrap();
        assert!(cli.debug);
        assert!(cli.command.is_none());
    }
}
