//! gcalauth CLI entry point.

use std::process::ExitCode;

use clap::Parser;

use gcalauth_client::cli::{Cli, Command, ConfigAction, LoginArgs};
use gcalauth_client::commands;
use gcalauth_client::config::ClientConfig;
use gcalauth_client::error::{ClientError, ClientResult};
use gcalauth_core::{TracingConfig, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ClientResult<()> {
    let config_path = cli.config.clone().unwrap_or_else(ClientConfig::default_path);
    let config = if cli.config.is_some() {
        ClientConfig::load_from(&config_path)?
    } else {
        ClientConfig::load()?
    };

    let tracing_config = if cli.debug || config.debug {
        TracingConfig::cli_debug()
    } else {
        TracingConfig::cli()
    };
    if let Err(e) = init_tracing(tracing_config) {
        eprintln!("warning: failed to initialize logging: {}", e);
    }

    match cli.command {
        Some(Command::Login(args)) => commands::login::login(args, &config).await,
        None => {
            let args = LoginArgs::from_env().map_err(|e| ClientError::Config(e.to_string()))?;
            commands::login::login(args, &config).await
        }
        Some(Command::Token) => commands::token::status(&config),
        Some(Command::Config { action }) => match action {
            ConfigAction::Dump => commands::config::dump(&config, &config_path),
            ConfigAction::Path => commands::config::path(&config_path),
        },
    }
}
