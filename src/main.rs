#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

use std::process::ExitCode;

use clap::Parser;

use webhook_patcher::cli::{Cli, Commands};
use webhook_patcher::config::Config;
use webhook_patcher::github::{ClientOptions, GitHubClient};
use webhook_patcher::logging::{self, LOG_LEVEL_ENV_VAR};
use webhook_patcher::patcher::{HookPatcher, Mode};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if matches!(cli.command, Commands::Version) {
        println!("webhook-patcher {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    let config_result = Config::load(cli.config.as_deref());

    // Precedence: CLI flag > env var > config > default (Info)
    let env_level = std::env::var(LOG_LEVEL_ENV_VAR).ok();
    let log_level = logging::resolve_log_level(
        cli.log_level.as_deref(),
        env_level.as_deref(),
        config_result.as_ref().ok().map(|c| c.log_level.as_str()),
    );
    // Held until main returns so the file writer gets flushed.
    let _log_guard = logging::init(
        log_level,
        config_result.as_ref().ok().and_then(|c| c.log_file.as_deref()),
    );
    tracing::debug!("log level {log_level}");

    let mut config = match config_result {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Config error: {e}");
            return ExitCode::FAILURE;
        }
    };
    cli.apply_overrides(&mut config);

    let client = match build_client(&config) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Patch => cmd_run(&config, client, Mode::Apply).await,
        Commands::Scan => cmd_run(&config, client, Mode::DryRun).await,
        Commands::Check => cmd_check(client).await,
        Commands::Version => ExitCode::SUCCESS,
    }
}

fn build_client(config: &Config) -> Result<GitHubClient, Box<dyn std::error::Error>> {
    config.validate()?;
    let credentials = config.credentials()?;
    Ok(GitHubClient::new(
        credentials,
        ClientOptions::from_config(config),
    )?)
}

async fn cmd_run(config: &Config, client: GitHubClient, mode: Mode) -> ExitCode {
    let patcher = HookPatcher::new(client, &config.org, config.url_rewrite(), mode);

    match patcher.run().await {
        // Per-repository and per-hook failures are logged, not signalled.
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Failed to list repositories of {}: {e}", config.org);
            ExitCode::FAILURE
        }
    }
}

async fn cmd_check(client: GitHubClient) -> ExitCode {
    match client.authenticated_login().await {
        Ok(login) => {
            println!("Authenticated as {login}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Credential check failed: {e}");
            ExitCode::FAILURE
        }
    }
}
