/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use rentalito::config::{RentalitoConfig, DEFAULT_CONFIG_FILE};
use rentalito::daemon::{self, Daemon};

// ── CLI argument definition ───────────────────────────────────────────────────

/// Rentalito republish daemon.
///
/// Example:
///   rentalito -c /etc/rentalito/rentalito.yaml start
#[derive(Debug, Parser)]
#[command(
    name = "rentalito",
    version,
    about = "Rentalito – paced MQTT republisher for LED displays",
    long_about = None,
    arg_required_else_help = true,
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short = 'c', long = "config", global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the daemon in the background.
    Start,
    /// Stop the running daemon.
    Stop,
    /// Stop, then start the daemon.
    Restart,
    /// Run in the foreground (used by `start`).
    #[command(hide = true)]
    Run,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Usage errors exit with status 2 from inside clap.
    let cli = Cli::parse();

    let config = RentalitoConfig::load_from_file(&cli.config);
    init_logging(config.as_ref().map(|c| c.debug).unwrap_or(false));

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            process::exit(1);
        }
    };

    let lifecycle = Daemon::new(&cli.config, config.daemon.clone());
    let result = match cli.command {
        Command::Start => lifecycle.start().await.map(|pid| info!(pid, "started")),
        Command::Stop => lifecycle.stop().await,
        Command::Restart => lifecycle.restart().await.map(|pid| info!(pid, "restarted")),
        Command::Run => daemon::run_foreground(config).await,
    };

    if let Err(e) = result {
        error!("{:#}", e);
        process::exit(1);
    }
}

/// Level comes from `RUST_LOG` when set, else `debug` / `info` depending on
/// `general.debug`.
fn init_logging(debug: bool) {
    let fallback = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(fallback)),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn config_flag_is_accepted_after_the_command() {
        let cli = Cli::try_parse_from(["rentalito", "stop", "-c", "/etc/r.yaml"]).unwrap();
        assert!(matches!(cli.command, Command::Stop));
        assert_eq!(cli.config, PathBuf::from("/etc/r.yaml"));
    }

    #[test]
    fn default_config_file() {
        let cli = Cli::try_parse_from(["rentalito", "start"]).unwrap();
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_FILE));
    }

    #[test]
    fn unknown_and_missing_commands_are_usage_errors() {
        let unknown = Cli::try_parse_from(["rentalito", "reload"]).unwrap_err();
        assert_eq!(unknown.exit_code(), 2);

        let missing = Cli::try_parse_from(["rentalito"]).unwrap_err();
        assert_eq!(
            missing.kind(),
            ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
        );
        assert_eq!(missing.exit_code(), 2);
    }
}
