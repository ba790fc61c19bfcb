// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Berth - a session broker for pooled WhatsApp bridge workers.
//!
//! This is the binary entry point for the Berth broker.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use berth_config::{BerthConfig, ConfigError};
use berth_core::BerthError;

mod provision;
mod serve;
mod status;

/// Berth - a session broker for pooled WhatsApp bridge workers.
#[derive(Parser, Debug)]
#[command(name = "berth", version, about, long_about = None)]
struct Cli {
    /// Load configuration from this file instead of the XDG hierarchy.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override the configured log level (error, warn, info, debug, trace).
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the broker daemon: cleanup loop, change feed, queue replay.
    Serve,
    /// Show pool, session, and queue state.
    Status {
        /// Emit machine-readable JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Worker pool maintenance.
    Pool {
        #[command(subcommand)]
        command: PoolCommands,
    },
    /// Configuration helpers.
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum PoolCommands {
    /// Register the configured worker slots (safe to rerun).
    Init,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Print the effective merged configuration as TOML.
    Show,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(errors) => {
            berth_config::render_errors(&errors);
            std::process::exit(1);
        }
    };
    if let Some(level) = cli.log_level {
        config.broker.log_level = level;
    }

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Status { json }) => status::run_status(&config, json).await,
        Some(Commands::Pool {
            command: PoolCommands::Init,
        }) => provision::run_pool_init(&config).await,
        Some(Commands::Config {
            command: ConfigCommands::Show,
        }) => run_config_show(&config),
        None => {
            println!("berth: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

/// An explicit `--config` path bypasses the XDG hierarchy entirely; env var
/// overrides still apply on top of it.
fn load_config(path: Option<&Path>) -> Result<BerthConfig, Vec<ConfigError>> {
    match path {
        Some(path) => berth_config::load_and_validate_path(path),
        None => berth_config::load_and_validate(),
    }
}

fn run_config_show(config: &BerthConfig) -> Result<(), BerthError> {
    let rendered = toml::to_string_pretty(config)
        .map_err(|e| BerthError::Internal(format!("could not render config: {e}")))?;
    print!("{rendered}");
    Ok(())
}
