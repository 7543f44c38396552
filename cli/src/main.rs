// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Warden CLI
//!
//! The `warden` binary hosts the admin command gateway.
//!
//! ## Commands
//!
//! - `warden daemon` - Run backup cadences until Ctrl+C or SIGTERM
//! - `warden exec` - Analyze one admin command
//! - `warden classify` - Offline risk classification
//! - `warden snapshot create|list|latest|cleanup|restore` - Snapshot management
//! - `warden audit list` - Access log
//! - `warden config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing::debug;

use warden::commands::{
    self, AuditCommand, ClassifyCommand, ConfigCommand, ExecCommand, SnapshotCommand,
};
use warden_core::domain::config::{LoggingConfig, WardenConfigManifest};

/// Warden - risk-aware command gateway for a single administrator
#[derive(Parser)]
#[command(name = "warden")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "WARDEN_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, global = true, env = "WARDEN_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run backup cadences in the foreground
    #[command(name = "daemon")]
    Daemon,

    /// Analyze an admin command
    #[command(name = "exec")]
    Exec(ExecCommand),

    /// Classify a command without contacting a model
    #[command(name = "classify")]
    Classify(ClassifyCommand),

    /// Snapshot management
    #[command(name = "snapshot")]
    Snapshot {
        #[command(subcommand)]
        command: SnapshotCommand,
    },

    /// Access log
    #[command(name = "audit")]
    Audit {
        #[command(subcommand)]
        command: AuditCommand,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Logging settings come from the config file when it loads; a broken
    // file is reported by the command that needs it.
    let mut logging = WardenConfigManifest::load_or_default(cli.config.clone())
        .map(|config| config.logging())
        .unwrap_or_default();
    if let Some(level) = &cli.log_level {
        logging.level = level.clone();
    }
    init_logging(&logging)?;
    debug!(level = %logging.level, format = %logging.format, "Logging initialized");

    match cli.command {
        Some(Commands::Daemon) => commands::daemon::run(cli.config).await,
        Some(Commands::Exec(command)) => commands::exec::execute(command, cli.config).await,
        Some(Commands::Classify(command)) => {
            commands::classify::execute(command, cli.config).await
        }
        Some(Commands::Snapshot { command }) => {
            commands::snapshot::handle_command(command, cli.config).await
        }
        Some(Commands::Audit { command }) => {
            commands::audit::handle_command(command, cli.config).await
        }
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await
        }
        None => {
            // No command provided - show help
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&logging.level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr);

    if logging.format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.compact().init();
    }

    Ok(())
}
