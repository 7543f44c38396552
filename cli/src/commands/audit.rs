// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Access log inspection

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use super::exec::colorize_risk;
use crate::embedded::Services;
use warden_core::domain::config::WardenConfigManifest;

#[derive(Subcommand)]
pub enum AuditCommand {
    /// List recent access log entries, newest first
    List {
        /// Maximum entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Only entries from this principal
        #[arg(long)]
        principal: Option<String>,

        /// Print entries as JSON
        #[arg(long)]
        json: bool,
    },
}

pub async fn handle_command(command: AuditCommand, config_path: Option<PathBuf>) -> Result<()> {
    let config = WardenConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;
    let services = Services::build(config).await?;
    let access_log = &services.repositories.access_log;

    match command {
        AuditCommand::List {
            limit,
            principal,
            json,
        } => {
            let entries = match principal {
                Some(principal) => access_log.find_by_principal(&principal, limit).await?,
                None => access_log.list_recent(limit).await?,
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
                return Ok(());
            }

            if entries.is_empty() {
                println!("{}", "No access log entries".dimmed());
            }

            for entry in &entries {
                let executed = if entry.executed() {
                    "executed".green()
                } else {
                    "not executed".red()
                };
                println!(
                    "{} {} {} {} {}",
                    entry.created_at().format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
                    entry.principal_id().bold(),
                    colorize_risk(entry.risk_level()),
                    executed,
                    entry.command_text()
                );
                if let Some(backup) = entry.backup_ref() {
                    println!("    snapshot {}", backup);
                }
                if let Some(usage) = entry.usage() {
                    println!("    {} tokens via {} ({})", usage.total_tokens, entry.model(), entry.mode());
                }
            }
        }
    }

    Ok(())
}
