// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! One-shot command processing

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

use crate::embedded::Services;
use warden_core::application::CommandResponse;
use warden_core::domain::command::CommandMode;
use warden_core::domain::config::WardenConfigManifest;
use warden_core::domain::risk::{RiskLevel, Warning};

#[derive(Args)]
pub struct ExecCommand {
    /// Command text to analyze
    #[arg(value_name = "TEXT")]
    pub text: String,

    /// Principal issuing the command
    #[arg(long, env = "WARDEN_PRINCIPAL")]
    pub principal: String,

    /// Prompt framing: normal, autonomous or creative
    #[arg(long, default_value = "normal")]
    pub mode: CommandMode,

    /// Model alias (default: llm_selection.default_model)
    #[arg(long)]
    pub model: Option<String>,

    /// Print the response as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(command: ExecCommand, config_path: Option<PathBuf>) -> Result<()> {
    let config = WardenConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;
    let services = Services::build(config).await?;

    let response = services
        .orchestrator
        .process_command(
            &command.principal,
            &command.text,
            command.mode,
            command.model.as_deref(),
        )
        .await
        .context("Failed to process command")?;

    if command.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print_response(&response);
    }

    if !response.success {
        std::process::exit(2);
    }
    Ok(())
}

fn print_response(response: &CommandResponse) {
    let status = if response.success {
        "✓ analyzed".green()
    } else if !response.can_proceed {
        "✗ blocked".red()
    } else {
        "! failed".yellow()
    };

    println!("{} {}", status.bold(), response.message);
    println!("  Risk: {}", colorize_risk(response.risk_level));
    if let Some(id) = response.command_id {
        println!("  Command: {}", id);
    }
    if let Some(backup) = response.backup_ref {
        println!("  Snapshot: {}", backup);
    }
    println!("  Time: {} ms", response.execution_time_ms);

    print_warnings(&response.warnings);

    if let Some(result) = &response.result {
        println!();
        println!("{}", result);
    }
}

pub fn print_warnings(warnings: &[Warning]) {
    if warnings.is_empty() {
        return;
    }
    println!("{}", "  Warnings:".bold());
    for warning in warnings {
        let marker = if warning.can_proceed {
            "-".yellow()
        } else {
            "✗".red()
        };
        println!("    {} [{}] {}", marker, warning.kind, warning.message);
        if let Some(action) = &warning.suggested_action {
            println!("      {}", action.dimmed());
        }
    }
}

pub fn colorize_risk(risk: RiskLevel) -> colored::ColoredString {
    match risk {
        RiskLevel::Low => risk.as_str().green(),
        RiskLevel::Medium => risk.as_str().cyan(),
        RiskLevel::High => risk.as_str().yellow(),
        RiskLevel::Critical => risk.as_str().red().bold(),
    }
}
