// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use warden_core::domain::config::WardenConfigManifest;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path
        #[arg(short, long, default_value = "./warden-config.yaml")]
        output: PathBuf,

        /// Include examples and comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, examples } => generate(output, examples).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = WardenConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        match &config_override {
            Some(path) => println!("  1. --config flag: {}", path.display()),
            None => println!("  1. --config flag: {}", "(not set)".dimmed()),
        }
        println!(
            "  2. WARDEN_CONFIG_PATH: {}",
            std::env::var("WARDEN_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./warden-config.yaml");
        println!("  4. ~/.warden/config.yaml");
        println!("  5. /etc/warden/config.yaml");
        println!();
    }

    println!("{} {}", "Configuration:".bold(), config.metadata.name);
    println!();

    println!("{}", "Principal:".bold());
    match config.spec.principal.resolved_admin_id() {
        Some(id) => println!("  Admin: {}", id),
        None => println!("  Admin: {}", "(unset, all commands rejected)".yellow()),
    }
    println!();

    println!("{}", "LLM Providers:".bold());
    for provider in &config.spec.llm_providers {
        let state = if provider.enabled {
            "enabled".green()
        } else {
            "disabled".dimmed()
        };
        println!("  {} ({}, {})", provider.name.bold(), provider.provider_type, state);
        println!("    Endpoint: {}", provider.endpoint);
        for model in &provider.models {
            println!("      - {} → {}", model.alias, model.model);
        }
    }
    println!(
        "  Default model: {} (max_tokens={}, temperature={})",
        config.spec.llm_selection.default_model,
        config.spec.llm_selection.max_tokens,
        config.spec.llm_selection.temperature
    );
    println!();

    let backup = &config.spec.backup;
    println!("{}", "Backups:".bold());
    println!("  Source root: {}", backup.source_root.display());
    println!("  Include: {}", backup.include_paths.join(", "));
    println!("  Exclude: {}", backup.exclude_names.join(", "));
    println!("  Snapshot root: {}", backup.snapshot_root.display());
    println!("  Retention: {} days", backup.retention_days);
    println!(
        "  Hourly: {} (every {:?})",
        on_off(backup.hourly_enabled),
        backup.hourly_interval
    );
    println!("  Daily: {}", on_off(backup.daily_enabled));
    println!();

    println!("{}", "Policy:".bold());
    println!("  Additional rules: {}", config.spec.policy.additional_rules.len());
    println!();

    println!("{}", "Storage:".bold());
    println!("  Backend: {}", config.spec.storage.backend);
    println!();

    Ok(())
}

fn on_off(enabled: bool) -> colored::ColoredString {
    if enabled {
        "on".green()
    } else {
        "off".dimmed()
    }
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = WardenConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf, with_examples: bool) -> Result<()> {
    let sample = if with_examples {
        include_str!("../../templates/config-with-examples.yaml")
    } else {
        include_str!("../../templates/config-minimal.yaml")
    };

    std::fs::write(&output, sample)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_templates_parse() {
        for sample in [
            include_str!("../../templates/config-minimal.yaml"),
            include_str!("../../templates/config-with-examples.yaml"),
        ] {
            let config =
                warden_core::domain::config::WardenConfigManifest::from_yaml_str(sample).unwrap();
            assert_eq!(config.kind, "WardenConfig");
            assert!(!config.spec.llm_providers.is_empty());
        }
    }
}
