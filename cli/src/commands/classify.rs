// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Offline classification: policy rules, denylist pre-screen and keyword risk.
//! Nothing is sent to a model and nothing is recorded.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde_json::json;
use std::path::PathBuf;

use super::exec::{colorize_risk, print_warnings};
use crate::embedded::offline_gate;
use warden_core::domain::config::WardenConfigManifest;

#[derive(Args)]
pub struct ClassifyCommand {
    /// Command text to classify
    #[arg(value_name = "TEXT")]
    pub text: String,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(command: ClassifyCommand, config_path: Option<PathBuf>) -> Result<()> {
    let config = WardenConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;
    let (policy, gate) = offline_gate(&config)?;

    let classification = policy.classify(&command.text);
    let screen = gate.pre_screen(&command.text);
    let keyword_risk = gate.evaluate(&command.text);
    let risk = keyword_risk.max(classification.risk_level());

    if command.json {
        let report = json!({
            "classification": classification,
            "pre_screen": {
                "blocked": screen.blocked,
                "reason": screen.reason,
            },
            "keyword_risk": keyword_risk,
            "risk_level": risk,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if screen.blocked {
        println!(
            "{} {}",
            "✗ blocked".red().bold(),
            screen.reason.unwrap_or_default()
        );
    } else {
        println!("{}", "✓ passes pre-screen".green());
    }
    println!("  Risk: {}", colorize_risk(risk));
    println!("  Keyword tier: {}", keyword_risk);
    println!("  Policy severity: {:?}", classification.aggregate_severity);
    println!(
        "  Backup recommended: {}",
        if classification.recommend_backup { "yes" } else { "no" }
    );

    if !classification.matched_rules.is_empty() {
        println!("{}", "  Matched rules:".bold());
        for rule in &classification.matched_rules {
            println!("    - {} ({:?})", rule.name, rule.severity);
        }
    }

    print_warnings(&classification.warnings());
    Ok(())
}
