// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Snapshot commands
//!
//! Commands: create, list, latest, cleanup, restore

use anyhow::{anyhow, Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use crate::embedded::Services;
use warden_core::domain::config::WardenConfigManifest;
use warden_core::domain::snapshot::{SnapshotId, SnapshotKind, SnapshotMetadata, SnapshotOutcome};

#[derive(Subcommand)]
pub enum SnapshotCommand {
    /// Take a manual snapshot now
    Create {
        /// Free-form note stored with the snapshot
        #[arg(short, long)]
        description: Option<String>,
    },

    /// List snapshots, most recent first
    List {
        /// Include partial and failed snapshots
        #[arg(long)]
        all: bool,
    },

    /// Show the most recent restorable snapshot
    Latest,

    /// Evict snapshots older than the retention window
    Cleanup,

    /// Copy a snapshot back over the source root
    Restore {
        #[arg(value_name = "ID")]
        id: String,
    },
}

pub async fn handle_command(command: SnapshotCommand, config_path: Option<PathBuf>) -> Result<()> {
    let config = WardenConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;
    let services = Services::build(config).await?;
    let scheduler = &services.scheduler;

    match command {
        SnapshotCommand::Create { description } => {
            let snapshot = scheduler
                .run_snapshot(SnapshotKind::Manual, description)
                .await
                .context("Failed to record snapshot")?;
            print_snapshot(&snapshot, None);
            if snapshot.outcome == SnapshotOutcome::Failed {
                return Err(anyhow!("Snapshot failed"));
            }
        }
        SnapshotCommand::List { all } => {
            if all {
                let snapshots = scheduler.list_all().await?;
                if snapshots.is_empty() {
                    println!("{}", "No snapshots recorded".dimmed());
                }
                for snapshot in &snapshots {
                    print_snapshot(snapshot, Some(snapshot.directory_exists()));
                }
            } else {
                let available = scheduler.list_available().await?;
                if available.is_empty() {
                    println!("{}", "No restorable snapshots".dimmed());
                }
                for snapshot in &available {
                    print_snapshot(&snapshot.metadata, Some(snapshot.can_restore));
                }
            }
        }
        SnapshotCommand::Latest => match scheduler.latest().await? {
            Some(snapshot) => print_snapshot(&snapshot.metadata, Some(snapshot.can_restore)),
            None => println!("{}", "No restorable snapshots".dimmed()),
        },
        SnapshotCommand::Cleanup => {
            let evicted = scheduler.cleanup_expired().await?;
            println!("{}", format!("✓ Evicted {} snapshot(s)", evicted).green());
        }
        SnapshotCommand::Restore { id } => {
            let id: SnapshotId = id
                .parse()
                .map_err(|e| anyhow!("Invalid snapshot id '{}': {}", id, e))?;
            let report = scheduler
                .restore(id)
                .await
                .with_context(|| format!("Failed to restore snapshot {}", id))?;
            println!(
                "{}",
                format!(
                    "✓ Restored {} file(s), {} bytes",
                    report.files_copied, report.bytes_copied
                )
                .green()
            );
            for (path, reason) in &report.skipped {
                println!("  {} {}: {}", "skipped".yellow(), path.display(), reason);
            }
        }
    }

    Ok(())
}

fn print_snapshot(snapshot: &SnapshotMetadata, can_restore: Option<bool>) {
    let outcome = match snapshot.outcome {
        SnapshotOutcome::Success => snapshot.outcome.as_str().green(),
        SnapshotOutcome::Partial => snapshot.outcome.as_str().yellow(),
        SnapshotOutcome::Failed => snapshot.outcome.as_str().red(),
    };
    println!(
        "{} {} {} {}",
        snapshot.id.to_string().bold(),
        snapshot.kind,
        snapshot.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
        outcome
    );
    println!(
        "  {} file(s), {} bytes, {} skipped",
        snapshot.files_copied, snapshot.byte_size, snapshot.files_skipped
    );
    println!("  Location: {}", snapshot.location.display());
    if let Some(description) = &snapshot.description {
        println!("  Note: {}", description);
    }
    if can_restore == Some(false) {
        println!("  {}", "directory missing, cannot restore".red());
    }
}
