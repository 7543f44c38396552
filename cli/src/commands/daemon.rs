// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Foreground service mode
//!
//! Builds the services, starts both backup cadences and logs domain events
//! until Ctrl+C or SIGTERM.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::embedded::Services;
use warden_core::domain::config::WardenConfigManifest;
use warden_core::infrastructure::event_bus::{EventBus, EventBusError};

pub async fn run(config_path: Option<PathBuf>) -> Result<()> {
    let config = WardenConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    info!(
        name = %config.metadata.name,
        source_root = %config.spec.backup.source_root.display(),
        snapshot_root = %config.spec.backup.snapshot_root.display(),
        "Warden daemon starting (PID: {})",
        std::process::id()
    );

    let services = Services::build(config).await?;

    for (alias, health) in services.llm_registry.health_check_all().await {
        match health {
            Ok(()) => info!(alias = %alias, "LLM provider reachable"),
            Err(e) => warn!(alias = %alias, error = %e, "LLM provider health check failed"),
        }
    }

    let shutdown = CancellationToken::new();
    let events = tokio::spawn(log_events(services.event_bus.clone(), shutdown.clone()));
    let scheduler = services.scheduler.clone().start(shutdown.clone());

    info!(tasks = scheduler.task_count(), "Backup cadences running");

    shutdown_signal().await;

    info!("Daemon shutting down");
    scheduler.shutdown().await;
    if let Err(e) = events.await {
        warn!("Event logger ended abnormally: {}", e);
    }

    Ok(())
}

async fn log_events(event_bus: EventBus, shutdown: CancellationToken) {
    let mut receiver = event_bus.subscribe();
    loop {
        tokio::select! {
            event = receiver.recv() => match event {
                Ok(event) => info!(event = ?event, "Domain event"),
                Err(EventBusError::Lagged(n)) => warn!(dropped = n, "Event log fell behind"),
                Err(_) => break,
            },
            _ = shutdown.cancelled() => break,
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
