// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-process service wiring
//!
//! Builds the policy engine, command gate, backup scheduler and orchestrator
//! from a loaded configuration. The CLI owns the single instance.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use warden_core::{
    application::{
        create_repositories, AgentOrchestrator, BackupScheduler, BackupSchedulerConfig,
        CommandGate, Repositories,
    },
    domain::{
        clock::{Clock, SystemClock},
        config::WardenConfigManifest,
        llm::GenerationOptions,
        policy::PolicyEngine,
        repository::StorageBackend,
    },
    infrastructure::{
        db::Database, event_bus::EventBus, llm::ProviderRegistry,
        repositories::InMemoryAccessLogRepository, storage::LocalSnapshotStorage,
    },
};

pub struct Services {
    pub config: WardenConfigManifest,
    pub policy: Arc<PolicyEngine>,
    pub gate: Arc<CommandGate>,
    pub scheduler: Arc<BackupScheduler>,
    pub orchestrator: Arc<AgentOrchestrator>,
    pub repositories: Repositories,
    pub llm_registry: Arc<ProviderRegistry>,
    pub event_bus: EventBus,
}

impl Services {
    pub async fn build(config: WardenConfigManifest) -> Result<Self> {
        config
            .validate()
            .context("Configuration validation failed")?;

        let backend = config.storage_backend()?;
        let pool = match &backend {
            StorageBackend::InMemory => {
                info!("Using in-memory storage; audit log and snapshot records last for this process only");
                None
            }
            StorageBackend::PostgreSQL(pg) => {
                let database = Database::new(&pg.connection_string)
                    .await
                    .context("Failed to connect to database")?;
                database
                    .migrate()
                    .await
                    .context("Failed to prepare database schema")?;
                Some(database.get_pool().clone())
            }
        };
        let repositories = create_repositories(&backend, pool)?;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let event_bus = EventBus::with_default_capacity();
        let policy = Arc::new(build_policy(&config)?);
        let llm_registry = Arc::new(
            ProviderRegistry::from_config(&config.spec.llm_providers)
                .context("Failed to initialize LLM providers")?,
        );

        let gate = Arc::new(
            CommandGate::new(
                policy.clone(),
                llm_registry.clone(),
                repositories.access_log.clone(),
                clock.clone(),
                event_bus.clone(),
            )?
            .with_generation_options(generation_options(&config)),
        );

        let scheduler = Arc::new(BackupScheduler::new(
            BackupSchedulerConfig::from(&config.spec.backup),
            Arc::new(LocalSnapshotStorage::new()),
            repositories.snapshots.clone(),
            clock.clone(),
            event_bus.clone(),
        ));

        let orchestrator = Arc::new(AgentOrchestrator::new(
            policy.clone(),
            gate.clone(),
            scheduler.clone(),
            repositories.commands.clone(),
            clock,
            event_bus.clone(),
            config.spec.llm_selection.default_model.clone(),
        ));

        match config.spec.principal.resolved_admin_id() {
            Some(admin_id) => orchestrator
                .set_principal(&admin_id)
                .context("Failed to bind admin principal")?,
            None => warn!("No admin principal configured; every command will be rejected"),
        }

        Ok(Self {
            config,
            policy,
            gate,
            scheduler,
            orchestrator,
            repositories,
            llm_registry,
            event_bus,
        })
    }
}

/// Policy engine plus a gate that records nowhere durable; enough for
/// offline classification.
pub fn offline_gate(config: &WardenConfigManifest) -> Result<(Arc<PolicyEngine>, CommandGate)> {
    let policy = Arc::new(build_policy(config)?);
    let registry = Arc::new(ProviderRegistry::with_providers(Vec::new()));
    let gate = CommandGate::new(
        policy.clone(),
        registry,
        Arc::new(InMemoryAccessLogRepository::new()),
        Arc::new(SystemClock),
        EventBus::with_default_capacity(),
    )?;
    Ok((policy, gate))
}

fn build_policy(config: &WardenConfigManifest) -> Result<PolicyEngine> {
    PolicyEngine::with_additional(&config.spec.policy.additional_rules)
        .context("Failed to compile policy rules")
}

fn generation_options(config: &WardenConfigManifest) -> GenerationOptions {
    GenerationOptions {
        max_tokens: Some(config.spec.llm_selection.max_tokens),
        temperature: Some(config.spec.llm_selection.temperature),
    }
}
