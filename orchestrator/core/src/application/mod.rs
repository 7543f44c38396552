// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod agent_orchestrator;
pub mod backup_scheduler;
pub mod command_gate;
pub mod repository_factory;

pub use agent_orchestrator::{AgentOrchestrator, CommandResponse};
pub use backup_scheduler::{BackupScheduler, BackupSchedulerConfig, SchedulerHandle};
pub use command_gate::{CommandGate, DispatchOutcome, DispatchRequest, GateError, PreScreen};
pub use repository_factory::{create_repositories, Repositories};
