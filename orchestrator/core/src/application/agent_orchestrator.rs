// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Agent Orchestrator
//!
//! Entry point for admin commands. Binds the single authorized principal,
//! drives each `AgentCommand` through its lifecycle, takes a manual snapshot
//! ahead of critical commands and hands the command to the `CommandGate`.
//!
//! Commands are processed one at a time.

use crate::application::backup_scheduler::BackupScheduler;
use crate::application::command_gate::{CommandGate, DispatchOutcome, DispatchRequest};
use crate::domain::clock::Clock;
use crate::domain::command::{AgentCommand, CommandError, CommandId, CommandMode};
use crate::domain::events::CommandEvent;
use crate::domain::policy::PolicyEngine;
use crate::domain::repository::CommandRepository;
use crate::domain::risk::{RiskLevel, Warning, WarningKind};
use crate::domain::snapshot::{SnapshotId, SnapshotKind, SnapshotOutcome};
use crate::infrastructure::event_bus::EventBus;
use serde::Serialize;
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// What the caller gets back from `process_command`
#[derive(Debug, Clone, Serialize)]
pub struct CommandResponse {
    pub success: bool,
    pub can_proceed: bool,
    pub message: String,
    pub warnings: Vec<Warning>,
    pub result: Option<String>,
    pub execution_time_ms: u64,
    pub command_id: Option<CommandId>,
    pub risk_level: RiskLevel,
    pub backup_ref: Option<SnapshotId>,
}

impl CommandResponse {
    fn unauthorized(principal_id: &str) -> Self {
        Self {
            success: false,
            can_proceed: false,
            message: format!("Principal '{}' is not authorized", principal_id),
            warnings: vec![Warning::blocking(
                WarningKind::Security,
                "Unauthorized principal",
            )],
            result: None,
            execution_time_ms: 0,
            command_id: None,
            risk_level: RiskLevel::Low,
            backup_ref: None,
        }
    }
}

pub struct AgentOrchestrator {
    principal: OnceLock<String>,
    policy: Arc<PolicyEngine>,
    gate: Arc<CommandGate>,
    scheduler: Arc<BackupScheduler>,
    commands: Arc<dyn CommandRepository>,
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
    default_model: String,
    serial: Mutex<()>,
}

impl AgentOrchestrator {
    pub fn new(
        policy: Arc<PolicyEngine>,
        gate: Arc<CommandGate>,
        scheduler: Arc<BackupScheduler>,
        commands: Arc<dyn CommandRepository>,
        clock: Arc<dyn Clock>,
        event_bus: EventBus,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            principal: OnceLock::new(),
            policy,
            gate,
            scheduler,
            commands,
            clock,
            event_bus,
            default_model: default_model.into(),
            serial: Mutex::new(()),
        }
    }

    /// Bind the admin principal. Binding the same id again is a no-op.
    pub fn set_principal(&self, principal_id: &str) -> Result<(), CommandError> {
        if principal_id.trim().is_empty() {
            return Err(CommandError::UnauthorizedPrincipal(principal_id.to_string()));
        }

        let bound = self.principal.get_or_init(|| principal_id.to_string());
        if bound != principal_id {
            return Err(CommandError::PrincipalAlreadyBound);
        }

        info!(principal_id = %principal_id, "Admin principal bound");
        Ok(())
    }

    pub fn principal(&self) -> Option<&str> {
        self.principal.get().map(String::as_str)
    }

    fn is_authorized(&self, principal_id: &str) -> bool {
        self.principal
            .get()
            .map(|bound| bound == principal_id)
            .unwrap_or(false)
    }

    pub async fn process_command(
        &self,
        principal_id: &str,
        command_text: &str,
        mode: CommandMode,
        model: Option<&str>,
    ) -> Result<CommandResponse, CommandError> {
        if !self.is_authorized(principal_id) {
            warn!(principal_id = %principal_id, "Unauthorized command attempt");
            self.event_bus.publish_command_event(CommandEvent::UnauthorizedAttempt {
                principal_id: principal_id.to_string(),
                attempted_at: self.clock.now(),
            });
            return Ok(CommandResponse::unauthorized(principal_id));
        }

        let _serial = self.serial.lock().await;
        let started = Instant::now();
        let model = model.unwrap_or(&self.default_model).to_string();

        let mut command = AgentCommand::new(
            principal_id,
            command_text,
            mode,
            model.clone(),
            self.clock.now(),
        );
        self.commands.append_revision(&command).await?;
        self.event_bus.publish_command_event(CommandEvent::CommandReceived {
            command_id: command.id,
            mode,
            model: model.clone(),
            received_at: command.created_at,
        });

        command.start(self.clock.now())?;
        self.record_revision(&mut command, started).await?;

        let screen = self.gate.pre_screen(command_text);
        let classification = self.policy.classify(command_text);

        info!(
            command_id = %command.id,
            mode = %mode,
            severity = ?classification.aggregate_severity,
            recommend_backup = classification.recommend_backup,
            blocked = screen.blocked,
            "Processing command"
        );

        let mut warnings = Vec::new();
        let backup_ref = if classification.recommend_backup && !screen.blocked {
            self.snapshot_before(&command, &mut warnings).await
        } else {
            None
        };

        let outcome = self
            .gate
            .dispatch(DispatchRequest {
                command_text: command_text.to_string(),
                principal_id: principal_id.to_string(),
                risk_hint: classification.risk_level(),
                mode,
                model,
                backup_ref,
                command_id: Some(command.id),
            })
            .await;

        let elapsed_ms = started.elapsed().as_millis() as u64;

        let response = match outcome {
            Ok(DispatchOutcome::Analyzed { entry, .. }) => {
                warnings.extend_from_slice(entry.warnings());
                command.add_warnings(warnings.clone());
                command.complete(
                    entry.result().to_string(),
                    Some(entry.id()),
                    self.clock.now(),
                    elapsed_ms,
                )?;
                CommandResponse {
                    success: true,
                    can_proceed: true,
                    message: "Command analyzed".to_string(),
                    warnings,
                    result: Some(entry.result().to_string()),
                    execution_time_ms: elapsed_ms,
                    command_id: Some(command.id),
                    risk_level: entry.risk_level(),
                    backup_ref,
                }
            }
            Ok(DispatchOutcome::Blocked(entry)) => {
                warnings.extend_from_slice(entry.warnings());
                command.add_warnings(warnings.clone());
                command.complete(
                    entry.result().to_string(),
                    Some(entry.id()),
                    self.clock.now(),
                    elapsed_ms,
                )?;
                CommandResponse {
                    success: false,
                    can_proceed: false,
                    message: entry.result().to_string(),
                    warnings,
                    result: None,
                    execution_time_ms: elapsed_ms,
                    command_id: Some(command.id),
                    risk_level: entry.risk_level(),
                    backup_ref,
                }
            }
            Ok(DispatchOutcome::AnalysisFailed { entry, error }) => {
                warnings.extend_from_slice(entry.warnings());
                command.add_warnings(warnings.clone());
                command.fail(error.clone(), Some(entry.id()), self.clock.now(), elapsed_ms)?;
                CommandResponse {
                    success: false,
                    can_proceed: true,
                    message: format!("Analysis failed: {}", error),
                    warnings,
                    result: None,
                    execution_time_ms: elapsed_ms,
                    command_id: Some(command.id),
                    risk_level: entry.risk_level(),
                    backup_ref,
                }
            }
            Err(e) => {
                let error = e.to_string();
                warn!(command_id = %command.id, error = %error, "Dispatch failed");
                command.add_warnings(warnings.clone());
                command.fail(error.clone(), None, self.clock.now(), elapsed_ms)?;
                self.event_bus.publish_command_event(CommandEvent::CommandFailed {
                    command_id: Some(command.id),
                    access_log_id: None,
                    error: error.clone(),
                    failed_at: self.clock.now(),
                });
                CommandResponse {
                    success: false,
                    can_proceed: false,
                    message: error,
                    warnings,
                    result: None,
                    execution_time_ms: elapsed_ms,
                    command_id: Some(command.id),
                    risk_level: classification.risk_level(),
                    backup_ref,
                }
            }
        };

        self.record_revision(&mut command, started).await?;

        info!(
            command_id = %command.id,
            state = %command.state(),
            execution_time_ms = elapsed_ms,
            "Command finished"
        );

        Ok(response)
    }

    /// Persist a revision of a started command. If the write fails, one more
    /// write is attempted so the stored history ends in a terminal state; an
    /// in-flight command is marked failed first.
    async fn record_revision(
        &self,
        command: &mut AgentCommand,
        started: Instant,
    ) -> Result<(), CommandError> {
        let Err(e) = self.commands.append_revision(command).await else {
            return Ok(());
        };

        warn!(
            command_id = %command.id,
            state = %command.state(),
            error = %e,
            "Failed to record command revision"
        );

        if !command.state().is_terminal() {
            command.fail(
                format!("Failed to record command revision: {}", e),
                None,
                self.clock.now(),
                started.elapsed().as_millis() as u64,
            )?;
        }
        if let Err(retry) = self.commands.append_revision(command).await {
            error!(
                command_id = %command.id,
                state = %command.state(),
                error = %retry,
                "Command history is stale"
            );
        }

        Err(e.into())
    }

    /// Take a manual snapshot. Failure becomes a warning, never an error.
    async fn snapshot_before(
        &self,
        command: &AgentCommand,
        warnings: &mut Vec<Warning>,
    ) -> Option<SnapshotId> {
        let description = format!("Before command {}", command.id);
        match self
            .scheduler
            .run_snapshot(SnapshotKind::Manual, Some(description))
            .await
        {
            Ok(snapshot) => match snapshot.outcome {
                SnapshotOutcome::Success => Some(snapshot.id),
                SnapshotOutcome::Partial => {
                    warnings.push(Warning::advisory(
                        WarningKind::Backup,
                        format!(
                            "Snapshot {} is partial: {} file(s) skipped",
                            snapshot.id.short(),
                            snapshot.files_skipped
                        ),
                    ));
                    Some(snapshot.id)
                }
                SnapshotOutcome::Failed => {
                    warnings.push(
                        Warning::advisory(WarningKind::Backup, "Pre-command snapshot failed")
                            .with_suggestion("Check the snapshot root before running this command"),
                    );
                    None
                }
            },
            Err(e) => {
                warn!(command_id = %command.id, error = %e, "Pre-command snapshot failed");
                warnings.push(Warning::advisory(
                    WarningKind::Backup,
                    format!("Pre-command snapshot failed: {}", e),
                ));
                None
            }
        }
    }

    /// Latest revision of every command, in the order they were received
    pub async fn history(&self) -> Result<Vec<AgentCommand>, CommandError> {
        Ok(self.commands.history().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::backup_scheduler::BackupSchedulerConfig;
    use crate::domain::clock::SystemClock;
    use crate::domain::config::BackupConfig;
    use crate::domain::llm::{ChatMessage, GenerationOptions, GenerationResponse, LLMError, LLMGateway};
    use crate::domain::repository::RepositoryError;
    use crate::infrastructure::repositories::{
        InMemoryAccessLogRepository, InMemoryCommandRepository, InMemorySnapshotRepository,
    };
    use crate::infrastructure::storage::LocalSnapshotStorage;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct FailingGateway;

    #[async_trait]
    impl LLMGateway for FailingGateway {
        async fn generate(
            &self,
            _model_alias: &str,
            _messages: &[ChatMessage],
            _options: &GenerationOptions,
        ) -> Result<GenerationResponse, LLMError> {
            Err(LLMError::Network("connection refused".to_string()))
        }
    }

    fn orchestrator(dir: &TempDir) -> (AgentOrchestrator, Arc<InMemoryCommandRepository>) {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let event_bus = EventBus::with_default_capacity();
        let policy = Arc::new(PolicyEngine::new().unwrap());
        let gate = Arc::new(
            CommandGate::new(
                policy.clone(),
                Arc::new(FailingGateway),
                Arc::new(InMemoryAccessLogRepository::new()),
                clock.clone(),
                event_bus.clone(),
            )
            .unwrap(),
        );
        let mut backup = BackupConfig::default();
        backup.source_root = dir.path().join("app");
        backup.snapshot_root = dir.path().join("backups");
        let scheduler = Arc::new(BackupScheduler::new(
            BackupSchedulerConfig::from(&backup),
            Arc::new(LocalSnapshotStorage::new()),
            Arc::new(InMemorySnapshotRepository::new()),
            clock.clone(),
            event_bus.clone(),
        ));
        let commands = Arc::new(InMemoryCommandRepository::new());
        let orchestrator = AgentOrchestrator::new(
            policy,
            gate,
            scheduler,
            commands.clone(),
            clock,
            event_bus,
            "default",
        );
        (orchestrator, commands)
    }

    #[test]
    fn test_principal_binding() {
        let dir = TempDir::new().unwrap();
        let (orchestrator, _) = orchestrator(&dir);
        assert!(orchestrator.principal().is_none());
        orchestrator.set_principal("admin").unwrap();
        orchestrator.set_principal("admin").unwrap();
        assert!(matches!(
            orchestrator.set_principal("mallory"),
            Err(CommandError::PrincipalAlreadyBound)
        ));
        assert_eq!(orchestrator.principal(), Some("admin"));
    }

    #[tokio::test]
    async fn test_no_principal_means_unauthorized() {
        let dir = TempDir::new().unwrap();
        let (orchestrator, commands) = orchestrator(&dir);
        let response = orchestrator
            .process_command("admin", "show users", CommandMode::Normal, None)
            .await
            .unwrap();
        assert!(!response.can_proceed);
        assert!(response.command_id.is_none());
        assert_eq!(commands.revision_count(), 0);
    }

    /// Command store that rejects one chosen append
    struct FlakyCommands {
        inner: InMemoryCommandRepository,
        appends: std::sync::atomic::AtomicUsize,
        fail_on: usize,
    }

    #[async_trait]
    impl CommandRepository for FlakyCommands {
        async fn append_revision(&self, command: &AgentCommand) -> Result<(), RepositoryError> {
            let n = self.appends.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
            if n == self.fail_on {
                return Err(RepositoryError::Database("disk full".to_string()));
            }
            self.inner.append_revision(command).await
        }

        async fn find_by_id(&self, id: CommandId) -> Result<Option<AgentCommand>, RepositoryError> {
            self.inner.find_by_id(id).await
        }

        async fn history(&self) -> Result<Vec<AgentCommand>, RepositoryError> {
            self.inner.history().await
        }
    }

    #[tokio::test]
    async fn test_failed_revision_write_leaves_command_failed() {
        let dir = TempDir::new().unwrap();
        let (base, _) = orchestrator(&dir);
        // revision 1 = pending, 2 = executing
        let commands = Arc::new(FlakyCommands {
            inner: InMemoryCommandRepository::new(),
            appends: std::sync::atomic::AtomicUsize::new(0),
            fail_on: 2,
        });
        let orchestrator = AgentOrchestrator::new(
            base.policy.clone(),
            base.gate.clone(),
            base.scheduler.clone(),
            commands.clone(),
            Arc::new(SystemClock),
            EventBus::with_default_capacity(),
            "default",
        );
        orchestrator.set_principal("admin").unwrap();

        let err = orchestrator
            .process_command("admin", "show users", CommandMode::Normal, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Repository(_)));

        let history = orchestrator.history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].state(), crate::domain::command::CommandState::Failed);
        assert!(history[0].result().unwrap().contains("disk full"));
    }

    #[tokio::test]
    async fn test_analysis_failure_marks_command_failed() {
        let dir = TempDir::new().unwrap();
        let (orchestrator, _) = orchestrator(&dir);
        orchestrator.set_principal("admin").unwrap();

        let response = orchestrator
            .process_command("admin", "how many users signed up today", CommandMode::Normal, None)
            .await
            .unwrap();

        assert!(!response.success);
        assert!(response.message.contains("connection refused"));

        let history = orchestrator.history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].state(), crate::domain::command::CommandState::Failed);
        assert!(history[0].result().unwrap().contains("connection refused"));
    }
}
