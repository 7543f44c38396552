// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use warden_core::application::backup_scheduler::{BackupScheduler, BackupSchedulerConfig};
use warden_core::application::command_gate::CommandGate;
use warden_core::application::AgentOrchestrator;
use warden_core::domain::clock::{Clock, SystemClock};
use warden_core::domain::command::{CommandMode, CommandState};
use warden_core::domain::config::BackupConfig;
use warden_core::domain::events::CommandEvent;
use warden_core::domain::llm::{
    ChatMessage, FinishReason, GenerationOptions, GenerationResponse, LLMError, LLMGateway,
    TokenUsage,
};
use warden_core::domain::policy::PolicyEngine;
use warden_core::domain::repository::{AccessLogRepository, SnapshotRepository};
use warden_core::domain::risk::{RiskLevel, WarningKind};
use warden_core::infrastructure::event_bus::{DomainEvent, EventBus};
use warden_core::infrastructure::repositories::{
    InMemoryAccessLogRepository, InMemoryCommandRepository, InMemorySnapshotRepository,
};
use warden_core::infrastructure::storage::LocalSnapshotStorage;

struct ScriptedGateway {
    calls: AtomicUsize,
}

#[async_trait]
impl LLMGateway for ScriptedGateway {
    async fn generate(
        &self,
        model_alias: &str,
        _messages: &[ChatMessage],
        _options: &GenerationOptions,
    ) -> Result<GenerationResponse, LLMError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(GenerationResponse {
            text: "Removes every row in users; take a backup first.".to_string(),
            usage: TokenUsage {
                prompt_tokens: 30,
                completion_tokens: 10,
                total_tokens: 40,
            },
            provider: "mock".to_string(),
            model: model_alias.to_string(),
            finish_reason: FinishReason::Stop,
        })
    }
}

struct Harness {
    _dir: TempDir,
    orchestrator: AgentOrchestrator,
    llm: Arc<ScriptedGateway>,
    access_log: Arc<InMemoryAccessLogRepository>,
    snapshots: Arc<InMemorySnapshotRepository>,
    commands: Arc<InMemoryCommandRepository>,
    event_bus: EventBus,
}

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let app = dir.path().join("app");
    write(&app.join("src/lib.rs"), "pub fn f() {}");
    write(&app.join("config/db.yaml"), "host: localhost");
    write(&app.join("data/seed.sql"), "insert into users values (1);");

    let mut backup = BackupConfig::default();
    backup.source_root = app;
    backup.snapshot_root = dir.path().join("backups");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let event_bus = EventBus::with_default_capacity();
    let policy = Arc::new(PolicyEngine::new().unwrap());
    let llm = Arc::new(ScriptedGateway {
        calls: AtomicUsize::new(0),
    });
    let access_log = Arc::new(InMemoryAccessLogRepository::new());
    let snapshots = Arc::new(InMemorySnapshotRepository::new());
    let commands = Arc::new(InMemoryCommandRepository::new());

    let gate = Arc::new(
        CommandGate::new(
            policy.clone(),
            llm.clone(),
            access_log.clone(),
            clock.clone(),
            event_bus.clone(),
        )
        .unwrap(),
    );
    let scheduler = Arc::new(BackupScheduler::new(
        BackupSchedulerConfig::from(&backup),
        Arc::new(LocalSnapshotStorage::new()),
        snapshots.clone(),
        clock.clone(),
        event_bus.clone(),
    ));
    let orchestrator = AgentOrchestrator::new(
        policy,
        gate,
        scheduler,
        commands.clone(),
        clock,
        event_bus.clone(),
        "default",
    );
    orchestrator.set_principal("admin-1").unwrap();

    Harness {
        _dir: dir,
        orchestrator,
        llm,
        access_log,
        snapshots,
        commands,
        event_bus,
    }
}

#[tokio::test]
async fn test_critical_command_takes_backup_before_analysis() {
    let h = harness();

    let response = h
        .orchestrator
        .process_command("admin-1", "DELETE FROM users WHERE 1=1", CommandMode::Normal, None)
        .await
        .unwrap();

    assert!(response.success);
    assert!(response.can_proceed);
    assert_eq!(response.risk_level, RiskLevel::Critical);
    assert!(!response.warnings.is_empty());
    assert!(response.result.is_some());

    let backup_ref = response.backup_ref.expect("manual snapshot taken");
    let snapshot = h.snapshots.find_by_id(backup_ref).await.unwrap().unwrap();
    assert!(snapshot.location.is_dir());
    assert!(response
        .warnings
        .iter()
        .any(|w| w.kind == WarningKind::Backup && w.message.contains(&backup_ref.short())));

    let entries = h.access_log.list_recent(10).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].executed());
    assert_eq!(entries[0].backup_ref(), Some(backup_ref));
    assert_eq!(h.llm.calls.load(Ordering::SeqCst), 1);

    let history = h.orchestrator.history().await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].state(), CommandState::Completed);
    assert_eq!(history[0].access_log_id(), Some(entries[0].id()));
    // pending, executing, completed
    assert_eq!(h.commands.revision_count(), 3);
}

#[tokio::test]
async fn test_denylisted_command_is_blocked_without_backup() {
    let h = harness();

    let response = h
        .orchestrator
        .process_command("admin-1", "rm -rf /", CommandMode::Autonomous, None)
        .await
        .unwrap();

    assert!(!response.success);
    assert!(!response.can_proceed);
    assert_eq!(response.risk_level, RiskLevel::Critical);
    assert!(response.backup_ref.is_none());
    assert!(response.warnings.iter().any(|w| !w.can_proceed));

    assert!(h.snapshots.list_all().await.unwrap().is_empty());
    assert_eq!(h.llm.calls.load(Ordering::SeqCst), 0);

    let entries = h.access_log.list_recent(10).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert!(!entries[0].executed());

    let history = h.orchestrator.history().await.unwrap();
    assert_eq!(history[0].state(), CommandState::Completed);
}

#[tokio::test]
async fn test_unauthorized_principal_leaves_no_trace() {
    let h = harness();
    let mut events = h.event_bus.subscribe();

    let response = h
        .orchestrator
        .process_command("intruder", "DELETE FROM users WHERE 1=1", CommandMode::Normal, None)
        .await
        .unwrap();

    assert!(!response.can_proceed);
    assert!(!response.success);
    assert!(response.command_id.is_none());

    assert!(h.access_log.list_recent(10).await.unwrap().is_empty());
    assert!(h.snapshots.list_all().await.unwrap().is_empty());
    assert_eq!(h.commands.revision_count(), 0);
    assert_eq!(h.llm.calls.load(Ordering::SeqCst), 0);

    match events.recv().await.unwrap() {
        DomainEvent::Command(CommandEvent::UnauthorizedAttempt { principal_id, .. }) => {
            assert_eq!(principal_id, "intruder");
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_low_risk_command_skips_backup() {
    let h = harness();

    let response = h
        .orchestrator
        .process_command("admin-1", "how many users signed up this week", CommandMode::Creative, Some("fast"))
        .await
        .unwrap();

    assert!(response.success);
    assert_eq!(response.risk_level, RiskLevel::Low);
    assert!(response.backup_ref.is_none());
    assert!(h.snapshots.list_all().await.unwrap().is_empty());

    let entries = h.access_log.list_recent(1).await.unwrap();
    assert_eq!(entries[0].model(), "fast");
    assert_eq!(entries[0].mode(), CommandMode::Creative);
}

#[tokio::test]
async fn test_history_preserves_insertion_order() {
    let h = harness();

    for text in ["list tables", "rm -rf /tmp/cache", "show slow queries"] {
        h.orchestrator
            .process_command("admin-1", text, CommandMode::Normal, None)
            .await
            .unwrap();
    }

    let history = h.orchestrator.history().await.unwrap();
    let texts: Vec<_> = history.iter().map(|c| c.command_text.as_str()).collect();
    assert_eq!(texts, vec!["list tables", "rm -rf /tmp/cache", "show slow queries"]);
    assert!(history.iter().all(|c| c.state().is_terminal()));
}
