// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the repository contracts defined in
//! `crate::domain::repository`.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist and retrieve audit entries, snapshot metadata and command revisions
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! ## PostgreSQL Repositories
//!
//! - **PostgresAccessLogRepository** - `access_log` table
//! - **PostgresSnapshotRepository** - `snapshots` table
//! - **PostgresCommandRepository** - `agent_command_revisions` table
//!
//! ## In-Memory Repositories
//!
//! Process-local storage for development, tests and the single-shot CLI
//! commands. Contents are lost on exit.

pub mod postgres_access_log;
pub mod postgres_command;
pub mod postgres_snapshot;

pub use postgres_access_log::PostgresAccessLogRepository;
pub use postgres_command::PostgresCommandRepository;
pub use postgres_snapshot::PostgresSnapshotRepository;

use crate::domain::audit::AccessLogEntry;
use crate::domain::command::{AgentCommand, CommandId};
use crate::domain::repository::{
    AccessLogRepository, CommandRepository, RepositoryError, SnapshotRepository,
};
use crate::domain::snapshot::{SnapshotId, SnapshotMetadata};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct InMemoryAccessLogRepository {
    entries: Arc<RwLock<Vec<AccessLogEntry>>>,
}

impl InMemoryAccessLogRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccessLogRepository for InMemoryAccessLogRepository {
    async fn append(&self, entry: &AccessLogEntry) -> Result<(), RepositoryError> {
        self.entries.write().push(entry.clone());
        Ok(())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<AccessLogEntry>, RepositoryError> {
        let entries = self.entries.read();
        Ok(entries.iter().rev().take(limit).cloned().collect())
    }

    async fn find_by_principal(
        &self,
        principal_id: &str,
        limit: usize,
    ) -> Result<Vec<AccessLogEntry>, RepositoryError> {
        let entries = self.entries.read();
        Ok(entries
            .iter()
            .rev()
            .filter(|e| e.principal_id() == principal_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[derive(Clone, Default)]
pub struct InMemorySnapshotRepository {
    snapshots: Arc<RwLock<Vec<SnapshotMetadata>>>,
}

impl InMemorySnapshotRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotRepository for InMemorySnapshotRepository {
    async fn append(&self, snapshot: &SnapshotMetadata) -> Result<(), RepositoryError> {
        let mut snapshots = self.snapshots.write();
        if snapshots.iter().any(|s| s.id == snapshot.id) {
            return Err(RepositoryError::Database(format!(
                "snapshot {} already recorded",
                snapshot.id
            )));
        }
        snapshots.push(snapshot.clone());
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<SnapshotMetadata>, RepositoryError> {
        let mut all = self.snapshots.read().clone();
        // Stable sort keeps insertion order for equal timestamps
        all.reverse();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn find_by_id(&self, id: SnapshotId) -> Result<Option<SnapshotMetadata>, RepositoryError> {
        Ok(self.snapshots.read().iter().find(|s| s.id == id).cloned())
    }

    async fn find_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<SnapshotMetadata>, RepositoryError> {
        Ok(self
            .snapshots
            .read()
            .iter()
            .filter(|s| s.is_older_than(cutoff))
            .cloned()
            .collect())
    }

    async fn remove(&self, id: SnapshotId) -> Result<(), RepositoryError> {
        let mut snapshots = self.snapshots.write();
        let before = snapshots.len();
        snapshots.retain(|s| s.id != id);
        if snapshots.len() == before {
            return Err(RepositoryError::NotFound(format!("snapshot {}", id)));
        }
        Ok(())
    }
}

/// Append-only revision log; reads fold to the latest revision per command.
#[derive(Clone, Default)]
pub struct InMemoryCommandRepository {
    revisions: Arc<RwLock<Vec<AgentCommand>>>,
}

impl InMemoryCommandRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn revision_count(&self) -> usize {
        self.revisions.read().len()
    }
}

#[async_trait]
impl CommandRepository for InMemoryCommandRepository {
    async fn append_revision(&self, command: &AgentCommand) -> Result<(), RepositoryError> {
        self.revisions.write().push(command.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: CommandId) -> Result<Option<AgentCommand>, RepositoryError> {
        Ok(self
            .revisions
            .read()
            .iter()
            .rev()
            .find(|c| c.id == id)
            .cloned())
    }

    async fn history(&self) -> Result<Vec<AgentCommand>, RepositoryError> {
        let revisions = self.revisions.read();
        let mut order: Vec<CommandId> = Vec::new();
        let mut latest: HashMap<CommandId, &AgentCommand> = HashMap::new();
        for revision in revisions.iter() {
            if latest.insert(revision.id, revision).is_none() {
                order.push(revision.id);
            }
        }
        Ok(order
            .into_iter()
            .filter_map(|id| latest.get(&id).map(|c| (*c).clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::audit::NewAccessLogEntry;
    use crate::domain::command::{CommandMode, CommandState};
    use crate::domain::risk::RiskLevel;
    use crate::domain::snapshot::{SnapshotKind, SnapshotOutcome};
    use chrono::Duration;
    use std::path::PathBuf;

    fn entry(principal: &str, text: &str) -> AccessLogEntry {
        AccessLogEntry::record(
            NewAccessLogEntry {
                principal_id: principal.to_string(),
                command_text: text.to_string(),
                risk_level: RiskLevel::Low,
                warnings: vec![],
                executed: true,
                result: "ok".to_string(),
                backup_ref: None,
                mode: CommandMode::Normal,
                model: "default".to_string(),
                usage: None,
            },
            Utc::now(),
        )
    }

    fn snapshot(created_at: DateTime<Utc>) -> SnapshotMetadata {
        SnapshotMetadata {
            id: SnapshotId::new(),
            created_at,
            kind: SnapshotKind::Hourly,
            byte_size: 10,
            outcome: SnapshotOutcome::Success,
            description: None,
            location: PathBuf::from("/tmp/none"),
            files_copied: 1,
            files_skipped: 0,
        }
    }

    #[tokio::test]
    async fn test_access_log_recent_first() {
        let repo = InMemoryAccessLogRepository::new();
        repo.append(&entry("admin", "first")).await.unwrap();
        repo.append(&entry("other", "second")).await.unwrap();
        repo.append(&entry("admin", "third")).await.unwrap();

        let recent = repo.list_recent(2).await.unwrap();
        assert_eq!(recent[0].command_text(), "third");
        assert_eq!(recent[1].command_text(), "second");

        let mine = repo.find_by_principal("admin", 10).await.unwrap();
        assert_eq!(mine.len(), 2);
        assert!(mine.iter().all(|e| e.principal_id() == "admin"));
    }

    #[tokio::test]
    async fn test_snapshot_ordering_and_cutoff() {
        let repo = InMemorySnapshotRepository::new();
        let now = Utc::now();
        let old = snapshot(now - Duration::days(40));
        let fresh = snapshot(now);
        repo.append(&old).await.unwrap();
        repo.append(&fresh).await.unwrap();

        let all = repo.list_all().await.unwrap();
        assert_eq!(all[0].id, fresh.id);

        let expired = repo.find_older_than(now - Duration::days(30)).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, old.id);

        repo.remove(old.id).await.unwrap();
        assert!(repo.find_by_id(old.id).await.unwrap().is_none());
        assert!(matches!(repo.remove(old.id).await, Err(RepositoryError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_duplicate_snapshot_rejected() {
        let repo = InMemorySnapshotRepository::new();
        let s = snapshot(Utc::now());
        repo.append(&s).await.unwrap();
        assert!(repo.append(&s).await.is_err());
    }

    #[tokio::test]
    async fn test_command_history_folds_revisions() {
        let repo = InMemoryCommandRepository::new();
        let mut first = AgentCommand::new("admin", "a", CommandMode::Normal, "default", Utc::now());
        let second = AgentCommand::new("admin", "b", CommandMode::Normal, "default", Utc::now());

        repo.append_revision(&first).await.unwrap();
        repo.append_revision(&second).await.unwrap();
        first.start(Utc::now()).unwrap();
        repo.append_revision(&first).await.unwrap();

        assert_eq!(repo.revision_count(), 3);
        let history = repo.history().await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, first.id);
        assert_eq!(history[0].state(), CommandState::Executing);
        assert_eq!(history[1].state(), CommandState::Pending);

        let found = repo.find_by_id(first.id).await.unwrap().unwrap();
        assert_eq!(found.state(), CommandState::Executing);
    }
}
