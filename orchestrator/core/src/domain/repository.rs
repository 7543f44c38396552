// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts for the append-only records this system produces,
//! implemented in `crate::infrastructure::repositories`.
//!
//! | Trait | Record | Implementations |
//! |-------|--------|----------------|
//! | `AccessLogRepository` | `AccessLogEntry` | `InMemoryAccessLogRepository`, `PostgresAccessLogRepository` |
//! | `SnapshotRepository` | `SnapshotMetadata` | `InMemorySnapshotRepository`, `PostgresSnapshotRepository` |
//! | `CommandRepository` | `AgentCommand` revisions | `InMemoryCommandRepository`, `PostgresCommandRepository` |
//!
//! Stores are append-only. The single exception is `SnapshotRepository::remove`,
//! used by retention eviction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crate::domain::audit::AccessLogEntry;
use crate::domain::command::{AgentCommand, CommandId};
use crate::domain::snapshot::{SnapshotId, SnapshotMetadata};

/// Storage backend enum for pluggable persistence
#[derive(Debug, Clone)]
pub enum StorageBackend {
    InMemory,
    PostgreSQL(PostgresConfig),
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub connection_string: String,
}

/// Audit trail of every dispatch attempt
#[async_trait]
pub trait AccessLogRepository: Send + Sync {
    /// Append a new entry
    async fn append(&self, entry: &AccessLogEntry) -> Result<(), RepositoryError>;

    /// Most recent entries first
    async fn list_recent(&self, limit: usize) -> Result<Vec<AccessLogEntry>, RepositoryError>;

    /// Most recent entries for one principal first
    async fn find_by_principal(&self, principal_id: &str, limit: usize) -> Result<Vec<AccessLogEntry>, RepositoryError>;
}

#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    /// Append snapshot metadata
    async fn append(&self, snapshot: &SnapshotMetadata) -> Result<(), RepositoryError>;

    /// All snapshots, most recent first
    async fn list_all(&self) -> Result<Vec<SnapshotMetadata>, RepositoryError>;

    async fn find_by_id(&self, id: SnapshotId) -> Result<Option<SnapshotMetadata>, RepositoryError>;

    /// Snapshots created strictly before `cutoff`
    async fn find_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<SnapshotMetadata>, RepositoryError>;

    /// Retention eviction
    async fn remove(&self, id: SnapshotId) -> Result<(), RepositoryError>;
}

/// Lifecycle history of agent commands. Each state change is appended as a
/// new revision; readers see the latest revision of each command.
#[async_trait]
pub trait CommandRepository: Send + Sync {
    async fn append_revision(&self, command: &AgentCommand) -> Result<(), RepositoryError>;

    /// Latest revision of a command
    async fn find_by_id(&self, id: CommandId) -> Result<Option<AgentCommand>, RepositoryError>;

    /// Latest revision of every command, in the order commands were created
    async fn history(&self) -> Result<Vec<AgentCommand>, RepositoryError>;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
