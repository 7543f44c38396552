// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Repository Factory - Application Layer
//!
//! Creates concrete repository implementations based on storage backend configuration.
//! The domain layer only defines the repository traits; this is the one place that
//! knows which infrastructure type backs each of them.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Selects in-memory or PostgreSQL repositories

use anyhow::{anyhow, Result};
use sqlx::PgPool;
use std::sync::Arc;

use crate::domain::repository::{
    AccessLogRepository, CommandRepository, SnapshotRepository, StorageBackend,
};
use crate::infrastructure::repositories::{
    InMemoryAccessLogRepository, InMemoryCommandRepository, InMemorySnapshotRepository,
    PostgresAccessLogRepository, PostgresCommandRepository, PostgresSnapshotRepository,
};

/// The three append-only stores used by the services
#[derive(Clone)]
pub struct Repositories {
    pub access_log: Arc<dyn AccessLogRepository>,
    pub snapshots: Arc<dyn SnapshotRepository>,
    pub commands: Arc<dyn CommandRepository>,
}

fn require_pool(pool: Option<PgPool>) -> Result<PgPool> {
    pool.ok_or_else(|| anyhow!("PostgreSQL backend requires a database connection"))
}

/// Creates an AccessLogRepository implementation based on the configured backend
pub fn create_access_log_repository(
    backend: &StorageBackend,
    pool: Option<PgPool>,
) -> Result<Arc<dyn AccessLogRepository>> {
    Ok(match backend {
        StorageBackend::InMemory => Arc::new(InMemoryAccessLogRepository::new()),
        StorageBackend::PostgreSQL(_) => {
            Arc::new(PostgresAccessLogRepository::new(require_pool(pool)?))
        }
    })
}

/// Creates a SnapshotRepository implementation based on the configured backend
pub fn create_snapshot_repository(
    backend: &StorageBackend,
    pool: Option<PgPool>,
) -> Result<Arc<dyn SnapshotRepository>> {
    Ok(match backend {
        StorageBackend::InMemory => Arc::new(InMemorySnapshotRepository::new()),
        StorageBackend::PostgreSQL(_) => {
            Arc::new(PostgresSnapshotRepository::new(require_pool(pool)?))
        }
    })
}

/// Creates a CommandRepository implementation based on the configured backend
pub fn create_command_repository(
    backend: &StorageBackend,
    pool: Option<PgPool>,
) -> Result<Arc<dyn CommandRepository>> {
    Ok(match backend {
        StorageBackend::InMemory => Arc::new(InMemoryCommandRepository::new()),
        StorageBackend::PostgreSQL(_) => {
            Arc::new(PostgresCommandRepository::new(require_pool(pool)?))
        }
    })
}

pub fn create_repositories(backend: &StorageBackend, pool: Option<PgPool>) -> Result<Repositories> {
    Ok(Repositories {
        access_log: create_access_log_repository(backend, pool.clone())?,
        snapshots: create_snapshot_repository(backend, pool.clone())?,
        commands: create_command_repository(backend, pool)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::repository::PostgresConfig;

    #[test]
    fn test_in_memory_needs_no_pool() {
        assert!(create_repositories(&StorageBackend::InMemory, None).is_ok());
    }

    #[test]
    fn test_postgres_without_pool_is_rejected() {
        let backend = StorageBackend::PostgreSQL(PostgresConfig {
            connection_string: "postgres://localhost/warden".to_string(),
        });
        assert!(create_repositories(&backend, None).is_err());
    }
}
