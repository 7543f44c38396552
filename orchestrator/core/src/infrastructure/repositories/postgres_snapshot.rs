// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! PostgreSQL implementation of SnapshotRepository

use crate::domain::repository::{RepositoryError, SnapshotRepository};
use crate::domain::snapshot::{SnapshotId, SnapshotKind, SnapshotMetadata, SnapshotOutcome};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::path::PathBuf;
use tracing::{debug, warn};
use uuid::Uuid;

const COLUMNS: &str =
    "id, created_at, kind, byte_size, outcome, description, location, files_copied, files_skipped";

pub struct PostgresSnapshotRepository {
    pool: PgPool,
}

impl PostgresSnapshotRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn deserialize_row(row: &sqlx::postgres::PgRow) -> Result<SnapshotMetadata, RepositoryError> {
        let kind: String = row.try_get("kind")?;
        let outcome: String = row.try_get("outcome")?;
        let location: String = row.try_get("location")?;

        Ok(SnapshotMetadata {
            id: SnapshotId(row.try_get::<Uuid, _>("id")?),
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            kind: kind.parse::<SnapshotKind>().map_err(RepositoryError::Serialization)?,
            byte_size: row.try_get::<i64, _>("byte_size")?.max(0) as u64,
            outcome: outcome
                .parse::<SnapshotOutcome>()
                .map_err(RepositoryError::Serialization)?,
            description: row.try_get("description")?,
            location: PathBuf::from(location),
            files_copied: row.try_get::<i64, _>("files_copied")?.max(0) as u64,
            files_skipped: row.try_get::<i64, _>("files_skipped")?.max(0) as u64,
        })
    }

    fn collect(rows: Vec<sqlx::postgres::PgRow>) -> Vec<SnapshotMetadata> {
        rows.iter()
            .filter_map(|row| match Self::deserialize_row(row) {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    warn!("Failed to deserialize snapshot row: {}", e);
                    None
                }
            })
            .collect()
    }
}

#[async_trait]
impl SnapshotRepository for PostgresSnapshotRepository {
    async fn append(&self, snapshot: &SnapshotMetadata) -> Result<(), RepositoryError> {
        sqlx::query(&format!(
            "INSERT INTO snapshots ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            COLUMNS
        ))
        .bind(snapshot.id.0)
        .bind(snapshot.created_at)
        .bind(snapshot.kind.as_str())
        .bind(snapshot.byte_size as i64)
        .bind(snapshot.outcome.as_str())
        .bind(snapshot.description.as_deref())
        .bind(snapshot.location.to_string_lossy().as_ref())
        .bind(snapshot.files_copied as i64)
        .bind(snapshot.files_skipped as i64)
        .execute(&self.pool)
        .await?;

        debug!("Recorded snapshot {}", snapshot.id);
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<SnapshotMetadata>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM snapshots ORDER BY created_at DESC",
            COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(Self::collect(rows))
    }

    async fn find_by_id(&self, id: SnapshotId) -> Result<Option<SnapshotMetadata>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {} FROM snapshots WHERE id = $1", COLUMNS))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::deserialize_row).transpose()
    }

    async fn find_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<SnapshotMetadata>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM snapshots WHERE created_at < $1 ORDER BY created_at ASC",
            COLUMNS
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(Self::collect(rows))
    }

    async fn remove(&self, id: SnapshotId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM snapshots WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("snapshot {}", id)));
        }
        Ok(())
    }
}
