// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! PostgreSQL implementation of AccessLogRepository
//!
//! Rows are inserted once and never updated.

use crate::domain::audit::{AccessLogEntry, AccessLogId, NewAccessLogEntry};
use crate::domain::command::CommandMode;
use crate::domain::llm::TokenUsage;
use crate::domain::repository::{AccessLogRepository, RepositoryError};
use crate::domain::risk::{RiskLevel, Warning};
use crate::domain::snapshot::SnapshotId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::{debug, error, warn};
use uuid::Uuid;

pub struct PostgresAccessLogRepository {
    pool: PgPool,
}

impl PostgresAccessLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn deserialize_row(row: &sqlx::postgres::PgRow) -> Result<AccessLogEntry, RepositoryError> {
        let id: Uuid = row.try_get("id")?;
        let risk_level: String = row.try_get("risk_level")?;
        let mode: String = row.try_get("mode")?;
        let warnings: serde_json::Value = row.try_get("warnings")?;
        let usage: Option<serde_json::Value> = row.try_get("usage")?;
        let backup_ref: Option<Uuid> = row.try_get("backup_ref")?;
        let created_at: DateTime<Utc> = row.try_get("created_at")?;

        let entry = NewAccessLogEntry {
            principal_id: row.try_get("principal_id")?,
            command_text: row.try_get("command_text")?,
            risk_level: risk_level
                .parse::<RiskLevel>()
                .map_err(RepositoryError::Serialization)?,
            warnings: serde_json::from_value::<Vec<Warning>>(warnings)?,
            executed: row.try_get("executed")?,
            result: row.try_get("result")?,
            backup_ref: backup_ref.map(SnapshotId),
            mode: mode.parse::<CommandMode>().map_err(RepositoryError::Serialization)?,
            model: row.try_get("model")?,
            usage: usage.map(serde_json::from_value::<TokenUsage>).transpose()?,
        };

        Ok(AccessLogEntry::from_parts(AccessLogId(id), entry, created_at))
    }

    fn collect(rows: Vec<sqlx::postgres::PgRow>) -> Vec<AccessLogEntry> {
        let mut entries = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            match Self::deserialize_row(row) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!("Failed to deserialize access log entry: {}", e),
            }
        }
        entries
    }
}

#[async_trait]
impl AccessLogRepository for PostgresAccessLogRepository {
    async fn append(&self, entry: &AccessLogEntry) -> Result<(), RepositoryError> {
        let warnings = serde_json::to_value(entry.warnings())?;
        let usage = entry.usage().map(serde_json::to_value).transpose()?;

        sqlx::query(
            r#"
            INSERT INTO access_log
                (id, principal_id, command_text, risk_level, warnings, executed,
                 result, backup_ref, mode, model, usage, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(entry.id().0)
        .bind(entry.principal_id())
        .bind(entry.command_text())
        .bind(entry.risk_level().as_str())
        .bind(warnings)
        .bind(entry.executed())
        .bind(entry.result())
        .bind(entry.backup_ref().map(|id| id.0))
        .bind(entry.mode().as_str())
        .bind(entry.model())
        .bind(usage)
        .bind(entry.created_at())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to append access log entry: {}", e);
            RepositoryError::Database(e.to_string())
        })?;

        debug!("Appended access log entry {}", entry.id());
        Ok(())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<AccessLogEntry>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, principal_id, command_text, risk_level, warnings, executed,
                   result, backup_ref, mode, model, usage, created_at
            FROM access_log
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(Self::collect(rows))
    }

    async fn find_by_principal(
        &self,
        principal_id: &str,
        limit: usize,
    ) -> Result<Vec<AccessLogEntry>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, principal_id, command_text, risk_level, warnings, executed,
                   result, backup_ref, mode, model, usage, created_at
            FROM access_log
            WHERE principal_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(principal_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(Self::collect(rows))
    }
}
