// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! PostgreSQL implementation of CommandRepository
//!
//! Each lifecycle transition inserts a row into `agent_command_revisions`;
//! the full aggregate is stored as JSONB in `body`.

use crate::domain::command::{AgentCommand, CommandId};
use crate::domain::repository::{CommandRepository, RepositoryError};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::warn;

pub struct PostgresCommandRepository {
    pool: PgPool,
}

impl PostgresCommandRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn deserialize_row(row: &sqlx::postgres::PgRow) -> Result<AgentCommand, RepositoryError> {
        let body: serde_json::Value = row.try_get("body")?;
        Ok(serde_json::from_value(body)?)
    }
}

#[async_trait]
impl CommandRepository for PostgresCommandRepository {
    async fn append_revision(&self, command: &AgentCommand) -> Result<(), RepositoryError> {
        let body = serde_json::to_value(command)?;

        sqlx::query(
            r#"
            INSERT INTO agent_command_revisions (command_id, state, created_at, body)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(command.id.0)
        .bind(command.state().as_str())
        .bind(command.created_at)
        .bind(body)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: CommandId) -> Result<Option<AgentCommand>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT body FROM agent_command_revisions
            WHERE command_id = $1
            ORDER BY revision DESC
            LIMIT 1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::deserialize_row).transpose()
    }

    async fn history(&self) -> Result<Vec<AgentCommand>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT body FROM (
                SELECT DISTINCT ON (command_id) command_id, created_at, revision, body
                FROM agent_command_revisions
                ORDER BY command_id, revision DESC
            ) latest
            ORDER BY created_at ASC, revision ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut commands = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            match Self::deserialize_row(row) {
                Ok(command) => commands.push(command),
                Err(e) => warn!("Failed to deserialize command revision: {}", e),
            }
        }
        Ok(commands)
    }
}
