// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Connection Pool
//!
//! Wraps `sqlx::postgres::PgPool` in a thin `Database` newtype injected into
//! the PostgreSQL repository implementations. Only used when
//! `spec.storage.backend` is `postgres`.

use anyhow::{Context, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS access_log (
        id UUID PRIMARY KEY,
        principal_id TEXT NOT NULL,
        command_text TEXT NOT NULL,
        risk_level TEXT NOT NULL,
        warnings JSONB NOT NULL DEFAULT '[]'::jsonb,
        executed BOOLEAN NOT NULL,
        result TEXT NOT NULL,
        backup_ref UUID,
        mode TEXT NOT NULL,
        model TEXT NOT NULL,
        usage JSONB,
        created_at TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_access_log_created_at ON access_log (created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_access_log_principal ON access_log (principal_id, created_at DESC)",
    r#"
    CREATE TABLE IF NOT EXISTS snapshots (
        id UUID PRIMARY KEY,
        created_at TIMESTAMPTZ NOT NULL,
        kind TEXT NOT NULL,
        byte_size BIGINT NOT NULL,
        outcome TEXT NOT NULL,
        description TEXT,
        location TEXT NOT NULL,
        files_copied BIGINT NOT NULL,
        files_skipped BIGINT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_snapshots_created_at ON snapshots (created_at DESC)",
    r#"
    CREATE TABLE IF NOT EXISTS agent_command_revisions (
        revision BIGSERIAL PRIMARY KEY,
        command_id UUID NOT NULL,
        state TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        body JSONB NOT NULL,
        recorded_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_command_revisions_command ON agent_command_revisions (command_id, revision DESC)",
];

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn new(connection_string: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(connection_string)
            .await
            .context("Failed to connect to PostgreSQL")?;

        Ok(Self { pool })
    }

    pub fn get_pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create tables and indexes if missing. Idempotent.
    pub async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Failed to apply schema")?;
        }
        tracing::info!("Database schema is up to date");
        Ok(())
    }
}
