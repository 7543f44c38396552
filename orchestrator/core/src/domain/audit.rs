// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Access Log
//!
//! Immutable audit record written once per `CommandGate::dispatch` call.
//! There are no mutators: a correction is a new entry.

use crate::domain::command::CommandMode;
use crate::domain::llm::TokenUsage;
use crate::domain::risk::{RiskLevel, Warning};
use crate::domain::snapshot::SnapshotId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessLogId(pub Uuid);

impl AccessLogId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AccessLogId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AccessLogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessLogEntry {
    id: AccessLogId,
    principal_id: String,
    command_text: String,
    risk_level: RiskLevel,
    warnings: Vec<Warning>,
    executed: bool,
    result: String,
    created_at: DateTime<Utc>,
    backup_ref: Option<SnapshotId>,
    mode: CommandMode,
    model: String,
    usage: Option<TokenUsage>,
}

/// Fields needed to write an entry. The id is assigned on construction.
#[derive(Debug, Clone)]
pub struct NewAccessLogEntry {
    pub principal_id: String,
    pub command_text: String,
    pub risk_level: RiskLevel,
    pub warnings: Vec<Warning>,
    pub executed: bool,
    pub result: String,
    pub backup_ref: Option<SnapshotId>,
    pub mode: CommandMode,
    pub model: String,
    pub usage: Option<TokenUsage>,
}

impl AccessLogEntry {
    pub fn record(entry: NewAccessLogEntry, created_at: DateTime<Utc>) -> Self {
        Self {
            id: AccessLogId::new(),
            principal_id: entry.principal_id,
            command_text: entry.command_text,
            risk_level: entry.risk_level,
            warnings: entry.warnings,
            executed: entry.executed,
            result: entry.result,
            created_at,
            backup_ref: entry.backup_ref,
            mode: entry.mode,
            model: entry.model,
            usage: entry.usage,
        }
    }

    /// Rebuild an entry read back from storage.
    pub fn from_parts(
        id: AccessLogId,
        entry: NewAccessLogEntry,
        created_at: DateTime<Utc>,
    ) -> Self {
        let mut rebuilt = Self::record(entry, created_at);
        rebuilt.id = id;
        rebuilt
    }

    pub fn id(&self) -> AccessLogId {
        self.id
    }

    pub fn principal_id(&self) -> &str {
        &self.principal_id
    }

    pub fn command_text(&self) -> &str {
        &self.command_text
    }

    pub fn risk_level(&self) -> RiskLevel {
        self.risk_level
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn executed(&self) -> bool {
        self.executed
    }

    pub fn result(&self) -> &str {
        &self.result
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn backup_ref(&self) -> Option<SnapshotId> {
        self.backup_ref
    }

    pub fn mode(&self) -> CommandMode {
        self.mode
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn usage(&self) -> Option<&TokenUsage> {
        self.usage.as_ref()
    }
}
