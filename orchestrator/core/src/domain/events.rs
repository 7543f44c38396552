// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use crate::domain::audit::AccessLogId;
use crate::domain::command::{CommandId, CommandMode};
use crate::domain::risk::RiskLevel;
use crate::domain::snapshot::{SnapshotId, SnapshotKind, SnapshotOutcome};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CommandEvent {
    UnauthorizedAttempt {
        principal_id: String,
        attempted_at: DateTime<Utc>,
    },
    CommandReceived {
        command_id: CommandId,
        mode: CommandMode,
        model: String,
        received_at: DateTime<Utc>,
    },
    CommandBlocked {
        command_id: Option<CommandId>,
        access_log_id: AccessLogId,
        reason: String,
        blocked_at: DateTime<Utc>,
    },
    CommandAnalyzed {
        command_id: Option<CommandId>,
        access_log_id: AccessLogId,
        risk_level: RiskLevel,
        total_tokens: u32,
        analyzed_at: DateTime<Utc>,
    },
    CommandFailed {
        command_id: Option<CommandId>,
        access_log_id: Option<AccessLogId>,
        error: String,
        failed_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SnapshotEvent {
    SnapshotCompleted {
        snapshot_id: SnapshotId,
        kind: SnapshotKind,
        outcome: SnapshotOutcome,
        byte_size: u64,
        completed_at: DateTime<Utc>,
    },
    SnapshotEvicted {
        snapshot_id: SnapshotId,
        evicted_at: DateTime<Utc>,
    },
    SnapshotEvictionFailed {
        snapshot_id: SnapshotId,
        error: String,
        failed_at: DateTime<Utc>,
    },
}
