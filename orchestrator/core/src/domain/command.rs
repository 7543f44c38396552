// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Command Aggregate
//!
//! One admin request as it moves through the orchestrator. The lifecycle is
//! strictly forward:
//!
//! ```text
//! Pending ──start──▶ Executing ──complete──▶ Completed
//!                              └──fail──────▶ Failed
//! ```
//!
//! Every transition produces a new revision that the `CommandRepository`
//! appends; revisions are never rewritten.

use crate::domain::audit::AccessLogId;
use crate::domain::repository::RepositoryError;
use crate::domain::risk::Warning;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandId(pub Uuid);

impl CommandId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CommandId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tone of the analysis prompt. Never affects the safety checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandMode {
    Normal,
    Autonomous,
    Creative,
}

impl CommandMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandMode::Normal => "normal",
            CommandMode::Autonomous => "autonomous",
            CommandMode::Creative => "creative",
        }
    }

    /// System-prompt framing appended after the fixed safety instructions
    pub fn framing(&self) -> &'static str {
        match self {
            CommandMode::Normal => {
                "Answer in a measured, step-by-step tone. Describe what would happen and what to check first."
            }
            CommandMode::Autonomous => {
                "Act as an autonomous operations planner. Lay out the full plan you would follow, \
                 including verification and rollback steps, but do not claim anything was carried out."
            }
            CommandMode::Creative => {
                "Explore alternative approaches and trade-offs freely. Suggest safer or cheaper ways \
                 to reach the same goal."
            }
        }
    }
}

impl Default for CommandMode {
    fn default() -> Self {
        CommandMode::Normal
    }
}

impl fmt::Display for CommandMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "normal" => Ok(CommandMode::Normal),
            "autonomous" => Ok(CommandMode::Autonomous),
            "creative" => Ok(CommandMode::Creative),
            other => Err(format!("unknown mode: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandState {
    Pending,
    Executing,
    Completed,
    Failed,
}

impl CommandState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandState::Pending => "pending",
            CommandState::Executing => "executing",
            CommandState::Completed => "completed",
            CommandState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CommandState::Completed | CommandState::Failed)
    }

    fn can_transition_to(&self, next: CommandState) -> bool {
        matches!(
            (self, next),
            (CommandState::Pending, CommandState::Executing)
                | (CommandState::Executing, CommandState::Completed)
                | (CommandState::Executing, CommandState::Failed)
        )
    }
}

impl fmt::Display for CommandState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CommandState::Pending),
            "executing" => Ok(CommandState::Executing),
            "completed" => Ok(CommandState::Completed),
            "failed" => Ok(CommandState::Failed),
            other => Err(format!("unknown command state: {}", other)),
        }
    }
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Principal '{0}' is not authorized to issue commands")]
    UnauthorizedPrincipal(String),

    #[error("A different principal is already bound")]
    PrincipalAlreadyBound,

    #[error("Illegal command state transition {from} -> {to}")]
    InvalidTransition { from: CommandState, to: CommandState },

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCommand {
    pub id: CommandId,
    pub principal_id: String,
    pub command_text: String,
    pub mode: CommandMode,
    pub model: String,
    pub created_at: DateTime<Utc>,
    state: CommandState,
    result: Option<String>,
    warnings: Vec<Warning>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    execution_time_ms: Option<u64>,
    access_log_id: Option<AccessLogId>,
}

impl AgentCommand {
    pub fn new(
        principal_id: impl Into<String>,
        command_text: impl Into<String>,
        mode: CommandMode,
        model: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: CommandId::new(),
            principal_id: principal_id.into(),
            command_text: command_text.into(),
            mode,
            model: model.into(),
            created_at,
            state: CommandState::Pending,
            result: None,
            warnings: Vec::new(),
            started_at: None,
            ended_at: None,
            execution_time_ms: None,
            access_log_id: None,
        }
    }

    pub fn state(&self) -> CommandState {
        self.state
    }

    pub fn result(&self) -> Option<&str> {
        self.result.as_deref()
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    pub fn execution_time_ms(&self) -> Option<u64> {
        self.execution_time_ms
    }

    pub fn access_log_id(&self) -> Option<AccessLogId> {
        self.access_log_id
    }

    fn transition(&mut self, next: CommandState) -> Result<(), CommandError> {
        if !self.state.can_transition_to(next) {
            return Err(CommandError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    pub fn start(&mut self, at: DateTime<Utc>) -> Result<(), CommandError> {
        self.transition(CommandState::Executing)?;
        self.started_at = Some(at);
        Ok(())
    }

    pub fn add_warnings(&mut self, warnings: impl IntoIterator<Item = Warning>) {
        self.warnings.extend(warnings);
    }

    pub fn complete(
        &mut self,
        result: String,
        access_log_id: Option<AccessLogId>,
        at: DateTime<Utc>,
        execution_time_ms: u64,
    ) -> Result<(), CommandError> {
        self.transition(CommandState::Completed)?;
        self.finish(result, access_log_id, at, execution_time_ms);
        Ok(())
    }

    pub fn fail(
        &mut self,
        error: String,
        access_log_id: Option<AccessLogId>,
        at: DateTime<Utc>,
        execution_time_ms: u64,
    ) -> Result<(), CommandError> {
        self.transition(CommandState::Failed)?;
        self.finish(error, access_log_id, at, execution_time_ms);
        Ok(())
    }

    fn finish(
        &mut self,
        result: String,
        access_log_id: Option<AccessLogId>,
        at: DateTime<Utc>,
        execution_time_ms: u64,
    ) {
        self.result = Some(result);
        self.access_log_id = access_log_id;
        self.ended_at = Some(at);
        self.execution_time_ms = Some(execution_time_ms);
    }

    /// Rebuild a revision read back from storage, bypassing the state machine.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: CommandId,
        principal_id: String,
        command_text: String,
        mode: CommandMode,
        model: String,
        created_at: DateTime<Utc>,
        state: CommandState,
        result: Option<String>,
        warnings: Vec<Warning>,
        started_at: Option<DateTime<Utc>>,
        ended_at: Option<DateTime<Utc>>,
        execution_time_ms: Option<u64>,
        access_log_id: Option<AccessLogId>,
    ) -> Self {
        Self {
            id,
            principal_id,
            command_text,
            mode,
            model,
            created_at,
            state,
            result,
            warnings,
            started_at,
            ended_at,
            execution_time_ms,
            access_log_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command() -> AgentCommand {
        AgentCommand::new("admin", "show users", CommandMode::Normal, "default", Utc::now())
    }

    #[test]
    fn test_forward_lifecycle() {
        let mut cmd = command();
        assert_eq!(cmd.state(), CommandState::Pending);
        cmd.start(Utc::now()).unwrap();
        assert_eq!(cmd.state(), CommandState::Executing);
        cmd.complete("ok".to_string(), None, Utc::now(), 12).unwrap();
        assert_eq!(cmd.state(), CommandState::Completed);
        assert_eq!(cmd.result(), Some("ok"));
        assert_eq!(cmd.execution_time_ms(), Some(12));
    }

    #[test]
    fn test_cannot_complete_from_pending() {
        let mut cmd = command();
        let err = cmd.complete("ok".to_string(), None, Utc::now(), 0).unwrap_err();
        assert!(matches!(
            err,
            CommandError::InvalidTransition {
                from: CommandState::Pending,
                to: CommandState::Completed
            }
        ));
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut cmd = command();
        cmd.start(Utc::now()).unwrap();
        cmd.fail("boom".to_string(), None, Utc::now(), 3).unwrap();
        assert!(cmd.state().is_terminal());
        assert!(cmd.start(Utc::now()).is_err());
        assert!(cmd.complete("late".to_string(), None, Utc::now(), 4).is_err());
        assert_eq!(cmd.result(), Some("boom"));
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("Creative".parse::<CommandMode>().unwrap(), CommandMode::Creative);
        assert!("turbo".parse::<CommandMode>().is_err());
    }
}
