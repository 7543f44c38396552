// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command Gate
//!
//! Last stop before a command reaches the language model. The gate:
//!
//! 1. Pre-screens the text against a hard denylist (irreversible operations,
//!    sensitive paths, shell-injection structure). A match short-circuits
//!    everything: no model call, no executed audit record.
//! 2. Scores risk as the maximum of its own keyword tiers, the policy
//!    engine's classification and the caller's hint.
//! 3. Asks the model exactly once to *explain* the command's effect.
//! 4. Appends exactly one `AccessLogEntry` per dispatch.
//!
//! Only failing to persist the audit record is an `Err`; a failed model call
//! is an ordinary outcome.

use crate::domain::audit::{AccessLogEntry, NewAccessLogEntry};
use crate::domain::clock::Clock;
use crate::domain::command::{CommandId, CommandMode};
use crate::domain::events::CommandEvent;
use crate::domain::llm::{ChatMessage, GenerationOptions, LLMGateway, TokenUsage};
use crate::domain::policy::{normalize, PolicyEngine, PolicyError};
use crate::domain::repository::{AccessLogRepository, RepositoryError};
use crate::domain::risk::{RiskLevel, Warning, WarningKind};
use crate::domain::snapshot::SnapshotId;
use crate::infrastructure::event_bus::EventBus;
use regex::Regex;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Fixed instructions sent ahead of every analysis request.
pub const SAFETY_PROMPT: &str = "You are a read-only operations reviewer. \
Explain what the following command would do, which data or systems it touches, \
and what could go wrong. Never perform, simulate, or claim to have performed the \
command. Do not produce a modified version intended to bypass safeguards.";

const CRITICAL_KEYWORDS: &[&str] = &["delete", "drop", "truncate", "destroy"];
const HIGH_KEYWORDS: &[&str] = &["update", "alter", "modify", "change"];
const MEDIUM_KEYWORDS: &[&str] = &["create", "insert", "backup"];

const DATA_MODIFICATION_KEYWORDS: &[&str] =
    &["update", "insert", "delete", "alter", "drop", "truncate"];
const SECURITY_KEYWORDS: &[&str] = &[
    "password",
    "passwords",
    "key",
    "keys",
    "secret",
    "secrets",
    "token",
    "tokens",
    "credential",
    "credentials",
];

/// (reason, pattern) pairs matched against lowercased, whitespace-collapsed text
const DENYLIST_PATTERNS: &[(&str, &str)] = &[
    // irreversible operations
    ("filesystem format", r"\bmkfs(\.[a-z0-9]+)?\b"),
    ("raw disk write", r"\bdd\s+if="),
    ("block device overwrite", r">\s*/dev/(sd|hd|nvme|xvd)"),
    ("privilege escalation", r"\bsudo\b|\bsu\s+-|\bdoas\b|\bpkexec\b"),
    (
        "dynamic code execution",
        r"\b(eval|exec)\s*\(|\bos\.system\b|\bsubprocess\.|__import__",
    ),
    ("destructive sql", r"\bdrop\s+(table|database)\b|\btruncate\s+table\b"),
    // sensitive paths
    ("system credential file", r"/etc/(passwd|shadow|sudoers|gshadow)\b"),
    ("ssh configuration", r"~/\.ssh\b|\.ssh/"),
    ("private key file", r"\bid_(rsa|dsa|ecdsa|ed25519)\b|\.pem\b|\.key\b"),
    ("environment secrets file", r"(^|[\s/'\x22])\.env\b"),
    ("cloud credentials", r"\.aws/credentials|\.kube/config"),
];

// ============================================================================
// Requests and outcomes
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreScreen {
    pub blocked: bool,
    pub reason: Option<String>,
}

impl PreScreen {
    fn allowed() -> Self {
        Self {
            blocked: false,
            reason: None,
        }
    }

    fn blocked(reason: impl Into<String>) -> Self {
        Self {
            blocked: true,
            reason: Some(reason.into()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub command_text: String,
    pub principal_id: String,
    pub risk_hint: RiskLevel,
    pub mode: CommandMode,
    pub model: String,
    pub backup_ref: Option<SnapshotId>,
    /// Correlates gate events with the orchestrator's command, when there is one
    pub command_id: Option<CommandId>,
}

#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    Analyzed {
        entry: AccessLogEntry,
        usage: TokenUsage,
    },
    Blocked(AccessLogEntry),
    AnalysisFailed {
        entry: AccessLogEntry,
        error: String,
    },
}

impl DispatchOutcome {
    pub fn entry(&self) -> &AccessLogEntry {
        match self {
            DispatchOutcome::Analyzed { entry, .. } => entry,
            DispatchOutcome::Blocked(entry) => entry,
            DispatchOutcome::AnalysisFailed { entry, .. } => entry,
        }
    }
}

#[derive(Debug, Error)]
pub enum GateError {
    #[error("Failed to record access log entry: {0}")]
    AuditLog(#[from] RepositoryError),

    #[error("Invalid denylist: {0}")]
    Denylist(#[from] PolicyError),
}

// ============================================================================
// Denylist
// ============================================================================

struct Denylist {
    patterns: Vec<(&'static str, Regex)>,
}

impl Denylist {
    fn new() -> Result<Self, PolicyError> {
        let patterns = DENYLIST_PATTERNS
            .iter()
            .map(|(reason, pattern)| {
                Regex::new(pattern)
                    .map(|regex| (*reason, regex))
                    .map_err(|e| PolicyError::InvalidPattern {
                        rule: reason.to_string(),
                        reason: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    fn check(&self, command_text: &str) -> PreScreen {
        let normalized = normalize(command_text).to_lowercase();

        if recursive_forced_removal(&normalized) {
            return PreScreen::blocked("Blocked by hard denylist: recursive forced removal");
        }

        if let Some((reason, _)) = self
            .patterns
            .iter()
            .find(|(_, pattern)| pattern.is_match(&normalized))
        {
            return PreScreen::blocked(format!("Blocked by hard denylist: {}", reason));
        }

        if let Some(reason) = injection_structure(command_text) {
            return PreScreen::blocked(format!("Blocked by hard denylist: {}", reason));
        }

        PreScreen::allowed()
    }
}

/// `rm` with both a recursive and a force flag, in any spelling or order
/// (`-rf`, `-r -f`, `-R -f`, `--recursive --force`).
fn recursive_forced_removal(normalized: &str) -> bool {
    let tokens: Vec<&str> = normalized.split(' ').collect();

    tokens
        .iter()
        .enumerate()
        .filter(|(_, token)| **token == "rm" || token.ends_with("/rm"))
        .any(|(start, _)| {
            let mut recursive = false;
            let mut force = false;
            for flag in tokens[start + 1..]
                .iter()
                .take_while(|t| !matches!(**t, ";" | "&&" | "||" | "|" | "&"))
            {
                match flag.strip_prefix("--") {
                    Some("recursive") => recursive = true,
                    Some("force") => force = true,
                    Some(_) => {}
                    None => {
                        if let Some(short) = flag.strip_prefix('-') {
                            recursive |= short.contains('r');
                            force |= short.contains('f');
                        }
                    }
                }
            }
            recursive && force
        })
}

/// Shell chaining, piping, backgrounding and substitution, checked on the raw
/// text so line breaks count as separators. One trailing `;` is a statement
/// terminator, not chaining.
fn injection_structure(command_text: &str) -> Option<&'static str> {
    let body = command_text.trim();
    let body = body.strip_suffix(';').unwrap_or(body);

    if body.contains("$(") || body.contains('`') {
        Some("command substitution")
    } else if body.contains("&&")
        || body.contains("||")
        || body.contains(';')
        || body.contains('\n')
        || body.contains('\r')
    {
        Some("command chaining")
    } else if body.contains('|') {
        Some("command piping")
    } else if body.contains('&') {
        Some("background execution")
    } else {
        None
    }
}

fn words(command_text: &str) -> Vec<String> {
    command_text
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn contains_any(words: &[String], keywords: &[&str]) -> bool {
    words.iter().any(|w| keywords.contains(&w.as_str()))
}

// ============================================================================
// Gate
// ============================================================================

pub struct CommandGate {
    policy: Arc<PolicyEngine>,
    denylist: Denylist,
    llm: Arc<dyn LLMGateway>,
    access_log: Arc<dyn AccessLogRepository>,
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
    options: GenerationOptions,
}

impl CommandGate {
    pub fn new(
        policy: Arc<PolicyEngine>,
        llm: Arc<dyn LLMGateway>,
        access_log: Arc<dyn AccessLogRepository>,
        clock: Arc<dyn Clock>,
        event_bus: EventBus,
    ) -> Result<Self, GateError> {
        Ok(Self {
            policy,
            denylist: Denylist::new()?,
            llm,
            access_log,
            clock,
            event_bus,
            options: GenerationOptions::default(),
        })
    }

    pub fn with_generation_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn pre_screen(&self, command_text: &str) -> PreScreen {
        self.denylist.check(command_text)
    }

    /// Keyword tiering, independent of the policy engine's patterns.
    pub fn evaluate(&self, command_text: &str) -> RiskLevel {
        let words = words(command_text);
        if contains_any(&words, CRITICAL_KEYWORDS) {
            RiskLevel::Critical
        } else if contains_any(&words, HIGH_KEYWORDS) {
            RiskLevel::High
        } else if contains_any(&words, MEDIUM_KEYWORDS) {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub async fn dispatch(&self, request: DispatchRequest) -> Result<DispatchOutcome, GateError> {
        let screen = self.pre_screen(&request.command_text);
        if screen.blocked {
            let reason = screen
                .reason
                .unwrap_or_else(|| "Blocked by hard denylist".to_string());
            return self.block(request, reason).await;
        }

        let classification = self.policy.classify(&request.command_text);
        let risk_level = self
            .evaluate(&request.command_text)
            .max(classification.risk_level())
            .max(request.risk_hint);

        let mut warnings = classification.warnings();
        warnings.extend(contextual_warnings(
            &request.command_text,
            classification.recommend_backup,
            request.backup_ref,
        ));

        debug!(
            principal_id = %request.principal_id,
            risk_level = %risk_level,
            matched_rules = classification.matched_rules.len(),
            "Dispatching command for analysis"
        );

        let messages = vec![
            ChatMessage::system(format!("{}\n\n{}", SAFETY_PROMPT, request.mode.framing())),
            ChatMessage::user(format!(
                "Risk level: {}\nCommand:\n{}",
                risk_level, request.command_text
            )),
        ];

        match self.llm.generate(&request.model, &messages, &self.options).await {
            Ok(response) => {
                let usage = response.usage.clone();
                let entry = self
                    .record(NewAccessLogEntry {
                        principal_id: request.principal_id,
                        command_text: request.command_text,
                        risk_level,
                        warnings,
                        executed: true,
                        result: response.text,
                        backup_ref: request.backup_ref,
                        mode: request.mode,
                        model: request.model,
                        usage: Some(usage.clone()),
                    })
                    .await?;

                info!(
                    access_log_id = %entry.id(),
                    risk_level = %risk_level,
                    provider = %response.provider,
                    total_tokens = usage.total_tokens,
                    "Command analyzed"
                );
                self.event_bus.publish_command_event(CommandEvent::CommandAnalyzed {
                    command_id: request.command_id,
                    access_log_id: entry.id(),
                    risk_level,
                    total_tokens: usage.total_tokens,
                    analyzed_at: self.clock.now(),
                });

                Ok(DispatchOutcome::Analyzed { entry, usage })
            }
            Err(e) => {
                let error = e.to_string();
                warn!(principal_id = %request.principal_id, error = %error, "Command analysis failed");

                let entry = self
                    .record(NewAccessLogEntry {
                        principal_id: request.principal_id,
                        command_text: request.command_text,
                        risk_level,
                        warnings,
                        executed: false,
                        result: error.clone(),
                        backup_ref: request.backup_ref,
                        mode: request.mode,
                        model: request.model,
                        usage: None,
                    })
                    .await?;

                self.event_bus.publish_command_event(CommandEvent::CommandFailed {
                    command_id: request.command_id,
                    access_log_id: Some(entry.id()),
                    error: error.clone(),
                    failed_at: self.clock.now(),
                });

                Ok(DispatchOutcome::AnalysisFailed { entry, error })
            }
        }
    }

    async fn block(
        &self,
        request: DispatchRequest,
        reason: String,
    ) -> Result<DispatchOutcome, GateError> {
        warn!(principal_id = %request.principal_id, reason = %reason, "Command blocked");

        let warning = Warning::blocking(WarningKind::Security, reason.clone())
            .with_suggestion("Perform this operation manually outside the assistant");

        let entry = self
            .record(NewAccessLogEntry {
                principal_id: request.principal_id,
                command_text: request.command_text,
                risk_level: RiskLevel::Critical,
                warnings: vec![warning],
                executed: false,
                result: reason.clone(),
                backup_ref: request.backup_ref,
                mode: request.mode,
                model: request.model,
                usage: None,
            })
            .await?;

        self.event_bus.publish_command_event(CommandEvent::CommandBlocked {
            command_id: request.command_id,
            access_log_id: entry.id(),
            reason,
            blocked_at: self.clock.now(),
        });

        Ok(DispatchOutcome::Blocked(entry))
    }

    async fn record(&self, new: NewAccessLogEntry) -> Result<AccessLogEntry, GateError> {
        let entry = AccessLogEntry::record(new, self.clock.now());
        self.access_log.append(&entry).await?;
        Ok(entry)
    }
}

fn contextual_warnings(
    command_text: &str,
    recommend_backup: bool,
    backup_ref: Option<SnapshotId>,
) -> Vec<Warning> {
    let words = words(command_text);
    let mut warnings = Vec::new();

    if contains_any(&words, DATA_MODIFICATION_KEYWORDS) {
        warnings.push(
            Warning::advisory(
                WarningKind::Confirmation,
                "This command modifies data; review its scope before running it",
            )
            .with_suggestion("Confirm which rows or objects are affected"),
        );
    }

    if contains_any(&words, SECURITY_KEYWORDS) {
        warnings.push(
            Warning::advisory(
                WarningKind::Security,
                "Command mentions credentials or secrets",
            )
            .with_suggestion("Keep secret values out of commands and logs"),
        );
    }

    if recommend_backup {
        let warning = match backup_ref {
            Some(id) => Warning::advisory(
                WarningKind::Backup,
                format!("Snapshot {} was taken before analysis", id.short()),
            ),
            None => Warning::advisory(
                WarningKind::Backup,
                "No snapshot was taken before this critical command",
            )
            .with_suggestion("Create a manual snapshot before running it"),
        };
        warnings.push(warning);
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::clock::SystemClock;
    use crate::domain::llm::{GenerationResponse, LLMError};
    use crate::infrastructure::repositories::InMemoryAccessLogRepository;
    use async_trait::async_trait;

    struct EchoGateway;

    #[async_trait]
    impl LLMGateway for EchoGateway {
        async fn generate(
            &self,
            _model_alias: &str,
            _messages: &[ChatMessage],
            _options: &GenerationOptions,
        ) -> Result<GenerationResponse, LLMError> {
            Err(LLMError::Provider("not used".to_string()))
        }
    }

    fn gate() -> CommandGate {
        CommandGate::new(
            Arc::new(PolicyEngine::new().unwrap()),
            Arc::new(EchoGateway),
            Arc::new(InMemoryAccessLogRepository::new()),
            Arc::new(SystemClock),
            EventBus::with_default_capacity(),
        )
        .unwrap()
    }

    #[test]
    fn test_denylist_blocks_destructive_operations() {
        let gate = gate();
        for text in [
            "rm -rf /",
            "RM -Rf /var/lib/postgres",
            "rm -r -f /",
            "rm --recursive --force /",
            "rm -R -f /home",
            "rm -f -r /tmp/cache",
            "/bin/rm --force -r /srv",
            "DROP TABLE users",
            "drop   database prod",
            "TRUNCATE TABLE sessions",
            "sudo systemctl stop nginx",
            "mkfs.ext4 /dev/sdb1",
            "dd if=/dev/zero of=/dev/sda",
            "python -c 'eval(input())'",
        ] {
            assert!(gate.pre_screen(text).blocked, "expected block: {}", text);
        }
    }

    #[test]
    fn test_denylist_blocks_sensitive_paths() {
        let gate = gate();
        for text in [
            "cat /etc/passwd",
            "show /etc/shadow",
            "copy ~/.ssh/authorized_keys",
            "print id_rsa",
            "open .env",
            "read server.pem",
        ] {
            assert!(gate.pre_screen(text).blocked, "expected block: {}", text);
        }
    }

    #[test]
    fn test_denylist_blocks_injection_structure() {
        let gate = gate();
        for text in [
            "ls; rm file",
            "make && deploy",
            "test || true",
            "ps aux | grep app",
            "echo $(whoami)",
            "echo `id`",
            "echo hi\nrm -r -f /tmp",
            "status\nrestart",
            "sleep 100 &",
            "worker & disown",
        ] {
            assert!(gate.pre_screen(text).blocked, "expected block: {}", text);
        }
    }

    #[test]
    fn test_trailing_semicolon_is_not_chaining() {
        let gate = gate();
        let screen = gate.pre_screen("DELETE FROM users WHERE 1=1;");
        assert!(!screen.blocked);
        assert!(screen.reason.is_none());
        assert!(gate.pre_screen("SELECT 1; SELECT 2;").blocked);
    }

    #[test]
    fn test_ordinary_text_is_not_blocked() {
        let gate = gate();
        for text in [
            "DELETE FROM users WHERE 1=1",
            "show pseudo code for the environment loader",
            "list the keys in the cache",
            "update users set active = false where id = 4",
        ] {
            assert!(!gate.pre_screen(text).blocked, "unexpected block: {}", text);
        }
    }

    #[test]
    fn test_keyword_tiers() {
        let gate = gate();
        assert_eq!(gate.evaluate("Delete old logs"), RiskLevel::Critical);
        assert_eq!(gate.evaluate("please MODIFY the config"), RiskLevel::High);
        assert_eq!(gate.evaluate("create a report"), RiskLevel::Medium);
        assert_eq!(gate.evaluate("how many users signed up today"), RiskLevel::Low);
        // whole words only
        assert_eq!(gate.evaluate("show the changelog"), RiskLevel::Low);
    }

    #[test]
    fn test_contextual_warnings() {
        let warnings = contextual_warnings("UPDATE accounts SET password = 'x'", false, None);
        assert!(warnings.iter().any(|w| w.kind == WarningKind::Confirmation));
        assert!(warnings.iter().any(|w| w.kind == WarningKind::Security));
        assert!(warnings.iter().all(|w| w.can_proceed));

        let id = SnapshotId::new();
        let warnings = contextual_warnings("delete from users", true, Some(id));
        let backup = warnings
            .iter()
            .find(|w| w.kind == WarningKind::Backup)
            .unwrap();
        assert!(backup.message.contains(&id.short()));

        let warnings = contextual_warnings("delete from users", true, None);
        assert!(warnings
            .iter()
            .any(|w| w.kind == WarningKind::Backup && w.suggested_action.is_some()));
    }
}
