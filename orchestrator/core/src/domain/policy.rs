// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Policy Engine — pattern-based command classification
//!
//! Classifies free-form admin command text against an ordered, declarative
//! table of regex rules. The engine is a pure domain service: `classify`
//! performs no I/O and returns the same result for the same input.
//!
//! | Aggregate severity | Risk level | Backup recommended |
//! |--------------------|------------|--------------------|
//! | `clear` (no match) | low        | no                 |
//! | `info`             | medium     | no                 |
//! | `warning`          | high       | no                 |
//! | `critical`         | critical   | yes                |
//!
//! The rule table is compiled once at startup and is read-only thereafter.

use crate::domain::risk::{RiskLevel, Warning, WarningKind};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("Invalid pattern in rule '{rule}': {reason}")]
    InvalidPattern { rule: String, reason: String },
}

/// Severity attached to a single rule. `Clear` is the floor reported when
/// nothing matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleSeverity {
    Clear,
    Info,
    Warning,
    Critical,
}

impl RuleSeverity {
    pub fn risk_level(&self) -> RiskLevel {
        match self {
            RuleSeverity::Clear => RiskLevel::Low,
            RuleSeverity::Info => RiskLevel::Medium,
            RuleSeverity::Warning => RiskLevel::High,
            RuleSeverity::Critical => RiskLevel::Critical,
        }
    }
}

impl fmt::Display for RuleSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RuleSeverity::Clear => "clear",
            RuleSeverity::Info => "info",
            RuleSeverity::Warning => "warning",
            RuleSeverity::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Serializable rule definition, as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub name: String,
    pub pattern: String,
    pub severity: RuleSeverity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
    #[serde(default)]
    pub requires_confirmation: bool,
    #[serde(default = "default_warning_kind")]
    pub kind: WarningKind,
}

fn default_warning_kind() -> WarningKind {
    WarningKind::Confirmation
}

/// Compiled, immutable rule.
#[derive(Debug, Clone)]
pub struct PolicyRule {
    pub name: String,
    pattern: Regex,
    pub severity: RuleSeverity,
    pub message: String,
    pub suggested_action: Option<String>,
    pub requires_confirmation: bool,
    pub kind: WarningKind,
}

impl PolicyRule {
    pub fn compile(definition: &RuleDefinition) -> Result<Self, PolicyError> {
        let pattern = RegexBuilder::new(&definition.pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| PolicyError::InvalidPattern {
                rule: definition.name.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            name: definition.name.clone(),
            pattern,
            severity: definition.severity,
            message: definition.message.clone(),
            suggested_action: definition.suggested_action.clone(),
            requires_confirmation: definition.requires_confirmation,
            kind: definition.kind,
        })
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn matches(&self, normalized: &str) -> bool {
        self.pattern.is_match(normalized)
    }
}

/// A rule that matched, detached from its compiled regex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedRule {
    pub name: String,
    pub severity: RuleSeverity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
    pub requires_confirmation: bool,
    pub kind: WarningKind,
}

impl From<&PolicyRule> for MatchedRule {
    fn from(rule: &PolicyRule) -> Self {
        Self {
            name: rule.name.clone(),
            severity: rule.severity,
            message: rule.message.clone(),
            suggested_action: rule.suggested_action.clone(),
            requires_confirmation: rule.requires_confirmation,
            kind: rule.kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub matched_rules: Vec<MatchedRule>,
    pub aggregate_severity: RuleSeverity,
    pub recommend_backup: bool,
}

impl Classification {
    pub fn risk_level(&self) -> RiskLevel {
        self.aggregate_severity.risk_level()
    }

    /// One advisory warning per matched rule.
    pub fn warnings(&self) -> Vec<Warning> {
        self.matched_rules
            .iter()
            .map(|rule| {
                let message = if rule.requires_confirmation {
                    format!("{} (confirmation advised)", rule.message)
                } else {
                    rule.message.clone()
                };
                let mut warning = Warning::advisory(rule.kind, message);
                warning.suggested_action = rule.suggested_action.clone();
                warning
            })
            .collect()
    }
}

pub struct PolicyEngine {
    rules: Vec<PolicyRule>,
}

impl PolicyEngine {
    /// Engine with the built-in rule table
    pub fn new() -> Result<Self, PolicyError> {
        Self::with_definitions(&default_rule_definitions())
    }

    /// Engine with the built-in table followed by `extra` rules
    pub fn with_additional(extra: &[RuleDefinition]) -> Result<Self, PolicyError> {
        let mut definitions = default_rule_definitions();
        definitions.extend_from_slice(extra);
        Self::with_definitions(&definitions)
    }

    pub fn with_definitions(definitions: &[RuleDefinition]) -> Result<Self, PolicyError> {
        let rules = definitions
            .iter()
            .map(PolicyRule::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }

    /// Classify command text. Every rule is evaluated; the aggregate is the
    /// maximum severity over all matches, so rule order cannot change it.
    pub fn classify(&self, command_text: &str) -> Classification {
        let normalized = normalize(command_text);

        let matched_rules: Vec<MatchedRule> = self
            .rules
            .iter()
            .filter(|rule| rule.matches(&normalized))
            .map(MatchedRule::from)
            .collect();

        let aggregate_severity = matched_rules
            .iter()
            .map(|rule| rule.severity)
            .max()
            .unwrap_or(RuleSeverity::Clear);

        Classification {
            matched_rules,
            aggregate_severity,
            recommend_backup: aggregate_severity == RuleSeverity::Critical,
        }
    }
}

/// Trim and collapse runs of whitespace so `DELETE\n  FROM` matches `delete from`.
pub fn normalize(command_text: &str) -> String {
    command_text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn rule(
    name: &str,
    pattern: &str,
    severity: RuleSeverity,
    kind: WarningKind,
    message: &str,
    suggested_action: Option<&str>,
    requires_confirmation: bool,
) -> RuleDefinition {
    RuleDefinition {
        name: name.to_string(),
        pattern: pattern.to_string(),
        severity,
        message: message.to_string(),
        suggested_action: suggested_action.map(str::to_string),
        requires_confirmation,
        kind,
    }
}

pub fn default_rule_definitions() -> Vec<RuleDefinition> {
    use RuleSeverity::{Critical, Info, Warning};
    use WarningKind::{Confirmation, Irreversible, Security};

    vec![
        rule(
            "sql-delete",
            r"\bdelete\s+from\b",
            Critical,
            Irreversible,
            "Deletes rows from a table",
            Some("Run the matching SELECT first and check the row count"),
            true,
        ),
        rule(
            "sql-drop",
            r"\bdrop\s+(table|database|schema|index|view)\b",
            Critical,
            Irreversible,
            "Drops a database object",
            Some("Export the object definition and data before dropping it"),
            true,
        ),
        rule(
            "sql-truncate",
            r"\btruncate\b",
            Critical,
            Irreversible,
            "Truncates table data",
            None,
            true,
        ),
        rule(
            "tautological-filter",
            r"\bwhere\s+(1\s*=\s*1|true)\b",
            Critical,
            Irreversible,
            "Filter matches every row",
            Some("Replace the tautology with a narrow condition"),
            true,
        ),
        rule(
            "recursive-remove",
            r"\brm\s+-[a-z]*[rf]",
            Critical,
            Irreversible,
            "Forced or recursive file removal",
            None,
            true,
        ),
        rule(
            "destroy-verb",
            r"\b(destroy|wipe|purge|erase)\b",
            Critical,
            Irreversible,
            "Destructive operation requested",
            None,
            true,
        ),
        rule(
            "sql-update",
            r"\bupdate\s+\S+\s+set\b",
            Warning,
            Confirmation,
            "Updates existing rows",
            Some("Limit the update with a WHERE clause"),
            true,
        ),
        rule(
            "schema-change",
            r"\balter\s+(table|database|schema|user|role)\b",
            Warning,
            Confirmation,
            "Changes the database schema",
            None,
            true,
        ),
        rule(
            "permission-change",
            r"\b(chmod|chown|grant|revoke)\b",
            Warning,
            Security,
            "Changes permissions or ownership",
            None,
            true,
        ),
        rule(
            "service-interruption",
            r"\b(restart|shutdown|reboot|kill|stop)\b",
            Warning,
            Confirmation,
            "May interrupt a running service",
            Some("Schedule the interruption outside peak hours"),
            false,
        ),
        rule(
            "credential-reference",
            r"\b(password|passwd|secret|api[_ -]?key|token|credential)s?\b",
            Warning,
            Security,
            "References credentials or secrets",
            Some("Never paste secret values into commands"),
            false,
        ),
        rule(
            "sql-insert-create",
            r"\b(insert\s+into|create\s+(table|index|user|database))\b",
            Info,
            Confirmation,
            "Adds new data or objects",
            None,
            false,
        ),
        rule(
            "deployment",
            r"\b(deploy|migrate|migration|rollback)\b",
            Info,
            Confirmation,
            "Touches deployment state",
            None,
            false,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> PolicyEngine {
        PolicyEngine::new().unwrap()
    }

    #[test]
    fn test_default_rules_compile() {
        assert!(!engine().rules().is_empty());
    }

    #[test]
    fn test_no_match_is_clear() {
        let classification = engine().classify("show me today's signups");
        assert!(classification.matched_rules.is_empty());
        assert_eq!(classification.aggregate_severity, RuleSeverity::Clear);
        assert_eq!(classification.risk_level(), RiskLevel::Low);
        assert!(!classification.recommend_backup);
    }

    #[test]
    fn test_delete_everything_is_critical() {
        let classification = engine().classify("DELETE FROM users WHERE 1=1");
        assert_eq!(classification.aggregate_severity, RuleSeverity::Critical);
        assert!(classification.recommend_backup);
        let names: Vec<_> = classification.matched_rules.iter().map(|r| r.name.as_str()).collect();
        assert!(names.contains(&"sql-delete"));
        assert!(names.contains(&"tautological-filter"));
    }

    #[test]
    fn test_max_severity_wins() {
        let classification = engine().classify("restart nginx then delete from sessions");
        assert!(classification
            .matched_rules
            .iter()
            .any(|r| r.severity == RuleSeverity::Warning));
        assert_eq!(classification.aggregate_severity, RuleSeverity::Critical);
    }

    #[test]
    fn test_warning_only_does_not_recommend_backup() {
        let classification = engine().classify("UPDATE plans SET price = 10 WHERE id = 4");
        assert_eq!(classification.aggregate_severity, RuleSeverity::Warning);
        assert!(!classification.recommend_backup);
        assert_eq!(classification.risk_level(), RiskLevel::High);
    }

    #[test]
    fn test_whitespace_is_normalized() {
        let classification = engine().classify("  delete\n\t from   orders ");
        assert_eq!(classification.aggregate_severity, RuleSeverity::Critical);
    }

    #[test]
    fn test_classify_is_deterministic() {
        let engine = engine();
        let first = engine.classify("drop table invoices; restart api");
        for _ in 0..10 {
            assert_eq!(engine.classify("drop table invoices; restart api"), first);
        }
    }

    #[test]
    fn test_rule_order_does_not_change_aggregate() {
        let mut reversed = default_rule_definitions();
        reversed.reverse();
        let forward = engine();
        let backward = PolicyEngine::with_definitions(&reversed).unwrap();
        for text in ["truncate logs", "update a set b=1", "insert into t values (1)", "hello"] {
            assert_eq!(
                forward.classify(text).aggregate_severity,
                backward.classify(text).aggregate_severity
            );
        }
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let bad = RuleDefinition {
            name: "broken".to_string(),
            pattern: "(unclosed".to_string(),
            severity: RuleSeverity::Info,
            message: "broken".to_string(),
            suggested_action: None,
            requires_confirmation: false,
            kind: WarningKind::Confirmation,
        };
        assert!(matches!(
            PolicyEngine::with_additional(&[bad]),
            Err(PolicyError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_warnings_follow_matched_rules() {
        let classification = engine().classify("DELETE FROM users WHERE 1=1");
        let warnings = classification.warnings();
        assert_eq!(warnings.len(), classification.matched_rules.len());
        assert!(warnings.iter().all(|w| w.can_proceed));
        assert!(warnings.iter().any(|w| w.kind == WarningKind::Irreversible));
    }
}
