// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Snapshot Metadata
//!
//! Describes one backup run of the configured source paths. Records are
//! append-only; the only removal is retention eviction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotId(pub Uuid);

impl SnapshotId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First eight hex characters, used in directory names
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for SnapshotId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SnapshotId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotKind {
    Hourly,
    Daily,
    Weekly,
    Manual,
}

impl SnapshotKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotKind::Hourly => "hourly",
            SnapshotKind::Daily => "daily",
            SnapshotKind::Weekly => "weekly",
            SnapshotKind::Manual => "manual",
        }
    }
}

impl fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SnapshotKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hourly" => Ok(SnapshotKind::Hourly),
            "daily" => Ok(SnapshotKind::Daily),
            "weekly" => Ok(SnapshotKind::Weekly),
            "manual" => Ok(SnapshotKind::Manual),
            other => Err(format!("unknown snapshot kind: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotOutcome {
    Success,
    /// Some files or include paths were skipped
    Partial,
    /// The snapshot directory could not be created
    Failed,
}

impl SnapshotOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotOutcome::Success => "success",
            SnapshotOutcome::Partial => "partial",
            SnapshotOutcome::Failed => "failed",
        }
    }
}

impl fmt::Display for SnapshotOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SnapshotOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(SnapshotOutcome::Success),
            "partial" => Ok(SnapshotOutcome::Partial),
            "failed" => Ok(SnapshotOutcome::Failed),
            other => Err(format!("unknown snapshot outcome: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub id: SnapshotId,
    pub created_at: DateTime<Utc>,
    pub kind: SnapshotKind,
    pub byte_size: u64,
    pub outcome: SnapshotOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Backing directory of the snapshot
    pub location: PathBuf,
    pub files_copied: u64,
    pub files_skipped: u64,
}

impl SnapshotMetadata {
    pub fn is_older_than(&self, cutoff: DateTime<Utc>) -> bool {
        self.created_at < cutoff
    }

    pub fn directory_exists(&self) -> bool {
        self.location.is_dir()
    }

    /// Directory name for a snapshot: `<kind>-<utc timestamp with ms>-<id prefix>`.
    /// The id prefix keeps two runs in the same millisecond apart.
    pub fn directory_name(kind: SnapshotKind, created_at: DateTime<Utc>, id: &SnapshotId) -> String {
        format!(
            "{}-{}-{}",
            kind,
            created_at.format("%Y%m%dT%H%M%S%.3fZ"),
            id.short()
        )
    }

    pub fn location_under(root: &Path, kind: SnapshotKind, created_at: DateTime<Utc>, id: &SnapshotId) -> PathBuf {
        root.join(Self::directory_name(kind, created_at, id))
    }
}

/// Snapshot as presented to callers of `list_available`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableSnapshot {
    #[serde(flatten)]
    pub metadata: SnapshotMetadata,
    pub can_restore: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyReport {
    pub files_copied: u64,
    pub bytes_copied: u64,
    /// Paths that could not be copied, with the reason
    pub skipped: Vec<(PathBuf, String)>,
}

impl CopyReport {
    pub fn merge(&mut self, other: CopyReport) {
        self.files_copied += other.files_copied;
        self.bytes_copied += other.bytes_copied;
        self.skipped.extend(other.skipped);
    }
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Snapshot not found: {0}")]
    NotFound(SnapshotId),

    #[error("Snapshot {0} cannot be restored: backing directory is missing")]
    NotRestorable(SnapshotId),

    #[error("Snapshot {id} did not complete successfully ({outcome})")]
    Unsuccessful { id: SnapshotId, outcome: SnapshotOutcome },

    #[error("Filesystem error: {0}")]
    Io(String),

    #[error("Repository error: {0}")]
    Repository(#[from] crate::domain::repository::RepositoryError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_directory_names_differ_within_same_millisecond() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let a = SnapshotMetadata::directory_name(SnapshotKind::Manual, at, &SnapshotId::new());
        let b = SnapshotMetadata::directory_name(SnapshotKind::Manual, at, &SnapshotId::new());
        assert_ne!(a, b);
        assert!(a.starts_with("manual-20260301T120000.000Z-"));
    }

    #[test]
    fn test_outcome_parse() {
        assert_eq!("partial".parse::<SnapshotOutcome>().unwrap(), SnapshotOutcome::Partial);
        assert!("unknown".parse::<SnapshotOutcome>().is_err());
    }
}
