// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Snapshot Storage Trait - Anti-Corruption Layer for the filesystem
//!
//! Isolates the backup scheduler from how snapshot directories are created,
//! filled, measured and deleted. Enables testing with mocks (for example a
//! store whose deletes fail) without touching real permissions.

use crate::domain::path_sanitizer::PathSanitizer;
use crate::domain::snapshot::CopyReport;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// One entry of the include allow-list, already resolved under the source root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopySource {
    /// Absolute (or source-root-relative) path to read from
    pub source: PathBuf,
    /// Where the entry lands inside the snapshot directory
    pub relative: PathBuf,
}

/// Names and directories skipped while walking a source tree.
#[derive(Debug, Clone, Default)]
pub struct ExclusionRules {
    /// File or directory names matched at any depth (e.g. `target`, `.git`)
    pub names: Vec<String>,
    /// Directories skipped by path prefix, such as the snapshot root itself
    pub directories: Vec<PathBuf>,
}

impl ExclusionRules {
    pub fn excludes(&self, path: &Path) -> bool {
        let by_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| self.names.iter().any(|excluded| excluded == n))
            .unwrap_or(false);
        by_name
            || self
                .directories
                .iter()
                .any(|dir| PathSanitizer::is_within(path, dir))
    }
}

#[async_trait]
pub trait SnapshotStorage: Send + Sync {
    /// Create the snapshot directory. Parent directories are created as
    /// needed; the leaf must not exist yet.
    async fn create_snapshot_dir(&self, location: &Path) -> Result<(), StorageError>;

    /// Copy every source into `destination`. Failures on individual files are
    /// reported in the returned `CopyReport`, not as an error.
    async fn copy_sources(
        &self,
        sources: &[CopySource],
        destination: &Path,
        exclusions: &ExclusionRules,
    ) -> Result<CopyReport, StorageError>;

    /// Copy the contents of a snapshot back over `target`.
    async fn restore(&self, location: &Path, target: &Path) -> Result<CopyReport, StorageError>;

    /// Total size in bytes of regular files below `location`
    async fn usage(&self, location: &Path) -> Result<u64, StorageError>;

    /// Remove a snapshot directory and everything in it. Missing directories
    /// are not an error.
    async fn delete_snapshot_dir(&self, location: &Path) -> Result<(), StorageError>;

    fn exists(&self, location: &Path) -> bool;
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Path already exists: {0}")]
    AlreadyExists(String),

    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    IoError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exclusion_by_name_and_directory() {
        let rules = ExclusionRules {
            names: vec!["target".to_string(), ".git".to_string()],
            directories: vec![PathBuf::from("/srv/app/backups")],
        };
        assert!(rules.excludes(Path::new("/srv/app/src/target")));
        assert!(rules.excludes(Path::new("/srv/app/.git")));
        assert!(rules.excludes(Path::new("/srv/app/backups/hourly-1")));
        assert!(!rules.excludes(Path::new("/srv/app/src/main.rs")));
        assert!(!rules.excludes(Path::new("/srv/app/targets.txt")));
    }
}
