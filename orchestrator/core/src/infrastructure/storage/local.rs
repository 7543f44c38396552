// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Local Filesystem Snapshot Storage
//!
//! Snapshots are plain directory trees under the configured snapshot root.
//! All copying and deletion runs on the blocking thread pool.
//!
//! Copying is best-effort per file: an unreadable or locked file is logged,
//! recorded in the `CopyReport` and skipped while the rest of the tree is
//! copied. Symbolic links are not followed and not copied.

use crate::domain::snapshot::CopyReport;
use crate::domain::storage::{CopySource, ExclusionRules, SnapshotStorage, StorageError};
use async_trait::async_trait;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

#[derive(Debug, Default, Clone)]
pub struct LocalSnapshotStorage;

impl LocalSnapshotStorage {
    pub fn new() -> Self {
        Self
    }

    fn copy_tree(source: &Path, destination: &Path, exclusions: &ExclusionRules) -> CopyReport {
        let mut report = CopyReport::default();

        let metadata = match fs::symlink_metadata(source) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(path = %source.display(), error = %e, "Snapshot source unavailable, skipping");
                report.skipped.push((source.to_path_buf(), e.to_string()));
                return report;
            }
        };

        if metadata.is_file() {
            Self::copy_file(source, destination, &mut report);
            return report;
        }

        if !metadata.is_dir() {
            report
                .skipped
                .push((source.to_path_buf(), "not a regular file or directory".to_string()));
            return report;
        }

        let walker = WalkDir::new(source)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !exclusions.excludes(entry.path()));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| source.to_path_buf());
                    warn!(path = %path.display(), error = %e, "Failed to read entry, skipping");
                    report.skipped.push((path, e.to_string()));
                    continue;
                }
            };

            let relative = match entry.path().strip_prefix(source) {
                Ok(relative) => relative,
                Err(_) => continue,
            };
            let target = destination.join(relative);
            let file_type = entry.file_type();

            if file_type.is_dir() {
                if let Err(e) = fs::create_dir_all(&target) {
                    warn!(path = %target.display(), error = %e, "Failed to create directory");
                    report.skipped.push((entry.path().to_path_buf(), e.to_string()));
                }
            } else if file_type.is_file() {
                Self::copy_file(entry.path(), &target, &mut report);
            } else {
                debug!(path = %entry.path().display(), "Skipping symbolic link or special file");
                report
                    .skipped
                    .push((entry.path().to_path_buf(), "symbolic link or special file".to_string()));
            }
        }

        report
    }

    fn copy_file(source: &Path, target: &Path, report: &mut CopyReport) {
        if let Some(parent) = target.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                warn!(path = %parent.display(), error = %e, "Failed to create directory");
                report.skipped.push((source.to_path_buf(), e.to_string()));
                return;
            }
        }

        match fs::copy(source, target) {
            Ok(bytes) => {
                report.files_copied += 1;
                report.bytes_copied += bytes;
            }
            Err(e) => {
                warn!(path = %source.display(), error = %e, "Failed to copy file, skipping");
                report.skipped.push((source.to_path_buf(), e.to_string()));
            }
        }
    }

    /// Calculate directory size recursively
    fn calculate_size(path: &Path) -> Result<u64, std::io::Error> {
        let mut total = 0u64;
        for entry in WalkDir::new(path).follow_links(false) {
            let entry = entry.map_err(std::io::Error::from)?;
            if entry.file_type().is_file() {
                total += entry.metadata().map_err(std::io::Error::from)?.len();
            }
        }
        Ok(total)
    }
}

async fn blocking<T, F>(task: F) -> Result<T, StorageError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StorageError> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| StorageError::IoError(format!("Blocking task failed: {}", e)))?
}

#[async_trait]
impl SnapshotStorage for LocalSnapshotStorage {
    async fn create_snapshot_dir(&self, location: &Path) -> Result<(), StorageError> {
        let location = location.to_path_buf();
        blocking(move || {
            if let Some(parent) = location.parent() {
                fs::create_dir_all(parent).map_err(|e| {
                    StorageError::IoError(format!(
                        "Failed to create snapshot root {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }

            fs::create_dir(&location).map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => {
                    StorageError::AlreadyExists(location.display().to_string())
                }
                _ => StorageError::IoError(format!(
                    "Failed to create snapshot directory {}: {}",
                    location.display(),
                    e
                )),
            })
        })
        .await
    }

    async fn copy_sources(
        &self,
        sources: &[CopySource],
        destination: &Path,
        exclusions: &ExclusionRules,
    ) -> Result<CopyReport, StorageError> {
        let sources = sources.to_vec();
        let destination = destination.to_path_buf();
        let exclusions = exclusions.clone();

        blocking(move || {
            let mut report = CopyReport::default();
            for source in &sources {
                let target = destination.join(&source.relative);
                report.merge(Self::copy_tree(&source.source, &target, &exclusions));
            }
            Ok(report)
        })
        .await
    }

    async fn restore(&self, location: &Path, target: &Path) -> Result<CopyReport, StorageError> {
        let location = location.to_path_buf();
        let target = target.to_path_buf();

        blocking(move || {
            if !location.is_dir() {
                return Err(StorageError::NotFound(location.display().to_string()));
            }
            Ok(Self::copy_tree(&location, &target, &ExclusionRules::default()))
        })
        .await
    }

    async fn usage(&self, location: &Path) -> Result<u64, StorageError> {
        let location: PathBuf = location.to_path_buf();
        blocking(move || {
            if !location.exists() {
                return Err(StorageError::NotFound(location.display().to_string()));
            }
            Self::calculate_size(&location).map_err(|e| {
                StorageError::IoError(format!(
                    "Failed to calculate usage for {}: {}",
                    location.display(),
                    e
                ))
            })
        })
        .await
    }

    async fn delete_snapshot_dir(&self, location: &Path) -> Result<(), StorageError> {
        let location = location.to_path_buf();
        blocking(move || match fs::remove_dir_all(&location) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::IoError(format!(
                "Failed to delete {}: {}",
                location.display(),
                e
            ))),
        })
        .await
    }

    fn exists(&self, location: &Path) -> bool {
        location.is_dir()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn test_copy_respects_exclusions() {
        let source = TempDir::new().unwrap();
        let snapshots = TempDir::new().unwrap();
        write(&source.path().join("src/main.rs"), "fn main() {}");
        write(&source.path().join("src/target/debug/app"), "binary");
        write(&source.path().join("node_modules/pkg/index.js"), "x");
        write(&source.path().join("README.md"), "readme");

        let storage = LocalSnapshotStorage::new();
        let location = snapshots.path().join("manual-1");
        storage.create_snapshot_dir(&location).await.unwrap();

        let report = storage
            .copy_sources(
                &[CopySource {
                    source: source.path().to_path_buf(),
                    relative: PathBuf::new(),
                }],
                &location,
                &ExclusionRules {
                    names: vec!["target".to_string(), "node_modules".to_string()],
                    directories: vec![],
                },
            )
            .await
            .unwrap();

        assert_eq!(report.files_copied, 2);
        assert!(report.skipped.is_empty());
        assert!(location.join("src/main.rs").is_file());
        assert!(location.join("README.md").is_file());
        assert!(!location.join("src/target").exists());
        assert!(!location.join("node_modules").exists());
        assert_eq!(storage.usage(&location).await.unwrap(), report.bytes_copied);
    }

    #[tokio::test]
    async fn test_missing_source_is_skipped_not_fatal() {
        let source = TempDir::new().unwrap();
        let snapshots = TempDir::new().unwrap();
        write(&source.path().join("config/app.yaml"), "a: 1");

        let storage = LocalSnapshotStorage::new();
        let location = snapshots.path().join("hourly-1");
        storage.create_snapshot_dir(&location).await.unwrap();

        let report = storage
            .copy_sources(
                &[
                    CopySource {
                        source: source.path().join("config"),
                        relative: PathBuf::from("config"),
                    },
                    CopySource {
                        source: source.path().join("missing"),
                        relative: PathBuf::from("missing"),
                    },
                ],
                &location,
                &ExclusionRules::default(),
            )
            .await
            .unwrap();

        assert_eq!(report.files_copied, 1);
        assert_eq!(report.skipped.len(), 1);
        assert!(location.join("config/app.yaml").is_file());
    }

    #[tokio::test]
    async fn test_create_twice_fails() {
        let snapshots = TempDir::new().unwrap();
        let storage = LocalSnapshotStorage::new();
        let location = snapshots.path().join("nested/root/daily-1");
        storage.create_snapshot_dir(&location).await.unwrap();
        assert!(matches!(
            storage.create_snapshot_dir(&location).await,
            Err(StorageError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_restore_and_delete() {
        let snapshots = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        let location = snapshots.path().join("manual-1");
        write(&location.join("config/app.yaml"), "restored");
        write(&target.path().join("config/app.yaml"), "broken");

        let storage = LocalSnapshotStorage::new();
        let report = storage.restore(&location, target.path()).await.unwrap();
        assert_eq!(report.files_copied, 1);
        assert_eq!(
            fs::read_to_string(target.path().join("config/app.yaml")).unwrap(),
            "restored"
        );

        storage.delete_snapshot_dir(&location).await.unwrap();
        assert!(!storage.exists(&location));
        // already gone
        storage.delete_snapshot_dir(&location).await.unwrap();
        assert!(matches!(
            storage.restore(&location, target.path()).await,
            Err(StorageError::NotFound(_))
        ));
    }
}
