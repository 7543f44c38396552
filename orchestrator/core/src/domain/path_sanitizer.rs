// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Path Sanitizer Domain Service
//!
//! Resolves snapshot include paths against the configured source root and
//! refuses anything that could leave it. Include paths come from
//! configuration, so a typo or a hostile edit must not turn a snapshot into
//! a copy of `/etc`.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Keeps snapshot reads and restores inside the source root

use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathSanitizerError {
    #[error("Path traversal attempt detected: {0}")]
    PathTraversal(String),

    #[error("Include paths must be relative to the source root: {0}")]
    AbsolutePath(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Path too long: {0}")]
    PathTooLong(String),
}

pub struct PathSanitizer {
    /// Maximum allowed path length (default: 4096)
    max_path_len: usize,
}

impl PathSanitizer {
    pub fn new() -> Self {
        Self { max_path_len: 4096 }
    }

    /// Resolve a relative include path under `source_root`.
    ///
    /// # Examples
    /// ```
    /// use warden_core::domain::path_sanitizer::PathSanitizer;
    /// use std::path::{Path, PathBuf};
    ///
    /// let sanitizer = PathSanitizer::new();
    /// let resolved = sanitizer.resolve_include(Path::new("/srv/app"), "./src/main.rs").unwrap();
    /// assert_eq!(resolved, PathBuf::from("/srv/app/src/main.rs"));
    ///
    /// assert!(sanitizer.resolve_include(Path::new("/srv/app"), "../secrets").is_err());
    /// ```
    pub fn resolve_include(
        &self,
        source_root: &Path,
        include: &str,
    ) -> Result<PathBuf, PathSanitizerError> {
        let relative = self.normalize_relative(include)?;
        Ok(source_root.join(relative))
    }

    /// Validate and normalize a relative path, dropping `.` components.
    pub fn normalize_relative(&self, path: &str) -> Result<PathBuf, PathSanitizerError> {
        if path.len() > self.max_path_len {
            return Err(PathSanitizerError::PathTooLong(path.to_string()));
        }

        if path.contains('\0') {
            return Err(PathSanitizerError::InvalidPath(
                "Path contains null byte".to_string(),
            ));
        }

        let mut normalized = PathBuf::new();
        for component in Path::new(path).components() {
            match component {
                Component::Prefix(_) | Component::RootDir => {
                    return Err(PathSanitizerError::AbsolutePath(path.to_string()));
                }
                Component::ParentDir => {
                    tracing::warn!(path = %path, "Include path contains '..' component");
                    return Err(PathSanitizerError::PathTraversal(path.to_string()));
                }
                Component::CurDir => {}
                Component::Normal(part) => normalized.push(part),
            }
        }

        if normalized.as_os_str().is_empty() {
            return Err(PathSanitizerError::InvalidPath(format!(
                "'{}' does not name anything under the source root",
                path
            )));
        }

        Ok(normalized)
    }

    /// Whether `path` lies inside `root` (lexically, no symlink resolution).
    /// Pass both sides through [`PathSanitizer::comparable`] first when they
    /// may be spelled differently.
    pub fn is_within(path: &Path, root: &Path) -> bool {
        path.starts_with(root)
    }

    /// Absolute, symlink-resolved form of `path` for containment checks.
    ///
    /// Paths that do not exist yet are resolved through their deepest
    /// existing ancestor, with the remaining components folded lexically.
    pub fn comparable(path: &Path) -> PathBuf {
        if let Ok(canonical) = std::fs::canonicalize(path) {
            return canonical;
        }

        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(path))
                .unwrap_or_else(|_| path.to_path_buf())
        };

        let mut folded = PathBuf::new();
        for component in absolute.components() {
            match component {
                Component::ParentDir => {
                    folded.pop();
                }
                Component::CurDir => {}
                other => folded.push(other.as_os_str()),
            }
        }

        let mut existing = folded.as_path();
        let mut tail = Vec::new();
        loop {
            if let Ok(canonical) = std::fs::canonicalize(existing) {
                return tail
                    .iter()
                    .rev()
                    .fold(canonical, |resolved, part| resolved.join(part));
            }
            match (existing.parent(), existing.file_name()) {
                (Some(parent), Some(name)) => {
                    tail.push(name.to_os_string());
                    existing = parent;
                }
                _ => return folded,
            }
        }
    }
}

impl Default for PathSanitizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_simple_include() {
        let sanitizer = PathSanitizer::new();
        let resolved = sanitizer.resolve_include(Path::new("/srv/app"), "config/app.yaml").unwrap();
        assert_eq!(resolved, PathBuf::from("/srv/app/config/app.yaml"));
    }

    #[test]
    fn test_reject_parent_dir() {
        let sanitizer = PathSanitizer::new();
        let err = sanitizer.resolve_include(Path::new("/srv/app"), "src/../../etc").unwrap_err();
        assert!(matches!(err, PathSanitizerError::PathTraversal(_)));
    }

    #[test]
    fn test_reject_absolute() {
        let sanitizer = PathSanitizer::new();
        let err = sanitizer.resolve_include(Path::new("/srv/app"), "/etc/passwd").unwrap_err();
        assert!(matches!(err, PathSanitizerError::AbsolutePath(_)));
    }

    #[test]
    fn test_reject_empty_and_dot() {
        let sanitizer = PathSanitizer::new();
        assert!(sanitizer.normalize_relative(".").is_err());
        assert!(sanitizer.normalize_relative("").is_err());
    }

    #[test]
    fn test_path_too_long() {
        let sanitizer = PathSanitizer::new();
        let err = sanitizer.normalize_relative(&"a/".repeat(2100)).unwrap_err();
        assert!(matches!(err, PathSanitizerError::PathTooLong(_)));
    }

    #[test]
    fn test_null_byte() {
        let sanitizer = PathSanitizer::new();
        assert!(sanitizer.normalize_relative("src\0evil").is_err());
    }

    #[test]
    fn test_is_within() {
        assert!(PathSanitizer::is_within(Path::new("/srv/app/backups/x"), Path::new("/srv/app")));
        assert!(!PathSanitizer::is_within(Path::new("/srv/other"), Path::new("/srv/app")));
    }

    #[test]
    fn test_comparable_resolves_different_spellings() {
        let dir = tempfile::TempDir::new().unwrap();
        let app = dir.path().join("app");
        std::fs::create_dir_all(app.join("data")).unwrap();

        let direct = PathSanitizer::comparable(&app.join("data/backups"));
        let roundabout = PathSanitizer::comparable(&app.join("../app/./data/backups"));
        assert_eq!(direct, roundabout);
        assert!(PathSanitizer::is_within(
            &roundabout,
            &PathSanitizer::comparable(&app.join("data"))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_comparable_resolves_symlinks() {
        let dir = tempfile::TempDir::new().unwrap();
        let real = dir.path().join("real");
        std::fs::create_dir_all(&real).unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        assert_eq!(
            PathSanitizer::comparable(&link.join("backups")),
            PathSanitizer::comparable(&real.join("backups"))
        );
    }
}
