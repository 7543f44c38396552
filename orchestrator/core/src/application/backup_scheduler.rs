// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Backup Scheduler Application Service
//!
//! Takes filesystem snapshots of an allow-list of source paths and keeps
//! them for a retention window. Three triggers share one `run_snapshot`:
//!
//! - **Hourly:** fires immediately on start, then every `hourly_interval`
//! - **Daily:** first fire at the next local midnight, then every 24 hours
//! - **Manual:** called by the orchestrator before a critical command
//!
//! Recording snapshot metadata and evicting expired snapshots happen under
//! one async mutex so the two never interleave.

use crate::domain::clock::Clock;
use crate::domain::config::BackupConfig;
use crate::domain::events::SnapshotEvent;
use crate::domain::path_sanitizer::PathSanitizer;
use crate::domain::repository::SnapshotRepository;
use crate::domain::snapshot::{
    AvailableSnapshot, CopyReport, SnapshotError, SnapshotId, SnapshotKind, SnapshotMetadata,
    SnapshotOutcome,
};
use crate::domain::storage::{CopySource, ExclusionRules, SnapshotStorage};
use crate::infrastructure::event_bus::EventBus;
use chrono::{DateTime, TimeZone};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct BackupSchedulerConfig {
    pub source_root: PathBuf,
    pub include_paths: Vec<String>,
    pub exclude_names: Vec<String>,
    pub snapshot_root: PathBuf,
    pub retention: chrono::Duration,
    pub hourly_enabled: bool,
    pub hourly_interval: Duration,
    pub daily_enabled: bool,
}

impl From<&BackupConfig> for BackupSchedulerConfig {
    fn from(config: &BackupConfig) -> Self {
        Self {
            source_root: config.source_root.clone(),
            include_paths: config.include_paths.clone(),
            exclude_names: config.exclude_names.clone(),
            snapshot_root: config.snapshot_root.clone(),
            retention: chrono::Duration::days(i64::from(config.retention_days)),
            hourly_enabled: config.hourly_enabled,
            hourly_interval: config.hourly_interval,
            daily_enabled: config.daily_enabled,
        }
    }
}

// ============================================================================
// Service
// ============================================================================

pub struct BackupScheduler {
    config: BackupSchedulerConfig,
    storage: Arc<dyn SnapshotStorage>,
    repository: Arc<dyn SnapshotRepository>,
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
    sanitizer: PathSanitizer,
    /// Guards metadata append and retention eviction
    records: Mutex<()>,
}

impl BackupScheduler {
    pub fn new(
        config: BackupSchedulerConfig,
        storage: Arc<dyn SnapshotStorage>,
        repository: Arc<dyn SnapshotRepository>,
        clock: Arc<dyn Clock>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            config,
            storage,
            repository,
            clock,
            event_bus,
            sanitizer: PathSanitizer::new(),
            records: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &BackupSchedulerConfig {
        &self.config
    }

    /// Take one snapshot and record it.
    ///
    /// Filesystem problems never surface as `Err`: they are reflected in the
    /// outcome (`Partial` or `Failed`). Only failing to record the metadata
    /// is an error.
    pub async fn run_snapshot(
        &self,
        kind: SnapshotKind,
        description: Option<String>,
    ) -> Result<SnapshotMetadata, SnapshotError> {
        let id = SnapshotId::new();
        let created_at = self.clock.now();
        let location =
            SnapshotMetadata::location_under(&self.config.snapshot_root, kind, created_at, &id);

        info!(snapshot_id = %id, kind = %kind, location = %location.display(), "Starting snapshot");

        let mut metadata = SnapshotMetadata {
            id,
            created_at,
            kind,
            byte_size: 0,
            outcome: SnapshotOutcome::Failed,
            description,
            location: location.clone(),
            files_copied: 0,
            files_skipped: 0,
        };

        match self.storage.create_snapshot_dir(&location).await {
            Ok(()) => {
                let report = self.copy_allow_list(&location).await;
                metadata.files_copied = report.files_copied;
                metadata.files_skipped = report.skipped.len() as u64;
                metadata.byte_size = match self.storage.usage(&location).await {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!(snapshot_id = %id, error = %e, "Could not measure snapshot, using copied byte count");
                        report.bytes_copied
                    }
                };
                metadata.outcome = if report.skipped.is_empty() {
                    SnapshotOutcome::Success
                } else {
                    SnapshotOutcome::Partial
                };
            }
            Err(e) => {
                error!(snapshot_id = %id, error = %e, "Failed to create snapshot directory");
            }
        }

        {
            let _guard = self.records.lock().await;
            self.repository.append(&metadata).await?;
        }

        info!(
            snapshot_id = %id,
            outcome = %metadata.outcome,
            files_copied = metadata.files_copied,
            files_skipped = metadata.files_skipped,
            byte_size = metadata.byte_size,
            "Snapshot finished"
        );

        self.event_bus.publish_snapshot_event(SnapshotEvent::SnapshotCompleted {
            snapshot_id: id,
            kind,
            outcome: metadata.outcome,
            byte_size: metadata.byte_size,
            completed_at: self.clock.now(),
        });

        if metadata.outcome == SnapshotOutcome::Success {
            if let Err(e) = self.cleanup_expired().await {
                warn!(error = %e, "Retention pass after snapshot failed");
            }
        }

        Ok(metadata)
    }

    async fn copy_allow_list(&self, location: &std::path::Path) -> CopyReport {
        let mut report = CopyReport::default();
        let mut sources = Vec::with_capacity(self.config.include_paths.len());

        let source_root = PathSanitizer::comparable(&self.config.source_root);
        let snapshot_root = PathSanitizer::comparable(&self.config.snapshot_root);

        for include in &self.config.include_paths {
            match self.sanitizer.normalize_relative(include) {
                Ok(relative) => {
                    let source = PathSanitizer::comparable(&source_root.join(&relative));
                    if !PathSanitizer::is_within(&source, &source_root) {
                        warn!(include = %include, resolved = %source.display(), "Include path resolves outside the source root");
                        report
                            .skipped
                            .push((PathBuf::from(include), "resolves outside the source root".to_string()));
                        continue;
                    }
                    if PathSanitizer::is_within(&source, &snapshot_root) {
                        warn!(include = %include, "Include path lies inside the snapshot root");
                        report
                            .skipped
                            .push((PathBuf::from(include), "inside the snapshot root".to_string()));
                        continue;
                    }
                    sources.push(CopySource { source, relative });
                }
                Err(e) => {
                    warn!(include = %include, error = %e, "Rejected include path");
                    report.skipped.push((PathBuf::from(include), e.to_string()));
                }
            }
        }

        let exclusions = ExclusionRules {
            names: self.config.exclude_names.clone(),
            directories: vec![snapshot_root],
        };

        match self.storage.copy_sources(&sources, location, &exclusions).await {
            Ok(copied) => report.merge(copied),
            Err(e) => {
                error!(error = %e, "Snapshot copy aborted");
                for source in sources {
                    report.skipped.push((source.source, e.to_string()));
                }
            }
        }

        report
    }

    /// Evict snapshots older than the retention window. One failed eviction
    /// does not stop the others; its metadata is kept so the next pass
    /// retries. Returns the number evicted.
    pub async fn cleanup_expired(&self) -> Result<usize, SnapshotError> {
        let _guard = self.records.lock().await;

        let cutoff = self.clock.now() - self.config.retention;
        let expired = self.repository.find_older_than(cutoff).await?;
        if expired.is_empty() {
            debug!(%cutoff, "No expired snapshots");
            return Ok(0);
        }

        info!(count = expired.len(), %cutoff, "Evicting expired snapshots");

        let mut evicted = 0;
        for snapshot in expired {
            if let Err(e) = self.storage.delete_snapshot_dir(&snapshot.location).await {
                warn!(snapshot_id = %snapshot.id, error = %e, "Failed to delete snapshot directory");
                self.event_bus.publish_snapshot_event(SnapshotEvent::SnapshotEvictionFailed {
                    snapshot_id: snapshot.id,
                    error: e.to_string(),
                    failed_at: self.clock.now(),
                });
                continue;
            }

            if let Err(e) = self.repository.remove(snapshot.id).await {
                warn!(snapshot_id = %snapshot.id, error = %e, "Failed to remove snapshot metadata");
                self.event_bus.publish_snapshot_event(SnapshotEvent::SnapshotEvictionFailed {
                    snapshot_id: snapshot.id,
                    error: e.to_string(),
                    failed_at: self.clock.now(),
                });
                continue;
            }

            evicted += 1;
            self.event_bus.publish_snapshot_event(SnapshotEvent::SnapshotEvicted {
                snapshot_id: snapshot.id,
                evicted_at: self.clock.now(),
            });
        }

        info!(evicted, "Retention pass complete");
        Ok(evicted)
    }

    /// Successful snapshots, most recent first
    pub async fn list_available(&self) -> Result<Vec<AvailableSnapshot>, SnapshotError> {
        let all = self.repository.list_all().await?;
        Ok(all
            .into_iter()
            .filter(|s| s.outcome == SnapshotOutcome::Success)
            .map(|metadata| {
                let can_restore = self.storage.exists(&metadata.location);
                AvailableSnapshot {
                    metadata,
                    can_restore,
                }
            })
            .collect())
    }

    /// Every recorded snapshot regardless of outcome, most recent first
    pub async fn list_all(&self) -> Result<Vec<SnapshotMetadata>, SnapshotError> {
        Ok(self.repository.list_all().await?)
    }

    pub async fn latest(&self) -> Result<Option<AvailableSnapshot>, SnapshotError> {
        Ok(self.list_available().await?.into_iter().next())
    }

    /// Copy a successful snapshot back over the source root.
    pub async fn restore(&self, id: SnapshotId) -> Result<CopyReport, SnapshotError> {
        let snapshot = self
            .repository
            .find_by_id(id)
            .await?
            .ok_or(SnapshotError::NotFound(id))?;

        if snapshot.outcome != SnapshotOutcome::Success {
            return Err(SnapshotError::Unsuccessful {
                id,
                outcome: snapshot.outcome,
            });
        }

        if !self.storage.exists(&snapshot.location) {
            return Err(SnapshotError::NotRestorable(id));
        }

        info!(snapshot_id = %id, target = %self.config.source_root.display(), "Restoring snapshot");

        let report = self
            .storage
            .restore(&snapshot.location, &self.config.source_root)
            .await
            .map_err(|e| SnapshotError::Io(e.to_string()))?;

        info!(
            snapshot_id = %id,
            files_restored = report.files_copied,
            skipped = report.skipped.len(),
            "Restore finished"
        );
        Ok(report)
    }

    // ------------------------------------------------------------------------
    // Background cadences
    // ------------------------------------------------------------------------

    /// Spawn the enabled cadences. Both stop when `shutdown` is cancelled.
    pub fn start(self: Arc<Self>, shutdown: CancellationToken) -> SchedulerHandle {
        let mut tasks = Vec::new();

        if self.config.hourly_enabled {
            let scheduler = Arc::clone(&self);
            let token = shutdown.clone();
            tasks.push(tokio::spawn(async move { scheduler.run_hourly(token).await }));
        } else {
            info!("Hourly snapshots are disabled");
        }

        if self.config.daily_enabled {
            let scheduler = Arc::clone(&self);
            let token = shutdown.clone();
            tasks.push(tokio::spawn(async move { scheduler.run_daily(token).await }));
        } else {
            info!("Daily snapshots are disabled");
        }

        SchedulerHandle { shutdown, tasks }
    }

    async fn run_hourly(&self, shutdown: CancellationToken) {
        info!(interval = ?self.config.hourly_interval, "Starting hourly snapshot task");

        let mut tick = interval(self.config.hourly_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => self.run_scheduled(SnapshotKind::Hourly).await,
                _ = shutdown.cancelled() => {
                    info!("Hourly snapshot task stopped");
                    break;
                }
            }
        }
    }

    async fn run_daily(&self, shutdown: CancellationToken) {
        let until_midnight = duration_until_next_midnight(chrono::Local::now());
        info!(first_run_in = ?until_midnight, "Starting daily snapshot task");

        let mut tick = interval_at(Instant::now() + until_midnight, DAY);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => self.run_scheduled(SnapshotKind::Daily).await,
                _ = shutdown.cancelled() => {
                    info!("Daily snapshot task stopped");
                    break;
                }
            }
        }
    }

    async fn run_scheduled(&self, kind: SnapshotKind) {
        if let Err(e) = self.run_snapshot(kind, None).await {
            error!(kind = %kind, error = %e, "Scheduled snapshot could not be recorded");
        }
    }
}

/// Running cadence tasks
pub struct SchedulerHandle {
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Cancel the cadences and wait for in-flight runs to finish
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!("Snapshot task ended abnormally: {}", e);
            }
        }
    }
}

/// Time from `now` until the next local midnight in `now`'s timezone.
/// Falls back to 24 hours if that midnight does not exist (DST gap).
pub fn duration_until_next_midnight<Tz: TimeZone>(now: DateTime<Tz>) -> Duration {
    let next_midnight = now
        .date_naive()
        .succ_opt()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .and_then(|naive| now.timezone().from_local_datetime(&naive).earliest());

    match next_midnight {
        Some(midnight) => (midnight - now).to_std().unwrap_or(DAY),
        None => DAY,
    }
}
