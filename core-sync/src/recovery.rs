//! # Recovery Manager
//!
//! Owns the persisted [`SyncState`] of a run and is the only way to read or
//! mutate it.
//!
//! ## Overview
//!
//! - Loading fails open: a missing or unreadable state file yields a fresh state.
//! - Every accessor goes through one `RwLock`; serialization happens under the
//!   same lock so a snapshot never mixes two updates.
//! - [`RecoveryManager::persist`] writes a sibling `.tmp` file and renames it
//!   over the canonical file, so a crash mid-write leaves the previous record
//!   intact.
//! - [`RecoveryManager::start_autosave`] flushes on an interval and once more
//!   when its cancellation token fires.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::RecoveryManager;
//! use tokio_util::sync::CancellationToken;
//! use std::sync::Arc;
//!
//! let recovery = Arc::new(RecoveryManager::load("/var/lib/datasync/state.json", 3, clock).await);
//! let shutdown = CancellationToken::new();
//! let autosave = recovery.start_autosave(Duration::from_secs(30), shutdown.clone());
//!
//! // ... run a sync ...
//!
//! shutdown.cancel();
//! autosave.await?; // final flush has happened
//! ```

use crate::state::{FailedFile, FileState, FileStatus, RunStatus, SyncState};
use crate::{Result, SyncError};
use bridge_traits::Clock;
use serde::Serialize;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Counts of files by status, for summaries and logging
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryStats {
    pub total_files: u64,
    pub processed_files: u64,
    pub pending: u64,
    pub in_progress: u64,
    pub completed: u64,
    pub failed: u64,
    pub abandoned: u64,
}

pub struct RecoveryManager {
    state_path: PathBuf,
    max_attempts: u32,
    state: RwLock<SyncState>,
    /// Serializes writers of the temporary file
    persist_lock: Mutex<()>,
    clock: Arc<dyn Clock>,
}

impl RecoveryManager {
    /// Load the state at `state_path`, or start fresh if there is none.
    ///
    /// Never fails: unreadable or unparsable records are logged and replaced
    /// with a fresh state (the bad file is left on disk until the next persist).
    #[instrument(skip(clock), fields(state_path = %state_path.as_ref().display()))]
    pub async fn load(
        state_path: impl AsRef<Path>,
        max_attempts: u32,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let state_path = state_path.as_ref().to_path_buf();

        let state = match read_state(&state_path).await {
            Ok(Some(state)) => {
                info!(
                    run_id = %state.id,
                    files = state.file_states.len(),
                    processed = state.processed_files,
                    "Resuming from persisted sync state"
                );
                state
            }
            Ok(None) => {
                debug!("No persisted sync state, starting fresh");
                SyncState::new(clock.now())
            }
            Err(e) => {
                warn!(error = %e, "Discarding unreadable sync state, starting fresh");
                SyncState::new(clock.now())
            }
        };

        Self {
            state_path,
            max_attempts,
            state: RwLock::new(state),
            persist_lock: Mutex::new(()),
            clock,
        }
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub async fn run_id(&self) -> String {
        self.state.read().await.id.clone()
    }

    pub async fn get_file_state(&self, path: &str) -> Option<FileState> {
        self.state.read().await.file_states.get(path).cloned()
    }

    /// Upsert a file record.
    ///
    /// `processed_files` is bumped only on the transition into `completed`. A
    /// completed record is never replaced by a non-completed one, and the
    /// stored attempt count never goes down.
    ///
    /// Returns `false` when the update was rejected.
    pub async fn update_file_state(&self, mut file_state: FileState) -> bool {
        let now = self.clock.now();
        let mut state = self.state.write().await;

        let previous = state.file_states.get(&file_state.path);
        let was_completed = previous.map(|p| p.status.is_terminal()).unwrap_or(false);

        if was_completed && file_state.status != FileStatus::Completed {
            warn!(
                path = %file_state.path,
                status = %file_state.status,
                "Ignoring update to an already completed file"
            );
            return false;
        }

        if let Some(previous) = previous {
            file_state.attempts = file_state.attempts.max(previous.attempts);
        }

        if file_state.status == FileStatus::Completed && !was_completed {
            state.processed_files += 1;
        }

        state.file_states.insert(file_state.path.clone(), file_state);
        state.last_updated = now;
        true
    }

    /// Record a file as permanently failed.
    pub async fn record_failed(&self, path: &str, error: impl Into<String>, attempts: u32) {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        state.failed_files.insert(
            path.to_string(),
            FailedFile {
                path: path.to_string(),
                error: error.into(),
                timestamp: now,
                attempts,
            },
        );
        state.last_updated = now;
    }

    /// Whether a file with this record must not be attempted again.
    pub fn attempts_exhausted(&self, file_state: &FileState) -> bool {
        !file_state.status.is_terminal() && file_state.attempts >= self.max_attempts
    }

    pub async fn set_status(&self, status: RunStatus) {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        state.status = status;
        state.last_updated = now;
    }

    pub async fn set_total_files(&self, total_files: u64) {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        state.total_files = total_files;
        state.last_updated = now;
    }

    /// A copy of the full state.
    pub async fn snapshot(&self) -> SyncState {
        self.state.read().await.clone()
    }

    pub async fn stats(&self) -> RecoveryStats {
        let state = self.state.read().await;
        let mut stats = RecoveryStats {
            total_files: state.total_files,
            processed_files: state.processed_files,
            abandoned: state.failed_files.len() as u64,
            ..Default::default()
        };

        for file in state.file_states.values() {
            match file.status {
                FileStatus::Pending => stats.pending += 1,
                FileStatus::InProgress => stats.in_progress += 1,
                FileStatus::Completed => stats.completed += 1,
                FileStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    /// Atomically rewrite the state file.
    ///
    /// The snapshot is taken after acquiring the write slot, so a later call
    /// always persists at least as much as an earlier one.
    pub async fn persist(&self) -> Result<()> {
        let _slot = self.persist_lock.lock().await;

        let data = {
            let mut state = self.state.write().await;
            state.last_updated = self.clock.now();
            serde_json::to_vec_pretty(&*state)?
        };

        if let Some(parent) = self.state_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let tmp_path = temp_path(&self.state_path);
        let mut file = tokio::fs::File::create(&tmp_path).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp_path, &self.state_path)
            .await
            .map_err(|e| {
                SyncError::Persistence(format!(
                    "rename {} -> {}: {}",
                    tmp_path.display(),
                    self.state_path.display(),
                    e
                ))
            })?;

        debug!(bytes = data.len(), "Persisted sync state");
        Ok(())
    }

    /// Persist, logging instead of returning failures.
    pub async fn persist_or_log(&self) {
        if let Err(e) = self.persist().await {
            error!(error = %e, "Failed to persist sync state");
        }
    }

    /// Spawn a task that persists every `interval` and once more after
    /// `cancel` fires. The returned handle completes after that final flush.
    pub fn start_autosave(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let manager = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        manager.persist_or_log().await;
                        debug!("Autosave stopped after final flush");
                        break;
                    }
                    _ = ticker.tick() => {
                        manager.persist_or_log().await;
                    }
                }
            }
        })
    }
}

fn temp_path(state_path: &Path) -> PathBuf {
    let mut name = OsString::from(state_path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

async fn read_state(path: &Path) -> Result<Option<SyncState>> {
    let data = match tokio::fs::read(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_slice(&data)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::{FileDescriptor, FixedClock, SystemClock};
    use chrono::TimeZone;

    fn clock() -> Arc<dyn Clock> {
        Arc::new(SystemClock)
    }

    fn in_progress(path: &str, attempts: u32) -> FileState {
        let mut state = FileState::begin_attempt(&FileDescriptor::new(path, 10), None);
        state.attempts = attempts;
        state
    }

    #[tokio::test]
    async fn test_load_missing_file_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let fixed = chrono::Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        let manager =
            RecoveryManager::load(dir.path().join("state.json"), 3, Arc::new(FixedClock(fixed)))
                .await;

        let state = manager.snapshot().await;
        assert_eq!(state.id, format!("sync_{}", fixed.timestamp()));
        assert_eq!(state.status, RunStatus::Initializing);
        assert!(state.file_states.is_empty());
    }

    #[tokio::test]
    async fn test_load_corrupt_file_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        tokio::fs::write(&path, b"{ not json").await.unwrap();

        let manager = RecoveryManager::load(&path, 3, clock()).await;
        assert!(manager.snapshot().await.file_states.is_empty());
    }

    #[tokio::test]
    async fn test_persist_then_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let manager = RecoveryManager::load(&path, 3, clock()).await;
        manager
            .update_file_state(in_progress("src/a.txt", 1).complete(10))
            .await;
        manager.persist().await.unwrap();
        assert!(!temp_path(&path).exists());

        let reloaded = RecoveryManager::load(&path, 3, clock()).await;
        let file = reloaded.get_file_state("src/a.txt").await.unwrap();
        assert_eq!(file.status, FileStatus::Completed);
        assert_eq!(file.bytes_transferred, 10);
        assert_eq!(reloaded.snapshot().await.processed_files, 1);
        assert_eq!(reloaded.run_id().await, manager.run_id().await);
    }

    #[tokio::test]
    async fn test_processed_files_counts_once() {
        let dir = tempfile::tempdir().unwrap();
        let manager = RecoveryManager::load(dir.path().join("s.json"), 3, clock()).await;

        let done = in_progress("a.txt", 1).complete(10);
        assert!(manager.update_file_state(done.clone()).await);
        assert!(manager.update_file_state(done).await);

        assert_eq!(manager.snapshot().await.processed_files, 1);
    }

    #[tokio::test]
    async fn test_completed_is_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let manager = RecoveryManager::load(dir.path().join("s.json"), 3, clock()).await;

        manager
            .update_file_state(in_progress("a.txt", 1).complete(10))
            .await;
        assert!(!manager.update_file_state(in_progress("a.txt", 2)).await);

        let file = manager.get_file_state("a.txt").await.unwrap();
        assert_eq!(file.status, FileStatus::Completed);
        assert_eq!(file.attempts, 1);
    }

    #[tokio::test]
    async fn test_attempts_never_decrease() {
        let dir = tempfile::tempdir().unwrap();
        let manager = RecoveryManager::load(dir.path().join("s.json"), 5, clock()).await;

        manager.update_file_state(in_progress("a.txt", 3)).await;
        manager.update_file_state(in_progress("a.txt", 1).fail()).await;

        assert_eq!(manager.get_file_state("a.txt").await.unwrap().attempts, 3);
    }

    #[tokio::test]
    async fn test_attempts_exhausted() {
        let dir = tempfile::tempdir().unwrap();
        let manager = RecoveryManager::load(dir.path().join("s.json"), 2, clock()).await;

        assert!(!manager.attempts_exhausted(&in_progress("a.txt", 1).fail()));
        assert!(manager.attempts_exhausted(&in_progress("a.txt", 2).fail()));
        assert!(!manager.attempts_exhausted(&in_progress("a.txt", 2).complete(1)));
    }

    #[tokio::test]
    async fn test_interrupted_write_keeps_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let manager = RecoveryManager::load(&path, 3, clock()).await;
        manager
            .update_file_state(in_progress("a.txt", 1).complete(10))
            .await;
        manager.persist().await.unwrap();

        // A crash after the temp write but before the rename leaves a torn temp file
        tokio::fs::write(temp_path(&path), b"{\"id\": \"sync_").await.unwrap();

        let reloaded = RecoveryManager::load(&path, 3, clock()).await;
        assert_eq!(
            reloaded.get_file_state("a.txt").await.unwrap().status,
            FileStatus::Completed
        );

        // The next persist replaces the torn temp file
        reloaded.persist().await.unwrap();
        assert!(!temp_path(&path).exists());
    }

    #[tokio::test]
    async fn test_stats() {
        let dir = tempfile::tempdir().unwrap();
        let manager = RecoveryManager::load(dir.path().join("s.json"), 3, clock()).await;

        manager.set_total_files(3).await;
        manager.update_file_state(in_progress("a.txt", 1).complete(1)).await;
        manager.update_file_state(in_progress("b.txt", 1).fail()).await;
        manager.update_file_state(in_progress("c.txt", 1)).await;
        manager.record_failed("d.txt", "max retry attempts exceeded", 3).await;

        let stats = manager.stats().await;
        assert_eq!(stats.total_files, 3);
        assert_eq!(stats.processed_files, 1);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.in_progress, 1);
        assert_eq!(stats.abandoned, 1);
    }

    #[tokio::test]
    async fn test_autosave_ticks_and_final_flush() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let manager = Arc::new(RecoveryManager::load(&path, 3, clock()).await);
        let cancel = CancellationToken::new();

        let handle = manager.start_autosave(Duration::from_millis(20), cancel.clone());

        for _ in 0..200 {
            if path.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(path.exists());

        manager
            .update_file_state(in_progress("late.txt", 1).complete(5))
            .await;
        cancel.cancel();
        handle.await.unwrap();

        let reloaded = RecoveryManager::load(&path, 3, clock()).await;
        assert!(reloaded.get_file_state("late.txt").await.is_some());
    }
}
