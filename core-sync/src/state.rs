//! # Persisted Sync State
//!
//! The durable record of one run: per-file progress, permanently failed files
//! and run-level counters. Serialized as JSON with snake_case keys.
//!
//! ## File State Machine
//!
//! ```text
//! Pending → InProgress → Completed
//!               ↓
//!             Failed ──(later run)──→ InProgress
//! ```
//!
//! `Completed` is terminal; `attempts` only grows.

use crate::{Result, SyncError};
use bridge_traits::FileDescriptor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

// ============================================================================
// Status Types
// ============================================================================

/// Progress of a single file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// Listed but not yet picked up
    Pending,
    /// A worker is transferring the file
    InProgress,
    /// Transfer acknowledged (or skipped by conflict policy)
    Completed,
    /// Last attempt failed; eligible for retry in a later run
    Failed,
}

impl FileStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FileStatus::Completed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Pending => "pending",
            FileStatus::InProgress => "in_progress",
            FileStatus::Completed => "completed",
            FileStatus::Failed => "failed",
        }
    }
}

impl FromStr for FileStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(FileStatus::Pending),
            "in_progress" => Ok(FileStatus::InProgress),
            "completed" => Ok(FileStatus::Completed),
            "failed" => Ok(FileStatus::Failed),
            _ => Err(SyncError::InvalidStatus(s.to_string())),
        }
    }
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle of a whole run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Fresh state, no run has started yet
    Initializing,
    /// Workers are draining the queue
    Running,
    /// Every listed file is completed
    Completed,
    /// The queue drained but some files failed
    CompletedWithErrors,
    /// The run observed cancellation
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Initializing => "initializing",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::CompletedWithErrors => "completed_with_errors",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for RunStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "initializing" => Ok(RunStatus::Initializing),
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "completed_with_errors" => Ok(RunStatus::CompletedWithErrors),
            "cancelled" => Ok(RunStatus::Cancelled),
            _ => Err(SyncError::InvalidStatus(s.to_string())),
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Records
// ============================================================================

/// Progress of one source object, keyed by its source path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileState {
    pub path: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    pub etag: String,
    pub status: FileStatus,
    pub bytes_transferred: u64,
    pub attempts: u32,
}

impl FileState {
    /// A pending record for a freshly listed object
    pub fn pending(descriptor: &FileDescriptor) -> Self {
        Self {
            path: descriptor.path.clone(),
            size: descriptor.size,
            last_modified: descriptor.last_modified,
            etag: descriptor.etag.clone(),
            status: FileStatus::Pending,
            bytes_transferred: 0,
            attempts: 0,
        }
    }

    /// The record for the next attempt: refreshed metadata, `in_progress`,
    /// attempt counter bumped.
    pub fn begin_attempt(descriptor: &FileDescriptor, previous: Option<&FileState>) -> Self {
        let mut state = Self::pending(descriptor);
        state.status = FileStatus::InProgress;
        state.attempts = previous.map(|p| p.attempts).unwrap_or(0) + 1;
        state
    }

    pub fn complete(mut self, bytes_transferred: u64) -> Self {
        self.status = FileStatus::Completed;
        self.bytes_transferred = bytes_transferred;
        self
    }

    pub fn fail(mut self) -> Self {
        self.status = FileStatus::Failed;
        self
    }
}

/// A file that exhausted its attempt budget
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedFile {
    pub path: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
    pub attempts: u32,
}

/// Everything persisted for one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    pub id: String,
    pub start_time: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub status: RunStatus,
    pub file_states: HashMap<String, FileState>,
    pub failed_files: HashMap<String, FailedFile>,
    pub total_files: u64,
    pub processed_files: u64,
}

impl SyncState {
    /// A fresh state whose id is seeded from `now` (`sync_<unix seconds>`)
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            id: format!("sync_{}", now.timestamp()),
            start_time: now,
            last_updated: now,
            status: RunStatus::Initializing,
            file_states: HashMap::new(),
            failed_files: HashMap::new(),
            total_files: 0,
            processed_files: 0,
        }
    }
}
