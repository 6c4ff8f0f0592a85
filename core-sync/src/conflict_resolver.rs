//! Conflict Resolution for Sync Operations
//!
//! Decides what happens when the destination already holds an object at a
//! job's destination path.
//!
//! ## Conflict Policies
//!
//! - **Overwrite**: transfer and replace the existing object (default)
//! - **Skip**: leave the destination alone; the file counts as completed
//! - **Archive**: copy the existing object to `<destination>.<YYYYMMDDhhmmss>`
//!   on the destination provider, then transfer over the original
//!
//! No content comparison is done: an identical destination object is still
//! overwritten or archived.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::conflict_resolver::{ConflictAction, ConflictPolicy, ConflictResolver};
//!
//! let resolver = ConflictResolver::new(ConflictPolicy::Archive, clock);
//! match resolver.resolve(&job, &existing) {
//!     ConflictAction::Transfer => { /* overwrite */ }
//!     ConflictAction::Skip => { /* mark completed */ }
//!     ConflictAction::ArchiveThenTransfer { archive_path } => { /* copy, then overwrite */ }
//! }
//! ```

use crate::error::{Result, SyncError};
use crate::job::SyncJob;
use bridge_traits::{Clock, FileDescriptor};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Timestamp suffix format for archive copies
pub const ARCHIVE_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Conflict resolution policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Replace the existing destination object
    #[default]
    Overwrite,
    /// Keep the existing destination object
    Skip,
    /// Preserve a timestamped copy, then replace
    Archive,
}

impl ConflictPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictPolicy::Overwrite => "overwrite",
            ConflictPolicy::Skip => "skip",
            ConflictPolicy::Archive => "archive",
        }
    }
}

impl FromStr for ConflictPolicy {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "overwrite" => Ok(ConflictPolicy::Overwrite),
            "skip" => Ok(ConflictPolicy::Skip),
            "archive" => Ok(ConflictPolicy::Archive),
            _ => Err(SyncError::InvalidConflictPolicy(s.to_string())),
        }
    }
}

impl std::fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the orchestrator should do for a job whose destination exists
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictAction {
    Transfer,
    Skip,
    ArchiveThenTransfer { archive_path: String },
}

/// Applies a [`ConflictPolicy`] to individual jobs
pub struct ConflictResolver {
    policy: ConflictPolicy,
    clock: Arc<dyn Clock>,
}

impl ConflictResolver {
    pub fn new(policy: ConflictPolicy, clock: Arc<dyn Clock>) -> Self {
        Self { policy, clock }
    }

    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    /// Decide the action for `job` given the existing destination object.
    pub fn resolve(&self, job: &SyncJob, existing: &FileDescriptor) -> ConflictAction {
        debug!(
            destination = %job.destination_path,
            existing_size = existing.size,
            existing_etag = %existing.etag,
            policy = %self.policy,
            "Destination already exists"
        );

        match self.policy {
            ConflictPolicy::Overwrite => ConflictAction::Transfer,
            ConflictPolicy::Skip => ConflictAction::Skip,
            ConflictPolicy::Archive => ConflictAction::ArchiveThenTransfer {
                archive_path: archive_path(&job.destination_path, self.clock.now()),
            },
        }
    }
}

/// `<destination>.<YYYYMMDDhhmmss>` for the given instant
pub fn archive_path(destination: &str, at: DateTime<Utc>) -> String {
    format!("{}.{}", destination, at.format(ARCHIVE_TIMESTAMP_FORMAT))
}
