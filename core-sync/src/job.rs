//! # Sync Jobs and Options
//!
//! A [`SyncJob`] is the unit of work handed to a worker: one source object
//! plus the destination path it maps to. [`SyncOptions`] describes a whole run.
//!
//! ## Destination Mapping
//!
//! Only the base name of the source path is kept. Objects in different source
//! subdirectories that share a base name map to the same destination path.
//!
//! ```text
//! source "photos/2024/a.jpg", prefix "backup"   → "backup/a.jpg"
//! source "photos/2024/a.jpg", prefix "backup/"  → "backup/a.jpg"
//! source "photos/2024/a.jpg", prefix ""         → "a.jpg"
//! ```

use crate::conflict_resolver::ConflictPolicy;
use crate::{Result, SyncError};
use bridge_traits::{FileDescriptor, ProviderKind};
use serde::{Deserialize, Serialize};

/// Default number of concurrent workers
pub const DEFAULT_PARALLELISM: usize = 4;

// ============================================================================
// Sync Job
// ============================================================================

/// One source object and where it is going
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncJob {
    pub source_path: String,
    pub destination_path: String,
    /// Listing metadata for the source object
    pub descriptor: FileDescriptor,
}

impl SyncJob {
    pub fn new(descriptor: FileDescriptor, destination_prefix: &str) -> Self {
        Self {
            source_path: descriptor.path.clone(),
            destination_path: destination_for(&descriptor.path, destination_prefix),
            descriptor,
        }
    }

    pub fn size(&self) -> u64 {
        self.descriptor.size
    }
}

/// Base name of a slash-separated object path
pub fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Join the base name of `source_path` onto `prefix`
pub fn destination_for(source_path: &str, prefix: &str) -> String {
    let base = base_name(source_path);
    if prefix.is_empty() {
        base.to_string()
    } else if prefix.ends_with('/') {
        format!("{}{}", prefix, base)
    } else {
        format!("{}/{}", prefix, base)
    }
}

// ============================================================================
// Sync Options
// ============================================================================

/// Parameters of one sync run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOptions {
    pub source_provider: ProviderKind,
    pub destination_provider: ProviderKind,
    /// Listing prefix on the source
    pub source_path: String,
    /// Prefix joined with each source base name on the destination
    pub destination_path: String,
    /// Number of concurrent workers
    pub parallel: usize,
    pub conflict_policy: ConflictPolicy,
    /// Accepted but not yet acted on; every run lists the full source prefix
    pub incremental: bool,
}

impl SyncOptions {
    pub fn new(
        source_provider: ProviderKind,
        source_path: impl Into<String>,
        destination_provider: ProviderKind,
        destination_path: impl Into<String>,
    ) -> Self {
        Self {
            source_provider,
            destination_provider,
            source_path: source_path.into(),
            destination_path: destination_path.into(),
            parallel: DEFAULT_PARALLELISM,
            conflict_policy: ConflictPolicy::default(),
            incremental: false,
        }
    }

    pub fn with_parallel(mut self, parallel: usize) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    /// Set the policy from its textual name (`overwrite`, `skip`, `archive`).
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConflictPolicy`] for any other name.
    pub fn with_conflict_policy_str(mut self, policy: &str) -> Result<Self> {
        self.conflict_policy = policy.parse()?;
        Ok(self)
    }

    pub fn with_incremental(mut self, incremental: bool) -> Self {
        self.incremental = incremental;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.parallel == 0 {
            return Err(SyncError::InvalidConfig(
                "parallel must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
