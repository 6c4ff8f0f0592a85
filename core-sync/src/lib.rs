//! # Sync Core
//!
//! Resumable, parallel synchronization of objects between storage providers.
//!
//! ## Overview
//!
//! A run lists every object under a source prefix, maps each to a destination
//! path and copies it through a local staging file. Progress is recorded per
//! file so an interrupted run can be resumed without re-transferring
//! completed files.
//!
//! ## Components
//!
//! - **State** (`state`): persisted per-file and per-run records
//! - **Recovery Manager** (`recovery`): guarded state, atomic persistence, autosave
//! - **Conflict Resolver** (`conflict_resolver`): overwrite / skip / archive policies
//! - **Transfer Executor** (`transfer`): staged download and retried upload
//! - **Jobs** (`job`): per-file work items and run options
//! - **Sync Coordinator** (`coordinator`): provider registry and the worker pool

pub mod conflict_resolver;
pub mod coordinator;
pub mod error;
pub mod job;
pub mod recovery;
pub mod state;
pub mod transfer;

pub use conflict_resolver::{archive_path, ConflictAction, ConflictPolicy, ConflictResolver};
pub use coordinator::{SyncCoordinator, SyncSummary};
pub use error::{Result, SyncError};
pub use job::{destination_for, SyncJob, SyncOptions, DEFAULT_PARALLELISM};
pub use recovery::{RecoveryManager, RecoveryStats};
pub use state::{FailedFile, FileState, FileStatus, RunStatus, SyncState};
pub use transfer::TransferExecutor;
