//! # Transfer Executor
//!
//! Moves one object between two providers through a local staging file.
//!
//! ## Workflow
//!
//! 1. Download the source object into a uniquely named file under the staging
//!    directory (one attempt)
//! 2. Upload the staged file to the destination, retrying with linear backoff
//!    per [`RetryPolicy`]
//! 3. Remove the staging file on every outcome
//!
//! Cancellation is observed during the download, between upload attempts and
//! during backoff sleeps. An upload already handed to the provider is awaited.

use crate::job::base_name;
use crate::{Result, SyncError};
use bridge_traits::StorageProvider;
use core_runtime::config::RetryPolicy;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

pub struct TransferExecutor {
    staging_dir: PathBuf,
    retry: RetryPolicy,
}

impl TransferExecutor {
    pub fn new(staging_dir: impl Into<PathBuf>, retry: RetryPolicy) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            retry,
        }
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Copy `source_path` on `source` to `destination_path` on `destination`.
    ///
    /// Returns the number of bytes staged.
    ///
    /// # Errors
    ///
    /// - [`SyncError::Cancelled`] if `cancel` fired before the upload succeeded
    /// - [`SyncError::Transfer`] if the download failed or every upload attempt failed
    #[instrument(skip(self, source, destination, cancel))]
    pub async fn transfer(
        &self,
        source: &dyn StorageProvider,
        source_path: &str,
        destination: &dyn StorageProvider,
        destination_path: &str,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        tokio::fs::create_dir_all(&self.staging_dir)
            .await
            .map_err(|e| SyncError::Transfer {
                path: source_path.to_string(),
                message: format!("failed to create staging directory: {}", e),
            })?;

        let staged = self
            .staging_dir
            .join(format!("{}-{}", Uuid::new_v4(), base_name(source_path)));

        let result = self
            .stage_and_upload(
                source,
                source_path,
                destination,
                destination_path,
                &staged,
                cancel,
            )
            .await;

        self.cleanup_staged_file(&staged).await;
        result
    }

    async fn stage_and_upload(
        &self,
        source: &dyn StorageProvider,
        source_path: &str,
        destination: &dyn StorageProvider,
        destination_path: &str,
        staged: &Path,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        tokio::select! {
            _ = cancel.cancelled() => return Err(SyncError::Cancelled),
            downloaded = source.download_file(source_path, staged) => {
                downloaded.map_err(|e| SyncError::Transfer {
                    path: source_path.to_string(),
                    message: format!("download failed: {}", e),
                })?;
            }
        }

        let bytes = tokio::fs::metadata(staged)
            .await
            .map_err(|e| SyncError::Transfer {
                path: source_path.to_string(),
                message: format!("staged file unreadable: {}", e),
            })?
            .len();
        debug!(bytes, staged = %staged.display(), "Staged source object");

        let mut attempt = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            attempt += 1;

            match destination.upload_file(staged, destination_path).await {
                Ok(()) => return Ok(bytes),
                Err(e) => match self.retry.backoff_after(attempt) {
                    Some(delay) => {
                        warn!(
                            attempt,
                            destination = %destination_path,
                            error = %e,
                            "Upload attempt failed, retrying in {:?}",
                            delay
                        );
                        tokio::select! {
                            _ = cancel.cancelled() => return Err(SyncError::Cancelled),
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                    None => {
                        return Err(SyncError::Transfer {
                            path: source_path.to_string(),
                            message: format!("upload failed after {} attempts: {}", attempt, e),
                        });
                    }
                },
            }
        }
    }

    async fn cleanup_staged_file(&self, path: &Path) {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to clean up staging file {:?}: {}", path, e),
        }
    }
}
