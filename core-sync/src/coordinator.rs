//! # Sync Coordinator
//!
//! Orchestrates a sync run between two registered storage providers.
//!
//! ## Overview
//!
//! The coordinator manages the complete sync workflow:
//! - Resolving source and destination providers from the registry
//! - Listing the source prefix (full listing every run)
//! - Fanning jobs out to a fixed pool of workers over one pre-sized queue
//! - Per file: resume check, attempt bookkeeping, destination probe, conflict
//!   resolution and transfer
//! - Persisting progress through the [`RecoveryManager`]
//! - Emitting [`SyncEvent`]s and a single completion notification
//!
//! ## Per-File Workflow
//!
//! 1. Already `completed` in the recovery state → skipped
//! 2. Attempt budget exhausted → recorded as permanently failed, skipped
//! 3. Marked `in_progress` with the attempt counter bumped, persisted
//! 4. Destination probed; if the object exists the conflict policy decides
//! 5. Transfer (after an archive copy for the `archive` policy)
//! 6. `completed` on success, `failed` otherwise; the run continues either way
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{SyncCoordinator, SyncOptions, ConflictPolicy};
//! use bridge_traits::ProviderKind;
//! use tokio_util::sync::CancellationToken;
//!
//! let coordinator = SyncCoordinator::new(recovery, executor, notifier, clock);
//! coordinator.register_provider(ProviderKind::Local, local).await;
//! coordinator.register_provider(ProviderKind::Aws, s3).await;
//!
//! let options = SyncOptions::new(ProviderKind::Local, "photos", ProviderKind::Aws, "backup")
//!     .with_conflict_policy(ConflictPolicy::Archive);
//! let summary = coordinator.sync(options, CancellationToken::new()).await?;
//! println!("{} of {} files completed", summary.completed, summary.total_files);
//! ```

use crate::conflict_resolver::{ConflictAction, ConflictResolver};
use crate::job::{SyncJob, SyncOptions};
use crate::recovery::RecoveryManager;
use crate::state::{FileState, FileStatus, RunStatus};
use crate::transfer::TransferExecutor;
use crate::{Result, SyncError};
use bridge_traits::{Clock, Notifier, ProviderKind, StorageProvider};
use core_runtime::events::{CoreEvent, EventBus, SkipReason, SyncEvent};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

// ============================================================================
// Summary
// ============================================================================

/// Outcome of one [`SyncCoordinator::sync`] call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub run_id: String,
    pub status: RunStatus,
    /// Objects listed under the source prefix
    pub total_files: u64,
    /// Files that ended this run completed (transferred or skipped)
    pub completed: u64,
    /// Files uploaded during this run
    pub transferred: u64,
    /// Files completed without an upload (already done, or skip policy)
    pub skipped: u64,
    /// Files whose attempt failed during this run
    pub failed: u64,
    /// Files not attempted because their attempt budget was spent
    pub abandoned: u64,
    pub bytes_transferred: u64,
    pub duration: Duration,
}

impl SyncSummary {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }

    fn notification(&self) -> (&'static str, String) {
        match self.status {
            RunStatus::Cancelled => (
                "Sync Cancelled",
                format!(
                    "Synchronized {} of {} files before cancellation",
                    self.completed, self.total_files
                ),
            ),
            RunStatus::CompletedWithErrors => (
                "Sync Completed",
                format!(
                    "Synchronized {} of {} files, {} failed",
                    self.completed,
                    self.total_files,
                    self.failed + self.abandoned
                ),
            ),
            _ => (
                "Sync Completed",
                format!("Synchronized {} files", self.completed),
            ),
        }
    }
}

/// What happened to one job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobOutcome {
    Transferred { bytes: u64 },
    Skipped(SkipReason),
    Failed,
    Abandoned,
    Cancelled,
}

#[derive(Debug, Default, Clone, Copy)]
struct WorkerTally {
    transferred: u64,
    skipped: u64,
    failed: u64,
    abandoned: u64,
    cancelled: u64,
    bytes: u64,
}

impl WorkerTally {
    fn record(&mut self, outcome: JobOutcome) {
        match outcome {
            JobOutcome::Transferred { bytes } => {
                self.transferred += 1;
                self.bytes += bytes;
            }
            JobOutcome::Skipped(_) => self.skipped += 1,
            JobOutcome::Failed => self.failed += 1,
            JobOutcome::Abandoned => self.abandoned += 1,
            JobOutcome::Cancelled => self.cancelled += 1,
        }
    }

    fn merge(&mut self, other: WorkerTally) {
        self.transferred += other.transferred;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.abandoned += other.abandoned;
        self.cancelled += other.cancelled;
        self.bytes += other.bytes;
    }

    fn settled(&self) -> u64 {
        self.transferred + self.skipped + self.failed + self.abandoned
    }
}

// ============================================================================
// Coordinator
// ============================================================================

/// Sync coordinator for orchestrating runs between providers
pub struct SyncCoordinator {
    /// Storage providers by kind
    providers: Arc<RwLock<HashMap<ProviderKind, Arc<dyn StorageProvider>>>>,

    /// Durable per-file progress
    recovery: Arc<RecoveryManager>,

    /// Download/upload with staging and retry
    executor: Arc<TransferExecutor>,

    /// Run-completion notifications
    notifier: Arc<dyn Notifier>,

    /// Time source for archive suffixes
    clock: Arc<dyn Clock>,

    /// Optional event bus for progress events
    event_bus: Option<EventBus>,
}

/// Everything a worker needs for one run
struct RunContext {
    run_id: String,
    source: Arc<dyn StorageProvider>,
    destination: Arc<dyn StorageProvider>,
    resolver: ConflictResolver,
    cancel: CancellationToken,
}

impl SyncCoordinator {
    pub fn new(
        recovery: Arc<RecoveryManager>,
        executor: Arc<TransferExecutor>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            providers: Arc::new(RwLock::new(HashMap::new())),
            recovery,
            executor,
            notifier,
            clock,
            event_bus: None,
        }
    }

    /// Emit progress events on `event_bus`
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Register a storage provider
    ///
    /// Storage providers must be registered before starting sync operations.
    /// Registering the same kind twice replaces the earlier provider.
    pub async fn register_provider(&self, kind: ProviderKind, provider: Arc<dyn StorageProvider>) {
        let mut providers = self.providers.write().await;
        if providers.insert(kind, provider).is_some() {
            warn!("Replaced registered storage provider: {}", kind);
        } else {
            info!("Registered storage provider: {}", kind);
        }
    }

    pub async fn has_provider(&self, kind: ProviderKind) -> bool {
        self.providers.read().await.contains_key(&kind)
    }

    pub async fn provider(&self, kind: ProviderKind) -> Option<Arc<dyn StorageProvider>> {
        self.providers.read().await.get(&kind).cloned()
    }

    pub async fn registered_providers(&self) -> Vec<(ProviderKind, Arc<dyn StorageProvider>)> {
        self.providers
            .read()
            .await
            .iter()
            .map(|(kind, provider)| (*kind, Arc::clone(provider)))
            .collect()
    }

    pub fn recovery(&self) -> &Arc<RecoveryManager> {
        &self.recovery
    }

    /// Run one sync from `options.source_path` to `options.destination_path`.
    ///
    /// Per-file failures never fail the run; they are counted in the summary.
    /// A cancelled run returns `Ok` with [`RunStatus::Cancelled`].
    ///
    /// # Errors
    ///
    /// - [`SyncError::InvalidConfig`] for invalid options
    /// - [`SyncError::ProviderNotConfigured`] if either provider is not registered
    /// - [`SyncError::Listing`] if the source listing fails
    #[instrument(
        skip(self, options, cancel),
        fields(
            source = %options.source_provider,
            destination = %options.destination_provider,
            policy = %options.conflict_policy,
            parallel = options.parallel
        )
    )]
    pub async fn sync(&self, options: SyncOptions, cancel: CancellationToken) -> Result<SyncSummary> {
        options.validate()?;
        let started = Instant::now();

        let source = self.require_provider(options.source_provider).await?;
        let destination = self.require_provider(options.destination_provider).await?;
        let run_id = self.recovery.run_id().await;

        if options.incremental {
            debug!("Incremental listing is not supported yet, listing the full prefix");
        }

        let files = match source.list_files(&options.source_path).await {
            Ok(files) => files,
            Err(e) => {
                let err = SyncError::Listing {
                    prefix: options.source_path.clone(),
                    source: e,
                };
                error!(operation = "list", error = %err, "Sync run aborted");
                self.emit(SyncEvent::Failed {
                    run_id,
                    message: err.to_string(),
                });
                return Err(err);
            }
        };

        let total_files = files.len() as u64;
        self.recovery.set_total_files(total_files).await;
        self.recovery.set_status(RunStatus::Running).await;

        info!(run_id = %run_id, total_files, "Starting sync run");
        self.emit(SyncEvent::Started {
            run_id: run_id.clone(),
            source: format!("{}:{}", options.source_provider, options.source_path),
            destination: format!(
                "{}:{}",
                options.destination_provider, options.destination_path
            ),
            total_files,
        });

        let (tx, rx) = mpsc::channel(files.len().max(1));
        for descriptor in files {
            let job = SyncJob::new(descriptor, &options.destination_path);
            if tx.send(job).await.is_err() {
                break;
            }
        }
        drop(tx);

        let context = Arc::new(RunContext {
            run_id: run_id.clone(),
            source,
            destination,
            resolver: ConflictResolver::new(options.conflict_policy, Arc::clone(&self.clock)),
            cancel: cancel.clone(),
        });
        let queue = Arc::new(Mutex::new(rx));

        let mut workers = JoinSet::new();
        for worker_id in 0..options.parallel {
            let coordinator = self.clone_for_task();
            let context = Arc::clone(&context);
            let queue = Arc::clone(&queue);
            workers.spawn(async move { coordinator.run_worker(worker_id, context, queue).await });
        }

        let mut tally = WorkerTally::default();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(worker_tally) => tally.merge(worker_tally),
                Err(e) => error!("Sync worker terminated abnormally: {}", e),
            }
        }

        let status = if cancel.is_cancelled() && tally.settled() < total_files {
            RunStatus::Cancelled
        } else if tally.failed + tally.abandoned > 0 {
            RunStatus::CompletedWithErrors
        } else {
            RunStatus::Completed
        };

        self.recovery.set_status(status).await;
        self.recovery.persist_or_log().await;

        let summary = SyncSummary {
            run_id: run_id.clone(),
            status,
            total_files,
            completed: tally.transferred + tally.skipped,
            transferred: tally.transferred,
            skipped: tally.skipped,
            failed: tally.failed,
            abandoned: tally.abandoned,
            bytes_transferred: tally.bytes,
            duration: started.elapsed(),
        };

        info!(
            run_id = %run_id,
            status = %status,
            completed = summary.completed,
            failed = summary.failed,
            abandoned = summary.abandoned,
            bytes_count = summary.bytes_transferred,
            "Sync run finished"
        );

        let (title, message) = summary.notification();
        if let Err(e) = self.notifier.notify(title, &message).await {
            warn!(error = %e, "Failed to deliver sync notification");
        }

        if status == RunStatus::Cancelled {
            self.emit(SyncEvent::Cancelled {
                run_id,
                completed: summary.completed,
            });
        } else {
            self.emit(SyncEvent::Completed {
                run_id,
                total_files,
                completed: summary.completed,
                failed: summary.failed + summary.abandoned,
                duration_secs: summary.duration.as_secs(),
            });
        }

        Ok(summary)
    }

    async fn require_provider(&self, kind: ProviderKind) -> Result<Arc<dyn StorageProvider>> {
        self.provider(kind)
            .await
            .ok_or(SyncError::ProviderNotConfigured(kind))
    }

    /// Clone for background task (avoids Arc<Arc<...>>)
    fn clone_for_task(&self) -> Self {
        Self {
            providers: Arc::clone(&self.providers),
            recovery: Arc::clone(&self.recovery),
            executor: Arc::clone(&self.executor),
            notifier: Arc::clone(&self.notifier),
            clock: Arc::clone(&self.clock),
            event_bus: self.event_bus.clone(),
        }
    }

    async fn run_worker(
        &self,
        worker_id: usize,
        context: Arc<RunContext>,
        queue: Arc<Mutex<mpsc::Receiver<SyncJob>>>,
    ) -> WorkerTally {
        let mut tally = WorkerTally::default();

        loop {
            if context.cancel.is_cancelled() {
                debug!(worker_id, "Worker observed cancellation");
                break;
            }

            let next = queue.lock().await.recv().await;
            let Some(job) = next else {
                break;
            };

            let outcome = self.process_job(&context, &job).await;
            tally.record(outcome);
        }

        tally
    }

    #[instrument(skip(self, context, job), fields(path = %job.source_path))]
    async fn process_job(&self, context: &RunContext, job: &SyncJob) -> JobOutcome {
        let previous = self.recovery.get_file_state(&job.source_path).await;

        if let Some(previous) = &previous {
            if previous.status == FileStatus::Completed {
                debug!("Already completed in a previous run");
                self.emit(SyncEvent::FileSkipped {
                    run_id: context.run_id.clone(),
                    path: job.source_path.clone(),
                    reason: SkipReason::AlreadyCompleted,
                });
                return JobOutcome::Skipped(SkipReason::AlreadyCompleted);
            }

            if self.recovery.attempts_exhausted(previous) {
                let err = SyncError::MaxAttemptsExceeded {
                    path: job.source_path.clone(),
                    attempts: previous.attempts,
                };
                warn!(operation = "transfer", error = %err, "Not retrying file");
                self.recovery
                    .record_failed(&job.source_path, err.to_string(), previous.attempts)
                    .await;
                self.emit(SyncEvent::FileAbandoned {
                    run_id: context.run_id.clone(),
                    path: job.source_path.clone(),
                    attempts: previous.attempts,
                });
                return JobOutcome::Abandoned;
            }
        }

        let attempt = FileState::begin_attempt(&job.descriptor, previous.as_ref());
        let attempts = attempt.attempts;
        self.recovery.update_file_state(attempt.clone()).await;
        self.recovery.persist_or_log().await;
        self.emit(SyncEvent::FileStarted {
            run_id: context.run_id.clone(),
            path: job.source_path.clone(),
            attempt: attempts,
        });

        match self.execute_job(context, job).await {
            Ok(Some(bytes)) => {
                self.recovery.update_file_state(attempt.complete(bytes)).await;
                info!(
                    operation = "transfer",
                    source = %job.source_path,
                    destination = %job.destination_path,
                    bytes_count = bytes,
                    "File transferred"
                );
                self.emit(SyncEvent::FileCompleted {
                    run_id: context.run_id.clone(),
                    path: job.source_path.clone(),
                    bytes,
                });
                JobOutcome::Transferred { bytes }
            }
            Ok(None) => {
                self.recovery.update_file_state(attempt.complete(0)).await;
                info!(
                    operation = "conflict_skip",
                    source = %job.source_path,
                    destination = %job.destination_path,
                    "Destination exists, skipped"
                );
                self.emit(SyncEvent::FileSkipped {
                    run_id: context.run_id.clone(),
                    path: job.source_path.clone(),
                    reason: SkipReason::DestinationExists,
                });
                JobOutcome::Skipped(SkipReason::DestinationExists)
            }
            Err(SyncError::Cancelled) => {
                debug!("Transfer interrupted by cancellation");
                JobOutcome::Cancelled
            }
            Err(e) => {
                self.recovery.update_file_state(attempt.fail()).await;
                error!(
                    operation = "transfer",
                    source = %job.source_path,
                    destination = %job.destination_path,
                    error = %e,
                    "File transfer failed"
                );
                self.emit(SyncEvent::FileFailed {
                    run_id: context.run_id.clone(),
                    path: job.source_path.clone(),
                    message: e.to_string(),
                    attempts,
                });
                JobOutcome::Failed
            }
        }
    }

    /// Probe, resolve and transfer. `Ok(None)` means the skip policy applied.
    async fn execute_job(&self, context: &RunContext, job: &SyncJob) -> Result<Option<u64>> {
        let destination = context.destination.as_ref();

        let probe = tokio::select! {
            _ = context.cancel.cancelled() => return Err(SyncError::Cancelled),
            probe = destination.get_file_info(&job.destination_path) => probe,
        };

        let action = match probe {
            Ok(existing) => context.resolver.resolve(job, &existing),
            Err(e) if e.is_not_found() => ConflictAction::Transfer,
            Err(e) => return Err(SyncError::Provider(e)),
        };

        match action {
            ConflictAction::Skip => return Ok(None),
            ConflictAction::ArchiveThenTransfer { archive_path } => {
                self.executor
                    .transfer(
                        destination,
                        &job.destination_path,
                        destination,
                        &archive_path,
                        &context.cancel,
                    )
                    .await
                    .map_err(|e| match e {
                        SyncError::Cancelled => SyncError::Cancelled,
                        other => SyncError::ArchiveFailed {
                            path: job.destination_path.clone(),
                            archive_path: archive_path.clone(),
                            message: other.to_string(),
                        },
                    })?;

                info!(
                    operation = "archive",
                    source = %job.destination_path,
                    destination = %archive_path,
                    "Archived existing destination object"
                );
                self.emit(SyncEvent::Archived {
                    run_id: context.run_id.clone(),
                    path: job.destination_path.clone(),
                    archive_path,
                });
            }
            ConflictAction::Transfer => {}
        }

        let bytes = self
            .executor
            .transfer(
                context.source.as_ref(),
                &job.source_path,
                destination,
                &job.destination_path,
                &context.cancel,
            )
            .await?;
        if bytes != job.size() {
            debug!(
                path = %job.source_path,
                listed = job.size(),
                staged = bytes,
                "Object size changed since listing"
            );
        }

        Ok(Some(bytes))
    }

    fn emit(&self, event: SyncEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Sync(event)).ok();
        }
    }
}
