//! Shared fixtures for the sync integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{
    BridgeError, Clock, FileDescriptor, Notifier, ProviderKind, StorageProvider, SystemClock,
};
use core_runtime::config::RetryPolicy;
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use core_sync::{RecoveryManager, SyncCoordinator, TransferExecutor};
use mockall::mock;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast::Receiver;
use tokio_util::sync::CancellationToken;

pub const SOURCE: ProviderKind = ProviderKind::Local;
pub const DESTINATION: ProviderKind = ProviderKind::Aws;

// ============================================================================
// In-memory provider
// ============================================================================

/// Object store backed by a map, with failure injection
#[derive(Default)]
pub struct MemoryProvider {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    uploads: Mutex<Vec<String>>,
    failing_upload_paths: Mutex<HashSet<String>>,
    fail_next_uploads: AtomicU32,
    listing_error: Mutex<Option<String>>,
    lookup_error: Mutex<Option<String>>,
    cancel_on_upload: Mutex<Option<CancellationToken>>,
    upload_delay: Mutex<Option<Duration>>,
    uploads_in_flight: AtomicUsize,
    peak_uploads_in_flight: AtomicUsize,
}

impl MemoryProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_objects(objects: &[(&str, &[u8])]) -> Arc<Self> {
        let provider = Self::default();
        for (path, data) in objects {
            provider.insert(path, data);
        }
        Arc::new(provider)
    }

    pub fn insert(&self, path: &str, data: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(path.to_string(), data.to_vec());
    }

    pub fn object(&self, path: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(path).cloned()
    }

    pub fn paths(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    /// Remote paths of every acknowledged upload, in order
    pub fn uploads(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }

    /// Fail the next `count` uploads, whatever their path
    pub fn fail_next_uploads(&self, count: u32) {
        self.fail_next_uploads.store(count, Ordering::SeqCst);
    }

    /// Fail every upload to `path`
    pub fn fail_uploads_to(&self, path: &str) {
        self.failing_upload_paths
            .lock()
            .unwrap()
            .insert(path.to_string());
    }

    pub fn fail_listing(&self, message: &str) {
        *self.listing_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn fail_lookups(&self, message: &str) {
        *self.lookup_error.lock().unwrap() = Some(message.to_string());
    }

    /// Cancel `token` once the first upload is acknowledged
    pub fn cancel_on_upload(&self, token: CancellationToken) {
        *self.cancel_on_upload.lock().unwrap() = Some(token);
    }

    /// Hold every upload open for `delay` so concurrent uploads overlap
    pub fn slow_uploads(&self, delay: Duration) {
        *self.upload_delay.lock().unwrap() = Some(delay);
    }

    /// Highest number of uploads observed running at the same time
    pub fn peak_uploads_in_flight(&self) -> usize {
        self.peak_uploads_in_flight.load(Ordering::SeqCst)
    }

    fn descriptor(path: &str, data: &[u8]) -> FileDescriptor {
        FileDescriptor::new(path, data.len() as u64).with_etag(format!("{:08x}", data.len()))
    }
}

#[async_trait]
impl StorageProvider for MemoryProvider {
    async fn authenticate(&self) -> BridgeResult<()> {
        Ok(())
    }

    async fn list_files(&self, prefix: &str) -> BridgeResult<Vec<FileDescriptor>> {
        if let Some(message) = self.listing_error.lock().unwrap().clone() {
            return Err(BridgeError::OperationFailed(message));
        }
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|(path, _)| path.starts_with(prefix))
            .map(|(path, data)| Self::descriptor(path, data))
            .collect())
    }

    async fn upload_file(&self, local_path: &Path, remote_path: &str) -> BridgeResult<()> {
        let pending_failures = self.fail_next_uploads.load(Ordering::SeqCst);
        if pending_failures > 0 {
            self.fail_next_uploads
                .store(pending_failures - 1, Ordering::SeqCst);
            return Err(BridgeError::OperationFailed("injected upload failure".to_string()));
        }
        if self.failing_upload_paths.lock().unwrap().contains(remote_path) {
            return Err(BridgeError::OperationFailed(format!(
                "upload to {} rejected",
                remote_path
            )));
        }

        let in_flight = self.uploads_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_uploads_in_flight
            .fetch_max(in_flight, Ordering::SeqCst);
        let delay = *self.upload_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let read = tokio::fs::read(local_path).await;
        self.uploads_in_flight.fetch_sub(1, Ordering::SeqCst);

        let data = read?;
        self.insert(remote_path, &data);
        self.uploads.lock().unwrap().push(remote_path.to_string());

        if let Some(token) = self.cancel_on_upload.lock().unwrap().take() {
            token.cancel();
        }
        Ok(())
    }

    async fn download_file(&self, remote_path: &str, local_path: &Path) -> BridgeResult<()> {
        let data = self
            .object(remote_path)
            .ok_or_else(|| BridgeError::NotFound(remote_path.to_string()))?;
        tokio::fs::write(local_path, data).await?;
        Ok(())
    }

    async fn delete_file(&self, remote_path: &str) -> BridgeResult<()> {
        self.objects
            .lock()
            .unwrap()
            .remove(remote_path)
            .map(|_| ())
            .ok_or_else(|| BridgeError::NotFound(remote_path.to_string()))
    }

    async fn get_file_info(&self, remote_path: &str) -> BridgeResult<FileDescriptor> {
        if let Some(message) = self.lookup_error.lock().unwrap().clone() {
            return Err(BridgeError::OperationFailed(message));
        }
        self.objects
            .lock()
            .unwrap()
            .get(remote_path)
            .map(|data| Self::descriptor(remote_path, data))
            .ok_or_else(|| BridgeError::NotFound(remote_path.to_string()))
    }
}

mock! {
    pub Provider {}

    #[async_trait]
    impl StorageProvider for Provider {
        async fn authenticate(&self) -> BridgeResult<()>;
        async fn list_files(&self, prefix: &str) -> BridgeResult<Vec<FileDescriptor>>;
        async fn upload_file(&self, local_path: &Path, remote_path: &str) -> BridgeResult<()>;
        async fn download_file(&self, remote_path: &str, local_path: &Path) -> BridgeResult<()>;
        async fn delete_file(&self, remote_path: &str) -> BridgeResult<()>;
        async fn get_file_info(&self, remote_path: &str) -> BridgeResult<FileDescriptor>;
    }
}

// ============================================================================
// Notifier
// ============================================================================

#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<(String, String)> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, title: &str, message: &str) -> BridgeResult<()> {
        self.messages
            .lock()
            .unwrap()
            .push((title.to_string(), message.to_string()));
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub dir: TempDir,
    pub recovery: Arc<RecoveryManager>,
    pub coordinator: SyncCoordinator,
    pub notifier: Arc<RecordingNotifier>,
    pub events: Receiver<CoreEvent>,
}

impl Harness {
    pub fn state_path(&self) -> PathBuf {
        state_path(&self.dir)
    }

    /// Every sync event received so far
    pub fn drain_events(&mut self) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            if let CoreEvent::Sync(event) = event {
                events.push(event);
            }
        }
        events
    }
}

pub fn state_path(dir: &TempDir) -> PathBuf {
    dir.path().join("state").join("sync-state.json")
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(1))
}

/// A coordinator with `source` and `destination` registered, state under a
/// fresh temp dir.
pub async fn harness(
    source: Arc<dyn StorageProvider>,
    destination: Arc<dyn StorageProvider>,
    max_attempts: u32,
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    harness_in(dir, source, destination, max_attempts, Arc::new(SystemClock)).await
}

/// Same as [`harness`], reusing an existing state directory
pub async fn harness_in(
    dir: TempDir,
    source: Arc<dyn StorageProvider>,
    destination: Arc<dyn StorageProvider>,
    max_attempts: u32,
    clock: Arc<dyn Clock>,
) -> Harness {
    let recovery =
        Arc::new(RecoveryManager::load(state_path(&dir), max_attempts, Arc::clone(&clock)).await);
    let executor = Arc::new(TransferExecutor::new(dir.path().join("staging"), fast_retry()));
    let notifier = Arc::new(RecordingNotifier::default());
    let bus = EventBus::new(1024);
    let events = bus.subscribe();

    let coordinator = SyncCoordinator::new(
        Arc::clone(&recovery),
        executor,
        notifier.clone(),
        clock,
    )
    .with_event_bus(bus);
    coordinator.register_provider(SOURCE, source).await;
    coordinator.register_provider(DESTINATION, destination).await;

    Harness {
        dir,
        recovery,
        coordinator,
        notifier,
        events,
    }
}

pub fn staging_is_empty(dir: &TempDir) -> bool {
    std::fs::read_dir(dir.path().join("staging"))
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(true)
}
