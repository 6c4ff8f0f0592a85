use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{BridgeError, FileDescriptor, Notifier, ProviderKind, StorageProvider};
use core_runtime::config::{CoreConfig, ProviderConfig, RetryPolicy};
use core_runtime::events::{CoreEvent, ProviderEvent, SyncEvent};
use core_service::{CoreError, CoreService};
use core_sync::{ConflictPolicy, RunStatus, SyncOptions};
use mockall::mock;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

mock! {
    Provider {}

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

#[derive(Default)]
struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, title: &str, message: &str) -> BridgeResult<()> {
        self.messages
            .lock()
            .unwrap()
            .push(format!("{}: {}", title, message));
        Ok(())
    }
}

struct Fixture {
    dir: TempDir,
    notifier: Arc<RecordingNotifier>,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let export = dir.path().join("export");
        std::fs::create_dir_all(export.join("photos")).unwrap();
        std::fs::write(export.join("photos/a.jpg"), vec![1u8; 10]).unwrap();
        std::fs::write(export.join("photos/b.jpg"), vec![2u8; 20]).unwrap();
        Self {
            dir,
            notifier: Arc::new(RecordingNotifier::default()),
        }
    }

    fn path(&self, name: &str) -> std::path::PathBuf {
        self.dir.path().join(name)
    }

    fn config(&self, providers: Vec<ProviderConfig>) -> CoreConfig {
        let mut builder = CoreConfig::builder()
            .state_path(self.path("state.json"))
            .staging_dir(self.path("staging"))
            .autosave_interval(Duration::from_millis(50))
            .upload_retry(RetryPolicy::new(3, Duration::from_millis(1)))
            .notifier(self.notifier.clone());
        for provider in providers {
            builder = builder.provider(provider);
        }
        builder.build().unwrap()
    }

    fn local(&self) -> ProviderConfig {
        ProviderConfig::new(ProviderKind::Local).with_root(self.path("export"))
    }
}

fn memory_destination() -> MockProvider {
    let mut destination = MockProvider::new();
    destination.expect_authenticate().returning(|| Ok(()));
    destination
        .expect_get_file_info()
        .returning(|path| Err(BridgeError::NotFound(path.to_string())));
    destination.expect_upload_file().returning(|_, _| Ok(()));
    destination
}

#[tokio::test]
async fn test_run_sync_with_builtin_local_provider() {
    let fixture = Fixture::new();
    let config = fixture.config(vec![
        fixture.local(),
        ProviderConfig::new(ProviderKind::Aws).with_bucket("backups"),
    ]);
    let service = CoreService::new(config).await.unwrap();
    service
        .register_provider(ProviderKind::Aws, Arc::new(memory_destination()))
        .await;
    service.authenticate_all().await.unwrap();

    let options = SyncOptions::new(ProviderKind::Local, "photos", ProviderKind::Aws, "backup")
        .with_conflict_policy(ConflictPolicy::Overwrite);
    let summary = service
        .run_sync(options, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.completed, 2);
    assert_eq!(summary.bytes_transferred, 30);
    assert_eq!(
        fixture.notifier.messages.lock().unwrap().clone(),
        vec!["Sync Completed: Synchronized 2 files".to_string()]
    );

    let state = std::fs::read_to_string(fixture.path("state.json")).unwrap();
    let state: serde_json::Value = serde_json::from_str(&state).unwrap();
    assert_eq!(state["processed_files"], 2);
    assert_eq!(state["status"], "completed");

    let stats = service.recovery_stats().await;
    assert_eq!(stats.completed, 2);
}

#[tokio::test]
async fn test_local_to_local_between_directories() {
    let fixture = Fixture::new();
    let config = fixture.config(vec![fixture.local()]);
    let service = CoreService::new(config).await.unwrap();

    // Same backend on both sides: objects are copied under another prefix
    let options = SyncOptions::new(ProviderKind::Local, "photos", ProviderKind::Local, "mirror");
    let summary = service
        .run_sync(options, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.transferred, 2);
    assert_eq!(
        std::fs::read(fixture.path("export/mirror/b.jpg")).unwrap(),
        vec![2u8; 20]
    );
}

#[tokio::test]
async fn test_configured_provider_without_adapter_is_missing_capability() {
    let fixture = Fixture::new();
    let config = fixture.config(vec![
        fixture.local(),
        ProviderConfig::new(ProviderKind::Gcp).with_project_id("proj-1"),
    ]);
    let service = CoreService::new(config).await.unwrap();

    let err = service.authenticate_all().await.unwrap_err();
    assert!(matches!(
        err,
        CoreError::Runtime(core_runtime::Error::CapabilityMissing { .. })
    ));
    assert!(err.is_configuration_error());

    let options = SyncOptions::new(ProviderKind::Local, "photos", ProviderKind::Gcp, "x");
    let err = service
        .run_sync(options, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Runtime(_)));
}

#[tokio::test]
async fn test_unconfigured_provider_is_sync_configuration_error() {
    let fixture = Fixture::new();
    let service = CoreService::new(fixture.config(vec![fixture.local()]))
        .await
        .unwrap();

    let options = SyncOptions::new(ProviderKind::Local, "photos", ProviderKind::Azure, "x");
    let err = service
        .run_sync(options, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CoreError::Sync(core_sync::SyncError::ProviderNotConfigured(ProviderKind::Azure))
    ));
    assert!(err.is_configuration_error());
}

#[tokio::test]
async fn test_authentication_failure_emits_event() {
    let fixture = Fixture::new();
    let service = CoreService::new(fixture.config(vec![fixture.local()]))
        .await
        .unwrap();

    let mut rejecting = MockProvider::new();
    rejecting
        .expect_authenticate()
        .times(1)
        .returning(|| Err(BridgeError::AuthenticationFailed("bad key".to_string())));
    service
        .register_provider(ProviderKind::Azure, Arc::new(rejecting))
        .await;

    let mut events = service.subscribe_events();
    let err = service.authenticate_all().await.unwrap_err();
    assert!(matches!(err, CoreError::AuthenticationFailed { ref provider, .. } if provider == "Azure Blob Storage"));

    let mut saw_failure = false;
    let mut saw_success = false;
    while let Some(Ok(event)) = events.try_recv() {
        match event {
            CoreEvent::Provider(ProviderEvent::AuthenticationFailed { provider, .. }) => {
                assert_eq!(provider, "azure");
                saw_failure = true;
            }
            CoreEvent::Provider(ProviderEvent::Authenticated { provider }) => {
                assert_eq!(provider, "local");
                saw_success = true;
            }
            _ => {}
        }
    }
    assert!(saw_failure);
    assert!(saw_success);
}

#[tokio::test]
async fn test_metrics_follow_sync_events() {
    let fixture = Fixture::new();
    let service = CoreService::new(fixture.config(vec![fixture.local()]))
        .await
        .unwrap();

    let options = SyncOptions::new(ProviderKind::Local, "photos", ProviderKind::Local, "copy");
    service
        .run_sync(options, CancellationToken::new())
        .await
        .unwrap();

    let mut metrics = service.metrics();
    for _ in 0..100 {
        if metrics.operations_by_type.get("transfer") == Some(&2) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        metrics = service.metrics();
    }

    assert_eq!(metrics.operations_by_type.get("transfer"), Some(&2));
    assert_eq!(metrics.bytes_transferred, 30);
    assert_eq!(metrics.failed_operations, 0);
}

#[tokio::test]
async fn test_resume_across_service_instances() {
    let fixture = Fixture::new();
    let options = SyncOptions::new(ProviderKind::Local, "photos", ProviderKind::Local, "copy");

    let first = CoreService::new(fixture.config(vec![fixture.local()]))
        .await
        .unwrap();
    first
        .run_sync(options.clone(), CancellationToken::new())
        .await
        .unwrap();
    drop(first);

    let second = CoreService::new(fixture.config(vec![fixture.local()]))
        .await
        .unwrap();
    let summary = second
        .run_sync(options, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.transferred, 0);
    assert_eq!(summary.skipped, 2);
}

#[tokio::test]
async fn test_run_events_exclude_provider_events() {
    let fixture = Fixture::new();
    let service = CoreService::new(fixture.config(vec![fixture.local()]))
        .await
        .unwrap();
    let mut events = service.subscribe_run_events().await;
    service.authenticate_all().await.unwrap();
    let options = SyncOptions::new(ProviderKind::Local, "photos", ProviderKind::Local, "copy");
    service
        .run_sync(options, CancellationToken::new())
        .await
        .unwrap();

    let mut received = Vec::new();
    while let Some(Ok(event)) = events.try_recv() {
        received.push(event);
    }

    assert!(!received.is_empty());
    assert!(received
        .iter()
        .all(|event| matches!(event, CoreEvent::Sync(_))));
    assert!(matches!(
        received.first(),
        Some(CoreEvent::Sync(SyncEvent::Started { total_files: 2, .. }))
    ));
    assert!(matches!(
        received.last(),
        Some(CoreEvent::Sync(SyncEvent::Completed { completed: 2, .. }))
    ));
}
