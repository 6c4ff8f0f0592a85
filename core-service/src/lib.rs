//! Core service façade and bootstrap helpers.
//!
//! This crate wires a [`CoreConfig`] and host-provided storage adapters into
//! a runnable sync service. Backends whose adapter ships in this workspace
//! (the local directory provider, behind the `local-provider` feature) are
//! constructed from their [`ProviderConfig`]; every other configured backend
//! must be registered with [`CoreService::register_provider`] before use.
//!
//! ```rust,ignore
//! use core_runtime::config::{CoreConfig, ProviderConfig};
//! use core_service::CoreService;
//! use core_sync::SyncOptions;
//! use bridge_traits::ProviderKind;
//! use tokio_util::sync::CancellationToken;
//!
//! let config = CoreConfig::builder()
//!     .state_path("/var/lib/datasync/state.json")
//!     .provider(ProviderConfig::new(ProviderKind::Local).with_root("/srv/export"))
//!     .provider(ProviderConfig::new(ProviderKind::Aws).with_bucket("backups"))
//!     .build()?;
//!
//! let service = core_service::bootstrap(config).await?;
//! service.register_provider(ProviderKind::Aws, Arc::new(my_s3_adapter)).await;
//! service.authenticate_all().await?;
//!
//! let options = SyncOptions::new(ProviderKind::Local, "photos", ProviderKind::Aws, "photos");
//! let summary = service.run_sync(options, CancellationToken::new()).await?;
//! ```

pub mod error;

pub use error::{CoreError, Result};

use std::sync::Arc;

use bridge_traits::{ProviderKind, StorageProvider};
use core_runtime::config::{CoreConfig, ProviderConfig};
use core_runtime::events::{CoreEvent, EventBus, EventStream, ProviderEvent};
use core_runtime::logging::init_logging;
use core_runtime::metrics::{MetricsCollector, MetricsSnapshot};
use core_sync::{
    RecoveryManager, RecoveryStats, SyncCoordinator, SyncOptions, SyncSummary, TransferExecutor,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Aborts the metrics listener when the last service handle is dropped.
struct ListenerGuard(JoinHandle<()>);

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    config: Arc<CoreConfig>,
    recovery: Arc<RecoveryManager>,
    coordinator: Arc<SyncCoordinator>,
    event_bus: EventBus,
    metrics: Arc<MetricsCollector>,
    _metrics_listener: Arc<ListenerGuard>,
}

impl CoreService {
    /// Create a new service from a validated configuration.
    ///
    /// Loads (or starts) the persisted state and constructs the built-in
    /// adapters for configured backends. Must be called inside a Tokio runtime.
    pub async fn new(config: CoreConfig) -> Result<Self> {
        config.validate()?;

        let recovery = Arc::new(
            RecoveryManager::load(
                &config.state_path,
                config.max_attempts,
                Arc::clone(&config.clock),
            )
            .await,
        );
        let executor = Arc::new(TransferExecutor::new(
            config.staging_dir.clone(),
            config.upload_retry,
        ));

        let event_bus = EventBus::new(config.event_buffer_size);
        let metrics = Arc::new(MetricsCollector::new());
        let listener = metrics.spawn_listener(&event_bus);

        let coordinator = SyncCoordinator::new(
            Arc::clone(&recovery),
            executor,
            Arc::clone(&config.notifier),
            Arc::clone(&config.clock),
        )
        .with_event_bus(event_bus.clone());

        for provider in &config.providers {
            if let Some(adapter) = builtin_adapter(provider) {
                coordinator.register_provider(provider.kind, adapter).await;
            }
        }

        Ok(Self {
            config: Arc::new(config),
            recovery,
            coordinator: Arc::new(coordinator),
            event_bus,
            metrics,
            _metrics_listener: Arc::new(ListenerGuard(listener)),
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Register (or replace) the adapter for a backend.
    pub async fn register_provider(&self, kind: ProviderKind, provider: Arc<dyn StorageProvider>) {
        self.coordinator.register_provider(kind, provider).await;
    }

    /// Authenticate every registered backend.
    ///
    /// # Errors
    ///
    /// - [`core_runtime::Error::CapabilityMissing`] if a configured backend has
    ///   no registered adapter
    /// - [`CoreError::AuthenticationFailed`] for the first backend that rejects
    ///   its credentials (the others are still attempted)
    #[instrument(skip(self))]
    pub async fn authenticate_all(&self) -> Result<()> {
        self.ensure_configured_providers_registered().await?;

        let mut first_failure = None;
        for (kind, provider) in self.coordinator.registered_providers().await {
            match provider.authenticate().await {
                Ok(()) => {
                    info!(provider = %kind, "Authenticated storage provider");
                    self.emit(ProviderEvent::Authenticated {
                        provider: kind.to_string(),
                    });
                }
                Err(e) => {
                    warn!(provider = %kind, error = %e, "Storage provider authentication failed");
                    self.emit(ProviderEvent::AuthenticationFailed {
                        provider: kind.to_string(),
                        message: e.to_string(),
                    });
                    first_failure.get_or_insert(CoreError::AuthenticationFailed {
                        provider: kind.display_name().to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Run one sync with autosave active for its whole duration.
    ///
    /// The autosave task is stopped and its final flush awaited before this
    /// returns, whether or not the run succeeded.
    #[instrument(skip(self, options, cancel))]
    pub async fn run_sync(
        &self,
        options: SyncOptions,
        cancel: CancellationToken,
    ) -> Result<SyncSummary> {
        for kind in [options.source_provider, options.destination_provider] {
            self.ensure_registered(kind).await?;
        }

        let stop_autosave = CancellationToken::new();
        let autosave = self
            .recovery
            .start_autosave(self.config.autosave_interval, stop_autosave.clone());

        let result = self.coordinator.sync(options, cancel).await;

        stop_autosave.cancel();
        if let Err(e) = autosave.await {
            warn!(error = %e, "Autosave task ended abnormally");
        }

        Ok(result?)
    }

    /// Stream of every event emitted from now on.
    pub fn subscribe_events(&self) -> EventStream {
        EventStream::new(self.event_bus.subscribe())
    }

    /// Sync events of the run tracked by the loaded state.
    ///
    /// The id survives restarts, so a resumed run reports under the same id.
    pub async fn subscribe_run_events(&self) -> EventStream {
        let run_id = self.recovery.run_id().await;
        self.subscribe_events().only_run(run_id)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub async fn recovery_stats(&self) -> RecoveryStats {
        self.recovery.stats().await
    }

    async fn ensure_configured_providers_registered(&self) -> Result<()> {
        for provider in &self.config.providers {
            self.ensure_registered(provider.kind).await?;
        }
        Ok(())
    }

    /// A backend that is configured but has no adapter is a missing capability.
    /// Unconfigured backends are left to the coordinator to reject.
    async fn ensure_registered(&self, kind: ProviderKind) -> Result<()> {
        if self.config.provider(kind).is_some() && !self.coordinator.has_provider(kind).await {
            return Err(core_runtime::Error::provider_unavailable(kind.as_str()).into());
        }
        Ok(())
    }

    fn emit(&self, event: ProviderEvent) {
        self.event_bus.emit(CoreEvent::Provider(event)).ok();
    }
}

/// Install logging from `config.logging`, then build the service.
///
/// A subscriber that is already installed (for example by the host) is kept.
pub async fn bootstrap(config: CoreConfig) -> Result<CoreService> {
    if let Err(e) = init_logging(config.logging.clone()) {
        warn!(error = %e, "Logging already initialized, keeping existing subscriber");
    }
    CoreService::new(config).await
}

#[cfg(feature = "local-provider")]
fn builtin_adapter(config: &ProviderConfig) -> Option<Arc<dyn StorageProvider>> {
    match (config.kind, &config.root) {
        (ProviderKind::Local, Some(root)) => Some(Arc::new(
            provider_local::LocalStorageProvider::new(root.clone()),
        )),
        _ => None,
    }
}

#[cfg(not(feature = "local-provider"))]
fn builtin_adapter(_config: &ProviderConfig) -> Option<Arc<dyn StorageProvider>> {
    None
}
