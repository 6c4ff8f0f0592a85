//! # Core Configuration Module
//!
//! Provides configuration management for the synchronization core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds the run settings and the host capabilities the core
//! calls into. `build()` validates everything up front so a misconfigured
//! service never starts a run.
//!
//! ## Required Settings
//!
//! - `state_path` - Where the resumable run state is persisted
//!
//! ## Optional Settings (with defaults)
//!
//! - `staging_dir` - Local directory for in-flight downloads (OS temp dir + `datasync-staging`)
//! - `max_attempts` - Per-file attempt budget across runs (3)
//! - `autosave_interval` - Period of background state flushes (30 s)
//! - `upload_retry` - Upload retry policy inside a single attempt (3 tries, 1 s linear backoff)
//! - `notifier` - Run-completion notifier (`ConsoleNotifier`)
//! - `clock` - Time source (`SystemClock`)
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, ProviderConfig};
//! use bridge_traits::ProviderKind;
//!
//! let config = CoreConfig::builder()
//!     .state_path("/var/lib/datasync/state.json")
//!     .max_attempts(5)
//!     .provider(ProviderConfig::new(ProviderKind::Local).with_root("/srv/mirror"))
//!     .build()
//!     .expect("Failed to build config");
//! ```
//!
//! ## Error Handling
//!
//! The builder fails fast with an actionable message:
//!
//! ```should_panic
//! use core_runtime::config::CoreConfig;
//!
//! // Missing state path
//! let config = CoreConfig::builder()
//!     .build()
//!     .expect("Should fail - missing state path");
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use crate::logging::{redact_if_sensitive, LoggingConfig};
use bridge_traits::{Clock, ConsoleNotifier, Notifier, ProviderKind, SystemClock};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default per-file attempt budget.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default interval between background state flushes.
pub const DEFAULT_AUTOSAVE_INTERVAL: Duration = Duration::from_secs(30);

/// Core configuration for the synchronization service.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Canonical location of the persisted run state
    pub state_path: PathBuf,

    /// Directory that holds downloaded files until they are uploaded
    pub staging_dir: PathBuf,

    /// Attempts allowed per file before it is recorded as permanently failed
    pub max_attempts: u32,

    /// Period between background state flushes
    pub autosave_interval: Duration,

    /// Retry policy for the upload step of a single transfer
    pub upload_retry: RetryPolicy,

    /// Logging bootstrap settings
    pub logging: LoggingConfig,

    /// Capacity of the event bus channel
    pub event_buffer_size: usize,

    /// Backends to construct at startup
    pub providers: Vec<ProviderConfig>,

    /// Run-completion notifier
    pub notifier: Arc<dyn Notifier>,

    /// Time source for state ids and archive suffixes
    pub clock: Arc<dyn Clock>,
}

impl fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoreConfig")
            .field("state_path", &self.state_path)
            .field("staging_dir", &self.staging_dir)
            .field("max_attempts", &self.max_attempts)
            .field("autosave_interval", &self.autosave_interval)
            .field("upload_retry", &self.upload_retry)
            .field("logging", &self.logging)
            .field("event_buffer_size", &self.event_buffer_size)
            .field("providers", &self.providers)
            .field("notifier", &"Notifier { ... }")
            .field("clock", &"Clock { ... }")
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - State path and staging directory are not empty
    /// - Attempt budget is at least 1
    /// - Autosave interval is non-zero
    /// - Upload retry policy is usable
    /// - Every provider config is complete and no backend is listed twice
    pub fn validate(&self) -> Result<()> {
        if self.state_path.as_os_str().is_empty() {
            return Err(Error::Config("State path cannot be empty".to_string()));
        }

        if self.staging_dir.as_os_str().is_empty() {
            return Err(Error::Config(
                "Staging directory cannot be empty".to_string(),
            ));
        }

        if self.max_attempts == 0 {
            return Err(Error::Config(
                "Max attempts must be at least 1".to_string(),
            ));
        }

        if self.autosave_interval.is_zero() {
            return Err(Error::Config(
                "Autosave interval must be greater than zero".to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than zero".to_string(),
            ));
        }

        self.upload_retry.validate()?;

        let mut seen = HashSet::new();
        for provider in &self.providers {
            provider.validate()?;
            if !seen.insert(provider.kind) {
                return Err(Error::Config(format!(
                    "Provider '{}' configured more than once",
                    provider.kind
                )));
            }
        }

        Ok(())
    }

    /// Looks up the configuration for a backend.
    pub fn provider(&self, kind: ProviderKind) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.kind == kind)
    }
}

// ============================================================================
// Retry Policy
// ============================================================================

/// Bounded retry with linear backoff.
///
/// Attempt `n` (1-based) that fails is followed by a sleep of
/// `base_delay * n` before attempt `n + 1`. No sleep follows the last attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Delay to wait after the given failed attempt, or `None` if it was the last.
    pub fn backoff_after(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            None
        } else {
            Some(self.base_delay * attempt)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::Config(
                "Upload retry policy must allow at least one attempt".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Provider Configuration
// ============================================================================

/// Connection settings for one storage backend.
///
/// Only the fields relevant to `kind` are consulted; [`validate`](Self::validate)
/// enforces the ones each backend needs.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub bucket: Option<String>,
    /// GCP project
    pub project_id: Option<String>,
    /// Azure storage account
    pub account_name: Option<String>,
    pub account_key: Option<String>,
    pub container_name: Option<String>,
    /// Root directory for the local backend
    pub root: Option<PathBuf>,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("bucket", &self.bucket)
            .field("project_id", &self.project_id)
            .field("account_name", &self.account_name)
            .field(
                "account_key",
                &self
                    .account_key
                    .as_deref()
                    .map(|key| redact_if_sensitive("account_key", key)),
            )
            .field("container_name", &self.container_name)
            .field("root", &self.root)
            .finish()
    }
}

impl ProviderConfig {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            bucket: None,
            project_id: None,
            account_name: None,
            account_key: None,
            container_name: None,
            root: None,
        }
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    pub fn with_project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_azure_account(
        mut self,
        account_name: impl Into<String>,
        account_key: impl Into<String>,
        container_name: impl Into<String>,
    ) -> Self {
        self.account_name = Some(account_name.into());
        self.account_key = Some(account_key.into());
        self.container_name = Some(container_name.into());
        self
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Checks that the fields required by this backend are present.
    pub fn validate(&self) -> Result<()> {
        fn present(value: &Option<String>) -> bool {
            value.as_deref().map(|v| !v.is_empty()).unwrap_or(false)
        }

        match self.kind {
            ProviderKind::Aws => {
                if !present(&self.bucket) {
                    return Err(Error::Config(
                        "Bucket is required for the aws provider".to_string(),
                    ));
                }
            }
            ProviderKind::Gcp => {
                if !present(&self.project_id) {
                    return Err(Error::Config(
                        "Project ID is required for the gcp provider".to_string(),
                    ));
                }
            }
            ProviderKind::Azure => {
                if !present(&self.account_name)
                    || !present(&self.account_key)
                    || !present(&self.container_name)
                {
                    return Err(Error::Config(
                        "Account name, account key, and container name are required for the azure provider"
                            .to_string(),
                    ));
                }
            }
            ProviderKind::Local => {
                if self
                    .root
                    .as_ref()
                    .map(|r| r.as_os_str().is_empty())
                    .unwrap_or(true)
                {
                    return Err(Error::Config(
                        "Root directory is required for the local provider".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    state_path: Option<PathBuf>,
    staging_dir: Option<PathBuf>,
    max_attempts: Option<u32>,
    autosave_interval: Option<Duration>,
    upload_retry: Option<RetryPolicy>,
    logging: Option<LoggingConfig>,
    event_buffer_size: Option<usize>,
    providers: Vec<ProviderConfig>,
    notifier: Option<Arc<dyn Notifier>>,
    clock: Option<Arc<dyn Clock>>,
}

impl CoreConfigBuilder {
    /// Sets the state file path (required).
    ///
    /// # Examples
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder()
    ///     .state_path("/var/lib/datasync/state.json");
    /// ```
    pub fn state_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.state_path = Some(path.into());
        self
    }

    /// Sets the staging directory for downloads.
    pub fn staging_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.staging_dir = Some(path.into());
        self
    }

    /// Sets the per-file attempt budget.
    ///
    /// Default: 3
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Sets the autosave period.
    ///
    /// Default: 30 seconds
    pub fn autosave_interval(mut self, interval: Duration) -> Self {
        self.autosave_interval = Some(interval);
        self
    }

    /// Sets the upload retry policy.
    pub fn upload_retry(mut self, policy: RetryPolicy) -> Self {
        self.upload_retry = Some(policy);
        self
    }

    /// Sets the logging configuration.
    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    /// Sets the event bus capacity.
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Adds a backend configuration.
    pub fn provider(mut self, provider: ProviderConfig) -> Self {
        self.providers.push(provider);
        self
    }

    /// Sets the run-completion notifier.
    ///
    /// If not provided, a `ConsoleNotifier` is used.
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Sets the time source.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the state path is missing or any setting
    /// fails [`CoreConfig::validate`].
    pub fn build(self) -> Result<CoreConfig> {
        let state_path = self.state_path.ok_or_else(|| {
            Error::Config(
                "State path is required. Call .state_path() with the location of the run state file."
                    .to_string(),
            )
        })?;

        let config = CoreConfig {
            state_path,
            staging_dir: self.staging_dir.unwrap_or_else(default_staging_dir),
            max_attempts: self.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
            autosave_interval: self.autosave_interval.unwrap_or(DEFAULT_AUTOSAVE_INTERVAL),
            upload_retry: self.upload_retry.unwrap_or_default(),
            logging: self.logging.unwrap_or_default(),
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            providers: self.providers,
            notifier: self
                .notifier
                .unwrap_or_else(|| Arc::new(ConsoleNotifier)),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        };

        config.validate()?;
        Ok(config)
    }
}

/// Staging directory used when none is configured.
pub fn default_staging_dir() -> PathBuf {
    std::env::temp_dir().join("datasync-staging")
}
