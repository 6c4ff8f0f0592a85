//! # Event Bus System
//!
//! Typed progress events for synchronization runs, broadcast over
//! `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! The event bus system consists of:
//! - **Event Types**: `CoreEvent` wrapping per-domain enums (`SyncEvent`, `ProviderEvent`)
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Wrapper for consuming events with filtering
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     emit      ┌───────────┐     subscribe    ┌──────────────────┐
//! │ Sync workers ├──────────────>│           ├─────────────────>│ MetricsCollector │
//! └──────────────┘               │ EventBus  │                  └──────────────────┘
//!                                │ (broadcast│
//! ┌──────────────┐     emit      │  channel) │     subscribe    ┌──────────────────┐
//! │ CoreService  ├──────────────>│           ├─────────────────>│ Host UI / CLI    │
//! └──────────────┘               └───────────┘                  └──────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut stream = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Sync(SyncEvent::FileCompleted {
//!         run_id: "sync_1700000000".to_string(),
//!         path: "data/a.txt".to_string(),
//!         bytes: 10,
//!     }))
//!     .ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert_eq!(event.description(), "File transferred");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! The event bus uses `tokio::sync::broadcast`, which can produce two types of errors:
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n` events.
//!   This is non-fatal; the subscriber can continue receiving new events.
//! - **`RecvError::Closed`**: All senders have been dropped. This indicates shutdown.
//!
//! Publishers in the sync core ignore `emit` errors: a run with nobody
//! listening is normal.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Subscribers that can't keep up will receive `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Per-run and per-file synchronization events
    Sync(SyncEvent),
    /// Backend authentication events
    Provider(ProviderEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Sync(e) => e.description(),
            CoreEvent::Provider(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Sync(SyncEvent::Failed { .. })
            | CoreEvent::Sync(SyncEvent::FileAbandoned { .. })
            | CoreEvent::Provider(ProviderEvent::AuthenticationFailed { .. }) => {
                EventSeverity::Error
            }
            CoreEvent::Sync(SyncEvent::FileFailed { .. })
            | CoreEvent::Sync(SyncEvent::Cancelled { .. }) => EventSeverity::Warning,
            CoreEvent::Sync(SyncEvent::Started { .. })
            | CoreEvent::Sync(SyncEvent::Completed { .. })
            | CoreEvent::Sync(SyncEvent::Archived { .. })
            | CoreEvent::Provider(ProviderEvent::Authenticated { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Debug-level events (verbose)
    Debug,
    /// Informational events
    Info,
    /// Warning events
    Warning,
    /// Error events
    Error,
}

// ============================================================================
// Sync Events
// ============================================================================

/// Events emitted while a synchronization run is in progress.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// Run initiated and source listing finished.
    Started {
        /// Identifier of the persisted run state.
        run_id: String,
        /// Source provider tag and prefix (e.g. `aws:photos/`).
        source: String,
        /// Destination provider tag and prefix.
        destination: String,
        /// Number of objects found under the source prefix.
        total_files: u64,
    },
    /// A worker picked up a file and marked it in progress.
    FileStarted {
        run_id: String,
        path: String,
        /// Attempt number, counting prior runs.
        attempt: u32,
    },
    /// A file reached `completed` through a transfer.
    FileCompleted {
        run_id: String,
        path: String,
        bytes: u64,
    },
    /// A file was not transferred.
    FileSkipped {
        run_id: String,
        path: String,
        reason: SkipReason,
    },
    /// A transfer failed; the file may be retried by a later run.
    FileFailed {
        run_id: String,
        path: String,
        message: String,
        attempts: u32,
    },
    /// A file exhausted its attempt budget and was moved to the failed list.
    FileAbandoned {
        run_id: String,
        path: String,
        attempts: u32,
    },
    /// The existing destination object was copied aside before overwrite.
    Archived {
        run_id: String,
        path: String,
        archive_path: String,
    },
    /// Every job was drained from the queue.
    Completed {
        run_id: String,
        total_files: u64,
        completed: u64,
        failed: u64,
        duration_secs: u64,
    },
    /// The run stopped before any work was scheduled.
    Failed {
        run_id: String,
        message: String,
    },
    /// The run observed the cancellation signal.
    Cancelled {
        run_id: String,
        completed: u64,
    },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::Started { .. } => "Sync started",
            SyncEvent::FileStarted { .. } => "File transfer started",
            SyncEvent::FileCompleted { .. } => "File transferred",
            SyncEvent::FileSkipped { .. } => "File skipped",
            SyncEvent::FileFailed { .. } => "File transfer failed",
            SyncEvent::FileAbandoned { .. } => "File exceeded attempt budget",
            SyncEvent::Archived { .. } => "Destination archived",
            SyncEvent::Completed { .. } => "Sync completed",
            SyncEvent::Failed { .. } => "Sync failed",
            SyncEvent::Cancelled { .. } => "Sync cancelled",
        }
    }

    /// Identifier of the run this event belongs to.
    pub fn run_id(&self) -> &str {
        match self {
            SyncEvent::Started { run_id, .. }
            | SyncEvent::FileStarted { run_id, .. }
            | SyncEvent::FileCompleted { run_id, .. }
            | SyncEvent::FileSkipped { run_id, .. }
            | SyncEvent::FileFailed { run_id, .. }
            | SyncEvent::FileAbandoned { run_id, .. }
            | SyncEvent::Archived { run_id, .. }
            | SyncEvent::Completed { run_id, .. }
            | SyncEvent::Failed { run_id, .. }
            | SyncEvent::Cancelled { run_id, .. } => run_id,
        }
    }
}

/// Why a file was not transferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Already completed in the persisted state.
    AlreadyCompleted,
    /// Destination exists and the conflict policy is `skip`.
    DestinationExists,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::AlreadyCompleted => "already_completed",
            SkipReason::DestinationExists => "destination_exists",
        }
    }
}

// ============================================================================
// Provider Events
// ============================================================================

/// Events related to backend authentication.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum ProviderEvent {
    /// Backend accepted its credentials.
    Authenticated {
        /// Provider tag (e.g. "aws", "local").
        provider: String,
    },
    /// Backend rejected its credentials or was unreachable.
    AuthenticationFailed {
        provider: String,
        message: String,
    },
}

impl ProviderEvent {
    fn description(&self) -> &str {
        match self {
            ProviderEvent::Authenticated { .. } => "Provider authenticated",
            ProviderEvent::AuthenticationFailed { .. } => "Provider authentication failed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Broadcast channel shared by the coordinator, its workers and the service.
///
/// Cloning is cheap; every clone publishes to the same subscribers. Sending
/// never waits on a slow subscriber, which lags instead.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// `capacity` events are retained per subscriber before it lags.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Returns the number of subscribers reached, or an error when nobody is
    /// subscribed.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A subscription with an optional predicate applied on receive.
///
/// # Example
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream, SyncEvent};
///
/// let event_bus = EventBus::new(100);
/// let failures = EventStream::new(event_bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Sync(SyncEvent::FileFailed { .. })));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Keep only events matching `predicate`. Replaces any earlier filter.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Keep only sync events of the run `run_id`.
    pub fn only_run(self, run_id: impl Into<String>) -> Self {
        let run_id = run_id.into();
        self.filter(move |event| match event {
            CoreEvent::Sync(sync) => sync.run_id() == run_id,
            CoreEvent::Provider(_) => false,
        })
    }

    /// Next event passing the filter.
    ///
    /// # Errors
    ///
    /// `RecvError::Lagged(n)` after missing `n` events, `RecvError::Closed`
    /// once every bus handle is dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;

            let Some(filter) = &self.filter else {
                return Ok(event);
            };

            if filter(&event) {
                return Ok(event);
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv); `None` when nothing is queued.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    let Some(filter) = &self.filter else {
                        return Some(Ok(event));
                    };

                    if filter(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
