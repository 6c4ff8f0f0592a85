//! # Sync Metrics
//!
//! Aggregates counters from the [`SyncEvent`] stream.
//!
//! ## Overview
//!
//! `MetricsCollector` is a passive consumer: the sync core never calls it
//! directly. Feed it either by hand with [`MetricsCollector::record_event`] or
//! by attaching it to an [`EventBus`] with [`MetricsCollector::spawn_listener`].
//! Read the counters through [`MetricsCollector::snapshot`].

use crate::events::{CoreEvent, EventBus, RecvError, SkipReason, SyncEvent};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Point-in-time copy of the collected counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_operations: u64,
    pub failed_operations: u64,
    pub bytes_transferred: u64,
    pub operations_by_type: HashMap<String, u64>,
    pub errors_by_type: HashMap<String, u64>,
    pub last_operation_time: Option<DateTime<Utc>>,
}

/// Thread-safe counter set fed from sync events.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    inner: RwLock<MetricsSnapshot>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into the counters.
    ///
    /// Run-level events other than `Failed` carry no per-file operation and
    /// are ignored.
    pub fn record_event(&self, event: &CoreEvent) {
        let CoreEvent::Sync(event) = event else {
            return;
        };

        let (operation, error, bytes) = match event {
            SyncEvent::FileCompleted { bytes, .. } => ("transfer", None, *bytes),
            SyncEvent::FileSkipped { reason, .. } => match reason {
                SkipReason::AlreadyCompleted => ("resume_skip", None, 0),
                SkipReason::DestinationExists => ("conflict_skip", None, 0),
            },
            SyncEvent::Archived { .. } => ("archive", None, 0),
            SyncEvent::FileFailed { .. } => ("transfer", Some("transfer_failed"), 0),
            SyncEvent::FileAbandoned { .. } => ("transfer", Some("attempts_exhausted"), 0),
            SyncEvent::Failed { .. } => ("sync", Some("run_failed"), 0),
            SyncEvent::Started { .. }
            | SyncEvent::FileStarted { .. }
            | SyncEvent::Completed { .. }
            | SyncEvent::Cancelled { .. } => return,
        };

        let mut metrics = self.inner.write();
        metrics.total_operations += 1;
        if let Some(kind) = error {
            metrics.failed_operations += 1;
            *metrics.errors_by_type.entry(kind.to_string()).or_insert(0) += 1;
        }
        metrics.bytes_transferred += bytes;
        *metrics
            .operations_by_type
            .entry(operation.to_string())
            .or_insert(0) += 1;
        metrics.last_operation_time = Some(Utc::now());
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner.read().clone()
    }

    pub fn reset(&self) {
        *self.inner.write() = MetricsSnapshot::default();
    }

    /// Subscribe to `bus` and record every event until the bus closes.
    pub fn spawn_listener(self: &Arc<Self>, bus: &EventBus) -> JoinHandle<()> {
        let mut receiver = bus.subscribe();
        let collector = Arc::clone(self);

        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => collector.record_event(&event),
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "Metrics listener lagged behind event bus");
                    }
                    Err(RecvError::Closed) => {
                        debug!("Event bus closed, metrics listener exiting");
                        break;
                    }
                }
            }
        })
    }
}
