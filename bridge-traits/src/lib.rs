//! # Host Bridge Traits
//!
//! Capability traits that the sync core consumes but never implements itself.
//!
//! ## Overview
//!
//! This crate defines the contract between the synchronization core and the
//! outside world. Each trait represents a capability whose concrete
//! implementation lives elsewhere, such as a cloud SDK adapter or a log shipper.
//!
//! ## Traits
//!
//! ### Storage
//! - [`StorageProvider`](storage::StorageProvider) - List/upload/download/delete/probe
//!   objects on one remote backend
//!
//! ### Observability & Notification
//! - [`LoggerSink`](time::LoggerSink) - Receive structured log events
//! - [`Notifier`](notification::Notifier) - Announce run completion
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//!
//! ## Backend Adapters
//!
//! | Backend | Implementation Crate | Status |
//! |---------|---------------------|--------|
//! | Local directory | `provider-local` | ✅ Available |
//! | Amazon S3 | TBD | 📋 Planned |
//! | Google Cloud Storage | TBD | 📋 Planned |
//! | Azure Blob Storage | TBD | 📋 Planned |
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type. Adapters
//! should:
//!
//! - Map "object does not exist" to `BridgeError::NotFound`
//! - Map credential problems to `BridgeError::AuthenticationFailed`
//! - Include the remote path in every message
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so a single handle can be shared by
//! every sync worker.

pub mod error;
pub mod notification;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use notification::{ConsoleNotifier, Notifier};
pub use storage::{FileDescriptor, ProviderKind, StorageProvider};
pub use time::{Clock, ConsoleLogger, FixedClock, LogEntry, LogLevel, LoggerSink, SystemClock};
