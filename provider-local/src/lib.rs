//! # Local Directory Provider
//!
//! Implements `StorageProvider` over a directory tree on the local file system.
//!
//! ## Overview
//!
//! This module provides:
//! - Object keys mapped to paths relative to a root directory (`/` separated)
//! - Recursive listing filtered by key prefix
//! - Uploads written to a sibling temporary file and renamed into place
//! - `NotFound` for absent objects, so conflict probes work as for cloud backends
//! - An `etag` derived from size and modification time

pub mod error;
pub mod provider;

pub use error::{LocalStorageError, Result};
pub use provider::LocalStorageProvider;
