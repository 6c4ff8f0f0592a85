//! Object Storage Abstractions
//!
//! Provides the backend-agnostic capability that every remote object store
//! must implement, plus the provider tag used to register and look up
//! backends.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::Result;

/// Identifies which object storage backend a handle talks to.
///
/// # Example
///
/// ```
/// use bridge_traits::storage::ProviderKind;
///
/// let provider = ProviderKind::Aws;
/// assert_eq!(provider.display_name(), "Amazon S3");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Amazon S3
    Aws,
    /// Google Cloud Storage
    Gcp,
    /// Azure Blob Storage
    Azure,
    /// A directory on the local filesystem
    Local,
}

impl ProviderKind {
    /// Get the human-readable display name for this provider
    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::Aws => "Amazon S3",
            ProviderKind::Gcp => "Google Cloud Storage",
            ProviderKind::Azure => "Azure Blob Storage",
            ProviderKind::Local => "Local Filesystem",
        }
    }

    /// Get the provider identifier string
    ///
    /// Used for logging and configuration purposes.
    ///
    /// # Examples
    ///
    /// ```
    /// use bridge_traits::storage::ProviderKind;
    ///
    /// assert_eq!(ProviderKind::Gcp.as_str(), "gcp");
    /// ```
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Aws => "aws",
            ProviderKind::Gcp => "gcp",
            ProviderKind::Azure => "azure",
            ProviderKind::Local => "local",
        }
    }

    /// Parse a provider kind from a string identifier
    ///
    /// # Examples
    ///
    /// ```
    /// use bridge_traits::storage::ProviderKind;
    ///
    /// assert_eq!(ProviderKind::parse("S3"), Some(ProviderKind::Aws));
    /// assert_eq!(ProviderKind::parse("dropbox"), None);
    /// ```
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "aws" | "s3" => Some(ProviderKind::Aws),
            "gcp" | "gcs" => Some(ProviderKind::Gcp),
            "azure" => Some(ProviderKind::Azure),
            "local" | "fs" => Some(ProviderKind::Local),
            _ => None,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A remote object observed at a point in time.
///
/// `etag` is an opaque fingerprint assigned by the backend. It is carried for
/// logging only and never compared when deciding whether to transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub path: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    pub etag: String,
}

impl FileDescriptor {
    pub fn new(path: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            size,
            last_modified: Utc::now(),
            etag: String::new(),
        }
    }

    pub fn with_last_modified(mut self, last_modified: DateTime<Utc>) -> Self {
        self.last_modified = last_modified;
        self
    }

    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = etag.into();
        self
    }
}

/// Remote object storage capability
///
/// Implemented once per backend (S3, GCS, Azure Blob, local directory). The
/// sync core only ever talks to `dyn StorageProvider`, never to a concrete
/// backend type.
///
/// # Errors
///
/// `get_file_info` must fail with [`BridgeError::NotFound`](crate::BridgeError::NotFound)
/// when the object does not exist; callers rely on that to tell "no conflict"
/// apart from a transient probe failure.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::StorageProvider;
///
/// async fn copy_one(src: &dyn StorageProvider, dst: &dyn StorageProvider) -> Result<()> {
///     src.download_file("photos/a.jpg", Path::new("/tmp/a.jpg")).await?;
///     dst.upload_file(Path::new("/tmp/a.jpg"), "backup/a.jpg").await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Establish credentials with the backend
    async fn authenticate(&self) -> Result<()>;

    /// List every object under `prefix`
    async fn list_files(&self, prefix: &str) -> Result<Vec<FileDescriptor>>;

    /// Upload the local file at `local_path` to `remote_path`, replacing any
    /// existing object
    async fn upload_file(&self, local_path: &Path, remote_path: &str) -> Result<()>;

    /// Download `remote_path` into `local_path`
    async fn download_file(&self, remote_path: &str, local_path: &Path) -> Result<()>;

    /// Delete the object at `remote_path`
    async fn delete_file(&self, remote_path: &str) -> Result<()>;

    /// Fetch metadata for a single object
    async fn get_file_info(&self, remote_path: &str) -> Result<FileDescriptor>;
}
