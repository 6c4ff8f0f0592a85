//! `StorageProvider` implementation over a local directory.

use crate::error::{LocalStorageError, Result};
use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::storage::{FileDescriptor, StorageProvider};
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Suffix of in-flight upload files; never listed
const PARTIAL_SUFFIX: &str = ".part";

/// Directory-backed object store
///
/// # Example
///
/// ```ignore
/// use provider_local::LocalStorageProvider;
/// use bridge_traits::storage::StorageProvider;
///
/// let provider = LocalStorageProvider::new("/srv/objects");
/// provider.authenticate().await?;
/// let files = provider.list_files("photos/").await?;
/// ```
#[derive(Debug, Clone)]
pub struct LocalStorageProvider {
    root: PathBuf,
}

impl LocalStorageProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map an object key to a path under the root.
    ///
    /// Keys are relative, `/` separated and may not contain `..`.
    fn object_path(&self, key: &str) -> Result<PathBuf> {
        let trimmed = key.trim_start_matches('/');
        if trimmed.is_empty() {
            return Err(LocalStorageError::InvalidKey(key.to_string()));
        }

        let relative = Path::new(trimmed);
        let valid = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if !valid {
            return Err(LocalStorageError::InvalidKey(key.to_string()));
        }

        Ok(self.root.join(relative))
    }

    /// Object key for a path under the root
    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<&str> = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<Vec<_>>>()?;
        Some(parts.join("/"))
    }

    async fn describe(&self, key: &str, path: &Path) -> Result<FileDescriptor> {
        let metadata = match fs::metadata(path).await {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => return Err(LocalStorageError::ObjectNotFound(key.to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(LocalStorageError::ObjectNotFound(key.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let modified: DateTime<Utc> = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        let etag = format!(
            "{:x}-{:x}",
            metadata.len(),
            modified.timestamp_nanos_opt().unwrap_or_default()
        );

        Ok(FileDescriptor::new(key, metadata.len())
            .with_last_modified(modified)
            .with_etag(etag))
    }

    async fn walk(&self, prefix: &str) -> Result<Vec<FileDescriptor>> {
        let mut files = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;

                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }
                if !file_type.is_file() {
                    continue;
                }

                let Some(key) = self.key_for(&path) else {
                    continue;
                };
                if key.ends_with(PARTIAL_SUFFIX) || !key.starts_with(prefix) {
                    continue;
                }

                match self.describe(&key, &path).await {
                    Ok(descriptor) => files.push(descriptor),
                    // Removed between read_dir and stat
                    Err(LocalStorageError::ObjectNotFound(_)) => {}
                    Err(e) => return Err(e),
                }
            }
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }
}

#[async_trait]
impl StorageProvider for LocalStorageProvider {
    async fn authenticate(&self) -> BridgeResult<()> {
        match fs::metadata(&self.root).await {
            Ok(metadata) if metadata.is_dir() => {}
            Ok(_) => {
                return Err(LocalStorageError::RootNotDirectory(
                    self.root.display().to_string(),
                )
                .into())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                fs::create_dir_all(&self.root).await?;
                info!(root = ?self.root, "Created storage root");
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    #[instrument(skip(self), fields(root = ?self.root))]
    async fn list_files(&self, prefix: &str) -> BridgeResult<Vec<FileDescriptor>> {
        let files = self.walk(prefix.trim_start_matches('/')).await?;
        debug!(count = files.len(), "Listed objects");
        Ok(files)
    }

    async fn upload_file(&self, local_path: &Path, remote_path: &str) -> BridgeResult<()> {
        let target = self.object_path(remote_path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut partial = target.clone().into_os_string();
        partial.push(format!(".{}{}", Uuid::new_v4(), PARTIAL_SUFFIX));
        let partial = PathBuf::from(partial);

        let copied = match fs::copy(local_path, &partial).await {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = fs::remove_file(&partial).await;
                return Err(e.into());
            }
        };
        if let Err(e) = fs::rename(&partial, &target).await {
            let _ = fs::remove_file(&partial).await;
            return Err(e.into());
        }

        debug!(key = remote_path, bytes = copied, "Stored object");
        Ok(())
    }

    async fn download_file(&self, remote_path: &str, local_path: &Path) -> BridgeResult<()> {
        let source = self.object_path(remote_path)?;
        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        match fs::copy(&source, local_path).await {
            Ok(bytes) => {
                debug!(key = remote_path, bytes, "Fetched object");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(LocalStorageError::ObjectNotFound(remote_path.to_string()).into())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_file(&self, remote_path: &str) -> BridgeResult<()> {
        let path = self.object_path(remote_path)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(LocalStorageError::ObjectNotFound(remote_path.to_string()).into())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_file_info(&self, remote_path: &str) -> BridgeResult<FileDescriptor> {
        let path = self.object_path(remote_path)?;
        Ok(self.describe(remote_path, &path).await?)
    }
}
