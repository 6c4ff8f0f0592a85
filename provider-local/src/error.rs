//! Error types for the local directory provider

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Local directory provider errors
#[derive(Error, Debug)]
pub enum LocalStorageError {
    /// Key is absolute or escapes the root
    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    /// Root exists but is not a directory
    #[error("Storage root is not a directory: {0}")]
    RootNotDirectory(String),

    /// No object at the key
    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for local directory operations
pub type Result<T> = std::result::Result<T, LocalStorageError>;

impl From<LocalStorageError> for BridgeError {
    fn from(error: LocalStorageError) -> Self {
        match error {
            LocalStorageError::InvalidKey(key) => {
                BridgeError::OperationFailed(format!("Invalid object key: {}", key))
            }
            LocalStorageError::RootNotDirectory(root) => BridgeError::AuthenticationFailed(
                format!("Storage root is not a directory: {}", root),
            ),
            LocalStorageError::ObjectNotFound(key) => BridgeError::NotFound(key),
            LocalStorageError::Io(e) => BridgeError::Io(e),
        }
    }
}
