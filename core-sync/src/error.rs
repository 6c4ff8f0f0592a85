use bridge_traits::{BridgeError, ProviderKind};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Provider {0} is not configured")]
    ProviderNotConfigured(ProviderKind),

    #[error("Unknown conflict resolution strategy: {0}")]
    InvalidConflictPolicy(String),

    #[error("Invalid sync options: {0}")]
    InvalidConfig(String),

    #[error("Failed to list source files under '{prefix}': {source}")]
    Listing {
        prefix: String,
        #[source]
        source: BridgeError,
    },

    #[error("Provider error: {0}")]
    Provider(#[from] BridgeError),

    #[error("Transfer of {path} failed: {message}")]
    Transfer { path: String, message: String },

    #[error("Failed to archive {path} to {archive_path}: {message}")]
    ArchiveFailed {
        path: String,
        archive_path: String,
        message: String,
    },

    #[error("Max retry attempts exceeded for file: {path} ({attempts} attempts)")]
    MaxAttemptsExceeded { path: String, attempts: u32 },

    #[error("Failed to persist sync state: {0}")]
    Persistence(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Sync cancelled")]
    Cancelled,

    #[error("Invalid status: {0}")]
    InvalidStatus(String),
}

impl SyncError {
    /// Errors caused by how the run was set up rather than by a backend.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            SyncError::ProviderNotConfigured(_)
                | SyncError::InvalidConflictPolicy(_)
                | SyncError::InvalidConfig(_)
        )
    }

    /// Errors that abort a whole run. Everything else is contained to one file
    /// or, for persistence, only logged.
    pub fn is_fatal(&self) -> bool {
        self.is_configuration_error() || matches!(self, SyncError::Listing { .. })
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(SyncError::ProviderNotConfigured(ProviderKind::Aws).is_fatal());
        assert!(SyncError::InvalidConflictPolicy("merge".to_string()).is_configuration_error());

        let listing = SyncError::Listing {
            prefix: "photos/".to_string(),
            source: BridgeError::OperationFailed("timeout".to_string()),
        };
        assert!(listing.is_fatal());
        assert!(!listing.is_configuration_error());

        let transfer = SyncError::Transfer {
            path: "a.txt".to_string(),
            message: "boom".to_string(),
        };
        assert!(!transfer.is_fatal());
        assert!(!SyncError::Persistence("disk full".to_string()).is_fatal());
    }

    #[test]
    fn test_display_messages() {
        let err = SyncError::ProviderNotConfigured(ProviderKind::Gcp);
        assert_eq!(err.to_string(), "Provider gcp is not configured");

        let err = SyncError::InvalidConflictPolicy("merge".to_string());
        assert_eq!(
            err.to_string(),
            "Unknown conflict resolution strategy: merge"
        );
    }
}
