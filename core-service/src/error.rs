use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Authentication with {provider} failed: {message}")]
    AuthenticationFailed { provider: String, message: String },

    #[error(transparent)]
    Runtime(#[from] core_runtime::Error),

    #[error("Sync error: {0}")]
    Sync(#[from] core_sync::SyncError),
}

impl CoreError {
    /// Errors the caller can only fix by changing configuration or registrations.
    pub fn is_configuration_error(&self) -> bool {
        match self {
            CoreError::Runtime(_) | CoreError::AuthenticationFailed { .. } => true,
            CoreError::Sync(e) => e.is_configuration_error(),
            CoreError::InitializationFailed(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
