use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Missing backend adapter for a configured provider.
    pub fn provider_unavailable(provider: &str) -> Self {
        Error::CapabilityMissing {
            capability: format!("StorageProvider[{}]", provider),
            message: format!(
                "No adapter is compiled in for '{}'. Register an implementation with \
                 CoreService::register_provider before starting a run.",
                provider
            ),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
