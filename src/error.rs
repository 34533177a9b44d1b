use crate::lifecycle::LifecycleError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RunwardError>;

#[derive(Debug, Error)]
pub enum RunwardError {
    #[error("Invalid configuration value for {key}: {message}")]
    Config { key: String, message: String },

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("Failed to build worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

impl RunwardError {
    /// Create a configuration error for `key`
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            key: key.into(),
            message: message.into(),
        }
    }
}
