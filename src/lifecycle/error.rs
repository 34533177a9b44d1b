//! Lifecycle-specific error types

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Error type returned by component hooks
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The lifecycle phase an error belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Phase {
    Start,
    Stop,
}

/// A single component's failure, shared between listeners and callers
#[derive(Debug, Clone)]
pub struct ComponentFailure {
    /// Registration index of the component
    pub index: usize,
    /// Display name of the component
    pub name: String,
    /// Phase in which the component failed
    pub phase: Phase,
    /// The underlying error
    pub error: Arc<dyn std::error::Error + Send + Sync>,
}

impl ComponentFailure {
    pub fn new(index: usize, name: impl Into<String>, phase: Phase, error: BoxError) -> Self {
        Self {
            index,
            name: name.into(),
            phase,
            error: Arc::from(error),
        }
    }
}

impl fmt::Display for ComponentFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (#{}) failed to {}: {}",
            self.name, self.index, self.phase, self.error
        )
    }
}

/// Errors that can occur during lifecycle operations
#[derive(Debug, Clone, Error)]
pub enum LifecycleError {
    /// One or more components failed to start
    #[error("Startup failed: {}", summarize(.failures))]
    StartFailed { failures: Vec<ComponentFailure> },

    /// One or more components failed to stop, or did not stop in time
    #[error("Shutdown failed: {}", summarize(.failures))]
    StopFailed { failures: Vec<ComponentFailure> },

    /// Operation timed out
    #[error("Timeout during {phase} after {timeout:?}")]
    Timeout {
        /// The lifecycle phase where timeout occurred
        phase: Phase,
        /// The bound that elapsed
        timeout: Duration,
    },

    /// `await_healthy` was called before `start`
    #[error("Lifecycle has not been started")]
    NotStarted,

    /// The operation is not valid in the current state
    #[error("Invalid lifecycle state: {0}")]
    InvalidState(String),

    /// No tokio runtime is available to drive the operation
    #[error("No tokio runtime available: {0}")]
    NoRuntime(String),
}

impl LifecycleError {
    /// Create a timeout error
    pub fn timeout(phase: Phase, timeout: Duration) -> Self {
        Self::Timeout { phase, timeout }
    }

    /// Create an invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Component failures carried by this error, ordered by registration index
    pub fn failures(&self) -> &[ComponentFailure] {
        match self {
            Self::StartFailed { failures } | Self::StopFailed { failures } => failures,
            _ => &[],
        }
    }
}

fn summarize(failures: &[ComponentFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A specialized Result type for lifecycle operations
pub type Result<T> = std::result::Result<T, LifecycleError>;
