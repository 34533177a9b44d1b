//! # Runward
//!
//! Application lifecycle coordination for Rust service frameworks.
//!
//! Runward starts and stops the independently registered subsystems of a
//! service (connection pools, HTTP listeners, worker pools, exporters) as one
//! unit: deterministic start order, fault propagation when any component
//! fails to start, and a bounded, best-effort drain on shutdown.
//!
//! ## Features
//!
//! - **Managed components**: implement [`Managed`] with optional async `start`/`stop`
//! - **Orchestration**: [`LifecycleManager`] with sequential or concurrent start
//! - **Listeners**: tagged [`LifecycleEvent`]s delivered in registration order
//! - **Per-component state machine**: [`LifeCycle`] with transition listeners
//! - **Bean containers**: nested [`Container`]s with inherited listeners
//! - **Adapters**: drain [`WorkerPool`]s and close resources on shutdown
//! - **Shutdown hook**: owned by the manager, removable, exit-code aware
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use runward::prelude::*;
//!
//! struct Database;
//!
//! #[async_trait]
//! impl Managed for Database {
//!     async fn start(&self) -> std::result::Result<(), BoxError> {
//!         tracing::info!("Connecting");
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> runward::Result<()> {
//!     let app = Application::builder()
//!         .config(LifecycleConfig::default())
//!         .manage(Database)
//!         .build();
//!
//!     app.run_until_shutdown().await
//! }
//! ```

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod worker;

// Re-export core types
pub use config::{ConfigService, LifecycleConfig, StartOrder};
pub use error::{Result, RunwardError};
pub use lifecycle::{
    Application, Container, LifeCycle, LifecycleEnvironment, LifecycleEvent, LifecycleManager,
    Managed,
};
pub use worker::WorkerPool;

// Re-export commonly used types from dependencies
pub use async_trait::async_trait;

/// Prelude module for convenient imports
///
/// ```
/// use runward::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{ConfigService, LifecycleConfig, StartOrder};
    pub use crate::error::{Result, RunwardError};
    pub use crate::lifecycle::{
        Application, ApplicationBuilder, AutoClose, BeanKind, BoxError, CloseableManager,
        Container, ContainerLifeCycle, ExecutorManager, GroupStatus, HealthReport, LifeCycle,
        LifeCycleHooks, LifeCycleListener, LifeCycleState, LifecycleEnvironment, LifecycleError,
        LifecycleEvent, LifecycleListener, LifecycleManager, Managed, ShutdownHook,
        shutdown_signal,
    };
    pub use crate::worker::WorkerPool;
    pub use async_trait::async_trait;
    pub use std::sync::Arc;
}
