//! Lifecycle Module
//!
//! Coordinates the startup and shutdown of independently registered managed
//! subsystems: database pools, HTTP listeners, worker pools, RPC exporters.
//!
//! # Lifecycle Phases
//!
//! ```text
//! 1. Configuration
//!    bundles register Managed objects and listeners in a LifecycleEnvironment
//!    ↓
//! 2. LifecycleManager::new         ← environment is frozen, shutdown hook installed
//!    ↓
//! 3. start()                        ← components start in registration order
//!    ↓
//! 4. await_healthy()                ← Started event, or every start failure
//!    ↓
//! [Running...]
//!    ↓
//! 5. stop() / SIGTERM / SIGINT      ← bounded, best-effort drain
//!    ↓
//! 6. Stopped event
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use runward::config::LifecycleConfig;
//! use runward::lifecycle::{BoxError, LifecycleEnvironment, LifecycleManager, Managed};
//! use async_trait::async_trait;
//!
//! pub struct DatabaseService { /* ... */ }
//!
//! #[async_trait]
//! impl Managed for DatabaseService {
//!     async fn start(&self) -> Result<(), BoxError> {
//!         tracing::info!("Opening database connections");
//!         Ok(())
//!     }
//!
//!     async fn stop(&self) -> Result<(), BoxError> {
//!         tracing::info!("Closing database connections");
//!         Ok(())
//!     }
//! }
//!
//! let mut env = LifecycleEnvironment::new();
//! env.manage(DatabaseService::new());
//! let manager = LifecycleManager::new(&env, LifecycleConfig::default());
//! manager.start()?;
//! manager.await_healthy().await?;
//! ```

mod adapters;
mod application;
mod component;
mod container;
mod environment;
mod error;
mod group;
mod listener;
mod managed;
mod manager;
mod shutdown;

pub use adapters::{AutoClose, CloseableManager, ExecutorManager};
pub use application::{Application, ApplicationBuilder};
pub use component::{LifeCycle, LifeCycleHooks, LifeCycleListener, LifeCycleState};
pub use container::{Bean, BeanKind, Container, ContainerLifeCycle, ContainerListener};
pub use environment::{LifecycleEnvironment, LifecycleSnapshot, ManagedPoolBuilder};
pub use error::{BoxError, ComponentFailure, LifecycleError, Phase, Result};
pub use group::{ComponentHealth, GroupStatus, HealthReport, ServiceState};
pub use listener::{LifecycleEvent, LifecycleListener};
pub use managed::{Managed, ManagedComponent};
pub use manager::LifecycleManager;
pub use shutdown::{ShutdownHook, shutdown_signal};
