//! Application Bootstrap
//!
//! Provides a high-level API for running an application whose subsystems are
//! coordinated by a [`LifecycleManager`].

use super::{LifecycleEnvironment, LifecycleListener, LifecycleManager, Managed, shutdown_signal};
use crate::config::LifecycleConfig;
use crate::error::Result;

/// A configured application ready to run
///
/// # Example
///
/// ```rust,ignore
/// use runward::lifecycle::Application;
///
/// #[tokio::main]
/// async fn main() -> runward::Result<()> {
///     let app = Application::builder()
///         .manage(database_pool)
///         .manage(http_server)
///         .build();
///
///     app.run_until_shutdown().await
/// }
/// ```
pub struct Application {
    environment: LifecycleEnvironment,
    lifecycle_manager: LifecycleManager,
}

impl Application {
    /// Create a new application builder
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::new()
    }

    pub fn environment(&self) -> &LifecycleEnvironment {
        &self.environment
    }

    /// Get a reference to the lifecycle manager
    pub fn lifecycle_manager(&self) -> &LifecycleManager {
        &self.lifecycle_manager
    }

    /// Start every managed component and wait until all are running
    ///
    /// On failure the components that were started are stopped again before
    /// the start error is returned.
    pub async fn start(&self) -> Result<()> {
        tracing::info!("Starting application...");

        let started = match self.lifecycle_manager.start() {
            Ok(()) => self.lifecycle_manager.await_healthy().await,
            Err(e) => Err(e),
        };
        if let Err(e) = started {
            tracing::error!(error = %e, "Application failed to start, stopping");
            if let Err(stop_err) = self.lifecycle_manager.stop().await {
                tracing::warn!(error = %stop_err, "Cleanup after failed start was incomplete");
            }
            return Err(e.into());
        }

        tracing::info!("Application started");
        Ok(())
    }

    /// Perform graceful shutdown
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Shutting down application...");
        self.lifecycle_manager.stop().await?;
        tracing::info!("Application shutdown complete");
        Ok(())
    }

    /// Start, wait for SIGINT/SIGTERM, then shut down
    ///
    /// The manager's shutdown hook is removed first: the shutdown result is
    /// returned to the caller rather than exiting the process.
    pub async fn run_until_shutdown(&self) -> Result<()> {
        if self.lifecycle_manager.unregister_shutdown_hook() {
            tracing::debug!("Application handles shutdown signals itself");
        }
        self.run_until(shutdown_signal()).await
    }

    /// Start, wait for `signal`, then shut down
    pub async fn run_until<F>(&self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        self.start().await?;
        signal.await;
        self.shutdown().await
    }
}

/// Builder for Application
#[derive(Default)]
pub struct ApplicationBuilder {
    config: LifecycleConfig,
    environment: LifecycleEnvironment,
}

impl ApplicationBuilder {
    /// Create a new application builder
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: LifecycleConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a managed component
    pub fn manage<M: Managed>(mut self, managed: M) -> Self {
        self.environment.manage(managed);
        self
    }

    /// Register a lifecycle listener
    pub fn listener<L: LifecycleListener>(mut self, listener: L) -> Self {
        self.environment.add_listener(listener);
        self
    }

    /// Direct access to the environment, e.g. to build managed worker pools
    pub fn environment_mut(&mut self) -> &mut LifecycleEnvironment {
        &mut self.environment
    }

    /// Build the application; this freezes the environment
    pub fn build(self) -> Application {
        let lifecycle_manager = LifecycleManager::new(&self.environment, self.config);
        Application {
            environment: self.environment,
            lifecycle_manager,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RunwardError;
    use crate::lifecycle::{BoxError, LifecycleError, LifecycleEvent};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Default)]
    struct Service {
        fail_start: bool,
        stops: AtomicUsize,
    }

    #[async_trait]
    impl Managed for Service {
        async fn start(&self) -> std::result::Result<(), BoxError> {
            if self.fail_start {
                return Err("bind failed".into());
            }
            Ok(())
        }

        async fn stop(&self) -> std::result::Result<(), BoxError> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn config() -> LifecycleConfig {
        LifecycleConfig::default()
            .with_shutdown_hook(false)
            .with_exit_on_signal(false)
    }

    #[tokio::test]
    async fn failed_start_stops_what_was_started() {
        let healthy = Arc::new(Service::default());
        let broken = Arc::new(Service {
            fail_start: true,
            ..Service::default()
        });

        let app = Application::builder()
            .config(config())
            .manage(Arc::clone(&healthy))
            .manage(Arc::clone(&broken))
            .build();

        let err = app.start().await.unwrap_err();

        assert!(matches!(
            err,
            RunwardError::Lifecycle(LifecycleError::StartFailed { .. })
        ));
        assert_eq!(healthy.stops.load(Ordering::SeqCst), 1);
        assert_eq!(broken.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn run_until_starts_then_stops() {
        let service = Arc::new(Service::default());
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);

        let mut builder = Application::builder()
            .config(config())
            .manage(Arc::clone(&service))
            .listener(move |event: &LifecycleEvent| {
                sink.lock().unwrap().push(matches!(event, LifecycleEvent::Started));
            });
        let pool = builder
            .environment_mut()
            .worker_pool("jobs")
            .threads(1)
            .shutdown_time(Duration::from_secs(1))
            .build()
            .unwrap();
        let app = builder.build();

        app.run_until(tokio::time::sleep(Duration::from_millis(10)))
            .await
            .unwrap();

        assert_eq!(service.stops.load(Ordering::SeqCst), 1);
        assert!(pool.is_terminated());
        assert_eq!(*events.lock().unwrap(), vec![true, false]);
        assert_eq!(app.lifecycle_manager().component_count(), 2);
        assert!(app.environment().is_frozen());
    }
}
