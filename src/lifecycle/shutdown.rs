//! Graceful Shutdown Hook
//!
//! Listens for process termination signals and runs a shutdown action once.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::runtime::Handle;
use tokio::signal;
use tokio::task::JoinHandle;

/// A pending shutdown action owned by whoever installed it
///
/// The hook waits for its trigger (normally [`shutdown_signal`]) and then runs
/// its action. Dropping the hook, or calling [`ShutdownHook::unregister`],
/// cancels it unless the action is already running.
///
/// # Example
///
/// ```rust,ignore
/// use runward::lifecycle::{ShutdownHook, shutdown_signal};
///
/// let hook = ShutdownHook::spawn(&Handle::current(), shutdown_signal(), || async {
///     tracing::info!("Cleaning up");
/// });
/// ```
pub struct ShutdownHook {
    handle: JoinHandle<()>,
    triggered: Arc<AtomicBool>,
}

impl ShutdownHook {
    pub fn spawn<T, A, Fut>(runtime: &Handle, trigger: T, action: A) -> Self
    where
        T: Future<Output = ()> + Send + 'static,
        A: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let triggered = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&triggered);
        let handle = runtime.spawn(async move {
            trigger.await;
            flag.store(true, Ordering::Release);
            action().await;
        });
        Self { handle, triggered }
    }

    /// Whether the trigger has fired
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    /// Whether the action has run to completion (or the hook was cancelled)
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancel the hook if it has not fired yet
    pub fn unregister(self) {
        drop(self);
    }
}

impl Drop for ShutdownHook {
    fn drop(&mut self) {
        if !self.is_triggered() {
            self.handle.abort();
        }
    }
}

/// Create a future that completes when a shutdown signal is received
///
/// If a signal handler cannot be installed the error is logged and that
/// signal is never reported.
///
/// # Example
///
/// ```rust,ignore
/// use runward::lifecycle::shutdown_signal;
///
/// tokio::select! {
///     _ = shutdown_signal() => {
///         println!("Shutdown signal received");
///     }
///     _ = server.serve() => {}
/// }
/// ```
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }
}
