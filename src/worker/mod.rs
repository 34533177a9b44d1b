use crate::error::Result;
use rayon::ThreadPool;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, oneshot};

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Worker pool {pool} is shut down")]
    Rejected { pool: String },

    #[error("Worker task panicked in pool {pool}")]
    Panicked { pool: String },
}

/// Shared thread pool for CPU-bound tasks
///
/// `shutdown` stops the pool from accepting new tasks; tasks already
/// submitted run to completion. `await_termination` waits for them.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    name: String,
    pool: ThreadPool,
    shutdown: AtomicBool,
    in_flight: AtomicUsize,
    idle: Notify,
}

/// Decrements the in-flight count even if the task panics
struct TaskGuard(Arc<PoolInner>);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        if self.0.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

impl WorkerPool {
    pub fn builder(name: impl Into<String>) -> WorkerPoolBuilder {
        WorkerPoolBuilder::new(name)
    }

    pub fn new(name: impl Into<String>, num_threads: usize) -> Result<Self> {
        let name = name.into();
        let thread_prefix = name.clone();
        let panic_pool = name.clone();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(move |i| format!("{thread_prefix}-{i}"))
            .panic_handler(move |_| {
                tracing::error!(pool = %panic_pool, "Worker task panicked");
            })
            .build()?;
        Ok(Self {
            inner: Arc::new(PoolInner {
                name,
                pool,
                shutdown: AtomicBool::new(false),
                in_flight: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn num_threads(&self) -> usize {
        self.inner.pool.current_num_threads()
    }

    /// Submit a fire-and-forget task
    pub fn spawn<F>(&self, f: F) -> std::result::Result<(), WorkerError>
    where
        F: FnOnce() + Send + 'static,
    {
        let guard = self.admit()?;
        self.inner.pool.spawn(move || {
            let _guard = guard;
            f();
        });
        Ok(())
    }

    /// Execute a CPU-bound task in the thread pool and return result asynchronously
    pub async fn execute<F, R>(&self, f: F) -> std::result::Result<R, WorkerError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let guard = self.admit()?;
        let (tx, rx) = oneshot::channel();
        self.inner.pool.spawn(move || {
            let _guard = guard;
            let result = f();
            let _ = tx.send(result);
        });

        rx.await.map_err(|_| WorkerError::Panicked {
            pool: self.inner.name.clone(),
        })
    }

    /// Stop accepting new tasks
    pub fn shutdown(&self) {
        if !self.inner.shutdown.swap(true, Ordering::AcqRel) {
            tracing::debug!(pool = %self.inner.name, "Worker pool shutting down");
            if self.inner.in_flight.load(Ordering::Acquire) == 0 {
                self.inner.idle.notify_waiters();
            }
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::Acquire)
    }

    /// Shut down with no tasks left running
    pub fn is_terminated(&self) -> bool {
        self.is_shutdown() && self.inner.in_flight.load(Ordering::Acquire) == 0
    }

    /// Wait until the pool is terminated; returns `false` if `timeout` elapsed first
    pub async fn await_termination(&self, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let idle = self.inner.idle.notified();
                if self.is_terminated() {
                    return;
                }
                idle.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }

    fn admit(&self) -> std::result::Result<TaskGuard, WorkerError> {
        self.inner.in_flight.fetch_add(1, Ordering::AcqRel);
        let guard = TaskGuard(Arc::clone(&self.inner));
        if self.is_shutdown() {
            return Err(WorkerError::Rejected {
                pool: self.inner.name.clone(),
            });
        }
        Ok(guard)
    }
}

/// Builder for [`WorkerPool`]
#[derive(Debug, Clone)]
pub struct WorkerPoolBuilder {
    name: String,
    threads: Option<usize>,
    shutdown_time: Duration,
}

impl WorkerPoolBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            threads: None,
            shutdown_time: Duration::from_secs(5),
        }
    }

    /// Number of worker threads, defaults to the number of CPUs
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    /// How long a managed pool may take to drain on shutdown
    pub fn shutdown_time(mut self, shutdown_time: Duration) -> Self {
        self.shutdown_time = shutdown_time;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get_shutdown_time(&self) -> Duration {
        self.shutdown_time
    }

    pub fn build(&self) -> Result<WorkerPool> {
        WorkerPool::new(self.name.clone(), self.threads.unwrap_or_else(num_cpus::get))
    }
}
