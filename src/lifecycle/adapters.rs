//! Adapters that let plain resources take part in the lifecycle

use super::{BoxError, LifecycleError, Managed, Phase};
use crate::worker::WorkerPool;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Drains a [`WorkerPool`] on stop
pub struct ExecutorManager {
    pool: WorkerPool,
    shutdown_time: Duration,
}

impl ExecutorManager {
    pub fn new(pool: WorkerPool, shutdown_time: Duration) -> Self {
        Self {
            pool,
            shutdown_time,
        }
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }
}

#[async_trait]
impl Managed for ExecutorManager {
    fn name(&self) -> &str {
        self.pool.name()
    }

    async fn stop(&self) -> Result<(), BoxError> {
        self.pool.shutdown();
        if !self.pool.await_termination(self.shutdown_time).await {
            tracing::warn!(pool = %self.pool.name(), timeout = ?self.shutdown_time, "Worker pool did not terminate in time");
            return Err(Box::new(LifecycleError::timeout(
                Phase::Stop,
                self.shutdown_time,
            )));
        }
        Ok(())
    }
}

/// A resource released by an explicit `close`
#[async_trait]
pub trait AutoClose: Send + Sync + 'static {
    async fn close(&self) -> Result<(), BoxError>;
}

#[async_trait]
impl<C: AutoClose + ?Sized> AutoClose for Arc<C> {
    async fn close(&self) -> Result<(), BoxError> {
        (**self).close().await
    }
}

/// Closes the wrapped resource on stop
pub struct CloseableManager<C> {
    name: String,
    resource: C,
}

impl<C: AutoClose> CloseableManager<C> {
    pub fn new(resource: C) -> Self {
        Self::named(std::any::type_name::<C>(), resource)
    }

    pub fn named(name: impl Into<String>, resource: C) -> Self {
        Self {
            name: name.into(),
            resource,
        }
    }

    pub fn resource(&self) -> &C {
        &self.resource
    }
}

#[async_trait]
impl<C: AutoClose> Managed for CloseableManager<C> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stop(&self) -> Result<(), BoxError> {
        self.resource.close().await
    }
}
