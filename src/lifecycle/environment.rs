//! The lifecycle registry
//!
//! Bundles and server factories register their managed objects and listeners
//! here during configuration. Registration order is start order. Once a
//! [`LifecycleManager`](super::LifecycleManager) has been built from the
//! environment it is frozen and further registrations are ignored.

use super::adapters::ExecutorManager;
use super::{
    BeanKind, ContainerLifeCycle, LifeCycle, LifeCycleHooks, LifecycleListener, Managed,
    ManagedComponent,
};
use crate::error::Result;
use crate::worker::{WorkerPool, WorkerPoolBuilder};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Ordered components and listeners, as seen by an orchestrator
#[derive(Clone)]
pub struct LifecycleSnapshot {
    pub components: Vec<ManagedComponent>,
    pub listeners: Vec<Arc<dyn LifecycleListener>>,
}

#[derive(Default)]
pub struct LifecycleEnvironment {
    components: Vec<ManagedComponent>,
    listeners: Vec<Arc<dyn LifecycleListener>>,
    frozen: AtomicBool,
}

impl LifecycleEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a managed object; no de-duplication is performed
    pub fn manage<M: Managed>(&mut self, managed: M) -> &mut Self {
        self.manage_shared(Arc::new(managed))
    }

    /// Register an already shared managed object
    pub fn manage_shared(&mut self, managed: Arc<dyn Managed>) -> &mut Self {
        if self.is_frozen() {
            tracing::warn!(
                component = %managed.name(),
                "Lifecycle already built, ignoring managed object"
            );
            return self;
        }
        let index = self.components.len();
        let component = ManagedComponent::new(index, managed);
        tracing::debug!(component = %component.name(), index, "Managed object registered");
        self.components.push(component);
        self
    }

    /// Register a life-cycled component
    pub fn manage_lifecycle<T: LifeCycleHooks>(&mut self, life_cycle: Arc<LifeCycle<T>>) -> &mut Self {
        self.manage_shared(life_cycle)
    }

    pub fn add_listener<L: LifecycleListener>(&mut self, listener: L) -> &mut Self {
        if self.is_frozen() {
            tracing::warn!("Lifecycle already built, ignoring listener");
            return self;
        }
        self.listeners.push(Arc::new(listener));
        self
    }

    /// Start building a worker pool that is drained on shutdown
    pub fn worker_pool(&mut self, name: impl Into<String>) -> ManagedPoolBuilder<'_> {
        ManagedPoolBuilder {
            environment: self,
            builder: WorkerPoolBuilder::new(name),
        }
    }

    /// Move every managed object registered so far into `container` as a
    /// managed bean and register the container in their place
    ///
    /// The moved objects are then started and stopped only through the
    /// container. Objects registered afterwards stay top-level.
    pub fn attach(&mut self, container: Arc<ContainerLifeCycle>) -> &mut Self {
        if self.is_frozen() {
            tracing::warn!(
                container = %container.name(),
                "Lifecycle already built, ignoring container"
            );
            return self;
        }
        for component in self.components.drain(..) {
            container
                .hooks()
                .add_bean(Arc::clone(component.managed()), BeanKind::Managed);
        }
        self.manage_lifecycle(container)
    }

    pub fn managed_objects(&self) -> &[ManagedComponent] {
        &self.components
    }

    pub fn snapshot(&self) -> LifecycleSnapshot {
        LifecycleSnapshot {
            components: self.components.clone(),
            listeners: self.listeners.clone(),
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    pub(crate) fn freeze(&self) {
        self.frozen.store(true, Ordering::Release);
    }
}

/// Builds a [`WorkerPool`] and registers it with the environment
pub struct ManagedPoolBuilder<'a> {
    environment: &'a mut LifecycleEnvironment,
    builder: WorkerPoolBuilder,
}

impl ManagedPoolBuilder<'_> {
    pub fn threads(mut self, threads: usize) -> Self {
        self.builder = self.builder.threads(threads);
        self
    }

    pub fn shutdown_time(mut self, shutdown_time: Duration) -> Self {
        self.builder = self.builder.shutdown_time(shutdown_time);
        self
    }

    pub fn build(self) -> Result<WorkerPool> {
        let pool = self.builder.build()?;
        self.environment.manage(ExecutorManager::new(
            pool.clone(),
            self.builder.get_shutdown_time(),
        ));
        Ok(pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{BoxError, Container, LifecycleEvent};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct Named(&'static str);

    impl Managed for Named {
        fn name(&self) -> &str {
            self.0
        }
    }

    #[test]
    fn snapshot_preserves_registration_order() {
        let mut env = LifecycleEnvironment::new();
        env.manage(Named("db"))
            .manage(Named("cache"))
            .manage(Named("db"))
            .manage(Named("http"));

        let snapshot = env.snapshot();
        let names: Vec<_> = snapshot.components.iter().map(|c| c.name()).collect();
        let indices: Vec<_> = snapshot.components.iter().map(|c| c.index()).collect();

        assert_eq!(names, vec!["db", "cache", "db", "http"]);
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn frozen_environment_ignores_registrations() {
        let mut env = LifecycleEnvironment::new();
        env.manage(Named("db"));
        env.freeze();

        env.manage(Named("late"));
        env.add_listener(|_: &LifecycleEvent| {});

        let snapshot = env.snapshot();
        assert_eq!(snapshot.components.len(), 1);
        assert!(snapshot.listeners.is_empty());
    }

    #[test]
    fn worker_pool_is_registered_as_managed() {
        let mut env = LifecycleEnvironment::new();
        let pool = env
            .worker_pool("io")
            .threads(2)
            .shutdown_time(Duration::from_secs(1))
            .build()
            .unwrap();

        assert_eq!(pool.num_threads(), 2);
        assert_eq!(env.managed_objects().len(), 1);
        assert_eq!(env.managed_objects()[0].name(), "io");
    }

    #[test]
    fn attach_moves_components_into_the_container() {
        let mut env = LifecycleEnvironment::new();
        env.manage(Named("db")).manage(Named("http"));
        let container = Container::life_cycle("server");

        env.attach(Arc::clone(&container)).manage(Named("metrics"));

        let names: Vec<_> = container
            .hooks()
            .managed_beans()
            .iter()
            .map(|b| b.name().to_string())
            .collect();
        assert_eq!(names, vec!["db", "http"]);
        let top_level: Vec<_> = env.managed_objects().iter().map(|c| c.name()).collect();
        assert_eq!(top_level, vec!["server", "metrics"]);
        assert_eq!(env.managed_objects()[0].index(), 0);
    }

    #[tokio::test]
    async fn attached_components_start_once() {
        #[derive(Default)]
        struct Counted(AtomicUsize);

        #[async_trait]
        impl Managed for Counted {
            async fn start(&self) -> std::result::Result<(), BoxError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }

        let counted = Arc::new(Counted::default());
        let mut env = LifecycleEnvironment::new();
        env.manage(Arc::clone(&counted));
        env.attach(Container::life_cycle("server"));

        for component in env.managed_objects() {
            component.managed().start().await.unwrap();
        }

        assert_eq!(counted.0.load(Ordering::SeqCst), 1);
    }
}
