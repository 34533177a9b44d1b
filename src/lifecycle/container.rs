//! Bean container
//!
//! A [`Container`] holds beans, some managed (started and stopped with the
//! container) and some unmanaged (only tracked). Containers nest, and
//! listeners marked as inherited follow beans into nested containers.
//! Wrap a container in a [`LifeCycle`] to drive it: see [`ContainerLifeCycle`].

use super::managed::same_object;
use super::{BoxError, LifeCycle, LifeCycleHooks, Managed};
use async_trait::async_trait;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// A container driven by its own life cycle
pub type ContainerLifeCycle = LifeCycle<Container>;

/// Whether the container starts and stops a bean
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum BeanKind {
    Managed,
    Unmanaged,
}

/// A bean held by a [`Container`]
#[derive(Clone)]
pub struct Bean {
    component: Arc<dyn Managed>,
    kind: BeanKind,
    nested: Option<Arc<ContainerLifeCycle>>,
}

impl Bean {
    pub fn component(&self) -> &Arc<dyn Managed> {
        &self.component
    }

    pub fn name(&self) -> &str {
        self.component.name()
    }

    pub fn kind(&self) -> BeanKind {
        self.kind
    }

    pub fn is_managed(&self) -> bool {
        self.kind == BeanKind::Managed
    }

    /// The nested container, if this bean is one
    pub fn nested(&self) -> Option<&Arc<ContainerLifeCycle>> {
        self.nested.as_ref()
    }
}

impl fmt::Debug for Bean {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bean")
            .field("name", &self.name())
            .field("kind", &self.kind)
            .field("nested", &self.nested.is_some())
            .finish()
    }
}

/// Observer of beans being added to or removed from a container
pub trait ContainerListener: Send + Sync + 'static {
    fn bean_added(&self, parent: &Container, child: &Bean);

    fn bean_removed(&self, parent: &Container, child: &Bean);

    /// Inherited listeners are also registered on nested containers
    fn inherited(&self) -> bool {
        false
    }
}

pub struct Container {
    name: String,
    beans: RwLock<Vec<Bean>>,
    listeners: RwLock<Vec<Arc<dyn ContainerListener>>>,
}

impl Container {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            beans: RwLock::new(Vec::new()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Build a container already wrapped in its life cycle
    pub fn life_cycle(name: impl Into<String>) -> Arc<ContainerLifeCycle> {
        let name = name.into();
        Arc::new(LifeCycle::named(name.clone(), Self::new(name)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a bean; returns `false` if it is already present
    pub fn add_bean(&self, component: Arc<dyn Managed>, kind: BeanKind) -> bool {
        self.insert(Bean {
            component,
            kind,
            nested: None,
        })
    }

    /// Nest `child` as a managed bean
    pub fn add_container(&self, child: Arc<ContainerLifeCycle>) -> bool {
        let component: Arc<dyn Managed> = child.clone();
        self.insert(Bean {
            component,
            kind: BeanKind::Managed,
            nested: Some(child),
        })
    }

    /// Remove a bean; returns `false` if it was not present
    pub fn remove_bean(&self, component: &Arc<dyn Managed>) -> bool {
        let removed = {
            let mut beans = self.beans.write().unwrap_or_else(PoisonError::into_inner);
            beans
                .iter()
                .position(|b| same_object(&b.component, component))
                .map(|i| beans.remove(i))
        };
        let Some(bean) = removed else {
            return false;
        };

        tracing::debug!(container = %self.name, bean = %bean.name(), "Bean removed");
        if let Some(nested) = &bean.nested {
            for listener in self.listeners().iter().filter(|l| l.inherited()) {
                nested.hooks().remove_event_listener(listener);
            }
        }
        for listener in self.listeners() {
            listener.bean_removed(self, &bean);
        }
        true
    }

    pub fn contains(&self, component: &Arc<dyn Managed>) -> bool {
        self.find(component).is_some()
    }

    pub fn is_managed(&self, component: &Arc<dyn Managed>) -> bool {
        self.find(component).is_some_and(|b| b.is_managed())
    }

    /// Make an existing bean managed
    pub fn manage(&self, component: &Arc<dyn Managed>) -> bool {
        self.set_kind(component, BeanKind::Managed)
    }

    /// Make an existing bean unmanaged
    pub fn unmanage(&self, component: &Arc<dyn Managed>) -> bool {
        self.set_kind(component, BeanKind::Unmanaged)
    }

    pub fn beans(&self) -> Vec<Bean> {
        self.beans
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn managed_beans(&self) -> Vec<Bean> {
        self.beans().into_iter().filter(Bean::is_managed).collect()
    }

    pub fn unmanaged_beans(&self) -> Vec<Bean> {
        self.beans().into_iter().filter(|b| !b.is_managed()).collect()
    }

    /// Register a listener; it is told about every bean already present
    pub fn add_event_listener(&self, listener: Arc<dyn ContainerListener>) {
        {
            let mut listeners = self
                .listeners
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if listeners.iter().any(|l| same_object(l, &listener)) {
                return;
            }
            listeners.push(Arc::clone(&listener));
        }

        for bean in self.beans() {
            listener.bean_added(self, &bean);
            if listener.inherited() {
                if let Some(nested) = &bean.nested {
                    nested.hooks().add_event_listener(Arc::clone(&listener));
                }
            }
        }
    }

    pub fn remove_event_listener(&self, listener: &Arc<dyn ContainerListener>) -> bool {
        let removed = {
            let mut listeners = self
                .listeners
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let before = listeners.len();
            listeners.retain(|l| !same_object(l, listener));
            listeners.len() != before
        };

        if removed && listener.inherited() {
            for bean in self.beans() {
                if let Some(nested) = &bean.nested {
                    nested.hooks().remove_event_listener(listener);
                }
            }
        }
        removed
    }

    fn insert(&self, bean: Bean) -> bool {
        {
            let mut beans = self.beans.write().unwrap_or_else(PoisonError::into_inner);
            if beans.iter().any(|b| same_object(&b.component, &bean.component)) {
                return false;
            }
            beans.push(bean.clone());
        }

        tracing::debug!(container = %self.name, bean = %bean.name(), kind = %bean.kind, "Bean added");
        let listeners = self.listeners();
        if let Some(nested) = &bean.nested {
            for listener in listeners.iter().filter(|l| l.inherited()) {
                nested.hooks().add_event_listener(Arc::clone(listener));
            }
        }
        for listener in &listeners {
            listener.bean_added(self, &bean);
        }
        true
    }

    fn find(&self, component: &Arc<dyn Managed>) -> Option<Bean> {
        self.beans
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|b| same_object(&b.component, component))
            .cloned()
    }

    fn set_kind(&self, component: &Arc<dyn Managed>, kind: BeanKind) -> bool {
        let mut beans = self.beans.write().unwrap_or_else(PoisonError::into_inner);
        match beans
            .iter_mut()
            .find(|b| same_object(&b.component, component))
        {
            Some(bean) => {
                bean.kind = kind;
                true
            }
            None => false,
        }
    }

    fn listeners(&self) -> Vec<Arc<dyn ContainerListener>> {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl LifeCycleHooks for Container {
    /// Starts managed beans in insertion order, stopping at the first failure
    async fn do_start(&self) -> Result<(), BoxError> {
        for bean in self.managed_beans() {
            tracing::debug!(container = %self.name, bean = %bean.name(), "Starting bean");
            bean.component.start().await?;
        }
        Ok(())
    }

    /// Stops managed beans in reverse insertion order, returning the first error
    async fn do_stop(&self) -> Result<(), BoxError> {
        let mut first_error = None;
        for bean in self.managed_beans().iter().rev() {
            tracing::debug!(container = %self.name, bean = %bean.name(), "Stopping bean");
            if let Err(e) = bean.component.stop().await {
                tracing::warn!(container = %self.name, bean = %bean.name(), error = %e, "Bean failed to stop");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Step {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        fail_stop: bool,
    }

    impl Step {
        fn managed(
            name: &'static str,
            log: &Arc<Mutex<Vec<String>>>,
            fail_stop: bool,
        ) -> Arc<dyn Managed> {
            Arc::new(Self {
                name,
                log: Arc::clone(log),
                fail_stop,
            })
        }
    }

    #[async_trait]
    impl Managed for Step {
        fn name(&self) -> &str {
            self.name
        }

        async fn start(&self) -> Result<(), BoxError> {
            self.log.lock().unwrap().push(format!("start:{}", self.name));
            Ok(())
        }

        async fn stop(&self) -> Result<(), BoxError> {
            self.log.lock().unwrap().push(format!("stop:{}", self.name));
            if self.fail_stop {
                return Err(format!("{} stuck", self.name).into());
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct Tracker {
        inherited: bool,
        events: Mutex<Vec<String>>,
    }

    impl ContainerListener for Tracker {
        fn bean_added(&self, parent: &Container, child: &Bean) {
            self.events
                .lock()
                .unwrap()
                .push(format!("+{}/{}", parent.name(), child.name()));
        }

        fn bean_removed(&self, parent: &Container, child: &Bean) {
            self.events
                .lock()
                .unwrap()
                .push(format!("-{}/{}", parent.name(), child.name()));
        }

        fn inherited(&self) -> bool {
            self.inherited
        }
    }

    #[tokio::test]
    async fn starts_managed_beans_only_and_stops_in_reverse() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let container = Container::life_cycle("server");
        container
            .hooks()
            .add_bean(Step::managed("pool", &log, false), BeanKind::Managed);
        container
            .hooks()
            .add_bean(Step::managed("shared", &log, false), BeanKind::Unmanaged);
        container
            .hooks()
            .add_bean(Step::managed("http", &log, false), BeanKind::Managed);

        container.start().await.unwrap();
        container.stop().await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["start:pool", "start:http", "stop:http", "stop:pool"]
        );
    }

    #[tokio::test]
    async fn stop_continues_past_failing_bean() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let container = Container::life_cycle("server");
        for (name, fail) in [("a", false), ("b", true), ("c", false)] {
            container
                .hooks()
                .add_bean(Step::managed(name, &log, fail), BeanKind::Managed);
        }

        container.start().await.unwrap();
        let err = container.stop().await.unwrap_err();

        assert_eq!(err.to_string(), "b stuck");
        assert!(container.is_failed());
        let log = log.lock().unwrap();
        assert!(log.contains(&"stop:a".to_string()));
        assert!(log.contains(&"stop:c".to_string()));
    }

    #[test]
    fn duplicate_beans_are_ignored_and_kind_can_change() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let container = Container::new("root");
        let bean = Step::managed("cache", &log, false);

        assert!(container.add_bean(Arc::clone(&bean), BeanKind::Unmanaged));
        assert!(!container.add_bean(Arc::clone(&bean), BeanKind::Managed));
        assert!(!container.is_managed(&bean));

        assert!(container.manage(&bean));
        assert!(container.is_managed(&bean));
        assert_eq!(container.managed_beans().len(), 1);

        assert!(container.remove_bean(&bean));
        assert!(!container.contains(&bean));
        assert!(!container.remove_bean(&bean));
    }

    #[test]
    fn listener_sees_existing_and_new_beans() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let container = Container::new("root");
        let first = Step::managed("first", &log, false);
        container.add_bean(Arc::clone(&first), BeanKind::Managed);

        let tracker = Arc::new(Tracker::default());
        container.add_event_listener(tracker.clone());
        container.add_bean(Step::managed("second", &log, false), BeanKind::Managed);
        container.remove_bean(&first);

        assert_eq!(
            *tracker.events.lock().unwrap(),
            vec!["+root/first", "+root/second", "-root/first"]
        );
    }

    #[test]
    fn inherited_listener_propagates_to_nested_containers() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let root = Container::new("root");
        let tracker = Arc::new(Tracker {
            inherited: true,
            ..Tracker::default()
        });
        let plain = Arc::new(Tracker::default());
        root.add_event_listener(tracker.clone());
        root.add_event_listener(plain.clone());

        let child = Container::life_cycle("child");
        root.add_container(Arc::clone(&child));
        child
            .hooks()
            .add_bean(Step::managed("leaf", &log, false), BeanKind::Managed);

        assert_eq!(
            *tracker.events.lock().unwrap(),
            vec!["+root/child", "+child/leaf"]
        );
        assert_eq!(*plain.events.lock().unwrap(), vec!["+root/child"]);

        let child_bean: Arc<dyn Managed> = child.clone();
        root.remove_bean(&child_bean);
        child
            .hooks()
            .add_bean(Step::managed("orphan", &log, false), BeanKind::Managed);

        assert_eq!(
            *tracker.events.lock().unwrap(),
            vec!["+root/child", "+child/leaf", "-root/child"]
        );
    }

    #[tokio::test]
    async fn nested_container_starts_with_parent() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let root = Container::life_cycle("root");
        let child = Container::life_cycle("child");
        child
            .hooks()
            .add_bean(Step::managed("leaf", &log, false), BeanKind::Managed);
        root.hooks().add_container(Arc::clone(&child));

        root.start().await.unwrap();
        assert!(child.is_started());

        root.stop().await.unwrap();
        assert!(child.is_stopped());
        assert_eq!(*log.lock().unwrap(), vec!["start:leaf", "stop:leaf"]);
    }
}
