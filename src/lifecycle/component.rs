//! Per-component life cycle state machine
//!
//! [`LifeCycle`] wraps a type implementing [`LifeCycleHooks`] and tracks its
//! state through `Stopped → Starting → Started → Stopping → Stopped`, with
//! `Failed` reachable from `Starting` and `Stopping`. A failed component must
//! be stopped before it can start again. Listeners are told about every
//! transition after the new state has been recorded.

use super::managed::same_object;
use super::{BoxError, LifecycleError, Managed};
use async_trait::async_trait;
use serde::Serialize;
use std::error::Error;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// State of a single life-cycled component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum LifeCycleState {
    Stopped,
    Starting,
    Started,
    Stopping,
    Failed,
}

/// The concrete start/stop logic driven by a [`LifeCycle`]
#[async_trait]
pub trait LifeCycleHooks: Send + Sync + 'static {
    async fn do_start(&self) -> Result<(), BoxError> {
        Ok(())
    }

    async fn do_stop(&self) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Observer of a single component's transitions
///
/// All callbacks default to no-ops. A listener added after a transition does
/// not see it.
pub trait LifeCycleListener: Send + Sync + 'static {
    fn lifecycle_starting(&self, _name: &str) {}

    fn lifecycle_started(&self, _name: &str) {}

    fn lifecycle_stopping(&self, _name: &str) {}

    fn lifecycle_stopped(&self, _name: &str) {}

    fn lifecycle_failure(&self, _name: &str, _error: &(dyn Error + Send + Sync)) {}
}

/// A life-cycled component
///
/// # Example
///
/// ```rust,ignore
/// use runward::lifecycle::{BoxError, LifeCycle, LifeCycleHooks};
///
/// struct SslContext { /* ... */ }
///
/// #[async_trait::async_trait]
/// impl LifeCycleHooks for SslContext {
///     async fn do_start(&self) -> Result<(), BoxError> {
///         self.load_key_store()?;
///         Ok(())
///     }
/// }
///
/// let ssl = LifeCycle::named("ssl-context", SslContext::new());
/// ssl.start().await?;
/// assert!(ssl.is_started());
/// ```
pub struct LifeCycle<T> {
    name: String,
    hooks: T,
    state: Mutex<LifeCycleState>,
    transition: tokio::sync::Mutex<()>,
    listeners: RwLock<Vec<Arc<dyn LifeCycleListener>>>,
}

impl<T: LifeCycleHooks> LifeCycle<T> {
    /// Wrap `hooks`, naming the component after its type
    pub fn new(hooks: T) -> Self {
        Self::named(std::any::type_name::<T>(), hooks)
    }

    pub fn named(name: impl Into<String>, hooks: T) -> Self {
        Self {
            name: name.into(),
            hooks,
            state: Mutex::new(LifeCycleState::Stopped),
            transition: tokio::sync::Mutex::new(()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hooks(&self) -> &T {
        &self.hooks
    }

    pub fn state(&self) -> LifeCycleState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starting or started
    pub fn is_running(&self) -> bool {
        matches!(
            self.state(),
            LifeCycleState::Starting | LifeCycleState::Started
        )
    }

    pub fn is_started(&self) -> bool {
        self.state() == LifeCycleState::Started
    }

    pub fn is_starting(&self) -> bool {
        self.state() == LifeCycleState::Starting
    }

    pub fn is_stopping(&self) -> bool {
        self.state() == LifeCycleState::Stopping
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == LifeCycleState::Stopped
    }

    pub fn is_failed(&self) -> bool {
        self.state() == LifeCycleState::Failed
    }

    pub fn add_listener(&self, listener: Arc<dyn LifeCycleListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// Returns `true` if the listener was registered
    pub fn remove_listener(&self, listener: &Arc<dyn LifeCycleListener>) -> bool {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|l| !same_object(l, listener));
        listeners.len() != before
    }

    /// Start the component; a no-op while starting or started
    ///
    /// Starting from `Failed` is refused until the component has been stopped.
    pub async fn start(&self) -> Result<(), BoxError> {
        let _transition = self.transition.lock().await;
        if self.is_running() {
            tracing::debug!(component = %self.name, "Already started");
            return Ok(());
        }
        if self.is_failed() {
            return Err(Box::new(LifecycleError::invalid_state(format!(
                "{} has failed and must be stopped before it can start",
                self.name
            ))));
        }

        self.set_state(LifeCycleState::Starting);
        self.notify(|l| l.lifecycle_starting(&self.name));

        match self.hooks.do_start().await {
            Ok(()) => {
                self.set_state(LifeCycleState::Started);
                tracing::debug!(component = %self.name, "Started");
                self.notify(|l| l.lifecycle_started(&self.name));
                Ok(())
            }
            Err(e) => {
                self.fail(&*e);
                Err(e)
            }
        }
    }

    /// Stop the component; a no-op while stopping or stopped
    ///
    /// Stopping a failed component runs `do_stop` so partial state is released.
    pub async fn stop(&self) -> Result<(), BoxError> {
        let _transition = self.transition.lock().await;
        if matches!(
            self.state(),
            LifeCycleState::Stopped | LifeCycleState::Stopping
        ) {
            tracing::debug!(component = %self.name, "Already stopped");
            return Ok(());
        }

        self.set_state(LifeCycleState::Stopping);
        self.notify(|l| l.lifecycle_stopping(&self.name));

        match self.hooks.do_stop().await {
            Ok(()) => {
                self.set_state(LifeCycleState::Stopped);
                tracing::debug!(component = %self.name, "Stopped");
                self.notify(|l| l.lifecycle_stopped(&self.name));
                Ok(())
            }
            Err(e) => {
                self.fail(&*e);
                Err(e)
            }
        }
    }

    fn fail(&self, error: &(dyn Error + Send + Sync)) {
        self.set_state(LifeCycleState::Failed);
        tracing::warn!(component = %self.name, error = %error, "Life cycle failure");
        self.notify(|l| l.lifecycle_failure(&self.name, error));
    }

    fn set_state(&self, state: LifeCycleState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn notify(&self, event: impl Fn(&dyn LifeCycleListener)) {
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in &listeners {
            event(listener.as_ref());
        }
    }
}

#[async_trait]
impl<T: LifeCycleHooks> Managed for LifeCycle<T> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self) -> Result<(), BoxError> {
        LifeCycle::start(self).await
    }

    async fn stop(&self) -> Result<(), BoxError> {
        LifeCycle::stop(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        starts: AtomicUsize,
        stops: AtomicUsize,
        fail_start: AtomicBool,
        fail_stop: AtomicBool,
    }

    #[async_trait]
    impl LifeCycleHooks for Counting {
        async fn do_start(&self) -> Result<(), BoxError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            if self.fail_start.load(Ordering::SeqCst) {
                return Err("cannot bind".into());
            }
            Ok(())
        }

        async fn do_stop(&self) -> Result<(), BoxError> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            if self.fail_stop.load(Ordering::SeqCst) {
                return Err("cannot unbind".into());
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn push(&self, event: String) {
            self.events.lock().unwrap().push(event);
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    impl LifeCycleListener for Recorder {
        fn lifecycle_starting(&self, name: &str) {
            self.push(format!("starting:{name}"));
        }

        fn lifecycle_started(&self, name: &str) {
            self.push(format!("started:{name}"));
        }

        fn lifecycle_stopping(&self, name: &str) {
            self.push(format!("stopping:{name}"));
        }

        fn lifecycle_stopped(&self, name: &str) {
            self.push(format!("stopped:{name}"));
        }

        fn lifecycle_failure(&self, name: &str, error: &(dyn Error + Send + Sync)) {
            self.push(format!("failure:{name}:{error}"));
        }
    }

    #[tokio::test]
    async fn second_start_does_not_run_do_start_again() {
        let lc = LifeCycle::named("server", Counting::default());

        lc.start().await.unwrap();
        lc.start().await.unwrap();

        assert_eq!(lc.hooks().starts.load(Ordering::SeqCst), 1);
        assert!(lc.is_started());
        assert!(lc.is_running());
    }

    #[tokio::test]
    async fn full_cycle_notifies_in_order() {
        let lc = LifeCycle::named("server", Counting::default());
        let recorder = Arc::new(Recorder::default());
        lc.add_listener(recorder.clone());

        lc.start().await.unwrap();
        lc.stop().await.unwrap();

        assert_eq!(
            recorder.events(),
            vec![
                "starting:server",
                "started:server",
                "stopping:server",
                "stopped:server"
            ]
        );
        assert!(lc.is_stopped());
    }

    #[tokio::test]
    async fn failed_start_transitions_to_failed_and_returns_error() {
        let hooks = Counting::default();
        hooks.fail_start.store(true, Ordering::SeqCst);
        let lc = LifeCycle::named("server", hooks);
        let recorder = Arc::new(Recorder::default());
        lc.add_listener(recorder.clone());

        let err = lc.start().await.unwrap_err();

        assert_eq!(err.to_string(), "cannot bind");
        assert!(lc.is_failed());
        assert_eq!(
            recorder.events(),
            vec!["starting:server", "failure:server:cannot bind"]
        );
    }

    #[tokio::test]
    async fn stop_after_failed_start_still_cleans_up() {
        let hooks = Counting::default();
        hooks.fail_start.store(true, Ordering::SeqCst);
        let lc = LifeCycle::named("server", hooks);

        assert!(lc.start().await.is_err());
        lc.stop().await.unwrap();

        assert_eq!(lc.hooks().stops.load(Ordering::SeqCst), 1);
        assert!(lc.is_stopped());
    }

    #[tokio::test]
    async fn failed_component_must_stop_before_restart() {
        let hooks = Counting::default();
        hooks.fail_start.store(true, Ordering::SeqCst);
        let lc = LifeCycle::named("server", hooks);

        assert!(lc.start().await.is_err());
        lc.hooks().fail_start.store(false, Ordering::SeqCst);
        let err = lc.start().await.unwrap_err();

        assert!(err.is::<LifecycleError>());
        assert!(lc.is_failed());
        assert_eq!(lc.hooks().starts.load(Ordering::SeqCst), 1);

        lc.stop().await.unwrap();
        lc.start().await.unwrap();
        assert!(lc.is_started());
        assert_eq!(lc.hooks().starts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_stop_is_reported() {
        let hooks = Counting::default();
        hooks.fail_stop.store(true, Ordering::SeqCst);
        let lc = LifeCycle::named("server", hooks);

        lc.start().await.unwrap();
        assert!(lc.stop().await.is_err());
        assert!(lc.is_failed());
    }

    #[tokio::test]
    async fn stop_without_start_is_a_no_op() {
        let lc = LifeCycle::named("idle", Counting::default());
        lc.stop().await.unwrap();
        assert_eq!(lc.hooks().stops.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn late_listener_sees_no_replay_and_can_be_removed() {
        let lc = LifeCycle::named("server", Counting::default());
        lc.start().await.unwrap();

        let recorder = Arc::new(Recorder::default());
        let listener: Arc<dyn LifeCycleListener> = recorder.clone();
        lc.add_listener(Arc::clone(&listener));
        assert!(recorder.events().is_empty());

        assert!(lc.remove_listener(&listener));
        assert!(!lc.remove_listener(&listener));
        lc.stop().await.unwrap();
        assert!(recorder.events().is_empty());
    }

    #[tokio::test]
    async fn state_display_is_uppercase() {
        assert_eq!(LifeCycleState::Started.to_string(), "STARTED");
        let lc = LifeCycle::new(Counting::default());
        assert!(Managed::name(&lc).ends_with("Counting"));
    }
}
