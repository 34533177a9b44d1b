//! Group-level lifecycle listeners
//!
//! Listeners are an explicit callback list: each receives a tagged
//! [`LifecycleEvent`] synchronously, in registration order.

use super::{ComponentFailure, ManagedComponent};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, PoisonError};

/// Aggregate event broadcast by the [`LifecycleManager`](super::LifecycleManager)
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    /// Every managed component started successfully
    Started,
    /// The stop sweep finished
    Stopped,
    /// A component failed to start or stop
    Failed {
        component: ManagedComponent,
        failure: ComponentFailure,
    },
}

/// Observer of aggregate lifecycle events
///
/// Closures taking `&LifecycleEvent` implement this trait, so
/// `env.add_listener(|event: &LifecycleEvent| ...)` works directly.
pub trait LifecycleListener: Send + Sync + 'static {
    fn on_event(&self, event: &LifecycleEvent);
}

impl<F> LifecycleListener for F
where
    F: Fn(&LifecycleEvent) + Send + Sync + 'static,
{
    fn on_event(&self, event: &LifecycleEvent) {
        self(event)
    }
}

/// Delivers events to listeners one at a time
pub(crate) struct ListenerDispatcher {
    listeners: Vec<Arc<dyn LifecycleListener>>,
    delivery: Mutex<()>,
}

impl ListenerDispatcher {
    pub(crate) fn new(listeners: Vec<Arc<dyn LifecycleListener>>) -> Self {
        Self {
            listeners,
            delivery: Mutex::new(()),
        }
    }

    pub(crate) fn dispatch(&self, event: &LifecycleEvent) {
        let _delivery = self.delivery.lock().unwrap_or_else(PoisonError::into_inner);
        for listener in &self.listeners {
            if catch_unwind(AssertUnwindSafe(|| listener.on_event(event))).is_err() {
                tracing::error!(?event, "Lifecycle listener panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(event: &LifecycleEvent) -> &'static str {
        match event {
            LifecycleEvent::Started => "started",
            LifecycleEvent::Stopped => "stopped",
            LifecycleEvent::Failed { .. } => "failed",
        }
    }

    #[test]
    fn dispatches_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));

        let first = Arc::clone(&seen);
        let second = Arc::clone(&seen);
        let dispatcher = ListenerDispatcher::new(vec![
            Arc::new(move |e: &LifecycleEvent| {
                first.lock().unwrap().push(format!("a:{}", label(e)))
            }) as Arc<dyn LifecycleListener>,
            Arc::new(move |e: &LifecycleEvent| {
                second.lock().unwrap().push(format!("b:{}", label(e)))
            }),
        ]);

        dispatcher.dispatch(&LifecycleEvent::Started);
        dispatcher.dispatch(&LifecycleEvent::Stopped);

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["a:started", "b:started", "a:stopped", "b:stopped"]
        );
    }

    #[test]
    fn panicking_listener_does_not_block_others() {
        let seen = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&seen);
        let dispatcher = ListenerDispatcher::new(vec![
            Arc::new(|_: &LifecycleEvent| -> () {
                panic!("listener bug");
            }) as Arc<dyn LifecycleListener>,
            Arc::new(move |_: &LifecycleEvent| *counter.lock().unwrap() += 1),
        ]);

        dispatcher.dispatch(&LifecycleEvent::Started);

        assert_eq!(*seen.lock().unwrap(), 1);
    }
}
