//! The `Managed` capability
//!
//! Anything with optional start/stop hooks can take part in the application
//! lifecycle. Both hooks default to a no-op, so a component implements only
//! the one it cares about.

use super::BoxError;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// An object whose start and stop are driven by the [`LifecycleManager`].
///
/// `start` is invoked at most once; `stop` is invoked at most once and is
/// attempted even when `start` failed, so it must tolerate cleaning up a
/// partially started component.
///
/// # Example
///
/// ```rust,ignore
/// use runward::lifecycle::{BoxError, Managed};
/// use async_trait::async_trait;
///
/// struct ConnectionPool { /* ... */ }
///
/// #[async_trait]
/// impl Managed for ConnectionPool {
///     fn name(&self) -> &str {
///         "connection-pool"
///     }
///
///     async fn start(&self) -> Result<(), BoxError> {
///         self.connect().await?;
///         Ok(())
///     }
///
///     async fn stop(&self) -> Result<(), BoxError> {
///         self.close_all().await?;
///         Ok(())
///     }
/// }
/// ```
///
/// [`LifecycleManager`]: super::LifecycleManager
#[async_trait]
pub trait Managed: Send + Sync + 'static {
    /// Name used in logs, events and health reports
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Start the component
    async fn start(&self) -> Result<(), BoxError> {
        Ok(())
    }

    /// Stop the component
    async fn stop(&self) -> Result<(), BoxError> {
        Ok(())
    }
}

#[async_trait]
impl<T: Managed + ?Sized> Managed for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn start(&self) -> Result<(), BoxError> {
        (**self).start().await
    }

    async fn stop(&self) -> Result<(), BoxError> {
        (**self).stop().await
    }
}

/// A registered managed object together with its registration slot
#[derive(Clone)]
pub struct ManagedComponent {
    index: usize,
    name: String,
    managed: Arc<dyn Managed>,
}

impl ManagedComponent {
    pub(crate) fn new(index: usize, managed: Arc<dyn Managed>) -> Self {
        Self {
            index,
            name: managed.name().to_string(),
            managed,
        }
    }

    /// Position in registration order
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn managed(&self) -> &Arc<dyn Managed> {
        &self.managed
    }

    /// Whether this component wraps exactly `other`
    pub fn is(&self, other: &Arc<dyn Managed>) -> bool {
        same_object(&self.managed, other)
    }
}

impl fmt::Debug for ManagedComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedComponent")
            .field("index", &self.index)
            .field("name", &self.name)
            .finish()
    }
}

/// Pointer identity for trait objects, ignoring vtable addresses
pub(crate) fn same_object<T: ?Sized, U: ?Sized>(a: &Arc<T>, b: &Arc<U>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Quiet;

    impl Managed for Quiet {}

    struct Named;

    impl Managed for Named {
        fn name(&self) -> &str {
            "named"
        }
    }

    #[tokio::test]
    async fn default_hooks_are_no_ops() {
        let quiet = Quiet;
        assert!(quiet.start().await.is_ok());
        assert!(quiet.stop().await.is_ok());
        assert!(quiet.name().ends_with("Quiet"));
    }

    #[test]
    fn component_keeps_identity_and_name() {
        let named: Arc<dyn Managed> = Arc::new(Named);
        let other: Arc<dyn Managed> = Arc::new(Named);
        let component = ManagedComponent::new(3, Arc::clone(&named));

        assert_eq!(component.index(), 3);
        assert_eq!(component.name(), "named");
        assert!(component.is(&named));
        assert!(!component.is(&other));
    }

    #[tokio::test]
    async fn arc_delegates_to_inner() {
        let shared = Arc::new(Named);
        assert_eq!(Managed::name(&shared), "named");
        assert!(Managed::start(&shared).await.is_ok());
    }
}
