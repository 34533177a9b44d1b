//! Lifecycle Manager
//!
//! Drives one coordinated start and one coordinated stop across every managed
//! component registered in a [`LifecycleEnvironment`].

use super::group::{GroupState, GroupStatus, HealthReport, ServiceState};
use super::listener::ListenerDispatcher;
use super::shutdown::{ShutdownHook, shutdown_signal};
use super::{
    BoxError, ComponentFailure, LifecycleEnvironment, LifecycleError, LifecycleEvent,
    ManagedComponent, Phase, Result,
};
use crate::config::{LifecycleConfig, StartOrder};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::OnceCell;
use tokio::task::JoinSet;

/// How long `await_healthy` keeps collecting sibling start failures once one
/// component has failed
const FAILURE_GRACE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotPhase {
    New,
    Attempted,
    Stopped,
}

/// A component plus the lock that orders its start before its stop
struct Slot {
    component: ManagedComponent,
    phase: tokio::sync::Mutex<SlotPhase>,
    stop_reported: AtomicBool,
}

impl Slot {
    /// The stop outcome is reported once, by the stop task or by the timeout sweep
    fn claim_stop_report(&self) -> bool {
        !self.stop_reported.swap(true, Ordering::AcqRel)
    }
}

/// Coordinates start and stop of all managed components
///
/// The LifecycleManager is responsible for:
/// - Starting components in registration order (sequentially or concurrently)
/// - Reporting start failures to the waiting caller and to listeners
/// - Draining every component on stop within a bounded time
/// - Stopping on process termination through an owned shutdown hook
///
/// There is no automatic rollback: after a failed start the caller decides
/// whether to `stop()`.
///
/// # Example
///
/// ```rust,ignore
/// use runward::config::LifecycleConfig;
/// use runward::lifecycle::{LifecycleEnvironment, LifecycleManager};
///
/// let mut env = LifecycleEnvironment::new();
/// env.manage(database_pool).manage(http_server);
///
/// let manager = LifecycleManager::new(&env, LifecycleConfig::default());
/// manager.start()?;
/// if let Err(e) = manager.await_healthy().await {
///     tracing::error!("Startup failed: {}", e);
///     manager.stop().await.ok();
/// }
/// // ... application runs ...
/// manager.stop().await?;
/// ```
pub struct LifecycleManager {
    inner: Arc<ManagerInner>,
    hook: Mutex<Option<ShutdownHook>>,
}

struct ManagerInner {
    config: LifecycleConfig,
    slots: Vec<Arc<Slot>>,
    group: GroupState,
    listeners: ListenerDispatcher,
    started: AtomicBool,
    stopped: OnceCell<Result<()>>,
    exit_code: AtomicI32,
}

impl LifecycleManager {
    /// Build a manager from everything registered in `environment`
    ///
    /// The environment is frozen: later registrations are ignored. A shutdown
    /// hook is installed when the config asks for one and a tokio runtime is
    /// running.
    pub fn new(environment: &LifecycleEnvironment, config: LifecycleConfig) -> Self {
        environment.freeze();
        let snapshot = environment.snapshot();
        let group = GroupState::new(&snapshot.components);
        let slots = snapshot
            .components
            .into_iter()
            .map(|component| {
                Arc::new(Slot {
                    component,
                    phase: tokio::sync::Mutex::new(SlotPhase::New),
                    stop_reported: AtomicBool::new(false),
                })
            })
            .collect();

        let install_hook = config.install_shutdown_hook;
        let manager = Self {
            inner: Arc::new(ManagerInner {
                config,
                slots,
                group,
                listeners: ListenerDispatcher::new(snapshot.listeners),
                started: AtomicBool::new(false),
                stopped: OnceCell::new(),
                exit_code: AtomicI32::new(0),
            }),
            hook: Mutex::new(None),
        };

        if install_hook {
            if let Err(e) = manager.install_shutdown_hook() {
                tracing::warn!(error = %e, "Shutdown hook not installed");
            }
        }
        manager
    }

    /// Begin starting all components; returns without waiting
    ///
    /// A second call is a no-op.
    pub fn start(&self) -> Result<()> {
        let runtime = Handle::try_current().map_err(|e| LifecycleError::NoRuntime(e.to_string()))?;
        if self.inner.group.is_stopping() {
            return Err(LifecycleError::invalid_state("cannot start after stop"));
        }
        if self.inner.started.swap(true, Ordering::AcqRel) {
            tracing::warn!("Lifecycle already started");
            return Ok(());
        }

        if self.inner.group.begin_starting() {
            tracing::info!("No managed components registered");
            self.inner.listeners.dispatch(&LifecycleEvent::Started);
        }
        runtime.spawn(Arc::clone(&self.inner).run_startup());
        Ok(())
    }

    /// Wait until every component has started
    ///
    /// Returns as soon as a start fails, with the start failures recorded by
    /// then ordered by registration index. Returns a timeout once
    /// `startup_timeout` elapses.
    pub async fn await_healthy(&self) -> Result<()> {
        if !self.inner.started.load(Ordering::Acquire) {
            return Err(LifecycleError::NotStarted);
        }

        let group = &self.inner.group;
        let timeout = self.inner.config.startup_timeout();
        let settled = async {
            let mut status = group.subscribe();
            let reached = status
                .wait_for(|s| !matches!(s, GroupStatus::Idle | GroupStatus::Starting))
                .await
                .map(|s| *s);
            if let Ok(GroupStatus::Failed) = reached {
                let _ = tokio::time::timeout(FAILURE_GRACE, group.startup_settled()).await;
            }
            reached
        };

        match tokio::time::timeout(timeout, settled).await {
            Ok(Ok(GroupStatus::Healthy)) => Ok(()),
            Ok(Ok(GroupStatus::Failed)) => Err(LifecycleError::StartFailed {
                failures: group.failures(Phase::Start),
            }),
            Ok(Ok(status)) => Err(LifecycleError::invalid_state(format!(
                "lifecycle is {status} before becoming healthy"
            ))),
            Ok(Err(_)) => Err(LifecycleError::invalid_state("lifecycle state closed")),
            Err(_) if group.has_failures(Phase::Start) => Err(LifecycleError::StartFailed {
                failures: group.failures(Phase::Start),
            }),
            Err(_) => {
                tracing::warn!(timeout = ?timeout, "Managed components did not start in time");
                Err(LifecycleError::timeout(Phase::Start, timeout))
            }
        }
    }

    /// Stop every component whose start was attempted, bounded by `shutdown_timeout`
    ///
    /// Stops run concurrently and one failure never prevents the others.
    /// Components still stopping at the deadline are abandoned and reported.
    /// Later calls wait for the first and return its outcome.
    pub async fn stop(&self) -> Result<()> {
        self.inner.stop().await
    }

    /// Install a hook that stops the manager on SIGINT/SIGTERM
    pub fn install_shutdown_hook(&self) -> Result<()> {
        self.install_shutdown_hook_with(shutdown_signal())
    }

    /// Install a hook that stops the manager once `trigger` completes
    ///
    /// Installing while a hook is pending is a no-op. If the hook's stop
    /// fails, [`exit_code`](Self::exit_code) becomes 1.
    pub fn install_shutdown_hook_with<T>(&self, trigger: T) -> Result<()>
    where
        T: Future<Output = ()> + Send + 'static,
    {
        let runtime = Handle::try_current().map_err(|e| LifecycleError::NoRuntime(e.to_string()))?;
        let mut hook = self.hook.lock().unwrap_or_else(PoisonError::into_inner);
        if hook.as_ref().is_some_and(|h| !h.is_finished()) {
            tracing::debug!("Shutdown hook already installed");
            return Ok(());
        }

        let manager = Arc::downgrade(&self.inner);
        *hook = Some(ShutdownHook::spawn(&runtime, trigger, move || async move {
            if let Some(inner) = manager.upgrade() {
                inner.on_shutdown_signal().await;
            }
        }));
        tracing::debug!("Shutdown hook installed");
        Ok(())
    }

    /// Remove the shutdown hook; returns `false` if none was installed
    pub fn unregister_shutdown_hook(&self) -> bool {
        self.hook
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .map(ShutdownHook::unregister)
            .is_some()
    }

    pub fn status(&self) -> GroupStatus {
        self.inner.group.status()
    }

    pub fn health(&self) -> HealthReport {
        self.inner.group.report()
    }

    /// Process exit status requested by the shutdown hook
    pub fn exit_code(&self) -> i32 {
        self.inner.exit_code.load(Ordering::Acquire)
    }

    pub fn components(&self) -> Vec<ManagedComponent> {
        self.inner
            .slots
            .iter()
            .map(|slot| slot.component.clone())
            .collect()
    }

    pub fn component_count(&self) -> usize {
        self.inner.slots.len()
    }
}

impl ManagerInner {
    async fn run_startup(self: Arc<Self>) {
        let order = self.config.start_order;
        tracing::info!(components = self.slots.len(), %order, "Starting managed components");

        match order {
            StartOrder::Sequential => {
                for slot in &self.slots {
                    if !self.start_slot(slot).await {
                        break;
                    }
                }
            }
            StartOrder::Concurrent => {
                let mut starts = JoinSet::new();
                for slot in &self.slots {
                    let inner = Arc::clone(&self);
                    let slot = Arc::clone(slot);
                    starts.spawn(async move {
                        inner.start_slot(&slot).await;
                    });
                }
                while starts.join_next().await.is_some() {}
            }
        }

        self.group.finish_startup();
    }

    /// Returns `false` when no further component should be started
    async fn start_slot(&self, slot: &Slot) -> bool {
        let mut phase = slot.phase.lock().await;
        if *phase != SlotPhase::New || self.group.is_stopping() {
            return false;
        }
        *phase = SlotPhase::Attempted;

        let component = &slot.component;
        self.group.mark(component.index(), ServiceState::Starting);
        tracing::debug!(component = %component.name(), "Starting");

        let began = Instant::now();
        match run_hook(component, Phase::Start).await {
            Ok(()) => {
                let elapsed = began.elapsed();
                tracing::debug!(component = %component.name(), elapsed = ?elapsed, "Started");
                if self.group.mark_running(component.index(), elapsed) {
                    tracing::info!("All managed components started");
                    self.listeners.dispatch(&LifecycleEvent::Started);
                }
                true
            }
            Err(error) => {
                self.fail(component, Phase::Start, error);
                false
            }
        }
    }

    async fn stop(self: &Arc<Self>) -> Result<()> {
        let inner = Arc::clone(self);
        self.stopped
            .get_or_init(move || inner.run_shutdown())
            .await
            .clone()
    }

    async fn run_shutdown(self: Arc<Self>) -> Result<()> {
        let timeout = self.config.shutdown_timeout();
        tracing::info!(components = self.slots.len(), timeout = ?timeout, "Stopping managed components");
        self.group.begin_stopping();

        let mut stops = JoinSet::new();
        for slot in self.slots.iter().rev() {
            let inner = Arc::clone(&self);
            let slot = Arc::clone(slot);
            stops.spawn(async move { inner.stop_slot(&slot).await });
        }

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match tokio::time::timeout_at(deadline, stops.join_next()).await {
                Ok(Some(Ok(()))) => {}
                Ok(Some(Err(e))) => tracing::error!(error = %e, "Stop task failed"),
                Ok(None) => break,
                Err(_) => {
                    stops.detach_all();
                    for slot in &self.slots {
                        if !slot.claim_stop_report() {
                            continue;
                        }
                        let component = &slot.component;
                        tracing::warn!(
                            component = %component.name(),
                            timeout = ?timeout,
                            "Managed component did not stop in time, abandoning it"
                        );
                        self.fail(
                            component,
                            Phase::Stop,
                            Box::new(LifecycleError::timeout(Phase::Stop, timeout)),
                        );
                    }
                    break;
                }
            }
        }

        self.group.finish_stopping();
        tracing::info!("Managed components stopped");
        self.listeners.dispatch(&LifecycleEvent::Stopped);

        let failures = self.group.failures(Phase::Stop);
        if failures.is_empty() {
            Ok(())
        } else {
            Err(LifecycleError::StopFailed { failures })
        }
    }

    async fn stop_slot(&self, slot: &Slot) {
        let mut phase = slot.phase.lock().await;
        let component = &slot.component;
        match std::mem::replace(&mut *phase, SlotPhase::Stopped) {
            SlotPhase::Stopped => return,
            SlotPhase::New => {
                if slot.claim_stop_report() {
                    tracing::debug!(component = %component.name(), "Never started, nothing to stop");
                    self.group.mark(component.index(), ServiceState::Terminated);
                }
                return;
            }
            SlotPhase::Attempted => {}
        }

        self.group.mark(component.index(), ServiceState::Stopping);
        tracing::debug!(component = %component.name(), "Stopping");
        let result = run_hook(component, Phase::Stop).await;

        if !slot.claim_stop_report() {
            tracing::info!(component = %component.name(), ok = result.is_ok(), "Abandoned component finished stopping");
            return;
        }
        match result {
            Ok(()) => {
                self.group.mark(component.index(), ServiceState::Terminated);
                tracing::debug!(component = %component.name(), "Stopped");
            }
            Err(error) => self.fail(component, Phase::Stop, error),
        }
    }

    async fn on_shutdown_signal(self: Arc<Self>) {
        tracing::info!("Shutdown hook triggered");
        let code = match self.stop().await {
            Ok(()) => 0,
            Err(e) => {
                tracing::error!(error = %e, "Shutdown hook could not stop cleanly");
                1
            }
        };
        self.exit_code.store(code, Ordering::Release);

        if self.config.exit_process_on_signal {
            tracing::info!(code, "Exiting process");
            std::process::exit(code);
        }
    }

    fn fail(&self, component: &ManagedComponent, phase: Phase, error: BoxError) {
        let failure = ComponentFailure::new(component.index(), component.name(), phase, error);
        tracing::error!(
            component = %component.name(),
            %phase,
            error = %failure.error,
            "Managed component failed"
        );
        self.group.record_failure(failure.clone());
        self.listeners.dispatch(&LifecycleEvent::Failed {
            component: component.clone(),
            failure,
        });
    }
}

/// Run one hook on its own task so a panic becomes an error
async fn run_hook(component: &ManagedComponent, phase: Phase) -> std::result::Result<(), BoxError> {
    let managed = Arc::clone(component.managed());
    let task = tokio::spawn(async move {
        match phase {
            Phase::Start => managed.start().await,
            Phase::Stop => managed.stop().await,
        }
    });
    match task.await {
        Ok(result) => result,
        Err(e) => Err(e.to_string().into()),
    }
}
