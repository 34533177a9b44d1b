//! Aggregate state of all managed components
//!
//! Component workers update their own entry concurrently; the collective
//! status is derived from atomic counters and published on a watch channel.

use super::{ComponentFailure, ManagedComponent, Phase};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;

/// State of one managed component inside the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum ServiceState {
    New,
    Starting,
    Running,
    Stopping,
    Terminated,
    Failed,
}

/// Collective status of the group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum GroupStatus {
    Idle,
    Starting,
    Healthy,
    Failed,
    Stopping,
    Stopped,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub index: usize,
    pub name: String,
    pub state: ServiceState,
    /// When the component entered `state`
    pub since: DateTime<Utc>,
    pub startup_time_ms: Option<u64>,
}

/// Point-in-time view of the orchestrator
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: GroupStatus,
    pub healthy: bool,
    pub components: Vec<ComponentHealth>,
}

struct Entry {
    name: String,
    state: ServiceState,
    since: DateTime<Utc>,
    startup_time: Option<Duration>,
}

pub(crate) struct GroupState {
    total: usize,
    running: AtomicUsize,
    entries: DashMap<usize, Entry>,
    failures: Mutex<Vec<ComponentFailure>>,
    status: watch::Sender<GroupStatus>,
    startup_done: watch::Sender<bool>,
}

impl GroupState {
    pub(crate) fn new(components: &[ManagedComponent]) -> Self {
        let now = Utc::now();
        let entries = components
            .iter()
            .map(|c| {
                (
                    c.index(),
                    Entry {
                        name: c.name().to_string(),
                        state: ServiceState::New,
                        since: now,
                        startup_time: None,
                    },
                )
            })
            .collect();
        Self {
            total: components.len(),
            running: AtomicUsize::new(0),
            entries,
            failures: Mutex::new(Vec::new()),
            status: watch::Sender::new(GroupStatus::Idle),
            startup_done: watch::Sender::new(false),
        }
    }

    pub(crate) fn status(&self) -> GroupStatus {
        *self.status.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<GroupStatus> {
        self.status.subscribe()
    }

    /// Idle → Starting, or straight to Healthy for an empty group.
    /// Returns `true` if the group became healthy.
    pub(crate) fn begin_starting(&self) -> bool {
        let total = self.total;
        let mut healthy = false;
        self.status.send_if_modified(|status| {
            if *status != GroupStatus::Idle {
                return false;
            }
            healthy = total == 0;
            *status = if healthy {
                GroupStatus::Healthy
            } else {
                GroupStatus::Starting
            };
            true
        });
        healthy
    }

    pub(crate) fn is_stopping(&self) -> bool {
        matches!(
            self.status(),
            GroupStatus::Stopping | GroupStatus::Stopped
        )
    }

    pub(crate) fn mark(&self, index: usize, state: ServiceState) {
        if let Some(mut entry) = self.entries.get_mut(&index) {
            entry.state = state;
            entry.since = Utc::now();
        }
    }

    /// Returns `true` if this was the last component to start
    pub(crate) fn mark_running(&self, index: usize, startup_time: Duration) -> bool {
        if let Some(mut entry) = self.entries.get_mut(&index) {
            entry.state = ServiceState::Running;
            entry.since = Utc::now();
            entry.startup_time = Some(startup_time);
        }
        let running = self.running.fetch_add(1, Ordering::AcqRel) + 1;
        running == self.total
            && self.status.send_if_modified(|status| {
                if *status == GroupStatus::Starting {
                    *status = GroupStatus::Healthy;
                    true
                } else {
                    false
                }
            })
    }

    pub(crate) fn record_failure(&self, failure: ComponentFailure) {
        self.mark(failure.index, ServiceState::Failed);
        let phase = failure.phase;
        {
            let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
            let at = failures.partition_point(|f| f.index <= failure.index);
            failures.insert(at, failure);
        }
        if phase == Phase::Start {
            self.status.send_if_modified(|status| {
                if *status == GroupStatus::Starting {
                    *status = GroupStatus::Failed;
                    true
                } else {
                    false
                }
            });
        }
    }

    pub(crate) fn failures(&self, phase: Phase) -> Vec<ComponentFailure> {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|f| f.phase == phase)
            .cloned()
            .collect()
    }

    pub(crate) fn has_failures(&self, phase: Phase) -> bool {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|f| f.phase == phase)
    }

    pub(crate) fn finish_startup(&self) {
        self.startup_done.send_replace(true);
    }

    /// Resolves once the startup driver has launched and settled every start
    pub(crate) async fn startup_settled(&self) {
        let mut done = self.startup_done.subscribe();
        let _ = done.wait_for(|done| *done).await;
    }

    pub(crate) fn begin_stopping(&self) {
        self.status.send_replace(GroupStatus::Stopping);
    }

    pub(crate) fn finish_stopping(&self) {
        self.status.send_replace(GroupStatus::Stopped);
    }

    pub(crate) fn report(&self) -> HealthReport {
        let mut components: Vec<_> = self
            .entries
            .iter()
            .map(|entry| ComponentHealth {
                index: *entry.key(),
                name: entry.name.clone(),
                state: entry.state,
                since: entry.since,
                startup_time_ms: entry
                    .startup_time
                    .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            })
            .collect();
        components.sort_by_key(|c| c.index);
        let status = self.status();
        HealthReport {
            status,
            healthy: status == GroupStatus::Healthy,
            components,
        }
    }
}
