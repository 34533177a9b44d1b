//! Configuration
//!
//! [`ConfigService`] is a concurrent key/value store seeded from the process
//! environment. [`LifecycleConfig`] holds the orchestrator's bounds and can be
//! deserialized with serde or read from a `ConfigService`.

use crate::error::{Result, RunwardError};
use dashmap::DashMap;
use serde::Deserialize;
use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub const STARTUP_TIMEOUT_KEY: &str = "RUNWARD_STARTUP_TIMEOUT_MS";
pub const SHUTDOWN_TIMEOUT_KEY: &str = "RUNWARD_SHUTDOWN_TIMEOUT_MS";
pub const START_ORDER_KEY: &str = "RUNWARD_START_ORDER";
pub const SHUTDOWN_HOOK_KEY: &str = "RUNWARD_SHUTDOWN_HOOK";
pub const EXIT_ON_SIGNAL_KEY: &str = "RUNWARD_EXIT_ON_SIGNAL";

/// Configuration service
#[derive(Clone, Default)]
pub struct ConfigService {
    config: Arc<DashMap<String, String>>,
}

impl ConfigService {
    /// Create a service holding the current process environment
    pub fn from_env() -> Self {
        let service = Self::default();
        for (key, value) in env::vars() {
            service.set(&key, &value);
        }
        service
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.config.get(key).map(|v| v.clone())
    }

    pub fn set(&self, key: &str, value: &str) {
        self.config.insert(key.to_string(), value.to_string());
    }

    /// Parse the value stored under `key`, if any
    pub fn get_parsed<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.get(key)
            .map(|raw| {
                raw.trim()
                    .parse::<T>()
                    .map_err(|e| RunwardError::config(key, format!("{raw:?}: {e}")))
            })
            .transpose()
    }
}

/// How the orchestrator launches component starts
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum StartOrder {
    /// One component at a time, in registration order; the first failure
    /// prevents later components from starting
    #[default]
    Sequential,
    /// All components at once, launched in registration order
    Concurrent,
}

/// Bounds and policies of the [`LifecycleManager`](crate::lifecycle::LifecycleManager)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    pub startup_timeout_ms: u64,
    pub shutdown_timeout_ms: u64,
    pub start_order: StartOrder,
    pub install_shutdown_hook: bool,
    /// Exit with [`exit_code`](crate::lifecycle::LifecycleManager::exit_code)
    /// once a signal-driven stop has finished
    pub exit_process_on_signal: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            startup_timeout_ms: 30_000,
            shutdown_timeout_ms: 5_000,
            start_order: StartOrder::Sequential,
            install_shutdown_hook: true,
            exit_process_on_signal: true,
        }
    }
}

impl LifecycleConfig {
    /// Read overrides from `config`, falling back to the defaults
    pub fn from_config(config: &ConfigService) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            startup_timeout_ms: config
                .get_parsed(STARTUP_TIMEOUT_KEY)?
                .unwrap_or(defaults.startup_timeout_ms),
            shutdown_timeout_ms: config
                .get_parsed(SHUTDOWN_TIMEOUT_KEY)?
                .unwrap_or(defaults.shutdown_timeout_ms),
            start_order: config
                .get_parsed(START_ORDER_KEY)?
                .unwrap_or(defaults.start_order),
            install_shutdown_hook: config
                .get_parsed(SHUTDOWN_HOOK_KEY)?
                .unwrap_or(defaults.install_shutdown_hook),
            exit_process_on_signal: config
                .get_parsed(EXIT_ON_SIGNAL_KEY)?
                .unwrap_or(defaults.exit_process_on_signal),
        })
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout_ms = duration_ms(timeout);
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout_ms = duration_ms(timeout);
        self
    }

    pub fn with_start_order(mut self, order: StartOrder) -> Self {
        self.start_order = order;
        self
    }

    pub fn with_shutdown_hook(mut self, install: bool) -> Self {
        self.install_shutdown_hook = install;
        self
    }

    pub fn with_exit_on_signal(mut self, exit: bool) -> Self {
        self.exit_process_on_signal = exit;
        self
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
