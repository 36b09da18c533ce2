//! Idle-time scheduling strategy, chosen once at startup

use std::time::Duration;

use crate::context::SchedulerConfig;
use crate::host::{Callback, CallbackHandle, HostLoop};

/// How deferred flushes reach the next quiet moment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleStrategy {
    /// Host idle callbacks
    IdleCallback,
    /// Short timer when the host has no idle facility
    Timeout(Duration),
}

impl IdleStrategy {
    /// Pick the strategy for `host`
    pub fn select(host: &dyn HostLoop, config: &SchedulerConfig) -> Self {
        if host.supports_idle_callbacks() {
            Self::IdleCallback
        } else {
            Self::Timeout(config.idle_fallback_delay)
        }
    }

    pub fn schedule(&self, host: &dyn HostLoop, task: Callback) -> Option<CallbackHandle> {
        match self {
            Self::IdleCallback => host.request_idle_callback(task),
            Self::Timeout(delay) => Some(host.set_timeout(*delay, task)),
        }
    }
}
