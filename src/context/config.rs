//! Configuration: component settings and per-origin override payloads

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Listener registry configuration
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Maximum characters of a handler description exposed for introspection
    pub description_limit: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            description_limit: 80,
        }
    }
}

/// Task batching configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Delay used when the host has no idle-callback facility
    pub idle_fallback_delay: Duration,
    /// Flush pending work when the page is hidden or torn down
    pub flush_on_page_hide: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            idle_fallback_delay: Duration::from_millis(1),
            flush_on_page_hide: true,
        }
    }
}

/// Bootstrap configuration
#[derive(Debug, Clone, Default)]
pub struct OptimizerConfig {
    pub registry: RegistryConfig,
    pub scheduler: SchedulerConfig,
}

/// Non-feature runtime toggles
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeFlags {
    #[serde(rename = "REALTIME", default, skip_serializing_if = "Option::is_none")]
    pub realtime: Option<bool>,
}

/// Live override payload: `{ "FEAT": {..}, "FLAGS": {"REALTIME": true}, "DISABLE": true }`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigUpdate {
    #[serde(rename = "FEAT", default)]
    pub feat: BTreeMap<String, bool>,
    #[serde(rename = "FLAGS", default)]
    pub flags: RuntimeFlags,
    #[serde(rename = "DISABLE", default)]
    pub disable: bool,
}

impl ConfigUpdate {
    pub fn from_json(text: &str) -> crate::utils::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Read-only view of what is currently in force
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectiveConfig {
    #[serde(rename = "FEAT")]
    pub feat: BTreeMap<String, bool>,
    #[serde(rename = "FLAGS")]
    pub flags: RuntimeFlags,
    #[serde(rename = "DISABLED")]
    pub disabled: bool,
}
