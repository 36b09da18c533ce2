//! Shared runtime context
//!
//! One explicitly constructed object handed to every component at
//! initialization:
//! - Feature flag bus
//! - Kill switch (cleanup list)
//! - Realtime flag
//! - Configuration and live overrides

mod config;
mod flags;
mod kill_switch;
pub mod realtime;

pub use config::{
    ConfigUpdate, EffectiveConfig, OptimizerConfig, RegistryConfig, RuntimeFlags, SchedulerConfig,
};
pub use flags::{Feature, FeatureFlags, BROADCAST_TYPE};
pub use kill_switch::KillSwitch;

use std::cell::Cell;
use std::rc::Rc;

use log::debug;

#[derive(Default)]
struct ContextInner {
    flags: FeatureFlags,
    kill_switch: KillSwitch,
    realtime: Cell<bool>,
}

/// Cloneable handle to the shared context
#[derive(Clone, Default)]
pub struct RuntimeContext {
    inner: Rc<ContextInner>,
}

impl RuntimeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flags(&self) -> &FeatureFlags {
        &self.inner.flags
    }

    pub fn kill_switch(&self) -> &KillSwitch {
        &self.inner.kill_switch
    }

    pub fn is_realtime(&self) -> bool {
        self.inner.realtime.get()
    }

    /// Set the realtime flag alone; see [`realtime::set_realtime`] for the page marker
    pub fn set_realtime_flag(&self, on: bool) {
        self.inner.realtime.set(on);
    }

    /// Apply a live override: feature flags, runtime flags, then `DISABLE`
    pub fn apply_update(&self, update: &ConfigUpdate) {
        self.inner.flags.merge(&update.feat);
        if let Some(realtime) = update.flags.realtime {
            self.set_realtime_flag(realtime);
        }
        if update.disable {
            debug!("override requested DISABLE");
            self.inner.kill_switch.disable();
        }
    }

    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            feat: self.inner.flags.snapshot(),
            flags: RuntimeFlags {
                realtime: Some(self.is_realtime()),
            },
            disabled: self.inner.kill_switch.is_disabled(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_update_merges_and_disables() {
        let context = RuntimeContext::new();
        let ran = Rc::new(Cell::new(false));
        let flag = Rc::clone(&ran);
        context.kill_switch().register("probe", move || flag.set(true));

        let update = ConfigUpdate::from_json(
            r#"{"FEAT":{"MUTATION_BATCHING":false},"FLAGS":{"REALTIME":true},"DISABLE":true}"#,
        )
        .unwrap();
        context.apply_update(&update);

        assert!(!context.flags().is_enabled(Feature::MutationBatching));
        assert!(context.is_realtime());
        assert!(ran.get());
        assert!(context.effective_config().disabled);
    }

    #[test]
    fn test_effective_config_serializes() {
        let context = RuntimeContext::new();
        context.flags().seed_defaults();
        let json = serde_json::to_value(context.effective_config()).unwrap();
        assert_eq!(json["FEAT"]["LISTENER_CLEANUP"], true);
        assert_eq!(json["FLAGS"]["REALTIME"], false);
        assert_eq!(json["DISABLED"], false);
    }
}
