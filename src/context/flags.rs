//! Feature flag bus
//!
//! A shared, mutable string-keyed boolean map. Components read flags at call
//! time, so a flip takes effect on the next relevant call.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use log::trace;
use serde_json::Value;

/// Message type carried by cross-context flag broadcasts
pub const BROADCAST_TYPE: &str = "ufo:feat";

/// Flags consumed by the core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    /// Route listener calls through the registry at all
    UnifiedEventWrapper,
    /// Default `passive` to true for high-frequency events
    PassiveListeners,
    /// Collapse identical subscriptions
    DedupEventListeners,
    /// Release subscriptions of detached subtrees
    ListenerCleanup,
    /// Coalesce DOM work into idle-time flushes
    MutationBatching,
}

impl Feature {
    pub const ALL: [Feature; 5] = [
        Feature::UnifiedEventWrapper,
        Feature::PassiveListeners,
        Feature::DedupEventListeners,
        Feature::ListenerCleanup,
        Feature::MutationBatching,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Feature::UnifiedEventWrapper => "UNIFIED_EVENT_WRAPPER",
            Feature::PassiveListeners => "PASSIVE_LISTENERS",
            Feature::DedupEventListeners => "DEDUP_EVENT_LISTENERS",
            Feature::ListenerCleanup => "LISTENER_CLEANUP",
            Feature::MutationBatching => "MUTATION_BATCHING",
        }
    }

    pub fn default_value(self) -> bool {
        true
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Shared handle to the flag map
#[derive(Clone, Default)]
pub struct FeatureFlags {
    values: Rc<RefCell<BTreeMap<String, bool>>>,
}

impl FeatureFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fill in defaults for every known feature not already set
    pub fn seed_defaults(&self) {
        let mut values = self.values.borrow_mut();
        for feature in Feature::ALL {
            values
                .entry(feature.key().to_string())
                .or_insert(feature.default_value());
        }
    }

    pub fn get(&self, key: &str) -> Option<bool> {
        self.values.borrow().get(key).copied()
    }

    /// Current value, falling back to the feature's default when unset
    pub fn is_enabled(&self, feature: Feature) -> bool {
        self.get(feature.key()).unwrap_or(feature.default_value())
    }

    pub fn set(&self, key: impl Into<String>, value: bool) {
        self.values.borrow_mut().insert(key.into(), value);
    }

    pub fn set_feature(&self, feature: Feature, value: bool) {
        self.set(feature.key(), value);
    }

    /// Merge a batch of values over the current ones
    pub fn merge<'a>(&self, values: impl IntoIterator<Item = (&'a String, &'a bool)>) {
        let mut current = self.values.borrow_mut();
        for (key, value) in values {
            current.insert(key.clone(), *value);
        }
    }

    /// Apply a `{"type":"ufo:feat","feat":{...}}` broadcast.
    ///
    /// Other messages and malformed payloads are ignored; non-boolean values
    /// inside `feat` are skipped. Returns whether the message was accepted.
    pub fn apply_broadcast(&self, message: &Value) -> bool {
        if message.get("type").and_then(Value::as_str) != Some(BROADCAST_TYPE) {
            return false;
        }
        let Some(feat) = message.get("feat").and_then(Value::as_object) else {
            return false;
        };
        let mut values = self.values.borrow_mut();
        for (key, value) in feat {
            if let Some(value) = value.as_bool() {
                values.insert(key.clone(), value);
            }
        }
        trace!("applied flag broadcast with {} keys", feat.len());
        true
    }

    /// Copy of the current map
    pub fn snapshot(&self) -> BTreeMap<String, bool> {
        self.values.borrow().clone()
    }
}

impl fmt::Debug for FeatureFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.values.borrow().iter()).finish()
    }
}
