//! Option normalization
//!
//! Turns the raw options argument (absent, boolean shorthand or structured
//! object) into one canonical record. Never fails.

use crate::dom::{AbortSignal, ListenerOptions, NativeOptions};

/// High-frequency events that default to passive listeners
pub const PASSIVE_BY_DEFAULT: [&str; 6] = [
    "scroll",
    "wheel",
    "touchstart",
    "touchmove",
    "touchend",
    "touchcancel",
];

/// Canonical subscription options
#[derive(Debug, Clone, Default)]
pub struct NormalizedOptions {
    pub capture: bool,
    /// `None` leaves the decision to the platform
    pub passive: Option<bool>,
    pub once: bool,
    pub signal: Option<AbortSignal>,
    /// Stable id of `signal`, empty without one
    pub signal_id: String,
}

impl NormalizedOptions {
    /// Options as forwarded to the platform; the signal stays with the registry
    pub fn to_native(&self) -> NativeOptions {
        NativeOptions {
            capture: self.capture,
            passive: self.passive,
            once: self.once,
        }
    }
}

/// Whether `event_type` gets `passive: true` when left unset
pub fn is_passive_by_default(event_type: &str) -> bool {
    PASSIVE_BY_DEFAULT.contains(&event_type)
}

/// Normalize `raw` for `event_type`; `passive_default` is the policy flag
pub fn normalize_options(
    event_type: &str,
    raw: &ListenerOptions,
    passive_default: bool,
) -> NormalizedOptions {
    let mut options = match raw {
        ListenerOptions::Absent => NormalizedOptions::default(),
        ListenerOptions::Capture(capture) => NormalizedOptions {
            capture: *capture,
            ..Default::default()
        },
        ListenerOptions::Init(init) => NormalizedOptions {
            capture: init.capture.unwrap_or(false),
            passive: init.passive,
            once: init.once.unwrap_or(false),
            signal: init.signal.clone(),
            signal_id: String::new(),
        },
    };

    if options.passive.is_none() && passive_default && is_passive_by_default(event_type) {
        options.passive = Some(true);
    }
    if let Some(signal) = &options.signal {
        options.signal_id = signal.id().to_string();
    }
    options
}
