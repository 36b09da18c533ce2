//! Dedup key builder
//!
//! Canonicalizes a subscription into one deterministic string so that
//! semantically identical registrations collapse regardless of whether the
//! call site used the boolean or the object form of the options.

use std::fmt;

use super::options::NormalizedOptions;
use crate::dom::Listener;

/// Canonical identity of a subscription on one target
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DedupKey(String);

impl DedupKey {
    /// `type::h<id>::c<0|1>::p<0|1|2>::o<0|1>::<signal id>`
    pub fn new(event_type: &str, listener: &Listener, options: &NormalizedOptions) -> Self {
        let passive = match options.passive {
            Some(true) => 1,
            Some(false) => 0,
            None => 2,
        };
        Self(format!(
            "{}::{}::c{}::p{}::o{}::{}",
            event_type,
            listener.id(),
            u8::from(options.capture),
            passive,
            u8::from(options.once),
            options.signal_id
        ))
    }

    /// Key for the `n`th duplicate kept while dedup is disabled
    pub fn duplicate(&self, n: u64) -> Self {
        Self(format!("{}#{}", self.0, n))
    }

    /// True for keys produced by [`DedupKey::duplicate`] on `base`
    pub fn is_duplicate_of(&self, base: &DedupKey) -> bool {
        self.0
            .strip_prefix(base.0.as_str())
            .and_then(|rest| rest.strip_prefix('#'))
            .is_some_and(|n| n.parse::<u64>().is_ok())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{ListenerInit, ListenerOptions};
    use crate::events::options::normalize_options;

    fn key(event_type: &str, listener: &Listener, raw: ListenerOptions) -> DedupKey {
        DedupKey::new(event_type, listener, &normalize_options(event_type, &raw, true))
    }

    #[test]
    fn test_boolean_and_object_forms_collapse() {
        let listener = Listener::new(|_| {});
        let boolean = key("click", &listener, ListenerOptions::Capture(true));
        let object = key(
            "click",
            &listener,
            ListenerOptions::Init(ListenerInit {
                capture: Some(true),
                ..Default::default()
            }),
        );
        assert_eq!(boolean, object);
    }

    #[test]
    fn test_identical_closures_get_distinct_keys() {
        let a = Listener::new(|_| {});
        let b = Listener::new(|_| {});
        assert_ne!(
            key("click", &a, ListenerOptions::Absent),
            key("click", &b, ListenerOptions::Absent)
        );
    }

    #[test]
    fn test_passive_tristate_encoding() {
        let listener = Listener::new(|_| {});
        let unset = key("click", &listener, ListenerOptions::Absent);
        assert!(unset.as_str().contains("::p2::"));
        let scroll = key("scroll", &listener, ListenerOptions::Absent);
        assert!(scroll.as_str().contains("::p1::"));
        let off = key(
            "scroll",
            &listener,
            ListenerOptions::Init(ListenerInit {
                passive: Some(false),
                ..Default::default()
            }),
        );
        assert!(off.as_str().contains("::p0::"));
    }

    #[test]
    fn test_duplicate_keys() {
        let listener = Listener::new(|_| {});
        let base = key("click", &listener, ListenerOptions::Absent);
        let dup = base.duplicate(3);
        assert!(dup.is_duplicate_of(&base));
        assert!(!base.is_duplicate_of(&base));
        assert!(!DedupKey("click::h1::c0::p2::o0::#x".into()).is_duplicate_of(&base));
    }
}
