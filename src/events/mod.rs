//! Listener lifecycle management
//!
//! - Option normalization and passive defaults
//! - Dedup keys
//! - The listener registry that intercepts subscribe/unsubscribe
//! - The detachment watcher that releases listeners of removed subtrees

mod key;
mod options;
mod registry;
mod watcher;

pub use key::DedupKey;
pub use options::{is_passive_by_default, normalize_options, NormalizedOptions, PASSIVE_BY_DEFAULT};
pub use registry::{ListenerRegistry, ListenerSummary};
pub use watcher::{DetachmentWatcher, WatcherStats};
