//! # UFO core - listener lifecycle and task batching for page optimization
//!
//! Intercepts event subscriptions on a document, deduplicates them,
//! applies passive defaults, releases listeners of detached subtrees and
//! coalesces DOM work into idle-time flushes.
//!
//! ## Architecture
//!
//! - **dom**: In-process platform model (nodes, events, cancellation, document)
//! - **host**: Deferred-callback facilities (microtasks, idle callbacks, timers)
//! - **context**: Feature flags, kill switch, realtime mode and configuration
//! - **events**: Option normalizer, dedup keys, listener registry, detachment watcher
//! - **scheduler**: Cooperative task batcher with page lifecycle flushes
//! - **engine**: Bootstrap wiring everything to one document
//! - **utils**: Shared utilities and error types

pub mod context;
pub mod dom;
pub mod engine;
pub mod events;
pub mod host;
pub mod scheduler;
pub mod utils;

// Re-export main types for convenience
pub use context::{OptimizerConfig, RuntimeContext};
pub use engine::Optimizer;
pub use events::{DetachmentWatcher, ListenerRegistry};
pub use scheduler::{BatchOptions, TaskBatcher};
pub use utils::error::{Result, UfoError};

/// Crate version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = "UFO";
