//! Cooperative task batching
//!
//! - `Idle -> Scheduled -> Flushing -> Idle` batcher
//! - Idle-callback or timer strategy picked at startup
//! - Auto-flush when the page is hidden or torn down

mod batch;
mod idle;
mod lifecycle;

pub(crate) use batch::run_isolated;
pub use batch::{BatchOptions, BatchState, BatchStats, Task, TaskBatcher, WeakTaskBatcher};
pub use idle::IdleStrategy;
pub use lifecycle::LifecycleHooks;
