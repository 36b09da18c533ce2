//! Deferred-callback facilities of the host environment
//!
//! There is exactly one logical thread of control. Waiting is expressed as
//! a later re-entry through one of these callbacks, never as blocking.

mod tokio_host;

pub use tokio_host::TokioHost;

use std::time::Duration;

/// Zero-argument deferred work
pub type Callback = Box<dyn FnOnce()>;

/// Handle for a pending idle callback or timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackHandle(pub u64);

/// Host event loop
pub trait HostLoop {
    /// Run `task` as soon as the current turn yields
    fn queue_microtask(&self, task: Callback);

    /// Whether [`HostLoop::request_idle_callback`] is available
    fn supports_idle_callbacks(&self) -> bool;

    /// Run `task` when the loop is otherwise quiet; `None` if unsupported
    fn request_idle_callback(&self, task: Callback) -> Option<CallbackHandle>;

    /// Run `task` after `delay`
    fn set_timeout(&self, delay: Duration, task: Callback) -> CallbackHandle;

    /// Cancel a pending idle callback or timeout; unknown handles are ignored
    fn cancel(&self, handle: CallbackHandle);
}
