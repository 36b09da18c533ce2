//! Host loop over a tokio `LocalSet`

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use tokio::task::{AbortHandle, LocalSet};

use super::{Callback, CallbackHandle, HostLoop};

/// Single-threaded host driven by a tokio [`LocalSet`].
///
/// Work is queued on the set even when it is not currently being driven and
/// runs once the owner calls [`TokioHost::run_until`].
pub struct TokioHost {
    local: LocalSet,
    idle_callbacks: bool,
    pending: Rc<RefCell<HashMap<u64, AbortHandle>>>,
    next_handle: Cell<u64>,
}

impl TokioHost {
    /// Host with idle-callback support
    pub fn new() -> Self {
        Self::with_idle_callbacks(true)
    }

    /// Host that reports whether idle callbacks are available
    pub fn with_idle_callbacks(idle_callbacks: bool) -> Self {
        Self {
            local: LocalSet::new(),
            idle_callbacks,
            pending: Rc::new(RefCell::new(HashMap::new())),
            next_handle: Cell::new(1),
        }
    }

    /// Drive the loop until `future` completes
    pub async fn run_until<F: Future>(&self, future: F) -> F::Output {
        self.local.run_until(future).await
    }

    /// Number of idle callbacks and timeouts not yet run or cancelled
    pub fn pending_callbacks(&self) -> usize {
        self.pending.borrow().len()
    }

    fn track<F>(&self, future: F) -> CallbackHandle
    where
        F: Future<Output = ()> + 'static,
    {
        let id = self.next_handle.get();
        self.next_handle.set(id + 1);
        let pending = Rc::clone(&self.pending);
        let join = self.local.spawn_local(async move {
            future.await;
            pending.borrow_mut().remove(&id);
        });
        self.pending.borrow_mut().insert(id, join.abort_handle());
        CallbackHandle(id)
    }
}

impl Default for TokioHost {
    fn default() -> Self {
        Self::new()
    }
}

impl HostLoop for TokioHost {
    fn queue_microtask(&self, task: Callback) {
        self.local.spawn_local(async move { task() });
    }

    fn supports_idle_callbacks(&self) -> bool {
        self.idle_callbacks
    }

    fn request_idle_callback(&self, task: Callback) -> Option<CallbackHandle> {
        if !self.idle_callbacks {
            return None;
        }
        // Let every task that is already runnable go first.
        Some(self.track(async move {
            tokio::task::yield_now().await;
            task()
        }))
    }

    fn set_timeout(&self, delay: Duration, task: Callback) -> CallbackHandle {
        self.track(async move {
            tokio::time::sleep(delay).await;
            task()
        })
    }

    fn cancel(&self, handle: CallbackHandle) {
        if let Some(abort) = self.pending.borrow_mut().remove(&handle.0) {
            abort.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_microtask_runs_before_idle() {
        let host = TokioHost::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let idle_log = Rc::clone(&log);
        host.request_idle_callback(Box::new(move || idle_log.borrow_mut().push("idle")));
        let micro_log = Rc::clone(&log);
        host.queue_microtask(Box::new(move || micro_log.borrow_mut().push("micro")));

        host.run_until(tokio::time::sleep(Duration::from_millis(10))).await;
        assert_eq!(*log.borrow(), vec!["micro", "idle"]);
        assert_eq!(host.pending_callbacks(), 0);
    }

    #[tokio::test]
    async fn test_cancel_timeout() {
        let host = TokioHost::new();
        let fired = Rc::new(Cell::new(false));
        let flag = Rc::clone(&fired);
        let handle = host.set_timeout(
            Duration::from_millis(1),
            Box::new(move || flag.set(true)),
        );
        host.cancel(handle);
        host.cancel(handle);
        host.run_until(tokio::time::sleep(Duration::from_millis(10))).await;
        assert!(!fired.get());
    }

    #[tokio::test]
    async fn test_idle_unsupported() {
        let host = TokioHost::with_idle_callbacks(false);
        assert!(!host.supports_idle_callbacks());
        assert!(host.request_idle_callback(Box::new(|| {})).is_none());
    }
}
