//! Task batching for DOM work
//!
//! Coalesces bursts of zero-argument tasks into one idle-time flush:
//! - Yield once so same-turn callers join the batch
//! - Flush at the next idle opportunity (or a short timer)
//! - Run synchronously in realtime mode or with batching switched off

use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use log::{debug, trace};

use super::idle::IdleStrategy;
use crate::context::{Feature, RuntimeContext, SchedulerConfig};
use crate::host::{CallbackHandle, HostLoop};
use crate::utils::panic_message;

/// Deferred unit of work
pub type Task = Box<dyn FnOnce()>;

/// Batcher lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchState {
    #[default]
    Idle,
    Scheduled,
    Flushing,
}

/// Per-call batching options
#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
    /// Run synchronously while realtime mode is on
    pub immediate_if_realtime: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            immediate_if_realtime: true,
        }
    }
}

/// Batching statistics
#[derive(Debug, Clone, Default)]
pub struct BatchStats {
    pub total_flushes: usize,
    pub total_tasks: usize,
    pub tasks_per_flush: f32,
    pub immediate_runs: usize,
    pub failed_tasks: usize,
    pub cleared_tasks: usize,
}

struct BatcherInner {
    context: RuntimeContext,
    host: Rc<dyn HostLoop>,
    strategy: IdleStrategy,
    queue: RefCell<Vec<Task>>,
    state: Cell<BatchState>,
    // Bumped whenever pending deferred work must become stale
    epoch: Cell<u64>,
    pending: Cell<Option<CallbackHandle>>,
    stats: RefCell<BatchStats>,
}

/// Handle to the batcher; clones share the queue
#[derive(Clone)]
pub struct TaskBatcher {
    inner: Rc<BatcherInner>,
}

/// Non-owning batcher handle
#[derive(Clone)]
pub struct WeakTaskBatcher {
    inner: Weak<BatcherInner>,
}

impl WeakTaskBatcher {
    pub fn upgrade(&self) -> Option<TaskBatcher> {
        self.inner.upgrade().map(|inner| TaskBatcher { inner })
    }
}

impl TaskBatcher {
    pub fn new(context: RuntimeContext, host: Rc<dyn HostLoop>, config: &SchedulerConfig) -> Self {
        let strategy = IdleStrategy::select(host.as_ref(), config);
        debug!("task batcher using {strategy:?}");
        Self {
            inner: Rc::new(BatcherInner {
                context,
                host,
                strategy,
                queue: RefCell::new(Vec::new()),
                state: Cell::new(BatchState::Idle),
                epoch: Cell::new(0),
                pending: Cell::new(None),
                stats: RefCell::new(BatchStats::default()),
            }),
        }
    }

    pub fn downgrade(&self) -> WeakTaskBatcher {
        WeakTaskBatcher {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Queue `task` for the next flush, or run it now when batching is
    /// bypassed.
    pub fn batch(&self, task: impl FnOnce() + 'static, options: BatchOptions) {
        let context = &self.inner.context;
        let bypass = !context.flags().is_enabled(Feature::MutationBatching)
            || (context.is_realtime() && options.immediate_if_realtime);
        if bypass {
            self.inner.stats.borrow_mut().immediate_runs += 1;
            if !run_isolated(task) {
                self.inner.stats.borrow_mut().failed_tasks += 1;
            }
            return;
        }

        self.inner.queue.borrow_mut().push(Box::new(task));
        // A flush in progress reschedules on its own once it drains.
        if self.inner.state.get() == BatchState::Idle {
            self.schedule();
        }
    }

    fn schedule(&self) {
        self.inner.state.set(BatchState::Scheduled);
        let epoch = self.inner.epoch.get();
        let weak = self.downgrade();
        self.inner.host.queue_microtask(Box::new(move || {
            let Some(batcher) = weak.upgrade() else {
                return;
            };
            if batcher.is_stale(epoch) {
                return;
            }
            let weak = batcher.downgrade();
            let handle = batcher.inner.strategy.schedule(
                batcher.inner.host.as_ref(),
                Box::new(move || {
                    if let Some(batcher) = weak.upgrade() {
                        if !batcher.is_stale(epoch) {
                            batcher.inner.pending.set(None);
                            batcher.flush();
                        }
                    }
                }),
            );
            batcher.inner.pending.set(handle);
        }));
    }

    fn is_stale(&self, epoch: u64) -> bool {
        self.inner.epoch.get() != epoch || self.inner.state.get() != BatchState::Scheduled
    }

    fn cancel_pending(&self) {
        self.inner.epoch.set(self.inner.epoch.get() + 1);
        if let Some(handle) = self.inner.pending.take() {
            self.inner.host.cancel(handle);
        }
    }

    /// Run every queued task now, in submission order.
    ///
    /// Tasks queued while the flush runs wait for the next cycle. A call
    /// made from inside a running flush does nothing.
    pub fn flush(&self) -> usize {
        if self.inner.state.get() == BatchState::Flushing {
            return 0;
        }
        self.cancel_pending();
        self.inner.state.set(BatchState::Flushing);

        let tasks = std::mem::take(&mut *self.inner.queue.borrow_mut());
        let count = tasks.len();
        let mut failed = 0;
        for task in tasks {
            if !run_isolated(task) {
                failed += 1;
            }
        }

        if count > 0 {
            let mut stats = self.inner.stats.borrow_mut();
            stats.total_flushes += 1;
            stats.total_tasks += count;
            stats.failed_tasks += failed;
            stats.tasks_per_flush = stats.total_tasks as f32 / stats.total_flushes as f32;
        }
        trace!("flushed {count} tasks");

        self.inner.state.set(BatchState::Idle);
        let more = !self.inner.queue.borrow().is_empty();
        if more {
            self.schedule();
        }
        count
    }

    /// Alias of [`flush`](Self::flush)
    pub fn batch_now(&self) -> usize {
        self.flush()
    }

    /// Cancel the pending flush and discard queued tasks without running them
    pub fn batch_clear(&self) -> usize {
        self.cancel_pending();
        let discarded = std::mem::take(&mut *self.inner.queue.borrow_mut()).len();
        if self.inner.state.get() == BatchState::Scheduled {
            self.inner.state.set(BatchState::Idle);
        }
        self.inner.stats.borrow_mut().cleared_tasks += discarded;
        if discarded > 0 {
            trace!("discarded {discarded} batched tasks");
        }
        discarded
    }

    pub fn state(&self) -> BatchState {
        self.inner.state.get()
    }

    pub fn pending_count(&self) -> usize {
        self.inner.queue.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending_count() == 0
    }

    pub fn strategy(&self) -> IdleStrategy {
        self.inner.strategy
    }

    pub fn stats(&self) -> BatchStats {
        self.inner.stats.borrow().clone()
    }
}

/// Run `task`, logging a panic instead of unwinding into the caller.
///
/// Returns false when the task panicked.
pub(crate) fn run_isolated(task: impl FnOnce()) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(task)) {
        Ok(()) => true,
        Err(payload) => {
            debug!("batched task panicked: {}", panic_message(payload.as_ref()));
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::TokioHost;
    use std::time::Duration;

    fn batcher() -> (RuntimeContext, Rc<TokioHost>, TaskBatcher) {
        let context = RuntimeContext::new();
        context.flags().seed_defaults();
        let host = Rc::new(TokioHost::new());
        let batcher = TaskBatcher::new(context.clone(), host.clone(), &SchedulerConfig::default());
        (context, host, batcher)
    }

    fn recorder() -> (Rc<RefCell<Vec<u32>>>, impl Fn(u32) -> Task) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let make = move |n: u32| -> Task {
            let sink = Rc::clone(&sink);
            Box::new(move || sink.borrow_mut().push(n))
        };
        (log, make)
    }

    async fn settle(host: &TokioHost) {
        host.run_until(tokio::time::sleep(Duration::from_millis(20))).await;
    }

    #[test]
    fn test_batch_now_runs_in_order() {
        let (_, _host, batcher) = batcher();
        let (log, task) = recorder();
        for n in 1..=3 {
            batcher.batch(task(n), BatchOptions::default());
        }
        assert_eq!(batcher.state(), BatchState::Scheduled);
        assert_eq!(batcher.pending_count(), 3);

        assert_eq!(batcher.batch_now(), 3);
        assert_eq!(*log.borrow(), vec![1, 2, 3]);
        assert_eq!(batcher.state(), BatchState::Idle);
        assert_eq!(batcher.batch_now(), 0);
    }

    #[tokio::test]
    async fn test_burst_coalesces_into_one_flush() {
        let (_, host, batcher) = batcher();
        let (log, task) = recorder();
        for n in 1..=5 {
            batcher.batch(task(n), BatchOptions::default());
        }
        assert!(log.borrow().is_empty());

        settle(&host).await;
        assert_eq!(*log.borrow(), vec![1, 2, 3, 4, 5]);
        assert_eq!(batcher.stats().total_flushes, 1);
        assert_eq!(batcher.state(), BatchState::Idle);
    }

    #[tokio::test]
    async fn test_task_added_during_flush_runs_next_cycle() {
        let (_, host, batcher) = batcher();
        let log = Rc::new(RefCell::new(Vec::new()));

        let inner_log = Rc::clone(&log);
        let handle = batcher.clone();
        batcher.batch(
            move || {
                inner_log.borrow_mut().push("outer");
                let late = Rc::clone(&inner_log);
                handle.batch(move || late.borrow_mut().push("inner"), BatchOptions::default());
                assert_eq!(handle.pending_count(), 1);
            },
            BatchOptions::default(),
        );

        assert_eq!(batcher.batch_now(), 1);
        assert_eq!(*log.borrow(), vec!["outer"]);
        assert_eq!(batcher.state(), BatchState::Scheduled);

        settle(&host).await;
        assert_eq!(*log.borrow(), vec!["outer", "inner"]);
    }

    #[test]
    fn test_panicking_task_does_not_block_others() {
        let (_, _host, batcher) = batcher();
        let (log, task) = recorder();
        batcher.batch(task(1), BatchOptions::default());
        batcher.batch(|| panic!("broken task"), BatchOptions::default());
        batcher.batch(task(3), BatchOptions::default());

        assert_eq!(batcher.flush(), 3);
        assert_eq!(*log.borrow(), vec![1, 3]);
        assert_eq!(batcher.stats().failed_tasks, 1);
    }

    #[tokio::test]
    async fn test_clear_discards_pending_work() {
        let (_, host, batcher) = batcher();
        let (log, task) = recorder();
        batcher.batch(task(1), BatchOptions::default());
        batcher.batch(task(2), BatchOptions::default());

        assert_eq!(batcher.batch_clear(), 2);
        assert_eq!(batcher.state(), BatchState::Idle);
        settle(&host).await;
        assert!(log.borrow().is_empty());
        assert_eq!(host.pending_callbacks(), 0);
    }

    #[test]
    fn test_realtime_runs_synchronously() {
        let (context, _host, batcher) = batcher();
        context.set_realtime_flag(true);
        let (log, task) = recorder();
        batcher.batch(task(7), BatchOptions::default());
        assert_eq!(*log.borrow(), vec![7]);
        assert_eq!(batcher.state(), BatchState::Idle);

        batcher.batch(
            task(8),
            BatchOptions {
                immediate_if_realtime: false,
            },
        );
        assert_eq!(*log.borrow(), vec![7]);
        assert_eq!(batcher.pending_count(), 1);
    }

    #[test]
    fn test_batching_switched_off() {
        let (context, _host, batcher) = batcher();
        context.flags().set_feature(Feature::MutationBatching, false);
        let (log, task) = recorder();
        batcher.batch(task(1), BatchOptions::default());
        assert_eq!(*log.borrow(), vec![1]);
        assert_eq!(batcher.stats().immediate_runs, 1);
    }

    #[test]
    fn test_realtime_panicking_task_is_swallowed() {
        let (context, _host, batcher) = batcher();
        context.set_realtime_flag(true);
        let (log, task) = recorder();

        let result: std::thread::Result<()> = panic::catch_unwind(AssertUnwindSafe(|| {
            batcher.batch(|| panic!("bad page task"), BatchOptions::default());
        }));
        assert!(result.is_ok());
        batcher.batch(task(2), BatchOptions::default());

        assert_eq!(*log.borrow(), vec![2]);
        assert_eq!(batcher.stats().failed_tasks, 1);
        assert_eq!(batcher.stats().immediate_runs, 2);
    }

    #[test]
    fn test_batching_off_panicking_task_is_swallowed() {
        let (context, _host, batcher) = batcher();
        context.flags().set_feature(Feature::MutationBatching, false);

        let result: std::thread::Result<()> = panic::catch_unwind(AssertUnwindSafe(|| {
            batcher.batch(|| panic!("bad page task"), BatchOptions::default());
        }));
        assert!(result.is_ok());
        assert_eq!(batcher.stats().failed_tasks, 1);
        assert_eq!(batcher.state(), BatchState::Idle);
    }

    #[tokio::test]
    async fn test_timeout_fallback() {
        let context = RuntimeContext::new();
        let host = Rc::new(TokioHost::with_idle_callbacks(false));
        let batcher = TaskBatcher::new(context, host.clone(), &SchedulerConfig::default());
        assert!(matches!(batcher.strategy(), IdleStrategy::Timeout(_)));

        let (log, task) = recorder();
        batcher.batch(task(1), BatchOptions::default());
        settle(&host).await;
        assert_eq!(*log.borrow(), vec![1]);
    }
}
