//! Kill switch: ordered cleanup list drained most-recent-first

use std::cell::{Cell, RefCell};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use log::{debug, info};

use crate::utils::panic_message;

type Cleanup = Box<dyn FnOnce()>;

#[derive(Default)]
struct KillSwitchInner {
    cleanups: RefCell<Vec<(&'static str, Cleanup)>>,
    disabled: Cell<bool>,
}

/// Shared cleanup registry
#[derive(Clone, Default)]
pub struct KillSwitch {
    inner: Rc<KillSwitchInner>,
}

impl KillSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a reversal function; `name` is only used for logging
    pub fn register(&self, name: &'static str, cleanup: impl FnOnce() + 'static) {
        self.inner
            .cleanups
            .borrow_mut()
            .push((name, Box::new(cleanup)));
    }

    pub fn pending(&self) -> usize {
        self.inner.cleanups.borrow().len()
    }

    pub fn is_disabled(&self) -> bool {
        self.inner.disabled.get()
    }

    /// Run every registered cleanup, newest first, and mark the switch fired.
    ///
    /// A panicking cleanup is logged and skipped. Cleanups registered while
    /// draining run in the same call. Returns how many cleanups ran.
    pub fn disable(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = self.inner.cleanups.borrow_mut().pop();
            let Some((name, cleanup)) = next else {
                break;
            };
            if let Err(panic) = catch_unwind(AssertUnwindSafe(cleanup)) {
                debug!("cleanup '{name}' panicked: {}", panic_message(panic.as_ref()));
            }
            ran += 1;
        }
        if !self.inner.disabled.replace(true) {
            info!("kill switch fired, {ran} cleanups ran");
        }
        ran
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disable_runs_newest_first() {
        let switch = KillSwitch::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        for label in ["a", "b", "c"] {
            let order = Rc::clone(&order);
            switch.register("test", move || order.borrow_mut().push(label));
        }
        assert_eq!(switch.disable(), 3);
        assert_eq!(*order.borrow(), vec!["c", "b", "a"]);
        assert!(switch.is_disabled());
        assert_eq!(switch.pending(), 0);
    }

    #[test]
    fn test_disable_is_idempotent() {
        let switch = KillSwitch::new();
        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);
        switch.register("count", move || counter.set(counter.get() + 1));
        switch.disable();
        assert_eq!(switch.disable(), 0);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_panicking_cleanup_does_not_stop_drain() {
        let switch = KillSwitch::new();
        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);
        switch.register("first", move || counter.set(counter.get() + 1));
        switch.register("broken", || panic!("cleanup failed"));
        assert_eq!(switch.disable(), 2);
        assert_eq!(hits.get(), 1);
    }
}
