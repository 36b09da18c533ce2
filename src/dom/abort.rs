//! Cancellation tokens (`AbortController` / `AbortSignal`)

use std::cell::{Cell, OnceCell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

type AbortObserver = Box<dyn FnOnce()>;

#[derive(Default)]
struct SignalInner {
    aborted: Cell<bool>,
    id: OnceCell<String>,
    observers: RefCell<Vec<(u64, AbortObserver)>>,
    next_slot: Cell<u64>,
}

/// Observable one-shot cancel signal
#[derive(Clone, Default)]
pub struct AbortSignal {
    inner: Rc<SignalInner>,
}

/// Owner side of an [`AbortSignal`]
#[derive(Default)]
pub struct AbortController {
    signal: AbortSignal,
}

/// Handle that detaches an abort observer
#[derive(Debug)]
pub struct AbortBinding {
    signal: Weak<SignalInner>,
    slot: u64,
}

impl AbortSignal {
    pub fn aborted(&self) -> bool {
        self.inner.aborted.get()
    }

    /// Stable per-signal identifier, assigned on first use
    pub fn id(&self) -> &str {
        self.inner.id.get_or_init(|| {
            static COUNTER: AtomicU64 = AtomicU64::new(1);
            format!("sig_{}", COUNTER.fetch_add(1, Ordering::Relaxed))
        })
    }

    /// Run `observer` once when the signal aborts.
    ///
    /// Observers added after the abort never fire.
    pub fn on_abort(&self, observer: impl FnOnce() + 'static) -> AbortBinding {
        let slot = self.inner.next_slot.get();
        self.inner.next_slot.set(slot + 1);
        if !self.aborted() {
            self.inner
                .observers
                .borrow_mut()
                .push((slot, Box::new(observer)));
        }
        AbortBinding {
            signal: Rc::downgrade(&self.inner),
            slot,
        }
    }

    pub fn observer_count(&self) -> usize {
        self.inner.observers.borrow().len()
    }

    pub fn ptr_eq(&self, other: &AbortSignal) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for AbortSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbortSignal")
            .field("aborted", &self.aborted())
            .field("observers", &self.observer_count())
            .finish()
    }
}

impl AbortController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self) -> AbortSignal {
        self.signal.clone()
    }

    /// Fire the signal; a second call is a no-op
    pub fn abort(&self) {
        let inner = &self.signal.inner;
        if inner.aborted.replace(true) {
            return;
        }
        let observers = std::mem::take(&mut *inner.observers.borrow_mut());
        for (_, observer) in observers {
            observer();
        }
    }
}

impl AbortBinding {
    /// Detach the observer; no-op once the signal fired or was dropped
    pub fn unbind(self) {
        if let Some(inner) = self.signal.upgrade() {
            inner.observers.borrow_mut().retain(|(slot, _)| *slot != self.slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abort_fires_observers_once() {
        let controller = AbortController::new();
        let signal = controller.signal();
        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);
        let _binding = signal.on_abort(move || counter.set(counter.get() + 1));

        controller.abort();
        controller.abort();
        assert!(signal.aborted());
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_unbind_detaches_observer() {
        let controller = AbortController::new();
        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);
        let binding = controller.signal().on_abort(move || counter.set(counter.get() + 1));
        binding.unbind();
        assert_eq!(controller.signal().observer_count(), 0);
        controller.abort();
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn test_observer_after_abort_never_fires() {
        let controller = AbortController::new();
        controller.abort();
        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);
        let _binding = controller.signal().on_abort(move || counter.set(1));
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn test_signal_id_is_stable() {
        let a = AbortSignal::default();
        let b = AbortSignal::default();
        assert_eq!(a.id(), a.clone().id());
        assert_ne!(a.id(), b.id());
        assert!(a.id().starts_with("sig_"));
    }
}
