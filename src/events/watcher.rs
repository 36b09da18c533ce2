//! Detachment watcher
//!
//! Observes subtree removals and releases every listener registered on a
//! removed node or any of its descendants. Removal is treated as terminal:
//! a node later re-inserted has already lost its registry-managed listeners.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use log::{debug, trace};

use super::registry::ListenerRegistry;
use crate::context::{Feature, RuntimeContext};
use crate::dom::{Document, MutationObserverHandle, MutationRecord, Node};

/// Counters for one watcher
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatcherStats {
    pub batches: u64,
    pub nodes_visited: u64,
    pub entries_released: u64,
}

struct WatcherInner {
    registry: ListenerRegistry,
    context: RuntimeContext,
    handle: RefCell<Option<MutationObserverHandle>>,
    stats: Cell<WatcherStats>,
}

#[derive(Clone)]
pub struct DetachmentWatcher {
    inner: Rc<WatcherInner>,
}

impl DetachmentWatcher {
    pub fn new(registry: ListenerRegistry, context: RuntimeContext) -> Self {
        Self {
            inner: Rc::new(WatcherInner {
                registry,
                context,
                handle: RefCell::new(None),
                stats: Cell::new(WatcherStats::default()),
            }),
        }
    }

    /// Start observing `document`; a second call is a no-op
    pub fn install(&self, document: &Document) {
        if self.is_installed() {
            return;
        }
        let watcher = self.clone();
        let handle = document.observe(move |records| {
            watcher.process(records);
        });
        *self.inner.handle.borrow_mut() = Some(handle);
        debug!("detachment watcher installed");
    }

    pub fn is_installed(&self) -> bool {
        self.inner.handle.borrow().is_some()
    }

    /// Release listeners for every node removed in `records`.
    ///
    /// Returns the number of entries released. Does nothing while
    /// `LISTENER_CLEANUP` is off.
    pub fn process(&self, records: &[MutationRecord]) -> usize {
        if !self
            .inner
            .context
            .flags()
            .is_enabled(Feature::ListenerCleanup)
        {
            return 0;
        }

        let mut stats = self.inner.stats.get();
        stats.batches += 1;
        let mut released = 0;
        for record in records {
            for root in &record.removed_nodes {
                let (visited, count) = self.release_subtree(root);
                stats.nodes_visited += visited;
                released += count;
            }
        }
        stats.entries_released += released as u64;
        self.inner.stats.set(stats);

        self.inner.registry.compact();
        if released > 0 {
            trace!("released {released} listeners from detached subtrees");
        }
        released
    }

    /// Depth-first walk over `root` and its descendants
    fn release_subtree(&self, root: &Node) -> (u64, usize) {
        let mut stack = vec![root.clone()];
        let mut visited = 0;
        let mut released = 0;
        while let Some(node) = stack.pop() {
            visited += 1;
            released += self.inner.registry.release_target(&node);
            stack.extend(node.children());
        }
        (visited, released)
    }

    /// Stop observing; safe to call repeatedly
    pub fn disconnect(&self) {
        if let Some(handle) = self.inner.handle.borrow_mut().take() {
            handle.disconnect();
            debug!("detachment watcher disconnected");
        }
    }

    pub fn stats(&self) -> WatcherStats {
        self.inner.stats.get()
    }
}
