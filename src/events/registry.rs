//! Listener lifecycle registry
//!
//! Owns `target -> event type -> dedup key -> Entry`. An Entry exists if and
//! only if the matching wrapped listener is registered with the platform:
//! entries are recorded only after a successful forward and dropped in the
//! same call that forwards the removal.
//!
//! Targets are held weakly; state for targets that died is compacted away
//! by [`ListenerRegistry::compact`].

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use log::{debug, info, trace};
use serde::Serialize;

use super::key::DedupKey;
use super::options::{normalize_options, NormalizedOptions};
use crate::context::{Feature, RegistryConfig, RuntimeContext};
use crate::dom::{
    AbortBinding, AbortSignal, Document, Listener, ListenerInterceptor, ListenerOptions,
    NativeListeners, Node, NodeId, NodeListeners, WeakDocument, WeakNode,
};
use crate::utils::{truncate_description, Result};

/// One active forwarded subscription
struct Entry {
    event_type: String,
    /// Handler as supplied by the caller
    listener: Listener,
    /// Wrapper actually registered with the platform
    wrapped: Listener,
    options: NormalizedOptions,
    target: WeakNode,
    cancellation: Option<AbortBinding>,
}

impl Entry {
    /// Detach the cancellation observer, if any
    fn release(mut self) -> Self {
        if let Some(binding) = self.cancellation.take() {
            binding.unbind();
        }
        self
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("event_type", &self.event_type)
            .field("listener", &self.listener.id())
            .field("wrapped", &self.wrapped.id())
            .field("options", &self.options)
            .field("target", &self.target)
            .finish()
    }
}

/// Introspection record; never exposes the handler itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListenerSummary {
    #[serde(rename = "type")]
    pub event_type: String,
    pub capture: bool,
    pub passive: Option<bool>,
    pub once: bool,
    pub listener: String,
}

struct TargetState {
    target: WeakNode,
    by_type: HashMap<String, HashMap<DedupKey, Entry>>,
}

impl TargetState {
    fn new(target: WeakNode) -> Self {
        Self {
            target,
            by_type: HashMap::new(),
        }
    }

    fn entry_count(&self) -> usize {
        self.by_type.values().map(HashMap::len).sum()
    }

    fn into_entries(self) -> impl Iterator<Item = Entry> {
        self.by_type.into_values().flat_map(HashMap::into_values)
    }
}

struct Installation {
    document: WeakDocument,
    previous: Option<Rc<dyn ListenerInterceptor>>,
}

struct RegistryInner {
    context: RuntimeContext,
    native: Rc<dyn NativeListeners>,
    config: RegistryConfig,
    targets: RefCell<HashMap<NodeId, TargetState>>,
    installation: RefCell<Option<Installation>>,
    duplicates: Cell<u64>,
}

/// Handle to the registry; clones share state
#[derive(Clone)]
pub struct ListenerRegistry {
    inner: Rc<RegistryInner>,
}

impl ListenerRegistry {
    /// Registry forwarding to the nodes' native listener stores
    pub fn new(context: RuntimeContext, config: RegistryConfig) -> Self {
        Self::with_native(context, config, Rc::new(NodeListeners))
    }

    /// Registry forwarding to a custom platform
    pub fn with_native(
        context: RuntimeContext,
        config: RegistryConfig,
        native: Rc<dyn NativeListeners>,
    ) -> Self {
        Self {
            inner: Rc::new(RegistryInner {
                context,
                native,
                config,
                targets: RefCell::new(HashMap::new()),
                installation: RefCell::new(None),
                duplicates: Cell::new(0),
            }),
        }
    }

    fn from_weak(weak: &Weak<RegistryInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    /// Normalize, dedup and forward a subscription.
    ///
    /// Forwarding failures are logged and leave no Entry behind.
    pub fn subscribe(
        &self,
        target: &Node,
        event_type: &str,
        listener: &Listener,
        options: &ListenerOptions,
    ) {
        if let Err(err) = self.try_subscribe(target, event_type, listener, options) {
            debug!("subscribe {event_type} on {} failed: {err}", target.id());
        }
    }

    fn try_subscribe(
        &self,
        target: &Node,
        event_type: &str,
        listener: &Listener,
        raw: &ListenerOptions,
    ) -> Result<()> {
        let flags = self.inner.context.flags();
        let options =
            normalize_options(event_type, raw, flags.is_enabled(Feature::PassiveListeners));
        if options.signal.as_ref().is_some_and(AbortSignal::aborted) {
            trace!("signal already aborted, {event_type} not subscribed");
            return Ok(());
        }

        let base = DedupKey::new(event_type, listener, &options);
        let key = if self.contains(target.id(), event_type, &base) {
            if flags.is_enabled(Feature::DedupEventListeners) {
                trace!("dedup hit {base}");
                return Ok(());
            }
            let n = self.inner.duplicates.get() + 1;
            self.inner.duplicates.set(n);
            base.duplicate(n)
        } else {
            base
        };

        let wrapped = self.wrap(target.id(), event_type, listener, &key, options.once);
        self.inner
            .native
            .add(target, event_type, &wrapped, &options.to_native())?;

        let cancellation = options.signal.as_ref().map(|signal| {
            let registry = Rc::downgrade(&self.inner);
            let weak_target = target.downgrade();
            let event_type = event_type.to_string();
            let key = key.clone();
            signal.on_abort(move || {
                if let Some(registry) = Self::from_weak(&registry) {
                    registry.cancel(&weak_target, &event_type, &key);
                }
            })
        });

        trace!("subscribed {key} on {}", target.id());
        let entry = Entry {
            event_type: event_type.to_string(),
            listener: listener.clone(),
            wrapped,
            options,
            target: target.downgrade(),
            cancellation,
        };
        self.inner
            .targets
            .borrow_mut()
            .entry(target.id())
            .or_insert_with(|| TargetState::new(target.downgrade()))
            .by_type
            .entry(event_type.to_string())
            .or_default()
            .insert(key, entry);
        Ok(())
    }

    /// Wrapper forwarding to `listener`; `once` wrappers drop their Entry
    /// before the handler runs, since the platform has already dropped them.
    fn wrap(
        &self,
        target: NodeId,
        event_type: &str,
        listener: &Listener,
        key: &DedupKey,
        once: bool,
    ) -> Listener {
        let original = listener.clone();
        let registry = Rc::downgrade(&self.inner);
        let event_type = event_type.to_string();
        let key = key.clone();
        Listener::named(listener.description(), move |event| {
            if once {
                if let Some(registry) = Self::from_weak(&registry) {
                    if let Some(entry) = registry.take_entry(target, &event_type, &key) {
                        entry.release();
                    }
                }
            }
            original.call(event);
        })
    }

    /// Remove a subscription made with matching arguments.
    ///
    /// Without a recorded Entry the call is forwarded with the original
    /// handler, covering subscriptions made before the registry existed.
    pub fn unsubscribe(
        &self,
        target: &Node,
        event_type: &str,
        listener: &Listener,
        options: &ListenerOptions,
    ) {
        let flags = self.inner.context.flags();
        let normalized =
            normalize_options(event_type, options, flags.is_enabled(Feature::PassiveListeners));
        let base = DedupKey::new(event_type, listener, &normalized);

        let entry = self
            .take_entry(target.id(), event_type, &base)
            .or_else(|| self.take_duplicate(target.id(), event_type, &base));
        match entry {
            Some(entry) => {
                let entry = entry.release();
                self.forward_remove(target, &entry);
                trace!("unsubscribed {base} on {}", target.id());
            }
            None => {
                trace!("no entry for {base}, forwarding original handler");
                if let Err(err) =
                    self.inner
                        .native
                        .remove(target, event_type, listener, normalized.capture)
                {
                    debug!("fallback remove {event_type} on {} failed: {err}", target.id());
                }
            }
        }
    }

    /// Cancellation path: at most one forwarded removal per Entry
    fn cancel(&self, target: &WeakNode, event_type: &str, key: &DedupKey) {
        let Some(entry) = self.take_entry(target.id(), event_type, key) else {
            return;
        };
        let entry = entry.release();
        if let Some(node) = target.upgrade() {
            self.forward_remove(&node, &entry);
        }
        trace!("cancelled {key}");
    }

    fn forward_remove(&self, target: &Node, entry: &Entry) {
        if let Err(err) = self.inner.native.remove(
            target,
            &entry.event_type,
            &entry.wrapped,
            entry.options.capture,
        ) {
            debug!(
                "remove {} on {} failed: {err}",
                entry.event_type,
                target.id()
            );
        }
    }

    fn contains(&self, target: NodeId, event_type: &str, key: &DedupKey) -> bool {
        self.inner
            .targets
            .borrow()
            .get(&target)
            .and_then(|state| state.by_type.get(event_type))
            .is_some_and(|entries| entries.contains_key(key))
    }

    /// Remove one Entry, pruning empty maps
    fn take_entry(&self, target: NodeId, event_type: &str, key: &DedupKey) -> Option<Entry> {
        let mut targets = self.inner.targets.borrow_mut();
        let state = targets.get_mut(&target)?;
        let entries = state.by_type.get_mut(event_type)?;
        let entry = entries.remove(key)?;
        if entries.is_empty() {
            state.by_type.remove(event_type);
        }
        if state.by_type.is_empty() {
            targets.remove(&target);
        }
        Some(entry)
    }

    fn take_duplicate(&self, target: NodeId, event_type: &str, base: &DedupKey) -> Option<Entry> {
        let key = self
            .inner
            .targets
            .borrow()
            .get(&target)?
            .by_type
            .get(event_type)?
            .keys()
            .find(|key| key.is_duplicate_of(base))
            .cloned()?;
        self.take_entry(target, event_type, &key)
    }

    /// Drop every Entry of `target`, forwarding one removal per Entry.
    ///
    /// Individual forwarding failures are logged and do not stop the rest.
    pub fn release_target(&self, target: &Node) -> usize {
        let Some(state) = self.inner.targets.borrow_mut().remove(&target.id()) else {
            return 0;
        };
        let mut released = 0;
        for entry in state.into_entries() {
            let entry = entry.release();
            self.forward_remove(target, &entry);
            released += 1;
        }
        released
    }

    /// Drop state for targets that no longer exist
    pub fn compact(&self) -> usize {
        let dead: Vec<TargetState> = {
            let mut targets = self.inner.targets.borrow_mut();
            let ids: Vec<NodeId> = targets
                .iter()
                .filter(|(_, state)| state.target.is_dead())
                .map(|(id, _)| *id)
                .collect();
            ids.iter().filter_map(|id| targets.remove(id)).collect()
        };
        let count = dead.len();
        for state in dead {
            for entry in state.into_entries() {
                entry.release();
            }
        }
        if count > 0 {
            trace!("compacted {count} dead targets");
        }
        count
    }

    /// Active entries of `target`, for debugging; no side effects
    pub fn entries_for(&self, target: &Node) -> Vec<ListenerSummary> {
        let limit = self.inner.config.description_limit;
        let targets = self.inner.targets.borrow();
        let Some(state) = targets.get(&target.id()) else {
            return Vec::new();
        };
        let mut keyed: Vec<(&DedupKey, ListenerSummary)> = state
            .by_type
            .iter()
            .flat_map(|(event_type, entries)| {
                entries.iter().map(move |(key, entry)| {
                    let summary = ListenerSummary {
                        event_type: event_type.clone(),
                        capture: entry.options.capture,
                        passive: entry.options.passive,
                        once: entry.options.once,
                        listener: truncate_description(entry.listener.description(), limit),
                    };
                    (key, summary)
                })
            })
            .collect();
        keyed.sort_by(|a, b| a.0.cmp(b.0));
        keyed.into_iter().map(|(_, summary)| summary).collect()
    }

    pub fn entry_count(&self, target: &Node) -> usize {
        self.inner
            .targets
            .borrow()
            .get(&target.id())
            .map_or(0, TargetState::entry_count)
    }

    pub fn target_count(&self) -> usize {
        self.inner.targets.borrow().len()
    }

    pub fn total_entries(&self) -> usize {
        self.inner
            .targets
            .borrow()
            .values()
            .map(TargetState::entry_count)
            .sum()
    }

    /// Route the document's listener entry points through this registry
    pub fn install(&self, document: &Document) {
        if self.is_installed() {
            return;
        }
        let previous = document.install_interceptor(Some(Rc::new(self.clone())));
        *self.inner.installation.borrow_mut() = Some(Installation {
            document: document.downgrade(),
            previous,
        });
        info!("listener registry installed");
    }

    pub fn is_installed(&self) -> bool {
        self.inner.installation.borrow().is_some()
    }

    /// Restore the entry points that were in place before [`install`](Self::install).
    ///
    /// Already forwarded subscriptions stay registered with the platform.
    pub fn teardown(&self) {
        let Some(installation) = self.inner.installation.borrow_mut().take() else {
            return;
        };
        if let Some(document) = installation.document.upgrade() {
            document.install_interceptor(installation.previous);
        }
        info!("listener registry torn down");
    }

    /// Forward untouched while the wrapper is switched off
    fn passthrough_add(
        &self,
        target: &Node,
        event_type: &str,
        listener: &Listener,
        options: &ListenerOptions,
    ) {
        let normalized = normalize_options(event_type, options, false);
        if normalized.signal.as_ref().is_some_and(AbortSignal::aborted) {
            return;
        }
        if let Err(err) = self
            .inner
            .native
            .add(target, event_type, listener, &normalized.to_native())
        {
            debug!("passthrough add {event_type} on {} failed: {err}", target.id());
            return;
        }
        if let Some(signal) = &normalized.signal {
            let native = Rc::clone(&self.inner.native);
            let weak_target = target.downgrade();
            let event_type = event_type.to_string();
            let listener = listener.clone();
            let capture = normalized.capture;
            let _binding = signal.on_abort(move || {
                if let Some(target) = weak_target.upgrade() {
                    if let Err(err) = native.remove(&target, &event_type, &listener, capture) {
                        debug!("passthrough remove {event_type} on {} failed: {err}", target.id());
                    }
                }
            });
        }
    }
}

impl ListenerInterceptor for ListenerRegistry {
    fn add_event_listener(
        &self,
        target: &Node,
        event_type: &str,
        listener: &Listener,
        options: &ListenerOptions,
    ) {
        if self
            .inner
            .context
            .flags()
            .is_enabled(Feature::UnifiedEventWrapper)
        {
            self.subscribe(target, event_type, listener, options);
        } else {
            self.passthrough_add(target, event_type, listener, options);
        }
    }

    fn remove_event_listener(
        &self,
        target: &Node,
        event_type: &str,
        listener: &Listener,
        options: &ListenerOptions,
    ) {
        self.unsubscribe(target, event_type, listener, options);
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("targets", &self.target_count())
            .field("entries", &self.total_entries())
            .field("installed", &self.is_installed())
            .finish()
    }
}
