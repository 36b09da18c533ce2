//! The document: tree mutation, mutation observers, page lifecycle and the
//! public listener entry points.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use log::debug;
use serde_json::Value;

use super::abort::AbortSignal;
use super::event::{dispatch, Event, Listener};
use super::node::{NativeOptions, Node, NodeKind};
use crate::utils::PlatformError;

/// Structured form of the listener options argument
#[derive(Debug, Clone, Default)]
pub struct ListenerInit {
    pub capture: Option<bool>,
    pub passive: Option<bool>,
    pub once: Option<bool>,
    pub signal: Option<AbortSignal>,
}

/// Raw third argument of `addEventListener`: absent, boolean shorthand or object
#[derive(Debug, Clone, Default)]
pub enum ListenerOptions {
    #[default]
    Absent,
    Capture(bool),
    Init(ListenerInit),
}

impl From<bool> for ListenerOptions {
    fn from(capture: bool) -> Self {
        Self::Capture(capture)
    }
}

impl From<ListenerInit> for ListenerOptions {
    fn from(init: ListenerInit) -> Self {
        Self::Init(init)
    }
}

impl From<&Value> for ListenerOptions {
    /// Loose conversion; fields of the wrong type fall back to defaults
    fn from(value: &Value) -> Self {
        match value {
            Value::Bool(capture) => Self::Capture(*capture),
            Value::Object(map) => Self::Init(ListenerInit {
                capture: map.get("capture").and_then(Value::as_bool),
                passive: map.get("passive").and_then(Value::as_bool),
                once: map.get("once").and_then(Value::as_bool),
                signal: None,
            }),
            _ => Self::Absent,
        }
    }
}

impl ListenerOptions {
    /// Capture flag as the platform reads it for removal
    pub fn capture(&self) -> bool {
        match self {
            Self::Absent => false,
            Self::Capture(capture) => *capture,
            Self::Init(init) => init.capture.unwrap_or(false),
        }
    }

    pub fn signal(&self) -> Option<&AbortSignal> {
        match self {
            Self::Init(init) => init.signal.as_ref(),
            _ => None,
        }
    }

    fn to_native(&self) -> NativeOptions {
        match self {
            Self::Absent => NativeOptions::default(),
            Self::Capture(capture) => NativeOptions {
                capture: *capture,
                ..Default::default()
            },
            Self::Init(init) => NativeOptions {
                capture: init.capture.unwrap_or(false),
                passive: init.passive,
                once: init.once.unwrap_or(false),
            },
        }
    }
}

/// Replacement for the document's listener entry points
pub trait ListenerInterceptor {
    fn add_event_listener(
        &self,
        target: &Node,
        event_type: &str,
        listener: &Listener,
        options: &ListenerOptions,
    );

    fn remove_event_listener(
        &self,
        target: &Node,
        event_type: &str,
        listener: &Listener,
        options: &ListenerOptions,
    );
}

/// One structural change under the document
#[derive(Debug, Clone)]
pub struct MutationRecord {
    pub target: Node,
    pub added_nodes: Vec<Node>,
    pub removed_nodes: Vec<Node>,
}

type MutationCallback = Rc<dyn Fn(&[MutationRecord])>;

struct ObserverSlot {
    id: u64,
    callback: MutationCallback,
    pending: Vec<MutationRecord>,
}

/// Page visibility state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

struct DocumentInner {
    window: Node,
    document: Node,
    document_element: Node,
    interceptor: RefCell<Option<Rc<dyn ListenerInterceptor>>>,
    observers: RefCell<Vec<ObserverSlot>>,
    next_observer: Cell<u64>,
    visibility: Cell<Visibility>,
}

/// Handle to the document
#[derive(Clone)]
pub struct Document {
    inner: Rc<DocumentInner>,
}

/// Non-owning document handle
#[derive(Clone)]
pub struct WeakDocument {
    inner: Weak<DocumentInner>,
}

/// Registration returned by [`Document::observe`]
pub struct MutationObserverHandle {
    document: WeakDocument,
    id: u64,
}

impl Document {
    /// Create a document with an `<html>` element attached
    pub fn new() -> Self {
        let document = Node::new(NodeKind::Document);
        let document_element = Node::element("html");
        document.attach_child(&document_element);
        Self {
            inner: Rc::new(DocumentInner {
                window: Node::new(NodeKind::Window),
                document,
                document_element,
                interceptor: RefCell::new(None),
                observers: RefCell::new(Vec::new()),
                next_observer: Cell::new(1),
                visibility: Cell::new(Visibility::Visible),
            }),
        }
    }

    pub fn window(&self) -> &Node {
        &self.inner.window
    }

    /// The document node (tree root)
    pub fn node(&self) -> &Node {
        &self.inner.document
    }

    /// The `<html>` element
    pub fn document_element(&self) -> &Node {
        &self.inner.document_element
    }

    pub fn downgrade(&self) -> WeakDocument {
        WeakDocument {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// True when `node` is the document node or one of its descendants
    pub fn contains(&self, node: &Node) -> bool {
        node.ptr_eq(&self.inner.document)
            || node
                .ancestors()
                .iter()
                .any(|ancestor| ancestor.ptr_eq(&self.inner.document))
    }

    /// Append `child` to `parent`, moving it out of its previous parent
    pub fn append_child(&self, parent: &Node, child: &Node) {
        if let Some(former) = child.parent() {
            self.remove_child(&former, child);
        }
        parent.attach_child(child);
        if self.contains(parent) {
            self.queue_record(MutationRecord {
                target: parent.clone(),
                added_nodes: vec![child.clone()],
                removed_nodes: Vec::new(),
            });
        }
    }

    /// Detach `child` from `parent`; ignored when `child` is not a child of `parent`
    pub fn remove_child(&self, parent: &Node, child: &Node) {
        let is_child = child.parent().is_some_and(|p| p.ptr_eq(parent));
        if !is_child {
            return;
        }
        let observed = self.contains(parent);
        child.detach_from_parent();
        if observed {
            self.queue_record(MutationRecord {
                target: parent.clone(),
                added_nodes: Vec::new(),
                removed_nodes: vec![child.clone()],
            });
        }
    }

    /// Detach `node` from wherever it sits
    pub fn remove(&self, node: &Node) {
        if let Some(parent) = node.parent() {
            self.remove_child(&parent, node);
        }
    }

    /// Register a subtree observer over the whole document
    pub fn observe(&self, callback: impl Fn(&[MutationRecord]) + 'static) -> MutationObserverHandle {
        let id = self.inner.next_observer.get();
        self.inner.next_observer.set(id + 1);
        self.inner.observers.borrow_mut().push(ObserverSlot {
            id,
            callback: Rc::new(callback),
            pending: Vec::new(),
        });
        MutationObserverHandle {
            document: self.downgrade(),
            id,
        }
    }

    pub fn observer_count(&self) -> usize {
        self.inner.observers.borrow().len()
    }

    /// Deliver queued records to each observer, in queue order.
    ///
    /// Returns the number of records delivered.
    pub fn deliver_mutation_records(&self) -> usize {
        let batches: Vec<(MutationCallback, Vec<MutationRecord>)> = self
            .inner
            .observers
            .borrow_mut()
            .iter_mut()
            .filter(|slot| !slot.pending.is_empty())
            .map(|slot| (Rc::clone(&slot.callback), std::mem::take(&mut slot.pending)))
            .collect();

        let mut delivered = 0;
        for (callback, records) in batches {
            delivered += records.len();
            callback(&records);
        }
        delivered
    }

    fn queue_record(&self, record: MutationRecord) {
        for slot in self.inner.observers.borrow_mut().iter_mut() {
            slot.pending.push(record.clone());
        }
    }

    /// Install (or clear) the listener interceptor, returning the previous one
    pub fn install_interceptor(
        &self,
        interceptor: Option<Rc<dyn ListenerInterceptor>>,
    ) -> Option<Rc<dyn ListenerInterceptor>> {
        self.inner.interceptor.replace(interceptor)
    }

    pub fn has_interceptor(&self) -> bool {
        self.inner.interceptor.borrow().is_some()
    }

    /// Public `addEventListener` entry point
    pub fn add_event_listener(
        &self,
        target: &Node,
        event_type: &str,
        listener: &Listener,
        options: impl Into<ListenerOptions>,
    ) {
        let options = options.into();
        let interceptor = self.inner.interceptor.borrow().clone();
        match interceptor {
            Some(interceptor) => interceptor.add_event_listener(target, event_type, listener, &options),
            None => {
                if let Err(err) = native_add(target, event_type, listener, &options) {
                    debug!("native addEventListener({event_type}) rejected: {err}");
                }
            }
        }
    }

    /// Public `removeEventListener` entry point
    pub fn remove_event_listener(
        &self,
        target: &Node,
        event_type: &str,
        listener: &Listener,
        options: impl Into<ListenerOptions>,
    ) {
        let options = options.into();
        let interceptor = self.inner.interceptor.borrow().clone();
        match interceptor {
            Some(interceptor) => {
                interceptor.remove_event_listener(target, event_type, listener, &options)
            }
            None => {
                if let Err(err) =
                    target.native_remove_event_listener(event_type, listener, options.capture())
                {
                    debug!("native removeEventListener({event_type}) rejected: {err}");
                }
            }
        }
    }

    /// Dispatch an event at `target`
    pub fn dispatch_event(&self, target: &Node, event: Event) -> Event {
        dispatch(target, event)
    }

    pub fn visibility(&self) -> Visibility {
        self.inner.visibility.get()
    }

    /// Change visibility and fire `visibilitychange` on the document node
    pub fn set_visibility(&self, visibility: Visibility) {
        if self.inner.visibility.replace(visibility) != visibility {
            dispatch(&self.inner.document, Event::new("visibilitychange"));
        }
    }

    /// Fire `pagehide` on the window
    pub fn page_hide(&self) {
        dispatch(&self.inner.window, Event::non_bubbling("pagehide"));
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl WeakDocument {
    pub fn upgrade(&self) -> Option<Document> {
        self.inner.upgrade().map(|inner| Document { inner })
    }
}

impl MutationObserverHandle {
    /// Stop observing; safe to call repeatedly
    pub fn disconnect(&self) {
        if let Some(document) = self.document.upgrade() {
            document
                .inner
                .observers
                .borrow_mut()
                .retain(|slot| slot.id != self.id);
        }
    }
}

/// Native add with browser signal semantics: an aborted signal adds nothing,
/// a live one removes the listener when it fires.
fn native_add(
    target: &Node,
    event_type: &str,
    listener: &Listener,
    options: &ListenerOptions,
) -> Result<(), PlatformError> {
    let signal = options.signal();
    if signal.is_some_and(AbortSignal::aborted) {
        return Ok(());
    }
    let native = options.to_native();
    target.native_add_event_listener(event_type, listener, &native)?;
    if let Some(signal) = signal {
        let weak = target.downgrade();
        let event_type = event_type.to_string();
        let listener = listener.clone();
        let _binding = signal.on_abort(move || {
            if let Some(target) = weak.upgrade() {
                if let Err(err) =
                    target.native_remove_event_listener(&event_type, &listener, native.capture)
                {
                    debug!("native abort removal of {event_type} rejected: {err}");
                }
            }
        });
    }
    Ok(())
}
