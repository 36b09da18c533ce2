//! Tree nodes and their native listener store

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use super::event::Listener;
use crate::utils::PlatformError;

/// Stable identity of a node, never reused within a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl NodeId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Kinds of nodes the platform model knows about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// The global `window` target (not part of the tree)
    Window,
    /// Document root
    Document,
    /// Element node (e.g., <div>)
    Element(String),
    /// Text node
    Text(String),
}

/// Options understood by the native listener store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NativeOptions {
    pub capture: bool,
    pub passive: Option<bool>,
    pub once: bool,
}

/// A platform-level subscription held by a node
#[derive(Clone)]
pub struct NativeListener {
    pub event_type: String,
    pub listener: Listener,
    pub capture: bool,
    pub passive: bool,
    pub once: bool,
}

impl fmt::Debug for NativeListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeListener")
            .field("event_type", &self.event_type)
            .field("listener", &self.listener.id())
            .field("capture", &self.capture)
            .field("passive", &self.passive)
            .field("once", &self.once)
            .finish()
    }
}

pub(crate) struct NodeData {
    id: NodeId,
    kind: NodeKind,
    classes: RefCell<Vec<String>>,
    parent: RefCell<Weak<NodeData>>,
    children: RefCell<Vec<Node>>,
    listeners: RefCell<Vec<NativeListener>>,
    disposed: Cell<bool>,
}

/// Owning handle to a node
#[derive(Clone)]
pub struct Node(Rc<NodeData>);

/// Non-owning handle to a node
#[derive(Clone)]
pub struct WeakNode {
    id: NodeId,
    inner: Weak<NodeData>,
}

impl Node {
    /// Create a new node
    pub fn new(kind: NodeKind) -> Self {
        Self(Rc::new(NodeData {
            id: NodeId::next(),
            kind,
            classes: RefCell::new(Vec::new()),
            parent: RefCell::new(Weak::new()),
            children: RefCell::new(Vec::new()),
            listeners: RefCell::new(Vec::new()),
            disposed: Cell::new(false),
        }))
    }

    /// Create an element node
    pub fn element(tag_name: impl Into<String>) -> Self {
        Self::new(NodeKind::Element(tag_name.into()))
    }

    /// Create a text node
    pub fn text(content: impl Into<String>) -> Self {
        Self::new(NodeKind::Text(content.into()))
    }

    pub fn id(&self) -> NodeId {
        self.0.id
    }

    pub fn kind(&self) -> &NodeKind {
        &self.0.kind
    }

    /// Tag name for elements, `None` otherwise
    pub fn tag_name(&self) -> Option<&str> {
        match &self.0.kind {
            NodeKind::Element(tag) => Some(tag),
            _ => None,
        }
    }

    pub fn downgrade(&self) -> WeakNode {
        WeakNode {
            id: self.0.id,
            inner: Rc::downgrade(&self.0),
        }
    }

    pub fn ptr_eq(&self, other: &Node) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn parent(&self) -> Option<Node> {
        self.0.parent.borrow().upgrade().map(Node)
    }

    /// Snapshot of the child list
    pub fn children(&self) -> Vec<Node> {
        self.0.children.borrow().clone()
    }

    pub fn child_count(&self) -> usize {
        self.0.children.borrow().len()
    }

    /// Ancestors from the parent up to the root
    pub fn ancestors(&self) -> Vec<Node> {
        let mut out = Vec::new();
        let mut current = self.parent();
        while let Some(node) = current {
            current = node.parent();
            out.push(node);
        }
        out
    }

    pub fn has_class(&self, name: &str) -> bool {
        self.0.classes.borrow().iter().any(|c| c == name)
    }

    /// Add or remove a class
    pub fn toggle_class(&self, name: &str, on: bool) {
        let mut classes = self.0.classes.borrow_mut();
        let present = classes.iter().position(|c| c == name);
        match (present, on) {
            (None, true) => classes.push(name.to_string()),
            (Some(idx), false) => {
                classes.remove(idx);
            }
            _ => {}
        }
    }

    /// Mark the node as torn down; the native store rejects further calls
    pub fn dispose(&self) {
        self.0.disposed.set(true);
        self.0.listeners.borrow_mut().clear();
    }

    pub fn is_disposed(&self) -> bool {
        self.0.disposed.get()
    }

    pub(crate) fn attach_child(&self, child: &Node) {
        child.detach_from_parent();
        *child.0.parent.borrow_mut() = Rc::downgrade(&self.0);
        self.0.children.borrow_mut().push(child.clone());
    }

    /// Unlink from the current parent; returns the former parent
    pub(crate) fn detach_from_parent(&self) -> Option<Node> {
        let parent = self.parent()?;
        parent
            .0
            .children
            .borrow_mut()
            .retain(|c| !Rc::ptr_eq(&c.0, &self.0));
        *self.0.parent.borrow_mut() = Weak::new();
        Some(parent)
    }

    /// Native `addEventListener`: a repeated `(type, listener, capture)` is a no-op
    pub fn native_add_event_listener(
        &self,
        event_type: &str,
        listener: &Listener,
        options: &NativeOptions,
    ) -> Result<(), PlatformError> {
        self.check_accepts(event_type)?;
        let mut listeners = self.0.listeners.borrow_mut();
        let exists = listeners.iter().any(|l| {
            l.event_type == event_type && l.capture == options.capture && l.listener.same_as(listener)
        });
        if !exists {
            listeners.push(NativeListener {
                event_type: event_type.to_string(),
                listener: listener.clone(),
                capture: options.capture,
                passive: options.passive.unwrap_or(false),
                once: options.once,
            });
        }
        Ok(())
    }

    /// Native `removeEventListener`, matching on `(type, listener, capture)`
    pub fn native_remove_event_listener(
        &self,
        event_type: &str,
        listener: &Listener,
        capture: bool,
    ) -> Result<(), PlatformError> {
        self.check_accepts(event_type)?;
        self.0.listeners.borrow_mut().retain(|l| {
            !(l.event_type == event_type && l.capture == capture && l.listener.same_as(listener))
        });
        Ok(())
    }

    pub fn native_listener_count(&self) -> usize {
        self.0.listeners.borrow().len()
    }

    /// Snapshot of native listeners for one event type
    pub fn native_listeners(&self, event_type: &str) -> Vec<NativeListener> {
        self.0
            .listeners
            .borrow()
            .iter()
            .filter(|l| l.event_type == event_type)
            .cloned()
            .collect()
    }

    pub(crate) fn has_native_listener(&self, native: &NativeListener) -> bool {
        self.0.listeners.borrow().iter().any(|l| {
            l.event_type == native.event_type
                && l.capture == native.capture
                && l.listener.same_as(&native.listener)
        })
    }

    fn check_accepts(&self, event_type: &str) -> Result<(), PlatformError> {
        if self.is_disposed() {
            return Err(PlatformError::Disposed(self.0.id.0));
        }
        if event_type.is_empty() {
            return Err(PlatformError::InvalidEventType(event_type.to_string()));
        }
        Ok(())
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.0.id)
            .field("kind", &self.0.kind)
            .field("children", &self.child_count())
            .finish()
    }
}

impl WeakNode {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn upgrade(&self) -> Option<Node> {
        self.inner.upgrade().map(Node)
    }

    /// True once every owning handle is gone
    pub fn is_dead(&self) -> bool {
        self.inner.strong_count() == 0
    }
}

impl fmt::Debug for WeakNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WeakNode({})", self.id)
    }
}
