//! Events, listeners and dispatch over the node tree
//!
//! Dispatch follows the three browser phases: capture listeners on the
//! ancestors (root first), listeners on the target itself, then bubble
//! listeners on the ancestors (parent first).

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::node::{NativeListener, Node};

/// Reference identity of a listener; clones of a [`Listener`] share it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

impl ListenerId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{}", self.0)
    }
}

/// Event handler callback type
pub type ListenerFn = dyn Fn(&mut Event);

/// A handler with a stable identity tag.
///
/// Two listeners built from structurally identical closures are distinct;
/// only clones of the same `Listener` compare equal.
#[derive(Clone)]
pub struct Listener {
    id: ListenerId,
    callback: Rc<ListenerFn>,
    description: Rc<str>,
}

impl Listener {
    /// Wrap a closure; the description defaults to its type name
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&mut Event) + 'static,
    {
        Self::named(std::any::type_name::<F>(), callback)
    }

    /// Wrap a closure with an explicit description
    pub fn named<F>(description: impl Into<String>, callback: F) -> Self
    where
        F: Fn(&mut Event) + 'static,
    {
        Self {
            id: ListenerId::next(),
            callback: Rc::new(callback),
            description: description.into().into(),
        }
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn same_as(&self, other: &Listener) -> bool {
        self.id == other.id
    }

    pub fn call(&self, event: &mut Event) {
        (self.callback)(event)
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("id", &self.id)
            .field("description", &self.description)
            .finish()
    }
}

/// Dispatch phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventPhase {
    None,
    Capturing,
    AtTarget,
    Bubbling,
}

/// A dispatched event
#[derive(Debug)]
pub struct Event {
    event_type: String,
    target: Option<Node>,
    current_target: Option<Node>,
    phase: EventPhase,
    bubbles: bool,
    cancelable: bool,
    default_prevented: bool,
    propagation_stopped: bool,
    in_passive_listener: bool,
}

impl Event {
    /// Create a bubbling, cancelable event
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            target: None,
            current_target: None,
            phase: EventPhase::None,
            bubbles: true,
            cancelable: true,
            default_prevented: false,
            propagation_stopped: false,
            in_passive_listener: false,
        }
    }

    /// Create an event that only reaches listeners on its target
    pub fn non_bubbling(event_type: impl Into<String>) -> Self {
        Self {
            bubbles: false,
            ..Self::new(event_type)
        }
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn target(&self) -> Option<&Node> {
        self.target.as_ref()
    }

    /// The node whose listener is currently running (the `this` binding)
    pub fn current_target(&self) -> Option<&Node> {
        self.current_target.as_ref()
    }

    pub fn phase(&self) -> EventPhase {
        self.phase
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented
    }

    /// Prevent the default action; ignored inside passive listeners
    pub fn prevent_default(&mut self) {
        if self.cancelable && !self.in_passive_listener {
            self.default_prevented = true;
        }
    }

    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }
}

/// Dispatch `event` at `target` and return it once every phase has run
pub fn dispatch(target: &Node, mut event: Event) -> Event {
    event.target = Some(target.clone());
    let ancestors = target.ancestors();

    event.phase = EventPhase::Capturing;
    for node in ancestors.iter().rev() {
        if event.propagation_stopped {
            break;
        }
        invoke(node, &mut event, Some(true));
    }

    if !event.propagation_stopped {
        event.phase = EventPhase::AtTarget;
        invoke(target, &mut event, None);
    }

    if event.bubbles {
        event.phase = EventPhase::Bubbling;
        for node in &ancestors {
            if event.propagation_stopped {
                break;
            }
            invoke(node, &mut event, Some(false));
        }
    }

    event.phase = EventPhase::None;
    event.current_target = None;
    event
}

fn invoke(node: &Node, event: &mut Event, capture: Option<bool>) {
    let snapshot: Vec<NativeListener> = node
        .native_listeners(&event.event_type)
        .into_iter()
        .filter(|l| capture.is_none_or(|c| l.capture == c))
        .collect();

    event.current_target = Some(node.clone());
    for native in snapshot {
        // Removed by an earlier listener in this same pass.
        if !node.has_native_listener(&native) {
            continue;
        }
        if native.once {
            let _ = node.native_remove_event_listener(
                &native.event_type,
                &native.listener,
                native.capture,
            );
        }
        event.in_passive_listener = native.passive;
        native.listener.call(event);
        event.in_passive_listener = false;
    }
}
