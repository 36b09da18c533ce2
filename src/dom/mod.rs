//! Platform model: event targets, the node tree and native listeners
//!
//! This is the surface the optimizer core sits on top of:
//! - Nodes with a native listener store
//! - Event dispatch with capture/target/bubble phases
//! - Cancellation tokens
//! - A document with mutation observers and page lifecycle events

mod abort;
mod document;
mod event;
mod node;

pub use abort::{AbortBinding, AbortController, AbortSignal};
pub use document::{
    Document, ListenerInit, ListenerInterceptor, ListenerOptions, MutationObserverHandle,
    MutationRecord, Visibility, WeakDocument,
};
pub use event::{dispatch, Event, EventPhase, Listener, ListenerFn, ListenerId};
pub use node::{NativeListener, NativeOptions, Node, NodeId, NodeKind, WeakNode};

use crate::utils::PlatformError;

/// The platform's original subscribe/unsubscribe entry points
#[cfg_attr(test, mockall::automock)]
pub trait NativeListeners {
    fn add(
        &self,
        target: &Node,
        event_type: &str,
        listener: &Listener,
        options: &NativeOptions,
    ) -> Result<(), PlatformError>;

    fn remove(
        &self,
        target: &Node,
        event_type: &str,
        listener: &Listener,
        capture: bool,
    ) -> Result<(), PlatformError>;
}

/// Forwards straight to each node's native listener store
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeListeners;

impl NativeListeners for NodeListeners {
    fn add(
        &self,
        target: &Node,
        event_type: &str,
        listener: &Listener,
        options: &NativeOptions,
    ) -> Result<(), PlatformError> {
        target.native_add_event_listener(event_type, listener, options)
    }

    fn remove(
        &self,
        target: &Node,
        event_type: &str,
        listener: &Listener,
        capture: bool,
    ) -> Result<(), PlatformError> {
        target.native_remove_event_listener(event_type, listener, capture)
    }
}
