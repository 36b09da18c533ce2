//! Page lifecycle hooks: flush pending work before the page goes away

use log::{debug, trace};

use super::batch::TaskBatcher;
use crate::dom::{Document, Listener, NativeOptions, Visibility, WeakDocument};
use crate::utils::Result;

/// Native listeners that force a flush on `visibilitychange` (hidden) and
/// `pagehide`.
///
/// They are registered straight on the native store so they never show up
/// in the listener registry.
pub struct LifecycleHooks {
    document: WeakDocument,
    visibility: Listener,
    page_hide: Listener,
}

impl LifecycleHooks {
    pub fn install(document: &Document, batcher: &TaskBatcher) -> Result<Self> {
        let weak_document = document.downgrade();
        let weak_batcher = batcher.downgrade();
        let visibility = Listener::named("ufo:flush-on-hidden", move |_| {
            let hidden = weak_document
                .upgrade()
                .is_some_and(|document| document.visibility() == Visibility::Hidden);
            if !hidden {
                return;
            }
            if let Some(batcher) = weak_batcher.upgrade() {
                let flushed = batcher.flush();
                trace!("page hidden, flushed {flushed} tasks");
            }
        });

        let weak_batcher = batcher.downgrade();
        let page_hide = Listener::named("ufo:flush-on-pagehide", move |_| {
            if let Some(batcher) = weak_batcher.upgrade() {
                let flushed = batcher.flush();
                trace!("pagehide, flushed {flushed} tasks");
            }
        });

        document.node().native_add_event_listener(
            "visibilitychange",
            &visibility,
            &NativeOptions::default(),
        )?;
        document
            .window()
            .native_add_event_listener("pagehide", &page_hide, &NativeOptions::default())?;
        debug!("lifecycle flush hooks installed");

        Ok(Self {
            document: document.downgrade(),
            visibility,
            page_hide,
        })
    }

    /// Unregister both hooks
    pub fn remove(self) {
        let Some(document) = self.document.upgrade() else {
            return;
        };
        if let Err(err) = document.node().native_remove_event_listener(
            "visibilitychange",
            &self.visibility,
            false,
        ) {
            debug!("visibilitychange hook not removed: {err}");
        }
        if let Err(err) =
            document
                .window()
                .native_remove_event_listener("pagehide", &self.page_hide, false)
        {
            debug!("pagehide hook not removed: {err}");
        }
        debug!("lifecycle flush hooks removed");
    }
}
