//! Optimizer bootstrap wiring all components to one document
//!
//! `Optimizer::install` runs the startup sequence:
//! 1. Seed feature flag defaults
//! 2. Install the listener registry (skipped entirely when
//!    `UNIFIED_EVENT_WRAPPER` is off)
//! 3. Install the detachment watcher when `LISTENER_CLEANUP` is on
//! 4. Pick up the realtime page marker
//! 5. Create the task batcher and its page lifecycle hooks
//!
//! Every step registers its reversal on the kill switch.

use std::rc::Rc;

use log::{debug, info};
use serde_json::Value;

use crate::context::realtime::{refresh_realtime, set_realtime};
use crate::context::{ConfigUpdate, EffectiveConfig, Feature, OptimizerConfig, RuntimeContext};
use crate::dom::Document;
use crate::events::{DetachmentWatcher, ListenerRegistry};
use crate::host::HostLoop;
use crate::scheduler::{run_isolated, BatchOptions, LifecycleHooks, TaskBatcher};
use crate::utils::Result;

/// The installed optimizer
pub struct Optimizer {
    document: Document,
    context: RuntimeContext,
    registry: Option<ListenerRegistry>,
    watcher: Option<DetachmentWatcher>,
    batcher: Option<TaskBatcher>,
}

impl Optimizer {
    /// Install every component on `document`
    pub fn install(
        document: &Document,
        host: Rc<dyn HostLoop>,
        context: RuntimeContext,
        config: OptimizerConfig,
    ) -> Self {
        context.flags().seed_defaults();
        let mut optimizer = Self {
            document: document.clone(),
            context: context.clone(),
            registry: None,
            watcher: None,
            batcher: None,
        };
        if !context.flags().is_enabled(Feature::UnifiedEventWrapper) {
            info!("event wrapper disabled, nothing installed");
            return optimizer;
        }
        let kill_switch = context.kill_switch();

        let registry = ListenerRegistry::new(context.clone(), config.registry.clone());
        registry.install(document);
        let handle = registry.clone();
        kill_switch.register("listener-registry", move || handle.teardown());

        if context.flags().is_enabled(Feature::ListenerCleanup) {
            let watcher = DetachmentWatcher::new(registry.clone(), context.clone());
            watcher.install(document);
            let handle = watcher.clone();
            kill_switch.register("detachment-watcher", move || handle.disconnect());
            optimizer.watcher = Some(watcher);
        }
        optimizer.registry = Some(registry);

        refresh_realtime(&context, document);

        let batcher = TaskBatcher::new(context.clone(), host, &config.scheduler);
        let handle = batcher.clone();
        kill_switch.register("task-batcher", move || {
            handle.batch_clear();
        });
        if config.scheduler.flush_on_page_hide {
            match LifecycleHooks::install(document, &batcher) {
                Ok(hooks) => kill_switch.register("lifecycle-hooks", move || hooks.remove()),
                Err(err) => debug!("lifecycle hooks not installed: {err}"),
            }
        }
        optimizer.batcher = Some(batcher);

        info!("optimizer installed");
        optimizer
    }

    /// Fire the kill switch, reverting everything `install` set up
    pub fn disable(&self) -> usize {
        self.context.kill_switch().disable()
    }

    pub fn is_disabled(&self) -> bool {
        self.context.kill_switch().is_disabled()
    }

    /// Apply a JSON override (`FEAT`, `FLAGS`, `DISABLE`)
    pub fn update(&self, json: &str) -> Result<()> {
        let update = ConfigUpdate::from_json(json)?;
        if let Some(on) = update.flags.realtime {
            set_realtime(&self.context, &self.document, on);
        }
        self.context.apply_update(&update);
        Ok(())
    }

    /// Apply a cross-context flag broadcast; false when the message is not one
    pub fn broadcast(&self, message: &Value) -> bool {
        self.context.flags().apply_broadcast(message)
    }

    pub fn set_realtime(&self, on: bool) {
        set_realtime(&self.context, &self.document, on);
    }

    /// Restore the native entry points and stop detachment cleanup.
    ///
    /// Subscriptions already forwarded stay in place.
    pub fn restore_events(&self) {
        if let Some(registry) = &self.registry {
            registry.teardown();
        }
        if let Some(watcher) = &self.watcher {
            watcher.disconnect();
        }
    }

    /// Queue DOM work on the batcher; runs immediately when none is installed
    pub fn batch(&self, task: impl FnOnce() + 'static, options: BatchOptions) {
        match &self.batcher {
            Some(batcher) => batcher.batch(task, options),
            None => {
                run_isolated(task);
            }
        }
    }

    pub fn registry(&self) -> Option<&ListenerRegistry> {
        self.registry.as_ref()
    }

    pub fn watcher(&self) -> Option<&DetachmentWatcher> {
        self.watcher.as_ref()
    }

    pub fn batcher(&self) -> Option<&TaskBatcher> {
        self.batcher.as_ref()
    }

    pub fn context(&self) -> &RuntimeContext {
        &self.context
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn effective_config(&self) -> EffectiveConfig {
        self.context.effective_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::realtime::REALTIME_CLASS;
    use crate::dom::{Listener, Node};
    use crate::host::TokioHost;
    use serde_json::json;
    use std::cell::Cell;

    fn install(context: RuntimeContext) -> (Document, Optimizer) {
        let document = Document::new();
        let optimizer = Optimizer::install(
            &document,
            Rc::new(TokioHost::new()),
            context,
            OptimizerConfig::default(),
        );
        (document, optimizer)
    }

    #[test]
    fn test_install_wires_components() {
        let (document, optimizer) = install(RuntimeContext::new());
        assert!(document.has_interceptor());
        assert_eq!(document.observer_count(), 1);
        assert!(optimizer.registry().is_some());
        assert!(optimizer.watcher().is_some());
        assert!(optimizer.batcher().is_some());
        assert_eq!(optimizer.context().kill_switch().pending(), 4);
    }

    #[test]
    fn test_wrapper_off_installs_nothing() {
        let context = RuntimeContext::new();
        context.flags().set_feature(Feature::UnifiedEventWrapper, false);
        let (document, optimizer) = install(context);
        assert!(!document.has_interceptor());
        assert!(optimizer.registry().is_none());
        assert!(optimizer.batcher().is_none());

        let ran = Rc::new(Cell::new(false));
        let flag = Rc::clone(&ran);
        optimizer.batch(move || flag.set(true), BatchOptions::default());
        assert!(ran.get());
    }

    #[test]
    fn test_unbatched_panicking_task_is_swallowed() {
        let context = RuntimeContext::new();
        context.flags().set_feature(Feature::UnifiedEventWrapper, false);
        let (_document, optimizer) = install(context);

        let result: std::thread::Result<()> =
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                optimizer.batch(|| panic!("bad page task"), BatchOptions::default());
            }));
        assert!(result.is_ok());
    }

    #[test]
    fn test_cleanup_off_skips_watcher() {
        let context = RuntimeContext::new();
        context.flags().set_feature(Feature::ListenerCleanup, false);
        let (document, optimizer) = install(context);
        assert!(optimizer.watcher().is_none());
        assert_eq!(document.observer_count(), 0);
    }

    #[test]
    fn test_disable_reverts_everything() {
        let (document, optimizer) = install(RuntimeContext::new());
        let ran = Rc::new(Cell::new(false));
        let flag = Rc::clone(&ran);
        optimizer.batch(move || flag.set(true), BatchOptions::default());

        assert_eq!(optimizer.disable(), 4);
        assert!(optimizer.is_disabled());
        assert!(!document.has_interceptor());
        assert_eq!(document.observer_count(), 0);
        assert_eq!(document.window().native_listener_count(), 0);
        assert!(optimizer.batcher().is_some_and(TaskBatcher::is_empty));

        document.page_hide();
        assert!(!ran.get());
        assert_eq!(optimizer.disable(), 0);
    }

    #[test]
    fn test_update_applies_overrides() {
        let (document, optimizer) = install(RuntimeContext::new());
        optimizer
            .update(r#"{"FEAT":{"DEDUP_EVENT_LISTENERS":false},"FLAGS":{"REALTIME":true}}"#)
            .unwrap();
        assert!(!optimizer
            .context()
            .flags()
            .is_enabled(Feature::DedupEventListeners));
        assert!(optimizer.context().is_realtime());
        assert!(document.document_element().has_class(REALTIME_CLASS));

        assert!(optimizer.update("not json").is_err());
        optimizer.update(r#"{"DISABLE":true}"#).unwrap();
        assert!(optimizer.is_disabled());
    }

    #[test]
    fn test_realtime_marker_picked_up_at_install() {
        let document = Document::new();
        document.document_element().toggle_class(REALTIME_CLASS, true);
        let context = RuntimeContext::new();
        let _optimizer = Optimizer::install(
            &document,
            Rc::new(TokioHost::new()),
            context.clone(),
            OptimizerConfig::default(),
        );
        assert!(context.is_realtime());
    }

    #[test]
    fn test_broadcast_and_restore_events() {
        let (document, optimizer) = install(RuntimeContext::new());
        assert!(optimizer.broadcast(&json!({"type": "ufo:feat", "feat": {"PASSIVE_LISTENERS": false}})));
        assert!(!optimizer.broadcast(&json!({"type": "other"})));
        assert!(!optimizer
            .context()
            .flags()
            .is_enabled(Feature::PassiveListeners));

        optimizer.restore_events();
        assert!(!document.has_interceptor());
        let node = Node::element("div");
        document.add_event_listener(&node, "click", &Listener::new(|_| {}), false);
        assert_eq!(optimizer.registry().map_or(0, ListenerRegistry::total_entries), 0);
        assert_eq!(node.native_listener_count(), 1);
    }
}
