//! UFO - page optimizer demo
//!
//! Installs the optimizer on an in-process document and walks through the
//! listener and batching flows, logging what happens.

use std::cell::Cell;
use std::env;
use std::rc::Rc;
use std::time::Duration;

use ufo_core::dom::{Document, Listener, ListenerInit, ListenerOptions, Node, Visibility};
use ufo_core::host::TokioHost;
use ufo_core::{BatchOptions, Optimizer, OptimizerConfig, RuntimeContext, NAME, VERSION};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    let overrides = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1));

    println!("{} v{} - listener lifecycle demo", NAME, VERSION);

    let host = Rc::new(TokioHost::new());
    let document = Document::new();
    let optimizer = Optimizer::install(
        &document,
        host.clone(),
        RuntimeContext::new(),
        OptimizerConfig::default(),
    );
    if let Some(json) = overrides {
        if let Err(err) = optimizer.update(json) {
            eprintln!("ignoring override: {}", err);
        }
    }

    let panel = Node::element("div");
    let item = Node::element("li");
    document.append_child(document.document_element(), &panel);
    document.append_child(&panel, &item);

    let on_scroll = Listener::named("onScroll", |_| {});
    document.add_event_listener(&panel, "scroll", &on_scroll, ListenerOptions::Absent);
    document.add_event_listener(
        &panel,
        "scroll",
        &on_scroll,
        ListenerInit {
            passive: Some(true),
            ..Default::default()
        },
    );
    document.add_event_listener(&item, "click", &Listener::named("onClick", |_| {}), true);

    if let Some(registry) = optimizer.registry() {
        match serde_json::to_string_pretty(&registry.entries_for(&panel)) {
            Ok(json) => println!("panel listeners: {}", json),
            Err(err) => eprintln!("cannot render entries: {}", err),
        }
        println!("native listeners on panel: {}", panel.native_listener_count());
    }

    document.remove(&panel);
    document.deliver_mutation_records();
    println!(
        "after detach: {} registry entries, {} native listeners on item",
        optimizer.registry().map_or(0, |r| r.total_entries()),
        item.native_listener_count()
    );

    let flushed = Rc::new(Cell::new(0));
    for _ in 0..3 {
        let flushed = Rc::clone(&flushed);
        optimizer.batch(move || flushed.set(flushed.get() + 1), BatchOptions::default());
    }
    host.run_until(tokio::time::sleep(Duration::from_millis(10)))
        .await;
    println!("batched tasks run: {}", flushed.get());

    document.set_visibility(Visibility::Hidden);
    match serde_json::to_string(&optimizer.effective_config()) {
        Ok(json) => println!("effective config: {}", json),
        Err(err) => eprintln!("cannot render config: {}", err),
    }

    let cleanups = optimizer.disable();
    println!("disabled, {} cleanups ran", cleanups);
}
