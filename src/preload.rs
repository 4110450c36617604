//! Asset preloading
//!
//! Tracks a set of outstanding asset fetches and shows a blocking overlay
//! while anything the presentation needs is still in flight. Completion is
//! edge-triggered: `done` fires when the last outstanding item resolves.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::json;
use tracing::{debug, error, warn};

use crate::bridge::{Bridge, RemoteHandle};
use crate::error::StageError;
use crate::events::Listeners;
use crate::proxy::Element;

/// Payload for preloader events (`load`, `error`, `done`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreloadEvent {
    Loaded(String),
    Failed(String),
    Done,
}

/// Asset fetch tracker with a blocking overlay.
pub struct Preloader {
    this: Weak<Preloader>,
    overlay: Arc<Element>,
    pending: Mutex<Vec<String>>,
    listeners: Listeners<PreloadEvent>,
}

impl Preloader {
    pub fn new(bridge: &Arc<Bridge>) -> Arc<Self> {
        let overlay = Element::new(bridge);
        overlay.add_class("stagePreloaderOverlay");

        let spinner = Element::new(bridge);
        spinner.add_class("stageSpinner");
        overlay.append(&spinner);

        let label = Element::new(bridge);
        label.add_class("stagePreloaderLabel");
        label.text("Loading...");
        overlay.append(&label);

        overlay.attach_to_handle(&RemoteHandle::root());
        overlay.hide();

        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            overlay,
            pending: Mutex::new(Vec::new()),
            listeners: Listeners::new(),
        })
    }

    pub fn listeners(&self) -> &Listeners<PreloadEvent> {
        &self.listeners
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Start fetching `url` and track it until the host reports back.
    pub fn add_item(&self, url: &str) {
        self.pending.lock().push(url.to_string());

        let loaded = {
            let weak = self.this.clone();
            let url = url.to_string();
            self.overlay
                .bridge()
                .register_once(move |_args| {
                    if let Some(preloader) = weak.upgrade() {
                        preloader.on_item_loaded(&url);
                    }
                })
        };
        let failed = {
            let weak = self.this.clone();
            let url = url.to_string();
            self.overlay
                .bridge()
                .register_once(move |_args| {
                    if let Some(preloader) = weak.upgrade() {
                        preloader.on_item_failed(&url);
                    }
                })
        };
        self.overlay.bridge().call(
            "Preload",
            "load",
            vec![json!(url), json!(loaded.as_str()), json!(failed.as_str())],
        );
    }

    /// Run `f` once every tracked item has resolved.
    ///
    /// With nothing outstanding `f` runs immediately; otherwise the overlay
    /// is shown until the last item lands.
    pub fn preload(&self, f: impl FnOnce() + Send + 'static) {
        if self.pending.lock().is_empty() {
            f();
            return;
        }
        self.overlay.show();

        let overlay = Arc::clone(&self.overlay);
        let mut action = Some(f);
        self.listeners.one("done", move |_ctx, _event| {
            overlay.hide();
            if let Some(f) = action.take() {
                f();
            }
        });
    }

    fn on_item_loaded(&self, url: &str) {
        if !self.settle(url) {
            // A host notification for something never requested (or already
            // settled) means the two sides disagree about the asset set.
            let err = StageError::DuplicateLoad(url.to_string());
            error!(%err, "load notification for an untracked asset");
            self.listeners
                .trigger("error", &PreloadEvent::Failed(url.to_string()));
            return;
        }
        debug!(url, remaining = self.pending_count(), "asset loaded");
        self.listeners
            .trigger("load", &PreloadEvent::Loaded(url.to_string()));
        self.check_done();
    }

    fn on_item_failed(&self, url: &str) {
        self.settle(url);
        warn!(url, "asset failed to load");
        self.listeners
            .trigger("error", &PreloadEvent::Failed(url.to_string()));
        // A failed asset no longer blocks the presentation.
        self.check_done();
    }

    fn settle(&self, url: &str) -> bool {
        let mut pending = self.pending.lock();
        match pending.iter().position(|p| p == url) {
            Some(index) => {
                pending.remove(index);
                true
            }
            None => false,
        }
    }

    fn check_done(&self) {
        if self.pending.lock().is_empty() {
            self.listeners.trigger("done", &PreloadEvent::Done);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{InboundMessage, OutboundCall};
    use crossbeam_channel::{unbounded, Receiver};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_bridge() -> (Arc<Bridge>, Receiver<OutboundCall>) {
        let (tx, rx) = unbounded();
        (Bridge::new(tx), rx)
    }

    fn deliver(bridge: &Arc<Bridge>, token: &str) {
        bridge
            .handle_inbound(InboundMessage::from_value(&json!(["return", token, []])).unwrap())
            .unwrap();
    }

    fn load_call(calls: &[OutboundCall], url: &str) -> OutboundCall {
        calls
            .iter()
            .find(|c| c.op == "load" && c.args[0] == json!(url))
            .unwrap()
            .clone()
    }

    #[test]
    fn preload_with_nothing_outstanding_runs_immediately() {
        let (bridge, rx) = test_bridge();
        let preloader = Preloader::new(&bridge);
        rx.try_iter().count();

        let ran = Arc::new(AtomicUsize::new(0));
        let flag = Arc::clone(&ran);
        preloader.preload(move || {
            flag.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(rx.try_iter().filter(|c| c.op == "show").count(), 0);
    }

    #[test]
    fn overlay_blocks_until_every_item_lands() {
        let (bridge, rx) = test_bridge();
        let preloader = Preloader::new(&bridge);
        preloader.add_item("a.jpg");
        preloader.add_item("b.mp3");
        let calls: Vec<OutboundCall> = rx.try_iter().collect();

        let ran = Arc::new(AtomicUsize::new(0));
        let flag = Arc::clone(&ran);
        preloader.preload(move || {
            flag.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(rx.try_iter().filter(|c| c.op == "show").count(), 1);

        deliver(&bridge, load_call(&calls, "a.jpg").args[1].as_str().unwrap());
        assert_eq!(ran.load(Ordering::SeqCst), 0);

        deliver(&bridge, load_call(&calls, "b.mp3").args[1].as_str().unwrap());
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(rx.try_iter().filter(|c| c.op == "hide").count(), 1);
        assert_eq!(preloader.pending_count(), 0);
    }

    #[test]
    fn failed_items_no_longer_block_completion() {
        let (bridge, rx) = test_bridge();
        let preloader = Preloader::new(&bridge);
        preloader.add_item("broken.jpg");
        let calls: Vec<OutboundCall> = rx.try_iter().collect();

        let errors = Arc::new(AtomicUsize::new(0));
        {
            let errors = Arc::clone(&errors);
            preloader.listeners().bind("error", move |_ctx, _event| {
                errors.fetch_add(1, Ordering::SeqCst);
            });
        }
        let ran = Arc::new(AtomicUsize::new(0));
        let flag = Arc::clone(&ran);
        preloader.preload(move || {
            flag.fetch_add(1, Ordering::SeqCst);
        });

        let error_token = load_call(&calls, "broken.jpg").args[2]
            .as_str()
            .unwrap()
            .to_string();
        deliver(&bridge, &error_token);
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn untracked_load_notification_is_an_error_event() {
        let (bridge, rx) = test_bridge();
        let preloader = Preloader::new(&bridge);
        preloader.add_item("a.jpg");
        let calls: Vec<OutboundCall> = rx.try_iter().collect();
        let token = load_call(&calls, "a.jpg").args[1]
            .as_str()
            .unwrap()
            .to_string();

        let errors = Arc::new(AtomicUsize::new(0));
        {
            let errors = Arc::clone(&errors);
            preloader.listeners().bind("error", move |_ctx, _event| {
                errors.fetch_add(1, Ordering::SeqCst);
            });
        }

        deliver(&bridge, &token);
        assert_eq!(errors.load(Ordering::SeqCst), 0);

        // A token can only fire once through the bridge; simulate the stale
        // path directly.
        preloader.on_item_loaded("a.jpg");
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }
}
