//! Bubble queue
//!
//! Transient message and prompt cards stacked in a queue element. Bubbles
//! flow in document order inside the queue, so the queue only assigns width;
//! the host stacks them vertically. Dismissal is policy-driven through queue
//! events rather than direct parent-child calls.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::bridge::Bridge;
use crate::events::Listeners;
use crate::proxy::{AnimateOptions, Element, Layoutable};
use crate::slides::config::{ButtonAction, ButtonSpec};
use crate::slides::SlideManager;

const ENTRY_OFFSET_PX: f64 = 30.0;
const ANIMATION_MS: u64 = 300;

/// What a bubble presents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BubbleKind {
    Text,
    Prompt,
}

/// When a bubble dismisses itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoClose {
    /// Close when the queue's page changes.
    #[default]
    Page,
    /// Close whenever any new bubble arrives.
    All,
    /// Close when a new text bubble arrives.
    Text,
    /// Never close automatically.
    #[serde(rename = "none")]
    Never,
}

/// Presentation options shared by every bubble shape.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct BubbleStyle {
    #[serde(default, rename = "autoClose")]
    pub auto_close: AutoClose,
    #[serde(default = "default_animate", rename = "anim")]
    pub animate: bool,
}

fn default_animate() -> bool {
    true
}

impl Default for BubbleStyle {
    fn default() -> Self {
        Self {
            auto_close: AutoClose::default(),
            animate: true,
        }
    }
}

/// Payload for queue events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueEvent {
    PageChange,
    BubbleAdded(BubbleKind),
}

/// Vertical stack of bubbles.
pub struct BubbleQueue {
    el: Arc<Element>,
    bubbles: Mutex<Vec<Arc<Bubble>>>,
    listeners: Listeners<QueueEvent>,
}

impl BubbleQueue {
    pub fn new(bridge: &Arc<Bridge>) -> Arc<Self> {
        let el = Element::new(bridge);
        el.add_class("stageBubbleQueue");
        Arc::new(Self {
            el,
            bubbles: Mutex::new(Vec::new()),
            listeners: Listeners::new(),
        })
    }

    pub fn listeners(&self) -> &Listeners<QueueEvent> {
        &self.listeners
    }

    /// Bubbles currently held, including ones mid-exit.
    pub fn bubble_count(&self) -> usize {
        self.bubbles.lock().len()
    }

    /// Append a bubble to the queue.
    ///
    /// Existing bubbles see the arrival first; the newcomer subscribes to
    /// queue events only afterwards, so it cannot dismiss itself.
    pub fn add_bubble(self: &Arc<Self>, bubble: Arc<Bubble>) {
        debug!(kind = ?bubble.kind(), "bubble added");
        self.bubbles.lock().push(Arc::clone(&bubble));
        self.el.append(bubble.element());
        self.listeners
            .trigger("bubbleAdded", &QueueEvent::BubbleAdded(bubble.kind()));
        Bubble::register_queue(&bubble, self);
    }

    /// Announce a page change to every subscribed bubble.
    pub fn page_change(&self) {
        self.listeners.trigger("pageChange", &QueueEvent::PageChange);
        self.bubbles.lock().retain(|b| !b.is_closed());
    }
}

impl Layoutable for BubbleQueue {
    fn element(&self) -> &Element {
        &self.el
    }

    /// The queue takes its assigned width; bubble heights are host-flowed.
    fn apply_layout(&self) {
        let Some(rect) = self.el.bounds() else { return };
        self.el.set_width(rect.width);
    }
}

/// One card in a [`BubbleQueue`].
pub struct Bubble {
    el: Arc<Element>,
    kind: BubbleKind,
    style: BubbleStyle,
    closed: AtomicBool,
}

impl Bubble {
    /// A text message card.
    pub fn text(bridge: &Arc<Bridge>, text: &str, style: BubbleStyle) -> Arc<Self> {
        let el = Element::new(bridge);
        el.add_class("stageTextBubble");
        el.text(text);
        Self::finish(el, BubbleKind::Text, style)
    }

    /// A prompt card with one button per spec.
    ///
    /// Goto buttons navigate through the manager; if the manager is gone the
    /// click is logged and dropped.
    pub fn prompt(
        bridge: &Arc<Bridge>,
        buttons: &[ButtonSpec],
        manager: Weak<SlideManager>,
        style: BubbleStyle,
    ) -> Arc<Self> {
        let el = Element::new(bridge);
        el.add_class("stagePromptBubble");

        for spec in buttons {
            let button = Element::new(bridge);
            button.add_class("stageButton");
            button.add_class(&spec.color);
            button.add_class(&spec.size);
            button.text(&spec.label);

            let action = spec.action.clone();
            let manager = manager.clone();
            button.on_click(move || match &action {
                ButtonAction::Goto(slide) => {
                    let Some(manager) = manager.upgrade() else {
                        warn!(slide = %slide, "button click after manager teardown");
                        return;
                    };
                    if let Err(err) = manager.go(slide) {
                        warn!(%err, "button navigation failed");
                    }
                }
                ButtonAction::Handler(f) => f(),
            });
            el.append(&button);
        }
        Self::finish(el, BubbleKind::Prompt, style)
    }

    fn finish(el: Arc<Element>, kind: BubbleKind, style: BubbleStyle) -> Arc<Self> {
        if style.animate {
            el.css("margin-top", format!("{ENTRY_OFFSET_PX}px"));
            el.css("opacity", 0);
            el.animate(
                json!({"margin-top": "0px", "opacity": 1}),
                AnimateOptions::duration(ANIMATION_MS).easing("easeOutQuad"),
            );
        }
        Arc::new(Self {
            el,
            kind,
            style,
            closed: AtomicBool::new(false),
        })
    }

    pub fn kind(&self) -> BubbleKind {
        self.kind
    }

    pub fn element(&self) -> &Element {
        &self.el
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Subscribe a bubble to its queue's dismissal events, per its policy.
    fn register_queue(bubble: &Arc<Bubble>, queue: &Arc<BubbleQueue>) {
        match bubble.style.auto_close {
            AutoClose::Page => {
                let weak = Arc::downgrade(bubble);
                queue.listeners().bind("pageChange", move |_ctx, _event| {
                    if let Some(bubble) = weak.upgrade() {
                        bubble.close();
                    }
                });
            }
            AutoClose::All | AutoClose::Text | AutoClose::Never => {}
        }
        match bubble.style.auto_close {
            AutoClose::All => {
                let weak = Arc::downgrade(bubble);
                queue.listeners().bind("bubbleAdded", move |_ctx, _event| {
                    if let Some(bubble) = weak.upgrade() {
                        bubble.close();
                    }
                });
            }
            AutoClose::Text => {
                let weak = Arc::downgrade(bubble);
                queue.listeners().bind("bubbleAdded", move |_ctx, event| {
                    if *event != QueueEvent::BubbleAdded(BubbleKind::Text) {
                        return;
                    }
                    if let Some(bubble) = weak.upgrade() {
                        bubble.close();
                    }
                });
            }
            AutoClose::Page | AutoClose::Never => {}
        }
    }

    /// Dismiss the bubble. Safe to call any number of times; the exit runs
    /// once.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.style.animate {
            let el = Arc::clone(&self.el);
            self.el.outer_height(true, move |height| {
                let target = Arc::clone(&el);
                el.animate(
                    json!({"margin-top": format!("-{height}px"), "opacity": 0}),
                    AnimateOptions::duration(ANIMATION_MS)
                        .easing("easeOutQuad")
                        .on_complete(move || target.remove()),
                );
            });
        } else {
            self.el.remove();
        }
    }
}
