//! Layout engine and container hierarchy
//!
//! Layout is push-based: the root viewport learns its size from host resize
//! events, caches it, and fans geometry out through the tree. Containers
//! re-run their own layout pass whenever membership changes so new or
//! remaining children receive correct geometry without waiting for the next
//! resize.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tracing::debug;

use crate::bridge::{Bridge, RemoteHandle};
use crate::proxy::{rect_from_value, Element, Layoutable, Rect};

/// Maximum sidebar width in host units.
pub const SIDEBAR_MAX_WIDTH: f64 = 200.0;

/// A node that holds child proxies and distributes geometry to them.
pub trait Container: Layoutable {
    /// Add a child, attach it on the host, and re-run this container's
    /// layout pass.
    fn add_child(&self, child: Arc<dyn Layoutable>);

    /// Remove a child from iteration order and issue its host-side removal.
    /// Other children are unaffected.
    fn remove_child(&self, child: &dyn Layoutable);
}

/// Shared membership behavior for the concrete containers.
struct Children {
    items: Mutex<Vec<Arc<dyn Layoutable>>>,
}

impl Children {
    fn new() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
        }
    }

    fn insert(&self, owner: &Element, child: Arc<dyn Layoutable>) {
        owner.append(child.element());
        self.items.lock().push(child);
    }

    fn detach(&self, child: &dyn Layoutable) {
        let handle = child.element().handle().clone();
        self.items
            .lock()
            .retain(|c| c.element().handle() != &handle);
        child.element().remove();
    }

    fn snapshot(&self) -> Vec<Arc<dyn Layoutable>> {
        self.items.lock().clone()
    }
}

/// Generic container: positions itself from its cached rectangle and assigns
/// that same rectangle to every direct child.
pub struct StandardContainer {
    el: Arc<Element>,
    children: Children,
}

impl StandardContainer {
    pub fn new(bridge: &Arc<Bridge>) -> Arc<Self> {
        Arc::new(Self {
            el: Element::new(bridge),
            children: Children::new(),
        })
    }

    /// Children in insertion order.
    pub fn children(&self) -> Vec<Arc<dyn Layoutable>> {
        self.children.snapshot()
    }
}

impl Layoutable for StandardContainer {
    fn element(&self) -> &Element {
        &self.el
    }

    fn apply_layout(&self) {
        self.el.push_absolute_layout();
        let Some(rect) = self.el.bounds() else { return };
        for child in self.children.snapshot() {
            child.element().set_bounds(rect);
            child.apply_layout();
        }
    }
}

impl Container for StandardContainer {
    fn add_child(&self, child: Arc<dyn Layoutable>) {
        self.children.insert(&self.el, child);
        self.apply_layout();
    }

    fn remove_child(&self, child: &dyn Layoutable) {
        self.children.detach(child);
        self.apply_layout();
    }
}

/// Root container wrapping the host's root element.
///
/// Subscribes to host resize events (a standing callback plus an immediate
/// size query at construction) and fans its full rectangle out to every
/// direct child. Construct one explicitly and pass it to whoever needs it.
pub struct Viewport {
    el: Arc<Element>,
    children: Children,
}

impl Viewport {
    pub fn new(bridge: &Arc<Bridge>) -> Arc<Self> {
        let viewport = Arc::new(Self {
            el: Element::from_handle(bridge, RemoteHandle::root()),
            children: Children::new(),
        });

        let token = bridge.register_callback(resize_handler(&viewport));
        viewport.el.track_token(token.clone());
        bridge.call("Window", "addResizeHandler", vec![json!(token.as_str())]);
        bridge.call_with_reply("Window", "getSize", vec![], resize_handler(&viewport));

        viewport
    }

    /// Children in insertion order.
    pub fn children(&self) -> Vec<Arc<dyn Layoutable>> {
        self.children.snapshot()
    }

    fn on_resize(&self, rect: Rect) {
        debug!(width = rect.width, height = rect.height, "viewport resized");
        self.el.set_bounds(rect);
        self.apply_layout();
    }
}

fn resize_handler(viewport: &Arc<Viewport>) -> impl FnMut(&[Value]) + Send + 'static {
    let weak = Arc::downgrade(viewport);
    move |args: &[Value]| {
        let Some(viewport) = weak.upgrade() else { return };
        if let Some(rect) = args.first().and_then(rect_from_value) {
            viewport.on_resize(rect);
        }
    }
}

impl Layoutable for Viewport {
    fn element(&self) -> &Element {
        &self.el
    }

    /// Flat fan-out: every direct child receives the viewport's full
    /// rectangle. The root element itself is host-positioned.
    fn apply_layout(&self) {
        let Some(rect) = self.el.bounds() else { return };
        for child in self.children.snapshot() {
            child.element().set_bounds(rect);
            child.apply_layout();
        }
    }
}

impl Container for Viewport {
    fn add_child(&self, child: Arc<dyn Layoutable>) {
        self.children.insert(&self.el, child);
        self.apply_layout();
    }

    fn remove_child(&self, child: &dyn Layoutable) {
        self.children.detach(child);
        self.apply_layout();
    }
}

/// Narrow activity column pinned to the left edge of its rectangle.
///
/// Children get 20% of the sidebar's width, capped at
/// [`SIDEBAR_MAX_WIDTH`], and its full height.
pub struct Sidebar {
    el: Arc<Element>,
    children: Children,
}

impl Sidebar {
    pub fn new(bridge: &Arc<Bridge>) -> Arc<Self> {
        let el = Element::new(bridge);
        el.add_class("stageSidebar");
        Arc::new(Self {
            el,
            children: Children::new(),
        })
    }

    /// Children in insertion order.
    pub fn children(&self) -> Vec<Arc<dyn Layoutable>> {
        self.children.snapshot()
    }
}

impl Layoutable for Sidebar {
    fn element(&self) -> &Element {
        &self.el
    }

    fn apply_layout(&self) {
        let Some(rect) = self.el.bounds() else { return };
        let width = (rect.width * 0.2).floor().min(SIDEBAR_MAX_WIDTH);
        for child in self.children.snapshot() {
            child
                .element()
                .set_bounds(Rect::new(rect.x, rect.y, width, rect.height));
            child.apply_layout();
        }
    }
}

impl Container for Sidebar {
    fn add_child(&self, child: Arc<dyn Layoutable>) {
        self.children.insert(&self.el, child);
        self.apply_layout();
    }

    fn remove_child(&self, child: &dyn Layoutable) {
        self.children.detach(child);
        self.apply_layout();
    }
}
