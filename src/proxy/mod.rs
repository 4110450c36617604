//! Remote proxy objects
//!
//! Sandbox-side stand-ins for host-owned visual elements. A proxy owns a
//! remote handle, a local geometry cache and nothing else; every visible
//! mutation is an asynchronous call through the bridge. Geometry is never
//! fetched synchronously from the host: layout reads only the cache that the
//! owning container last assigned.

pub mod canvas;
pub mod media;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::bridge::{Bridge, CallbackToken, RemoteHandle};

/// Rectangle in host coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Parse a rect from the loose `{x?, y?, width, height}` objects the host
/// sends for window sizes and resize events.
pub(crate) fn rect_from_value(value: &Value) -> Option<Rect> {
    let width = value.get("width")?.as_f64()?;
    let height = value.get("height")?.as_f64()?;
    let x = value.get("x").and_then(Value::as_f64).unwrap_or(0.0);
    let y = value.get("y").and_then(Value::as_f64).unwrap_or(0.0);
    Some(Rect::new(x, y, width, height))
}

/// A component that participates in the recursive layout protocol.
///
/// Containers only require this of their children: a geometry cache (through
/// [`Layoutable::element`]) and a layout behavior. What was a runtime check
/// in a dynamic setting is a trait bound here.
pub trait Layoutable: Send + Sync {
    /// The underlying element proxy, giving access to the geometry cache.
    fn element(&self) -> &Element;

    /// Push this component's geometry to the host.
    ///
    /// Must only read the component's own cached bounds, never request live
    /// measurement; this is what keeps a layout pass bounded in host calls.
    fn apply_layout(&self);
}

/// Options for [`Element::animate`].
#[derive(Default)]
pub struct AnimateOptions {
    pub duration: Option<u64>,
    pub easing: Option<String>,
    /// Invoked by the host when the animation finishes. Wrapped into a
    /// one-shot callback token before sending.
    pub complete: Option<Box<dyn FnOnce() + Send>>,
}

impl AnimateOptions {
    pub fn duration(ms: u64) -> Self {
        Self {
            duration: Some(ms),
            ..Default::default()
        }
    }

    pub fn easing(mut self, easing: &str) -> Self {
        self.easing = Some(easing.to_string());
        self
    }

    pub fn on_complete(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.complete = Some(Box::new(f));
        self
    }
}

/// Base proxy for a host-owned element.
pub struct Element {
    handle: RemoteHandle,
    bridge: Arc<Bridge>,
    bounds: Mutex<Option<Rect>>,
    /// Non-owning back-reference to the containing element. Never traversed
    /// for destruction decisions.
    parent: Mutex<Option<RemoteHandle>>,
    /// Repeatable callback tokens minted on behalf of this element,
    /// released when the element is removed.
    owned_tokens: Mutex<Vec<CallbackToken>>,
    removed: AtomicBool,
}

impl Element {
    /// Create a fresh host element and a proxy for it.
    pub fn new(bridge: &Arc<Bridge>) -> Arc<Self> {
        let handle = bridge.fresh_handle("sel");
        bridge.call("Element", "createElement", vec![json!(handle.as_str())]);
        Self::from_handle(bridge, handle)
    }

    /// Wrap an existing remote handle (host-originated or host-fetched).
    pub fn from_handle(bridge: &Arc<Bridge>, handle: RemoteHandle) -> Arc<Self> {
        Arc::new(Self {
            handle,
            bridge: Arc::clone(bridge),
            bounds: Mutex::new(None),
            parent: Mutex::new(None),
            owned_tokens: Mutex::new(Vec::new()),
            removed: AtomicBool::new(false),
        })
    }

    pub fn handle(&self) -> &RemoteHandle {
        &self.handle
    }

    pub fn bridge(&self) -> &Arc<Bridge> {
        &self.bridge
    }

    /// Last rectangle assigned by the owning container, if any.
    pub fn bounds(&self) -> Option<Rect> {
        *self.bounds.lock()
    }

    /// Update the local geometry cache. Performs no host call; geometry is
    /// pushed by `apply_layout` only.
    pub fn set_bounds(&self, rect: Rect) {
        *self.bounds.lock() = Some(rect);
    }

    pub fn parent(&self) -> Option<RemoteHandle> {
        self.parent.lock().clone()
    }

    pub(crate) fn set_parent(&self, parent: Option<RemoteHandle>) {
        *self.parent.lock() = parent;
    }

    /// Whether this proxy's handle has been invalidated.
    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::SeqCst)
    }

    pub(crate) fn track_token(&self, token: CallbackToken) {
        self.owned_tokens.lock().push(token);
    }

    /// Append a child element to this element on the host.
    pub fn append(&self, child: &Element) {
        child.set_parent(Some(self.handle.clone()));
        self.bridge.call(
            "Element",
            "appendTo",
            vec![json!(child.handle.as_str()), json!(self.handle.as_str())],
        );
    }

    /// Attach this element under another element.
    pub fn attach_to(&self, parent: &Element) {
        parent.append(self);
    }

    /// Attach this element under a host-owned element by handle.
    pub fn attach_to_handle(&self, parent: &RemoteHandle) {
        self.set_parent(Some(parent.clone()));
        self.bridge.call(
            "Element",
            "appendTo",
            vec![json!(self.handle.as_str()), json!(parent.as_str())],
        );
    }

    /// Set one style property, fire-and-forget.
    pub fn css(&self, prop: &str, value: impl Into<Value>) {
        self.bridge.call(
            "Element",
            "applyStyle",
            vec![json!(self.handle.as_str()), json!(prop), value.into()],
        );
    }

    /// Fetch one style property through a one-shot callback.
    pub fn css_get(&self, prop: &str, f: impl FnOnce(&[Value]) + Send + 'static) {
        let token = self.bridge.register_once(f);
        self.track_token(token.clone());
        self.bridge.call_with_token(
            "Element",
            "getStyle",
            vec![json!(self.handle.as_str()), json!(prop)],
            token,
        );
    }

    /// Replace the element's text content.
    pub fn text(&self, text: &str) {
        self.bridge.call(
            "Element",
            "setInnerText",
            vec![json!(self.handle.as_str()), json!(text)],
        );
    }

    pub fn attr_set(&self, attr: &str, value: impl Into<Value>) {
        self.bridge.call(
            "Element",
            "setAttr",
            vec![json!(self.handle.as_str()), json!(attr), value.into()],
        );
    }

    pub fn attr_get(&self, attr: &str, f: impl FnOnce(&[Value]) + Send + 'static) {
        let token = self.bridge.register_once(f);
        self.track_token(token.clone());
        self.bridge.call_with_token(
            "Element",
            "getAttr",
            vec![json!(self.handle.as_str()), json!(attr)],
            token,
        );
    }

    pub fn add_class(&self, class: &str) {
        self.bridge.call(
            "Element",
            "addClass",
            vec![json!(self.handle.as_str()), json!(class)],
        );
    }

    pub fn set_width(&self, width: f64) {
        self.bridge.call(
            "Element",
            "setWidth",
            vec![json!(self.handle.as_str()), json!(width)],
        );
    }

    pub fn set_height(&self, height: f64) {
        self.bridge.call(
            "Element",
            "setHeight",
            vec![json!(self.handle.as_str()), json!(height)],
        );
    }

    /// Ask the host for the rendered outer height, including margins when
    /// requested. Used by exit animations which need the live height.
    pub fn outer_height(&self, include_margin: bool, f: impl FnOnce(f64) + Send + 'static) {
        let token = self.bridge.register_once(move |args| {
            let height = args.first().and_then(Value::as_f64).unwrap_or(0.0);
            f(height);
        });
        self.track_token(token.clone());
        self.bridge.call_with_token(
            "Element",
            "getOuterHeight",
            vec![json!(self.handle.as_str()), json!(include_margin)],
            token,
        );
    }

    /// Register a repeatable click handler. The token stays bound until the
    /// element is removed.
    pub fn on_click(&self, mut f: impl FnMut() + Send + 'static) {
        let token = self.bridge.register_callback(move |_args| f());
        self.track_token(token.clone());
        self.bridge.call(
            "Element",
            "bind",
            vec![
                json!(self.handle.as_str()),
                json!("click"),
                json!(token.as_str()),
            ],
        );
    }

    pub fn show(&self) {
        self.bridge
            .call("Element", "show", vec![json!(self.handle.as_str())]);
    }

    pub fn hide(&self) {
        self.bridge
            .call("Element", "hide", vec![json!(self.handle.as_str())]);
    }

    pub fn fade_in(&self, duration: u64) {
        self.bridge.call(
            "Element",
            "fadeIn",
            vec![json!(self.handle.as_str()), json!(duration)],
        );
    }

    pub fn fade_out(&self, duration: u64) {
        self.bridge.call(
            "Element",
            "fadeOut",
            vec![json!(self.handle.as_str()), json!(duration)],
        );
    }

    pub fn fade_to(&self, duration: u64, opacity: f64) {
        self.bridge.call(
            "Element",
            "fadeTo",
            vec![
                json!(self.handle.as_str()),
                json!(duration),
                json!(opacity),
            ],
        );
    }

    /// Animate style properties on the host. A completion callback, when
    /// present, is wrapped into a one-shot token before sending.
    pub fn animate(&self, properties: Value, options: AnimateOptions) {
        let mut opts = serde_json::Map::new();
        if let Some(duration) = options.duration {
            opts.insert("duration".into(), json!(duration));
        }
        if let Some(easing) = options.easing {
            opts.insert("easing".into(), json!(easing));
        }
        if let Some(complete) = options.complete {
            let token = self.bridge.register_once(move |_args| complete());
            self.track_token(token.clone());
            opts.insert("complete".into(), json!(token.as_str()));
        }
        self.bridge.call(
            "Element",
            "animate",
            vec![
                json!(self.handle.as_str()),
                properties,
                Value::Object(opts),
            ],
        );
    }

    /// Remove the host element and invalidate this proxy.
    ///
    /// Further use of the proxy is a caller bug; late host callbacks for it
    /// are tolerated as no-ops. All repeatable tokens owned by the element
    /// are released here.
    pub fn remove(&self) {
        if self.removed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.bridge
            .call("Element", "remove", vec![json!(self.handle.as_str())]);
        for token in self.owned_tokens.lock().drain(..) {
            self.bridge.release_callback(&token);
        }
    }

    /// Default layout behavior: push the cached rectangle to the host as an
    /// absolute position and size.
    pub(crate) fn push_absolute_layout(&self) {
        let Some(rect) = self.bounds() else { return };
        self.css("position", "absolute");
        self.css("left", format!("{}px", rect.x));
        self.css("top", format!("{}px", rect.y));
        self.css("width", rect.width);
        self.css("height", rect.height);
    }
}

impl Layoutable for Element {
    fn element(&self) -> &Element {
        self
    }

    fn apply_layout(&self) {
        self.push_absolute_layout();
    }
}
