//! Media proxy
//!
//! Places an image or video owned by the host. The asset's natural size
//! arrives asynchronously; until the first successful layout the element is
//! kept hidden, then revealed exactly once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tracing::debug;

use crate::bridge::Bridge;
use crate::error::{Result, StageError};
use crate::proxy::{Element, Layoutable};

/// Proxy for a host-owned media element.
pub struct Media {
    el: Arc<Element>,
    natural: Mutex<Option<(f64, f64)>>,
    revealed: AtomicBool,
}

impl Media {
    /// Create a media element for `source` and request its natural size.
    pub fn new(bridge: &Arc<Bridge>, source: &str) -> Result<Arc<Self>> {
        if source.is_empty() {
            return Err(StageError::EmptyMediaSource);
        }

        let handle = bridge.fresh_handle("media");
        bridge.call(
            "Media",
            "create",
            vec![json!(handle.as_str()), json!(source)],
        );
        let el = Element::from_handle(bridge, handle);

        // Hidden until the first layout with a known natural size.
        el.css("opacity", 0);

        let media = Arc::new(Self {
            el,
            natural: Mutex::new(None),
            revealed: AtomicBool::new(false),
        });

        let weak = Arc::downgrade(&media);
        let token = bridge.register_callback(move |args| {
            if let Some(media) = weak.upgrade() {
                media.on_natural_size(args);
            }
        });
        media.el.track_token(token.clone());
        bridge.call(
            "Media",
            "getNaturalSize",
            vec![json!(media.el.handle().as_str()), json!(token.as_str())],
        );

        Ok(media)
    }

    /// Natural width/height, once the host has reported it.
    pub fn natural_size(&self) -> Option<(f64, f64)> {
        *self.natural.lock()
    }

    fn on_natural_size(&self, args: &[Value]) {
        // Late delivery after removal is a no-op, not an error.
        if self.el.is_removed() {
            return;
        }
        let Some(size) = args.first() else { return };
        let (Some(width), Some(height)) = (
            size.get("width").and_then(Value::as_f64),
            size.get("height").and_then(Value::as_f64),
        ) else {
            debug!(handle = %self.el.handle(), "ignoring malformed natural size");
            return;
        };
        *self.natural.lock() = Some((width, height));
        self.apply_layout();
    }
}

impl Layoutable for Media {
    fn element(&self) -> &Element {
        &self.el
    }

    /// Aspect-ratio-preserving fit within the cached rectangle, centered on
    /// the shorter axis. The element is revealed on the first successful
    /// pass only.
    fn apply_layout(&self) {
        let Some((natural_width, natural_height)) = self.natural_size() else {
            return;
        };
        let Some(rect) = self.el.bounds() else { return };
        if natural_width <= 0.0 || rect.width <= 0.0 {
            return;
        }

        let media_ratio = natural_height / natural_width;
        let bounds_ratio = rect.height / rect.width;

        let (width, height);
        if media_ratio < bounds_ratio {
            width = rect.width;
            height = width * media_ratio;
            self.el.css("left", format!("{}px", rect.x));
            self.el
                .css("top", format!("{}px", rect.y + rect.height / 2.0 - height / 2.0));
        } else {
            height = rect.height;
            width = height / media_ratio;
            self.el.css("top", format!("{}px", rect.y));
            self.el
                .css("left", format!("{}px", rect.x + rect.width / 2.0 - width / 2.0));
        }
        self.el.css("position", "absolute");
        self.el.css("width", width);
        self.el.css("height", height);

        if !self.revealed.swap(true, Ordering::SeqCst) {
            self.el.css("opacity", 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{InboundMessage, OutboundCall};
    use crate::proxy::Rect;
    use crossbeam_channel::{unbounded, Receiver};

    fn test_bridge() -> (Arc<Bridge>, Receiver<OutboundCall>) {
        let (tx, rx) = unbounded();
        (Bridge::new(tx), rx)
    }

    fn style_calls(calls: &[OutboundCall], prop: &str) -> Vec<Value> {
        calls
            .iter()
            .filter(|c| c.op == "applyStyle" && c.args[1] == json!(prop))
            .map(|c| c.args[2].clone())
            .collect()
    }

    fn deliver_natural_size(
        bridge: &Arc<Bridge>,
        calls: &[OutboundCall],
        width: f64,
        height: f64,
    ) {
        let request = calls.iter().find(|c| c.op == "getNaturalSize").unwrap();
        let token = request.args[1].as_str().unwrap();
        bridge
            .handle_inbound(
                InboundMessage::from_value(&json!([
                    "callback",
                    token,
                    [{"width": width, "height": height}]
                ]))
                .unwrap(),
            )
            .unwrap();
    }

    #[test]
    fn empty_source_is_rejected() {
        let (bridge, _rx) = test_bridge();
        assert!(matches!(
            Media::new(&bridge, ""),
            Err(StageError::EmptyMediaSource)
        ));
    }

    #[test]
    fn hidden_until_first_layout_then_revealed_once() {
        let (bridge, rx) = test_bridge();
        let media = Media::new(&bridge, "cat.jpg").unwrap();
        let setup: Vec<OutboundCall> = rx.try_iter().collect();
        assert_eq!(style_calls(&setup, "opacity"), vec![json!(0)]);

        media.element().set_bounds(Rect::new(0.0, 0.0, 800.0, 600.0));
        deliver_natural_size(&bridge, &setup, 400.0, 300.0);
        let first: Vec<OutboundCall> = rx.try_iter().collect();
        assert_eq!(style_calls(&first, "opacity"), vec![json!(1)]);

        // Subsequent layouts never re-trigger the reveal.
        media.apply_layout();
        let second: Vec<OutboundCall> = rx.try_iter().collect();
        assert!(style_calls(&second, "opacity").is_empty());
    }

    #[test]
    fn wide_bounds_center_horizontally_limited_media() {
        let (bridge, rx) = test_bridge();
        let media = Media::new(&bridge, "cat.jpg").unwrap();
        let setup: Vec<OutboundCall> = rx.try_iter().collect();

        // Taller-than-bounds media: height-limited, centered on x.
        media.element().set_bounds(Rect::new(0.0, 0.0, 1000.0, 500.0));
        deliver_natural_size(&bridge, &setup, 200.0, 400.0);

        let calls: Vec<OutboundCall> = rx.try_iter().collect();
        assert_eq!(style_calls(&calls, "height"), vec![json!(500.0)]);
        assert_eq!(style_calls(&calls, "width"), vec![json!(250.0)]);
        assert_eq!(style_calls(&calls, "left"), vec![json!("375px")]);
        assert_eq!(style_calls(&calls, "top"), vec![json!("0px")]);
    }

    #[test]
    fn layout_without_natural_size_is_deferred() {
        let (bridge, rx) = test_bridge();
        let media = Media::new(&bridge, "cat.jpg").unwrap();
        rx.try_iter().count();

        media.element().set_bounds(Rect::new(0.0, 0.0, 100.0, 100.0));
        media.apply_layout();
        assert_eq!(rx.try_iter().count(), 0);
    }

    #[test]
    fn late_natural_size_after_removal_is_ignored() {
        let (bridge, rx) = test_bridge();
        let media = Media::new(&bridge, "cat.jpg").unwrap();
        let setup: Vec<OutboundCall> = rx.try_iter().collect();

        media.element().set_bounds(Rect::new(0.0, 0.0, 100.0, 100.0));
        media.element().remove();
        rx.try_iter().count();

        // The token was released on removal, so the bridge rejects it; a
        // host that raced the removal is tolerated at the proxy level too.
        let request = setup.iter().find(|c| c.op == "getNaturalSize").unwrap();
        let token = request.args[1].as_str().unwrap();
        let result = bridge.handle_inbound(
            InboundMessage::from_value(&json!([
                "callback",
                token,
                [{"width": 10.0, "height": 10.0}]
            ]))
            .unwrap(),
        );
        assert!(result.is_err());
        assert_eq!(rx.try_iter().count(), 0);
    }
}
