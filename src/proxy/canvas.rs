//! Vector drawing surface proxy
//!
//! Thin stand-in for a host-owned drawing surface, used by the countdown
//! faces. Figures are host-owned too; the sandbox only holds their handles.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::bridge::{Bridge, RemoteHandle};

/// Proxy for a host-owned drawing surface attached to an element by id.
pub struct Canvas {
    handle: RemoteHandle,
    bridge: Arc<Bridge>,
}

impl Canvas {
    /// Create a surface of the given size inside the element identified by
    /// `target` (a host-side element id attribute).
    pub fn create(bridge: &Arc<Bridge>, target: &str, width: f64, height: f64) -> Arc<Self> {
        let handle = bridge.fresh_handle("cnv");
        bridge.call(
            "Canvas",
            "create",
            vec![
                json!(handle.as_str()),
                json!(target),
                json!(width),
                json!(height),
            ],
        );
        Arc::new(Self {
            handle,
            bridge: Arc::clone(bridge),
        })
    }

    pub fn handle(&self) -> &RemoteHandle {
        &self.handle
    }

    /// Start an empty path figure; shape data is supplied through
    /// [`Figure::attr`].
    pub fn path(&self) -> Figure {
        let handle = self.bridge.fresh_handle("fig");
        self.bridge.call(
            "Canvas",
            "path",
            vec![json!(self.handle.as_str()), json!(handle.as_str())],
        );
        Figure {
            handle,
            bridge: Arc::clone(&self.bridge),
        }
    }

    /// Draw a circle figure.
    pub fn circle(&self, cx: f64, cy: f64, r: f64) -> Figure {
        let handle = self.bridge.fresh_handle("fig");
        self.bridge.call(
            "Canvas",
            "circle",
            vec![
                json!(self.handle.as_str()),
                json!(handle.as_str()),
                json!(cx),
                json!(cy),
                json!(r),
            ],
        );
        Figure {
            handle,
            bridge: Arc::clone(&self.bridge),
        }
    }

    /// Remove every figure from the surface.
    pub fn clear(&self) {
        self.bridge
            .call("Canvas", "clear", vec![json!(self.handle.as_str())]);
    }

    pub fn set_size(&self, width: f64, height: f64) {
        self.bridge.call(
            "Canvas",
            "setSize",
            vec![json!(self.handle.as_str()), json!(width), json!(height)],
        );
    }
}

/// One figure on a [`Canvas`].
pub struct Figure {
    handle: RemoteHandle,
    bridge: Arc<Bridge>,
}

impl Figure {
    /// Apply attributes (fill, stroke, arc data) to the figure.
    pub fn attr(&self, params: Value) -> &Self {
        self.bridge.call(
            "Canvas",
            "attr",
            vec![json!(self.handle.as_str()), params],
        );
        self
    }
}
