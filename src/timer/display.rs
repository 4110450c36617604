//! Countdown face
//!
//! Circular countdown rendered on a host drawing surface, with the seconds
//! remaining as text in the middle. The face is square: it takes the shorter
//! side of whatever rectangle its container assigns.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;

use crate::bridge::Bridge;
use crate::proxy::canvas::Canvas;
use crate::proxy::{Element, Layoutable};
use crate::timer::Timer;

/// How the face presents progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownStyle {
    /// Arc sweep plus seconds remaining.
    Live,
    /// Static ring with a question mark, for durations the audience should
    /// not see.
    Unknown,
}

/// Visual countdown attached to a [`Timer`].
pub struct TimerDisplay {
    el: Arc<Element>,
    text_el: Arc<Element>,
    style: CountdownStyle,
    canvas: Mutex<Option<Arc<Canvas>>>,
    size: Mutex<Option<f64>>,
    dom_id: String,
}

impl TimerDisplay {
    pub fn new(bridge: &Arc<Bridge>, style: CountdownStyle) -> Arc<Self> {
        let el = Element::new(bridge);
        el.add_class("stageTimerDisplay");
        // The drawing surface binds to the element through a host-side id.
        let dom_id = format!("timerdisplay{}", bridge.unique());
        el.attr_set("id", dom_id.as_str());

        let text_el = Element::new(bridge);
        text_el.add_class("stageTimerText");
        el.append(&text_el);

        Arc::new(Self {
            el,
            text_el,
            style,
            canvas: Mutex::new(None),
            size: Mutex::new(None),
            dom_id,
        })
    }

    /// Drive this face from a timer's events.
    pub fn attach(self: &Arc<Self>, timer: &Timer) {
        let weak = Arc::downgrade(self);
        timer.listeners().bind("tick", move |_ctx, event| {
            if let Some(display) = weak.upgrade() {
                display.update(
                    event.elapsed.as_millis() as f64,
                    event.duration.as_millis() as f64,
                );
            }
        });
        let weak = Arc::downgrade(self);
        timer.listeners().bind("complete", move |_ctx, _event| {
            if let Some(display) = weak.upgrade() {
                display.finish();
            }
        });
    }

    fn update(&self, elapsed_ms: f64, total_ms: f64) {
        let Some(size) = *self.size.lock() else { return };
        let canvas = self.canvas.lock().clone();
        let Some(canvas) = canvas else { return };

        let stroke = (size / 10.0).round();
        canvas.clear();
        canvas
            .circle(size / 2.0, size / 2.0, size / 2.0)
            .attr(json!({"fill": "#333", "stroke": "none"}));
        canvas
            .circle(size / 2.0, size / 2.0, size / 2.0 - stroke)
            .attr(json!({"fill": "#555", "stroke": "none"}));

        match self.style {
            CountdownStyle::Live => {
                canvas.path().attr(json!({
                    "stroke": "#fff",
                    "stroke-width": stroke,
                    "arc": [elapsed_ms, total_ms, size / 2.0 - stroke / 2.0, size / 2.0, size / 2.0],
                }));
                let remaining = ((total_ms - elapsed_ms) / 1000.0).ceil().max(0.0);
                self.text_el.text(&format!("{remaining:.0}"));
            }
            CountdownStyle::Unknown => {
                self.text_el.text("?");
            }
        }
    }

    fn finish(&self) {
        if let Some(canvas) = self.canvas.lock().clone() {
            canvas.clear();
        }
        self.text_el.text("");
    }
}

impl Layoutable for TimerDisplay {
    fn element(&self) -> &Element {
        &self.el
    }

    fn apply_layout(&self) {
        let Some(rect) = self.el.bounds() else { return };
        let size = rect.width.min(rect.height);
        *self.size.lock() = Some(size);

        self.el.css("width", format!("{size}px"));
        self.el.css("height", format!("{size}px"));
        self.text_el.css("line-height", format!("{size}px"));
        if size > 100.0 {
            self.text_el.css("font-size", "140%");
        }

        let mut canvas = self.canvas.lock();
        match &*canvas {
            Some(existing) => existing.set_size(size, size),
            None => {
                *canvas = Some(Canvas::create(
                    self.el.bridge(),
                    &self.dom_id,
                    size,
                    size,
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::OutboundCall;
    use crate::proxy::Rect;
    use crate::timer::{Scheduler, TimerOptions};
    use crossbeam_channel::{unbounded, Receiver};
    use std::time::{Duration, Instant};

    fn test_bridge() -> (Arc<Bridge>, Receiver<OutboundCall>) {
        let (tx, rx) = unbounded();
        (Bridge::new(tx), rx)
    }

    #[test]
    fn layout_creates_the_surface_once_then_resizes_it() {
        let (bridge, rx) = test_bridge();
        let display = TimerDisplay::new(&bridge, CountdownStyle::Live);
        rx.try_iter().count();

        display.element().set_bounds(Rect::new(0.0, 0.0, 120.0, 80.0));
        display.apply_layout();
        let calls: Vec<OutboundCall> = rx.try_iter().collect();
        let create = calls.iter().find(|c| c.op == "create").unwrap();
        // Square face at the shorter side.
        assert_eq!(create.args[2], json!(80.0));
        assert_eq!(create.args[3], json!(80.0));

        display.element().set_bounds(Rect::new(0.0, 0.0, 60.0, 90.0));
        display.apply_layout();
        let calls: Vec<OutboundCall> = rx.try_iter().collect();
        assert!(calls.iter().all(|c| c.op != "create"));
        let resize = calls.iter().find(|c| c.op == "setSize").unwrap();
        assert_eq!(resize.args[1], json!(60.0));
    }

    #[test]
    fn ticks_redraw_the_arc_and_seconds() {
        let (bridge, rx) = test_bridge();
        let scheduler = Arc::new(Scheduler::new());
        let timer = Timer::new(
            &scheduler,
            TimerOptions::new(Duration::from_secs(10)).manual_start(),
        );
        let display = TimerDisplay::new(&bridge, CountdownStyle::Live);
        display.element().set_bounds(Rect::new(0.0, 0.0, 100.0, 100.0));
        display.apply_layout();
        display.attach(&timer);
        rx.try_iter().count();

        timer.start();
        let start = Instant::now();
        scheduler.run_due(start + Duration::from_millis(50));

        let calls: Vec<OutboundCall> = rx.try_iter().collect();
        assert!(calls.iter().any(|c| c.op == "clear"));
        assert!(calls.iter().any(|c| c.op == "path"));
        let texts: Vec<&OutboundCall> =
            calls.iter().filter(|c| c.op == "setInnerText").collect();
        assert!(!texts.is_empty());
        assert_eq!(texts.last().unwrap().args[1], json!("10"));
    }

    #[test]
    fn unknown_style_shows_a_question_mark() {
        let (bridge, rx) = test_bridge();
        let scheduler = Arc::new(Scheduler::new());
        let timer = Timer::new(
            &scheduler,
            TimerOptions::new(Duration::from_secs(10)).manual_start(),
        );
        let display = TimerDisplay::new(&bridge, CountdownStyle::Unknown);
        display.element().set_bounds(Rect::new(0.0, 0.0, 100.0, 100.0));
        display.apply_layout();
        display.attach(&timer);
        rx.try_iter().count();

        timer.start();
        scheduler.run_due(Instant::now() + Duration::from_millis(50));

        let calls: Vec<OutboundCall> = rx.try_iter().collect();
        assert!(calls.iter().all(|c| c.op != "path"));
        let text = calls.iter().find(|c| c.op == "setInnerText").unwrap();
        assert_eq!(text.args[1], json!("?"));
    }

    #[test]
    fn ticks_before_layout_are_ignored() {
        let (bridge, rx) = test_bridge();
        let scheduler = Arc::new(Scheduler::new());
        let timer = Timer::new(
            &scheduler,
            TimerOptions::new(Duration::from_secs(10)).manual_start(),
        );
        let display = TimerDisplay::new(&bridge, CountdownStyle::Live);
        display.attach(&timer);
        rx.try_iter().count();

        timer.start();
        scheduler.run_due(Instant::now() + Duration::from_millis(50));
        assert_eq!(rx.try_iter().count(), 0);
    }
}
