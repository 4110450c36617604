//! Runtime pump
//!
//! Owns the two ends the embedder does not: the bridge's outbound sender and
//! the inbound receiver, plus the timeout scheduler. The pump interleaves
//! host message dispatch with due timeouts; nothing in the runtime runs
//! outside a pump iteration.

use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::{info, warn};

use crate::bridge::{Bridge, InboundMessage, OutboundCall};
use crate::timer::Scheduler;

/// The host's two ends of the channel pair.
pub struct HostEndpoint {
    /// Calls leaving the sandbox, in send order.
    pub outbound: Receiver<OutboundCall>,
    /// Messages entering the sandbox.
    pub inbound: Sender<InboundMessage>,
}

/// The sandbox side: bridge, scheduler and the inbound receiver.
pub struct Runtime {
    bridge: Arc<Bridge>,
    scheduler: Arc<Scheduler>,
    inbound: Receiver<InboundMessage>,
}

impl Runtime {
    /// Build a connected runtime / host endpoint pair.
    pub fn new() -> (Self, HostEndpoint) {
        let (out_tx, out_rx) = unbounded();
        let (in_tx, in_rx) = unbounded();
        let runtime = Self {
            bridge: Bridge::new(out_tx),
            scheduler: Arc::new(Scheduler::new()),
            inbound: in_rx,
        };
        let endpoint = HostEndpoint {
            outbound: out_rx,
            inbound: in_tx,
        };
        (runtime, endpoint)
    }

    pub fn bridge(&self) -> &Arc<Bridge> {
        &self.bridge
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// One pump iteration at a given logical time: drain every queued
    /// inbound message, then fire due timeouts. Returns the number of
    /// messages dispatched.
    ///
    /// Dispatch errors are reported and skipped; one malformed or stale
    /// message must not wedge the pump.
    pub fn tick(&self, now: Instant) -> usize {
        let mut dispatched = 0;
        while let Ok(message) = self.inbound.try_recv() {
            self.dispatch(message);
            dispatched += 1;
        }
        self.scheduler.run_due(now);
        dispatched
    }

    /// Pump until the host hangs up.
    ///
    /// Blocks on the inbound channel, bounded by the next timeout deadline
    /// so local timers fire on time with no host traffic at all.
    pub fn run(&self) {
        loop {
            let received = match self.scheduler.next_deadline() {
                Some(deadline) => self.inbound.recv_deadline(deadline),
                None => self.inbound.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match received {
                Ok(message) => {
                    self.dispatch(message);
                    self.scheduler.run_due(Instant::now());
                }
                Err(RecvTimeoutError::Timeout) => {
                    self.scheduler.run_due(Instant::now());
                }
                Err(RecvTimeoutError::Disconnected) => {
                    info!("host disconnected, pump stopping");
                    return;
                }
            }
        }
    }

    fn dispatch(&self, message: InboundMessage) {
        if let Err(err) = self.bridge.handle_inbound(message) {
            warn!(%err, "inbound dispatch failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn start_is_acknowledged_through_the_endpoint() {
        let (runtime, host) = Runtime::new();
        host.inbound.send(InboundMessage::Start).unwrap();
        runtime.tick(Instant::now());

        let call = host.outbound.try_recv().unwrap();
        assert_eq!((call.module.as_str(), call.op.as_str()), ("Basic", "started"));
    }

    #[test]
    fn tick_interleaves_messages_and_timeouts() {
        let (runtime, host) = Runtime::new();
        let fired = Arc::new(AtomicUsize::new(0));
        {
            let fired = Arc::clone(&fired);
            runtime.scheduler().schedule_in(Duration::from_millis(10), move |_| {
                fired.fetch_add(1, Ordering::SeqCst);
            });
        }
        host.inbound.send(InboundMessage::Start).unwrap();

        let dispatched = runtime.tick(Instant::now() + Duration::from_millis(50));
        assert_eq!(dispatched, 1);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stale_tokens_do_not_wedge_the_pump() {
        let (runtime, host) = Runtime::new();
        host.inbound
            .send(
                InboundMessage::from_value(&json!(["return", "cb999", []])).unwrap(),
            )
            .unwrap();
        host.inbound.send(InboundMessage::Start).unwrap();

        assert_eq!(runtime.tick(Instant::now()), 2);
        // The message after the stale one still dispatched.
        let ops: Vec<String> = host.outbound.try_iter().map(|c| c.op).collect();
        assert_eq!(ops, vec!["started"]);
    }

    #[test]
    fn run_exits_when_the_host_hangs_up() {
        let (runtime, host) = Runtime::new();
        let fired = Arc::new(AtomicUsize::new(0));
        {
            let fired = Arc::clone(&fired);
            runtime.scheduler().schedule_in(Duration::from_millis(5), move |_| {
                fired.fetch_add(1, Ordering::SeqCst);
            });
        }

        let pump = std::thread::spawn(move || runtime.run());
        std::thread::sleep(Duration::from_millis(20));
        drop(host);
        pump.join().unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
