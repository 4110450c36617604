//! Message bridge between the sandbox and the trusted host
//!
//! The bridge is the single channel out of the sandbox. It serializes
//! outbound calls, mints callback tokens for calls that expect replies or
//! repeatable events, and dispatches inbound messages to the registered
//! callbacks. No operation blocks; every reply arrives later through
//! [`Bridge::handle_inbound`].

mod wire;

pub use wire::{CallbackToken, InboundMessage, OutboundCall, RemoteHandle};

use std::collections::HashMap;
use std::sync::Arc;

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Result, StageError};

type CallbackFn = Box<dyn FnMut(&[Value]) + Send>;

struct Registry {
    callbacks: HashMap<CallbackToken, Arc<Mutex<CallbackFn>>>,
    unique: u64,
}

/// The sandbox side of the message channel.
///
/// The callback registry is the only shared mutable state in the core;
/// a lock serializes it so the bridge stays correct if the embedder pumps
/// messages from a dedicated thread.
pub struct Bridge {
    tx: Sender<OutboundCall>,
    registry: Mutex<Registry>,
}

impl Bridge {
    /// Wrap the outbound half of the host channel.
    pub fn new(tx: Sender<OutboundCall>) -> Arc<Self> {
        Arc::new(Self {
            tx,
            registry: Mutex::new(Registry {
                callbacks: HashMap::new(),
                unique: 0,
            }),
        })
    }

    /// Next value of the process-lifetime unique counter.
    ///
    /// Handles and tokens share the counter, so no identifier is ever
    /// reused across the two namespaces either.
    pub fn unique(&self) -> u64 {
        let mut registry = self.registry.lock();
        let n = registry.unique;
        registry.unique += 1;
        n
    }

    /// Mint a fresh remote handle with the given prefix.
    pub fn fresh_handle(&self, prefix: &str) -> RemoteHandle {
        RemoteHandle::mint(prefix, self.unique())
    }

    /// Register a repeatable callback and return its token.
    ///
    /// The token stays registered until the host sends a one-shot `return`
    /// for it or [`Bridge::release_callback`] is called. Proxies that mint
    /// repeatable tokens are expected to release them on teardown.
    pub fn register_callback(&self, f: impl FnMut(&[Value]) + Send + 'static) -> CallbackToken {
        let mut registry = self.registry.lock();
        let token = CallbackToken::mint(registry.unique);
        registry.unique += 1;
        registry
            .callbacks
            .insert(token.clone(), Arc::new(Mutex::new(Box::new(f))));
        token
    }

    /// Register a callback expected to fire at most once.
    ///
    /// A second delivery on the same token is ignored.
    pub fn register_once(&self, f: impl FnOnce(&[Value]) + Send + 'static) -> CallbackToken {
        let mut slot = Some(f);
        self.register_callback(move |args| {
            if let Some(f) = slot.take() {
                f(args);
            }
        })
    }

    /// Drop a registered callback. Unknown tokens are a no-op.
    pub fn release_callback(&self, token: &CallbackToken) {
        self.registry.lock().callbacks.remove(token);
    }

    /// Whether a token currently maps to a callback.
    pub fn is_registered(&self, token: &CallbackToken) -> bool {
        self.registry.lock().callbacks.contains_key(token)
    }

    /// Fire-and-forget call: `[module, op, args]`.
    pub fn call(&self, module: &str, op: &str, args: Vec<Value>) {
        self.send(OutboundCall::new(module, op, args));
    }

    /// Call with a reply callback: `[module, op, args, token]`.
    pub fn call_with_reply(
        &self,
        module: &str,
        op: &str,
        args: Vec<Value>,
        f: impl FnMut(&[Value]) + Send + 'static,
    ) -> CallbackToken {
        let token = self.register_callback(f);
        self.send(OutboundCall::new(module, op, args).with_token(token.clone()));
        token
    }

    /// Call carrying a token that was registered separately (for example a
    /// tracked one-shot registered through [`Bridge::register_once`]).
    pub fn call_with_token(
        &self,
        module: &str,
        op: &str,
        args: Vec<Value>,
        token: CallbackToken,
    ) {
        self.send(OutboundCall::new(module, op, args).with_token(token));
    }

    fn send(&self, call: OutboundCall) {
        debug!(module = %call.module, op = %call.op, "outbound call");
        if self.tx.send(call).is_err() {
            // Delivery is not guaranteed; a departed host just drops traffic.
            warn!("host channel disconnected, dropping outbound call");
        }
    }

    /// Dispatch one host-to-sandbox message.
    ///
    /// `start` triggers the readiness acknowledgement; `return` invokes and
    /// unregisters its token; `callback` invokes and keeps it registered.
    /// A token the bridge never minted means the two sides have
    /// desynchronized and is reported as an error.
    pub fn handle_inbound(&self, message: InboundMessage) -> Result<()> {
        match message {
            InboundMessage::Start => {
                self.call("Basic", "started", vec![]);
                Ok(())
            }
            InboundMessage::Return { token, args } => {
                let callback = self
                    .registry
                    .lock()
                    .callbacks
                    .remove(&token)
                    .ok_or_else(|| StageError::UnknownToken(token.clone()))?;
                debug!(%token, "return");
                let mut f = callback.lock();
                (*f)(&args);
                Ok(())
            }
            InboundMessage::Callback { token, args } => {
                let callback = self
                    .registry
                    .lock()
                    .callbacks
                    .get(&token)
                    .cloned()
                    .ok_or_else(|| StageError::UnknownToken(token.clone()))?;
                debug!(%token, "callback");
                let mut f = callback.lock();
                (*f)(&args);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use serde_json::json;

    fn test_bridge() -> (Arc<Bridge>, crossbeam_channel::Receiver<OutboundCall>) {
        let (tx, rx) = unbounded();
        (Bridge::new(tx), rx)
    }

    #[test]
    fn fire_and_forget_carries_no_token() {
        let (bridge, rx) = test_bridge();
        bridge.call("Element", "remove", vec![json!("sel0")]);
        let call = rx.try_recv().unwrap();
        assert_eq!(call.module, "Element");
        assert_eq!(call.op, "remove");
        assert!(call.token.is_none());
    }

    #[test]
    fn reply_call_mints_a_fresh_token() {
        let (bridge, rx) = test_bridge();
        let first = bridge.call_with_reply("Window", "getSize", vec![], |_| {});
        let second = bridge.call_with_reply("Window", "getSize", vec![], |_| {});
        assert_ne!(first, second);
        assert_eq!(rx.try_recv().unwrap().token, Some(first));
        assert_eq!(rx.try_recv().unwrap().token, Some(second));
    }

    #[test]
    fn return_invokes_once_and_unregisters() {
        let (bridge, _rx) = test_bridge();
        let hits = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&hits);
        let token = bridge.call_with_reply("Window", "getSize", vec![], move |args| {
            sink.lock().push(args.to_vec());
        });

        bridge
            .handle_inbound(InboundMessage::Return {
                token: token.clone(),
                args: vec![json!({"width": 800, "height": 600})],
            })
            .unwrap();
        assert_eq!(hits.lock().len(), 1);
        assert!(!bridge.is_registered(&token));

        // A second delivery on the consumed token is a protocol error.
        let err = bridge
            .handle_inbound(InboundMessage::Return {
                token,
                args: vec![],
            })
            .unwrap_err();
        assert!(matches!(err, StageError::UnknownToken(_)));
    }

    #[test]
    fn callback_keeps_the_token_registered() {
        let (bridge, _rx) = test_bridge();
        let hits = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&hits);
        let token = bridge.register_callback(move |_| *sink.lock() += 1);

        for _ in 0..3 {
            bridge
                .handle_inbound(InboundMessage::Callback {
                    token: token.clone(),
                    args: vec![],
                })
                .unwrap();
        }
        assert_eq!(*hits.lock(), 3);
        assert!(bridge.is_registered(&token));
    }

    #[test]
    fn start_triggers_the_readiness_acknowledgement() {
        let (bridge, rx) = test_bridge();
        bridge.handle_inbound(InboundMessage::Start).unwrap();
        let call = rx.try_recv().unwrap();
        assert_eq!((call.module.as_str(), call.op.as_str()), ("Basic", "started"));
        assert!(call.args.is_empty());
        assert!(call.token.is_none());
    }

    #[test]
    fn released_callback_no_longer_dispatches() {
        let (bridge, _rx) = test_bridge();
        let token = bridge.register_callback(|_| {});
        bridge.release_callback(&token);
        let err = bridge
            .handle_inbound(InboundMessage::Callback {
                token,
                args: vec![],
            })
            .unwrap_err();
        assert!(matches!(err, StageError::UnknownToken(_)));
    }

    #[test]
    fn once_callbacks_ignore_duplicate_delivery() {
        let (bridge, _rx) = test_bridge();
        let hits = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&hits);
        let token = bridge.register_once(move |_| *sink.lock() += 1);

        // Host may deliver through the repeatable shape; the wrapper still
        // fires at most once.
        for _ in 0..2 {
            bridge
                .handle_inbound(InboundMessage::Callback {
                    token: token.clone(),
                    args: vec![],
                })
                .unwrap();
        }
        assert_eq!(*hits.lock(), 1);
    }

    #[test]
    fn handles_and_tokens_share_the_unique_counter() {
        let (bridge, _rx) = test_bridge();
        let handle = bridge.fresh_handle("sel");
        let token = bridge.register_callback(|_| {});
        assert_eq!(handle.as_str(), "sel0");
        assert_eq!(token.as_str(), "cb1");
    }
}
