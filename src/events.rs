//! Observable capability
//!
//! A composable event emitter that any runtime object can embed. Producers of
//! state changes (layout passes, timers, the bubble queue) trigger named
//! events; consumers bind handlers without coupling to the producer type.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

/// Shared context object passed as the first argument to every handler.
///
/// Currently carries no data; it exists so handler signatures stay stable
/// when per-dispatch metadata is added.
#[derive(Debug, Default)]
pub struct EventContext;

/// Identity of a bound handler, returned by [`Listeners::bind`] and consumed
/// by [`Listeners::unbind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type Handler<A> = Arc<Mutex<Box<dyn FnMut(&EventContext, &A) + Send>>>;

struct Entry<A> {
    id: HandlerId,
    once: bool,
    handler: Handler<A>,
}

struct Table<A> {
    bindings: HashMap<String, Vec<Entry<A>>>,
    next_id: u64,
}

/// Event registration and dispatch, embedded has-a style.
///
/// Handlers run synchronously, in binding order, each receiving the shared
/// [`EventContext`] followed by the event payload. Triggering an event with
/// no bindings is a no-op.
pub struct Listeners<A> {
    table: Mutex<Table<A>>,
}

impl<A> Listeners<A> {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(Table {
                bindings: HashMap::new(),
                next_id: 0,
            }),
        }
    }

    /// Bind a handler to a named event.
    pub fn bind(
        &self,
        event: &str,
        handler: impl FnMut(&EventContext, &A) + Send + 'static,
    ) -> HandlerId {
        self.insert(event, false, Box::new(handler))
    }

    /// Bind a handler that is automatically unbound after its first firing.
    pub fn one(
        &self,
        event: &str,
        handler: impl FnMut(&EventContext, &A) + Send + 'static,
    ) -> HandlerId {
        self.insert(event, true, Box::new(handler))
    }

    fn insert(
        &self,
        event: &str,
        once: bool,
        handler: Box<dyn FnMut(&EventContext, &A) + Send>,
    ) -> HandlerId {
        let mut table = self.table.lock();
        let id = HandlerId(table.next_id);
        table.next_id += 1;
        table.bindings.entry(event.to_string()).or_default().push(Entry {
            id,
            once,
            handler: Arc::new(Mutex::new(handler)),
        });
        id
    }

    /// Remove a previously bound handler. Unknown ids are a no-op.
    pub fn unbind(&self, event: &str, id: HandlerId) {
        let mut table = self.table.lock();
        if let Some(entries) = table.bindings.get_mut(event) {
            entries.retain(|e| e.id != id);
        }
    }

    /// Invoke every handler currently bound to `event`, in binding order.
    ///
    /// One-shot handlers are removed before invocation so a re-entrant
    /// trigger cannot fire them twice.
    pub fn trigger(&self, event: &str, payload: &A) {
        let snapshot: Vec<Handler<A>> = {
            let mut table = self.table.lock();
            match table.bindings.get_mut(event) {
                Some(entries) => {
                    let snapshot = entries.iter().map(|e| Arc::clone(&e.handler)).collect();
                    entries.retain(|e| !e.once);
                    snapshot
                }
                None => return,
            }
        };

        let ctx = EventContext;
        for handler in snapshot {
            let mut f = handler.lock();
            (*f)(&ctx, payload);
        }
    }

    /// Number of handlers currently bound to `event`.
    pub fn bound_count(&self, event: &str) -> usize {
        self.table
            .lock()
            .bindings
            .get(event)
            .map(|e| e.len())
            .unwrap_or(0)
    }
}

impl<A> Default for Listeners<A> {
    fn default() -> Self {
        Self::new()
    }
}
