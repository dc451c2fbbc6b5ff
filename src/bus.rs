use crate::protocol::{Envelope, MessageKind};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

/// Outbound half of the cross-context channel. The embedder supplies the
/// concrete transport (postMessage, pipe, test recorder).
pub trait Channel {
    fn send(&self, env: &Envelope) -> anyhow::Result<()>;
}

type Handler = Box<dyn FnMut(&Envelope)>;

struct Entry {
    id: u64,
    active: Rc<Cell<bool>>,
    handler: Rc<RefCell<Handler>>,
}

/// Disposer returned by [`MessageBus::subscribe`]. Passing it back to
/// [`MessageBus::unsubscribe`] guarantees the handler never fires again.
#[derive(Debug)]
pub struct Subscription {
    kind: MessageKind,
    id: u64,
    active: Rc<Cell<bool>>,
}

#[derive(Default)]
struct BusState {
    next_id: u64,
    handlers: HashMap<MessageKind, Vec<Entry>>,
}

/// Typed publish/subscribe wrapper over the cross-context message channel.
///
/// Delivery is fire-and-forget and at-most-once per physical send; there is
/// no acknowledgement layer. The bus is single-threaded (`Rc`-shared) and
/// runs every handler to completion on the caller's timeline.
pub struct MessageBus {
    channel: Box<dyn Channel>,
    state: RefCell<BusState>,
}

impl MessageBus {
    pub fn new(channel: Box<dyn Channel>) -> Self {
        Self {
            channel,
            state: RefCell::new(BusState::default()),
        }
    }

    /// Send an envelope to the counterpart context. Transport failures are
    /// logged and swallowed; callers needing confirmation build it atop
    /// explicit reply kinds.
    pub fn publish(&self, env: &Envelope) {
        if let Err(e) = self.channel.send(env) {
            tracing::warn!(kind = ?env.kind(), "failed to publish envelope: {e}");
        }
    }

    /// Register `handler` for every inbound envelope of `kind`. Handlers for
    /// the same kind run in registration order.
    pub fn subscribe(
        &self,
        kind: MessageKind,
        handler: impl FnMut(&Envelope) + 'static,
    ) -> Subscription {
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        let id = state.next_id;
        let active = Rc::new(Cell::new(true));
        state.handlers.entry(kind).or_default().push(Entry {
            id,
            active: Rc::clone(&active),
            handler: Rc::new(RefCell::new(Box::new(handler))),
        });
        Subscription { kind, id, active }
    }

    /// Remove a single handler. Safe to call for an already-removed
    /// subscription; the handler cannot fire after this returns, even when
    /// removal happens in the middle of a dispatch.
    pub fn unsubscribe(&self, sub: Subscription) {
        sub.active.set(false);
        let mut state = self.state.borrow_mut();
        if let Some(entries) = state.handlers.get_mut(&sub.kind) {
            entries.retain(|e| e.id != sub.id);
        }
    }

    /// Drop every registered handler. Idempotent; used on teardown.
    pub fn unsubscribe_all(&self) {
        let mut state = self.state.borrow_mut();
        for entries in state.handlers.values() {
            for entry in entries {
                entry.active.set(false);
            }
        }
        state.handlers.clear();
    }

    /// Inbound pump: decode a raw value from the counterpart and deliver it.
    /// Malformed or unrecognized envelopes are dropped without error.
    pub fn dispatch(&self, raw: serde_json::Value) {
        if let Some(env) = Envelope::decode(raw) {
            self.deliver(&env);
        }
    }

    /// Deliver an already-decoded envelope to its subscribers, in
    /// registration order. A handler panic is caught and logged here so that
    /// it reaches neither the caller nor later handlers.
    pub fn deliver(&self, env: &Envelope) {
        let snapshot: Vec<(Rc<Cell<bool>>, Rc<RefCell<Handler>>)> = {
            let state = self.state.borrow();
            match state.handlers.get(&env.kind()) {
                Some(entries) => entries
                    .iter()
                    .map(|e| (Rc::clone(&e.active), Rc::clone(&e.handler)))
                    .collect(),
                None => return,
            }
        };
        for (active, handler) in snapshot {
            if !active.get() {
                continue;
            }
            let Ok(mut handler) = handler.try_borrow_mut() else {
                tracing::warn!(kind = ?env.kind(), "skipping re-entrant handler invocation");
                continue;
            };
            let result = catch_unwind(AssertUnwindSafe(|| (*handler)(env)));
            if result.is_err() {
                tracing::error!(kind = ?env.kind(), "message handler panicked");
            }
        }
    }
}
