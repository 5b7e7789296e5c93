//! Inbound event pump and scoped subscriptions.
//!
//! The pump is the only reader of a connection's broadcast stream. For each
//! event it first runs the client's persistent reactions, then hands the
//! event to every subscription whose filter accepts it. Ordering matters:
//! a whois-triggered "no such nick" is checked against the pending-whois
//! table before the whois itself sees the event and settles.

use super::BridgedClient;
use crate::connection::{ErrorCode, InboundEvent, IrcConnection};
use crate::events::ClientEvent;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, warn};

type Filter = Box<dyn Fn(&InboundEvent) -> bool + Send + Sync>;

struct Listener {
    filter: Filter,
    tx: mpsc::UnboundedSender<InboundEvent>,
}

#[derive(Default)]
struct Slots {
    closed: bool,
    by_id: HashMap<u64, Listener>,
}

/// Scoped listeners attached to one connection.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    next_id: AtomicU64,
    slots: Mutex<Slots>,
}

impl ListenerRegistry {
    /// Attach a listener for events accepted by `filter`.
    ///
    /// On a closed registry the subscription yields `None` immediately.
    pub(crate) fn subscribe(
        self: &Arc<Self>,
        filter: impl Fn(&InboundEvent) -> bool + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        {
            // Same lock as `close`.
            let mut slots = self.slots.lock();
            if !slots.closed {
                slots.by_id.insert(
                    id,
                    Listener {
                        filter: Box::new(filter),
                        tx,
                    },
                );
            }
        }
        Subscription {
            id,
            registry: Arc::downgrade(self),
            rx,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.lock().by_id.len()
    }

    fn dispatch(&self, event: &InboundEvent) {
        for listener in self.slots.lock().by_id.values() {
            if (listener.filter)(event) {
                let _ = listener.tx.send(event.clone());
            }
        }
    }

    /// Detach everyone; pending `recv()` calls return `None`.
    fn close(&self) {
        let mut slots = self.slots.lock();
        slots.closed = true;
        slots.by_id.clear();
    }

    #[cfg(test)]
    fn is_closed(&self) -> bool {
        self.slots.lock().closed
    }
}

/// A listener that detaches itself when dropped.
pub(crate) struct Subscription {
    id: u64,
    registry: Weak<ListenerRegistry>,
    rx: mpsc::UnboundedReceiver<InboundEvent>,
}

impl Subscription {
    /// Next matching event, or `None` once the connection is gone.
    pub(crate) async fn recv(&mut self) -> Option<InboundEvent> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.slots.lock().by_id.remove(&self.id);
        }
    }
}

/// Start the pump for a freshly created connection.
pub(crate) fn spawn_pump(
    client: Weak<BridgedClient>,
    conn: Arc<dyn IrcConnection>,
    listeners: Arc<ListenerRegistry>,
    generation: u64,
    span: tracing::Span,
) -> JoinHandle<()> {
    let mut events = conn.events();
    tokio::spawn(
        async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Inbound event stream lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                let Some(client) = client.upgrade() else {
                    break;
                };
                let finished = matches!(event, InboundEvent::Disconnected { .. });
                client.on_inbound(conn.as_ref(), generation, &event);
                listeners.dispatch(&event);
                if finished {
                    break;
                }
            }
            debug!("Event pump stopped");
            listeners.close();
        }
        .instrument(span),
    )
}

impl BridgedClient {
    /// Persistent reactions, run before scoped listeners see the event.
    fn on_inbound(&self, conn: &dyn IrcConnection, generation: u64, event: &InboundEvent) {
        if !self.is_current_generation(generation) {
            return;
        }
        match event {
            InboundEvent::Nick { old, new } => {
                self.apply_nick_change(old, new);
            }
            InboundEvent::Error(err) => {
                if conn.is_dead() {
                    return;
                }
                if err.code == ErrorCode::NoSuchNick
                    && err
                        .subject()
                        .is_some_and(|nick| self.whois_pending(nick))
                {
                    return;
                }
                let args = serde_json::to_string(&err.args).unwrap_or_default();
                let message = format!(
                    "Received an error on {}: {}\n{}",
                    self.server.domain, err.code, args
                );
                self.collab.sink.send_metadata(
                    &self.identity,
                    &message,
                    err.code.is_forced_notice(),
                    Some(err),
                );
            }
            InboundEvent::Disconnected { reason } => self.on_disconnected(reason),
            InboundEvent::Connected { .. }
            | InboundEvent::Join { .. }
            | InboundEvent::Part { .. } => {}
        }
    }

    fn is_current_generation(&self, generation: u64) -> bool {
        self.state
            .lock()
            .session
            .as_ref()
            .is_some_and(|s| s.generation == generation)
    }

    /// Compare-and-set the current nick; emits `NickChange` on success.
    pub(crate) fn apply_nick_change(&self, old: &str, new: &str) -> bool {
        {
            let mut state = self.state.lock();
            if !state.nick.eq_ignore_ascii_case(old) {
                return false;
            }
            state.nick = new.to_string();
        }
        info!(old = %old, new = %new, "NICK: Nick changed");
        self.emit(ClientEvent::NickChange {
            old: old.to_string(),
            new: new.to_string(),
        });
        true
    }
}
