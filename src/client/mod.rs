//! The per-identity connection engine.
//!
//! A [`BridgedClient`] owns one connection to an IRC server for one bridged
//! identity and reconciles the bridge's desired state against what the
//! server reports.
//!
//! # Architecture
//!
//! - **State Ownership**: The client exclusively owns its nick, channel set,
//!   pending-request tables and operator cache. Locks are never held across
//!   an `.await`.
//! - **Inbound Events**: One pump task per connection reads the
//!   connection's event stream, applies the persistent reactions (nick
//!   echoes, error notices, disconnects) and then fans the event out to
//!   scoped [`listeners::Subscription`]s. Dropping a subscription detaches
//!   it, so every exit path cleans up.
//! - **Timers**: Join rechecks and request deadlines race the awaited event
//!   inside the calling task. The idle timer is the only detached timer and
//!   there is never more than one.

mod dispatch;
mod join;
mod keepalive;
mod lifecycle;
mod listeners;
mod nick;
mod whois;

pub use dispatch::{ActionKind, OutboundAction};
pub use join::JoinOutcome;
pub use nick::{derive_nick, derive_valid_nick};
pub use whois::{OperatorsInfo, WhoisSummary};

use crate::config::{ClientConfig, ServerConfig};
use crate::connection::IrcConnection;
use crate::events::ClientEvent;
use crate::identity::{ClientIdentity, Collaborators};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use keepalive::IdleTimer;
use listeners::ListenerRegistry;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use whois::CachedOperators;

/// Where a client is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientStatus {
    /// Constructed, `connect()` not called yet.
    Created,
    Connecting,
    Connected,
    /// The connection went away; `reconnect()` may revive it.
    Dead,
    /// Killed by the bridge.
    Killed,
    /// Connection setup failed; this instance will not retry.
    Failed,
}

impl ClientStatus {
    /// Still waiting for the first connection attempt to finish.
    pub fn is_pending(self) -> bool {
        matches!(self, Self::Created | Self::Connecting)
    }
}

/// State of a keyed in-flight request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    None,
    Pending,
    Settled,
}

/// Mutable connection state.
struct ConnectionState {
    nick: String,
    session: Option<Arc<Session>>,
    /// Set by `kill()`: the session is kept for teardown but unusable.
    killed: bool,
    creation_failed: bool,
    last_action: Option<DateTime<Utc>>,
    explicit_disconnect: bool,
    disconnect_reason: Option<String>,
}

/// One live connection plus its event pump.
pub(crate) struct Session {
    pub(crate) conn: Arc<dyn IrcConnection>,
    pub(crate) listeners: Arc<ListenerRegistry>,
    generation: u64,
    pump: JoinHandle<()>,
}

impl Drop for Session {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// A bridged identity's connection to one IRC server.
pub struct BridgedClient {
    identity: ClientIdentity,
    server: Arc<ServerConfig>,
    collab: Collaborators,
    config: Mutex<ClientConfig>,
    state: Mutex<ConnectionState>,
    channels: Mutex<HashSet<String>>,
    pending_nick: Mutex<RequestState>,
    /// Outstanding whois count per lowercased nick; 0 once settled.
    pending_whois: DashMap<String, usize>,
    operator_cache: DashMap<String, CachedOperators>,
    generations: AtomicU64,
    idle_timer: Mutex<Option<IdleTimer>>,
    status: watch::Sender<ClientStatus>,
    events: mpsc::UnboundedSender<ClientEvent>,
    self_ref: Weak<BridgedClient>,
}

impl BridgedClient {
    /// Create a client. Returns it together with its event outbox.
    pub fn new(
        identity: ClientIdentity,
        server: Arc<ServerConfig>,
        config: ClientConfig,
        collab: Collaborators,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<ClientEvent>) {
        let (events, outbox) = mpsc::unbounded_channel();
        let nick = match &config.desired_nick {
            Some(desired) => nick::coerce_nick(desired, None),
            None => nick::derive_nick(&identity, &server),
        };
        let (status, _) = watch::channel(ClientStatus::Created);

        let client = Arc::new_cyclic(|self_ref| Self {
            identity,
            server,
            collab,
            config: Mutex::new(config),
            state: Mutex::new(ConnectionState {
                nick,
                session: None,
                killed: false,
                creation_failed: false,
                last_action: None,
                explicit_disconnect: false,
                disconnect_reason: None,
            }),
            channels: Mutex::new(HashSet::new()),
            pending_nick: Mutex::new(RequestState::None),
            pending_whois: DashMap::new(),
            operator_cache: DashMap::new(),
            generations: AtomicU64::new(0),
            idle_timer: Mutex::new(None),
            status,
            events,
            self_ref: self_ref.clone(),
        });
        (client, outbox)
    }

    pub fn identity(&self) -> &ClientIdentity {
        &self.identity
    }

    pub fn client_id(&self) -> &str {
        &self.identity.id
    }

    pub fn server(&self) -> &ServerConfig {
        &self.server
    }

    pub fn is_bot(&self) -> bool {
        self.identity.is_bot
    }

    /// The nick we hold (or will request on connect).
    pub fn nick(&self) -> String {
        self.state.lock().nick.clone()
    }

    pub fn status(&self) -> ClientStatus {
        *self.status.borrow()
    }

    /// Watch lifecycle transitions.
    pub fn watch_status(&self) -> watch::Receiver<ClientStatus> {
        self.status.subscribe()
    }

    /// Channels we believe we are in.
    pub fn channels(&self) -> Vec<String> {
        self.channels.lock().iter().cloned().collect()
    }

    pub fn in_channel(&self, channel: &str) -> bool {
        self.channels.lock().contains(channel)
    }

    /// When the last outbound action happened.
    pub fn last_action_ts(&self) -> Option<DateTime<Utc>> {
        self.state.lock().last_action
    }

    /// Whether the last disconnect was requested by the bridge.
    pub fn explicit_disconnect(&self) -> bool {
        self.state.lock().explicit_disconnect
    }

    pub fn disconnect_reason(&self) -> Option<String> {
        self.state.lock().disconnect_reason.clone()
    }

    /// State of the nick change, if any was issued.
    pub fn pending_nick_state(&self) -> RequestState {
        *self.pending_nick.lock()
    }

    /// Whois state for `nick`: never asked, outstanding, or answered on
    /// this connection.
    pub fn whois_state(&self, nick: &str) -> RequestState {
        match self.pending_whois.get(&nick.to_ascii_lowercase()) {
            None => RequestState::None,
            Some(count) if *count > 0 => RequestState::Pending,
            Some(_) => RequestState::Settled,
        }
    }

    pub(crate) fn whois_pending(&self, nick: &str) -> bool {
        self.whois_state(nick) == RequestState::Pending
    }

    /// Scoped listeners currently attached to the live connection.
    pub fn listener_count(&self) -> usize {
        self.state
            .lock()
            .session
            .as_ref()
            .map_or(0, |s| s.listeners.len())
    }

    /// The usable session: connected, not killed and not dead.
    pub(crate) fn live_session(&self) -> Option<Arc<Session>> {
        let state = self.state.lock();
        if state.killed {
            return None;
        }
        state
            .session
            .as_ref()
            .filter(|s| !s.conn.is_dead())
            .cloned()
    }

    /// The usable session, waiting out an in-progress connect.
    pub(crate) async fn await_session(&self) -> Option<Arc<Session>> {
        let mut status = self.status.subscribe();
        loop {
            if let Some(session) = self.live_session() {
                return Some(session);
            }
            if *status.borrow_and_update() != ClientStatus::Connecting {
                return None;
            }
            if status.changed().await.is_err() {
                return None;
            }
        }
    }

    fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::Relaxed)
    }

    fn set_status(&self, status: ClientStatus) {
        self.status.send_replace(status);
    }

    /// Move to `status` unless killed. `Killed` is terminal.
    fn advance_status(&self, status: ClientStatus) -> bool {
        self.status.send_if_modified(|current| {
            if *current == ClientStatus::Killed {
                return false;
            }
            *current = status;
            true
        })
    }

    pub(crate) fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }

    pub(crate) fn is_own_nick(&self, nick: &str) -> bool {
        self.state.lock().nick.eq_ignore_ascii_case(nick)
    }
}
