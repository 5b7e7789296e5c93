//! Scriptable in-memory connection.
//!
//! Commands are recorded and answered synchronously on the broadcast stream,
//! the way a well-behaved server would answer them, unless a behavior says
//! otherwise.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use slirc_bridge::{
    ChannelNames, ConnectError, ConnectParams, ConnectionFactory, DisconnectReason, ErrorCode,
    InboundEvent, IrcConnection, OutboundCommand, SendError, ServerConfig, ServerError,
    ServerSupport, WhoisInfo,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{broadcast, oneshot};

/// How the server answers a JOIN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinBehavior {
    /// Join and echo it.
    Echo,
    /// Ignore the JOIN entirely.
    Silent,
    /// Join, but drop the echo.
    SilentButListed,
    /// Answer with an error numeric naming the channel.
    Reject(ErrorCode),
}

/// How the server answers a NICK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NickBehavior {
    Echo,
    Silent,
    Reject(ErrorCode),
}

pub struct MockConnection {
    nick: Mutex<String>,
    channels: Mutex<HashSet<String>>,
    support: Mutex<ServerSupport>,
    events: broadcast::Sender<InboundEvent>,
    sent: Mutex<Vec<OutboundCommand>>,
    join_behavior: Mutex<JoinBehavior>,
    join_overrides: Mutex<HashMap<String, JoinBehavior>>,
    nick_behavior: Mutex<NickBehavior>,
    users: Mutex<HashMap<String, WhoisInfo>>,
    whois_silent: AtomicBool,
    rosters: Mutex<HashMap<String, HashMap<String, String>>>,
    /// Reply senders the server never answered.
    unanswered_whois: Mutex<Vec<oneshot::Sender<WhoisInfo>>>,
    unanswered_names: Mutex<Vec<oneshot::Sender<ChannelNames>>>,
    whois_requests: AtomicUsize,
    names_requests: AtomicUsize,
    dead: AtomicBool,
    disconnects: Mutex<Vec<(DisconnectReason, String)>>,
}

impl MockConnection {
    pub fn new(nick: &str) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            nick: Mutex::new(nick.to_string()),
            channels: Mutex::new(HashSet::new()),
            support: Mutex::new(ServerSupport::default()),
            events,
            sent: Mutex::new(Vec::new()),
            join_behavior: Mutex::new(JoinBehavior::Echo),
            join_overrides: Mutex::new(HashMap::new()),
            nick_behavior: Mutex::new(NickBehavior::Echo),
            users: Mutex::new(HashMap::new()),
            whois_silent: AtomicBool::new(false),
            rosters: Mutex::new(HashMap::new()),
            unanswered_whois: Mutex::new(Vec::new()),
            unanswered_names: Mutex::new(Vec::new()),
            whois_requests: AtomicUsize::new(0),
            names_requests: AtomicUsize::new(0),
            dead: AtomicBool::new(false),
            disconnects: Mutex::new(Vec::new()),
        }
    }

    // ------------------------------------------------------------------
    // Scripting
    // ------------------------------------------------------------------

    pub fn set_join_behavior(&self, behavior: JoinBehavior) {
        *self.join_behavior.lock() = behavior;
    }

    pub fn reject_join(&self, channel: &str, code: ErrorCode) {
        self.join_overrides
            .lock()
            .insert(channel.to_string(), JoinBehavior::Reject(code));
    }

    pub fn set_nick_behavior(&self, behavior: NickBehavior) {
        *self.nick_behavior.lock() = behavior;
    }

    pub fn set_support(&self, support: ServerSupport) {
        *self.support.lock() = support;
    }

    pub fn add_user(&self, nick: &str, realname: &str) {
        self.users.lock().insert(
            nick.to_ascii_lowercase(),
            WhoisInfo {
                nick: nick.to_string(),
                user: Some(nick.to_string()),
                host: Some("irc.example.net".to_string()),
                realname: Some(realname.to_string()),
                idle: Some(7),
                channels: vec!["#rust".to_string()],
            },
        );
    }

    pub fn set_whois_silent(&self, silent: bool) {
        self.whois_silent.store(silent, Ordering::SeqCst);
    }

    pub fn set_roster(&self, channel: &str, names: &[(&str, &str)]) {
        self.rosters.lock().insert(
            channel.to_string(),
            names
                .iter()
                .map(|(nick, prefix)| (nick.to_string(), prefix.to_string()))
                .collect(),
        );
    }

    /// Put the connection in `channel` without any traffic.
    pub fn force_membership(&self, channel: &str) {
        self.channels.lock().insert(channel.to_string());
    }

    /// Push an event as if the server sent it.
    pub fn emit(&self, event: InboundEvent) {
        let _ = self.events.send(event);
    }

    pub fn emit_error(&self, code: ErrorCode, subject: &str) {
        let me = self.nick();
        self.emit(InboundEvent::Error(ServerError::new(
            code,
            [me.as_str(), subject, "error"],
        )));
    }

    /// Simulate the server dropping the link.
    pub fn drop_link(&self, reason: &str) {
        self.dead.store(true, Ordering::SeqCst);
        self.emit(InboundEvent::Disconnected {
            reason: reason.to_string(),
        });
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    pub fn sent(&self) -> Vec<OutboundCommand> {
        self.sent.lock().clone()
    }

    pub fn joins(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter_map(|c| match c {
                OutboundCommand::Join { channel, .. } => Some(channel.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn parts(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter_map(|c| match c {
                OutboundCommand::Part { channel, .. } => Some(channel.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn whois_requests(&self) -> usize {
        self.whois_requests.load(Ordering::SeqCst)
    }

    pub fn names_requests(&self) -> usize {
        self.names_requests.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> Vec<(DisconnectReason, String)> {
        self.disconnects.lock().clone()
    }

    fn join_behavior_for(&self, channel: &str) -> JoinBehavior {
        self.join_overrides
            .lock()
            .get(channel)
            .cloned()
            .unwrap_or_else(|| self.join_behavior.lock().clone())
    }
}

#[async_trait]
impl IrcConnection for MockConnection {
    fn nick(&self) -> String {
        self.nick.lock().clone()
    }

    fn in_channel(&self, channel: &str) -> bool {
        self.channels.lock().contains(channel)
    }

    fn support(&self) -> ServerSupport {
        self.support.lock().clone()
    }

    fn events(&self) -> broadcast::Receiver<InboundEvent> {
        self.events.subscribe()
    }

    async fn send(&self, command: OutboundCommand) -> Result<(), SendError> {
        if self.dead.load(Ordering::SeqCst) {
            return Err(SendError {
                command: command.verb(),
                reason: "connection is dead".to_string(),
            });
        }
        self.sent.lock().push(command.clone());
        let me = self.nick();
        match command {
            OutboundCommand::Join { channel, .. } => match self.join_behavior_for(&channel) {
                JoinBehavior::Echo => {
                    self.channels.lock().insert(channel.clone());
                    self.emit(InboundEvent::Join { channel, nick: me });
                }
                JoinBehavior::SilentButListed => {
                    self.channels.lock().insert(channel);
                }
                JoinBehavior::Silent => {}
                JoinBehavior::Reject(code) => self.emit_error(code, &channel),
            },
            OutboundCommand::Part { channel, .. } => {
                self.channels.lock().remove(&channel);
                self.emit(InboundEvent::Part { channel, nick: me });
            }
            OutboundCommand::Nick(new) => {
                let behavior = self.nick_behavior.lock().clone();
                match behavior {
                    NickBehavior::Echo => {
                        *self.nick.lock() = new.clone();
                        self.emit(InboundEvent::Nick { old: me, new });
                    }
                    NickBehavior::Silent => {}
                    NickBehavior::Reject(code) => self.emit_error(code, &new),
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn whois(&self, nick: &str) -> oneshot::Receiver<WhoisInfo> {
        self.whois_requests.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        if self.whois_silent.load(Ordering::SeqCst) {
            self.unanswered_whois.lock().push(tx);
            return rx;
        }
        let known = self.users.lock().get(&nick.to_ascii_lowercase()).cloned();
        match known {
            Some(info) => {
                let _ = tx.send(info);
            }
            None => {
                self.unanswered_whois.lock().push(tx);
                self.emit_error(ErrorCode::NoSuchNick, nick);
            }
        }
        rx
    }

    fn names(&self, channel: &str) -> oneshot::Receiver<ChannelNames> {
        self.names_requests.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        let roster = self.rosters.lock().get(channel).cloned();
        match roster {
            Some(names) => {
                let _ = tx.send(ChannelNames {
                    channel: channel.to_string(),
                    names,
                });
            }
            None => self.unanswered_names.lock().push(tx),
        }
        rx
    }

    fn is_dead(&self) -> bool {
        self.dead.load(Ordering::SeqCst)
    }

    async fn disconnect(&self, reason: DisconnectReason, detail: &str) -> Result<(), SendError> {
        if self.dead.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.disconnects
            .lock()
            .push((reason.clone(), detail.to_string()));
        self.emit(InboundEvent::Disconnected {
            reason: reason.to_string(),
        });
        Ok(())
    }
}

type Setup = Box<dyn Fn(&MockConnection) + Send + Sync>;

/// Hands out a fresh [`MockConnection`] per connect.
#[derive(Default)]
pub struct MockFactory {
    connections: Mutex<Vec<Arc<MockConnection>>>,
    params: Mutex<Vec<ConnectParams>>,
    fail_with: Mutex<Option<ConnectError>>,
    assign_nick: Mutex<Option<String>>,
    setup: Mutex<Option<Setup>>,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
}

impl MockFactory {
    pub fn fail_next(&self, error: ConnectError) {
        *self.fail_with.lock() = Some(error);
    }

    /// Register as a different nick than requested.
    pub fn assign_nick(&self, nick: &str) {
        *self.assign_nick.lock() = Some(nick.to_string());
    }

    /// Run `setup` on every connection before it is handed out.
    pub fn configure(&self, setup: impl Fn(&MockConnection) + Send + Sync + 'static) {
        *self.setup.lock() = Some(Box::new(setup));
    }

    /// Hold the next connect until the returned sender fires.
    pub fn hold_next(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.gate.lock() = Some(rx);
        tx
    }

    pub fn connect_count(&self) -> usize {
        self.connections.lock().len()
    }

    pub fn last(&self) -> Arc<MockConnection> {
        self.connections
            .lock()
            .last()
            .cloned()
            .expect("no connection was created")
    }

    pub fn last_params(&self) -> ConnectParams {
        self.params
            .lock()
            .last()
            .cloned()
            .expect("connect was never called")
    }
}

#[async_trait]
impl ConnectionFactory for MockFactory {
    async fn connect(
        &self,
        _server: &ServerConfig,
        params: ConnectParams,
    ) -> Result<Arc<dyn IrcConnection>, ConnectError> {
        self.params.lock().push(params.clone());
        let gate = self.gate.lock().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        if let Some(error) = self.fail_with.lock().take() {
            return Err(error);
        }
        let nick = self
            .assign_nick
            .lock()
            .clone()
            .unwrap_or_else(|| params.nick.clone());
        let conn = Arc::new(MockConnection::new(&nick));
        if let Some(setup) = self.setup.lock().as_ref() {
            setup(&conn);
        }
        if let Some(ident) = &params.ident {
            ident.bind(40_000 + self.connect_count() as u16);
        }
        self.connections.lock().push(Arc::clone(&conn));
        Ok(conn)
    }
}
