//! Contracts for the live IRC connection this crate drives.
//!
//! The transport, framing and line parsing live behind [`IrcConnection`];
//! a [`ConnectionFactory`] produces one per successful handshake. Inbound
//! traffic is surfaced as already-classified [`InboundEvent`]s on a
//! broadcast stream.

mod reply;
mod support;

pub use reply::{ErrorCode, ServerError};
pub use support::{PrefixRanks, ServerSupport};

use crate::config::{Secret, ServerConfig};
use crate::error::{ConnectError, SendError};
use crate::events::DisconnectReason;
use crate::identity::IdentBinding;
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot};

/// Everything the factory needs to open one connection.
#[derive(Debug, Clone)]
pub struct ConnectParams {
    /// Nick to request during registration. The server may assign another.
    pub nick: String,
    pub username: String,
    pub realname: String,
    /// Connection password (PASS / SASL), if any.
    pub password: Option<Secret>,
    /// Local address to bind the socket to.
    pub local_address: Option<IpAddr>,
    /// Ident mapping to publish once the local port is known.
    pub ident: Option<IdentBinding>,
}

/// Opens connections to a server.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Resolve, connect and complete registration.
    ///
    /// Resolves only once the server has accepted the registration, so the
    /// returned handle already reports the assigned nick.
    async fn connect(
        &self,
        server: &ServerConfig,
        params: ConnectParams,
    ) -> Result<Arc<dyn IrcConnection>, ConnectError>;
}

/// A registered connection to an IRC server.
#[async_trait]
pub trait IrcConnection: Send + Sync {
    /// The nick the server currently knows us by.
    fn nick(&self) -> String;

    /// Whether the connection's own channel table lists `channel`.
    fn in_channel(&self, channel: &str) -> bool;

    /// Server-advertised limits (ISUPPORT).
    fn support(&self) -> ServerSupport;

    /// Subscribe to classified inbound events.
    fn events(&self) -> broadcast::Receiver<InboundEvent>;

    /// Queue a command for the server.
    async fn send(&self, command: OutboundCommand) -> Result<(), SendError>;

    /// Issue WHOIS. The receiver completes at end-of-whois; it is never
    /// completed for a nick the server does not know.
    fn whois(&self, nick: &str) -> oneshot::Receiver<WhoisInfo>;

    /// Issue NAMES. The receiver completes at end-of-names.
    fn names(&self, channel: &str) -> oneshot::Receiver<ChannelNames>;

    /// True once the socket is gone or the server closed the link.
    fn is_dead(&self) -> bool;

    /// Record `reason` on the connection and tear it down with QUIT.
    async fn disconnect(&self, reason: DisconnectReason, detail: &str) -> Result<(), SendError>;
}

/// Commands this crate issues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundCommand {
    Privmsg { target: String, text: String },
    Notice { target: String, text: String },
    /// CTCP ACTION (`/me`).
    Action { target: String, text: String },
    Join { channel: String, key: Option<String> },
    Part { channel: String, reason: String },
    Topic { channel: String, topic: String },
    Nick(String),
    Kick { channel: String, nick: String, reason: String },
    Mode { target: String, modes: String },
    Raw(Vec<String>),
}

impl OutboundCommand {
    /// Command verb, for logging and metric labels.
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Privmsg { .. } | Self::Action { .. } => "PRIVMSG",
            Self::Notice { .. } => "NOTICE",
            Self::Join { .. } => "JOIN",
            Self::Part { .. } => "PART",
            Self::Topic { .. } => "TOPIC",
            Self::Nick(_) => "NICK",
            Self::Kick { .. } => "KICK",
            Self::Mode { .. } => "MODE",
            Self::Raw(_) => "RAW",
        }
    }
}

/// Inbound events, keyed by type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// Socket connected; `local_port` is our end of it.
    Connected { local_port: u16 },
    /// Someone (possibly us) changed nick.
    Nick { old: String, new: String },
    /// Someone (possibly us) joined a channel.
    Join { channel: String, nick: String },
    /// Someone (possibly us) left a channel.
    Part { channel: String, nick: String },
    /// An error numeric.
    Error(ServerError),
    /// The link is gone.
    Disconnected { reason: String },
}

/// Result of a WHOIS.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WhoisInfo {
    pub nick: String,
    /// Absent when the server answered end-of-whois without RPL_WHOISUSER.
    pub user: Option<String>,
    pub host: Option<String>,
    pub realname: Option<String>,
    /// Seconds idle (RPL_WHOISIDLE).
    pub idle: Option<u64>,
    pub channels: Vec<String>,
}

/// Result of a NAMES query: nick -> rank prefix string (`"@"`, `"+"`, `""`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelNames {
    pub channel: String,
    pub names: HashMap<String, String>,
}
