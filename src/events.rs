//! Events a client reports to its owner.
//!
//! Lifecycle events go out on the client's outbox channel (an unbounded
//! `mpsc`, drained by the bridge). Human-readable notices for the bridged
//! user go through a [`NotificationSink`]. Both are advisory.

use crate::connection::ServerError;
use crate::identity::ClientIdentity;
use std::fmt;
use tracing::info;

/// Lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Connected and registered as `nick`.
    Connected { nick: String },
    /// Our nick changed.
    NickChange { old: String, new: String },
    /// The connection went away.
    Disconnected { reason: String, explicit: bool },
    /// A join was rejected by the server.
    JoinError { channel: String, code: String },
    /// A nick change to `nick` is in flight.
    PendingNickAdd(String),
    /// The nick change to `nick` settled.
    PendingNickRemove(String),
}

/// Why a client disconnected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// No outbound activity for the configured idle period.
    Idle,
    /// Killed by the bridge; the handle is invalidated first.
    Killed,
    /// Anything else the caller names.
    Other(String),
}

impl DisconnectReason {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Idle => "idle",
            Self::Killed => "killed",
            Self::Other(reason) => reason,
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for DisconnectReason {
    fn from(reason: &str) -> Self {
        match reason {
            "idle" => Self::Idle,
            "killed" => Self::Killed,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Delivers notices about a client to its bridged user. Fire-and-forget.
pub trait NotificationSink: Send + Sync {
    /// `force` asks the sink to deliver even if the user muted notices.
    fn send_metadata(
        &self,
        client: &ClientIdentity,
        message: &str,
        force: bool,
        raw: Option<&ServerError>,
    );
}

/// A sink that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn send_metadata(
        &self,
        client: &ClientIdentity,
        message: &str,
        force: bool,
        raw: Option<&ServerError>,
    ) {
        info!(
            client_id = %client.id,
            user_id = client.user_id.as_deref().unwrap_or("-"),
            force,
            code = raw.map(|e| e.code.as_str()).unwrap_or("-"),
            "{message}"
        );
    }
}
