//! Unified error handling for slirc-bridge.
//!
//! One error type per operation family, each with a static code for
//! metric labels and a user-visibility flag: internal-only failures
//! ("no client yet") are never relayed to end users.

use crate::connection::ErrorCode;
use thiserror::Error;

// ============================================================================
// Transport
// ============================================================================

/// The connection refused to queue a command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to send {command}: {reason}")]
pub struct SendError {
    pub command: &'static str,
    pub reason: String,
}

// ============================================================================
// Connection setup
// ============================================================================

/// Failures while establishing a connection. Any of these marks the client
/// as unable to retry automatically.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    #[error("failed to allocate identity: {0}")]
    Allocation(String),

    #[error("failed to resolve {0}")]
    Resolve(String),

    #[error("handshake with server failed: {0}")]
    Handshake(String),

    #[error("connection setup failed previously; create a new client")]
    AlreadyFailed,

    #[error("client was killed")]
    Killed,
}

impl ConnectError {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Allocation(_) => "allocation",
            Self::Resolve(_) => "resolve",
            Self::Handshake(_) => "handshake",
            Self::AlreadyFailed => "already_failed",
            Self::Killed => "killed",
        }
    }
}

// ============================================================================
// Nick management
// ============================================================================

/// A nick rejected by strict validation, one variant per rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidNick {
    #[error("Nick '{0}' contains illegal characters.")]
    IllegalCharacters(String),

    #[error("Nick '{0}' must start with a letter.")]
    MustStartWithLetter(String),

    #[error("Nick '{nick}' is too long. (Max: {max})")]
    TooLong { nick: String, max: usize },
}

/// Nick change failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NickError {
    #[error(transparent)]
    Invalid(#[from] InvalidNick),

    #[error("Your nick is already '{0}'.")]
    AlreadyHeld(String),

    #[error("Nick '{requested}' is not valid; it would become '{valid}'.")]
    WouldChange { requested: String, valid: String },

    #[error("The nickname {nick} is taken on {domain}. Please pick a different nick.")]
    Taken { nick: String, domain: String },

    #[error("A nick change is already in progress.")]
    ChangeInFlight,

    #[error("Failed to change nick: {0}")]
    Rejected(ErrorCode),

    #[error("Timed out waiting for a response to change nick.")]
    Timeout,

    #[error("no client yet")]
    NoConnection,

    #[error("connection closed while changing nick")]
    Disconnected,

    #[error(transparent)]
    Lookup(#[from] QueryError),

    #[error(transparent)]
    Send(#[from] SendError),
}

impl NickError {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Invalid(_) => "invalid",
            Self::AlreadyHeld(_) => "already_held",
            Self::WouldChange { .. } => "would_change",
            Self::Taken { .. } => "taken",
            Self::ChangeInFlight => "in_flight",
            Self::Rejected(_) => "rejected",
            Self::Timeout => "timeout",
            Self::NoConnection => "no_connection",
            Self::Disconnected => "disconnected",
            Self::Lookup(_) => "lookup",
            Self::Send(_) => "send_error",
        }
    }

    /// Whether the message is fit to show to the bridged user.
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, Self::NoConnection | Self::Send(_))
    }
}

// ============================================================================
// Channel joins
// ============================================================================

/// Join failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinError {
    #[error("no client yet")]
    NoConnection,

    #[error("{0} is a do-not-track channel.")]
    Excluded(String),

    /// Display is exactly the server's code, e.g. `err_bannedfromchan`.
    #[error("{code}")]
    Rejected { channel: String, code: ErrorCode },

    #[error("Failed to join {0} after multiple tries")]
    RetriesExhausted(String),

    #[error("connection closed while joining {0}")]
    Disconnected(String),

    #[error(transparent)]
    Send(#[from] SendError),
}

impl JoinError {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NoConnection => "no_connection",
            Self::Excluded(_) => "excluded",
            Self::Rejected { .. } => "rejected",
            Self::RetriesExhausted(_) => "retries_exhausted",
            Self::Disconnected(_) => "disconnected",
            Self::Send(_) => "send_error",
        }
    }

    pub fn is_user_visible(&self) -> bool {
        !matches!(self, Self::NoConnection | Self::Send(_))
    }
}

// ============================================================================
// Queries (whois, names, operators)
// ============================================================================

/// Whois / names / operator query failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("no client yet")]
    NoConnection,

    #[error("Timed out waiting for {0} reply")]
    Timeout(&'static str),

    #[error("connection closed during {0}")]
    Disconnected(&'static str),

    #[error(transparent)]
    Join(#[from] JoinError),
}

impl QueryError {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NoConnection => "no_connection",
            Self::Timeout(_) => "timeout",
            Self::Disconnected(_) => "disconnected",
            Self::Join(_) => "join",
        }
    }

    pub fn is_user_visible(&self) -> bool {
        match self {
            Self::NoConnection => false,
            Self::Join(e) => e.is_user_visible(),
            _ => true,
        }
    }
}

// ============================================================================
// Outbound dispatch
// ============================================================================

/// Outbound action failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("action has no content")]
    MissingPayload,

    #[error("Unknown action type: {0}")]
    UnknownType(String),

    #[error("not connected")]
    NotConnected,

    #[error(transparent)]
    Join(#[from] JoinError),

    #[error(transparent)]
    Send(#[from] SendError),
}

impl ActionError {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MissingPayload => "missing_payload",
            Self::UnknownType(_) => "unknown_type",
            Self::NotConnected => "not_connected",
            Self::Join(_) => "join",
            Self::Send(_) => "send_error",
        }
    }
}
