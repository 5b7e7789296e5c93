//! slirc-bridge - per-identity IRC connection engine for chat bridges.
//!
//! Each bridged remote identity owns one [`BridgedClient`]: a long-lived
//! state machine that holds exactly one connection to an IRC network and
//! reconciles the bridge's desired state (nick, channel membership) with
//! what the server actually reports.
//!
//! The transport, line parsing, ident daemon and address allocation are
//! consumed through the traits in [`connection`] and [`identity`]; this
//! crate only drives them.

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod identity;
pub mod metrics;
pub mod telemetry;

pub use client::{
    ActionKind, BridgedClient, ClientStatus, JoinOutcome, OperatorsInfo, OutboundAction,
    RequestState, WhoisSummary, derive_nick, derive_valid_nick,
};
pub use config::{ClientConfig, MembershipConfig, Secret, ServerConfig};
pub use connection::{
    ChannelNames, ConnectParams, ConnectionFactory, ErrorCode, InboundEvent, IrcConnection,
    OutboundCommand, PrefixRanks, ServerError, ServerSupport, WhoisInfo,
};
pub use error::{
    ActionError, ConnectError, InvalidNick, JoinError, NickError, QueryError, SendError,
};
pub use events::{ClientEvent, DisconnectReason, NotificationSink, TracingSink};
pub use identity::{
    AddressAllocator, ClientIdentity, Collaborators, ConnectionObserver, IdentBinding,
    IdentRegistry, IrcNames, NameAllocator,
};
