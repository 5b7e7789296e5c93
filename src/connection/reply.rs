//! Error numerics surfaced by the connection.

use serde::Serialize;
use std::fmt;

/// An error numeric, named the way the line parser names them
/// (`err_bannedfromchan`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NoSuchNick,
    NoSuchChannel,
    TooManyChannels,
    NoNicknameGiven,
    ErroneusNickname,
    NicknameInUse,
    BanOnChan,
    NickCollision,
    UnavailResource,
    NickTooFast,
    ChannelIsFull,
    InviteOnlyChan,
    BannedFromChan,
    BadChannelKey,
    NeedReggedNick,
    NoNonReg,
    /// Anything this crate does not classify.
    Other(String),
}

impl ErrorCode {
    /// Map a numeric to its code.
    pub fn from_numeric(numeric: u16) -> Self {
        match numeric {
            401 => Self::NoSuchNick,
            403 => Self::NoSuchChannel,
            405 => Self::TooManyChannels,
            431 => Self::NoNicknameGiven,
            432 => Self::ErroneusNickname,
            433 => Self::NicknameInUse,
            435 => Self::BanOnChan,
            436 => Self::NickCollision,
            437 => Self::UnavailResource,
            438 => Self::NickTooFast,
            471 => Self::ChannelIsFull,
            473 => Self::InviteOnlyChan,
            474 => Self::BannedFromChan,
            475 => Self::BadChannelKey,
            477 => Self::NeedReggedNick,
            486 => Self::NoNonReg,
            other => Self::Other(format!("{other:03}")),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::NoSuchNick => "err_nosuchnick",
            Self::NoSuchChannel => "err_nosuchchannel",
            Self::TooManyChannels => "err_toomanychannels",
            Self::NoNicknameGiven => "err_nonicknamegiven",
            Self::ErroneusNickname => "err_erroneusnickname",
            Self::NicknameInUse => "err_nicknameinuse",
            Self::BanOnChan => "err_banonchan",
            Self::NickCollision => "err_nickcollision",
            Self::UnavailResource => "err_unavailresource",
            Self::NickTooFast => "err_nicktoofast",
            Self::ChannelIsFull => "err_channelisfull",
            Self::InviteOnlyChan => "err_inviteonlychan",
            Self::BannedFromChan => "err_bannedfromchan",
            Self::BadChannelKey => "err_badchannelkey",
            Self::NeedReggedNick => "err_needreggednick",
            Self::NoNonReg => "err_nononreg",
            Self::Other(name) => name,
        }
    }

    /// Codes that reject a JOIN.
    pub fn is_join_failure(&self) -> bool {
        matches!(
            self,
            Self::NoSuchChannel
                | Self::TooManyChannels
                | Self::ChannelIsFull
                | Self::InviteOnlyChan
                | Self::BannedFromChan
                | Self::BadChannelKey
                | Self::NeedReggedNick
        )
    }

    /// Codes that reject a NICK.
    pub fn is_nick_failure(&self) -> bool {
        matches!(
            self,
            Self::BanOnChan
                | Self::NickCollision
                | Self::NicknameInUse
                | Self::ErroneusNickname
                | Self::NoNicknameGiven
                | Self::NickTooFast
                | Self::UnavailResource
        )
    }

    /// Codes the user is always told about, whatever the bridge's
    /// notification settings.
    pub fn is_forced_notice(&self) -> bool {
        matches!(self, Self::NoNonReg | Self::NoSuchNick)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// An error reply with its arguments (`args[0]` is our own nick).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerError {
    pub code: ErrorCode,
    pub args: Vec<String>,
}

impl ServerError {
    pub fn new(code: ErrorCode, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            code,
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// The argument the error is about (the nick or channel after our own nick).
    pub fn subject(&self) -> Option<&str> {
        self.args.get(1).map(String::as_str)
    }

    /// Whether any argument names `channel`.
    pub fn mentions(&self, channel: &str) -> bool {
        self.args.iter().any(|a| a.eq_ignore_ascii_case(channel))
    }
}
