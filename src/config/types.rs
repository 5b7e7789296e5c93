//! Core configuration types and loading.

use super::secret::Secret;
use chrono::TimeDelta;
use glob::{MatchOptions, Pattern};
use ipnet::Ipv6Net;
use serde::Deserialize;
use std::collections::HashMap;
use std::net::Ipv6Addr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Descriptor of the IRC server a bridge connects identities to.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Server domain (e.g., "irc.straylight.net").
    pub domain: String,
    /// Nick derivation template. Supports `$USERID`, `$LOCALPART` and
    /// `$DISPLAY` (display name, falling back to the localpart).
    #[serde(default = "default_nick_template")]
    pub nick_template: String,
    /// Seconds of outbound inactivity before an identity is disconnected.
    /// 0 disables the idle policy.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    /// User modes applied after connecting (without the leading `+`).
    #[serde(default)]
    pub user_modes: String,
    /// Prefix to allocate per-identity source addresses from.
    pub ipv6_prefix: Option<Ipv6Net>,
    /// Keys for channels that need one.
    #[serde(default)]
    pub channel_keys: HashMap<String, String>,
    /// Channels (glob patterns) the bridge must never join.
    #[serde(default)]
    pub excluded_channels: Vec<String>,
    /// Membership mirroring settings.
    #[serde(default)]
    pub membership: MembershipConfig,
    /// Grace window after an action's origin timestamp during which it may
    /// still be delivered.
    pub expiry_timeout_ms: Option<u64>,
    /// Server connection password.
    pub password: Option<Secret>,
}

/// Membership mirroring configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MembershipConfig {
    /// Mirror the full membership list on startup. Identities mirrored this
    /// way are kept connected regardless of activity.
    #[serde(default)]
    pub initial: bool,
}

fn default_nick_template() -> String {
    "M-$DISPLAY".to_string()
}

fn default_idle_timeout() -> u64 {
    172_800
}

impl ServerConfig {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// A descriptor with defaults for everything but the domain.
    pub fn with_domain(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            nick_template: default_nick_template(),
            idle_timeout_secs: default_idle_timeout(),
            user_modes: String::new(),
            ipv6_prefix: None,
            channel_keys: HashMap::new(),
            excluded_channels: Vec::new(),
            membership: MembershipConfig::default(),
            expiry_timeout_ms: None,
            password: None,
        }
    }

    /// Idle timeout, or `None` when disabled.
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }

    /// Expiry grace window for outbound actions.
    pub fn expiry_timeout(&self) -> Option<TimeDelta> {
        let ms = i64::try_from(self.expiry_timeout_ms?).ok()?;
        (ms > 0).then(|| TimeDelta::milliseconds(ms))
    }

    /// Configured key for `channel`, if any.
    pub fn channel_key(&self, channel: &str) -> Option<&str> {
        self.channel_keys
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(channel))
            .map(|(_, key)| key.as_str())
    }

    /// Whether `channel` matches an exclusion pattern.
    pub fn is_excluded_channel(&self, channel: &str) -> bool {
        let options = MatchOptions {
            case_sensitive: false,
            ..MatchOptions::new()
        };
        self.excluded_channels.iter().any(|pattern| {
            Pattern::new(pattern).is_ok_and(|p| p.matches_with(channel, options))
        })
    }

    /// Whether identities on this server mirror full membership.
    pub fn syncs_initial_membership(&self) -> bool {
        self.membership.initial
    }

    /// Expand the nick template for a bridged user.
    pub fn nick_for(&self, user_id: &str, display_name: Option<&str>) -> String {
        let localpart = user_id
            .strip_prefix('@')
            .unwrap_or(user_id)
            .split(':')
            .next()
            .unwrap_or_default();
        let display = display_name
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .unwrap_or(localpart);
        self.nick_template
            .replace("$USERID", user_id)
            .replace("$LOCALPART", localpart)
            .replace("$DISPLAY", display)
    }
}

/// Per-identity connection settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientConfig {
    /// Nick the identity asked for, overriding the server template.
    pub desired_nick: Option<String>,
    /// Username (ident) override.
    pub username: Option<String>,
    /// Identity-specific connection password.
    pub password: Option<Secret>,
    /// Source address allocated from the server's IPv6 prefix.
    pub ipv6_address: Option<Ipv6Addr>,
}
