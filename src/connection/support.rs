//! Server-advertised limits (ISUPPORT).

/// Nick length assumed when the server does not advertise NICKLEN (RFC 1459).
pub const DEFAULT_NICK_LEN: usize = 9;

/// What the server told us about itself during registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSupport {
    /// NICKLEN, if advertised.
    pub nick_len: Option<usize>,
    /// CHANTYPES.
    pub chan_types: String,
    /// PREFIX, most powerful first.
    pub prefixes: PrefixRanks,
}

impl Default for ServerSupport {
    fn default() -> Self {
        Self {
            nick_len: None,
            chan_types: "#&".to_string(),
            prefixes: PrefixRanks::default(),
        }
    }
}

impl ServerSupport {
    /// Effective maximum nick length.
    pub fn max_nick_len(&self) -> usize {
        self.nick_len.unwrap_or(DEFAULT_NICK_LEN)
    }

    /// Whether `target` names a channel rather than a user.
    pub fn is_channel(&self, target: &str) -> bool {
        target
            .chars()
            .next()
            .is_some_and(|c| self.chan_types.contains(c))
    }
}

/// Channel rank prefixes ordered from most to least powerful.
///
/// Parsed from a `PREFIX` value such as `(qaohv)~&@%+`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixRanks {
    modes: String,
    prefixes: String,
}

impl Default for PrefixRanks {
    fn default() -> Self {
        Self {
            modes: "ov".to_string(),
            prefixes: "@+".to_string(),
        }
    }
}

impl PrefixRanks {
    /// Parse a `PREFIX` value like `(ov)@+`.
    pub fn parse(s: &str) -> Option<Self> {
        let open = s.find('(')?;
        let close = open + 1 + s[open + 1..].find(')')?;
        let modes = &s[open + 1..close];
        let prefixes = &s[close + 1..];
        if modes.is_empty() || modes.chars().count() != prefixes.chars().count() {
            return None;
        }
        Some(Self {
            modes: modes.to_string(),
            prefixes: prefixes.to_string(),
        })
    }

    fn rank(&self, prefix: char) -> Option<usize> {
        self.prefixes.chars().position(|c| c == prefix)
    }

    /// Whether `prefix` outranks `than`. Unknown prefixes outrank nothing.
    pub fn is_more_powerful(&self, prefix: char, than: char) -> bool {
        match (self.rank(prefix), self.rank(than)) {
            (Some(a), Some(b)) => a < b,
            (Some(_), None) => true,
            _ => false,
        }
    }

    /// Mode letter for a prefix symbol (`@` -> `o`).
    pub fn mode_for_prefix(&self, prefix: char) -> Option<char> {
        self.rank(prefix).and_then(|i| self.modes.chars().nth(i))
    }
}
