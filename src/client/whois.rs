//! WHOIS, NAMES and channel operator queries.

use super::{BridgedClient, JoinOutcome};
use crate::connection::{ChannelNames, ErrorCode, InboundEvent, WhoisInfo};
use crate::error::QueryError;
use crate::metrics;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

pub(crate) const WHOIS_TIMEOUT: Duration = Duration::from_secs(10);

pub(crate) const NAMES_TIMEOUT: Duration = Duration::from_secs(5);

/// The canonical channel operator prefix.
const OPERATOR_PREFIX: char = '@';

/// A WHOIS answer plus a human-readable rendering of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhoisSummary {
    pub server: String,
    pub nick: String,
    pub info: WhoisInfo,
    pub message: String,
}

/// A channel roster split into everyone and operators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorsInfo {
    pub channel: String,
    /// Every nick in the channel, sorted.
    pub nicks: Vec<String>,
    /// Nick to NAMES prefix string.
    pub names: HashMap<String, String>,
    /// Nicks ranked operator or above, sorted.
    pub operator_nicks: Vec<String>,
}

pub(crate) struct CachedOperators {
    info: Arc<OperatorsInfo>,
    /// Distinguishes this entry from a later one for the same channel.
    generation: u64,
}

/// Counts an outstanding WHOIS for `nick` until dropped.
struct PendingWhois<'a> {
    client: &'a BridgedClient,
    key: String,
}

impl<'a> PendingWhois<'a> {
    fn begin(client: &'a BridgedClient, nick: &str) -> Self {
        let key = nick.to_ascii_lowercase();
        *client.pending_whois.entry(key.clone()).or_insert(0) += 1;
        Self { client, key }
    }
}

impl Drop for PendingWhois<'_> {
    fn drop(&mut self) {
        if let Some(mut count) = self.client.pending_whois.get_mut(&self.key) {
            *count = count.saturating_sub(1);
        }
    }
}

fn render_whois(nick: &str, info: &WhoisInfo) -> String {
    let mut message = format!(
        "Whois info for '{nick}': {}@{}\nReal name: {}",
        info.user.as_deref().unwrap_or_default(),
        info.host.as_deref().unwrap_or_default(),
        info.realname.as_deref().unwrap_or_default(),
    );
    if !info.channels.is_empty() {
        message.push_str(&format!("\nOn channels: {}", info.channels.join(" ")));
    }
    if let Some(idle) = info.idle {
        message.push_str(&format!("\n{idle} seconds idle"));
    }
    message
}

impl BridgedClient {
    /// Look up `nick`. `Ok(None)` means the server does not know it.
    pub async fn whois(&self, nick: &str) -> Result<Option<WhoisSummary>, QueryError> {
        let session = self.live_session().ok_or(QueryError::NoConnection)?;
        let _pending = PendingWhois::begin(self, nick);

        let target = nick.to_string();
        let mut not_found = session.listeners.subscribe(move |event| {
            matches!(event, InboundEvent::Error(err)
                if err.code == ErrorCode::NoSuchNick
                    && err.subject().is_some_and(|s| s.eq_ignore_ascii_case(&target)))
        });
        let reply = session.conn.whois(nick);

        let lookup = async {
            tokio::select! {
                info = reply => info.map(Some).map_err(|_| QueryError::Disconnected("whois")),
                event = not_found.recv() => match event {
                    Some(_) => Ok(None),
                    None => Err(QueryError::Disconnected("whois")),
                },
            }
        };
        let outcome = timeout(WHOIS_TIMEOUT, lookup)
            .await
            .unwrap_or(Err(QueryError::Timeout("whois")));

        let summary = match outcome {
            Ok(Some(info)) if info.user.is_some() => Some(WhoisSummary {
                server: self.server.domain.clone(),
                nick: nick.to_string(),
                message: render_whois(nick, &info),
                info,
            }),
            Ok(_) => None,
            Err(e) => {
                warn!(client_id = %self.identity.id, nick = %nick, error = %e, "WHOIS failed");
                metrics::record_whois(e.error_code());
                return Err(e);
            }
        };
        metrics::record_whois(if summary.is_some() { "found" } else { "not_found" });
        Ok(summary)
    }

    /// Whether anyone holds `nick`.
    pub async fn check_nick_exists(&self, nick: &str) -> Result<bool, QueryError> {
        Ok(self.whois(nick).await?.is_some())
    }

    /// The channel roster, as NAMES reports it.
    pub async fn get_nicks(&self, channel: &str) -> Result<ChannelNames, QueryError> {
        let session = self.live_session().ok_or(QueryError::NoConnection)?;
        match timeout(NAMES_TIMEOUT, session.conn.names(channel)).await {
            Ok(Ok(names)) => Ok(names),
            Ok(Err(_)) => Err(QueryError::Disconnected("names")),
            Err(_) => Err(QueryError::Timeout("names")),
        }
    }

    /// Operators of `channel`, joining it briefly to read the roster.
    ///
    /// With a non-zero `cache_for` the result is kept for exactly that long
    /// and served from memory in the meantime.
    pub async fn get_operators(
        &self,
        channel: &str,
        key: Option<&str>,
        cache_for: Option<Duration>,
    ) -> Result<Arc<OperatorsInfo>, QueryError> {
        let cache_for = cache_for.filter(|ttl| !ttl.is_zero());
        if cache_for.is_some()
            && let Some(cached) = self.operator_cache.get(channel)
        {
            debug!(channel = %channel, "Serving operators from cache");
            return Ok(Arc::clone(&cached.info));
        }

        let joined = self.join_channel(channel, key).await?;
        let names = self.get_nicks(channel).await;
        if joined == JoinOutcome::Joined
            && let Err(e) = self.leave_channel(channel, "").await
        {
            warn!(channel = %channel, error = %e, "Failed to leave after reading operators");
        }
        let names = names?.names;

        let ranks = self
            .live_session()
            .map(|s| s.conn.support().prefixes)
            .unwrap_or_default();
        let mut nicks: Vec<String> = names.keys().cloned().collect();
        nicks.sort();
        let operator_nicks = nicks
            .iter()
            .filter(|nick| {
                names[nick.as_str()].chars().any(|prefix| {
                    prefix == OPERATOR_PREFIX || ranks.is_more_powerful(prefix, OPERATOR_PREFIX)
                })
            })
            .cloned()
            .collect();
        let info = Arc::new(OperatorsInfo {
            channel: channel.to_string(),
            nicks,
            names,
            operator_nicks,
        });

        if let Some(ttl) = cache_for {
            self.cache_operators(channel, Arc::clone(&info), ttl);
        }
        Ok(info)
    }

    fn cache_operators(&self, channel: &str, info: Arc<OperatorsInfo>, ttl: Duration) {
        let generation = self.next_generation();
        self.operator_cache
            .insert(channel.to_string(), CachedOperators { info, generation });

        let client = self.self_ref.clone();
        let channel = channel.to_string();
        tokio::spawn(async move {
            sleep(ttl).await;
            if let Some(client) = client.upgrade() {
                client
                    .operator_cache
                    .remove_if(&channel, |_, entry| entry.generation == generation);
            }
        });
    }
}
