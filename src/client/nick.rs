//! Nick validation and negotiation.
//!
//! Validity rules (RFC 2812 section 2.3.1, applied in order):
//! 1. Only `A-Z a-z 0-9 [ ] ^ \ { } - ` _ |` are allowed.
//! 2. The first character must be a letter.
//! 3. At most NICKLEN characters (9 if the server does not say).

use super::{BridgedClient, RequestState};
use crate::config::ServerConfig;
use crate::connection::{InboundEvent, OutboundCommand};
use crate::error::{InvalidNick, NickError};
use crate::events::ClientEvent;
use crate::identity::ClientIdentity;
use crate::metrics;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

/// How long the server gets to confirm or reject a NICK.
pub(crate) const NICK_TIMEOUT: Duration = Duration::from_secs(10);

/// Letter prepended to nicks that do not start with one.
const SYNTHETIC_PREFIX: char = 'M';

#[inline]
fn is_nick_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(c, '[' | ']' | '^' | '\\' | '{' | '}' | '-' | '`' | '_' | '|')
}

/// Derive a protocol-valid nick from `nick`.
///
/// In strict mode the first rule that `nick` breaks is reported. Otherwise
/// the nick is coerced and this never fails. `max_len` is the limit of the
/// live connection; without one no length rule applies.
pub fn derive_valid_nick(
    nick: &str,
    strict: bool,
    max_len: Option<usize>,
) -> Result<String, InvalidNick> {
    let mut valid: String = nick.chars().filter(|c| is_nick_char(*c)).collect();
    if strict && valid != nick {
        return Err(InvalidNick::IllegalCharacters(nick.to_string()));
    }

    if !valid.starts_with(|c: char| c.is_ascii_alphabetic()) {
        if strict {
            return Err(InvalidNick::MustStartWithLetter(nick.to_string()));
        }
        valid.insert(0, SYNTHETIC_PREFIX);
    }

    if let Some(max) = max_len.map(|m| m.max(1))
        && valid.len() > max
    {
        if strict {
            return Err(InvalidNick::TooLong {
                nick: nick.to_string(),
                max,
            });
        }
        // Only ASCII survives the filter, so byte truncation is safe.
        valid.truncate(max);
    }

    Ok(valid)
}

/// Coercive derivation, which cannot fail.
pub(crate) fn coerce_nick(nick: &str, max_len: Option<usize>) -> String {
    derive_valid_nick(nick, false, max_len).unwrap_or_else(|_| SYNTHETIC_PREFIX.to_string())
}

/// The nick an identity asks for before it has ever connected: the
/// server's template, expanded and coerced.
pub fn derive_nick(identity: &ClientIdentity, server: &ServerConfig) -> String {
    let user_id = identity.user_id.as_deref().unwrap_or("bridge");
    coerce_nick(
        &server.nick_for(user_id, identity.display_name.as_deref()),
        None,
    )
}

/// Marks a nick change in flight; settles and notifies on drop.
struct PendingNick<'a> {
    client: &'a BridgedClient,
    nick: String,
}

impl<'a> PendingNick<'a> {
    fn begin(client: &'a BridgedClient, nick: &str) -> Result<Self, NickError> {
        {
            let mut state = client.pending_nick.lock();
            if *state == RequestState::Pending {
                return Err(NickError::ChangeInFlight);
            }
            *state = RequestState::Pending;
        }
        client.emit(ClientEvent::PendingNickAdd(nick.to_string()));
        Ok(Self {
            client,
            nick: nick.to_string(),
        })
    }
}

impl Drop for PendingNick<'_> {
    fn drop(&mut self) {
        *self.client.pending_nick.lock() = RequestState::Settled;
        self.client
            .emit(ClientEvent::PendingNickRemove(std::mem::take(&mut self.nick)));
    }
}

impl BridgedClient {
    /// Validate `nick` against the live connection's NICKLEN.
    pub fn valid_nick(&self, nick: &str, strict: bool) -> Result<String, InvalidNick> {
        let max_len = self.live_session().map(|s| s.conn.support().max_nick_len());
        derive_valid_nick(nick, strict, max_len)
    }

    /// Change nick, checking first that nobody holds the new one.
    ///
    /// Resolves with a human-readable confirmation.
    pub async fn change_nick(&self, new_nick: &str, strict: bool) -> Result<String, NickError> {
        let valid = self.valid_nick(new_nick, strict)?;
        if valid == self.nick() {
            return Err(NickError::AlreadyHeld(valid));
        }
        if strict && valid != new_nick {
            return Err(NickError::WouldChange {
                requested: new_nick.to_string(),
                valid,
            });
        }
        if self.live_session().is_none() {
            return Err(NickError::NoConnection);
        }
        if self.check_nick_exists(&valid).await? {
            return Err(NickError::Taken {
                nick: valid,
                domain: self.server.domain.clone(),
            });
        }
        self.send_nick_command(&valid).await
    }

    async fn send_nick_command(&self, nick: &str) -> Result<String, NickError> {
        let session = self.live_session().ok_or(NickError::NoConnection)?;
        let _pending = PendingNick::begin(self, nick)?;
        let old = self.nick();

        let mut sub = session.listeners.subscribe(|event| match event {
            InboundEvent::Nick { .. } => true,
            InboundEvent::Error(err) => err.code.is_nick_failure(),
            _ => false,
        });
        session
            .conn
            .send(OutboundCommand::Nick(nick.to_string()))
            .await?;

        let wait = async {
            while let Some(event) = sub.recv().await {
                match event {
                    InboundEvent::Nick { old: from, new } if from.eq_ignore_ascii_case(&old) => {
                        self.apply_nick_change(&from, &new);
                        return Ok(format!("Nick changed from '{from}' to '{new}'."));
                    }
                    InboundEvent::Error(err) => return Err(NickError::Rejected(err.code)),
                    _ => {}
                }
            }
            Err(NickError::Disconnected)
        };
        let outcome = timeout(NICK_TIMEOUT, wait)
            .await
            .unwrap_or(Err(NickError::Timeout));

        match &outcome {
            Ok(message) => {
                info!(client_id = %self.identity.id, "{message}");
                metrics::record_nick_change("ok");
            }
            Err(e) => {
                warn!(client_id = %self.identity.id, nick = %nick, error = %e, "Nick change failed");
                metrics::record_nick_change(e.error_code());
            }
        }
        outcome
    }
}
