//! Channel membership: join with retries, part, kick.
//!
//! A JOIN is confirmed by our own join echo. Servers that drop the echo are
//! tolerated by a recheck after [`JOIN_TIMEOUT`]: if the connection's channel
//! table lists the channel by then, the join counts as done. Otherwise the
//! JOIN is re-sent, up to [`MAX_JOIN_ATTEMPTS`] times in total.

use super::{BridgedClient, Session};
use crate::connection::{InboundEvent, OutboundCommand};
use crate::error::{JoinError, SendError};
use crate::events::ClientEvent;
use crate::metrics;
use crate::telemetry::{JoinTimer, spans};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{Instrument, debug, info, warn};

/// Time before an unconfirmed JOIN is rechecked.
pub(crate) const JOIN_TIMEOUT: Duration = Duration::from_secs(15);

/// JOINs sent for one join request before giving up.
pub(crate) const MAX_JOIN_ATTEMPTS: u32 = 5;

/// Upper bound on waiting for our own PART echo.
const PART_TIMEOUT: Duration = Duration::from_secs(10);

/// How a successful join resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// A JOIN was sent and confirmed.
    Joined,
    /// The connection was already in the channel; nothing was sent.
    AlreadyJoined,
    /// The target is a nick, not a channel; nothing was sent.
    NotAChannel,
}

enum Attempt {
    Confirmed,
    Unconfirmed,
}

impl BridgedClient {
    /// Join `channel`, retrying unconfirmed JOINs.
    ///
    /// Waits for an in-progress connect first. `key` falls back to the key
    /// configured for the channel.
    pub async fn join_channel(
        &self,
        channel: &str,
        key: Option<&str>,
    ) -> Result<JoinOutcome, JoinError> {
        let session = self.await_session().await.ok_or(JoinError::NoConnection)?;
        if session.conn.in_channel(channel) {
            return Ok(JoinOutcome::AlreadyJoined);
        }
        if !session.conn.support().is_channel(channel) {
            return Ok(JoinOutcome::NotAChannel);
        }
        if self.server.is_excluded_channel(channel) {
            return Err(JoinError::Excluded(channel.to_string()));
        }

        let key = key
            .or_else(|| self.server.channel_key(channel))
            .map(str::to_string);
        self.channels.lock().insert(channel.to_string());

        self.join_with_retries(session, channel, key)
            .instrument(spans::join(&self.identity.id, channel))
            .await
    }

    async fn join_with_retries(
        &self,
        mut session: std::sync::Arc<Session>,
        channel: &str,
        key: Option<String>,
    ) -> Result<JoinOutcome, JoinError> {
        let timer = JoinTimer::start();
        for attempt in 1..=MAX_JOIN_ATTEMPTS {
            metrics::record_join_attempt(attempt);
            debug!(attempt, "Sending JOIN");
            match self.attempt_join(&session, channel, key.as_deref()).await? {
                Attempt::Confirmed => {
                    info!(attempt, "Joined channel");
                    timer.confirm();
                    return Ok(JoinOutcome::Joined);
                }
                Attempt::Unconfirmed if session.conn.in_channel(channel) => {
                    info!(attempt, "Join was not echoed but the channel is held");
                    timer.confirm();
                    return Ok(JoinOutcome::Joined);
                }
                Attempt::Unconfirmed => {
                    warn!(attempt, max = MAX_JOIN_ATTEMPTS, "Join not confirmed in time");
                }
            }
            if attempt < MAX_JOIN_ATTEMPTS {
                session = self
                    .live_session()
                    .ok_or_else(|| JoinError::Disconnected(channel.to_string()))?;
            }
        }
        metrics::record_join_failure("retries_exhausted");
        Err(JoinError::RetriesExhausted(channel.to_string()))
    }

    /// One JOIN, raced against the recheck deadline.
    async fn attempt_join(
        &self,
        session: &Session,
        channel: &str,
        key: Option<&str>,
    ) -> Result<Attempt, JoinError> {
        let target = channel.to_string();
        let mut sub = session.listeners.subscribe(move |event| match event {
            InboundEvent::Join { channel, .. } => channel.eq_ignore_ascii_case(&target),
            InboundEvent::Error(err) => err.code.is_join_failure() && err.mentions(&target),
            _ => false,
        });
        session
            .conn
            .send(OutboundCommand::Join {
                channel: channel.to_string(),
                key: key.map(str::to_string),
            })
            .await?;

        let recheck = sleep(JOIN_TIMEOUT);
        tokio::pin!(recheck);
        loop {
            tokio::select! {
                event = sub.recv() => match event {
                    Some(InboundEvent::Join { nick, .. }) if self.is_own_nick(&nick) => {
                        return Ok(Attempt::Confirmed);
                    }
                    Some(InboundEvent::Error(err)) => {
                        warn!(code = %err.code, "Server rejected join");
                        metrics::record_join_failure(err.code.as_str());
                        self.emit(ClientEvent::JoinError {
                            channel: channel.to_string(),
                            code: err.code.to_string(),
                        });
                        return Err(JoinError::Rejected {
                            channel: channel.to_string(),
                            code: err.code,
                        });
                    }
                    Some(_) => {}
                    None => return Err(JoinError::Disconnected(channel.to_string())),
                },
                () = &mut recheck => return Ok(Attempt::Unconfirmed),
            }
        }
    }

    /// Part `channel`. No-op unless connected and holding it.
    ///
    /// Membership is dropped before the PART goes out. Resolves on our PART
    /// echo, or after a bounded wait if the server never sends one.
    pub async fn leave_channel(&self, channel: &str, reason: &str) -> Result<(), SendError> {
        let Some(session) = self.live_session() else {
            return Ok(());
        };
        if !session.conn.support().is_channel(channel) || !self.channels.lock().remove(channel) {
            return Ok(());
        }

        let target = channel.to_string();
        let mut sub = session.listeners.subscribe(move |event| {
            matches!(event, InboundEvent::Part { channel, .. } if channel.eq_ignore_ascii_case(&target))
        });
        session
            .conn
            .send(OutboundCommand::Part {
                channel: channel.to_string(),
                reason: reason.to_string(),
            })
            .await?;

        let acked = async {
            while let Some(event) = sub.recv().await {
                if let InboundEvent::Part { nick, .. } = event
                    && self.is_own_nick(&nick)
                {
                    return;
                }
            }
        };
        if timeout(PART_TIMEOUT, acked).await.is_err() {
            debug!(channel = %channel, "No PART echo; assuming parted");
        }
        Ok(())
    }

    /// Kick `nick` from `channel`. No-op unless we hold the channel.
    pub async fn kick(&self, nick: &str, channel: &str, reason: &str) -> Result<(), SendError> {
        if !self.in_channel(channel) {
            return Ok(());
        }
        let Some(session) = self.live_session() else {
            return Ok(());
        };
        info!(client_id = %self.identity.id, nick = %nick, channel = %channel, "Kicking");
        session
            .conn
            .send(OutboundCommand::Kick {
                channel: channel.to_string(),
                nick: nick.to_string(),
                reason: reason.to_string(),
            })
            .await
    }
}
