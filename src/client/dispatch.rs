//! Outbound actions: messages, notices, emotes and topics.

use super::{BridgedClient, ClientStatus};
use crate::connection::OutboundCommand;
use crate::error::ActionError;
use crate::metrics;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

/// What an outbound action does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    Message,
    Notice,
    Emote,
    Topic,
    /// Anything else; rejected at dispatch.
    Unknown(String),
}

impl From<&str> for ActionKind {
    fn from(kind: &str) -> Self {
        match kind {
            "message" => Self::Message,
            "notice" => Self::Notice,
            "emote" => Self::Emote,
            "topic" => Self::Topic,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// A high-level action to deliver to a channel or nick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundAction {
    pub kind: ActionKind,
    pub text: Option<String>,
    /// When the action originated. Combined with the server's expiry window.
    pub ts: Option<DateTime<Utc>>,
}

impl OutboundAction {
    pub fn new(kind: impl Into<ActionKind>, text: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            text: Some(text.into()),
            ts: None,
        }
    }

    pub fn message(text: impl Into<String>) -> Self {
        Self::new(ActionKind::Message, text)
    }

    pub fn notice(text: impl Into<String>) -> Self {
        Self::new(ActionKind::Notice, text)
    }

    pub fn emote(text: impl Into<String>) -> Self {
        Self::new(ActionKind::Emote, text)
    }

    pub fn topic(text: impl Into<String>) -> Self {
        Self::new(ActionKind::Topic, text)
    }

    pub fn with_ts(mut self, ts: DateTime<Utc>) -> Self {
        self.ts = Some(ts);
        self
    }
}

impl BridgedClient {
    /// Deliver `action` to `target`, joining it first if needed.
    pub async fn send_action(
        &self,
        target: &str,
        action: &OutboundAction,
    ) -> Result<(), ActionError> {
        self.keep_alive();
        let expiry = action
            .ts
            .zip(self.server.expiry_timeout())
            .map(|(ts, grace)| ts + grace);
        let text = action.text.as_deref().ok_or(ActionError::MissingPayload)?;

        match &action.kind {
            ActionKind::Message | ActionKind::Notice | ActionKind::Emote => {
                self.send_message(target, &action.kind, text, expiry).await
            }
            ActionKind::Topic => self.set_topic(target, text).await,
            ActionKind::Unknown(kind) => {
                warn!(client_id = %self.identity.id, kind = %kind, "Unknown action type");
                Err(ActionError::UnknownType(kind.clone()))
            }
        }
    }

    async fn send_message(
        &self,
        target: &str,
        kind: &ActionKind,
        text: &str,
        expiry: Option<DateTime<Utc>>,
    ) -> Result<(), ActionError> {
        self.wait_for_initial_connect().await?;
        self.join_channel(target, None).await?;

        if let Some(expiry) = expiry
            && Utc::now() > expiry
        {
            warn!(
                client_id = %self.identity.id,
                target = %target,
                expired_at = %expiry,
                "Dropping expired message"
            );
            metrics::record_expired_drop();
            return Ok(());
        }

        let session = self.live_session().ok_or(ActionError::NotConnected)?;
        let target = target.to_string();
        let text = text.to_string();
        let command = match kind {
            ActionKind::Notice => OutboundCommand::Notice { target, text },
            ActionKind::Emote => OutboundCommand::Action { target, text },
            _ => OutboundCommand::Privmsg { target, text },
        };
        debug!(verb = command.verb(), "Sending message");
        session.conn.send(command).await?;
        Ok(())
    }

    /// Set the topic of `channel`, joining it first if needed.
    pub async fn set_topic(&self, channel: &str, topic: &str) -> Result<(), ActionError> {
        self.join_channel(channel, None).await?;
        let session = self.live_session().ok_or(ActionError::NotConnected)?;
        session
            .conn
            .send(OutboundCommand::Topic {
                channel: channel.to_string(),
                topic: topic.to_string(),
            })
            .await?;
        Ok(())
    }

    /// Send a MODE change for `target`.
    pub async fn set_mode(&self, target: &str, modes: &str) -> Result<(), ActionError> {
        let session = self.live_session().ok_or(ActionError::NotConnected)?;
        session
            .conn
            .send(OutboundCommand::Mode {
                target: target.to_string(),
                modes: modes.to_string(),
            })
            .await?;
        Ok(())
    }

    /// Wait until the first connect attempt has finished.
    async fn wait_for_initial_connect(&self) -> Result<(), ActionError> {
        let mut status = self.watch_status();
        let settled = *status
            .wait_for(|s| !s.is_pending())
            .await
            .map_err(|_| ActionError::NotConnected)?;
        match settled {
            ClientStatus::Failed | ClientStatus::Killed => Err(ActionError::NotConnected),
            _ => Ok(()),
        }
    }
}
