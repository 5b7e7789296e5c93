//! Connection lifecycle: connect, reconnect, disconnect, kill.

use super::listeners::{ListenerRegistry, spawn_pump};
use super::{BridgedClient, ClientStatus, Session};
use crate::connection::ConnectParams;
use crate::error::{ConnectError, SendError};
use crate::events::{ClientEvent, DisconnectReason};
use crate::identity::IdentBinding;
use crate::metrics;
use crate::telemetry::spans;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

impl BridgedClient {
    /// Establish the connection.
    ///
    /// On failure the client is marked unable to retry; the bridge has to
    /// construct a new one.
    #[instrument(skip(self), fields(client_id = %self.identity.id, server = %self.server.domain))]
    pub async fn connect(&self) -> Result<(), ConnectError> {
        {
            let state = self.state.lock();
            if state.creation_failed {
                return Err(ConnectError::AlreadyFailed);
            }
        }
        if !self.advance_status(ClientStatus::Connecting) {
            return Err(ConnectError::Killed);
        }
        match self.establish().await {
            Ok(()) => {
                metrics::record_connect("ok");
                Ok(())
            }
            Err(ConnectError::Killed) => {
                metrics::record_connect(ConnectError::Killed.error_code());
                Err(ConnectError::Killed)
            }
            Err(e) => {
                warn!(error = %e, "Failed to connect");
                metrics::record_connect(e.error_code());
                self.state.lock().creation_failed = true;
                self.advance_status(ClientStatus::Failed);
                Err(e)
            }
        }
    }

    async fn establish(&self) -> Result<(), ConnectError> {
        let mut config = self.config.lock().clone();
        let names = self.collab.names.allocate(&self.identity, &config).await?;

        if let Some(prefix) = self.server.ipv6_prefix {
            let allocator = self.collab.addresses.as_ref().ok_or_else(|| {
                ConnectError::Allocation(format!("no address allocator for {prefix}"))
            })?;
            allocator.allocate(prefix, &mut config).await?;
            *self.config.lock() = config.clone();
        }

        let params = ConnectParams {
            nick: self.nick(),
            username: names.username.clone(),
            realname: names.realname,
            password: config
                .password
                .clone()
                .or_else(|| self.identity.credential.clone())
                .or_else(|| self.server.password.clone()),
            local_address: config.ipv6_address.map(IpAddr::V6),
            ident: self
                .collab
                .ident
                .as_ref()
                .map(|registry| IdentBinding::new(names.username, Arc::clone(registry))),
        };
        let requested = params.nick.clone();
        let conn = self.collab.factory.connect(&self.server, params).await?;

        let assigned = conn.nick();
        let installed = {
            let mut state = self.state.lock();
            if state.killed {
                false
            } else {
                let generation = self.next_generation();
                let listeners = Arc::new(ListenerRegistry::default());
                let pump = spawn_pump(
                    self.self_ref.clone(),
                    Arc::clone(&conn),
                    Arc::clone(&listeners),
                    generation,
                    spans::client(&self.identity.id, &self.server.domain, &assigned),
                );
                state.session = Some(Arc::new(Session {
                    conn: Arc::clone(&conn),
                    listeners,
                    generation,
                    pump,
                }));
                state.nick = assigned.clone();
                state.explicit_disconnect = false;
                state.disconnect_reason = None;
                true
            }
        };
        if installed {
            // Settled whois entries describe the previous connection.
            self.pending_whois.retain(|_, count| *count > 0);
        } else {
            info!("Killed while connecting; dropping the new connection");
            if let Err(e) = conn
                .disconnect(DisconnectReason::Killed, "Killed while connecting")
                .await
            {
                warn!(error = %e, "Failed to drop connection of killed client");
            }
            return Err(ConnectError::Killed);
        }

        if let Some(observer) = &self.collab.observer {
            observer.on_connection_created(self, &conn);
        }
        if !requested.eq_ignore_ascii_case(&assigned) {
            info!(requested = %requested, assigned = %assigned, "Server assigned a different nick");
        }

        if !self.advance_status(ClientStatus::Connected) {
            return Err(ConnectError::Killed);
        }
        info!(nick = %assigned, "Connected");
        self.emit(ClientEvent::Connected {
            nick: assigned.clone(),
        });
        self.keep_alive();
        self.apply_user_modes(&assigned).await;
        Ok(())
    }

    /// Best effort: failures are reported to the user, not raised.
    async fn apply_user_modes(&self, nick: &str) {
        let modes = &self.server.user_modes;
        if modes.is_empty() || self.identity.is_bot {
            return;
        }
        if let Err(e) = self.set_mode(nick, &format!("+{modes}")).await {
            warn!(modes = %modes, error = %e, "Failed to set user modes");
            self.collab.sink.send_metadata(
                &self.identity,
                &format!("Failed to set user modes '{modes}' on {}: {e}", self.server.domain),
                false,
                None,
            );
        }
    }

    /// Connect again and rejoin every known channel, one at a time.
    ///
    /// A channel that fails to rejoin is logged and skipped.
    pub async fn reconnect(
        &self,
        channels: impl IntoIterator<Item = String>,
    ) -> Result<(), ConnectError> {
        self.channels.lock().extend(channels);
        self.connect().await?;

        let channels = self.channels();
        info!(
            client_id = %self.identity.id,
            nick = %self.nick(),
            count = channels.len(),
            "Reconnected; rejoining channels"
        );
        for channel in channels {
            if let Err(e) = self.join_channel(&channel, None).await {
                error!(channel = %channel, error = %e, "Failed to rejoin channel");
            }
        }
        info!(client_id = %self.identity.id, "Rejoined channels");
        Ok(())
    }

    /// Tear the connection down. No-op without a live connection.
    pub async fn disconnect(
        &self,
        reason: DisconnectReason,
        detail: &str,
        explicit: bool,
    ) -> Result<(), SendError> {
        let session = {
            let mut state = self.state.lock();
            let Some(session) = state.session.clone() else {
                return Ok(());
            };
            if session.conn.is_dead() {
                return Ok(());
            }
            state.explicit_disconnect = explicit;
            if state.disconnect_reason.is_none() {
                state.disconnect_reason = Some(if detail.is_empty() {
                    reason.to_string()
                } else {
                    detail.to_string()
                });
            }
            session
        };
        self.cancel_idle_timer();
        info!(
            client_id = %self.identity.id,
            reason = %reason,
            detail = %detail,
            explicit,
            "Disconnecting"
        );
        session.conn.disconnect(reason, detail).await
    }

    /// Invalidate the handle immediately, then disconnect as "killed".
    pub async fn kill(&self, reason: &str) -> Result<(), SendError> {
        self.state.lock().killed = true;
        self.set_status(ClientStatus::Killed);
        self.disconnect(DisconnectReason::Killed, reason, false).await
    }

    /// True if setup failed or the connection reports itself dead.
    pub fn is_dead(&self) -> bool {
        let state = self.state.lock();
        state.creation_failed || state.session.as_ref().is_some_and(|s| s.conn.is_dead())
    }

    pub(super) fn on_disconnected(&self, reason: &str) {
        let explicit = {
            let mut state = self.state.lock();
            if state.disconnect_reason.is_none() {
                state.disconnect_reason = Some(reason.to_string());
            }
            state.explicit_disconnect
        };
        self.cancel_idle_timer();
        self.status.send_if_modified(|status| {
            if *status != ClientStatus::Connected {
                return false;
            }
            *status = ClientStatus::Dead;
            true
        });
        info!(reason = %reason, explicit, "Client disconnected");
        self.emit(ClientEvent::Disconnected {
            reason: reason.to_string(),
            explicit,
        });
    }
}
