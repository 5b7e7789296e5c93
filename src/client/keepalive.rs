//! Idle disconnect policy.

use super::BridgedClient;
use crate::events::DisconnectReason;
use crate::metrics;
use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info};

/// The single armed idle timer.
pub(crate) struct IdleTimer {
    id: u64,
    handle: JoinHandle<()>,
}

impl BridgedClient {
    /// Record activity and re-arm the idle timer.
    ///
    /// Identities that mirror full membership, and the bridge bot, are never
    /// disconnected for inactivity.
    pub fn keep_alive(&self) {
        self.state.lock().last_action = Some(Utc::now());
        if self.server.syncs_initial_membership() || self.identity.is_bot {
            return;
        }
        let Some(idle) = self.server.idle_timeout() else {
            return;
        };

        let id = self.next_generation();
        let client = self.self_ref.clone();
        let mut slot = self.idle_timer.lock();
        let handle = tokio::spawn(async move {
            sleep(idle).await;
            let Some(client) = client.upgrade() else {
                return;
            };
            {
                let mut slot = client.idle_timer.lock();
                if slot.as_ref().is_none_or(|timer| timer.id != id) {
                    return;
                }
                // Release our own slot so the disconnect below does not abort us.
                *slot = None;
            }
            info!(client_id = %client.identity.id, secs = idle.as_secs(), "Idle timeout reached");
            metrics::record_idle_disconnect();
            let detail = format!("Idle timeout reached: {}s", idle.as_secs());
            if let Err(e) = client.disconnect(DisconnectReason::Idle, &detail, true).await {
                error!(client_id = %client.identity.id, error = %e, "Error disconnecting idle client");
            }
        });
        if let Some(previous) = slot.replace(IdleTimer { id, handle }) {
            previous.handle.abort();
        }
    }

    pub(crate) fn cancel_idle_timer(&self) {
        if let Some(timer) = self.idle_timer.lock().take() {
            timer.handle.abort();
        }
    }

    /// Whether an idle timer is armed.
    pub fn idle_timer_armed(&self) -> bool {
        self.idle_timer.lock().is_some()
    }
}
