//! Logging setup and standard spans.

use tokio::time::Instant;
use tracing_subscriber::EnvFilter;

/// Install a global `fmt` subscriber.
///
/// `RUST_LOG` wins over `default_filter`. Does nothing if a subscriber is
/// already installed, so embedding applications keep theirs.
pub fn init(default_filter: &str, json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if installed.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

/// Times a join from its first JOIN until confirmation.
pub(crate) struct JoinTimer {
    start: Instant,
}

impl JoinTimer {
    pub(crate) fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Record the elapsed time as a confirmed join.
    pub(crate) fn confirm(self) {
        crate::metrics::record_join_latency(self.start.elapsed().as_secs_f64());
    }
}

/// Standardized span constructors.
pub mod spans {
    use tracing::{Span, info_span};

    /// Span for one client connection; the event pump runs inside it.
    pub fn client(client_id: &str, server: &str, nick: &str) -> Span {
        info_span!("client", client_id = %client_id, server = %server, nick = %nick)
    }

    /// Span for a join, including its retries.
    pub fn join(client_id: &str, channel: &str) -> Span {
        info_span!("join", client_id = %client_id, channel = %channel)
    }
}
