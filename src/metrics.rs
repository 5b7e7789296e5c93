//! Prometheus metrics for bridged clients.
//!
//! Metrics are process-wide and aggregated over every client. Recording is a
//! no-op until [`init`] has run, so library users that do not scrape pay
//! nothing.
//!
//! - `bridge_connects_total{result}` - connection attempts by outcome
//! - `bridge_join_attempts_total` / `bridge_join_retries_total`
//! - `bridge_join_failures_total{reason}` - server code or local reason
//! - `bridge_join_duration_seconds` - time from first JOIN to confirmation
//! - `bridge_nick_changes_total{result}`
//! - `bridge_whois_total{result}`
//! - `bridge_idle_disconnects_total`
//! - `bridge_expired_drops_total` - messages dropped past their expiry

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

// ========================================================================
// Connection lifecycle
// ========================================================================

pub static CONNECTS: OnceLock<IntCounterVec> = OnceLock::new();

pub static IDLE_DISCONNECTS: OnceLock<IntCounter> = OnceLock::new();

// ========================================================================
// Joins
// ========================================================================

pub static JOIN_ATTEMPTS: OnceLock<IntCounter> = OnceLock::new();

/// JOINs re-sent after an unconfirmed attempt.
pub static JOIN_RETRIES: OnceLock<IntCounter> = OnceLock::new();

pub static JOIN_FAILURES: OnceLock<IntCounterVec> = OnceLock::new();

pub static JOIN_LATENCY: OnceLock<Histogram> = OnceLock::new();

// ========================================================================
// Queries and dispatch
// ========================================================================

pub static NICK_CHANGES: OnceLock<IntCounterVec> = OnceLock::new();

pub static WHOIS_QUERIES: OnceLock<IntCounterVec> = OnceLock::new();

pub static EXPIRED_DROPS: OnceLock<IntCounter> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Safe to call more than once; later calls keep the first metrics.
pub fn init() {
    let r = registry();

    macro_rules! register {
        ($metric:ident, $init:expr) => {
            match $init {
                Ok(m) => {
                    if $metric.get().is_none() {
                        if let Err(e) = r.register(Box::new(m.clone())) {
                            tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
                        }
                        let _ = $metric.set(m);
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, concat!("Failed to create metric ", stringify!($metric)));
                }
            }
        };
    }

    register!(CONNECTS, IntCounterVec::new(Opts::new("bridge_connects_total", "Connection attempts by result"), &["result"]));
    register!(IDLE_DISCONNECTS, IntCounter::new("bridge_idle_disconnects_total", "Clients disconnected for inactivity"));
    register!(JOIN_ATTEMPTS, IntCounter::new("bridge_join_attempts_total", "JOIN commands issued"));
    register!(JOIN_RETRIES, IntCounter::new("bridge_join_retries_total", "JOIN commands re-issued after an unconfirmed attempt"));
    register!(JOIN_FAILURES, IntCounterVec::new(Opts::new("bridge_join_failures_total", "Joins that failed, by reason"), &["reason"]));
    register!(JOIN_LATENCY, Histogram::with_opts(
        HistogramOpts::new("bridge_join_duration_seconds", "Time until a join was confirmed")
            .buckets(vec![0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 75.0])));
    register!(NICK_CHANGES, IntCounterVec::new(Opts::new("bridge_nick_changes_total", "Nick changes by result"), &["result"]));
    register!(WHOIS_QUERIES, IntCounterVec::new(Opts::new("bridge_whois_total", "WHOIS queries by result"), &["result"]));
    register!(EXPIRED_DROPS, IntCounter::new("bridge_expired_drops_total", "Messages dropped because they expired before delivery"));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

// ============================================================================
// Recording helpers
// ============================================================================

#[inline]
fn inc(metric: &OnceLock<IntCounter>) {
    if let Some(c) = metric.get() {
        c.inc();
    }
}

#[inline]
fn inc_label(metric: &OnceLock<IntCounterVec>, label: &str) {
    if let Some(c) = metric.get() {
        c.with_label_values(&[label]).inc();
    }
}

/// Record a connection attempt; `result` is `"ok"` or an error code.
#[inline]
pub fn record_connect(result: &str) {
    inc_label(&CONNECTS, result);
}

#[inline]
pub fn record_idle_disconnect() {
    inc(&IDLE_DISCONNECTS);
}

#[inline]
pub fn record_join_attempt(attempt: u32) {
    inc(&JOIN_ATTEMPTS);
    if attempt > 1 {
        inc(&JOIN_RETRIES);
    }
}

#[inline]
pub fn record_join_failure(reason: &str) {
    inc_label(&JOIN_FAILURES, reason);
}

#[inline]
pub fn record_join_latency(secs: f64) {
    if let Some(h) = JOIN_LATENCY.get() {
        h.observe(secs);
    }
}

#[inline]
pub fn record_nick_change(result: &str) {
    inc_label(&NICK_CHANGES, result);
}

#[inline]
pub fn record_whois(result: &str) {
    inc_label(&WHOIS_QUERIES, result);
}

#[inline]
pub fn record_expired_drop() {
    inc(&EXPIRED_DROPS);
}
