//! Metrics for the ADS server.
//!
//! Recorded through the `metrics` facade; install any recorder (for example
//! a Prometheus exporter) in the binary to collect them.
//!
//! | Metric | Kind | Labels |
//! |--------|------|--------|
//! | `ads_requests_total` | counter | `type_url` |
//! | `ads_responses_total` | counter | `type_url`, `trigger` |
//! | `ads_response_resources` | histogram | `type_url` |
//! | `ads_acks_total` / `ads_nacks_total` | counter | `type_url` |
//! | `ads_stale_nonces_total` | counter | `type_url` |
//! | `ads_unsupported_type_urls_total` | counter | |
//! | `ads_generation_failures_total` | counter | `type_url` |
//! | `ads_pushes_total` | counter | `full` |
//! | `ads_push_fanout` | histogram | |
//! | `ads_pushes_dropped_total` | counter | |
//! | `ads_active_connections` | gauge | |
//! | `ads_connection_duration_seconds` | histogram | |

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge, histogram};

/// What caused a response to be sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseTrigger {
    /// Answer to a discovery request.
    Request,
    /// Scheduled push.
    Push,
}

impl ResponseTrigger {
    fn as_str(self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Push => "push",
        }
    }
}

/// Metrics handle for the ADS server. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct AdsMetrics {
    inner: Arc<AdsMetricsInner>,
}

#[derive(Debug, Default)]
struct AdsMetricsInner {
    active_connections: AtomicU64,
}

impl AdsMetrics {
    /// Create a new metrics instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an incoming request.
    pub fn record_request(&self, type_url: &str) {
        counter!("ads_requests_total", "type_url" => type_url.to_string()).increment(1);
    }

    /// Record a response sent.
    pub fn record_response(&self, type_url: &str, resources: usize, trigger: ResponseTrigger) {
        counter!(
            "ads_responses_total",
            "type_url" => type_url.to_string(),
            "trigger" => trigger.as_str()
        )
        .increment(1);
        histogram!("ads_response_resources", "type_url" => type_url.to_string())
            .record(resources as f64);
    }

    /// Record an ACK.
    pub fn record_ack(&self, type_url: &str) {
        counter!("ads_acks_total", "type_url" => type_url.to_string()).increment(1);
    }

    /// Record a NACK.
    pub fn record_nack(&self, type_url: &str) {
        counter!("ads_nacks_total", "type_url" => type_url.to_string()).increment(1);
    }

    /// Record a request carrying a stale nonce.
    pub fn record_stale(&self, type_url: &str) {
        counter!("ads_stale_nonces_total", "type_url" => type_url.to_string()).increment(1);
    }

    /// Record a request for an unknown type URL.
    pub fn record_unsupported(&self) {
        counter!("ads_unsupported_type_urls_total").increment(1);
    }

    /// Record a resource generator failure.
    pub fn record_generation_failure(&self, type_url: &str) {
        counter!("ads_generation_failures_total", "type_url" => type_url.to_string())
            .increment(1);
    }

    /// Record a scheduled push and how many connections it reached.
    pub fn record_push(&self, full: bool, delivered: usize) {
        counter!("ads_pushes_total", "full" => if full { "true" } else { "false" }).increment(1);
        histogram!("ads_push_fanout").record(delivered as f64);
    }

    /// Record a push dropped because its connection was closing.
    pub fn record_push_dropped(&self) {
        counter!("ads_pushes_dropped_total").increment(1);
    }

    /// Record a connection opened.
    pub fn connection_opened(&self) {
        let count = self.inner.active_connections.fetch_add(1, Ordering::Relaxed) + 1;
        counter!("ads_connections_opened_total").increment(1);
        gauge!("ads_active_connections").set(count as f64);
    }

    /// Record a connection closed.
    pub fn connection_closed(&self, duration: Duration) {
        let count = self
            .inner
            .active_connections
            .fetch_sub(1, Ordering::Relaxed)
            .saturating_sub(1);
        counter!("ads_connections_closed_total").increment(1);
        gauge!("ads_active_connections").set(count as f64);
        histogram!("ads_connection_duration_seconds").record(duration.as_secs_f64());
    }

    /// Current number of active connections.
    pub fn active_connections(&self) -> u64 {
        self.inner.active_connections.load(Ordering::Relaxed)
    }
}
