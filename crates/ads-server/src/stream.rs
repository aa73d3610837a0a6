//! Per-connection stream counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Counters for one ADS stream.
///
/// Written by the connection task, read by status reporting.
#[derive(Debug)]
pub struct StreamStats {
    /// When the stream was identified.
    created_at: Instant,
    /// Requests received.
    requests: AtomicU64,
    /// Responses sent.
    responses: AtomicU64,
    /// Scheduled pushes processed.
    pushes: AtomicU64,
}

impl StreamStats {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self {
            created_at: Instant::now(),
            requests: AtomicU64::new(0),
            responses: AtomicU64::new(0),
            pushes: AtomicU64::new(0),
        }
    }

    /// Record a request.
    #[inline]
    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a response.
    #[inline]
    pub fn record_response(&self) {
        self.responses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a processed push.
    #[inline]
    pub fn record_push(&self) {
        self.pushes.fetch_add(1, Ordering::Relaxed);
    }

    /// Total requests.
    #[inline]
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// Total responses.
    #[inline]
    pub fn responses(&self) -> u64 {
        self.responses.load(Ordering::Relaxed)
    }

    /// Total pushes.
    #[inline]
    pub fn pushes(&self) -> u64 {
        self.pushes.load(Ordering::Relaxed)
    }

    /// Time since the stream was identified.
    #[inline]
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

impl Default for StreamStats {
    fn default() -> Self {
        Self::new()
    }
}
