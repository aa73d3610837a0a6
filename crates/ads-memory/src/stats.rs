//! Generation statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for resource generation.
///
/// All counters are atomic and can be safely accessed from multiple threads.
#[derive(Debug, Default)]
pub struct GenerationStats {
    /// Successful generate calls.
    generations: AtomicU64,
    /// Resources returned across all calls.
    resources: AtomicU64,
    /// Failed generate calls.
    failures: AtomicU64,
}

impl GenerationStats {
    /// Create new statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful generate call.
    #[inline]
    pub fn record_generation(&self, resources: usize) {
        self.generations.fetch_add(1, Ordering::Relaxed);
        self.resources.fetch_add(resources as u64, Ordering::Relaxed);
    }

    /// Record a failed generate call.
    #[inline]
    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Total successful generate calls.
    #[inline]
    pub fn generations(&self) -> u64 {
        self.generations.load(Ordering::Relaxed)
    }

    /// Total resources generated.
    #[inline]
    pub fn resources(&self) -> u64 {
        self.resources.load(Ordering::Relaxed)
    }

    /// Total failed generate calls.
    #[inline]
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}
