//! Statistics tracking for the resolver.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Atomic statistics for tracking resolver activity.
pub struct Stats {
    pub requests: AtomicU64,
    pub cached: AtomicU64,
    pub forwarded: AtomicU64,
    pub dropped: AtomicU64,
    pub upstream_failures: AtomicU64,
    /// Cumulative response time in microseconds for averaging.
    total_response_time_us: AtomicU64,
    started_at: Instant,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            requests: AtomicU64::new(0),
            cached: AtomicU64::new(0),
            forwarded: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            upstream_failures: AtomicU64::new(0),
            total_response_time_us: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    pub fn record_cached(&self, elapsed: Duration) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.cached.fetch_add(1, Ordering::Relaxed);
        self.add_response_time(elapsed);
    }

    pub fn record_forwarded(&self, elapsed: Duration) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.forwarded.fetch_add(1, Ordering::Relaxed);
        self.add_response_time(elapsed);
    }

    /// An upstream round-trip failed; `answered` tells whether the client
    /// still got a (failure) response.
    pub fn record_upstream_failure(&self, elapsed: Duration, answered: bool) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.upstream_failures.fetch_add(1, Ordering::Relaxed);
        if answered {
            self.add_response_time(elapsed);
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_dropped(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    fn add_response_time(&self, elapsed: Duration) {
        self.total_response_time_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn snapshot_and_reset(&self) -> StatsSnapshot {
        let requests = self.requests.swap(0, Ordering::Relaxed);
        let cached = self.cached.swap(0, Ordering::Relaxed);
        let forwarded = self.forwarded.swap(0, Ordering::Relaxed);
        let dropped = self.dropped.swap(0, Ordering::Relaxed);
        let upstream_failures = self.upstream_failures.swap(0, Ordering::Relaxed);
        let total_us = self.total_response_time_us.swap(0, Ordering::Relaxed);

        let answered = requests.saturating_sub(dropped);
        let avg_response_ms = if answered > 0 {
            (total_us as f64 / answered as f64) / 1000.0
        } else {
            0.0
        };

        StatsSnapshot {
            uptime_secs: self.started_at.elapsed().as_secs(),
            requests,
            cached,
            forwarded,
            dropped,
            upstream_failures,
            avg_response_ms,
        }
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatsSnapshot {
    pub uptime_secs: u64,
    pub requests: u64,
    pub cached: u64,
    pub forwarded: u64,
    pub dropped: u64,
    pub upstream_failures: u64,
    pub avg_response_ms: f64,
}
