//! Per-sink delivery counters
//!
//! Written only by the sink's worker (and by the handle when the worker is
//! gone), read by the fan-out and the health endpoint.

use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};

/// Delivery counters of one sink
#[derive(Debug, Default)]
pub struct SinkMetrics {
    queue_len: AtomicUsize,
    stored: AtomicU64,
    failed: AtomicU64,
    /// Failures since the last stored record
    consecutive_failures: AtomicU64,
    /// Unix millis of the last stored record, 0 = never
    last_stored_at: AtomicI64,
}

impl SinkMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
    }

    /// A record reached the store
    pub fn record_stored(&self) {
        self.stored.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.last_stored_at
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    /// A record did not reach the store (sink error or worker gone)
    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let last_stored_at = self.last_stored_at.load(Ordering::Relaxed);
        MetricsSnapshot {
            queue_len: self.queue_len.load(Ordering::Relaxed),
            stored: self.stored.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            last_stored_at: (last_stored_at != 0).then_some(last_stored_at),
        }
    }
}

/// Point-in-time copy of `SinkMetrics`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub queue_len: usize,
    pub stored: u64,
    pub failed: u64,
    pub consecutive_failures: u64,
    pub last_stored_at: Option<i64>,
}

impl MetricsSnapshot {
    /// The most recent delivery attempt failed
    pub fn is_failing(&self) -> bool {
        self.consecutive_failures > 0
    }
}
