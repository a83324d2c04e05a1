//! Per-index merge counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters updated by producers and the consumer.
#[derive(Debug, Default)]
pub struct MergeMetrics {
    pub(crate) pages_received: AtomicU64,
    pub(crate) pages_dropped: AtomicU64,
    pub(crate) rows_received: AtomicU64,
    pub(crate) rows_yielded: AtomicU64,
    pub(crate) last_markers: AtomicU64,
    pub(crate) fail_markers: AtomicU64,
    pub(crate) duplicate_markers: AtomicU64,
    pub(crate) protocol_violations: AtomicU64,
    pub(crate) credits_granted: AtomicU64,
    pub(crate) source_order_violations: AtomicU64,
    pub(crate) consumer_waits: AtomicU64,
    pub(crate) consumer_wait_us: AtomicU64,
}

/// Point-in-time copy of [`MergeMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeMetricsSnapshot {
    /// Pages accepted from sources (data pages and markers).
    pub pages_received: u64,
    /// Pages ignored because the merge had already failed or been cancelled.
    pub pages_dropped: u64,
    pub rows_received: u64,
    pub rows_yielded: u64,
    pub last_markers: u64,
    pub fail_markers: u64,
    /// Retransmitted last-markers, and fail-markers racing the first failure.
    pub duplicate_markers: u64,
    pub protocol_violations: u64,
    /// Next-page requests issued to the transport.
    pub credits_granted: u64,
    /// Adjacent rows of one source page that were out of merge order.
    pub source_order_violations: u64,
    /// Times the consumer had to block for pages.
    pub consumer_waits: u64,
    pub consumer_wait_us: u64,
}

impl MergeMetrics {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MergeMetricsSnapshot {
        MergeMetricsSnapshot {
            pages_received: self.pages_received.load(Ordering::Relaxed),
            pages_dropped: self.pages_dropped.load(Ordering::Relaxed),
            rows_received: self.rows_received.load(Ordering::Relaxed),
            rows_yielded: self.rows_yielded.load(Ordering::Relaxed),
            last_markers: self.last_markers.load(Ordering::Relaxed),
            fail_markers: self.fail_markers.load(Ordering::Relaxed),
            duplicate_markers: self.duplicate_markers.load(Ordering::Relaxed),
            protocol_violations: self.protocol_violations.load(Ordering::Relaxed),
            credits_granted: self.credits_granted.load(Ordering::Relaxed),
            source_order_violations: self.source_order_violations.load(Ordering::Relaxed),
            consumer_waits: self.consumer_waits.load(Ordering::Relaxed),
            consumer_wait_us: self.consumer_wait_us.load(Ordering::Relaxed),
        }
    }
}
