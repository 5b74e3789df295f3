use std::sync::atomic::{AtomicU64, Ordering};

/// Operation counters for a queue, updated with relaxed atomics.
///
/// Only touched when `Config::enable_metrics` is set.
#[derive(Debug, Default)]
pub(crate) struct Metrics {
    enqueued: AtomicU64,
    dequeued: AtomicU64,
    full_rejections: AtomicU64,
    empty_polls: AtomicU64,
    busy_rejections: AtomicU64,
    resizes: AtomicU64,
}

impl Metrics {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn record_enqueue(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_dequeue(&self, n: u64) {
        self.dequeued.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_full(&self) {
        self.full_rejections.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_empty(&self) {
        self.empty_polls.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_busy(&self) {
        self.busy_rejections.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_resize(&self) {
        self.resizes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dequeued: self.dequeued.load(Ordering::Relaxed),
            full_rejections: self.full_rejections.load(Ordering::Relaxed),
            empty_polls: self.empty_polls.load(Ordering::Relaxed),
            busy_rejections: self.busy_rejections.load(Ordering::Relaxed),
            resizes: self.resizes.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of a queue's counters.
///
/// All zero when metrics are disabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub enqueued: u64,
    pub dequeued: u64,
    pub full_rejections: u64,
    pub empty_polls: u64,
    pub busy_rejections: u64,
    pub resizes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let m = Metrics::new();
        m.record_enqueue();
        m.record_enqueue();
        m.record_dequeue(2);
        m.record_busy();
        m.record_resize();

        let snap = m.snapshot();
        assert_eq!(snap.enqueued, 2);
        assert_eq!(snap.dequeued, 2);
        assert_eq!(snap.busy_rejections, 1);
        assert_eq!(snap.resizes, 1);
        assert_eq!(snap.full_rejections, 0);
        assert_eq!(snap.empty_polls, 0);
    }
}
