//! Handler metrics
//!
//! Latency and outcome counters for the message pipeline. Written by the
//! observe middleware, read by whoever wants a snapshot; purely passive.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Outcome of one handled request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    Failed,
    Canceled,
}

/// Aggregated snapshot.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub failed_requests: u64,
    pub canceled_requests: u64,
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub max_ms: u64,
}

/// Rolling latency window plus atomic counters.
pub struct HandlerMetrics {
    total: AtomicU64,
    failed: AtomicU64,
    canceled: AtomicU64,
    latencies_ms: RwLock<Vec<u64>>,
    max_history: usize,
}

impl HandlerMetrics {
    pub fn new(max_history: usize) -> Self {
        Self {
            total: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            canceled: AtomicU64::new(0),
            latencies_ms: RwLock::new(Vec::with_capacity(max_history)),
            max_history,
        }
    }

    pub fn record(&self, latency: Duration, outcome: Outcome) {
        self.total.fetch_add(1, Ordering::Relaxed);
        match outcome {
            Outcome::Ok => {}
            Outcome::Failed => {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
            Outcome::Canceled => {
                self.canceled.fetch_add(1, Ordering::Relaxed);
            }
        }

        let mut latencies = self.latencies_ms.write();
        if latencies.len() >= self.max_history {
            let excess = latencies.len() + 1 - self.max_history;
            latencies.drain(..excess);
        }
        latencies.push(latency.as_millis() as u64);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut sorted = self.latencies_ms.read().clone();
        sorted.sort_unstable();

        MetricsSnapshot {
            total_requests: self.total.load(Ordering::Relaxed),
            failed_requests: self.failed.load(Ordering::Relaxed),
            canceled_requests: self.canceled.load(Ordering::Relaxed),
            p50_ms: percentile(&sorted, 50),
            p95_ms: percentile(&sorted, 95),
            max_ms: sorted.last().copied().unwrap_or(0),
        }
    }
}

fn percentile(sorted: &[u64], pct: usize) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let idx = (sorted.len() * pct / 100).min(sorted.len() - 1);
    sorted[idx]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_by_outcome() {
        let metrics = HandlerMetrics::new(100);
        metrics.record(Duration::from_millis(10), Outcome::Ok);
        metrics.record(Duration::from_millis(20), Outcome::Failed);
        metrics.record(Duration::from_millis(30), Outcome::Canceled);

        let snap = metrics.snapshot();
        assert_eq!(snap.total_requests, 3);
        assert_eq!(snap.failed_requests, 1);
        assert_eq!(snap.canceled_requests, 1);
        assert_eq!(snap.max_ms, 30);
    }

    #[test]
    fn test_rolling_latency_window() {
        let metrics = HandlerMetrics::new(3);
        for ms in [1, 2, 3, 100] {
            metrics.record(Duration::from_millis(ms), Outcome::Ok);
        }

        let snap = metrics.snapshot();
        // Oldest latency fell out of the window; counters keep the total.
        assert_eq!(snap.total_requests, 4);
        assert_eq!(snap.max_ms, 100);
        assert!(snap.p50_ms >= 2);
    }

    #[test]
    fn test_empty_snapshot() {
        let metrics = HandlerMetrics::new(10);
        let snap = metrics.snapshot();
        assert_eq!(snap.total_requests, 0);
        assert_eq!(snap.p50_ms, 0);
    }
}
