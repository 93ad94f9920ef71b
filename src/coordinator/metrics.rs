//! Opt-in coordinator counters (spec §4.5), modeled on the teacher's
//! `BufferPoolStats`/`StatsSnapshot` split: atomics for lock-free
//! updates from any tab-local task, a plain snapshot for display/export.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

#[derive(Debug)]
pub struct CoordinatorMetrics {
    pub writes_forwarded: AtomicU64,
    pub writes_confirmed: AtomicU64,
    pub writes_timed_out: AtomicU64,
    pub leader_changes: AtomicU64,
    pub follower_refreshes: AtomicU64,
    notification_latency_ms: Mutex<Vec<u64>>,
}

impl CoordinatorMetrics {
    pub fn new() -> Self {
        Self {
            writes_forwarded: AtomicU64::new(0),
            writes_confirmed: AtomicU64::new(0),
            writes_timed_out: AtomicU64::new(0),
            leader_changes: AtomicU64::new(0),
            follower_refreshes: AtomicU64::new(0),
            notification_latency_ms: Mutex::new(Vec::new()),
        }
    }

    pub fn record_notification_latency_ms(&self, latency_ms: u64) {
        self.notification_latency_ms.lock().push(latency_ms);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let samples = self.notification_latency_ms.lock();
        let notification_latency_ms_histogram = samples.clone();
        MetricsSnapshot {
            writes_forwarded: self.writes_forwarded.load(Ordering::Relaxed),
            writes_confirmed: self.writes_confirmed.load(Ordering::Relaxed),
            writes_timed_out: self.writes_timed_out.load(Ordering::Relaxed),
            leader_changes: self.leader_changes.load(Ordering::Relaxed),
            follower_refreshes: self.follower_refreshes.load(Ordering::Relaxed),
            notification_latency_ms_histogram,
        }
    }
}

impl Default for CoordinatorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub writes_forwarded: u64,
    pub writes_confirmed: u64,
    pub writes_timed_out: u64,
    pub leader_changes: u64,
    pub follower_refreshes: u64,
    pub notification_latency_ms_histogram: Vec<u64>,
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CoordinatorMetrics {{ forwarded: {}, confirmed: {}, timed_out: {}, leader_changes: {}, follower_refreshes: {} }}",
            self.writes_forwarded,
            self.writes_confirmed,
            self.writes_timed_out,
            self.leader_changes,
            self.follower_refreshes,
        )
    }
}
