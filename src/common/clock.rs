//! Clock abstraction used for lease expiry, heartbeats, and deadlines.
//!
//! Leader-election timing (spec §4.5) and per-call deadlines (spec §5)
//! are impossible to test deterministically against real wall-clock
//! time, so every timing-sensitive component takes a `&dyn Clock`
//! instead of calling `Instant::now()` directly. Production code uses
//! [`SystemClock`]; tests use [`ManualClock`] to advance time
//! explicitly, the same way the teacher isolates a fresh `tempfile`
//! per test for determinism.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic source of "now", in milliseconds since an arbitrary epoch.
pub trait Clock: Send + Sync {
    /// Current monotonic time in milliseconds.
    fn now_ms(&self) -> u64;
}

/// Real wall-clock time, backed by `std::time::Instant`.
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

/// A clock whose value is advanced explicitly by the test driving it.
///
/// Cloning shares the same underlying counter (it's an `Arc` inside),
/// so a single `ManualClock` can be handed to several components that
/// all need to observe the same passage of time.
#[derive(Clone)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn at(ms: u64) -> Self {
        let clock = Self::new();
        clock.set(ms);
        clock
    }

    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta: Duration) {
        self.now.fetch_add(delta.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn advance_ms(&self, delta_ms: u64) {
        self.now.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// A deadline relative to a particular clock, used by every public
/// operation's optional cancellation/timeout parameter (spec §5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    expires_at_ms: u64,
}

impl Deadline {
    pub fn after(clock: &dyn Clock, timeout: Duration) -> Self {
        Self {
            expires_at_ms: clock.now_ms().saturating_add(timeout.as_millis() as u64),
        }
    }

    pub fn at_ms(expires_at_ms: u64) -> Self {
        Self { expires_at_ms }
    }

    pub fn expires_at_ms(&self) -> u64 {
        self.expires_at_ms
    }

    pub fn is_expired(&self, clock: &dyn Clock) -> bool {
        clock.now_ms() >= self.expires_at_ms
    }

    /// A deadline guaranteed never to expire, for callers that don't
    /// want to bound an operation.
    pub fn never() -> Self {
        Self {
            expires_at_ms: u64::MAX,
        }
    }
}

/// Shared mutable "last observed value" helper, used by the coordinator
/// to track `last_seen` epochs without pulling in a bespoke type for
/// every counter. Kept here because it's a clock-adjacent bookkeeping
/// primitive, not because it measures time itself.
pub struct Watermark {
    value: Mutex<u64>,
}

impl Watermark {
    pub fn new(initial: u64) -> Self {
        Self {
            value: Mutex::new(initial),
        }
    }

    pub fn get(&self) -> u64 {
        *self.value.lock()
    }

    /// Advance the watermark if `candidate` is greater, returning whether
    /// it advanced.
    pub fn advance_if_greater(&self, candidate: u64) -> bool {
        let mut guard = self.value.lock();
        if candidate > *guard {
            *guard = candidate;
            true
        } else {
            false
        }
    }
}
