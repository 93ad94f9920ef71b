//! Transaction states and begin modes (spec §4.4).

/// How a transaction acquires the write lock. The engine decides what
/// these actually mean for lock escalation; the manager only needs the
/// tag to report to callers/metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Deferred,
    Immediate,
    Exclusive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    InWrite,
    Committing,
    RollingBack,
}
