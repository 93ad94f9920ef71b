//! Tab Coordinator (spec §4.5): leader election and write forwarding
//! across every tab sharing an origin, layered on top of the SQL Engine
//! Host rather than inside it.

mod channel;
mod coordinator;
mod lease;
mod metrics;
mod state_machine;

pub use channel::{BroadcastChannel, InMemoryBroadcastChannel, Message, Subscription, WriteOutcome};
pub use coordinator::TabCoordinator;
pub use lease::{InMemoryLeaseStore, LeaderLease, LeaseStore};
pub use metrics::{CoordinatorMetrics, MetricsSnapshot};
pub use state_machine::TabState;
