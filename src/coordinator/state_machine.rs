//! Per-tab coordinator state (spec §4.5):
//! `Joining -> {Leader, Follower}`, `Leader -> Joining | Follower`,
//! `Follower -> Joining`.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabState {
    /// Probing the lease to decide whether this tab becomes leader.
    Joining,
    /// Holds the live lease; serves writes locally.
    Leader,
    /// Forwards writes to the leader; reconciles change epochs.
    Follower,
}
