//! Leader lease and its storage abstraction (spec §4.5, §6).
//!
//! The lease is a single mutable record per database name, shared
//! across every tab on the origin. [`LeaseStore`] is polymorphic over
//! the backing facility (spec §9): a native shared-lock API if one is
//! available, otherwise a reserved key in the Block Store — tests use
//! [`InMemoryLeaseStore`], the same way `BlockStore`'s own tests
//! substitute `MemoryBlockBackend` for the real backend.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::common::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderLease {
    pub holder_id: String,
    pub expires_at_ms: u64,
    pub epoch: u64,
}

impl LeaderLease {
    pub fn is_live(&self, now_ms: u64) -> bool {
        now_ms < self.expires_at_ms
    }
}

/// Conditional-write storage for one lease per database name.
pub trait LeaseStore: Send + Sync {
    fn read(&self, db: &str) -> Result<Option<LeaderLease>>;

    /// Replace the lease for `db` with `new_lease`, but only if the
    /// stored lease's epoch is still `expected_epoch` (`None` means "no
    /// lease must currently exist"). Returns whether the swap happened.
    fn compare_and_swap(
        &self,
        db: &str,
        expected_epoch: Option<u64>,
        new_lease: LeaderLease,
    ) -> Result<bool>;

    /// Best-effort extension of `expires_at_ms` for a lease this tab
    /// already holds, used by the leader's periodic heartbeat. Returns
    /// `false` (without error) if the lease was lost out from under the
    /// caller — e.g. another tab won an election in the meantime.
    fn renew(&self, db: &str, holder_id: &str, new_expires_at_ms: u64) -> Result<bool>;
}

#[derive(Default)]
pub struct InMemoryLeaseStore {
    leases: Mutex<HashMap<String, LeaderLease>>,
}

impl InMemoryLeaseStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LeaseStore for InMemoryLeaseStore {
    fn read(&self, db: &str) -> Result<Option<LeaderLease>> {
        Ok(self.leases.lock().get(db).cloned())
    }

    fn compare_and_swap(
        &self,
        db: &str,
        expected_epoch: Option<u64>,
        new_lease: LeaderLease,
    ) -> Result<bool> {
        let mut leases = self.leases.lock();
        let current_epoch = leases.get(db).map(|l| l.epoch);
        if current_epoch != expected_epoch {
            return Ok(false);
        }
        leases.insert(db.to_string(), new_lease);
        Ok(true)
    }

    fn renew(&self, db: &str, holder_id: &str, new_expires_at_ms: u64) -> Result<bool> {
        let mut leases = self.leases.lock();
        match leases.get_mut(db) {
            Some(lease) if lease.holder_id == holder_id => {
                lease.expires_at_ms = new_expires_at_ms;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
