//! The backing key-value store abstraction (spec §6).
//!
//! `BlockBackend` is the "any persistent local key-value facility"
//! spec §6 asks for: transactional put/get/delete keyed by a compound
//! `(database_name, u32)` key, ordered-range scan, and database
//! enumeration. It knows nothing about checksums or epochs — that
//! policy lives one layer up, in [`crate::block::BlockStore`]. This
//! mirrors the teacher's separation between `DiskManager` (raw file
//! I/O) and `BufferPoolManager` (policy).

use crate::block::block::{BlockMeta, RawBlockRecord};
use crate::common::Result;

/// Outcome of a [`BlockBackend::delete_range`] call.
///
/// `delete_range` deletes atomically per-block, not as one big
/// transaction, so a mid-range failure must still report how far it
/// got (spec §4.1: "on partial failure, reports the last successful
/// index").
#[derive(Debug)]
pub struct DeleteRangeOutcome {
    /// The highest index successfully deleted, if any.
    pub last_deleted: Option<u32>,
    /// `Ok(())` if every index in the range was deleted; otherwise the
    /// error that stopped the sweep.
    pub result: Result<()>,
}

impl DeleteRangeOutcome {
    pub fn success(last_deleted: Option<u32>) -> Self {
        Self {
            last_deleted,
            result: Ok(()),
        }
    }

    pub fn failure(last_deleted: Option<u32>, err: crate::common::Error) -> Self {
        Self {
            last_deleted,
            result: Err(err),
        }
    }
}

/// Polymorphic backing store capability set (spec §9 design notes).
///
/// Every method is blocking — see `SPEC_FULL.md` §1 for why this crate
/// models suspension points as blocking calls rather than `async fn`.
pub trait BlockBackend: Send + Sync {
    /// Store a fully-formed record. Must be fully acknowledged by the
    /// backend before returning (spec §4.1 policy).
    fn put(&self, db: &str, index: u32, record: RawBlockRecord) -> Result<()>;

    /// Fetch a record, or `Ok(None)` if the index doesn't exist.
    fn get(&self, db: &str, index: u32) -> Result<Option<RawBlockRecord>>;

    /// Delete every block in `[from, to]` (inclusive), atomically per
    /// block.
    fn delete_range(&self, db: &str, from: u32, to: u32) -> DeleteRangeOutcome;

    /// Ordered, restartable metadata scan; never loads a payload.
    fn scan(&self, db: &str) -> Result<Vec<BlockMeta>>;

    /// The set of database names with at least one stored block or
    /// reserved key.
    fn enumerate_databases(&self) -> Result<Vec<String>>;

    /// Remove every block stored under `db`.
    fn delete_database(&self, db: &str) -> Result<()>;
}
