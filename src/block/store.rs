//! `BlockStore` — the policy layer above a raw [`BlockBackend`] (spec
//! §4.1): computes checksums, assigns monotonically increasing epochs,
//! and enforces a payload size ceiling, the way the teacher's
//! `BufferPoolManager` layers pinning/eviction policy over the raw
//! `DiskManager`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::block::backend::BlockBackend;
use crate::block::block::{compute_checksum, Block, BlockMeta, RawBlockRecord};
use crate::common::clock::{Clock, Watermark};
use crate::common::{Error, Result};

/// Generous ceiling on a single block's payload size. A block may hold
/// a database page, a lease record, or other small metadata; nothing
/// stored through this layer should ever approach it, so tripping it
/// means the payload is corrupt or the caller built it wrong.
pub const MAX_BLOCK_PAYLOAD_BYTES: usize = 16 * 1024 * 1024;

pub struct BlockStore {
    backend: Box<dyn BlockBackend>,
    clock: Arc<dyn Clock>,
    watermarks: Mutex<HashMap<String, Watermark>>,
}

impl BlockStore {
    pub fn new(backend: Box<dyn BlockBackend>, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend,
            clock,
            watermarks: Mutex::new(HashMap::new()),
        }
    }

    /// Store `payload` under `(db, index)`, returning the epoch it was
    /// assigned. The epoch is `max(last epoch seen for this database,
    /// current clock reading) + 1`, so epochs are strictly increasing
    /// even across a process restart once prior epochs are observed
    /// via [`Self::get`] or [`Self::scan`].
    pub fn put(&self, db: &str, index: u32, payload: Vec<u8>) -> Result<u64> {
        if payload.len() > MAX_BLOCK_PAYLOAD_BYTES {
            return Err(Error::CorruptPayload(format!(
                "payload of {} bytes exceeds the {} byte block limit",
                payload.len(),
                MAX_BLOCK_PAYLOAD_BYTES
            )));
        }

        let epoch = self.next_epoch(db);
        let checksum = compute_checksum(&payload);
        let record = RawBlockRecord {
            payload_len: payload.len() as u32,
            checksum,
            epoch,
            payload,
        };
        self.backend.put(db, index, record)?;
        Ok(epoch)
    }

    /// Fetch a block, verifying its checksum. A mismatch is always
    /// reported as an error rather than silently returned, since a
    /// corrupt payload is never safe for a caller to interpret as page
    /// or lease data (spec §4.1, §8 property 2).
    pub fn get(&self, db: &str, index: u32) -> Result<Option<Block>> {
        let Some(raw) = self.backend.get(db, index)? else {
            return Ok(None);
        };

        if compute_checksum(&raw.payload) != raw.checksum {
            return Err(Error::ChecksumMismatch {
                database: db.to_string(),
                index,
            });
        }

        self.observe_epoch(db, raw.epoch);
        Ok(Some(Block {
            index,
            checksum: raw.checksum,
            epoch: raw.epoch,
            payload: raw.payload,
        }))
    }

    /// Delete every block in `[from, to]`, returning the highest index
    /// actually deleted.
    pub fn delete_range(&self, db: &str, from: u32, to: u32) -> Result<Option<u32>> {
        let outcome = self.backend.delete_range(db, from, to);
        outcome.result?;
        Ok(outcome.last_deleted)
    }

    pub fn scan(&self, db: &str) -> Result<Vec<BlockMeta>> {
        let metas = self.backend.scan(db)?;
        if let Some(max_epoch) = metas.iter().map(|m| m.epoch).max() {
            self.observe_epoch(db, max_epoch);
        }
        Ok(metas)
    }

    pub fn enumerate_databases(&self) -> Result<Vec<String>> {
        self.backend.enumerate_databases()
    }

    pub fn delete_database(&self, db: &str) -> Result<()> {
        self.backend.delete_database(db)?;
        self.watermarks.lock().remove(db);
        Ok(())
    }

    fn next_epoch(&self, db: &str) -> u64 {
        let now = self.clock.now_ms();
        let mut watermarks = self.watermarks.lock();
        let wm = watermarks
            .entry(db.to_string())
            .or_insert_with(|| Watermark::new(0));
        let candidate = now.max(wm.get()) + 1;
        wm.advance_if_greater(candidate);
        candidate
    }

    fn observe_epoch(&self, db: &str, epoch: u64) {
        let mut watermarks = self.watermarks.lock();
        let wm = watermarks
            .entry(db.to_string())
            .or_insert_with(|| Watermark::new(0));
        wm.advance_if_greater(epoch);
    }
}
