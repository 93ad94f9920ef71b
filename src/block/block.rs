//! Block record format.
//!
//! A block is the unit of persistence in the backing key-value store:
//! `{index, payload_len, checksum, epoch, payload}` (spec §3, §4.1). The
//! checksum is a 64-bit, non-cryptographic value computed from two
//! independently-seeded CRC32 passes over the payload folded together —
//! the teacher already depends on `crc32fast` for its (32-bit) page
//! checksum, so this reuses the same crate rather than pulling in a new
//! one for a wider hash.

/// Second CRC32 seed, used only to make the second mixing pass
/// independent of the first. Arbitrary but fixed.
const SECOND_PASS_SEED: u32 = 0xA5A5_A5A5;

/// Compute the 64-bit block checksum over a payload.
pub fn compute_checksum(payload: &[u8]) -> u64 {
    let mut first = crc32fast::Hasher::new();
    first.update(payload);
    let low = first.finalize() as u64;

    let mut second = crc32fast::Hasher::new_with_initial(SECOND_PASS_SEED);
    second.update(payload);
    let high = second.finalize() as u64;

    (high << 32) | low
}

/// A fully-materialized block, as handed to/from [`crate::block::BlockStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub index: u32,
    pub checksum: u64,
    pub epoch: u64,
    pub payload: Vec<u8>,
}

/// Block metadata without its payload, returned by `scan` so callers can
/// enumerate a database's blocks without paying for every payload's I/O
/// (spec §4.1: "does not load payloads until explicitly fetched").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockMeta {
    pub index: u32,
    pub payload_len: u32,
    pub checksum: u64,
    pub epoch: u64,
}

/// The raw record a [`crate::block::BlockBackend`] stores and retrieves.
///
/// Unlike [`Block`] this carries no database name or index — those are
/// the backend's key, not part of the stored value — but it does carry
/// everything [`BlockStore`](crate::block::BlockStore) computed
/// (checksum, epoch) so the backend itself never has to know how to
/// compute either.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlockRecord {
    pub payload_len: u32,
    pub checksum: u64,
    pub epoch: u64,
    pub payload: Vec<u8>,
}

impl RawBlockRecord {
    pub fn meta(&self, index: u32) -> BlockMeta {
        BlockMeta {
            index,
            payload_len: self.payload_len,
            checksum: self.checksum,
            epoch: self.epoch,
        }
    }
}
