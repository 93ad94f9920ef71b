//! Block Store (spec §4.1): a checksummed, epoch-stamped layer over an
//! arbitrary key-value backend. This is the lowest layer of the crate —
//! the [`crate::vfs`] module builds page I/O on top of it the way the
//! teacher's `BufferPoolManager` builds page caching on top of its
//! `DiskManager`.

mod backend;
mod block;
mod file;
mod memory;
mod store;

pub use backend::{BlockBackend, DeleteRangeOutcome};
pub use block::{compute_checksum, Block, BlockMeta, RawBlockRecord};
pub use file::FileBlockBackend;
pub use memory::MemoryBlockBackend;
pub use store::{BlockStore, MAX_BLOCK_PAYLOAD_BYTES};
