//! The host/engine trait boundary (spec §4.3): the SQL parser, planner,
//! and bytecode VM are out of scope (spec §1 Non-goals) — [`SqlEngine`]
//! is the seam an external collaborator implements against. Modeled
//! after the `PageRef`/`PageSource` trait-object boundary in litevfs's
//! `database.rs`: the engine receives a `&mut dyn PageIo` rather than a
//! concrete cache type, so it never depends on this crate's cache
//! internals.

use crate::common::Result;
use crate::host::query_result::QueryResult;
use crate::host::value::Value;
use crate::vfs::PageVfs;

/// The page-I/O contract (spec §4.2) as seen by the SQL engine.
pub trait PageIo: Send {
    fn read_page(&mut self, n: u32) -> Result<Vec<u8>>;
    fn write_page(&mut self, n: u32, bytes: &[u8]) -> Result<()>;
    fn sync(&mut self) -> Result<()>;
    fn truncate(&mut self, pages: u32) -> Result<()>;
    fn file_size(&self) -> u64;
    fn page_size(&self) -> usize;
}

/// Adapts a [`PageVfs`] (and an optional cipher hook) to [`PageIo`] so
/// pages are transformed at the boundary the SQL engine sees, rather
/// than inside the cache itself — block-store checksums are then
/// always computed over whatever is actually durable (ciphertext, if a
/// cipher hook is configured).
pub struct VfsPageIo<'a> {
    vfs: &'a PageVfs,
    cipher: &'a dyn crate::host::cipher::CipherHook,
}

impl<'a> VfsPageIo<'a> {
    pub fn new(vfs: &'a PageVfs, cipher: &'a dyn crate::host::cipher::CipherHook) -> Self {
        Self { vfs, cipher }
    }
}

impl PageIo for VfsPageIo<'_> {
    fn read_page(&mut self, n: u32) -> Result<Vec<u8>> {
        let raw = self.vfs.read_page(n)?;
        self.cipher.decrypt_page(n, &raw)
    }

    fn write_page(&mut self, n: u32, bytes: &[u8]) -> Result<()> {
        let ciphertext = self.cipher.encrypt_page(n, bytes)?;
        self.vfs.write_page(n, &ciphertext)
    }

    fn sync(&mut self) -> Result<()> {
        self.vfs.sync()
    }

    fn truncate(&mut self, pages: u32) -> Result<()> {
        self.vfs.truncate(pages)
    }

    fn file_size(&self) -> u64 {
        self.vfs.file_size()
    }

    fn page_size(&self) -> usize {
        self.vfs.page_size()
    }
}

/// An external SQL engine instance bound to one database handle.
pub trait SqlEngine: Send {
    fn execute(&mut self, io: &mut dyn PageIo, sql: &str, params: &[Value]) -> Result<QueryResult>;

    fn execute_batch(&mut self, io: &mut dyn PageIo, statements: &[String]) -> Result<QueryResult> {
        let mut last = QueryResult::empty();
        for sql in statements {
            last = self.execute(io, sql, &[])?;
        }
        Ok(last)
    }

    fn prepare(&mut self, io: &mut dyn PageIo, sql: &str) -> Result<Box<dyn PreparedStatement>>;
}

/// A compiled statement bound to a connection (spec §4.3 `prepare`).
pub trait PreparedStatement: Send {
    fn execute(&mut self, io: &mut dyn PageIo, params: &[Value]) -> Result<QueryResult>;

    fn prepare_stream(
        &mut self,
        io: &mut dyn PageIo,
        params: &[Value],
    ) -> Result<Box<dyn StreamCursor>>;
}

/// A server-side cursor over a compiled `SELECT` (spec §4.3
/// `prepare_stream`/`fetch_next`).
pub trait StreamCursor: Send {
    /// Yield up to `batch_size` rows; an empty batch signals end of
    /// stream.
    fn fetch_next(&mut self, io: &mut dyn PageIo, batch_size: usize) -> Result<Vec<Vec<Value>>>;
}

/// Constructs a fresh [`SqlEngine`] per opened database — the host
/// owns one engine instance per handle, since catalog/session state is
/// per-database.
pub trait SqlEngineFactory: Send + Sync {
    fn create(&self) -> Box<dyn SqlEngine>;
}
