//! `PageVfs` — the page-addressable cache over a [`BlockStore`] (spec
//! §4.2). Generalizes the teacher's `BufferPoolManager`: same
//! frames/page_table/free_list/replacer layout, but frames carry no pin
//! count (single-owner-per-handle, spec §5) and the replacer is the
//! real [`LruReplacer`] the teacher's module doc names as future work
//! rather than its placeholder FIFO.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::block::BlockStore;
use crate::common::config::{is_valid_page_size, SQLITE_MAGIC_HEADER};
use crate::common::{Error, FrameId, PageId, Result};
use crate::vfs::frame::Frame;
use crate::vfs::replacer::LruReplacer;

pub struct PageVfs {
    frames: Vec<Frame>,
    page_table: RwLock<HashMap<PageId, FrameId>>,
    free_list: Mutex<Vec<FrameId>>,
    replacer: Mutex<LruReplacer>,
    block_store: Arc<BlockStore>,
    database_name: String,
    page_size: usize,
    /// Highest page index ever written, plus one (spec §3 invariant 4).
    page_count: AtomicU32,
    /// Block range awaiting physical deletion on the next `sync`, set by
    /// `truncate` (spec §4.2: "physical block deletion deferred to sync").
    pending_delete: Mutex<Option<(u32, u32)>>,
    /// Bumped on every successful `sync`; read by the coordinator after a
    /// commit to know what change epoch to broadcast.
    change_epoch: AtomicU64,
    /// Bumped on every `invalidate_external`; streams record the value at
    /// `prepare_stream` time and compare it on every `fetch_next` to
    /// detect `StaleCursor` (spec §4.2, §4.3).
    generation: AtomicU64,
}

impl PageVfs {
    /// Open (or create) the page cache for `database_name`, reconstructing
    /// `page_count` by scanning the block store for the highest existing
    /// index — there is no separate metadata block; the VFS derives its
    /// page count from the blocks actually present (spec §3 invariant 4).
    pub fn open(
        database_name: impl Into<String>,
        block_store: Arc<BlockStore>,
        page_size: usize,
        cache_capacity: usize,
    ) -> Result<Self> {
        if !is_valid_page_size(page_size) {
            return Err(Error::InvalidConfig(format!(
                "page_size {page_size} is not a power of two in [512, 65536]"
            )));
        }
        if cache_capacity == 0 {
            return Err(Error::InvalidConfig(
                "cache_size must be greater than zero".to_string(),
            ));
        }

        let database_name = database_name.into();
        let metas = block_store.scan(&database_name)?;
        let page_count = metas.iter().map(|m| m.index + 1).max().unwrap_or(0);

        let frames: Vec<Frame> = (0..cache_capacity).map(|_| Frame::new(page_size)).collect();
        let free_list: Vec<FrameId> = (0..cache_capacity).map(FrameId).collect();

        Ok(Self {
            frames,
            page_table: RwLock::new(HashMap::new()),
            free_list: Mutex::new(free_list),
            replacer: Mutex::new(LruReplacer::new()),
            block_store,
            database_name,
            page_size,
            page_count: AtomicU32::new(page_count),
            pending_delete: Mutex::new(None),
            change_epoch: AtomicU64::new(0),
            generation: AtomicU64::new(0),
        })
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn page_count(&self) -> u32 {
        self.page_count.load(Ordering::Acquire)
    }

    pub fn file_size(&self) -> u64 {
        self.page_count() as u64 * self.page_size as u64
    }

    pub fn change_epoch(&self) -> u64 {
        self.change_epoch.load(Ordering::Acquire)
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Read a page's bytes: last durably-written value, cached value if
    /// dirty, or a zero-filled page if `n` is beyond `page_count` or was
    /// never actually flushed (a hole left by a `write_page` that
    /// extended `page_count` past contiguous writes).
    pub fn read_page(&self, n: u32) -> Result<Vec<u8>> {
        if n >= self.page_count() {
            return Ok(vec![0u8; self.page_size]);
        }

        let page_id = PageId(n);
        if let Some(frame_id) = self.lookup_and_touch(page_id) {
            return Ok(self.frames[frame_id.0].bytes().to_vec());
        }

        match self.block_store.get(&self.database_name, n)? {
            Some(block) => {
                let frame_id = self.install_clean(page_id, &block.payload)?;
                Ok(self.frames[frame_id.0].bytes().to_vec())
            }
            None => Ok(vec![0u8; self.page_size]),
        }
    }

    /// Write a full page's bytes into the dirty map; `page_count` is
    /// extended if `n` reaches or exceeds it. Not yet durable — callers
    /// must `sync` to persist (spec §4.2).
    pub fn write_page(&self, n: u32, bytes: &[u8]) -> Result<()> {
        if bytes.len() != self.page_size {
            return Err(Error::HandleMisuse(format!(
                "write_page buffer is {} bytes, expected page_size {}",
                bytes.len(),
                self.page_size
            )));
        }

        let page_id = PageId(n);
        let frame_id = match self.lookup_and_touch(page_id) {
            Some(frame_id) => frame_id,
            None => self.install_frame_for_write(page_id)?,
        };

        let frame = &self.frames[frame_id.0];
        frame.bytes_mut().copy_from_slice(bytes);
        frame.mark_dirty();
        self.replacer.lock().set_evictable(frame_id, false);

        self.page_count.fetch_max(n + 1, Ordering::AcqRel);
        Ok(())
    }

    /// Flush every dirty page to the block store as one logical batch:
    /// on any failure the dirty set is left untouched, so a retried
    /// `sync` reproduces the same writes (the VFS's no-partial-flush
    /// guarantee, spec §4.2 and §3 invariant 3).
    pub fn sync(&self) -> Result<()> {
        let dirty: Vec<(PageId, FrameId)> = {
            let pt = self.page_table.read();
            pt.iter()
                .filter(|(_, &fid)| self.frames[fid.0].is_dirty())
                .map(|(&pid, &fid)| (pid, fid))
                .collect()
        };

        for (page_id, frame_id) in &dirty {
            let payload = self.frames[frame_id.0].bytes().to_vec();
            self.block_store.put(&self.database_name, page_id.0, payload)?;
        }

        let mut replacer = self.replacer.lock();
        for (_, frame_id) in &dirty {
            self.frames[frame_id.0].clear_dirty();
            replacer.set_evictable(*frame_id, true);
        }
        drop(replacer);

        let deleted = self.pending_delete.lock().take();
        if let Some((from, to)) = deleted {
            let outcome = self.block_store.delete_range(&self.database_name, from, to);
            outcome.result?;
        }

        if !dirty.is_empty() || deleted.is_some() {
            self.change_epoch.fetch_add(1, Ordering::AcqRel);
        }
        Ok(())
    }

    /// Logically trim to `pages`. Cached entries at or beyond the new
    /// count are dropped immediately (dirty or clean); their blocks are
    /// physically deleted on the next `sync`.
    pub fn truncate(&self, pages: u32) -> Result<()> {
        let old_count = self.page_count.swap(pages, Ordering::AcqRel);
        if pages >= old_count {
            return Ok(());
        }

        let mut pt = self.page_table.write();
        let stale: Vec<PageId> = pt.keys().filter(|pid| pid.0 >= pages).copied().collect();
        for page_id in stale {
            if let Some(frame_id) = pt.remove(&page_id) {
                self.frames[frame_id.0].reset();
                self.replacer.lock().remove(frame_id);
                self.free_list.lock().push(frame_id);
            }
        }
        drop(pt);

        if old_count > pages {
            let mut pending = self.pending_delete.lock();
            *pending = Some(match pending.take() {
                Some((from, _)) => (from.min(pages), old_count - 1),
                None => (pages, old_count - 1),
            });
        }
        Ok(())
    }

    /// Discard every dirty frame and reset `page_count` back to
    /// `page_count_before`, the state `sync` last left the database in
    /// before the transaction now being abandoned. Used by the
    /// transaction manager's `rollback`/failed-`commit` paths (spec
    /// §4.4): since nothing was flushed, dropping the dirty cache
    /// entries and re-fetching on next read reproduces exactly the
    /// pre-begin state.
    pub fn rollback_to(&self, page_count_before: u32) {
        let mut pt = self.page_table.write();
        let dirty: Vec<PageId> = pt
            .iter()
            .filter(|(_, &fid)| self.frames[fid.0].is_dirty())
            .map(|(&pid, _)| pid)
            .collect();
        for page_id in dirty {
            if let Some(frame_id) = pt.remove(&page_id) {
                self.frames[frame_id.0].reset();
                self.replacer.lock().remove(frame_id);
                self.free_list.lock().push(frame_id);
            }
        }
        drop(pt);
        self.page_count.store(page_count_before, Ordering::Release);
        self.pending_delete.lock().take();
    }

    /// React to a remote change-epoch advance (spec §4.2): discard every
    /// cached entry — clean or dirty — and force the next read through
    /// the block store. Bumps [`Self::generation`] so owners of stream
    /// cursors can detect staleness.
    pub fn invalidate_external(&self) {
        let mut pt = self.page_table.write();
        for frame_id in pt.values() {
            self.frames[frame_id.0].reset();
        }
        let mut free_list = self.free_list.lock();
        free_list.extend(pt.values().copied());
        pt.clear();
        drop(pt);
        drop(free_list);

        *self.replacer.lock() = LruReplacer::new();
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Concatenate pages `0..page_count` with no framing, the standard
    /// SQLite container format (spec §4.2 Export).
    pub fn export_to_bytes(&self) -> Result<Vec<u8>> {
        self.sync()?;
        let mut out = Vec::with_capacity(self.file_size() as usize);
        for n in 0..self.page_count() {
            out.extend_from_slice(&self.read_page(n)?);
        }
        Ok(out)
    }

    /// Validate the SQLite magic header, read the declared page size,
    /// split into pages, and replace the current contents transactionally
    /// (spec §4.2 Import).
    pub fn import_from_bytes(&self, bytes: &[u8]) -> Result<()> {
        if bytes.len() < 16 || &bytes[0..16] != SQLITE_MAGIC_HEADER.as_slice() {
            return Err(Error::CorruptHeader(
                "missing 'SQLite format 3\\0' magic header".to_string(),
            ));
        }
        if bytes.len() < 18 {
            return Err(Error::CorruptHeader(
                "file too small to contain a page-size field".to_string(),
            ));
        }
        let declared_page_size = match u16::from_be_bytes([bytes[16], bytes[17]]) {
            1 => 65536,
            n => n as usize,
        };
        if declared_page_size != self.page_size {
            return Err(Error::InvalidConfig(format!(
                "import page size {declared_page_size} does not match this database's page size {}",
                self.page_size
            )));
        }
        if bytes.len() % declared_page_size != 0 {
            return Err(Error::CorruptPayload(
                "byte length is not a multiple of the declared page size".to_string(),
            ));
        }

        let old_count = self.page_count();
        self.truncate(0)?;
        self.sync()?;

        let new_count = (bytes.len() / declared_page_size) as u32;
        for n in 0..new_count {
            let start = n as usize * declared_page_size;
            self.write_page(n, &bytes[start..start + declared_page_size])?;
        }
        self.sync()?;

        debug_assert!(self.page_count() == new_count || old_count == new_count);
        Ok(())
    }

    fn lookup_and_touch(&self, page_id: PageId) -> Option<FrameId> {
        let pt = self.page_table.read();
        let frame_id = *pt.get(&page_id)?;
        self.replacer.lock().record_access(frame_id);
        Some(frame_id)
    }

    fn install_clean(&self, page_id: PageId, payload: &[u8]) -> Result<FrameId> {
        let frame_id = self.get_free_frame()?;
        let frame = &self.frames[frame_id.0];
        frame.bytes_mut().copy_from_slice(payload);
        frame.set_page_id(Some(page_id));

        self.page_table.write().insert(page_id, frame_id);
        let mut replacer = self.replacer.lock();
        replacer.record_access(frame_id);
        replacer.set_evictable(frame_id, true);
        Ok(frame_id)
    }

    /// The installed frame is about to receive an unsynced write, so it
    /// must not be evictable until `sync` clears its dirty bit — a
    /// clean-only LRU eviction must never see it.
    fn install_frame_for_write(&self, page_id: PageId) -> Result<FrameId> {
        let frame_id = self.get_free_frame()?;
        let frame = &self.frames[frame_id.0];
        frame.set_page_id(Some(page_id));

        self.page_table.write().insert(page_id, frame_id);
        let mut replacer = self.replacer.lock();
        replacer.record_access(frame_id);
        replacer.set_evictable(frame_id, false);
        Ok(frame_id)
    }

    fn get_free_frame(&self) -> Result<FrameId> {
        if let Some(frame_id) = self.free_list.lock().pop() {
            return Ok(frame_id);
        }
        self.evict_one()
    }

    /// Evict the LRU clean frame. Dirty frames are never evictable
    /// (spec §4.2 cache policy) — if none are evictable, every frame is
    /// either dirty or pinned by being the only copy pending a flush; the
    /// caller must `sync` first.
    fn evict_one(&self) -> Result<FrameId> {
        let frame_id = self
            .replacer
            .lock()
            .evict()
            .ok_or(Error::QuotaExceeded)?;

        let frame = &self.frames[frame_id.0];
        if let Some(page_id) = frame.page_id() {
            self.page_table.write().remove(&page_id);
        }
        frame.reset();
        Ok(frame_id)
    }
}
