//! `SqlEngineHost` — the public in-process API surface of spec §4.3 and
//! §4.4. Owns the per-handle arena, wires each handle's page I/O through
//! [`VfsPageIo`], and serializes writes per handle through a
//! [`TransactionManager`]. The Tab Coordinator (spec §4.5) wraps this
//! host rather than living inside it: this type has no notion of
//! leadership, forwarding, or broadcast.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::block::BlockStore;
use crate::common::clock::{Clock, Deadline};
use crate::common::{Error, Result};
use crate::host::cipher::{CipherHook, CipherHookFactory};
use crate::host::config::OpenConfig;
use crate::host::engine::{PageIo, PreparedStatement, SqlEngine, SqlEngineFactory, StreamCursor, VfsPageIo};
use crate::host::query_result::QueryResult;
use crate::host::value::Value;
use crate::registry::Slab;
use crate::txn::{Mode, TransactionManager};
use crate::vfs::PageVfs;

struct DatabaseEntry {
    config: OpenConfig,
    vfs: PageVfs,
    cipher: Box<dyn CipherHook>,
    engine: Box<dyn SqlEngine>,
    txn: TransactionManager,
    /// Set by a fatal condition (spec §7): corrupt header/payload seen
    /// on a read, or a commit that failed to flush. Every further
    /// operation on this handle fails with `NotOpen`.
    dirty: bool,
}

struct StatementEntry {
    handle_id: u64,
    statement: Box<dyn PreparedStatement>,
}

struct StreamEntry {
    handle_id: u64,
    cursor: Box<dyn StreamCursor>,
    /// `vfs.generation()` observed at `prepare_stream` time; any mismatch
    /// on `fetch_next` means an external invalidation happened since,
    /// and the cursor is `StaleCursor` (spec §3 invariant 6).
    generation_at_prepare: u64,
}

pub struct SqlEngineHost {
    handles: Slab<DatabaseEntry>,
    statements: Slab<StatementEntry>,
    streams: Slab<StreamEntry>,
    open_names: Mutex<HashSet<String>>,
    block_store: Arc<BlockStore>,
    engine_factory: Arc<dyn SqlEngineFactory>,
    cipher_factory: Arc<dyn CipherHookFactory>,
    clock: Arc<dyn Clock>,
}

impl SqlEngineHost {
    pub fn new(
        block_store: Arc<BlockStore>,
        engine_factory: Arc<dyn SqlEngineFactory>,
        cipher_factory: Arc<dyn CipherHookFactory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            handles: Slab::new(),
            statements: Slab::new(),
            streams: Slab::new(),
            open_names: Mutex::new(HashSet::new()),
            block_store,
            engine_factory,
            cipher_factory,
            clock,
        }
    }

    pub fn open(&self, config: OpenConfig) -> Result<u64> {
        config.validate()?;

        let mut names = self.open_names.lock();
        if names.contains(&config.name) {
            return Err(Error::AlreadyOpen);
        }

        let vfs = PageVfs::open(
            config.name.clone(),
            self.block_store.clone(),
            config.page_size,
            config.cache_size,
        )?;
        let cipher = self.cipher_factory.create(&config);
        let engine = self.engine_factory.create();

        let entry = DatabaseEntry {
            config: config.clone(),
            vfs,
            cipher,
            engine,
            txn: TransactionManager::new(),
            dirty: false,
        };
        let id = self.handles.insert(entry);
        names.insert(config.name);
        Ok(id)
    }

    pub fn execute(&self, handle: u64, sql: &str, deadline: Deadline) -> Result<QueryResult> {
        self.execute_with_params(handle, sql, &[], deadline)
    }

    pub fn execute_with_params(
        &self,
        handle: u64,
        sql: &str,
        params: &[Value],
        deadline: Deadline,
    ) -> Result<QueryResult> {
        let arc = self.handle_arc(handle)?;
        let mut guard = arc.lock();
        self.ensure_not_dirty(&guard)?;

        let DatabaseEntry { vfs, cipher, engine, txn, .. } = &mut *guard;
        let clock = self.clock.as_ref();
        let result = txn.scoped(vfs, Mode::Deferred, clock, deadline, || {
            let mut io = VfsPageIo::new(vfs, cipher.as_ref());
            engine.execute(&mut io, sql, params)
        });
        self.note_fatal_on_commit_failure(&mut guard, &result);
        result
    }

    pub fn execute_batch(
        &self,
        handle: u64,
        statements: &[String],
        deadline: Deadline,
    ) -> Result<QueryResult> {
        let arc = self.handle_arc(handle)?;
        let mut guard = arc.lock();
        self.ensure_not_dirty(&guard)?;

        let DatabaseEntry { vfs, cipher, engine, txn, .. } = &mut *guard;
        let clock = self.clock.as_ref();
        let result = txn.scoped(vfs, Mode::Deferred, clock, deadline, || {
            let mut io = VfsPageIo::new(vfs, cipher.as_ref());
            engine.execute_batch(&mut io, statements)
        });
        self.note_fatal_on_commit_failure(&mut guard, &result);
        result
    }

    pub fn prepare(&self, handle: u64, sql: &str) -> Result<u64> {
        let arc = self.handle_arc(handle)?;
        let mut guard = arc.lock();
        self.ensure_not_dirty(&guard)?;

        let DatabaseEntry { vfs, cipher, engine, .. } = &mut *guard;
        let mut io = VfsPageIo::new(vfs, cipher.as_ref());
        let statement = engine.prepare(&mut io, sql)?;
        drop(guard);

        Ok(self.statements.insert(StatementEntry { handle_id: handle, statement }))
    }

    pub fn execute_statement(
        &self,
        statement_id: u64,
        params: &[Value],
        deadline: Deadline,
    ) -> Result<QueryResult> {
        let stmt_arc = self
            .statements
            .get(statement_id)
            .ok_or_else(|| Error::HandleMisuse("unknown statement id".to_string()))?;
        let mut stmt_guard = stmt_arc.lock();
        let handle_id = stmt_guard.handle_id;

        let handle_arc = self.handle_arc(handle_id)?;
        let mut handle_guard = handle_arc.lock();
        self.ensure_not_dirty(&handle_guard)?;

        let DatabaseEntry { vfs, cipher, txn, .. } = &mut *handle_guard;
        let statement = &mut stmt_guard.statement;
        let clock = self.clock.as_ref();
        let result = txn.scoped(vfs, Mode::Deferred, clock, deadline, || {
            let mut io = VfsPageIo::new(vfs, cipher.as_ref());
            statement.execute(&mut io, params)
        });
        self.note_fatal_on_commit_failure(&mut handle_guard, &result);
        result
    }

    pub fn finalize(&self, statement_id: u64) -> Result<()> {
        self.statements
            .remove(statement_id)
            .ok_or_else(|| Error::HandleMisuse("unknown statement id".to_string()))?;
        Ok(())
    }

    pub fn prepare_stream(&self, handle: u64, sql: &str, params: &[Value]) -> Result<u64> {
        let arc = self.handle_arc(handle)?;
        let mut guard = arc.lock();
        self.ensure_not_dirty(&guard)?;

        let DatabaseEntry { vfs, cipher, engine, .. } = &mut *guard;
        let mut io = VfsPageIo::new(vfs, cipher.as_ref());
        let mut statement = engine.prepare(&mut io, sql)?;
        let cursor = statement.prepare_stream(&mut io, params)?;
        let generation_at_prepare = vfs.generation();
        drop(guard);

        Ok(self.streams.insert(StreamEntry {
            handle_id: handle,
            cursor,
            generation_at_prepare,
        }))
    }

    pub fn fetch_next(&self, stream_id: u64, batch_size: usize) -> Result<Vec<Vec<Value>>> {
        let stream_arc = self
            .streams
            .get(stream_id)
            .ok_or_else(|| Error::HandleMisuse("unknown stream id".to_string()))?;
        let mut stream_guard = stream_arc.lock();
        let handle_id = stream_guard.handle_id;

        let handle_arc = self.handle_arc(handle_id)?;
        let mut handle_guard = handle_arc.lock();
        self.ensure_not_dirty(&handle_guard)?;

        let DatabaseEntry { vfs, cipher, .. } = &mut *handle_guard;
        if vfs.generation() != stream_guard.generation_at_prepare {
            return Err(Error::StaleCursor);
        }

        let mut io = VfsPageIo::new(vfs, cipher.as_ref());
        stream_guard.cursor.fetch_next(&mut io, batch_size)
    }

    pub fn close_stream(&self, stream_id: u64) -> Result<()> {
        self.streams
            .remove(stream_id)
            .ok_or_else(|| Error::HandleMisuse("unknown stream id".to_string()))?;
        Ok(())
    }

    pub fn export_to_bytes(&self, handle: u64) -> Result<Vec<u8>> {
        let arc = self.handle_arc(handle)?;
        let guard = arc.lock();
        self.ensure_not_dirty(&guard)?;
        guard.vfs.export_to_bytes()
    }

    pub fn import_from_bytes(&self, handle: u64, bytes: &[u8], deadline: Deadline) -> Result<()> {
        let arc = self.handle_arc(handle)?;
        let mut guard = arc.lock();
        self.ensure_not_dirty(&guard)?;

        let DatabaseEntry { vfs, txn, .. } = &mut *guard;
        let clock = self.clock.as_ref();
        txn.begin(Mode::Exclusive, vfs.page_count(), clock, deadline)?;
        let result = vfs.import_from_bytes(bytes);
        match &result {
            Ok(()) => {
                txn.commit(vfs)?;
            }
            Err(_) => {
                let _ = txn.rollback(vfs, "import_from_bytes failed");
            }
        }
        if matches!(result, Err(Error::CorruptHeader(_))) {
            guard.dirty = true;
        }
        result
    }

    /// Explicit `BEGIN` (spec §4.4 `begin`).
    pub fn begin(&self, handle: u64, mode: Mode, deadline: Deadline) -> Result<()> {
        let arc = self.handle_arc(handle)?;
        let guard = arc.lock();
        self.ensure_not_dirty(&guard)?;
        guard.txn.begin(mode, guard.vfs.page_count(), self.clock.as_ref(), deadline)
    }

    /// Explicit `COMMIT` (spec §4.4 `commit`).
    pub fn commit(&self, handle: u64) -> Result<()> {
        let arc = self.handle_arc(handle)?;
        let mut guard = arc.lock();
        self.ensure_not_dirty(&guard)?;
        let result = guard.txn.commit(&guard.vfs);
        self.note_fatal_on_commit_failure(&mut guard, &result);
        result
    }

    /// Explicit `ROLLBACK` (spec §4.4 `rollback`).
    pub fn rollback(&self, handle: u64) -> Result<()> {
        let arc = self.handle_arc(handle)?;
        let guard = arc.lock();
        self.ensure_not_dirty(&guard)?;
        guard.txn.rollback(&guard.vfs, "explicit rollback")
    }

    /// Run `body` inside a transaction on `handle` (spec §4.4 `scoped`).
    pub fn scoped<T>(
        &self,
        handle: u64,
        mode: Mode,
        deadline: Deadline,
        body: impl FnOnce(&mut dyn PageIo) -> Result<T>,
    ) -> Result<T> {
        let arc = self.handle_arc(handle)?;
        let mut guard = arc.lock();
        self.ensure_not_dirty(&guard)?;

        let DatabaseEntry { vfs, cipher, txn, .. } = &mut *guard;
        let clock = self.clock.as_ref();
        txn.scoped(vfs, mode, clock, deadline, || {
            let mut io = VfsPageIo::new(vfs, cipher.as_ref());
            body(&mut io)
        })
    }

    pub fn rekey(&self, handle: u64, new_key: &[u8]) -> Result<()> {
        let arc = self.handle_arc(handle)?;
        let mut guard = arc.lock();
        self.ensure_not_dirty(&guard)?;
        guard.cipher.rekey(new_key)
    }

    /// Flush, forget every statement/stream owned by `handle`, and free
    /// its slot. Does not release a leadership lease — that belongs to
    /// the Tab Coordinator wrapping this host (spec §4.5).
    pub fn close(&self, handle: u64) -> Result<()> {
        let arc = self.handle_arc(handle)?;
        {
            let guard = arc.lock();
            guard.vfs.sync()?;
        }

        for id in self.statements.ids() {
            if let Some(entry) = self.statements.get(id) {
                if entry.lock().handle_id == handle {
                    self.statements.remove(id);
                }
            }
        }
        for id in self.streams.ids() {
            if let Some(entry) = self.streams.get(id) {
                if entry.lock().handle_id == handle {
                    self.streams.remove(id);
                }
            }
        }

        if let Some(entry) = self.handles.remove(handle) {
            self.open_names.lock().remove(&entry.lock().config.name);
        }
        Ok(())
    }

    pub fn is_open(&self, handle: u64) -> bool {
        self.handles.contains(handle)
    }

    /// Every handle id still open, for the registry's `teardown` to
    /// close on shutdown (spec §9).
    pub fn open_handle_ids(&self) -> Vec<u64> {
        self.handles.ids()
    }

    /// The database name a handle was opened with, for a coordinator
    /// that only knows handle ids to find its way back to a db name.
    pub fn database_name(&self, handle: u64) -> Result<String> {
        let arc = self.handle_arc(handle)?;
        Ok(arc.lock().config.name.clone())
    }

    /// Discard the handle's cache (spec §4.2 `invalidate_external`),
    /// called by the Tab Coordinator on a `Change` notification from
    /// another tab.
    pub fn invalidate(&self, handle: u64) -> Result<()> {
        let arc = self.handle_arc(handle)?;
        arc.lock().vfs.invalidate_external();
        Ok(())
    }

    /// The handle's current change epoch, for the Tab Coordinator to
    /// compare against a `Change` notification's epoch.
    pub fn change_epoch(&self, handle: u64) -> Result<u64> {
        let arc = self.handle_arc(handle)?;
        Ok(arc.lock().vfs.change_epoch())
    }

    fn handle_arc(&self, handle: u64) -> Result<Arc<Mutex<DatabaseEntry>>> {
        self.handles.get(handle).ok_or(Error::NotOpen)
    }

    fn ensure_not_dirty(&self, entry: &DatabaseEntry) -> Result<()> {
        if entry.dirty {
            return Err(Error::NotOpen);
        }
        Ok(())
    }

    /// A flush failure during commit (as opposed to a poisoned-nested
    /// rollback, which always surfaces as `HandleMisuse`) is fatal to
    /// the handle (spec §7 Fatal conditions).
    fn note_fatal_on_commit_failure<T>(&self, entry: &mut DatabaseEntry, result: &Result<T>) {
        if let Err(err) = result {
            if !matches!(err, Error::HandleMisuse(_) | Error::ConstraintViolation { .. } | Error::InvalidSql { .. }) {
                entry.dirty = true;
            }
        }
    }
}
