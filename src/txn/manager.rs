//! Per-handle transaction state machine (spec §4.4): `Idle -> InWrite ->
//! Committing|RollingBack -> Idle`. One [`TransactionManager`] belongs
//! to exactly one open database handle, the same way one teacher
//! `BufferPoolManager` belongs to exactly one buffer pool — there is no
//! cross-handle sharing here either.

use std::time::Duration;

use parking_lot::Mutex;

use crate::common::clock::{Clock, Deadline};
use crate::common::{Error, Result};
use crate::txn::state::{Mode, State};
use crate::vfs::PageVfs;

struct Inner {
    state: State,
    /// Nesting depth of `scoped` calls sharing this one write slot.
    depth: u32,
    mode: Option<Mode>,
    /// `page_count` observed when the outermost `begin` ran, so a
    /// rollback can discard pages appended since then.
    page_count_before: u32,
    /// Set by a `rollback` at any nesting depth; forces the outermost
    /// `commit` to fail even if the Rust-level error that triggered the
    /// inner rollback was swallowed by the caller (spec §4.4 "a
    /// rollback at any depth poisons the whole transaction").
    must_rollback_reason: Option<String>,
}

/// How long `scoped`/`begin` spin-wait for the slot before re-checking
/// the deadline. The single-writer slot is expected to be held only for
/// the duration of one statement or scope, so a short, cheap poll beats
/// the complexity of a condvar for this crate's synchronous call model.
const POLL_INTERVAL: Duration = Duration::from_millis(1);

pub struct TransactionManager {
    inner: Mutex<Inner>,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: State::Idle,
                depth: 0,
                mode: None,
                page_count_before: 0,
                must_rollback_reason: None,
            }),
        }
    }

    pub fn state(&self) -> State {
        self.inner.lock().state
    }

    pub fn is_in_transaction(&self) -> bool {
        matches!(self.inner.lock().state, State::InWrite)
    }

    /// Acquire the write slot, blocking (spinning on `clock`/`deadline`)
    /// until it is free or the deadline passes.
    pub fn begin(
        &self,
        mode: Mode,
        page_count_before: u32,
        clock: &dyn Clock,
        deadline: Deadline,
    ) -> Result<()> {
        loop {
            {
                let mut inner = self.inner.lock();
                if inner.state == State::Idle {
                    inner.state = State::InWrite;
                    inner.depth = 1;
                    inner.mode = Some(mode);
                    inner.page_count_before = page_count_before;
                    inner.must_rollback_reason = None;
                    return Ok(());
                }
            }
            if deadline.is_expired(clock) {
                return Err(Error::WriteBusy);
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Enter a nested `scoped` call that reuses the already-held slot.
    pub fn enter_nested(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.state != State::InWrite {
            return Err(Error::HandleMisuse(
                "enter_nested called without an active transaction".to_string(),
            ));
        }
        inner.depth += 1;
        Ok(())
    }

    /// Commit the current nesting level. At depth 1 this flushes `vfs`;
    /// a deeper level just decrements the depth counter (spec §4.4
    /// "nested scopes flatten into the outer transaction").
    pub fn commit(&self, vfs: &PageVfs) -> Result<()> {
        let (should_flush, page_count_before, poisoned) = {
            let mut inner = self.inner.lock();
            if inner.state != State::InWrite {
                return Err(Error::HandleMisuse(
                    "commit called outside a transaction".to_string(),
                ));
            }
            if inner.depth > 1 {
                inner.depth -= 1;
                return Ok(());
            }
            let poisoned = inner.must_rollback_reason.clone();
            inner.state = State::Committing;
            (true, inner.page_count_before, poisoned)
        };
        let _ = should_flush;

        if let Some(reason) = poisoned {
            vfs.rollback_to(page_count_before);
            let mut inner = self.inner.lock();
            inner.state = State::Idle;
            inner.depth = 0;
            inner.mode = None;
            inner.must_rollback_reason = None;
            return Err(Error::HandleMisuse(format!(
                "transaction rolled back: {reason}"
            )));
        }

        match vfs.sync() {
            Ok(()) => {
                let mut inner = self.inner.lock();
                inner.state = State::Idle;
                inner.depth = 0;
                inner.mode = None;
                Ok(())
            }
            Err(err) => {
                // Commit failure is fatal to the transaction (not the
                // handle): vfs.sync() guarantees no partial flush, so
                // discarding the dirty set here restores the exact
                // pre-begin state.
                vfs.rollback_to(page_count_before);
                let mut inner = self.inner.lock();
                inner.state = State::Idle;
                inner.depth = 0;
                inner.mode = None;
                inner.must_rollback_reason = None;
                Err(err)
            }
        }
    }

    /// Roll back the current nesting level. The dirty set is discarded
    /// immediately regardless of depth, since nested scopes share a
    /// single write slot and thus a single set of uncommitted pages;
    /// only the "who gets to see the error" bookkeeping differs by
    /// depth.
    pub fn rollback(&self, vfs: &PageVfs, reason: impl Into<String>) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.state != State::InWrite {
            return Err(Error::HandleMisuse(
                "rollback called outside a transaction".to_string(),
            ));
        }
        vfs.rollback_to(inner.page_count_before);
        if inner.depth > 1 {
            inner.depth -= 1;
            inner.must_rollback_reason = Some(reason.into());
            return Ok(());
        }
        inner.state = State::Idle;
        inner.depth = 0;
        inner.mode = None;
        inner.must_rollback_reason = None;
        Ok(())
    }

    /// Run `body` inside a transaction, beginning one if none is active
    /// or joining the active one as a nested scope, then committing or
    /// rolling back based on `body`'s result (spec §4.4 `scoped`).
    pub fn scoped<T>(
        &self,
        vfs: &PageVfs,
        mode: Mode,
        clock: &dyn Clock,
        deadline: Deadline,
        body: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        let nested = self.is_in_transaction();
        if nested {
            self.enter_nested()?;
        } else {
            self.begin(mode, vfs.page_count(), clock, deadline)?;
        }

        match body() {
            Ok(value) => match self.commit(vfs) {
                Ok(()) => Ok(value),
                Err(err) => Err(err),
            },
            Err(err) => {
                let reason = err.to_string();
                self.rollback(vfs, reason)?;
                Err(err)
            }
        }
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}
