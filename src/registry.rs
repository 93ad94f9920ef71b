//! Slotted arena and the top-level engine registry (spec §6, §9).
//!
//! Connections reference a handle; handles own caches and statement
//! tables; statements reference their owning connection. Spec §9 asks
//! for this to be modeled with "arena-allocated slot tables indexed by
//! opaque integer identifiers" rather than a cyclic reference graph —
//! [`Slab`] is that arena, generalized from the teacher's
//! `BufferPoolManager` combination of a `page_table` map plus a
//! `free_list` of reusable slot ids into a single reusable type used for
//! handles, statements, and streams alike.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::common::Result;
use crate::host::SqlEngineHost;

/// A map from opaque, monotonically-issued `u64` ids to `Arc<Mutex<T>>`
/// entries. Issuing a new id never reuses a previous one, so a stale id
/// held by a caller after `remove` reliably misses rather than
/// aliasing a newer entry that happens to reuse the slot.
pub struct Slab<T> {
    entries: RwLock<HashMap<u64, Arc<Mutex<T>>>>,
    next_id: AtomicU64,
}

impl<T> Slab<T> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn insert(&self, value: T) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.write().insert(id, Arc::new(Mutex::new(value)));
        id
    }

    pub fn get(&self, id: u64) -> Option<Arc<Mutex<T>>> {
        self.entries.read().get(&id).cloned()
    }

    pub fn remove(&self, id: u64) -> Option<Arc<Mutex<T>>> {
        self.entries.write().remove(&id)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.entries.read().contains_key(&id)
    }

    pub fn ids(&self) -> Vec<u64> {
        self.entries.read().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl<T> Default for Slab<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// The process-global-looking state the specification permits (spec §6,
/// §9): "no hidden process-wide singletons beyond this registry."
/// Deliberately not a `lazy_static`/`OnceCell` global — the caller
/// constructs one explicitly via [`Self::init`] and is responsible for
/// holding it, the same way the caller owns the teacher's
/// `BufferPoolManager` instance rather than reaching it through a
/// global.
pub struct EngineRegistry {
    host: SqlEngineHost,
    torn_down: AtomicBool,
}

impl EngineRegistry {
    pub fn init(host: SqlEngineHost) -> Self {
        Self {
            host,
            torn_down: AtomicBool::new(false),
        }
    }

    pub fn host(&self) -> &SqlEngineHost {
        &self.host
    }

    /// Close every still-open handle, cancelling their outstanding
    /// deadlines and releasing their leases (lease release itself lives
    /// in the Tab Coordinator that wraps this registry's host). Safe to
    /// call more than once; only the first call does any work.
    pub fn teardown(&self) -> Result<()> {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        for id in self.host.open_handle_ids() {
            let _ = self.host.close(id);
        }
        Ok(())
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }
}
