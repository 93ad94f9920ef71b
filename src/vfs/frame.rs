//! Frame — a slot in the page cache.
//!
//! Mirrors the teacher's `buffer::Frame` shape (page bytes behind an
//! `RwLock`, dirty flag, page id behind a small `Mutex`) but drops pin
//! counting entirely: a [`crate::vfs::PageVfs`] is owned exclusively by
//! one handle (spec §5 — "the page cache is owned exclusively by its
//! handle; no sharing across handles"), so there is no concurrent
//! borrower to protect a frame from.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::common::PageId;

pub struct Frame {
    bytes: RwLock<Box<[u8]>>,
    page_id: Mutex<Option<PageId>>,
    is_dirty: AtomicBool,
}

impl Frame {
    pub fn new(page_size: usize) -> Self {
        Self {
            bytes: RwLock::new(vec![0u8; page_size].into_boxed_slice()),
            page_id: Mutex::new(None),
            is_dirty: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn bytes(&self) -> RwLockReadGuard<'_, Box<[u8]>> {
        self.bytes.read()
    }

    #[inline]
    pub fn bytes_mut(&self) -> RwLockWriteGuard<'_, Box<[u8]>> {
        self.bytes.write()
    }

    #[inline]
    pub fn page_id(&self) -> Option<PageId> {
        *self.page_id.lock()
    }

    #[inline]
    pub fn set_page_id(&self, page_id: Option<PageId>) {
        *self.page_id.lock() = page_id;
    }

    #[inline]
    pub fn mark_dirty(&self) {
        self.is_dirty.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub fn clear_dirty(&self) {
        self.is_dirty.store(false, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::Relaxed)
    }

    /// Reset the frame to an empty, clean, zero-filled state for reuse.
    pub fn reset(&self) {
        self.bytes.write().fill(0);
        self.set_page_id(None);
        self.is_dirty.store(false, Ordering::Relaxed);
    }
}
