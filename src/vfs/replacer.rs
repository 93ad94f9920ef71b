//! LRU page replacement policy.
//!
//! The teacher ships only a `FifoReplacer`, with its module doc
//! explicitly marking LRU/CLOCK/LRU-K/2Q as future work ("Week 3-4").
//! This is that follow-through: strict least-recently-used eviction
//! over the *evictable* (clean, per spec §4.2) subset of frames.

use std::collections::HashSet;

use crate::common::FrameId;

/// Evicts the least-recently-accessed evictable frame.
pub struct LruReplacer {
    /// Frame ids in access order, oldest first. Re-accessing a frame
    /// moves it to the back — this is what distinguishes LRU from the
    /// teacher's FIFO, which never reorders on re-access.
    order: Vec<FrameId>,
    evictable: HashSet<FrameId>,
}

impl LruReplacer {
    pub fn new() -> Self {
        Self {
            order: Vec::new(),
            evictable: HashSet::new(),
        }
    }

    /// Record an access, moving the frame to the most-recently-used end.
    pub fn record_access(&mut self, frame_id: FrameId) {
        if let Some(pos) = self.order.iter().position(|&f| f == frame_id) {
            self.order.remove(pos);
        }
        self.order.push(frame_id);
    }

    pub fn set_evictable(&mut self, frame_id: FrameId, evictable: bool) {
        if evictable {
            self.evictable.insert(frame_id);
        } else {
            self.evictable.remove(&frame_id);
        }
    }

    /// Evict the least-recently-used evictable frame.
    pub fn evict(&mut self) -> Option<FrameId> {
        let position = self
            .order
            .iter()
            .position(|fid| self.evictable.contains(fid))?;
        let frame_id = self.order.remove(position);
        self.evictable.remove(&frame_id);
        Some(frame_id)
    }

    pub fn remove(&mut self, frame_id: FrameId) {
        self.evictable.remove(&frame_id);
        self.order.retain(|&fid| fid != frame_id);
    }

    pub fn size(&self) -> usize {
        self.evictable.len()
    }
}

impl Default for LruReplacer {
    fn default() -> Self {
        Self::new()
    }
}
