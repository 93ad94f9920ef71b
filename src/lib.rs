//! driftdb — a SQLite-compatible embeddable SQL engine backed by a
//! checksummed block VFS, with multi-tab leader election and write
//! forwarding.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                            driftdb                               │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │        Tab Coordinator (coordinator/)                     │   │
//! │  │   Leader election, lease, heartbeat, write forwarding     │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │           SQL Engine Host (host/)                         │   │
//! │  │   Connection handles, prepared statements, streaming      │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │       Transaction Manager (txn/)                          │   │
//! │  │   Idle → InWrite → Committing/RollingBack → Idle           │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │         Page Cache & VFS (vfs/)  [LRU]                   │   │
//! │  │      PageVfs + Frame + Replacer                           │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │            Block Store (block/)                           │   │
//! │  │     Checksummed, epoch-stamped (db, index) blobs          │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The SQL parser/planner/bytecode VM itself is an external
//! collaborator; this crate hosts it behind [`host::SqlEngine`] and
//! owns everything below that seam.
//!
//! # Modules
//! - [`common`] — shared primitives (`PageId`, `FrameId`, `Error`, clock, config)
//! - [`block`] — checksummed, epoch-stamped blob storage
//! - [`vfs`] — page-addressable LRU cache over the block store
//! - [`txn`] — per-handle write-transaction state machine
//! - [`host`] — connection handles, prepared statements, streaming cursors
//! - [`coordinator`] — multi-tab leader election and write forwarding
//! - [`registry`] — the arena primitive and the top-level `init`/`teardown` registry

pub mod block;
pub mod common;
pub mod coordinator;
pub mod host;
pub mod registry;
pub mod txn;
pub mod vfs;

pub use common::{Error, FrameId, HandleId, PageId, Result, StatementId, StreamId};
pub use registry::EngineRegistry;
