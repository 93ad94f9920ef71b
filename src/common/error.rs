//! Error taxonomy for driftdb.
//!
//! A single tagged-union `Error` type covers every fallible operation in
//! the crate, per the error design in the specification (§7): callers
//! pattern-match on `kind`-like variants rather than catching panics.

use thiserror::Error;

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors in driftdb.
#[derive(Debug, Error)]
pub enum Error {
    /// Handle is closed or was never opened.
    #[error("database handle is not open")]
    NotOpen,

    /// Double-open of the same logical database in the same process.
    #[error("database is already open")]
    AlreadyOpen,

    /// Configuration is invalid (bad page size, zero cache size, etc.).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Engine-level parse or compile error.
    #[error("invalid SQL: {message}{}", position.map(|p| format!(" (at byte {p})")).unwrap_or_default())]
    InvalidSql {
        message: String,
        position: Option<usize>,
    },

    /// Uniqueness, foreign-key, or check-constraint violation.
    #[error("constraint violation{}", constraint_name.as_deref().map(|n| format!(": {n}")).unwrap_or_default())]
    ConstraintViolation { constraint_name: Option<String> },

    /// Transaction slot occupied past the caller's deadline.
    #[error("write transaction slot busy")]
    WriteBusy,

    /// A write was attempted locally with forwarding disabled while the
    /// tab is a follower.
    #[error("this tab is not the leader for this database")]
    NotLeader,

    /// A forwarded write did not receive a response before its deadline.
    #[error("forwarded write timed out")]
    WriteForwardTimeout,

    /// An optimistic write was rejected by the leader; the cache was
    /// invalidated.
    #[error("optimistic write diverged from leader state")]
    OptimisticDiverged,

    /// A stream cursor was invalidated by an external change.
    #[error("stream cursor invalidated by a concurrent write")]
    StaleCursor,

    /// The on-disk/export header is corrupt or unrecognized.
    #[error("corrupt database header: {0}")]
    CorruptHeader(String),

    /// A stored block's payload is malformed (oversize, truncated, ...).
    #[error("corrupt block payload: {0}")]
    CorruptPayload(String),

    /// A block's stored checksum does not match its recomputed checksum.
    #[error("checksum mismatch for block {index} in database {database}")]
    ChecksumMismatch { database: String, index: u32 },

    /// The backing store refused a write for capacity reasons.
    #[error("storage quota exceeded")]
    QuotaExceeded,

    /// A generic backing-store I/O failure.
    #[error("backend I/O error: {0}")]
    BackendIo(String),

    /// Requested block or page does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// API contract violation: wrong thread, already-finalized statement,
    /// concurrent access to a single-owner resource, etc.
    #[error("handle misuse: {0}")]
    HandleMisuse(String),

    /// Operation was cancelled, by deadline expiry or explicit request.
    #[error("operation cancelled")]
    Cancelled,
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::BackendIo(err.to_string())
    }
}
