//! Error types for shmpool.

use crate::client::AttachmentId;
use crate::pool::BlockId;
use thiserror::Error;

/// Result type alias using shmpool's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for shmpool operations.
///
/// Variants group into the failure classes callers can act on: lifecycle
/// state, capacity, lookups, duplicate resources, access rights, and
/// operating-system failures. Errors are never retried or logged by the
/// library; they propagate to the caller immediately.
#[derive(Error, Debug)]
pub enum Error {
    /// Operation on an allocator or segment that is not (or no longer)
    /// initialized.
    #[error("not initialized")]
    Uninitialized,

    /// Second initialization of a pool allocator.
    #[error("already initialized")]
    AlreadyInitialized,

    /// A size argument was zero.
    #[error("size must be greater than 0")]
    ZeroSize,

    /// Allocation request larger than the whole pool.
    #[error("requested {requested} bytes but the pool holds {pool}")]
    ExceedsPool {
        /// Requested allocation size in bytes.
        requested: usize,
        /// Total pool size in bytes.
        pool: usize,
    },

    /// Read or write longer than the addressed block.
    #[error("requested {requested} bytes but the block holds {block}")]
    ExceedsBlock {
        /// Requested transfer size in bytes.
        requested: usize,
        /// Allocated block size in bytes.
        block: usize,
    },

    /// No vacant block can satisfy the request, even after compaction.
    #[error("no vacant block fits {requested} bytes (largest: {largest})")]
    NoVacantBlock {
        /// Requested allocation size in bytes.
        requested: usize,
        /// Largest vacant block available.
        largest: usize,
    },

    /// Block id not found among in-use blocks.
    #[error("unknown block id {0}")]
    UnknownBlock(BlockId),

    /// Attachment handle not known to this client.
    #[error("unknown attachment {0}")]
    UnknownAttachment(AttachmentId),

    /// The client is already attached to this segment.
    #[error("already attached to '{0}'")]
    DuplicateAttachment(String),

    /// A shared memory object with this name already exists.
    #[error("shared memory object '{0}' already exists")]
    SegmentExists(String),

    /// Segment name is empty.
    #[error("segment name is empty")]
    EmptyName,

    /// Write through an attachment that was not opened read-write.
    #[error("attachment '{0}' is not writable")]
    NotWritable(String),

    /// Read through an attachment that was opened with no access.
    #[error("attachment '{0}' is not readable")]
    NotReadable(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// System call error (via rustix).
    #[error("system error: {0}")]
    System(#[from] rustix::io::Errno),
}
