//! # shmpool
//!
//! Shared-memory inter-process communication built on a compacting
//! fixed-size pool allocator.
//!
//! One producer process creates a named POSIX shared-memory object and
//! publishes data into it; any number of consumer processes map the same
//! object and read the bytes in place, without copying through a kernel
//! channel.
//!
//! ## Features
//!
//! - **[`PoolAllocator`]**: first-fit block allocation over a borrowed
//!   byte range, with lazy defragmentation when free space is scattered
//! - **[`Segment`]**: producer side that creates, sizes, and maps the
//!   named object, spanning it with a single allocator block
//! - **[`SegmentClient`]**: consumer side that attaches existing objects
//!   by name and mirrors the producer's allocation so offsets agree
//! - **Durable writes**: every write pins the mapped pages, copies, then
//!   flushes synchronously with invalidation so other mappings observe
//!   the new bytes
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use shmpool::prelude::*;
//!
//! // Producer process
//! let mut segment = Segment::create("telemetry", AccessMode::ReadWrite, 4096)?;
//! segment.write(b"reactor nominal")?;
//!
//! // Consumer process
//! let mut client = SegmentClient::new();
//! let handle = client.attach("telemetry", AccessMode::ReadOnly, 4096)?;
//! let mut buf = [0u8; 15];
//! client.read(handle, &mut buf)?;
//! ```
//!
//! ## Concurrency
//!
//! The library performs no locking, in-process or across processes.
//! Serializing writers is the application's job; the pin/flush protocol
//! around writes gives best-effort read consistency, not atomicity.
//!
//! [`PoolAllocator`]: pool::PoolAllocator
//! [`Segment`]: segment::Segment
//! [`SegmentClient`]: client::SegmentClient

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod client;
pub mod error;
pub mod pool;
pub mod segment;
pub mod shm;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::client::{AttachmentId, SegmentClient};
    pub use crate::error::{Error, Result};
    pub use crate::pool::{BlockId, PoolAllocator};
    pub use crate::segment::Segment;
    pub use crate::shm::AccessMode;
}

pub use error::{Error, Result};
pub use shm::AccessMode;
