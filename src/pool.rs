//! Fixed-size pool allocator with first-fit allocation and lazy compaction.
//!
//! [`PoolAllocator`] manages a contiguous byte range it does not own,
//! handing out blocks identified by opaque [`BlockId`]s. Freed space is
//! never coalesced; when a request cannot be served from any single vacant
//! block, the allocator compacts all in-use blocks to the front of the
//! pool once and retries. If a sufficiently small pool sees many
//! allocations and frees, that compaction may become frequent enough to
//! matter; preallocate more in that case.
//!
//! # Example
//!
//! ```rust
//! use shmpool::pool::PoolAllocator;
//! use std::ptr::NonNull;
//!
//! let mut buf = vec![0u8; 64];
//! let mut pool = PoolAllocator::new();
//! // SAFETY: `buf` outlives every use of `pool`.
//! unsafe { pool.init(NonNull::new(buf.as_mut_ptr()).unwrap(), buf.len()).unwrap() };
//!
//! let block = pool.allocate(5).unwrap();
//! pool.write(block, b"hello").unwrap();
//!
//! let mut out = [0u8; 5];
//! pool.read(block, &mut out).unwrap();
//! assert_eq!(&out, b"hello");
//! ```

use crate::error::{Error, Result};
use std::fmt;
use std::ptr::NonNull;

/// Identifier of an in-use block within one [`PoolAllocator`].
///
/// Ids are assigned from a monotonically increasing counter starting at 0
/// and are never reused, even after the block they named is freed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(u64);

impl BlockId {
    /// Raw numeric form, for display and external bookkeeping.
    pub fn into_raw(self) -> u64 {
        self.0
    }

    /// Rebuild an id from [`into_raw`](Self::into_raw) output.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A contiguous sub-range of the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Extent {
    offset: usize,
    len: usize,
}

/// An in-use extent together with its id.
#[derive(Debug, Clone, Copy)]
struct Block {
    id: BlockId,
    offset: usize,
    len: usize,
}

/// The managed byte range. Borrowed, never owned: the allocator neither
/// frees nor unmaps it.
#[derive(Clone, Copy)]
struct Pool {
    base: NonNull<u8>,
    len: usize,
}

/// Read-only description of one pool entry, in-use or vacant.
///
/// Returned by [`PoolAllocator::layout`] for introspection; vacant entries
/// carry no id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// Id of the block, or `None` for vacant space.
    pub id: Option<BlockId>,
    /// Byte offset within the pool.
    pub offset: usize,
    /// Length in bytes.
    pub len: usize,
}

/// First-fit allocator over a fixed-size, externally owned byte range.
///
/// The allocator tracks which sub-ranges are in use and which are vacant.
/// Freeing never merges adjacent vacant blocks; the only consolidation is
/// the compaction pass [`defrag`](Self::defrag), which `allocate` runs
/// once as a fallback before giving up.
///
/// No internal locking is performed: callers serialize concurrent access.
pub struct PoolAllocator {
    pool: Option<Pool>,
    in_use: Vec<Block>,
    vacant: Vec<Extent>,
    next_id: u64,
}

// SAFETY: the allocator holds no thread-affine state. Its base pointer must
// be valid for the allocator's whole lifetime (the `init` contract), which
// is thread-independent; serialization of concurrent calls is the caller's
// responsibility as documented.
unsafe impl Send for PoolAllocator {}
unsafe impl Sync for PoolAllocator {}

impl PoolAllocator {
    /// Create an uninitialized allocator. All operations fail with
    /// [`Error::Uninitialized`] until [`init`](Self::init) succeeds.
    pub fn new() -> Self {
        Self {
            pool: None,
            in_use: Vec::new(),
            vacant: Vec::new(),
            next_id: 0,
        }
    }

    /// Adopt `len` bytes starting at `base` as the memory pool.
    ///
    /// On success the whole range becomes one vacant block. Fails with
    /// [`Error::AlreadyInitialized`] on a second call and
    /// [`Error::ZeroSize`] when `len == 0`.
    ///
    /// # Safety
    ///
    /// `base` must point to `len` bytes that are readable and writable and
    /// remain valid for the lifetime of this allocator. The allocator does
    /// not take ownership; the caller frees or unmaps the buffer after the
    /// allocator is gone.
    pub unsafe fn init(&mut self, base: NonNull<u8>, len: usize) -> Result<()> {
        if self.pool.is_some() {
            return Err(Error::AlreadyInitialized);
        }
        if len == 0 {
            return Err(Error::ZeroSize);
        }

        self.pool = Some(Pool { base, len });
        self.vacant.push(Extent { offset: 0, len });
        Ok(())
    }

    /// Whether [`init`](Self::init) has succeeded.
    pub fn is_initialized(&self) -> bool {
        self.pool.is_some()
    }

    /// Total pool size in bytes, or 0 before initialization.
    pub fn capacity(&self) -> usize {
        self.pool.map_or(0, |p| p.len)
    }

    /// Number of blocks currently in use.
    pub fn in_use_blocks(&self) -> usize {
        self.in_use.len()
    }

    /// Total vacant bytes. Not necessarily allocatable in one block.
    pub fn vacant_bytes(&self) -> usize {
        self.vacant.iter().map(|v| v.len).sum()
    }

    /// Size of the largest single vacant block.
    pub fn largest_vacant(&self) -> usize {
        self.vacant.iter().map(|v| v.len).max().unwrap_or(0)
    }

    /// Snapshot of the pool layout: in-use blocks first, then vacant space.
    pub fn layout(&self) -> Vec<BlockInfo> {
        let mut out = Vec::with_capacity(self.in_use.len() + self.vacant.len());
        out.extend(self.in_use.iter().map(|b| BlockInfo {
            id: Some(b.id),
            offset: b.offset,
            len: b.len,
        }));
        out.extend(self.vacant.iter().map(|v| BlockInfo {
            id: None,
            offset: v.offset,
            len: v.len,
        }));
        out
    }

    /// Allocate a block of `len` bytes and return its id.
    ///
    /// First-fit: the block is carved from the front of the first vacant
    /// block large enough. If none fits, the pool is compacted once with
    /// [`defrag`](Self::defrag) and the scan retried against the single
    /// resulting vacant block before failing with [`Error::NoVacantBlock`].
    pub fn allocate(&mut self, len: usize) -> Result<BlockId> {
        let pool = self.pool.ok_or(Error::Uninitialized)?;
        if len == 0 {
            return Err(Error::ZeroSize);
        }
        if len > pool.len {
            return Err(Error::ExceedsPool {
                requested: len,
                pool: pool.len,
            });
        }
        if self.vacant.is_empty() {
            return Err(Error::NoVacantBlock {
                requested: len,
                largest: 0,
            });
        }

        if let Some(idx) = self.vacant.iter().position(|v| v.len >= len) {
            return Ok(self.carve(idx, len));
        }

        // The scattered vacancies were each too small; consolidate them
        // into a single block and retry exactly once.
        self.defrag()?;
        if let Some(idx) = self.vacant.iter().position(|v| v.len >= len) {
            return Ok(self.carve(idx, len));
        }

        Err(Error::NoVacantBlock {
            requested: len,
            largest: self.largest_vacant(),
        })
    }

    /// Carve `len` bytes from the front of the vacant block at `idx`.
    fn carve(&mut self, idx: usize, len: usize) -> BlockId {
        let id = BlockId(self.next_id);
        self.next_id += 1;

        let vacant = &mut self.vacant[idx];
        self.in_use.push(Block {
            id,
            offset: vacant.offset,
            len,
        });

        if vacant.len == len {
            self.vacant.remove(idx);
        } else {
            vacant.offset += len;
            vacant.len -= len;
        }

        id
    }

    /// Return the block `id` to the vacant list.
    ///
    /// Adjacent vacant blocks are deliberately not merged; only
    /// [`defrag`](Self::defrag) consolidates free space.
    pub fn free(&mut self, id: BlockId) -> Result<()> {
        if self.pool.is_none() {
            return Err(Error::Uninitialized);
        }
        let idx = self
            .in_use
            .iter()
            .position(|b| b.id == id)
            .ok_or(Error::UnknownBlock(id))?;

        let block = self.in_use.remove(idx);
        self.vacant.push(Extent {
            offset: block.offset,
            len: block.len,
        });
        Ok(())
    }

    /// Compact all in-use blocks to the front of the pool.
    ///
    /// Blocks are relocated in their current iteration order to ascending
    /// contiguous offsets; afterwards the remaining tail of the pool is the
    /// single vacant block. Runs only as the `allocate` fallback in normal
    /// operation.
    pub fn defrag(&mut self) -> Result<()> {
        let pool = self.pool.ok_or(Error::Uninitialized)?;

        let mut offset = 0;
        for block in &mut self.in_use {
            if block.offset != offset {
                // Source and destination may overlap when a block slides
                // down by less than its own length.
                unsafe {
                    std::ptr::copy(
                        pool.base.as_ptr().add(block.offset),
                        pool.base.as_ptr().add(offset),
                        block.len,
                    );
                }
                block.offset = offset;
            }
            offset += block.len;
        }

        self.vacant.clear();
        self.vacant.push(Extent {
            offset,
            len: pool.len - offset,
        });
        Ok(())
    }

    /// Copy `buf.len()` bytes out of block `id` into `buf`.
    ///
    /// Fails with [`Error::ExceedsBlock`] if `buf` is longer than the
    /// block; nothing is copied on failure.
    pub fn read(&self, id: BlockId, buf: &mut [u8]) -> Result<()> {
        let pool = self.pool.ok_or(Error::Uninitialized)?;
        let block = self.lookup(id)?;
        if buf.len() > block.len {
            return Err(Error::ExceedsBlock {
                requested: buf.len(),
                block: block.len,
            });
        }

        unsafe {
            std::ptr::copy_nonoverlapping(
                pool.base.as_ptr().add(block.offset),
                buf.as_mut_ptr(),
                buf.len(),
            );
        }
        Ok(())
    }

    /// Copy `data` into block `id`.
    ///
    /// Fails with [`Error::ExceedsBlock`] if `data` is longer than the
    /// block; nothing is copied on failure.
    pub fn write(&mut self, id: BlockId, data: &[u8]) -> Result<()> {
        let pool = self.pool.ok_or(Error::Uninitialized)?;
        let block = self.lookup(id)?;
        if data.len() > block.len {
            return Err(Error::ExceedsBlock {
                requested: data.len(),
                block: block.len,
            });
        }

        unsafe {
            std::ptr::copy_nonoverlapping(
                data.as_ptr(),
                pool.base.as_ptr().add(block.offset),
                data.len(),
            );
        }
        Ok(())
    }

    fn lookup(&self, id: BlockId) -> Result<Block> {
        self.in_use
            .iter()
            .find(|b| b.id == id)
            .copied()
            .ok_or(Error::UnknownBlock(id))
    }
}

impl Default for PoolAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PoolAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolAllocator")
            .field("capacity", &self.capacity())
            .field("in_use", &self.in_use.len())
            .field("vacant", &self.vacant.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}
