//! Producer side of a shared memory segment.
//!
//! A [`Segment`] creates a named OS shared-memory object, maps it, and
//! spans the whole mapping with one [`PoolAllocator`] block. Consumers
//! attach to the same name with [`SegmentClient`] and mirror that single
//! allocation, so both sides address the identical byte range without any
//! coordination after creation.
//!
//! [`SegmentClient`]: crate::client::SegmentClient

use crate::error::{Error, Result};
use crate::pool::{BlockId, PoolAllocator};
use crate::shm::{normalize_name, AccessMode, Mapping, PageLock, ShmObject};
use rustix::mm::ProtFlags;
use tracing::debug;

/// A named shared memory object created and owned by this process.
///
/// The segment holds exactly one live allocation covering the entire
/// mapped region for its whole lifetime; block ids never surface to
/// callers. Reads and writes always address the full region from offset 0.
///
/// No internal locking: concurrent use from multiple threads must be
/// serialized by the caller, and the library provides no arbitration
/// between writers in different processes.
pub struct Segment {
    name: String,
    access: AccessMode,
    size: usize,
    inner: Option<Inner>,
}

struct Inner {
    // Declaration order is teardown order: unmap before unlink/close.
    map: Mapping,
    shm: ShmObject,
    alloc: PoolAllocator,
    block: BlockId,
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("name", &self.name)
            .field("access", &self.access)
            .field("size", &self.size)
            .field("mapped", &self.inner.is_some())
            .finish()
    }
}

impl Segment {
    /// Create the shared object and map it.
    ///
    /// `name` gets a leading '/' prepended if missing (`shm_open` requires
    /// one). The object is created exclusively: if it already exists the
    /// call fails with [`Error::SegmentExists`]. `access` selects the
    /// permission bits granted to other processes; the creator itself
    /// always maps read-write.
    ///
    /// Every acquired resource is released again if a later step fails,
    /// so a failed `create` leaves nothing behind.
    ///
    /// # Errors
    ///
    /// [`Error::EmptyName`], [`Error::ZeroSize`], [`Error::SegmentExists`],
    /// or any OS failure from open/resize/map.
    pub fn create(name: &str, access: AccessMode, size: usize) -> Result<Self> {
        let name = normalize_name(name)?;
        if size == 0 {
            return Err(Error::ZeroSize);
        }

        let shm = ShmObject::create(&name, access)?;
        shm.resize(size)?;
        let map = Mapping::map(shm.fd(), size, ProtFlags::READ | ProtFlags::WRITE)?;

        let mut alloc = PoolAllocator::new();
        // SAFETY: the mapping is stored in `Inner` alongside the allocator
        // and outlives it; `Mapping::map` rejects zero lengths.
        unsafe { alloc.init(map.ptr(), size)? };

        // The one allocation of the segment's lifetime. Clients repeat it
        // on their own allocator mirror so offsets agree on both sides.
        let block = alloc.allocate(size)?;

        debug!(name = %name, size, access = %access, "created shared memory segment");

        Ok(Self {
            name,
            access,
            size,
            inner: Some(Inner {
                map,
                shm,
                alloc,
                block,
            }),
        })
    }

    /// Unmap the region, remove the named object, and close the
    /// descriptor.
    ///
    /// Runs automatically when the segment is dropped while still active;
    /// calling it explicitly surfaces teardown errors. A second call fails
    /// with [`Error::Uninitialized`] and performs no OS interaction.
    pub fn destroy(&mut self) -> Result<()> {
        let Inner { map, shm, .. } = self.inner.take().ok_or(Error::Uninitialized)?;

        map.unmap()?;
        shm.remove()?;

        debug!(name = %self.name, "destroyed shared memory segment");
        Ok(())
    }

    /// Copy `buf.len()` bytes from the start of the region into `buf`.
    ///
    /// # Errors
    ///
    /// [`Error::Uninitialized`] after `destroy`, or
    /// [`Error::ExceedsBlock`] when `buf` is longer than the region.
    pub fn read(&self, buf: &mut [u8]) -> Result<()> {
        let inner = self.inner.as_ref().ok_or(Error::Uninitialized)?;
        inner.alloc.read(inner.block, buf)
    }

    /// Copy `data` to the start of the region and publish it.
    ///
    /// The mapping's pages are pinned in physical memory for the duration
    /// of the copy, then the modified pages are flushed synchronously with
    /// invalidation of other processes' cached mappings, so attached
    /// readers observe the new bytes on their next access. This is a
    /// durability protocol, not mutual exclusion: concurrent writers still
    /// interleave arbitrarily.
    ///
    /// # Errors
    ///
    /// [`Error::Uninitialized`] after `destroy`, [`Error::ExceedsBlock`]
    /// when `data` is longer than the region, or any OS failure from
    /// pin/unpin/flush.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        let inner = self.inner.as_mut().ok_or(Error::Uninitialized)?;

        let lock = PageLock::lock(&inner.map)?;
        inner.alloc.write(inner.block, data)?;
        lock.unlock()?;

        inner.map.flush()
    }

    /// The normalized object name (always with its leading '/').
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size of the shared region in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Access granted to other processes at creation.
    pub fn access(&self) -> AccessMode {
        self.access
    }

    /// Whether the segment is still active (not yet destroyed).
    pub fn is_active(&self) -> bool {
        self.inner.is_some()
    }
}

// Teardown happens through the guards in `Inner`: the mapping unmaps, then
// the shm object unlinks its name and closes the descriptor.
