//! Consumer side: attach to shared memory segments created elsewhere.

use crate::error::{Error, Result};
use crate::pool::{BlockId, PoolAllocator};
use crate::shm::{normalize_name, AccessMode, Mapping, PageLock, ShmObject};
use std::fmt;
use tracing::debug;

/// Handle identifying one attachment within a [`SegmentClient`].
///
/// Assigned sequentially starting at 0; valid only for the client that
/// returned it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttachmentId(u64);

impl AttachmentId {
    /// Raw numeric form, for display and external bookkeeping.
    pub fn into_raw(self) -> u64 {
        self.0
    }

    /// Rebuild a handle from [`into_raw`](Self::into_raw) output.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for AttachmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One attached remote segment.
struct Attachment {
    id: AttachmentId,
    name: String,
    access: AccessMode,
    // Declaration order is teardown order: unmap before close.
    map: Mapping,
    shm: ShmObject,
    alloc: PoolAllocator,
    block: BlockId,
}

/// Maps one or more existing named segments for reading and/or writing.
///
/// Each attachment carries its own [`PoolAllocator`] mirror on which the
/// client repeats the producer's single full-size allocation, so the
/// mirrored block resolves to offset 0 exactly like the producer's. No
/// further allocator calls happen after attach; the two allocators can
/// never diverge.
///
/// Attachments close their descriptor on detach but never unlink the
/// object's name; that is the producer's job. All remaining attachments
/// are torn down when the client is dropped.
pub struct SegmentClient {
    attachments: Vec<Attachment>,
    next_id: u64,
}

impl SegmentClient {
    /// Create a client with no attachments.
    pub fn new() -> Self {
        Self {
            attachments: Vec::new(),
            next_id: 0,
        }
    }

    /// Attach to an existing shared memory object.
    ///
    /// `name` is normalized exactly as on the producer side, so `"data"`
    /// and `"/data"` refer to the same object. A second attachment to the
    /// same normalized name within this client fails with
    /// [`Error::DuplicateAttachment`]. `access` selects both the open
    /// flags and the mapping protection.
    ///
    /// Returns the handle identifying this attachment.
    ///
    /// # Errors
    ///
    /// [`Error::EmptyName`], [`Error::DuplicateAttachment`], or any OS
    /// failure from open/map (including a nonexistent object).
    pub fn attach(&mut self, name: &str, access: AccessMode, size: usize) -> Result<AttachmentId> {
        let name = normalize_name(name)?;
        if self.attachments.iter().any(|a| a.name == name) {
            return Err(Error::DuplicateAttachment(name));
        }

        let shm = ShmObject::open(&name, access)?;
        let map = Mapping::map(shm.fd(), size, access.prot_flags())?;

        let mut alloc = PoolAllocator::new();
        // SAFETY: the mapping is stored in the attachment alongside the
        // allocator and outlives it; `Mapping::map` rejects zero lengths.
        unsafe { alloc.init(map.ptr(), size)? };

        // Mirror the producer's one full-size allocation so the block
        // offset matches on both sides.
        let block = alloc.allocate(size)?;

        let id = AttachmentId(self.next_id);
        self.next_id += 1;

        debug!(name = %name, %id, size, access = %access, "attached to shared memory segment");

        self.attachments.push(Attachment {
            id,
            name,
            access,
            map,
            shm,
            alloc,
            block,
        });

        Ok(id)
    }

    /// Unmap an attachment and close its descriptor.
    ///
    /// The object's name is not unlinked; other attachments and the
    /// producer are unaffected. A second detach of the same handle fails
    /// with [`Error::UnknownAttachment`] and performs no OS interaction.
    pub fn detach(&mut self, id: AttachmentId) -> Result<()> {
        let idx = self
            .attachments
            .iter()
            .position(|a| a.id == id)
            .ok_or(Error::UnknownAttachment(id))?;

        let Attachment { name, map, shm, .. } = self.attachments.remove(idx);
        map.unmap()?;
        drop(shm); // close the descriptor after the unmap, never unlink

        debug!(name = %name, %id, "detached from shared memory segment");
        Ok(())
    }

    /// Copy `buf.len()` bytes from the start of the attached region.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownAttachment`], [`Error::NotReadable`] for an
    /// attachment opened with [`AccessMode::None`], or
    /// [`Error::ExceedsBlock`] when `buf` is longer than the region.
    pub fn read(&self, id: AttachmentId, buf: &mut [u8]) -> Result<()> {
        let att = self.get(id)?;
        if !att.access.is_readable() {
            return Err(Error::NotReadable(att.name.clone()));
        }
        att.alloc.read(att.block, buf)
    }

    /// Copy `data` to the start of the attached region and publish it.
    ///
    /// Performs the same pin, copy, unpin, flush-and-invalidate sequence
    /// as [`Segment::write`](crate::segment::Segment::write).
    ///
    /// # Errors
    ///
    /// [`Error::UnknownAttachment`], [`Error::NotWritable`] unless the
    /// attachment was opened [`AccessMode::ReadWrite`],
    /// [`Error::ExceedsBlock`], or any OS failure from pin/unpin/flush.
    pub fn write(&mut self, id: AttachmentId, data: &[u8]) -> Result<()> {
        let att = self.get_mut(id)?;
        if !att.access.is_writable() {
            return Err(Error::NotWritable(att.name.clone()));
        }

        let lock = PageLock::lock(&att.map)?;
        att.alloc.write(att.block, data)?;
        lock.unlock()?;

        att.map.flush()
    }

    /// Normalized name of an attachment.
    pub fn name(&self, id: AttachmentId) -> Result<&str> {
        Ok(&self.get(id)?.name)
    }

    /// Access mode of an attachment.
    pub fn access(&self, id: AttachmentId) -> Result<AccessMode> {
        Ok(self.get(id)?.access)
    }

    /// Number of current attachments.
    pub fn attachment_count(&self) -> usize {
        self.attachments.len()
    }

    /// Whether the client has no attachments.
    pub fn is_empty(&self) -> bool {
        self.attachments.is_empty()
    }

    fn get(&self, id: AttachmentId) -> Result<&Attachment> {
        self.attachments
            .iter()
            .find(|a| a.id == id)
            .ok_or(Error::UnknownAttachment(id))
    }

    fn get_mut(&mut self, id: AttachmentId) -> Result<&mut Attachment> {
        self.attachments
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(Error::UnknownAttachment(id))
    }
}

impl Default for SegmentClient {
    fn default() -> Self {
        Self::new()
    }
}

// Remaining attachments tear down through their guards when the client is
// dropped: each mapping unmaps, each descriptor closes, no names are
// unlinked.
