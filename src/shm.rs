//! POSIX shared-memory plumbing.
//!
//! Thin RAII layer over the system calls used by [`Segment`] and
//! [`SegmentClient`]: named object lifecycle (`shm_open`/`shm_unlink`),
//! shared mappings, page pinning, and flush-and-invalidate. Each wrapper
//! releases its resource on drop and offers an explicit fallible teardown
//! for callers that need the error.
//!
//! [`Segment`]: crate::segment::Segment
//! [`SegmentClient`]: crate::client::SegmentClient

use crate::error::{Error, Result};
use rustix::fd::{AsFd, BorrowedFd, OwnedFd};
use rustix::fs::Mode;
use rustix::mm::{MapFlags, MsyncFlags, ProtFlags};
use rustix::shm::OFlags;
use std::fmt;
use std::ptr::NonNull;

/// Access granted to processes using a shared memory object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    /// No access.
    None,
    /// Read-only access.
    ReadOnly,
    /// Read-write access.
    ReadWrite,
}

impl AccessMode {
    /// Open flags used when attaching to an existing object.
    pub(crate) fn open_flags(self) -> OFlags {
        match self {
            AccessMode::None => OFlags::empty(),
            AccessMode::ReadOnly => OFlags::RDONLY,
            AccessMode::ReadWrite => OFlags::RDWR,
        }
    }

    /// Mapping protection for an attachment.
    pub(crate) fn prot_flags(self) -> ProtFlags {
        match self {
            AccessMode::None => ProtFlags::empty(),
            AccessMode::ReadOnly => ProtFlags::READ,
            AccessMode::ReadWrite => ProtFlags::READ | ProtFlags::WRITE,
        }
    }

    /// Permission bits stamped on a newly created object. The owner always
    /// gets full access; group and other get what `self` grants them.
    pub(crate) fn create_mode(self) -> Mode {
        match self {
            AccessMode::None => Mode::RWXU,
            AccessMode::ReadOnly => Mode::RWXU | Mode::RGRP | Mode::ROTH,
            AccessMode::ReadWrite => Mode::RWXU | Mode::RWXG | Mode::RWXO,
        }
    }

    /// Whether reads are permitted through a mapping with this access.
    pub fn is_readable(self) -> bool {
        !matches!(self, AccessMode::None)
    }

    /// Whether writes are permitted through a mapping with this access.
    pub fn is_writable(self) -> bool {
        matches!(self, AccessMode::ReadWrite)
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AccessMode::None => "none",
            AccessMode::ReadOnly => "read-only",
            AccessMode::ReadWrite => "read-write",
        };
        f.write_str(s)
    }
}

/// `shm_open` requires the name to begin with '/'; prepend one if missing.
pub(crate) fn normalize_name(name: &str) -> Result<String> {
    if name.is_empty() {
        return Err(Error::EmptyName);
    }
    if name.starts_with('/') {
        Ok(name.to_owned())
    } else {
        Ok(format!("/{name}"))
    }
}

/// A named POSIX shared memory object.
///
/// Creators unlink the name on teardown; attachments only close their
/// descriptor. Dropping releases the object best-effort; [`remove`]
/// surfaces the unlink error instead.
///
/// [`remove`]: ShmObject::remove
#[derive(Debug)]
pub(crate) struct ShmObject {
    fd: OwnedFd,
    name: String,
    unlink_on_drop: bool,
}

impl ShmObject {
    /// Create a new object with create + read-write + exclusive semantics.
    ///
    /// An existing object of the same name fails with
    /// [`Error::SegmentExists`].
    pub(crate) fn create(name: &str, access: AccessMode) -> Result<Self> {
        let fd = rustix::shm::open(
            name,
            OFlags::CREATE | OFlags::RDWR | OFlags::EXCL,
            access.create_mode(),
        )
        .map_err(|errno| {
            if errno == rustix::io::Errno::EXIST {
                Error::SegmentExists(name.to_owned())
            } else {
                Error::System(errno)
            }
        })?;

        Ok(Self {
            fd,
            name: name.to_owned(),
            unlink_on_drop: true,
        })
    }

    /// Open an existing object with access-appropriate flags.
    pub(crate) fn open(name: &str, access: AccessMode) -> Result<Self> {
        let fd = rustix::shm::open(name, access.open_flags(), Mode::empty())?;
        Ok(Self {
            fd,
            name: name.to_owned(),
            unlink_on_drop: false,
        })
    }

    /// Size the object to `len` bytes.
    pub(crate) fn resize(&self, len: usize) -> Result<()> {
        rustix::fs::ftruncate(&self.fd, len as u64)?;
        Ok(())
    }

    pub(crate) fn fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }

    /// Unlink the object's name and close the descriptor, surfacing the
    /// unlink error. Producer-side teardown.
    pub(crate) fn remove(mut self) -> Result<()> {
        self.unlink_on_drop = false;
        rustix::shm::unlink(&self.name)?;
        // The descriptor closes when `self` drops here.
        Ok(())
    }
}

impl Drop for ShmObject {
    fn drop(&mut self) {
        if self.unlink_on_drop {
            let _ = rustix::shm::unlink(&self.name);
        }
        // fd is closed when the OwnedFd is dropped.
    }
}

/// A shared mapping of a shm object.
#[derive(Debug)]
pub(crate) struct Mapping {
    ptr: NonNull<u8>,
    len: usize,
}

impl Mapping {
    /// Map `len` bytes of `fd` with protection `prot`, shared so writes
    /// are visible to other mappers of the same object.
    pub(crate) fn map(fd: BorrowedFd<'_>, len: usize, prot: ProtFlags) -> Result<Self> {
        if len == 0 {
            return Err(Error::ZeroSize);
        }

        let ptr = unsafe {
            rustix::mm::mmap(std::ptr::null_mut(), len, prot, MapFlags::SHARED, fd, 0)?
        };

        // mmap with a null hint never places a mapping at page zero.
        let ptr = NonNull::new(ptr.cast::<u8>()).ok_or(rustix::io::Errno::FAULT)?;

        Ok(Self { ptr, len })
    }

    pub(crate) fn ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Synchronously flush modified pages to the backing object and
    /// invalidate other processes' cached mappings of them.
    pub(crate) fn flush(&self) -> Result<()> {
        unsafe {
            rustix::mm::msync(
                self.ptr.as_ptr().cast(),
                self.len,
                MsyncFlags::SYNC | MsyncFlags::INVALIDATE,
            )?;
        }
        Ok(())
    }

    /// Unmap, surfacing the error. `Drop` does the same best-effort.
    pub(crate) fn unmap(self) -> Result<()> {
        let (ptr, len) = (self.ptr, self.len);
        std::mem::forget(self);
        unsafe {
            rustix::mm::munmap(ptr.as_ptr().cast(), len)?;
        }
        Ok(())
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        unsafe {
            let _ = rustix::mm::munmap(self.ptr.as_ptr().cast(), self.len);
        }
    }
}

// SAFETY: a shared mapping is process-global memory with no thread
// affinity; the kernel keeps it valid until munmap.
unsafe impl Send for Mapping {}
unsafe impl Sync for Mapping {}

/// Pins a mapping's pages in physical memory for the duration of a write.
///
/// The guard munlocks on drop so an error path never leaves pages pinned;
/// [`unlock`](PageLock::unlock) surfaces the munlock error on the success
/// path.
pub(crate) struct PageLock<'m> {
    map: &'m Mapping,
    armed: bool,
}

impl<'m> PageLock<'m> {
    pub(crate) fn lock(map: &'m Mapping) -> Result<Self> {
        unsafe {
            rustix::mm::mlock(map.ptr().as_ptr().cast(), map.len())?;
        }
        Ok(Self { map, armed: true })
    }

    pub(crate) fn unlock(mut self) -> Result<()> {
        self.armed = false;
        unsafe {
            rustix::mm::munlock(self.map.ptr().as_ptr().cast(), self.map.len())?;
        }
        Ok(())
    }
}

impl Drop for PageLock<'_> {
    fn drop(&mut self) {
        if self.armed {
            unsafe {
                let _ = rustix::mm::munlock(self.map.ptr().as_ptr().cast(), self.map.len());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_name(tag: &str) -> String {
        format!("/shmpool-shm-{}-{}", tag, std::process::id())
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("abc").unwrap(), "/abc");
        assert_eq!(normalize_name("/abc").unwrap(), "/abc");
        assert!(matches!(normalize_name(""), Err(Error::EmptyName)));
    }

    #[test]
    fn test_access_mode_mappings() {
        assert_eq!(AccessMode::ReadOnly.open_flags(), OFlags::RDONLY);
        assert_eq!(AccessMode::ReadWrite.open_flags(), OFlags::RDWR);
        assert_eq!(AccessMode::None.prot_flags(), ProtFlags::empty());
        assert!(AccessMode::ReadOnly.is_readable());
        assert!(!AccessMode::ReadOnly.is_writable());
        assert!(AccessMode::ReadWrite.is_writable());
        assert!(!AccessMode::None.is_readable());
    }

    #[test]
    fn test_create_is_exclusive() {
        let name = unique_name("exclusive");
        let first = ShmObject::create(&name, AccessMode::ReadWrite).unwrap();

        let err = ShmObject::create(&name, AccessMode::ReadWrite).unwrap_err();
        assert!(matches!(err, Error::SegmentExists(_)));

        first.remove().unwrap();
    }

    #[test]
    fn test_create_map_flush_roundtrip() {
        let name = unique_name("map");
        let shm = ShmObject::create(&name, AccessMode::ReadWrite).unwrap();
        shm.resize(4096).unwrap();

        let map = Mapping::map(shm.fd(), 4096, ProtFlags::READ | ProtFlags::WRITE).unwrap();
        unsafe {
            *map.ptr().as_ptr() = 42;
        }
        map.flush().unwrap();

        let lock = PageLock::lock(&map).unwrap();
        lock.unlock().unwrap();

        map.unmap().unwrap();
        shm.remove().unwrap();
    }

    #[test]
    fn test_map_zero_length_fails() {
        let name = unique_name("zero");
        let shm = ShmObject::create(&name, AccessMode::ReadWrite).unwrap();
        shm.resize(4096).unwrap();

        let err = Mapping::map(shm.fd(), 0, ProtFlags::READ).unwrap_err();
        assert!(matches!(err, Error::ZeroSize));

        shm.remove().unwrap();
    }

    #[test]
    fn test_open_missing_object_fails() {
        let err = ShmObject::open(&unique_name("missing"), AccessMode::ReadOnly).unwrap_err();
        assert!(matches!(err, Error::System(_)));
    }
}
