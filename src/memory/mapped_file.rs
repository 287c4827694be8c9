//! Memory-mapped file shared between processes.
//!
//! # Example
//!
//! ```rust,ignore
//! use filterbridge::memory::MappedFile;
//!
//! // Producer
//! let mut mapping = MappedFile::create("/run/user/1000/fb/source-1", 4096)?;
//! mapping.as_mut_slice()[..5].copy_from_slice(b"hello");
//!
//! // Consumer, in another process
//! let mapping = MappedFile::open("/run/user/1000/fb/source-1")?;
//! assert_eq!(&mapping.as_slice()[..5], b"hello");
//! ```

use crate::error::{Error, Result};
use rustix::fd::OwnedFd;
use rustix::fs::{Mode, OFlags};
use rustix::mm::{MapFlags, ProtFlags};
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::sync::atomic::AtomicU32;

/// A file mapped read-write and shared with other processes.
pub struct MappedFile {
    /// Kept open for the lifetime of the mapping.
    _fd: OwnedFd,
    /// Pointer to the mmap'd region.
    ptr: NonNull<u8>,
    /// Size of the mapping.
    len: usize,
    /// Path to the file.
    path: PathBuf,
    /// Remove the file when dropped (set for the creating side).
    unlink_on_drop: bool,
}

impl MappedFile {
    /// Create a new file of `size` bytes and map it.
    ///
    /// Fails if the file already exists. The file is readable by the owner
    /// only and is removed when the mapping is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if file creation, truncation, or mapping fails.
    pub fn create<P: AsRef<Path>>(path: P, size: usize) -> Result<Self> {
        let path = path.as_ref();

        if size == 0 {
            return Err(Error::MappingFailed("size must be greater than 0".into()));
        }

        let fd = rustix::fs::open(
            path,
            OFlags::RDWR | OFlags::CREATE | OFlags::EXCL | OFlags::CLOEXEC,
            Mode::from_raw_mode(0o600),
        )?;

        let mapped = Self::map(fd, size, path, true);
        if mapped.is_err() {
            let _ = rustix::fs::unlink(path);
        }
        mapped
    }

    /// Map an existing file, read-write.
    ///
    /// # Errors
    ///
    /// Returns an error if the file doesn't exist, is empty, or mapping fails.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let fd = rustix::fs::open(path, OFlags::RDWR | OFlags::CLOEXEC, Mode::empty())?;

        let stat = rustix::fs::fstat(&fd)?;
        let size = usize::try_from(stat.st_size)
            .map_err(|_| Error::MappingFailed(format!("{}: invalid size", path.display())))?;
        if size == 0 {
            return Err(Error::MappingFailed(format!("{}: file is empty", path.display())));
        }

        Self::map_existing(fd, size, path)
    }

    fn map(fd: OwnedFd, size: usize, path: &Path, unlink_on_drop: bool) -> Result<Self> {
        rustix::fs::ftruncate(&fd, size as u64)?;
        let mut mapped = Self::map_existing(fd, size, path)?;
        mapped.unlink_on_drop = unlink_on_drop;
        Ok(mapped)
    }

    fn map_existing(fd: OwnedFd, size: usize, path: &Path) -> Result<Self> {
        // SAFETY: a fresh shared mapping of `size` bytes of an open file;
        // no existing memory is affected.
        let ptr = unsafe {
            rustix::mm::mmap(
                std::ptr::null_mut(),
                size,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                &fd,
                0,
            )?
        };

        let ptr = NonNull::new(ptr.cast::<u8>())
            .ok_or_else(|| Error::MappingFailed("mmap returned null".into()))?;

        Ok(Self {
            _fd: fd,
            ptr,
            len: size,
            path: path.to_path_buf(),
            unlink_on_drop: false,
        })
    }

    /// The mapped bytes.
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: the mapping is `len` bytes and lives as long as `self`.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// The mapped bytes, writable.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as for `as_slice`; `&mut self` excludes other borrows in
        // this process.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// A 32-bit word of the mapping that another process may write
    /// concurrently.
    ///
    /// Returns `None` unless `offset` is 4-aligned and in range.
    pub fn atomic_u32(&self, offset: usize) -> Option<&AtomicU32> {
        if offset % 4 != 0 || offset.checked_add(4)? > self.len {
            return None;
        }
        // SAFETY: in range and aligned (mappings are page aligned); only
        // accessed atomically through this reference.
        Some(unsafe { AtomicU32::from_ptr(self.ptr.as_ptr().add(offset).cast()) })
    }

    /// Size of the mapping in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the mapping is empty (never true for a live mapping).
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get the path to the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the file is removed on drop.
    pub fn unlinks_on_drop(&self) -> bool {
        self.unlink_on_drop
    }

    /// Choose whether the file is removed on drop.
    pub fn set_unlink_on_drop(&mut self, unlink: bool) {
        self.unlink_on_drop = unlink;
    }
}

impl Drop for MappedFile {
    fn drop(&mut self) {
        // SAFETY: unmapping the region created in `map_existing`; no slices
        // borrowed from it can outlive `self`.
        unsafe {
            let _ = rustix::mm::munmap(self.ptr.as_ptr().cast(), self.len);
        }
        if self.unlink_on_drop {
            if let Err(e) = rustix::fs::unlink(&self.path) {
                tracing::debug!("cannot remove {}: {}", self.path.display(), e);
            }
        }
        // fd is automatically closed when OwnedFd is dropped
    }
}

impl std::fmt::Debug for MappedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedFile")
            .field("path", &self.path)
            .field("len", &self.len)
            .field("unlink_on_drop", &self.unlink_on_drop)
            .finish()
    }
}

// SAFETY: the mapping is plain shared memory; mutation requires `&mut self`
// or goes through atomics.
unsafe impl Send for MappedFile {}
unsafe impl Sync for MappedFile {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_create_and_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("create-open");

        let mut producer = MappedFile::create(&path, 4096).unwrap();
        assert_eq!(producer.len(), 4096);
        producer.as_mut_slice()[..5].copy_from_slice(b"hello");

        let consumer = MappedFile::open(&path).unwrap();
        assert_eq!(&consumer.as_slice()[..5], b"hello");
        assert!(!consumer.unlinks_on_drop());

        drop(consumer);
        assert!(path.exists());
        drop(producer);
        assert!(!path.exists());
    }

    #[test]
    fn test_create_refuses_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taken");
        std::fs::write(&path, b"x").unwrap();
        assert!(MappedFile::create(&path, 16).is_err());
        assert!(path.exists());
    }

    #[test]
    fn test_zero_size_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(MappedFile::create(dir.path().join("zero"), 0).is_err());
        std::fs::write(dir.path().join("empty"), b"").unwrap();
        assert!(MappedFile::open(dir.path().join("empty")).is_err());
    }

    #[test]
    fn test_atomic_word_is_shared() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flag");
        let a = MappedFile::create(&path, 8).unwrap();
        let b = MappedFile::open(&path).unwrap();

        a.atomic_u32(4).unwrap().store(7, Ordering::SeqCst);
        assert_eq!(b.atomic_u32(4).unwrap().load(Ordering::SeqCst), 7);
        assert!(a.atomic_u32(2).is_none());
        assert!(a.atomic_u32(8).is_none());
    }
}
