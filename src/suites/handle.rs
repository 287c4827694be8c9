//! Handles: `PSHandleSuite1`/`PSHandleSuite2` and legacy `HandleProcs`.
//!
//! A handle is the address of a [`PsHandle`] header whose first field is
//! the data pointer, so plugins that dereference a handle directly find
//! their bytes. Data never moves while the handle is locked; locking only
//! decides whether an address is handed out.

use super::error::SuiteError;
use super::ffi::{from_bool, to_bool, write_out};
use super::session::{guard_os, guard_value};
use std::collections::HashMap;

/// Header a handle points to.
#[repr(C)]
#[derive(Debug)]
pub struct PsHandle {
    /// The data, valid for `size` bytes.
    pub pointer: *mut u8,
    /// Data size.
    pub size: i32,
}

/// Native handle value.
pub type Handle = *mut PsHandle;

struct HandleEntry {
    header: Box<PsHandle>,
    data: Box<[u8]>,
    locked: bool,
}

/// Handles issued in one session.
#[derive(Default)]
pub(crate) struct HandleTable {
    entries: HashMap<usize, HandleEntry>,
}

impl HandleTable {
    /// A new zeroed handle of `size` bytes.
    pub(crate) fn allocate(&mut self, size: i32) -> Result<Handle, SuiteError> {
        let len = usize::try_from(size).map_err(|_| SuiteError::BadParameter("negative size"))?;
        let data = zeroed(len)?;
        Ok(self.insert(data))
    }

    /// A new handle holding a copy of `bytes`.
    pub(crate) fn from_bytes(&mut self, bytes: &[u8]) -> Result<Handle, SuiteError> {
        i32::try_from(bytes.len()).map_err(|_| SuiteError::OutOfMemory)?;
        let mut data = zeroed(bytes.len())?;
        data.copy_from_slice(bytes);
        Ok(self.insert(data))
    }

    fn insert(&mut self, mut data: Box<[u8]>) -> Handle {
        let mut header = Box::new(PsHandle {
            pointer: data.as_mut_ptr(),
            size: data.len() as i32,
        });
        let handle: Handle = &mut *header;
        self.entries.insert(
            handle as usize,
            HandleEntry {
                header,
                data,
                locked: false,
            },
        );
        handle
    }

    /// Whether `handle` was issued here and is live.
    pub(crate) fn contains(&self, handle: Handle) -> bool {
        self.entries.contains_key(&(handle as usize))
    }

    /// Free a handle. Returns `false` if it was not issued here.
    pub(crate) fn dispose(&mut self, handle: Handle) -> bool {
        self.entries.remove(&(handle as usize)).is_some()
    }

    fn entry(&self, handle: Handle) -> Result<&HandleEntry, SuiteError> {
        self.entries
            .get(&(handle as usize))
            .ok_or(SuiteError::InvalidHandle)
    }

    fn entry_mut(&mut self, handle: Handle) -> Result<&mut HandleEntry, SuiteError> {
        self.entries
            .get_mut(&(handle as usize))
            .ok_or(SuiteError::InvalidHandle)
    }

    pub(crate) fn size(&self, handle: Handle) -> Result<i32, SuiteError> {
        Ok(self.entry(handle)?.header.size)
    }

    /// Contents of a handle.
    pub(crate) fn bytes(&self, handle: Handle) -> Result<&[u8], SuiteError> {
        Ok(&self.entry(handle)?.data)
    }

    /// Resize, keeping the common prefix of the contents.
    pub(crate) fn resize(&mut self, handle: Handle, size: i32) -> Result<(), SuiteError> {
        let len = usize::try_from(size).map_err(|_| SuiteError::BadParameter("negative size"))?;
        let entry = self.entry_mut(handle)?;
        let mut data = zeroed(len)?;
        let keep = len.min(entry.data.len());
        data[..keep].copy_from_slice(&entry.data[..keep]);
        entry.data = data;
        entry.header.pointer = entry.data.as_mut_ptr();
        entry.header.size = size;
        Ok(())
    }

    /// Set the lock state; returns the previous state and the address to
    /// hand out (null when unlocking).
    pub(crate) fn set_lock(&mut self, handle: Handle, lock: bool) -> Result<(bool, *mut u8), SuiteError> {
        let entry = self.entry_mut(handle)?;
        let previous = entry.locked;
        entry.locked = lock;
        let address = if lock {
            entry.header.pointer
        } else {
            std::ptr::null_mut()
        };
        Ok((previous, address))
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

fn zeroed(len: usize) -> Result<Box<[u8]>, SuiteError> {
    let mut data = Vec::new();
    data.try_reserve_exact(len).map_err(|_| SuiteError::OutOfMemory)?;
    data.resize(len, 0);
    Ok(data.into_boxed_slice())
}

/// `PSHandleSuite1`.
#[repr(C)]
pub struct PSHandleSuite1 {
    /// `New(size)`.
    pub new: unsafe extern "C" fn(size: i32) -> Handle,
    /// `Dispose(h)`.
    pub dispose: unsafe extern "C" fn(handle: Handle),
    /// `SetLock(h, lock, &address, &oldLock)`.
    pub set_lock:
        unsafe extern "C" fn(handle: Handle, lock: u8, address: *mut *mut u8, old_lock: *mut u8),
    /// `GetSize(h)`.
    pub get_size: unsafe extern "C" fn(handle: Handle) -> i32,
    /// `SetSize(h, newSize)`.
    pub set_size: unsafe extern "C" fn(handle: Handle, size: i32) -> i16,
    /// `RecoverSpace(size)`.
    pub recover_space: unsafe extern "C" fn(size: i32),
}

/// `PSHandleSuite2`: version 1 plus `DisposeRegularHandle`.
#[repr(C)]
pub struct PSHandleSuite2 {
    /// `New(size)`.
    pub new: unsafe extern "C" fn(size: i32) -> Handle,
    /// `Dispose(h)`.
    pub dispose: unsafe extern "C" fn(handle: Handle),
    /// `DisposeRegularHandle(h)`.
    pub dispose_regular_handle: unsafe extern "C" fn(handle: Handle),
    /// `SetLock(h, lock, &address, &oldLock)`.
    pub set_lock:
        unsafe extern "C" fn(handle: Handle, lock: u8, address: *mut *mut u8, old_lock: *mut u8),
    /// `GetSize(h)`.
    pub get_size: unsafe extern "C" fn(handle: Handle) -> i32,
    /// `SetSize(h, newSize)`.
    pub set_size: unsafe extern "C" fn(handle: Handle, size: i32) -> i16,
    /// `RecoverSpace(size)`.
    pub recover_space: unsafe extern "C" fn(size: i32),
}

/// The version 1 handle suite table.
pub static HANDLE_SUITE_1: PSHandleSuite1 = PSHandleSuite1 {
    new: handle_new,
    dispose: handle_dispose,
    set_lock: handle_set_lock,
    get_size: handle_get_size,
    set_size: handle_set_size,
    recover_space: handle_recover_space,
};

/// The version 2 handle suite table.
pub static HANDLE_SUITE_2: PSHandleSuite2 = PSHandleSuite2 {
    new: handle_new,
    dispose: handle_dispose,
    dispose_regular_handle: handle_dispose_regular,
    set_lock: handle_set_lock,
    get_size: handle_get_size,
    set_size: handle_set_size,
    recover_space: handle_recover_space,
};

/// A handle suite table of a validated version.
#[derive(Clone, Copy)]
pub enum HandleSuite {
    /// Version 1.
    V1(&'static PSHandleSuite1),
    /// Version 2.
    V2(&'static PSHandleSuite2),
}

impl HandleSuite {
    /// The table for `version`.
    pub fn for_version(version: i32) -> Result<Self, SuiteError> {
        match version {
            1 => Ok(Self::V1(&HANDLE_SUITE_1)),
            2 => Ok(Self::V2(&HANDLE_SUITE_2)),
            _ => Err(SuiteError::UnsupportedVersion {
                name: super::registry::HANDLE_SUITE_NAME.to_string(),
                version,
            }),
        }
    }
}

/// `HandleProcs` version.
pub const HANDLE_PROCS_VERSION: i16 = 1;
/// Number of procs in [`HandleProcs`].
pub const HANDLE_PROCS_COUNT: i16 = 8;

/// Legacy `HandleProcs` record placed in the filter parameter block.
#[repr(C)]
pub struct HandleProcs {
    /// `handleProcsVersion`.
    pub version: i16,
    /// `numHandleProcs`.
    pub count: i16,
    /// `newProc(size)`.
    pub new: unsafe extern "C" fn(size: i32) -> Handle,
    /// `disposeProc(h)`.
    pub dispose: unsafe extern "C" fn(handle: Handle),
    /// `getSizeProc(h)`.
    pub get_size: unsafe extern "C" fn(handle: Handle) -> i32,
    /// `setSizeProc(h, newSize)`.
    pub set_size: unsafe extern "C" fn(handle: Handle, size: i32) -> i16,
    /// `lockProc(h, moveHigh)`.
    pub lock: unsafe extern "C" fn(handle: Handle, move_high: u8) -> *mut u8,
    /// `unlockProc(h)`.
    pub unlock: unsafe extern "C" fn(handle: Handle),
    /// `recoverSpaceProc(size)`.
    pub recover_space: unsafe extern "C" fn(size: i32),
    /// `disposeRegularHandleProc(h)`.
    pub dispose_regular: unsafe extern "C" fn(handle: Handle),
}

/// The legacy handle procs, backed by the same handle table.
pub static HANDLE_PROCS: HandleProcs = HandleProcs {
    version: HANDLE_PROCS_VERSION,
    count: HANDLE_PROCS_COUNT,
    new: handle_new,
    dispose: handle_dispose,
    get_size: handle_get_size,
    set_size: handle_set_size,
    lock: procs_lock,
    unlock: procs_unlock,
    recover_space: handle_recover_space,
    dispose_regular: handle_dispose_regular,
};

unsafe extern "C" fn handle_new(size: i32) -> Handle {
    guard_value("Handle.New", std::ptr::null_mut(), |session| {
        session.handles.allocate(size)
    })
}

unsafe extern "C" fn handle_dispose(handle: Handle) {
    guard_value("Handle.Dispose", (), |session| {
        if !handle.is_null() && !session.handles.dispose(handle) {
            tracing::warn!("Dispose of a handle this host did not issue: {:p}", handle);
        }
        Ok(())
    })
}

unsafe extern "C" fn handle_dispose_regular(handle: Handle) {
    guard_value("Handle.DisposeRegularHandle", (), |session| {
        if !handle.is_null() && !session.handles.dispose(handle) {
            // Handles from the system allocator are not ours to free.
            tracing::debug!("ignoring DisposeRegularHandle of foreign handle {:p}", handle);
        }
        Ok(())
    })
}

unsafe extern "C" fn handle_set_lock(handle: Handle, lock: u8, address: *mut *mut u8, old_lock: *mut u8) {
    guard_value("Handle.SetLock", (), |session| {
        let (previous, ptr) = session.handles.set_lock(handle, from_bool(lock))?;
        // SAFETY: plugin-supplied out-parameters.
        unsafe {
            write_out(old_lock, to_bool(previous))?;
            write_out(address, ptr)
        }
    })
}

unsafe extern "C" fn handle_get_size(handle: Handle) -> i32 {
    guard_value("Handle.GetSize", 0, |session| session.handles.size(handle))
}

unsafe extern "C" fn handle_set_size(handle: Handle, size: i32) -> i16 {
    guard_os("Handle.SetSize", |session| session.handles.resize(handle, size))
}

unsafe extern "C" fn handle_recover_space(_size: i32) {}

unsafe extern "C" fn procs_lock(handle: Handle, _move_high: u8) -> *mut u8 {
    guard_value("HandleProcs.lock", std::ptr::null_mut(), |session| {
        session.handles.set_lock(handle, true).map(|(_, ptr)| ptr)
    })
}

unsafe extern "C" fn procs_unlock(handle: Handle) {
    guard_value("HandleProcs.unlock", (), |session| {
        session.handles.set_lock(handle, false).map(|_| ())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suites::{SuiteConfig, SuiteSession};

    #[test]
    fn test_table_resize_keeps_prefix() {
        let mut table = HandleTable::default();
        let h = table.from_bytes(b"abcdef").unwrap();
        table.resize(h, 3).unwrap();
        assert_eq!(table.bytes(h).unwrap(), b"abc");
        table.resize(h, 5).unwrap();
        assert_eq!(table.bytes(h).unwrap(), b"abc\0\0");
        // The header tracks the data.
        let header = unsafe { &*h };
        assert_eq!(header.size, 5);
        assert_eq!(unsafe { *header.pointer }, b'a');
        assert!(table.allocate(-1).is_err());
        assert!(table.dispose(h));
        assert!(!table.contains(h));
    }

    #[test]
    fn test_lock_unlock_restores_state() {
        let _active = SuiteSession::new(&SuiteConfig::default()).activate().unwrap();
        let suite = &HANDLE_SUITE_2;
        unsafe {
            let h = (suite.new)(32);
            assert!(!h.is_null());
            assert_eq!((suite.get_size)(h), 32);

            let mut address = std::ptr::null_mut();
            let mut old = 0xFFu8;
            (suite.set_lock)(h, 1, &mut address, &mut old);
            assert_eq!(old, 0);
            assert_eq!(address, (*h).pointer);

            let mut old_again = 0xFFu8;
            (suite.set_lock)(h, 0, &mut address, &mut old_again);
            assert_eq!(old_again, 1);
            assert!(address.is_null());

            (suite.set_lock)(h, 0, &mut address, &mut old_again);
            assert_eq!(old_again, 0);
            (suite.dispose)(h);
        }
    }

    #[test]
    fn test_unknown_handles() {
        let _active = SuiteSession::new(&SuiteConfig::default()).activate().unwrap();
        let mut foreign = PsHandle {
            pointer: std::ptr::null_mut(),
            size: 0,
        };
        unsafe {
            assert_eq!((HANDLE_SUITE_1.get_size)(&mut foreign), 0);
            assert_eq!((HANDLE_SUITE_1.set_size)(&mut foreign, 4), -109);
            (HANDLE_SUITE_2.dispose_regular_handle)(&mut foreign);
        }
    }

    #[test]
    fn test_legacy_procs() {
        let _active = SuiteSession::new(&SuiteConfig::default()).activate().unwrap();
        assert_eq!(HANDLE_PROCS.count, 8);
        unsafe {
            let h = (HANDLE_PROCS.new)(4);
            let ptr = (HANDLE_PROCS.lock)(h, 0);
            ptr.write(9);
            (HANDLE_PROCS.unlock)(h);
            assert_eq!((HANDLE_PROCS.set_size)(h, 8), 0);
            assert_eq!(*(*h).pointer, 9);
            (HANDLE_PROCS.dispose)(h);
        }
    }

    #[test]
    fn test_version_validation() {
        assert!(matches!(HandleSuite::for_version(2), Ok(HandleSuite::V2(_))));
        assert!(matches!(
            HandleSuite::for_version(3),
            Err(SuiteError::UnsupportedVersion { version: 3, .. })
        ));
    }
}
