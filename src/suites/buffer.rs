//! `PSBufferSuite1` and the legacy `BufferProcs` callbacks.
//!
//! `New` degrades gracefully under memory pressure: it halves the request
//! until an allocation succeeds, never going below the caller's minimum.

use super::error::SuiteError;
use super::ffi::write_out;
use super::session::{SuiteSession, guard_os, guard_value};
use std::ffi::c_void;

/// `PSBufferSuite1`.
#[repr(C)]
pub struct PSBufferSuite1 {
    /// `New(&requestedSize, minimumSize)`; writes the granted size back.
    pub new: unsafe extern "C" fn(requested: *mut u32, minimum: u32) -> *mut u8,
    /// `Dispose(&buffer)`; nulls the caller's pointer.
    pub dispose: unsafe extern "C" fn(buffer: *mut *mut u8),
    /// `GetSize(buffer)`.
    pub get_size: unsafe extern "C" fn(buffer: *mut u8) -> u32,
    /// `GetSpace()`.
    pub get_space: unsafe extern "C" fn() -> u32,
}

/// The buffer suite table.
pub static BUFFER_SUITE: PSBufferSuite1 = PSBufferSuite1 {
    new: buffer_new,
    dispose: buffer_dispose,
    get_size: buffer_get_size,
    get_space: buffer_get_space,
};

/// `BufferProcs` version.
pub const BUFFER_PROCS_VERSION: i16 = 2;
/// Number of procs in [`BufferProcs`].
pub const BUFFER_PROCS_COUNT: i16 = 5;

/// Legacy `BufferProcs` record placed in the filter parameter block.
#[repr(C)]
pub struct BufferProcs {
    /// `bufferProcsVersion`.
    pub version: i16,
    /// `numBufferProcs`.
    pub count: i16,
    /// `allocateProc(size, &bufferID)`.
    pub allocate: unsafe extern "C" fn(size: i32, buffer_id: *mut *mut c_void) -> i16,
    /// `lockProc(bufferID, moveHigh)`.
    pub lock: unsafe extern "C" fn(buffer_id: *mut c_void, move_high: u8) -> *mut u8,
    /// `unlockProc(bufferID)`.
    pub unlock: unsafe extern "C" fn(buffer_id: *mut c_void),
    /// `freeProc(bufferID)`.
    pub free: unsafe extern "C" fn(buffer_id: *mut c_void),
    /// `spaceProc()`.
    pub space: unsafe extern "C" fn() -> i32,
}

/// The legacy buffer procs, backed by the same buffer table.
pub static BUFFER_PROCS: BufferProcs = BufferProcs {
    version: BUFFER_PROCS_VERSION,
    count: BUFFER_PROCS_COUNT,
    allocate: procs_allocate,
    lock: procs_lock,
    unlock: procs_unlock,
    free: procs_free,
    space: procs_space,
};

/// Allocate between `minimum` and `requested` bytes, halving on failure.
///
/// Returns the block and its size.
pub(crate) fn allocate_degrading(
    session: &mut SuiteSession,
    requested: u32,
    minimum: u32,
) -> Option<(*mut u8, u32)> {
    let floor = minimum.min(requested);
    let mut size = requested;
    loop {
        if let Some(ptr) = session.buffers.allocate(size as usize) {
            return Some((ptr.as_ptr(), size));
        }
        if size <= floor {
            tracing::debug!("buffer of {} bytes (minimum {}) unavailable", requested, minimum);
            return None;
        }
        size = (size / 2).max(floor);
    }
}

unsafe extern "C" fn buffer_new(requested: *mut u32, minimum: u32) -> *mut u8 {
    guard_value("Buffer.New", std::ptr::null_mut(), |session| {
        if requested.is_null() {
            return Err(SuiteError::BadParameter("null size"));
        }
        // SAFETY: non-null plugin in/out parameter.
        let wanted = unsafe { requested.read() };
        let (ptr, size) =
            allocate_degrading(session, wanted, minimum).ok_or(SuiteError::OutOfMemory)?;
        // SAFETY: as above.
        unsafe { requested.write(size) };
        Ok(ptr)
    })
}

unsafe extern "C" fn buffer_dispose(buffer: *mut *mut u8) {
    guard_value("Buffer.Dispose", (), |session| {
        if buffer.is_null() {
            return Err(SuiteError::BadParameter("null buffer pointer"));
        }
        // SAFETY: non-null plugin in/out parameter.
        let ptr = unsafe { buffer.read() };
        if !ptr.is_null() && !session.buffers.free(ptr) {
            return Err(SuiteError::BadParameter("unknown buffer"));
        }
        // SAFETY: as above.
        unsafe { buffer.write(std::ptr::null_mut()) };
        Ok(())
    })
}

unsafe extern "C" fn buffer_get_size(buffer: *mut u8) -> u32 {
    guard_value("Buffer.GetSize", 0, |session| {
        let size = session
            .buffers
            .size_of(buffer)
            .ok_or(SuiteError::BadParameter("unknown buffer"))?;
        Ok(u32::try_from(size).unwrap_or(u32::MAX))
    })
}

unsafe extern "C" fn buffer_get_space() -> u32 {
    guard_value("Buffer.GetSpace", 0, |session| {
        Ok(u32::try_from(session.buffers.available()).unwrap_or(u32::MAX))
    })
}

unsafe extern "C" fn procs_allocate(size: i32, buffer_id: *mut *mut c_void) -> i16 {
    guard_os("BufferProcs.allocate", |session| {
        let size = usize::try_from(size).map_err(|_| SuiteError::BadParameter("negative size"))?;
        let ptr = session.buffers.allocate(size).ok_or(SuiteError::OutOfMemory)?;
        // SAFETY: plugin-supplied out-parameter.
        unsafe { write_out(buffer_id, ptr.as_ptr().cast()) }
    })
}

unsafe extern "C" fn procs_lock(buffer_id: *mut c_void, _move_high: u8) -> *mut u8 {
    guard_value("BufferProcs.lock", std::ptr::null_mut(), |session| {
        session
            .buffers
            .size_of(buffer_id.cast())
            .map(|_| buffer_id.cast())
            .ok_or(SuiteError::BadParameter("unknown buffer"))
    })
}

unsafe extern "C" fn procs_unlock(_buffer_id: *mut c_void) {}

unsafe extern "C" fn procs_free(buffer_id: *mut c_void) {
    guard_value("BufferProcs.free", (), |session| {
        if session.buffers.free(buffer_id.cast()) {
            Ok(())
        } else {
            Err(SuiteError::BadParameter("unknown buffer"))
        }
    })
}

unsafe extern "C" fn procs_space() -> i32 {
    guard_value("BufferProcs.space", 0, |session| {
        Ok(i32::try_from(session.buffers.available()).unwrap_or(i32::MAX))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suites::SuiteConfig;

    fn limited(limit: usize) -> crate::suites::ActiveSession {
        SuiteSession::new(&SuiteConfig::default().with_buffer_limit(limit))
            .activate()
            .unwrap()
    }

    #[test]
    fn test_new_halves_under_pressure() {
        let _active = limited(1000);
        let mut size = 4096u32;
        let ptr = unsafe { (BUFFER_SUITE.new)(&mut size, 100) };
        assert!(!ptr.is_null());
        assert_eq!(size, 512);
        assert_eq!(unsafe { (BUFFER_SUITE.get_size)(ptr) }, 512);
        assert_eq!(unsafe { (BUFFER_SUITE.get_space)() }, 488);

        let mut held = ptr;
        unsafe { (BUFFER_SUITE.dispose)(&mut held) };
        assert!(held.is_null());
        assert_eq!(unsafe { (BUFFER_SUITE.get_space)() }, 1000);
    }

    #[test]
    fn test_new_fails_below_minimum() {
        let _active = limited(1000);
        let mut size = 4096u32;
        let ptr = unsafe { (BUFFER_SUITE.new)(&mut size, 2000) };
        assert!(ptr.is_null());
        assert_eq!(size, 4096);
    }

    #[test]
    fn test_legacy_procs_share_the_table() {
        let _active = limited(64);
        let mut id = std::ptr::null_mut();
        assert_eq!(unsafe { (BUFFER_PROCS.allocate)(48, &mut id) }, 0);
        assert_eq!(unsafe { (BUFFER_PROCS.space)() }, 16);
        let ptr = unsafe { (BUFFER_PROCS.lock)(id, 0) };
        assert_eq!(ptr, id.cast());
        assert_eq!(unsafe { (BUFFER_SUITE.get_size)(ptr) }, 48);
        unsafe { (BUFFER_PROCS.free)(id) };
        assert_eq!(unsafe { (BUFFER_PROCS.space)() }, 64);
    }
}
