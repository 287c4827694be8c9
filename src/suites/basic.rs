//! `SPBasicSuite`: suite acquisition and raw blocks.

use super::ffi::{c_str, to_bool, write_out};
use super::session::guard;
use super::error::SuiteError;
use std::ffi::{c_char, c_void};

/// `SPBasicSuite`.
#[repr(C)]
pub struct SPBasicSuite {
    /// `AcquireSuite(name, version, &suite)`.
    pub acquire_suite:
        unsafe extern "C" fn(name: *const c_char, version: i32, suite: *mut *const c_void) -> i32,
    /// `ReleaseSuite(name, version)`.
    pub release_suite: unsafe extern "C" fn(name: *const c_char, version: i32) -> i32,
    /// `IsEqual(token1, token2)`.
    pub is_equal: unsafe extern "C" fn(token1: *const c_char, token2: *const c_char) -> u8,
    /// `AllocateBlock(size, &block)`.
    pub allocate_block: unsafe extern "C" fn(size: usize, block: *mut *mut c_void) -> i32,
    /// `FreeBlock(block)`.
    pub free_block: unsafe extern "C" fn(block: *mut c_void) -> i32,
    /// `ReallocateBlock(block, newSize, &newBlock)`.
    pub reallocate_block:
        unsafe extern "C" fn(block: *mut c_void, size: usize, new_block: *mut *mut c_void) -> i32,
    /// `Undefined()`.
    pub undefined: unsafe extern "C" fn() -> i32,
}

/// The basic suite table.
pub static BASIC_SUITE: SPBasicSuite = SPBasicSuite {
    acquire_suite,
    release_suite,
    is_equal,
    allocate_block,
    free_block,
    reallocate_block,
    undefined,
};

unsafe extern "C" fn acquire_suite(
    name: *const c_char,
    version: i32,
    suite: *mut *const c_void,
) -> i32 {
    guard("AcquireSuite", |session| {
        // SAFETY: plugin-supplied string argument.
        let name = unsafe { c_str(name) }?;
        let name = name.to_str().map_err(|_| SuiteError::NotFound(name.to_string_lossy().into_owned()));
        let table = match name {
            Ok(name) => session.acquire(name, version),
            Err(e) => Err(e),
        };
        match table {
            Ok(table) => {
                // SAFETY: plugin-supplied out-parameter.
                unsafe { write_out(suite, table) }
            }
            Err(e) => {
                if !suite.is_null() {
                    // SAFETY: non-null plugin out-parameter.
                    unsafe { suite.write(std::ptr::null()) };
                }
                tracing::debug!("AcquireSuite: {}", e);
                Err(e)
            }
        }
    })
}

unsafe extern "C" fn release_suite(name: *const c_char, version: i32) -> i32 {
    guard("ReleaseSuite", |session| {
        // SAFETY: plugin-supplied string argument.
        let name = unsafe { c_str(name) }?;
        let name = name
            .to_str()
            .map_err(|_| SuiteError::BadParameter("suite name is not UTF-8"))?;
        session.release(name, version)
    })
}

unsafe extern "C" fn is_equal(token1: *const c_char, token2: *const c_char) -> u8 {
    if token1 == token2 {
        return to_bool(true);
    }
    // SAFETY: plugin-supplied strings.
    match unsafe { (c_str(token1), c_str(token2)) } {
        (Ok(a), Ok(b)) => to_bool(a == b),
        _ => to_bool(false),
    }
}

unsafe extern "C" fn allocate_block(size: usize, block: *mut *mut c_void) -> i32 {
    guard("AllocateBlock", |session| {
        let ptr = session.blocks.allocate(size).ok_or(SuiteError::OutOfMemory)?;
        // SAFETY: plugin-supplied out-parameter.
        unsafe { write_out(block, ptr.as_ptr().cast()) }
    })
}

unsafe extern "C" fn free_block(block: *mut c_void) -> i32 {
    guard("FreeBlock", |session| {
        if block.is_null() || session.blocks.free(block.cast()) {
            Ok(())
        } else {
            Err(SuiteError::BadParameter("unknown block"))
        }
    })
}

unsafe extern "C" fn reallocate_block(
    block: *mut c_void,
    size: usize,
    new_block: *mut *mut c_void,
) -> i32 {
    guard("ReallocateBlock", |session| {
        let ptr = if block.is_null() {
            session.blocks.allocate(size).ok_or(SuiteError::OutOfMemory)?
        } else {
            session.blocks.reallocate(block.cast(), size)?
        };
        // SAFETY: plugin-supplied out-parameter.
        unsafe { write_out(new_block, ptr.as_ptr().cast()) }
    })
}

unsafe extern "C" fn undefined() -> i32 {
    SuiteError::Unimplemented.code()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suites::error::codes;
    use crate::suites::registry::{BUFFER_SUITE_NAME, SuiteId};
    use crate::suites::{SuiteConfig, SuiteSession};
    use std::ffi::CString;

    #[test]
    fn test_acquire_and_release() {
        let _active = SuiteSession::new(&SuiteConfig::default()).activate().unwrap();
        let name = CString::new(BUFFER_SUITE_NAME).unwrap();
        let mut table = std::ptr::null();
        unsafe {
            assert_eq!((BASIC_SUITE.acquire_suite)(name.as_ptr(), 1, &mut table), codes::NO_ERROR);
            assert_eq!(table, SuiteId::Buffer.table());
            assert_eq!((BASIC_SUITE.release_suite)(name.as_ptr(), 1), codes::NO_ERROR);

            assert_eq!(
                (BASIC_SUITE.acquire_suite)(name.as_ptr(), 9, &mut table),
                codes::SUITE_NOT_FOUND
            );
            assert!(table.is_null());
            assert_eq!(
                (BASIC_SUITE.acquire_suite)(c"No Such Suite".as_ptr(), 1, &mut table),
                codes::SUITE_NOT_FOUND
            );
        }
    }

    #[test]
    fn test_blocks() {
        let _active = SuiteSession::new(&SuiteConfig::default()).activate().unwrap();
        unsafe {
            let mut block = std::ptr::null_mut();
            assert_eq!((BASIC_SUITE.allocate_block)(16, &mut block), codes::NO_ERROR);
            block.cast::<u8>().write_bytes(0xAB, 16);
            let mut grown = std::ptr::null_mut();
            assert_eq!((BASIC_SUITE.reallocate_block)(block, 64, &mut grown), codes::NO_ERROR);
            assert_eq!(*grown.cast::<u8>().add(15), 0xAB);
            assert_eq!((BASIC_SUITE.free_block)(grown), codes::NO_ERROR);
            assert_eq!((BASIC_SUITE.free_block)(grown), codes::BAD_PARAMETER);
        }
    }

    #[test]
    fn test_is_equal_and_no_session() {
        unsafe {
            assert_eq!((BASIC_SUITE.is_equal)(c"a".as_ptr(), c"a".as_ptr()), 1);
            assert_eq!((BASIC_SUITE.is_equal)(c"a".as_ptr(), c"b".as_ptr()), 0);
            let mut block = std::ptr::null_mut();
            assert_eq!((BASIC_SUITE.allocate_block)(16, &mut block), codes::BAD_PARAMETER);
            assert_eq!((BASIC_SUITE.undefined)(), codes::UNIMPLEMENTED);
        }
    }
}
