//! Checked access to pointers received from plugins.

use super::error::SuiteError;
use std::ffi::{CStr, c_char};

/// Borrow a NUL-terminated string argument.
///
/// # Safety
///
/// A non-null `ptr` must point to a NUL-terminated string that outlives
/// the call.
pub(crate) unsafe fn c_str<'a>(ptr: *const c_char) -> Result<&'a CStr, SuiteError> {
    if ptr.is_null() {
        return Err(SuiteError::BadParameter("null string"));
    }
    // SAFETY: non-null, NUL-terminated per the caller.
    Ok(unsafe { CStr::from_ptr(ptr) })
}

/// Write an out-parameter.
///
/// # Safety
///
/// A non-null `ptr` must be valid for writes of `T`.
pub(crate) unsafe fn write_out<T>(ptr: *mut T, value: T) -> Result<(), SuiteError> {
    if ptr.is_null() {
        return Err(SuiteError::BadParameter("null out-parameter"));
    }
    // SAFETY: non-null and writable per the caller.
    unsafe { ptr.write(value) };
    Ok(())
}

/// Copy `bytes` into a caller buffer of `capacity` bytes as a C string,
/// truncating so the terminator always fits.
///
/// # Safety
///
/// A non-null `dst` must be valid for `capacity` bytes of writes.
pub(crate) unsafe fn write_c_string(
    dst: *mut c_char,
    capacity: usize,
    bytes: &[u8],
) -> Result<(), SuiteError> {
    if dst.is_null() || capacity == 0 {
        return Err(SuiteError::BadParameter("null or empty string buffer"));
    }
    let len = bytes.len().min(capacity - 1);
    // SAFETY: `len + 1 <= capacity` bytes, writable per the caller.
    unsafe {
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), dst.cast::<u8>(), len);
        dst.add(len).write(0);
    }
    Ok(())
}

/// Borrow `len` bytes.
///
/// # Safety
///
/// A non-null `ptr` must be valid for `len` bytes of reads.
pub(crate) unsafe fn bytes<'a>(ptr: *const u8, len: usize) -> Result<&'a [u8], SuiteError> {
    if len == 0 {
        return Ok(&[]);
    }
    if ptr.is_null() {
        return Err(SuiteError::BadParameter("null data"));
    }
    // SAFETY: non-null and readable for `len` bytes per the caller.
    Ok(unsafe { std::slice::from_raw_parts(ptr, len) })
}

/// Convert a native boolean.
pub(crate) fn from_bool(value: u8) -> bool {
    value != 0
}

/// Convert to a native boolean.
pub(crate) fn to_bool(value: bool) -> u8 {
    u8::from(value)
}
