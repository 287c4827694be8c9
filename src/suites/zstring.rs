//! `ASZStringSuite`: reference-counted strings.
//!
//! Strings are created with a count of one; `AddRef`/`Release` adjust it
//! and the string is freed when it reaches zero. The empty string returned
//! by `GetEmpty` is shared and never freed.

use super::error::SuiteError;
use super::ffi::{bytes, from_bool, to_bool, write_out};
use super::session::{guard, guard_value, next_token};
use std::collections::HashMap;
use std::ffi::{c_char, c_void};

/// Opaque `ASZString`.
pub type ZString = *mut c_void;

struct ZEntry {
    text: String,
    refs: u32,
}

/// Strings issued in one session.
#[derive(Default)]
pub(crate) struct ZStringTable {
    entries: HashMap<usize, ZEntry>,
    empty: Option<usize>,
}

impl ZStringTable {
    /// A new string with one reference.
    pub(crate) fn make(&mut self, text: impl Into<String>) -> ZString {
        let token = next_token();
        self.entries.insert(
            token,
            ZEntry {
                text: text.into(),
                refs: 1,
            },
        );
        token as ZString
    }

    /// The shared empty string.
    pub(crate) fn empty(&mut self) -> ZString {
        match self.empty {
            Some(token) => token as ZString,
            None => {
                let token = self.make(String::new());
                self.empty = Some(token as usize);
                token
            }
        }
    }

    pub(crate) fn text(&self, zstring: ZString) -> Result<&str, SuiteError> {
        self.entries
            .get(&(zstring as usize))
            .map(|e| e.text.as_str())
            .ok_or(SuiteError::BadParameter("unknown string"))
    }

    fn text_mut(&mut self, zstring: ZString) -> Result<&mut String, SuiteError> {
        if self.empty == Some(zstring as usize) {
            return Err(SuiteError::BadParameter("the empty string is immutable"));
        }
        self.entries
            .get_mut(&(zstring as usize))
            .map(|e| &mut e.text)
            .ok_or(SuiteError::BadParameter("unknown string"))
    }

    pub(crate) fn add_ref(&mut self, zstring: ZString) -> Result<(), SuiteError> {
        let entry = self
            .entries
            .get_mut(&(zstring as usize))
            .ok_or(SuiteError::BadParameter("unknown string"))?;
        entry.refs = entry.refs.saturating_add(1);
        Ok(())
    }

    /// Drop one reference; returns whether the string was freed.
    pub(crate) fn release(&mut self, zstring: ZString) -> Result<bool, SuiteError> {
        let key = zstring as usize;
        let entry = self
            .entries
            .get_mut(&key)
            .ok_or(SuiteError::BadParameter("unknown string"))?;
        if self.empty == Some(key) {
            return Ok(false);
        }
        entry.refs -= 1;
        if entry.refs == 0 {
            self.entries.remove(&key);
            return Ok(true);
        }
        Ok(false)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Replace the `^index` placeholder in `text`.
pub(crate) fn replace_placeholder(text: &str, index: u32, replacement: &str) -> Option<String> {
    let placeholder = format!("^{index}");
    text.find(&placeholder).map(|at| {
        let mut out = String::with_capacity(text.len() + replacement.len());
        out.push_str(&text[..at]);
        out.push_str(replacement);
        out.push_str(&text[at + placeholder.len()..]);
        out
    })
}

/// Strip `&` menu accelerators; `&&` is a literal ampersand.
pub(crate) fn remove_accelerators(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '&' {
            if chars.peek() == Some(&'&') {
                out.push('&');
                chars.next();
            }
            continue;
        }
        out.push(c);
    }
    out
}

fn trim_ellipsis(text: &str) -> &str {
    text.strip_suffix("...")
        .or_else(|| text.strip_suffix('\u{2026}'))
        .unwrap_or(text)
}

/// Text as single-byte characters; anything outside Latin-1 becomes `?`.
fn to_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}

fn romanize_fixed(value: i32, places: i16, trim: bool, signed: bool) -> String {
    let number = if signed {
        f64::from(value) / 65536.0
    } else {
        f64::from(value as u32) / 65536.0
    };
    let places = usize::try_from(places).unwrap_or(0);
    let mut text = format!("{number:.places$}");
    if trim && text.contains('.') {
        let trimmed = text.trim_end_matches('0').trim_end_matches('.').len();
        text.truncate(trimmed);
    }
    text
}

/// `ASZStringSuite` version 1.
#[repr(C)]
pub struct ASZStringSuite {
    /// `MakeFromUnicode(src, byteCount, &zstr)`.
    pub make_from_unicode: unsafe extern "C" fn(*const u16, usize, *mut ZString) -> i32,
    /// `MakeFromCString(src, byteCount, &zstr)`.
    pub make_from_c_string: unsafe extern "C" fn(*const c_char, usize, *mut ZString) -> i32,
    /// `MakeFromPascalString(src, byteCount, &zstr)`.
    pub make_from_pascal_string: unsafe extern "C" fn(*const u8, usize, *mut ZString) -> i32,
    /// `MakeRomanizationOfInteger(value, &zstr)`.
    pub make_romanization_of_integer: unsafe extern "C" fn(i32, *mut ZString) -> i32,
    /// `MakeRomanizationOfFixed(value, places, trim, isSigned, &zstr)`.
    pub make_romanization_of_fixed: unsafe extern "C" fn(i32, i16, u8, u8, *mut ZString) -> i32,
    /// `MakeRomanizationOfDouble(value, &zstr)`.
    pub make_romanization_of_double: unsafe extern "C" fn(f64, *mut ZString) -> i32,
    /// `GetEmpty()`.
    pub get_empty: unsafe extern "C" fn() -> ZString,
    /// `Copy(source, &copy)`.
    pub copy: unsafe extern "C" fn(ZString, *mut ZString) -> i32,
    /// `Replace(zstr, index, replacement)`.
    pub replace: unsafe extern "C" fn(ZString, u32, ZString) -> i32,
    /// `TrimEllipsis(zstr)`.
    pub trim_ellipsis: unsafe extern "C" fn(ZString) -> i32,
    /// `TrimSpaces(zstr)`.
    pub trim_spaces: unsafe extern "C" fn(ZString) -> i32,
    /// `RemoveAccelerators(zstr)`.
    pub remove_accelerators: unsafe extern "C" fn(ZString) -> i32,
    /// `AddRef(zstr)`.
    pub add_ref: unsafe extern "C" fn(ZString) -> i32,
    /// `Release(zstr)`.
    pub release: unsafe extern "C" fn(ZString) -> i32,
    /// `IsAllWhiteSpace(zstr)`.
    pub is_all_white_space: unsafe extern "C" fn(ZString) -> u8,
    /// `IsEmpty(zstr)`.
    pub is_empty: unsafe extern "C" fn(ZString) -> u8,
    /// `WillReplace(zstr, index)`.
    pub will_replace: unsafe extern "C" fn(ZString, u32) -> u8,
    /// `LengthAsUnicodeCString(zstr)`.
    pub length_as_unicode_c_string: unsafe extern "C" fn(ZString) -> u32,
    /// `AsUnicodeCString(zstr, dst, size, checkSize)`.
    pub as_unicode_c_string: unsafe extern "C" fn(ZString, *mut u16, u32, u8) -> i32,
    /// `LengthAsCString(zstr)`.
    pub length_as_c_string: unsafe extern "C" fn(ZString) -> u32,
    /// `AsCString(zstr, dst, size, checkSize)`.
    pub as_c_string: unsafe extern "C" fn(ZString, *mut c_char, u32, u8) -> i32,
    /// `LengthAsPascalString(zstr)`.
    pub length_as_pascal_string: unsafe extern "C" fn(ZString) -> u32,
    /// `AsPascalString(zstr, dst, size, checkSize)`.
    pub as_pascal_string: unsafe extern "C" fn(ZString, *mut u8, u32, u8) -> i32,
}

/// The ZString suite table.
pub static ZSTRING_SUITE: ASZStringSuite = ASZStringSuite {
    make_from_unicode,
    make_from_c_string,
    make_from_pascal_string,
    make_romanization_of_integer,
    make_romanization_of_fixed,
    make_romanization_of_double,
    get_empty,
    copy,
    replace,
    trim_ellipsis: z_trim_ellipsis,
    trim_spaces,
    remove_accelerators: z_remove_accelerators,
    add_ref,
    release,
    is_all_white_space,
    is_empty,
    will_replace,
    length_as_unicode_c_string,
    as_unicode_c_string,
    length_as_c_string,
    as_c_string,
    length_as_pascal_string,
    as_pascal_string,
};

fn until_nul<T: Copy + PartialEq + Default>(units: &[T]) -> &[T] {
    let end = units.iter().position(|u| *u == T::default()).unwrap_or(units.len());
    &units[..end]
}

fn give(out: *mut ZString, f: impl FnOnce(&mut ZStringTable) -> Result<ZString, SuiteError>) -> i32 {
    guard("ZString.Make", |session| {
        if out.is_null() {
            return Err(SuiteError::BadParameter("null out-parameter"));
        }
        let zstring = f(&mut session.zstrings)?;
        // SAFETY: checked non-null above.
        unsafe { write_out(out, zstring) }
    })
}

unsafe extern "C" fn make_from_unicode(src: *const u16, byte_count: usize, out: *mut ZString) -> i32 {
    give(out, |table| {
        let units = byte_count / 2;
        if units > 0 && src.is_null() {
            return Err(SuiteError::BadParameter("null source"));
        }
        let slice = if units == 0 {
            &[][..]
        } else {
            // SAFETY: non-null, `units` UTF-16 units readable per the caller.
            unsafe { std::slice::from_raw_parts(src, units) }
        };
        Ok(table.make(String::from_utf16_lossy(until_nul(slice))))
    })
}

unsafe extern "C" fn make_from_c_string(src: *const c_char, byte_count: usize, out: *mut ZString) -> i32 {
    give(out, |table| {
        // SAFETY: plugin-supplied source of `byte_count` bytes.
        let raw = unsafe { bytes(src.cast(), byte_count) }?;
        Ok(table.make(crate::pe::decode_ansi(until_nul(raw))))
    })
}

unsafe extern "C" fn make_from_pascal_string(src: *const u8, byte_count: usize, out: *mut ZString) -> i32 {
    give(out, |table| {
        // SAFETY: plugin-supplied source of `byte_count` bytes.
        let raw = unsafe { bytes(src, byte_count) }?;
        let text = match raw.split_first() {
            Some((&len, rest)) => &rest[..usize::from(len).min(rest.len())],
            None => &[][..],
        };
        Ok(table.make(crate::pe::decode_ansi(text)))
    })
}

unsafe extern "C" fn make_romanization_of_integer(value: i32, out: *mut ZString) -> i32 {
    give(out, |table| Ok(table.make(value.to_string())))
}

unsafe extern "C" fn make_romanization_of_fixed(
    value: i32,
    places: i16,
    trim: u8,
    signed: u8,
    out: *mut ZString,
) -> i32 {
    give(out, |table| {
        Ok(table.make(romanize_fixed(value, places, from_bool(trim), from_bool(signed))))
    })
}

unsafe extern "C" fn make_romanization_of_double(value: f64, out: *mut ZString) -> i32 {
    give(out, |table| Ok(table.make(value.to_string())))
}

unsafe extern "C" fn get_empty() -> ZString {
    guard_value("ZString.GetEmpty", std::ptr::null_mut(), |session| {
        Ok(session.zstrings.empty())
    })
}

unsafe extern "C" fn copy(source: ZString, out: *mut ZString) -> i32 {
    give(out, |table| {
        let text = table.text(source)?.to_owned();
        Ok(table.make(text))
    })
}

unsafe extern "C" fn replace(zstring: ZString, index: u32, replacement: ZString) -> i32 {
    guard("ZString.Replace", |session| {
        let table = &mut session.zstrings;
        let replacement = table.text(replacement)?.to_owned();
        let text = table.text_mut(zstring)?;
        if let Some(replaced) = replace_placeholder(text, index, &replacement) {
            *text = replaced;
        }
        Ok(())
    })
}

fn edit(entry: &'static str, zstring: ZString, f: impl FnOnce(&str) -> String) -> i32 {
    guard(entry, |session| {
        let text = session.zstrings.text_mut(zstring)?;
        let edited = f(text.as_str());
        *text = edited;
        Ok(())
    })
}

unsafe extern "C" fn z_trim_ellipsis(zstring: ZString) -> i32 {
    edit("ZString.TrimEllipsis", zstring, |t| trim_ellipsis(t).to_owned())
}

unsafe extern "C" fn trim_spaces(zstring: ZString) -> i32 {
    edit("ZString.TrimSpaces", zstring, |t| t.trim().to_owned())
}

unsafe extern "C" fn z_remove_accelerators(zstring: ZString) -> i32 {
    edit("ZString.RemoveAccelerators", zstring, remove_accelerators)
}

unsafe extern "C" fn add_ref(zstring: ZString) -> i32 {
    guard("ZString.AddRef", |session| session.zstrings.add_ref(zstring))
}

unsafe extern "C" fn release(zstring: ZString) -> i32 {
    guard("ZString.Release", |session| session.zstrings.release(zstring).map(|_| ()))
}

fn query<T>(entry: &'static str, zstring: ZString, fallback: T, f: impl FnOnce(&str) -> T) -> T {
    guard_value(entry, fallback, |session| session.zstrings.text(zstring).map(f))
}

unsafe extern "C" fn is_all_white_space(zstring: ZString) -> u8 {
    query("ZString.IsAllWhiteSpace", zstring, 0, |t| {
        to_bool(t.chars().all(char::is_whitespace))
    })
}

unsafe extern "C" fn is_empty(zstring: ZString) -> u8 {
    query("ZString.IsEmpty", zstring, 1, |t| to_bool(t.is_empty()))
}

unsafe extern "C" fn will_replace(zstring: ZString, index: u32) -> u8 {
    query("ZString.WillReplace", zstring, 0, |t| {
        to_bool(t.contains(&format!("^{index}")))
    })
}

// Lengths include the terminator (C strings) or the length byte (Pascal).

unsafe extern "C" fn length_as_unicode_c_string(zstring: ZString) -> u32 {
    query("ZString.LengthAsUnicodeCString", zstring, 0, |t| {
        t.encode_utf16().count() as u32 + 1
    })
}

unsafe extern "C" fn length_as_c_string(zstring: ZString) -> u32 {
    query("ZString.LengthAsCString", zstring, 0, |t| t.chars().count() as u32 + 1)
}

unsafe extern "C" fn length_as_pascal_string(zstring: ZString) -> u32 {
    query("ZString.LengthAsPascalString", zstring, 0, |t| {
        t.chars().count().min(255) as u32 + 1
    })
}

/// Copy `units` plus a terminator into `dst`, which holds `size` units.
///
/// # Safety
///
/// A non-null `dst` must be valid for `size` writes of `T`.
unsafe fn copy_terminated<T: Copy + Default>(
    units: &[T],
    dst: *mut T,
    size: u32,
    check: bool,
) -> Result<(), SuiteError> {
    let size = size as usize;
    if dst.is_null() || size == 0 {
        return Err(SuiteError::BadParameter("null or empty string buffer"));
    }
    if check && units.len() + 1 > size {
        return Err(SuiteError::BadParameter("string buffer too small"));
    }
    let len = units.len().min(size - 1);
    // SAFETY: `len + 1 <= size` writes, valid per the caller.
    unsafe {
        std::ptr::copy_nonoverlapping(units.as_ptr(), dst, len);
        dst.add(len).write(T::default());
    }
    Ok(())
}

unsafe extern "C" fn as_unicode_c_string(zstring: ZString, dst: *mut u16, size: u32, check: u8) -> i32 {
    guard("ZString.AsUnicodeCString", |session| {
        let units: Vec<u16> = session.zstrings.text(zstring)?.encode_utf16().collect();
        // SAFETY: plugin buffer of `size` units.
        unsafe { copy_terminated(&units, dst, size, from_bool(check)) }
    })
}

unsafe extern "C" fn as_c_string(zstring: ZString, dst: *mut c_char, size: u32, check: u8) -> i32 {
    guard("ZString.AsCString", |session| {
        let ansi = to_ansi(session.zstrings.text(zstring)?);
        // SAFETY: plugin buffer of `size` bytes.
        unsafe { copy_terminated(&ansi, dst.cast::<u8>(), size, from_bool(check)) }
    })
}

unsafe extern "C" fn as_pascal_string(zstring: ZString, dst: *mut u8, size: u32, check: u8) -> i32 {
    guard("ZString.AsPascalString", |session| {
        let mut ansi = to_ansi(session.zstrings.text(zstring)?);
        ansi.truncate(255);
        let size = size as usize;
        if dst.is_null() || size == 0 {
            return Err(SuiteError::BadParameter("null or empty string buffer"));
        }
        if from_bool(check) && ansi.len() + 1 > size {
            return Err(SuiteError::BadParameter("string buffer too small"));
        }
        let len = ansi.len().min(size - 1);
        // SAFETY: `len + 1 <= size` bytes, writable per the caller.
        unsafe {
            dst.write(len as u8);
            std::ptr::copy_nonoverlapping(ansi.as_ptr(), dst.add(1), len);
        }
        Ok(())
    })
}
