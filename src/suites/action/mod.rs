//! Action descriptors, lists and references, and their suites.
//!
//! Plugins see opaque tokens; the values live in the session's
//! [`ActionStore`]. Nested values are stored by copy, so freeing the token a
//! value was put from never affects the container.

mod codec;
mod descriptor;
mod list;
mod reference;
mod value;

pub use codec::{CodecError, MAX_DEPTH, decode_descriptor, encode_descriptor};
pub use descriptor::{ACTION_DESCRIPTOR_SUITE, PSActionDescriptorProcs};
pub use list::{ACTION_LIST_SUITE, PSActionListProcs};
pub use reference::{ACTION_REFERENCE_SUITE, PSActionReferenceProcs};
pub use value::*;

use super::error::SuiteError;
use super::ffi::{write_c_string, write_out};
use super::handle::Handle;
use super::registry::SuiteId;
use super::session::{SuiteSession, next_token};
use std::collections::HashMap;
use std::ffi::{c_char, c_void};

/// Opaque `PIActionDescriptor`.
pub type DescriptorToken = *mut c_void;
/// Opaque `PIActionList`.
pub type ListToken = *mut c_void;
/// Opaque `PIActionReference`.
pub type ReferenceToken = *mut c_void;

/// Descriptors, lists and references issued in one session.
///
/// Each table exists once its suite has been constructed. The descriptor
/// table is built on top of the list and reference tables, so constructing
/// it constructs those first.
#[derive(Debug, Default)]
pub(crate) struct ActionStore {
    descriptors: Option<HashMap<usize, ActionDescriptor>>,
    lists: Option<HashMap<usize, ActionList>>,
    references: Option<HashMap<usize, ActionReference>>,
    constructed: Vec<SuiteId>,
}

macro_rules! token_table {
    ($field:ident, $suite:expr, $ty:ty, $insert:ident, $get:ident, $get_mut:ident, $take:ident, $what:literal) => {
        pub(crate) fn $insert(&mut self, value: $ty) -> *mut c_void {
            self.construct($suite);
            let token = next_token();
            self.$field.get_or_insert_default().insert(token, value);
            token as *mut c_void
        }

        pub(crate) fn $get(&self, token: *mut c_void) -> Result<&$ty, SuiteError> {
            self.$field
                .as_ref()
                .and_then(|table| table.get(&(token as usize)))
                .ok_or(SuiteError::BadParameter(concat!("unknown ", $what)))
        }

        pub(crate) fn $get_mut(&mut self, token: *mut c_void) -> Result<&mut $ty, SuiteError> {
            self.$field
                .as_mut()
                .and_then(|table| table.get_mut(&(token as usize)))
                .ok_or(SuiteError::BadParameter(concat!("unknown ", $what)))
        }

        pub(crate) fn $take(&mut self, token: *mut c_void) -> Result<$ty, SuiteError> {
            self.$field
                .as_mut()
                .and_then(|table| table.remove(&(token as usize)))
                .ok_or(SuiteError::BadParameter(concat!("unknown ", $what)))
        }
    };
}

impl ActionStore {
    token_table!(descriptors, SuiteId::ActionDescriptor, ActionDescriptor, insert_descriptor, descriptor, descriptor_mut, take_descriptor, "descriptor");
    token_table!(lists, SuiteId::ActionList, ActionList, insert_list, list, list_mut, take_list, "list");
    token_table!(references, SuiteId::ActionReference, ActionReference, insert_reference, reference, reference_mut, take_reference, "reference");

    /// Build the table behind `suite`, and the tables it depends on.
    /// Other suites have no action state.
    pub(crate) fn construct(&mut self, suite: SuiteId) {
        for dependency in suite.dependencies() {
            self.construct(*dependency);
        }
        let built = match suite {
            SuiteId::ActionDescriptor => build_table(&mut self.descriptors),
            SuiteId::ActionList => build_table(&mut self.lists),
            SuiteId::ActionReference => build_table(&mut self.references),
            _ => false,
        };
        if built {
            tracing::trace!("constructed action state for {}", suite);
            self.constructed.push(suite);
        }
    }

    /// Action suites whose state exists, in construction order.
    pub(crate) fn constructed(&self) -> &[SuiteId] {
        &self.constructed
    }

    /// Live tokens of every kind.
    pub(crate) fn len(&self) -> usize {
        self.descriptors.as_ref().map_or(0, HashMap::len)
            + self.lists.as_ref().map_or(0, HashMap::len)
            + self.references.as_ref().map_or(0, HashMap::len)
    }
}

fn build_table<T>(table: &mut Option<HashMap<usize, T>>) -> bool {
    if table.is_some() {
        return false;
    }
    *table = Some(HashMap::new());
    true
}

fn mismatch() -> SuiteError {
    SuiteError::BadParameter("value has a different type")
}

/// Read an integer; a one-element integer list reads as its element.
pub(crate) fn integer_of(value: &ActionValue) -> Result<i32, SuiteError> {
    match value {
        ActionValue::Integer(n) => Ok(*n),
        ActionValue::List(list) => match list.get(0) {
            Some(ActionValue::Integer(n)) => Ok(*n),
            _ => Err(mismatch()),
        },
        _ => Err(mismatch()),
    }
}

pub(crate) fn float_of(value: &ActionValue) -> Result<f64, SuiteError> {
    match value {
        ActionValue::Float(f) => Ok(*f),
        _ => Err(mismatch()),
    }
}

pub(crate) fn unit_float_of(value: &ActionValue) -> Result<(u32, f64), SuiteError> {
    match value {
        ActionValue::UnitFloat { unit, value } => Ok((*unit, *value)),
        _ => Err(mismatch()),
    }
}

pub(crate) fn string_of(value: &ActionValue) -> Result<&[u8], SuiteError> {
    match value {
        ActionValue::String(bytes) => Ok(bytes),
        _ => Err(mismatch()),
    }
}

pub(crate) fn boolean_of(value: &ActionValue) -> Result<bool, SuiteError> {
    match value {
        ActionValue::Boolean(b) => Ok(*b),
        _ => Err(mismatch()),
    }
}

pub(crate) fn list_of(value: &ActionValue) -> Result<&ActionList, SuiteError> {
    match value {
        ActionValue::List(list) => Ok(list),
        _ => Err(mismatch()),
    }
}

pub(crate) fn object_of(value: &ActionValue, global: bool) -> Result<(u32, &ActionDescriptor), SuiteError> {
    match (value, global) {
        (ActionValue::Object { class, descriptor }, false)
        | (ActionValue::GlobalObject { class, descriptor }, true) => Ok((*class, descriptor)),
        _ => Err(mismatch()),
    }
}

pub(crate) fn enumerated_of(value: &ActionValue) -> Result<(u32, u32), SuiteError> {
    match value {
        ActionValue::Enumerated { type_id, value } => Ok((*type_id, *value)),
        _ => Err(mismatch()),
    }
}

pub(crate) fn reference_of(value: &ActionValue) -> Result<&ActionReference, SuiteError> {
    match value {
        ActionValue::Reference(reference) => Ok(reference),
        _ => Err(mismatch()),
    }
}

pub(crate) fn class_of(value: &ActionValue, global: bool) -> Result<u32, SuiteError> {
    match (value, global) {
        (ActionValue::Class(class), false) | (ActionValue::GlobalClass(class), true) => Ok(*class),
        _ => Err(mismatch()),
    }
}

pub(crate) fn alias_of(value: &ActionValue) -> Result<&[u8], SuiteError> {
    match value {
        ActionValue::Alias(bytes) => Ok(bytes),
        _ => Err(mismatch()),
    }
}

pub(crate) fn data_of(value: &ActionValue) -> Result<&[u8], SuiteError> {
    match value {
        ActionValue::RawData(bytes) => Ok(bytes),
        _ => Err(mismatch()),
    }
}

/// Integers of a list value, or of a single integer.
pub(crate) fn integers_of(value: &ActionValue) -> Result<Vec<i32>, SuiteError> {
    match value {
        ActionValue::Integer(n) => Ok(vec![*n]),
        ActionValue::List(list) => list
            .iter()
            .map(|item| match item {
                ActionValue::Integer(n) => Ok(*n),
                _ => Err(mismatch()),
            })
            .collect(),
        _ => Err(mismatch()),
    }
}

/// Write a string value into a caller buffer of `max_length` bytes.
///
/// # Safety
///
/// `dst` must be valid for `max_length` bytes of writes.
pub(crate) unsafe fn copy_string_out(
    bytes: &[u8],
    dst: *mut c_char,
    max_length: u32,
) -> Result<(), SuiteError> {
    // SAFETY: forwarded from the caller.
    unsafe { write_c_string(dst, max_length as usize, bytes) }
}

/// Write `count` integers into a caller array.
///
/// # Safety
///
/// `dst` must be valid for `count` `i32` writes.
pub(crate) unsafe fn copy_integers_out(
    values: &[i32],
    count: u32,
    dst: *mut i32,
) -> Result<(), SuiteError> {
    if dst.is_null() {
        return Err(SuiteError::BadParameter("null array"));
    }
    if (count as usize) > values.len() {
        return Err(SuiteError::BadParameter("count exceeds stored integers"));
    }
    // SAFETY: `count` writes, valid per the caller.
    unsafe { std::ptr::copy_nonoverlapping(values.as_ptr(), dst, count as usize) };
    Ok(())
}

/// Read `count` integers from a caller array.
///
/// # Safety
///
/// `src` must be valid for `count` `i32` reads.
pub(crate) unsafe fn integers_in(count: u32, src: *const i32) -> Result<Vec<i32>, SuiteError> {
    if count == 0 {
        return Ok(Vec::new());
    }
    if src.is_null() {
        return Err(SuiteError::BadParameter("null array"));
    }
    // SAFETY: `count` reads, valid per the caller.
    Ok(unsafe { std::slice::from_raw_parts(src, count as usize) }.to_vec())
}

/// Hand out a copy of a nested object as a fresh descriptor token.
///
/// # Safety
///
/// Non-null out-parameters must be valid for writes.
pub(crate) unsafe fn give_object(
    session: &mut SuiteSession,
    object: (u32, ActionDescriptor),
    class_out: *mut u32,
    descriptor_out: *mut DescriptorToken,
) -> Result<(), SuiteError> {
    if descriptor_out.is_null() {
        return Err(SuiteError::BadParameter("null out-parameter"));
    }
    let (class, descriptor) = object;
    if !class_out.is_null() {
        // SAFETY: non-null plugin out-parameter.
        unsafe { class_out.write(class) };
    }
    let token = session.actions.insert_descriptor(descriptor);
    // SAFETY: checked non-null above.
    unsafe { write_out(descriptor_out, token) }
}

/// Hand out alias bytes as a new handle.
///
/// # Safety
///
/// A non-null `out` must be valid for writes.
pub(crate) unsafe fn give_alias(
    session: &mut SuiteSession,
    bytes: Vec<u8>,
    out: *mut Handle,
) -> Result<(), SuiteError> {
    if out.is_null() {
        return Err(SuiteError::BadParameter("null out-parameter"));
    }
    let handle = session.handles.from_bytes(&bytes)?;
    // SAFETY: checked non-null above.
    unsafe { write_out(out, handle) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_tokens_are_distinct() {
        let mut store = ActionStore::default();
        let a = store.insert_descriptor(ActionDescriptor::new());
        let b = store.insert_list(ActionList::new());
        assert_ne!(a, b);
        assert!(store.list(a).is_err());
        assert!(store.descriptor(a).is_ok());
        assert_eq!(store.len(), 2);
        store.take_descriptor(a).unwrap();
        assert!(store.descriptor(a).is_err());
    }

    #[test]
    fn test_integer_reads_first_array_element() {
        let array = ActionValue::List(vec![ActionValue::Integer(9), ActionValue::Integer(1)].into());
        assert_eq!(integer_of(&array), Ok(9));
        assert_eq!(integers_of(&array), Ok(vec![9, 1]));
        assert!(integer_of(&ActionValue::Boolean(true)).is_err());
    }
}
