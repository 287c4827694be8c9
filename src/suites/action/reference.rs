//! `PSActionReferenceProcs` version 2.
//!
//! Put appends an item; Get reads the first item. `GetContainer` yields a
//! new reference over the remaining items, or null when there are none.

use super::*;
use crate::suites::error::SuiteError;
use crate::suites::ffi::{c_str, write_out};
use crate::suites::session::{SuiteSession, guard};
use std::ffi::c_char;

type Ref = ReferenceToken;

/// `PSActionReferenceProcs`.
#[repr(C)]
pub struct PSActionReferenceProcs {
    /// `Make(&reference)`.
    pub make: unsafe extern "C" fn(*mut Ref) -> i32,
    /// `Free(reference)`.
    pub free: unsafe extern "C" fn(Ref) -> i32,
    /// `GetForm(reference, &form)`.
    pub get_form: unsafe extern "C" fn(Ref, *mut u32) -> i32,
    /// `GetDesiredClass(reference, &class)`.
    pub get_desired_class: unsafe extern "C" fn(Ref, *mut u32) -> i32,
    /// `PutName(reference, class, name)`.
    pub put_name: unsafe extern "C" fn(Ref, u32, *const c_char) -> i32,
    /// `PutIndex(reference, class, index)`.
    pub put_index: unsafe extern "C" fn(Ref, u32, u32) -> i32,
    /// `PutIdentifier(reference, class, id)`.
    pub put_identifier: unsafe extern "C" fn(Ref, u32, u32) -> i32,
    /// `PutOffset(reference, class, offset)`.
    pub put_offset: unsafe extern "C" fn(Ref, u32, i32) -> i32,
    /// `PutEnumerated(reference, class, type, value)`.
    pub put_enumerated: unsafe extern "C" fn(Ref, u32, u32, u32) -> i32,
    /// `PutProperty(reference, class, property)`.
    pub put_property: unsafe extern "C" fn(Ref, u32, u32) -> i32,
    /// `PutClass(reference, class)`.
    pub put_class: unsafe extern "C" fn(Ref, u32) -> i32,
    /// `GetNameLength(reference, &length)`.
    pub get_name_length: unsafe extern "C" fn(Ref, *mut u32) -> i32,
    /// `GetName(reference, buffer, maxLength)`.
    pub get_name: unsafe extern "C" fn(Ref, *mut c_char, u32) -> i32,
    /// `GetIndex(reference, &index)`.
    pub get_index: unsafe extern "C" fn(Ref, *mut u32) -> i32,
    /// `GetIdentifier(reference, &id)`.
    pub get_identifier: unsafe extern "C" fn(Ref, *mut u32) -> i32,
    /// `GetOffset(reference, &offset)`.
    pub get_offset: unsafe extern "C" fn(Ref, *mut i32) -> i32,
    /// `GetEnumerated(reference, &type, &value)`.
    pub get_enumerated: unsafe extern "C" fn(Ref, *mut u32, *mut u32) -> i32,
    /// `GetProperty(reference, &property)`.
    pub get_property: unsafe extern "C" fn(Ref, *mut u32) -> i32,
    /// `GetContainer(reference, &container)`.
    pub get_container: unsafe extern "C" fn(Ref, *mut Ref) -> i32,
}

/// The action reference suite table.
pub static ACTION_REFERENCE_SUITE: PSActionReferenceProcs = PSActionReferenceProcs {
    make,
    free,
    get_form,
    get_desired_class,
    put_name,
    put_index,
    put_identifier,
    put_offset,
    put_enumerated,
    put_property,
    put_class,
    get_name_length,
    get_name,
    get_index,
    get_identifier,
    get_offset,
    get_enumerated,
    get_property,
    get_container,
};

fn first(session: &SuiteSession, reference: Ref) -> Result<&ReferenceItem, SuiteError> {
    session
        .actions
        .reference(reference)?
        .first()
        .ok_or(SuiteError::BadParameter("empty reference"))
}

fn push(entry: &'static str, reference: Ref, item: impl FnOnce() -> Result<ReferenceItem, SuiteError>) -> i32 {
    guard(entry, |session| {
        let item = item()?;
        session.actions.reference_mut(reference)?.push(item);
        Ok(())
    })
}

fn read<T>(
    entry: &'static str,
    reference: Ref,
    out: *mut T,
    f: impl FnOnce(&ReferenceItem) -> Result<T, SuiteError>,
) -> i32 {
    guard(entry, |session| {
        let v = f(first(session, reference)?)?;
        // SAFETY: plugin-supplied out-parameter.
        unsafe { write_out(out, v) }
    })
}

fn wrong_form() -> SuiteError {
    SuiteError::BadParameter("reference has a different form")
}

unsafe extern "C" fn make(out: *mut Ref) -> i32 {
    guard("Reference.Make", |session| {
        if out.is_null() {
            return Err(SuiteError::BadParameter("null out-parameter"));
        }
        let token = session.actions.insert_reference(ActionReference::new());
        // SAFETY: checked non-null above.
        unsafe { write_out(out, token) }
    })
}

unsafe extern "C" fn free(reference: Ref) -> i32 {
    guard("Reference.Free", |session| {
        session.actions.take_reference(reference).map(drop)
    })
}

unsafe extern "C" fn get_form(reference: Ref, out: *mut u32) -> i32 {
    read("Reference.GetForm", reference, out, |item| Ok(item.form.form_id()))
}

unsafe extern "C" fn get_desired_class(reference: Ref, out: *mut u32) -> i32 {
    read("Reference.GetDesiredClass", reference, out, |item| Ok(item.desired_class))
}

unsafe extern "C" fn put_name(reference: Ref, desired_class: u32, name: *const c_char) -> i32 {
    push("Reference.PutName", reference, || {
        // SAFETY: plugin-supplied string argument.
        let name = unsafe { c_str(name) }?;
        Ok(ReferenceItem {
            desired_class,
            form: ReferenceForm::Name(name.to_bytes().to_vec()),
        })
    })
}

unsafe extern "C" fn put_index(reference: Ref, desired_class: u32, index: u32) -> i32 {
    push("Reference.PutIndex", reference, || {
        Ok(ReferenceItem { desired_class, form: ReferenceForm::Index(index) })
    })
}

unsafe extern "C" fn put_identifier(reference: Ref, desired_class: u32, id: u32) -> i32 {
    push("Reference.PutIdentifier", reference, || {
        Ok(ReferenceItem { desired_class, form: ReferenceForm::Identifier(id) })
    })
}

unsafe extern "C" fn put_offset(reference: Ref, desired_class: u32, offset: i32) -> i32 {
    push("Reference.PutOffset", reference, || {
        Ok(ReferenceItem { desired_class, form: ReferenceForm::Offset(offset) })
    })
}

unsafe extern "C" fn put_enumerated(reference: Ref, desired_class: u32, type_id: u32, value: u32) -> i32 {
    push("Reference.PutEnumerated", reference, || {
        Ok(ReferenceItem {
            desired_class,
            form: ReferenceForm::Enumerated { type_id, value },
        })
    })
}

unsafe extern "C" fn put_property(reference: Ref, desired_class: u32, property: u32) -> i32 {
    push("Reference.PutProperty", reference, || {
        Ok(ReferenceItem { desired_class, form: ReferenceForm::Property(property) })
    })
}

unsafe extern "C" fn put_class(reference: Ref, desired_class: u32) -> i32 {
    push("Reference.PutClass", reference, || {
        Ok(ReferenceItem { desired_class, form: ReferenceForm::Class })
    })
}

fn name_of(item: &ReferenceItem) -> Result<&[u8], SuiteError> {
    match &item.form {
        ReferenceForm::Name(name) => Ok(name),
        _ => Err(wrong_form()),
    }
}

unsafe extern "C" fn get_name_length(reference: Ref, out: *mut u32) -> i32 {
    read("Reference.GetNameLength", reference, out, |item| {
        name_of(item).map(|n| n.len() as u32)
    })
}

unsafe extern "C" fn get_name(reference: Ref, dst: *mut c_char, max_length: u32) -> i32 {
    guard("Reference.GetName", |session| {
        let name = name_of(first(session, reference)?)?;
        // SAFETY: plugin buffer of `max_length` bytes.
        unsafe { copy_string_out(name, dst, max_length) }
    })
}

unsafe extern "C" fn get_index(reference: Ref, out: *mut u32) -> i32 {
    read("Reference.GetIndex", reference, out, |item| match item.form {
        ReferenceForm::Index(n) => Ok(n),
        _ => Err(wrong_form()),
    })
}

unsafe extern "C" fn get_identifier(reference: Ref, out: *mut u32) -> i32 {
    read("Reference.GetIdentifier", reference, out, |item| match item.form {
        ReferenceForm::Identifier(n) => Ok(n),
        _ => Err(wrong_form()),
    })
}

unsafe extern "C" fn get_offset(reference: Ref, out: *mut i32) -> i32 {
    read("Reference.GetOffset", reference, out, |item| match item.form {
        ReferenceForm::Offset(n) => Ok(n),
        _ => Err(wrong_form()),
    })
}

unsafe extern "C" fn get_enumerated(reference: Ref, type_out: *mut u32, out: *mut u32) -> i32 {
    guard("Reference.GetEnumerated", |session| {
        let (type_id, value) = match first(session, reference)?.form {
            ReferenceForm::Enumerated { type_id, value } => (type_id, value),
            _ => return Err(wrong_form()),
        };
        if !type_out.is_null() {
            // SAFETY: non-null plugin out-parameter.
            unsafe { type_out.write(type_id) };
        }
        // SAFETY: plugin-supplied out-parameter.
        unsafe { write_out(out, value) }
    })
}

unsafe extern "C" fn get_property(reference: Ref, out: *mut u32) -> i32 {
    read("Reference.GetProperty", reference, out, |item| match item.form {
        ReferenceForm::Property(n) => Ok(n),
        _ => Err(wrong_form()),
    })
}

unsafe extern "C" fn get_container(reference: Ref, out: *mut Ref) -> i32 {
    guard("Reference.GetContainer", |session| {
        let container = session.actions.reference(reference)?.container();
        let token = match container {
            Some(container) => session.actions.insert_reference(container),
            None => std::ptr::null_mut(),
        };
        // SAFETY: plugin-supplied out-parameter.
        unsafe { write_out(out, token) }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fourcc::fourcc;
    use crate::suites::error::codes;
    use crate::suites::{SuiteConfig, SuiteSession};

    static R: &PSActionReferenceProcs = &ACTION_REFERENCE_SUITE;

    #[test]
    fn test_container_chain() {
        let _active = SuiteSession::new(&SuiteConfig::default()).activate().unwrap();
        unsafe {
            let mut r: Ref = std::ptr::null_mut();
            (R.make)(&mut r);
            (R.put_name)(r, fourcc(b"Lyr "), c"Shadows".as_ptr());
            (R.put_index)(r, fourcc(b"Dcmn"), 2);

            let mut form = 0u32;
            (R.get_form)(r, &mut form);
            assert_eq!(form, FORM_NAME);
            let mut len = 0u32;
            (R.get_name_length)(r, &mut len);
            assert_eq!(len, 7);
            let mut index = 0u32;
            assert_eq!((R.get_index)(r, &mut index), codes::BAD_PARAMETER);

            let mut container: Ref = std::ptr::null_mut();
            assert_eq!((R.get_container)(r, &mut container), codes::NO_ERROR);
            assert!(!container.is_null());
            let mut class = 0u32;
            (R.get_desired_class)(container, &mut class);
            assert_eq!(class, fourcc(b"Dcmn"));
            assert_eq!((R.get_index)(container, &mut index), codes::NO_ERROR);
            assert_eq!(index, 2);

            let mut outermost: Ref = std::ptr::dangling_mut();
            assert_eq!((R.get_container)(container, &mut outermost), codes::NO_ERROR);
            assert!(outermost.is_null());
        }
    }
}
