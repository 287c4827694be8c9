//! `PSActionListProcs` version 1.

use super::*;
use crate::suites::error::SuiteError;
use crate::suites::ffi::{bytes, c_str, from_bool, to_bool, write_out};
use crate::suites::handle::Handle;
use crate::suites::session::{SuiteSession, guard};
use crate::suites::zstring::ZString;
use std::ffi::{c_char, c_void};

type List = ListToken;

/// `PSActionListProcs`.
#[repr(C)]
pub struct PSActionListProcs {
    /// `Make(&list)`.
    pub make: unsafe extern "C" fn(*mut List) -> i32,
    /// `Free(list)`.
    pub free: unsafe extern "C" fn(List) -> i32,
    /// `GetType(list, index, &type)`.
    pub get_type: unsafe extern "C" fn(List, u32, *mut u32) -> i32,
    /// `GetCount(list, &count)`.
    pub get_count: unsafe extern "C" fn(List, *mut u32) -> i32,
    /// `PutInteger(list, value)`.
    pub put_integer: unsafe extern "C" fn(List, i32) -> i32,
    /// `PutFloat(list, value)`.
    pub put_float: unsafe extern "C" fn(List, f64) -> i32,
    /// `PutUnitFloat(list, unit, value)`.
    pub put_unit_float: unsafe extern "C" fn(List, u32, f64) -> i32,
    /// `PutString(list, cstr)`.
    pub put_string: unsafe extern "C" fn(List, *const c_char) -> i32,
    /// `PutBoolean(list, value)`.
    pub put_boolean: unsafe extern "C" fn(List, u8) -> i32,
    /// `PutList(list, nested)`.
    pub put_list: unsafe extern "C" fn(List, List) -> i32,
    /// `PutObject(list, class, object)`.
    pub put_object: unsafe extern "C" fn(List, u32, DescriptorToken) -> i32,
    /// `PutGlobalObject(list, class, object)`.
    pub put_global_object: unsafe extern "C" fn(List, u32, DescriptorToken) -> i32,
    /// `PutEnumerated(list, type, value)`.
    pub put_enumerated: unsafe extern "C" fn(List, u32, u32) -> i32,
    /// `PutReference(list, reference)`.
    pub put_reference: unsafe extern "C" fn(List, ReferenceToken) -> i32,
    /// `PutClass(list, class)`.
    pub put_class: unsafe extern "C" fn(List, u32) -> i32,
    /// `PutGlobalClass(list, class)`.
    pub put_global_class: unsafe extern "C" fn(List, u32) -> i32,
    /// `PutAlias(list, handle)`.
    pub put_alias: unsafe extern "C" fn(List, Handle) -> i32,
    /// `GetInteger(list, index, &value)`.
    pub get_integer: unsafe extern "C" fn(List, u32, *mut i32) -> i32,
    /// `GetFloat(list, index, &value)`.
    pub get_float: unsafe extern "C" fn(List, u32, *mut f64) -> i32,
    /// `GetUnitFloat(list, index, &unit, &value)`.
    pub get_unit_float: unsafe extern "C" fn(List, u32, *mut u32, *mut f64) -> i32,
    /// `GetStringLength(list, index, &length)`.
    pub get_string_length: unsafe extern "C" fn(List, u32, *mut u32) -> i32,
    /// `GetString(list, index, buffer, maxLength)`.
    pub get_string: unsafe extern "C" fn(List, u32, *mut c_char, u32) -> i32,
    /// `GetBoolean(list, index, &value)`.
    pub get_boolean: unsafe extern "C" fn(List, u32, *mut u8) -> i32,
    /// `GetList(list, index, &nested)`.
    pub get_list: unsafe extern "C" fn(List, u32, *mut List) -> i32,
    /// `GetObject(list, index, &class, &object)`.
    pub get_object: unsafe extern "C" fn(List, u32, *mut u32, *mut DescriptorToken) -> i32,
    /// `GetGlobalObject(list, index, &class, &object)`.
    pub get_global_object: unsafe extern "C" fn(List, u32, *mut u32, *mut DescriptorToken) -> i32,
    /// `GetEnumerated(list, index, &type, &value)`.
    pub get_enumerated: unsafe extern "C" fn(List, u32, *mut u32, *mut u32) -> i32,
    /// `GetReference(list, index, &reference)`.
    pub get_reference: unsafe extern "C" fn(List, u32, *mut ReferenceToken) -> i32,
    /// `GetClass(list, index, &class)`.
    pub get_class: unsafe extern "C" fn(List, u32, *mut u32) -> i32,
    /// `GetGlobalClass(list, index, &class)`.
    pub get_global_class: unsafe extern "C" fn(List, u32, *mut u32) -> i32,
    /// `GetAlias(list, index, &handle)`.
    pub get_alias: unsafe extern "C" fn(List, u32, *mut Handle) -> i32,
    /// `PutIntegers(list, count, values)`.
    pub put_integers: unsafe extern "C" fn(List, u32, *const i32) -> i32,
    /// `GetIntegers(list, count, values)`.
    pub get_integers: unsafe extern "C" fn(List, u32, *mut i32) -> i32,
    /// `PutData(list, length, data)`.
    pub put_data: unsafe extern "C" fn(List, i32, *const c_void) -> i32,
    /// `GetDataLength(list, index, &length)`.
    pub get_data_length: unsafe extern "C" fn(List, u32, *mut i32) -> i32,
    /// `GetData(list, index, data)`.
    pub get_data: unsafe extern "C" fn(List, u32, *mut c_void) -> i32,
    /// `PutZString(list, zstring)`.
    pub put_zstring: unsafe extern "C" fn(List, ZString) -> i32,
    /// `GetZString(list, index, &zstring)`.
    pub get_zstring: unsafe extern "C" fn(List, u32, *mut ZString) -> i32,
}

/// The action list suite table.
pub static ACTION_LIST_SUITE: PSActionListProcs = PSActionListProcs {
    make,
    free,
    get_type,
    get_count,
    put_integer,
    put_float,
    put_unit_float,
    put_string,
    put_boolean,
    put_list,
    put_object,
    put_global_object,
    put_enumerated,
    put_reference,
    put_class,
    put_global_class,
    put_alias,
    get_integer,
    get_float,
    get_unit_float,
    get_string_length,
    get_string,
    get_boolean,
    get_list,
    get_object,
    get_global_object,
    get_enumerated,
    get_reference,
    get_class,
    get_global_class,
    get_alias,
    put_integers,
    get_integers,
    put_data,
    get_data_length,
    get_data,
    put_zstring,
    get_zstring,
};

fn item(session: &SuiteSession, list: List, index: u32) -> Result<&ActionValue, SuiteError> {
    session
        .actions
        .list(list)?
        .get(index as usize)
        .ok_or(SuiteError::BadParameter("list index out of range"))
}

fn push(entry: &'static str, list: List, f: impl FnOnce(&mut SuiteSession) -> Result<ActionValue, SuiteError>) -> i32 {
    guard(entry, |session| {
        let value = f(session)?;
        session.actions.list_mut(list)?.push(value);
        Ok(())
    })
}

fn get<T>(
    entry: &'static str,
    list: List,
    index: u32,
    out: *mut T,
    f: impl FnOnce(&ActionValue) -> Result<T, SuiteError>,
) -> i32 {
    guard(entry, |session| {
        let v = f(item(session, list, index)?)?;
        // SAFETY: plugin-supplied out-parameter.
        unsafe { write_out(out, v) }
    })
}

unsafe extern "C" fn make(out: *mut List) -> i32 {
    guard("List.Make", |session| {
        if out.is_null() {
            return Err(SuiteError::BadParameter("null out-parameter"));
        }
        let token = session.actions.insert_list(ActionList::new());
        // SAFETY: checked non-null above.
        unsafe { write_out(out, token) }
    })
}

unsafe extern "C" fn free(list: List) -> i32 {
    guard("List.Free", |session| session.actions.take_list(list).map(drop))
}

unsafe extern "C" fn get_type(list: List, index: u32, out: *mut u32) -> i32 {
    get("List.GetType", list, index, out, |v| Ok(v.type_id()))
}

unsafe extern "C" fn get_count(list: List, out: *mut u32) -> i32 {
    guard("List.GetCount", |session| {
        let count = session.actions.list(list)?.len() as u32;
        // SAFETY: plugin-supplied out-parameter.
        unsafe { write_out(out, count) }
    })
}

unsafe extern "C" fn put_integer(list: List, value: i32) -> i32 {
    push("List.PutInteger", list, |_| Ok(ActionValue::Integer(value)))
}

unsafe extern "C" fn put_float(list: List, value: f64) -> i32 {
    push("List.PutFloat", list, |_| Ok(ActionValue::Float(value)))
}

unsafe extern "C" fn put_unit_float(list: List, unit: u32, value: f64) -> i32 {
    push("List.PutUnitFloat", list, |_| Ok(ActionValue::UnitFloat { unit, value }))
}

unsafe extern "C" fn put_string(list: List, text: *const c_char) -> i32 {
    push("List.PutString", list, |_| {
        // SAFETY: plugin-supplied string argument.
        let text = unsafe { c_str(text) }?;
        Ok(ActionValue::String(text.to_bytes().to_vec()))
    })
}

unsafe extern "C" fn put_boolean(list: List, value: u8) -> i32 {
    push("List.PutBoolean", list, |_| Ok(ActionValue::Boolean(from_bool(value))))
}

unsafe extern "C" fn put_list(list: List, nested: List) -> i32 {
    push("List.PutList", list, |session| {
        Ok(ActionValue::List(session.actions.list(nested)?.clone()))
    })
}

unsafe extern "C" fn put_object(list: List, class: u32, object: DescriptorToken) -> i32 {
    push("List.PutObject", list, |session| {
        let descriptor = session.actions.descriptor(object)?.clone();
        Ok(ActionValue::Object { class, descriptor })
    })
}

unsafe extern "C" fn put_global_object(list: List, class: u32, object: DescriptorToken) -> i32 {
    push("List.PutGlobalObject", list, |session| {
        let descriptor = session.actions.descriptor(object)?.clone();
        Ok(ActionValue::GlobalObject { class, descriptor })
    })
}

unsafe extern "C" fn put_enumerated(list: List, type_id: u32, value: u32) -> i32 {
    push("List.PutEnumerated", list, |_| Ok(ActionValue::Enumerated { type_id, value }))
}

unsafe extern "C" fn put_reference(list: List, reference: ReferenceToken) -> i32 {
    push("List.PutReference", list, |session| {
        Ok(ActionValue::Reference(session.actions.reference(reference)?.clone()))
    })
}

unsafe extern "C" fn put_class(list: List, class: u32) -> i32 {
    push("List.PutClass", list, |_| Ok(ActionValue::Class(class)))
}

unsafe extern "C" fn put_global_class(list: List, class: u32) -> i32 {
    push("List.PutGlobalClass", list, |_| Ok(ActionValue::GlobalClass(class)))
}

unsafe extern "C" fn put_alias(list: List, alias: Handle) -> i32 {
    push("List.PutAlias", list, |session| {
        Ok(ActionValue::Alias(session.handles.bytes(alias)?.to_vec()))
    })
}

unsafe extern "C" fn get_integer(list: List, index: u32, out: *mut i32) -> i32 {
    get("List.GetInteger", list, index, out, integer_of)
}

unsafe extern "C" fn get_float(list: List, index: u32, out: *mut f64) -> i32 {
    get("List.GetFloat", list, index, out, float_of)
}

unsafe extern "C" fn get_unit_float(list: List, index: u32, unit: *mut u32, out: *mut f64) -> i32 {
    guard("List.GetUnitFloat", |session| {
        let (u, v) = unit_float_of(item(session, list, index)?)?;
        if !unit.is_null() {
            // SAFETY: non-null plugin out-parameter.
            unsafe { unit.write(u) };
        }
        // SAFETY: plugin-supplied out-parameter.
        unsafe { write_out(out, v) }
    })
}

unsafe extern "C" fn get_string_length(list: List, index: u32, out: *mut u32) -> i32 {
    get("List.GetStringLength", list, index, out, |v| string_of(v).map(|s| s.len() as u32))
}

unsafe extern "C" fn get_string(list: List, index: u32, dst: *mut c_char, max_length: u32) -> i32 {
    guard("List.GetString", |session| {
        let text = string_of(item(session, list, index)?)?;
        // SAFETY: plugin buffer of `max_length` bytes.
        unsafe { copy_string_out(text, dst, max_length) }
    })
}

unsafe extern "C" fn get_boolean(list: List, index: u32, out: *mut u8) -> i32 {
    get("List.GetBoolean", list, index, out, |v| boolean_of(v).map(to_bool))
}

unsafe extern "C" fn get_list(list: List, index: u32, out: *mut List) -> i32 {
    guard("List.GetList", |session| {
        let nested = list_of(item(session, list, index)?)?.clone();
        if out.is_null() {
            return Err(SuiteError::BadParameter("null out-parameter"));
        }
        let token = session.actions.insert_list(nested);
        // SAFETY: checked non-null above.
        unsafe { write_out(out, token) }
    })
}

fn get_any_object(
    entry: &'static str,
    list: List,
    index: u32,
    global: bool,
    class: *mut u32,
    out: *mut DescriptorToken,
) -> i32 {
    guard(entry, |session| {
        let (c, d) = object_of(item(session, list, index)?, global)?;
        let object = (c, d.clone());
        // SAFETY: plugin-supplied out-parameters.
        unsafe { give_object(session, object, class, out) }
    })
}

unsafe extern "C" fn get_object(list: List, index: u32, class: *mut u32, out: *mut DescriptorToken) -> i32 {
    get_any_object("List.GetObject", list, index, false, class, out)
}

unsafe extern "C" fn get_global_object(
    list: List,
    index: u32,
    class: *mut u32,
    out: *mut DescriptorToken,
) -> i32 {
    get_any_object("List.GetGlobalObject", list, index, true, class, out)
}

unsafe extern "C" fn get_enumerated(list: List, index: u32, type_out: *mut u32, out: *mut u32) -> i32 {
    guard("List.GetEnumerated", |session| {
        let (type_id, v) = enumerated_of(item(session, list, index)?)?;
        if !type_out.is_null() {
            // SAFETY: non-null plugin out-parameter.
            unsafe { type_out.write(type_id) };
        }
        // SAFETY: plugin-supplied out-parameter.
        unsafe { write_out(out, v) }
    })
}

unsafe extern "C" fn get_reference(list: List, index: u32, out: *mut ReferenceToken) -> i32 {
    guard("List.GetReference", |session| {
        let reference = reference_of(item(session, list, index)?)?.clone();
        if out.is_null() {
            return Err(SuiteError::BadParameter("null out-parameter"));
        }
        let token = session.actions.insert_reference(reference);
        // SAFETY: checked non-null above.
        unsafe { write_out(out, token) }
    })
}

unsafe extern "C" fn get_class(list: List, index: u32, out: *mut u32) -> i32 {
    get("List.GetClass", list, index, out, |v| class_of(v, false))
}

unsafe extern "C" fn get_global_class(list: List, index: u32, out: *mut u32) -> i32 {
    get("List.GetGlobalClass", list, index, out, |v| class_of(v, true))
}

unsafe extern "C" fn get_alias(list: List, index: u32, out: *mut Handle) -> i32 {
    guard("List.GetAlias", |session| {
        let alias = alias_of(item(session, list, index)?)?.to_vec();
        // SAFETY: plugin-supplied out-parameter.
        unsafe { give_alias(session, alias, out) }
    })
}

unsafe extern "C" fn put_integers(list: List, count: u32, values: *const i32) -> i32 {
    guard("List.PutIntegers", |session| {
        // SAFETY: plugin array of `count` integers.
        let values = unsafe { integers_in(count, values) }?;
        let list = session.actions.list_mut(list)?;
        for n in values {
            list.push(ActionValue::Integer(n));
        }
        Ok(())
    })
}

unsafe extern "C" fn get_integers(list: List, count: u32, out: *mut i32) -> i32 {
    guard("List.GetIntegers", |session| {
        let values = session
            .actions
            .list(list)?
            .iter()
            .map(integer_of)
            .collect::<Result<Vec<_>, _>>()?;
        // SAFETY: plugin array of `count` integers.
        unsafe { copy_integers_out(&values, count, out) }
    })
}

unsafe extern "C" fn put_data(list: List, length: i32, data: *const c_void) -> i32 {
    push("List.PutData", list, |_| {
        let len = usize::try_from(length).map_err(|_| SuiteError::BadParameter("negative length"))?;
        // SAFETY: plugin buffer of `length` bytes.
        let data = unsafe { bytes(data.cast(), len) }?;
        Ok(ActionValue::RawData(data.to_vec()))
    })
}

unsafe extern "C" fn get_data_length(list: List, index: u32, out: *mut i32) -> i32 {
    get("List.GetDataLength", list, index, out, |v| {
        data_of(v).map(|d| i32::try_from(d.len()).unwrap_or(i32::MAX))
    })
}

unsafe extern "C" fn get_data(list: List, index: u32, dst: *mut c_void) -> i32 {
    guard("List.GetData", |session| {
        let data = data_of(item(session, list, index)?)?;
        if data.is_empty() {
            return Ok(());
        }
        if dst.is_null() {
            return Err(SuiteError::BadParameter("null data buffer"));
        }
        // SAFETY: the plugin sized `dst` from GetDataLength.
        unsafe { std::ptr::copy_nonoverlapping(data.as_ptr(), dst.cast::<u8>(), data.len()) };
        Ok(())
    })
}

unsafe extern "C" fn put_zstring(list: List, zstring: ZString) -> i32 {
    push("List.PutZString", list, |session| {
        Ok(ActionValue::String(session.zstrings.text(zstring)?.as_bytes().to_vec()))
    })
}

unsafe extern "C" fn get_zstring(list: List, index: u32, out: *mut ZString) -> i32 {
    guard("List.GetZString", |session| {
        let text = String::from_utf8_lossy(string_of(item(session, list, index)?)?).into_owned();
        if out.is_null() {
            return Err(SuiteError::BadParameter("null out-parameter"));
        }
        let zstring = session.zstrings.make(text);
        // SAFETY: checked non-null above.
        unsafe { write_out(out, zstring) }
    })
}
