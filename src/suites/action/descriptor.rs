//! `PSActionDescriptorProcs` version 2.

use super::*;
use crate::suites::error::SuiteError;
use crate::suites::ffi::{bytes, c_str, from_bool, to_bool, write_out};
use crate::suites::handle::Handle;
use crate::suites::session::{SuiteSession, guard};
use crate::suites::zstring::ZString;
use std::ffi::{c_char, c_void};

type Desc = DescriptorToken;

/// `PSActionDescriptorProcs`.
#[repr(C)]
pub struct PSActionDescriptorProcs {
    /// `Make(&descriptor)`.
    pub make: unsafe extern "C" fn(*mut Desc) -> i32,
    /// `Free(descriptor)`.
    pub free: unsafe extern "C" fn(Desc) -> i32,
    /// `GetType(descriptor, key, &type)`.
    pub get_type: unsafe extern "C" fn(Desc, u32, *mut u32) -> i32,
    /// `GetKey(descriptor, index, &key)`.
    pub get_key: unsafe extern "C" fn(Desc, u32, *mut u32) -> i32,
    /// `HasKey(descriptor, key, &hasKey)`.
    pub has_key: unsafe extern "C" fn(Desc, u32, *mut u8) -> i32,
    /// `GetCount(descriptor, &count)`.
    pub get_count: unsafe extern "C" fn(Desc, *mut u32) -> i32,
    /// `IsEqual(descriptor, other, &isEqual)`.
    pub is_equal: unsafe extern "C" fn(Desc, Desc, *mut u8) -> i32,
    /// `Erase(descriptor, key)`.
    pub erase: unsafe extern "C" fn(Desc, u32) -> i32,
    /// `Clear(descriptor)`.
    pub clear: unsafe extern "C" fn(Desc) -> i32,
    /// `PutInteger(descriptor, key, value)`.
    pub put_integer: unsafe extern "C" fn(Desc, u32, i32) -> i32,
    /// `PutFloat(descriptor, key, value)`.
    pub put_float: unsafe extern "C" fn(Desc, u32, f64) -> i32,
    /// `PutUnitFloat(descriptor, key, unit, value)`.
    pub put_unit_float: unsafe extern "C" fn(Desc, u32, u32, f64) -> i32,
    /// `PutString(descriptor, key, cstr)`.
    pub put_string: unsafe extern "C" fn(Desc, u32, *const c_char) -> i32,
    /// `PutBoolean(descriptor, key, value)`.
    pub put_boolean: unsafe extern "C" fn(Desc, u32, u8) -> i32,
    /// `PutList(descriptor, key, list)`.
    pub put_list: unsafe extern "C" fn(Desc, u32, ListToken) -> i32,
    /// `PutObject(descriptor, key, class, object)`.
    pub put_object: unsafe extern "C" fn(Desc, u32, u32, Desc) -> i32,
    /// `PutGlobalObject(descriptor, key, class, object)`.
    pub put_global_object: unsafe extern "C" fn(Desc, u32, u32, Desc) -> i32,
    /// `PutEnumerated(descriptor, key, type, value)`.
    pub put_enumerated: unsafe extern "C" fn(Desc, u32, u32, u32) -> i32,
    /// `PutReference(descriptor, key, reference)`.
    pub put_reference: unsafe extern "C" fn(Desc, u32, ReferenceToken) -> i32,
    /// `PutClass(descriptor, key, class)`.
    pub put_class: unsafe extern "C" fn(Desc, u32, u32) -> i32,
    /// `PutGlobalClass(descriptor, key, class)`.
    pub put_global_class: unsafe extern "C" fn(Desc, u32, u32) -> i32,
    /// `PutAlias(descriptor, key, handle)`.
    pub put_alias: unsafe extern "C" fn(Desc, u32, Handle) -> i32,
    /// `GetInteger(descriptor, key, &value)`.
    pub get_integer: unsafe extern "C" fn(Desc, u32, *mut i32) -> i32,
    /// `GetFloat(descriptor, key, &value)`.
    pub get_float: unsafe extern "C" fn(Desc, u32, *mut f64) -> i32,
    /// `GetUnitFloat(descriptor, key, &unit, &value)`.
    pub get_unit_float: unsafe extern "C" fn(Desc, u32, *mut u32, *mut f64) -> i32,
    /// `GetStringLength(descriptor, key, &length)`.
    pub get_string_length: unsafe extern "C" fn(Desc, u32, *mut u32) -> i32,
    /// `GetString(descriptor, key, buffer, maxLength)`.
    pub get_string: unsafe extern "C" fn(Desc, u32, *mut c_char, u32) -> i32,
    /// `GetBoolean(descriptor, key, &value)`.
    pub get_boolean: unsafe extern "C" fn(Desc, u32, *mut u8) -> i32,
    /// `GetList(descriptor, key, &list)`.
    pub get_list: unsafe extern "C" fn(Desc, u32, *mut ListToken) -> i32,
    /// `GetObject(descriptor, key, &class, &object)`.
    pub get_object: unsafe extern "C" fn(Desc, u32, *mut u32, *mut Desc) -> i32,
    /// `GetGlobalObject(descriptor, key, &class, &object)`.
    pub get_global_object: unsafe extern "C" fn(Desc, u32, *mut u32, *mut Desc) -> i32,
    /// `GetEnumerated(descriptor, key, &type, &value)`.
    pub get_enumerated: unsafe extern "C" fn(Desc, u32, *mut u32, *mut u32) -> i32,
    /// `GetReference(descriptor, key, &reference)`.
    pub get_reference: unsafe extern "C" fn(Desc, u32, *mut ReferenceToken) -> i32,
    /// `GetClass(descriptor, key, &class)`.
    pub get_class: unsafe extern "C" fn(Desc, u32, *mut u32) -> i32,
    /// `GetGlobalClass(descriptor, key, &class)`.
    pub get_global_class: unsafe extern "C" fn(Desc, u32, *mut u32) -> i32,
    /// `GetAlias(descriptor, key, &handle)`.
    pub get_alias: unsafe extern "C" fn(Desc, u32, *mut Handle) -> i32,
    /// `HasKeys(descriptor, zeroTerminatedKeys, &hasKeys)`.
    pub has_keys: unsafe extern "C" fn(Desc, *const u32, *mut u8) -> i32,
    /// `PutIntegers(descriptor, key, count, values)`.
    pub put_integers: unsafe extern "C" fn(Desc, u32, u32, *const i32) -> i32,
    /// `GetIntegers(descriptor, key, count, values)`.
    pub get_integers: unsafe extern "C" fn(Desc, u32, u32, *mut i32) -> i32,
    /// `AsHandle(descriptor, &handle)`.
    pub as_handle: unsafe extern "C" fn(Desc, *mut Handle) -> i32,
    /// `HandleToDescriptor(handle, &descriptor)`.
    pub handle_to_descriptor: unsafe extern "C" fn(Handle, *mut Desc) -> i32,
    /// `PutZString(descriptor, key, zstring)`.
    pub put_zstring: unsafe extern "C" fn(Desc, u32, ZString) -> i32,
    /// `GetZString(descriptor, key, &zstring)`.
    pub get_zstring: unsafe extern "C" fn(Desc, u32, *mut ZString) -> i32,
    /// `PutData(descriptor, key, length, data)`.
    pub put_data: unsafe extern "C" fn(Desc, u32, i32, *const c_void) -> i32,
    /// `GetDataLength(descriptor, key, &length)`.
    pub get_data_length: unsafe extern "C" fn(Desc, u32, *mut i32) -> i32,
    /// `GetData(descriptor, key, data)`.
    pub get_data: unsafe extern "C" fn(Desc, u32, *mut c_void) -> i32,
}

/// The action descriptor suite table.
pub static ACTION_DESCRIPTOR_SUITE: PSActionDescriptorProcs = PSActionDescriptorProcs {
    make,
    free,
    get_type,
    get_key,
    has_key,
    get_count,
    is_equal,
    erase,
    clear,
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
    has_keys,
    put_integers,
    get_integers,
    as_handle,
    handle_to_descriptor,
    put_zstring,
    get_zstring,
    put_data,
    get_data_length,
    get_data,
};

fn value(session: &SuiteSession, descriptor: Desc, key: u32) -> Result<&ActionValue, SuiteError> {
    session
        .actions
        .descriptor(descriptor)?
        .get(key)
        .ok_or(SuiteError::MissingParameter)
}

fn put(entry: &'static str, descriptor: Desc, key: u32, f: impl FnOnce(&mut SuiteSession) -> Result<ActionValue, SuiteError>) -> i32 {
    guard(entry, |session| {
        let value = f(session)?;
        let target = session.actions.descriptor_mut(descriptor)?;
        target.put(key, value);
        if let Some(aete) = &session.aete {
            target.apply_terminology(aete);
        }
        Ok(())
    })
}

fn get<T>(
    entry: &'static str,
    descriptor: Desc,
    key: u32,
    out: *mut T,
    f: impl FnOnce(&ActionValue) -> Result<T, SuiteError>,
) -> i32 {
    guard(entry, |session| {
        let v = f(value(session, descriptor, key)?)?;
        // SAFETY: plugin-supplied out-parameter.
        unsafe { write_out(out, v) }
    })
}

unsafe extern "C" fn make(out: *mut Desc) -> i32 {
    guard("Descriptor.Make", |session| {
        if out.is_null() {
            return Err(SuiteError::BadParameter("null out-parameter"));
        }
        let token = session.actions.insert_descriptor(ActionDescriptor::new());
        // SAFETY: checked non-null above.
        unsafe { write_out(out, token) }
    })
}

unsafe extern "C" fn free(descriptor: Desc) -> i32 {
    guard("Descriptor.Free", |session| {
        session.actions.take_descriptor(descriptor).map(drop)
    })
}

unsafe extern "C" fn get_type(descriptor: Desc, key: u32, out: *mut u32) -> i32 {
    get("Descriptor.GetType", descriptor, key, out, |v| Ok(v.type_id()))
}

unsafe extern "C" fn get_key(descriptor: Desc, index: u32, out: *mut u32) -> i32 {
    guard("Descriptor.GetKey", |session| {
        let key = session
            .actions
            .descriptor(descriptor)?
            .key_at(index as usize)
            .ok_or(SuiteError::BadParameter("key index out of range"))?;
        // SAFETY: plugin-supplied out-parameter.
        unsafe { write_out(out, key) }
    })
}

unsafe extern "C" fn has_key(descriptor: Desc, key: u32, out: *mut u8) -> i32 {
    guard("Descriptor.HasKey", |session| {
        let present = session.actions.descriptor(descriptor)?.contains(key);
        // SAFETY: plugin-supplied out-parameter.
        unsafe { write_out(out, to_bool(present)) }
    })
}

unsafe extern "C" fn get_count(descriptor: Desc, out: *mut u32) -> i32 {
    guard("Descriptor.GetCount", |session| {
        let count = session.actions.descriptor(descriptor)?.len() as u32;
        // SAFETY: plugin-supplied out-parameter.
        unsafe { write_out(out, count) }
    })
}

unsafe extern "C" fn is_equal(descriptor: Desc, other: Desc, out: *mut u8) -> i32 {
    guard("Descriptor.IsEqual", |session| {
        let equal = session.actions.descriptor(descriptor)? == session.actions.descriptor(other)?;
        // SAFETY: plugin-supplied out-parameter.
        unsafe { write_out(out, to_bool(equal)) }
    })
}

unsafe extern "C" fn erase(descriptor: Desc, key: u32) -> i32 {
    guard("Descriptor.Erase", |session| {
        session.actions.descriptor_mut(descriptor)?.remove(key);
        Ok(())
    })
}

unsafe extern "C" fn clear(descriptor: Desc) -> i32 {
    guard("Descriptor.Clear", |session| {
        session.actions.descriptor_mut(descriptor)?.clear();
        Ok(())
    })
}

unsafe extern "C" fn put_integer(descriptor: Desc, key: u32, value: i32) -> i32 {
    put("Descriptor.PutInteger", descriptor, key, |_| Ok(ActionValue::Integer(value)))
}

unsafe extern "C" fn put_float(descriptor: Desc, key: u32, value: f64) -> i32 {
    put("Descriptor.PutFloat", descriptor, key, |_| Ok(ActionValue::Float(value)))
}

unsafe extern "C" fn put_unit_float(descriptor: Desc, key: u32, unit: u32, value: f64) -> i32 {
    put("Descriptor.PutUnitFloat", descriptor, key, |_| {
        Ok(ActionValue::UnitFloat { unit, value })
    })
}

unsafe extern "C" fn put_string(descriptor: Desc, key: u32, text: *const c_char) -> i32 {
    put("Descriptor.PutString", descriptor, key, |_| {
        // SAFETY: plugin-supplied string argument.
        let text = unsafe { c_str(text) }?;
        Ok(ActionValue::String(text.to_bytes().to_vec()))
    })
}

unsafe extern "C" fn put_boolean(descriptor: Desc, key: u32, value: u8) -> i32 {
    put("Descriptor.PutBoolean", descriptor, key, |_| Ok(ActionValue::Boolean(from_bool(value))))
}

unsafe extern "C" fn put_list(descriptor: Desc, key: u32, list: ListToken) -> i32 {
    put("Descriptor.PutList", descriptor, key, |session| {
        Ok(ActionValue::List(session.actions.list(list)?.clone()))
    })
}

unsafe extern "C" fn put_object(descriptor: Desc, key: u32, class: u32, object: Desc) -> i32 {
    put("Descriptor.PutObject", descriptor, key, |session| {
        let descriptor = session.actions.descriptor(object)?.clone();
        Ok(ActionValue::Object { class, descriptor })
    })
}

unsafe extern "C" fn put_global_object(descriptor: Desc, key: u32, class: u32, object: Desc) -> i32 {
    put("Descriptor.PutGlobalObject", descriptor, key, |session| {
        let descriptor = session.actions.descriptor(object)?.clone();
        Ok(ActionValue::GlobalObject { class, descriptor })
    })
}

unsafe extern "C" fn put_enumerated(descriptor: Desc, key: u32, type_id: u32, value: u32) -> i32 {
    put("Descriptor.PutEnumerated", descriptor, key, |_| {
        Ok(ActionValue::Enumerated { type_id, value })
    })
}

unsafe extern "C" fn put_reference(descriptor: Desc, key: u32, reference: ReferenceToken) -> i32 {
    put("Descriptor.PutReference", descriptor, key, |session| {
        Ok(ActionValue::Reference(session.actions.reference(reference)?.clone()))
    })
}

unsafe extern "C" fn put_class(descriptor: Desc, key: u32, class: u32) -> i32 {
    put("Descriptor.PutClass", descriptor, key, |_| Ok(ActionValue::Class(class)))
}

unsafe extern "C" fn put_global_class(descriptor: Desc, key: u32, class: u32) -> i32 {
    put("Descriptor.PutGlobalClass", descriptor, key, |_| Ok(ActionValue::GlobalClass(class)))
}

unsafe extern "C" fn put_alias(descriptor: Desc, key: u32, alias: Handle) -> i32 {
    put("Descriptor.PutAlias", descriptor, key, |session| {
        Ok(ActionValue::Alias(session.handles.bytes(alias)?.to_vec()))
    })
}

unsafe extern "C" fn get_integer(descriptor: Desc, key: u32, out: *mut i32) -> i32 {
    get("Descriptor.GetInteger", descriptor, key, out, integer_of)
}

unsafe extern "C" fn get_float(descriptor: Desc, key: u32, out: *mut f64) -> i32 {
    get("Descriptor.GetFloat", descriptor, key, out, float_of)
}

unsafe extern "C" fn get_unit_float(descriptor: Desc, key: u32, unit: *mut u32, out: *mut f64) -> i32 {
    guard("Descriptor.GetUnitFloat", |session| {
        let (u, v) = unit_float_of(value(session, descriptor, key)?)?;
        if !unit.is_null() {
            // SAFETY: non-null plugin out-parameter.
            unsafe { unit.write(u) };
        }
        // SAFETY: plugin-supplied out-parameter.
        unsafe { write_out(out, v) }
    })
}

unsafe extern "C" fn get_string_length(descriptor: Desc, key: u32, out: *mut u32) -> i32 {
    get("Descriptor.GetStringLength", descriptor, key, out, |v| {
        string_of(v).map(|s| s.len() as u32)
    })
}

unsafe extern "C" fn get_string(descriptor: Desc, key: u32, dst: *mut c_char, max_length: u32) -> i32 {
    guard("Descriptor.GetString", |session| {
        let text = string_of(value(session, descriptor, key)?)?;
        // SAFETY: plugin buffer of `max_length` bytes.
        unsafe { copy_string_out(text, dst, max_length) }
    })
}

unsafe extern "C" fn get_boolean(descriptor: Desc, key: u32, out: *mut u8) -> i32 {
    get("Descriptor.GetBoolean", descriptor, key, out, |v| boolean_of(v).map(to_bool))
}

unsafe extern "C" fn get_list(descriptor: Desc, key: u32, out: *mut ListToken) -> i32 {
    guard("Descriptor.GetList", |session| {
        let list = list_of(value(session, descriptor, key)?)?.clone();
        if out.is_null() {
            return Err(SuiteError::BadParameter("null out-parameter"));
        }
        let token = session.actions.insert_list(list);
        // SAFETY: checked non-null above.
        unsafe { write_out(out, token) }
    })
}

fn get_any_object(entry: &'static str, descriptor: Desc, key: u32, global: bool, class: *mut u32, out: *mut Desc) -> i32 {
    guard(entry, |session| {
        let (c, d) = object_of(value(session, descriptor, key)?, global)?;
        let object = (c, d.clone());
        // SAFETY: plugin-supplied out-parameters.
        unsafe { give_object(session, object, class, out) }
    })
}

unsafe extern "C" fn get_object(descriptor: Desc, key: u32, class: *mut u32, out: *mut Desc) -> i32 {
    get_any_object("Descriptor.GetObject", descriptor, key, false, class, out)
}

unsafe extern "C" fn get_global_object(descriptor: Desc, key: u32, class: *mut u32, out: *mut Desc) -> i32 {
    get_any_object("Descriptor.GetGlobalObject", descriptor, key, true, class, out)
}

unsafe extern "C" fn get_enumerated(descriptor: Desc, key: u32, type_out: *mut u32, out: *mut u32) -> i32 {
    guard("Descriptor.GetEnumerated", |session| {
        let (type_id, v) = enumerated_of(value(session, descriptor, key)?)?;
        if !type_out.is_null() {
            // SAFETY: non-null plugin out-parameter.
            unsafe { type_out.write(type_id) };
        }
        // SAFETY: plugin-supplied out-parameter.
        unsafe { write_out(out, v) }
    })
}

unsafe extern "C" fn get_reference(descriptor: Desc, key: u32, out: *mut ReferenceToken) -> i32 {
    guard("Descriptor.GetReference", |session| {
        let reference = reference_of(value(session, descriptor, key)?)?.clone();
        if out.is_null() {
            return Err(SuiteError::BadParameter("null out-parameter"));
        }
        let token = session.actions.insert_reference(reference);
        // SAFETY: checked non-null above.
        unsafe { write_out(out, token) }
    })
}

unsafe extern "C" fn get_class(descriptor: Desc, key: u32, out: *mut u32) -> i32 {
    get("Descriptor.GetClass", descriptor, key, out, |v| class_of(v, false))
}

unsafe extern "C" fn get_global_class(descriptor: Desc, key: u32, out: *mut u32) -> i32 {
    get("Descriptor.GetGlobalClass", descriptor, key, out, |v| class_of(v, true))
}

unsafe extern "C" fn get_alias(descriptor: Desc, key: u32, out: *mut Handle) -> i32 {
    guard("Descriptor.GetAlias", |session| {
        let alias = alias_of(value(session, descriptor, key)?)?.to_vec();
        // SAFETY: plugin-supplied out-parameter.
        unsafe { give_alias(session, alias, out) }
    })
}

unsafe extern "C" fn has_keys(descriptor: Desc, keys: *const u32, out: *mut u8) -> i32 {
    guard("Descriptor.HasKeys", |session| {
        if keys.is_null() {
            return Err(SuiteError::BadParameter("null key array"));
        }
        let d = session.actions.descriptor(descriptor)?;
        let mut all = true;
        let mut at = keys;
        loop {
            // SAFETY: the array is zero-terminated per the suite contract.
            let key = unsafe { at.read() };
            if key == 0 {
                break;
            }
            all &= d.contains(key);
            // SAFETY: not past the terminator.
            at = unsafe { at.add(1) };
        }
        // SAFETY: plugin-supplied out-parameter.
        unsafe { write_out(out, to_bool(all)) }
    })
}

unsafe extern "C" fn put_integers(descriptor: Desc, key: u32, count: u32, values: *const i32) -> i32 {
    put("Descriptor.PutIntegers", descriptor, key, |_| {
        // SAFETY: plugin array of `count` integers.
        let values = unsafe { integers_in(count, values) }?;
        Ok(ActionValue::List(
            values.into_iter().map(ActionValue::Integer).collect::<Vec<_>>().into(),
        ))
    })
}

unsafe extern "C" fn get_integers(descriptor: Desc, key: u32, count: u32, out: *mut i32) -> i32 {
    guard("Descriptor.GetIntegers", |session| {
        let values = integers_of(value(session, descriptor, key)?)?;
        // SAFETY: plugin array of `count` integers.
        unsafe { copy_integers_out(&values, count, out) }
    })
}

unsafe extern "C" fn as_handle(descriptor: Desc, out: *mut Handle) -> i32 {
    guard("Descriptor.AsHandle", |session| {
        if out.is_null() {
            return Err(SuiteError::BadParameter("null out-parameter"));
        }
        let encoded = encode_descriptor(session.actions.descriptor(descriptor)?);
        let handle = session.handles.from_bytes(&encoded)?;
        // SAFETY: checked non-null above.
        unsafe { write_out(out, handle) }
    })
}

unsafe extern "C" fn handle_to_descriptor(handle: Handle, out: *mut Desc) -> i32 {
    guard("Descriptor.HandleToDescriptor", |session| {
        if out.is_null() {
            return Err(SuiteError::BadParameter("null out-parameter"));
        }
        let mut decoded = decode_descriptor(session.handles.bytes(handle)?).map_err(|e| {
            tracing::debug!("HandleToDescriptor: {}", e);
            SuiteError::BadParameter("malformed descriptor handle")
        })?;
        if let Some(aete) = &session.aete {
            decoded.apply_terminology(aete);
        }
        let token = session.actions.insert_descriptor(decoded);
        // SAFETY: checked non-null above.
        unsafe { write_out(out, token) }
    })
}

unsafe extern "C" fn put_zstring(descriptor: Desc, key: u32, zstring: ZString) -> i32 {
    put("Descriptor.PutZString", descriptor, key, |session| {
        Ok(ActionValue::String(session.zstrings.text(zstring)?.as_bytes().to_vec()))
    })
}

unsafe extern "C" fn get_zstring(descriptor: Desc, key: u32, out: *mut ZString) -> i32 {
    guard("Descriptor.GetZString", |session| {
        let text = String::from_utf8_lossy(string_of(value(session, descriptor, key)?)?).into_owned();
        if out.is_null() {
            return Err(SuiteError::BadParameter("null out-parameter"));
        }
        let zstring = session.zstrings.make(text);
        // SAFETY: checked non-null above.
        unsafe { write_out(out, zstring) }
    })
}

unsafe extern "C" fn put_data(descriptor: Desc, key: u32, length: i32, data: *const c_void) -> i32 {
    put("Descriptor.PutData", descriptor, key, |_| {
        let len = usize::try_from(length).map_err(|_| SuiteError::BadParameter("negative length"))?;
        // SAFETY: plugin buffer of `length` bytes.
        let data = unsafe { bytes(data.cast(), len) }?;
        Ok(ActionValue::RawData(data.to_vec()))
    })
}

unsafe extern "C" fn get_data_length(descriptor: Desc, key: u32, out: *mut i32) -> i32 {
    get("Descriptor.GetDataLength", descriptor, key, out, |v| {
        data_of(v).map(|d| i32::try_from(d.len()).unwrap_or(i32::MAX))
    })
}

unsafe extern "C" fn get_data(descriptor: Desc, key: u32, dst: *mut c_void) -> i32 {
    guard("Descriptor.GetData", |session| {
        let data = data_of(value(session, descriptor, key)?)?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fourcc::fourcc;
    use crate::plugin::{AETE_FLAG_IS_ARRAY, AeteData};
    use crate::suites::error::codes;
    use crate::suites::{SuiteConfig, SuiteSession};

    static S: &PSActionDescriptorProcs = &ACTION_DESCRIPTOR_SUITE;

    fn with_active<R>(f: impl FnOnce() -> R) -> R {
        let _active = SuiteSession::new(&SuiteConfig::default()).activate().unwrap();
        f()
    }

    #[test]
    fn test_put_get_scalars() {
        with_active(|| unsafe {
            let mut d: Desc = std::ptr::null_mut();
            assert_eq!((S.make)(&mut d), codes::NO_ERROR);
            assert_eq!((S.put_integer)(d, fourcc(b"Amnt"), 42), codes::NO_ERROR);
            assert_eq!((S.put_string)(d, fourcc(b"Nm  "), c"blur".as_ptr()), codes::NO_ERROR);
            assert_eq!((S.put_unit_float)(d, fourcc(b"Rds "), fourcc(b"#Pxl"), 2.5), codes::NO_ERROR);

            let mut count = 0u32;
            (S.get_count)(d, &mut count);
            assert_eq!(count, 3);

            let mut n = 0i32;
            assert_eq!((S.get_integer)(d, fourcc(b"Amnt"), &mut n), codes::NO_ERROR);
            assert_eq!(n, 42);

            let mut len = 0u32;
            (S.get_string_length)(d, fourcc(b"Nm  "), &mut len);
            assert_eq!(len, 4);
            let mut buf = [0 as c_char; 8];
            assert_eq!((S.get_string)(d, fourcc(b"Nm  "), buf.as_mut_ptr(), 8), codes::NO_ERROR);
            assert_eq!(std::ffi::CStr::from_ptr(buf.as_ptr()).to_bytes(), b"blur");

            let (mut unit, mut v) = (0u32, 0f64);
            (S.get_unit_float)(d, fourcc(b"Rds "), &mut unit, &mut v);
            assert_eq!((unit, v), (fourcc(b"#Pxl"), 2.5));

            let mut ty = 0u32;
            (S.get_type)(d, fourcc(b"Nm  "), &mut ty);
            assert_eq!(ty, TYPE_CHAR);

            assert_eq!((S.get_integer)(d, fourcc(b"none"), &mut n), codes::MISSING_PARAMETER);
            assert_eq!((S.get_float)(d, fourcc(b"Amnt"), &mut v), codes::BAD_PARAMETER);

            let keys = [fourcc(b"Amnt"), fourcc(b"Nm  "), 0];
            let mut has = 0u8;
            (S.has_keys)(d, keys.as_ptr(), &mut has);
            assert_eq!(has, 1);
            let keys = [fourcc(b"Amnt"), fourcc(b"none"), 0];
            (S.has_keys)(d, keys.as_ptr(), &mut has);
            assert_eq!(has, 0);

            assert_eq!((S.free)(d), codes::NO_ERROR);
            assert_eq!((S.free)(d), codes::BAD_PARAMETER);
        });
    }

    #[test]
    fn test_objects_are_copied() {
        with_active(|| unsafe {
            let (mut outer, mut inner) = (std::ptr::null_mut(), std::ptr::null_mut());
            (S.make)(&mut outer);
            (S.make)(&mut inner);
            (S.put_boolean)(inner, fourcc(b"Vsbl"), 1);
            (S.put_object)(outer, fourcc(b"Pstn"), fourcc(b"Pnt "), inner);
            (S.free)(inner);

            let (mut class, mut copy) = (0u32, std::ptr::null_mut());
            assert_eq!((S.get_object)(outer, fourcc(b"Pstn"), &mut class, &mut copy), codes::NO_ERROR);
            assert_eq!(class, fourcc(b"Pnt "));
            let mut visible = 0u8;
            (S.get_boolean)(copy, fourcc(b"Vsbl"), &mut visible);
            assert_eq!(visible, 1);
            assert_eq!(
                (S.get_global_object)(outer, fourcc(b"Pstn"), &mut class, &mut copy),
                codes::BAD_PARAMETER
            );
        });
    }

    #[test]
    fn test_handle_round_trip_and_integers() {
        with_active(|| unsafe {
            let mut d = std::ptr::null_mut();
            (S.make)(&mut d);
            let values = [3, 1, 4];
            (S.put_integers)(d, fourcc(b"Vals"), 3, values.as_ptr());

            let mut handle: Handle = std::ptr::null_mut();
            assert_eq!((S.as_handle)(d, &mut handle), codes::NO_ERROR);
            let mut restored = std::ptr::null_mut();
            assert_eq!((S.handle_to_descriptor)(handle, &mut restored), codes::NO_ERROR);

            let mut out = [0i32; 3];
            assert_eq!((S.get_integers)(restored, fourcc(b"Vals"), 3, out.as_mut_ptr()), codes::NO_ERROR);
            assert_eq!(out, values);
            let mut first = 0;
            (S.get_integer)(restored, fourcc(b"Vals"), &mut first);
            assert_eq!(first, 3);
            assert_eq!(
                (S.get_integers)(restored, fourcc(b"Vals"), 4, [0i32; 4].as_mut_ptr()),
                codes::BAD_PARAMETER
            );
        });
    }

    #[test]
    fn test_array_parameters_read_as_first_integer() {
        let mut aete = AeteData::new();
        aete.insert(fourcc(b"Amnt"), AETE_FLAG_IS_ARRAY);
        let mut stored = ActionDescriptor::new();
        stored.put(fourcc(b"Amnt"), ActionValue::Integer(12));
        stored.apply_terminology(&aete);

        with_active(|| unsafe {
            let token = crate::suites::session::with_session(|s| Ok(s.actions.insert_descriptor(stored)))
                .unwrap();
            let mut ty = 0u32;
            (S.get_type)(token, fourcc(b"Amnt"), &mut ty);
            assert_eq!(ty, TYPE_LIST);
            let mut n = 0;
            assert_eq!((S.get_integer)(token, fourcc(b"Amnt"), &mut n), codes::NO_ERROR);
            assert_eq!(n, 12);
        });
    }

    #[test]
    fn test_terminology_shapes_new_and_restored_descriptors() {
        let mut aete = AeteData::new();
        aete.insert(fourcc(b"Amnt"), AETE_FLAG_IS_ARRAY);
        let _active = SuiteSession::new(&SuiteConfig::default())
            .with_terminology(Some(aete))
            .activate()
            .unwrap();

        unsafe {
            let mut d: Desc = std::ptr::null_mut();
            assert_eq!((S.make)(&mut d), codes::NO_ERROR);
            assert_eq!((S.put_integer)(d, fourcc(b"Amnt"), 5), codes::NO_ERROR);
            assert_eq!((S.put_integer)(d, fourcc(b"Othr"), 6), codes::NO_ERROR);
            let mut ty = 0u32;
            (S.get_type)(d, fourcc(b"Amnt"), &mut ty);
            assert_eq!(ty, TYPE_LIST);
            (S.get_type)(d, fourcc(b"Othr"), &mut ty);
            assert_eq!(ty, TYPE_INTEGER);

            // A handle written without terminology, as a saved block would be.
            let mut plain = ActionDescriptor::new();
            plain.put(fourcc(b"Amnt"), ActionValue::Integer(9));
            let handle = crate::suites::session::with_session(|s| s.handles.from_bytes(&encode_descriptor(&plain)))
                .unwrap();

            let mut restored: Desc = std::ptr::null_mut();
            assert_eq!((S.handle_to_descriptor)(handle, &mut restored), codes::NO_ERROR);
            (S.get_type)(restored, fourcc(b"Amnt"), &mut ty);
            assert_eq!(ty, TYPE_LIST);
            let mut n = 0;
            assert_eq!((S.get_integer)(restored, fourcc(b"Amnt"), &mut n), codes::NO_ERROR);
            assert_eq!(n, 9);
        }
    }
}
