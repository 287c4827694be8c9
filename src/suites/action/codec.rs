//! Flat little-endian encoding of action descriptors.
//!
//! Used for `AsHandle`/`HandleToDescriptor` and for the persisted
//! descriptor registry. Layout: a `u32` entry count, then per entry the
//! key, the value type id and the value payload. Strings and byte blobs are
//! a `u32` length followed by the bytes.

use super::value::*;
use crate::pe::{ByteCursor, CursorError};
use thiserror::Error;

const MAGIC: &[u8; 4] = b"FBAD";
const VERSION: u32 = 1;

/// Deepest nesting of objects, lists and references that decodes.
pub const MAX_DEPTH: usize = 32;

/// Errors decoding a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Missing magic or unknown version.
    #[error("not an encoded descriptor")]
    BadHeader,

    /// Truncated or malformed data.
    #[error(transparent)]
    Cursor(#[from] CursorError),

    /// An unknown value type or reference form.
    #[error("unknown tag {0:#010x}")]
    UnknownTag(u32),

    /// Nesting exceeds [`MAX_DEPTH`].
    #[error("nesting deeper than {MAX_DEPTH}")]
    TooDeep,

    /// Bytes left over after the descriptor.
    #[error("{0} trailing bytes")]
    Trailing(usize),
}

/// Encode a descriptor.
pub fn encode_descriptor(descriptor: &ActionDescriptor) -> Vec<u8> {
    let mut out = Vec::with_capacity(64);
    out.extend_from_slice(MAGIC);
    put_u32(&mut out, VERSION);
    write_descriptor(&mut out, descriptor);
    out
}

/// Decode a descriptor produced by [`encode_descriptor`].
pub fn decode_descriptor(bytes: &[u8]) -> Result<ActionDescriptor, CodecError> {
    let mut cursor = ByteCursor::new(bytes);
    if cursor.take(4)? != MAGIC || cursor.read_u32()? != VERSION {
        return Err(CodecError::BadHeader);
    }
    let descriptor = read_descriptor(&mut cursor, 0)?;
    match cursor.remaining() {
        0 => Ok(descriptor),
        n => Err(CodecError::Trailing(n)),
    }
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    put_u32(out, bytes.len() as u32);
    out.extend_from_slice(bytes);
}

fn write_descriptor(out: &mut Vec<u8>, descriptor: &ActionDescriptor) {
    put_u32(out, descriptor.len() as u32);
    for (key, value) in descriptor.iter() {
        put_u32(out, key);
        write_value(out, value);
    }
}

fn write_value(out: &mut Vec<u8>, value: &ActionValue) {
    put_u32(out, value.type_id());
    match value {
        ActionValue::Integer(n) => out.extend_from_slice(&n.to_le_bytes()),
        ActionValue::Float(f) => out.extend_from_slice(&f.to_le_bytes()),
        ActionValue::UnitFloat { unit, value } => {
            put_u32(out, *unit);
            out.extend_from_slice(&value.to_le_bytes());
        }
        ActionValue::String(bytes) | ActionValue::Alias(bytes) | ActionValue::RawData(bytes) => {
            put_bytes(out, bytes)
        }
        ActionValue::Boolean(b) => out.push(u8::from(*b)),
        ActionValue::List(list) => {
            put_u32(out, list.len() as u32);
            for item in list.iter() {
                write_value(out, item);
            }
        }
        ActionValue::Object { class, descriptor }
        | ActionValue::GlobalObject { class, descriptor } => {
            put_u32(out, *class);
            write_descriptor(out, descriptor);
        }
        ActionValue::Enumerated { type_id, value } => {
            put_u32(out, *type_id);
            put_u32(out, *value);
        }
        ActionValue::Reference(reference) => write_reference(out, reference),
        ActionValue::Class(class) | ActionValue::GlobalClass(class) => put_u32(out, *class),
    }
}

fn write_reference(out: &mut Vec<u8>, reference: &ActionReference) {
    put_u32(out, reference.len() as u32);
    for item in reference.items() {
        put_u32(out, item.desired_class);
        put_u32(out, item.form.form_id());
        match &item.form {
            ReferenceForm::Class => {}
            ReferenceForm::Name(name) => put_bytes(out, name),
            ReferenceForm::Index(n) | ReferenceForm::Identifier(n) | ReferenceForm::Property(n) => {
                put_u32(out, *n)
            }
            ReferenceForm::Offset(n) => out.extend_from_slice(&n.to_le_bytes()),
            ReferenceForm::Enumerated { type_id, value } => {
                put_u32(out, *type_id);
                put_u32(out, *value);
            }
        }
    }
}

fn read_blob(cursor: &mut ByteCursor<'_>) -> Result<Vec<u8>, CodecError> {
    let len = cursor.read_u32()? as usize;
    Ok(cursor.take(len)?.to_vec())
}

fn read_descriptor(cursor: &mut ByteCursor<'_>, depth: usize) -> Result<ActionDescriptor, CodecError> {
    if depth > MAX_DEPTH {
        return Err(CodecError::TooDeep);
    }
    let count = cursor.read_u32()?;
    let mut descriptor = ActionDescriptor::new();
    for _ in 0..count {
        let key = cursor.read_u32()?;
        let value = read_value(cursor, depth)?;
        descriptor.put(key, value);
    }
    Ok(descriptor)
}

fn read_value(cursor: &mut ByteCursor<'_>, depth: usize) -> Result<ActionValue, CodecError> {
    let tag = cursor.read_u32()?;
    let value = match tag {
        TYPE_INTEGER => ActionValue::Integer(cursor.read_i32()?),
        TYPE_FLOAT => ActionValue::Float(cursor.read_f64()?),
        TYPE_UNIT_FLOAT => ActionValue::UnitFloat {
            unit: cursor.read_u32()?,
            value: cursor.read_f64()?,
        },
        TYPE_CHAR => ActionValue::String(read_blob(cursor)?),
        TYPE_ALIAS => ActionValue::Alias(read_blob(cursor)?),
        TYPE_RAW_DATA => ActionValue::RawData(read_blob(cursor)?),
        TYPE_BOOLEAN => ActionValue::Boolean(cursor.read_u8()? != 0),
        TYPE_LIST => {
            if depth >= MAX_DEPTH {
                return Err(CodecError::TooDeep);
            }
            let count = cursor.read_u32()?;
            let mut list = ActionList::new();
            for _ in 0..count {
                list.push(read_value(cursor, depth + 1)?);
            }
            ActionValue::List(list)
        }
        TYPE_OBJECT => ActionValue::Object {
            class: cursor.read_u32()?,
            descriptor: read_descriptor(cursor, depth + 1)?,
        },
        TYPE_GLOBAL_OBJECT => ActionValue::GlobalObject {
            class: cursor.read_u32()?,
            descriptor: read_descriptor(cursor, depth + 1)?,
        },
        TYPE_ENUMERATED => ActionValue::Enumerated {
            type_id: cursor.read_u32()?,
            value: cursor.read_u32()?,
        },
        TYPE_REFERENCE => ActionValue::Reference(read_reference(cursor)?),
        TYPE_CLASS => ActionValue::Class(cursor.read_u32()?),
        TYPE_GLOBAL_CLASS => ActionValue::GlobalClass(cursor.read_u32()?),
        other => return Err(CodecError::UnknownTag(other)),
    };
    Ok(value)
}

fn read_reference(cursor: &mut ByteCursor<'_>) -> Result<ActionReference, CodecError> {
    let count = cursor.read_u32()?;
    let mut reference = ActionReference::new();
    for _ in 0..count {
        let desired_class = cursor.read_u32()?;
        let form = match cursor.read_u32()? {
            FORM_CLASS => ReferenceForm::Class,
            FORM_NAME => ReferenceForm::Name(read_blob(cursor)?),
            FORM_INDEX => ReferenceForm::Index(cursor.read_u32()?),
            FORM_IDENTIFIER => ReferenceForm::Identifier(cursor.read_u32()?),
            FORM_OFFSET => ReferenceForm::Offset(cursor.read_i32()?),
            FORM_ENUMERATED => ReferenceForm::Enumerated {
                type_id: cursor.read_u32()?,
                value: cursor.read_u32()?,
            },
            FORM_PROPERTY => ReferenceForm::Property(cursor.read_u32()?),
            other => return Err(CodecError::UnknownTag(other)),
        };
        reference.push(ReferenceItem { desired_class, form });
    }
    Ok(reference)
}
