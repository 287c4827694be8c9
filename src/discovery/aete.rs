//! Scripting terminology (`AETE`) resources.
//!
//! Only the parameter flags are kept; they decide how the action
//! descriptor suite encodes scripted parameters.

use super::properties::AETE_RESOURCE;
use crate::pe::{ByteCursor, CursorError, PeImage, ResourceId};
use crate::plugin::AeteData;
use thiserror::Error;

const AETE_RESOURCE_VERSION: i16 = 1;
const AETE_MAJOR_VERSION: u8 = 1;
const AETE_MINOR_VERSION: u8 = 0;
const SUITE_LEVEL: i16 = 1;
const SUITE_VERSION: i16 = 1;

#[derive(Debug, Error)]
enum AeteError {
    #[error("unsupported terminology version {resource}.{major}.{minor}")]
    Version { resource: i16, major: u8, minor: u8 },

    #[error("expected exactly one {0}, found {1}")]
    Count(&'static str, i16),

    #[error("unsupported suite level {0} version {1}")]
    Suite(i16, i16),

    #[error(transparent)]
    Cursor(#[from] CursorError),
}

/// Read the terminology resource `resource_id` from `image`.
///
/// Returns `None` when the resource is missing or does not match the
/// expected single-suite, single-event layout.
pub fn parse_aete(image: &PeImage<'_>, resource_id: i16) -> Option<AeteData> {
    let id = ResourceId::Integer(resource_id as u16);
    let data = match image.find_resource(AETE_RESOURCE, &id) {
        Ok(Some(data)) => data,
        Ok(None) => {
            tracing::debug!("terminology resource {} not found", id);
            return None;
        }
        Err(e) => {
            tracing::debug!("terminology resource {}: {}", id, e);
            return None;
        }
    };
    parse_aete_data(data)
}

/// Parse raw terminology resource bytes.
pub fn parse_aete_data(data: &[u8]) -> Option<AeteData> {
    match read_terminology(data) {
        Ok(aete) => Some(aete),
        Err(e) => {
            tracing::debug!("ignoring terminology: {}", e);
            None
        }
    }
}

fn read_terminology(data: &[u8]) -> Result<AeteData, AeteError> {
    let mut cursor = ByteCursor::new(data);

    let resource = cursor.read_i16()?;
    let major = cursor.read_u8()?;
    let minor = cursor.read_u8()?;
    if resource != AETE_RESOURCE_VERSION || major != AETE_MAJOR_VERSION || minor != AETE_MINOR_VERSION {
        return Err(AeteError::Version {
            resource,
            major,
            minor,
        });
    }
    cursor.skip(4)?; // language, script

    let suites = cursor.read_i16()?;
    if suites != 1 {
        return Err(AeteError::Count("suite", suites));
    }
    skip_pascal(&mut cursor)?; // vendor
    skip_pascal(&mut cursor)?; // description
    cursor.skip(4)?; // suite id
    let level = cursor.read_i16()?;
    let version = cursor.read_i16()?;
    if level != SUITE_LEVEL || version != SUITE_VERSION {
        return Err(AeteError::Suite(level, version));
    }

    let events = cursor.read_i16()?;
    if events != 1 {
        return Err(AeteError::Count("event", events));
    }
    skip_pascal(&mut cursor)?; // vendor
    skip_pascal(&mut cursor)?; // description
    cursor.skip(8)?; // class, id
    cursor.skip(4)?; // reply type
    skip_pascal(&mut cursor)?;
    cursor.skip(2)?; // reply flags
    cursor.skip(4)?; // direct parameter type
    skip_pascal(&mut cursor)?;
    cursor.skip(2)?; // direct parameter flags

    let params = cursor.read_i16()?;
    let mut aete = AeteData::new();
    for _ in 0..params.max(0) {
        skip_pascal(&mut cursor)?; // name
        let key = cursor.read_u32()?;
        cursor.skip(4)?; // type
        skip_pascal(&mut cursor)?; // description
        let flags = cursor.read_i16()?;
        aete.insert(key, flags);
    }
    Ok(aete)
}

fn skip_pascal(cursor: &mut ByteCursor<'_>) -> Result<(), CursorError> {
    cursor.read_pascal()?;
    cursor.align(2)
}
