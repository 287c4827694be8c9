//! Legacy `PiMI` resources.
//!
//! Filters predating property lists describe themselves with a `PIMI`
//! resource and a `_8BFM` title resource of the same name. The exported
//! entry point is named after the resource.

use super::properties::*;
use super::{DiscoveryError, ModuleScan, Rejection};
use crate::fourcc::FourCc;
use crate::pe::{ByteCursor, PeImage, ResourceId, decode_ansi};
use crate::plugin::{ImageModes, PluginDescriptor};
use std::path::Path;

/// Parse a legacy filter description.
///
/// `title` is the `_8BFM` resource with the same name, when present.
pub fn parse_pimi(
    path: &Path,
    image: &PeImage<'_>,
    name: &ResourceId,
    pimi: &[u8],
    title: Option<&[u8]>,
) -> Result<PluginDescriptor, DiscoveryError> {
    let scan = ModuleScan {
        path,
        image,
        architecture: image.architecture(),
    };
    read_pimi(&scan, name, pimi, title)
}

pub(crate) fn read_pimi(
    scan: &ModuleScan<'_>,
    name: &ResourceId,
    pimi: &[u8],
    title: Option<&[u8]>,
) -> Result<PluginDescriptor, DiscoveryError> {
    let mut cursor = ByteCursor::new(pimi);
    let _resource_version = cursor.read_i16()?;
    let category = decode_ansi(cursor.read_c_str()?);

    let version = cursor.read_i16()?;
    let sub_version = cursor.read_i16()?;
    let _priority = cursor.read_i16()?;
    let supports_mode = cursor.read_i16()?;
    let required_host = cursor.read_u32()?;

    let (major, minor) = (version as u16 as u32, sub_version as u16 as u32);
    if major > LATEST_FILTER_VERSION || (major == LATEST_FILTER_VERSION && minor > LATEST_FILTER_SUB_VERSION) {
        return Err(Rejection::Version { major, minor }.into());
    }
    if supports_mode & LEGACY_SUPPORTS_RGB == 0 {
        return Err(Rejection::NoRgbSupport.into());
    }
    if required_host != VENDOR_ADOBE && required_host != ANY_HOST {
        return Err(Rejection::Host(FourCc(required_host)).into());
    }

    let category = if category.trim().is_empty() {
        DEFAULT_CATEGORY.to_string()
    } else {
        category
    };
    if category.starts_with(HIDDEN_CATEGORY_PREFIX) {
        return Err(Rejection::Hidden.into());
    }

    let title = match title {
        Some(data) => {
            let mut cursor = ByteCursor::new(data);
            let _version = cursor.read_i16()?;
            decode_ansi(cursor.read_c_str()?)
        }
        None => scan.default_title(),
    };

    let entry_point = match name {
        ResourceId::Name(name) => name.clone(),
        ResourceId::Integer(id) => format!("ENTRYPOINT{id}"),
    };

    PluginDescriptor::builder(scan.path, entry_point, scan.architecture)
        .category(category)
        .title(title)
        .image_modes(ImageModes::from_legacy(supports_mode))
        .build()
        .map_err(|e| Rejection::Descriptor(e).into())
}
