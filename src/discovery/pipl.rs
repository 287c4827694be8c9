//! `PiPL` property lists.

use super::aete::parse_aete;
use super::filter_case::decode_filter_case_info;
use super::properties::*;
use super::{DiscoveryError, ModuleScan, Rejection};
use crate::fourcc::FourCc;
use crate::pe::{ByteCursor, PeImage, decode_ansi};
use crate::plugin::{FilterCaseTable, ImageModes, PluginDescriptor};
use std::path::Path;

const PIPL_RESOURCE_VERSION: i16 = 1;
const PIPL_LIST_VERSION: i32 = 0;
/// Offset of the terminology resource id inside `hstm` data.
const HSTM_TERMINOLOGY_ID_OFFSET: usize = 12;

/// Parse one property list from a module.
///
/// The entry point read is the one for the module's own architecture, which
/// is the architecture of the process that will execute it.
pub fn parse_pipl(path: &Path, image: &PeImage<'_>, data: &[u8]) -> Result<PluginDescriptor, DiscoveryError> {
    let scan = ModuleScan {
        path,
        image,
        architecture: image.architecture(),
    };
    read_pipl(&scan, data)
}

#[derive(Default)]
struct Properties {
    kind: Option<u32>,
    version: Option<u32>,
    modes: Option<u16>,
    category: Option<String>,
    title: Option<String>,
    entry_point: Option<String>,
    filter_case: Option<FilterCaseTable>,
    terminology: Option<i16>,
    enable_info: Option<String>,
    required_host: Option<u32>,
}

pub(crate) fn read_pipl(scan: &ModuleScan<'_>, data: &[u8]) -> Result<PluginDescriptor, DiscoveryError> {
    let mut cursor = ByteCursor::new(data);
    let resource_version = cursor.read_i16()?;
    if resource_version != PIPL_RESOURCE_VERSION {
        return Err(DiscoveryError::ResourceVersion(resource_version.into()));
    }
    let list_version = cursor.read_i32()?;
    if list_version != PIPL_LIST_VERSION {
        return Err(DiscoveryError::ResourceVersion(list_version));
    }
    let count = cursor.read_i32()?;

    let entry_key = entry_point_key(scan.architecture);
    let mut props = Properties::default();

    for _ in 0..count.max(0) {
        let vendor = cursor.read_u32()?;
        let key = cursor.read_u32()?;
        let _id = cursor.read_i32()?;
        let length = cursor.read_i32()?;
        let value = cursor.take_len(length)?;
        cursor.align(4)?;

        if vendor != VENDOR_ADOBE {
            continue;
        }

        let mut field = ByteCursor::new(value);
        match key {
            KIND => props.kind = Some(field.read_u32()?),
            VERSION => props.version = Some(field.read_u32()?),
            IMAGE_MODES => props.modes = Some(field.read_u16()?),
            CATEGORY => props.category = Some(decode_ansi(field.read_pascal()?)),
            NAME => props.title = Some(decode_ansi(field.read_pascal()?)),
            REQUIRED_HOST => props.required_host = Some(field.read_u32()?),
            ENABLE_INFO => props.enable_info = Some(decode_ansi(c_text(value))),
            HAS_TERMINOLOGY => {
                field.seek(HSTM_TERMINOLOGY_ID_OFFSET)?;
                props.terminology = Some(field.read_i16()?);
            }
            FILTER_CASE_INFO => match decode_filter_case_info(value) {
                Ok(table) => props.filter_case = Some(table),
                Err(e) => tracing::warn!("{}: ignoring filter case info: {}", scan.path.display(), e),
            },
            k if Some(k) == entry_key => {
                props.entry_point = Some(decode_ansi(c_text(value)));
            }
            _ => {}
        }
    }

    validate(scan, props)
}

fn validate(scan: &ModuleScan<'_>, props: Properties) -> Result<PluginDescriptor, DiscoveryError> {
    let kind = props.kind.unwrap_or_default();
    if kind != FILTER_KIND {
        return Err(Rejection::Kind(FourCc(kind)).into());
    }

    if let Some(version) = props.version {
        let (major, minor) = (version >> 16, version & 0xFFFF);
        if major > LATEST_FILTER_VERSION || (major == LATEST_FILTER_VERSION && minor > LATEST_FILTER_SUB_VERSION) {
            return Err(Rejection::Version { major, minor }.into());
        }
    }

    let modes = ImageModes::from_bits(props.modes.unwrap_or_default());
    if !modes.contains(ImageModes::RGB) {
        return Err(Rejection::NoRgbSupport.into());
    }

    if let Some(host) = props.required_host {
        if host != VENDOR_ADOBE && host != ANY_HOST {
            return Err(Rejection::Host(FourCc(host)).into());
        }
    }

    let category = props
        .category
        .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());
    if category.starts_with(HIDDEN_CATEGORY_PREFIX) {
        return Err(Rejection::Hidden.into());
    }

    let entry_point = props
        .entry_point
        .ok_or(Rejection::NoEntryPoint(scan.architecture))?;
    let title = props.title.unwrap_or_else(|| scan.default_title());
    let aete = props
        .terminology
        .and_then(|id| parse_aete(scan.image, id));

    PluginDescriptor::builder(scan.path, entry_point, scan.architecture)
        .category(category)
        .title(title)
        .image_modes(modes)
        .filter_case_info(props.filter_case)
        .aete(aete)
        .enable_info(props.enable_info)
        .build()
        .map_err(|e| Rejection::Descriptor(e).into())
}

/// Bytes of a C string property, tolerating a missing terminator.
fn c_text(value: &[u8]) -> &[u8] {
    ByteCursor::new(value).read_c_str().unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::Architecture;
    use crate::fourcc::fourcc;
    use crate::pe::ResourceId;
    use crate::plugin::{AETE_FLAG_IS_ARRAY, FilterCase};
    use crate::testing::{AeteBuilder, PeBuilder, PiplBuilder};

    fn parse(arch: Architecture, pipl: &PiplBuilder) -> Result<PluginDescriptor, DiscoveryError> {
        let image_bytes = PeBuilder::new(arch)
            .resource("AETE", ResourceId::Integer(16000), AeteBuilder::new().param("Points", fourcc(b"Pnts"), AETE_FLAG_IS_ARRAY).build())
            .build();
        let image = PeImage::parse(&image_bytes).unwrap();
        parse_pipl(Path::new("/plugins/Sharpen Pro.8bf"), &image, &pipl.build())
    }

    #[test]
    fn test_valid_filter() {
        let pipl = PiplBuilder::filter("Sharpen More", "Sharpen", Architecture::X64, "SharpenMain")
            .terminology(16000)
            .enable_info("PSHOP_ImageDepth == 8");
        let d = parse(Architecture::X64, &pipl).unwrap();
        assert_eq!(d.title(), "Sharpen More");
        assert_eq!(d.category(), "Sharpen");
        assert_eq!(d.entry_point(), "SharpenMain");
        assert_eq!(d.architecture(), Architecture::X64);
        assert!(d.image_modes().contains(ImageModes::RGB));
        assert!(d.aete().unwrap().is_array(fourcc(b"Pnts")));
        assert_eq!(d.enable_info(), Some("PSHOP_ImageDepth == 8"));
    }

    #[test]
    fn test_entry_point_follows_module_architecture() {
        let pipl = PiplBuilder::filter("Blur", "Blur", Architecture::X86, "Blur32")
            .entry_point(Architecture::X64, "Blur64");
        assert_eq!(parse(Architecture::X86, &pipl).unwrap().entry_point(), "Blur32");
        assert_eq!(parse(Architecture::X64, &pipl).unwrap().entry_point(), "Blur64");
        assert!(matches!(
            parse(Architecture::Arm64, &pipl),
            Err(DiscoveryError::Rejected(Rejection::NoEntryPoint(Architecture::Arm64)))
        ));
    }

    #[test]
    fn test_defaults_for_missing_category_and_title() {
        let pipl = PiplBuilder::new()
            .kind(FILTER_KIND)
            .modes(ImageModes::RGB.bits())
            .entry_point(Architecture::X64, "Main");
        let d = parse(Architecture::X64, &pipl).unwrap();
        assert_eq!(d.category(), DEFAULT_CATEGORY);
        assert_eq!(d.title(), "Sharpen Pro");
    }

    #[test]
    fn test_rejections() {
        let base = || PiplBuilder::filter("T", "C", Architecture::X64, "Main");

        let wrong_kind = PiplBuilder::new()
            .kind(fourcc(b"8BEF"))
            .modes(ImageModes::RGB.bits())
            .entry_point(Architecture::X64, "Main");
        assert!(matches!(
            parse(Architecture::X64, &wrong_kind),
            Err(DiscoveryError::Rejected(Rejection::Kind(_)))
        ));
        assert!(matches!(
            parse(Architecture::X64, &base().version(4, 1)),
            Err(DiscoveryError::Rejected(Rejection::Version { major: 4, minor: 1 }))
        ));
        assert!(matches!(
            parse(Architecture::X64, &base().required_host(fourcc(b"PSP "))),
            Err(DiscoveryError::Rejected(Rejection::Host(_)))
        ));
        assert!(parse(Architecture::X64, &base().required_host(ANY_HOST)).is_ok());

        let hidden = PiplBuilder::filter("T", "**Hidden**", Architecture::X64, "Main");
        assert!(matches!(
            parse(Architecture::X64, &hidden),
            Err(DiscoveryError::Rejected(Rejection::Hidden))
        ));

        let gray_only = PiplBuilder::new()
            .kind(FILTER_KIND)
            .modes(ImageModes::GRAYSCALE.bits())
            .entry_point(Architecture::X64, "Main");
        assert!(matches!(
            parse(Architecture::X64, &gray_only),
            Err(DiscoveryError::Rejected(Rejection::NoRgbSupport))
        ));

        let blank_title = PiplBuilder::filter("   ", "C", Architecture::X64, "Main");
        assert!(matches!(
            parse(Architecture::X64, &blank_title),
            Err(DiscoveryError::Rejected(Rejection::Descriptor(_)))
        ));
    }

    #[test]
    fn test_foreign_vendor_skipped_by_padded_length() {
        let pipl = PiplBuilder::new()
            .foreign_property(fourcc(b"ACME"), KIND, vec![1, 2, 3, 4, 5])
            .kind(FILTER_KIND)
            .modes(ImageModes::RGB.bits())
            .name("After Foreign")
            .entry_point(Architecture::X64, "Main");
        assert_eq!(parse(Architecture::X64, &pipl).unwrap().title(), "After Foreign");
    }

    #[test]
    fn test_bad_filter_case_keeps_descriptor() {
        let pipl = PiplBuilder::filter("T", "C", Architecture::X64, "Main")
            .filter_case_text("\\x01\\x02");
        let d = parse(Architecture::X64, &pipl).unwrap();
        assert!(d.filter_case_info().is_none());

        let table = [[1, 1, 0, 0], [1, 1, 0, 0], [1, 1, 0, 0], [2, 1, 0, 0], [2, 1, 0, 0], [1, 1, 0, 0], [1, 1, 0, 0]];
        let d = parse(Architecture::X64, &PiplBuilder::filter("T", "C", Architecture::X64, "Main").filter_case_info(&table)).unwrap();
        assert!(d.filter_case_info().unwrap().get(FilterCase::EditableTransparencyNoSelection).is_supported());
    }

    #[test]
    fn test_every_truncation_fails_cleanly() {
        let data = PiplBuilder::filter("Truncate Me", "Tests", Architecture::X64, "Main").build();
        let image_bytes = PeBuilder::new(Architecture::X64).build();
        let image = PeImage::parse(&image_bytes).unwrap();
        for len in 0..data.len() {
            let result = parse_pipl(Path::new("/t.8bf"), &image, &data[..len]);
            assert!(result.is_err(), "prefix of {len} bytes parsed");
        }
    }

    #[test]
    fn test_bad_versions() {
        let mut data = PiplBuilder::filter("T", "C", Architecture::X64, "Main").build();
        data[0] = 2;
        assert!(matches!(
            parse_pipl(Path::new("/t.8bf"), &PeImage::parse(&PeBuilder::new(Architecture::X64).build()).unwrap(), &data),
            Err(DiscoveryError::ResourceVersion(2))
        ));
    }
}
