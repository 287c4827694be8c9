//! Property keys and constants found in filter resources.

use crate::arch::Architecture;
use crate::fourcc::fourcc;

/// Vendor of every property the host interprets.
pub const VENDOR_ADOBE: u32 = fourcc(b"8BIM");

/// Plugin kind.
pub const KIND: u32 = fourcc(b"kind");
/// Interface version, `major << 16 | minor`.
pub const VERSION: u32 = fourcc(b"vers");
/// Supported image modes.
pub const IMAGE_MODES: u32 = fourcc(b"mode");
/// Menu category.
pub const CATEGORY: u32 = fourcc(b"catg");
/// Menu title.
pub const NAME: u32 = fourcc(b"name");
/// Per-case input and output handling.
pub const FILTER_CASE_INFO: u32 = fourcc(b"fici");
/// Scripting terminology resource id.
pub const HAS_TERMINOLOGY: u32 = fourcc(b"hstm");
/// Enable-info expression.
pub const ENABLE_INFO: u32 = fourcc(b"enbl");
/// Required host signature.
pub const REQUIRED_HOST: u32 = fourcc(b"host");

/// Entry point for 32-bit x86 hosts.
pub const CODE_WIN32_X86: u32 = fourcc(b"wx86");
/// Entry point for x64 hosts.
pub const CODE_WIN64_X86: u32 = fourcc(b"8664");
/// Entry point for Arm64 hosts.
pub const CODE_WIN64_ARM: u32 = fourcc(b"wa64");

/// The only plugin kind hosted: filters.
pub const FILTER_KIND: u32 = fourcc(b"8BFM");
/// Host signature that every filter accepts.
pub const ANY_HOST: u32 = fourcc(b"    ");

/// Newest filter interface version understood.
pub const LATEST_FILTER_VERSION: u32 = 4;
/// Minor part of [`LATEST_FILTER_VERSION`].
pub const LATEST_FILTER_SUB_VERSION: u32 = 0;

/// RGB bit of the property-list image mode flags.
pub const FLAG_SUPPORTS_RGB: u16 = 0x0010;
/// RGB bit of the legacy `supportsMode` field.
pub const LEGACY_SUPPORTS_RGB: i16 = 8;

/// Category used when a resource names none.
pub const DEFAULT_CATEGORY: &str = "Filters";
/// Categories with this prefix are not shown to users.
pub const HIDDEN_CATEGORY_PREFIX: &str = "**Hidden**";

/// Resource types.
pub const PIPL_RESOURCE: &str = "PIPL";
/// Legacy plugin information.
pub const PIMI_RESOURCE: &str = "PIMI";
/// Legacy filter title.
pub const FILTER_TITLE_RESOURCE: &str = "_8BFM";
/// Scripting terminology.
pub const AETE_RESOURCE: &str = "AETE";

/// The entry-point property read for modules of `arch`.
pub fn entry_point_key(arch: Architecture) -> Option<u32> {
    match arch {
        Architecture::X86 => Some(CODE_WIN32_X86),
        Architecture::X64 => Some(CODE_WIN64_X86),
        Architecture::Arm64 => Some(CODE_WIN64_ARM),
        Architecture::Arm | Architecture::Unknown => None,
    }
}
