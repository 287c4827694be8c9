//! Filter discovery.
//!
//! Modules are classified by architecture, read as plain bytes and searched
//! for `PiPL` property lists (or the legacy `PiMI` resources). Nothing in a
//! module is executed during discovery.
//!
//! Failures never abort a scan: a malformed resource skips that resource, an
//! unreadable module skips that module, and both are logged.

mod aete;
mod enable_info;
mod filter_case;
mod pimi;
mod pipl;
pub mod properties;
mod scanner;

pub use aete::{parse_aete, parse_aete_data};
pub use enable_info::{CompareOp, EnableContext, EnableExpr, EnableParseError};
pub use filter_case::{FilterCaseError, decode_filter_case_info};
pub use pimi::parse_pimi;
pub use pipl::parse_pipl;
pub use scanner::{
    NoShortcuts, PluginScanner, ScanReport, ScannerConfig, ShortcutResolver, SkipReason,
    SkippedFile,
};

use crate::arch::Architecture;
use crate::fourcc::FourCc;
use crate::pe::{CursorError, PeError, PeImage};
use crate::plugin::DescriptorError;
use std::path::Path;
use thiserror::Error;

/// Why a resource did not produce a descriptor.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The resource is truncated or has an impossible length.
    #[error("malformed resource: {0}")]
    Malformed(#[from] CursorError),

    /// The image structure is damaged.
    #[error(transparent)]
    Image(#[from] PeError),

    /// Unknown resource layout version.
    #[error("unsupported resource version {0}")]
    ResourceVersion(i32),

    /// The resource is well-formed but describes a filter this host must not
    /// offer.
    #[error("rejected: {0}")]
    Rejected(#[from] Rejection),
}

/// Reasons a valid resource is not hosted.
#[derive(Debug, Error)]
pub enum Rejection {
    /// Not a filter plugin.
    #[error("plugin kind {0:?} is not a filter")]
    Kind(FourCc),

    /// Built against a newer interface.
    #[error("interface version {major}.{minor} is newer than supported")]
    Version {
        /// Major version.
        major: u32,
        /// Minor version.
        minor: u32,
    },

    /// RGB images are not supported.
    #[error("filter does not support RGB images")]
    NoRgbSupport,

    /// Requires a different host application.
    #[error("filter requires host {0:?}")]
    Host(FourCc),

    /// Hidden from users by its category.
    #[error("filter is hidden")]
    Hidden,

    /// No entry point for this architecture.
    #[error("no entry point for {0}")]
    NoEntryPoint(Architecture),

    /// Entry point, category or title is empty.
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
}

impl DiscoveryError {
    /// Log this error for a resource of `module`.
    pub(crate) fn log(&self, module: &Path, resource: &dyn std::fmt::Display) {
        match self {
            Self::Rejected(Rejection::Hidden) => {
                tracing::debug!("{} {}: {}", module.display(), resource, self);
            }
            Self::Rejected(_) => {
                tracing::warn!("{} {}: {}", module.display(), resource, self);
            }
            _ => {
                tracing::error!("{} {}: {}", module.display(), resource, self);
            }
        }
    }
}

/// State of one module scan, handed to each resource parser.
pub(crate) struct ModuleScan<'a> {
    pub(crate) path: &'a Path,
    pub(crate) image: &'a PeImage<'a>,
    pub(crate) architecture: Architecture,
}

impl ModuleScan<'_> {
    /// Title used when a resource names none.
    pub(crate) fn default_title(&self) -> String {
        self.path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}
