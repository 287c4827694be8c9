//! Filter plugins: descriptors, image modes, filter cases and module loading.
//!
//! # Plugin Structure
//!
//! A filter module is a native library exporting one function per filter:
//!
//! ```c
//! void ENTRYPOINT(short selector, FilterRecord* record, intptr_t* data, short* result);
//! ```
//!
//! Entry point names come from the module's resources (see
//! [`crate::discovery`]); a module may export several filters.

mod catalog;
mod descriptor;
mod filter_case;
mod loader;
mod modes;

pub use catalog::PluginCatalog;
pub use descriptor::{
    AETE_FLAG_IS_ARRAY, AeteData, AeteRecord, DescriptorBuilder, DescriptorError,
    DescriptorRecord, PluginDescriptor,
};
pub use filter_case::{
    FILTER_CASE_COUNT, FILTER_CASE_INFO_SIZE, FILTER_CASE_TABLE_SIZE, FilterCase, FilterCaseInfo,
    FilterCaseTable,
};
pub use loader::{LoadError, PluginEntryFn, PluginModule};
pub use modes::{ImageMode, ImageModes};
