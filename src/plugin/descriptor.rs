//! Descriptors of discovered filters.
//!
//! A [`PluginDescriptor`] is produced by the scanner, never mutated
//! afterwards, and serialized with rkyv when a filter runs in a bridge
//! worker. Construction goes through [`DescriptorBuilder`], which enforces
//! that the entry point, category and title are non-empty once trimmed.

use super::filter_case::{FilterCase, FilterCaseTable};
use super::modes::{ImageMode, ImageModes};
use crate::arch::Architecture;
use crate::discovery::{EnableContext, EnableExpr};
use std::collections::HashMap;
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// AETE parameter flag marking a parameter that takes a list of values.
pub const AETE_FLAG_IS_ARRAY: i16 = 0x4000;

/// Errors raised when building or decoding a descriptor.
#[derive(Debug, Error)]
pub enum DescriptorError {
    /// A required text field was empty after trimming.
    #[error("descriptor {0} is empty")]
    EmptyField(&'static str),

    /// Serialized descriptor bytes were invalid.
    #[error("invalid descriptor record: {0}")]
    Record(String),
}

/// Scripting parameter flags of a filter, keyed by parameter key.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AeteData {
    flags: HashMap<u32, i16>,
}

impl AeteData {
    /// An empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the flags of `key`. The first occurrence of a key wins;
    /// returns false when `key` was already present.
    pub fn insert(&mut self, key: u32, flags: i16) -> bool {
        match self.flags.entry(key) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(flags);
                true
            }
        }
    }

    /// Flags of `key`.
    pub fn flags(&self, key: u32) -> Option<i16> {
        self.flags.get(&key).copied()
    }

    /// Whether `key` is declared as taking a list of values.
    pub fn is_array(&self, key: u32) -> bool {
        self.flags(key)
            .is_some_and(|flags| flags & AETE_FLAG_IS_ARRAY != 0)
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    /// Returns true if no parameters are declared.
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// Iterate over `(key, flags)` pairs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, i16)> + '_ {
        self.flags.iter().map(|(k, v)| (*k, *v))
    }
}

/// A filter discovered in a module.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginDescriptor {
    path: PathBuf,
    entry_point: String,
    module_entry_points: Option<Vec<String>>,
    category: String,
    title: String,
    image_modes: ImageModes,
    filter_case_info: Option<FilterCaseTable>,
    aete: Option<AeteData>,
    enable_info: Option<String>,
    architecture: Architecture,
}

impl PluginDescriptor {
    /// Start building a descriptor for `entry_point` in the module at `path`.
    pub fn builder(
        path: impl Into<PathBuf>,
        entry_point: impl Into<String>,
        architecture: Architecture,
    ) -> DescriptorBuilder {
        DescriptorBuilder {
            path: path.into(),
            entry_point: entry_point.into(),
            category: None,
            title: None,
            image_modes: ImageModes::default(),
            filter_case_info: None,
            aete: None,
            enable_info: None,
            architecture,
        }
    }

    /// Module file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Exported symbol of this filter.
    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    /// Every entry point of the module, when it hosts more than one filter.
    pub fn module_entry_points(&self) -> Option<&[String]> {
        self.module_entry_points.as_deref()
    }

    /// Menu category.
    pub fn category(&self) -> &str {
        &self.category
    }

    /// Menu title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Supported image modes.
    pub fn image_modes(&self) -> ImageModes {
        self.image_modes
    }

    /// Per-case handling table, when the filter declares a valid one.
    pub fn filter_case_info(&self) -> Option<&FilterCaseTable> {
        self.filter_case_info.as_ref()
    }

    /// Scripting parameter flags.
    pub fn aete(&self) -> Option<&AeteData> {
        self.aete.as_ref()
    }

    /// Raw enable-info expression.
    pub fn enable_info(&self) -> Option<&str> {
        self.enable_info.as_deref()
    }

    /// Module architecture.
    pub fn architecture(&self) -> Architecture {
        self.architecture
    }

    /// Whether the filter should be offered for a document.
    ///
    /// Evaluates the enable-info expression; when there is none, or it does
    /// not parse, falls back to the image-mode flags.
    pub fn is_enabled_for(&self, ctx: &EnableContext) -> bool {
        if let Some(source) = &self.enable_info {
            match EnableExpr::parse(source) {
                Ok(expr) => return expr.is_enabled(ctx),
                Err(e) => {
                    tracing::debug!("{}: unparsable enable info {:?}: {}", self.title, source, e);
                }
            }
        }
        self.supports_mode(ctx.image_mode)
    }

    /// Whether the mode flags include `mode`.
    pub fn supports_mode(&self, mode: ImageMode) -> bool {
        mode.flag()
            .is_some_and(|flag| self.image_modes.contains(flag))
    }

    /// The filter case to invoke the filter with.
    ///
    /// Transparent images fall back to the flattened cases when the filter
    /// declares it cannot handle transparency.
    pub fn filter_case_for(&self, has_selection: bool, has_transparency: bool) -> FilterCase {
        let case = FilterCase::for_image(has_selection, has_transparency);
        match &self.filter_case_info {
            Some(table) if case.has_transparency() && !table.get(case).is_supported() => {
                case.flattened()
            }
            Some(_) => case,
            None if case.has_transparency() => case.flattened(),
            None => case,
        }
    }

    pub(crate) fn with_module_entry_points(mut self, entry_points: Vec<String>) -> Self {
        self.module_entry_points = Some(entry_points);
        self
    }

    /// Convert to the serializable record.
    pub fn to_record(&self) -> DescriptorRecord {
        DescriptorRecord {
            path: self.path.as_os_str().as_bytes().to_vec(),
            entry_point: self.entry_point.clone(),
            module_entry_points: self.module_entry_points.clone(),
            category: self.category.clone(),
            title: self.title.clone(),
            image_modes: self.image_modes.bits(),
            filter_case_info: self.filter_case_info.map(|t| t.to_bytes()),
            aete: self.aete.as_ref().map(|aete| {
                let mut entries: Vec<AeteRecord> = aete
                    .iter()
                    .map(|(key, flags)| AeteRecord { key, flags })
                    .collect();
                entries.sort_by_key(|e| e.key);
                entries
            }),
            enable_info: self.enable_info.clone(),
            architecture: self.architecture as u8,
        }
    }

    /// Rebuild from a record, re-checking every invariant.
    pub fn from_record(record: DescriptorRecord) -> Result<Self, DescriptorError> {
        let mut builder = Self::builder(
            PathBuf::from(OsStr::from_bytes(&record.path)),
            record.entry_point,
            Architecture::from_u8(record.architecture),
        )
        .category(record.category)
        .title(record.title)
        .image_modes(ImageModes::from_bits(record.image_modes))
        .enable_info(record.enable_info);

        if let Some(bytes) = record.filter_case_info {
            let table = FilterCaseTable::from_bytes(&bytes)
                .ok_or_else(|| DescriptorError::Record("filter case table size".into()))?;
            builder = builder.filter_case_info(Some(table));
        }
        if let Some(entries) = record.aete {
            let mut aete = AeteData::new();
            for entry in entries {
                aete.insert(entry.key, entry.flags);
            }
            builder = builder.aete(Some(aete));
        }

        let descriptor = builder.build()?;
        Ok(match record.module_entry_points {
            Some(points) => descriptor.with_module_entry_points(points),
            None => descriptor,
        })
    }

    /// Serialize for the bridge.
    pub fn to_bytes(&self) -> Result<Vec<u8>, DescriptorError> {
        rkyv::to_bytes::<rkyv::rancor::Error>(&self.to_record())
            .map(|bytes| bytes.into_vec())
            .map_err(|e| DescriptorError::Record(e.to_string()))
    }

    /// Deserialize bytes produced by [`to_bytes`](Self::to_bytes).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DescriptorError> {
        let mut aligned = rkyv::util::AlignedVec::<8>::new();
        aligned.extend_from_slice(bytes);
        let record = rkyv::from_bytes::<DescriptorRecord, rkyv::rancor::Error>(&aligned)
            .map_err(|e| DescriptorError::Record(e.to_string()))?;
        Self::from_record(record)
    }
}

/// Builder enforcing the descriptor invariants.
#[derive(Debug, Clone)]
pub struct DescriptorBuilder {
    path: PathBuf,
    entry_point: String,
    category: Option<String>,
    title: Option<String>,
    image_modes: ImageModes,
    filter_case_info: Option<FilterCaseTable>,
    aete: Option<AeteData>,
    enable_info: Option<String>,
    architecture: Architecture,
}

impl DescriptorBuilder {
    /// Menu category.
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Menu title.
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Image mode flags.
    pub fn image_modes(mut self, modes: ImageModes) -> Self {
        self.image_modes = modes;
        self
    }

    /// Filter case table.
    pub fn filter_case_info(mut self, table: Option<FilterCaseTable>) -> Self {
        self.filter_case_info = table;
        self
    }

    /// Scripting parameter flags.
    pub fn aete(mut self, aete: Option<AeteData>) -> Self {
        self.aete = aete;
        self
    }

    /// Enable-info expression.
    pub fn enable_info(mut self, expression: Option<String>) -> Self {
        self.enable_info = expression.filter(|e| !e.trim().is_empty());
        self
    }

    /// Validate and build.
    pub fn build(self) -> Result<PluginDescriptor, DescriptorError> {
        let entry_point = non_empty(self.entry_point, "entry point")?;
        let category = non_empty(self.category.unwrap_or_default(), "category")?;
        let title = non_empty(self.title.unwrap_or_default(), "title")?;

        Ok(PluginDescriptor {
            path: self.path,
            entry_point,
            module_entry_points: None,
            category,
            title,
            image_modes: self.image_modes,
            filter_case_info: self.filter_case_info,
            aete: self.aete,
            enable_info: self.enable_info,
            architecture: self.architecture,
        })
    }
}

fn non_empty(value: String, field: &'static str) -> Result<String, DescriptorError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(DescriptorError::EmptyField(field))
    } else {
        Ok(trimmed.to_string())
    }
}

/// Serializable form of a [`PluginDescriptor`].
#[derive(Debug, Clone, PartialEq, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
#[rkyv(derive(Debug))]
pub struct DescriptorRecord {
    /// Raw bytes of the module path.
    pub path: Vec<u8>,
    /// Entry point.
    pub entry_point: String,
    /// Entry points of a multi-filter module.
    pub module_entry_points: Option<Vec<String>>,
    /// Category.
    pub category: String,
    /// Title.
    pub title: String,
    /// Image mode flags.
    pub image_modes: u16,
    /// Encoded filter case table.
    pub filter_case_info: Option<Vec<u8>>,
    /// Scripting parameter flags sorted by key.
    pub aete: Option<Vec<AeteRecord>>,
    /// Enable-info expression.
    pub enable_info: Option<String>,
    /// Architecture wire value.
    pub architecture: u8,
}

/// One scripting parameter in a [`DescriptorRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
#[rkyv(derive(Debug))]
pub struct AeteRecord {
    /// Parameter key.
    pub key: u32,
    /// Parameter flags.
    pub flags: i16,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::FilterCaseInfo;

    fn sample() -> PluginDescriptor {
        PluginDescriptor::builder("/plugins/blur.8bf", " BlurMain ", Architecture::X86)
            .category("Blur ")
            .title("Soft Blur")
            .image_modes(ImageModes::RGB | ImageModes::GRAYSCALE)
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_trims_fields() {
        let d = sample();
        assert_eq!(d.entry_point(), "BlurMain");
        assert_eq!(d.category(), "Blur");
        assert!(d.module_entry_points().is_none());
    }

    #[test]
    fn test_builder_rejects_blank_fields() {
        let err = PluginDescriptor::builder("/p.8bf", "  ", Architecture::X64)
            .category("c")
            .title("t")
            .build();
        assert!(matches!(err, Err(DescriptorError::EmptyField("entry point"))));

        let err = PluginDescriptor::builder("/p.8bf", "Main", Architecture::X64)
            .category("c")
            .build();
        assert!(matches!(err, Err(DescriptorError::EmptyField("title"))));
    }

    #[test]
    fn test_aete_first_occurrence_wins() {
        let mut aete = AeteData::new();
        assert!(aete.insert(1, AETE_FLAG_IS_ARRAY));
        assert!(!aete.insert(1, 0));
        assert!(aete.is_array(1));
        assert!(!aete.is_array(2));
    }

    #[test]
    fn test_bytes_round_trip() {
        let mut aete = AeteData::new();
        aete.insert(0x416d6e74, 0);
        let table = FilterCaseTable::new([FilterCaseInfo::from_bytes([1, 1, 0, 0]); 7]);
        let d = PluginDescriptor::builder("/plugins/multi.8bf", "A", Architecture::X86)
            .category("Multi")
            .title("First")
            .image_modes(ImageModes::RGB)
            .filter_case_info(Some(table))
            .aete(Some(aete))
            .enable_info(Some("true".into()))
            .build()
            .unwrap()
            .with_module_entry_points(vec!["A".into(), "B".into()]);

        let decoded = PluginDescriptor::from_bytes(&d.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, d);
    }

    #[test]
    fn test_filter_case_falls_back_to_flat() {
        let d = sample();
        assert_eq!(d.filter_case_for(true, true), FilterCase::FlatImageWithSelection);

        let mut records = [FilterCaseInfo::from_bytes([1, 1, 0, 0]); 7];
        records[FilterCase::EditableTransparencyNoSelection.index()] = FilterCaseInfo::default();
        let d = PluginDescriptor::builder("/p.8bf", "Main", Architecture::X64)
            .category("c")
            .title("t")
            .filter_case_info(Some(FilterCaseTable::new(records)))
            .build()
            .unwrap();
        assert_eq!(d.filter_case_for(false, true), FilterCase::FlatImageNoSelection);
        assert_eq!(
            d.filter_case_for(true, true),
            FilterCase::EditableTransparencyWithSelection
        );
    }
}
