//! Data-only view of a PE image and its resource tree.
//!
//! The module file is read into memory and walked as plain bytes; no code is
//! mapped, relocated or executed.

use super::cursor::{ByteCursor, CursorError};
use super::probe::{DOS_SIGNATURE, NT_SIGNATURE};
use crate::arch::Architecture;
use std::fmt;
use thiserror::Error;

const LFANEW_OFFSET: usize = 0x3C;
const COFF_HEADER_SIZE: usize = 20;
const SECTION_HEADER_SIZE: usize = 40;
const PE32_MAGIC: u16 = 0x010B;
const PE32_PLUS_MAGIC: u16 = 0x020B;
const RESOURCE_DIRECTORY_INDEX: u32 = 2;
const SUBDIRECTORY_FLAG: u32 = 0x8000_0000;
/// Upper bound on sections; the loader itself refuses more than this.
const MAX_SECTIONS: u16 = 96;
/// Upper bound on entries in one resource directory table.
const MAX_DIRECTORY_ENTRIES: usize = 0x4000;

/// Errors raised while reading a PE image.
#[derive(Debug, Error)]
pub enum PeError {
    /// The file does not start with a DOS header.
    #[error("missing DOS signature")]
    NotDos,

    /// The NT header signature is wrong.
    #[error("missing PE signature")]
    NotPe,

    /// The optional header magic is neither PE32 nor PE32+.
    #[error("unsupported optional header magic {0:#06x}")]
    UnsupportedMagic(u16),

    /// Too many sections for a valid image.
    #[error("section count {0} exceeds limit")]
    TooManySections(u16),

    /// A relative virtual address does not map into any section.
    #[error("rva {0:#x} is outside every section")]
    UnmappedRva(u32),

    /// A resource directory has more entries than allowed.
    #[error("resource directory with {0} entries")]
    DirectoryTooLarge(usize),

    /// A read went out of bounds.
    #[error(transparent)]
    Cursor(#[from] CursorError),
}

/// Name or integer id of a resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceId {
    /// Integer resource id (`MAKEINTRESOURCE`).
    Integer(u16),
    /// Named resource.
    Name(String),
}

impl ResourceId {
    /// Compare against a resource type or name, ignoring ASCII case as the
    /// resource loader does.
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::Name(own) => own.eq_ignore_ascii_case(name),
            Self::Integer(_) => false,
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(id) => write!(f, "#{id}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

/// One resource's raw data.
#[derive(Debug, Clone)]
pub struct Resource<'a> {
    /// Resource name or id.
    pub name: ResourceId,
    /// Language id of the instance returned.
    pub language: u16,
    /// Raw resource bytes.
    pub data: &'a [u8],
}

#[derive(Debug, Clone, Copy)]
struct Section {
    virtual_address: u32,
    virtual_size: u32,
    raw_offset: u32,
    raw_size: u32,
}

#[derive(Debug, Clone, Copy)]
struct DirectoryEntry {
    name: u32,
    target: u32,
}

/// A parsed PE image borrowed from the file bytes.
#[derive(Debug)]
pub struct PeImage<'a> {
    data: &'a [u8],
    machine: u16,
    sections: Vec<Section>,
    /// File offset and size of the resource tree, if the image has one.
    resources: Option<(usize, usize)>,
}

impl<'a> PeImage<'a> {
    /// Parse the headers and section table of `data`.
    pub fn parse(data: &'a [u8]) -> Result<Self, PeError> {
        let mut cursor = ByteCursor::new(data);
        if cursor.read_u16()? != DOS_SIGNATURE {
            return Err(PeError::NotDos);
        }
        cursor.seek(LFANEW_OFFSET)?;
        let nt_offset = cursor.read_u32()? as usize;

        cursor.seek(nt_offset)?;
        if cursor.read_u32()? != NT_SIGNATURE {
            return Err(PeError::NotPe);
        }

        let machine = cursor.read_u16()?;
        let section_count = cursor.read_u16()?;
        cursor.skip(12)?; // timestamp, symbol table pointer, symbol count
        let optional_size = usize::from(cursor.read_u16()?);
        cursor.skip(2)?; // characteristics

        if section_count > MAX_SECTIONS {
            return Err(PeError::TooManySections(section_count));
        }

        let optional_start = nt_offset + 4 + COFF_HEADER_SIZE;
        let magic = cursor.read_u16()?;
        let (count_offset, directories_offset) = match magic {
            PE32_MAGIC => (92, 96),
            PE32_PLUS_MAGIC => (108, 112),
            other => return Err(PeError::UnsupportedMagic(other)),
        };

        cursor.seek(optional_start + count_offset)?;
        let directory_count = cursor.read_u32()?;
        let resource_directory = if directory_count > RESOURCE_DIRECTORY_INDEX {
            cursor.seek(optional_start + directories_offset + 8 * RESOURCE_DIRECTORY_INDEX as usize)?;
            let rva = cursor.read_u32()?;
            let size = cursor.read_u32()?;
            (rva != 0 && size != 0).then_some((rva, size))
        } else {
            None
        };

        cursor.seek(optional_start + optional_size)?;
        let mut sections = Vec::with_capacity(usize::from(section_count));
        for _ in 0..section_count {
            let header = cursor.take(SECTION_HEADER_SIZE)?;
            let mut fields = ByteCursor::at(header, 8)?;
            sections.push(Section {
                virtual_size: fields.read_u32()?,
                virtual_address: fields.read_u32()?,
                raw_size: fields.read_u32()?,
                raw_offset: fields.read_u32()?,
            });
        }

        let mut image = Self {
            data,
            machine,
            sections,
            resources: None,
        };

        if let Some((rva, size)) = resource_directory {
            let offset = image.rva_to_offset(rva)?;
            let available = data.len() - offset;
            image.resources = Some((offset, (size as usize).min(available)));
        }

        Ok(image)
    }

    /// Raw PE machine field.
    pub fn machine(&self) -> u16 {
        self.machine
    }

    /// Architecture from the machine field.
    pub fn architecture(&self) -> Architecture {
        Architecture::from_machine(self.machine)
    }

    /// Whether the image carries a resource tree.
    pub fn has_resources(&self) -> bool {
        self.resources.is_some()
    }

    /// Translate a relative virtual address to a file offset.
    pub fn rva_to_offset(&self, rva: u32) -> Result<usize, PeError> {
        for section in &self.sections {
            let extent = section.virtual_size.max(section.raw_size);
            let start = section.virtual_address;
            if rva >= start && rva - start < extent {
                let delta = rva - start;
                if delta >= section.raw_size {
                    // Inside the zero-filled tail; nothing backs it on disk.
                    break;
                }
                let offset = section.raw_offset as usize + delta as usize;
                if offset < self.data.len() {
                    return Ok(offset);
                }
                break;
            }
        }
        Err(PeError::UnmappedRva(rva))
    }

    /// Whether at least one resource of `type_name` exists.
    pub fn has_resource_type(&self, type_name: &str) -> Result<bool, PeError> {
        Ok(self.type_directory(type_name)?.is_some())
    }

    /// All resources of `type_name`, first language instance of each name.
    pub fn resources(&self, type_name: &str) -> Result<Vec<Resource<'a>>, PeError> {
        let Some(type_dir) = self.type_directory(type_name)? else {
            return Ok(Vec::new());
        };

        let mut out = Vec::new();
        for entry in self.directory_entries(type_dir)? {
            if entry.target & SUBDIRECTORY_FLAG == 0 {
                tracing::debug!("resource name entry without language directory");
                continue;
            }
            let name = self.entry_name(entry.name)?;
            if let Some((language, data)) = self.first_language(entry.target & !SUBDIRECTORY_FLAG)? {
                out.push(Resource {
                    name,
                    language,
                    data,
                });
            }
        }
        Ok(out)
    }

    /// Look up one resource by type and name.
    pub fn find_resource(&self, type_name: &str, name: &ResourceId) -> Result<Option<&'a [u8]>, PeError> {
        let Some(type_dir) = self.type_directory(type_name)? else {
            return Ok(None);
        };
        for entry in self.directory_entries(type_dir)? {
            if entry.target & SUBDIRECTORY_FLAG == 0 {
                continue;
            }
            if self.entry_name(entry.name)? == *name {
                return Ok(self
                    .first_language(entry.target & !SUBDIRECTORY_FLAG)?
                    .map(|(_, data)| data));
            }
        }
        Ok(None)
    }

    fn tree(&self) -> Option<&'a [u8]> {
        self.resources
            .map(|(offset, size)| &self.data[offset..offset + size])
    }

    fn type_directory(&self, type_name: &str) -> Result<Option<u32>, PeError> {
        if self.tree().is_none() {
            return Ok(None);
        }
        for entry in self.directory_entries(0)? {
            if entry.target & SUBDIRECTORY_FLAG != 0 && self.entry_name(entry.name)?.matches(type_name) {
                return Ok(Some(entry.target & !SUBDIRECTORY_FLAG));
            }
        }
        Ok(None)
    }

    fn directory_entries(&self, offset: u32) -> Result<Vec<DirectoryEntry>, PeError> {
        let tree = self.tree().unwrap_or_default();
        let mut cursor = ByteCursor::at(tree, offset as usize)?;
        cursor.skip(12)?; // characteristics, timestamp, major/minor version
        let named = usize::from(cursor.read_u16()?);
        let ids = usize::from(cursor.read_u16()?);
        let count = named + ids;
        if count > MAX_DIRECTORY_ENTRIES {
            return Err(PeError::DirectoryTooLarge(count));
        }

        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            entries.push(DirectoryEntry {
                name: cursor.read_u32()?,
                target: cursor.read_u32()?,
            });
        }
        Ok(entries)
    }

    fn entry_name(&self, raw: u32) -> Result<ResourceId, PeError> {
        if raw & SUBDIRECTORY_FLAG == 0 {
            // Integer ids occupy the low word.
            return Ok(ResourceId::Integer(raw as u16));
        }
        let tree = self.tree().unwrap_or_default();
        let mut cursor = ByteCursor::at(tree, (raw & !SUBDIRECTORY_FLAG) as usize)?;
        let len = usize::from(cursor.read_u16()?);
        let units = cursor.take(len * 2)?;
        let name: Vec<u16> = units
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Ok(ResourceId::Name(String::from_utf16_lossy(&name)))
    }

    fn first_language(&self, offset: u32) -> Result<Option<(u16, &'a [u8])>, PeError> {
        let entries = self.directory_entries(offset)?;
        let Some(entry) = entries
            .iter()
            .find(|entry| entry.target & SUBDIRECTORY_FLAG == 0)
        else {
            return Ok(None);
        };

        let tree = self.tree().unwrap_or_default();
        let mut cursor = ByteCursor::at(tree, entry.target as usize)?;
        let data_rva = cursor.read_u32()?;
        let size = cursor.read_u32()? as usize;

        let start = self.rva_to_offset(data_rva)?;
        let data = ByteCursor::at(self.data, start)?.take(size)?;
        Ok(Some((entry.name as u16, data)))
    }
}
