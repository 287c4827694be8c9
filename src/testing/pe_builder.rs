//! Synthesises minimal PE images carrying a resource tree.

use crate::arch::Architecture;
use crate::pe::ResourceId;

const LFANEW: usize = 0x40;
const FILE_ALIGNMENT: usize = 0x200;
const RSRC_RVA: u32 = 0x1000;
const LANGUAGE_EN_US: u32 = 0x0409;

/// Builder for a PE image with a single `.rsrc` section.
///
/// # Example
///
/// ```rust
/// use filterbridge::arch::Architecture;
/// use filterbridge::pe::{PeImage, ResourceId};
/// use filterbridge::testing::PeBuilder;
///
/// let bytes = PeBuilder::new(Architecture::X64)
///     .resource("PIPL", ResourceId::Integer(16000), vec![1, 2, 3])
///     .build();
/// let image = PeImage::parse(&bytes).unwrap();
/// assert_eq!(image.resources("PIPL").unwrap().len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct PeBuilder {
    machine: u16,
    pe32_plus: bool,
    types: Vec<(String, Vec<(ResourceId, Vec<u8>)>)>,
}

impl PeBuilder {
    /// Start an image for `arch`.
    pub fn new(arch: Architecture) -> Self {
        Self {
            machine: arch.machine().unwrap_or(0),
            pe32_plus: matches!(arch, Architecture::X64 | Architecture::Arm64),
            types: Vec::new(),
        }
    }

    /// Add a resource of a named type.
    pub fn resource(mut self, type_name: &str, name: ResourceId, data: Vec<u8>) -> Self {
        match self.types.iter_mut().find(|(t, _)| t == type_name) {
            Some((_, entries)) => entries.push((name, data)),
            None => self.types.push((type_name.to_string(), vec![(name, data)])),
        }
        self
    }

    /// Produce the file bytes.
    pub fn build(&self) -> Vec<u8> {
        let rsrc = self.build_resource_section();
        let optional_size: u16 = if self.pe32_plus { 0xF0 } else { 0xE0 };
        let section_count: u16 = if rsrc.is_empty() { 0 } else { 1 };

        let mut out = vec![0u8; FILE_ALIGNMENT];
        out[0..2].copy_from_slice(b"MZ");
        put_u32(&mut out, 0x3C, LFANEW as u32);

        let nt = LFANEW;
        out[nt..nt + 4].copy_from_slice(b"PE\0\0");
        put_u16(&mut out, nt + 4, self.machine);
        put_u16(&mut out, nt + 6, section_count);
        put_u16(&mut out, nt + 20, optional_size);
        put_u16(&mut out, nt + 22, 0x2102); // executable image, 32-bit machine, DLL

        let opt = nt + 24;
        let (magic, count_offset, dirs_offset) = if self.pe32_plus {
            (0x020Bu16, 108, 112)
        } else {
            (0x010Bu16, 92, 96)
        };
        put_u16(&mut out, opt, magic);
        put_u32(&mut out, opt + count_offset, 16);

        if !rsrc.is_empty() {
            put_u32(&mut out, opt + dirs_offset + 16, RSRC_RVA);
            put_u32(&mut out, opt + dirs_offset + 20, rsrc.len() as u32);

            let raw_size = rsrc.len().div_ceil(FILE_ALIGNMENT) * FILE_ALIGNMENT;
            let sec = opt + usize::from(optional_size);
            out[sec..sec + 6].copy_from_slice(b".rsrc\0");
            put_u32(&mut out, sec + 8, rsrc.len() as u32);
            put_u32(&mut out, sec + 12, RSRC_RVA);
            put_u32(&mut out, sec + 16, raw_size as u32);
            put_u32(&mut out, sec + 20, FILE_ALIGNMENT as u32);
            put_u32(&mut out, sec + 36, 0x4000_0040); // initialized data, readable

            out.extend_from_slice(&rsrc);
            out.resize(FILE_ALIGNMENT + raw_size, 0);
        }
        out
    }

    fn build_resource_section(&self) -> Vec<u8> {
        if self.types.is_empty() {
            return Vec::new();
        }

        // Layout: directory tables, data entries, strings, then data blobs.
        let mut offset = dir_size(self.types.len());
        let mut type_dirs = Vec::new();
        for (_, entries) in &self.types {
            type_dirs.push(offset);
            offset += dir_size(entries.len());
        }
        let mut lang_dirs = Vec::new();
        for (_, entries) in &self.types {
            lang_dirs.push(
                (0..entries.len())
                    .map(|_| {
                        let at = offset;
                        offset += dir_size(1);
                        at
                    })
                    .collect::<Vec<_>>(),
            );
        }
        let mut data_entries = Vec::new();
        for (_, entries) in &self.types {
            data_entries.push(
                (0..entries.len())
                    .map(|_| {
                        let at = offset;
                        offset += 16;
                        at
                    })
                    .collect::<Vec<_>>(),
            );
        }

        let mut strings: Vec<(usize, String)> = Vec::new();
        let mut string_at = |offset: &mut usize, s: &str| {
            let at = *offset;
            *offset += 2 + 2 * s.encode_utf16().count();
            strings.push((at, s.to_string()));
            at
        };
        let type_names: Vec<usize> = self
            .types
            .iter()
            .map(|(t, _)| string_at(&mut offset, t))
            .collect();
        let entry_names: Vec<Vec<Option<usize>>> = self
            .types
            .iter()
            .map(|(_, entries)| {
                entries
                    .iter()
                    .map(|(name, _)| match name {
                        ResourceId::Name(n) => Some(string_at(&mut offset, n)),
                        ResourceId::Integer(_) => None,
                    })
                    .collect()
            })
            .collect();
        offset = offset.next_multiple_of(4);

        let mut blobs = Vec::new();
        for (_, entries) in &self.types {
            blobs.push(
                entries
                    .iter()
                    .map(|(_, data)| {
                        let at = offset;
                        offset += data.len().next_multiple_of(4);
                        at
                    })
                    .collect::<Vec<_>>(),
            );
        }

        let mut out = vec![0u8; offset];

        write_dir_header(&mut out, 0, self.types.len(), 0);
        for (i, _) in self.types.iter().enumerate() {
            let entry = 16 + 8 * i;
            put_u32(&mut out, entry, 0x8000_0000 | type_names[i] as u32);
            put_u32(&mut out, entry + 4, 0x8000_0000 | type_dirs[i] as u32);
        }

        for (t, (_, entries)) in self.types.iter().enumerate() {
            let named = entry_names[t].iter().filter(|n| n.is_some()).count();
            write_dir_header(&mut out, type_dirs[t], named, entries.len() - named);
            for (e, (name, data)) in entries.iter().enumerate() {
                let entry = type_dirs[t] + 16 + 8 * e;
                let name_field = match (name, entry_names[t][e]) {
                    (_, Some(at)) => 0x8000_0000 | at as u32,
                    (ResourceId::Integer(id), None) => u32::from(*id),
                    (ResourceId::Name(_), None) => unreachable!("named entries carry a string"),
                };
                put_u32(&mut out, entry, name_field);
                put_u32(&mut out, entry + 4, 0x8000_0000 | lang_dirs[t][e] as u32);

                let lang = lang_dirs[t][e];
                write_dir_header(&mut out, lang, 0, 1);
                put_u32(&mut out, lang + 16, LANGUAGE_EN_US);
                put_u32(&mut out, lang + 20, data_entries[t][e] as u32);

                let de = data_entries[t][e];
                put_u32(&mut out, de, RSRC_RVA + blobs[t][e] as u32);
                put_u32(&mut out, de + 4, data.len() as u32);

                out[blobs[t][e]..blobs[t][e] + data.len()].copy_from_slice(data);
            }
        }

        for (at, s) in strings {
            let units: Vec<u16> = s.encode_utf16().collect();
            put_u16(&mut out, at, units.len() as u16);
            for (i, unit) in units.iter().enumerate() {
                put_u16(&mut out, at + 2 + 2 * i, *unit);
            }
        }

        out
    }
}

fn dir_size(entries: usize) -> usize {
    16 + 8 * entries
}

fn write_dir_header(out: &mut [u8], at: usize, named: usize, ids: usize) {
    put_u16(out, at + 12, named as u16);
    put_u16(out, at + 14, ids as u16);
}

fn put_u16(out: &mut [u8], at: usize, value: u16) {
    out[at..at + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(out: &mut [u8], at: usize, value: u32) {
    out[at..at + 4].copy_from_slice(&value.to_le_bytes());
}
