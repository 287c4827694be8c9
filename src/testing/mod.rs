//! Fixture generators for tests and benchmarks.
//!
//! Real filter modules are Windows libraries, so tests synthesise PE images
//! in memory with the same resource layouts the scanner reads.

mod pe_builder;

pub use pe_builder::PeBuilder;

use crate::arch::Architecture;
use crate::discovery::properties::{self, entry_point_key};
use crate::host::{ImageSurfaceMut, OwnedSurface, PixelFormat};
use crate::plugin::ImageModes;

/// Builds a `PiPL` property list resource.
#[derive(Debug, Clone)]
pub struct PiplBuilder {
    resource_version: i16,
    list_version: i32,
    properties: Vec<(u32, u32, Vec<u8>)>,
}

impl Default for PiplBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PiplBuilder {
    /// An empty property list.
    pub fn new() -> Self {
        Self {
            resource_version: 1,
            list_version: 0,
            properties: Vec::new(),
        }
    }

    /// A complete, valid filter description for `arch`.
    pub fn filter(title: &str, category: &str, arch: Architecture, entry_point: &str) -> Self {
        Self::new()
            .kind(properties::FILTER_KIND)
            .version(4, 0)
            .modes((ImageModes::RGB | ImageModes::GRAYSCALE).bits())
            .category(category)
            .name(title)
            .entry_point(arch, entry_point)
    }

    /// Override the leading resource version.
    pub fn resource_version(mut self, version: i16) -> Self {
        self.resource_version = version;
        self
    }

    /// Append a property with the standard vendor.
    pub fn property(self, key: u32, data: Vec<u8>) -> Self {
        self.foreign_property(properties::VENDOR_ADOBE, key, data)
    }

    /// Append a property with an arbitrary vendor.
    pub fn foreign_property(mut self, vendor: u32, key: u32, data: Vec<u8>) -> Self {
        self.properties.push((vendor, key, data));
        self
    }

    /// `kind` property.
    pub fn kind(self, kind: u32) -> Self {
        self.property(properties::KIND, kind.to_le_bytes().to_vec())
    }

    /// `vers` property.
    pub fn version(self, major: u16, minor: u16) -> Self {
        let packed = (u32::from(major) << 16) | u32::from(minor);
        self.property(properties::VERSION, packed.to_le_bytes().to_vec())
    }

    /// `mode` property.
    pub fn modes(self, flags: u16) -> Self {
        self.property(properties::IMAGE_MODES, flags.to_le_bytes().to_vec())
    }

    /// `catg` property.
    pub fn category(self, category: &str) -> Self {
        self.property(properties::CATEGORY, pascal(category))
    }

    /// `name` property.
    pub fn name(self, title: &str) -> Self {
        self.property(properties::NAME, pascal(title))
    }

    /// Entry point for modules of `arch`.
    pub fn entry_point(self, arch: Architecture, symbol: &str) -> Self {
        let key = entry_point_key(arch).unwrap_or(properties::CODE_WIN64_X86);
        self.property(key, c_string(symbol))
    }

    /// `fici` property in its raw 28-byte form.
    pub fn filter_case_info(self, table: &[[u8; 4]; 7]) -> Self {
        self.property(properties::FILTER_CASE_INFO, table.concat())
    }

    /// `fici` property stored as escaped text.
    pub fn filter_case_text(self, text: &str) -> Self {
        self.property(properties::FILTER_CASE_INFO, c_string(text))
    }

    /// `hstm` property pointing at terminology resource `aete_id`.
    pub fn terminology(self, aete_id: i16) -> Self {
        let mut data = Vec::new();
        data.extend_from_slice(&0i32.to_le_bytes());
        data.extend_from_slice(&crate::fourcc::fourcc(b"ExFl").to_le_bytes());
        data.extend_from_slice(&crate::fourcc::fourcc(b"ExEv").to_le_bytes());
        data.extend_from_slice(&aete_id.to_le_bytes());
        data.extend_from_slice(b"\0");
        self.property(properties::HAS_TERMINOLOGY, data)
    }

    /// `enbl` property.
    pub fn enable_info(self, expression: &str) -> Self {
        self.property(properties::ENABLE_INFO, c_string(expression))
    }

    /// `host` property.
    pub fn required_host(self, host: u32) -> Self {
        self.property(properties::REQUIRED_HOST, host.to_le_bytes().to_vec())
    }

    /// Serialize the property list.
    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.resource_version.to_le_bytes());
        out.extend_from_slice(&self.list_version.to_le_bytes());
        out.extend_from_slice(&(self.properties.len() as i32).to_le_bytes());
        for (vendor, key, data) in &self.properties {
            out.extend_from_slice(&vendor.to_le_bytes());
            out.extend_from_slice(&key.to_le_bytes());
            out.extend_from_slice(&0i32.to_le_bytes());
            out.extend_from_slice(&(data.len() as i32).to_le_bytes());
            out.extend_from_slice(data);
            out.resize(out.len().next_multiple_of(4), 0);
        }
        out
    }
}

/// A legacy `PIMI` resource.
pub fn legacy_pimi(category: &str, supports_mode: i16, required_host: u32) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&1i16.to_le_bytes());
    out.extend_from_slice(&c_string(category));
    out.extend_from_slice(&4i16.to_le_bytes()); // version
    out.extend_from_slice(&0i16.to_le_bytes()); // sub-version
    out.extend_from_slice(&0i16.to_le_bytes()); // priority
    out.extend_from_slice(&supports_mode.to_le_bytes());
    out.extend_from_slice(&required_host.to_le_bytes());
    out
}

/// A legacy `_8BFM` title resource.
pub fn legacy_title(title: &str) -> Vec<u8> {
    let mut out = 1i16.to_le_bytes().to_vec();
    out.extend_from_slice(&c_string(title));
    out
}

/// Builds an `AETE` scripting terminology resource.
#[derive(Debug, Clone)]
pub struct AeteBuilder {
    suite_count: i16,
    event_count: i16,
    params: Vec<(String, u32, i16)>,
}

impl Default for AeteBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AeteBuilder {
    /// One suite with one event and no parameters.
    pub fn new() -> Self {
        Self {
            suite_count: 1,
            event_count: 1,
            params: Vec::new(),
        }
    }

    /// Override the suite count.
    pub fn suite_count(mut self, count: i16) -> Self {
        self.suite_count = count;
        self
    }

    /// Override the event count.
    pub fn event_count(mut self, count: i16) -> Self {
        self.event_count = count;
        self
    }

    /// Append a parameter.
    pub fn param(mut self, name: &str, key: u32, flags: i16) -> Self {
        self.params.push((name.to_string(), key, flags));
        self
    }

    /// Serialize the resource.
    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&1i16.to_le_bytes());
        out.extend_from_slice(&[1, 0]);
        out.extend_from_slice(&0i16.to_le_bytes()); // language
        out.extend_from_slice(&0i16.to_le_bytes()); // script
        out.extend_from_slice(&self.suite_count.to_le_bytes());

        push_pascal_even(&mut out, "Example");
        push_pascal_even(&mut out, "Example filters");
        out.extend_from_slice(&crate::fourcc::fourcc(b"ExSu").to_le_bytes());
        out.extend_from_slice(&1i16.to_le_bytes());
        out.extend_from_slice(&1i16.to_le_bytes());
        out.extend_from_slice(&self.event_count.to_le_bytes());

        push_pascal_even(&mut out, "Example");
        push_pascal_even(&mut out, "Run the example filter");
        out.extend_from_slice(&crate::fourcc::fourcc(b"ExFl").to_le_bytes());
        out.extend_from_slice(&crate::fourcc::fourcc(b"ExEv").to_le_bytes());
        out.extend_from_slice(&crate::fourcc::fourcc(b"null").to_le_bytes());
        push_pascal_even(&mut out, "");
        out.extend_from_slice(&0i16.to_le_bytes());
        out.extend_from_slice(&crate::fourcc::fourcc(b"#ImR").to_le_bytes());
        push_pascal_even(&mut out, "image");
        out.extend_from_slice(&0i16.to_le_bytes());

        out.extend_from_slice(&(self.params.len() as i16).to_le_bytes());
        for (name, key, flags) in &self.params {
            push_pascal_even(&mut out, name);
            out.extend_from_slice(&key.to_le_bytes());
            out.extend_from_slice(&crate::fourcc::fourcc(b"long").to_le_bytes());
            push_pascal_even(&mut out, name);
            out.extend_from_slice(&flags.to_le_bytes());
        }
        out
    }
}

/// A BGRA surface filled with a deterministic gradient.
pub fn gradient_surface(width: u32, height: u32) -> OwnedSurface {
    let mut surface = OwnedSurface::new(width, height, PixelFormat::Bgra32);
    for y in 0..height {
        let row = surface.row_mut(y);
        for (x, px) in row.chunks_exact_mut(4).enumerate() {
            px[0] = (x * 255 / width.max(1) as usize) as u8;
            px[1] = (y as usize * 255 / height.max(1) as usize) as u8;
            px[2] = ((x + y as usize) % 256) as u8;
            px[3] = 0xFF;
        }
    }
    surface
}

fn pascal(s: &str) -> Vec<u8> {
    let bytes = &s.as_bytes()[..s.len().min(255)];
    let mut out = vec![bytes.len() as u8];
    out.extend_from_slice(bytes);
    out
}

fn c_string(s: &str) -> Vec<u8> {
    let mut out = s.as_bytes().to_vec();
    out.push(0);
    out
}

fn push_pascal_even(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&pascal(s));
    if out.len() % 2 != 0 {
        out.push(0);
    }
}
