//! Images shared between host and worker through mapped files.
//!
//! Layout: a 16-byte header `{ width, height, stride, format }` (all `u32`
//! little-endian) followed by `height * stride` bytes of rows.

use super::BridgeError;
use crate::host::{ImageSurface, ImageSurfaceMut, OwnedSurface, PixelFormat};
use crate::memory::MappedFile;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

/// Size of the mapping header.
pub const HEADER_LEN: usize = 16;

/// Longest accepted mapping name.
pub const MAX_NAME_LEN: usize = 64;

/// Check that `name` is a plain file name safe to resolve under the
/// runtime directory.
pub fn validate_name(name: &str) -> Result<(), BridgeError> {
    let valid = !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && !name.starts_with('.')
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'));
    if valid {
        Ok(())
    } else {
        Err(BridgeError::BadMappingName(name.to_string()))
    }
}

/// A fresh mapping name unique within this process.
pub fn unique_name(kind: &str) -> String {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    let n = NEXT.fetch_add(1, Ordering::Relaxed);
    format!("fb-{}-{}-{}", std::process::id(), n, kind)
}

/// An image in a shared mapping.
#[derive(Debug)]
pub struct ImageMapping {
    name: String,
    file: MappedFile,
    width: u32,
    height: u32,
    stride: usize,
    format: PixelFormat,
}

impl ImageMapping {
    /// Create a zeroed image mapping named `name` under `dir`.
    ///
    /// The file is removed when the mapping is dropped.
    pub fn create(
        dir: &Path,
        name: &str,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<Self, BridgeError> {
        validate_name(name)?;
        let stride = width as usize * format.bytes_per_pixel();
        let body = stride
            .checked_mul(height as usize)
            .ok_or_else(|| BridgeError::BadMapping(format!("{name}: image too large")))?;
        let stride_tag = u32::try_from(stride)
            .map_err(|_| BridgeError::BadMapping(format!("{name}: row too wide")))?;

        let mut file = MappedFile::create(dir.join(name), HEADER_LEN + body)?;
        let header = file.as_mut_slice();
        header[0..4].copy_from_slice(&width.to_le_bytes());
        header[4..8].copy_from_slice(&height.to_le_bytes());
        header[8..12].copy_from_slice(&stride_tag.to_le_bytes());
        header[12..16].copy_from_slice(&format.tag().to_le_bytes());

        Ok(Self {
            name: name.to_string(),
            file,
            width,
            height,
            stride,
            format,
        })
    }

    /// Create a mapping holding a copy of `surface`.
    pub fn from_surface(dir: &Path, name: &str, surface: &dyn ImageSurface) -> Result<Self, BridgeError> {
        let mut mapping = Self::create(dir, name, surface.width(), surface.height(), surface.format())?;
        mapping.copy_from(surface);
        Ok(mapping)
    }

    /// Open a mapping created by the other process.
    ///
    /// The header must describe a body that fits in the file.
    pub fn open(dir: &Path, name: &str) -> Result<Self, BridgeError> {
        validate_name(name)?;
        let file = MappedFile::open(dir.join(name))?;
        let bytes = file.as_slice();
        if bytes.len() < HEADER_LEN {
            return Err(BridgeError::BadMapping(format!("{name}: no header")));
        }
        let word = |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
        let (width, height, stride, tag) = (word(0), word(4), word(8) as usize, word(12));

        let format = PixelFormat::from_tag(tag)
            .ok_or_else(|| BridgeError::BadMapping(format!("{name}: pixel format {tag}")))?;
        if stride < width as usize * format.bytes_per_pixel() {
            return Err(BridgeError::BadMapping(format!("{name}: stride {stride} too short")));
        }
        let fits = stride
            .checked_mul(height as usize)
            .and_then(|body| body.checked_add(HEADER_LEN))
            .is_some_and(|needed| needed <= bytes.len());
        if !fits {
            return Err(BridgeError::BadMapping(format!("{name}: truncated")));
        }

        Ok(Self {
            name: name.to_string(),
            file,
            width,
            height,
            stride,
            format,
        })
    }

    /// Mapping name sent over the pipe.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Copy the image out of shared memory.
    pub fn to_surface(&self) -> OwnedSurface {
        OwnedSurface::from_surface(self)
    }

    fn row_range(&self, y: u32) -> std::ops::Range<usize> {
        assert!(y < self.height, "row {y} out of range");
        let start = HEADER_LEN + y as usize * self.stride;
        start..start + self.row_len()
    }
}

impl ImageSurface for ImageMapping {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn stride(&self) -> usize {
        self.stride
    }

    fn format(&self) -> PixelFormat {
        self.format
    }

    fn row(&self, y: u32) -> &[u8] {
        let range = self.row_range(y);
        &self.file.as_slice()[range]
    }
}

impl ImageSurfaceMut for ImageMapping {
    fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let range = self.row_range(y);
        &mut self.file.as_mut_slice()[range]
    }
}
