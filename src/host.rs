//! Host-side collaborators: image surfaces, metadata, UI and progress.
//!
//! The host application provides these; filterbridge only reads source
//! rows, writes destination rows and asks for metadata when a filter does.

use std::cell::OnceCell;
use std::fmt;

/// Pixel layout of a surface, with its wire tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PixelFormat {
    /// 8-bit blue, green, red, alpha.
    Bgra32 = 0,
    /// 8-bit gray, used for selection masks.
    Gray8 = 1,
}

impl PixelFormat {
    /// Bytes per pixel.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Bgra32 => 4,
            Self::Gray8 => 1,
        }
    }

    /// The wire tag.
    pub fn tag(self) -> u32 {
        self as u32
    }

    /// Decode a wire tag.
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(Self::Bgra32),
            1 => Some(Self::Gray8),
            _ => None,
        }
    }
}

/// A row-addressable image.
pub trait ImageSurface {
    /// Width in pixels.
    fn width(&self) -> u32;

    /// Height in rows.
    fn height(&self) -> u32;

    /// Distance between row starts, in bytes.
    fn stride(&self) -> usize;

    /// Pixel layout.
    fn format(&self) -> PixelFormat;

    /// Pixel bytes of row `y`, without stride padding.
    ///
    /// Panics when `y` is out of range.
    fn row(&self, y: u32) -> &[u8];

    /// Bytes of pixel data in one row.
    fn row_len(&self) -> usize {
        self.width() as usize * self.format().bytes_per_pixel()
    }
}

/// A surface that can be written.
pub trait ImageSurfaceMut: ImageSurface {
    /// Mutable pixel bytes of row `y`.
    fn row_mut(&mut self, y: u32) -> &mut [u8];

    /// Copy `source` into this surface row by row.
    ///
    /// Both surfaces must have the same dimensions and format.
    fn copy_from(&mut self, source: &dyn ImageSurface) -> bool {
        if source.width() != self.width()
            || source.height() != self.height()
            || source.format() != self.format()
        {
            return false;
        }
        for y in 0..self.height() {
            self.row_mut(y).copy_from_slice(source.row(y));
        }
        true
    }
}

/// A surface owning its pixels.
#[derive(Clone, PartialEq, Eq)]
pub struct OwnedSurface {
    width: u32,
    height: u32,
    stride: usize,
    format: PixelFormat,
    data: Vec<u8>,
}

impl OwnedSurface {
    /// A zeroed surface with tightly packed rows.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let stride = width as usize * format.bytes_per_pixel();
        Self {
            width,
            height,
            stride,
            format,
            data: vec![0; stride * height as usize],
        }
    }

    /// Wrap existing pixel data.
    ///
    /// Returns `None` when `stride` is shorter than a row or `data` is
    /// shorter than `height` rows.
    pub fn from_parts(
        width: u32,
        height: u32,
        stride: usize,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> Option<Self> {
        let row_len = width as usize * format.bytes_per_pixel();
        let needed = stride.checked_mul(height as usize)?;
        if stride < row_len || data.len() < needed {
            return None;
        }
        Some(Self {
            width,
            height,
            stride,
            format,
            data,
        })
    }

    /// Copy any surface.
    pub fn from_surface(source: &dyn ImageSurface) -> Self {
        let mut surface = Self::new(source.width(), source.height(), source.format());
        surface.copy_from(source);
        surface
    }

    /// All bytes, including stride padding.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consume the surface.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

impl ImageSurface for OwnedSurface {
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
        let start = y as usize * self.stride;
        &self.data[start..start + self.row_len()]
    }
}

impl ImageSurfaceMut for OwnedSurface {
    fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let start = y as usize * self.stride;
        let len = self.row_len();
        &mut self.data[start..start + len]
    }
}

impl fmt::Debug for OwnedSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedSurface")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

/// Edge length of a checkerboard tile.
pub const CHECKERBOARD_TILE: u32 = 8;

/// The backdrop drawn behind transparent pixels.
pub fn checkerboard(width: u32, height: u32) -> OwnedSurface {
    let mut surface = OwnedSurface::new(width, height, PixelFormat::Bgra32);
    for y in 0..height {
        let row = surface.row_mut(y);
        for (x, px) in row.chunks_exact_mut(4).enumerate() {
            let dark = ((x as u32 / CHECKERBOARD_TILE) + (y / CHECKERBOARD_TILE)) % 2 == 1;
            let value = if dark { 0xCC } else { 0xFF };
            px.copy_from_slice(&[value, value, value, 0xFF]);
        }
    }
    surface
}

/// Supplies document metadata on demand.
pub trait MetadataProvider {
    /// EXIF block.
    fn exif(&self) -> Option<Vec<u8>>;

    /// XMP packet.
    fn xmp(&self) -> Option<Vec<u8>>;

    /// ICC colour profile.
    fn icc_profile(&self) -> Option<Vec<u8>>;
}

impl<P: MetadataProvider + ?Sized> MetadataProvider for &P {
    fn exif(&self) -> Option<Vec<u8>> {
        (**self).exif()
    }

    fn xmp(&self) -> Option<Vec<u8>> {
        (**self).xmp()
    }

    fn icc_profile(&self) -> Option<Vec<u8>> {
        (**self).icc_profile()
    }
}

/// A provider with no metadata.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMetadata;

impl MetadataProvider for NoMetadata {
    fn exif(&self) -> Option<Vec<u8>> {
        None
    }

    fn xmp(&self) -> Option<Vec<u8>> {
        None
    }

    fn icc_profile(&self) -> Option<Vec<u8>> {
        None
    }
}

/// Asks a provider at most once per block.
pub struct CachedMetadata<P> {
    provider: P,
    exif: OnceCell<Option<Vec<u8>>>,
    xmp: OnceCell<Option<Vec<u8>>>,
    icc_profile: OnceCell<Option<Vec<u8>>>,
}

impl<P: MetadataProvider> CachedMetadata<P> {
    /// Wrap `provider`.
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            exif: OnceCell::new(),
            xmp: OnceCell::new(),
            icc_profile: OnceCell::new(),
        }
    }

    /// EXIF block.
    pub fn exif(&self) -> Option<&[u8]> {
        self.exif.get_or_init(|| self.provider.exif()).as_deref()
    }

    /// XMP packet.
    pub fn xmp(&self) -> Option<&[u8]> {
        self.xmp.get_or_init(|| self.provider.xmp()).as_deref()
    }

    /// ICC colour profile.
    pub fn icc_profile(&self) -> Option<&[u8]> {
        self.icc_profile
            .get_or_init(|| self.provider.icc_profile())
            .as_deref()
    }
}

impl<P> fmt::Debug for CachedMetadata<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedMetadata")
            .field("exif", &self.exif.get().map(Option::is_some))
            .field("xmp", &self.xmp.get().map(Option::is_some))
            .field("icc_profile", &self.icc_profile.get().map(Option::is_some))
            .finish()
    }
}

impl<P: MetadataProvider> MetadataProvider for CachedMetadata<P> {
    fn exif(&self) -> Option<Vec<u8>> {
        CachedMetadata::exif(self).map(<[u8]>::to_vec)
    }

    fn xmp(&self) -> Option<Vec<u8>> {
        CachedMetadata::xmp(self).map(<[u8]>::to_vec)
    }

    fn icc_profile(&self) -> Option<Vec<u8>> {
        CachedMetadata::icc_profile(self).map(<[u8]>::to_vec)
    }
}

/// What the host UI shell tells a filter invocation.
pub trait HostUi {
    /// Native handle of the window dialogs are parented to; 0 for none.
    fn parent_window(&self) -> isize;

    /// Whether only the About box should be shown.
    fn about_only(&self) -> bool;
}

/// A fixed [`HostUi`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HostWindow {
    /// Parent window handle.
    pub parent: isize,
    /// Show the About box only.
    pub about_only: bool,
}

impl HostUi for HostWindow {
    fn parent_window(&self) -> isize {
        self.parent
    }

    fn about_only(&self) -> bool {
        self.about_only
    }
}

/// Receives filter progress.
pub trait ProgressSink {
    /// `done` out of `total` units are complete.
    fn report(&self, done: i32, total: i32);
}

impl<F: Fn(i32, i32)> ProgressSink for F {
    fn report(&self, done: i32, total: i32) {
        self(done, total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_padded_rows() {
        let data = (0u8..24).collect::<Vec<_>>();
        let surface = OwnedSurface::from_parts(2, 3, 8, PixelFormat::Gray8, data).unwrap();
        assert_eq!(surface.row(1), &[8, 9]);
        assert_eq!(surface.row_len(), 2);
        assert!(OwnedSurface::from_parts(4, 3, 2, PixelFormat::Gray8, vec![0; 24]).is_none());
        assert!(OwnedSurface::from_parts(2, 3, 8, PixelFormat::Gray8, vec![0; 23]).is_none());

        let packed = OwnedSurface::from_surface(&surface);
        assert_eq!(packed.stride(), 2);
        assert_eq!(packed.row(2), &[16, 17]);
    }

    #[test]
    fn test_checkerboard_tiles() {
        let board = checkerboard(16, 16);
        assert_eq!(board.row(0)[0], 0xFF);
        assert_eq!(board.row(0)[8 * 4], 0xCC);
        assert_eq!(board.row(8)[0], 0xCC);
        assert_eq!(board.row(8)[8 * 4], 0xFF);
        assert_eq!(board.row(3)[3], 0xFF);
    }

    #[test]
    fn test_cached_metadata_asks_once() {
        struct Counting(Cell<u32>);
        impl MetadataProvider for Counting {
            fn exif(&self) -> Option<Vec<u8>> {
                self.0.set(self.0.get() + 1);
                Some(vec![1, 2, 3])
            }
            fn xmp(&self) -> Option<Vec<u8>> {
                None
            }
            fn icc_profile(&self) -> Option<Vec<u8>> {
                None
            }
        }

        let cached = CachedMetadata::new(Counting(Cell::new(0)));
        assert_eq!(cached.exif(), Some(&[1u8, 2, 3][..]));
        assert_eq!(cached.exif(), Some(&[1u8, 2, 3][..]));
        assert_eq!(cached.provider.0.get(), 1);
        assert!(cached.xmp().is_none());
    }

    #[test]
    fn test_pixel_format_tags() {
        assert_eq!(PixelFormat::from_tag(PixelFormat::Gray8.tag()), Some(PixelFormat::Gray8));
        assert_eq!(PixelFormat::from_tag(7), None);
    }
}
