//! Image modes and the flag sets filters use to advertise them.

use std::fmt;

/// Image modes a filter supports, as stored in the `mode` property.
///
/// The property is a big-endian bit string, so when the two bytes are read
/// as a little-endian `u16` the first eight modes land in the low byte in
/// reverse order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ImageModes(u16);

impl ImageModes {
    /// Bitmap.
    pub const BITMAP: Self = Self(0x0080);
    /// Grayscale.
    pub const GRAYSCALE: Self = Self(0x0040);
    /// Indexed colour.
    pub const INDEXED: Self = Self(0x0020);
    /// RGB colour.
    pub const RGB: Self = Self(0x0010);
    /// CMYK colour.
    pub const CMYK: Self = Self(0x0008);
    /// HSL colour.
    pub const HSL: Self = Self(0x0004);
    /// HSB colour.
    pub const HSB: Self = Self(0x0002);
    /// Multichannel.
    pub const MULTICHANNEL: Self = Self(0x0001);
    /// Duotone.
    pub const DUOTONE: Self = Self(0x8000);
    /// Lab colour.
    pub const LAB: Self = Self(0x4000);
    /// 16-bit grayscale.
    pub const GRAY16: Self = Self(0x2000);
    /// 48-bit RGB.
    pub const RGB48: Self = Self(0x1000);
    /// 48-bit Lab.
    pub const LAB48: Self = Self(0x0800);
    /// 64-bit CMYK.
    pub const CMYK64: Self = Self(0x0400);
    /// 16-bit multichannel.
    pub const DEEP_MULTICHANNEL: Self = Self(0x0200);
    /// 16-bit duotone.
    pub const DUOTONE16: Self = Self(0x0100);

    /// Wrap raw property flags.
    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    /// Raw flags.
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Whether every flag in `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Convert the legacy `supportsMode` field, which numbers modes from the
    /// least significant bit.
    pub fn from_legacy(supports_mode: i16) -> Self {
        const ORDER: [ImageModes; 10] = [
            ImageModes::BITMAP,
            ImageModes::GRAYSCALE,
            ImageModes::INDEXED,
            ImageModes::RGB,
            ImageModes::CMYK,
            ImageModes::HSL,
            ImageModes::HSB,
            ImageModes::MULTICHANNEL,
            ImageModes::DUOTONE,
            ImageModes::LAB,
        ];
        let raw = supports_mode as u16;
        ORDER
            .iter()
            .enumerate()
            .filter(|(bit, _)| raw & (1 << bit) != 0)
            .fold(Self::default(), |acc, (_, mode)| acc | *mode)
    }
}

impl std::ops::BitOr for ImageModes {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for ImageModes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ImageModes({:#06x})", self.0)
    }
}

/// A document image mode, numbered as filter interfaces number them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum ImageMode {
    /// 1-bit bitmap.
    Bitmap = 0,
    /// 8-bit grayscale.
    GrayScale = 1,
    /// Indexed colour.
    Indexed = 2,
    /// 8-bit RGB.
    Rgb = 3,
    /// 8-bit CMYK.
    Cmyk = 4,
    /// HSL.
    Hsl = 5,
    /// HSB.
    Hsb = 6,
    /// Multichannel.
    Multichannel = 7,
    /// Duotone.
    Duotone = 8,
    /// Lab.
    Lab = 9,
    /// 16-bit grayscale.
    Gray16 = 10,
    /// 16-bit RGB.
    Rgb48 = 11,
    /// 16-bit Lab.
    Lab48 = 12,
    /// 16-bit CMYK.
    Cmyk64 = 13,
    /// 16-bit multichannel.
    DeepMultichannel = 14,
    /// 16-bit duotone.
    Duotone16 = 15,
    /// 32-bit RGB.
    Rgb96 = 16,
    /// 32-bit grayscale.
    Gray32 = 17,
}

impl ImageMode {
    /// The `mode` property flag for this image mode, if it has one.
    pub fn flag(self) -> Option<ImageModes> {
        Some(match self {
            Self::Bitmap => ImageModes::BITMAP,
            Self::GrayScale => ImageModes::GRAYSCALE,
            Self::Indexed => ImageModes::INDEXED,
            Self::Rgb => ImageModes::RGB,
            Self::Cmyk => ImageModes::CMYK,
            Self::Hsl => ImageModes::HSL,
            Self::Hsb => ImageModes::HSB,
            Self::Multichannel => ImageModes::MULTICHANNEL,
            Self::Duotone => ImageModes::DUOTONE,
            Self::Lab => ImageModes::LAB,
            Self::Gray16 => ImageModes::GRAY16,
            Self::Rgb48 => ImageModes::RGB48,
            Self::Lab48 => ImageModes::LAB48,
            Self::Cmyk64 => ImageModes::CMYK64,
            Self::DeepMultichannel => ImageModes::DEEP_MULTICHANNEL,
            Self::Duotone16 => ImageModes::DUOTONE16,
            Self::Rgb96 | Self::Gray32 => return None,
        })
    }

    /// Look up a mode by the constant name used in enable-info expressions.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "BitmapMode" => Self::Bitmap,
            "GrayScaleMode" => Self::GrayScale,
            "IndexedMode" => Self::Indexed,
            "RGBMode" => Self::Rgb,
            "CMYKMode" => Self::Cmyk,
            "HSLMode" => Self::Hsl,
            "HSBMode" => Self::Hsb,
            "MultichannelMode" => Self::Multichannel,
            "DuotoneMode" => Self::Duotone,
            "LabMode" => Self::Lab,
            "Gray16Mode" => Self::Gray16,
            "RGB48Mode" => Self::Rgb48,
            "Lab48Mode" => Self::Lab48,
            "CMYK64Mode" => Self::Cmyk64,
            "DeepMultichannelMode" => Self::DeepMultichannel,
            "Duotone16Mode" => Self::Duotone16,
            "RGB96Mode" => Self::Rgb96,
            "Gray32Mode" => Self::Gray32,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_rgb_bit() {
        assert_eq!(ImageModes::from_legacy(8), ImageModes::RGB);
        let both = ImageModes::from_legacy(8 | 2);
        assert!(both.contains(ImageModes::RGB));
        assert!(both.contains(ImageModes::GRAYSCALE));
        assert!(!both.contains(ImageModes::CMYK));
    }

    #[test]
    fn test_mode_names() {
        assert_eq!(ImageMode::from_name("RGBMode"), Some(ImageMode::Rgb));
        assert_eq!(ImageMode::from_name("rgbmode"), None);
        assert_eq!(ImageMode::Rgb.flag(), Some(ImageModes::RGB));
        assert_eq!(ImageMode::Gray32.flag(), None);
    }
}
