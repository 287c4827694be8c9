//! Four-character codes.
//!
//! Plugin resources and suite error codes use multi-character constants
//! such as `'8BIM'`. A Windows compiler stores them as a native `u32` whose
//! most significant byte is the first character, so they appear
//! byte-reversed in little-endian resource data.

use std::fmt;

/// Build the integer value of a four-character constant.
#[inline]
pub const fn fourcc(code: &[u8; 4]) -> u32 {
    u32::from_be_bytes(*code)
}

/// Displays a `u32` as its four characters when they are printable.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct FourCc(pub u32);

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.0.to_be_bytes();
        if bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
            for b in bytes {
                write!(f, "{}", char::from(b))?;
            }
            Ok(())
        } else {
            write!(f, "{:#010x}", self.0)
        }
    }
}

impl fmt::Debug for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{self}'")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fourcc_value() {
        assert_eq!(fourcc(b"8BIM"), 0x3842_494D);
        assert_eq!(fourcc(b"kind").to_le_bytes(), *b"dnik");
    }

    #[test]
    fn test_display() {
        assert_eq!(FourCc(fourcc(b"8BFM")).to_string(), "8BFM");
        assert_eq!(FourCc(1).to_string(), "0x00000001");
        assert_eq!(format!("{:?}", FourCc(fourcc(b"    "))), "'    '");
    }
}
