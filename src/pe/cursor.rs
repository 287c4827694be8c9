//! Bounds-checked little-endian reader over a byte slice.
//!
//! Every read validates the requested length against what remains in the
//! slice, so embedded length fields can never index past the buffer.

use thiserror::Error;

/// Errors produced by [`ByteCursor`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CursorError {
    /// A read or seek would go past the end of the buffer.
    #[error("read of {wanted} bytes at offset {offset} exceeds buffer of {len} bytes")]
    OutOfBounds {
        /// Offset the read started at.
        offset: usize,
        /// Number of bytes requested.
        wanted: usize,
        /// Total buffer length.
        len: usize,
    },

    /// A length field was negative.
    #[error("negative length {0}")]
    NegativeLength(i64),

    /// A NUL-terminated string had no terminator.
    #[error("unterminated string at offset {0}")]
    Unterminated(usize),
}

/// A cursor over a borrowed byte buffer.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    /// Create a cursor positioned at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Create a cursor positioned at `offset`.
    pub fn at(data: &'a [u8], offset: usize) -> Result<Self, CursorError> {
        let mut cursor = Self::new(data);
        cursor.seek(offset)?;
        Ok(cursor)
    }

    /// Current position.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left after the current position.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Total length of the underlying buffer.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the underlying buffer is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Move to an absolute offset. Seeking to exactly the end is allowed.
    pub fn seek(&mut self, offset: usize) -> Result<(), CursorError> {
        if offset > self.data.len() {
            return Err(CursorError::OutOfBounds {
                offset,
                wanted: 0,
                len: self.data.len(),
            });
        }
        self.pos = offset;
        Ok(())
    }

    /// Advance by `count` bytes.
    pub fn skip(&mut self, count: usize) -> Result<(), CursorError> {
        self.take(count).map(|_| ())
    }

    /// Advance to the next multiple of `alignment`, relative to the buffer start.
    pub fn align(&mut self, alignment: usize) -> Result<(), CursorError> {
        let rem = self.pos % alignment;
        if rem != 0 {
            self.skip(alignment - rem)?;
        }
        Ok(())
    }

    /// Borrow the next `count` bytes.
    pub fn take(&mut self, count: usize) -> Result<&'a [u8], CursorError> {
        let end = self
            .pos
            .checked_add(count)
            .filter(|&end| end <= self.data.len())
            .ok_or(CursorError::OutOfBounds {
                offset: self.pos,
                wanted: count,
                len: self.data.len(),
            })?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    /// Borrow `len` bytes where `len` came from a signed length field.
    pub fn take_len(&mut self, len: i32) -> Result<&'a [u8], CursorError> {
        let count = usize::try_from(len).map_err(|_| CursorError::NegativeLength(len.into()))?;
        self.take(count)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], CursorError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Read a `u8`.
    pub fn read_u8(&mut self) -> Result<u8, CursorError> {
        Ok(self.array::<1>()?[0])
    }

    /// Read a little-endian `u16`.
    pub fn read_u16(&mut self) -> Result<u16, CursorError> {
        self.array().map(u16::from_le_bytes)
    }

    /// Read a little-endian `i16`.
    pub fn read_i16(&mut self) -> Result<i16, CursorError> {
        self.array().map(i16::from_le_bytes)
    }

    /// Read a little-endian `u32`.
    pub fn read_u32(&mut self) -> Result<u32, CursorError> {
        self.array().map(u32::from_le_bytes)
    }

    /// Read a little-endian `i32`.
    pub fn read_i32(&mut self) -> Result<i32, CursorError> {
        self.array().map(i32::from_le_bytes)
    }

    /// Read a little-endian `f64`.
    pub fn read_f64(&mut self) -> Result<f64, CursorError> {
        self.array().map(f64::from_le_bytes)
    }

    /// Read a Pascal string (one length byte followed by that many bytes).
    pub fn read_pascal(&mut self) -> Result<&'a [u8], CursorError> {
        let len = self.read_u8()?;
        self.take(usize::from(len))
    }

    /// Read a NUL-terminated string, consuming the terminator.
    pub fn read_c_str(&mut self) -> Result<&'a [u8], CursorError> {
        let rest = &self.data[self.pos..];
        let end = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(CursorError::Unterminated(self.pos))?;
        let bytes = &rest[..end];
        self.pos += end + 1;
        Ok(bytes)
    }
}

/// Decode single-byte text the way filter resources store it.
///
/// Resource strings are in the system ANSI code page; bytes above 0x7F are
/// mapped as Latin-1, which covers the Windows-1252 letters filters use.
pub fn decode_ansi(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_little_endian() {
        let data = [0x01, 0x02, 0x03, 0x04, 0xFF, 0xFF];
        let mut cursor = ByteCursor::new(&data);
        assert_eq!(cursor.read_u32().unwrap(), 0x0403_0201);
        assert_eq!(cursor.read_i16().unwrap(), -1);
        assert_eq!(cursor.remaining(), 0);
    }

    #[test]
    fn test_out_of_bounds_does_not_advance() {
        let data = [0u8; 3];
        let mut cursor = ByteCursor::new(&data);
        cursor.skip(2).unwrap();
        assert!(matches!(
            cursor.read_u16(),
            Err(CursorError::OutOfBounds { offset: 2, wanted: 2, len: 3 })
        ));
        assert_eq!(cursor.position(), 2);
    }

    #[test]
    fn test_negative_length_rejected() {
        let data = [0u8; 8];
        let mut cursor = ByteCursor::new(&data);
        assert_eq!(cursor.take_len(-4), Err(CursorError::NegativeLength(-4)));
    }

    #[test]
    fn test_huge_length_rejected() {
        let data = [0u8; 8];
        let mut cursor = ByteCursor::new(&data);
        assert!(cursor.take_len(i32::MAX).is_err());
    }

    #[test]
    fn test_pascal_and_c_strings() {
        let data = b"\x05Hello\0World\0";
        let mut cursor = ByteCursor::new(data);
        assert_eq!(cursor.read_pascal().unwrap(), b"Hello");
        assert_eq!(cursor.read_c_str().unwrap(), b"");
        assert_eq!(cursor.read_c_str().unwrap(), b"World");
        assert!(cursor.read_c_str().is_err());
    }

    #[test]
    fn test_align() {
        let data = [0u8; 8];
        let mut cursor = ByteCursor::new(&data);
        cursor.skip(1).unwrap();
        cursor.align(4).unwrap();
        assert_eq!(cursor.position(), 4);
        cursor.align(4).unwrap();
        assert_eq!(cursor.position(), 4);
    }

    #[test]
    fn test_decode_ansi_latin1() {
        assert_eq!(decode_ansi(b"Caf\xE9"), "Café");
    }
}
