//! Decoding of the `fici` property.
//!
//! Some resource compilers wrote the table as escaped text instead of raw
//! bytes, and some of those used `/x` where `\x` was meant. Both spellings
//! are accepted.

use crate::plugin::{FILTER_CASE_TABLE_SIZE, FilterCaseTable};
use thiserror::Error;

/// Errors that invalidate a filter case table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterCaseError {
    /// An escape denotes a value that does not fit in a byte.
    #[error("escaped value {0} is out of byte range")]
    ValueOutOfRange(u32),

    /// The decoded table has the wrong size.
    #[error("filter case table has {0} bytes, expected 28")]
    WrongSize(usize),
}

/// Decode the property data into a complete table.
pub fn decode_filter_case_info(data: &[u8]) -> Result<FilterCaseTable, FilterCaseError> {
    let bytes = if data.len() == FILTER_CASE_TABLE_SIZE && !starts_with_hex_escape(data) {
        data.to_vec()
    } else {
        unescape(data)?
    };
    FilterCaseTable::from_bytes(&bytes).ok_or(FilterCaseError::WrongSize(bytes.len()))
}

fn starts_with_hex_escape(data: &[u8]) -> bool {
    matches!(data, [b'\\' | b'/', b'x' | b'X', ..])
}

/// Expand C-style escapes in a NUL-terminated text table.
fn unescape(text: &[u8]) -> Result<Vec<u8>, FilterCaseError> {
    let text = match text.iter().position(|&b| b == 0) {
        Some(end) => &text[..end],
        None => text,
    };

    let mut out = Vec::with_capacity(FILTER_CASE_TABLE_SIZE);
    let mut i = 0;
    while i < text.len() {
        let b = text[i];
        let is_escape = b == b'\\' || b == b'/';
        if is_escape && i + 1 < text.len() {
            let next = text[i + 1];
            if matches!(next, b'x' | b'X') {
                let digits = text[i + 2..]
                    .iter()
                    .take_while(|d| d.is_ascii_hexdigit())
                    .count();
                if digits > 0 {
                    let value = text[i + 2..i + 2 + digits]
                        .iter()
                        .fold(0u32, |acc, d| {
                            acc.saturating_mul(16)
                                .saturating_add(hex_value(*d))
                        });
                    out.push(u8::try_from(value).map_err(|_| FilterCaseError::ValueOutOfRange(value))?);
                    i += 2 + digits;
                    continue;
                }
            } else if b == b'\\' && next.is_ascii_digit() && next < b'8' {
                let digits = text[i + 1..]
                    .iter()
                    .take(3)
                    .take_while(|d| (b'0'..b'8').contains(*d))
                    .count();
                let value = text[i + 1..i + 1 + digits]
                    .iter()
                    .fold(0u32, |acc, d| acc * 8 + u32::from(d - b'0'));
                out.push(u8::try_from(value).map_err(|_| FilterCaseError::ValueOutOfRange(value))?);
                i += 1 + digits;
                continue;
            } else if b == b'\\' && next == b'\\' {
                out.push(b'\\');
                i += 2;
                continue;
            }
        }
        out.push(b);
        i += 1;
    }
    Ok(out)
}

fn hex_value(digit: u8) -> u32 {
    match digit {
        b'0'..=b'9' => u32::from(digit - b'0'),
        b'a'..=b'f' => u32::from(digit - b'a' + 10),
        b'A'..=b'F' => u32::from(digit - b'A' + 10),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::FilterCase;

    fn escaped(prefix: &str, bytes: &[u8]) -> Vec<u8> {
        let mut text: String = bytes.iter().map(|b| format!("{prefix}x{b:02X}")).collect();
        text.push('\0');
        text.into_bytes()
    }

    fn sample_table() -> Vec<u8> {
        let mut bytes = vec![0u8; FILTER_CASE_TABLE_SIZE];
        for (i, chunk) in bytes.chunks_exact_mut(4).enumerate() {
            chunk[0] = 1 + i as u8 % 3;
            chunk[1] = 1;
            chunk[2] = (i as u8) & 0x03;
        }
        bytes
    }

    #[test]
    fn test_raw_table() {
        let table = decode_filter_case_info(&sample_table()).unwrap();
        assert_eq!(table.to_bytes(), sample_table());
    }

    #[test]
    fn test_backslash_and_slash_escapes_agree() {
        let raw = sample_table();
        let backslash = decode_filter_case_info(&escaped("\\", &raw)).unwrap();
        let slash = decode_filter_case_info(&escaped("/", &raw)).unwrap();
        assert_eq!(backslash, slash);
        assert_eq!(backslash.to_bytes(), raw);
        assert_eq!(
            backslash.get(FilterCase::FlatImageWithSelection).input_handling,
            2
        );
    }

    #[test]
    fn test_out_of_range_value_invalidates_table() {
        let mut text = escaped("\\", &sample_table());
        text.splice(0..4, b"\\x1FF".iter().copied());
        assert_eq!(
            decode_filter_case_info(&text),
            Err(FilterCaseError::ValueOutOfRange(0x1FF))
        );
    }

    #[test]
    fn test_wrong_count_invalidates_table() {
        let text = escaped("/", &sample_table()[..24]);
        assert_eq!(
            decode_filter_case_info(&text),
            Err(FilterCaseError::WrongSize(24))
        );
    }

    #[test]
    fn test_escaped_text_of_table_length_is_unescaped() {
        // Seven escapes are 28 bytes of text but only seven decoded bytes.
        let mut text = escaped("\\", &[1; 7]);
        text.pop();
        assert_eq!(text.len(), FILTER_CASE_TABLE_SIZE);
        assert_eq!(
            decode_filter_case_info(&text),
            Err(FilterCaseError::WrongSize(7))
        );
    }

    #[test]
    fn test_octal_and_literal_bytes() {
        assert_eq!(unescape(b"\\001\\\\a/b").unwrap(), b"\x01\\a/b");
    }
}
