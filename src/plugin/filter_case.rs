//! Per-case input and output handling declared by a filter.

/// Number of filter cases a `fici` table describes.
pub const FILTER_CASE_COUNT: usize = 7;
/// Encoded size of one [`FilterCaseInfo`] record.
pub const FILTER_CASE_INFO_SIZE: usize = 4;
/// Encoded size of a complete table.
pub const FILTER_CASE_TABLE_SIZE: usize = FILTER_CASE_COUNT * FILTER_CASE_INFO_SIZE;

/// The situation a filter is invoked in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum FilterCase {
    /// Flattened image, no selection.
    FlatImageNoSelection = 1,
    /// Flattened image with a selection.
    FlatImageWithSelection = 2,
    /// A floating selection.
    FloatingSelection = 3,
    /// Layer with editable transparency, no selection.
    EditableTransparencyNoSelection = 4,
    /// Layer with editable transparency and a selection.
    EditableTransparencyWithSelection = 5,
    /// Layer with locked transparency, no selection.
    ProtectedTransparencyNoSelection = 6,
    /// Layer with locked transparency and a selection.
    ProtectedTransparencyWithSelection = 7,
}

impl FilterCase {
    /// The case for an image with or without a selection and transparency.
    pub fn for_image(has_selection: bool, has_transparency: bool) -> Self {
        match (has_transparency, has_selection) {
            (false, false) => Self::FlatImageNoSelection,
            (false, true) => Self::FlatImageWithSelection,
            (true, false) => Self::EditableTransparencyNoSelection,
            (true, true) => Self::EditableTransparencyWithSelection,
        }
    }

    /// Decode the numeric case.
    pub fn from_i16(value: i16) -> Option<Self> {
        Some(match value {
            1 => Self::FlatImageNoSelection,
            2 => Self::FlatImageWithSelection,
            3 => Self::FloatingSelection,
            4 => Self::EditableTransparencyNoSelection,
            5 => Self::EditableTransparencyWithSelection,
            6 => Self::ProtectedTransparencyNoSelection,
            7 => Self::ProtectedTransparencyWithSelection,
            _ => return None,
        })
    }

    /// Zero-based index into a `fici` table.
    pub fn index(self) -> usize {
        self as usize - 1
    }

    /// Whether this case hands the filter an alpha channel.
    pub fn has_transparency(self) -> bool {
        !matches!(
            self,
            Self::FlatImageNoSelection | Self::FlatImageWithSelection
        )
    }

    /// The flat-image case with the same selection state.
    pub fn flattened(self) -> Self {
        match self {
            Self::FlatImageNoSelection
            | Self::EditableTransparencyNoSelection
            | Self::ProtectedTransparencyNoSelection => Self::FlatImageNoSelection,
            _ => Self::FlatImageWithSelection,
        }
    }
}

/// How a filter treats the pixels of one case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FilterCaseInfo {
    /// How input pixels are prepared; `0` means the case is unsupported.
    pub input_handling: i8,
    /// How output pixels are merged back.
    pub output_handling: i8,
    /// Behaviour flags.
    pub flags1: u8,
    /// Reserved.
    pub flags2: u8,
}

impl FilterCaseInfo {
    /// `inputHandling` value of a filter that cannot handle a case.
    pub const CANNOT_HANDLE: i8 = 0;
    /// Do not copy the source into the destination before filtering.
    pub const DONT_COPY_TO_DESTINATION: u8 = 1 << 0;
    /// The filter works with blank (fully transparent) data.
    pub const WORKS_WITH_BLANK_DATA: u8 = 1 << 1;
    /// The filter also processes the layer mask.
    pub const FILTERS_LAYER_MASK: u8 = 1 << 2;
    /// The filter writes outside the selection.
    pub const WRITES_OUTSIDE_SELECTION: u8 = 1 << 3;

    /// Decode one four-byte record.
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self {
            input_handling: bytes[0] as i8,
            output_handling: bytes[1] as i8,
            flags1: bytes[2],
            flags2: bytes[3],
        }
    }

    /// Encode one four-byte record.
    pub fn to_bytes(self) -> [u8; 4] {
        [
            self.input_handling as u8,
            self.output_handling as u8,
            self.flags1,
            self.flags2,
        ]
    }

    /// Whether the filter accepts this case.
    pub fn is_supported(self) -> bool {
        self.input_handling != Self::CANNOT_HANDLE
    }
}

/// The complete seven-record table; partial tables never exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FilterCaseTable([FilterCaseInfo; FILTER_CASE_COUNT]);

impl FilterCaseTable {
    /// Wrap seven decoded records.
    pub fn new(records: [FilterCaseInfo; FILTER_CASE_COUNT]) -> Self {
        Self(records)
    }

    /// Decode exactly [`FILTER_CASE_TABLE_SIZE`] bytes.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != FILTER_CASE_TABLE_SIZE {
            return None;
        }
        let mut records = [FilterCaseInfo::default(); FILTER_CASE_COUNT];
        for (record, chunk) in records
            .iter_mut()
            .zip(bytes.chunks_exact(FILTER_CASE_INFO_SIZE))
        {
            *record = FilterCaseInfo::from_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Some(Self(records))
    }

    /// Encode the table.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.iter().flat_map(|r| r.to_bytes()).collect()
    }

    /// Record for one case.
    pub fn get(&self, case: FilterCase) -> FilterCaseInfo {
        self.0[case.index()]
    }

    /// All records in case order.
    pub fn records(&self) -> &[FilterCaseInfo; FILTER_CASE_COUNT] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_for_image() {
        assert_eq!(FilterCase::for_image(false, false), FilterCase::FlatImageNoSelection);
        assert_eq!(
            FilterCase::for_image(true, true),
            FilterCase::EditableTransparencyWithSelection
        );
        assert_eq!(
            FilterCase::EditableTransparencyWithSelection.flattened(),
            FilterCase::FlatImageWithSelection
        );
        assert_eq!(FilterCase::ProtectedTransparencyWithSelection.index(), 6);
    }

    #[test]
    fn test_table_requires_exact_size() {
        assert!(FilterCaseTable::from_bytes(&[0u8; 27]).is_none());
        assert!(FilterCaseTable::from_bytes(&[0u8; 29]).is_none());

        let mut bytes = [0u8; FILTER_CASE_TABLE_SIZE];
        bytes[12] = 2; // editable transparency, no selection: black matte
        let table = FilterCaseTable::from_bytes(&bytes).unwrap();
        assert!(table.get(FilterCase::EditableTransparencyNoSelection).is_supported());
        assert!(!table.get(FilterCase::FlatImageNoSelection).is_supported());
        assert_eq!(table.to_bytes(), bytes);
    }
}
