//! Button identities and the flat hardware index

use std::fmt;

use super::{ButtonArea, MATRIX_COLUMNS, MATRIX_ROWS};
use crate::error::{MuxError, Result};

/// A single button: one area plus an ordinal inside that area
///
/// Ordering follows the flat hardware index, so a `BTreeMap<ButtonId, _>`
/// iterates matrix first, then horizontal, vertical and shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ButtonId {
    area: ButtonArea,
    ordinal: u8,
}

impl ButtonId {
    /// The shift key
    pub const SHIFT: ButtonId = ButtonId {
        area: ButtonArea::SHIFT,
        ordinal: 0,
    };

    /// Build a button id, validating that `area` is a single area and that
    /// `ordinal` lies within it
    pub fn new(area: ButtonArea, ordinal: u8) -> Result<Self> {
        let len = area
            .len()
            .ok_or_else(|| MuxError::out_of_range("area bits", area.bits(), "exactly one area"))?;
        if ordinal >= len {
            let valid = match len {
                64 => "0..64",
                8 => "0..8",
                _ => "0",
            };
            return Err(MuxError::out_of_range("ordinal", ordinal, valid));
        }
        Ok(Self { area, ordinal })
    }

    /// Unchecked constructor for callers that already iterate a valid range
    pub(crate) const fn from_parts(area: ButtonArea, ordinal: u8) -> Self {
        Self { area, ordinal }
    }

    /// Matrix button at `(col, row)`
    pub fn matrix(col: u8, row: u8) -> Result<Self> {
        Ok(Self::from_parts(ButtonArea::MATRIX, coords_to_ordinal(col, row)?))
    }

    pub fn horizontal(ordinal: u8) -> Result<Self> {
        Self::new(ButtonArea::HORIZONTAL, ordinal)
    }

    pub fn vertical(ordinal: u8) -> Result<Self> {
        Self::new(ButtonArea::VERTICAL, ordinal)
    }

    pub fn area(self) -> ButtonArea {
        self.area
    }

    pub fn ordinal(self) -> u8 {
        self.ordinal
    }

    /// Matrix coordinates, `None` outside the matrix
    pub fn coords(self) -> Option<(u8, u8)> {
        if self.area == ButtonArea::MATRIX {
            ordinal_to_coords(self.ordinal).ok()
        } else {
            None
        }
    }

    pub fn is_shift(self) -> bool {
        self.area == ButtonArea::SHIFT
    }

    /// Flat hardware index (the MIDI note number on the APC mini)
    pub fn to_index(self) -> u8 {
        self.area.offset().unwrap_or(0) + self.ordinal
    }

    /// Inverse of [`ButtonId::to_index`]; unmapped indices are `OutOfRange`
    pub fn from_index(index: u8) -> Result<Self> {
        ButtonArea::ALL
            .split()
            .find_map(|area| {
                let offset = area.offset()?;
                let len = area.len()?;
                (index >= offset && index < offset + len)
                    .then(|| Self::from_parts(area, index - offset))
            })
            .ok_or_else(|| MuxError::out_of_range("flat index", index, "0..72, 82..90 or 98"))
    }
}

impl fmt::Display for ButtonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.coords() {
            Some((col, row)) => write!(f, "matrix({},{})", col, row),
            None => write!(f, "{}[{}]", self.area, self.ordinal),
        }
    }
}

/// Matrix `(col, row)` to ordinal (`row * 8 + col`)
pub fn coords_to_ordinal(col: u8, row: u8) -> Result<u8> {
    if col >= MATRIX_COLUMNS {
        return Err(MuxError::out_of_range("column", col, "0..8"));
    }
    if row >= MATRIX_ROWS {
        return Err(MuxError::out_of_range("row", row, "0..8"));
    }
    Ok(row * MATRIX_COLUMNS + col)
}

/// Matrix ordinal to `(col, row)`
pub fn ordinal_to_coords(ordinal: u8) -> Result<(u8, u8)> {
    if ordinal >= MATRIX_COLUMNS * MATRIX_ROWS {
        return Err(MuxError::out_of_range("matrix ordinal", ordinal, "0..64"));
    }
    Ok((ordinal % MATRIX_COLUMNS, ordinal / MATRIX_COLUMNS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_fixed_offsets() {
        assert_eq!(ButtonId::matrix(0, 0).unwrap().to_index(), 0);
        assert_eq!(ButtonId::matrix(7, 7).unwrap().to_index(), 63);
        assert_eq!(ButtonId::horizontal(0).unwrap().to_index(), 64);
        assert_eq!(ButtonId::vertical(7).unwrap().to_index(), 89);
        assert_eq!(ButtonId::SHIFT.to_index(), 98);
    }

    #[test]
    fn test_unmapped_indices_rejected() {
        for index in (72..82).chain(90..98).chain(99..=255) {
            let err = ButtonId::from_index(index).unwrap_err();
            assert!(err.is_out_of_range(), "index {} should be unmapped", index);
        }
    }

    #[test]
    fn test_construction_validates_ordinal() {
        assert!(ButtonId::new(ButtonArea::MATRIX, 64).unwrap_err().is_out_of_range());
        assert!(ButtonId::new(ButtonArea::HORIZONTAL, 8).is_err());
        assert!(ButtonId::new(ButtonArea::SHIFT, 1).is_err());
        assert!(ButtonId::new(ButtonArea::SHIFT, 0).unwrap().is_shift());
        // Combined areas are not a valid button area
        assert!(ButtonId::new(ButtonArea::MATRIX | ButtonArea::VERTICAL, 0).is_err());
    }

    #[test]
    fn test_out_of_range_coordinates() {
        assert!(coords_to_ordinal(8, 0).is_err());
        assert!(coords_to_ordinal(0, 8).is_err());
        assert!(ordinal_to_coords(64).is_err());
        assert_eq!(coords_to_ordinal(3, 2).unwrap(), 19);
        assert_eq!(ordinal_to_coords(19).unwrap(), (3, 2));
    }

    #[test]
    fn test_display() {
        assert_eq!(ButtonId::matrix(2, 5).unwrap().to_string(), "matrix(2,5)");
        assert_eq!(ButtonId::vertical(3).unwrap().to_string(), "vertical[3]");
        assert_eq!(ButtonId::SHIFT.to_string(), "shift[0]");
    }

    #[test]
    fn test_ordering_follows_flat_index() {
        let mut ids: Vec<_> = ButtonArea::ALL.buttons().collect();
        ids.reverse();
        ids.sort();
        let indices: Vec<_> = ids.iter().map(|id| id.to_index()).collect();
        let mut sorted = indices.clone();
        sorted.sort();
        assert_eq!(indices, sorted);
    }

    proptest! {
        #[test]
        fn prop_index_roundtrip(index in 0u8..=255) {
            if let Ok(id) = ButtonId::from_index(index) {
                prop_assert_eq!(id.to_index(), index);
            }
        }

        #[test]
        fn prop_id_roundtrip(area_ix in 0usize..4, ordinal in 0u8..64) {
            let area = [ButtonArea::MATRIX, ButtonArea::HORIZONTAL, ButtonArea::VERTICAL, ButtonArea::SHIFT][area_ix];
            if let Ok(id) = ButtonId::new(area, ordinal) {
                prop_assert_eq!(ButtonId::from_index(id.to_index()).unwrap(), id);
            }
        }

        #[test]
        fn prop_coords_roundtrip(col in 0u8..8, row in 0u8..8) {
            let ordinal = coords_to_ordinal(col, row).unwrap();
            prop_assert!(ordinal < 64);
            prop_assert_eq!(ordinal_to_coords(ordinal).unwrap(), (col, row));
        }
    }
}
