//! Button areas of the APC mini
//!
//! An area is one of the independent interaction zones of the device. Areas
//! combine like flags: a plugin registration may span several of them, and
//! [`ButtonArea::split`] breaks a combination back into its members in the
//! fixed order matrix, horizontal, vertical, shift.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, Sub};
use std::str::FromStr;

use thiserror::Error;

use super::ButtonId;

/// Static layout of a single area: flat index offset, button count and name
struct AreaInfo {
    area: ButtonArea,
    offset: u8,
    count: u8,
    name: &'static str,
}

const LAYOUT: [AreaInfo; 4] = [
    AreaInfo { area: ButtonArea::MATRIX, offset: 0, count: 64, name: "matrix" },
    AreaInfo { area: ButtonArea::HORIZONTAL, offset: 64, count: 8, name: "horizontal" },
    AreaInfo { area: ButtonArea::VERTICAL, offset: 82, count: 8, name: "vertical" },
    AreaInfo { area: ButtonArea::SHIFT, offset: 98, count: 1, name: "shift" },
];

/// A set of button areas (bitset semantics)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ButtonArea(u8);

impl ButtonArea {
    /// No area at all
    pub const EMPTY: Self = Self(0);
    /// The 8x8 tri-color button matrix
    pub const MATRIX: Self = Self(0b0001);
    /// The round buttons above the faders (faders follow this area)
    pub const HORIZONTAL: Self = Self(0b0010);
    /// The round buttons right of the matrix
    pub const VERTICAL: Self = Self(0b0100);
    /// The shift key, reserved for scene switching
    pub const SHIFT: Self = Self(0b1000);
    /// Every area a plugin may register on
    pub const PLUGIN_AREAS: Self = Self(0b0111);
    /// Every area of the device
    pub const ALL: Self = Self(0b1111);

    /// Raw flag bits
    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if every area of `other` is also in `self`
    pub const fn contains(self, other: ButtonArea) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if `self` and `other` share at least one area
    pub const fn intersects(self, other: ButtonArea) -> bool {
        self.0 & other.0 != 0
    }

    /// True if this set holds exactly one area
    pub const fn is_single(self) -> bool {
        self.0.count_ones() == 1
    }

    /// Decompose into singleton areas in declaration order
    pub fn split(self) -> impl Iterator<Item = ButtonArea> {
        LAYOUT
            .iter()
            .map(|info| info.area)
            .filter(move |area| self.intersects(*area))
    }

    fn info(self) -> Option<&'static AreaInfo> {
        LAYOUT.iter().find(|info| info.area == self)
    }

    /// Flat index of ordinal 0 (single areas only)
    pub fn offset(self) -> Option<u8> {
        self.info().map(|info| info.offset)
    }

    /// Number of buttons in this area (single areas only)
    pub fn len(self) -> Option<u8> {
        self.info().map(|info| info.count)
    }

    /// Lowercase name (single areas only)
    pub fn name(self) -> Option<&'static str> {
        self.info().map(|info| info.name)
    }

    /// Total number of buttons over all member areas
    pub fn button_count(self) -> usize {
        LAYOUT
            .iter()
            .filter(|info| self.intersects(info.area))
            .map(|info| info.count as usize)
            .sum()
    }

    /// Every button of every member area, in split order then ordinal order
    pub fn buttons(self) -> impl Iterator<Item = ButtonId> {
        LAYOUT
            .iter()
            .filter(move |info| self.intersects(info.area))
            .flat_map(|info| (0..info.count).map(move |ordinal| ButtonId::from_parts(info.area, ordinal)))
    }
}

impl BitOr for ButtonArea {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ButtonArea {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for ButtonArea {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl Sub for ButtonArea {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0 & !rhs.0)
    }
}

impl fmt::Display for ButtonArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        let names: Vec<&str> = self.split().filter_map(|area| area.name()).collect();
        write!(f, "{}", names.join("|"))
    }
}

impl fmt::Debug for ButtonArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ButtonArea({})", self)
    }
}

/// Error returned when an area name cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown button area '{0}' (expected matrix, horizontal, vertical or shift)")]
pub struct ParseAreaError(pub String);

impl FromStr for ButtonArea {
    type Err = ParseAreaError;

    /// Parses a single name or a `|`-separated combination, case-insensitive
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut areas = ButtonArea::EMPTY;
        for part in s.split('|') {
            let part = part.trim();
            let info = LAYOUT
                .iter()
                .find(|info| info.name.eq_ignore_ascii_case(part))
                .ok_or_else(|| ParseAreaError(part.to_string()))?;
            areas |= info.area;
        }
        Ok(areas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_order_is_fixed() {
        let areas = ButtonArea::VERTICAL | ButtonArea::MATRIX | ButtonArea::HORIZONTAL;
        let split: Vec<_> = areas.split().collect();
        assert_eq!(
            split,
            vec![ButtonArea::MATRIX, ButtonArea::HORIZONTAL, ButtonArea::VERTICAL]
        );
        assert!(split.iter().all(|a| a.is_single()));
    }

    #[test]
    fn test_contains_and_difference() {
        let areas = ButtonArea::MATRIX | ButtonArea::HORIZONTAL;
        assert!(areas.contains(ButtonArea::MATRIX));
        assert!(!areas.contains(ButtonArea::MATRIX | ButtonArea::VERTICAL));
        assert!(areas.intersects(ButtonArea::MATRIX | ButtonArea::VERTICAL));
        assert_eq!(areas - ButtonArea::MATRIX, ButtonArea::HORIZONTAL);
        assert!(ButtonArea::EMPTY.split().next().is_none());
    }

    #[test]
    fn test_parse_and_display() {
        let areas: ButtonArea = "Matrix|vertical".parse().unwrap();
        assert_eq!(areas, ButtonArea::MATRIX | ButtonArea::VERTICAL);
        assert_eq!(areas.to_string(), "matrix|vertical");
        assert_eq!(ButtonArea::EMPTY.to_string(), "none");
        assert!("fader".parse::<ButtonArea>().is_err());
    }

    #[test]
    fn test_button_enumeration() {
        assert_eq!(ButtonArea::ALL.button_count(), 81);
        assert_eq!(ButtonArea::MATRIX.buttons().count(), 64);

        let round: Vec<_> = (ButtonArea::HORIZONTAL | ButtonArea::VERTICAL).buttons().collect();
        assert_eq!(round.len(), 16);
        assert_eq!(round[0].area(), ButtonArea::HORIZONTAL);
        assert_eq!(round[8].area(), ButtonArea::VERTICAL);
        assert_eq!(round[15].ordinal(), 7);
    }
}
