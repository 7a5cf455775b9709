use std::{fmt, num::ParseIntError, str::FromStr};

use serde::{Deserialize, Serialize};

/// An opaque record payload. No structure is assumed or validated.
pub type Record = String;

/// Identifier of a stored record
///
/// Assigned by a backend at write time and never reused within the lifetime of
/// that backend instance. Assigned identifiers are always positive; a zero
/// identifier can be requested but never resolves to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(u32);

impl RecordId {
    /// The first identifier handed out by a queue or an empty in-memory store.
    pub const FIRST: Self = Self(1);

    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// The identifier following this one, if it fits.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self.0.checked_add(1) {
            Some(id) => Some(Self(id)),
            None => None,
        }
    }

    /// Zero-based position of this identifier in a 1-based sequence.
    ///
    /// `None` for the zero identifier.
    #[must_use]
    pub const fn index(self) -> Option<usize> {
        match self.0.checked_sub(1) {
            Some(index) => Some(index as usize),
            None => None,
        }
    }

    /// Identifier of the last element in a 1-based sequence of `len` elements.
    #[must_use]
    pub fn from_len(len: usize) -> Option<Self> {
        u32::try_from(len).ok().filter(|&id| id > 0).map(Self)
    }
}

impl From<u32> for RecordId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl FromStr for RecordId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_is_one_based() {
        assert_eq!(RecordId::FIRST.index(), Some(0));
        assert_eq!(RecordId::new(7).index(), Some(6));
        assert_eq!(RecordId::new(0).index(), None);
    }

    #[test]
    fn test_from_len() {
        assert_eq!(RecordId::from_len(0), None);
        assert_eq!(RecordId::from_len(3), Some(RecordId::new(3)));
    }

    #[test]
    fn test_next_stops_at_max() {
        assert_eq!(RecordId::FIRST.next(), Some(RecordId::new(2)));
        assert_eq!(RecordId::new(u32::MAX).next(), None);
    }

    #[test]
    fn test_parse() {
        assert_eq!(" 42 ".parse::<RecordId>(), Ok(RecordId::new(42)));
        assert!("-1".parse::<RecordId>().is_err());
        assert!("forty".parse::<RecordId>().is_err());
    }
}
