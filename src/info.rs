//! Subject/institution/equipment/experiment record and the file version
//! tag, both carried in the `"info"`/`"eeph"` ASCII header chunks.
//!
//! Grounded on `ctk/api_data.h`'s `Info`, `Sex`, `Handedness` and
//! `FileVersion`.

use crate::time::Tm;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Single-character subject sex code (`F`/`M`/space for unknown).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Sex {
    Female,
    Male,
    #[default]
    Unknown,
}

impl Sex {
    pub fn to_char(self) -> u8 {
        match self {
            Sex::Female => b'F',
            Sex::Male => b'M',
            Sex::Unknown => b' ',
        }
    }

    pub fn from_char(c: u8) -> Self {
        match c {
            b'F' | b'f' => Sex::Female,
            b'M' | b'm' => Sex::Male,
            _ => Sex::Unknown,
        }
    }
}

/// Single-character handedness code (`L`/`R`/`M`/space for unknown).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Handedness {
    Left,
    Mixed,
    Right,
    #[default]
    Unknown,
}

impl Handedness {
    pub fn to_char(self) -> u8 {
        match self {
            Handedness::Left => b'L',
            Handedness::Mixed => b'M',
            Handedness::Right => b'R',
            Handedness::Unknown => b' ',
        }
    }

    pub fn from_char(c: u8) -> Self {
        match c {
            b'L' | b'l' => Handedness::Left,
            b'M' | b'm' => Handedness::Mixed,
            b'R' | b'r' => Handedness::Right,
            _ => Handedness::Unknown,
        }
    }
}

/// `[File Version]` section: `<major>.<minor>`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FileVersion {
    pub major: u32,
    pub minor: u32,
}

impl FileVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// The version this crate writes.
    pub const CURRENT: FileVersion = FileVersion::new(4, 0);
}

/// Subject/institution/equipment/experiment record (the `"info"` chunk).
/// Absent fields are empty strings / `Unknown` / [`Tm::unspecified`]
/// meaning "not specified", matching the ASCII header's "missing section"
/// convention.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Info {
    pub hospital: String,
    pub test_name: String,
    pub test_serial: String,
    pub physician: String,
    pub technician: String,
    pub machine_make: String,
    pub machine_model: String,
    pub machine_sn: String,
    pub subject_name: String,
    pub subject_id: String,
    pub subject_address: String,
    pub subject_phone: String,
    pub subject_sex: Sex,
    pub subject_handedness: Handedness,
    pub subject_dob: Tm,
    pub comment: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sex_char_roundtrip() {
        for s in [Sex::Female, Sex::Male, Sex::Unknown] {
            assert_eq!(Sex::from_char(s.to_char()), s);
        }
    }

    #[test]
    fn handedness_char_roundtrip() {
        for h in [Handedness::Left, Handedness::Mixed, Handedness::Right, Handedness::Unknown] {
            assert_eq!(Handedness::from_char(h.to_char()), h);
        }
    }

    #[test]
    fn info_default_has_unspecified_dob() {
        let i = Info::default();
        assert!(i.subject_dob.is_unspecified());
    }
}
