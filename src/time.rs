//! Date/time conversion (C10): a fractional-days epoch (offset from
//! 30 Dec 1899) used by the `"info"` chunk's `StartDate`/`StartFraction`
//! fields, converted to/from a nanosecond-precise UTC timestamp.
//!
//! Grounded on `ctk/api_data.h`'s `DcDate` (two doubles: whole days and
//! sub-day seconds) and the conversion contract it documents; the
//! original conversion function *bodies* were not present in the
//! retrieved source, so the formulas below follow the contract directly.

use hifitime::{Duration, Epoch};

/// `(days since 1899-12-30T00:00:00 UTC, sub-day seconds)`, the wire
/// representation used throughout the ASCII header and the event file.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DcDate {
    pub date: f64,
    pub fraction: f64,
}

impl DcDate {
    pub const fn new(date: f64, fraction: f64) -> Self {
        Self { date, fraction }
    }
}

fn epoch_origin() -> Epoch {
    Epoch::from_gregorian_utc(1899, 12, 30, 0, 0, 0, 0)
}

/// Converts a [`DcDate`] to a UTC timestamp: `origin + round(date) days +
/// fraction seconds`, with `fraction` permitted to exceed 86400 (the
/// excess carries into the day count through ordinary duration addition).
pub fn dcdate_to_timepoint(x: DcDate) -> Epoch {
    let days = x.date.round();
    let offset = Duration::from_seconds(days * 86_400.0 + x.fraction);
    epoch_origin() + offset
}

/// Converts a UTC timestamp to a [`DcDate`]: `date = floor(elapsed /
/// 86400s)`, `fraction = elapsed - date*86400s`.
pub fn timepoint_to_dcdate(t: Epoch) -> DcDate {
    let elapsed = (t.to_utc_duration() - epoch_origin().to_utc_duration()).to_seconds();
    let days = (elapsed / 86_400.0).floor();
    let fraction = elapsed - days * 86_400.0;
    DcDate { date: days, fraction }
}

/// A proleptic-Gregorian calendar timestamp mirroring C's `struct tm`:
/// `year` counts years since 1900, `month` is 0-based. Used only by the
/// `SubjectDateOfBirth` field, whose wire form is nine whitespace
/// separated integers (`sec min hour mday mon year wday yday isdst`).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tm {
    pub sec: i32,
    pub min: i32,
    pub hour: i32,
    pub mday: i32,
    pub mon: i32,
    pub year: i32,
    pub wday: i32,
    pub yday: i32,
    pub isdst: i32,
}

impl Tm {
    /// All nine fields zero. Per the "all-zero `tm` is unspecified"
    /// decision (the source has two inconsistent code paths for this;
    /// this crate picks one and applies it everywhere), this value means
    /// "date of birth not specified", not 1900-01-01.
    pub const fn unspecified() -> Self {
        Self { sec: 0, min: 0, hour: 0, mday: 0, mon: 0, year: 0, wday: 0, yday: 0, isdst: 0 }
    }

    pub fn is_unspecified(&self) -> bool {
        *self == Self::unspecified()
    }

    /// Converts to a UTC timestamp under the proleptic Gregorian calendar.
    /// Only meaningful when `!self.is_unspecified()`; callers check that
    /// first since an unspecified `tm` has no corresponding timestamp.
    pub fn to_timepoint(&self) -> Epoch {
        Epoch::from_gregorian_utc(
            self.year + 1900,
            (self.mon + 1) as u8,
            self.mday as u8,
            self.hour as u8,
            self.min as u8,
            self.sec as u8,
            0,
        )
    }

    /// Builds a `tm` from a UTC timestamp (seconds precision, `wday`/
    /// `yday`/`isdst` left at 0 since this crate has no calendar-of-record
    /// dependency on them beyond round-tripping the DOB field).
    pub fn from_timepoint(t: Epoch) -> Self {
        let (y, mo, d, h, mi, s, _ns) = t.to_gregorian_utc();
        Self {
            sec: s as i32,
            min: mi as i32,
            hour: h as i32,
            mday: d as i32,
            mon: mo as i32 - 1,
            year: y - 1900,
            wday: 0,
            yday: 0,
            isdst: 0,
        }
    }
}
