//! Strong-typed counters.
//!
//! A signed 64 bit counter is tagged by purpose (bits, bytes, sensors,
//! measurements/samples, epochs, segments) so that e.g. multiplying a
//! sample count by a byte count requires an explicit widening helper
//! instead of silently compiling.

use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Sub, SubAssign};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Representation shared by every strong counter in this crate.
pub type Repr = i64;

macro_rules! strong_count {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
        pub struct $name(pub Repr);

        impl $name {
            pub const fn new(x: Repr) -> Self {
                Self(x)
            }

            pub const fn get(self) -> Repr {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$name> for Repr {
            fn from(x: $name) -> Repr {
                x.0
            }
        }

        impl From<Repr> for $name {
            fn from(x: Repr) -> $name {
                $name(x)
            }
        }

        impl Add for $name {
            type Output = $name;
            fn add(self, rhs: $name) -> $name {
                $name(self.0 + rhs.0)
            }
        }

        impl AddAssign for $name {
            fn add_assign(&mut self, rhs: $name) {
                self.0 += rhs.0;
            }
        }

        impl Sub for $name {
            type Output = $name;
            fn sub(self, rhs: $name) -> $name {
                $name(self.0 - rhs.0)
            }
        }

        impl SubAssign for $name {
            fn sub_assign(&mut self, rhs: $name) {
                self.0 -= rhs.0;
            }
        }

        impl PartialEq<Repr> for $name {
            fn eq(&self, other: &Repr) -> bool {
                self.0 == *other
            }
        }

        impl PartialOrd<Repr> for $name {
            fn partial_cmp(&self, other: &Repr) -> Option<std::cmp::Ordering> {
                self.0.partial_cmp(other)
            }
        }
    };
}

strong_count!(BitCount, "Amount of bits.");
strong_count!(ByteCount, "Amount of bytes.");
strong_count!(SensorCount, "Amount of sensors/electrodes (a matrix height).");
strong_count!(MeasurementCount, "Amount of samples (a matrix row length).");
strong_count!(EpochCount, "Amount of compressed epochs.");
strong_count!(SegmentCount, "Amount of time-series segments in a container.");

impl Mul<Repr> for BitCount {
    type Output = BitCount;
    fn mul(self, rhs: Repr) -> BitCount {
        BitCount(self.0 * rhs)
    }
}

impl Mul<MeasurementCount> for BitCount {
    type Output = BitCount;
    fn mul(self, rhs: MeasurementCount) -> BitCount {
        BitCount(self.0 * rhs.0)
    }
}

impl Mul<Repr> for MeasurementCount {
    type Output = MeasurementCount;
    fn mul(self, rhs: Repr) -> MeasurementCount {
        MeasurementCount(self.0 * rhs)
    }
}

impl Div<Repr> for BitCount {
    type Output = BitCount;
    fn div(self, rhs: Repr) -> BitCount {
        BitCount(self.0 / rhs)
    }
}

pub(crate) const BITS_PER_BYTE: Repr = 8;

impl BitCount {
    /// One byte, expressed as a bit count (8).
    pub const fn one_byte() -> BitCount {
        BitCount(BITS_PER_BYTE)
    }
}

impl ByteCount {
    /// `self` expressed as a bit count; `self * 8` can not overflow for any
    /// byte count that originates from a real file, so this is infallible.
    pub const fn as_bits(self) -> BitCount {
        BitCount(self.0 * BITS_PER_BYTE)
    }
}

impl BitCount {
    /// `self` rounded up to a whole byte count (`ceil(self / 8)`).
    pub const fn as_bytes_ceil(self) -> ByteCount {
        ByteCount((self.0 + BITS_PER_BYTE - 1) / BITS_PER_BYTE)
    }

    /// `self` rounded down to a whole byte count (`floor(self / 8)`).
    pub const fn as_bytes_floor(self) -> ByteCount {
        ByteCount(self.0 / BITS_PER_BYTE)
    }
}

/// Bit-width of one element of `T`, e.g. `size_in_bits::<i32>() == BitCount(32)`.
pub const fn size_in_bits<T>() -> BitCount {
    BitCount((std::mem::size_of::<T>() as Repr) * BITS_PER_BYTE)
}

/// The wire encoding of the per-row word width (§4.3): `00/01/10/11` in the
/// extended format map to 8/16/32/64-bit data; the reflib format only ever
/// uses `OneByte`-or-skip (`00`) and `FourBytes` (`10`).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum EncodingSize {
    OneByte,
    TwoBytes,
    FourBytes,
    EightBytes,
}

impl EncodingSize {
    pub const fn word_bytes(self) -> usize {
        match self {
            EncodingSize::OneByte => 1,
            EncodingSize::TwoBytes => 2,
            EncodingSize::FourBytes => 4,
            EncodingSize::EightBytes => 8,
        }
    }

    pub const fn word_bits(self) -> BitCount {
        BitCount(self.word_bytes() as Repr * BITS_PER_BYTE)
    }
}

/// Per-row prediction method (§4.3, the 2-bit `m` field).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum EncodingMethod {
    /// `00`: verbatim copy, no prediction.
    Copy,
    /// `01`: first-order difference along the row.
    Time,
    /// `10`: second-order difference along the row.
    Time2,
    /// `11`: difference against the previous row of the same epoch.
    Chan,
}

impl EncodingMethod {
    pub const fn decode(pattern: u32) -> Option<EncodingMethod> {
        match pattern {
            0b00 => Some(EncodingMethod::Copy),
            0b01 => Some(EncodingMethod::Time),
            0b10 => Some(EncodingMethod::Time2),
            0b11 => Some(EncodingMethod::Chan),
            _ => None,
        }
    }

    pub const fn encode(self) -> u32 {
        match self {
            EncodingMethod::Copy => 0b00,
            EncodingMethod::Time => 0b01,
            EncodingMethod::Time2 => 0b10,
            EncodingMethod::Chan => 0b11,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strong_counts_do_not_implicitly_mix() {
        let samples = MeasurementCount(1024);
        let bytes = ByteCount(2048);
        // the following would not compile, which is the point:
        // let _ = samples + bytes;
        assert_eq!(samples.get(), 1024);
        assert_eq!(bytes.get(), 2048);
    }

    #[test]
    fn bits_bytes_roundtrip() {
        assert_eq!(ByteCount(3).as_bits(), BitCount(24));
        assert_eq!(BitCount(24).as_bytes_ceil(), ByteCount(3));
        assert_eq!(BitCount(17).as_bytes_ceil(), ByteCount(3));
        assert_eq!(BitCount(17).as_bytes_floor(), ByteCount(2));
    }

    #[test]
    fn method_roundtrip() {
        for m in [
            EncodingMethod::Copy,
            EncodingMethod::Time,
            EncodingMethod::Time2,
            EncodingMethod::Chan,
        ] {
            assert_eq!(EncodingMethod::decode(m.encode()), Some(m));
        }
        assert_eq!(EncodingMethod::decode(0b100), None);
    }
}
