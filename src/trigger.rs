//! Trigger codec (C9, the sample-aligned half of it).
//!
//! Grounded on `ctk/api_data.h`'s `Trigger` struct (`sizes::evt_trigger_code
//! == 8`) and `read_evt_content`/`write_evt_record` in
//! `src/container/file_epoch.cc`: on the wire, `Sample` is a signed 32-bit
//! integer in RIFF32 containers and an unsigned 64-bit integer in RF64
//! containers, followed by 8 ASCII bytes of NUL-padded code.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::DataError;

/// Up to 8 bytes of label. Longer input is truncated to 8 bytes on
/// construction, matching the wire field width.
pub const CODE_LEN: usize = 8;

/// One trigger: a sample index plus a short code.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Trigger {
    pub sample: i64,
    pub code: String,
}

impl Trigger {
    pub fn new(sample: i64, code: impl Into<String>) -> Self {
        let mut code = code.into();
        code.truncate(CODE_LEN);
        Self { sample, code }
    }

    fn code_bytes(&self) -> [u8; CODE_LEN] {
        let mut buf = [0u8; CODE_LEN];
        let bytes = self.code.as_bytes();
        let n = bytes.len().min(CODE_LEN);
        buf[..n].copy_from_slice(&bytes[..n]);
        buf
    }

    fn code_from_bytes(buf: &[u8; CODE_LEN]) -> String {
        let end = buf.iter().position(|&b| b == 0).unwrap_or(CODE_LEN);
        String::from_utf8_lossy(&buf[..end]).into_owned()
    }

    /// Writes this trigger as a signed 32-bit sample (RIFF32 containers).
    pub fn write_riff32<W: Write>(&self, w: &mut W) -> Result<(), DataError> {
        let sample: i32 = self
            .sample
            .try_into()
            .map_err(|_| DataError::Cast(format!("trigger sample {} does not fit in i32", self.sample)))?;
        w.write_i32::<LittleEndian>(sample)?;
        w.write_all(&self.code_bytes())?;
        Ok(())
    }

    /// Writes this trigger as an unsigned 64-bit sample (RF64 containers).
    pub fn write_rf64<W: Write>(&self, w: &mut W) -> Result<(), DataError> {
        let sample: u64 = self
            .sample
            .try_into()
            .map_err(|_| DataError::Cast(format!("trigger sample {} does not fit in u64", self.sample)))?;
        w.write_u64::<LittleEndian>(sample)?;
        w.write_all(&self.code_bytes())?;
        Ok(())
    }

    pub fn read_riff32<R: Read>(r: &mut R) -> Result<Self, DataError> {
        let sample = r.read_i32::<LittleEndian>()? as i64;
        let mut code = [0u8; CODE_LEN];
        r.read_exact(&mut code)?;
        Ok(Self { sample, code: Self::code_from_bytes(&code) })
    }

    pub fn read_rf64<R: Read>(r: &mut R) -> Result<Self, DataError> {
        let sample = r.read_u64::<LittleEndian>()?;
        let sample: i64 = sample
            .try_into()
            .map_err(|_| DataError::Cast(format!("trigger sample {sample} exceeds i64::MAX")))?;
        let mut code = [0u8; CODE_LEN];
        r.read_exact(&mut code)?;
        Ok(Self { sample, code: Self::code_from_bytes(&code) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn riff32_roundtrip() {
        let t = Trigger::new(12345, "Stim1");
        let mut buf = Vec::new();
        t.write_riff32(&mut buf).unwrap();
        assert_eq!(buf.len(), 4 + CODE_LEN);
        let back = Trigger::read_riff32(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn rf64_roundtrip() {
        let t = Trigger::new(9_999_999_999, "A");
        let mut buf = Vec::new();
        t.write_rf64(&mut buf).unwrap();
        let back = Trigger::read_rf64(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn code_with_embedded_nul_roundtrips_up_to_first_nul() {
        // wire code bytes may legitimately contain an embedded NUL; per the
        // container format this terminates the string the same way C's
        // NUL-terminated strings do.
        let t = Trigger { sample: 1, code: "AB".to_string() };
        let mut buf = Vec::new();
        t.write_riff32(&mut buf).unwrap();
        let back = Trigger::read_riff32(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(back.code, "AB");
    }

    #[test]
    fn overlong_code_is_truncated_to_eight_bytes() {
        let t = Trigger::new(1, "123456789ABC");
        assert_eq!(t.code.len(), CODE_LEN);
    }

    #[test]
    fn sample_exceeding_i64_max_on_rf64_read_is_a_data_error() {
        let mut buf = Vec::new();
        buf.write_u64::<LittleEndian>(u64::MAX).unwrap();
        buf.extend_from_slice(&[0u8; CODE_LEN]);
        assert!(Trigger::read_rf64(&mut Cursor::new(&buf)).is_err());
    }
}
