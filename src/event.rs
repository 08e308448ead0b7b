//! Trigger & event codec (C9, the out-of-band half): the `.evt` companion
//! file carrying impedance, video and epoch annotations.
//!
//! The wire format is a sequence of tagged records (a 1-byte kind tag,
//! then the record body). Collections are ULEB128-length-prefixed,
//! strings are ULEB128-length-prefixed (UTF-8 for ASCII fields, UTF-16LE
//! code units for the wide-string fields), signed integers are SLEB128,
//! and doubles are IEEE-754 little-endian — the wire contract named in
//! the container's external-interfaces section. The original
//! implementation's LEB128 helpers were out of scope for retrieval, so
//! this module implements the narrow subset that contract requires
//! directly rather than pulling in a general-purpose LEB128 crate.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::DataError;
use crate::time::DcDate;

fn write_uleb128<W: Write>(w: &mut W, mut value: u64) -> Result<(), DataError> {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        w.write_all(&[byte])?;
        if value == 0 {
            break;
        }
    }
    Ok(())
}

fn read_uleb128<R: Read>(r: &mut R) -> Result<u64, DataError> {
    let mut result: u64 = 0;
    let mut shift = 0u32;
    loop {
        if shift >= 64 {
            return Err(DataError::Event("ULEB128 value too large".into()));
        }
        let mut byte = [0u8; 1];
        r.read_exact(&mut byte)?;
        let byte = byte[0];
        result |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }
    Ok(result)
}

fn write_sleb128<W: Write>(w: &mut W, mut value: i64) -> Result<(), DataError> {
    let mut more = true;
    while more {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        let sign_bit_set = byte & 0x40 != 0;
        if (value == 0 && !sign_bit_set) || (value == -1 && sign_bit_set) {
            more = false;
        } else {
            byte |= 0x80;
        }
        w.write_all(&[byte])?;
    }
    Ok(())
}

fn read_sleb128<R: Read>(r: &mut R) -> Result<i64, DataError> {
    let mut result: i64 = 0;
    let mut shift = 0u32;
    let mut byte;
    loop {
        let mut b = [0u8; 1];
        r.read_exact(&mut b)?;
        byte = b[0];
        result |= ((byte & 0x7f) as i64) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            break;
        }
        if shift >= 64 {
            return Err(DataError::Event("SLEB128 value too large".into()));
        }
    }
    if shift < 64 && (byte & 0x40) != 0 {
        result |= -(1i64 << shift);
    }
    Ok(result)
}

fn write_string<W: Write>(w: &mut W, s: &str) -> Result<(), DataError> {
    write_uleb128(w, s.len() as u64)?;
    w.write_all(s.as_bytes())?;
    Ok(())
}

fn read_string<R: Read>(r: &mut R) -> Result<String, DataError> {
    let len = read_uleb128(r)? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| DataError::Event(format!("invalid UTF-8 string: {e}")))
}

fn write_wstring<W: Write>(w: &mut W, s: &str) -> Result<(), DataError> {
    let units: Vec<u16> = s.encode_utf16().collect();
    write_uleb128(w, units.len() as u64)?;
    for u in units {
        w.write_u16::<LittleEndian>(u)?;
    }
    Ok(())
}

fn read_wstring<R: Read>(r: &mut R) -> Result<String, DataError> {
    let len = read_uleb128(r)? as usize;
    let mut units = Vec::with_capacity(len);
    for _ in 0..len {
        units.push(r.read_u16::<LittleEndian>()?);
    }
    String::from_utf16(&units).map_err(|e| DataError::Event(format!("invalid UTF-16 string: {e}")))
}

fn write_dcdate<W: Write>(w: &mut W, d: DcDate) -> Result<(), DataError> {
    w.write_f64::<LittleEndian>(d.date)?;
    w.write_f64::<LittleEndian>(d.fraction)?;
    Ok(())
}

fn read_dcdate<R: Read>(r: &mut R) -> Result<DcDate, DataError> {
    let date = r.read_f64::<LittleEndian>()?;
    let fraction = r.read_f64::<LittleEndian>()?;
    Ok(DcDate::new(date, fraction))
}

/// One impedance measurement: a timestamp plus one reading per electrode
/// (in Ohm).
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EventImpedance {
    pub stamp: DcDate,
    pub values: Vec<f32>,
}

/// A marker pointing at a segment of a companion video recording.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EventVideo {
    pub stamp: DcDate,
    pub duration: f64,
    pub trigger_code: i32,
    pub condition_label: String,
    pub description: String,
    pub video_file: String,
}

/// A labelled epoch of interest within the recording.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EventEpoch {
    pub stamp: DcDate,
    pub duration: f64,
    pub offset: f64,
    pub trigger_code: i32,
    pub condition_label: String,
}

/// One annotation in the event file.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Event {
    Impedance(EventImpedance),
    Video(EventVideo),
    Epoch(EventEpoch),
}

const TAG_IMPEDANCE: u8 = 1;
const TAG_VIDEO: u8 = 2;
const TAG_EPOCH: u8 = 3;

fn write_event<W: Write>(w: &mut W, event: &Event) -> Result<(), DataError> {
    match event {
        Event::Impedance(e) => {
            w.write_all(&[TAG_IMPEDANCE])?;
            write_dcdate(w, e.stamp)?;
            write_uleb128(w, e.values.len() as u64)?;
            for &v in &e.values {
                w.write_f32::<LittleEndian>(v)?;
            }
        }
        Event::Video(e) => {
            w.write_all(&[TAG_VIDEO])?;
            write_dcdate(w, e.stamp)?;
            w.write_f64::<LittleEndian>(e.duration)?;
            write_sleb128(w, e.trigger_code as i64)?;
            write_wstring(w, &e.condition_label)?;
            write_string(w, &e.description)?;
            write_wstring(w, &e.video_file)?;
        }
        Event::Epoch(e) => {
            w.write_all(&[TAG_EPOCH])?;
            write_dcdate(w, e.stamp)?;
            w.write_f64::<LittleEndian>(e.duration)?;
            w.write_f64::<LittleEndian>(e.offset)?;
            write_sleb128(w, e.trigger_code as i64)?;
            write_wstring(w, &e.condition_label)?;
        }
    }
    Ok(())
}

fn read_event<R: Read>(r: &mut R) -> Result<Event, DataError> {
    let mut tag = [0u8; 1];
    r.read_exact(&mut tag)?;
    match tag[0] {
        TAG_IMPEDANCE => {
            let stamp = read_dcdate(r)?;
            let n = read_uleb128(r)? as usize;
            let mut values = Vec::with_capacity(n);
            for _ in 0..n {
                values.push(r.read_f32::<LittleEndian>()?);
            }
            Ok(Event::Impedance(EventImpedance { stamp, values }))
        }
        TAG_VIDEO => {
            let stamp = read_dcdate(r)?;
            let duration = r.read_f64::<LittleEndian>()?;
            let trigger_code = read_sleb128(r)? as i32;
            let condition_label = read_wstring(r)?;
            let description = read_string(r)?;
            let video_file = read_wstring(r)?;
            Ok(Event::Video(EventVideo { stamp, duration, trigger_code, condition_label, description, video_file }))
        }
        TAG_EPOCH => {
            let stamp = read_dcdate(r)?;
            let duration = r.read_f64::<LittleEndian>()?;
            let offset = r.read_f64::<LittleEndian>()?;
            let trigger_code = read_sleb128(r)? as i32;
            let condition_label = read_wstring(r)?;
            Ok(Event::Epoch(EventEpoch { stamp, duration, offset, trigger_code, condition_label }))
        }
        other => Err(DataError::Event(format!("unknown event tag {other}"))),
    }
}

/// Serializes an entire `.evt` file: a ULEB128 record count, then each
/// record in order.
pub fn write_events<W: Write>(w: &mut W, events: &[Event]) -> Result<(), DataError> {
    write_uleb128(w, events.len() as u64)?;
    for e in events {
        write_event(w, e)?;
    }
    Ok(())
}

/// Deserializes a `.evt` file produced by [`write_events`].
pub fn read_events<R: Read>(r: &mut R) -> Result<Vec<Event>, DataError> {
    let n = read_uleb128(r)? as usize;
    let mut events = Vec::with_capacity(n);
    for _ in 0..n {
        events.push(read_event(r)?);
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn uleb128_roundtrip() {
        for v in [0u64, 1, 127, 128, 300, u64::MAX] {
            let mut buf = Vec::new();
            write_uleb128(&mut buf, v).unwrap();
            let back = read_uleb128(&mut Cursor::new(&buf)).unwrap();
            assert_eq!(back, v);
        }
    }

    #[test]
    fn sleb128_roundtrip() {
        for v in [0i64, 1, -1, 63, -64, 64, -65, i64::MIN, i64::MAX] {
            let mut buf = Vec::new();
            write_sleb128(&mut buf, v).unwrap();
            let back = read_sleb128(&mut Cursor::new(&buf)).unwrap();
            assert_eq!(back, v, "value {v}");
        }
    }

    #[test]
    fn wstring_roundtrip_with_non_ascii() {
        let s = "caf\u{e9} \u{1f600}";
        let mut buf = Vec::new();
        write_wstring(&mut buf, s).unwrap();
        let back = read_wstring(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn event_file_roundtrip_s5() {
        // scenario S5: one impedance, one video, one epoch event.
        let events = vec![
            Event::Impedance(EventImpedance { stamp: DcDate::new(44000.0, 123.5), values: vec![4500.0, 5200.0, 4800.0] }),
            Event::Video(EventVideo {
                stamp: DcDate::new(44000.0, 200.0),
                duration: 12.5,
                trigger_code: 7,
                condition_label: "CondA".into(),
                description: "camera 1".into(),
                video_file: "clip1.avi".into(),
            }),
            Event::Epoch(EventEpoch {
                stamp: DcDate::new(44000.0, 300.0),
                duration: 2.0,
                offset: -0.5,
                trigger_code: 3,
                condition_label: "Target".into(),
            }),
        ];
        let mut buf = Vec::new();
        write_events(&mut buf, &events).unwrap();
        let back = read_events(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(back, events);
    }
}
