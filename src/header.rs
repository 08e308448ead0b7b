//! ASCII header serializer (C8): the `"eeph"` chunk's `[Section]\nvalue\n`
//! format, the electrode table and the history block, plus the `"info"`
//! chunk's subject/institution/equipment record.
//!
//! Grounded on `parse_eeph`/`make_eeph_content`, `parse_electrodes`/
//! `make_electrodes_content` and `parse_info`/`make_info_content` in
//! `src/container/file_epoch.cc`.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

use crate::electrode::{Electrode, TimeSeries};
use crate::error::DataError;
use crate::info::{FileVersion, Handedness, Info, Sex};
use crate::time::{DcDate, Tm};

/// Every textual field in the electrode table is truncated to this many
/// visible characters for wire compatibility.
const FIELD_CAP: usize = 10;
/// `"info"` chunk free-text fields are truncated at a generous length;
/// the reference implementation documents libeep itself writing 512 and
/// reading back only 256.
const INFO_FIELD_CAP: usize = 256;

fn truncate(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

/// Formats `x` with `sig` significant decimal digits, trimming trailing
/// zeros the way a minimal-digit `ostringstream` rendering would (no
/// padding). Used for the sampling rate and the `DcDate` fields, whose
/// wire precision is documented as "up to N significant figures".
pub fn format_sig_figs(x: f64, sig: u32) -> String {
    if x == 0.0 {
        return "0".to_string();
    }
    if !x.is_finite() {
        return x.to_string();
    }
    let magnitude = x.abs().log10().floor() as i32;
    let decimals = (sig as i32 - 1 - magnitude).max(0) as usize;
    let s = format!("{:.*}", decimals, x);
    trim_trailing_zeros(&s)
}

fn trim_trailing_zeros(s: &str) -> String {
    if !s.contains('.') {
        return s.to_string();
    }
    let trimmed = s.trim_end_matches('0');
    let trimmed = trimmed.trim_end_matches('.');
    if trimmed.is_empty() || trimmed == "-" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

fn parse_double(line: &str) -> Result<f64, DataError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(DataError::Header("expected a floating point value, found nothing".into()));
    }
    let v: f64 = line
        .parse()
        .map_err(|_| DataError::Header(format!("invalid floating point value {line:?}")))?;
    if !v.is_finite() {
        return Err(DataError::Header(format!("non-finite floating point value {line:?}")));
    }
    Ok(v)
}

fn parse_int(line: &str) -> Result<i64, DataError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(DataError::Header("expected an integer value, found nothing".into()));
    }
    line.parse().map_err(|_| DataError::Header(format!("invalid integer value {line:?}")))
}

/// Yields `(line, next_offset)` the way `load_line` walks a `\n`-delimited
/// buffer; unlike the source, lines are not length-capped, since Rust
/// strings aren't subject to the fixed scratch buffers the original used.
fn lines_from(input: &str) -> impl Iterator<Item = &str> {
    input.split('\n')
}

/// The parsed content of the `"eeph"` chunk.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EephData {
    pub sampling_frequency: f64,
    pub sample_count: i64,
    pub channel_count: usize,
    pub electrodes: Vec<Electrode>,
    pub version: FileVersion,
    pub history: String,
}

fn electrode_line(e: &Electrode) -> String {
    let mut s = format!(
        "{} {} {} {}",
        truncate(&e.active_label, FIELD_CAP),
        format_sig_figs(e.iscale, 11),
        format_sig_figs(e.rscale, 11),
        truncate(&e.unit, FIELD_CAP),
    );
    if !e.reference.is_empty() {
        s.push_str(&format!(" REF:{}", truncate(&e.reference, FIELD_CAP)));
    }
    if !e.status.is_empty() {
        s.push_str(&format!(" STAT:{}", truncate(&e.status, FIELD_CAP)));
    }
    if !e.r#type.is_empty() {
        s.push_str(&format!(" TYPE:{}", truncate(&e.r#type, FIELD_CAP)));
    }
    s
}

fn parse_electrode_line(line: &str) -> Result<Electrode, DataError> {
    let mut tokens = line.split_whitespace();
    let label = tokens.next().ok_or_else(|| DataError::Header("electrode line missing label".into()))?;
    let iscale = tokens.next().ok_or_else(|| DataError::Header("electrode line missing iscale".into()))?;
    let rscale = tokens.next().ok_or_else(|| DataError::Header("electrode line missing rscale".into()))?;
    let unit = tokens.next().ok_or_else(|| DataError::Header("electrode line missing unit".into()))?;

    let iscale: f64 = iscale.parse().map_err(|_| DataError::Header(format!("invalid iscale {iscale:?}")))?;
    let rscale: f64 = rscale.parse().map_err(|_| DataError::Header(format!("invalid rscale {rscale:?}")))?;
    if label.is_empty() || unit.is_empty() {
        return Err(DataError::Header("electrode label/unit must be non-empty".into()));
    }

    let mut e = Electrode {
        active_label: truncate(label, FIELD_CAP),
        unit: truncate(unit, FIELD_CAP),
        iscale,
        rscale,
        ..Electrode::default()
    };

    for tok in tokens {
        if let Some(v) = tok.strip_prefix("REF:") {
            e.reference = truncate(v, FIELD_CAP - 1);
        } else if let Some(v) = tok.strip_prefix("STAT:") {
            e.status = truncate(v, FIELD_CAP - 1);
        } else if let Some(v) = tok.strip_prefix("TYPE:") {
            e.r#type = truncate(v, FIELD_CAP - 1);
        }
    }

    Ok(e)
}

/// Serializes the `[Basic Channel Data]` electrode table body (one
/// `electrode_line` per row, newline terminated).
pub fn make_electrodes_content(electrodes: &[Electrode]) -> String {
    use itertools::Itertools;
    if electrodes.is_empty() {
        return String::new();
    }
    electrodes.iter().map(electrode_line).join("\n") + "\n"
}

fn parse_electrodes(lines: &mut std::iter::Peekable<std::str::Split<'_, char>>) -> Result<Vec<Electrode>, DataError> {
    let mut result = Vec::new();
    while let Some(&line) = lines.peek() {
        if line.is_empty() || line.starts_with('[') {
            break;
        }
        lines.next();
        if line.starts_with(';') {
            continue;
        }
        result.push(parse_electrode_line(line)?);
    }
    Ok(result)
}

/// Serializes the full `"eeph"` chunk content.
pub fn make_eeph_content(version: FileVersion, sampling_frequency: f64, sample_count: i64, electrodes: &[Electrode], history: &str) -> String {
    let mut s = String::new();
    s.push_str(&format!("[File Version]\n{}.{}\n", version.major, version.minor));
    s.push_str(&format!("[Sampling Rate]\n{}\n", format_sig_figs(sampling_frequency, 11)));
    s.push_str(&format!("[Samples]\n{sample_count}\n"));
    s.push_str(&format!("[Channels]\n{}\n", electrodes.len()));
    s.push_str("[Basic Channel Data]\n");
    s.push_str(&make_electrodes_content(electrodes));
    s.push_str(&format!("[History]\n{history}\nEOH\n"));
    s
}

/// Parses the `"eeph"` chunk content.
pub fn parse_eeph(input: &str) -> Result<EephData, DataError> {
    let mut result = EephData::default();
    let mut lines = lines_from(input).peekable();

    while let Some(line) = lines.next() {
        let trimmed = line.trim_end_matches('\r');
        if trimmed == "[Samples]" {
            if let Some(v) = lines.next() {
                result.sample_count = parse_int(v)?;
            }
        } else if trimmed == "[Sampling Rate]" {
            if let Some(v) = lines.next() {
                result.sampling_frequency = parse_double(v)?;
            }
        } else if trimmed == "[Channels]" {
            if let Some(v) = lines.next() {
                result.channel_count = parse_int(v)? as usize;
            }
        } else if trimmed == "[File Version]" {
            if let Some(v) = lines.next() {
                if let Some((maj, min)) = v.trim().split_once('.') {
                    if let (Ok(maj), Ok(min)) = (maj.parse(), min.parse()) {
                        result.version = FileVersion::new(maj, min);
                    }
                }
            }
        } else if trimmed == "[Basic Channel Data]" {
            result.electrodes = parse_electrodes(&mut lines)?;
        } else if trimmed == "[History]" {
            let mut history = String::new();
            for line in lines.by_ref() {
                let line = line.trim_end_matches('\r');
                if line == "EOH" {
                    break;
                }
                if !history.is_empty() {
                    history.push('\n');
                }
                history.push_str(line);
            }
            result.history = history;
        }
    }

    Ok(result)
}

/// Bundles [`TimeSeries`] construction out of a parsed `eeph` body and an
/// (optional) start time recovered from the `info` chunk.
pub fn eeph_to_time_series(eeph: &EephData, start_time: hifitime::Epoch) -> TimeSeries {
    TimeSeries {
        start_time,
        sampling_frequency: eeph.sampling_frequency,
        electrodes: eeph.electrodes.clone(),
        epoch_length: 0, // caller fills in from the container's own epoch length bookkeeping
    }
}

fn write_field(s: &mut String, key: &str, value: &str) {
    if !value.is_empty() {
        s.push_str(&format!("[{key}]\n{}\n", truncate(value, INFO_FIELD_CAP)));
    }
}

/// Serializes the full `"info"` chunk content.
pub fn make_info_content(start: DcDate, info: &Info) -> String {
    let mut s = String::new();
    s.push_str(&format!("[StartDate]\n{}\n", format_sig_figs(start.date, 21)));
    s.push_str(&format!("[StartFraction]\n{}\n", format_sig_figs(start.fraction, 21)));

    write_field(&mut s, "Hospital", &info.hospital);
    write_field(&mut s, "TestName", &info.test_name);
    write_field(&mut s, "TestSerial", &info.test_serial);
    write_field(&mut s, "Physician", &info.physician);
    write_field(&mut s, "Technician", &info.technician);
    write_field(&mut s, "MachineMake", &info.machine_make);
    write_field(&mut s, "MachineModel", &info.machine_model);
    write_field(&mut s, "MachineSN", &info.machine_sn);
    write_field(&mut s, "SubjectName", &info.subject_name);
    write_field(&mut s, "SubjectID", &info.subject_id);
    write_field(&mut s, "SubjectAddress", &info.subject_address);
    write_field(&mut s, "SubjectPhone", &info.subject_phone);

    if info.subject_sex != Sex::Unknown {
        s.push_str(&format!("[SubjectSex]\n{}\n", info.subject_sex.to_char() as char));
    }

    if !info.subject_dob.is_unspecified() {
        let t = &info.subject_dob;
        s.push_str(&format!(
            "[SubjectDateOfBirth]\n{} {} {} {} {} {} {} {} {}\n",
            t.sec, t.min, t.hour, t.mday, t.mon, t.year, t.wday, t.yday, t.isdst
        ));
    }

    if info.subject_handedness != Handedness::Unknown {
        s.push_str(&format!("[SubjectHandedness]\n{}\n", info.subject_handedness.to_char() as char));
    }

    write_field(&mut s, "Comment", &info.comment);

    s
}

fn parse_dob_line(line: &str) -> Result<Tm, DataError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Tm::unspecified());
    }
    let fields: Vec<i32> = line
        .split_whitespace()
        .map(|t| t.parse::<i32>())
        .collect::<Result<_, _>>()
        .map_err(|_| DataError::Header(format!("invalid SubjectDateOfBirth line {line:?}")))?;
    if fields.len() != 9 {
        return Err(DataError::Header(format!("SubjectDateOfBirth needs 9 integers, got {}", fields.len())));
    }
    Ok(Tm {
        sec: fields[0],
        min: fields[1],
        hour: fields[2],
        mday: fields[3],
        mon: fields[4],
        year: fields[5],
        wday: fields[6],
        yday: fields[7],
        isdst: fields[8],
    })
}

/// Parses the `"info"` chunk content. Returns `(start_time, info,
/// is_ascii)`: `is_ascii` is `true` when a `[StartDate]` section was
/// found in the text, which callers use to decide whether the legacy
/// binary-double compatibility path in [`parse_info_legacy_binary`] applies.
pub fn parse_info(input: &str) -> Result<(DcDate, Info, bool), DataError> {
    let mut start = DcDate::default();
    let mut info = Info::default();
    let mut is_ascii = false;

    let mut lines = lines_from(input);
    while let Some(line) = lines.next() {
        let trimmed = line.trim_end_matches('\r');
        match trimmed {
            "[StartDate]" => {
                if let Some(v) = lines.next() {
                    start.date = parse_double(v)?;
                    is_ascii = true;
                }
            }
            "[StartFraction]" => {
                if let Some(v) = lines.next() {
                    start.fraction = parse_double(v)?;
                }
            }
            "[Hospital]" => info.hospital = lines.next().unwrap_or("").to_string(),
            "[TestName]" => info.test_name = lines.next().unwrap_or("").to_string(),
            "[TestSerial]" => info.test_serial = lines.next().unwrap_or("").to_string(),
            "[Physician]" => info.physician = lines.next().unwrap_or("").to_string(),
            "[Technician]" => info.technician = lines.next().unwrap_or("").to_string(),
            "[MachineMake]" => info.machine_make = lines.next().unwrap_or("").to_string(),
            "[MachineModel]" => info.machine_model = lines.next().unwrap_or("").to_string(),
            "[MachineSN]" => info.machine_sn = lines.next().unwrap_or("").to_string(),
            "[SubjectName]" => info.subject_name = lines.next().unwrap_or("").to_string(),
            "[SubjectID]" => info.subject_id = lines.next().unwrap_or("").to_string(),
            "[SubjectAddress]" => info.subject_address = lines.next().unwrap_or("").to_string(),
            "[SubjectPhone]" => info.subject_phone = lines.next().unwrap_or("").to_string(),
            "[SubjectSex]" => {
                if let Some(v) = lines.next() {
                    if let Some(c) = v.bytes().next() {
                        info.subject_sex = Sex::from_char(c);
                    }
                }
            }
            "[SubjectHandedness]" => {
                if let Some(v) = lines.next() {
                    if let Some(c) = v.bytes().next() {
                        info.subject_handedness = Handedness::from_char(c);
                    }
                }
            }
            "[SubjectDateOfBirth]" => {
                if let Some(v) = lines.next() {
                    info.subject_dob = parse_dob_line(v)?;
                }
            }
            "[Comment]" => info.comment = lines.next().unwrap_or("").to_string(),
            _ => {}
        }
    }

    Ok((start, info, is_ascii))
}

/// Legacy binary `"info"`-chunk compatibility: when the chunk's version is
/// `0.0` and ASCII parsing found no `[StartDate]` key, the first 16 bytes
/// are instead two little-endian IEEE-754 doubles (`Date`, `Fraction`).
pub fn parse_info_legacy_binary(bytes: &[u8]) -> Result<DcDate, DataError> {
    if bytes.len() < 16 {
        return Err(DataError::Header("info chunk too short for legacy binary start time".into()));
    }
    let mut cur = Cursor::new(bytes);
    let date = cur.read_f64::<LittleEndian>()?;
    let fraction = cur.read_f64::<LittleEndian>()?;
    Ok(DcDate::new(date, fraction))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::info::Sex;

    #[test]
    fn significant_digits_trim_trailing_zeros() {
        assert_eq!(format_sig_figs(256.0, 11), "256");
        assert_eq!(format_sig_figs(1.0 / 256.0, 11), "0.00390625");
    }

    #[test]
    fn electrode_roundtrip_with_optional_fields() {
        let e = Electrode {
            active_label: "Fp1".into(),
            reference: "ref".into(),
            unit: "uV".into(),
            status: "ok".into(),
            r#type: "eeg".into(),
            iscale: 1.0,
            rscale: 1.0 / 256.0,
        };
        let line = electrode_line(&e);
        let back = parse_electrode_line(&line).unwrap();
        assert_eq!(back.active_label, e.active_label);
        assert_eq!(back.reference, e.reference);
        assert_eq!(back.unit, e.unit);
        assert_eq!(back.status, e.status);
        assert_eq!(back.r#type, e.r#type);
        assert_eq!(back.iscale, e.iscale);
        assert_eq!(back.rscale, e.rscale);
    }

    #[test]
    fn electrode_without_optional_fields_omits_them() {
        let mut e = Electrode::new("1", "");
        e.reference = String::new();
        let line = electrode_line(&e);
        assert!(!line.contains("REF:"));
        assert!(!line.contains("STAT:"));
        assert!(!line.contains("TYPE:"));
    }

    #[test]
    fn eeph_roundtrip() {
        let electrodes = vec![Electrode::new("1", "ref"), Electrode::new("2", "ref")];
        let content = make_eeph_content(FileVersion::new(4, 0), 256.0, 6, &electrodes, "created by test\nsecond line");
        let parsed = parse_eeph(&content).unwrap();
        assert_eq!(parsed.sampling_frequency, 256.0);
        assert_eq!(parsed.sample_count, 6);
        assert_eq!(parsed.electrodes.len(), 2);
        assert_eq!(parsed.version, FileVersion::new(4, 0));
        assert_eq!(parsed.history, "created by test\nsecond line");
    }

    #[test]
    fn info_roundtrip_with_dob_and_sex() {
        let mut info = Info::default();
        info.hospital = "General".into();
        info.subject_name = "Doe".into();
        info.subject_sex = Sex::Female;
        info.subject_dob = Tm { sec: 0, min: 0, hour: 0, mday: 4, mon: 6, year: 80, wday: 0, yday: 0, isdst: 0 };

        let start = DcDate::new(44000.0, 3600.0);
        let content = make_info_content(start, &info);
        let (parsed_start, parsed_info, is_ascii) = parse_info(&content).unwrap();
        assert!(is_ascii);
        assert_eq!(parsed_start.date, start.date);
        assert_eq!(parsed_start.fraction, start.fraction);
        assert_eq!(parsed_info.hospital, info.hospital);
        assert_eq!(parsed_info.subject_sex, Sex::Female);
        assert_eq!(parsed_info.subject_dob, info.subject_dob);
    }

    #[test]
    fn missing_start_date_reports_not_ascii() {
        let (_, _, is_ascii) = parse_info("[Hospital]\nGeneral\n").unwrap();
        assert!(!is_ascii);
    }

    #[test]
    fn legacy_binary_start_time_reads_two_doubles() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&44000.0f64.to_le_bytes());
        bytes.extend_from_slice(&123.5f64.to_le_bytes());
        let dc = parse_info_legacy_binary(&bytes).unwrap();
        assert_eq!(dc.date, 44000.0);
        assert_eq!(dc.fraction, 123.5);
    }
}
