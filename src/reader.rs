//! Public read façade (spec.md §4.11, C11): one [`Reader`] per opened
//! container, built on top of [`crate::container::chunk`] and
//! [`crate::segment::Segmenter`].
//!
//! Grounded on `cnt_reader_reflib_riff`'s public surface (electrodes,
//! sampling frequency, triggers, `range_row_major`/`range_column_major`,
//! embedded-file enumeration) in `ctk/api_reflib.h`.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use hifitime::Epoch;

use crate::compress::Format;
use crate::container::chunk::{self, ChunkNode, RiffKind};
use crate::container::ids;
use crate::electrode::Electrode;
use crate::embed::UserFile;
use crate::error::{DataError, Error, LimitError, Result};
use crate::header;
use crate::info::{FileVersion, Info};
use crate::segment::{EpochSource, Segmenter};
use crate::trigger::Trigger;
use crate::types::EncodingSize;

struct FileSource {
    file: File,
    data_offset: u64,
    offsets: Vec<u64>,
    total_data_len: u64,
    epoch_length: usize,
    total_samples: i64,
}

impl FileSource {
    fn epoch_byte_range(&self, index: usize) -> Result<(u64, u64)> {
        let start = *self.offsets.get(index).ok_or_else(|| DataError::Container(format!("no such epoch {index}")))?;
        let end = self.offsets.get(index + 1).copied().unwrap_or(self.total_data_len);
        Ok((start, end - start))
    }
}

impl EpochSource for FileSource {
    fn epoch_count(&self) -> usize {
        self.offsets.len()
    }

    fn epoch_sample_count(&self, index: usize) -> std::result::Result<usize, DataError> {
        if index + 1 < self.offsets.len() {
            Ok(self.epoch_length)
        } else if index < self.offsets.len() {
            let consumed = index * self.epoch_length;
            Ok((self.total_samples as usize).saturating_sub(consumed).min(self.epoch_length))
        } else {
            Err(DataError::Container(format!("no such epoch {index}")))
        }
    }

    fn read_compressed(&mut self, index: usize) -> std::result::Result<Vec<u8>, DataError> {
        let (start, len) = self.epoch_byte_range(index).map_err(|e| match e {
            Error::Data(d) => d,
            other => DataError::Container(other.to_string()),
        })?;
        self.file.seek(SeekFrom::Start(self.data_offset + start))?;
        let mut buf = vec![0u8; len as usize];
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }
}

fn read_word<R: Read>(r: &mut R, kind: RiffKind) -> Result<u64> {
    use byteorder::{LittleEndian, ReadBytesExt};
    Ok(match kind {
        RiffKind::Riff32 => r.read_u32::<LittleEndian>()? as u64,
        RiffKind::Riff64 => r.read_u64::<LittleEndian>()?,
    })
}

/// A fully opened container, ready for metadata queries and range reads.
pub struct Reader {
    path: PathBuf,
    kind: RiffKind,
    version: FileVersion,
    electrodes: Vec<Electrode>,
    row_order: Vec<u16>,
    sampling_frequency: f64,
    start_time: Epoch,
    info: Info,
    history: String,
    triggers: Vec<Trigger>,
    embeds: Vec<UserFile>,
    segmenter: Segmenter<FileSource>,
    closed: bool,
}

impl Reader {
    /// Opens `path`, parses its chunk tree and the `eeph`/`info` headers,
    /// and prepares the segmenter for range reads. `format` names the
    /// block codec variant the container was written with (reflib
    /// containers predate the "extended" format and must be opened with
    /// [`Format::Reflib`]).
    pub fn open(path: impl Into<PathBuf>, format: Format) -> Result<Self> {
        let path = path.into();
        let mut file = File::open(&path)?;
        let (kind, root) = chunk::parse_root(&mut file)?;

        let eeph_node = root.find_child(ids::EEPH).ok_or_else(|| DataError::Container("container is missing its eeph chunk".into()))?;
        let eeph_bytes = eeph_node.read_payload(&mut file)?;
        let eeph_text = String::from_utf8_lossy(&eeph_bytes).into_owned();
        let eeph = header::parse_eeph(&eeph_text)?;

        let (start, info, is_ascii) = if let Some(info_node) = root.find_child(ids::INFO) {
            let info_bytes = info_node.read_payload(&mut file)?;
            if eeph.version == FileVersion::new(0, 0) {
                if let Ok(start) = header::parse_info_legacy_binary(&info_bytes) {
                    (start, Info::default(), false)
                } else {
                    let text = String::from_utf8_lossy(&info_bytes).into_owned();
                    header::parse_info(&text)?
                }
            } else {
                let text = String::from_utf8_lossy(&info_bytes).into_owned();
                header::parse_info(&text)?
            }
        } else {
            (Default::default(), Info::default(), false)
        };
        let _ = is_ascii;

        let raw3 = root
            .find_list(crate::container::label("raw3"))
            .ok_or_else(|| DataError::Container("container is missing its raw3 list".into()))?;

        let ep_node = raw3.find_child(ids::EP).ok_or_else(|| DataError::Container("raw3 is missing its ep chunk".into()))?;
        let mut ep_cursor = std::io::Cursor::new(ep_node.read_payload(&mut file)?);
        let epoch_length = read_word(&mut ep_cursor, kind)? as usize;
        let mut offsets = Vec::new();
        while let Ok(w) = read_word(&mut ep_cursor, kind) {
            offsets.push(w);
        }

        let chan_node = raw3.find_child(ids::CHAN).ok_or_else(|| DataError::Container("raw3 is missing its chan chunk".into()))?;
        let chan_bytes = chan_node.read_payload(&mut file)?;
        let mut row_order = Vec::with_capacity(chan_bytes.len() / 2);
        {
            use byteorder::{LittleEndian, ReadBytesExt};
            let mut cur = std::io::Cursor::new(&chan_bytes);
            while let Ok(v) = cur.read_u16::<LittleEndian>() {
                row_order.push(v);
            }
        }

        let data_node = raw3.find_child(ids::DATA).ok_or_else(|| DataError::Container("raw3 is missing its data chunk".into()))?;
        let total_data_len = data_node.payload.1;
        let data_offset = data_node.payload.0;

        let triggers = if let Some(evt_node) = root.find_child(ids::EVT) {
            let bytes = evt_node.read_payload(&mut file)?;
            let mut cur = std::io::Cursor::new(&bytes);
            let mut list = Vec::new();
            loop {
                let t = match kind {
                    RiffKind::Riff32 => Trigger::read_riff32(&mut cur),
                    RiffKind::Riff64 => Trigger::read_rf64(&mut cur),
                };
                match t {
                    Ok(t) => list.push(t),
                    Err(_) => break,
                }
            }
            list
        } else {
            Vec::new()
        };

        let embeds = root
            .children
            .iter()
            .filter(|c| c.label.is_none() && !crate::container::is_reserved_label(c.id) && c.id != ids::LIST)
            .map(|c| UserFile::new(c.id, PathBuf::new()))
            .collect();

        let total_samples = eeph.sample_count;

        let source = FileSource { file, data_offset, offsets, total_data_len, epoch_length, total_samples };
        let segmenter = Segmenter::new(source, eeph.channel_count.max(eeph.electrodes.len()), row_order.clone(), epoch_length, total_samples, format, EncodingSize::FourBytes)?;

        Ok(Self {
            path,
            kind,
            version: eeph.version,
            electrodes: eeph.electrodes,
            row_order,
            sampling_frequency: eeph.sampling_frequency,
            start_time: crate::time::dcdate_to_timepoint(start),
            info,
            history: eeph.history,
            triggers,
            embeds,
            segmenter,
            closed: false,
        })
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Limit(LimitError::Closed));
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn riff_kind(&self) -> RiffKind {
        self.kind
    }

    pub fn file_version(&self) -> FileVersion {
        self.version
    }

    pub fn electrodes(&self) -> Result<&[Electrode]> {
        self.check_open()?;
        Ok(&self.electrodes)
    }

    pub fn row_order(&self) -> Result<&[u16]> {
        self.check_open()?;
        Ok(&self.row_order)
    }

    pub fn sampling_frequency(&self) -> Result<f64> {
        self.check_open()?;
        Ok(self.sampling_frequency)
    }

    pub fn start_time(&self) -> Result<Epoch> {
        self.check_open()?;
        Ok(self.start_time)
    }

    pub fn info(&self) -> Result<&Info> {
        self.check_open()?;
        Ok(&self.info)
    }

    pub fn history(&self) -> Result<&str> {
        self.check_open()?;
        Ok(&self.history)
    }

    pub fn epoch_length(&self) -> Result<usize> {
        self.check_open()?;
        Ok(self.segmenter.epoch_length())
    }

    pub fn sample_count(&self) -> Result<i64> {
        self.check_open()?;
        Ok(self.segmenter.sample_count())
    }

    pub fn triggers(&self) -> Result<&[Trigger]> {
        self.check_open()?;
        Ok(&self.triggers)
    }

    pub fn trigger_at(&self, index: usize) -> Result<&Trigger> {
        self.check_open()?;
        self.triggers.get(index).ok_or_else(|| Error::Limit(LimitError::OutOfRange(format!("trigger index {index}"))))
    }

    /// Reads `[i, i+n)` samples, row-major, as raw integers.
    pub fn range_row_major_i32(&mut self, i: i64, n: i64) -> Result<Vec<i64>> {
        self.check_open()?;
        self.segmenter.range_row_major(i, n)
    }

    pub fn range_column_major_i32(&mut self, i: i64, n: i64) -> Result<Vec<i64>> {
        self.check_open()?;
        self.segmenter.range_column_major(i, n)
    }

    fn scale(&self, raw: i64, channel: usize) -> Result<f64> {
        let e = self.electrodes.get(channel).ok_or_else(|| Error::Data(DataError::Header(format!("no electrode at index {channel}"))))?;
        Ok(e.scale(raw as i32))
    }

    /// Reads `[i, i+n)` samples, row-major, as physical-unit floats
    /// (`sample × IScale × RScale`).
    pub fn range_row_major_f64(&mut self, i: i64, n: i64) -> Result<Vec<f64>> {
        self.check_open()?;
        let height = self.electrodes.len();
        let raw = self.segmenter.range_row_major(i, n)?;
        let length = n as usize;
        let mut out = Vec::with_capacity(raw.len());
        for c in 0..height {
            for t in 0..length {
                out.push(self.scale(raw[c * length + t], c)?);
            }
        }
        Ok(out)
    }

    pub fn range_column_major_f64(&mut self, i: i64, n: i64) -> Result<Vec<f64>> {
        self.check_open()?;
        let height = self.electrodes.len();
        let raw = self.segmenter.range_column_major(i, n)?;
        let length = n as usize;
        let mut out = Vec::with_capacity(raw.len());
        for t in 0..length {
            for c in 0..height {
                out.push(self.scale(raw[t * height + c], c)?);
            }
        }
        Ok(out)
    }

    /// "v4" float variant: column-major, unscaled raw values cast to
    /// `f32` (mirrors [`crate::writer::Writer::append_column_major_v4`]).
    pub fn range_column_major_v4(&mut self, i: i64, n: i64) -> Result<Vec<f32>> {
        self.check_open()?;
        let raw = self.segmenter.range_column_major(i, n)?;
        Ok(raw.into_iter().map(|v| v as f32).collect())
    }

    pub fn embedded_files(&self) -> Result<&[UserFile]> {
        self.check_open()?;
        Ok(&self.embeds)
    }

    /// Extracts an embedded file's bytes by label.
    pub fn extract_embedded(&self, label: [u8; 4], dest: &Path) -> Result<()> {
        self.check_open()?;
        let mut file = File::open(&self.path)?;
        let (_, root) = chunk::parse_root(&mut file)?;
        let node = find_top_level(&root, label).ok_or_else(|| DataError::Container(format!("no embedded chunk with label {:?}", crate::container::label_to_string(label))))?;
        let bytes = node.read_payload(&mut file)?;
        crate::embed::extract_to(dest, &bytes)
    }

    /// Marks this reader closed. Further calls fail with
    /// [`LimitError::Closed`].
    pub fn close(&mut self) {
        self.closed = true;
    }
}

fn find_top_level(root: &ChunkNode, label: [u8; 4]) -> Option<&ChunkNode> {
    root.children.iter().find(|c| c.id == label && c.label.is_none())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::chunk::RiffKind;
    use crate::electrode::Electrode;
    use crate::trigger::{Trigger, CODE_LEN};
    use crate::writer::Writer;

    fn tmp_path(name: &str) -> PathBuf {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut p = std::env::temp_dir();
        p.push(format!("eeprobe-cnt-reader-test-{name}-{}-{}.cnt", std::process::id(), n));
        p
    }

    #[test]
    fn writer_reader_roundtrip_preserves_electrodes_samples_and_triggers() {
        let path = tmp_path("roundtrip");
        let mut w = Writer::new(&path, RiffKind::Riff32);
        w.set_electrodes(vec![Electrode::new("Fp1", ""), Electrode::new("Fp2", "")]).unwrap();
        w.set_sampling_frequency(256.0).unwrap();
        w.set_epoch_length(4).unwrap();
        w.append_trigger(Trigger::new(3, "Stim")).unwrap();

        let samples: Vec<i64> = vec![1, 2, 3, 4, 5, 6, 5, 6, 7, 8, 9, 10, 11, 12];
        w.append_row_major_i32(&samples.iter().map(|&v| v as i32).collect::<Vec<_>>(), 7).unwrap();
        w.close().unwrap();

        let mut r = Reader::open(&path, Format::Extended).unwrap();
        assert_eq!(r.electrodes().unwrap().len(), 2);
        assert_eq!(r.sample_count().unwrap(), 7);
        assert_eq!(r.triggers().unwrap().len(), 1);
        assert_eq!(r.trigger_at(0).unwrap().code, "Stim");

        let got = r.range_row_major_i32(0, 7).unwrap();
        assert_eq!(got, samples);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn s3_ten_thousand_triggers_roundtrip_in_order() {
        // S3: 10,000 evenly spaced triggers whose codes sweep the 8-byte
        // wire field, including codes that embed a NUL, must read back
        // identical and in input order.
        const N: i64 = 10_000;
        let path = tmp_path("s3-triggers");
        let mut w = Writer::new(&path, RiffKind::Riff64);
        w.set_electrodes(vec![Electrode::new("Fp1", "")]).unwrap();
        w.set_sampling_frequency(1000.0).unwrap();
        w.set_epoch_length(N as usize).unwrap();

        let expected: Vec<Trigger> = (0..N)
            .map(|i| {
                // cycles the embedded-NUL position through every offset in
                // the 8-byte field (CODE_LEN means "no NUL, full 8 bytes"),
                // with the bytes around it varying with `i` too.
                let nul_at = (i as usize) % (CODE_LEN + 1);
                let mut raw = [0u8; CODE_LEN];
                for (k, b) in raw.iter_mut().enumerate() {
                    *b = b'A' + (((i as u64 * 7 + k as u64 * 31) % 26) as u8);
                }
                if nul_at < CODE_LEN {
                    raw[nul_at] = 0;
                }
                let end = raw.iter().position(|&c| c == 0).unwrap_or(CODE_LEN);
                let code = String::from_utf8_lossy(&raw[..end]).into_owned();
                Trigger::new(i * 10, code)
            })
            .collect();
        w.append_triggers(expected.clone()).unwrap();

        let samples = vec![0i32; N as usize];
        w.append_row_major_i32(&samples, N as usize).unwrap();
        w.close().unwrap();

        let r = Reader::open(&path, Format::Extended).unwrap();
        let got = r.triggers().unwrap();
        assert_eq!(got.len(), expected.len());
        assert_eq!(got, expected.as_slice());

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn operations_after_close_are_rejected() {
        let path = tmp_path("closed");
        let mut w = Writer::new(&path, RiffKind::Riff32);
        w.set_electrodes(vec![Electrode::new("Fp1", "")]).unwrap();
        w.set_sampling_frequency(100.0).unwrap();
        w.set_epoch_length(2).unwrap();
        w.append_row_major_i32(&[1, 2], 2).unwrap();
        w.close().unwrap();

        let mut r = Reader::open(&path, Format::Extended).unwrap();
        r.close();
        assert!(r.electrodes().is_err());
        assert!(r.range_row_major_i32(0, 1).is_err());

        std::fs::remove_file(&path).ok();
    }
}
