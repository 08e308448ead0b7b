//! "Flat" writer/reader (spec.md §4.7, C7): each logical chunk lives in
//! its own side-car file while a segment is being written (or read back
//! before it has ever been stitched into a single container), plus the
//! riff assembler that composes the final `.cnt` file from the side-car
//! set on close.
//!
//! Grounded on `test/self/container_flat.cc`'s `epoch_writer_flat`/
//! `epoch_reader_flat`/`cnt_writer_reflib_flat` fixtures: a writer session
//! produces a set of "loose" side-car files (`file_tokens()`), and those
//! same loose files can be read back directly — without ever assembling
//! a single container — by pairing each side-car with its [`FileTag`].
//! [`assemble`] is the separate step that composes those side-cars into
//! one `"RIFF"`/`"RF64"` file via [`super::chunk::ChunkWriter`].

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::chunk::{ChunkWriter, RiffKind};
use super::{ids, Label};
use crate::error::{DataError, Result};
use crate::segment::{EpochSink, EpochSource};
use crate::trigger::Trigger;

/// Magic prefix of every side-car's 10-byte part header.
pub const MAGIC: [u8; 4] = *b"ctkp";
pub const PART_VERSION: u8 = 1;
pub const PART_HEADER_LEN: usize = 10;

/// Which logical piece of the container a side-car file holds. The first
/// six correspond 1:1 to a chunk the riff assembler writes; the last six
/// mirror the writer's setter state so a crash leaves enough on disk to
/// recover what had already been set (spec.md §5 "Ordering").
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FileTag {
    RawData,
    RawEp,
    RawChan,
    Eeph,
    Info,
    Triggers,
    SampleCount,
    SamplingFrequency,
    Electrodes,
    Type,
    History,
    TimeSeriesHeader,
}

impl FileTag {
    fn suffix(self) -> &'static str {
        match self {
            FileTag::RawData => "raw3_data",
            FileTag::RawEp => "raw3_ep",
            FileTag::RawChan => "raw3_chan",
            FileTag::Eeph => "eeph",
            FileTag::Info => "info",
            FileTag::Triggers => "triggers",
            FileTag::SampleCount => "sample_count",
            FileTag::SamplingFrequency => "sampling_frequency",
            FileTag::Electrodes => "electrodes",
            FileTag::Type => "type",
            FileTag::History => "history",
            FileTag::TimeSeriesHeader => "time_series_header",
        }
    }

    fn wire_tag(self) -> u8 {
        match self {
            FileTag::RawData => 0,
            FileTag::RawEp => 1,
            FileTag::RawChan => 2,
            FileTag::Eeph => 3,
            FileTag::Info => 4,
            FileTag::Triggers => 5,
            FileTag::SampleCount => 6,
            FileTag::SamplingFrequency => 7,
            FileTag::Electrodes => 8,
            FileTag::Type => 9,
            FileTag::History => 10,
            FileTag::TimeSeriesHeader => 11,
        }
    }

    fn from_wire_tag(v: u8) -> Result<Self> {
        Ok(match v {
            0 => FileTag::RawData,
            1 => FileTag::RawEp,
            2 => FileTag::RawChan,
            3 => FileTag::Eeph,
            4 => FileTag::Info,
            5 => FileTag::Triggers,
            6 => FileTag::SampleCount,
            7 => FileTag::SamplingFrequency,
            8 => FileTag::Electrodes,
            9 => FileTag::Type,
            10 => FileTag::History,
            11 => FileTag::TimeSeriesHeader,
            other => return Err(DataError::Container(format!("unknown side-car file tag {other}")).into()),
        })
    }

    /// The chunk identifier this side-car is streamed into when assembled
    /// into a container; `None` for the setter-state-only tags.
    fn chunk_label(self) -> Option<Label> {
        match self {
            FileTag::RawData => Some(ids::DATA),
            FileTag::RawEp => Some(ids::EP),
            FileTag::RawChan => Some(ids::CHAN),
            FileTag::Eeph => Some(ids::EEPH),
            FileTag::Info => Some(ids::INFO),
            FileTag::Triggers => Some(ids::EVT),
            _ => None,
        }
    }
}

/// One side-car's identity: its path and the tag/label it was opened
/// with. Returned by [`FlatWriter::file_tokens`] and consumed by
/// [`FlatReader::new`]/[`assemble`].
#[derive(Clone, Debug)]
pub struct TaggedFile {
    pub file_name: PathBuf,
    pub tag: FileTag,
}

fn side_car_path(base: &Path, tag: FileTag) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!("_{}.bin", tag.suffix()));
    PathBuf::from(name)
}

fn write_part_header<W: Write>(w: &mut W, tag: FileTag, label: Label) -> Result<()> {
    w.write_all(&MAGIC)?;
    w.write_u8(PART_VERSION)?;
    w.write_u8(tag.wire_tag())?;
    w.write_all(&label)?;
    Ok(())
}

fn read_part_header<R: Read>(r: &mut R, expected: FileTag) -> Result<()> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(DataError::Container("side-car part header has the wrong magic".into()).into());
    }
    let version = r.read_u8()?;
    if version != PART_VERSION {
        return Err(DataError::Container(format!("side-car part version {version} is not supported")).into());
    }
    let tag = FileTag::from_wire_tag(r.read_u8()?)?;
    if tag != expected {
        return Err(DataError::Container(format!("side-car file tag mismatch: expected {expected:?}, found {tag:?}")).into());
    }
    let mut label = [0u8; 4];
    r.read_exact(&mut label)?;
    if let Some(want) = expected.chunk_label() {
        if label != want {
            return Err(DataError::Container("side-car chunk label does not match its file tag".into()).into());
        }
    }
    Ok(())
}

/// Writer-side half of C7: persists each logical chunk to its own file as
/// it is produced, with no single container ever open at once.
pub struct FlatWriter {
    base: PathBuf,
    kind: RiffKind,
    opened: Vec<FileTag>,
    embeds: Vec<(Label, PathBuf)>,
    data_payload_len: u64,
    ep_word_written: bool,
}

impl FlatWriter {
    pub fn new(base: impl Into<PathBuf>, kind: RiffKind) -> Self {
        Self { base: base.into(), kind, opened: Vec::new(), embeds: Vec::new(), data_payload_len: 0, ep_word_written: false }
    }

    fn open_for_append(&mut self, tag: FileTag) -> Result<File> {
        let path = side_car_path(&self.base, tag);
        let already = self.opened.contains(&tag);
        let mut f = OpenOptions::new().create(true).append(true).open(&path)?;
        if !already {
            let label = tag.chunk_label().unwrap_or(*b"    ");
            write_part_header(&mut f, tag, label)?;
            self.opened.push(tag);
        }
        Ok(f)
    }

    /// Overwrites this side-car (used for singleton values set once, like
    /// `eeph`/`info`/setter-state tags, possibly more than once as the
    /// caller revises metadata before `close`).
    pub fn write_part(&mut self, tag: FileTag, payload: &[u8]) -> Result<()> {
        let path = side_car_path(&self.base, tag);
        let mut f = File::create(&path)?;
        let label = tag.chunk_label().unwrap_or(*b"    ");
        write_part_header(&mut f, tag, label)?;
        f.write_all(payload)?;
        if !self.opened.contains(&tag) {
            self.opened.push(tag);
        }
        Ok(())
    }

    fn word_width(&self) -> usize {
        match self.kind {
            RiffKind::Riff32 => 4,
            RiffKind::Riff64 => 8,
        }
    }

    fn write_word(&self, w: &mut impl Write, value: u64) -> Result<()> {
        match self.kind {
            RiffKind::Riff32 => {
                let v: u32 = value.try_into().map_err(|_| DataError::Cast(format!("offset {value} does not fit a 32-bit word")))?;
                w.write_u32::<LittleEndian>(v)?;
            }
            RiffKind::Riff64 => w.write_u64::<LittleEndian>(value)?,
        }
        Ok(())
    }

    /// Appends one permutation entry. Call once per row, in storage order,
    /// when the channel order is first set.
    pub fn append_row_order_entry(&mut self, client_row: u16) -> Result<()> {
        let mut f = self.open_for_append(FileTag::RawChan)?;
        f.write_u16::<LittleEndian>(client_row)?;
        Ok(())
    }

    pub fn append_trigger(&mut self, t: &Trigger) -> Result<()> {
        let mut f = self.open_for_append(FileTag::Triggers)?;
        match self.kind {
            RiffKind::Riff32 => t.write_riff32(&mut f).map_err(crate::error::Error::Data)?,
            RiffKind::Riff64 => t.write_rf64(&mut f).map_err(crate::error::Error::Data)?,
        }
        Ok(())
    }

    pub fn embed(&mut self, label: Label, path: impl Into<PathBuf>) -> Result<()> {
        self.embeds.push((label, path.into()));
        Ok(())
    }

    /// The current set of side-car files, paired with their tags — hand
    /// this to [`FlatReader::new`] to read back the same session, or to
    /// [`assemble`]/[`delete_side_cars`] once writing is done.
    pub fn file_tokens(&self) -> Vec<TaggedFile> {
        self.opened.iter().map(|&tag| TaggedFile { file_name: side_car_path(&self.base, tag), tag }).collect()
    }

    pub fn embedded_tokens(&self) -> &[(Label, PathBuf)] {
        &self.embeds
    }
}

impl EpochSink for FlatWriter {
    fn commit_compressed(&mut self, bytes: &[u8], length: usize) -> std::result::Result<(), DataError> {
        (|| -> Result<()> {
            if !self.ep_word_written {
                let mut ep = self.open_for_append(FileTag::RawEp)?;
                self.write_word(&mut ep, length as u64)?;
                self.ep_word_written = true;
            }
            let mut ep = self.open_for_append(FileTag::RawEp)?;
            self.write_word(&mut ep, self.data_payload_len)?;

            let mut data = self.open_for_append(FileTag::RawData)?;
            data.write_all(bytes)?;
            self.data_payload_len += bytes.len() as u64;
            Ok(())
        })()
        .map_err(|e| match e {
            crate::error::Error::Data(d) => d,
            other => DataError::Container(other.to_string()),
        })
    }
}

/// Reader-side half of C7: reads directly from a set of loose side-car
/// files, without ever assembling a single container.
pub struct FlatReader {
    epoch_length: usize,
    offsets: Vec<u64>,
    data_path: PathBuf,
    total_data_len: u64,
    /// Total sample count across all epochs, if known, used to give the
    /// trailing epoch its exact (possibly shorter) length; `None` falls
    /// back to treating it as a full `epoch_length` epoch.
    total_samples: Option<usize>,
}

impl FlatReader {
    pub fn new(tokens: &[TaggedFile], kind: RiffKind) -> Result<Self> {
        let ep_token = tokens
            .iter()
            .find(|t| t.tag == FileTag::RawEp)
            .ok_or_else(|| DataError::Container("flat reader: missing raw3_ep side-car".into()))?;
        let data_token = tokens
            .iter()
            .find(|t| t.tag == FileTag::RawData)
            .ok_or_else(|| DataError::Container("flat reader: missing raw3_data side-car".into()))?;

        let mut ep_file = File::open(&ep_token.file_name)?;
        read_part_header(&mut ep_file, FileTag::RawEp)?;
        let read_word = |r: &mut File| -> Result<u64> {
            Ok(match kind {
                RiffKind::Riff32 => r.read_u32::<LittleEndian>()? as u64,
                RiffKind::Riff64 => r.read_u64::<LittleEndian>()?,
            })
        };
        let epoch_length = read_word(&mut ep_file)? as usize;

        let mut offsets = Vec::new();
        loop {
            match read_word(&mut ep_file) {
                Ok(v) => offsets.push(v),
                Err(_) => break,
            }
        }

        let total_data_len = std::fs::metadata(&data_token.file_name)?.len() - PART_HEADER_LEN as u64;

        Ok(Self { epoch_length, offsets, data_path: data_token.file_name.clone(), total_data_len, total_samples: None })
    }

    /// Lets the caller supply the true total sample count (from the
    /// `eeph` header) so the trailing epoch reports its exact length
    /// instead of a full `epoch_length`.
    pub fn with_total_samples(mut self, total_samples: usize) -> Self {
        self.total_samples = Some(total_samples);
        self
    }

    pub fn epoch_length(&self) -> usize {
        self.epoch_length
    }

    fn epoch_byte_range(&self, index: usize) -> Result<(u64, u64)> {
        let start = *self.offsets.get(index).ok_or_else(|| DataError::Container(format!("flat reader: no such epoch {index}")))?;
        let end = self.offsets.get(index + 1).copied().unwrap_or(self.total_data_len);
        Ok((start, end - start))
    }
}

impl EpochSource for FlatReader {
    fn epoch_count(&self) -> usize {
        self.offsets.len()
    }

    fn epoch_sample_count(&self, index: usize) -> std::result::Result<usize, DataError> {
        if index + 1 < self.offsets.len() {
            Ok(self.epoch_length)
        } else if index < self.offsets.len() {
            match self.total_samples {
                Some(total) => {
                    let full_epochs = index;
                    let consumed = full_epochs * self.epoch_length;
                    Ok(total.saturating_sub(consumed).min(self.epoch_length))
                }
                None => Ok(self.epoch_length),
            }
        } else {
            Err(DataError::Container(format!("flat reader: no such epoch {index}")))
        }
    }

    fn read_compressed(&mut self, index: usize) -> std::result::Result<Vec<u8>, DataError> {
        let (start, len) = self.epoch_byte_range(index).map_err(|e| match e {
            crate::error::Error::Data(d) => d,
            other => DataError::Container(other.to_string()),
        })?;
        let mut f = File::open(&self.data_path)?;
        f.seek(SeekFrom::Start(PART_HEADER_LEN as u64 + start))?;
        let mut buf = vec![0u8; len as usize];
        f.read_exact(&mut buf)?;
        Ok(buf)
    }
}

fn read_full_part(token: &TaggedFile) -> Result<Vec<u8>> {
    let mut f = File::open(&token.file_name)?;
    read_part_header(&mut f, token.tag)?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)?;
    Ok(buf)
}

/// Composes a full `"RIFF"`/`"RF64"` container from a writer session's
/// side-car set plus its embedded-file tokens (spec.md §4.7 "the riff
/// assembler composes the root LIST tree, streams each side-car into its
/// target chunk ..., appends user-embedded chunks verbatim").
pub fn assemble<W: Write + Seek>(out: &mut W, kind: RiffKind, tokens: &[TaggedFile], embeds: &[(Label, PathBuf)]) -> Result<()> {
    let mut w = ChunkWriter::new(out, kind);
    w.open_root(super::label("CNT"))?;

    let find = |tag: FileTag| tokens.iter().find(|t| t.tag == tag);

    if let Some(t) = find(FileTag::Eeph) {
        w.write_data_chunk(ids::EEPH, &read_full_part(t)?)?;
    }
    if let Some(t) = find(FileTag::Info) {
        w.write_data_chunk(ids::INFO, &read_full_part(t)?)?;
    }

    w.open_list(super::label("raw3"))?;
    if let Some(t) = find(FileTag::RawEp) {
        w.write_data_chunk(ids::EP, &read_full_part(t)?)?;
    }
    if let Some(t) = find(FileTag::RawChan) {
        w.write_data_chunk(ids::CHAN, &read_full_part(t)?)?;
    }
    if let Some(t) = find(FileTag::RawData) {
        w.write_data_chunk(ids::DATA, &read_full_part(t)?)?;
    }
    w.close_chunk()?; // raw3

    if let Some(t) = find(FileTag::Triggers) {
        w.write_data_chunk(ids::EVT, &read_full_part(t)?)?;
    }

    for (label, path) in embeds {
        if super::is_reserved_label(*label) {
            return Err(crate::error::LimitError::ReservedEmbedLabel(super::label_to_string(*label)).into());
        }
        let bytes = std::fs::read(path)?;
        w.write_data_chunk(*label, &bytes)?;
    }

    w.close_all()?;
    Ok(())
}

/// Deletes every side-car named in `tokens` (ignoring files already
/// gone), as the riff assembler does once a container has been composed.
pub fn delete_side_cars(tokens: &[TaggedFile]) -> Result<()> {
    for t in tokens {
        match std::fs::remove_file(&t.file_name) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compress::{self, Format};
    use crate::types::EncodingSize;
    use std::io::Cursor;

    fn tmp_base(name: &str) -> PathBuf {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut p = std::env::temp_dir();
        p.push(format!("eeprobe-cnt-flat-test-{name}-{}-{}", std::process::id(), n));
        p
    }

    #[test]
    fn side_car_roundtrip_through_flat_reader() {
        let base = tmp_base("roundtrip");
        let mut writer = FlatWriter::new(&base, RiffKind::Riff32);

        let height = 2;
        let row_order = compress::matrix::natural_row_order(height);
        let epoch_length = 4;
        let rows: Vec<Vec<i64>> = vec![vec![1, 2, 3, 4], vec![5, 6, 7, 8]];
        let encoded = compress::matrix::encode_epoch(&rows, Format::Extended, EncodingSize::FourBytes).unwrap();
        writer.commit_compressed(&encoded, epoch_length).unwrap();

        let rows2: Vec<Vec<i64>> = vec![vec![9, 10], vec![11, 12]];
        let encoded2 = compress::matrix::encode_epoch(&rows2, Format::Extended, EncodingSize::FourBytes).unwrap();
        writer.commit_compressed(&encoded2, 2).unwrap();

        for &r in &row_order {
            writer.append_row_order_entry(r).unwrap();
        }
        writer.write_part(FileTag::Eeph, b"eeph-body").unwrap();

        let tokens = writer.file_tokens();
        let mut reader = FlatReader::new(&tokens, RiffKind::Riff32).unwrap();
        assert_eq!(reader.epoch_count(), 2);
        assert_eq!(reader.epoch_length(), 4);

        let bytes0 = reader.read_compressed(0).unwrap();
        let decoded0 = compress::matrix::decode_epoch(&bytes0, height, 4, Format::Extended).unwrap();
        assert_eq!(decoded0, rows);

        let bytes1 = reader.read_compressed(1).unwrap();
        let decoded1 = compress::matrix::decode_epoch(&bytes1, height, 2, Format::Extended).unwrap();
        assert_eq!(decoded1, rows2);

        let eeph_token = tokens.iter().find(|t| t.tag == FileTag::Eeph).unwrap();
        assert_eq!(read_full_part(eeph_token).unwrap(), b"eeph-body");

        delete_side_cars(&tokens).unwrap();
        assert!(!eeph_token.file_name.exists());
    }

    #[test]
    fn assemble_produces_a_parseable_container() {
        let base = tmp_base("assemble");
        let mut writer = FlatWriter::new(&base, RiffKind::Riff32);
        let rows: Vec<Vec<i64>> = vec![vec![1, 2, 3]];
        let encoded = compress::matrix::encode_epoch(&rows, Format::Extended, EncodingSize::FourBytes).unwrap();
        writer.commit_compressed(&encoded, 3).unwrap();
        writer.write_part(FileTag::Eeph, b"E").unwrap();
        writer.write_part(FileTag::Info, b"I").unwrap();
        writer.append_row_order_entry(0).unwrap();

        let tokens = writer.file_tokens();
        let mut buf = Vec::new();
        {
            let mut cur = Cursor::new(&mut buf);
            assemble(&mut cur, RiffKind::Riff32, &tokens, &[]).unwrap();
        }

        let mut cur = Cursor::new(&buf);
        let (kind, root) = super::super::chunk::parse_root(&mut cur).unwrap();
        assert_eq!(kind, RiffKind::Riff32);
        assert_eq!(root.find_child(ids::EEPH).unwrap().read_payload(&mut cur).unwrap(), b"E");
        let raw3 = root.find_list(super::super::label("raw3")).unwrap();
        assert!(raw3.find_child(ids::DATA).is_some());

        delete_side_cars(&tokens).unwrap();
    }

    #[test]
    fn reserved_embed_label_is_rejected_during_assembly() {
        let base = tmp_base("reserved-embed");
        let mut writer = FlatWriter::new(&base, RiffKind::Riff32);
        writer.write_part(FileTag::Eeph, b"E").unwrap();
        let tokens = writer.file_tokens();

        let mut buf = Vec::new();
        let mut cur = Cursor::new(&mut buf);
        let result = assemble(&mut cur, RiffKind::Riff32, &tokens, &[(super::super::label("eeph"), PathBuf::from("/does/not/matter"))]);
        assert!(result.is_err());

        delete_side_cars(&tokens).unwrap();
    }
}
