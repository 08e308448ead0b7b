//! Public write façade (spec.md §4.11, C11): one [`Writer`] per segment
//! being produced. Buffers metadata and compressed epochs through a
//! [`crate::segment::SegmentWriter`], then assembles the final
//! `"RIFF"`/`"RF64"` container on [`Writer::close`].
//!
//! With the `flat` feature (on by default) the backing store is a set of
//! side-car files assembled at close time (grounded on
//! `cnt_writer_reflib_flat`); without it, everything is buffered in
//! memory and written out in one pass (grounded on
//! `cnt_writer_reflib_riff`). Either way the public surface is identical.

use std::fs::File;
use std::path::PathBuf;

use byteorder::{LittleEndian, WriteBytesExt};
use hifitime::Epoch;

use crate::compress::{self, Format};
use crate::container::chunk::{ChunkWriter, RiffKind};
use crate::container::ids;
#[cfg(feature = "flat")]
use crate::container::flat::{self, FileTag, FlatWriter};
use crate::electrode::Electrode;
use crate::embed::EmbedDirectory;
use crate::error::{DataError, Error, LimitError, Result};
use crate::header;
use crate::info::{FileVersion, Info};
use crate::segment::{EpochSink, SegmentWriter};
use crate::trigger::Trigger;
use crate::types::EncodingSize;

#[cfg(not(feature = "flat"))]
#[derive(Default)]
struct MemorySink {
    data: Vec<u8>,
    offsets: Vec<u64>,
}

#[cfg(not(feature = "flat"))]
impl EpochSink for MemorySink {
    fn commit_compressed(&mut self, bytes: &[u8], _length: usize) -> std::result::Result<(), DataError> {
        self.offsets.push(self.data.len() as u64);
        self.data.extend_from_slice(bytes);
        Ok(())
    }
}

#[cfg(feature = "flat")]
type Backend = FlatWriter;
#[cfg(not(feature = "flat"))]
type Backend = MemorySink;

/// One writer session for a single container/segment. Operations follow
/// the order documented in spec.md §4.11: construct, set metadata, append
/// samples (and triggers/embeds as they become available), `close`.
pub struct Writer {
    path: PathBuf,
    kind: RiffKind,
    format: Format,
    size: EncodingSize,
    electrodes: Vec<Electrode>,
    row_order: Option<Vec<u16>>,
    sampling_frequency: f64,
    epoch_length: usize,
    start_time: Epoch,
    info: Info,
    history: String,
    version: FileVersion,
    triggers: Vec<Trigger>,
    embeds: EmbedDirectory,
    segment: Option<SegmentWriter<Backend>>,
    closed: bool,
}

impl Writer {
    /// Opens a writer session targeting `path` (the final container file;
    /// with the `flat` feature this is also used to derive the side-car
    /// base name).
    pub fn new(path: impl Into<PathBuf>, kind: RiffKind) -> Self {
        Self {
            path: path.into(),
            kind,
            format: Format::Extended,
            size: EncodingSize::FourBytes,
            electrodes: Vec::new(),
            row_order: None,
            sampling_frequency: 0.0,
            epoch_length: 0,
            start_time: Epoch::from_gregorian_utc(1899, 12, 30, 0, 0, 0, 0),
            info: Info::default(),
            history: String::new(),
            version: FileVersion::CURRENT,
            triggers: Vec::new(),
            embeds: EmbedDirectory::new(),
            segment: None,
            closed: false,
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Limit(LimitError::Closed));
        }
        Ok(())
    }

    fn check_not_started(&self) -> Result<()> {
        if self.segment.is_some() {
            return Err(Error::Data(DataError::Container("metadata cannot change once samples have been appended".into())));
        }
        Ok(())
    }

    /// Sets the electrode table (also resets the channel permutation to
    /// the natural order unless [`Writer::set_row_order`] is called
    /// afterwards). Must be called before the first append.
    pub fn set_electrodes(&mut self, electrodes: Vec<Electrode>) -> Result<()> {
        self.check_open()?;
        self.check_not_started()?;
        for e in &electrodes {
            e.validate().map_err(Error::Data)?;
        }
        self.row_order = None;
        self.electrodes = electrodes;
        Ok(())
    }

    pub fn add_electrode(&mut self, electrode: Electrode) -> Result<()> {
        self.check_open()?;
        self.check_not_started()?;
        electrode.validate().map_err(Error::Data)?;
        self.row_order = None;
        self.electrodes.push(electrode);
        Ok(())
    }

    /// Overrides the default (identity) channel permutation; `row_order`
    /// must be a permutation of `0..electrode_count`.
    pub fn set_row_order(&mut self, row_order: Vec<u16>) -> Result<()> {
        self.check_open()?;
        self.check_not_started()?;
        compress::matrix::validate_row_order(&row_order, self.electrodes.len()).map_err(Error::Data)?;
        self.row_order = Some(row_order);
        Ok(())
    }

    pub fn set_sampling_frequency(&mut self, hz: f64) -> Result<()> {
        self.check_open()?;
        self.check_not_started()?;
        if !hz.is_finite() || hz <= 0.0 {
            return Err(Error::Data(DataError::Header(format!("sampling frequency {hz} is not positive and finite"))));
        }
        self.sampling_frequency = hz;
        Ok(())
    }

    pub fn set_epoch_length(&mut self, samples: usize) -> Result<()> {
        self.check_open()?;
        self.check_not_started()?;
        if samples == 0 {
            return Err(Error::Data(DataError::Header("epoch length must be positive".into())));
        }
        self.epoch_length = samples;
        Ok(())
    }

    pub fn set_start_time(&mut self, t: Epoch) -> Result<()> {
        self.check_open()?;
        self.start_time = t;
        Ok(())
    }

    pub fn info_mut(&mut self) -> &mut Info {
        &mut self.info
    }

    pub fn set_history(&mut self, text: impl Into<String>) {
        self.history = text.into();
    }

    pub fn set_format(&mut self, format: Format) -> Result<()> {
        self.check_not_started()?;
        self.format = format;
        Ok(())
    }

    pub fn set_word_size(&mut self, size: EncodingSize) -> Result<()> {
        self.check_not_started()?;
        self.size = size;
        Ok(())
    }

    fn channel_count(&self) -> usize {
        self.electrodes.len()
    }

    #[cfg(feature = "flat")]
    fn make_segment(&mut self) -> Result<SegmentWriter<Backend>> {
        let base = self.path.with_extension("");
        let backend = FlatWriter::new(base, self.kind);
        let row_order = self.row_order.clone().unwrap_or_else(|| compress::matrix::natural_row_order(self.channel_count()));
        SegmentWriter::new(backend, self.channel_count(), row_order, self.epoch_length, self.format, self.size)
    }

    #[cfg(not(feature = "flat"))]
    fn make_segment(&mut self) -> Result<SegmentWriter<Backend>> {
        let row_order = self.row_order.clone().unwrap_or_else(|| compress::matrix::natural_row_order(self.channel_count()));
        SegmentWriter::new(MemorySink::default(), self.channel_count(), row_order, self.epoch_length, self.format, self.size)
    }

    fn ensure_started(&mut self) -> Result<()> {
        self.check_open()?;
        if self.segment.is_some() {
            return Ok(());
        }
        if self.electrodes.is_empty() {
            return Err(Error::Data(DataError::Header("writer has no electrodes set".into())));
        }
        if self.sampling_frequency <= 0.0 {
            return Err(Error::Data(DataError::Header("writer has no sampling frequency set".into())));
        }
        if self.epoch_length == 0 {
            return Err(Error::Data(DataError::Header("writer has no epoch length set".into())));
        }
        let row_order = self.row_order.clone().unwrap_or_else(|| compress::matrix::natural_row_order(self.channel_count()));
        self.row_order = Some(row_order.clone());

        let segment = self.make_segment()?;
        self.segment = Some(segment);

        #[cfg(feature = "flat")]
        {
            let seg = self.segment.as_mut().expect("just set");
            for &r in &row_order {
                seg.sink_mut().append_row_order_entry(r)?;
            }
        }

        Ok(())
    }

    fn channel_count_checked(&self) -> Result<usize> {
        if self.electrodes.is_empty() {
            return Err(Error::Data(DataError::Header("writer has no electrodes set".into())));
        }
        Ok(self.electrodes.len())
    }

    /// Appends raw integer samples, row-major: `height` rows of `length`
    /// samples each.
    pub fn append_row_major_i32(&mut self, client: &[i32], length: usize) -> Result<()> {
        self.ensure_started()?;
        let client: Vec<i64> = client.iter().map(|&v| v as i64).collect();
        self.segment.as_mut().expect("ensure_started").append_row_major(&client, length)
    }

    pub fn append_column_major_i32(&mut self, client: &[i32], length: usize) -> Result<()> {
        self.ensure_started()?;
        let client: Vec<i64> = client.iter().map(|&v| v as i64).collect();
        self.segment.as_mut().expect("ensure_started").append_column_major(&client, length)
    }

    fn scale_to_raw(&self, physical: f64, channel: usize) -> Result<i64> {
        let e = self.electrodes.get(channel).ok_or_else(|| Error::Data(DataError::Header(format!("no electrode at index {channel}"))))?;
        let divisor = e.iscale * e.rscale;
        if divisor == 0.0 || !divisor.is_finite() {
            return Err(Error::Data(DataError::Header(format!("electrode {:?} has a zero/non-finite scale", e.active_label))));
        }
        Ok((physical / divisor).round() as i64)
    }

    /// Appends physical-unit (`sample × IScale × RScale`) float samples,
    /// row-major, converting each value back to a raw integer sample by
    /// its channel's scale.
    pub fn append_row_major_f64(&mut self, client: &[f64], length: usize) -> Result<()> {
        let channels = self.channel_count_checked()?;
        if client.len() != channels * length {
            return Err(Error::Data(DataError::Container("append_row_major_f64: length mismatch".into())));
        }
        let mut raw = Vec::with_capacity(client.len());
        for c in 0..channels {
            for t in 0..length {
                raw.push(self.scale_to_raw(client[c * length + t], c)?);
            }
        }
        self.ensure_started()?;
        self.segment.as_mut().expect("ensure_started").append_row_major(&raw, length)
    }

    pub fn append_column_major_f64(&mut self, client: &[f64], length: usize) -> Result<()> {
        let channels = self.channel_count_checked()?;
        if client.len() != channels * length {
            return Err(Error::Data(DataError::Container("append_column_major_f64: length mismatch".into())));
        }
        let mut raw = vec![0i64; client.len()];
        for t in 0..length {
            for c in 0..channels {
                raw[t * channels + c] = self.scale_to_raw(client[t * channels + c], c)?;
            }
        }
        self.ensure_started()?;
        self.segment.as_mut().expect("ensure_started").append_column_major(&raw, length)
    }

    /// "v4" float variant: samples are already raw integer-equivalent
    /// values (no `IScale`/`RScale` division), only rounded to `i64`.
    /// Column-major, matching the v4 reader's layout.
    pub fn append_column_major_v4(&mut self, client: &[f32], length: usize) -> Result<()> {
        self.ensure_started()?;
        let raw: Vec<i64> = client.iter().map(|&v| v.round() as i64).collect();
        self.segment.as_mut().expect("ensure_started").append_column_major(&raw, length)
    }

    pub fn append_trigger(&mut self, trigger: Trigger) -> Result<()> {
        self.check_open()?;
        #[cfg(feature = "flat")]
        {
            self.ensure_started()?;
            let seg = self.segment.as_mut().expect("ensure_started");
            seg.sink_mut().append_trigger(&trigger)?;
        }
        self.triggers.push(trigger);
        Ok(())
    }

    pub fn append_triggers(&mut self, triggers: impl IntoIterator<Item = Trigger>) -> Result<()> {
        for t in triggers {
            self.append_trigger(t)?;
        }
        Ok(())
    }

    /// Attaches a user file as a named top-level chunk, written verbatim
    /// at [`Writer::close`].
    pub fn embed(&mut self, label: [u8; 4], path: impl Into<PathBuf>) -> Result<()> {
        self.check_open()?;
        self.embeds.attach(label, path)
    }

    #[cfg(feature = "flat")]
    fn close_impl(&mut self) -> Result<()> {
        self.ensure_started()?;
        let mut segment = self.segment.take().expect("ensure_started");
        segment.close()?;
        let sample_count = segment.sample_count();
        let mut backend = segment.into_sink();

        let eeph = header::make_eeph_content(self.version, self.sampling_frequency, sample_count, &self.electrodes, &self.history);
        let start = crate::time::timepoint_to_dcdate(self.start_time);
        let info = header::make_info_content(start, &self.info);

        backend.write_part(FileTag::Eeph, eeph.as_bytes())?;
        backend.write_part(FileTag::Info, info.as_bytes())?;
        for (label, path) in self.embeds.as_embed_tokens() {
            backend.embed(label, path)?;
        }

        let tokens = backend.file_tokens();
        let embeds = backend.embedded_tokens().to_vec();
        let mut out = File::create(&self.path)?;
        flat::assemble(&mut out, self.kind, &tokens, &embeds)?;
        flat::delete_side_cars(&tokens)?;
        Ok(())
    }

    #[cfg(not(feature = "flat"))]
    fn close_impl(&mut self) -> Result<()> {
        self.ensure_started()?;
        let mut segment = self.segment.take().expect("ensure_started");
        segment.close()?;
        let sample_count = segment.sample_count();
        let sink = segment.into_sink();

        let eeph = header::make_eeph_content(self.version, self.sampling_frequency, sample_count, &self.electrodes, &self.history);
        let start = crate::time::timepoint_to_dcdate(self.start_time);
        let info = header::make_info_content(start, &self.info);

        let row_order = self.row_order.clone().unwrap_or_else(|| compress::matrix::natural_row_order(self.channel_count()));
        let mut chan_bytes = Vec::with_capacity(row_order.len() * 2);
        for &r in &row_order {
            chan_bytes.write_u16::<LittleEndian>(r)?;
        }

        let word_width = match self.kind {
            RiffKind::Riff32 => 4usize,
            RiffKind::Riff64 => 8usize,
        };
        let mut ep_bytes = Vec::with_capacity((sink.offsets.len() + 1) * word_width);
        let epoch_length = self.epoch_length as u64;
        match self.kind {
            RiffKind::Riff32 => ep_bytes.write_u32::<LittleEndian>(epoch_length as u32)?,
            RiffKind::Riff64 => ep_bytes.write_u64::<LittleEndian>(epoch_length)?,
        }
        for &off in &sink.offsets {
            match self.kind {
                RiffKind::Riff32 => ep_bytes.write_u32::<LittleEndian>(off as u32)?,
                RiffKind::Riff64 => ep_bytes.write_u64::<LittleEndian>(off)?,
            }
        }

        let mut trigger_bytes = Vec::new();
        for t in &self.triggers {
            match self.kind {
                RiffKind::Riff32 => t.write_riff32(&mut trigger_bytes).map_err(Error::Data)?,
                RiffKind::Riff64 => t.write_rf64(&mut trigger_bytes).map_err(Error::Data)?,
            }
        }

        let mut out = File::create(&self.path)?;
        let mut w = ChunkWriter::new(&mut out, self.kind);
        w.open_root(crate::container::label("CNT"))?;
        w.write_data_chunk(ids::EEPH, eeph.as_bytes())?;
        w.write_data_chunk(ids::INFO, info.as_bytes())?;
        w.open_list(crate::container::label("raw3"))?;
        w.write_data_chunk(ids::EP, &ep_bytes)?;
        w.write_data_chunk(ids::CHAN, &chan_bytes)?;
        w.write_data_chunk(ids::DATA, &sink.data)?;
        w.close_chunk()?;
        if !self.triggers.is_empty() {
            w.write_data_chunk(ids::EVT, &trigger_bytes)?;
        }
        for file in self.embeds.iter() {
            let bytes = crate::embed::read_from_disk(file)?;
            w.write_data_chunk(file.label, &bytes)?;
        }
        w.close_all()?;
        Ok(())
    }

    /// Commits the partial trailing epoch, assembles the final container
    /// and marks this writer closed. Further calls fail with
    /// [`LimitError::Closed`].
    pub fn close(mut self) -> Result<()> {
        self.check_open()?;
        self.close_impl()?;
        self.closed = true;
        Ok(())
    }
}
