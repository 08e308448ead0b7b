//! Epoch segmenter (spec.md §4.5, C5).
//!
//! Maintains the epoch offset table, the running sample count and a
//! one-epoch decode cache, translating arbitrary `[i, i+n)` sample-range
//! requests into epoch-sized accesses. Grounded on
//! `ctk/container/file_reflib.h`'s `reflib_reader_common` (the cache
//! fields, `load_epoch`/`get`) and `buf_win`/`submatrix` (the windowed
//! sub-matrix copy, reimplemented here directly over `Vec<i64>` slices
//! rather than a generic iterator window).

use crate::compress::{self, Format};
use crate::error::{DataError, Error, LimitError, Result};
use crate::types::EncodingSize;

/// One epoch's position in the underlying `"data"` payload: byte offset
/// and byte length. The final epoch's length is inferred from
/// `total_data_size - offset[last]`; all others from the difference
/// between consecutive offsets (spec.md §4.5 "Offset table").
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct EpochRange {
    pub fpos: i64,
    pub size: i64,
}

/// Backing store the segmenter reads compressed epoch bytes from. A
/// single-file ([`crate::container::chunk`]) or flat/side-car
/// ([`crate::container::flat`]) reader both implement this the same way:
/// look up the byte range for epoch `index` and return its raw bytes.
pub trait EpochSource {
    /// Number of complete epochs recorded so far.
    fn epoch_count(&self) -> usize;
    /// Number of samples in epoch `index` (the last epoch may be shorter
    /// than `epoch_length`).
    fn epoch_sample_count(&self, index: usize) -> std::result::Result<usize, DataError>;
    /// Raw compressed bytes of epoch `index`.
    fn read_compressed(&mut self, index: usize) -> std::result::Result<Vec<u8>, DataError>;
}

/// Sink the segmenter commits freshly encoded epochs to while writing.
pub trait EpochSink {
    /// Appends one compressed epoch of `length` samples and records its
    /// offset-table entry.
    fn commit_compressed(&mut self, bytes: &[u8], length: usize) -> std::result::Result<(), DataError>;
}

struct Cache {
    index: usize,
    length: usize,
    /// Decoded samples in storage (row-major) order, `height * length`.
    rows: Vec<i64>,
}

/// Read-side segmenter: epoch offset table + LRU-1 decode cache, layered
/// over any [`EpochSource`].
pub struct Segmenter<S> {
    source: S,
    height: usize,
    row_order: Vec<u16>,
    epoch_length: usize,
    total_samples: i64,
    format: Format,
    size: EncodingSize,
    cache: Option<Cache>,
}

impl<S: EpochSource> Segmenter<S> {
    pub fn new(
        source: S,
        height: usize,
        row_order: Vec<u16>,
        epoch_length: usize,
        total_samples: i64,
        format: Format,
        size: EncodingSize,
    ) -> Result<Self> {
        compress::matrix::validate_row_order(&row_order, height)?;
        Ok(Self { source, height, row_order, epoch_length, total_samples, format, size, cache: None })
    }

    pub fn sample_count(&self) -> i64 {
        self.total_samples
    }

    pub fn epoch_length(&self) -> usize {
        self.epoch_length
    }

    pub fn epoch_count(&self) -> usize {
        self.source.epoch_count()
    }

    fn ensure_cached(&mut self, epoch_index: usize) -> Result<()> {
        if let Some(c) = &self.cache {
            if c.index == epoch_index {
                return Ok(());
            }
        }
        let length = self.source.epoch_sample_count(epoch_index)?;
        let bytes = self.source.read_compressed(epoch_index)?;
        let decoded = compress::matrix::decode_epoch(&bytes, self.height, length, self.format)?;
        let flat: Vec<i64> = decoded.into_iter().flatten().collect();
        self.cache = Some(Cache { index: epoch_index, length, rows: flat });
        Ok(())
    }

    /// Invalidates the decode cache, e.g. after a seek to an unrelated
    /// position or a writer-side append that changed the epoch table.
    pub fn invalidate_cache(&mut self) {
        self.cache = None;
    }

    /// Reads `[i, i+n)` samples in row-major (channel-major) order.
    pub fn range_row_major(&mut self, i: i64, n: i64) -> Result<Vec<i64>> {
        self.range(i, n, false)
    }

    /// Reads `[i, i+n)` samples in column-major (sample-major) order.
    pub fn range_column_major(&mut self, i: i64, n: i64) -> Result<Vec<i64>> {
        self.range(i, n, true)
    }

    /// `std::nothrow`-equivalent siblings (spec.md §7): `None` instead of
    /// propagating an error, for callers that prefer to treat an
    /// unavailable range as "no data" rather than a hard failure.
    pub fn try_range_row_major(&mut self, i: i64, n: i64) -> Option<Vec<i64>> {
        self.range_row_major(i, n).ok()
    }

    pub fn try_range_column_major(&mut self, i: i64, n: i64) -> Option<Vec<i64>> {
        self.range_column_major(i, n).ok()
    }

    fn range(&mut self, i: i64, n: i64, column_major: bool) -> Result<Vec<i64>> {
        if i < 0 || n < 1 {
            return Err(DataError::Container(format!("invalid range request i={i} n={n}")));
        }
        let requested = i.checked_add(n).ok_or_else(|| DataError::Container("range request overflows i64".into()))?;
        if requested > self.total_samples {
            return Err(DataError::Container(format!(
                "range [{i}, {requested}) exceeds sample count {}",
                self.total_samples
            )));
        }
        if self.epoch_length == 0 {
            return Err(DataError::Container("epoch length is zero".into()));
        }

        let height = self.height;
        let mut storage = vec![0i64; height * n as usize];
        let mut cursor = i;
        let mut remaining = n;
        let mut out_offset: i64 = 0;

        while remaining > 0 {
            let q = (cursor / self.epoch_length as i64) as usize;
            let r = (cursor % self.epoch_length as i64) as usize;
            self.ensure_cached(q)?;
            let cache = self.cache.as_ref().expect("ensure_cached populates the cache");
            let available = cache.length - r;
            if available == 0 {
                return Err(DataError::Container(format!("epoch {q} is shorter than its recorded range")));
            }
            let take = (available as i64).min(remaining) as usize;

            for row in 0..height {
                let src_start = row * cache.length + r;
                let dst_start = row * n as usize + out_offset as usize;
                storage[dst_start..dst_start + take].copy_from_slice(&cache.rows[src_start..src_start + take]);
            }

            cursor += take as i64;
            remaining -= take as i64;
            out_offset += take as i64;
        }

        Ok(if column_major {
            compress::matrix::storage_to_column_major(&storage, &self.row_order, n as usize)
        } else {
            compress::matrix::storage_to_row_major(&storage, &self.row_order, n as usize)
        })
    }

    /// Returns one full epoch (storage order, pre-permutation) for
    /// diagnostics or embedding-adjacent tooling; primarily exercised by
    /// tests validating segmenter/epoch equivalence.
    pub fn epoch_storage_rows(&mut self, epoch_index: usize) -> Result<Vec<i64>> {
        self.ensure_cached(epoch_index)?;
        Ok(self.cache.as_ref().expect("just cached").rows.clone())
    }
}

/// Write-side segmenter: buffers client samples until `epoch_length` is
/// reached, then encodes and commits through an [`EpochSink`]. `close`
/// commits whatever partial epoch remains (spec.md §4.5 "Append": "the
/// last epoch is shorter" condition).
pub struct SegmentWriter<K> {
    sink: K,
    height: usize,
    row_order: Vec<u16>,
    epoch_length: usize,
    format: Format,
    size: EncodingSize,
    /// Buffered client samples, row-major, not yet epoch-sized.
    pending: Vec<i64>,
    pending_len: usize,
    total_samples: i64,
    closed: bool,
}

impl<K: EpochSink> SegmentWriter<K> {
    pub fn new(sink: K, height: usize, row_order: Vec<u16>, epoch_length: usize, format: Format, size: EncodingSize) -> Result<Self> {
        compress::matrix::validate_row_order(&row_order, height)?;
        if epoch_length == 0 {
            return Err(Error::Data(DataError::Container("epoch length must be positive".into())));
        }
        Ok(Self {
            sink,
            height,
            row_order,
            epoch_length,
            format,
            size,
            pending: Vec::new(),
            pending_len: 0,
            total_samples: 0,
            closed: false,
        })
    }

    pub fn sample_count(&self) -> i64 {
        self.total_samples
    }

    /// Direct access to the backing [`EpochSink`], for callers that need
    /// to write sink-specific auxiliary state (permutation table,
    /// triggers) alongside the epoch stream.
    pub fn sink_mut(&mut self) -> &mut K {
        &mut self.sink
    }

    /// Consumes the writer, returning its backing sink (e.g. to read back
    /// buffered bytes or side-car file tokens once closed).
    pub fn into_sink(self) -> K {
        self.sink
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Limit(LimitError::Closed));
        }
        Ok(())
    }

    /// Appends `length` samples (row-major, height rows of `length`
    /// samples each) to the pending buffer, flushing full epochs as they
    /// accumulate.
    pub fn append_row_major(&mut self, client: &[i64], length: usize) -> Result<()> {
        self.check_open()?;
        if client.len() != self.height * length {
            return Err(Error::Data(DataError::Container(format!(
                "append_row_major: expected {} samples, got {}",
                self.height * length,
                client.len()
            ))));
        }
        let storage = compress::matrix::row_major_to_storage(client, &self.row_order, length);
        self.feed_storage(&storage, length)
    }

    /// Appends `length` samples in column-major order.
    pub fn append_column_major(&mut self, client: &[i64], length: usize) -> Result<()> {
        self.check_open()?;
        if client.len() != self.height * length {
            return Err(Error::Data(DataError::Container(format!(
                "append_column_major: expected {} samples, got {}",
                self.height * length,
                client.len()
            ))));
        }
        let storage = compress::matrix::column_major_to_storage(client, &self.row_order, length);
        self.feed_storage(&storage, length)
    }

    fn feed_storage(&mut self, storage: &[i64], length: usize) -> Result<()> {
        // reshape pending buffer as height rows, appending `length` columns to each
        if self.pending_len == 0 {
            self.pending = storage.to_vec();
        } else {
            let mut merged = Vec::with_capacity(self.height * (self.pending_len + length));
            for row in 0..self.height {
                merged.extend_from_slice(&self.pending[row * self.pending_len..(row + 1) * self.pending_len]);
                merged.extend_from_slice(&storage[row * length..(row + 1) * length]);
            }
            self.pending = merged;
        }
        self.pending_len += length;
        self.total_samples = self
            .total_samples
            .checked_add(length as i64)
            .ok_or_else(|| Error::Data(DataError::Container("sample count overflows i64".into())))?;

        while self.pending_len >= self.epoch_length {
            self.flush_one_epoch(self.epoch_length)?;
        }
        Ok(())
    }

    fn flush_one_epoch(&mut self, take: usize) -> Result<()> {
        let rows: Vec<Vec<i64>> = (0..self.height)
            .map(|row| self.pending[row * self.pending_len..row * self.pending_len + take].to_vec())
            .collect();
        let encoded = compress::matrix::encode_epoch(&rows, self.format, self.size)?;
        self.sink.commit_compressed(&encoded, take)?;

        let remaining_len = self.pending_len - take;
        if remaining_len == 0 {
            self.pending.clear();
        } else {
            let mut rest = Vec::with_capacity(self.height * remaining_len);
            for row in 0..self.height {
                let start = row * self.pending_len + take;
                rest.extend_from_slice(&self.pending[start..start + remaining_len]);
            }
            self.pending = rest;
        }
        self.pending_len = remaining_len;
        Ok(())
    }

    /// Commits the partial trailing epoch (if any) and marks this writer
    /// closed. All further appends fail with [`LimitError::Closed`].
    pub fn close(&mut self) -> Result<()> {
        self.check_open()?;
        if self.pending_len > 0 {
            self.flush_one_epoch(self.pending_len)?;
        }
        self.closed = true;
        Ok(())
    }
}
