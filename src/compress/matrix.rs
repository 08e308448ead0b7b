//! Matrix codec (spec.md §4.4, C4).
//!
//! Applies the electrode-order permutation, demultiplexes column-major
//! client data to row-major storage (or copies row-major straight
//! through), picks the best per-row encoding with [`crate::compress::block`]
//! and assembles/parses one compressed epoch.
//!
//! Grounded on `ctk/compress/multiplex.h` (`column_major2row_major`,
//! `row_major2row_major`, the `transpose` helper and its `row_order`
//! convention: storage row `i` holds client row `row_order[i]`) and
//! `ctk/container/file_reflib.h`'s `buf_win`/`submatrix` (the windowed
//! sub-matrix copy used by the segmenter in `segment.rs`).

use crate::compress::block::{decode_row, encode_row, Format};
use crate::error::DataError;
use crate::types::EncodingSize;

/// `row_order[i]` names which client row is stored at storage row `i`.
/// Must be a permutation of `0..height`.
pub fn validate_row_order(row_order: &[u16], height: usize) -> Result<(), DataError> {
    if row_order.len() != height {
        return Err(DataError::Block(format!(
            "row_order has {} entries, expected {height}",
            row_order.len()
        )));
    }
    let mut seen = vec![false; height];
    for &r in row_order {
        let r = r as usize;
        if r >= height || seen[r] {
            return Err(DataError::Block(format!("row_order is not a permutation of 0..{height}")));
        }
        seen[r] = true;
    }
    Ok(())
}

/// The identity permutation `0, 1, ..., height-1` — the default order for
/// newly created segments (spec.md §4.4's "row-order invariant").
pub fn natural_row_order(height: usize) -> Vec<u16> {
    (0..height as u16).collect()
}

/// Demultiplexes column-major client data (`[s0c0, s0c1, ..., s1c0, ...]`)
/// into row-major storage order, applying `row_order` (storage row `i`
/// receives client row `row_order[i]`). Mirrors `column_major2row_major::
/// from_client`.
pub fn column_major_to_storage(client: &[i64], row_order: &[u16], length: usize) -> Vec<i64> {
    let height = row_order.len();
    let mut storage = vec![0i64; height * length];
    for (i, &client_row) in row_order.iter().enumerate() {
        let client_row = client_row as usize;
        for t in 0..length {
            storage[i * length + t] = client[t * height + client_row];
        }
    }
    storage
}

/// Inverse of [`column_major_to_storage`]: row-major storage back to
/// column-major client order. Mirrors `column_major2row_major::to_client`.
pub fn storage_to_column_major(storage: &[i64], row_order: &[u16], length: usize) -> Vec<i64> {
    let height = row_order.len();
    let mut client = vec![0i64; height * length];
    for (i, &client_row) in row_order.iter().enumerate() {
        let client_row = client_row as usize;
        for t in 0..length {
            client[t * height + client_row] = storage[i * length + t];
        }
    }
    client
}

/// Copies row-major client data into row-major storage order, applying
/// `row_order`. Mirrors `row_major2row_major::from_client`.
pub fn row_major_to_storage(client: &[i64], row_order: &[u16], length: usize) -> Vec<i64> {
    let mut storage = vec![0i64; row_order.len() * length];
    for (i, &client_row) in row_order.iter().enumerate() {
        let client_row = client_row as usize;
        storage[i * length..(i + 1) * length].copy_from_slice(&client[client_row * length..(client_row + 1) * length]);
    }
    storage
}

/// Inverse of [`row_major_to_storage`]. Mirrors `row_major2row_major::to_client`.
pub fn storage_to_row_major(storage: &[i64], row_order: &[u16], length: usize) -> Vec<i64> {
    let mut client = vec![0i64; row_order.len() * length];
    for (i, &client_row) in row_order.iter().enumerate() {
        let client_row = client_row as usize;
        client[client_row * length..(client_row + 1) * length].copy_from_slice(&storage[i * length..(i + 1) * length]);
    }
    client
}

/// Upper bound, in bytes, for one encoded epoch of `height` rows of
/// `length` samples each at word size `size` — worst case header plus
/// verbatim payload per row, rounded up to a whole byte. Used to
/// pre-size output buffers; the actual encoded size is almost always
/// smaller (spec.md §4.4 "Sizing").
pub fn max_encoded_size(height: usize, length: usize, size: EncodingSize) -> usize {
    let header_bits: usize = 8 + 2 * 6; // worst case: 2+2 scheme bits + two 6-bit n/nexc fields
    let word_bits = size.word_bits().get() as usize;
    let per_row_bits = header_bits + length * word_bits;
    height * ((per_row_bits + 7) / 8)
}

/// One compressed epoch's storage-order rows, concatenated block by block
/// with no extra framing (each block is self-delimiting).
pub fn encode_epoch(storage_rows: &[Vec<i64>], format: Format, size: EncodingSize) -> Result<Vec<u8>, DataError> {
    let mut out = Vec::new();
    let mut prev: Option<&[i64]> = None;
    for row in storage_rows {
        let encoded = encode_row(row, prev, format, size)?;
        out.extend_from_slice(&encoded);
        prev = Some(row.as_slice());
    }
    Ok(out)
}

/// Decodes `height` rows of `length` samples each out of `bytes`,
/// returning the rows in storage order.
pub fn decode_epoch(bytes: &[u8], height: usize, length: usize, format: Format) -> Result<Vec<Vec<i64>>, DataError> {
    let mut rows = Vec::with_capacity(height);
    let mut offset = 0usize;
    let mut prev: Option<Vec<i64>> = None;
    for _ in 0..height {
        let (decoded, consumed) = decode_row(&bytes[offset..], length, prev.as_deref(), format)?;
        offset += consumed;
        prev = Some(decoded.samples.clone());
        rows.push(decoded.samples);
    }
    Ok(rows)
}

/// Full client-facing encode: demultiplex (or copy) `client` samples into
/// storage order per `row_order`, pick the best per-row method and
/// produce one compressed epoch buffer.
pub fn encode_epoch_from_client(
    client: &[i64],
    row_order: &[u16],
    length: usize,
    column_major: bool,
    format: Format,
    size: EncodingSize,
) -> Result<Vec<u8>, DataError> {
    validate_row_order(row_order, row_order.len())?;
    let storage = if column_major {
        column_major_to_storage(client, row_order, length)
    } else {
        row_major_to_storage(client, row_order, length)
    };
    let rows: Vec<Vec<i64>> = storage.chunks(length).map(|c| c.to_vec()).collect();
    encode_epoch(&rows, format, size)
}

/// Full client-facing decode: parse a compressed epoch and re-apply the
/// inverse permutation, producing client-order (row- or column-major)
/// output.
pub fn decode_epoch_to_client(
    bytes: &[u8],
    row_order: &[u16],
    length: usize,
    column_major: bool,
    format: Format,
) -> Result<Vec<i64>, DataError> {
    let height = row_order.len();
    let rows = decode_epoch(bytes, height, length, format)?;
    let storage: Vec<i64> = rows.into_iter().flatten().collect();
    Ok(if column_major {
        storage_to_column_major(&storage, row_order, length)
    } else {
        storage_to_row_major(&storage, row_order, length)
    })
}
