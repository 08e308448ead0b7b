//! S2: a monotonic ramp predicts almost perfectly under "time" (first
//! difference) prediction, so the block codec must produce output
//! smaller than the uncompressed fixed-width layout.

use crate::compress::block::encode_row;
use crate::compress::Format;
use crate::types::EncodingSize;

#[test]
fn ramp_compresses_smaller_than_uncompressed() {
    let row: Vec<i64> = (0..1024i64).collect();
    let encoded = encode_row(&row, None, Format::Extended, EncodingSize::FourBytes).unwrap();

    let uncompressed_bytes = 1 + row.len() * 4;
    assert!(
        encoded.len() < uncompressed_bytes,
        "encoded {} bytes, uncompressed would be {uncompressed_bytes} bytes",
        encoded.len()
    );
}
