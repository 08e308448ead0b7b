//! Compression engine: block codec (C3) and matrix codec (C4).

pub mod block;
pub mod matrix;

pub use block::Format;
pub use matrix::{decode_epoch_to_client, encode_epoch_from_client, max_encoded_size, natural_row_order};
