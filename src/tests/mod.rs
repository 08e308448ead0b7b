//! End-to-end scenarios (spec.md §8 S1-S6), exercised through the public
//! [`crate::Writer`]/[`crate::Reader`] façade the way a caller would use
//! them, rather than through any single module's internals.
//!
//! S3 (10,000-trigger roundtrip) and S5 (event file roundtrip) are
//! colocated with the modules they exercise almost exclusively
//! ([`crate::reader`], [`crate::event`]); S4 (32-bit size-field refusal)
//! is colocated with [`crate::container::chunk`] since it tests a single
//! private helper at the boundary rather than a full write/read cycle.

mod s1_epoch_layout;
mod s2_time_prediction_residuals;
mod s6_embedded_files;
