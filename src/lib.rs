//! EEProbe CNT container: reader, writer and compression engine for
//! continuous EEG recordings.
//!
//! A `.cnt` file is a hierarchical `"RIFF"`/`"RF64"` container
//! ([`container::chunk`]) holding an ASCII metadata header
//! ([`header`]/[`electrode`]/[`info`]), a compressed multichannel sample
//! matrix split into fixed-length epochs ([`compress`]/[`segment`]), an
//! optional trigger/event stream ([`trigger`]/[`event`]) and any number of
//! caller-embedded user files ([`embed`]). [`Writer`] and [`Reader`] are
//! the public façades most callers want; the other modules are exposed
//! for callers that need to work a layer down (e.g. to stream epochs
//! through the flat/side-car backend directly).

pub mod arithmetic;
pub mod bitstream;
pub mod compress;
pub mod container;
pub mod electrode;
pub mod embed;
pub mod error;
pub mod event;
pub mod header;
pub mod info;
pub mod reader;
pub mod segment;
#[cfg(test)]
mod tests;
pub mod time;
pub mod trigger;
pub mod types;
pub mod writer;

pub use error::{BugError, DataError, Error, LimitError, Result};
pub use reader::Reader;
pub use writer::Writer;

/// Re-exports of the types most callers construct directly: electrode and
/// recording descriptors, the container's RIFF/RF64 kind selector, the
/// compression format, triggers and events.
pub mod prelude {
    pub use crate::compress::Format;
    pub use crate::container::chunk::RiffKind;
    pub use crate::electrode::{Electrode, TimeSeries};
    pub use crate::embed::UserFile;
    pub use crate::error::{Error, Result};
    pub use crate::event::Event;
    pub use crate::info::{FileVersion, Handedness, Info, Sex};
    pub use crate::time::{DcDate, Tm};
    pub use crate::trigger::Trigger;
    pub use crate::types::EncodingSize;
    pub use crate::{Reader, Writer};
    pub use hifitime::Epoch;
}
