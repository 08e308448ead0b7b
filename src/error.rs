//! Crate-wide error types.
//!
//! Three error *kinds* are distinguished: `bug` (a programmer invariant
//! was violated; never expected from well-formed input), `limit` (the
//! operation is invalid in this state, e.g. a call after `close`) and
//! `data` (untrusted input failed validation). Each concern gets its own
//! `thiserror`-derived enum, following the one-`Error`-per-module
//! convention also used upstream; [`Error`] aggregates them behind
//! `#[from]` the same way a top-level `Error` aggregates
//! submodule error types in that convention.

use thiserror::Error;

/// A programmer-invariant violation. These should never surface from
/// well-formed user input; when they do, something in this crate has a
/// bug. Call sites that would hit this from untrusted input must instead
/// return [`DataError`] or [`LimitError`].
#[derive(Error, Debug)]
pub enum BugError {
    #[error("internal invariant violated: {0}")]
    Invariant(String),
}

impl BugError {
    pub fn invariant(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        #[cfg(feature = "log")]
        log::error!("bug: {msg}");
        Self::Invariant(msg)
    }
}

/// The operation is valid in some state of the object but not in this one
/// (a call after `close`, a duplicate embed label, a sample index outside
/// `i64`'s range).
#[derive(Error, Debug)]
pub enum LimitError {
    #[error("operation not valid after close/dispose")]
    Closed,
    #[error("embedded file label already in use: {0:?}")]
    DuplicateEmbedLabel(String),
    #[error("embedded file label is reserved: {0:?}")]
    ReservedEmbedLabel(String),
    #[error("value out of representable range: {0}")]
    OutOfRange(String),
    #[error("requested range is not fully available")]
    IncompleteRange,
}

/// Untrusted input failed validation: a truncated file, an impossible
/// epoch offset table, an invalid method/size field, a non-finite sampling
/// rate, an electrode label starting with `[` or `;`, and so on.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupted block header: {0}")]
    Block(String),
    #[error("corrupted container: {0}")]
    Container(String),
    #[error("corrupted ASCII header: {0}")]
    Header(String),
    #[error("corrupted event record: {0}")]
    Event(String),
    #[error("value could not be represented in the target type: {0}")]
    Cast(String),
}

/// Unified crate error. Façade-layer callers match on this; an embedding
/// C ABI would map each variant to its documented failure signal (null
/// return / nonzero status).
#[derive(Error, Debug)]
pub enum Error {
    #[error("bug: {0}")]
    Bug(#[from] BugError),
    #[error("limit: {0}")]
    Limit(#[from] LimitError),
    #[error("data: {0}")]
    Data(#[from] DataError),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Data(DataError::Io(e))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
