//! Hierarchical container I/O: the single-file RIFF/RF64 reader/writer
//! (C6, [`chunk`]) and the "flat" side-car variant (C7, [`flat`]), plus the
//! label constants and reserved-label set both share.

pub mod chunk;
#[cfg(feature = "flat")]
pub mod flat;

/// Width of a chunk identifier or a `LIST` label on the wire.
pub const LABEL_LEN: usize = 4;
pub type Label = [u8; LABEL_LEN];

/// Right-pads `s` with ASCII spaces (or truncates) to [`LABEL_LEN`] bytes,
/// mirroring `as_label`'s fixed-width identifier/label convention.
pub const fn label(s: &str) -> Label {
    let bytes = s.as_bytes();
    let mut out = [b' '; LABEL_LEN];
    let mut i = 0;
    while i < LABEL_LEN && i < bytes.len() {
        out[i] = bytes[i];
        i += 1;
    }
    out
}

pub fn label_to_string(l: Label) -> String {
    String::from_utf8_lossy(&l).trim_end().to_string()
}

/// Chunk identifiers and list labels this container format recognizes
/// (spec.md §4.6).
pub mod ids {
    use super::{label, Label};

    pub const EEPH: Label = label("eeph");
    pub const INFO: Label = label("info");
    pub const RAW3: Label = label("raw3");
    pub const EP: Label = label("ep");
    pub const CHAN: Label = label("chan");
    pub const DATA: Label = label("data");
    pub const EVT: Label = label("evt");
    pub const LIST: Label = label("LIST");
    pub const CNT: Label = label("CNT");
}

/// Labels reserved for container-internal use; a user-embedded chunk
/// (§4.6, §4.7 `embed`) may not claim one of these.
pub const RESERVED_LABELS: &[Label] = &[
    label("eeph"),
    label("info"),
    label("evt"),
    label("raw3"),
    label("rawf"),
    label("stdd"),
    label("tfh"),
    label("tfd"),
    label("refh"),
    label("imp"),
    label("nsh"),
    label("vish"),
    label("egih"),
    label("egig"),
    label("egiz"),
    label("binh"),
    label("xevt"),
    label("xseg"),
    label("xsen"),
    label("xtrg"),
];

pub fn is_reserved_label(l: Label) -> bool {
    RESERVED_LABELS.contains(&l)
}
