//! Hierarchical container I/O (spec.md §4.6, C6): chunk parsing and
//! writing for the two size-field variants ("RIFF", 32-bit; "RF64",
//! 64-bit), including nested `"LIST"` chunks, even-length padding and
//! deferred header-size patching.
//!
//! Grounded on `src/container/file_epoch.cc` (`as_label`, `root_chunk`/
//! `list_chunk`/`data_chunk`, `is_root`/`is_list`, `header_size`,
//! `chunk_payload`) and the source's general convention of treating the
//! size field as "bytes following the size field", matching standard
//! RIFF semantics — a `LIST`/root chunk's size therefore includes the
//! 4-byte label, while a plain data chunk's size is just its payload.
//!
//! The source patches a chunk's size field from its writer's destructor
//! (spec.md §9 "Destructor-based chunk size patching → scoped guard").
//! Holding a `&mut W` borrow per nested chunk across sibling writes isn't
//! ergonomic in safe Rust, so [`ChunkWriter`] keeps an internal stack of
//! open chunks instead: [`ChunkWriter::close_chunk`] pops the innermost
//! entry and patches it, so chunks still close bottom-up exactly as the
//! destructor order did. A [`ChunkWriter`] dropped with unclosed chunks
//! logs a bug rather than patching (there is no way to propagate a
//! `Result` from `Drop`); callers that bail out early must call
//! [`ChunkWriter::close_all`] (or unwind through their own error path)
//! before dropping the writer.

use std::io::{Read, Seek, SeekFrom, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::{ids, Label};
use crate::error::{DataError, Result};

/// Which size-field width this container uses.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RiffKind {
    /// `"RIFF"` root id, 32-bit size fields.
    Riff32,
    /// `"RF64"` root id, 64-bit size fields — used when the container
    /// would otherwise exceed 4 GiB (spec.md §8 S4).
    Riff64,
}

impl RiffKind {
    fn root_id(self) -> Label {
        match self {
            RiffKind::Riff32 => super::label("RIFF"),
            RiffKind::Riff64 => super::label("RF64"),
        }
    }

    /// Largest payload size representable without promoting to [`Riff64`].
    pub const RIFF32_MAX_SIZE: u64 = u32::MAX as u64;
}

fn read_size<R: Read>(r: &mut R, kind: RiffKind) -> Result<u64> {
    Ok(match kind {
        RiffKind::Riff32 => r.read_u32::<LittleEndian>()? as u64,
        RiffKind::Riff64 => r.read_u64::<LittleEndian>()?,
    })
}

fn write_size<W: Write>(w: &mut W, kind: RiffKind, size: u64) -> Result<()> {
    match kind {
        RiffKind::Riff32 => {
            let size: u32 = size
                .try_into()
                .map_err(|_| DataError::Container(format!("chunk size {size} does not fit a 32-bit RIFF container")))?;
            w.write_u32::<LittleEndian>(size)?;
        }
        RiffKind::Riff64 => w.write_u64::<LittleEndian>(size)?,
    }
    Ok(())
}

/// One parsed chunk: its identifier, optional `LIST`/root label, the byte
/// range of its payload (excluding the padding byte, if any) and its
/// parsed children (non-empty only for `LIST`/root chunks).
#[derive(Debug, Clone)]
pub struct ChunkNode {
    pub id: Label,
    pub label: Option<Label>,
    /// `(payload start offset, payload length)` within the source stream.
    pub payload: (u64, u64),
    pub children: Vec<ChunkNode>,
}

impl ChunkNode {
    pub fn is_list(&self) -> bool {
        self.label.is_some()
    }

    pub fn find_child(&self, id: Label) -> Option<&ChunkNode> {
        self.children.iter().find(|c| c.id == id && c.label.is_none())
    }

    pub fn find_list(&self, label: Label) -> Option<&ChunkNode> {
        self.children.iter().find(|c| c.id == ids::LIST && c.label == Some(label))
    }

    /// Reads this chunk's payload bytes out of `r`.
    pub fn read_payload<R: Read + Seek>(&self, r: &mut R) -> Result<Vec<u8>> {
        r.seek(SeekFrom::Start(self.payload.0))?;
        let mut buf = vec![0u8; self.payload.1 as usize];
        r.read_exact(&mut buf)?;
        Ok(buf)
    }
}

fn parse_children<R: Read + Seek>(r: &mut R, kind: RiffKind, start: u64, len: u64) -> Result<Vec<ChunkNode>> {
    let end = start.checked_add(len).ok_or_else(|| DataError::Container("chunk range overflows u64".into()))?;
    let mut children = Vec::new();
    loop {
        let pos = r.stream_position()?;
        if pos >= end {
            break;
        }
        children.push(parse_node(r, kind)?);
    }
    Ok(children)
}

fn parse_node<R: Read + Seek>(r: &mut R, kind: RiffKind) -> Result<ChunkNode> {
    let mut id = [0u8; 4];
    r.read_exact(&mut id)?;
    let size = read_size(r, kind)?;
    let is_list = id == ids::LIST;

    let label = if is_list {
        let mut l = [0u8; 4];
        r.read_exact(&mut l)?;
        Some(l)
    } else {
        None
    };

    let payload_start = r.stream_position()?;
    let payload_len = if is_list {
        size.checked_sub(4).ok_or_else(|| DataError::Container("LIST chunk smaller than its label".into()))?
    } else {
        size
    };

    let children = if is_list { parse_children(r, kind, payload_start, payload_len)? } else { Vec::new() };

    let payload_end = payload_start.checked_add(payload_len).ok_or_else(|| DataError::Container("chunk payload overflows u64".into()))?;
    r.seek(SeekFrom::Start(payload_end))?;
    if payload_len % 2 == 1 {
        r.seek(SeekFrom::Current(1))?;
    }

    Ok(ChunkNode { id, label, payload: (payload_start, payload_len), children })
}

/// Parses the root chunk (and its full descendant tree) starting at
/// offset 0 of `r`.
pub fn parse_root<R: Read + Seek>(r: &mut R) -> Result<(RiffKind, ChunkNode)> {
    r.seek(SeekFrom::Start(0))?;
    let mut id = [0u8; 4];
    r.read_exact(&mut id)?;
    let kind = if id == RiffKind::Riff32.root_id() {
        RiffKind::Riff32
    } else if id == RiffKind::Riff64.root_id() {
        RiffKind::Riff64
    } else {
        return Err(DataError::Container(format!("root chunk id {:?} is neither RIFF nor RF64", super::label_to_string(id))).into());
    };

    let size = read_size(r, kind)?;
    let mut label = [0u8; 4];
    r.read_exact(&mut label)?;
    let payload_start = r.stream_position()?;
    let payload_len = size.checked_sub(4).ok_or_else(|| DataError::Container("root chunk smaller than its label".into()))?;
    let children = parse_children(r, kind, payload_start, payload_len)?;

    Ok((kind, ChunkNode { id, label: Some(label), payload: (payload_start, payload_len), children }))
}

struct OpenChunk {
    header_pos: u64,
    is_list: bool,
    payload_start: u64,
}

/// Streaming chunk writer with deferred size-field patching (spec.md
/// §4.6 "Deferred size patching"). Chunks must be opened and closed in
/// strict LIFO order; [`close_all`](ChunkWriter::close_all) closes
/// whatever remains open, bottom-up.
pub struct ChunkWriter<'w, W> {
    w: &'w mut W,
    kind: RiffKind,
    stack: Vec<OpenChunk>,
}

impl<'w, W: Write + Seek> ChunkWriter<'w, W> {
    pub fn new(w: &'w mut W, kind: RiffKind) -> Self {
        Self { w, kind, stack: Vec::new() }
    }

    pub fn kind(&self) -> RiffKind {
        self.kind
    }

    /// Opens the root chunk (`"RIFF"`/`"RF64"`) with the given `LIST`-style
    /// label (`"CNT "` for the top-level container).
    pub fn open_root(&mut self, label: Label) -> Result<()> {
        let id = self.kind.root_id();
        self.open_raw(id, Some(label))
    }

    /// Opens a nested `"LIST"` chunk.
    pub fn open_list(&mut self, label: Label) -> Result<()> {
        self.open_raw(ids::LIST, Some(label))
    }

    /// Opens a plain data chunk with identifier `id`.
    pub fn open_chunk(&mut self, id: Label) -> Result<()> {
        self.open_raw(id, None)
    }

    fn open_raw(&mut self, id: Label, label: Option<Label>) -> Result<()> {
        self.w.write_all(&id)?;
        let header_pos = self.w.stream_position()?;
        write_size(self.w, self.kind, 0)?;
        if let Some(l) = label {
            self.w.write_all(&l)?;
        }
        let payload_start = self.w.stream_position()?;
        self.stack.push(OpenChunk { header_pos, is_list: label.is_some(), payload_start });
        Ok(())
    }

    /// Writes raw payload bytes into the currently open chunk.
    pub fn write_payload(&mut self, bytes: &[u8]) -> Result<()> {
        self.w.write_all(bytes)?;
        Ok(())
    }

    /// Closes the innermost open chunk: pads to even length, then seeks
    /// back and patches its size field.
    pub fn close_chunk(&mut self) -> Result<()> {
        let open = self
            .stack
            .pop()
            .ok_or_else(|| DataError::Container("close_chunk called with no open chunk".into()))?;

        let end = self.w.stream_position()?;
        let payload_len = end - open.payload_start;
        if payload_len % 2 == 1 {
            self.w.write_all(&[0u8])?;
        }
        let after_pad = self.w.stream_position()?;

        let size = if open.is_list { payload_len + 4 } else { payload_len };
        self.w.seek(SeekFrom::Start(open.header_pos))?;
        write_size(self.w, self.kind, size)?;
        self.w.seek(SeekFrom::Start(after_pad))?;
        Ok(())
    }

    /// Closes every chunk still open, innermost first.
    pub fn close_all(&mut self) -> Result<()> {
        while !self.stack.is_empty() {
            self.close_chunk()?;
        }
        Ok(())
    }

    /// Convenience: opens a plain data chunk, writes `payload`, closes it.
    pub fn write_data_chunk(&mut self, id: Label, payload: &[u8]) -> Result<()> {
        self.open_chunk(id)?;
        self.write_payload(payload)?;
        self.close_chunk()
    }

    pub fn position(&mut self) -> Result<u64> {
        Ok(self.w.stream_position()?)
    }
}

impl<'w, W> Drop for ChunkWriter<'w, W> {
    fn drop(&mut self) {
        if !self.stack.is_empty() {
            #[cfg(feature = "log")]
            log::error!("bug: ChunkWriter dropped with {} chunk(s) still open", self.stack.len());
        }
    }
}

/// Broken-file recovery (spec.md §4.6, §9 Open Question): scans the file
/// on 2-byte boundaries for the ASCII identifiers this format expects
/// and guesses each chunk's range as "from this identifier's offset to
/// the next identifier's offset (or EOF)". The 2-byte alignment has no
/// justification in the source beyond being what it does; we keep it for
/// faithfulness and document it here rather than silently "fixing" it to
/// 1-byte alignment.
#[cfg(feature = "broken-recovery")]
pub mod broken {
    use super::*;
    use std::collections::BTreeMap;

    const SCAN_IDS: &[&str] = &["info", "chan", "data", "ep", "eeph", "evt"];

    /// `identifier -> (offset, size-until-next-match-or-eof)`. Each
    /// identifier keeps only its first occurrence (left-to-right scan
    /// order), per spec.md §4.6.
    pub fn scan<R: Read + Seek>(r: &mut R) -> Result<BTreeMap<String, (u64, u64)>> {
        let file_len = r.seek(SeekFrom::End(0))?;
        r.seek(SeekFrom::Start(0))?;

        let mut buf = vec![0u8; file_len as usize];
        r.read_exact(&mut buf)?;

        let mut hits: Vec<(String, u64)> = Vec::new();
        let mut seen = std::collections::HashSet::new();
        let mut pos = 0usize;
        while pos + 4 <= buf.len() {
            for &needle in SCAN_IDS {
                let bytes = needle.as_bytes();
                if buf[pos..pos + bytes.len()].eq(bytes) && !seen.contains(needle) {
                    hits.push((needle.to_string(), pos as u64));
                    seen.insert(needle);
                }
            }
            pos += 2;
        }

        hits.sort_by_key(|(_, off)| *off);
        let mut result = BTreeMap::new();
        for (i, (name, off)) in hits.iter().enumerate() {
            let next = hits.get(i + 1).map(|(_, o)| *o).unwrap_or(file_len);
            result.insert(name.clone(), (*off, next.saturating_sub(*off)));
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn roundtrip_container(kind: RiffKind) -> ChunkNode {
        let mut buf = Vec::new();
        {
            let mut cur = Cursor::new(&mut buf);
            let mut w = ChunkWriter::new(&mut cur, kind);
            w.open_root(super::super::label("CNT")).unwrap();
            w.write_data_chunk(super::super::label("eeph"), b"hello").unwrap();
            w.write_data_chunk(super::super::label("info"), b"info-body").unwrap();
            w.open_list(super::super::label("raw3")).unwrap();
            w.write_data_chunk(super::super::label("ep"), &[1, 2, 3, 4]).unwrap();
            w.write_data_chunk(super::super::label("chan"), &[5, 6]).unwrap();
            w.write_data_chunk(super::super::label("data"), &[9; 17]).unwrap();
            w.close_chunk().unwrap(); // raw3
            w.close_all().unwrap();
        }

        let mut cur = Cursor::new(&buf);
        let (parsed_kind, root) = parse_root(&mut cur).unwrap();
        assert_eq!(parsed_kind, kind);
        assert_eq!(root.label, Some(super::super::label("CNT")));

        let eeph = root.find_child(super::super::label("eeph")).unwrap();
        assert_eq!(eeph.read_payload(&mut cur).unwrap(), b"hello");

        let raw3 = root.find_list(super::super::label("raw3")).unwrap();
        let data = raw3.find_child(super::super::label("data")).unwrap();
        assert_eq!(data.read_payload(&mut cur).unwrap(), vec![9u8; 17]);
        root
    }

    #[test]
    fn riff32_roundtrip() {
        roundtrip_container(RiffKind::Riff32);
    }

    #[test]
    fn riff64_roundtrip() {
        roundtrip_container(RiffKind::Riff64);
    }

    #[test]
    fn odd_length_payload_is_padded_and_excluded_from_size() {
        let mut buf = Vec::new();
        {
            let mut cur = Cursor::new(&mut buf);
            let mut w = ChunkWriter::new(&mut cur, RiffKind::Riff32);
            w.open_root(super::super::label("CNT")).unwrap();
            w.write_data_chunk(super::super::label("usr1"), &[1, 2, 3]).unwrap(); // odd length
            w.write_data_chunk(super::super::label("eeph"), b"x").unwrap();
            w.close_all().unwrap();
        }
        let mut cur = Cursor::new(&buf);
        let (_, root) = parse_root(&mut cur).unwrap();
        let usr1 = root.find_child(super::super::label("usr1")).unwrap();
        assert_eq!(usr1.payload.1, 3); // pad byte not counted
        assert_eq!(usr1.read_payload(&mut cur).unwrap(), vec![1, 2, 3]);
        // the following sibling must still parse correctly past the pad byte
        let eeph = root.find_child(super::super::label("eeph")).unwrap();
        assert_eq!(eeph.read_payload(&mut cur).unwrap(), b"x");
    }

    #[test]
    fn s4_riff32_refuses_a_chunk_too_large_for_a_32_bit_size_field() {
        // spec.md S4, scaled down: a literal 4.2 GiB container is
        // impractical to allocate in a unit test, so this exercises the
        // same boundary the scenario cares about directly on `write_size`.
        let too_big = RiffKind::RIFF32_MAX_SIZE + 1;
        let mut buf = Vec::new();
        assert!(write_size(&mut Cursor::new(&mut buf), RiffKind::Riff32, too_big).is_err());

        let mut buf64 = Vec::new();
        assert!(write_size(&mut Cursor::new(&mut buf64), RiffKind::Riff64, too_big).is_ok());
    }

    #[test]
    fn unrecognised_root_id_is_a_data_error() {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"XXXX");
        buf.extend_from_slice(&0u32.to_le_bytes());
        let mut cur = Cursor::new(&buf);
        assert!(parse_root(&mut cur).is_err());
    }

    #[cfg(feature = "broken-recovery")]
    #[test]
    fn broken_file_scan_recovers_chunk_ranges() {
        let mut buf = Vec::new();
        {
            let mut cur = Cursor::new(&mut buf);
            let mut w = ChunkWriter::new(&mut cur, RiffKind::Riff32);
            w.open_root(super::super::label("CNT")).unwrap();
            w.write_data_chunk(super::super::label("eeph"), b"abcdef").unwrap();
            w.write_data_chunk(super::super::label("info"), b"ghijkl").unwrap();
            w.close_all().unwrap();
        }
        let mut cur = Cursor::new(&buf);
        let hits = broken::scan(&mut cur).unwrap();
        assert!(hits.contains_key("eeph"));
        assert!(hits.contains_key("info"));
    }
}
