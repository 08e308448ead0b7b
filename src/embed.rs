//! Embedded user files (spec.md §4.6/§4.7, "embed").
//!
//! Grounded on `ctk/api_data.h`'s `UserFile` (`Label`, `FileName`) and
//! `cnt_writer_reflib_riff::embed`/`embeddedFiles`: a user file is
//! attached to the container as a top-level chunk under a caller-chosen
//! 4-byte label, as long as that label isn't one of the names the
//! container reserves for its own chunks.

use std::path::{Path, PathBuf};

use crate::container::{self, Label};
use crate::error::{LimitError, Result};

/// One user file attached to a container: its chunk label and the
/// on-disk path it was (or will be) read from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserFile {
    pub label: Label,
    pub file_name: PathBuf,
}

impl UserFile {
    pub fn new(label: Label, file_name: impl Into<PathBuf>) -> Self {
        Self { label, file_name: file_name.into() }
    }

    pub fn label_str(&self) -> String {
        container::label_to_string(self.label)
    }
}

/// Directory of embedded files a writer has attached, or a reader has
/// enumerated. Enforces the "no reserved label, no duplicate label"
/// invariant the writer side needs (spec.md §4.6 "Reserved labels").
#[derive(Default, Debug, Clone)]
pub struct EmbedDirectory {
    files: Vec<UserFile>,
}

impl EmbedDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `path` under `label`. Rejects reserved labels and labels
    /// already in use, matching the two dedicated `LimitError` variants.
    pub fn attach(&mut self, label: Label, path: impl Into<PathBuf>) -> Result<()> {
        if container::is_reserved_label(label) {
            return Err(LimitError::ReservedEmbedLabel(container::label_to_string(label)).into());
        }
        if self.files.iter().any(|f| f.label == label) {
            return Err(LimitError::DuplicateEmbedLabel(container::label_to_string(label)).into());
        }
        self.files.push(UserFile::new(label, path));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &UserFile> {
        self.files.iter()
    }

    pub fn find(&self, label: Label) -> Option<&UserFile> {
        self.files.iter().find(|f| f.label == label)
    }

    /// Paths suitable for [`crate::container::flat::assemble`]'s `embeds`
    /// argument.
    pub fn as_embed_tokens(&self) -> Vec<(Label, PathBuf)> {
        self.files.iter().map(|f| (f.label, f.file_name.clone())).collect()
    }
}

/// Reads an embedded file's raw bytes straight from disk (writer side,
/// before assembly) or from an already-parsed chunk's payload.
pub fn read_from_disk(file: &UserFile) -> Result<Vec<u8>> {
    Ok(std::fs::read(&file.file_name)?)
}

/// Extracts an embedded file's bytes to `dest` (reader side, after the
/// chunk tree has been parsed and the payload already read out of the
/// container).
pub fn extract_to(dest: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::write(dest, bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::label;

    #[test]
    fn reserved_label_is_rejected() {
        let mut dir = EmbedDirectory::new();
        assert!(dir.attach(label("eeph"), "whatever.bin").is_err());
    }

    #[test]
    fn duplicate_label_is_rejected() {
        let mut dir = EmbedDirectory::new();
        dir.attach(label("usr1"), "a.bin").unwrap();
        assert!(dir.attach(label("usr1"), "b.bin").is_err());
    }

    #[test]
    fn distinct_labels_are_accepted_and_enumerable() {
        let mut dir = EmbedDirectory::new();
        dir.attach(label("usr1"), "a.bin").unwrap();
        dir.attach(label("usr2"), "b.bin").unwrap();
        assert_eq!(dir.len(), 2);
        assert!(dir.find(label("usr1")).is_some());
        assert_eq!(dir.as_embed_tokens().len(), 2);
    }
}
