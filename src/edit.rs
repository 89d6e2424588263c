use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// The fundamental edit primitive: byte-span replacement with verification.
///
/// Every rule operation (replace, insert, delete, import extension, binding
/// insertion) compiles down to this single primitive, applied to an in-memory
/// [`SourceBuffer`]. Intelligence lives in span acquisition, not application.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "Edit does nothing until applied to a buffer"]
pub struct Edit {
    /// Starting byte offset (inclusive)
    pub byte_start: usize,
    /// Ending byte offset (exclusive)
    pub byte_end: usize,
    /// New text to insert at [byte_start, byte_end)
    pub new_text: String,
    /// Verification of what we expect to find before applying
    pub expected_before: EditVerification,
}

/// Verification strategy for edit safety.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditVerification {
    /// Exact text match required
    ExactMatch(String),
    /// xxh3 hash of expected text (faster for large spans)
    Hash(u64),
}

impl EditVerification {
    /// Check if the provided text matches the verification criteria.
    pub fn matches(&self, text: &str) -> bool {
        match self {
            EditVerification::ExactMatch(expected) => text == expected,
            EditVerification::Hash(expected_hash) => xxh3_64(text.as_bytes()) == *expected_hash,
        }
    }

    /// Create verification from text, using hash for text over 1KB.
    pub fn from_text(text: &str) -> Self {
        if text.len() > 1024 {
            EditVerification::Hash(xxh3_64(text.as_bytes()))
        } else {
            EditVerification::ExactMatch(text.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum EditError {
    #[error("Before-text verification failed in {file} at byte {byte_start}")]
    BeforeTextMismatch {
        file: PathBuf,
        byte_start: usize,
        byte_end: usize,
        found: String,
    },

    #[error("Invalid byte range: [{byte_start}, {byte_end}) in buffer of length {len}")]
    InvalidByteRange {
        byte_start: usize,
        byte_end: usize,
        len: usize,
    },

    #[error("Edit boundary at byte {0} is not a UTF-8 character boundary")]
    NotCharBoundary(usize),

    #[error("File I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result of applying an edit.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "EditResult should be checked for success/already-applied"]
pub enum EditResult {
    /// Edit was applied
    Applied { bytes_changed: usize },
    /// Current text already equals new_text
    AlreadyApplied,
}

impl Edit {
    /// Create a new edit with automatic verification generation.
    pub fn new(
        byte_start: usize,
        byte_end: usize,
        new_text: impl Into<String>,
        expected_before: impl AsRef<str>,
    ) -> Self {
        Self {
            byte_start,
            byte_end,
            new_text: new_text.into(),
            expected_before: EditVerification::from_text(expected_before.as_ref()),
        }
    }

    /// Pure insertion at `offset`.
    pub fn insert(offset: usize, text: impl Into<String>) -> Self {
        Self::new(offset, offset, text, "")
    }

    /// True if applying the edit cannot change anything.
    pub fn is_noop(&self, content: &str) -> bool {
        content
            .get(self.byte_start..self.byte_end)
            .is_some_and(|current| current == self.new_text)
    }

    /// Validate the edit against `content`, returning the current span text.
    fn validate<'a>(&self, file: &Path, content: &'a str) -> Result<&'a str, EditError> {
        if self.byte_start > self.byte_end || self.byte_end > content.len() {
            return Err(EditError::InvalidByteRange {
                byte_start: self.byte_start,
                byte_end: self.byte_end,
                len: content.len(),
            });
        }
        for offset in [self.byte_start, self.byte_end] {
            if !content.is_char_boundary(offset) {
                return Err(EditError::NotCharBoundary(offset));
            }
        }

        let current = &content[self.byte_start..self.byte_end];

        // Already applied (idempotency)
        if current == self.new_text {
            return Ok(current);
        }

        if !self.expected_before.matches(current) {
            return Err(EditError::BeforeTextMismatch {
                file: file.to_path_buf(),
                byte_start: self.byte_start,
                byte_end: self.byte_end,
                found: current.to_string(),
            });
        }

        Ok(current)
    }
}

/// The full text of one file, loaded once, mutated in memory and persisted
/// only if it differs from what was loaded.
#[derive(Debug, Clone)]
pub struct SourceBuffer {
    path: PathBuf,
    original: String,
    current: String,
}

impl SourceBuffer {
    /// Read `path` as UTF-8.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, EditError> {
        let path = path.into();
        let original = fs::read_to_string(&path).map_err(|source| EditError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(Self::from_parts(path, original))
    }

    pub fn from_parts(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        let original = content.into();
        Self {
            path: path.into(),
            current: original.clone(),
            original,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn text(&self) -> &str {
        &self.current
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn is_modified(&self) -> bool {
        self.current != self.original
    }

    /// Snapshot of the current text, to be handed back to [`SourceBuffer::restore`].
    pub fn checkpoint(&self) -> String {
        self.current.clone()
    }

    pub fn restore(&mut self, checkpoint: String) {
        self.current = checkpoint;
    }

    /// Apply a single verified edit.
    pub fn apply(&mut self, edit: &Edit) -> Result<EditResult, EditError> {
        let current = edit.validate(&self.path, &self.current)?;
        if current == edit.new_text {
            return Ok(EditResult::AlreadyApplied);
        }

        self.current
            .replace_range(edit.byte_start..edit.byte_end, &edit.new_text);

        Ok(EditResult::Applied {
            bytes_changed: edit.new_text.len(),
        })
    }

    /// Apply several edits; they are sorted by byte_start descending and applied
    /// bottom-to-top to avoid offset invalidation. Overlapping spans are rejected
    /// before anything is changed.
    pub fn apply_batch(&mut self, mut edits: Vec<Edit>) -> Result<Vec<EditResult>, EditError> {
        edits.sort_by(|a, b| b.byte_start.cmp(&a.byte_start));

        for edit in &edits {
            edit.validate(&self.path, &self.current)?;
        }
        for window in edits.windows(2) {
            let (later, earlier) = (&window[0], &window[1]);
            if earlier.byte_end > later.byte_start {
                return Err(EditError::InvalidByteRange {
                    byte_start: later.byte_start,
                    byte_end: earlier.byte_end,
                    len: self.current.len(),
                });
            }
        }

        edits.iter().map(|edit| self.apply(edit)).collect()
    }

    /// Write the buffer back if it changed. Returns whether a write happened.
    pub fn persist(&self) -> Result<bool, EditError> {
        if !self.is_modified() {
            return Ok(false);
        }
        atomic_write(&self.path, self.current.as_bytes())?;
        Ok(true)
    }
}

/// Atomic file write: tempfile + fsync + rename.
///
/// Either the full write succeeds or nothing changes.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<(), EditError> {
    let io_err = |source| EditError::Io {
        path: path.to_path_buf(),
        source,
    };

    // Same directory keeps the rename on one filesystem
    let parent = path.parent().ok_or_else(|| {
        io_err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "Path has no parent directory",
        ))
    })?;

    let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(io_err)?;
    temp.write_all(content).map_err(io_err)?;
    temp.as_file().sync_all().map_err(io_err)?;

    // Keep the permissions of the file being replaced
    if let Ok(metadata) = fs::metadata(path) {
        fs::set_permissions(temp.path(), metadata.permissions()).map_err(io_err)?;
    }

    temp.persist(path).map_err(|e| io_err(e.error))?;

    Ok(())
}
