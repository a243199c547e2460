//! Error handling for the dictionary engine.
//!
//! All public APIs return `Result<T, DictError>`. Absent words and entries
//! are *not* errors: lookups report them through `Option` sentinels, so the
//! error enum only covers I/O, capacity refusal, invalid usage, and
//! structural corruption.

use std::io;
use thiserror::Error;

/// Result type for dictionary operations.
pub type Result<T> = std::result::Result<T, DictError>;

/// Errors that can occur during dictionary operations.
#[derive(Debug, Error)]
pub enum DictError {
    /// I/O error from the underlying filesystem.
    ///
    /// Raised only by `flush`/`flush_with_gc` and by opening a dictionary
    /// file; a failed flush leaves the in-memory structure usable.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Structural corruption detected.
    ///
    /// Malformed bytes, an out-of-range position, or an invariant
    /// violation (such as a counter mismatch during compaction). Once a
    /// dictionary instance observes corruption it degrades permanently:
    /// mutating operations refuse, reads stay best-effort.
    #[error("corruption detected: {0}")]
    Corruption(String),

    /// Mutation refused because a buffer is within the overflow margin.
    ///
    /// The caller should run compaction (`flush_with_gc`) or stop
    /// writing; nothing has been modified.
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// Invalid argument or operation.
    ///
    /// Covers out-of-range probabilities, words longer than
    /// [`MAX_WORD_LENGTH`](crate::trie::MAX_WORD_LENGTH), empty words,
    /// and similar misuse.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl DictError {
    /// True when this error indicates structural corruption.
    pub fn is_corruption(&self) -> bool {
        matches!(self, DictError::Corruption(_))
    }
}
