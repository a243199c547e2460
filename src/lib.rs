//! A mutable, persistent word dictionary stored as an edge-compressed
//! Patricia trie over Unicode code points.
//!
//! Words carry unigram probabilities, bigram continuations, and shortcut
//! (alternate spelling) targets. All structures live in flat
//! position-addressed buffers that mutate in place: insertion appends and
//! patches, removal soft-deletes, and a blocking compaction pass
//! ([`PatriciaDict::flush_with_gc`]) periodically rewrites everything
//! dense. A single file on disk holds the whole dictionary, checksummed
//! and replaced atomically on flush.
//!
//! ```no_run
//! use patricia_dict::{to_code_points, DictConfig, PatriciaDict, UnigramProperty};
//!
//! # fn main() -> patricia_dict::Result<()> {
//! let dict = PatriciaDict::new(DictConfig::default().with_locale("en"))?;
//! dict.add_unigram_entry(&to_code_points("hello"), &UnigramProperty::new(120))?;
//! let pos = dict.terminal_position_of_word(&to_code_points("hello"), false)?;
//! assert!(pos.is_some());
//! dict.flush("hello.dict")?;
//! # Ok(())
//! # }
//! ```

pub mod db;
pub mod error;
pub mod logging;
pub mod ngram;
pub mod storage;
pub mod trie;

pub use db::{
    BigramProperty, ChildNode, DefaultProbabilityMerger, DictConfig, GcStats, Health,
    PatriciaDict, ProbabilityMerger, ShortcutProperty, UnigramProperty, WordProperty,
    MAX_PROBABILITY, NOT_A_PROBABILITY,
};
pub use error::{DictError, Result};
pub use trie::MAX_WORD_LENGTH;

/// Converts a string to the code point representation the dictionary
/// stores.
pub fn to_code_points(word: &str) -> Vec<u32> {
    word.chars().map(|c| c as u32).collect()
}

/// Converts stored code points back to a string; unpaired values are
/// replaced with U+FFFD.
pub fn from_code_points(code_points: &[u32]) -> String {
    code_points
        .iter()
        .map(|&cp| char::from_u32(cp).unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}
