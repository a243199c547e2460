//! Compressed-trie node codec and mutation primitives.

pub mod node;
pub mod reader;
pub mod updating;
pub mod writer;

pub use node::{PtNode, INVALID_TERMINAL_ID, NONE_POS, NO_PROBABILITY};
pub use reader::{find_terminal_position, NodeArrayReader, NodeReader, SiblingIter};
pub use updating::{AddedWord, DynamicUpdater};
pub use writer::{NodeWriter, SplitOutcome};

use crate::db::DictConfig;
use crate::error::Result;
use crate::storage::buffer::ExtendableBuffer;

/// Maximum stored word length in code points.
pub const MAX_WORD_LENGTH: usize = 48;

/// Region tag at the start of the trie buffer; keeps position 0 free for
/// the "none" sentinel.
pub(crate) const TRIE_REGION_TAG: &[u8; 4] = b"TRI\0";

/// Position of the root PtNodeArray, directly after the region tag.
pub const ROOT_ARRAY_POS: u32 = 4;

/// Creates an empty trie buffer: region tag followed by an empty root
/// array chunk.
pub(crate) fn new_trie_buffer(config: &DictConfig) -> Result<ExtendableBuffer> {
    let mut buffer = ExtendableBuffer::new(config.max_trie_size as usize);
    buffer.append(TRIE_REGION_TAG)?;
    let mut root = Vec::with_capacity(6);
    root.extend_from_slice(&0u16.to_le_bytes());
    root.extend_from_slice(&node::NONE_POS.to_le_bytes());
    buffer.append(&root)?;
    Ok(buffer)
}
