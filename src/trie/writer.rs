//! In-place PtNode field updates, node/array creation, and the node-split
//! primitive that drives patricia-trie insertion.
//!
//! All structural growth is append-only: new nodes and array chunks go to
//! the buffer tail and are wired in by patching fixed-width fields of
//! existing nodes. The only field whose meaning shrinks is `cp_count`
//! during a split, which is why node capacity is fixed at creation.

use crate::error::Result;
use crate::storage::buffer::ExtendableBuffer;
use crate::trie::node::{
    NewNode, PtNode, FLAG_IS_BLACKLISTED, FLAG_IS_DELETED, FLAG_IS_NOT_A_WORD, FLAG_IS_TERMINAL,
    INVALID_TERMINAL_ID, NONE_POS, NO_PROBABILITY,
};
use crate::trie::reader::{NodeArrayReader, CHUNK_COUNT_SIZE};

/// Result of [`NodeWriter::split_node`].
pub struct SplitOutcome {
    /// The child array created under the shortened prefix node.
    pub new_children_array_pos: u32,
    /// Where the original node's suffix (and its terminal identity, if
    /// any) now lives.
    pub suffix_node_pos: u32,
    /// Terminal ID whose position changed, [`INVALID_TERMINAL_ID`] if the
    /// split node was not terminal. The caller must remap it in the
    /// terminal position lookup table.
    pub moved_terminal_id: u32,
}

pub struct NodeWriter<'a> {
    buffer: &'a mut ExtendableBuffer,
}

impl<'a> NodeWriter<'a> {
    pub fn new(buffer: &'a mut ExtendableBuffer) -> Self {
        Self { buffer }
    }

    /// Appends a fresh single-chunk array holding `nodes` and returns the
    /// array position. Node positions follow the chunk count field in
    /// order.
    pub(crate) fn create_array(&mut self, nodes: &[NewNode<'_>]) -> Result<u32> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(nodes.len() as u16).to_le_bytes());
        for node in nodes {
            bytes.extend_from_slice(&node.encode());
        }
        bytes.extend_from_slice(&NONE_POS.to_le_bytes());
        self.buffer.append(&bytes)
    }

    /// Appends `node` as a new sibling of the array at `array_pos` by
    /// chaining a single-node chunk onto the array's forward links.
    /// Returns the new node's position.
    pub(crate) fn append_sibling(&mut self, array_pos: u32, node: &NewNode<'_>) -> Result<u32> {
        let link_pos = NodeArrayReader::new(self.buffer).last_forward_link_pos(array_pos)?;
        let chunk_pos = self.create_array(std::slice::from_ref(node))?;
        self.buffer.write_u32(link_pos, chunk_pos)?;
        Ok(chunk_pos + CHUNK_COUNT_SIZE)
    }

    /// Marks the node terminal in place, overwriting its terminal ID,
    /// probability, and word flags. Clears any soft-delete marker.
    pub fn mark_terminal(
        &mut self,
        node: &PtNode,
        terminal_id: u32,
        probability: i16,
        word_flags: u8,
    ) -> Result<()> {
        debug_assert_eq!(word_flags & !(FLAG_IS_BLACKLISTED | FLAG_IS_NOT_A_WORD), 0);
        let flags = (node.flags
            & !(FLAG_IS_TERMINAL | FLAG_IS_BLACKLISTED | FLAG_IS_NOT_A_WORD | FLAG_IS_DELETED))
            | FLAG_IS_TERMINAL
            | word_flags;
        self.buffer.write_u8(node.flags_field_pos(), flags)?;
        self.buffer.write_u32(node.terminal_id_field_pos(), terminal_id)?;
        self.buffer.write_i16(node.probability_field_pos(), probability)
    }

    /// Soft delete: the node stays in place (its segment may still route
    /// descent into live children) but stops counting as a word.
    pub fn mark_deleted(&mut self, node: &PtNode) -> Result<()> {
        self.buffer
            .write_u8(node.flags_field_pos(), node.flags | FLAG_IS_DELETED)?;
        self.buffer
            .write_i16(node.probability_field_pos(), NO_PROBABILITY)
    }

    pub fn set_children_pos(&mut self, node: &PtNode, children_pos: u32) -> Result<()> {
        self.buffer.write_u32(node.children_field_pos(), children_pos)
    }

    pub fn set_bigram_pos(&mut self, node: &PtNode, bigram_pos: u32) -> Result<()> {
        self.buffer.write_u32(node.bigram_field_pos(), bigram_pos)
    }

    pub fn set_shortcut_pos(&mut self, node: &PtNode, shortcut_pos: u32) -> Result<()> {
        self.buffer.write_u32(node.shortcut_field_pos(), shortcut_pos)
    }

    /// Splits `node` after `split_index` code points.
    ///
    /// The node is rewritten in place to hold only the common prefix and
    /// becomes a plain non-terminal parent; its remaining suffix moves
    /// into a freshly created child array together with the node's old
    /// terminal identity, children, and list positions. Positions cached
    /// by the caller for the split node are stale after this returns.
    pub fn split_node(&mut self, node: &PtNode, split_index: usize) -> Result<SplitOutcome> {
        debug_assert!(split_index >= 1 && split_index < node.code_points.len());
        let suffix = NewNode {
            code_points: &node.code_points[split_index..],
            flags: node.flags,
            terminal_id: node.terminal_id,
            probability: node.probability,
            children_pos: node.children_pos,
            bigram_pos: node.bigram_pos,
            shortcut_pos: node.shortcut_pos,
        };
        let new_children_array_pos = self.create_array(&[suffix])?;
        let suffix_node_pos = new_children_array_pos + CHUNK_COUNT_SIZE;

        // Shrink the original node to the prefix and strip its terminal
        // identity; capacity is untouched so sibling layout is preserved.
        self.buffer
            .write_u8(node.cp_count_field_pos(), split_index as u8)?;
        self.buffer.write_u8(node.flags_field_pos(), 0)?;
        self.buffer
            .write_u32(node.terminal_id_field_pos(), INVALID_TERMINAL_ID)?;
        self.buffer
            .write_i16(node.probability_field_pos(), NO_PROBABILITY)?;
        self.buffer
            .write_u32(node.children_field_pos(), new_children_array_pos)?;
        self.buffer.write_u32(node.bigram_field_pos(), NONE_POS)?;
        self.buffer.write_u32(node.shortcut_field_pos(), NONE_POS)?;

        Ok(SplitOutcome {
            new_children_array_pos,
            suffix_node_pos,
            moved_terminal_id: if node.is_terminal() {
                node.terminal_id
            } else {
                INVALID_TERMINAL_ID
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trie::node::FLAG_IS_TERMINAL;
    use crate::trie::reader::NodeReader;

    fn buffer_with_tag() -> ExtendableBuffer {
        let mut buffer = ExtendableBuffer::new(1 << 16);
        buffer.append(b"TRI\0").expect("tag");
        buffer
    }

    #[test]
    fn create_array_and_read_back() -> Result<()> {
        let mut buffer = buffer_with_tag();
        let cat: Vec<u32> = "cat".chars().map(|c| c as u32).collect();
        let array_pos =
            NodeWriter::new(&mut buffer).create_array(&[NewNode::terminal(&cat, 0, 120, 0)])?;
        let node = NodeReader::new(&buffer).read_node(array_pos + CHUNK_COUNT_SIZE)?;
        assert_eq!(node.code_points, cat);
        assert!(node.is_live_terminal());
        assert_eq!(node.terminal_id, 0);
        assert_eq!(node.probability, 120);
        assert!(!node.has_children());
        Ok(())
    }

    #[test]
    fn split_keeps_prefix_in_place_and_moves_suffix() -> Result<()> {
        let mut buffer = buffer_with_tag();
        let cat: Vec<u32> = "cat".chars().map(|c| c as u32).collect();
        let array_pos =
            NodeWriter::new(&mut buffer).create_array(&[NewNode::terminal(&cat, 7, 120, 0)])?;
        let node_pos = array_pos + CHUNK_COUNT_SIZE;
        let node = NodeReader::new(&buffer).read_node(node_pos)?;

        let outcome = NodeWriter::new(&mut buffer).split_node(&node, 2)?;
        assert_eq!(outcome.moved_terminal_id, 7);

        let prefix = NodeReader::new(&buffer).read_node(node_pos)?;
        assert_eq!(prefix.code_points, &cat[..2]);
        assert!(!prefix.is_terminal());
        assert_eq!(prefix.children_pos, outcome.new_children_array_pos);

        let suffix = NodeReader::new(&buffer).read_node(outcome.suffix_node_pos)?;
        assert_eq!(suffix.code_points, &cat[2..]);
        assert_eq!(suffix.flags & FLAG_IS_TERMINAL, FLAG_IS_TERMINAL);
        assert_eq!(suffix.terminal_id, 7);
        assert_eq!(suffix.probability, 120);
        Ok(())
    }

    #[test]
    fn append_sibling_chains_a_new_chunk() -> Result<()> {
        let mut buffer = buffer_with_tag();
        let cat: Vec<u32> = "cat".chars().map(|c| c as u32).collect();
        let dog: Vec<u32> = "dog".chars().map(|c| c as u32).collect();
        let array_pos =
            NodeWriter::new(&mut buffer).create_array(&[NewNode::terminal(&cat, 0, 120, 0)])?;
        NodeWriter::new(&mut buffer)
            .append_sibling(array_pos, &NewNode::terminal(&dog, 1, 90, 0))?;

        let siblings: Vec<PtNode> = NodeArrayReader::new(&buffer)
            .iter_array(array_pos)?
            .collect::<Result<_>>()?;
        assert_eq!(siblings.len(), 2);
        assert_eq!(siblings[0].code_points, cat);
        assert_eq!(siblings[1].code_points, dog);
        Ok(())
    }
}
