//! Insert/descend/split algorithm for online mutation.
//!
//! Insertion walks from the root array, scanning siblings for a first
//! code point match. No match appends a new terminal node; a full segment
//! match descends (creating a child array if needed); a partial match
//! splits the node at the divergence point. Case is never folded during
//! insertion; the lowercase fallback exists only on the lookup path.

use tracing::trace;

use crate::error::{DictError, Result};
use crate::storage::buffer::ExtendableBuffer;
use crate::storage::header::Header;
use crate::storage::terminal_table::TerminalPositionLookupTable;
use crate::trie::node::{NewNode, PtNode, INVALID_TERMINAL_ID};
use crate::trie::reader::{find_terminal_position, NodeArrayReader, NodeReader};
use crate::trie::writer::NodeWriter;
use crate::trie::{MAX_WORD_LENGTH, ROOT_ARRAY_POS};

/// Outcome of a word insertion.
pub struct AddedWord {
    pub terminal_pos: u32,
    pub terminal_id: u32,
    /// False when an existing live terminal was overwritten in place.
    pub is_new_word: bool,
}

pub struct DynamicUpdater<'a> {
    buffer: &'a mut ExtendableBuffer,
    terminals: &'a mut TerminalPositionLookupTable,
    header: &'a mut Header,
}

impl<'a> DynamicUpdater<'a> {
    pub fn new(
        buffer: &'a mut ExtendableBuffer,
        terminals: &'a mut TerminalPositionLookupTable,
        header: &'a mut Header,
    ) -> Self {
        Self {
            buffer,
            terminals,
            header,
        }
    }

    /// Inserts `word` as a unigram with the given probability and word
    /// flags, or overwrites the existing terminal in place. Updates the
    /// header unigram counter only for genuinely new words.
    pub fn add_word(&mut self, word: &[u32], probability: i16, word_flags: u8) -> Result<AddedWord> {
        validate_word(word)?;
        let mut array_pos = ROOT_ARRAY_POS;
        let mut consumed = 0usize;
        loop {
            let mut matched: Option<PtNode> = None;
            for node in NodeArrayReader::new(self.buffer).iter_array(array_pos)? {
                let node = node?;
                if node.code_points[0] == word[consumed] {
                    matched = Some(node);
                    break;
                }
            }
            let node = match matched {
                None => {
                    // No sibling shares the next code point: the whole
                    // remaining suffix becomes one new node.
                    let terminal_id = self.allocate_terminal_id()?;
                    let pos = NodeWriter::new(self.buffer).append_sibling(
                        array_pos,
                        &NewNode::terminal(&word[consumed..], terminal_id, probability, word_flags),
                    )?;
                    return self.finish_new_word(pos, terminal_id);
                }
                Some(node) => node,
            };

            let common = common_prefix_len(&node.code_points, &word[consumed..]);
            if common == node.code_points.len() {
                if consumed + common == word.len() {
                    // Exact node for this word.
                    return self.make_node_terminal(node, probability, word_flags);
                }
                // Descend; materialize the children array if missing.
                consumed += common;
                if !node.has_children() {
                    let terminal_id = self.allocate_terminal_id()?;
                    let child_array = NodeWriter::new(self.buffer).create_array(&[
                        NewNode::terminal(&word[consumed..], terminal_id, probability, word_flags),
                    ])?;
                    NodeWriter::new(self.buffer).set_children_pos(&node, child_array)?;
                    let pos = child_array + crate::trie::reader::CHUNK_COUNT_SIZE;
                    return self.finish_new_word(pos, terminal_id);
                }
                array_pos = node.children_pos;
                continue;
            }

            // Divergence inside the node's segment: split, then place the
            // new word either on the prefix node or as a sibling of the
            // moved suffix.
            trace!(pos = node.pos, split_index = common, "splitting PtNode");
            let outcome = NodeWriter::new(self.buffer).split_node(&node, common)?;
            if outcome.moved_terminal_id != INVALID_TERMINAL_ID {
                self.terminals
                    .set(outcome.moved_terminal_id, outcome.suffix_node_pos);
            }
            if consumed + common == word.len() {
                let prefix = NodeReader::new(self.buffer).read_node(node.pos)?;
                return self.make_node_terminal(prefix, probability, word_flags);
            }
            let terminal_id = self.allocate_terminal_id()?;
            let pos = NodeWriter::new(self.buffer).append_sibling(
                outcome.new_children_array_pos,
                &NewNode::terminal(
                    &word[consumed + common..],
                    terminal_id,
                    probability,
                    word_flags,
                ),
            )?;
            return self.finish_new_word(pos, terminal_id);
        }
    }

    /// Soft-deletes `word`'s terminal. Returns the deleted node (its
    /// bigram list still needs pruning by the caller), or `None` if the
    /// word is not stored.
    pub fn remove_word(&mut self, word: &[u32]) -> Result<Option<PtNode>> {
        let pos = match find_terminal_position(self.buffer, word, false)? {
            Some(pos) => pos,
            None => return Ok(None),
        };
        let node = NodeReader::new(self.buffer).read_node(pos)?;
        NodeWriter::new(self.buffer).mark_deleted(&node)?;
        self.header.unigram_count = self.header.unigram_count.saturating_sub(1);
        Ok(Some(node))
    }

    fn make_node_terminal(
        &mut self,
        node: PtNode,
        probability: i16,
        word_flags: u8,
    ) -> Result<AddedWord> {
        if node.is_live_terminal() {
            // Idempotent overwrite: same identity, new probability/flags.
            NodeWriter::new(self.buffer).mark_terminal(
                &node,
                node.terminal_id,
                probability,
                word_flags,
            )?;
            return Ok(AddedWord {
                terminal_pos: node.pos,
                terminal_id: node.terminal_id,
                is_new_word: false,
            });
        }
        // Either a structural prefix node becoming a word, or a
        // soft-deleted terminal being revived (which keeps its ID).
        let terminal_id = if node.terminal_id != INVALID_TERMINAL_ID {
            node.terminal_id
        } else {
            self.allocate_terminal_id()?
        };
        NodeWriter::new(self.buffer).mark_terminal(&node, terminal_id, probability, word_flags)?;
        self.finish_new_word(node.pos, terminal_id)
    }

    fn finish_new_word(&mut self, terminal_pos: u32, terminal_id: u32) -> Result<AddedWord> {
        self.terminals.set(terminal_id, terminal_pos);
        self.header.unigram_count += 1;
        Ok(AddedWord {
            terminal_pos,
            terminal_id,
            is_new_word: true,
        })
    }

    fn allocate_terminal_id(&mut self) -> Result<u32> {
        if !self.header.has_room_for_unigram() {
            return Err(DictError::CapacityExceeded(format!(
                "unigram count is at the configured maximum ({})",
                self.header.max_unigram_count
            )));
        }
        Ok(self.header.allocate_terminal_id())
    }
}

fn validate_word(word: &[u32]) -> Result<()> {
    if word.is_empty() {
        return Err(DictError::InvalidArgument("word is empty".into()));
    }
    if word.len() > MAX_WORD_LENGTH {
        return Err(DictError::InvalidArgument(format!(
            "word length {} exceeds maximum {MAX_WORD_LENGTH}",
            word.len()
        )));
    }
    Ok(())
}

fn common_prefix_len(a: &[u32], b: &[u32]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DictConfig;
    use crate::trie::new_trie_buffer;

    struct Fixture {
        buffer: ExtendableBuffer,
        terminals: TerminalPositionLookupTable,
        header: Header,
    }

    fn fixture() -> Fixture {
        let config = DictConfig::default();
        Fixture {
            buffer: new_trie_buffer(&config).expect("trie buffer"),
            terminals: TerminalPositionLookupTable::new(),
            header: Header::new(&config),
        }
    }

    fn cps(word: &str) -> Vec<u32> {
        word.chars().map(|c| c as u32).collect()
    }

    fn add(fx: &mut Fixture, word: &str, probability: i16) -> AddedWord {
        DynamicUpdater::new(&mut fx.buffer, &mut fx.terminals, &mut fx.header)
            .add_word(&cps(word), probability, 0)
            .expect("add word")
    }

    #[test]
    fn divergent_words_share_a_prefix_node() {
        let mut fx = fixture();
        add(&mut fx, "cat", 120);
        add(&mut fx, "car", 100);

        // Root must hold exactly one node spelling "ca".
        let roots: Vec<PtNode> = NodeArrayReader::new(&fx.buffer)
            .iter_array(ROOT_ARRAY_POS)
            .expect("root array")
            .collect::<Result<_>>()
            .expect("root nodes");
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].code_points, cps("ca"));
        assert!(!roots[0].is_terminal());

        let children: Vec<PtNode> = NodeArrayReader::new(&fx.buffer)
            .iter_array(roots[0].children_pos)
            .expect("children array")
            .collect::<Result<_>>()
            .expect("children");
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].code_points, cps("t"));
        assert_eq!(children[0].probability, 120);
        assert_eq!(children[1].code_points, cps("r"));
        assert_eq!(children[1].probability, 100);

        assert_eq!(
            find_terminal_position(&fx.buffer, &cps("ca"), false).expect("lookup"),
            None
        );
        assert!(find_terminal_position(&fx.buffer, &cps("cat"), false)
            .expect("lookup")
            .is_some());
        assert_eq!(fx.header.unigram_count, 2);
    }

    #[test]
    fn prefix_word_marks_the_split_node_terminal() {
        let mut fx = fixture();
        add(&mut fx, "cat", 120);
        let added = add(&mut fx, "ca", 60);
        assert!(added.is_new_word);

        let pos = find_terminal_position(&fx.buffer, &cps("ca"), false)
            .expect("lookup")
            .expect("ca is a word now");
        let node = NodeReader::new(&fx.buffer).read_node(pos).expect("node");
        assert_eq!(node.probability, 60);
        assert!(node.has_children());
        // "cat" survived the split with its original probability.
        let cat_pos = find_terminal_position(&fx.buffer, &cps("cat"), false)
            .expect("lookup")
            .expect("cat still stored");
        let cat = NodeReader::new(&fx.buffer).read_node(cat_pos).expect("node");
        assert_eq!(cat.probability, 120);
        assert_eq!(fx.terminals.get(cat.terminal_id), Some(cat_pos));
    }

    #[test]
    fn reinsert_is_idempotent() {
        let mut fx = fixture();
        let first = add(&mut fx, "run", 80);
        let len_after_first = fx.buffer.len();
        let second = add(&mut fx, "run", 80);
        assert!(first.is_new_word);
        assert!(!second.is_new_word);
        assert_eq!(first.terminal_id, second.terminal_id);
        assert_eq!(fx.buffer.len(), len_after_first);
        assert_eq!(fx.header.unigram_count, 1);
    }

    #[test]
    fn removed_word_is_not_found_but_structure_remains() {
        let mut fx = fixture();
        add(&mut fx, "cat", 120);
        add(&mut fx, "car", 100);
        let removed =
            DynamicUpdater::new(&mut fx.buffer, &mut fx.terminals, &mut fx.header)
                .remove_word(&cps("cat"))
                .expect("remove")
                .expect("cat was stored");
        assert!(removed.is_terminal());
        assert_eq!(fx.header.unigram_count, 1);
        assert_eq!(
            find_terminal_position(&fx.buffer, &cps("cat"), false).expect("lookup"),
            None
        );
        assert!(find_terminal_position(&fx.buffer, &cps("car"), false)
            .expect("lookup")
            .is_some());
        // Re-adding revives the word under its old terminal ID.
        let revived = add(&mut fx, "cat", 90);
        assert!(revived.is_new_word);
        assert_eq!(revived.terminal_id, removed.terminal_id);
        assert_eq!(fx.header.unigram_count, 2);
    }

    #[test]
    fn descends_into_longer_words() {
        let mut fx = fixture();
        add(&mut fx, "in", 50);
        add(&mut fx, "inn", 40);
        add(&mut fx, "inside", 30);
        for (word, prob) in [("in", 50), ("inn", 40), ("inside", 30)] {
            let pos = find_terminal_position(&fx.buffer, &cps(word), false)
                .expect("lookup")
                .unwrap_or_else(|| panic!("{word} missing"));
            let node = NodeReader::new(&fx.buffer).read_node(pos).expect("node");
            assert_eq!(node.probability, prob, "probability of {word}");
        }
        assert_eq!(fx.header.unigram_count, 3);
    }
}
