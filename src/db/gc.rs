//! Compaction: a full rewrite of the trie, terminal table, and
//! association lists into fresh, dense buffers.
//!
//! The pass traverses live nodes from the root in storage order, drops
//! soft-deleted words and dead subtrees, restores path compression by
//! re-merging single-child chains, renumbers terminal IDs densely, and
//! rewrites every bigram entry to reference surviving IDs only. Header
//! counters are recomputed from the surviving set and checked against the
//! incrementally maintained ones; a mismatch is corruption.

use std::collections::HashMap;
use std::time::Instant;

use tracing::{info, warn};

use crate::db::config::DictConfig;
use crate::error::{DictError, Result};
use crate::ngram::bigram::{add_bigram_entry, for_each_bigram_entry, new_bigram_buffer, BigramEntry};
use crate::ngram::shortcut::{add_shortcut_entry, for_each_shortcut_entry, new_shortcut_buffer, ShortcutEntry};
use crate::storage::buffer::ExtendableBuffer;
use crate::storage::header::Header;
use crate::storage::terminal_table::TerminalPositionLookupTable;
use crate::trie::node::{
    NewNode, PtNode, FLAG_IS_BLACKLISTED, FLAG_IS_NOT_A_WORD, INVALID_TERMINAL_ID, NONE_POS,
    NO_PROBABILITY,
};
use crate::trie::reader::{NodeArrayReader, NodeReader};
use crate::trie::{MAX_WORD_LENGTH, ROOT_ARRAY_POS, TRIE_REGION_TAG};

/// Statistics from one compaction run.
#[derive(Debug, Clone, Default)]
pub struct GcStats {
    /// Live words written to the compacted trie.
    pub live_unigrams: u32,
    /// Bigram entries that survived (live flag and live target).
    pub live_bigrams: u32,
    /// Bigram entries dropped because their target word was removed.
    pub dropped_bigrams: u32,
    /// Shortcut entries that survived.
    pub live_shortcuts: u32,
    /// Total bytes reclaimed across the three buffers.
    pub reclaimed_bytes: usize,
    pub duration_ms: u64,
}

pub(crate) struct CompactionOutcome {
    pub trie: ExtendableBuffer,
    pub bigrams: ExtendableBuffer,
    pub shortcuts: ExtendableBuffer,
    pub terminals: TerminalPositionLookupTable,
    pub header: Header,
    pub stats: GcStats,
}

/// Rewrites all buffers into fresh dense ones. The inputs are not
/// modified; on error the caller keeps its current state.
pub(crate) fn run_compaction(
    old_trie: &ExtendableBuffer,
    old_bigrams: &ExtendableBuffer,
    old_shortcuts: &ExtendableBuffer,
    header: &Header,
    config: &DictConfig,
) -> Result<CompactionOutcome> {
    let started = Instant::now();
    let mut compactor = Compactor {
        old_trie,
        new_trie: {
            let mut buffer = ExtendableBuffer::new(config.max_trie_size as usize);
            buffer.append(TRIE_REGION_TAG)?;
            buffer
        },
        terminals: TerminalPositionLookupTable::new(),
        id_map: HashMap::new(),
        terminal_records: Vec::new(),
        next_id: 0,
    };
    let root_pos = compactor.compact_array(ROOT_ARRAY_POS, true)?;
    debug_assert_eq!(root_pos, Some(ROOT_ARRAY_POS));

    if compactor.next_id != header.unigram_count {
        warn!(
            recomputed = compactor.next_id,
            incremental = header.unigram_count,
            "unigram counter mismatch during compaction"
        );
        return Err(DictError::Corruption(format!(
            "unigram counter mismatch: header says {}, live traversal found {}",
            header.unigram_count, compactor.next_id
        )));
    }

    let mut new_bigrams = new_bigram_buffer(config.max_trie_size as usize)?;
    let mut new_shortcuts = new_shortcut_buffer(config.max_trie_size as usize)?;
    let mut live_by_flag = 0u32;
    let mut surviving = 0u32;
    let mut dropped = 0u32;
    let mut live_shortcuts = 0u32;

    for record in &compactor.terminal_records {
        // Bigram list: keep live entries whose target also survived,
        // remapped onto the dense IDs.
        if record.old_bigram_head != NONE_POS {
            let mut entries: Vec<BigramEntry> = Vec::new();
            for_each_bigram_entry(old_bigrams, record.old_bigram_head, |entry| {
                entries.push(*entry);
            })?;
            let mut head = NONE_POS;
            for entry in entries {
                live_by_flag += 1;
                match compactor.id_map.get(&entry.target_terminal_id) {
                    Some(&new_target) => {
                        head = add_bigram_entry(&mut new_bigrams, head, new_target, entry.probability)?
                            .list_head;
                        surviving += 1;
                    }
                    None => dropped += 1,
                }
            }
            if head != NONE_POS {
                let node = NodeReader::new(&compactor.new_trie).read_node(record.node_pos)?;
                compactor.new_trie.write_u32(node.bigram_field_pos(), head)?;
            }
        }

        if record.old_shortcut_head != NONE_POS {
            let mut entries: Vec<ShortcutEntry> = Vec::new();
            for_each_shortcut_entry(old_shortcuts, record.old_shortcut_head, |entry| {
                entries.push(entry.clone());
            })?;
            let mut head = NONE_POS;
            for entry in entries {
                head = add_shortcut_entry(
                    &mut new_shortcuts,
                    head,
                    &entry.code_points,
                    entry.probability,
                    entry.is_whitelist(),
                )?
                .list_head;
                live_shortcuts += 1;
            }
            if head != NONE_POS {
                let node = NodeReader::new(&compactor.new_trie).read_node(record.node_pos)?;
                compactor
                    .new_trie
                    .write_u32(node.shortcut_field_pos(), head)?;
            }
        }
    }

    if live_by_flag != header.bigram_count {
        return Err(DictError::Corruption(format!(
            "bigram counter mismatch: header says {}, live traversal found {live_by_flag}",
            header.bigram_count
        )));
    }

    let old_total = old_trie.len() + old_bigrams.len() + old_shortcuts.len();
    let new_total = compactor.new_trie.len() + new_bigrams.len() + new_shortcuts.len();
    let stats = GcStats {
        live_unigrams: compactor.next_id,
        live_bigrams: surviving,
        dropped_bigrams: dropped,
        live_shortcuts,
        reclaimed_bytes: old_total.saturating_sub(new_total),
        duration_ms: started.elapsed().as_millis() as u64,
    };
    info!(
        live_unigrams = stats.live_unigrams,
        live_bigrams = stats.live_bigrams,
        dropped_bigrams = stats.dropped_bigrams,
        reclaimed_bytes = stats.reclaimed_bytes,
        duration_ms = stats.duration_ms,
        "compaction finished"
    );

    let mut new_header = header.clone();
    new_header.unigram_count = compactor.next_id;
    new_header.bigram_count = surviving;
    new_header.next_terminal_id = compactor.next_id;

    Ok(CompactionOutcome {
        trie: compactor.new_trie,
        bigrams: new_bigrams,
        shortcuts: new_shortcuts,
        terminals: compactor.terminals,
        header: new_header,
        stats,
    })
}

/// A node as it will be written to the compacted trie: possibly the
/// result of re-merging a single-child chain.
struct MergedNode {
    code_points: Vec<u32>,
    flags: u8,
    probability: i16,
    old_terminal_id: u32,
    old_children_pos: u32,
    old_bigram_pos: u32,
    old_shortcut_pos: u32,
}

struct TerminalRecord {
    node_pos: u32,
    old_bigram_head: u32,
    old_shortcut_head: u32,
}

struct Compactor<'a> {
    old_trie: &'a ExtendableBuffer,
    new_trie: ExtendableBuffer,
    terminals: TerminalPositionLookupTable,
    id_map: HashMap<u32, u32>,
    terminal_records: Vec<TerminalRecord>,
    next_id: u32,
}

impl<'a> Compactor<'a> {
    /// Rewrites one sibling array (with all chunks of its chain merged
    /// into a single dense chunk) and recurses into children. Returns the
    /// new array position, or `None` when nothing in it is live.
    fn compact_array(&mut self, old_array_pos: u32, keep_if_empty: bool) -> Result<Option<u32>> {
        let mut kept: Vec<MergedNode> = Vec::new();
        for node in NodeArrayReader::new(self.old_trie).iter_array(old_array_pos)? {
            let node = node?;
            if self.subtree_is_live(&node)? {
                kept.push(self.merge_chain(node)?);
            }
        }
        if kept.is_empty() && !keep_if_empty {
            return Ok(None);
        }

        // Write the chunk with placeholder children positions, then
        // recurse and patch.
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(kept.len() as u16).to_le_bytes());
        let mut node_offsets = Vec::with_capacity(kept.len());
        for merged in &kept {
            let (terminal_id, is_terminal) = if merged.old_terminal_id != INVALID_TERMINAL_ID {
                let new_id = self.next_id;
                self.next_id += 1;
                self.id_map.insert(merged.old_terminal_id, new_id);
                (new_id, true)
            } else {
                (INVALID_TERMINAL_ID, false)
            };
            let new_node = NewNode {
                code_points: &merged.code_points,
                flags: merged.flags,
                terminal_id,
                probability: merged.probability,
                children_pos: NONE_POS,
                bigram_pos: NONE_POS,
                shortcut_pos: NONE_POS,
            };
            node_offsets.push((bytes.len() as u32, is_terminal));
            bytes.extend_from_slice(&new_node.encode());
        }
        bytes.extend_from_slice(&NONE_POS.to_le_bytes());
        let chunk_pos = self.new_trie.append(&bytes)?;

        for (merged, (offset, is_terminal)) in kept.iter().zip(&node_offsets) {
            // The offset was taken from `bytes` and so already spans the
            // chunk count field.
            let node_pos = chunk_pos + offset;
            if *is_terminal {
                // id_map was just filled; the new ID is the map entry.
                let new_id = self.id_map[&merged.old_terminal_id];
                self.terminals.set(new_id, node_pos);
                self.terminal_records.push(TerminalRecord {
                    node_pos,
                    old_bigram_head: merged.old_bigram_pos,
                    old_shortcut_head: merged.old_shortcut_pos,
                });
            }
            if merged.old_children_pos != NONE_POS {
                if let Some(child_pos) = self.compact_array(merged.old_children_pos, false)? {
                    let node = NodeReader::new(&self.new_trie).read_node(node_pos)?;
                    self.new_trie.write_u32(node.children_field_pos(), child_pos)?;
                }
            }
        }
        Ok(Some(chunk_pos))
    }

    /// True when the subtree rooted at `node` still contains a word.
    fn subtree_is_live(&self, node: &PtNode) -> Result<bool> {
        if node.is_live_terminal() {
            return Ok(true);
        }
        if node.has_children() {
            for child in NodeArrayReader::new(self.old_trie).iter_array(node.children_pos)? {
                if self.subtree_is_live(&child?)? {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Restores path compression: absorbs descendants while the current
    /// node is a non-word with exactly one live child, then snapshots the
    /// surviving fields. Soft-deleted terminals lose their identity here,
    /// which is what makes their inbound bigram entries prunable.
    fn merge_chain(&self, node: PtNode) -> Result<MergedNode> {
        let mut code_points = node.code_points.clone();
        let mut current = node;
        loop {
            if current.is_live_terminal() || !current.has_children() {
                break;
            }
            let mut live_children: Vec<PtNode> = Vec::new();
            for child in NodeArrayReader::new(self.old_trie).iter_array(current.children_pos)? {
                let child = child?;
                if self.subtree_is_live(&child)? {
                    live_children.push(child);
                    if live_children.len() > 1 {
                        break;
                    }
                }
            }
            if live_children.len() == 1 {
                let child = live_children.remove(0);
                if code_points.len() + child.code_points.len() <= MAX_WORD_LENGTH {
                    code_points.extend_from_slice(&child.code_points);
                    current = child;
                    continue;
                }
            }
            break;
        }
        let live = current.is_live_terminal();
        Ok(MergedNode {
            code_points,
            flags: if live {
                current.flags & (crate::trie::node::FLAG_IS_TERMINAL | FLAG_IS_BLACKLISTED | FLAG_IS_NOT_A_WORD)
            } else {
                0
            },
            probability: if live { current.probability } else { NO_PROBABILITY },
            old_terminal_id: if live { current.terminal_id } else { INVALID_TERMINAL_ID },
            old_children_pos: current.children_pos,
            old_bigram_pos: if live { current.bigram_pos } else { NONE_POS },
            old_shortcut_pos: if live { current.shortcut_pos } else { NONE_POS },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DictConfig;
    use crate::ngram::bigram::find_bigram_probability;
    use crate::trie::new_trie_buffer;
    use crate::trie::reader::find_terminal_position;
    use crate::trie::updating::DynamicUpdater;
    use crate::trie::writer::NodeWriter;

    fn cps(word: &str) -> Vec<u32> {
        word.chars().map(|c| c as u32).collect()
    }

    #[test]
    fn compaction_remaps_positions_and_ids_exactly() -> Result<()> {
        let config = DictConfig::default();
        let mut trie = new_trie_buffer(&config)?;
        let mut bigrams = new_bigram_buffer(config.max_trie_size as usize)?;
        let shortcuts = new_shortcut_buffer(config.max_trie_size as usize)?;
        let mut terminals = TerminalPositionLookupTable::new();
        let mut header = Header::new(&config);

        // "ca" forces a split, so the compacted trie has a children array
        // whose parent field must be patched at the right position.
        for (word, prob) in [("cat", 120i16), ("car", 100), ("ca", 60)] {
            DynamicUpdater::new(&mut trie, &mut terminals, &mut header)
                .add_word(&cps(word), prob, 0)?;
        }
        let ca_pos = find_terminal_position(&trie, &cps("ca"), false)?.expect("ca");
        let cat_pos = find_terminal_position(&trie, &cps("cat"), false)?.expect("cat");
        let ca = NodeReader::new(&trie).read_node(ca_pos)?;
        let cat = NodeReader::new(&trie).read_node(cat_pos)?;
        let outcome = add_bigram_entry(&mut bigrams, ca.bigram_pos, cat.terminal_id, 220)?;
        NodeWriter::new(&mut trie).set_bigram_pos(&ca, outcome.list_head)?;
        header.bigram_count += 1;

        let out = run_compaction(&trie, &bigrams, &shortcuts, &header, &config)?;
        assert_eq!(out.header.unigram_count, 3);
        assert_eq!(out.header.bigram_count, 1);
        assert_eq!(out.stats.live_unigrams, 3);

        for (word, prob) in [("cat", 120i16), ("car", 100), ("ca", 60)] {
            let pos = find_terminal_position(&out.trie, &cps(word), false)?
                .unwrap_or_else(|| panic!("{word} missing after compaction"));
            let node = NodeReader::new(&out.trie).read_node(pos)?;
            assert_eq!(node.probability, prob, "{word}");
            // Every terminal-table slot must point at the node it names.
            assert_eq!(out.terminals.get(node.terminal_id), Some(pos), "{word}");
        }
        let ca_pos = find_terminal_position(&out.trie, &cps("ca"), false)?.expect("ca");
        let cat_pos = find_terminal_position(&out.trie, &cps("cat"), false)?.expect("cat");
        let ca = NodeReader::new(&out.trie).read_node(ca_pos)?;
        let cat = NodeReader::new(&out.trie).read_node(cat_pos)?;
        assert_eq!(
            find_bigram_probability(&out.bigrams, ca.bigram_pos, cat.terminal_id)?,
            Some(220)
        );
        Ok(())
    }
}
