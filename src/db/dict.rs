//! The public dictionary contract: lookup, mutation, iteration, flush,
//! and corruption tracking, composed from the buffer, trie, and
//! association-list layers.
//!
//! Locking model: one `parking_lot::RwLock` guards the whole instance.
//! Lookups and probability queries take the read lock; every structural
//! mutation, compaction included, holds the write lock for its full
//! duration, which serializes writers and keeps readers from observing a
//! node mid-split. Compaction is blocking and non-cancellable once
//! started; latency-sensitive callers gate it with
//! [`PatriciaDict::needs_to_run_gc`].

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::db::config::DictConfig;
use crate::db::gc::{run_compaction, GcStats};
use crate::db::probability::{
    DefaultProbabilityMerger, ProbabilityMerger, MAX_PROBABILITY, NOT_A_PROBABILITY,
};
use crate::error::{DictError, Result};
use crate::ngram::bigram::{
    add_bigram_entry, find_bigram_probability, for_each_bigram_entry, new_bigram_buffer,
    remove_all_bigram_entries, remove_bigram_entry, BigramEntry, ENTRY_SIZE as BIGRAM_ENTRY_SIZE,
};
use crate::ngram::shortcut::{add_shortcut_entry, for_each_shortcut_entry, new_shortcut_buffer};
use crate::storage::buffer::ExtendableBuffer;
use crate::storage::file::{read_dict_file, write_dict_file};
use crate::storage::header::Header;
use crate::storage::terminal_table::TerminalPositionLookupTable;
use crate::trie::node::{FLAG_IS_BLACKLISTED, FLAG_IS_NOT_A_WORD, NONE_POS};
use crate::trie::reader::{find_terminal_position, NodeArrayReader, NodeReader};
use crate::trie::updating::DynamicUpdater;
use crate::trie::writer::NodeWriter;
use crate::trie::{new_trie_buffer, ROOT_ARRAY_POS};

const UNIGRAM_COUNT_QUERY: &str = "UNIGRAM_COUNT";
const BIGRAM_COUNT_QUERY: &str = "BIGRAM_COUNT";
const MAX_UNIGRAM_COUNT_QUERY: &str = "MAX_UNIGRAM_COUNT";
const MAX_BIGRAM_COUNT_QUERY: &str = "MAX_BIGRAM_COUNT";

/// Unigram record supplied by the caller when adding a word.
#[derive(Debug, Clone)]
pub struct UnigramProperty {
    pub probability: i32,
    pub is_not_a_word: bool,
    pub is_blacklisted: bool,
    /// Alternate output spellings to attach to this word's terminal.
    pub shortcuts: Vec<ShortcutProperty>,
}

impl UnigramProperty {
    pub fn new(probability: i32) -> Self {
        Self {
            probability,
            is_not_a_word: false,
            is_blacklisted: false,
            shortcuts: Vec::new(),
        }
    }
}

/// One alternate spelling attached to a word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortcutProperty {
    pub code_points: Vec<u32>,
    pub probability: i32,
    pub is_whitelist: bool,
}

/// Bigram record: the continuation word and its probability; the source
/// word is passed separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BigramProperty {
    pub code_points: Vec<u32>,
    pub probability: i32,
}

/// Full record of a stored word, for tooling and export.
#[derive(Debug, Clone)]
pub struct WordProperty {
    pub code_points: Vec<u32>,
    pub probability: i32,
    pub is_not_a_word: bool,
    pub is_blacklisted: bool,
    pub bigrams: Vec<BigramProperty>,
    pub shortcuts: Vec<ShortcutProperty>,
}

/// One child of a trie node, for external search expansion.
#[derive(Debug, Clone)]
pub struct ChildNode {
    pub position: u32,
    pub code_points: Vec<u32>,
    pub is_terminal: bool,
    pub probability: i32,
}

/// Instance health: a one-way state machine. Once corrupted, an instance
/// refuses mutations for the rest of its life; reads stay best-effort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    Healthy,
    Corrupted,
}

struct HealthFlag(AtomicBool);

impl HealthFlag {
    fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    fn state(&self) -> Health {
        if self.0.load(Ordering::Acquire) {
            Health::Corrupted
        } else {
            Health::Healthy
        }
    }

    fn degrade(&self) {
        if !self.0.swap(true, Ordering::AcqRel) {
            warn!("dictionary instance degraded to corrupted state");
        }
    }
}

struct WordIterSnapshot {
    generation: u64,
    /// `(terminal position, code points)` in canonical traversal order.
    words: Vec<(u32, Vec<u32>)>,
}

struct DictInner {
    config: DictConfig,
    header: Header,
    trie: ExtendableBuffer,
    bigrams: ExtendableBuffer,
    shortcuts: ExtendableBuffer,
    terminals: TerminalPositionLookupTable,
    /// Estimated soft-deleted bytes since the last compaction; feeds the
    /// GC heuristic, reset by `flush_with_gc`.
    garbage_bytes: usize,
    /// Bumped by every mutation and compaction; invalidates word
    /// enumeration snapshots.
    generation: u64,
    word_iter: Option<WordIterSnapshot>,
}

/// A mutable, persistent Patricia-trie dictionary.
pub struct PatriciaDict {
    inner: RwLock<DictInner>,
    health: HealthFlag,
    merger: Box<dyn ProbabilityMerger>,
}

impl PatriciaDict {
    /// Creates an empty dictionary.
    pub fn new(config: DictConfig) -> Result<Self> {
        let header = Header::new(&config);
        let trie = new_trie_buffer(&config)?;
        let bigrams = new_bigram_buffer(config.max_trie_size as usize)?;
        let shortcuts = new_shortcut_buffer(config.max_trie_size as usize)?;
        Ok(Self {
            inner: RwLock::new(DictInner {
                config,
                header,
                trie,
                bigrams,
                shortcuts,
                terminals: TerminalPositionLookupTable::new(),
                garbage_bytes: 0,
                generation: 0,
                word_iter: None,
            }),
            health: HealthFlag::new(),
            merger: Box::new(DefaultProbabilityMerger),
        })
    }

    /// Opens a dictionary file previously written by `flush` or
    /// `flush_with_gc`. Ceilings and locale come from the stored header.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let contents = read_dict_file(path.as_ref())?;
        let config = DictConfig {
            max_trie_size: contents.header.max_trie_size,
            max_unigram_count: contents.header.max_unigram_count,
            max_bigram_count: contents.header.max_bigram_count,
            locale: contents.header.locale.clone(),
            ..DictConfig::default()
        };
        let max = config.max_trie_size as usize;
        let trie = ExtendableBuffer::from_base(contents.trie, max);
        // The root array must at least decode; anything deeper is
        // validated lazily on access.
        trie.read_u16(ROOT_ARRAY_POS)?;
        info!(
            path = %path.as_ref().display(),
            unigrams = contents.header.unigram_count,
            bigrams = contents.header.bigram_count,
            "dictionary loaded"
        );
        Ok(Self {
            inner: RwLock::new(DictInner {
                config,
                header: contents.header,
                trie,
                bigrams: ExtendableBuffer::from_base(contents.bigrams, max),
                shortcuts: ExtendableBuffer::from_base(contents.shortcuts, max),
                terminals: contents.terminals,
                garbage_bytes: 0,
                generation: 0,
                word_iter: None,
            }),
            health: HealthFlag::new(),
            merger: Box::new(DefaultProbabilityMerger),
        })
    }

    /// Replaces the unigram/bigram blending policy.
    pub fn with_probability_merger(mut self, merger: Box<dyn ProbabilityMerger>) -> Self {
        self.merger = merger;
        self
    }

    pub fn is_corrupted(&self) -> bool {
        self.health.state() == Health::Corrupted
    }

    /// Position of the root node array; the starting point for external
    /// search expansion via [`PatriciaDict::all_child_nodes`].
    pub fn root_position(&self) -> u32 {
        ROOT_ARRAY_POS
    }

    pub fn unigram_count(&self) -> u32 {
        self.inner.read().header.unigram_count
    }

    pub fn bigram_count(&self) -> u32 {
        self.inner.read().header.bigram_count
    }

    /// Finds the terminal node storing `word`; exact-case first, then a
    /// case-insensitive retry when `force_lower_case_search` is set.
    /// Absent and soft-removed words are `None`.
    pub fn terminal_position_of_word(
        &self,
        word: &[u32],
        force_lower_case_search: bool,
    ) -> Result<Option<u32>> {
        let inner = self.inner.read();
        self.guard(find_terminal_position(
            &inner.trie,
            word,
            force_lower_case_search,
        ))
    }

    /// Blends a standalone word score with an optional bigram score.
    /// Pure; the caller resolves the bigram via
    /// [`PatriciaDict::iterate_ngram_entries`].
    pub fn get_probability(&self, unigram_probability: i32, bigram_probability: i32) -> i32 {
        self.merger.merge(unigram_probability, bigram_probability)
    }

    /// Probability of the terminal at `pt_node_pos`, folded with the
    /// bigram from the terminal at `prev_word_pt_node_pos` when one is
    /// stored. Blacklisted and not-a-word entries yield
    /// [`NOT_A_PROBABILITY`].
    pub fn probability_of_pt_node(
        &self,
        prev_word_pt_node_pos: Option<u32>,
        pt_node_pos: u32,
    ) -> Result<i32> {
        let inner = self.inner.read();
        self.guard((|| {
            let node = NodeReader::new(&inner.trie).read_node(pt_node_pos)?;
            if !node.is_live_terminal() || node.is_blacklisted() || node.is_not_a_word() {
                return Ok(NOT_A_PROBABILITY);
            }
            let unigram = node.probability as i32;
            let bigram = match prev_word_pt_node_pos {
                Some(prev_pos) => {
                    let prev = NodeReader::new(&inner.trie).read_node(prev_pos)?;
                    find_bigram_probability(&inner.bigrams, prev.bigram_pos, node.terminal_id)?
                        .map_or(NOT_A_PROBABILITY, |p| p as i32)
                }
                None => NOT_A_PROBABILITY,
            };
            Ok(self.merger.merge(unigram, bigram))
        })())
    }

    /// Enumerates the stored bigrams of the terminal at
    /// `prev_word_pt_node_pos` in storage order: one finite,
    /// non-restartable pass invoking `listener(target_position,
    /// probability)` for every entry whose target is still live.
    pub fn iterate_ngram_entries(
        &self,
        prev_word_pt_node_pos: u32,
        mut listener: impl FnMut(u32, i32),
    ) -> Result<()> {
        let inner = self.inner.read();
        self.guard((|| {
            let prev = NodeReader::new(&inner.trie).read_node(prev_word_pt_node_pos)?;
            let mut entries: Vec<BigramEntry> = Vec::new();
            for_each_bigram_entry(&inner.bigrams, prev.bigram_pos, |entry| {
                entries.push(*entry);
            })?;
            for entry in entries {
                let target_pos = match inner.terminals.get(entry.target_terminal_id) {
                    Some(pos) => pos,
                    None => continue,
                };
                let target = NodeReader::new(&inner.trie).read_node(target_pos)?;
                if target.is_live_terminal() {
                    listener(target_pos, entry.probability as i32);
                }
            }
            Ok(())
        })())
    }

    /// Shortcut list position of the terminal at `pt_node_pos`, if any.
    pub fn shortcut_position_of_pt_node(&self, pt_node_pos: u32) -> Result<Option<u32>> {
        let inner = self.inner.read();
        self.guard((|| {
            let node = NodeReader::new(&inner.trie).read_node(pt_node_pos)?;
            Ok((node.shortcut_pos != NONE_POS).then_some(node.shortcut_pos))
        })())
    }

    /// Visits every live shortcut of the terminal at `pt_node_pos` as
    /// `(spelling, probability, is_whitelist)`.
    pub fn iterate_shortcut_entries(
        &self,
        pt_node_pos: u32,
        mut listener: impl FnMut(&[u32], i32, bool),
    ) -> Result<()> {
        let inner = self.inner.read();
        self.guard((|| {
            let node = NodeReader::new(&inner.trie).read_node(pt_node_pos)?;
            for_each_shortcut_entry(&inner.shortcuts, node.shortcut_pos, |entry| {
                listener(&entry.code_points, entry.probability as i32, entry.is_whitelist());
            })
        })())
    }

    /// Children of the node at `pt_node_pos` (or of the root array when
    /// `None`), for external beam-search expansion. Soft-removed
    /// terminals are reported as non-terminal so search still descends
    /// through them.
    pub fn all_child_nodes(&self, pt_node_pos: Option<u32>) -> Result<Vec<ChildNode>> {
        let inner = self.inner.read();
        self.guard((|| {
            let array_pos = match pt_node_pos {
                None => ROOT_ARRAY_POS,
                Some(pos) => {
                    let node = NodeReader::new(&inner.trie).read_node(pos)?;
                    if !node.has_children() {
                        return Ok(Vec::new());
                    }
                    node.children_pos
                }
            };
            let mut children = Vec::new();
            for node in NodeArrayReader::new(&inner.trie).iter_array(array_pos)? {
                let node = node?;
                let live = node.is_live_terminal();
                children.push(ChildNode {
                    position: node.pos,
                    code_points: node.code_points.clone(),
                    is_terminal: live,
                    probability: if live {
                        node.probability as i32
                    } else {
                        NOT_A_PROBABILITY
                    },
                });
            }
            Ok(children)
        })())
    }

    /// Reconstructs the word spelled by the terminal at
    /// `terminal_pt_node_pos` along with its unigram probability. Words
    /// longer than `max_code_point_count` are an error rather than being
    /// silently truncated; an unknown position is `None`.
    pub fn get_code_points_and_probability(
        &self,
        terminal_pt_node_pos: u32,
        max_code_point_count: usize,
    ) -> Result<Option<(Vec<u32>, i32)>> {
        let inner = self.inner.read();
        self.guard(reconstruct_word(
            &inner.trie,
            terminal_pt_node_pos,
            max_code_point_count,
        ))
    }

    /// Adds a unigram entry, or overwrites the existing one in place.
    /// Shortcut targets carried by the property are attached to the
    /// word's terminal.
    pub fn add_unigram_entry(&self, word: &[u32], property: &UnigramProperty) -> Result<()> {
        validate_probability(property.probability)?;
        for shortcut in &property.shortcuts {
            validate_probability(shortcut.probability)?;
        }
        let mut inner = self.inner.write();
        let inner = &mut *inner;
        self.check_mutable(inner)?;
        self.guard((|| {
            let mut flags = 0u8;
            if property.is_blacklisted {
                flags |= FLAG_IS_BLACKLISTED;
            }
            if property.is_not_a_word {
                flags |= FLAG_IS_NOT_A_WORD;
            }
            let added = DynamicUpdater::new(&mut inner.trie, &mut inner.terminals, &mut inner.header)
                .add_word(word, property.probability as i16, flags)?;
            for shortcut in &property.shortcuts {
                let node = NodeReader::new(&inner.trie).read_node(added.terminal_pos)?;
                let outcome = add_shortcut_entry(
                    &mut inner.shortcuts,
                    node.shortcut_pos,
                    &shortcut.code_points,
                    shortcut.probability as i16,
                    shortcut.is_whitelist,
                )?;
                if outcome.list_head != node.shortcut_pos {
                    NodeWriter::new(&mut inner.trie).set_shortcut_pos(&node, outcome.list_head)?;
                }
            }
            inner.generation += 1;
            debug!(
                terminal_id = added.terminal_id,
                new_word = added.is_new_word,
                "unigram entry added"
            );
            Ok(())
        })())
    }

    /// Soft-deletes a word: it stops resolving and counting immediately,
    /// and its outgoing bigrams die with it; bytes are reclaimed by the
    /// next compaction. Returns false when the word is not stored.
    pub fn remove_unigram_entry(&self, word: &[u32]) -> Result<bool> {
        let mut inner = self.inner.write();
        let inner = &mut *inner;
        self.check_corrupted()?;
        self.guard((|| {
            let removed = DynamicUpdater::new(
                &mut inner.trie,
                &mut inner.terminals,
                &mut inner.header,
            )
            .remove_word(word)?;
            let node = match removed {
                Some(node) => node,
                None => return Ok(false),
            };
            inner.garbage_bytes += node.byte_size() as usize;
            if node.bigram_pos != NONE_POS {
                let pruned = remove_all_bigram_entries(&mut inner.bigrams, node.bigram_pos)?;
                inner.header.bigram_count = inner.header.bigram_count.saturating_sub(pruned);
                inner.garbage_bytes += (pruned * BIGRAM_ENTRY_SIZE) as usize;
            }
            inner.generation += 1;
            Ok(true)
        })())
    }

    /// Adds (or updates) the bigram `prev_word → property.code_points`.
    /// Returns false when either word is not stored.
    pub fn add_ngram_entry(&self, prev_word: &[u32], property: &BigramProperty) -> Result<bool> {
        validate_probability(property.probability)?;
        let mut inner = self.inner.write();
        let inner = &mut *inner;
        self.check_mutable(inner)?;
        self.guard((|| {
            let source_pos = match find_terminal_position(&inner.trie, prev_word, false)? {
                Some(pos) => pos,
                None => return Ok(false),
            };
            let target_pos =
                match find_terminal_position(&inner.trie, &property.code_points, false)? {
                    Some(pos) => pos,
                    None => return Ok(false),
                };
            let source = NodeReader::new(&inner.trie).read_node(source_pos)?;
            let target = NodeReader::new(&inner.trie).read_node(target_pos)?;
            let exists =
                find_bigram_probability(&inner.bigrams, source.bigram_pos, target.terminal_id)?
                    .is_some();
            if !exists && !inner.header.has_room_for_bigram() {
                return Err(DictError::CapacityExceeded(format!(
                    "bigram count is at the configured maximum ({})",
                    inner.header.max_bigram_count
                )));
            }
            let outcome = add_bigram_entry(
                &mut inner.bigrams,
                source.bigram_pos,
                target.terminal_id,
                property.probability as i16,
            )?;
            if outcome.list_head != source.bigram_pos {
                NodeWriter::new(&mut inner.trie).set_bigram_pos(&source, outcome.list_head)?;
            }
            if outcome.newly_added {
                inner.header.bigram_count += 1;
            }
            inner.generation += 1;
            Ok(true)
        })())
    }

    /// Soft-deletes the bigram `prev_word → word`. Returns false when no
    /// live entry matches.
    pub fn remove_ngram_entry(&self, prev_word: &[u32], word: &[u32]) -> Result<bool> {
        let mut inner = self.inner.write();
        let inner = &mut *inner;
        self.check_corrupted()?;
        self.guard((|| {
            let source_pos = match find_terminal_position(&inner.trie, prev_word, false)? {
                Some(pos) => pos,
                None => return Ok(false),
            };
            let target_pos = match find_terminal_position(&inner.trie, word, false)? {
                Some(pos) => pos,
                None => return Ok(false),
            };
            let source = NodeReader::new(&inner.trie).read_node(source_pos)?;
            let target = NodeReader::new(&inner.trie).read_node(target_pos)?;
            let removed = remove_bigram_entry(
                &mut inner.bigrams,
                source.bigram_pos,
                target.terminal_id,
            )?;
            if removed {
                inner.header.bigram_count = inner.header.bigram_count.saturating_sub(1);
                inner.garbage_bytes += BIGRAM_ENTRY_SIZE as usize;
                inner.generation += 1;
            }
            Ok(removed)
        })())
    }

    /// Serializes the current buffers verbatim, soft-deleted bytes
    /// included. Cheap; reclaims nothing.
    pub fn flush(&self, path: impl AsRef<Path>) -> Result<()> {
        let inner = self.inner.write();
        write_dict_file(
            path.as_ref(),
            &inner.header,
            &inner.trie.to_vec(),
            &inner.terminals,
            &inner.bigrams.to_vec(),
            &inner.shortcuts.to_vec(),
        )
    }

    /// Compacts the dictionary and writes the result. The in-memory
    /// instance adopts the compacted buffers on success; a failed disk
    /// write leaves it usable (and already compacted).
    pub fn flush_with_gc(&self, path: impl AsRef<Path>) -> Result<GcStats> {
        let mut inner = self.inner.write();
        let inner = &mut *inner;
        self.check_corrupted()?;
        let outcome = self.guard(run_compaction(
            &inner.trie,
            &inner.bigrams,
            &inner.shortcuts,
            &inner.header,
            &inner.config,
        ))?;
        inner.trie = outcome.trie;
        inner.bigrams = outcome.bigrams;
        inner.shortcuts = outcome.shortcuts;
        inner.terminals = outcome.terminals;
        inner.header = outcome.header;
        inner.garbage_bytes = 0;
        inner.generation += 1;
        inner.word_iter = None;
        write_dict_file(
            path.as_ref(),
            &inner.header,
            &inner.trie.to_vec(),
            &inner.terminals,
            &inner.bigrams.to_vec(),
            &inner.shortcuts.to_vec(),
        )?;
        Ok(outcome.stats)
    }

    /// GC heuristic. Proximity to the size ceiling always recommends
    /// compaction; the soft-deleted byte ratio only does so when the
    /// caller can tolerate the blocking pass (`minds_block_by_gc` is
    /// false).
    pub fn needs_to_run_gc(&self, minds_block_by_gc: bool) -> bool {
        let inner = self.inner.read();
        if inner.trie.is_near_size_limit()
            || inner.bigrams.is_near_size_limit()
            || inner.shortcuts.is_near_size_limit()
        {
            return true;
        }
        if minds_block_by_gc {
            return false;
        }
        let used = inner.trie.len() + inner.bigrams.len() + inner.shortcuts.len();
        inner.garbage_bytes > 0
            && inner.garbage_bytes * 100 >= used * inner.config.gc_garbage_percent as usize
    }

    /// Answers fixed textual debug queries; unknown keys yield an empty
    /// string.
    pub fn get_property(&self, query: &str) -> String {
        let inner = self.inner.read();
        match query {
            UNIGRAM_COUNT_QUERY => inner.header.unigram_count.to_string(),
            BIGRAM_COUNT_QUERY => inner.header.bigram_count.to_string(),
            MAX_UNIGRAM_COUNT_QUERY => inner.header.max_unigram_count.to_string(),
            MAX_BIGRAM_COUNT_QUERY => inner.header.max_bigram_count.to_string(),
            _ => String::new(),
        }
    }

    /// Full record of a stored word, bigram targets resolved back to
    /// spellings. `None` when the word is not stored.
    pub fn get_word_property(&self, word: &[u32]) -> Result<Option<WordProperty>> {
        let inner = self.inner.read();
        self.guard((|| {
            let pos = match find_terminal_position(&inner.trie, word, false)? {
                Some(pos) => pos,
                None => return Ok(None),
            };
            let node = NodeReader::new(&inner.trie).read_node(pos)?;

            let mut entries: Vec<BigramEntry> = Vec::new();
            for_each_bigram_entry(&inner.bigrams, node.bigram_pos, |entry| {
                entries.push(*entry);
            })?;
            let mut bigrams = Vec::new();
            for entry in entries {
                let target_pos = match inner.terminals.get(entry.target_terminal_id) {
                    Some(pos) => pos,
                    None => continue,
                };
                if let Some((code_points, _)) =
                    reconstruct_word(&inner.trie, target_pos, crate::trie::MAX_WORD_LENGTH)?
                {
                    bigrams.push(BigramProperty {
                        code_points,
                        probability: entry.probability as i32,
                    });
                }
            }

            let mut shortcuts = Vec::new();
            for_each_shortcut_entry(&inner.shortcuts, node.shortcut_pos, |entry| {
                shortcuts.push(ShortcutProperty {
                    code_points: entry.code_points.clone(),
                    probability: entry.probability as i32,
                    is_whitelist: entry.is_whitelist(),
                });
            })?;

            Ok(Some(WordProperty {
                code_points: word.to_vec(),
                probability: node.probability as i32,
                is_not_a_word: node.is_not_a_word(),
                is_blacklisted: node.is_blacklisted(),
                bigrams,
                shortcuts,
            }))
        })())
    }

    /// Resumable word enumeration: `token == 0` starts a pass over a
    /// snapshot of every live word; each call returns one word and the
    /// token for the next (0 again once exhausted). The snapshot is
    /// rebuilt whenever a mutation or compaction has happened since it
    /// was taken.
    pub fn get_next_word_and_next_token(&self, token: u32) -> Result<(Option<Vec<u32>>, u32)> {
        let mut inner = self.inner.write();
        let inner = &mut *inner;
        self.guard((|| {
            let stale = match &inner.word_iter {
                Some(snapshot) => snapshot.generation != inner.generation,
                None => true,
            };
            if stale {
                let mut words = Vec::new();
                let mut prefix = Vec::new();
                collect_words(&inner.trie, ROOT_ARRAY_POS, &mut prefix, &mut words)?;
                inner.word_iter = Some(WordIterSnapshot {
                    generation: inner.generation,
                    words,
                });
            }
            let snapshot = inner.word_iter.as_ref().expect("snapshot just ensured");
            let index = token as usize;
            match snapshot.words.get(index) {
                None => Ok((None, 0)),
                Some((_, word)) => {
                    let next = index + 1;
                    let next_token = if next >= snapshot.words.len() {
                        0
                    } else {
                        next as u32
                    };
                    Ok((Some(word.clone()), next_token))
                }
            }
        })())
    }

    /// Refuses mutation while corrupted or once any buffer is within the
    /// overflow margin of its ceiling, so compaction always has room to
    /// complete.
    fn check_mutable(&self, inner: &DictInner) -> Result<()> {
        self.check_corrupted()?;
        let margin = inner.config.mutation_margin() as usize;
        let max = inner.config.max_trie_size as usize;
        for (name, buffer) in [
            ("trie", &inner.trie),
            ("bigram", &inner.bigrams),
            ("shortcut", &inner.shortcuts),
        ] {
            if buffer.len() + margin > max {
                return Err(DictError::CapacityExceeded(format!(
                    "{name} buffer is within {margin} bytes of its ceiling {max}; run compaction"
                )));
            }
        }
        Ok(())
    }

    fn check_corrupted(&self) -> Result<()> {
        match self.health.state() {
            Health::Healthy => Ok(()),
            Health::Corrupted => Err(DictError::Corruption(
                "dictionary instance is corrupted; operation refused".into(),
            )),
        }
    }

    /// Makes corruption sticky: any corruption error observed by an
    /// operation degrades the instance before propagating.
    fn guard<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_corruption() {
                self.health.degrade();
            }
        }
        result
    }
}

fn validate_probability(probability: i32) -> Result<()> {
    if !(0..=MAX_PROBABILITY).contains(&probability) {
        return Err(DictError::InvalidArgument(format!(
            "probability {probability} outside 0..={MAX_PROBABILITY}"
        )));
    }
    Ok(())
}

/// Root-first search for the node at `target_pos`, accumulating the
/// spelled prefix on the way down.
fn reconstruct_word(
    trie: &ExtendableBuffer,
    target_pos: u32,
    max_code_point_count: usize,
) -> Result<Option<(Vec<u32>, i32)>> {
    let mut prefix = Vec::new();
    walk_to(trie, ROOT_ARRAY_POS, target_pos, max_code_point_count, &mut prefix)
}

fn walk_to(
    trie: &ExtendableBuffer,
    array_pos: u32,
    target_pos: u32,
    max: usize,
    prefix: &mut Vec<u32>,
) -> Result<Option<(Vec<u32>, i32)>> {
    for node in NodeArrayReader::new(trie).iter_array(array_pos)? {
        let node = node?;
        if node.pos == target_pos {
            if prefix.len() + node.code_points.len() > max {
                return Err(DictError::InvalidArgument(format!(
                    "word at position {target_pos} exceeds maximum length {max}"
                )));
            }
            let mut word = prefix.clone();
            word.extend_from_slice(&node.code_points);
            let probability = if node.is_live_terminal() {
                node.probability as i32
            } else {
                NOT_A_PROBABILITY
            };
            return Ok(Some((word, probability)));
        }
        if node.has_children() {
            prefix.extend_from_slice(&node.code_points);
            if let Some(found) = walk_to(trie, node.children_pos, target_pos, max, prefix)? {
                return Ok(Some(found));
            }
            prefix.truncate(prefix.len() - node.code_points.len());
        }
    }
    Ok(None)
}

/// Depth-first collection of every live word in canonical (storage)
/// order, as `(terminal position, code points)`.
fn collect_words(
    trie: &ExtendableBuffer,
    array_pos: u32,
    prefix: &mut Vec<u32>,
    out: &mut Vec<(u32, Vec<u32>)>,
) -> Result<()> {
    for node in NodeArrayReader::new(trie).iter_array(array_pos)? {
        let node = node?;
        prefix.extend_from_slice(&node.code_points);
        if node.is_live_terminal() {
            out.push((node.pos, prefix.clone()));
        }
        if node.has_children() {
            collect_words(trie, node.children_pos, prefix, out)?;
        }
        prefix.truncate(prefix.len() - node.code_points.len());
    }
    Ok(())
}
