//! Side-effect-free decoding of PtNodes and PtNodeArray chunks, plus the
//! read-only word descent used by lookups.
//!
//! A PtNodeArray is stored as a chain of chunks:
//!
//! ```text
//! count        u16
//! nodes        count PtNodes, back to back
//! forward_link u32   next chunk of the same sibling array, 0 at the end
//! ```
//!
//! Sibling growth appends a new chunk and links it, so decoding a whole
//! array means following forward links until a zero link.

use crate::error::{DictError, Result};
use crate::storage::buffer::ExtendableBuffer;
use crate::trie::node::{encoded_size, validate_flags, PtNode, NONE_POS};
use crate::trie::ROOT_ARRAY_POS;

pub(crate) const CHUNK_COUNT_SIZE: u32 = 2;

pub struct NodeReader<'a> {
    buffer: &'a ExtendableBuffer,
}

impl<'a> NodeReader<'a> {
    pub fn new(buffer: &'a ExtendableBuffer) -> Self {
        Self { buffer }
    }

    /// Decodes the PtNode at `pos`. Malformed encodings are reported as
    /// corruption, never guessed at.
    pub fn read_node(&self, pos: u32) -> Result<PtNode> {
        let flags = validate_flags(self.buffer.read_u8(pos)?)?;
        let cp_capacity = self.buffer.read_u8(pos + 1)?;
        let cp_count = self.buffer.read_u8(pos + 2)?;
        if cp_count == 0 || cp_count > cp_capacity {
            return Err(DictError::Corruption(format!(
                "PtNode at {pos} has invalid code point count {cp_count} (capacity {cp_capacity})"
            )));
        }
        let mut code_points = Vec::with_capacity(cp_count as usize);
        for i in 0..cp_count as u32 {
            code_points.push(self.buffer.read_u32(pos + 3 + 4 * i)?);
        }
        let fields_pos = pos + 3 + 4 * cp_capacity as u32;
        let terminal_id = self.buffer.read_u32(fields_pos)?;
        let probability = self.buffer.read_i16(fields_pos + 4)?;
        let children_pos = self.buffer.read_u32(fields_pos + 6)?;
        let bigram_pos = self.buffer.read_u32(fields_pos + 10)?;
        let shortcut_pos = self.buffer.read_u32(fields_pos + 14)?;
        Ok(PtNode {
            pos,
            flags,
            cp_capacity,
            code_points,
            terminal_id,
            probability,
            children_pos,
            bigram_pos,
            shortcut_pos,
        })
    }
}

pub struct NodeArrayReader<'a> {
    buffer: &'a ExtendableBuffer,
}

impl<'a> NodeArrayReader<'a> {
    pub fn new(buffer: &'a ExtendableBuffer) -> Self {
        Self { buffer }
    }

    /// Iterates every sibling in the array starting at `array_pos`,
    /// following forward links across chunks.
    pub fn iter_array(&self, array_pos: u32) -> Result<SiblingIter<'a>> {
        SiblingIter::new(self.buffer, array_pos)
    }

    /// Position of the forward-link field of the chain's last chunk; this
    /// is where the writer patches in a newly appended chunk.
    pub(crate) fn last_forward_link_pos(&self, array_pos: u32) -> Result<u32> {
        let mut chunk_pos = array_pos;
        loop {
            let count = self.buffer.read_u16(chunk_pos)?;
            let mut pos = chunk_pos + CHUNK_COUNT_SIZE;
            for _ in 0..count {
                let cp_capacity = self.buffer.read_u8(pos + 1)?;
                pos += encoded_size(cp_capacity);
            }
            let forward = self.buffer.read_u32(pos)?;
            if forward == NONE_POS {
                return Ok(pos);
            }
            chunk_pos = forward;
        }
    }
}

pub struct SiblingIter<'a> {
    buffer: &'a ExtendableBuffer,
    remaining: u16,
    /// Next node position, or the forward-link field once the current
    /// chunk is exhausted.
    cursor: u32,
}

impl<'a> SiblingIter<'a> {
    fn new(buffer: &'a ExtendableBuffer, array_pos: u32) -> Result<Self> {
        let remaining = buffer.read_u16(array_pos)?;
        Ok(Self {
            buffer,
            remaining,
            cursor: array_pos + CHUNK_COUNT_SIZE,
        })
    }
}

impl<'a> Iterator for SiblingIter<'a> {
    type Item = Result<PtNode>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.remaining == 0 {
                let forward = match self.buffer.read_u32(self.cursor) {
                    Ok(forward) => forward,
                    Err(e) => return Some(Err(e)),
                };
                if forward == NONE_POS {
                    return None;
                }
                match self.buffer.read_u16(forward) {
                    Ok(count) => {
                        self.remaining = count;
                        self.cursor = forward + CHUNK_COUNT_SIZE;
                    }
                    Err(e) => return Some(Err(e)),
                }
                continue;
            }
            self.remaining -= 1;
            return match NodeReader::new(self.buffer).read_node(self.cursor) {
                Ok(node) => {
                    self.cursor = node.end_pos();
                    Some(Ok(node))
                }
                Err(e) => Some(Err(e)),
            };
        }
    }
}

/// Lowercases a code point through its `char` mapping; code points without
/// a scalar value or a single-char lowering are compared as-is.
pub(crate) fn to_lower_code_point(cp: u32) -> u32 {
    match char::from_u32(cp) {
        Some(c) => {
            let mut lower = c.to_lowercase();
            match (lower.next(), lower.next()) {
                (Some(l), None) => l as u32,
                _ => cp,
            }
        }
        None => cp,
    }
}

fn code_points_match(node_cp: u32, word_cp: u32, fold_case: bool) -> bool {
    node_cp == word_cp
        || (fold_case && to_lower_code_point(node_cp) == to_lower_code_point(word_cp))
}

/// Finds the live terminal PtNode storing `word`, trying an exact-case
/// descent first and, when `force_lower_case` is set, a case-insensitive
/// retry. Absent words are `None`, never an error.
pub fn find_terminal_position(
    buffer: &ExtendableBuffer,
    word: &[u32],
    force_lower_case: bool,
) -> Result<Option<u32>> {
    if word.is_empty() {
        return Ok(None);
    }
    if let Some(pos) = descend(buffer, word, false)? {
        return Ok(Some(pos));
    }
    if force_lower_case {
        descend(buffer, word, true)
    } else {
        Ok(None)
    }
}

fn descend(buffer: &ExtendableBuffer, word: &[u32], fold_case: bool) -> Result<Option<u32>> {
    let mut array_pos = ROOT_ARRAY_POS;
    let mut consumed = 0usize;
    'arrays: loop {
        for node in NodeArrayReader::new(buffer).iter_array(array_pos)? {
            let node = node?;
            if !code_points_match(node.code_points[0], word[consumed], fold_case) {
                continue;
            }
            if node.code_points.len() > word.len() - consumed {
                // The word would end inside this segment; no terminal here.
                return Ok(None);
            }
            for (i, &cp) in node.code_points.iter().enumerate() {
                if !code_points_match(cp, word[consumed + i], fold_case) {
                    return Ok(None);
                }
            }
            consumed += node.code_points.len();
            if consumed == word.len() {
                return Ok(node.is_live_terminal().then_some(node.pos));
            }
            if !node.has_children() {
                return Ok(None);
            }
            array_pos = node.children_pos;
            continue 'arrays;
        }
        return Ok(None);
    }
}
