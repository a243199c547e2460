//! Bigram list policy: per-terminal association lists mapping a source
//! word to its stored continuations.
//!
//! Lists live in their own buffer as chained entries; a source PtNode
//! holds the position of its list head. Entries reference the target by
//! terminal ID, never by trie position, so they survive node moves and
//! are rewritten wholesale only during compaction.
//!
//! Entry layout: `flags u8 | target_terminal_id u32 | probability i16 |
//! next u32` (next = 0 ends the chain).

use crate::error::{DictError, Result};
use crate::storage::buffer::ExtendableBuffer;
use crate::trie::node::NONE_POS;

pub(crate) const BIGRAM_REGION_TAG: &[u8; 4] = b"BIG\0";

const ENTRY_FLAG_DELETED: u8 = 0x01;
pub(crate) const ENTRY_SIZE: u32 = 11;

pub(crate) fn new_bigram_buffer(max_size: usize) -> Result<ExtendableBuffer> {
    let mut buffer = ExtendableBuffer::new(max_size);
    buffer.append(BIGRAM_REGION_TAG)?;
    Ok(buffer)
}

#[derive(Debug, Clone, Copy)]
pub struct BigramEntry {
    pub pos: u32,
    pub flags: u8,
    pub target_terminal_id: u32,
    pub probability: i16,
    pub next_pos: u32,
}

impl BigramEntry {
    pub fn is_deleted(&self) -> bool {
        self.flags & ENTRY_FLAG_DELETED != 0
    }
}

fn read_entry(buffer: &ExtendableBuffer, pos: u32) -> Result<BigramEntry> {
    let flags = buffer.read_u8(pos)?;
    if flags & !ENTRY_FLAG_DELETED != 0 {
        return Err(DictError::Corruption(format!(
            "unknown bigram entry flag bits: 0x{flags:02X}"
        )));
    }
    Ok(BigramEntry {
        pos,
        flags,
        target_terminal_id: buffer.read_u32(pos + 1)?,
        probability: buffer.read_i16(pos + 5)?,
        next_pos: buffer.read_u32(pos + 7)?,
    })
}

fn append_entry(
    buffer: &mut ExtendableBuffer,
    target_terminal_id: u32,
    probability: i16,
) -> Result<u32> {
    let mut bytes = Vec::with_capacity(ENTRY_SIZE as usize);
    bytes.push(0u8);
    bytes.extend_from_slice(&target_terminal_id.to_le_bytes());
    bytes.extend_from_slice(&probability.to_le_bytes());
    bytes.extend_from_slice(&NONE_POS.to_le_bytes());
    buffer.append(&bytes)
}

#[derive(Debug)]
pub struct BigramAddOutcome {
    /// List head after the operation; differs from the input only when
    /// the list was empty.
    pub list_head: u32,
    /// True when the live entry count grew (fresh target or a revived
    /// soft-deleted entry), false for an in-place probability update.
    pub newly_added: bool,
}

/// Adds or updates the continuation `source → target`. Duplicate targets
/// are updated in place, keeping the no-duplicate-target invariant.
pub fn add_bigram_entry(
    buffer: &mut ExtendableBuffer,
    list_head: u32,
    target_terminal_id: u32,
    probability: i16,
) -> Result<BigramAddOutcome> {
    let mut pos = list_head;
    let mut tail = NONE_POS;
    while pos != NONE_POS {
        let entry = read_entry(buffer, pos)?;
        if entry.target_terminal_id == target_terminal_id {
            let revived = entry.is_deleted();
            buffer.write_u8(entry.pos, 0)?;
            buffer.write_i16(entry.pos + 5, probability)?;
            return Ok(BigramAddOutcome {
                list_head,
                newly_added: revived,
            });
        }
        tail = entry.pos;
        pos = entry.next_pos;
    }
    let new_pos = append_entry(buffer, target_terminal_id, probability)?;
    if tail != NONE_POS {
        buffer.write_u32(tail + 7, new_pos)?;
        Ok(BigramAddOutcome {
            list_head,
            newly_added: true,
        })
    } else {
        Ok(BigramAddOutcome {
            list_head: new_pos,
            newly_added: true,
        })
    }
}

/// Soft-deletes the entry for `target_terminal_id`; returns false when no
/// live entry references that target.
pub fn remove_bigram_entry(
    buffer: &mut ExtendableBuffer,
    list_head: u32,
    target_terminal_id: u32,
) -> Result<bool> {
    let mut pos = list_head;
    while pos != NONE_POS {
        let entry = read_entry(buffer, pos)?;
        if entry.target_terminal_id == target_terminal_id && !entry.is_deleted() {
            buffer.write_u8(entry.pos, ENTRY_FLAG_DELETED)?;
            return Ok(true);
        }
        pos = entry.next_pos;
    }
    Ok(false)
}

/// Soft-deletes every live entry of the list; returns how many were
/// deleted. Used when the source word itself is removed.
pub fn remove_all_bigram_entries(buffer: &mut ExtendableBuffer, list_head: u32) -> Result<u32> {
    let mut removed = 0;
    let mut pos = list_head;
    while pos != NONE_POS {
        let entry = read_entry(buffer, pos)?;
        if !entry.is_deleted() {
            buffer.write_u8(entry.pos, ENTRY_FLAG_DELETED)?;
            removed += 1;
        }
        pos = entry.next_pos;
    }
    Ok(removed)
}

/// Visits every live entry in storage order; a single finite pass.
pub fn for_each_bigram_entry(
    buffer: &ExtendableBuffer,
    list_head: u32,
    mut visit: impl FnMut(&BigramEntry),
) -> Result<()> {
    let mut pos = list_head;
    while pos != NONE_POS {
        let entry = read_entry(buffer, pos)?;
        if !entry.is_deleted() {
            visit(&entry);
        }
        pos = entry.next_pos;
    }
    Ok(())
}

/// Probability of the live entry for `target_terminal_id`, if present.
pub fn find_bigram_probability(
    buffer: &ExtendableBuffer,
    list_head: u32,
    target_terminal_id: u32,
) -> Result<Option<i16>> {
    let mut found = None;
    for_each_bigram_entry(buffer, list_head, |entry| {
        if entry.target_terminal_id == target_terminal_id {
            found = Some(entry.probability);
        }
    })?;
    Ok(found)
}
