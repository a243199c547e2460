//! Shortcut list policy: alternate output spellings attached to a
//! terminal (abbreviation expansions, whitelist overrides).
//!
//! Same chained-list shape as the bigram region, but entries carry the
//! alternate spelling inline instead of a terminal-ID reference, so
//! compaction only has to drop dead entries, never remap them.
//!
//! Entry layout: `flags u8 | probability i16 | cp_count u8 |
//! cp_count * u32 | next u32`.

use crate::error::{DictError, Result};
use crate::storage::buffer::ExtendableBuffer;
use crate::trie::node::NONE_POS;
use crate::trie::MAX_WORD_LENGTH;

pub(crate) const SHORTCUT_REGION_TAG: &[u8; 4] = b"SHC\0";

const ENTRY_FLAG_DELETED: u8 = 0x01;
const ENTRY_FLAG_WHITELIST: u8 = 0x02;

pub(crate) fn new_shortcut_buffer(max_size: usize) -> Result<ExtendableBuffer> {
    let mut buffer = ExtendableBuffer::new(max_size);
    buffer.append(SHORTCUT_REGION_TAG)?;
    Ok(buffer)
}

#[derive(Debug, Clone)]
pub struct ShortcutEntry {
    pub pos: u32,
    pub flags: u8,
    pub probability: i16,
    pub code_points: Vec<u32>,
    pub next_pos: u32,
}

impl ShortcutEntry {
    pub fn is_deleted(&self) -> bool {
        self.flags & ENTRY_FLAG_DELETED != 0
    }

    /// Whitelist override: the alternate spelling must always be offered
    /// regardless of its score.
    pub fn is_whitelist(&self) -> bool {
        self.flags & ENTRY_FLAG_WHITELIST != 0
    }
}

fn read_entry(buffer: &ExtendableBuffer, pos: u32) -> Result<ShortcutEntry> {
    let flags = buffer.read_u8(pos)?;
    if flags & !(ENTRY_FLAG_DELETED | ENTRY_FLAG_WHITELIST) != 0 {
        return Err(DictError::Corruption(format!(
            "unknown shortcut entry flag bits: 0x{flags:02X}"
        )));
    }
    let probability = buffer.read_i16(pos + 1)?;
    let cp_count = buffer.read_u8(pos + 3)?;
    if cp_count == 0 || cp_count as usize > MAX_WORD_LENGTH {
        return Err(DictError::Corruption(format!(
            "shortcut entry at {pos} has invalid code point count {cp_count}"
        )));
    }
    let mut code_points = Vec::with_capacity(cp_count as usize);
    for i in 0..cp_count as u32 {
        code_points.push(buffer.read_u32(pos + 4 + 4 * i)?);
    }
    let next_pos = buffer.read_u32(pos + 4 + 4 * cp_count as u32)?;
    Ok(ShortcutEntry {
        pos,
        flags,
        probability,
        code_points,
        next_pos,
    })
}

fn next_field_pos(entry: &ShortcutEntry) -> u32 {
    entry.pos + 4 + 4 * entry.code_points.len() as u32
}

fn append_entry(
    buffer: &mut ExtendableBuffer,
    code_points: &[u32],
    probability: i16,
    whitelist: bool,
) -> Result<u32> {
    let mut bytes = Vec::with_capacity(8 + 4 * code_points.len());
    bytes.push(if whitelist { ENTRY_FLAG_WHITELIST } else { 0 });
    bytes.extend_from_slice(&probability.to_le_bytes());
    bytes.push(code_points.len() as u8);
    for cp in code_points {
        bytes.extend_from_slice(&cp.to_le_bytes());
    }
    bytes.extend_from_slice(&NONE_POS.to_le_bytes());
    buffer.append(&bytes)
}

#[derive(Debug)]
pub struct ShortcutAddOutcome {
    pub list_head: u32,
    pub newly_added: bool,
}

/// Adds or updates the shortcut with the given spelling. One entry per
/// spelling: an existing entry gets its probability and whitelist flag
/// rewritten in place.
pub fn add_shortcut_entry(
    buffer: &mut ExtendableBuffer,
    list_head: u32,
    code_points: &[u32],
    probability: i16,
    whitelist: bool,
) -> Result<ShortcutAddOutcome> {
    if code_points.is_empty() || code_points.len() > MAX_WORD_LENGTH {
        return Err(DictError::InvalidArgument(format!(
            "shortcut target length {} out of range",
            code_points.len()
        )));
    }
    let mut pos = list_head;
    let mut tail = NONE_POS;
    while pos != NONE_POS {
        let entry = read_entry(buffer, pos)?;
        if entry.code_points == code_points {
            let flags = if whitelist { ENTRY_FLAG_WHITELIST } else { 0 };
            buffer.write_u8(entry.pos, flags)?;
            buffer.write_i16(entry.pos + 1, probability)?;
            return Ok(ShortcutAddOutcome {
                list_head,
                newly_added: entry.is_deleted(),
            });
        }
        tail = next_field_pos(&entry);
        pos = entry.next_pos;
    }
    let new_pos = append_entry(buffer, code_points, probability, whitelist)?;
    if tail != NONE_POS {
        buffer.write_u32(tail, new_pos)?;
        Ok(ShortcutAddOutcome {
            list_head,
            newly_added: true,
        })
    } else {
        Ok(ShortcutAddOutcome {
            list_head: new_pos,
            newly_added: true,
        })
    }
}

/// Visits every live shortcut entry in storage order.
pub fn for_each_shortcut_entry(
    buffer: &ExtendableBuffer,
    list_head: u32,
    mut visit: impl FnMut(&ShortcutEntry),
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
