//! PtNode model and byte layout.
//!
//! A PtNode is one edge-compressed path segment: a run of code points, an
//! optional terminal marker (terminal ID + unigram probability), and
//! positions of the children array and of this terminal's bigram and
//! shortcut lists.
//!
//! Layout, all integers little-endian:
//!
//! ```text
//! flags        u8
//! cp_capacity  u8            code-point slots reserved at creation
//! cp_count     u8            valid code points (<= cp_capacity)
//! code points  cp_capacity * u32
//! terminal_id  u32           u32::MAX when not terminal
//! probability  i16           -1 when not terminal or soft-removed
//! children_pos u32           0 when leaf
//! bigram_pos   u32           0 when no bigram list
//! shortcut_pos u32           0 when no shortcut list
//! ```
//!
//! The capacity/count split is what makes `split_node` an in-place
//! operation: shortening a node's segment only rewrites `cp_count`, so
//! sibling positions computed from `cp_capacity` never shift.

use crate::error::{DictError, Result};

/// Position sentinel meaning "no children / no list". Every buffer region
/// starts with a 4-byte tag, so 0 is never a real position.
pub const NONE_POS: u32 = 0;

/// Terminal-ID sentinel for non-terminal nodes.
pub const INVALID_TERMINAL_ID: u32 = u32::MAX;

/// Stored probability sentinel for "not terminal" and for soft-removed
/// entries awaiting compaction.
pub const NO_PROBABILITY: i16 = -1;

pub const FLAG_IS_TERMINAL: u8 = 0x01;
pub const FLAG_IS_BLACKLISTED: u8 = 0x02;
pub const FLAG_IS_NOT_A_WORD: u8 = 0x04;
pub const FLAG_IS_DELETED: u8 = 0x08;

const ALL_FLAGS: u8 =
    FLAG_IS_TERMINAL | FLAG_IS_BLACKLISTED | FLAG_IS_NOT_A_WORD | FLAG_IS_DELETED;

/// Fixed bytes before the code-point slots.
pub(crate) const PREFIX_SIZE: u32 = 3;
/// Fixed bytes after the code-point slots.
pub(crate) const SUFFIX_SIZE: u32 = 18;

/// Encoded size of a node with the given code-point capacity.
pub fn encoded_size(cp_capacity: u8) -> u32 {
    PREFIX_SIZE + 4 * cp_capacity as u32 + SUFFIX_SIZE
}

/// A decoded PtNode together with the position it was read from.
#[derive(Debug, Clone)]
pub struct PtNode {
    pub pos: u32,
    pub flags: u8,
    pub cp_capacity: u8,
    pub code_points: Vec<u32>,
    pub terminal_id: u32,
    pub probability: i16,
    pub children_pos: u32,
    pub bigram_pos: u32,
    pub shortcut_pos: u32,
}

impl PtNode {
    pub fn is_terminal(&self) -> bool {
        self.flags & FLAG_IS_TERMINAL != 0
    }

    pub fn is_blacklisted(&self) -> bool {
        self.flags & FLAG_IS_BLACKLISTED != 0
    }

    pub fn is_not_a_word(&self) -> bool {
        self.flags & FLAG_IS_NOT_A_WORD != 0
    }

    pub fn is_deleted(&self) -> bool {
        self.flags & FLAG_IS_DELETED != 0
    }

    /// Terminal that has not been soft-removed.
    pub fn is_live_terminal(&self) -> bool {
        self.is_terminal() && !self.is_deleted()
    }

    pub fn has_children(&self) -> bool {
        self.children_pos != NONE_POS
    }

    pub fn byte_size(&self) -> u32 {
        encoded_size(self.cp_capacity)
    }

    /// Position one past this node; the next sibling in the same array
    /// chunk starts here.
    pub fn end_pos(&self) -> u32 {
        self.pos + self.byte_size()
    }

    pub(crate) fn flags_field_pos(&self) -> u32 {
        self.pos
    }

    pub(crate) fn cp_count_field_pos(&self) -> u32 {
        self.pos + 2
    }

    pub(crate) fn terminal_id_field_pos(&self) -> u32 {
        self.pos + PREFIX_SIZE + 4 * self.cp_capacity as u32
    }

    pub(crate) fn probability_field_pos(&self) -> u32 {
        self.terminal_id_field_pos() + 4
    }

    pub(crate) fn children_field_pos(&self) -> u32 {
        self.terminal_id_field_pos() + 6
    }

    pub(crate) fn bigram_field_pos(&self) -> u32 {
        self.terminal_id_field_pos() + 10
    }

    pub(crate) fn shortcut_field_pos(&self) -> u32 {
        self.terminal_id_field_pos() + 14
    }
}

pub(crate) fn validate_flags(flags: u8) -> Result<u8> {
    if flags & !ALL_FLAGS != 0 {
        return Err(DictError::Corruption(format!(
            "unknown PtNode flag bits: 0x{flags:02X}"
        )));
    }
    Ok(flags)
}

/// Specification of a node to be written; capacity is fixed to the code
/// point count at creation time.
pub(crate) struct NewNode<'a> {
    pub code_points: &'a [u32],
    pub flags: u8,
    pub terminal_id: u32,
    pub probability: i16,
    pub children_pos: u32,
    pub bigram_pos: u32,
    pub shortcut_pos: u32,
}

impl<'a> NewNode<'a> {
    /// A plain terminal node with no children or lists yet.
    pub fn terminal(code_points: &'a [u32], terminal_id: u32, probability: i16, flags: u8) -> Self {
        Self {
            code_points,
            flags: flags | FLAG_IS_TERMINAL,
            terminal_id,
            probability,
            children_pos: NONE_POS,
            bigram_pos: NONE_POS,
            shortcut_pos: NONE_POS,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        debug_assert!(!self.code_points.is_empty() && self.code_points.len() <= u8::MAX as usize);
        let capacity = self.code_points.len() as u8;
        let mut out = Vec::with_capacity(encoded_size(capacity) as usize);
        out.push(self.flags);
        out.push(capacity);
        out.push(capacity);
        for cp in self.code_points {
            out.extend_from_slice(&cp.to_le_bytes());
        }
        out.extend_from_slice(&self.terminal_id.to_le_bytes());
        out.extend_from_slice(&self.probability.to_le_bytes());
        out.extend_from_slice(&self.children_pos.to_le_bytes());
        out.extend_from_slice(&self.bigram_pos.to_le_bytes());
        out.extend_from_slice(&self.shortcut_pos.to_le_bytes());
        out
    }
}
