//! Terminal position lookup table: the one indirection layer between
//! stable terminal IDs and physical trie positions.
//!
//! Bigram entries reference terminal IDs, never raw positions, so this
//! table is the only structure compaction has to rebuild for
//! cross-references to survive a full rewrite.

use std::convert::TryInto;

use crate::error::{DictError, Result};

/// Sentinel for a vacant slot or an unknown terminal.
pub const INVALID_TERMINAL_POS: u32 = u32::MAX;

#[derive(Debug, Default, Clone)]
pub struct TerminalPositionLookupTable {
    positions: Vec<u32>,
}

impl TerminalPositionLookupTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Current trie position of a terminal, if the ID is known.
    pub fn get(&self, terminal_id: u32) -> Option<u32> {
        match self.positions.get(terminal_id as usize) {
            Some(&pos) if pos != INVALID_TERMINAL_POS => Some(pos),
            _ => None,
        }
    }

    /// Records or remaps a terminal's position, growing the table as IDs
    /// are allocated monotonically.
    pub fn set(&mut self, terminal_id: u32, pos: u32) {
        let index = terminal_id as usize;
        if index >= self.positions.len() {
            self.positions.resize(index + 1, INVALID_TERMINAL_POS);
        }
        self.positions[index] = pos;
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.positions.len() * 4);
        out.extend_from_slice(&(self.positions.len() as u32).to_le_bytes());
        for pos in &self.positions {
            out.extend_from_slice(&pos.to_le_bytes());
        }
        out
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(DictError::Corruption(
                "terminal table region truncated".into(),
            ));
        }
        let count = u32::from_le_bytes(data[..4].try_into().unwrap()) as usize;
        let expected = 4 + count * 4;
        if data.len() != expected {
            return Err(DictError::Corruption(format!(
                "terminal table length {} does not match entry count {count}",
                data.len()
            )));
        }
        let mut positions = Vec::with_capacity(count);
        for i in 0..count {
            let start = 4 + i * 4;
            positions.push(u32::from_le_bytes(
                data[start..start + 4].try_into().unwrap(),
            ));
        }
        Ok(Self { positions })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_grows_and_remaps() {
        let mut table = TerminalPositionLookupTable::new();
        table.set(3, 100);
        assert_eq!(table.get(3), Some(100));
        assert_eq!(table.get(0), None);
        assert_eq!(table.get(7), None);
        table.set(3, 250);
        assert_eq!(table.get(3), Some(250));
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn encode_decode_round_trip() -> Result<()> {
        let mut table = TerminalPositionLookupTable::new();
        table.set(0, 4);
        table.set(2, 96);
        let decoded = TerminalPositionLookupTable::decode(&table.encode())?;
        assert_eq!(decoded.get(0), Some(4));
        assert_eq!(decoded.get(1), None);
        assert_eq!(decoded.get(2), Some(96));
        Ok(())
    }

    #[test]
    fn decode_rejects_length_mismatch() {
        let mut bytes = 3u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0; 4]);
        let err = TerminalPositionLookupTable::decode(&bytes).expect_err("must fail");
        assert!(err.is_corruption());
    }
}
