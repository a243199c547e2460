//! Global dictionary metadata: entry counters, configured ceilings, the
//! terminal-ID allocator, and locale/format information.
//!
//! The counters are maintained incrementally by online mutation and are
//! treated as a cache: compaction recomputes them from the surviving set
//! and a mismatch is reported as corruption.

use std::convert::TryInto;

use crate::db::DictConfig;
use crate::error::{DictError, Result};

/// Fixed-width part of the encoded header block, before the locale string.
const FIXED_SIZE: usize = 24;

#[derive(Debug, Clone)]
pub struct Header {
    pub unigram_count: u32,
    pub bigram_count: u32,
    /// Next terminal ID to hand out; monotonic within a dictionary
    /// generation, reset only by compaction's dense renumbering.
    pub next_terminal_id: u32,
    pub max_unigram_count: u32,
    pub max_bigram_count: u32,
    pub max_trie_size: u32,
    pub locale: String,
}

impl Header {
    pub fn new(config: &DictConfig) -> Self {
        Self {
            unigram_count: 0,
            bigram_count: 0,
            next_terminal_id: 0,
            max_unigram_count: config.max_unigram_count,
            max_bigram_count: config.max_bigram_count,
            max_trie_size: config.max_trie_size,
            locale: config.locale.clone(),
        }
    }

    pub fn has_room_for_unigram(&self) -> bool {
        self.unigram_count < self.max_unigram_count
    }

    pub fn has_room_for_bigram(&self) -> bool {
        self.bigram_count < self.max_bigram_count
    }

    /// Allocates the next terminal ID.
    pub fn allocate_terminal_id(&mut self) -> u32 {
        let id = self.next_terminal_id;
        self.next_terminal_id += 1;
        id
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let locale_bytes = self.locale.as_bytes();
        let locale_len = u16::try_from(locale_bytes.len())
            .map_err(|_| DictError::InvalidArgument("locale string too long".into()))?;
        let mut out = Vec::with_capacity(FIXED_SIZE + 2 + locale_bytes.len());
        out.extend_from_slice(&self.unigram_count.to_le_bytes());
        out.extend_from_slice(&self.bigram_count.to_le_bytes());
        out.extend_from_slice(&self.next_terminal_id.to_le_bytes());
        out.extend_from_slice(&self.max_unigram_count.to_le_bytes());
        out.extend_from_slice(&self.max_bigram_count.to_le_bytes());
        out.extend_from_slice(&self.max_trie_size.to_le_bytes());
        out.extend_from_slice(&locale_len.to_le_bytes());
        out.extend_from_slice(locale_bytes);
        Ok(out)
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < FIXED_SIZE + 2 {
            return Err(DictError::Corruption(
                "header block shorter than expected".into(),
            ));
        }
        let unigram_count = read_u32(data, 0)?;
        let bigram_count = read_u32(data, 4)?;
        let next_terminal_id = read_u32(data, 8)?;
        let max_unigram_count = read_u32(data, 12)?;
        let max_bigram_count = read_u32(data, 16)?;
        let max_trie_size = read_u32(data, 20)?;
        let locale_len = u16::from_le_bytes([data[24], data[25]]) as usize;
        let locale_bytes = data
            .get(26..26 + locale_len)
            .ok_or_else(|| DictError::Corruption("header locale string truncated".into()))?;
        let locale = std::str::from_utf8(locale_bytes)
            .map_err(|_| DictError::Corruption("header locale is not valid UTF-8".into()))?
            .to_string();
        Ok(Self {
            unigram_count,
            bigram_count,
            next_terminal_id,
            max_unigram_count,
            max_bigram_count,
            max_trie_size,
            locale,
        })
    }
}

fn read_u32(data: &[u8], start: usize) -> Result<u32> {
    let bytes: [u8; 4] = data
        .get(start..start + 4)
        .ok_or_else(|| DictError::Corruption("header u32 field truncated".into()))?
        .try_into()
        .map_err(|_| DictError::Corruption("failed to parse u32 from header".into()))?;
    Ok(u32::from_le_bytes(bytes))
}
