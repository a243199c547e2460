//! Growable, position-addressed byte store backing the trie and the
//! association-list regions.
//!
//! An [`ExtendableBuffer`] is an immutable-size base region (the bytes
//! loaded from a dictionary file) plus an append-only growth region.
//! Appends return the position of the written bytes and never invalidate
//! previously returned positions; both regions stay writable in place so
//! node fields can be patched wherever they live. Positions are only
//! renumbered when compaction rebuilds a fresh buffer.

use crate::error::{DictError, Result};

/// `is_near_size_limit` fires once the buffer passes this fraction of its
/// configured maximum, so callers can schedule compaction well before
/// appends start failing at the hard ceiling.
const NEAR_LIMIT_PERCENT: usize = 90;

pub struct ExtendableBuffer {
    base: Vec<u8>,
    extension: Vec<u8>,
    max_size: usize,
}

impl ExtendableBuffer {
    pub fn new(max_size: usize) -> Self {
        Self {
            base: Vec::new(),
            extension: Vec::new(),
            max_size,
        }
    }

    /// Wraps bytes loaded from storage as the immutable-size base region.
    pub fn from_base(base: Vec<u8>, max_size: usize) -> Self {
        Self {
            base,
            extension: Vec::new(),
            max_size,
        }
    }

    pub fn len(&self) -> usize {
        self.base.len() + self.extension.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Next append position.
    pub fn tail_pos(&self) -> u32 {
        self.len() as u32
    }

    /// True once the buffer has grown past `NEAR_LIMIT_PERCENT` of its
    /// configured maximum.
    pub fn is_near_size_limit(&self) -> bool {
        self.len() * 100 >= self.max_size * NEAR_LIMIT_PERCENT
    }

    pub fn read_bytes(&self, pos: u32, out: &mut [u8]) -> Result<()> {
        let start = pos as usize;
        let end = start
            .checked_add(out.len())
            .ok_or_else(|| corruption(start, out.len(), self.len()))?;
        if end > self.len() {
            return Err(corruption(start, out.len(), self.len()));
        }
        let base_len = self.base.len();
        if end <= base_len {
            out.copy_from_slice(&self.base[start..end]);
        } else if start >= base_len {
            out.copy_from_slice(&self.extension[start - base_len..end - base_len]);
        } else {
            let split = base_len - start;
            out[..split].copy_from_slice(&self.base[start..]);
            out[split..].copy_from_slice(&self.extension[..end - base_len]);
        }
        Ok(())
    }

    /// Overwrites bytes at an existing position. Writing past the current
    /// end is a structural error; growth goes through `append`.
    pub fn write_bytes(&mut self, pos: u32, bytes: &[u8]) -> Result<()> {
        let start = pos as usize;
        let end = start
            .checked_add(bytes.len())
            .ok_or_else(|| corruption(start, bytes.len(), self.len()))?;
        if end > self.len() {
            return Err(corruption(start, bytes.len(), self.len()));
        }
        let base_len = self.base.len();
        if end <= base_len {
            self.base[start..end].copy_from_slice(bytes);
        } else if start >= base_len {
            self.extension[start - base_len..end - base_len].copy_from_slice(bytes);
        } else {
            let split = base_len - start;
            self.base[start..].copy_from_slice(&bytes[..split]);
            self.extension[..end - base_len].copy_from_slice(&bytes[split..]);
        }
        Ok(())
    }

    /// Appends bytes to the growth region and returns their position.
    pub fn append(&mut self, bytes: &[u8]) -> Result<u32> {
        let new_len = self.len() + bytes.len();
        if new_len > self.max_size {
            return Err(DictError::CapacityExceeded(format!(
                "append of {} bytes would grow buffer to {} (max {})",
                bytes.len(),
                new_len,
                self.max_size
            )));
        }
        let pos = self.tail_pos();
        self.extension.extend_from_slice(bytes);
        Ok(pos)
    }

    pub fn read_u8(&self, pos: u32) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_bytes(pos, &mut buf)?;
        Ok(buf[0])
    }

    pub fn read_u16(&self, pos: u32) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.read_bytes(pos, &mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    pub fn read_i16(&self, pos: u32) -> Result<i16> {
        let mut buf = [0u8; 2];
        self.read_bytes(pos, &mut buf)?;
        Ok(i16::from_le_bytes(buf))
    }

    pub fn read_u32(&self, pos: u32) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_bytes(pos, &mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    pub fn write_u8(&mut self, pos: u32, value: u8) -> Result<()> {
        self.write_bytes(pos, &[value])
    }

    pub fn write_u16(&mut self, pos: u32, value: u16) -> Result<()> {
        self.write_bytes(pos, &value.to_le_bytes())
    }

    pub fn write_i16(&mut self, pos: u32, value: i16) -> Result<()> {
        self.write_bytes(pos, &value.to_le_bytes())
    }

    pub fn write_u32(&mut self, pos: u32, value: u32) -> Result<()> {
        self.write_bytes(pos, &value.to_le_bytes())
    }

    /// Concatenated contents, used when serializing a region to storage.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        out.extend_from_slice(&self.base);
        out.extend_from_slice(&self.extension);
        out
    }
}

fn corruption(start: usize, len: usize, buffer_len: usize) -> DictError {
    DictError::Corruption(format!(
        "buffer access at {start}..{} out of range (buffer length {buffer_len})",
        start.saturating_add(len)
    ))
}
