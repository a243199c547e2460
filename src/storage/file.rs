//! Single-file persistence for the dictionary: header block plus the
//! trie, terminal-table, bigram, and shortcut regions, protected by a
//! crc32 so a damaged file is reported as corruption instead of being
//! half-loaded.
//!
//! Writes go to a `.tmp` sibling first and are renamed into place, so a
//! failed flush never destroys the previous on-disk generation.

use std::convert::TryInto;
use std::fs;
use std::io::Write;
use std::path::Path;

use tracing::debug;

use crate::error::{DictError, Result};
use crate::storage::header::Header;
use crate::storage::terminal_table::TerminalPositionLookupTable;

const MAGIC: &[u8; 8] = b"PTDICT1\0";
const VERSION_MAJOR: u16 = 1;
const VERSION_MINOR: u16 = 0;

/// magic + version + header length + four region lengths.
const PREAMBLE_SIZE: usize = 8 + 4 + 4 + 16 + 4;

#[derive(Debug)]
pub(crate) struct DictFileContents {
    pub header: Header,
    pub trie: Vec<u8>,
    pub terminals: TerminalPositionLookupTable,
    pub bigrams: Vec<u8>,
    pub shortcuts: Vec<u8>,
}

pub(crate) fn write_dict_file(
    path: &Path,
    header: &Header,
    trie: &[u8],
    terminals: &TerminalPositionLookupTable,
    bigrams: &[u8],
    shortcuts: &[u8],
) -> Result<()> {
    let header_block = header.encode()?;
    let terminal_block = terminals.encode();

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&header_block);
    hasher.update(trie);
    hasher.update(&terminal_block);
    hasher.update(bigrams);
    hasher.update(shortcuts);
    let checksum = hasher.finalize();

    let mut out = Vec::with_capacity(
        PREAMBLE_SIZE + header_block.len() + trie.len() + terminal_block.len() + bigrams.len()
            + shortcuts.len(),
    );
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&VERSION_MAJOR.to_le_bytes());
    out.extend_from_slice(&VERSION_MINOR.to_le_bytes());
    out.extend_from_slice(&(header_block.len() as u32).to_le_bytes());
    out.extend_from_slice(&(trie.len() as u32).to_le_bytes());
    out.extend_from_slice(&(terminal_block.len() as u32).to_le_bytes());
    out.extend_from_slice(&(bigrams.len() as u32).to_le_bytes());
    out.extend_from_slice(&(shortcuts.len() as u32).to_le_bytes());
    out.extend_from_slice(&checksum.to_le_bytes());
    out.extend_from_slice(&header_block);
    out.extend_from_slice(trie);
    out.extend_from_slice(&terminal_block);
    out.extend_from_slice(bigrams);
    out.extend_from_slice(shortcuts);

    let tmp_path = tmp_path_for(path);
    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(&out)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp_path, path)?;
    debug!(path = %path.display(), bytes = out.len(), "dictionary file written");
    Ok(())
}

pub(crate) fn read_dict_file(path: &Path) -> Result<DictFileContents> {
    let data = fs::read(path)?;
    if data.len() < PREAMBLE_SIZE {
        return Err(DictError::Corruption(
            "dictionary file shorter than preamble".into(),
        ));
    }
    if &data[..8] != MAGIC {
        return Err(DictError::Corruption("invalid dictionary magic".into()));
    }
    let major = u16::from_le_bytes([data[8], data[9]]);
    if major != VERSION_MAJOR {
        return Err(DictError::Corruption(format!(
            "unsupported dictionary format major version {major} (expected {VERSION_MAJOR})"
        )));
    }
    let header_len = read_len(&data, 12)?;
    let trie_len = read_len(&data, 16)?;
    let terminal_len = read_len(&data, 20)?;
    let bigram_len = read_len(&data, 24)?;
    let shortcut_len = read_len(&data, 28)?;
    let stored_checksum = u32::from_le_bytes(data[32..36].try_into().unwrap());

    let body = &data[PREAMBLE_SIZE..];
    let expected = header_len + trie_len + terminal_len + bigram_len + shortcut_len;
    if body.len() != expected {
        return Err(DictError::Corruption(format!(
            "dictionary body length {} does not match region lengths {expected}",
            body.len()
        )));
    }
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(body);
    if hasher.finalize() != stored_checksum {
        return Err(DictError::Corruption(
            "dictionary file checksum mismatch".into(),
        ));
    }

    let (header_block, rest) = body.split_at(header_len);
    let (trie, rest) = rest.split_at(trie_len);
    let (terminal_block, rest) = rest.split_at(terminal_len);
    let (bigrams, shortcuts) = rest.split_at(bigram_len);

    Ok(DictFileContents {
        header: Header::decode(header_block)?,
        trie: trie.to_vec(),
        terminals: TerminalPositionLookupTable::decode(terminal_block)?,
        bigrams: bigrams.to_vec(),
        shortcuts: shortcuts.to_vec(),
    })
}

fn read_len(data: &[u8], start: usize) -> Result<usize> {
    let bytes: [u8; 4] = data
        .get(start..start + 4)
        .ok_or_else(|| DictError::Corruption("dictionary preamble truncated".into()))?
        .try_into()
        .map_err(|_| DictError::Corruption("dictionary preamble truncated".into()))?;
    Ok(u32::from_le_bytes(bytes) as usize)
}

fn tmp_path_for(path: &Path) -> std::path::PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    std::path::PathBuf::from(name)
}
